use anyhow::{Context, Result};
use log::info;
use std::path::PathBuf;

use ms2match::extract::Ms2ExtractionConfig;
use ms2match::matching::MatchingConfig;
use ms2match::pipeline::MatchingPipeline;

use super::output;

/// Extract, match and report
pub fn run(
    mzxml: PathBuf,
    table: PathBuf,
    library: PathBuf,
    extraction: Ms2ExtractionConfig,
    matching: MatchingConfig,
    csv: Option<PathBuf>,
    json: Option<PathBuf>,
) -> Result<()> {
    matching.validate()?;
    extraction.validate()?;
    for input in [&mzxml, &table, &library] {
        if !input.exists() {
            anyhow::bail!("Input file does not exist: {}", input.display());
        }
    }

    info!("Algorithm: {}", matching.algorithm);
    info!("Tolerance: {}", matching.tolerance());
    let pipeline = MatchingPipeline::new(extraction, matching);
    let run = pipeline
        .run_files(&mzxml, &table, &library)
        .context("Matching failed")?;

    if let Some(notice) = &run.fallback {
        output::print_fallback(notice);
    }
    info!(
        "Library: {} spectra, {} compounds",
        run.library.count,
        run.library.compounds.len()
    );
    output::print_result_set(&run.results);

    if let Some(path) = csv {
        run.results
            .save_csv(&path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Wrote {}", path.display());
    }
    if let Some(path) = json {
        run.results
            .save_json(&path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Wrote {}", path.display());
    }
    Ok(())
}
