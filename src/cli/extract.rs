use anyhow::{Context, Result};
use log::info;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use ms2match::extract::{extract_ms2_spectra, Ms2ExtractionConfig};
use ms2match::xcms::PeakTable;

/// Extract query spectra and print or save them
pub fn run(
    mzxml: PathBuf,
    table: PathBuf,
    config: Ms2ExtractionConfig,
    output: Option<PathBuf>,
) -> Result<()> {
    config.validate()?;
    if !mzxml.exists() {
        anyhow::bail!("Input file does not exist: {}", mzxml.display());
    }

    let peaks = PeakTable::load(&table)
        .with_context(|| format!("Failed to read peak table {}", table.display()))?;
    let result = extract_ms2_spectra(&mzxml, &peaks, &config).context("MS2 extraction failed")?;

    let stats = &result.stats;
    info!("MS2 scans:            {}", stats.ms2_scans);
    info!("Missing precursor/RT: {}", stats.missing_precursor);
    info!("Empty after filter:   {}", stats.empty_after_filter);
    info!("Unassigned:           {}", stats.unassigned);

    println!(
        "{} query spectra for {} of {} features",
        result.spectra.len(),
        stats.features_matched,
        stats.features_total
    );

    match output {
        Some(path) => {
            let writer = BufWriter::new(
                File::create(&path)
                    .with_context(|| format!("Failed to create {}", path.display()))?,
            );
            serde_json::to_writer_pretty(writer, &result.spectra)?;
            println!("Wrote {}", path.display());
        }
        None => {
            for query in &result.spectra {
                println!(
                    "{:<16} scan {:>6}  m/z {:>10.4}  RT {:>8.1}  {} peaks",
                    query.feature_name,
                    query.scan,
                    query.precursor_mz,
                    query.rt,
                    query.n_peaks()
                );
            }
        }
    }
    Ok(())
}
