use anyhow::{Context, Result};
use log::info;
use std::path::PathBuf;
use std::time::Duration;

use ms2match::xcms::{XcmsProcessingConfig, XcmsProcessor};

/// Run XCMS through Rscript and report the produced tables
pub fn run(
    inputs: Vec<PathBuf>,
    output_dir: PathBuf,
    rscript: PathBuf,
    timeout: u64,
    config: XcmsProcessingConfig,
) -> Result<()> {
    let processor = XcmsProcessor::new()
        .with_rscript(rscript)
        .with_timeout(Duration::from_secs(timeout));

    info!("Processing {} mzXML files with XCMS", inputs.len());
    let output = processor
        .process(&inputs, &output_dir, &config)
        .context("XCMS processing failed")?;

    println!("{}", output.message);
    println!("Peak table:  {}", output.peak_table.display());
    if let Some(sample_info) = &output.sample_info {
        println!("Sample info: {}", sample_info.display());
    }
    Ok(())
}
