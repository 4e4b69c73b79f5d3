use anyhow::{Context, Result};
use std::path::PathBuf;

use ms2match::results::ResultSet;

/// Re-export a JSON result set as CSV
pub fn run(input: PathBuf, output: PathBuf) -> Result<()> {
    let results = ResultSet::load_json(&input)
        .with_context(|| format!("Failed to read result set {}", input.display()))?;
    results
        .save_csv(&output)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!("Exported {} features to {}", results.len(), output.display());
    Ok(())
}
