use anyhow::{Context, Result};
use std::path::PathBuf;

use ms2match::library::Library;

/// Load a library and report the parse outcome
pub fn run(file: PathBuf, compounds: bool) -> Result<()> {
    let library = Library::load(&file)
        .with_context(|| format!("Failed to load library {}", file.display()))?;
    let info = library.info();
    let report = library.report();

    println!("Library: {}", file.display());
    if let Some(format) = info.format {
        println!("  Format:          {}", format);
    }
    println!("  Records:         {}", report.total);
    println!("  Valid spectra:   {}", report.valid);
    println!("  Skipped:         {}", report.skipped);
    println!("  Compounds:       {}", info.compounds.len());
    if let Some(range) = info.precursor_mz_range {
        println!("  Precursor m/z:   {:.4} - {:.4}", range.min, range.max);
    }
    for reason in &report.reasons {
        println!("  skipped: {}", reason);
    }

    if compounds {
        println!();
        for name in &info.compounds {
            println!("{}", name);
        }
    }
    Ok(())
}
