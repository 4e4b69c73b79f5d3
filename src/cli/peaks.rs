use anyhow::{Context, Result};
use log::info;
use std::path::PathBuf;

use ms2match::xcms::{PeakFilter, PeakTable};

/// Print the features of an XCMS peak table
pub fn run(
    table: PathBuf,
    mz_min: Option<f64>,
    mz_max: Option<f64>,
    rt_min: Option<f64>,
    rt_max: Option<f64>,
    json: bool,
) -> Result<()> {
    let peaks = PeakTable::load(&table)
        .with_context(|| format!("Failed to read peak table {}", table.display()))?;
    info!(
        "{} features, {} samples in {}",
        peaks.len(),
        peaks.samples().len(),
        table.display()
    );

    let filter = PeakFilter {
        mz_min,
        mz_max,
        rt_min,
        rt_max,
    };
    let selected = peaks.filter_peaks(&filter);

    if json {
        println!("{}", serde_json::to_string_pretty(&selected)?);
        return Ok(());
    }

    println!(
        "{:<16} {:>10} {:>8} {:>8} {:>8} {:>6}",
        "Name", "m/z", "RT", "RT min", "RT max", "Peaks"
    );
    for peak in &selected {
        println!(
            "{:<16} {:>10.4} {:>8.1} {:>8.1} {:>8.1} {:>6}",
            peak.name, peak.mz, peak.rt, peak.rtmin, peak.rtmax, peak.npeaks
        );
    }
    println!("{} of {} features", selected.len(), peaks.len());
    Ok(())
}
