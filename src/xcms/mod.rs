//! # XCMS Output Tables
//!
//! Readers for the two CSV files an XCMS run leaves behind:
//!
//! - the peak table (`PeakTable_verbose.csv`), one row per feature with
//!   `name, mz, mzmin, mzmax, rt, rtmin, rtmax, npeaks` followed by one
//!   intensity column per sample
//! - `sample.info.csv`, mapping `sample.name` to `group`
//!
//! Features are immutable once loaded. Retention times are in seconds.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};

mod error;
pub mod process;

#[cfg(test)]
mod tests;

pub use error::{ProcessingError, XcmsError};
pub use process::{XcmsOutput, XcmsProcessingConfig, XcmsProcessor};

/// Columns that describe the feature rather than a sample
const FEATURE_COLUMNS: &[&str] = &[
    "name", "mz", "mzmin", "mzmax", "rt", "rtmin", "rtmax", "npeaks",
];

/// One XCMS feature (a grouped chromatographic peak)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XcmsPeak {
    /// Feature name
    pub name: String,
    /// Feature m/z
    pub mz: f64,
    /// Lower m/z bound
    pub mzmin: f64,
    /// Upper m/z bound
    pub mzmax: f64,
    /// Retention time in seconds
    pub rt: f64,
    /// Start of the RT window in seconds
    pub rtmin: f64,
    /// End of the RT window in seconds
    pub rtmax: f64,
    /// Number of peaks grouped into the feature
    pub npeaks: u32,
    /// Per-sample integrated intensity
    pub intensities: BTreeMap<String, f64>,
}

/// Optional m/z and RT bounds, all inclusive
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PeakFilter {
    /// Lowest m/z
    pub mz_min: Option<f64>,
    /// Highest m/z
    pub mz_max: Option<f64>,
    /// Earliest RT in seconds
    pub rt_min: Option<f64>,
    /// Latest RT in seconds
    pub rt_max: Option<f64>,
}

impl PeakFilter {
    /// Whether `peak` lies inside every set bound
    pub fn matches(&self, peak: &XcmsPeak) -> bool {
        self.mz_min.map_or(true, |v| peak.mz >= v)
            && self.mz_max.map_or(true, |v| peak.mz <= v)
            && self.rt_min.map_or(true, |v| peak.rt >= v)
            && self.rt_max.map_or(true, |v| peak.rt <= v)
    }
}

/// An XCMS feature table in file order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeakTable {
    peaks: Vec<XcmsPeak>,
    samples: Vec<String>,
}

impl PeakTable {
    /// Load a peak table from a CSV (or tab-separated) file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, XcmsError> {
        let path = path.as_ref();
        let table = Self::from_reader(File::open(path)?)?;
        log::info!(
            "Loaded {} XCMS features across {} samples from {}",
            table.len(),
            table.samples.len(),
            path.display()
        );
        Ok(table)
    }

    /// Parse a peak table from any reader
    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self, XcmsError> {
        let mut content = Vec::new();
        reader.read_to_end(&mut content)?;

        let mut csv_reader = csv::ReaderBuilder::new()
            .delimiter(sniff_delimiter(&content))
            .flexible(true)
            .has_headers(true)
            .from_reader(content.as_slice());

        let headers: Vec<String> = csv_reader
            .headers()?
            .iter()
            .map(|h| h.trim().trim_matches('"').to_string())
            .collect();

        let column = |name: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(name));
        let mz_col = column("mz").ok_or_else(|| XcmsError::MissingColumn("mz".to_string()))?;
        let rt_col = column("rt").ok_or_else(|| XcmsError::MissingColumn("rt".to_string()))?;
        let name_col = column("name");
        let mzmin_col = column("mzmin");
        let mzmax_col = column("mzmax");
        let rtmin_col = column("rtmin");
        let rtmax_col = column("rtmax");
        let npeaks_col = column("npeaks");

        let sample_cols: Vec<(usize, String)> = headers
            .iter()
            .enumerate()
            .filter(|(_, h)| !is_feature_column(h))
            .map(|(i, h)| (i, h.clone()))
            .collect();

        let mut peaks = Vec::new();
        for (row_idx, record) in csv_reader.records().enumerate() {
            let record = record?;
            let row = row_idx + 1;
            let cell = |idx: usize| record.get(idx).map(str::trim).unwrap_or("");

            let required = |idx: usize, name: &str| -> Result<f64, XcmsError> {
                parse_number(cell(idx)).ok_or_else(|| XcmsError::InvalidValue {
                    row,
                    column: name.to_string(),
                    value: cell(idx).to_string(),
                })
            };
            let mz = required(mz_col, "mz")?;
            let rt = required(rt_col, "rt")?;

            let optional_value = |col: Option<usize>, fallback: f64| {
                col.and_then(|idx| parse_number(cell(idx)))
                    .unwrap_or(fallback)
            };

            let name = name_col
                .map(|idx| cell(idx).trim_matches('"').to_string())
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| format!("M{:.0}T{:.0}", mz, rt));

            let intensities = sample_cols
                .iter()
                .filter_map(|(idx, sample)| {
                    parse_number(cell(*idx)).map(|v| (sample.clone(), v))
                })
                .collect();

            peaks.push(XcmsPeak {
                name,
                mz,
                mzmin: optional_value(mzmin_col, mz),
                mzmax: optional_value(mzmax_col, mz),
                rt,
                rtmin: optional_value(rtmin_col, rt),
                rtmax: optional_value(rtmax_col, rt),
                npeaks: optional_value(npeaks_col, 0.0).max(0.0) as u32,
                intensities,
            });
        }

        Ok(Self {
            peaks,
            samples: sample_cols.into_iter().map(|(_, s)| s).collect(),
        })
    }

    /// Build a table from already-constructed features
    pub fn from_peaks(peaks: Vec<XcmsPeak>) -> Self {
        let mut samples: Vec<String> = Vec::new();
        for peak in &peaks {
            for sample in peak.intensities.keys() {
                if !samples.contains(sample) {
                    samples.push(sample.clone());
                }
            }
        }
        Self { peaks, samples }
    }

    /// Features in file order
    pub fn peaks(&self) -> &[XcmsPeak] {
        &self.peaks
    }

    /// Sample columns in header order
    pub fn samples(&self) -> &[String] {
        &self.samples
    }

    /// Iterate features in file order
    pub fn iter(&self) -> std::slice::Iter<'_, XcmsPeak> {
        self.peaks.iter()
    }

    /// Number of features
    pub fn len(&self) -> usize {
        self.peaks.len()
    }

    /// Whether the table has no features
    pub fn is_empty(&self) -> bool {
        self.peaks.is_empty()
    }

    /// Look up a feature by name
    pub fn get_peak(&self, name: &str) -> Option<&XcmsPeak> {
        self.peaks.iter().find(|p| p.name == name)
    }

    /// Features inside the filter bounds, in table order
    pub fn filter_peaks(&self, filter: &PeakFilter) -> Vec<&XcmsPeak> {
        self.peaks.iter().filter(|p| filter.matches(p)).collect()
    }

    /// Feature closest to (mz, rt) within both tolerances.
    ///
    /// Distance is `|Δmz|/mz_tol + |Δrt|/rt_tol`; on equal distance the
    /// earlier feature wins.
    pub fn find_by_mz_rt(
        &self,
        mz: f64,
        rt: f64,
        mz_tolerance: f64,
        rt_tolerance: f64,
    ) -> Option<&XcmsPeak> {
        nearest_feature(&self.peaks, mz, rt, mz_tolerance, rt_tolerance)
            .map(|(idx, _)| &self.peaks[idx])
    }
}

/// Index and normalized distance of the closest feature within tolerance
pub(crate) fn nearest_feature(
    peaks: &[XcmsPeak],
    mz: f64,
    rt: f64,
    mz_tolerance: f64,
    rt_tolerance: f64,
) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, peak) in peaks.iter().enumerate() {
        let mz_diff = (peak.mz - mz).abs();
        let rt_diff = (peak.rt - rt).abs();
        if mz_diff > mz_tolerance || rt_diff > rt_tolerance {
            continue;
        }
        let distance = mz_diff / mz_tolerance + rt_diff / rt_tolerance;
        if best.map_or(true, |(_, d)| distance < d) {
            best = Some((idx, distance));
        }
    }
    best
}

fn is_feature_column(header: &str) -> bool {
    header.is_empty()
        || header == "."
        || header.starts_with("Unnamed")
        || FEATURE_COLUMNS.iter().any(|c| header.eq_ignore_ascii_case(c))
}

/// Numeric cell; `NA` and empty cells are absent
fn parse_number(value: &str) -> Option<f64> {
    let value = value.trim().trim_matches('"');
    if value.is_empty() || value.eq_ignore_ascii_case("na") || value.eq_ignore_ascii_case("nan") {
        return None;
    }
    value.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn sniff_delimiter(content: &[u8]) -> u8 {
    let header = content.split(|&b| b == b'\n').next().unwrap_or(&[]);
    let commas = header.iter().filter(|&&b| b == b',').count();
    let tabs = header.iter().filter(|&&b| b == b'\t').count();
    if tabs > commas {
        b'\t'
    } else {
        b','
    }
}

/// Load `sample.info.csv` as a map from sample name to group
pub fn load_sample_info<P: AsRef<Path>>(path: P) -> Result<BTreeMap<String, String>, XcmsError> {
    sample_info_from_reader(File::open(path)?)
}

/// Parse sample info (`sample.name`, `group`) from any reader
pub fn sample_info_from_reader<R: Read>(
    reader: R,
) -> Result<BTreeMap<String, String>, XcmsError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);

    let headers: Vec<String> = csv_reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_lowercase())
        .collect();

    let name_col = headers
        .iter()
        .position(|h| h == "sample.name")
        .ok_or_else(|| XcmsError::MissingColumn("sample.name".to_string()))?;
    let group_col = headers
        .iter()
        .position(|h| h == "group")
        .ok_or_else(|| XcmsError::MissingColumn("group".to_string()))?;

    let mut info = BTreeMap::new();
    for record in csv_reader.records() {
        let record = record?;
        let name = record.get(name_col).unwrap_or("").trim().to_string();
        let group = record.get(group_col).unwrap_or("").trim().to_string();
        info.insert(name, group);
    }
    Ok(info)
}
