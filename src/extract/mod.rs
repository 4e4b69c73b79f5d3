//! # MS2 Extraction
//!
//! Associates fragment scans from an mzXML run with XCMS features and yields
//! at most one query spectrum per feature.
//!
//! ## Selection policy
//!
//! 1. Fragment peaks below `min_intensity` are removed first. A scan without a
//!    precursor m/z, without a retention time, or with no peaks left is never
//!    considered.
//! 2. Each remaining scan is assigned to the single feature minimising
//!    `|Δmz|/mz_tolerance + |Δrt|/rt_tolerance` among features inside both
//!    tolerances. Equal distances go to the earlier feature in the table.
//! 3. Per feature, the assigned scan with the smallest RT difference wins,
//!    then the one with the higher filtered total intensity, then the earlier
//!    scan.
//!
//! Output follows feature table order. Features without a qualifying scan are
//! simply absent.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::mzxml::{MzXmlError, MzXmlScan, MzXmlStreamer};
use crate::spectrum::Spectrum;
use crate::xcms::{nearest_feature, PeakTable};

mod error;


pub use error::ExtractionError;

/// MS2 extraction parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Ms2ExtractionConfig {
    /// Precursor m/z tolerance in Da
    pub mz_tolerance: f64,
    /// Retention time tolerance in seconds
    pub rt_tolerance: f64,
    /// Fragment peaks below this intensity are discarded
    pub min_intensity: f64,
}

impl Default for Ms2ExtractionConfig {
    fn default() -> Self {
        Self {
            mz_tolerance: 0.01,
            rt_tolerance: 30.0,
            min_intensity: 100.0,
        }
    }
}

impl Ms2ExtractionConfig {
    /// Check tolerances and the intensity floor
    pub fn validate(&self) -> Result<(), ExtractionError> {
        if !(0.001..=1.0).contains(&self.mz_tolerance) {
            return Err(ExtractionError::InvalidParameter(format!(
                "mz_tolerance must be between 0.001 and 1.0 Da, got {}",
                self.mz_tolerance
            )));
        }
        if !(1.0..=300.0).contains(&self.rt_tolerance) {
            return Err(ExtractionError::InvalidParameter(format!(
                "rt_tolerance must be between 1 and 300 seconds, got {}",
                self.rt_tolerance
            )));
        }
        if !self.min_intensity.is_finite() || self.min_intensity < 0.0 {
            return Err(ExtractionError::InvalidParameter(format!(
                "min_intensity must be a non-negative number, got {}",
                self.min_intensity
            )));
        }
        Ok(())
    }
}

/// A fragment spectrum selected for one XCMS feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySpectrum {
    /// Name of the XCMS feature this spectrum was assigned to
    pub feature_name: String,
    /// Scan number in the mzXML run
    pub scan: i64,
    /// Precursor m/z of the selected scan
    pub precursor_mz: f64,
    /// Retention time in seconds
    pub rt: f64,
    /// Intensity-filtered fragment peaks
    pub spectrum: Spectrum,
}

impl QuerySpectrum {
    /// Number of fragment peaks
    pub fn n_peaks(&self) -> usize {
        self.spectrum.len()
    }
}

/// Counters describing one extraction run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionStats {
    /// MS2 scans read from the run
    pub ms2_scans: usize,
    /// Scans without a precursor m/z or retention time
    pub missing_precursor: usize,
    /// Scans whose peaks could not form a valid spectrum
    pub invalid_peaks: usize,
    /// Scans with no peaks left after intensity filtering
    pub empty_after_filter: usize,
    /// Scans outside the tolerance of every feature
    pub unassigned: usize,
    /// Scans assigned to some feature
    pub assigned: usize,
    /// Features in the peak table
    pub features_total: usize,
    /// Features that received a query spectrum
    pub features_matched: usize,
}

/// Query spectra in feature order plus run statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// One spectrum per feature that received a scan, in peak table order
    pub spectra: Vec<QuerySpectrum>,
    /// Counters for the run
    pub stats: ExtractionStats,
}

/// Best scan seen so far for one feature
struct Candidate {
    rt_diff: f64,
    total_intensity: f64,
    query: QuerySpectrum,
}

impl Candidate {
    /// Whether `self` should replace `current`; scans arrive in file order so
    /// an exact tie keeps `current`
    fn beats(&self, current: &Candidate) -> bool {
        if self.rt_diff != current.rt_diff {
            return self.rt_diff < current.rt_diff;
        }
        self.total_intensity > current.total_intensity
    }
}

/// Extract one query spectrum per feature from an mzXML file
pub fn extract_ms2_spectra<P: AsRef<Path>>(
    mzxml_path: P,
    table: &PeakTable,
    config: &Ms2ExtractionConfig,
) -> Result<ExtractionResult, ExtractionError> {
    config.validate()?;
    let streamer = MzXmlStreamer::from_path(mzxml_path.as_ref())?.with_ms_level(2);
    extract_from_scans(streamer.scans(), table, config)
}

/// Extract from any scan source; non-MS2 scans are ignored
pub fn extract_from_scans<I>(
    scans: I,
    table: &PeakTable,
    config: &Ms2ExtractionConfig,
) -> Result<ExtractionResult, ExtractionError>
where
    I: IntoIterator<Item = Result<MzXmlScan, MzXmlError>>,
{
    config.validate()?;

    let features = table.peaks();
    let mut stats = ExtractionStats {
        features_total: features.len(),
        ..Default::default()
    };
    let mut best: Vec<Option<Candidate>> = features.iter().map(|_| None).collect();

    for scan in scans {
        let scan = scan?;
        if !scan.is_ms2() {
            continue;
        }
        stats.ms2_scans += 1;

        let (Some(precursor_mz), Some(rt)) = (scan.precursor_mz, scan.retention_time) else {
            stats.missing_precursor += 1;
            continue;
        };

        let spectrum = match scan.to_spectrum() {
            Ok(s) => s.filter_min_intensity(config.min_intensity),
            Err(e) => {
                log::debug!("Scan {} has invalid peaks: {}", scan.num, e);
                stats.invalid_peaks += 1;
                continue;
            }
        };
        if spectrum.is_empty() {
            stats.empty_after_filter += 1;
            continue;
        }

        let Some((feature_idx, _)) = nearest_feature(
            features,
            precursor_mz,
            rt,
            config.mz_tolerance,
            config.rt_tolerance,
        ) else {
            stats.unassigned += 1;
            continue;
        };
        stats.assigned += 1;

        let feature = &features[feature_idx];
        let mut spectrum = spectrum;
        spectrum
            .metadata_mut()
            .extra
            .insert("feature_name".to_string(), feature.name.clone());

        let candidate = Candidate {
            rt_diff: (feature.rt - rt).abs(),
            total_intensity: spectrum.total_intensity(),
            query: QuerySpectrum {
                feature_name: feature.name.clone(),
                scan: scan.num,
                precursor_mz,
                rt,
                spectrum,
            },
        };

        let slot = &mut best[feature_idx];
        if slot.as_ref().map_or(true, |current| candidate.beats(current)) {
            *slot = Some(candidate);
        }
    }

    let spectra: Vec<QuerySpectrum> = best.into_iter().flatten().map(|c| c.query).collect();
    stats.features_matched = spectra.len();

    log::info!(
        "Extracted {} MS2 spectra for {} features ({} MS2 scans, {} assigned, {} unassigned, {} without precursor, {} empty after filter)",
        spectra.len(),
        stats.features_total,
        stats.ms2_scans,
        stats.assigned,
        stats.unassigned,
        stats.missing_precursor,
        stats.empty_after_filter
    );

    Ok(ExtractionResult { spectra, stats })
}
