//! # Results Processor
//!
//! Joins [`MatchResult`]s with XCMS feature metadata, computes a per-feature
//! confidence and summary statistics, and exports the result set as CSV or
//! JSON.
//!
//! ## Confidence
//!
//! ```text
//! base = best.score                  (model scores: 0.5 * (score + similarity))
//! if matches > 1: base += min(0.2, (mean(top 3 scores) - base) * 0.5)
//! base *= 0.5 + 0.5 * matched_peaks / total_peaks
//! confidence = clamp(base, 0, 1)     (no best match: 0)
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::matching::{Algorithm, FallbackNotice, MatchResult, SpectrumMatch};
use crate::xcms::{PeakTable, XcmsPeak};

mod error;
mod export;

#[cfg(test)]
mod tests;

pub use error::ExportError;
pub use export::CSV_HEADER;

/// Confidence at or above which a feature counts as high-confidence
pub const HIGH_CONFIDENCE_THRESHOLD: f64 = 0.7;

/// m/z window for joining results to features when names differ
pub const JOIN_MZ_TOLERANCE: f64 = 0.01;

/// RT window in seconds for joining results to features
pub const JOIN_RT_TOLERANCE: f64 = 30.0;

/// One feature with its matches and XCMS metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedResult {
    /// XCMS feature name
    pub feature_name: String,
    /// Peak table row for the feature, when it could be joined
    pub xcms_peak: Option<XcmsPeak>,
    /// Query precursor m/z
    pub precursor_mz: f64,
    /// Query retention time in seconds
    pub rt: f64,
    /// Algorithm used
    pub algorithm: Algorithm,
    /// Ranked candidates
    pub matches: Vec<SpectrumMatch>,
    /// Top candidate
    pub best_match: Option<SpectrumMatch>,
    /// Number of candidates
    pub n_matches: usize,
    /// Confidence in [0, 1] derived from the candidates
    pub confidence: f64,
}

/// Per-feature confidence from its ranked matches
pub fn confidence(matches: &[SpectrumMatch]) -> f64 {
    let Some(best) = matches.first() else {
        return 0.0;
    };

    let mut base = match best.similarity {
        Some(similarity) if best.algorithm == Algorithm::MlAssisted => {
            0.5 * (best.score + similarity)
        }
        _ => best.score,
    };

    if matches.len() > 1 {
        let top: Vec<f64> = matches.iter().take(3).map(|m| m.score).collect();
        let mean = top.iter().sum::<f64>() / top.len() as f64;
        base += ((mean - base) * 0.5).min(0.2);
    }

    let peak_fraction = if best.total_peaks > 0 {
        best.matched_peaks as f64 / best.total_peaks as f64
    } else {
        0.0
    };
    base *= 0.5 + 0.5 * peak_fraction;

    if base.is_finite() {
        base.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Merge match results with the feature table.
///
/// A result joins the feature of the same name, else the nearest feature
/// within [`JOIN_MZ_TOLERANCE`] and [`JOIN_RT_TOLERANCE`].
pub fn process_results(results: &[MatchResult], table: Option<&PeakTable>) -> Vec<ProcessedResult> {
    results
        .iter()
        .map(|result| {
            let xcms_peak = table.and_then(|t| {
                t.get_peak(&result.feature_name).or_else(|| {
                    t.find_by_mz_rt(result.mz, result.rt, JOIN_MZ_TOLERANCE, JOIN_RT_TOLERANCE)
                })
            });
            ProcessedResult {
                feature_name: result.feature_name.clone(),
                xcms_peak: xcms_peak.cloned(),
                precursor_mz: result.mz,
                rt: result.rt,
                algorithm: result.algorithm,
                n_matches: result.matches.len(),
                confidence: confidence(&result.matches),
                best_match: result.best_match.clone(),
                matches: result.matches.clone(),
            }
        })
        .collect()
}

/// Aggregate numbers over a result set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryStatistics {
    /// Features in the result set
    pub total_features: usize,
    /// Features with at least one match
    pub matched_features: usize,
    /// `matched_features / total_features`
    pub match_rate: f64,
    /// Features at or above the high-confidence threshold
    pub high_confidence: usize,
    /// Mean confidence over matched features
    pub mean_confidence: f64,
    /// Best-match count per algorithm
    pub algorithms: BTreeMap<String, usize>,
}

impl SummaryStatistics {
    /// Compute the summary over processed results
    pub fn from_results(results: &[ProcessedResult]) -> Self {
        let matched: Vec<&ProcessedResult> =
            results.iter().filter(|r| r.best_match.is_some()).collect();

        let mut algorithms = BTreeMap::new();
        for best in matched.iter().filter_map(|r| r.best_match.as_ref()) {
            *algorithms.entry(best.algorithm.to_string()).or_insert(0) += 1;
        }

        let total_features = results.len();
        let matched_features = matched.len();
        Self {
            total_features,
            matched_features,
            match_rate: if total_features > 0 {
                matched_features as f64 / total_features as f64
            } else {
                0.0
            },
            high_confidence: results
                .iter()
                .filter(|r| r.confidence >= HIGH_CONFIDENCE_THRESHOLD)
                .count(),
            mean_confidence: if matched_features > 0 {
                matched.iter().map(|r| r.confidence).sum::<f64>() / matched_features as f64
            } else {
                0.0
            },
            algorithms,
        }
    }
}

/// A complete, exportable matching run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    /// Job that produced the results
    pub job_id: Uuid,
    /// Creation time
    pub generated_at: DateTime<Utc>,
    /// Algorithm used
    pub algorithm: Algorithm,
    /// Set when the requested model fell back to cosine
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackNotice>,
    /// One entry per feature
    pub results: Vec<ProcessedResult>,
    /// Aggregates over `results`
    pub summary: SummaryStatistics,
}

impl ResultSet {
    /// Result set with a freshly computed summary
    pub fn new(
        job_id: Uuid,
        algorithm: Algorithm,
        fallback: Option<FallbackNotice>,
        results: Vec<ProcessedResult>,
    ) -> Self {
        let summary = SummaryStatistics::from_results(&results);
        Self {
            job_id,
            generated_at: Utc::now(),
            algorithm,
            fallback,
            results,
            summary,
        }
    }

    /// Number of features
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Whether there are no features
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}
