//! # Spectral Matching Engine
//!
//! Scores query spectra against a spectral library and ranks the candidates.
//!
//! ## Algorithms
//!
//! | Algorithm | Weights | Alignment |
//! |-----------|---------|-----------|
//! | `cosine` | raw intensity | direct m/z pairs |
//! | `dot_product` | √intensity | direct m/z pairs |
//! | `modified_cosine` | raw intensity | direct + precursor-shifted pairs |
//! | `ml_assisted` | model confidence over similarity features | cosine alignment |
//!
//! `ml_assisted` (alias `ms2query`) requires a [`SpectrumModel`]. When none can
//! be loaded the request is served with `cosine` and a [`FallbackNotice`]
//! tells the caller what happened.
//!
//! ## Ranking
//!
//! Candidates are sorted by descending score with a stable sort, so equal
//! scores keep library load order. Entries below `min_score` are dropped and
//! the list is truncated to `top_n`.
//!
//! ```rust
//! use ms2match::library::Library;
//! use ms2match::matching::{match_spectrum, Algorithm, MatchingParams, MatchingStrategy};
//! use ms2match::spectrum::Spectrum;
//!
//! let query = Spectrum::new(vec![100.0, 150.0, 200.0], vec![1000.0, 500.0, 200.0])?;
//! let library = Library::from_spectra(vec![query.clone()]);
//!
//! let params = MatchingParams::new(Algorithm::Cosine);
//! let strategy = MatchingStrategy::Algorithmic(Algorithm::Cosine);
//! let matches = match_spectrum(&query, library.entries(), &params, &strategy)?;
//!
//! assert_eq!(matches[0].score, 1.0);
//! assert_eq!(matches[0].matched_peaks, 3);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

mod batch;
mod engine;
mod error;
pub mod ml;
pub mod similarity;

#[cfg(test)]
mod tests;

pub use batch::{match_batch, BatchOptions, MatchResult};
pub use engine::{match_spectrum, score_pair};
pub use error::{MatchingError, ModelError};
pub use ml::{FallbackNotice, LogisticModel, MatchingStrategy, PairFeatures, SpectrumModel};
pub use similarity::Alignment;

/// Maximum accepted `top_n`
pub const MAX_TOP_N: usize = 100;

/// Spectral similarity algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    /// Dot product on square-root scaled intensities
    DotProduct,
    /// Cosine on raw intensities
    Cosine,
    /// Cosine that also pairs precursor-shifted fragments
    ModifiedCosine,
    /// Pretrained model over similarity features, falling back to cosine
    #[serde(alias = "ms2query")]
    MlAssisted,
}

impl Algorithm {
    /// Every algorithm, in display order
    pub const ALL: [Algorithm; 4] = [
        Algorithm::DotProduct,
        Algorithm::Cosine,
        Algorithm::ModifiedCosine,
        Algorithm::MlAssisted,
    ];

    /// Name used in configs, APIs and exports
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::DotProduct => "dot_product",
            Algorithm::Cosine => "cosine",
            Algorithm::ModifiedCosine => "modified_cosine",
            Algorithm::MlAssisted => "ml_assisted",
        }
    }
}

impl Default for Algorithm {
    fn default() -> Self {
        Algorithm::MlAssisted
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = MatchingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "dot_product" | "dotproduct" => Ok(Algorithm::DotProduct),
            "cosine" => Ok(Algorithm::Cosine),
            "modified_cosine" => Ok(Algorithm::ModifiedCosine),
            "ml_assisted" | "ms2query" => Ok(Algorithm::MlAssisted),
            _ => Err(MatchingError::UnknownAlgorithm(s.to_string())),
        }
    }
}

/// m/z tolerance for pairing peaks
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tolerance {
    /// Absolute, in Dalton
    Da(f64),
    /// Relative, in parts per million of the larger m/z
    Ppm(f64),
}

impl Default for Tolerance {
    fn default() -> Self {
        Tolerance::Da(0.01)
    }
}

impl Tolerance {
    /// Numeric tolerance, in its own unit
    pub fn value(&self) -> f64 {
        match *self {
            Tolerance::Da(v) | Tolerance::Ppm(v) => v,
        }
    }

    /// Absolute window in Dalton at the given m/z
    pub fn window(&self, mz: f64) -> f64 {
        match *self {
            Tolerance::Da(da) => da,
            Tolerance::Ppm(ppm) => ppm * 1e-6 * mz.abs(),
        }
    }

    /// Whether two m/z values agree within this tolerance
    pub fn matches(&self, a: f64, b: f64) -> bool {
        (a - b).abs() <= self.window(a.max(b))
    }

    /// Reject non-positive or non-finite tolerances
    pub fn validate(&self) -> Result<(), MatchingError> {
        let v = self.value();
        if !v.is_finite() || v <= 0.0 {
            return Err(MatchingError::InvalidTolerance(format!(
                "tolerance must be a positive finite number, got {}",
                v
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Tolerance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tolerance::Da(v) => write!(f, "{} Da", v),
            Tolerance::Ppm(v) => write!(f, "{} ppm", v),
        }
    }
}

/// Validated engine parameters for one request
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchingParams {
    /// Scoring algorithm
    pub algorithm: Algorithm,
    /// Peak pairing tolerance
    pub tolerance: Tolerance,
    /// Minimum score to keep a candidate
    pub min_score: f64,
    /// Maximum candidates kept per query
    pub top_n: usize,
}

impl MatchingParams {
    /// Defaults: 0.01 Da, no score floor, top 10
    pub fn new(algorithm: Algorithm) -> Self {
        Self {
            algorithm,
            tolerance: Tolerance::default(),
            min_score: 0.0,
            top_n: 10,
        }
    }

    /// Set the peak pairing tolerance
    pub fn with_tolerance(mut self, tolerance: Tolerance) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Set the score floor
    pub fn with_min_score(mut self, min_score: f64) -> Self {
        self.min_score = min_score;
        self
    }

    /// Set the candidate cap
    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n;
        self
    }

    /// Reject out-of-range tolerance, score floor or candidate cap
    pub fn validate(&self) -> Result<(), MatchingError> {
        self.tolerance.validate()?;
        if !(0.0..=1.0).contains(&self.min_score) {
            return Err(MatchingError::InvalidMinScore(self.min_score));
        }
        if self.top_n == 0 {
            return Err(MatchingError::InvalidTopN("top_n must be at least 1".into()));
        }
        Ok(())
    }
}

/// Unit of `MatchingConfig::mz_tolerance`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToleranceUnit {
    /// Dalton
    #[default]
    Da,
    /// Parts per million
    Ppm,
}

/// User-facing matching configuration (API bodies, TOML `[matching]`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Scoring algorithm
    pub algorithm: Algorithm,
    /// Fragment m/z tolerance, in `tolerance_unit`
    pub mz_tolerance: f64,
    /// Unit of `mz_tolerance`
    pub tolerance_unit: ToleranceUnit,
    /// Retention time tolerance in seconds, used when joining results to features
    pub rt_tolerance: f64,
    /// Minimum score to keep a candidate
    pub min_score: f64,
    /// Maximum candidates kept per query
    pub top_n: usize,
    /// JSON model file for `ml_assisted`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_path: Option<PathBuf>,
    /// Worker threads for batch matching (all cores when unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threads: Option<usize>,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::MlAssisted,
            mz_tolerance: 0.01,
            tolerance_unit: ToleranceUnit::Da,
            rt_tolerance: 30.0,
            min_score: 0.0,
            top_n: 10,
            model_path: None,
            threads: None,
        }
    }
}

impl MatchingConfig {
    /// Tolerance in its typed form
    pub fn tolerance(&self) -> Tolerance {
        match self.tolerance_unit {
            ToleranceUnit::Da => Tolerance::Da(self.mz_tolerance),
            ToleranceUnit::Ppm => Tolerance::Ppm(self.mz_tolerance),
        }
    }

    /// Engine parameters; call [`validate`](Self::validate) first
    pub fn params(&self) -> MatchingParams {
        MatchingParams {
            algorithm: self.algorithm,
            tolerance: self.tolerance(),
            min_score: self.min_score,
            top_n: self.top_n,
        }
    }

    /// Enforce the accepted configuration ranges
    pub fn validate(&self) -> Result<(), MatchingError> {
        let (min, max) = match self.tolerance_unit {
            ToleranceUnit::Da => (0.001, 1.0),
            ToleranceUnit::Ppm => (1.0, 100.0),
        };
        if !(min..=max).contains(&self.mz_tolerance) {
            return Err(MatchingError::InvalidTolerance(format!(
                "mz_tolerance must be between {} and {} {:?}, got {}",
                min, max, self.tolerance_unit, self.mz_tolerance
            )));
        }
        if !(1.0..=300.0).contains(&self.rt_tolerance) {
            return Err(MatchingError::InvalidParameter(format!(
                "rt_tolerance must be between 1 and 300 seconds, got {}",
                self.rt_tolerance
            )));
        }
        if !(1..=MAX_TOP_N).contains(&self.top_n) {
            return Err(MatchingError::InvalidTopN(format!(
                "top_n must be between 1 and {}, got {}",
                MAX_TOP_N, self.top_n
            )));
        }
        if self.threads == Some(0) {
            return Err(MatchingError::InvalidParameter(
                "threads must be at least 1".into(),
            ));
        }
        self.params().validate()
    }
}

/// Library-side metadata carried on a match
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchMetadata {
    /// Library precursor m/z
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precursor_mz: Option<f64>,
    /// Library retention time in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention_time: Option<f64>,
    /// SMILES string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smiles: Option<String>,
    /// InChI string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inchi: Option<String>,
    /// InChIKey
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inchikey: Option<String>,
}

/// One ranked library candidate for a query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectrumMatch {
    /// Record identifier, `lib_<index>` when absent
    pub library_id: String,
    /// Position of the entry in the library
    pub library_index: usize,
    /// Compound name from the record
    pub compound_name: Option<String>,
    /// Ranking score in [0, 1]; model confidence for `ml_assisted`
    pub score: f64,
    /// Algorithm that produced `score`
    pub algorithm: Algorithm,
    /// Peak pairs used by the alignment
    pub matched_peaks: usize,
    /// Peaks in the query spectrum
    pub total_peaks: usize,
    /// Peaks in the library spectrum
    pub library_peaks: usize,
    /// Cosine similarity backing a model score
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f64>,
    /// Precursor differs from the query beyond tolerance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_analog: Option<bool>,
    /// Metadata copied from the library record
    #[serde(default)]
    pub metadata: MatchMetadata,
}
