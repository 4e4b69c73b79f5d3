//! Model-assisted scoring.
//!
//! A [`SpectrumModel`] turns pairwise similarity features into a match
//! confidence. The bundled [`LogisticModel`] is read from a JSON file:
//!
//! ```json
//! {
//!   "name": "logistic-v1",
//!   "intercept": -4.0,
//!   "weights": {
//!     "cosine": 5.0,
//!     "modified_cosine": 2.5,
//!     "matched_fraction": 1.5,
//!     "precursor_mz_error": -0.2
//!   },
//!   "max_precursor_error": 50.0
//! }
//! ```
//!
//! Strategy resolution happens once per request with
//! [`MatchingStrategy::resolve`]; an unusable model downgrades the request to
//! cosine and produces a [`FallbackNotice`].

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use super::{Algorithm, ModelError};

/// Similarity features of one query/library pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PairFeatures {
    /// Cosine similarity
    pub cosine: f64,
    /// Modified cosine similarity
    pub modified_cosine: f64,
    /// Matched peaks over query peaks
    pub matched_fraction: f64,
    /// Absolute precursor m/z difference, when both precursors are known
    pub precursor_mz_error: Option<f64>,
}

/// A pretrained pairwise scoring model
pub trait SpectrumModel: Send + Sync {
    /// Model name for logs and fallback notices
    fn name(&self) -> &str;

    /// Confidence in [0, 1] that the pair is the same compound
    fn confidence(&self, features: &PairFeatures) -> f64;
}

const FEATURE_NAMES: [&str; 4] = [
    "cosine",
    "modified_cosine",
    "matched_fraction",
    "precursor_mz_error",
];

fn default_max_precursor_error() -> f64 {
    50.0
}

fn default_model_name() -> String {
    "logistic".to_string()
}

/// Logistic regression over [`PairFeatures`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticModel {
    /// Model name
    #[serde(default = "default_model_name")]
    pub name: String,
    /// Bias term
    pub intercept: f64,
    /// Weight per feature name
    pub weights: BTreeMap<String, f64>,
    /// Precursor error cap; also used when the error is unknown
    #[serde(default = "default_max_precursor_error")]
    pub max_precursor_error: f64,
}

impl LogisticModel {
    /// Load and validate a model file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ModelError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_json(&content)
    }

    /// Parse and validate a model document
    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        let model: Self = serde_json::from_str(json)?;
        model.validate()?;
        Ok(model)
    }

    /// Reject unknown feature names and non-finite numbers
    pub fn validate(&self) -> Result<(), ModelError> {
        if !self.intercept.is_finite() {
            return Err(ModelError::Invalid("intercept must be finite".into()));
        }
        if !self.max_precursor_error.is_finite() || self.max_precursor_error <= 0.0 {
            return Err(ModelError::Invalid(
                "max_precursor_error must be positive".into(),
            ));
        }
        if self.weights.is_empty() {
            return Err(ModelError::Invalid("model has no weights".into()));
        }
        for (key, weight) in &self.weights {
            if !FEATURE_NAMES.contains(&key.as_str()) {
                return Err(ModelError::Invalid(format!("unknown feature '{}'", key)));
            }
            if !weight.is_finite() {
                return Err(ModelError::Invalid(format!(
                    "weight for '{}' is not finite",
                    key
                )));
            }
        }
        Ok(())
    }

    fn weight(&self, feature: &str) -> f64 {
        self.weights.get(feature).copied().unwrap_or(0.0)
    }
}

impl SpectrumModel for LogisticModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn confidence(&self, features: &PairFeatures) -> f64 {
        let precursor_error = features
            .precursor_mz_error
            .unwrap_or(self.max_precursor_error)
            .min(self.max_precursor_error);

        let z = self.intercept
            + self.weight("cosine") * features.cosine
            + self.weight("modified_cosine") * features.modified_cosine
            + self.weight("matched_fraction") * features.matched_fraction
            + self.weight("precursor_mz_error") * precursor_error;

        1.0 / (1.0 + (-z).exp())
    }
}

/// Reported when `ml_assisted` was requested but cosine was used instead
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackNotice {
    /// Algorithm the caller asked for
    pub requested: Algorithm,
    /// Algorithm used instead
    pub used: Algorithm,
    /// Why the model could not be used
    pub reason: String,
}

impl fmt::Display for FallbackNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} unavailable ({}), using {}",
            self.requested, self.reason, self.used
        )
    }
}

/// How a request scores candidates
#[derive(Clone)]
pub enum MatchingStrategy {
    /// Plain similarity score
    Algorithmic(Algorithm),
    /// Model confidence over similarity features
    Model(Arc<dyn SpectrumModel>),
}

impl fmt::Debug for MatchingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchingStrategy::Algorithmic(a) => f.debug_tuple("Algorithmic").field(a).finish(),
            MatchingStrategy::Model(m) => f.debug_tuple("Model").field(&m.name()).finish(),
        }
    }
}

impl MatchingStrategy {
    /// Resolve the strategy for `algorithm`, loading a logistic model from
    /// `model_path` when `ml_assisted` is requested.
    pub fn resolve(
        algorithm: Algorithm,
        model_path: Option<&Path>,
    ) -> (Self, Option<FallbackNotice>) {
        Self::resolve_with(algorithm, || {
            let path = model_path.ok_or(ModelError::NotConfigured)?;
            let model = LogisticModel::from_file(path)?;
            info!("Loaded scoring model '{}' from {}", model.name, path.display());
            Ok(Arc::new(model) as Arc<dyn SpectrumModel>)
        })
    }

    /// Like [`resolve`](Self::resolve) with a caller-supplied model loader
    pub fn resolve_with<F>(algorithm: Algorithm, load: F) -> (Self, Option<FallbackNotice>)
    where
        F: FnOnce() -> Result<Arc<dyn SpectrumModel>, ModelError>,
    {
        if algorithm != Algorithm::MlAssisted {
            return (MatchingStrategy::Algorithmic(algorithm), None);
        }

        match load() {
            Ok(model) => (MatchingStrategy::Model(model), None),
            Err(err) => {
                let notice = FallbackNotice {
                    requested: Algorithm::MlAssisted,
                    used: Algorithm::Cosine,
                    reason: err.to_string(),
                };
                warn!("{}", notice);
                (MatchingStrategy::Algorithmic(Algorithm::Cosine), Some(notice))
            }
        }
    }

    /// Algorithm reported on the produced matches
    pub fn algorithm(&self) -> Algorithm {
        match self {
            MatchingStrategy::Algorithmic(a) => Self::effective(*a),
            MatchingStrategy::Model(_) => Algorithm::MlAssisted,
        }
    }

    /// Without a model, `ml_assisted` is scored as cosine
    pub(crate) fn effective(algorithm: Algorithm) -> Algorithm {
        match algorithm {
            Algorithm::MlAssisted => Algorithm::Cosine,
            other => other,
        }
    }
}
