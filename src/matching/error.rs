/// Errors that can occur during spectral matching
#[derive(Debug, thiserror::Error)]
pub enum MatchingError {
    /// m/z tolerance is zero, negative or not a number
    #[error("Invalid m/z tolerance: {0}")]
    InvalidTolerance(String),

    /// Minimum score outside [0, 1]
    #[error("min_score must be within [0, 1], got {0}")]
    InvalidMinScore(f64),

    /// top_n is zero or above the accepted maximum
    #[error("Invalid top_n: {0}")]
    InvalidTopN(String),

    /// Any other out-of-range configuration value
    #[error("Invalid matching parameter: {0}")]
    InvalidParameter(String),

    /// Unknown algorithm name
    #[error("Unknown matching algorithm '{0}'")]
    UnknownAlgorithm(String),

    /// Worker pool could not be created
    #[error("Failed to build worker pool: {0}")]
    ThreadPool(String),
}

/// Errors that can occur while loading a scoring model
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// I/O error reading the model file
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Model file is not valid JSON for the expected schema
    #[error("Model JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Model parameters are unusable
    #[error("Invalid model: {0}")]
    Invalid(String),

    /// No model file was configured
    #[error("No model configured")]
    NotConfigured,
}
