/// Errors that can occur while exporting or reloading results
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// I/O error during file operations
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// CSV writer error
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}
