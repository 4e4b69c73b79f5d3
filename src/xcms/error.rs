/// Errors that can occur while reading XCMS output tables
#[derive(Debug, thiserror::Error)]
pub enum XcmsError {
    /// I/O error during file operations
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Malformed CSV
    #[error("CSV parsing error: {0}")]
    CsvError(#[from] csv::Error),

    /// A required column is absent from the header
    #[error("Missing required column: {0}")]
    MissingColumn(String),

    /// A required numeric cell could not be parsed
    #[error("Invalid value '{value}' for column '{column}' in row {row}")]
    InvalidValue {
        /// 1-based data row
        row: usize,
        /// Column name
        column: String,
        /// Offending cell
        value: String,
    },
}

/// Errors from running XCMS peak detection through R
#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    /// Parameter outside its accepted range
    #[error("Invalid XCMS parameter: {0}")]
    InvalidParameter(String),

    /// An input mzXML file does not exist
    #[error("Input file not found: {0}")]
    MissingInput(String),

    /// `Rscript` or the xcms package is not installed
    #[error("No XCMS implementation available: {0}")]
    Unavailable(String),

    /// The R process ran longer than the configured limit
    #[error("XCMS processing timed out after {0} seconds")]
    Timeout(u64),

    /// Processing was cancelled by the caller
    #[error("XCMS processing was cancelled")]
    Cancelled,

    /// R exited with a non-zero status
    #[error("XCMS processing failed: {0}")]
    Failed(String),

    /// The run succeeded but produced no peak table
    #[error("Peak table file not generated")]
    MissingOutput,

    /// I/O error during file operations
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
