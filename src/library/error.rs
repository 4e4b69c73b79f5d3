/// Errors that can occur while loading a spectral library
#[derive(Debug, thiserror::Error)]
pub enum LibraryError {
    /// I/O error during file operations
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Top-level JSON document could not be parsed
    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// mzML document is not well-formed XML
    #[error("XML parsing error: {0}")]
    XmlError(#[from] quick_xml::Error),

    /// File extension does not map to a known library format
    #[error("Unsupported library format: {0}")]
    UnsupportedFormat(String),

    /// Parsing finished without a single usable spectrum
    #[error("No valid spectra found ({total} records, {skipped} skipped){}", first_reason(.reasons))]
    NoValidSpectra {
        /// Records seen
        total: usize,
        /// Records rejected
        skipped: usize,
        /// First rejection reasons
        reasons: Vec<String>,
    },
}

fn first_reason(reasons: &[String]) -> String {
    reasons
        .first()
        .map(|r| format!(": {}", r))
        .unwrap_or_default()
}
