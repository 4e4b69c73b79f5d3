use crate::mzxml::MzXmlError;
use crate::xcms::XcmsError;

/// Errors that can occur during MS2 extraction
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    /// Tolerance or threshold outside its accepted range
    #[error("Invalid extraction parameter: {0}")]
    InvalidParameter(String),

    /// Error reading the mzXML run
    #[error("mzXML error: {0}")]
    MzXmlError(#[from] MzXmlError),

    /// Error reading the XCMS peak table
    #[error("XCMS peak table error: {0}")]
    XcmsError(#[from] XcmsError),
}
