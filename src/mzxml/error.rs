/// Errors that can occur during mzXML parsing
#[derive(Debug, thiserror::Error)]
pub enum MzXmlError {
    /// Error parsing XML
    #[error("XML parsing error: {0}")]
    XmlError(#[from] quick_xml::Error),

    /// I/O error during file operations
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Error decoding a peaks element
    #[error("Binary decode error in scan {scan}: {source}")]
    BinaryError {
        /// Scan number
        scan: i64,
        /// Underlying decode failure
        #[source]
        source: crate::binary::DecodeError,
    },

    /// Invalid mzXML document structure
    #[error("Invalid mzXML structure: {0}")]
    InvalidStructure(String),

    /// Invalid value for an XML attribute
    #[error("Invalid attribute value: {0}")]
    InvalidAttributeValue(String),
}
