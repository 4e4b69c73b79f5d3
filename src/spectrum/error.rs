/// Errors that can occur while constructing a spectrum
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SpectrumError {
    /// m/z and intensity arrays differ in length
    #[error("Array length mismatch: {mz} m/z values, {intensities} intensities")]
    LengthMismatch {
        /// Number of m/z values
        mz: usize,
        /// Number of intensities
        intensities: usize,
    },

    /// An m/z value is NaN or infinite
    #[error("Non-finite m/z value at index {0}")]
    NonFiniteMz(usize),

    /// An intensity is NaN, infinite or negative
    #[error("Invalid intensity {value} at index {index}")]
    InvalidIntensity {
        /// Index of the offending peak
        index: usize,
        /// The invalid intensity value
        value: f64,
    },
}
