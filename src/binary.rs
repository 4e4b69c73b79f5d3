//! Base64 peak array decoding shared by the mzXML reader and the mzML library parser.
//!
//! An [`ArrayLayout`] describes how one array was written: float width,
//! compression, and byte order. mzML arrays are always little-endian; mzXML
//! `<peaks>` default to network (big-endian) order and interleave m/z and
//! intensity.

use std::io::Read;

use base64::prelude::*;
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use flate2::read::ZlibDecoder;

/// Compression of the raw bytes under the Base64 layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    /// No compression
    #[default]
    None,
    /// zlib deflate
    Zlib,
    /// MS-Numpress (any flavour); recognised so it can be rejected cleanly
    Numpress,
}

impl Compression {
    /// mzML compression term, `None` for accessions that are not about compression
    pub fn from_cv_accession(accession: &str) -> Option<Self> {
        match accession {
            "MS:1000574" => Some(Compression::Zlib),
            "MS:1000576" => Some(Compression::None),
            "MS:1002312" | "MS:1002313" | "MS:1002314" => Some(Compression::Numpress),
            _ => None,
        }
    }

    /// mzXML `compressionType` attribute
    pub fn from_mzxml(value: &str) -> Option<Self> {
        match value {
            "zlib" => Some(Compression::Zlib),
            "none" | "" => Some(Compression::None),
            _ => None,
        }
    }
}

/// Width of each stored value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Precision {
    /// 32-bit IEEE float
    F32,
    /// 64-bit IEEE float
    #[default]
    F64,
}

impl Precision {
    /// mzML `32-bit float` / `64-bit float` terms
    pub fn from_cv_accession(accession: &str) -> Option<Self> {
        match accession {
            "MS:1000521" => Some(Precision::F32),
            "MS:1000523" => Some(Precision::F64),
            _ => None,
        }
    }

    /// mzXML `precision` attribute, in bits
    pub fn from_bits(bits: &str) -> Option<Self> {
        match bits {
            "32" => Some(Precision::F32),
            "64" => Some(Precision::F64),
            _ => None,
        }
    }

    fn width(self) -> usize {
        match self {
            Precision::F32 => 4,
            Precision::F64 => 8,
        }
    }
}

/// Byte order of stored values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endian {
    /// Least significant byte first (mzML)
    #[default]
    Little,
    /// mzXML "network" order
    Big,
}

/// Errors decoding a binary peak array
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Text is not valid Base64
    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// zlib stream could not be inflated
    #[error("zlib inflate failed: {0}")]
    Inflate(#[from] std::io::Error),

    /// Byte count does not divide into whole values
    #[error("{bytes} bytes is not a whole number of {width}-byte values")]
    RaggedBytes {
        /// Number of bytes decoded
        bytes: usize,
        /// Width of each value in bytes
        width: usize,
    },

    /// Decoded value count differs from the declared count
    #[error("expected {expected} values, decoded {actual}")]
    CountMismatch {
        /// Declared value count
        expected: usize,
        /// Decoded value count
        actual: usize,
    },

    /// An `m/z-int` array with an unpaired value
    #[error("interleaved m/z-intensity array has odd length {0}")]
    OddPairs(usize),

    /// Compression that cannot be decoded
    #[error("unsupported compression: {0:?}")]
    Unsupported(Compression),
}

/// How one binary array is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArrayLayout {
    /// Float width
    pub precision: Precision,
    /// Compression under the Base64 layer
    pub compression: Compression,
    /// Byte order
    pub endian: Endian,
}

impl ArrayLayout {
    /// Layout of an mzML `<binaryDataArray>`
    pub fn mzml(precision: Precision, compression: Compression) -> Self {
        Self {
            precision,
            compression,
            endian: Endian::Little,
        }
    }

    /// Decode Base64 text into values.
    ///
    /// Whitespace inside the text is ignored; blank text yields an empty array.
    /// When `expected` is given the value count must match it.
    pub fn decode(&self, text: &str, expected: Option<usize>) -> Result<Vec<f64>, DecodeError> {
        let text: String = text.split_ascii_whitespace().collect();
        if text.is_empty() {
            return Ok(Vec::new());
        }

        let raw = BASE64_STANDARD.decode(text.as_bytes())?;
        let bytes = match self.compression {
            Compression::None => raw,
            Compression::Zlib => {
                let mut inflated = Vec::with_capacity(raw.len() * 4);
                ZlibDecoder::new(raw.as_slice()).read_to_end(&mut inflated)?;
                inflated
            }
            Compression::Numpress => return Err(DecodeError::Unsupported(self.compression)),
        };

        let values = self.floats(&bytes)?;
        match expected {
            Some(expected) if expected != values.len() => Err(DecodeError::CountMismatch {
                expected,
                actual: values.len(),
            }),
            _ => Ok(values),
        }
    }

    fn floats(&self, bytes: &[u8]) -> Result<Vec<f64>, DecodeError> {
        let width = self.precision.width();
        if bytes.len() % width != 0 {
            return Err(DecodeError::RaggedBytes {
                bytes: bytes.len(),
                width,
            });
        }

        let count = bytes.len() / width;
        let values = match self.precision {
            Precision::F64 => {
                let mut out = vec![0.0f64; count];
                match self.endian {
                    Endian::Little => LittleEndian::read_f64_into(bytes, &mut out),
                    Endian::Big => BigEndian::read_f64_into(bytes, &mut out),
                }
                out
            }
            Precision::F32 => {
                let mut out = vec![0.0f32; count];
                match self.endian {
                    Endian::Little => LittleEndian::read_f32_into(bytes, &mut out),
                    Endian::Big => BigEndian::read_f32_into(bytes, &mut out),
                }
                out.into_iter().map(f64::from).collect()
            }
        };
        Ok(values)
    }
}

/// Split an interleaved `m/z-int` array into (m/z, intensity)
pub fn split_pairs(values: &[f64]) -> Result<(Vec<f64>, Vec<f64>), DecodeError> {
    if values.len() % 2 != 0 {
        return Err(DecodeError::OddPairs(values.len()));
    }
    Ok(values.chunks_exact(2).map(|p| (p[0], p[1])).unzip())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network_f32(values: &[f32]) -> String {
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_be_bytes()).collect();
        BASE64_STANDARD.encode(bytes)
    }

    #[test]
    fn test_mzml_float64() {
        let text = BASE64_STANDARD.encode(
            [100.0f64, 200.0]
                .iter()
                .flat_map(|v| v.to_le_bytes())
                .collect::<Vec<u8>>(),
        );
        let layout = ArrayLayout::mzml(Precision::F64, Compression::None);
        assert_eq!(layout.decode(&text, Some(2)).unwrap(), vec![100.0, 200.0]);
    }

    #[test]
    fn test_mzxml_peaks() {
        let layout = ArrayLayout {
            precision: Precision::F32,
            compression: Compression::None,
            endian: Endian::Big,
        };
        let values = layout
            .decode(&network_f32(&[75.0, 900.0, 120.5, 400.0]), None)
            .unwrap();
        let (mz, intensity) = split_pairs(&values).unwrap();
        assert_eq!(mz, vec![75.0, 120.5]);
        assert_eq!(intensity, vec![900.0, 400.0]);
    }

    #[test]
    fn test_blank_and_wrapped_text() {
        let layout = ArrayLayout::default();
        assert!(layout.decode(" \n ", None).unwrap().is_empty());

        let values = [1.5f64, 2.5, 3.5, 4.5];
        let encoded = BASE64_STANDARD.encode(
            values
                .iter()
                .flat_map(|v| v.to_le_bytes())
                .collect::<Vec<u8>>(),
        );
        let wrapped = format!("{}\n    {}", &encoded[..12], &encoded[12..]);
        assert_eq!(layout.decode(&wrapped, Some(4)).unwrap(), values);
    }

    #[test]
    fn test_zlib() {
        use flate2::write::ZlibEncoder;
        use std::io::Write;

        let values = [181.07f64, 163.06, 145.05];
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_be_bytes()).collect();
        let mut encoder = ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(&bytes).unwrap();
        let text = BASE64_STANDARD.encode(encoder.finish().unwrap());

        let layout = ArrayLayout {
            precision: Precision::F64,
            compression: Compression::Zlib,
            endian: Endian::Big,
        };
        assert_eq!(layout.decode(&text, None).unwrap(), values);
    }

    #[test]
    fn test_bad_lengths() {
        let layout = ArrayLayout::default();
        let one = BASE64_STANDARD.encode(1.0f64.to_le_bytes());
        assert!(matches!(
            layout.decode(&one, Some(2)),
            Err(DecodeError::CountMismatch {
                expected: 2,
                actual: 1
            })
        ));

        let five_bytes = BASE64_STANDARD.encode([0u8; 5]);
        assert!(matches!(
            layout.decode(&five_bytes, None),
            Err(DecodeError::RaggedBytes { bytes: 5, width: 8 })
        ));

        assert!(matches!(split_pairs(&[1.0]), Err(DecodeError::OddPairs(1))));
    }

    #[test]
    fn test_numpress_rejected() {
        let layout = ArrayLayout::mzml(Precision::F64, Compression::Numpress);
        let text = BASE64_STANDARD.encode([0u8; 8]);
        assert!(matches!(
            layout.decode(&text, None),
            Err(DecodeError::Unsupported(Compression::Numpress))
        ));
        assert_eq!(Compression::from_mzxml("lzma"), None);
        assert_eq!(Precision::from_bits("16"), None);
    }
}
