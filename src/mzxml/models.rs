use crate::spectrum::{Spectrum, SpectrumError, SpectrumMetadata};

/// One `<scan>` element from an mzXML run
#[derive(Debug, Clone, Default)]
pub struct MzXmlScan {
    /// Position of the scan in emission order
    pub index: usize,

    /// Scan number (`num` attribute)
    pub num: i64,

    /// MS level (1 = survey, 2 = fragment, ...)
    pub ms_level: u8,

    /// Retention time in seconds
    pub retention_time: Option<f64>,

    /// Polarity as written in the file ("+" or "-")
    pub polarity: Option<String>,

    /// Precursor m/z (text of `<precursorMz>`)
    pub precursor_mz: Option<f64>,

    /// Precursor intensity attribute
    pub precursor_intensity: Option<f64>,

    /// Precursor charge attribute
    pub precursor_charge: Option<i32>,

    /// Declared number of peaks
    pub peaks_count: Option<usize>,

    /// Fragment m/z values
    pub mz: Vec<f64>,

    /// Fragment intensities
    pub intensities: Vec<f64>,
}

impl MzXmlScan {
    /// Whether this is a fragment scan
    pub fn is_ms2(&self) -> bool {
        self.ms_level == 2
    }

    /// Convert into a validated [`Spectrum`] carrying precursor and RT metadata
    pub fn to_spectrum(&self) -> Result<Spectrum, SpectrumError> {
        let metadata = SpectrumMetadata {
            id: Some(format!("scan={}", self.num)),
            precursor_mz: self.precursor_mz,
            retention_time: self.retention_time,
            charge: self.precursor_charge,
            ..Default::default()
        };

        Ok(Spectrum::new(self.mz.clone(), self.intensities.clone())?.with_metadata(metadata))
    }
}

/// Parse an `xs:duration` retention time (e.g. `PT123.45S`, `PT2M3.5S`) into seconds.
///
/// Bare numbers are accepted and interpreted as seconds.
pub fn parse_duration_seconds(value: &str) -> Option<f64> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<f64>() {
        return Some(seconds);
    }

    let rest = value.strip_prefix("PT").or_else(|| value.strip_prefix("-PT"))?;
    let negative = value.starts_with('-');

    let mut total = 0.0;
    let mut number = String::new();
    for c in rest.chars() {
        match c {
            'H' | 'M' | 'S' => {
                let amount: f64 = number.parse().ok()?;
                total += match c {
                    'H' => amount * 3600.0,
                    'M' => amount * 60.0,
                    _ => amount,
                };
                number.clear();
            }
            _ => number.push(c),
        }
    }

    if !number.is_empty() {
        return None;
    }

    Some(if negative { -total } else { total })
}
