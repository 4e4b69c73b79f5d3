//! NIST MSP text libraries.
//!
//! ```text
//! Name: Caffeine
//! PrecursorMZ: 195.0877
//! InChIKey: RYYVLZVUVIJVGH-UHFFFAOYSA-N
//! Num Peaks: 3
//! 110.0713 120; 138.0662 999
//! 195.0877 450 "M+H"
//! ```

use std::io::BufRead;

use super::{
    parse_charge, parse_leading_f64, read_lines_lossy, spectrum_from_pairs, LibraryError,
    LoadReport, RecordSink,
};
use crate::spectrum::{Spectrum, SpectrumMetadata};

#[derive(Debug, Default)]
struct MspRecord {
    metadata: SpectrumMetadata,
    declared_peaks: Option<usize>,
    in_peaks: bool,
    peaks: Vec<(f64, f64)>,
    error: Option<String>,
}

impl MspRecord {
    fn apply_field(&mut self, key: &str, value: &str) {
        let value = value.trim();
        let meta = &mut self.metadata;
        match key.trim().to_ascii_lowercase().as_str() {
            "name" => meta.compound_name = Some(value.to_string()),
            "precursormz" | "precursor_mz" | "precursor m/z" => {
                match parse_leading_f64(value) {
                    Some(mz) => meta.precursor_mz = Some(mz),
                    None => self.error = Some(format!("invalid precursor m/z '{}'", value)),
                }
            }
            "retentiontime" | "retention_time" | "rt" => {
                meta.retention_time = parse_leading_f64(value);
            }
            "charge" => meta.charge = parse_charge(value),
            "smiles" => meta.smiles = Some(value.to_string()),
            "inchi" => meta.inchi = Some(value.to_string()),
            "inchikey" => meta.inchikey = Some(value.to_string()),
            "db#" | "id" | "spectrumid" | "spectrum_id" => meta.id = Some(value.to_string()),
            "num peaks" | "num_peaks" => match value.parse::<usize>() {
                Ok(n) => {
                    self.declared_peaks = Some(n);
                    self.in_peaks = true;
                }
                Err(_) => self.error = Some(format!("invalid peak count '{}'", value)),
            },
            other => {
                meta.extra.insert(other.to_string(), value.to_string());
            }
        }
    }

    fn add_peak_line(&mut self, line: &str) {
        for pair in line.split(';') {
            // Annotations are quoted and follow the intensity
            let pair = pair.split('"').next().unwrap_or("").trim();
            if pair.is_empty() {
                continue;
            }
            let mut fields = pair.split_whitespace();
            let parsed = match (fields.next(), fields.next()) {
                (Some(mz), Some(intensity)) => {
                    mz.parse::<f64>().ok().zip(intensity.parse::<f64>().ok())
                }
                _ => None,
            };
            match parsed {
                Some(peak) => self.peaks.push(peak),
                None => {
                    if self.error.is_none() {
                        self.error = Some(format!("invalid peak '{}'", pair));
                    }
                }
            }
        }
    }

    fn finish(self) -> Result<Spectrum, String> {
        if let Some(error) = self.error {
            return Err(error);
        }
        match self.declared_peaks {
            None => return Err("missing 'Num Peaks'".to_string()),
            Some(n) if n != self.peaks.len() => {
                return Err(format!("declared {} peaks, found {}", n, self.peaks.len()))
            }
            _ => {}
        }
        spectrum_from_pairs(self.peaks, self.metadata)
    }
}

pub(super) fn parse<R: BufRead>(reader: R) -> Result<(Vec<Spectrum>, LoadReport), LibraryError> {
    let mut sink = RecordSink::default();
    let mut current: Option<MspRecord> = None;

    for line in read_lines_lossy(reader) {
        let line = line?;
        let trimmed = line.trim();

        if trimmed.is_empty() {
            if let Some(record) = current.take() {
                sink.push(record.finish());
            }
            continue;
        }
        if trimmed.starts_with('#') {
            continue;
        }

        let field = trimmed.split_once(':');
        let starts_record = field
            .map(|(k, _)| k.trim().eq_ignore_ascii_case("name"))
            .unwrap_or(false);

        if starts_record {
            if let Some(record) = current.take() {
                sink.push(record.finish());
            }
            current = Some(MspRecord::default());
        }

        let Some(record) = current.as_mut() else {
            // Content before the first Name: line
            continue;
        };

        if record.in_peaks {
            record.add_peak_line(trimmed);
        } else if let Some((key, value)) = field {
            record.apply_field(key, value);
        } else if record.error.is_none() {
            record.error = Some(format!("unexpected line '{}'", trimmed));
        }
    }

    if let Some(record) = current.take() {
        sink.push(record.finish());
    }

    Ok(sink.finish())
}
