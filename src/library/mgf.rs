//! Mascot Generic Format libraries (`BEGIN IONS` ... `END IONS` blocks).

use std::io::BufRead;

use super::{
    parse_charge, parse_leading_f64, read_lines_lossy, spectrum_from_pairs, LibraryError,
    LoadReport, RecordSink,
};
use crate::spectrum::{Spectrum, SpectrumMetadata};

#[derive(Debug, Default)]
struct MgfBlock {
    metadata: SpectrumMetadata,
    title: Option<String>,
    peaks: Vec<(f64, f64)>,
    error: Option<String>,
}

impl MgfBlock {
    fn apply_field(&mut self, key: &str, value: &str) {
        let value = value.trim();
        let meta = &mut self.metadata;
        match key.trim().to_ascii_uppercase().as_str() {
            "TITLE" => self.title = Some(value.to_string()),
            "PEPMASS" | "PRECURSOR_MZ" | "PRECURSORMZ" => match parse_leading_f64(value) {
                Some(mz) => meta.precursor_mz = Some(mz),
                None => self.error = Some(format!("invalid PEPMASS '{}'", value)),
            },
            "RTINSECONDS" | "RETENTION_TIME" => meta.retention_time = parse_leading_f64(value),
            "CHARGE" => meta.charge = parse_charge(value),
            "NAME" | "COMPOUND_NAME" | "COMPOUNDNAME" => {
                meta.compound_name = Some(value.to_string())
            }
            "SMILES" => meta.smiles = Some(value.to_string()),
            "INCHI" => meta.inchi = Some(value.to_string()),
            "INCHIKEY" => meta.inchikey = Some(value.to_string()),
            "SPECTRUMID" | "SPECTRUM_ID" | "FEATURE_ID" => meta.id = Some(value.to_string()),
            other => {
                meta.extra
                    .insert(other.to_ascii_lowercase(), value.to_string());
            }
        }
    }

    fn add_peak_line(&mut self, line: &str) {
        let mut fields = line.split_whitespace();
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
                    self.error = Some(format!("invalid peak line '{}'", line));
                }
            }
        }
    }

    fn finish(mut self) -> Result<Spectrum, String> {
        if let Some(error) = self.error {
            return Err(error);
        }
        if let Some(title) = self.title {
            if self.metadata.id.is_none() {
                self.metadata.id = Some(title.clone());
            }
            if self.metadata.compound_name.is_none() {
                self.metadata.compound_name = Some(title.clone());
            }
            self.metadata.extra.insert("title".to_string(), title);
        }
        spectrum_from_pairs(self.peaks, self.metadata)
    }
}

pub(super) fn parse<R: BufRead>(reader: R) -> Result<(Vec<Spectrum>, LoadReport), LibraryError> {
    let mut sink = RecordSink::default();
    let mut current: Option<MgfBlock> = None;

    for line in read_lines_lossy(reader) {
        let line = line?;
        let trimmed = line.trim();

        if trimmed.is_empty() || trimmed.starts_with(['#', ';', '!']) {
            continue;
        }

        if trimmed.eq_ignore_ascii_case("BEGIN IONS") {
            if let Some(mut block) = current.take() {
                block.error = Some("missing END IONS".to_string());
                sink.push(block.finish());
            }
            current = Some(MgfBlock::default());
            continue;
        }

        if trimmed.eq_ignore_ascii_case("END IONS") {
            match current.take() {
                Some(block) => sink.push(block.finish()),
                None => sink.push(Err("END IONS without BEGIN IONS".to_string())),
            }
            continue;
        }

        let Some(block) = current.as_mut() else {
            // Global parameters before the first block
            continue;
        };

        let starts_numeric = trimmed
            .chars()
            .next()
            .map(|c| c.is_ascii_digit() || c == '.')
            .unwrap_or(false);

        match trimmed.split_once('=') {
            Some((key, value)) if !starts_numeric => block.apply_field(key, value),
            _ => block.add_peak_line(trimmed),
        }
    }

    if let Some(mut block) = current.take() {
        block.error = Some("missing END IONS".to_string());
        sink.push(block.finish());
    }

    Ok(sink.finish())
}
