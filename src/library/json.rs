//! JSON libraries: a top-level array of spectrum objects, or a single object.
//!
//! Each object carries `mz`, `intensities` and an optional flat `metadata` map.
//! Metadata keys follow the matchms naming (`compound_name`, `precursor_mz`,
//! `retention_time`, ...) with a few common aliases.

use std::io::BufRead;

use serde_json::{Map, Value};

use super::{spectrum_from_pairs, LibraryError, LoadReport, RecordSink};
use crate::spectrum::{Spectrum, SpectrumMetadata};

pub(super) fn parse<R: BufRead>(reader: R) -> Result<(Vec<Spectrum>, LoadReport), LibraryError> {
    let document: Value = serde_json::from_reader(reader)?;
    let mut sink = RecordSink::default();

    match document {
        Value::Array(items) => {
            for item in &items {
                sink.push(parse_record(item));
            }
        }
        Value::Object(_) => sink.push(parse_record(&document)),
        _ => sink.push(Err("top-level value is neither an array nor an object".to_string())),
    }

    Ok(sink.finish())
}

fn parse_record(value: &Value) -> Result<Spectrum, String> {
    let object = value
        .as_object()
        .ok_or_else(|| "record is not an object".to_string())?;

    let mz = number_array(object, "mz")?;
    let intensities = number_array(object, "intensities")?;
    if mz.len() != intensities.len() {
        return Err(format!(
            "{} m/z values but {} intensities",
            mz.len(),
            intensities.len()
        ));
    }

    let metadata = match object.get("metadata") {
        None | Some(Value::Null) => SpectrumMetadata::default(),
        Some(Value::Object(map)) => metadata_from_map(map),
        Some(_) => return Err("'metadata' is not an object".to_string()),
    };

    spectrum_from_pairs(mz.into_iter().zip(intensities).collect(), metadata)
}

fn number_array(object: &Map<String, Value>, key: &str) -> Result<Vec<f64>, String> {
    let array = object
        .get(key)
        .and_then(Value::as_array)
        .ok_or_else(|| format!("missing '{}' array", key))?;

    array
        .iter()
        .map(|v| v.as_f64().ok_or_else(|| format!("non-numeric value in '{}'", key)))
        .collect()
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => super::parse_leading_f64(s),
        _ => None,
    }
}

fn metadata_from_map(map: &Map<String, Value>) -> SpectrumMetadata {
    let mut meta = SpectrumMetadata::default();

    for (key, value) in map {
        match key.to_ascii_lowercase().as_str() {
            "compound_name" | "name" | "compoundname" => meta.compound_name = as_text(value),
            "precursor_mz" | "precursormz" | "pepmass" => meta.precursor_mz = as_number(value),
            "retention_time" | "rt" | "rtinseconds" => meta.retention_time = as_number(value),
            "charge" => {
                meta.charge = match value {
                    Value::Number(n) => n.as_i64().and_then(|c| i32::try_from(c).ok()),
                    Value::String(s) => super::parse_charge(s),
                    _ => None,
                }
            }
            "smiles" => meta.smiles = as_text(value),
            "inchi" => meta.inchi = as_text(value),
            "inchikey" => meta.inchikey = as_text(value),
            "id" | "spectrum_id" | "spectrumid" => meta.id = as_text(value),
            _ => {
                if let Some(text) = as_text(value) {
                    meta.extra.insert(key.clone(), text);
                }
            }
        }
    }

    meta
}
