//! mzML libraries.
//!
//! Every `<spectrum>` with peaks becomes one entry: precursor from the selected
//! ion m/z (or the isolation window target), retention time from scan start
//! time, compound name from the spectrum title or `id`.

use std::io::BufRead;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::{spectrum_from_pairs, LibraryError, LoadReport, RecordSink};
use crate::binary::{ArrayLayout, Compression, Precision};
use crate::xml::{accession, attribute, cv_param, CvParam};
use crate::spectrum::{Spectrum, SpectrumMetadata};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArrayKind {
    Mz,
    Intensity,
    Other,
}

/// Binary data array context for parsing
#[derive(Debug)]
struct BinaryArrayContext {
    precision: Precision,
    compression: Compression,
    kind: ArrayKind,
    base64_data: String,
}

impl Default for BinaryArrayContext {
    fn default() -> Self {
        Self {
            precision: Precision::F64,
            compression: Compression::None,
            kind: ArrayKind::Other,
            base64_data: String::new(),
        }
    }
}

impl BinaryArrayContext {
    fn apply_cv_param(&mut self, param: &CvParam) {
        if let Some(precision) = Precision::from_cv_accession(&param.accession) {
            self.precision = precision;
        } else if let Some(compression) = Compression::from_cv_accession(&param.accession) {
            self.compression = compression;
        } else if param.accession == accession::MZ_ARRAY {
            self.kind = ArrayKind::Mz;
        } else if param.accession == accession::INTENSITY_ARRAY {
            self.kind = ArrayKind::Intensity;
        }
    }
}

/// One `<spectrum>` element being assembled
#[derive(Debug, Default)]
struct SpectrumContext {
    id: String,
    default_array_length: Option<usize>,
    title: Option<String>,
    ms_level: Option<i64>,
    retention_time: Option<f64>,
    selected_ion_mz: Option<f64>,
    isolation_target_mz: Option<f64>,
    charge: Option<i32>,
    mz: Option<Vec<f64>>,
    intensities: Option<Vec<f64>>,
    error: Option<String>,
}

impl SpectrumContext {
    fn from_start(e: &BytesStart) -> Result<Self, LibraryError> {
        Ok(Self {
            id: attribute(e, "id")?.unwrap_or_default(),
            default_array_length: attribute(e, "defaultArrayLength")?
                .and_then(|s| s.parse().ok()),
            ..Default::default()
        })
    }

    fn apply_cv_param(&mut self, param: &CvParam) {
        match param.accession.as_str() {
            accession::MS_LEVEL => self.ms_level = param.i64_value(),
            accession::SCAN_START_TIME => {
                self.retention_time = param.seconds();
            }
            accession::SELECTED_ION_MZ => self.selected_ion_mz = param.f64_value(),
            accession::ISOLATION_WINDOW_TARGET_MZ => {
                self.isolation_target_mz = param.f64_value()
            }
            accession::CHARGE_STATE => {
                self.charge = param.i64_value().and_then(|c| i32::try_from(c).ok())
            }
            accession::SPECTRUM_TITLE => self.title = param.value.clone(),
            _ => {}
        }
    }

    fn decode_array(&mut self, ctx: BinaryArrayContext) {
        if ctx.kind == ArrayKind::Other {
            return;
        }
        let layout = ArrayLayout::mzml(ctx.precision, ctx.compression);
        match layout.decode(&ctx.base64_data, self.default_array_length) {
            Ok(values) => match ctx.kind {
                ArrayKind::Mz => self.mz = Some(values),
                ArrayKind::Intensity => self.intensities = Some(values),
                ArrayKind::Other => {}
            },
            Err(e) => {
                if self.error.is_none() {
                    self.error = Some(format!("spectrum '{}': {}", self.id, e));
                }
            }
        }
    }

    fn finish(self) -> Result<Spectrum, String> {
        if let Some(error) = self.error {
            return Err(error);
        }
        let (Some(mz), Some(intensities)) = (self.mz, self.intensities) else {
            return Err(format!("spectrum '{}' has no m/z or intensity array", self.id));
        };
        if mz.len() != intensities.len() {
            return Err(format!(
                "spectrum '{}' has {} m/z values but {} intensities",
                self.id,
                mz.len(),
                intensities.len()
            ));
        }

        let mut metadata = SpectrumMetadata {
            id: Some(self.id.clone()).filter(|id| !id.is_empty()),
            compound_name: self
                .title
                .or_else(|| Some(self.id.clone()).filter(|id| !id.is_empty())),
            precursor_mz: self.selected_ion_mz.or(self.isolation_target_mz),
            retention_time: self.retention_time,
            charge: self.charge,
            ..Default::default()
        };
        if let Some(level) = self.ms_level {
            metadata.extra.insert("ms_level".to_string(), level.to_string());
        }

        spectrum_from_pairs(mz.into_iter().zip(intensities).collect(), metadata)
    }
}

pub(super) fn parse<R: BufRead>(reader: R) -> Result<(Vec<Spectrum>, LoadReport), LibraryError> {
    let mut reader = Reader::from_reader(reader);
    reader.config_mut().trim_text(true);

    let mut sink = RecordSink::default();
    let mut current: Option<SpectrumContext> = None;
    let mut current_array: Option<BinaryArrayContext> = None;
    let mut in_binary = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) => match e.name().as_ref() {
                b"spectrum" => current = Some(SpectrumContext::from_start(e)?),
                b"binaryDataArray" if current.is_some() => {
                    current_array = Some(BinaryArrayContext::default());
                }
                b"binary" => in_binary = true,
                _ => {}
            },
            Event::Empty(ref e) => {
                if e.name().as_ref() == b"cvParam" {
                    let param = cv_param(e)?;
                    if let Some(ctx) = current_array.as_mut() {
                        ctx.apply_cv_param(&param);
                    } else if let Some(spectrum) = current.as_mut() {
                        spectrum.apply_cv_param(&param);
                    }
                }
            }
            Event::Text(ref t) => {
                if in_binary {
                    if let Some(ctx) = current_array.as_mut() {
                        ctx.base64_data.push_str(&t.unescape()?);
                    }
                }
            }
            Event::End(ref e) => match e.name().as_ref() {
                b"binary" => in_binary = false,
                b"binaryDataArray" => {
                    if let (Some(ctx), Some(spectrum)) = (current_array.take(), current.as_mut()) {
                        spectrum.decode_array(ctx);
                    }
                }
                b"spectrum" => {
                    if let Some(spectrum) = current.take() {
                        sink.push(spectrum.finish());
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(sink.finish())
}
