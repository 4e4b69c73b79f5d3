//! # mzXML Reader
//!
//! Streaming pull parser for mzXML runs, the format the MS2 extractor reads
//! fragment scans from.
//!
//! ## mzXML Structure
//!
//! ```text
//! mzXML
//! └── msRun
//!     └── scan* (MS1 survey scans, may contain nested MS2 scans)
//!         ├── precursorMz (MS2+, text = precursor m/z)
//!         ├── peaks (base64, network byte order, interleaved m/z-int)
//!         └── scan* (nested)
//! ```
//!
//! Scans are emitted when their closing tag is read, so nested fragment scans
//! are yielded before the survey scan that encloses them. Peak decoding is
//! skipped for scans excluded by [`MzXmlStreamer::with_ms_level`].

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::binary::{split_pairs, ArrayLayout, Compression, Endian, Precision};
use crate::xml::attribute;

mod error;
mod models;


pub use error::MzXmlError;
pub use models::{parse_duration_seconds, MzXmlScan};

/// Default buffer size for file input
pub const DEFAULT_INPUT_BUFFER_SIZE: usize = 1024 * 1024;

/// Decoding parameters of a `<peaks>` element plus its accumulated text
#[derive(Debug)]
struct PeaksContext {
    layout: ArrayLayout,
    base64: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextTarget {
    None,
    PrecursorMz,
    Peaks,
}

/// Streaming parser for mzXML files
pub struct MzXmlStreamer<R: BufRead> {
    reader: Reader<R>,
    ms_level: Option<u8>,
    open_scans: Vec<MzXmlScan>,
    peaks: Option<PeaksContext>,
    text_target: TextTarget,
    emitted: usize,
}

impl MzXmlStreamer<BufReader<File>> {
    /// Open an mzXML file from disk
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, MzXmlError> {
        let file = File::open(path)?;
        Self::new(BufReader::with_capacity(DEFAULT_INPUT_BUFFER_SIZE, file))
    }
}

impl<R: BufRead> MzXmlStreamer<R> {
    /// Create a new streamer from a BufRead source
    pub fn new(reader: R) -> Result<Self, MzXmlError> {
        let mut xml_reader = Reader::from_reader(reader);
        xml_reader.config_mut().trim_text(true);

        Ok(Self {
            reader: xml_reader,
            ms_level: None,
            open_scans: Vec::new(),
            peaks: None,
            text_target: TextTarget::None,
            emitted: 0,
        })
    }

    /// Only emit scans of the given MS level
    pub fn with_ms_level(mut self, level: u8) -> Self {
        self.ms_level = Some(level);
        self
    }

    fn wants(&self, scan: &MzXmlScan) -> bool {
        self.ms_level.map_or(true, |level| scan.ms_level == level)
    }

    /// Iterate over all remaining scans
    pub fn scans(self) -> ScanIterator<R> {
        ScanIterator { streamer: self }
    }

    /// Read the next scan from the stream
    pub fn next_scan(&mut self) -> Result<Option<MzXmlScan>, MzXmlError> {
        let mut buf = Vec::new();
        loop {
            match self.reader.read_event_into(&mut buf)? {
                Event::Start(ref e) => match e.name().as_ref() {
                    b"scan" => {
                        let scan = parse_scan_attributes(e)?;
                        self.open_scans.push(scan);
                    }
                    b"precursorMz" => {
                        if let Some(scan) = self.open_scans.last_mut() {
                            apply_precursor_attributes(scan, e)?;
                        }
                        self.text_target = TextTarget::PrecursorMz;
                    }
                    b"peaks" => {
                        self.peaks = Some(parse_peaks_attributes(e)?);
                        self.text_target = TextTarget::Peaks;
                    }
                    _ => {}
                },
                Event::Empty(ref e) => {
                    if e.name().as_ref() == b"scan" {
                        let mut scan = parse_scan_attributes(e)?;
                        if self.wants(&scan) {
                            scan.index = self.emitted;
                            self.emitted += 1;
                            return Ok(Some(scan));
                        }
                    }
                }
                Event::Text(ref t) => match self.text_target {
                    TextTarget::PrecursorMz => {
                        let text = t.unescape()?;
                        let value = text.trim().parse::<f64>().map_err(|_| {
                            MzXmlError::InvalidAttributeValue(format!("precursorMz '{}'", text))
                        })?;
                        if let Some(scan) = self.open_scans.last_mut() {
                            scan.precursor_mz = Some(value);
                        }
                    }
                    TextTarget::Peaks => {
                        if let Some(ctx) = self.peaks.as_mut() {
                            ctx.base64.push_str(&t.unescape()?);
                        }
                    }
                    TextTarget::None => {}
                },
                Event::End(ref e) => match e.name().as_ref() {
                    b"precursorMz" => self.text_target = TextTarget::None,
                    b"peaks" => {
                        self.text_target = TextTarget::None;
                        if let Some(ctx) = self.peaks.take() {
                            self.finish_peaks(ctx)?;
                        }
                    }
                    b"scan" => {
                        let Some(mut scan) = self.open_scans.pop() else {
                            return Err(MzXmlError::InvalidStructure(
                                "Closing </scan> without matching <scan>".to_string(),
                            ));
                        };
                        if self.wants(&scan) {
                            scan.index = self.emitted;
                            self.emitted += 1;
                            return Ok(Some(scan));
                        }
                    }
                    _ => {}
                },
                Event::Eof => {
                    if !self.open_scans.is_empty() {
                        return Err(MzXmlError::InvalidStructure(
                            "Unexpected EOF inside <scan>".to_string(),
                        ));
                    }
                    return Ok(None);
                }
                _ => {}
            }
            buf.clear();
        }
    }

    /// Decode the peaks of the innermost open scan
    fn finish_peaks(&mut self, ctx: PeaksContext) -> Result<(), MzXmlError> {
        let wanted = match self.open_scans.last() {
            Some(scan) => self.wants(scan),
            None => return Ok(()),
        };
        if !wanted {
            return Ok(());
        }

        let Some(scan) = self.open_scans.last_mut() else {
            return Ok(());
        };

        let num = scan.num;
        let (mz, intensities) = ctx
            .layout
            .decode(&ctx.base64, None)
            .and_then(|values| split_pairs(&values))
            .map_err(|source| MzXmlError::BinaryError { scan: num, source })?;

        if let Some(expected) = scan.peaks_count {
            if expected != mz.len() {
                log::debug!(
                    "Scan {} declares {} peaks but {} were decoded",
                    scan.num,
                    expected,
                    mz.len()
                );
            }
        }

        scan.mz = mz;
        scan.intensities = intensities;
        Ok(())
    }
}

fn parse_scan_attributes(e: &BytesStart) -> Result<MzXmlScan, MzXmlError> {
    let mut scan = MzXmlScan {
        ms_level: 1,
        ..Default::default()
    };

    if let Some(num) = attribute(e, "num")? {
        scan.num = num
            .trim()
            .parse()
            .map_err(|_| MzXmlError::InvalidAttributeValue(format!("scan num '{}'", num)))?;
    }

    if let Some(level) = attribute(e, "msLevel")? {
        scan.ms_level = level
            .trim()
            .parse()
            .map_err(|_| MzXmlError::InvalidAttributeValue(format!("msLevel '{}'", level)))?;
    }

    if let Some(rt) = attribute(e, "retentionTime")? {
        scan.retention_time = Some(parse_duration_seconds(&rt).ok_or_else(|| {
            MzXmlError::InvalidAttributeValue(format!("retentionTime '{}'", rt))
        })?);
    }

    scan.polarity = attribute(e, "polarity")?;
    scan.peaks_count = attribute(e, "peaksCount")?.and_then(|v| v.trim().parse().ok());

    Ok(scan)
}

fn apply_precursor_attributes(scan: &mut MzXmlScan, e: &BytesStart) -> Result<(), MzXmlError> {
    scan.precursor_intensity =
        attribute(e, "precursorIntensity")?.and_then(|v| v.trim().parse().ok());
    scan.precursor_charge =
        attribute(e, "precursorCharge")?.and_then(|v| v.trim().parse().ok());
    Ok(())
}

fn parse_peaks_attributes(e: &BytesStart) -> Result<PeaksContext, MzXmlError> {
    let precision = match attribute(e, "precision")? {
        Some(p) => Precision::from_bits(p.trim())
            .ok_or_else(|| MzXmlError::InvalidAttributeValue(format!("precision '{}'", p)))?,
        None => Precision::F32,
    };

    let compression = match attribute(e, "compressionType")? {
        Some(c) => Compression::from_mzxml(c.trim())
            .ok_or_else(|| MzXmlError::InvalidAttributeValue(format!("compressionType '{}'", c)))?,
        None => Compression::None,
    };

    let endian = match attribute(e, "byteOrder")?.as_deref().map(str::trim) {
        None | Some("network") | Some("big") => Endian::Big,
        Some("little") => Endian::Little,
        Some(other) => {
            return Err(MzXmlError::InvalidAttributeValue(format!(
                "byteOrder '{}'",
                other
            )))
        }
    };

    let content = match attribute(e, "contentType")? {
        Some(c) => Some(c),
        None => attribute(e, "pairOrder")?,
    };
    if let Some(content) = content {
        if content.trim() != "m/z-int" {
            return Err(MzXmlError::InvalidAttributeValue(format!(
                "contentType '{}'",
                content
            )));
        }
    }

    Ok(PeaksContext {
        layout: ArrayLayout {
            precision,
            compression,
            endian,
        },
        base64: String::new(),
    })
}

/// Iterator over scans in an mzXML file
pub struct ScanIterator<R: BufRead> {
    streamer: MzXmlStreamer<R>,
}

impl<R: BufRead> Iterator for ScanIterator<R> {
    type Item = Result<MzXmlScan, MzXmlError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.streamer.next_scan() {
            Ok(Some(scan)) => Some(Ok(scan)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}
