//! # Spectral Library Loader
//!
//! Parses reference spectral libraries into a uniform, read-only collection of
//! [`LibraryEntry`] values. The format is chosen from the file extension:
//!
//! | Extension | Format |
//! |-----------|--------|
//! | `.msp`    | NIST MSP text records |
//! | `.mgf`    | Mascot Generic Format (`BEGIN IONS` blocks) |
//! | `.json`   | array of `{mz, intensities, metadata}` objects |
//! | `.mzml`   | PSI mzML, one entry per spectrum with peaks |
//!
//! Malformed records never abort a load. They are skipped, counted and the
//! first few reasons are kept in the [`LoadReport`]. Only a file that yields
//! zero usable spectra fails, with [`LibraryError::NoValidSpectra`].
//!
//! ```rust,no_run
//! use ms2match::library::Library;
//!
//! let library = Library::load("reference.msp")?;
//! println!("{} spectra, {} skipped", library.len(), library.report().skipped);
//! # Ok::<(), ms2match::library::LibraryError>(())
//! ```

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::spectrum::{Spectrum, SpectrumError, SpectrumMetadata};

mod error;
mod json;
mod mgf;
mod msp;
mod mzml;


pub use error::LibraryError;

/// Number of skip reasons retained in a [`LoadReport`]
pub const MAX_REPORTED_REASONS: usize = 10;

/// Supported library file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LibraryFormat {
    /// NIST MSP text
    Msp,
    /// Mascot generic format
    Mgf,
    /// JSON array of spectrum objects
    Json,
    /// mzML spectrum list
    #[serde(rename = "mzml")]
    MzMl,
}

impl LibraryFormat {
    /// Map a file extension (without the dot, any case) to a format
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "msp" => Some(LibraryFormat::Msp),
            "mgf" => Some(LibraryFormat::Mgf),
            "json" => Some(LibraryFormat::Json),
            "mzml" => Some(LibraryFormat::MzMl),
            _ => None,
        }
    }

    /// Detect the format of a library file from its extension
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, LibraryError> {
        let path = path.as_ref();
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
            .ok_or_else(|| LibraryError::UnsupportedFormat(path.display().to_string()))
    }

    /// Lowercase format name
    pub fn as_str(&self) -> &'static str {
        match self {
            LibraryFormat::Msp => "msp",
            LibraryFormat::Mgf => "mgf",
            LibraryFormat::Json => "json",
            LibraryFormat::MzMl => "mzml",
        }
    }
}

impl std::fmt::Display for LibraryFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reference spectrum and its position in the library
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryEntry {
    /// Load order, used as the final ranking tie-break
    pub index: usize,
    /// The reference spectrum with its compound metadata
    pub spectrum: Spectrum,
}

impl LibraryEntry {
    /// Identifier from the record, or `lib_<index>` when the record has none
    pub fn id(&self) -> String {
        self.spectrum
            .metadata()
            .id
            .clone()
            .unwrap_or_else(|| format!("lib_{}", self.index))
    }

    /// Compound name, falling back to "Unknown"
    pub fn compound_name(&self) -> &str {
        self.spectrum
            .metadata()
            .compound_name
            .as_deref()
            .unwrap_or("Unknown")
    }

    /// Compound metadata of the record
    pub fn metadata(&self) -> &SpectrumMetadata {
        self.spectrum.metadata()
    }
}

/// Outcome of parsing a library file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadReport {
    /// Records encountered
    pub total: usize,
    /// Records turned into spectra
    pub valid: usize,
    /// Records dropped as malformed
    pub skipped: usize,
    /// First few skip reasons
    pub reasons: Vec<String>,
}

/// Accumulates parsed records and skip reasons for one file
#[derive(Debug, Default)]
pub(crate) struct RecordSink {
    spectra: Vec<Spectrum>,
    report: LoadReport,
}

impl RecordSink {
    /// Record the outcome of one library record
    pub(crate) fn push(&mut self, record: Result<Spectrum, String>) {
        self.report.total += 1;
        match record {
            Ok(spectrum) => {
                self.report.valid += 1;
                self.spectra.push(spectrum);
            }
            Err(reason) => {
                let reason = format!("record {}: {}", self.report.total, reason);
                log::debug!("Skipping library {}", reason);
                self.report.skipped += 1;
                if self.report.reasons.len() < MAX_REPORTED_REASONS {
                    self.report.reasons.push(reason);
                }
            }
        }
    }

    pub(crate) fn finish(self) -> (Vec<Spectrum>, LoadReport) {
        (self.spectra, self.report)
    }
}

/// Build a spectrum from parsed peak pairs, rejecting records without peaks
pub(crate) fn spectrum_from_pairs(
    peaks: Vec<(f64, f64)>,
    metadata: SpectrumMetadata,
) -> Result<Spectrum, String> {
    if peaks.is_empty() {
        return Err("no peaks".to_string());
    }
    let (mz, intensities): (Vec<f64>, Vec<f64>) = peaks.into_iter().unzip();
    Spectrum::new(mz, intensities)
        .map(|s| s.with_metadata(metadata))
        .map_err(|e: SpectrumError| e.to_string())
}

/// Parse a numeric metadata value, tolerating trailing tokens (`"181.07 1200"`)
pub(crate) fn parse_leading_f64(value: &str) -> Option<f64> {
    value.split_whitespace().next()?.parse().ok()
}

/// Parse a charge such as `1`, `2+` or `1-`
pub(crate) fn parse_charge(value: &str) -> Option<i32> {
    let value = value.trim();
    let (digits, sign) = if let Some(d) = value.strip_suffix('+') {
        (d, 1)
    } else if let Some(d) = value.strip_suffix('-') {
        (d, -1)
    } else {
        (value, 1)
    };
    digits.trim().parse::<i32>().ok().map(|c| c * sign)
}

/// Precursor m/z range of a library
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MzRange {
    /// Lowest precursor m/z
    pub min: f64,
    /// Highest precursor m/z
    pub max: f64,
}

/// Summary information about a loaded library
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryInfo {
    /// Number of usable spectra
    pub count: usize,
    /// Distinct compound names, sorted
    pub compounds: Vec<String>,
    /// Span of the known precursor m/z values, if any
    pub precursor_mz_range: Option<MzRange>,
    /// Format the library was loaded from
    pub format: Option<LibraryFormat>,
}

/// An immutable, load-ordered collection of reference spectra
#[derive(Debug, Clone, Default)]
pub struct Library {
    entries: Vec<LibraryEntry>,
    report: LoadReport,
    format: Option<LibraryFormat>,
}

impl Library {
    /// Load a library file, choosing the parser by extension
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, LibraryError> {
        let path = path.as_ref();
        let format = LibraryFormat::from_path(path)?;
        let file = File::open(path)?;
        log::info!("Loading {} library from {}", format, path.display());
        Self::from_reader(BufReader::new(file), format)
    }

    /// Parse a library from any buffered reader
    pub fn from_reader<R: BufRead>(reader: R, format: LibraryFormat) -> Result<Self, LibraryError> {
        let (spectra, report) = match format {
            LibraryFormat::Msp => msp::parse(reader)?,
            LibraryFormat::Mgf => mgf::parse(reader)?,
            LibraryFormat::Json => json::parse(reader)?,
            LibraryFormat::MzMl => mzml::parse(reader)?,
        };

        if spectra.is_empty() {
            return Err(LibraryError::NoValidSpectra {
                total: report.total,
                skipped: report.skipped,
                reasons: report.reasons,
            });
        }

        if report.skipped > 0 {
            log::warn!(
                "Skipped {} of {} library records as malformed",
                report.skipped,
                report.total
            );
        }
        log::info!("Loaded {} library spectra", report.valid);

        let mut library = Self::from_spectra(spectra);
        library.report = report;
        library.format = Some(format);
        Ok(library)
    }

    /// Wrap already-built spectra, in order
    pub fn from_spectra(spectra: Vec<Spectrum>) -> Self {
        let count = spectra.len();
        let entries = spectra
            .into_iter()
            .enumerate()
            .map(|(index, spectrum)| LibraryEntry { index, spectrum })
            .collect();

        Self {
            entries,
            report: LoadReport {
                total: count,
                valid: count,
                ..Default::default()
            },
            format: None,
        }
    }

    /// All entries in load order
    pub fn entries(&self) -> &[LibraryEntry] {
        &self.entries
    }

    /// Iterate entries in load order
    pub fn iter(&self) -> std::slice::Iter<'_, LibraryEntry> {
        self.entries.iter()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the library has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Counts and skip reasons from loading
    pub fn report(&self) -> &LoadReport {
        &self.report
    }

    /// Source format, `None` for in-memory libraries
    pub fn format(&self) -> Option<LibraryFormat> {
        self.format
    }

    /// Count, distinct compounds and precursor range
    pub fn info(&self) -> LibraryInfo {
        let compounds: BTreeSet<String> = self
            .entries
            .iter()
            .map(|e| {
                e.metadata()
                    .display_name()
                    .unwrap_or("Unknown")
                    .to_string()
            })
            .collect();

        let precursor_mz_range = self
            .entries
            .iter()
            .filter_map(|e| e.spectrum.precursor_mz())
            .fold(None, |range: Option<MzRange>, mz| {
                Some(match range {
                    Some(r) => MzRange {
                        min: r.min.min(mz),
                        max: r.max.max(mz),
                    },
                    None => MzRange { min: mz, max: mz },
                })
            });

        LibraryInfo {
            count: self.entries.len(),
            compounds: compounds.into_iter().collect(),
            precursor_mz_range,
            format: self.format,
        }
    }
}

impl<'a> IntoIterator for &'a Library {
    type Item = &'a LibraryEntry;
    type IntoIter = std::slice::Iter<'a, LibraryEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Read lines lossily so that Latin-1 bytes in legacy libraries do not abort a load
pub(crate) fn read_lines_lossy<R: BufRead>(
    mut reader: R,
) -> impl Iterator<Item = std::io::Result<String>> {
    let mut buf = Vec::new();
    std::iter::from_fn(move || {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => None,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                Some(Ok(line.trim_end_matches(['\n', '\r']).to_string()))
            }
            Err(e) => Some(Err(e)),
        }
    })
}
