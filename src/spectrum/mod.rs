//! # Spectrum Model
//!
//! The uniform peak-list representation shared by every input format. Library
//! entries, extracted MS2 query spectra and JSON exports all carry a
//! [`Spectrum`]: two parallel arrays (m/z, intensity) plus compound metadata.
//!
//! ## Invariants
//!
//! - `mz` and `intensities` have equal length
//! - m/z values are finite and strictly increasing
//! - intensities are finite and non-negative
//!
//! Construction enforces these by sorting peaks by m/z and collapsing exact
//! duplicate m/z values onto the most intense peak. Anything else that breaks
//! an invariant is rejected with a [`SpectrumError`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

mod error;


pub use error::SpectrumError;

/// A single centroided peak
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Peak {
    /// Mass-to-charge ratio
    pub mz: f64,
    /// Peak intensity
    pub intensity: f64,
}

/// Compound identity and acquisition metadata attached to a spectrum
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpectrumMetadata {
    /// Library or scan identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Compound name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compound_name: Option<String>,

    /// Precursor m/z
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precursor_mz: Option<f64>,

    /// Retention time in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention_time: Option<f64>,

    /// Precursor charge
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charge: Option<i32>,

    /// SMILES string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smiles: Option<String>,

    /// InChI string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inchi: Option<String>,

    /// InChIKey
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inchikey: Option<String>,

    /// Any other key/value pairs found in the source record
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl SpectrumMetadata {
    /// Best available display name: compound name, then identifier
    pub fn display_name(&self) -> Option<&str> {
        self.compound_name.as_deref().or(self.id.as_deref())
    }
}

/// A validated peak list with metadata.
///
/// Fields are private so the ordering invariant cannot be broken after
/// construction; use [`Spectrum::new`] or [`SpectrumBuilder`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSpectrum")]
pub struct Spectrum {
    mz: Vec<f64>,
    intensities: Vec<f64>,
    metadata: SpectrumMetadata,
}

/// Unvalidated serde shape of a [`Spectrum`]
#[derive(Deserialize)]
struct RawSpectrum {
    mz: Vec<f64>,
    intensities: Vec<f64>,
    #[serde(default)]
    metadata: SpectrumMetadata,
}

impl TryFrom<RawSpectrum> for Spectrum {
    type Error = SpectrumError;

    fn try_from(raw: RawSpectrum) -> Result<Self, Self::Error> {
        Ok(Spectrum::new(raw.mz, raw.intensities)?.with_metadata(raw.metadata))
    }
}

impl Spectrum {
    /// Build a spectrum from parallel arrays, sorting and validating the peaks
    pub fn new(mz: Vec<f64>, intensities: Vec<f64>) -> Result<Self, SpectrumError> {
        if mz.len() != intensities.len() {
            return Err(SpectrumError::LengthMismatch {
                mz: mz.len(),
                intensities: intensities.len(),
            });
        }

        for (index, (&m, &i)) in mz.iter().zip(intensities.iter()).enumerate() {
            if !m.is_finite() {
                return Err(SpectrumError::NonFiniteMz(index));
            }
            if !i.is_finite() || i < 0.0 {
                return Err(SpectrumError::InvalidIntensity { index, value: i });
            }
        }

        let already_sorted = mz.windows(2).all(|w| w[0] < w[1]);
        if already_sorted {
            return Ok(Self {
                mz,
                intensities,
                metadata: SpectrumMetadata::default(),
            });
        }

        let mut peaks: Vec<(f64, f64)> = mz.into_iter().zip(intensities).collect();
        peaks.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut mz = Vec::with_capacity(peaks.len());
        let mut intensities: Vec<f64> = Vec::with_capacity(peaks.len());
        for (m, i) in peaks {
            if mz.last() == Some(&m) {
                if let Some(last) = intensities.last_mut() {
                    *last = last.max(i);
                }
            } else {
                mz.push(m);
                intensities.push(i);
            }
        }

        Ok(Self {
            mz,
            intensities,
            metadata: SpectrumMetadata::default(),
        })
    }

    /// A spectrum without peaks
    pub fn empty() -> Self {
        Self {
            mz: Vec::new(),
            intensities: Vec::new(),
            metadata: SpectrumMetadata::default(),
        }
    }

    /// Replace the metadata
    pub fn with_metadata(mut self, metadata: SpectrumMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Peak m/z values, ascending
    pub fn mz(&self) -> &[f64] {
        &self.mz
    }

    /// Peak intensities, parallel to [`mz`](Self::mz)
    pub fn intensities(&self) -> &[f64] {
        &self.intensities
    }

    /// Compound and acquisition metadata
    pub fn metadata(&self) -> &SpectrumMetadata {
        &self.metadata
    }

    /// Mutable metadata
    pub fn metadata_mut(&mut self) -> &mut SpectrumMetadata {
        &mut self.metadata
    }

    /// Precursor m/z from the metadata
    pub fn precursor_mz(&self) -> Option<f64> {
        self.metadata.precursor_mz
    }

    /// Number of peaks
    pub fn len(&self) -> usize {
        self.mz.len()
    }

    /// Whether the spectrum has no peaks
    pub fn is_empty(&self) -> bool {
        self.mz.is_empty()
    }

    /// Iterate over peaks in ascending m/z order
    pub fn peaks(&self) -> impl Iterator<Item = Peak> + '_ {
        self.mz
            .iter()
            .zip(self.intensities.iter())
            .map(|(&mz, &intensity)| Peak { mz, intensity })
    }

    /// Sum of all intensities
    pub fn total_intensity(&self) -> f64 {
        self.intensities.iter().sum()
    }

    /// Largest intensity, or 0.0 for an empty spectrum
    pub fn max_intensity(&self) -> f64 {
        self.intensities.iter().copied().fold(0.0, f64::max)
    }

    /// Copy of this spectrum keeping only peaks with `intensity >= threshold`
    pub fn filter_min_intensity(&self, threshold: f64) -> Self {
        let (mz, intensities): (Vec<f64>, Vec<f64>) = self
            .peaks()
            .filter(|p| p.intensity >= threshold)
            .map(|p| (p.mz, p.intensity))
            .unzip();

        Self {
            mz,
            intensities,
            metadata: self.metadata.clone(),
        }
    }
}

/// Builder for creating spectra peak by peak
#[derive(Debug, Default, Clone)]
pub struct SpectrumBuilder {
    mz: Vec<f64>,
    intensities: Vec<f64>,
    metadata: SpectrumMetadata,
}

impl SpectrumBuilder {
    /// Empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a single peak
    pub fn add_peak(mut self, mz: f64, intensity: f64) -> Self {
        self.mz.push(mz);
        self.intensities.push(intensity);
        self
    }

    /// Add parallel arrays of peaks
    pub fn peaks(mut self, mz: &[f64], intensities: &[f64]) -> Self {
        self.mz.extend_from_slice(mz);
        self.intensities.extend_from_slice(intensities);
        self
    }

    /// Set the record identifier
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.metadata.id = Some(id.into());
        self
    }

    /// Set the compound name
    pub fn compound_name(mut self, name: impl Into<String>) -> Self {
        self.metadata.compound_name = Some(name.into());
        self
    }

    /// Set the precursor m/z
    pub fn precursor_mz(mut self, mz: f64) -> Self {
        self.metadata.precursor_mz = Some(mz);
        self
    }

    /// Retention time in seconds
    pub fn retention_time(mut self, rt: f64) -> Self {
        self.metadata.retention_time = Some(rt);
        self
    }

    /// Replace all metadata
    pub fn metadata(mut self, metadata: SpectrumMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Validate and build the spectrum
    pub fn build(self) -> Result<Spectrum, SpectrumError> {
        Ok(Spectrum::new(self.mz, self.intensities)?.with_metadata(self.metadata))
    }
}
