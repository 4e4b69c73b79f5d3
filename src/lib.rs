//! # ms2match - MS2 Spectral Library Matching for XCMS Features
//!
//! `ms2match` identifies the metabolites behind XCMS features. It reads an
//! XCMS peak table and an mzXML run, extracts the MS2 spectrum that belongs to
//! each feature, scores it against a reference spectral library, and produces
//! ranked, exportable results.
//!
//! ## Data Flow
//!
//! ```text
//! mzXML ──▶ MzXmlStreamer ──┐
//!                           ├──▶ extract ──▶ query spectra ──▶ matching ──▶ results ──▶ CSV / JSON
//! PeakTable.csv ──▶ xcms ───┘                                   ▲
//!                                                               │
//! .msp / .mgf / .json / .mzML ──▶ library ──────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::path::Path;
//! use ms2match::prelude::*;
//!
//! let config = MatchingConfig {
//!     algorithm: Algorithm::ModifiedCosine,
//!     ..Default::default()
//! };
//! let run = MatchingPipeline::new(Ms2ExtractionConfig::default(), config).run_files(
//!     Path::new("run.mzXML"),
//!     Path::new("PeakTable.csv"),
//!     Path::new("reference.msp"),
//! )?;
//!
//! for result in &run.results.results {
//!     if let Some(best) = &result.best_match {
//!         println!("{}: {:?} ({:.3})", result.feature_name, best.compound_name, best.score);
//!     }
//! }
//! run.results.save_csv("matches.csv")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Modules
//!
//! - [`spectrum`]: validated peak lists and their metadata
//! - [`binary`] and [`xml`]: Base64 peak arrays and quick-xml helpers shared by the readers
//! - [`xcms`]: XCMS peak tables and the Rscript preprocessing runner
//! - [`mzxml`]: streaming mzXML scan reader
//! - [`library`]: MSP, MGF, JSON and mzML spectral libraries
//! - [`extract`]: feature-to-MS2 scan assignment
//! - [`matching`]: similarity scores, ranking and batch matching
//! - [`results`]: confidence, summaries and export
//! - [`pipeline`]: the end-to-end run
//! - [`progress`]: job progress events
//! - `server`: the HTTP API (feature `server`)

#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]
// Allow some patterns common in scientific code
#![allow(clippy::too_many_arguments)]

pub mod binary;
pub mod extract;
pub mod library;
pub mod matching;
pub mod mzxml;
pub mod pipeline;
pub mod progress;
pub mod results;
pub mod spectrum;
pub mod xcms;
pub mod xml;

#[cfg(feature = "server")]
pub mod server;

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use crate::extract::{
        extract_ms2_spectra, ExtractionResult, ExtractionStats, Ms2ExtractionConfig, QuerySpectrum,
    };
    pub use crate::library::{Library, LibraryEntry, LibraryError, LibraryFormat, LoadReport};
    pub use crate::matching::{
        match_batch, match_spectrum, Algorithm, BatchOptions, FallbackNotice, MatchResult,
        MatchingConfig, MatchingParams, MatchingStrategy, SpectrumMatch, Tolerance,
    };
    pub use crate::mzxml::{MzXmlScan, MzXmlStreamer};
    pub use crate::pipeline::{MatchingPipeline, MatchingRun, PipelineError};
    pub use crate::progress::ProgressEvent;
    pub use crate::results::{ProcessedResult, ResultSet, SummaryStatistics};
    pub use crate::spectrum::{Spectrum, SpectrumBuilder, SpectrumMetadata};
    pub use crate::xcms::{PeakTable, XcmsPeak, XcmsProcessingConfig, XcmsProcessor};
}
