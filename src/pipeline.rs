//! End-to-end matching run: mzXML + XCMS table + library → [`ResultSet`].

use std::path::Path;

use crossbeam_channel::Sender;
use log::info;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::extract::{extract_ms2_spectra, ExtractionError, ExtractionStats, Ms2ExtractionConfig};
use crate::library::{Library, LibraryError, LibraryInfo};
use crate::matching::{
    match_batch, BatchOptions, FallbackNotice, MatchResult, MatchingConfig, MatchingError,
    MatchingStrategy,
};
use crate::progress::ProgressEvent;
use crate::results::{process_results, ResultSet};
use crate::xcms::{PeakTable, XcmsError};

/// Errors from any stage of a matching run
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Peak table could not be read
    #[error("XCMS peak table: {0}")]
    XcmsError(#[from] XcmsError),

    /// Library could not be loaded
    #[error("Library: {0}")]
    LibraryError(#[from] LibraryError),

    /// MS2 extraction failed
    #[error("MS2 extraction: {0}")]
    ExtractionError(#[from] ExtractionError),

    /// Matching failed
    #[error("Matching: {0}")]
    MatchingError(#[from] MatchingError),
}

/// Everything a matching run produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingRun {
    /// Job identifier used for progress events
    pub job_id: Uuid,
    /// Raw per-query match results
    pub matches: Vec<MatchResult>,
    /// Processed results with confidence and summary
    pub results: ResultSet,
    /// Extraction counters
    pub extraction: ExtractionStats,
    /// Library summary
    pub library: LibraryInfo,
    /// Set when the model could not be used
    pub fallback: Option<FallbackNotice>,
}

/// Configured matching run
#[derive(Debug, Clone, Default)]
pub struct MatchingPipeline {
    /// Scan to feature assignment settings
    pub extraction: Ms2ExtractionConfig,
    /// Scoring settings
    pub matching: MatchingConfig,
    progress: Option<Sender<ProgressEvent>>,
    job_id: Option<Uuid>,
}

impl MatchingPipeline {
    /// Pipeline with a fresh job id and no progress reporting
    pub fn new(extraction: Ms2ExtractionConfig, matching: MatchingConfig) -> Self {
        Self {
            extraction,
            matching,
            progress: None,
            job_id: None,
        }
    }

    /// Report matching progress on `sender`
    pub fn with_progress(mut self, sender: Sender<ProgressEvent>) -> Self {
        self.progress = Some(sender);
        self
    }

    /// Use a caller-chosen job id
    pub fn with_job_id(mut self, job_id: Uuid) -> Self {
        self.job_id = Some(job_id);
        self
    }

    /// Load all inputs from disk and run
    pub fn run_files(
        &self,
        mzxml: &Path,
        xcms: &Path,
        library: &Path,
    ) -> Result<MatchingRun, PipelineError> {
        self.matching.validate()?;
        let table = PeakTable::load(xcms)?;
        let library = Library::load(library)?;
        self.run(mzxml, &table, &library)
    }

    /// Extract queries from `mzxml` and match them against `library`
    pub fn run(
        &self,
        mzxml: &Path,
        table: &PeakTable,
        library: &Library,
    ) -> Result<MatchingRun, PipelineError> {
        self.matching.validate()?;
        let extraction = extract_ms2_spectra(mzxml, table, &self.extraction)?;
        info!(
            "Extracted {} query spectra for {} features",
            extraction.spectra.len(),
            table.len()
        );

        let job_id = self.job_id.unwrap_or_else(Uuid::new_v4);
        let (strategy, fallback) =
            MatchingStrategy::resolve(self.matching.algorithm, self.matching.model_path.as_deref());

        let options = BatchOptions {
            threads: self.matching.threads,
            progress: self.progress.clone(),
            job_id,
        };
        let matches = match_batch(
            &extraction.spectra,
            library.entries(),
            &self.matching.params(),
            &strategy,
            &options,
        )?;

        let processed = process_results(&matches, Some(table));
        let results = ResultSet::new(job_id, strategy.algorithm(), fallback.clone(), processed);
        info!(
            "{} of {} features matched, {} high-confidence",
            results.summary.matched_features, results.summary.total_features, results.summary.high_confidence
        );

        Ok(MatchingRun {
            job_id,
            matches,
            results,
            extraction: extraction.stats,
            library: library.info(),
            fallback,
        })
    }
}
