use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_channel::Sender;
use log::info;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::engine::match_spectrum;
use super::ml::MatchingStrategy;
use super::{Algorithm, MatchingError, MatchingParams, SpectrumMatch};
use crate::extract::QuerySpectrum;
use crate::library::LibraryEntry;
use crate::progress::{self, ProgressEvent};

/// Ranked candidates for one extracted query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    /// Feature the query belongs to
    pub feature_name: String,
    /// Query precursor m/z
    pub mz: f64,
    /// Query retention time in seconds
    pub rt: f64,
    /// Algorithm actually used
    pub algorithm: Algorithm,
    /// Ranked candidates
    pub matches: Vec<SpectrumMatch>,
    /// Top candidate, if any
    pub best_match: Option<SpectrumMatch>,
}

/// Execution options for [`match_batch`]
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Worker threads; the global rayon pool when unset
    pub threads: Option<usize>,
    /// Receives one event per finished query
    pub progress: Option<Sender<ProgressEvent>>,
    /// Job the progress events belong to
    pub job_id: Uuid,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            threads: None,
            progress: None,
            job_id: Uuid::new_v4(),
        }
    }
}

impl BatchOptions {
    /// Use a dedicated pool with this many threads
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    /// Report progress on `sender`
    pub fn with_progress(mut self, sender: Sender<ProgressEvent>) -> Self {
        self.progress = Some(sender);
        self
    }

    /// Tag progress events with `job_id`
    pub fn with_job_id(mut self, job_id: Uuid) -> Self {
        self.job_id = job_id;
        self
    }
}

/// Match every query against the library.
///
/// Output order equals query order regardless of thread count.
pub fn match_batch(
    queries: &[QuerySpectrum],
    library: &[LibraryEntry],
    params: &MatchingParams,
    strategy: &MatchingStrategy,
    options: &BatchOptions,
) -> Result<Vec<MatchResult>, MatchingError> {
    params.validate()?;
    if options.threads == Some(0) {
        return Err(MatchingError::InvalidParameter(
            "threads must be at least 1".into(),
        ));
    }

    info!(
        "Matching {} queries against {} library spectra ({})",
        queries.len(),
        library.len(),
        strategy.algorithm()
    );

    let total = queries.len();
    let completed = AtomicUsize::new(0);
    let algorithm = strategy.algorithm();

    let run_one = |query: &QuerySpectrum| -> Result<MatchResult, MatchingError> {
        let matches = match_spectrum(&query.spectrum, library, params, strategy)?;
        let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
        progress::report(
            options.progress.as_ref(),
            ProgressEvent::new(
                options.job_id,
                done,
                total,
                format!("Matched {}", query.feature_name),
            ),
        );
        Ok(MatchResult {
            feature_name: query.feature_name.clone(),
            mz: query.precursor_mz,
            rt: query.rt,
            algorithm,
            best_match: matches.first().cloned(),
            matches,
        })
    };

    let results = run(queries, options.threads, &run_one)?;

    info!(
        "Matched {} queries, {} with at least one candidate",
        results.len(),
        results.iter().filter(|r| r.best_match.is_some()).count()
    );
    Ok(results)
}

#[cfg(feature = "parallel")]
fn run<F>(
    queries: &[QuerySpectrum],
    threads: Option<usize>,
    run_one: &F,
) -> Result<Vec<MatchResult>, MatchingError>
where
    F: Fn(&QuerySpectrum) -> Result<MatchResult, MatchingError> + Sync,
{
    match threads {
        Some(n) => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(n)
                .build()
                .map_err(|e| MatchingError::ThreadPool(e.to_string()))?;
            pool.install(|| queries.par_iter().map(run_one).collect())
        }
        None => queries.par_iter().map(run_one).collect(),
    }
}

#[cfg(not(feature = "parallel"))]
fn run<F>(
    queries: &[QuerySpectrum],
    _threads: Option<usize>,
    run_one: &F,
) -> Result<Vec<MatchResult>, MatchingError>
where
    F: Fn(&QuerySpectrum) -> Result<MatchResult, MatchingError> + Sync,
{
    queries.iter().map(run_one).collect()
}
