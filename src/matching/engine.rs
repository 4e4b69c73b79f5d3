use log::debug;

use super::ml::{MatchingStrategy, PairFeatures, SpectrumModel};
use super::similarity::{self, Alignment};
use super::{Algorithm, MatchMetadata, MatchingError, MatchingParams, SpectrumMatch, Tolerance};
use crate::library::LibraryEntry;
use crate::spectrum::Spectrum;

/// Score one query/library pair with a cosine-family algorithm.
///
/// `MlAssisted` has no pairwise score of its own and is scored as cosine.
pub fn score_pair(
    query: &Spectrum,
    library: &Spectrum,
    algorithm: Algorithm,
    tolerance: Tolerance,
) -> Alignment {
    match algorithm {
        Algorithm::DotProduct => similarity::dot_product(query, library, tolerance),
        Algorithm::Cosine | Algorithm::MlAssisted => similarity::cosine(query, library, tolerance),
        Algorithm::ModifiedCosine => similarity::modified_cosine(query, library, tolerance),
    }
}

/// Rank `library` against `query`.
///
/// Parameters are validated before any scoring. Results are ordered by
/// descending score; equal scores keep library order.
pub fn match_spectrum(
    query: &Spectrum,
    library: &[LibraryEntry],
    params: &MatchingParams,
    strategy: &MatchingStrategy,
) -> Result<Vec<SpectrumMatch>, MatchingError> {
    params.validate()?;

    let mut matches: Vec<SpectrumMatch> = library
        .iter()
        .map(|entry| match strategy {
            MatchingStrategy::Algorithmic(algorithm) => {
                score_algorithmic(query, entry, *algorithm, params.tolerance)
            }
            MatchingStrategy::Model(model) => {
                score_with_model(query, entry, model.as_ref(), params.tolerance)
            }
        })
        .collect();

    matches.sort_by(|a, b| b.score.total_cmp(&a.score));
    matches.retain(|m| m.score >= params.min_score);
    matches.truncate(params.top_n);

    debug!(
        "Matched query against {} library spectra, kept {}",
        library.len(),
        matches.len()
    );

    Ok(matches)
}

fn base_match(query: &Spectrum, entry: &LibraryEntry, algorithm: Algorithm) -> SpectrumMatch {
    let meta = entry.metadata();
    SpectrumMatch {
        library_id: entry.id(),
        library_index: entry.index,
        compound_name: meta.display_name().map(str::to_string),
        score: 0.0,
        algorithm,
        matched_peaks: 0,
        total_peaks: query.len(),
        library_peaks: entry.spectrum.len(),
        similarity: None,
        is_analog: None,
        metadata: MatchMetadata {
            precursor_mz: meta.precursor_mz,
            retention_time: meta.retention_time,
            smiles: meta.smiles.clone(),
            inchi: meta.inchi.clone(),
            inchikey: meta.inchikey.clone(),
        },
    }
}

fn score_algorithmic(
    query: &Spectrum,
    entry: &LibraryEntry,
    algorithm: Algorithm,
    tolerance: Tolerance,
) -> SpectrumMatch {
    let algorithm = MatchingStrategy::effective(algorithm);
    let alignment = score_pair(query, &entry.spectrum, algorithm, tolerance);
    SpectrumMatch {
        score: alignment.score,
        matched_peaks: alignment.matched_peaks,
        ..base_match(query, entry, algorithm)
    }
}

fn score_with_model(
    query: &Spectrum,
    entry: &LibraryEntry,
    model: &dyn SpectrumModel,
    tolerance: Tolerance,
) -> SpectrumMatch {
    let library = &entry.spectrum;
    let cosine = similarity::cosine(query, library, tolerance);
    let modified = similarity::modified_cosine(query, library, tolerance);

    let precursor_mz_error = match (query.precursor_mz(), library.precursor_mz()) {
        (Some(q), Some(l)) => Some((l - q).abs()),
        _ => None,
    };
    let is_analog = match (query.precursor_mz(), library.precursor_mz()) {
        (Some(q), Some(l)) => Some(!tolerance.matches(q, l)),
        _ => None,
    };

    let features = PairFeatures {
        cosine: cosine.score,
        modified_cosine: modified.score,
        matched_fraction: if query.is_empty() {
            0.0
        } else {
            cosine.matched_peaks as f64 / query.len() as f64
        },
        precursor_mz_error,
    };

    let confidence = model.confidence(&features);
    SpectrumMatch {
        score: if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        },
        matched_peaks: cosine.matched_peaks,
        similarity: Some(cosine.score),
        is_analog,
        ..base_match(query, entry, Algorithm::MlAssisted)
    }
}
