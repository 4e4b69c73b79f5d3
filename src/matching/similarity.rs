//! Peak alignment and cosine-family similarity scores.
//!
//! All scores share one alignment routine:
//!
//! 1. Collect every (query peak, library peak) pair whose m/z agree within the
//!    tolerance, optionally after applying a precursor shift.
//! 2. Visit pairs by descending weight product and keep a pair only if neither
//!    peak is already taken.
//! 3. Score = Σ matched products / √(Σ query weights² · Σ library weights²).
//!
//! Weights are divided by each spectrum's largest weight first. Cosine is
//! scale-invariant, and this keeps the squared norms finite and non-zero for
//! any intensity magnitude.
//!
//! Sums are accumulated over values sorted ascending, and ties in step 2 are
//! broken by a key that ignores which spectrum is the query. Together this
//! makes `score(a, b) == score(b, a)` hold exactly, and `score(a, a) == 1.0`.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::Tolerance;
use crate::spectrum::Spectrum;

/// How peak intensities are turned into vector weights
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Weighting {
    /// Raw intensity
    Raw,
    /// Square root of intensity
    Sqrt,
}

impl Weighting {
    fn apply(self, intensity: f64) -> f64 {
        match self {
            Weighting::Raw => intensity,
            Weighting::Sqrt => intensity.sqrt(),
        }
    }
}

/// Result of aligning two spectra
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Alignment {
    /// Similarity in [0, 1]
    pub score: f64,
    /// Number of peak pairs used
    pub matched_peaks: usize,
}

#[derive(Debug, Clone, Copy)]
struct PeakPair {
    query: usize,
    library: usize,
    product: f64,
    delta: f64,
    low_mz: f64,
    high_mz: f64,
}

impl PeakPair {
    /// Descending product, then role-independent tie-breaks
    fn order(&self, other: &Self) -> Ordering {
        other
            .product
            .total_cmp(&self.product)
            .then(self.delta.total_cmp(&other.delta))
            .then(self.low_mz.total_cmp(&other.low_mz))
            .then(self.high_mz.total_cmp(&other.high_mz))
    }
}

/// Sum after sorting ascending, so that any permutation gives the same bits
fn ordered_sum(mut values: Vec<f64>) -> f64 {
    values.sort_by(f64::total_cmp);
    values.into_iter().sum()
}

fn squared_norm(weights: &[f64]) -> f64 {
    ordered_sum(weights.iter().map(|w| w * w).collect())
}

/// Weights scaled so the largest is 1; `None` when every weight is zero
fn unit_weights(spectrum: &Spectrum, weighting: Weighting) -> Option<Vec<f64>> {
    let mut weights: Vec<f64> = spectrum
        .intensities()
        .iter()
        .map(|&i| weighting.apply(i))
        .collect();
    let max = weights.iter().copied().fold(0.0f64, f64::max);
    if !(max > 0.0 && max.is_finite()) {
        return None;
    }
    for w in &mut weights {
        *w /= max;
    }
    Some(weights)
}

/// Append candidate pairs for one shift value.
///
/// `shift` is `precursor(library) - precursor(query)`; a query peak at `a`
/// pairs with a library peak at `b` when `|(a - b) + shift|` is inside the
/// tolerance window at `max(a, b)`.
fn collect_pairs(
    query_mz: &[f64],
    query_w: &[f64],
    library_mz: &[f64],
    library_w: &[f64],
    tolerance: Tolerance,
    shift: f64,
    pairs: &mut Vec<PeakPair>,
) {
    for (qi, &a) in query_mz.iter().enumerate() {
        let target = a + shift;
        // Generous search bound; the exact test below decides
        let bound = tolerance.window(2.0 * a.abs().max(target.abs())) * 1.5;
        let start = library_mz.partition_point(|&b| b < target - bound);

        for (li, &b) in library_mz.iter().enumerate().skip(start) {
            if b > target + bound {
                break;
            }
            let delta = ((a - b) + shift).abs();
            if delta <= tolerance.window(a.max(b)) {
                let product = query_w[qi] * library_w[li];
                pairs.push(PeakPair {
                    query: qi,
                    library: li,
                    product,
                    delta,
                    low_mz: a.min(b),
                    high_mz: a.max(b),
                });
            }
        }
    }
}

fn align(
    query: &Spectrum,
    library: &Spectrum,
    tolerance: Tolerance,
    weighting: Weighting,
    shift: Option<f64>,
) -> Alignment {
    if query.is_empty() || library.is_empty() {
        return Alignment::default();
    }

    let (Some(query_w), Some(library_w)) = (
        unit_weights(query, weighting),
        unit_weights(library, weighting),
    ) else {
        return Alignment::default();
    };

    let query_norm = squared_norm(&query_w);
    let library_norm = squared_norm(&library_w);
    if query_norm <= 0.0 || library_norm <= 0.0 {
        return Alignment::default();
    }

    let mut pairs = Vec::new();
    collect_pairs(
        query.mz(),
        &query_w,
        library.mz(),
        &library_w,
        tolerance,
        0.0,
        &mut pairs,
    );
    if let Some(shift) = shift.filter(|s| s.is_finite() && *s != 0.0) {
        collect_pairs(
            query.mz(),
            &query_w,
            library.mz(),
            &library_w,
            tolerance,
            shift,
            &mut pairs,
        );
    }

    pairs.sort_by(PeakPair::order);

    let mut query_used = vec![false; query.len()];
    let mut library_used = vec![false; library.len()];
    let mut products = Vec::new();
    for pair in &pairs {
        if query_used[pair.query] || library_used[pair.library] {
            continue;
        }
        query_used[pair.query] = true;
        library_used[pair.library] = true;
        products.push(pair.product);
    }

    let matched_peaks = products.len();
    let dot = ordered_sum(products);
    let score = dot / (query_norm * library_norm).sqrt();

    Alignment {
        score: if score.is_finite() {
            score.clamp(0.0, 1.0)
        } else {
            0.0
        },
        matched_peaks,
    }
}

/// Cosine similarity on raw intensities
pub fn cosine(query: &Spectrum, library: &Spectrum, tolerance: Tolerance) -> Alignment {
    align(query, library, tolerance, Weighting::Raw, None)
}

/// Spectral dot product on square-root scaled intensities
pub fn dot_product(query: &Spectrum, library: &Spectrum, tolerance: Tolerance) -> Alignment {
    align(query, library, tolerance, Weighting::Sqrt, None)
}

/// Cosine that also pairs fragments offset by the precursor m/z difference.
///
/// Falls back to plain cosine when either precursor is unknown.
pub fn modified_cosine(query: &Spectrum, library: &Spectrum, tolerance: Tolerance) -> Alignment {
    let shift = match (query.precursor_mz(), library.precursor_mz()) {
        (Some(q), Some(l)) => Some(l - q),
        _ => None,
    };
    align(query, library, tolerance, Weighting::Raw, shift)
}
