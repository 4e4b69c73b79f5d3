use std::sync::Arc;

use super::*;
use crate::extract::QuerySpectrum;
use crate::library::Library;
use crate::spectrum::{Spectrum, SpectrumBuilder, SpectrumMetadata};

fn spectrum(mz: &[f64], intensities: &[f64]) -> Spectrum {
    Spectrum::new(mz.to_vec(), intensities.to_vec()).unwrap()
}

fn named(name: &str, precursor: f64, mz: &[f64], intensities: &[f64]) -> Spectrum {
    SpectrumBuilder::new()
        .peaks(mz, intensities)
        .compound_name(name)
        .id(name)
        .precursor_mz(precursor)
        .build()
        .unwrap()
}

fn cosine_params() -> MatchingParams {
    MatchingParams::new(Algorithm::Cosine)
}

fn run(query: &Spectrum, library: &Library, params: &MatchingParams) -> Vec<SpectrumMatch> {
    let strategy = MatchingStrategy::Algorithmic(params.algorithm);
    match_spectrum(query, library.entries(), params, &strategy).unwrap()
}

#[test]
fn test_identical_spectrum_scores_one() {
    let query = spectrum(&[100.0, 150.0, 200.0], &[1000.0, 500.0, 200.0]);
    let library = Library::from_spectra(vec![query.clone()]);

    let matches = run(&query, &library, &cosine_params());
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].score, 1.0);
    assert_eq!(format!("{:.4}", matches[0].score), "1.0000");
    assert_eq!(matches[0].matched_peaks, 3);
    assert_eq!(matches[0].total_peaks, 3);
    assert_eq!(matches[0].library_peaks, 3);
    assert_eq!(matches[0].algorithm, Algorithm::Cosine);
}

#[test]
fn test_self_score_for_every_algorithm() {
    let s = named("x", 300.0, &[55.1, 89.0, 120.5, 250.25], &[3.0, 7.5, 1.0, 9.0]);
    for algorithm in [
        Algorithm::Cosine,
        Algorithm::DotProduct,
        Algorithm::ModifiedCosine,
    ] {
        let a = score_pair(&s, &s, algorithm, Tolerance::Da(0.01));
        assert_eq!(a.score, 1.0, "{}", algorithm);
        assert_eq!(a.matched_peaks, 4);
    }
}

#[test]
fn test_cosine_known_value() {
    // Only the 100 peak pairs: 1*1 / sqrt(2 * 2)
    let a = spectrum(&[100.0, 200.0], &[1.0, 1.0]);
    let b = spectrum(&[100.005, 300.0], &[1.0, 1.0]);
    let alignment = similarity::cosine(&a, &b, Tolerance::Da(0.01));
    assert!((alignment.score - 0.5).abs() < 1e-12);
    assert_eq!(alignment.matched_peaks, 1);
}

#[test]
fn test_dot_product_uses_sqrt_weights() {
    let a = spectrum(&[100.0, 200.0], &[4.0, 0.0]);
    let b = spectrum(&[100.0, 200.0], &[4.0, 9.0]);
    // sqrt weights: a = [2, 0], b = [2, 3]; dot = 4, norms 4 and 13
    let dp = similarity::dot_product(&a, &b, Tolerance::Da(0.01));
    assert!((dp.score - 4.0 / (4.0f64 * 13.0).sqrt()).abs() < 1e-12);

    let cos = similarity::cosine(&a, &b, Tolerance::Da(0.01));
    assert!((cos.score - 16.0 / (16.0f64 * 97.0).sqrt()).abs() < 1e-12);
}

#[test]
fn test_each_peak_used_once() {
    // Two library peaks within tolerance of one query peak
    let q = spectrum(&[100.0], &[10.0]);
    let l = spectrum(&[99.995, 100.004], &[5.0, 8.0]);
    let a = similarity::cosine(&q, &l, Tolerance::Da(0.01));
    assert_eq!(a.matched_peaks, 1);
    assert!((a.score - 80.0 / (100.0f64 * 89.0).sqrt()).abs() < 1e-12);
}

#[test]
fn test_ppm_tolerance() {
    let q = spectrum(&[500.0], &[1.0]);
    let near = spectrum(&[500.004], &[1.0]);
    let far = spectrum(&[500.02], &[1.0]);
    assert_eq!(similarity::cosine(&q, &near, Tolerance::Ppm(10.0)).score, 1.0);
    assert_eq!(similarity::cosine(&q, &far, Tolerance::Ppm(10.0)).score, 0.0);
}

#[test]
fn test_modified_cosine_pairs_shifted_fragments() {
    let query = named("q", 200.0, &[50.0, 120.0], &[1.0, 1.0]);
    let analog = named("l", 214.0, &[50.0, 134.0], &[1.0, 1.0]);

    let plain = similarity::cosine(&query, &analog, Tolerance::Da(0.01));
    assert_eq!(plain.matched_peaks, 1);

    let modified = similarity::modified_cosine(&query, &analog, Tolerance::Da(0.01));
    assert_eq!(modified.matched_peaks, 2);
    assert_eq!(modified.score, 1.0);

    // Reversed roles flip the shift
    let reverse = similarity::modified_cosine(&analog, &query, Tolerance::Da(0.01));
    assert_eq!(reverse.score, modified.score);
}

#[test]
fn test_modified_cosine_without_precursor_is_cosine() {
    let query = spectrum(&[50.0, 120.0], &[1.0, 1.0]);
    let analog = named("l", 214.0, &[50.0, 134.0], &[1.0, 1.0]);
    assert_eq!(
        similarity::modified_cosine(&query, &analog, Tolerance::Da(0.01)),
        similarity::cosine(&query, &analog, Tolerance::Da(0.01))
    );
}

#[test]
fn test_empty_and_zero_spectra_score_zero() {
    let s = spectrum(&[100.0], &[1.0]);
    let zero = spectrum(&[100.0], &[0.0]);
    assert_eq!(similarity::cosine(&Spectrum::empty(), &s, Tolerance::Da(0.01)).score, 0.0);
    assert_eq!(similarity::cosine(&s, &Spectrum::empty(), Tolerance::Da(0.01)).score, 0.0);
    assert_eq!(similarity::cosine(&zero, &s, Tolerance::Da(0.01)).score, 0.0);
}

#[test]
fn test_extreme_intensities_self_score_one() {
    let huge = spectrum(&[100.0, 150.0, 200.0], &[1e160, 5e159, 2e159]);
    let tiny = spectrum(&[100.0, 150.0], &[1e-170, 5e-171]);
    for s in [&huge, &tiny] {
        for algorithm in [
            Algorithm::Cosine,
            Algorithm::DotProduct,
            Algorithm::ModifiedCosine,
        ] {
            let a = score_pair(s, s, algorithm, Tolerance::Da(0.01));
            assert!((a.score - 1.0).abs() < 1e-12, "{}: {}", algorithm, a.score);
            assert_eq!(a.matched_peaks, s.len());
        }
    }

    // Same shape at a different scale
    let unit = spectrum(&[100.0, 150.0, 200.0], &[1.0, 0.5, 0.2]);
    let cross = similarity::cosine(&huge, &unit, Tolerance::Da(0.01));
    assert!((cross.score - 1.0).abs() < 1e-12);
}

#[test]
fn test_empty_library_returns_no_matches() {
    let query = spectrum(&[100.0], &[1.0]);
    let matches = run(&query, &Library::from_spectra(Vec::new()), &cosine_params());
    assert!(matches.is_empty());
}

#[test]
fn test_ranking_min_score_and_top_n() {
    let query = spectrum(&[100.0, 150.0, 200.0], &[10.0, 5.0, 2.0]);
    let library = Library::from_spectra(vec![
        named("unrelated", 0.0, &[400.0], &[1.0]),
        named("partial", 0.0, &[100.0, 300.0], &[10.0, 10.0]),
        named("same", 0.0, &[100.0, 150.0, 200.0], &[10.0, 5.0, 2.0]),
    ]);

    let all = run(&query, &library, &cosine_params());
    let names: Vec<_> = all.iter().map(|m| m.compound_name.as_deref().unwrap()).collect();
    assert_eq!(names, vec!["same", "partial", "unrelated"]);
    assert_eq!(all[2].score, 0.0);
    assert_eq!(all[0].library_index, 2);

    let filtered = run(&query, &library, &cosine_params().with_min_score(0.1));
    assert_eq!(filtered.len(), 2);
    assert!(filtered.iter().all(|m| m.score > 0.0));

    let top = run(&query, &library, &cosine_params().with_top_n(1));
    assert_eq!(top.len(), 1);
    assert_eq!(top[0].library_id, "same");
}

#[test]
fn test_equal_scores_keep_library_order() {
    let query = spectrum(&[100.0], &[1.0]);
    let library = Library::from_spectra(vec![
        named("first", 0.0, &[100.0], &[2.0]),
        named("second", 0.0, &[100.0], &[7.0]),
        named("third", 0.0, &[100.0], &[1.0]),
    ]);
    let ids: Vec<_> = run(&query, &library, &cosine_params())
        .into_iter()
        .map(|m| m.library_id)
        .collect();
    assert_eq!(ids, vec!["first", "second", "third"]);
}

#[test]
fn test_match_carries_library_metadata() {
    let metadata = SpectrumMetadata {
        id: Some("CCMSLIB1".into()),
        compound_name: Some("Caffeine".into()),
        precursor_mz: Some(195.0877),
        retention_time: Some(312.0),
        smiles: Some("CN1C=NC2=C1C(=O)N(C(=O)N2C)C".into()),
        inchikey: Some("RYYVLZVUVIJVGH-UHFFFAOYSA-N".into()),
        ..Default::default()
    };
    let lib = spectrum(&[138.066], &[1.0]).with_metadata(metadata);
    let library = Library::from_spectra(vec![lib]);
    let m = &run(&spectrum(&[138.066], &[1.0]), &library, &cosine_params())[0];
    assert_eq!(m.library_id, "CCMSLIB1");
    assert_eq!(m.compound_name.as_deref(), Some("Caffeine"));
    assert_eq!(m.metadata.precursor_mz, Some(195.0877));
    assert_eq!(m.metadata.retention_time, Some(312.0));
    assert!(m.metadata.smiles.is_some());
    assert!(m.metadata.inchi.is_none());
}

#[test]
fn test_invalid_params_rejected() {
    let query = spectrum(&[100.0], &[1.0]);
    let library = Library::from_spectra(vec![query.clone()]);
    let strategy = MatchingStrategy::Algorithmic(Algorithm::Cosine);

    for params in [
        cosine_params().with_tolerance(Tolerance::Da(0.0)),
        cosine_params().with_tolerance(Tolerance::Ppm(-5.0)),
        cosine_params().with_tolerance(Tolerance::Da(f64::INFINITY)),
        cosine_params().with_min_score(1.5),
        cosine_params().with_min_score(f64::NAN),
        cosine_params().with_top_n(0),
    ] {
        assert!(match_spectrum(&query, library.entries(), &params, &strategy).is_err());
    }
}

#[test]
fn test_algorithm_names() {
    assert_eq!("ms2query".parse::<Algorithm>().unwrap(), Algorithm::MlAssisted);
    assert_eq!("Modified-Cosine".parse::<Algorithm>().unwrap(), Algorithm::ModifiedCosine);
    assert!("spectral_entropy".parse::<Algorithm>().is_err());

    let parsed: Algorithm = serde_json::from_str("\"ms2query\"").unwrap();
    assert_eq!(parsed, Algorithm::MlAssisted);
    assert_eq!(serde_json::to_string(&Algorithm::DotProduct).unwrap(), "\"dot_product\"");
}

#[test]
fn test_matching_config_ranges() {
    assert!(MatchingConfig::default().validate().is_ok());

    let ppm = MatchingConfig {
        mz_tolerance: 10.0,
        tolerance_unit: ToleranceUnit::Ppm,
        ..Default::default()
    };
    assert!(ppm.validate().is_ok());
    assert_eq!(ppm.tolerance(), Tolerance::Ppm(10.0));

    for bad in [
        MatchingConfig { mz_tolerance: 2.0, ..Default::default() },
        MatchingConfig { rt_tolerance: 0.5, ..Default::default() },
        MatchingConfig { top_n: 101, ..Default::default() },
        MatchingConfig { min_score: -0.1, ..Default::default() },
        MatchingConfig { threads: Some(0), ..Default::default() },
    ] {
        assert!(bad.validate().is_err(), "{:?}", bad);
    }

    let parsed: MatchingConfig = serde_json::from_str(r#"{"algorithm": "cosine", "top_n": 5}"#).unwrap();
    assert_eq!(parsed.algorithm, Algorithm::Cosine);
    assert_eq!(parsed.top_n, 5);
    assert_eq!(parsed.mz_tolerance, 0.01);
}

// Model-assisted matching

const MODEL_JSON: &str = r#"{
    "name": "test-logistic",
    "intercept": -2.0,
    "weights": {"cosine": 4.0, "matched_fraction": 1.0, "precursor_mz_error": -0.5}
}"#;

fn test_model() -> Arc<dyn SpectrumModel> {
    Arc::new(LogisticModel::from_json(MODEL_JSON).unwrap())
}

#[test]
fn test_logistic_model_confidence() {
    let model = LogisticModel::from_json(MODEL_JSON).unwrap();
    let features = PairFeatures {
        cosine: 1.0,
        modified_cosine: 1.0,
        matched_fraction: 1.0,
        precursor_mz_error: Some(0.0),
    };
    // z = -2 + 4 + 1 = 3
    let expected = 1.0 / (1.0 + (-3.0f64).exp());
    assert!((model.confidence(&features) - expected).abs() < 1e-12);

    // Unknown precursor error counts as the cap
    let unknown = PairFeatures {
        precursor_mz_error: None,
        ..features
    };
    assert!(model.confidence(&unknown) < 1e-6);
}

#[test]
fn test_logistic_model_rejects_bad_weights() {
    assert!(matches!(
        LogisticModel::from_json(r#"{"intercept": 0.0, "weights": {"entropy": 1.0}}"#),
        Err(ModelError::Invalid(_))
    ));
    assert!(matches!(
        LogisticModel::from_json(r#"{"intercept": 0.0, "weights": {}}"#),
        Err(ModelError::Invalid(_))
    ));
    assert!(matches!(
        LogisticModel::from_json("not json"),
        Err(ModelError::JsonError(_))
    ));
}

#[test]
fn test_ml_without_model_falls_back_to_cosine() {
    let (strategy, notice) = MatchingStrategy::resolve(Algorithm::MlAssisted, None);
    assert_eq!(strategy.algorithm(), Algorithm::Cosine);
    let notice = notice.unwrap();
    assert_eq!(notice.requested, Algorithm::MlAssisted);
    assert_eq!(notice.used, Algorithm::Cosine);

    let (strategy, notice) = MatchingStrategy::resolve(
        Algorithm::MlAssisted,
        Some(std::path::Path::new("/nonexistent/model.json")),
    );
    assert!(matches!(strategy, MatchingStrategy::Algorithmic(Algorithm::Cosine)));
    assert!(notice.is_some());

    let (strategy, notice) = MatchingStrategy::resolve(Algorithm::DotProduct, None);
    assert_eq!(strategy.algorithm(), Algorithm::DotProduct);
    assert!(notice.is_none());
}

#[test]
fn test_fallback_scores_equal_cosine() {
    let query = named("q", 200.0, &[50.0, 120.0, 180.0], &[5.0, 3.0, 1.0]);
    let library = Library::from_spectra(vec![
        named("a", 200.0, &[50.0, 120.0], &[5.0, 3.0]),
        named("b", 250.0, &[50.0, 180.0], &[1.0, 4.0]),
    ]);
    let params = MatchingParams::new(Algorithm::MlAssisted);
    let (fallback, _) = MatchingStrategy::resolve(Algorithm::MlAssisted, None);

    let ml = match_spectrum(&query, library.entries(), &params, &fallback).unwrap();
    let cos = run(&query, &library, &cosine_params());
    assert_eq!(ml, cos);
}

#[test]
fn test_model_strategy_scores_and_flags_analogs() {
    let query = named("q", 200.0, &[50.0, 120.0], &[5.0, 3.0]);
    let library = Library::from_spectra(vec![
        named("analog", 230.0, &[50.0, 120.0], &[5.0, 3.0]),
        named("exact", 200.003, &[50.0, 120.0], &[5.0, 3.0]),
    ]);
    let (strategy, notice) =
        MatchingStrategy::resolve_with(Algorithm::MlAssisted, || Ok(test_model()));
    assert!(notice.is_none());

    let params = MatchingParams::new(Algorithm::MlAssisted);
    let matches = match_spectrum(&query, library.entries(), &params, &strategy).unwrap();

    assert_eq!(matches[0].library_id, "exact");
    assert_eq!(matches[0].algorithm, Algorithm::MlAssisted);
    assert_eq!(matches[0].similarity, Some(1.0));
    assert_eq!(matches[0].is_analog, Some(false));
    assert_eq!(matches[1].is_analog, Some(true));
    assert!(matches[0].score > matches[1].score);
    assert!(matches.iter().all(|m| (0.0..=1.0).contains(&m.score)));
}

// Batch matching

fn queries() -> Vec<QuerySpectrum> {
    (0..12)
        .map(|i| {
            let base = 100.0 + i as f64;
            let spectrum = named(
                &format!("Q{}", i),
                base + 200.0,
                &[base, base + 20.0, base + 45.5],
                &[100.0, (i * 7 % 11) as f64 + 1.0, 30.0],
            );
            QuerySpectrum {
                feature_name: format!("F{}", i),
                scan: i as i64,
                precursor_mz: base + 200.0,
                rt: 10.0 * i as f64,
                spectrum,
            }
        })
        .collect()
}

fn batch_library() -> Library {
    Library::from_spectra(
        (0..20)
            .map(|i| {
                let base = 100.0 + (i % 12) as f64;
                named(
                    &format!("L{}", i),
                    base + 200.0,
                    &[base, base + 20.0, base + 60.0],
                    &[100.0, (i % 5) as f64 * 10.0 + 1.0, 15.0],
                )
            })
            .collect(),
    )
}

#[test]
fn test_batch_preserves_query_order() {
    let queries = queries();
    let library = batch_library();
    let params = cosine_params().with_top_n(3);
    let strategy = MatchingStrategy::Algorithmic(Algorithm::Cosine);

    let results =
        match_batch(&queries, library.entries(), &params, &strategy, &BatchOptions::default())
            .unwrap();
    assert_eq!(results.len(), queries.len());
    for (result, query) in results.iter().zip(&queries) {
        assert_eq!(result.feature_name, query.feature_name);
        assert_eq!(result.mz, query.precursor_mz);
        assert!(result.matches.len() <= 3);
        assert_eq!(result.best_match.as_ref(), result.matches.first());
    }
}

#[test]
fn test_batch_thread_count_does_not_change_output() {
    let queries = queries();
    let library = batch_library();
    let params = MatchingParams::new(Algorithm::ModifiedCosine);
    let strategy = MatchingStrategy::Algorithmic(Algorithm::ModifiedCosine);

    let one = match_batch(
        &queries,
        library.entries(),
        &params,
        &strategy,
        &BatchOptions::default().with_threads(1),
    )
    .unwrap();
    let four = match_batch(
        &queries,
        library.entries(),
        &params,
        &strategy,
        &BatchOptions::default().with_threads(4),
    )
    .unwrap();
    assert_eq!(
        serde_json::to_string(&one).unwrap(),
        serde_json::to_string(&four).unwrap()
    );
}

#[test]
fn test_batch_reports_progress() {
    let queries = queries();
    let library = batch_library();
    let (tx, rx) = crossbeam_channel::unbounded();
    let options = BatchOptions::default().with_progress(tx);
    let job_id = options.job_id;

    match_batch(
        &queries,
        library.entries(),
        &cosine_params(),
        &MatchingStrategy::Algorithmic(Algorithm::Cosine),
        &options,
    )
    .unwrap();
    drop(options);

    let events: Vec<_> = rx.iter().collect();
    assert_eq!(events.len(), queries.len());
    assert!(events.iter().all(|e| e.job_id == job_id && e.total == queries.len()));
    let mut completed: Vec<_> = events.iter().map(|e| e.completed).collect();
    completed.sort_unstable();
    assert_eq!(completed, (1..=queries.len()).collect::<Vec<_>>());
}

#[test]
fn test_batch_rejects_zero_threads() {
    let result = match_batch(
        &queries(),
        batch_library().entries(),
        &cosine_params(),
        &MatchingStrategy::Algorithmic(Algorithm::Cosine),
        &BatchOptions::default().with_threads(0),
    );
    assert!(matches!(result, Err(MatchingError::InvalidParameter(_))));
}
