use std::collections::BTreeMap;

use super::*;
use crate::matching::MatchMetadata;

fn candidate(id: &str, score: f64, matched: usize, total: usize) -> SpectrumMatch {
    SpectrumMatch {
        library_id: id.to_string(),
        library_index: 0,
        compound_name: Some(format!("{} compound", id)),
        score,
        algorithm: Algorithm::Cosine,
        matched_peaks: matched,
        total_peaks: total,
        library_peaks: total,
        similarity: None,
        is_analog: None,
        metadata: MatchMetadata::default(),
    }
}

fn result(name: &str, mz: f64, rt: f64, matches: Vec<SpectrumMatch>) -> MatchResult {
    MatchResult {
        feature_name: name.to_string(),
        mz,
        rt,
        algorithm: Algorithm::Cosine,
        best_match: matches.first().cloned(),
        matches,
    }
}

fn peak(name: &str, mz: f64, rt: f64) -> XcmsPeak {
    XcmsPeak {
        name: name.to_string(),
        mz,
        mzmin: mz,
        mzmax: mz,
        rt,
        rtmin: rt,
        rtmax: rt,
        npeaks: 2,
        intensities: BTreeMap::from([("s1".to_string(), 1.5e5)]),
    }
}

#[test]
fn test_confidence_single_match() {
    // 0.9 * (0.5 + 0.5 * 3/4)
    let c = confidence(&[candidate("a", 0.9, 3, 4)]);
    assert!((c - 0.9 * 0.875).abs() < 1e-12);
    assert_eq!(confidence(&[]), 0.0);
}

#[test]
fn test_confidence_pulls_toward_top3_mean() {
    let matches = vec![
        candidate("a", 0.9, 4, 4),
        candidate("b", 0.6, 4, 4),
        candidate("c", 0.3, 4, 4),
        candidate("d", 0.0, 4, 4),
    ];
    // mean(top3) = 0.6; base = 0.9 + min(0.2, -0.15)
    let c = confidence(&matches);
    assert!((c - 0.75).abs() < 1e-12);
}

#[test]
fn test_confidence_bonus_is_capped() {
    let mut low = candidate("a", 0.1, 2, 2);
    low.algorithm = Algorithm::MlAssisted;
    low.similarity = Some(0.1);
    let mut matches = vec![low];
    // Unranked input, only to reach the 0.2 cap
    matches.push(candidate("b", 1.0, 2, 2));
    matches.push(candidate("c", 1.0, 2, 2));
    let c = confidence(&matches);
    assert!((c - 0.3).abs() < 1e-12);
}

#[test]
fn test_confidence_uses_similarity_for_model_scores() {
    let mut m = candidate("a", 0.8, 1, 1);
    m.algorithm = Algorithm::MlAssisted;
    m.similarity = Some(0.4);
    assert!((confidence(&[m]) - 0.6).abs() < 1e-12);
}

#[test]
fn test_process_results_joins_features() {
    let table = PeakTable::from_peaks(vec![
        peak("FT001", 181.0707, 62.0),
        peak("FT002", 255.2319, 480.0),
    ]);
    let results = vec![
        result("FT002", 255.2319, 481.0, vec![candidate("x", 0.8, 2, 2)]),
        result("scan-derived", 181.075, 70.0, vec![]),
        result("orphan", 999.0, 10.0, vec![]),
    ];

    let processed = process_results(&results, Some(&table));
    assert_eq!(processed.len(), 3);
    assert_eq!(processed[0].xcms_peak.as_ref().unwrap().name, "FT002");
    assert_eq!(processed[0].n_matches, 1);
    assert!((processed[0].confidence - 0.8).abs() < 1e-12);
    assert_eq!(processed[1].xcms_peak.as_ref().unwrap().name, "FT001");
    assert_eq!(processed[1].confidence, 0.0);
    assert!(processed[2].xcms_peak.is_none());

    let without_table = process_results(&results, None);
    assert!(without_table.iter().all(|r| r.xcms_peak.is_none()));
}

#[test]
fn test_summary_statistics() {
    let results = vec![
        result("A", 100.0, 10.0, vec![candidate("x", 0.95, 3, 3)]),
        result("B", 200.0, 20.0, vec![candidate("y", 0.4, 1, 3)]),
        result("C", 300.0, 30.0, vec![]),
        result("D", 400.0, 40.0, vec![]),
    ];
    let processed = process_results(&results, None);
    let summary = SummaryStatistics::from_results(&processed);

    assert_eq!(summary.total_features, 4);
    assert_eq!(summary.matched_features, 2);
    assert_eq!(summary.match_rate, 0.5);
    assert_eq!(summary.high_confidence, 1);
    assert_eq!(summary.algorithms.get("cosine"), Some(&2));
    let expected_mean = (processed[0].confidence + processed[1].confidence) / 2.0;
    assert!((summary.mean_confidence - expected_mean).abs() < 1e-12);

    assert_eq!(SummaryStatistics::from_results(&[]), SummaryStatistics::default());
}

fn sample_set() -> ResultSet {
    let results = vec![
        result(
            "FT001",
            181.0707,
            62.5,
            vec![candidate("CCMSLIB1", 0.912345678901, 5, 7), candidate("CCMSLIB2", 1.0 / 3.0, 2, 7)],
        ),
        result("FT002", 255.2319, 480.0, vec![]),
    ];
    ResultSet::new(
        Uuid::new_v4(),
        Algorithm::Cosine,
        None,
        process_results(&results, None),
    )
}

#[test]
fn test_csv_export() {
    let set = sample_set();
    let mut out = Vec::new();
    set.write_csv(&mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    let lines: Vec<&str> = text.lines().collect();

    assert_eq!(lines[0], "Feature,m/z,RT,Compound,Score,Algorithm,Confidence");
    assert!(lines[1].starts_with("FT001,181.0707,62.50,CCMSLIB1 compound,0.9123,cosine,"));
    assert_eq!(lines[2], "FT002,255.2319,480.00,,,cosine,0.0000");
    assert_eq!(lines.len(), 3);
}

#[test]
fn test_json_roundtrip_preserves_scores_and_order() {
    let set = sample_set();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("results.json");

    set.save_json(&path).unwrap();
    let loaded = ResultSet::load_json(&path).unwrap();

    assert_eq!(loaded, set);
    let names: Vec<_> = loaded.results.iter().map(|r| r.feature_name.as_str()).collect();
    assert_eq!(names, vec!["FT001", "FT002"]);
    assert_eq!(
        loaded.results[0].matches[1].score.to_bits(),
        (1.0f64 / 3.0).to_bits()
    );
}

#[test]
fn test_load_json_rejects_garbage() {
    assert!(matches!(
        ResultSet::from_json_reader("{\"results\": 3}".as_bytes()),
        Err(ExportError::JsonError(_))
    ));
}
