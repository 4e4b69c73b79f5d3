use std::path::Path;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use base64::prelude::*;
use serde_json::json;

use super::handlers::*;
use super::uploads::{self, UploadKind};
use super::{ApiError, AppState, ProgressHub, ServerConfig};
use crate::extract::ExtractionError;
use crate::library::LibraryError;
use crate::matching::{Algorithm, MatchingConfig, ToleranceUnit};
use crate::mzxml::MzXmlError;
use crate::xcms::XcmsError;
use crate::progress::ProgressEvent;
use crate::xcms::ProcessingError;

fn encode_peaks(pairs: &[(f64, f64)]) -> String {
    let bytes: Vec<u8> = pairs
        .iter()
        .flat_map(|&(mz, i)| {
            let mut b = (mz as f32).to_be_bytes().to_vec();
            b.extend_from_slice(&(i as f32).to_be_bytes());
            b
        })
        .collect();
    BASE64_STANDARD.encode(bytes)
}

fn mzxml() -> String {
    let peaks = encode_peaks(&[(75.0, 900.0), (120.0, 400.0), (163.0, 50.0)]);
    format!(
        r#"<?xml version="1.0"?>
<mzXML>
  <msRun scanCount="1">
    <scan num="7" msLevel="2" peaksCount="3" retentionTime="PT61S">
      <precursorMz>181.0707</precursorMz>
      <peaks precision="32" byteOrder="network" contentType="m/z-int">{peaks}</peaks>
    </scan>
  </msRun>
</mzXML>"#
    )
}

const PEAK_TABLE: &str = "name,mz,mzmin,mzmax,rt,rtmin,rtmax,npeaks,s1\n\
FT001,181.0707,181.0700,181.0714,60.0,55.0,65.0,1,15000\n\
FT002,300.1000,300.0990,300.1010,400.0,395.0,405.0,1,NA\n";

const LIBRARY: &str = "Name: Glucose\n\
PrecursorMZ: 181.0707\n\
Num Peaks: 2\n\
75.0 900\n\
120.0 400\n\
\n\
Name: Other\n\
PrecursorMZ: 500.0\n\
Num Peaks: 1\n\
300.0 100\n";

async fn state_with_uploads(dir: &Path) -> Arc<AppState> {
    uploads::store(dir, UploadKind::Mzxml, "run.mzXML", mzxml().as_bytes())
        .await
        .unwrap();
    uploads::store(dir, UploadKind::Xcms, "peaks.csv", PEAK_TABLE.as_bytes())
        .await
        .unwrap();
    uploads::store(dir, UploadKind::Library, "lib.msp", LIBRARY.as_bytes())
        .await
        .unwrap();

    let config = ServerConfig {
        upload_dir: dir.to_path_buf(),
        output_dir: dir.join("out"),
        ..Default::default()
    };
    Arc::new(AppState::new(config))
}

#[test]
fn test_filename_rules() {
    assert!(uploads::validate_filename("run.mzXML").is_ok());
    for bad in ["", "../etc/passwd", "a/b.csv", "a\\b.csv", "x..csv"] {
        let err = uploads::validate_filename(bad).unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }
    assert!(uploads::check_extension(UploadKind::Library, "LIB.MGF").is_ok());
    assert!(uploads::check_extension(UploadKind::Xcms, "table.tsv").is_err());
    assert!(uploads::check_extension(UploadKind::Mzxml, "run.mzML").is_err());
}

#[tokio::test]
async fn test_store_and_resolve() {
    let dir = tempfile::tempdir().unwrap();
    let stored = uploads::store(dir.path(), UploadKind::Xcms, "peaks.csv", b"a,b\n")
        .await
        .unwrap();
    assert_eq!(stored.stored_as, "xcms_peaks.csv");
    assert_eq!(stored.size, 4);
    assert!(dir.path().join("xcms_peaks.csv").is_file());

    let by_original = uploads::resolve(dir.path(), UploadKind::Xcms, "peaks.csv").unwrap();
    let by_stored = uploads::resolve(dir.path(), UploadKind::Xcms, "xcms_peaks.csv").unwrap();
    assert_eq!(by_original, by_stored);

    let missing = uploads::resolve(dir.path(), UploadKind::Xcms, "nope.csv").unwrap_err();
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
    let wrong_kind = uploads::resolve(dir.path(), UploadKind::Library, "peaks.csv").unwrap_err();
    assert_eq!(wrong_kind.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_store_rejects_bad_extension() {
    let dir = tempfile::tempdir().unwrap();
    let err = uploads::store(dir.path(), UploadKind::Library, "lib.txt", b"")
        .await
        .unwrap_err();
    assert_eq!(err.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_root_and_health() {
    let Json(root) = root().await;
    assert_eq!(root["version"], env!("CARGO_PKG_VERSION"));
    let Json(health) = health().await;
    assert_eq!(health["status"], "healthy");
}

#[tokio::test]
async fn test_peaks_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    let state = state_with_uploads(dir.path()).await;

    let Json(response) = xcms_peaks(
        State(state.clone()),
        Query(PeaksQuery {
            xcms_file: "peaks.csv".into(),
        }),
    )
    .await
    .unwrap();
    assert_eq!(response.peaks.len(), 2);
    assert_eq!(response.peaks[0].name, "FT001");

    let err = xcms_peaks(
        State(state),
        Query(PeaksQuery {
            xcms_file: "missing.csv".into(),
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_extract_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    let state = state_with_uploads(dir.path()).await;

    let Json(response) = extract_ms2(
        State(state.clone()),
        Json(ExtractRequest {
            mzxml_file: "run.mzXML".into(),
            xcms_file: "xcms_peaks.csv".into(),
            mz_tolerance: None,
            rt_tolerance: None,
            min_intensity: Some(100.0),
        }),
    )
    .await
    .unwrap();

    assert_eq!(response.spectra_count, 1);
    let spectrum = &response.spectra[0];
    assert_eq!(spectrum.feature_name, "FT001");
    assert_eq!(spectrum.mz, vec![75.0, 120.0]);
    assert_eq!(spectrum.n_peaks, 2);
    assert_eq!(response.stats.ms2_scans, 1);

    let err = extract_ms2(
        State(state),
        Json(ExtractRequest {
            mzxml_file: "run.mzXML".into(),
            xcms_file: "peaks.csv".into(),
            mz_tolerance: Some(5.0),
            rt_tolerance: None,
            min_intensity: None,
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_match_endpoint_with_fallback() {
    let dir = tempfile::tempdir().unwrap();
    let state = state_with_uploads(dir.path()).await;
    let mut progress = state.progress.subscribe();

    let Json(response) = match_spectra(
        State(state.clone()),
        Json(MatchRequest {
            mzxml_file: "run.mzXML".into(),
            xcms_file: "peaks.csv".into(),
            library_file: "lib.msp".into(),
            algorithm: Some(Algorithm::MlAssisted),
            config: None,
            extraction: None,
        }),
    )
    .await
    .unwrap();

    assert_eq!(response.algorithm, Algorithm::Cosine);
    assert!(response.fallback.is_some());
    assert_eq!(response.matches.len(), 1);
    let best = response.matches[0].best_match.as_ref().unwrap();
    assert_eq!(best.compound_name.as_deref(), Some("Glucose"));
    assert_eq!(best.matched_peaks, 2);
    assert_eq!(response.processed_results[0].xcms_peak.as_ref().unwrap().name, "FT001");
    assert_eq!(response.summary.total_features, 1);
    assert_eq!(response.library.count, 2);

    let event = tokio::time::timeout(std::time::Duration::from_secs(5), progress.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.job_id, response.job_id);
    assert_eq!(event.completed, 1);
}

#[tokio::test]
async fn test_match_endpoint_validation() {
    let dir = tempfile::tempdir().unwrap();
    let state = state_with_uploads(dir.path()).await;

    let request = |top_n: usize, library: &str| MatchRequest {
        mzxml_file: "run.mzXML".into(),
        xcms_file: "peaks.csv".into(),
        library_file: library.into(),
        algorithm: Some(Algorithm::Cosine),
        config: Some(json!({ "top_n": top_n })),
        extraction: None,
    };

    let err = match_spectra(State(state.clone()), Json(request(0, "lib.msp")))
        .await
        .unwrap_err();
    assert_eq!(err.status, StatusCode::BAD_REQUEST);

    let err = match_spectra(State(state), Json(request(5, "absent.msp")))
        .await
        .unwrap_err();
    assert_eq!(err.status, StatusCode::NOT_FOUND);
}

#[test]
fn test_partial_config_keeps_server_settings() {
    let server = MatchingConfig {
        algorithm: Algorithm::ModifiedCosine,
        mz_tolerance: 20.0,
        tolerance_unit: ToleranceUnit::Ppm,
        rt_tolerance: 12.0,
        threads: Some(2),
        model_path: Some("server-model.json".into()),
        ..Default::default()
    };
    let request = MatchRequest {
        mzxml_file: "run.mzXML".into(),
        xcms_file: "peaks.csv".into(),
        library_file: "lib.msp".into(),
        algorithm: None,
        config: Some(json!({ "top_n": 5, "model_path": "client.json" })),
        extraction: None,
    };

    let merged = request.matching_config(&server).unwrap();
    assert_eq!(merged.top_n, 5);
    assert_eq!(merged.algorithm, Algorithm::ModifiedCosine);
    assert_eq!(merged.tolerance_unit, ToleranceUnit::Ppm);
    assert_eq!(merged.mz_tolerance, 20.0);
    assert_eq!(merged.rt_tolerance, 12.0);
    assert_eq!(merged.threads, Some(2));
    assert_eq!(merged.model_path, server.model_path);

    let bad_type = MatchRequest {
        config: Some(json!({ "top_n": "five" })),
        ..request
    };
    assert_eq!(
        bad_type.matching_config(&server).unwrap_err().status,
        StatusCode::BAD_REQUEST
    );
    let not_object = MatchRequest {
        config: Some(json!([1, 2])),
        ..bad_type
    };
    assert_eq!(
        not_object.matching_config(&server).unwrap_err().status,
        StatusCode::BAD_REQUEST
    );
}

#[tokio::test]
async fn test_malformed_library_is_a_bad_request() {
    let dir = tempfile::tempdir().unwrap();
    let state = state_with_uploads(dir.path()).await;
    uploads::store(dir.path(), UploadKind::Library, "broken.json", b"{ not json")
        .await
        .unwrap();

    let err = match_spectra(
        State(state),
        Json(MatchRequest {
            mzxml_file: "run.mzXML".into(),
            xcms_file: "peaks.csv".into(),
            library_file: "broken.json".into(),
            algorithm: Some(Algorithm::Cosine),
            config: None,
            extraction: None,
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status, StatusCode::BAD_REQUEST);
}

#[test]
fn test_input_error_status() {
    let io = || std::io::Error::other("disk");
    let cases: Vec<(ApiError, StatusCode)> = vec![
        (
            ExtractionError::MzXmlError(MzXmlError::InvalidStructure("scan".into())).into(),
            StatusCode::BAD_REQUEST,
        ),
        (
            ExtractionError::MzXmlError(MzXmlError::IoError(io())).into(),
            StatusCode::INTERNAL_SERVER_ERROR,
        ),
        (
            ExtractionError::XcmsError(XcmsError::MissingColumn("mz".into())).into(),
            StatusCode::BAD_REQUEST,
        ),
        (
            LibraryError::JsonError(serde_json::from_str::<serde_json::Value>("{").unwrap_err())
                .into(),
            StatusCode::BAD_REQUEST,
        ),
        (LibraryError::IoError(io()).into(), StatusCode::INTERNAL_SERVER_ERROR),
        (XcmsError::IoError(io()).into(), StatusCode::INTERNAL_SERVER_ERROR),
    ];
    for (err, status) in cases {
        assert_eq!(err.status, status, "{}", err);
    }
}

#[test]
fn test_processing_error_status() {
    let cases = [
        (ProcessingError::Timeout(3600), StatusCode::GATEWAY_TIMEOUT),
        (
            ProcessingError::Unavailable("Rscript not found".into()),
            StatusCode::SERVICE_UNAVAILABLE,
        ),
        (
            ProcessingError::InvalidParameter("ppm".into()),
            StatusCode::BAD_REQUEST,
        ),
        (
            ProcessingError::MissingInput("a.mzXML".into()),
            StatusCode::NOT_FOUND,
        ),
        (ProcessingError::MissingOutput, StatusCode::INTERNAL_SERVER_ERROR),
    ];
    for (err, status) in cases {
        assert_eq!(ApiError::from(err).status, status);
    }
}

#[test]
fn test_progress_hub_forwards_job_events() {
    let hub = ProgressHub::new();
    let mut rx = hub.subscribe();
    let sender = hub.job_sender();
    let job = uuid::Uuid::new_v4();

    sender
        .send(ProgressEvent::new(job, 1, 2, "half"))
        .unwrap();
    drop(sender);

    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
    let event = loop {
        match rx.try_recv() {
            Ok(event) => break event,
            Err(_) if std::time::Instant::now() < deadline => {
                std::thread::sleep(std::time::Duration::from_millis(5))
            }
            Err(e) => panic!("no progress event: {}", e),
        }
    };
    assert_eq!(event.job_id, job);
    assert_eq!(event.fraction, 0.5);
}
