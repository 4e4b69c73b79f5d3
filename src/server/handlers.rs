use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Multipart, Query, State};
use axum::response::Response;
use axum::Json;
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use super::uploads::{self, StoredUpload, UploadKind};
use super::{ApiError, AppState};
use crate::extract::{extract_ms2_spectra, ExtractionStats, Ms2ExtractionConfig};
use crate::library::{Library, LibraryInfo};
use crate::matching::{Algorithm, FallbackNotice, MatchResult, MatchingConfig};
use crate::pipeline::MatchingPipeline;
use crate::results::{ProcessedResult, SummaryStatistics};
use crate::xcms::{PeakTable, XcmsOutput, XcmsPeak, XcmsProcessor};

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Fields present in `patch` replace those of `base`; absent fields keep the server setting
fn overlay<T: Serialize + DeserializeOwned + Clone>(
    base: &T,
    patch: Option<&Value>,
) -> Result<T, ApiError> {
    let Some(patch) = patch else {
        return Ok(base.clone());
    };
    let Value::Object(fields) = patch else {
        return Err(ApiError::bad_request("config must be a JSON object"));
    };
    let mut merged = serde_json::to_value(base).map_err(|e| ApiError::internal(e.to_string()))?;
    if let Value::Object(target) = &mut merged {
        for (key, value) in fields {
            target.insert(key.clone(), value.clone());
        }
    }
    serde_json::from_value(merged)
        .map_err(|e| ApiError::bad_request(format!("invalid config: {}", e)))
}

/// `GET /`: service name and version
pub async fn root() -> Json<Value> {
    Json(json!({
        "message": "ms2match spectral matching API",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// `GET /health`
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

// Uploads

/// Pull the first file field out of a multipart body
async fn read_file_field(multipart: &mut Multipart) -> Result<(String, Vec<u8>), ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart body: {}", e)))?
    {
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("Failed to read upload: {}", e)))?;
        return Ok((filename, data.to_vec()));
    }
    Err(ApiError::bad_request("No file provided"))
}

async fn receive(
    state: &AppState,
    kind: UploadKind,
    multipart: &mut Multipart,
) -> Result<StoredUpload, ApiError> {
    let (filename, data) = read_file_field(multipart).await?;
    uploads::store(&state.config.upload_dir, kind, &filename, &data).await
}

/// `POST /api/upload/xcms`
pub async fn upload_xcms(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> ApiResult<StoredUpload> {
    Ok(Json(receive(&state, UploadKind::Xcms, &mut multipart).await?))
}

/// `POST /api/upload/mzxml`
pub async fn upload_mzxml(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> ApiResult<StoredUpload> {
    Ok(Json(receive(&state, UploadKind::Mzxml, &mut multipart).await?))
}

/// Upload answer for a library, with its load report
#[derive(Debug, Serialize)]
pub struct LibraryUploadResponse {
    /// Stored file
    #[serde(flatten)]
    pub upload: StoredUpload,
    /// Whether at least one spectrum loaded
    pub valid: bool,
    /// Usable spectra
    pub spectra_count: usize,
    /// Records seen
    pub total: usize,
    /// Records rejected
    pub skipped: usize,
    /// Why loading failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Store a library and report whether it parses
pub async fn upload_library(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> ApiResult<LibraryUploadResponse> {
    let upload = receive(&state, UploadKind::Library, &mut multipart).await?;
    let path = upload.path.clone();
    let loaded = tokio::task::spawn_blocking(move || Library::load(path)).await?;

    let response = match loaded {
        Ok(library) => {
            let report = library.report();
            LibraryUploadResponse {
                valid: true,
                spectra_count: library.len(),
                total: report.total,
                skipped: report.skipped,
                error: None,
                upload,
            }
        }
        Err(err) => {
            warn!("Uploaded library {} is not usable: {}", upload.stored_as, err);
            LibraryUploadResponse {
                valid: false,
                spectra_count: 0,
                total: 0,
                skipped: 0,
                error: Some(err.to_string()),
                upload,
            }
        }
    };
    Ok(Json(response))
}

// Peak table

/// Query of `GET /api/xcms/peaks`
#[derive(Debug, Deserialize)]
pub struct PeaksQuery {
    /// Uploaded peak table name
    pub xcms_file: String,
}

/// Peaks of one table
#[derive(Debug, Serialize)]
pub struct PeaksResponse {
    /// Rows in file order
    pub peaks: Vec<XcmsPeak>,
}

/// `GET /api/xcms/peaks`: rows of an uploaded peak table
pub async fn xcms_peaks(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PeaksQuery>,
) -> ApiResult<PeaksResponse> {
    let path = uploads::resolve(&state.config.upload_dir, UploadKind::Xcms, &query.xcms_file)?;
    let table = tokio::task::spawn_blocking(move || PeakTable::load(path)).await??;
    Ok(Json(PeaksResponse {
        peaks: table.peaks().to_vec(),
    }))
}

// Extraction

/// Body of `POST /api/ms2/extract`
#[derive(Debug, Deserialize)]
pub struct ExtractRequest {
    /// Uploaded mzXML name
    pub mzxml_file: String,
    /// Uploaded peak table name
    pub xcms_file: String,
    /// Precursor m/z tolerance in Dalton
    pub mz_tolerance: Option<f64>,
    /// Retention time tolerance in seconds
    pub rt_tolerance: Option<f64>,
    /// Fragment intensity floor
    pub min_intensity: Option<f64>,
}

impl ExtractRequest {
    fn config(&self, defaults: Ms2ExtractionConfig) -> Ms2ExtractionConfig {
        Ms2ExtractionConfig {
            mz_tolerance: self.mz_tolerance.unwrap_or(defaults.mz_tolerance),
            rt_tolerance: self.rt_tolerance.unwrap_or(defaults.rt_tolerance),
            min_intensity: self.min_intensity.unwrap_or(defaults.min_intensity),
        }
    }
}

/// One extracted spectrum
#[derive(Debug, Serialize)]
pub struct ExtractedSpectrum {
    /// Feature name
    pub feature_name: String,
    /// Precursor m/z
    pub precursor_mz: f64,
    /// Retention time in seconds
    pub rt: f64,
    /// Fragment m/z values
    pub mz: Vec<f64>,
    /// Fragment intensities
    pub intensities: Vec<f64>,
    /// Number of fragments
    pub n_peaks: usize,
}

/// Extraction answer
#[derive(Debug, Serialize)]
pub struct ExtractResponse {
    /// Number of spectra
    pub spectra_count: usize,
    /// Spectra in feature order
    pub spectra: Vec<ExtractedSpectrum>,
    /// Extraction counters
    pub stats: ExtractionStats,
}

/// `POST /api/ms2/extract`: assign MS2 scans to features
pub async fn extract_ms2(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ExtractRequest>,
) -> ApiResult<ExtractResponse> {
    let config = request.config(state.extraction);
    config.validate()?;
    let dir = &state.config.upload_dir;
    let mzxml = uploads::resolve(dir, UploadKind::Mzxml, &request.mzxml_file)?;
    let xcms = uploads::resolve(dir, UploadKind::Xcms, &request.xcms_file)?;

    let result = tokio::task::spawn_blocking(move || -> Result<_, ApiError> {
        let table = PeakTable::load(&xcms)?;
        Ok(extract_ms2_spectra(&mzxml, &table, &config)?)
    })
    .await??;

    let spectra: Vec<ExtractedSpectrum> = result
        .spectra
        .into_iter()
        .map(|q| ExtractedSpectrum {
            n_peaks: q.n_peaks(),
            mz: q.spectrum.mz().to_vec(),
            intensities: q.spectrum.intensities().to_vec(),
            feature_name: q.feature_name,
            precursor_mz: q.precursor_mz,
            rt: q.rt,
        })
        .collect();

    Ok(Json(ExtractResponse {
        spectra_count: spectra.len(),
        spectra,
        stats: result.stats,
    }))
}

// Matching

/// Body of `POST /api/match/spectra`
#[derive(Debug, Deserialize)]
pub struct MatchRequest {
    /// Uploaded mzXML name
    pub mzxml_file: String,
    /// Uploaded peak table name
    pub xcms_file: String,
    /// Uploaded library name
    pub library_file: String,
    /// Algorithm, overriding `config.algorithm`
    pub algorithm: Option<Algorithm>,
    /// Matching fields to change from the server settings
    pub config: Option<Value>,
    /// Extraction fields to change from the server settings
    pub extraction: Option<Value>,
}

impl MatchRequest {
    /// Request settings over server defaults; the model path is server-side only
    pub(super) fn matching_config(
        &self,
        defaults: &MatchingConfig,
    ) -> Result<MatchingConfig, ApiError> {
        let mut config = overlay(defaults, self.config.as_ref())?;
        if let Some(algorithm) = self.algorithm {
            config.algorithm = algorithm;
        }
        config.model_path = defaults.model_path.clone();
        Ok(config)
    }
}

/// Matching answer
#[derive(Debug, Serialize)]
pub struct MatchResponse {
    /// Job id shared with progress events
    pub job_id: Uuid,
    /// Algorithm actually used
    pub algorithm: Algorithm,
    /// Set when the model fell back to cosine
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackNotice>,
    /// Raw per-query results
    pub matches: Vec<MatchResult>,
    /// Per-feature results with confidence
    pub processed_results: Vec<ProcessedResult>,
    /// Aggregates
    pub summary: SummaryStatistics,
    /// Extraction counters
    pub extraction: ExtractionStats,
    /// Library summary
    pub library: LibraryInfo,
}

/// `POST /api/match/spectra`: extract, match and summarise
pub async fn match_spectra(
    State(state): State<Arc<AppState>>,
    Json(request): Json<MatchRequest>,
) -> ApiResult<MatchResponse> {
    let matching = request.matching_config(&state.matching)?;
    matching.validate()?;
    let extraction = overlay(&state.extraction, request.extraction.as_ref())?;
    extraction.validate()?;

    let dir = &state.config.upload_dir;
    let mzxml = uploads::resolve(dir, UploadKind::Mzxml, &request.mzxml_file)?;
    let xcms = uploads::resolve(dir, UploadKind::Xcms, &request.xcms_file)?;
    let library = uploads::resolve(dir, UploadKind::Library, &request.library_file)?;

    let job_id = Uuid::new_v4();
    info!("Match job {} started ({})", job_id, matching.algorithm);
    let pipeline = MatchingPipeline::new(extraction, matching)
        .with_job_id(job_id)
        .with_progress(state.progress.job_sender());

    let run = tokio::task::spawn_blocking(move || pipeline.run_files(&mzxml, &xcms, &library))
        .await??;

    Ok(Json(MatchResponse {
        job_id: run.job_id,
        algorithm: run.results.algorithm,
        fallback: run.fallback,
        matches: run.matches,
        summary: run.results.summary,
        processed_results: run.results.results,
        extraction: run.extraction,
        library: run.library,
    }))
}

// XCMS processing

/// Body of `POST /api/xcms/process`
#[derive(Debug, Deserialize)]
pub struct ProcessRequest {
    /// Uploaded mzXML names
    pub mzxml_files: Vec<String>,
    /// XCMS fields to change from the server settings
    pub config: Option<Value>,
}

/// `POST /api/xcms/process`: run XCMS through Rscript
pub async fn xcms_process(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ProcessRequest>,
) -> ApiResult<XcmsOutput> {
    let config = overlay(&state.xcms, request.config.as_ref())?;
    config.validate()?;
    let files: Vec<PathBuf> = request
        .mzxml_files
        .iter()
        .map(|name| uploads::resolve(&state.config.upload_dir, UploadKind::Mzxml, name))
        .collect::<Result<_, _>>()?;

    let processor = XcmsProcessor::new()
        .with_rscript(&state.config.rscript)
        .with_timeout(state.config.xcms_timeout());
    let output_dir = state.config.output_dir.clone();

    let output =
        tokio::task::spawn_blocking(move || processor.process(&files, &output_dir, &config))
            .await??;
    Ok(Json(output))
}

// Progress

/// `GET /ws/progress`: stream progress events as JSON text frames
pub async fn ws_progress(
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| stream_progress(socket, state))
}

async fn stream_progress(mut socket: WebSocket, state: Arc<AppState>) {
    let mut events = state.progress.subscribe();
    loop {
        match events.recv().await {
            Ok(event) => {
                let Ok(text) = serde_json::to_string(&event) else {
                    continue;
                };
                if socket.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                debug!("Progress subscriber lagged by {} events", skipped);
            }
            Err(RecvError::Closed) => break,
        }
    }
}
