//! # HTTP Service
//!
//! axum application exposing upload, peak table, extraction, matching and
//! XCMS processing endpoints, plus a `/ws/progress` WebSocket that streams
//! [`ProgressEvent`](crate::progress::ProgressEvent)s of running jobs.
//!
//! All per-process state lives in [`AppState`], shared with handlers as
//! `State<Arc<AppState>>`.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use crossbeam_channel::Sender;
use log::info;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;

use crate::extract::Ms2ExtractionConfig;
use crate::matching::MatchingConfig;
use crate::progress::ProgressEvent;
use crate::xcms::process::DEFAULT_TIMEOUT;
use crate::xcms::XcmsProcessingConfig;

mod error;
mod handlers;
pub mod uploads;

#[cfg(test)]
mod tests;

pub use error::ApiError;
pub use uploads::{UploadKind, MAX_UPLOAD_BYTES};

/// Progress events buffered per WebSocket subscriber
const PROGRESS_BUFFER: usize = 256;

/// `[server]` configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub host: String,
    /// Bind port
    pub port: u16,
    /// Where uploads are stored
    pub upload_dir: PathBuf,
    /// Where XCMS runs publish their peak tables
    pub output_dir: PathBuf,
    /// `Rscript` executable
    pub rscript: PathBuf,
    /// XCMS wall-clock limit in seconds
    pub xcms_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            upload_dir: PathBuf::from("uploads"),
            output_dir: PathBuf::from("xcms_output"),
            rscript: PathBuf::from("Rscript"),
            xcms_timeout_secs: DEFAULT_TIMEOUT.as_secs(),
        }
    }
}

impl ServerConfig {
    /// XCMS wall-clock limit
    pub fn xcms_timeout(&self) -> Duration {
        Duration::from_secs(self.xcms_timeout_secs)
    }
}

/// Fan-out of job progress to WebSocket subscribers
#[derive(Debug, Clone)]
pub struct ProgressHub {
    tx: broadcast::Sender<ProgressEvent>,
}

impl Default for ProgressHub {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressHub {
    /// Hub with no subscribers
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(PROGRESS_BUFFER);
        Self { tx }
    }

    /// Receive every event published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.tx.subscribe()
    }

    /// Broadcast an event; dropped when nobody listens
    pub fn publish(&self, event: ProgressEvent) {
        // No subscribers is not an error
        let _ = self.tx.send(event);
    }

    /// A crossbeam sender for the matching engine, forwarded to subscribers
    /// until every clone of it is dropped
    pub fn job_sender(&self) -> Sender<ProgressEvent> {
        let (tx, rx) = crossbeam_channel::unbounded::<ProgressEvent>();
        let hub = self.clone();
        thread::spawn(move || {
            for event in rx {
                hub.publish(event);
            }
        });
        tx
    }
}

/// Shared application context
#[derive(Debug, Clone)]
pub struct AppState {
    /// `[server]` settings
    pub config: ServerConfig,
    /// Server-side matching settings; request `config` fields override them one by one
    pub matching: MatchingConfig,
    /// Server-side extraction settings
    pub extraction: Ms2ExtractionConfig,
    /// Server-side XCMS settings
    pub xcms: XcmsProcessingConfig,
    /// Progress broadcast for WebSocket clients
    pub progress: ProgressHub,
}

impl AppState {
    /// State with default matching, extraction and XCMS settings
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            matching: MatchingConfig::default(),
            extraction: Ms2ExtractionConfig::default(),
            xcms: XcmsProcessingConfig::default(),
            progress: ProgressHub::new(),
        }
    }

    /// Replace the matching settings
    pub fn with_matching(mut self, matching: MatchingConfig) -> Self {
        self.matching = matching;
        self
    }

    /// Replace the extraction settings
    pub fn with_extraction(mut self, extraction: Ms2ExtractionConfig) -> Self {
        self.extraction = extraction;
        self
    }

    /// Replace the XCMS settings
    pub fn with_xcms(mut self, xcms: XcmsProcessingConfig) -> Self {
        self.xcms = xcms;
        self
    }
}

/// Build the application router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/api/upload/xcms", post(handlers::upload_xcms))
        .route("/api/upload/mzxml", post(handlers::upload_mzxml))
        .route("/api/upload/library", post(handlers::upload_library))
        .route("/api/xcms/peaks", get(handlers::xcms_peaks))
        .route("/api/xcms/process", post(handlers::xcms_process))
        .route("/api/extract/ms2", post(handlers::extract_ms2))
        .route("/api/match/spectra", post(handlers::match_spectra))
        .route("/ws/progress", get(handlers::ws_progress))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// Bind and serve until Ctrl-C
pub async fn serve(state: AppState) -> std::io::Result<()> {
    let addr: SocketAddr = format!("{}:{}", state.config.host, state.config.port)
        .parse()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

    tokio::fs::create_dir_all(&state.config.upload_dir).await?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", listener.local_addr()?);
    info!("Uploads stored in {}", state.config.upload_dir.display());

    axum::serve(listener, router(Arc::new(state)))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
}
