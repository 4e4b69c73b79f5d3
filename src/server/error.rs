use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::extract::ExtractionError;
use crate::library::LibraryError;
use crate::matching::MatchingError;
use crate::mzxml::MzXmlError;
use crate::pipeline::PipelineError;
use crate::xcms::{ProcessingError, XcmsError};

/// An error answered as `{"detail": message}` with a status code
#[derive(Debug, thiserror::Error)]
#[error("{detail}")]
pub struct ApiError {
    /// HTTP status
    pub status: StatusCode,
    /// Message returned as `detail`
    pub detail: String,
}

impl ApiError {
    /// Error with an explicit status
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    /// 400 Bad Request
    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, detail)
    }

    /// 404 Not Found
    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, detail)
    }

    /// 500 Internal Server Error
    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, detail)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            log::error!("{}: {}", self.status, self.detail);
        }
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

impl From<MatchingError> for ApiError {
    fn from(err: MatchingError) -> Self {
        match err {
            MatchingError::ThreadPool(_) => Self::internal(err.to_string()),
            _ => Self::bad_request(err.to_string()),
        }
    }
}

// Malformed input files are the caller's problem (400); failing I/O is ours (500)

impl From<ExtractionError> for ApiError {
    fn from(err: ExtractionError) -> Self {
        match err {
            ExtractionError::XcmsError(e) => e.into(),
            ExtractionError::MzXmlError(MzXmlError::IoError(_)) => Self::internal(err.to_string()),
            ExtractionError::InvalidParameter(_) | ExtractionError::MzXmlError(_) => {
                Self::bad_request(err.to_string())
            }
        }
    }
}

impl From<LibraryError> for ApiError {
    fn from(err: LibraryError) -> Self {
        match err {
            LibraryError::IoError(_) => Self::internal(err.to_string()),
            _ => Self::bad_request(err.to_string()),
        }
    }
}

impl From<XcmsError> for ApiError {
    fn from(err: XcmsError) -> Self {
        match &err {
            XcmsError::IoError(_) => Self::internal(err.to_string()),
            XcmsError::CsvError(e) if e.is_io_error() => Self::internal(err.to_string()),
            _ => Self::bad_request(err.to_string()),
        }
    }
}

impl From<ProcessingError> for ApiError {
    fn from(err: ProcessingError) -> Self {
        let status = match err {
            ProcessingError::InvalidParameter(_) => StatusCode::BAD_REQUEST,
            ProcessingError::MissingInput(_) => StatusCode::NOT_FOUND,
            ProcessingError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ProcessingError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::XcmsError(e) => e.into(),
            PipelineError::LibraryError(e) => e.into(),
            PipelineError::ExtractionError(e) => e.into(),
            PipelineError::MatchingError(e) => e.into(),
        }
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::internal(format!("background task failed: {}", err))
    }
}
