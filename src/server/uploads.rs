//! Upload storage: files land in the upload directory as `<kind>_<filename>`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::ApiError;

/// Upload size limit, in bytes
pub const MAX_UPLOAD_BYTES: usize = 500 * 1024 * 1024;

/// What an uploaded file is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadKind {
    /// XCMS peak table
    Xcms,
    /// mzXML run
    Mzxml,
    /// Spectral library
    Library,
}

impl UploadKind {
    /// Prefix used for stored files
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadKind::Xcms => "xcms",
            UploadKind::Mzxml => "mzxml",
            UploadKind::Library => "library",
        }
    }

    /// Accepted extensions, lowercase without the dot
    pub fn allowed_extensions(&self) -> &'static [&'static str] {
        match self {
            UploadKind::Xcms => &["csv"],
            UploadKind::Mzxml => &["mzxml"],
            UploadKind::Library => &["msp", "mgf", "json", "mzml"],
        }
    }

    /// File name under the upload directory
    pub fn stored_name(&self, filename: &str) -> String {
        format!("{}_{}", self.as_str(), filename)
    }
}

/// Metadata of a stored upload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredUpload {
    /// Name given by the client
    pub filename: String,
    /// Name under the upload directory
    pub stored_as: String,
    /// Size in bytes
    pub size: usize,
    /// Full path on disk
    #[serde(skip)]
    pub path: PathBuf,
}

/// Reject names that could escape the upload directory
pub fn validate_filename(name: &str) -> Result<(), ApiError> {
    if name.is_empty() {
        return Err(ApiError::bad_request("No filename provided"));
    }
    if name.contains('/') || name.contains('\\') || name.contains("..") || name.contains('\0') {
        return Err(ApiError::bad_request(format!("Invalid filename '{}'", name)));
    }
    Ok(())
}

/// Reject names whose extension does not fit `kind`
pub fn check_extension(kind: UploadKind, name: &str) -> Result<(), ApiError> {
    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if kind.allowed_extensions().contains(&ext.as_str()) {
        Ok(())
    } else {
        Err(ApiError::bad_request(format!(
            "Invalid {} file '{}': expected one of .{}",
            kind.as_str(),
            name,
            kind.allowed_extensions().join(", .")
        )))
    }
}

/// Validate and write an upload
pub async fn store(
    dir: &Path,
    kind: UploadKind,
    filename: &str,
    data: &[u8],
) -> Result<StoredUpload, ApiError> {
    validate_filename(filename)?;
    check_extension(kind, filename)?;
    if data.len() > MAX_UPLOAD_BYTES {
        return Err(ApiError::new(
            axum::http::StatusCode::PAYLOAD_TOO_LARGE,
            format!("File exceeds {} bytes", MAX_UPLOAD_BYTES),
        ));
    }

    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| ApiError::internal(format!("Cannot create upload directory: {}", e)))?;

    let stored_as = kind.stored_name(filename);
    let path = dir.join(&stored_as);
    tokio::fs::write(&path, data)
        .await
        .map_err(|e| ApiError::internal(format!("Cannot store {}: {}", stored_as, e)))?;

    log::info!("Stored {} upload {} ({} bytes)", kind.as_str(), stored_as, data.len());
    Ok(StoredUpload {
        filename: filename.to_string(),
        stored_as,
        size: data.len(),
        path,
    })
}

/// Find an uploaded file by its stored or original name
pub fn resolve(dir: &Path, kind: UploadKind, reference: &str) -> Result<PathBuf, ApiError> {
    validate_filename(reference)?;

    let prefix = format!("{}_", kind.as_str());
    let mut candidates = Vec::with_capacity(2);
    if reference.starts_with(&prefix) {
        candidates.push(dir.join(reference));
    }
    candidates.push(dir.join(kind.stored_name(reference)));

    candidates
        .into_iter()
        .find(|p| p.is_file())
        .ok_or_else(|| ApiError::not_found(format!("{} file not found: {}", kind.as_str(), reference)))
}
