//! TOML configuration file support.
//!
//! Settings can be kept in a config file instead of passed as flags; flags
//! given on the command line win over file values:
//!
//! ```toml
//! # ms2match.toml
//! [matching]
//! algorithm = "modified_cosine"
//! mz_tolerance = 0.02
//! top_n = 5
//!
//! [extraction]
//! rt_tolerance = 20.0
//! min_intensity = 50.0
//!
//! [xcms]
//! ppm = 15.0
//!
//! [server]
//! port = 8080
//! upload_dir = "/var/lib/ms2match/uploads"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use ms2match::extract::Ms2ExtractionConfig;
use ms2match::matching::MatchingConfig;
#[cfg(feature = "server")]
use ms2match::server::ServerConfig;
use ms2match::xcms::XcmsProcessingConfig;

/// Config file looked up in the working directory when `--config` is absent
pub const DEFAULT_CONFIG_FILE: &str = "ms2match.toml";

/// Root configuration structure for ms2match.toml files.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub matching: MatchingConfig,

    #[serde(default)]
    pub extraction: Ms2ExtractionConfig,

    #[serde(default)]
    pub xcms: XcmsProcessingConfig,

    #[cfg(feature = "server")]
    #[serde(default)]
    pub server: ServerConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse TOML configuration")
    }

    /// The explicit file, else `ms2match.toml` if present, else defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.is_file() {
                    log::info!("Using {}", default.display());
                    Self::from_file(default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }
}
