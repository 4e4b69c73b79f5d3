use anyhow::{Context, Result};

use ms2match::extract::Ms2ExtractionConfig;
use ms2match::matching::MatchingConfig;
use ms2match::server::{self, AppState, ServerConfig};
use ms2match::xcms::XcmsProcessingConfig;

/// Run the HTTP service until interrupted
pub fn run(
    config: ServerConfig,
    matching: MatchingConfig,
    extraction: Ms2ExtractionConfig,
    xcms: XcmsProcessingConfig,
) -> Result<()> {
    matching.validate()?;
    extraction.validate()?;
    xcms.validate()?;

    let state = AppState::new(config)
        .with_matching(matching)
        .with_extraction(extraction)
        .with_xcms(xcms);

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    runtime
        .block_on(server::serve(state))
        .context("HTTP server failed")
}
