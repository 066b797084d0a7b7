//! `blobgate serve`

use anyhow::Result;
use std::path::Path;
use tracing::{info, warn};

use super::init_logging;
use crate::LogFormat;
use blobgate::config::Config;

/// Loads and validates the config, then serves until Ctrl-C.
pub async fn execute(config_path: &Path, port: Option<u16>, format: LogFormat) -> Result<()> {
    let mut config = Config::load_from(config_path)?;
    if let Some(port) = port {
        config.server.port = port;
    }

    init_logging(&config.server.log_level, format);
    let validation = config.validate()?;
    for warning in &validation.warnings {
        warn!("{warning}");
    }

    info!(
        config = %config_path.display(),
        services = config.services.len(),
        "Starting blobgate"
    );
    blobgate::http::serve(&config).await
}
