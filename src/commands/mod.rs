//! CLI command implementations for blobgate.
//!
//! - [`serve`] - run the REST API
//! - [`transfer`] - zip export and import from the command line
//! - [`check`] - config validation

pub mod check;
pub mod serve;
pub mod transfer;

use crate::LogFormat;

/// Initialize stdout logging. `RUST_LOG` overrides `level`.
pub fn init_logging(level: &str, format: LogFormat) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(fmt::layer()).init(),
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
    }
}
