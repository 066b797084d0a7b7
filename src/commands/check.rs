//! `blobgate check-config`

use anyhow::Result;
use std::path::Path;

use blobgate::config::Config;

/// Validates a config file, printing warnings. Fails on errors.
pub fn execute(config_path: &Path) -> Result<()> {
    let config = Config::load_from(config_path)?;
    let validation = config.validate()?;

    for warning in &validation.warnings {
        eprintln!("warning: {warning}");
    }
    println!(
        "{}: OK ({} services{})",
        config_path.display(),
        config.services.len(),
        if validation.has_warnings() {
            format!(", {} warnings", validation.warnings.len())
        } else {
            String::new()
        }
    );
    Ok(())
}
