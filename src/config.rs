//! Configuration types for blobgate.
//!
//! This module provides configuration structs for loading and validating
//! `blobgate.toml`. It includes:
//!
//! - [`Config`] - Root configuration struct
//! - [`ServerConfig`] - HTTP server settings
//! - [`ServiceConfig`] - One named storage service
//!
//! All configuration types support serde deserialization and provide
//! sensible defaults suitable for development use.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Default config file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "blobgate.toml";

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 9920;

/// Default request body limit for uploads (256 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 256 * 1024 * 1024;

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Non-fatal warnings that should be logged but don't prevent operation.
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Returns true if there are any warnings.
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// blobgate.toml configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default, rename = "service")]
    pub services: Vec<ServiceConfig>,
}

/// HTTP server settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Host patterns `url=` uploads may fetch from (`*`, `*.example.com`,
    /// `files.example.com`). Empty disables remote fetches.
    #[serde(default)]
    pub allowed_url_hosts: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_upload_bytes: default_max_upload_bytes(),
            log_level: default_log_level(),
            allowed_url_hosts: Vec::new(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_max_upload_bytes() -> usize {
    DEFAULT_MAX_UPLOAD_BYTES
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Storage medium behind a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    Local,
    S3,
    Azure,
    Memory,
}

impl std::fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Local => "local",
            Self::S3 => "s3",
            Self::Azure => "azure",
            Self::Memory => "memory",
        };
        f.write_str(name)
    }
}

/// A named storage service, served at `/api/v2/{name}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub kind: ServiceKind,

    // local
    #[serde(default)]
    pub root: Option<PathBuf>,

    // s3
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub access_key_id_env: Option<String>,
    #[serde(default)]
    pub secret_access_key: Option<String>,
    #[serde(default)]
    pub secret_access_key_env: Option<String>,

    // azure
    #[serde(default)]
    pub account_name: Option<String>,
    #[serde(default)]
    pub account_key: Option<String>,
    #[serde(default)]
    pub account_key_env: Option<String>,
    #[serde(default)]
    pub container: Option<String>,

    // s3 + azure
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl ServiceConfig {
    /// Creates an in-memory service record.
    pub fn memory(name: impl Into<String>) -> Self {
        Self::new(name, ServiceKind::Memory)
    }

    /// Creates a local filesystem service record.
    pub fn local(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
            ..Self::new(name, ServiceKind::Local)
        }
    }

    fn new(name: impl Into<String>, kind: ServiceKind) -> Self {
        Self {
            name: name.into(),
            kind,
            root: None,
            bucket: None,
            region: None,
            access_key_id: None,
            access_key_id_env: None,
            secret_access_key: None,
            secret_access_key_env: None,
            account_name: None,
            account_key: None,
            account_key_env: None,
            container: None,
            endpoint: None,
        }
    }

    /// Resolves a secret from its inline value or the named environment variable.
    pub fn secret(value: Option<&str>, env: Option<&str>) -> Option<String> {
        value
            .map(str::to_string)
            .or_else(|| env.and_then(|var| std::env::var(var).ok()))
    }

    fn missing_params(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        match self.kind {
            ServiceKind::Local => {
                if self.root.is_none() {
                    missing.push("root");
                }
            },
            ServiceKind::S3 => {
                if self.bucket.as_deref().is_none_or(str::is_empty) {
                    missing.push("bucket");
                }
                if self.region.as_deref().is_none_or(str::is_empty) {
                    missing.push("region");
                }
            },
            ServiceKind::Azure => {
                if self.account_name.as_deref().is_none_or(str::is_empty) {
                    missing.push("account_name");
                }
                if self.container.as_deref().is_none_or(str::is_empty) {
                    missing.push("container");
                }
            },
            ServiceKind::Memory => {},
        }
        missing
    }
}

impl Config {
    /// Load configuration from blobgate.toml in the current directory.
    ///
    /// # Errors
    ///
    /// Returns an error if blobgate.toml cannot be read or contains invalid TOML.
    pub fn load() -> Result<Self> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Load configuration from the specified path.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read (IO error)
    /// - The file contains invalid TOML syntax
    /// - Required fields are missing or have invalid types
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Finds a service by name.
    pub fn service(&self, name: &str) -> Option<&ServiceConfig> {
        self.services.iter().find(|s| s.name == name)
    }

    /// Validate configuration with comprehensive checks.
    ///
    /// Returns a `ValidationResult` containing any non-fatal warnings.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails with one or more errors:
    /// - Port 0 or a zero upload limit
    /// - Empty, duplicate or URL-unsafe service names
    /// - Missing kind-specific parameters
    pub fn validate(&self) -> Result<ValidationResult> {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        // 1. Server
        if self.server.port == 0 {
            errors.push(
                "Server port cannot be 0. Use a valid port number (1-65535)\n  \
                 Default: 9920"
                    .to_string(),
            );
        }
        if self.server.port < 1024 && self.server.port > 0 {
            warnings.push(format!(
                "Server port {} is a system/privileged port (< 1024)\n  \
                 Recommendation: Use ports >= 1024 to avoid permission issues",
                self.server.port
            ));
        }
        if self.server.max_upload_bytes == 0 {
            errors.push("server.max_upload_bytes cannot be 0".to_string());
        }

        // 2. Services
        if self.services.is_empty() {
            warnings.push(
                "No [[service]] entries configured\n  \
                 The API will start but every storage request will return 404"
                    .to_string(),
            );
        }

        let mut seen = HashSet::new();
        for service in &self.services {
            if service.name.is_empty() {
                errors.push("service name cannot be empty".to_string());
                continue;
            }
            if !service
                .name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
            {
                errors.push(format!(
                    "service name '{}' may only contain letters, digits, '-' and '_'",
                    service.name
                ));
            }
            if !seen.insert(service.name.as_str()) {
                errors.push(format!("duplicate service name '{}'", service.name));
            }

            let missing = service.missing_params();
            if !missing.is_empty() {
                errors.push(format!(
                    "service '{}' ({}) is missing: {}",
                    service.name,
                    service.kind,
                    missing.join(", ")
                ));
            }

            if let (ServiceKind::Local, Some(root)) = (service.kind, &service.root)
                && root.exists()
                && !root.is_dir()
            {
                errors.push(format!(
                    "service '{}' root is not a directory: {}",
                    service.name,
                    root.display()
                ));
            }
        }

        if !errors.is_empty() {
            anyhow::bail!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            );
        }

        Ok(ValidationResult { warnings })
    }
}
