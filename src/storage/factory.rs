//! Builds storage backends from service configuration records.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;

use super::backend::StorageBackend;
use super::filesystem::FilesystemBackend;
use super::memory::MemoryBackend;
use super::object_store::{AzureSettings, ObjectStoreBackend, S3Settings};
use crate::config::{Config, ServiceConfig, ServiceKind};

/// Shared handle to a backend.
pub type SharedBackend = Arc<dyn StorageBackend>;

/// Creates the backend for one service record.
///
/// # Errors
///
/// Returns an error if required parameters are missing or the backend
/// cannot be initialized (unwritable root, malformed endpoint).
pub fn build_backend(service: &ServiceConfig) -> Result<SharedBackend> {
    let backend: SharedBackend = match service.kind {
        ServiceKind::Local => {
            let root = service
                .root
                .as_ref()
                .with_context(|| format!("service '{}' has no root", service.name))?;
            Arc::new(FilesystemBackend::open(root).with_context(|| {
                format!("Failed to open local storage at {}", root.display())
            })?)
        },
        ServiceKind::S3 => {
            let settings = S3Settings {
                bucket: service.bucket.clone().unwrap_or_default(),
                region: service.region.clone().unwrap_or_default(),
                endpoint: service.endpoint.clone(),
                access_key_id: ServiceConfig::secret(
                    service.access_key_id.as_deref(),
                    service.access_key_id_env.as_deref(),
                ),
                secret_access_key: ServiceConfig::secret(
                    service.secret_access_key.as_deref(),
                    service.secret_access_key_env.as_deref(),
                ),
            };
            Arc::new(
                ObjectStoreBackend::s3(&settings)
                    .with_context(|| format!("Failed to configure S3 service '{}'", service.name))?,
            )
        },
        ServiceKind::Azure => {
            let settings = AzureSettings {
                account_name: service.account_name.clone().unwrap_or_default(),
                account_key: ServiceConfig::secret(
                    service.account_key.as_deref(),
                    service.account_key_env.as_deref(),
                ),
                container: service.container.clone().unwrap_or_default(),
                endpoint: service.endpoint.clone(),
            };
            Arc::new(
                ObjectStoreBackend::azure(&settings).with_context(|| {
                    format!("Failed to configure Azure service '{}'", service.name)
                })?,
            )
        },
        ServiceKind::Memory => Arc::new(MemoryBackend::new()),
    };
    Ok(backend)
}

/// Builds every configured service, keyed by name.
///
/// # Errors
///
/// Fails on the first service that cannot be built.
pub fn build_registry(config: &Config) -> Result<HashMap<String, SharedBackend>> {
    config
        .services
        .iter()
        .map(|service| Ok((service.name.clone(), build_backend(service)?)))
        .collect()
}
