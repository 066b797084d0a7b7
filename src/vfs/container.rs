//! Container-level operations.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use super::batch::{self, BatchReport};
use crate::error::{StorageError, StorageResult};
use crate::storage::codec::DELIMITER;
use crate::storage::{ContainerInfo, Metadata, SharedBackend};

/// A container in a listing or a mutation acknowledgement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContainerEntry {
    pub name: String,
    /// `<container>/`
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl ContainerEntry {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            path: format!("{name}{DELIMITER}"),
            last_modified: None,
            metadata: None,
        }
    }

    fn with_properties(info: ContainerInfo) -> Self {
        Self {
            last_modified: info.last_modified,
            metadata: Some(info.metadata),
            ..Self::new(&info.name)
        }
    }
}

/// Converts a JSON object into user metadata. Non-string values keep
/// their JSON text.
pub fn metadata_from_value(value: Option<&Value>) -> StorageResult<Metadata> {
    match value {
        None | Some(Value::Null) => Ok(Metadata::new()),
        Some(Value::Object(map)) => Ok(map
            .iter()
            .map(|(k, v)| {
                let v = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), v)
            })
            .collect()),
        Some(other) => Err(StorageError::invalid(format!(
            "metadata must be an object, got {other}"
        ))),
    }
}

/// Container operations.
#[derive(Clone)]
pub struct ContainerEngine {
    backend: SharedBackend,
}

impl ContainerEngine {
    pub fn new(backend: SharedBackend) -> Self {
        Self { backend }
    }

    /// Lists every container, with last-modified and metadata when asked.
    pub async fn list(&self, include_properties: bool) -> StorageResult<Vec<ContainerEntry>> {
        let mut containers = self.backend.list_containers().await?;
        containers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(containers
            .into_iter()
            .map(|info| {
                if include_properties {
                    ContainerEntry::with_properties(info)
                } else {
                    ContainerEntry::new(&info.name)
                }
            })
            .collect())
    }

    pub async fn get_properties(&self, name: &str) -> StorageResult<ContainerEntry> {
        let info = self.backend.get_container(name).await?;
        Ok(ContainerEntry::with_properties(info))
    }

    /// Creates a container.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyExists` if the container exists and `check_exist` is set.
    pub async fn create(
        &self,
        name: &str,
        metadata: &Metadata,
        check_exist: bool,
    ) -> StorageResult<ContainerEntry> {
        if name.is_empty() {
            return Err(StorageError::invalid("container name is empty"));
        }
        if self.backend.container_exists(name).await? {
            if check_exist {
                return Err(StorageError::container_exists(name));
            }
            if !metadata.is_empty() {
                self.backend.set_container_metadata(name, metadata).await?;
            }
            return Ok(ContainerEntry::new(name));
        }
        self.backend.create_container(name, metadata).await?;
        info!(container = name, "Created container");
        Ok(ContainerEntry::new(name))
    }

    /// Replaces a container's metadata.
    pub async fn update_properties(
        &self,
        name: &str,
        metadata: &Metadata,
    ) -> StorageResult<ContainerEntry> {
        self.backend.set_container_metadata(name, metadata).await?;
        Ok(ContainerEntry {
            metadata: Some(metadata.clone()),
            ..ContainerEntry::new(name)
        })
    }

    /// Deletes a container with everything in it.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the container does not exist.
    pub async fn delete(&self, name: &str) -> StorageResult<ContainerEntry> {
        self.backend.delete_container(name).await?;
        info!(container = name, "Deleted container");
        Ok(ContainerEntry::new(name))
    }

    /// Creates each listed container independently. Items are
    /// `{ "name": .., "metadata": { .. } }`.
    pub async fn create_batch(&self, items: Vec<Value>, check_exist: bool) -> BatchReport {
        let mut report = BatchReport::new();
        for item in items {
            let name = batch::str_field(&item, "name");
            let result = match (name, metadata_from_value(item.get("metadata"))) {
                (Some(name), Ok(metadata)) => self.create(name, &metadata, check_exist).await,
                (None, _) => Err(StorageError::invalid("batch item requires a 'name'")),
                (_, Err(e)) => Err(e),
            };
            report.record(item, result);
        }
        report
    }

    /// Deletes each listed container independently.
    pub async fn delete_batch(&self, items: Vec<Value>) -> BatchReport {
        let mut report = BatchReport::new();
        for item in items {
            let result = match batch::str_field(&item, "name") {
                Some(name) => self.delete(name).await,
                None => Err(StorageError::invalid("batch item requires a 'name'")),
            };
            report.record(item, result);
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBackend;
    use serde_json::json;
    use std::sync::Arc;

    fn engine() -> ContainerEngine {
        ContainerEngine::new(Arc::new(MemoryBackend::new()))
    }

    #[tokio::test]
    async fn test_create_list_delete() {
        let containers = engine();
        let mut meta = Metadata::new();
        meta.insert("owner".into(), "ops".into());
        containers.create("media", &meta, true).await.unwrap();
        containers.create("backups", &Metadata::new(), false).await.unwrap();

        let err = containers.create("media", &Metadata::new(), true).await.unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists { kind: "container", .. }));

        let listed = containers.list(true).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[1].name, "media");
        assert_eq!(listed[1].path, "media/");
        assert_eq!(listed[1].metadata.as_ref().unwrap()["owner"], "ops");

        containers.delete("backups").await.unwrap();
        assert!(containers.delete("backups").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_update_properties() {
        let containers = engine();
        containers.create("media", &Metadata::new(), false).await.unwrap();
        let meta = metadata_from_value(Some(&json!({ "tier": "hot", "replicas": 3 }))).unwrap();
        containers.update_properties("media", &meta).await.unwrap();

        let props = containers.get_properties("media").await.unwrap();
        let stored = props.metadata.unwrap();
        assert_eq!(stored["tier"], "hot");
        assert_eq!(stored["replicas"], "3");
    }

    #[tokio::test]
    async fn test_batches_report_per_item() {
        let containers = engine();
        let report = containers
            .create_batch(vec![json!({ "name": "a" }), json!({}), json!({ "name": "b" })], false)
            .await;
        assert_eq!(report.failure_count(), 1);

        let report = containers
            .delete_batch(vec![json!({ "name": "a" }), json!({ "name": "zzz" })])
            .await;
        let values = report.into_values();
        assert!(values[0].get("error").is_none());
        assert_eq!(values[1]["error"]["code"], 404);
    }

    #[test]
    fn test_metadata_must_be_object() {
        assert!(metadata_from_value(Some(&json!([1, 2]))).is_err());
        assert!(metadata_from_value(None).unwrap().is_empty());
    }
}
