//! In-memory flat object store.
//!
//! Keys live in one flat `DashMap` namespace with the container name
//! prefixed onto every key, the way a single-bucket object store lays them
//! out. There is no native delimiter support: delimiter listings are
//! computed by rolling deeper keys up into common prefixes. Ideal for
//! testing, development and embedded use.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use dashmap::DashMap;
use futures::StreamExt;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

use super::backend::{
    ContainerInfo, Metadata, ObjectInfo, ObjectListing, ObjectStream, PutOptions, PutSource,
    StorageBackend,
};
use super::codec::PathCodec;
use super::validation::{validate_container, validate_key};
use crate::error::{StorageError, StorageResult};

/// Entry stored in the memory backend.
#[derive(Clone)]
struct MemoryObject {
    data: Bytes,
    info: ObjectInfo,
}

/// Flat in-memory object storage backend using DashMap.
///
/// Provides fast, concurrent access without persistence. All data is lost
/// when the process exits.
///
/// # Thread Safety
///
/// `MemoryBackend` is `Clone` (shared handles) and uses `DashMap`
/// internally for lock-free concurrent access.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    containers: Arc<DashMap<String, ContainerInfo>>,
    objects: Arc<DashMap<String, MemoryObject>>,
}

impl MemoryBackend {
    const CODEC: PathCodec = PathCodec::prefixed();

    /// Creates a new empty in-memory backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of objects in the store, markers included.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Returns true if the store holds no objects.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    fn require_container(&self, name: &str) -> StorageResult<()> {
        validate_container(name)?;
        if self.containers.contains_key(name) {
            Ok(())
        } else {
            Err(StorageError::container_not_found(name))
        }
    }

    fn raw_key(container: &str, key: &str) -> StorageResult<String> {
        validate_key(key)?;
        Ok(Self::CODEC.encode_key(container, key))
    }

    async fn read_source(source: PutSource) -> StorageResult<Bytes> {
        match source {
            PutSource::Bytes(data) => Ok(data),
            PutSource::File(path) => tokio::fs::read(&path)
                .await
                .map(Bytes::from)
                .map_err(|e| StorageError::io(path.display().to_string(), e)),
        }
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn list_containers(&self) -> StorageResult<Vec<ContainerInfo>> {
        let mut containers: Vec<ContainerInfo> = self
            .containers
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        containers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(containers)
    }

    async fn container_exists(&self, name: &str) -> StorageResult<bool> {
        validate_container(name)?;
        Ok(self.containers.contains_key(name))
    }

    async fn get_container(&self, name: &str) -> StorageResult<ContainerInfo> {
        validate_container(name)?;
        self.containers
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StorageError::container_not_found(name))
    }

    async fn create_container(&self, name: &str, metadata: &Metadata) -> StorageResult<()> {
        validate_container(name)?;
        self.containers
            .entry(name.to_string())
            .or_insert_with(|| ContainerInfo {
                name: name.to_string(),
                last_modified: Some(Utc::now()),
                metadata: metadata.clone(),
            });
        Ok(())
    }

    async fn set_container_metadata(&self, name: &str, metadata: &Metadata) -> StorageResult<()> {
        validate_container(name)?;
        let mut entry = self
            .containers
            .get_mut(name)
            .ok_or_else(|| StorageError::container_not_found(name))?;
        entry.metadata = metadata.clone();
        entry.last_modified = Some(Utc::now());
        Ok(())
    }

    async fn delete_container(&self, name: &str) -> StorageResult<()> {
        validate_container(name)?;
        if self.containers.remove(name).is_none() {
            return Err(StorageError::container_not_found(name));
        }
        let prefix = Self::CODEC.container_key(name);
        self.objects.retain(|key, _| !key.starts_with(&prefix));
        Ok(())
    }

    async fn head_object(&self, container: &str, key: &str) -> StorageResult<Option<ObjectInfo>> {
        self.require_container(container)?;
        let raw = Self::raw_key(container, key)?;
        Ok(self.objects.get(&raw).map(|entry| entry.info.clone()))
    }

    async fn put_object(
        &self,
        container: &str,
        key: &str,
        source: PutSource,
        options: &PutOptions,
    ) -> StorageResult<()> {
        self.require_container(container)?;
        let raw = Self::raw_key(container, key)?;
        let data = Self::read_source(source).await?;

        let info = ObjectInfo {
            key: key.to_string(),
            size: data.len() as u64,
            content_type: options.content_type.clone(),
            last_modified: Some(Utc::now()),
            metadata: options.metadata.clone(),
        };
        debug!(container, key, size = info.size, "memory put");
        self.objects.insert(raw, MemoryObject { data, info });
        Ok(())
    }

    async fn copy_object(
        &self,
        container: &str,
        key: &str,
        src_container: &str,
        src_key: &str,
    ) -> StorageResult<()> {
        self.require_container(container)?;
        self.require_container(src_container)?;
        let src_raw = Self::raw_key(src_container, src_key)?;
        let dest_raw = Self::raw_key(container, key)?;

        let mut object = self
            .objects
            .get(&src_raw)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StorageError::object_not_found(src_key))?;
        object.info.key = key.to_string();
        object.info.last_modified = Some(Utc::now());
        self.objects.insert(dest_raw, object);
        Ok(())
    }

    async fn get_object(&self, container: &str, key: &str) -> StorageResult<Bytes> {
        self.require_container(container)?;
        let raw = Self::raw_key(container, key)?;
        self.objects
            .get(&raw)
            .map(|entry| entry.data.clone())
            .ok_or_else(|| StorageError::object_not_found(key))
    }

    async fn stream_object(&self, container: &str, key: &str) -> StorageResult<ObjectStream> {
        self.require_container(container)?;
        let raw = Self::raw_key(container, key)?;
        let object = self
            .objects
            .get(&raw)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StorageError::object_not_found(key))?;
        Ok(ObjectStream {
            info: object.info,
            body: futures::stream::iter([Ok(object.data)]).boxed(),
        })
    }

    async fn delete_object(&self, container: &str, key: &str) -> StorageResult<()> {
        self.require_container(container)?;
        let raw = Self::raw_key(container, key)?;
        self.objects.remove(&raw);
        Ok(())
    }

    async fn list_objects(
        &self,
        container: &str,
        prefix: &str,
        delimiter: Option<char>,
    ) -> StorageResult<ObjectListing> {
        self.require_container(container)?;
        let raw_prefix = Self::raw_key(container, prefix)?;

        let mut listing = ObjectListing::default();
        let mut common = BTreeSet::new();

        for entry in self.objects.iter() {
            let Some(rest) = entry.key().strip_prefix(&raw_prefix) else {
                continue;
            };
            // Flat store: roll anything below the first delimiter up into a prefix.
            if let Some(delim) = delimiter
                && let Some(idx) = rest.find(delim)
            {
                common.insert(format!("{prefix}{}", &rest[..=idx]));
                continue;
            }
            listing.objects.push(entry.info.clone());
        }

        listing.objects.sort_by(|a, b| a.key.cmp(&b.key));
        listing.common_prefixes = common.into_iter().collect();
        Ok(listing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::codec::{self, DELIMITER};

    async fn backend_with_container() -> MemoryBackend {
        let backend = MemoryBackend::new();
        backend
            .create_container("media", &Metadata::new())
            .await
            .unwrap();
        backend
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let backend = backend_with_container().await;

        backend
            .put_object(
                "media",
                "test.txt",
                "Hello, World!".into(),
                &PutOptions::with_content_type("text/plain"),
            )
            .await
            .unwrap();

        let data = backend.get_object("media", "test.txt").await.unwrap();
        assert_eq!(&data[..], b"Hello, World!");

        let info = backend.head_object("media", "test.txt").await.unwrap().unwrap();
        assert_eq!(info.size, 13);
        assert_eq!(info.content_type.as_deref(), Some("text/plain"));
    }

    #[tokio::test]
    async fn test_missing_container_is_not_found() {
        let backend = MemoryBackend::new();
        let err = backend.get_object("nope", "a.txt").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_create_container_is_idempotent() {
        let backend = MemoryBackend::new();
        let mut meta = Metadata::new();
        meta.insert("owner".into(), "ops".into());
        backend.create_container("media", &meta).await.unwrap();
        backend
            .create_container("media", &Metadata::new())
            .await
            .unwrap();

        let info = backend.get_container("media").await.unwrap();
        assert_eq!(info.metadata.get("owner").map(String::as_str), Some("ops"));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let backend = backend_with_container().await;
        backend.put_object("media", "a.txt", "a".into(), &PutOptions::default()).await.unwrap();

        backend.delete_object("media", "a.txt").await.unwrap();
        backend.delete_object("media", "a.txt").await.unwrap();
        assert!(!backend.object_exists("media", "a.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_delimiter_listing_rolls_up_prefixes() {
        let backend = backend_with_container().await;
        for key in ["docs/", "docs/a.txt", "docs/sub/", "docs/sub/b.txt", "top.txt"] {
            backend
                .put_object("media", key, Bytes::new().into(), &PutOptions::default())
                .await
                .unwrap();
        }

        let shallow = backend.list_objects("media", "docs/", Some(DELIMITER)).await.unwrap();
        let keys: Vec<_> = shallow.objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["docs/", "docs/a.txt"]);
        assert_eq!(shallow.common_prefixes, vec!["docs/sub/".to_string()]);

        let deep = backend.list_objects("media", "docs/", None).await.unwrap();
        assert_eq!(deep.objects.len(), 4);
        assert!(deep.common_prefixes.is_empty());
    }

    #[tokio::test]
    async fn test_delete_container_removes_objects() {
        let backend = backend_with_container().await;
        backend.create_container("other", &Metadata::new()).await.unwrap();
        backend.put_object("media", "a.txt", "a".into(), &PutOptions::default()).await.unwrap();
        backend.put_object("other", "a.txt", "a".into(), &PutOptions::default()).await.unwrap();

        backend.delete_container("media").await.unwrap();
        assert_eq!(backend.len(), 1);
        assert!(backend.delete_container("media").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_copy_missing_source() {
        let backend = backend_with_container().await;
        let err = backend
            .copy_object("media", "b.txt", "media", "a.txt")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_codec_prefixes_container() {
        assert_eq!(MemoryBackend::CODEC.encode_key("c", "a/"), "c/a/");
        assert_eq!(codec::parent_folder("c/a/"), "c/");
    }
}
