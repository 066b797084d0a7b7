//! Backend trait for the storage layer.
//!
//! Defines the capability interface that every physical medium implements
//! (local filesystem, object stores with delimiter listing, flat object
//! stores). The virtual folder and file engines depend only on this trait.
//!
//! Keys are container-relative. A key ending in `/` is a folder marker:
//! on a filesystem it is a directory, on an object store a small object
//! whose payload optionally carries JSON properties.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::codec;
use crate::error::{StorageError, StorageResult};

/// User metadata attached to containers and objects.
pub type Metadata = BTreeMap<String, String>;

/// Chunked object body.
pub type ByteStream = BoxStream<'static, std::io::Result<Bytes>>;

/// Name of the companion object holding a folder's or container's
/// properties on backends whose markers cannot carry a payload.
pub const PROPERTIES_OBJECT: &str = ".blobgate-properties";

/// Metadata for a stored object or folder marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectInfo {
    /// Container-relative key (ends in `/` for folder markers)
    pub key: String,
    /// Size in bytes
    pub size: u64,
    /// MIME content type, if the backend tracks one
    pub content_type: Option<String>,
    /// Last modification time, best effort
    pub last_modified: Option<DateTime<Utc>>,
    /// User metadata
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: Metadata,
}

impl ObjectInfo {
    /// Creates an info record with only a key and size.
    pub fn new(key: impl Into<String>, size: u64) -> Self {
        Self {
            key: key.into(),
            size,
            content_type: None,
            last_modified: None,
            metadata: Metadata::new(),
        }
    }

    /// Returns true if this is a folder marker.
    pub fn is_folder(&self) -> bool {
        codec::is_folder_key(&self.key)
    }
}

/// Result of a prefix listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectListing {
    /// Objects directly matched by the listing
    pub objects: Vec<ObjectInfo>,
    /// One level of sub-folder keys (only for delimiter listings)
    pub common_prefixes: Vec<String>,
}

/// A top-level namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerInfo {
    pub name: String,
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: Metadata,
}

/// Content handed to [`StorageBackend::put_object`].
#[derive(Debug, Clone)]
pub enum PutSource {
    /// In-memory bytes
    Bytes(Bytes),
    /// A local file that is read in chunks
    File(PathBuf),
}

impl From<Bytes> for PutSource {
    fn from(data: Bytes) -> Self {
        Self::Bytes(data)
    }
}

impl From<Vec<u8>> for PutSource {
    fn from(data: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(data))
    }
}

impl From<&'static str> for PutSource {
    fn from(data: &'static str) -> Self {
        Self::Bytes(Bytes::from_static(data.as_bytes()))
    }
}

/// Options for [`StorageBackend::put_object`].
#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    pub content_type: Option<String>,
    pub metadata: Metadata,
}

impl PutOptions {
    pub fn with_content_type(content_type: impl Into<String>) -> Self {
        Self {
            content_type: Some(content_type.into()),
            metadata: Metadata::new(),
        }
    }
}

/// An object opened for streaming.
pub struct ObjectStream {
    pub info: ObjectInfo,
    pub body: ByteStream,
}

impl std::fmt::Debug for ObjectStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStream")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

/// Backend trait for container and object storage.
///
/// All backends must be thread-safe (`Send + Sync`) for use with tokio.
/// Every mutating call is a single round-trip to the medium; multi-step
/// sequences are composed by the engines and are not atomic as a whole.
///
/// # Example
///
/// ```ignore
/// use blobgate::storage::{MemoryBackend, StorageBackend};
///
/// let backend = MemoryBackend::new();
/// backend.create_container("media", &Default::default()).await?;
/// backend.put_object("media", "logo.png", bytes.into(), &Default::default()).await?;
/// let listing = backend.list_objects("media", "", Some('/')).await?;
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// Short name of the medium, used in logs.
    fn kind(&self) -> &'static str;

    /// Lists every container.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be reached.
    async fn list_containers(&self) -> StorageResult<Vec<ContainerInfo>>;

    /// Returns true if the container exists. Never fails on "not found".
    async fn container_exists(&self, name: &str) -> StorageResult<bool>;

    /// Returns a container's properties.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the container does not exist.
    async fn get_container(&self, name: &str) -> StorageResult<ContainerInfo>;

    /// Creates a container. A no-op if it already exists.
    async fn create_container(&self, name: &str, metadata: &Metadata) -> StorageResult<()>;

    /// Replaces a container's metadata.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the container does not exist.
    async fn set_container_metadata(&self, name: &str, metadata: &Metadata) -> StorageResult<()>;

    /// Removes a container and everything in it.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the container does not exist.
    async fn delete_container(&self, name: &str) -> StorageResult<()>;

    /// Returns true if the object (or folder marker) exists.
    async fn object_exists(&self, container: &str, key: &str) -> StorageResult<bool> {
        Ok(self.head_object(container, key).await?.is_some())
    }

    /// Retrieves object metadata without downloading the object.
    ///
    /// # Returns
    /// * `Ok(Some(info))` - Object found
    /// * `Ok(None)` - Object not found
    async fn head_object(&self, container: &str, key: &str) -> StorageResult<Option<ObjectInfo>>;

    /// Stores an object, overwriting unconditionally. A key ending in `/`
    /// writes a folder marker whose payload is the folder's properties.
    async fn put_object(
        &self,
        container: &str,
        key: &str,
        source: PutSource,
        options: &PutOptions,
    ) -> StorageResult<()>;

    /// Copies one object.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the source is missing.
    async fn copy_object(
        &self,
        container: &str,
        key: &str,
        src_container: &str,
        src_key: &str,
    ) -> StorageResult<()>;

    /// Reads a whole object into memory.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the object is missing.
    async fn get_object(&self, container: &str, key: &str) -> StorageResult<Bytes>;

    /// Opens an object for chunked reading.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the object is missing, distinctly from
    /// transport failures.
    async fn stream_object(&self, container: &str, key: &str) -> StorageResult<ObjectStream>;

    /// Writes an object to a local file without buffering it whole.
    async fn get_object_to_file(
        &self,
        container: &str,
        key: &str,
        local_path: &Path,
    ) -> StorageResult<()> {
        use futures::StreamExt;
        use tokio::io::AsyncWriteExt;

        let mut stream = self.stream_object(container, key).await?;
        let mut file = tokio::fs::File::create(local_path)
            .await
            .map_err(|e| StorageError::io(local_path.display().to_string(), e))?;
        while let Some(chunk) = stream.body.next().await {
            let chunk = chunk.map_err(|e| StorageError::io(key, e))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| StorageError::io(local_path.display().to_string(), e))?;
        }
        file.flush()
            .await
            .map_err(|e| StorageError::io(local_path.display().to_string(), e))?;
        Ok(())
    }

    /// Deletes an object. A no-op if it is absent.
    async fn delete_object(&self, container: &str, key: &str) -> StorageResult<()>;

    /// Lists objects under `prefix`.
    ///
    /// With a delimiter only the immediate level is returned: deeper keys
    /// roll up into `common_prefixes`. Without one every object under the
    /// prefix is returned, folder markers included. Results are sorted by
    /// key.
    async fn list_objects(
        &self,
        container: &str,
        prefix: &str,
        delimiter: Option<char>,
    ) -> StorageResult<ObjectListing>;

    /// Copies every object under `src_prefix` to the same relative position
    /// under `dest_prefix`, markers included.
    ///
    /// The default re-keys each listed child; backends with a native tree
    /// copy override it.
    async fn copy_prefix(
        &self,
        container: &str,
        dest_prefix: &str,
        src_container: &str,
        src_prefix: &str,
    ) -> StorageResult<()> {
        let listing = self.list_objects(src_container, src_prefix, None).await?;
        for object in listing.objects {
            if let Some(dest) = codec::rebase(&object.key, src_prefix, dest_prefix) {
                self.copy_object(container, &dest, src_container, &object.key)
                    .await?;
            }
        }
        Ok(())
    }
}
