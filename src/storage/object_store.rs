//! Object-store backend over OpenDAL (Amazon S3, Azure Blob).
//!
//! One configured bucket (or Azure container) holds every blobgate
//! container as a top-level key prefix. Folder markers are OpenDAL
//! directory objects (`docs/`); since those cannot carry a payload, folder
//! properties and container metadata live in a companion object named
//! [`PROPERTIES_OBJECT`] inside the folder. Listings never return it.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use opendal::layers::LoggingLayer;
use opendal::services::{Azblob, S3};
use opendal::{EntryMode, ErrorKind, Operator};
use std::collections::BTreeSet;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

use super::backend::{
    ContainerInfo, Metadata, ObjectInfo, ObjectListing, ObjectStream, PROPERTIES_OBJECT,
    PutOptions, PutSource, StorageBackend,
};
use super::codec::{self, PathCodec};
use super::validation::{validate_container, validate_key};
use crate::error::{StorageError, StorageResult};

/// Chunk size when uploading from a local file.
const UPLOAD_CHUNK: usize = 8 * 1024 * 1024;

/// Connection settings for an S3 bucket.
#[derive(Debug, Clone, Default)]
pub struct S3Settings {
    pub bucket: String,
    pub region: String,
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

/// Connection settings for an Azure Blob account container.
#[derive(Debug, Clone, Default)]
pub struct AzureSettings {
    pub account_name: String,
    pub account_key: Option<String>,
    pub container: String,
    pub endpoint: Option<String>,
}

fn op_err(key: &str) -> impl FnOnce(opendal::Error) -> StorageError {
    let key = key.to_string();
    move |e| {
        if e.kind() == ErrorKind::NotFound {
            StorageError::object_not_found(key)
        } else {
            StorageError::backend(e)
        }
    }
}

/// Object storage backend on top of an OpenDAL [`Operator`].
#[derive(Clone)]
pub struct ObjectStoreBackend {
    op: Operator,
    kind: &'static str,
}

impl ObjectStoreBackend {
    const CODEC: PathCodec = PathCodec::escaped();

    /// Connects to an S3 (or S3-compatible) bucket.
    pub fn s3(settings: &S3Settings) -> StorageResult<Self> {
        let mut builder = S3::default()
            .bucket(&settings.bucket)
            .region(&settings.region);
        if let Some(endpoint) = settings.endpoint.as_deref().filter(|e| !e.is_empty()) {
            builder = builder.endpoint(endpoint);
        }
        if let Some(key_id) = &settings.access_key_id {
            builder = builder.access_key_id(key_id);
        }
        if let Some(secret) = &settings.secret_access_key {
            builder = builder.secret_access_key(secret);
        }

        let op = Operator::new(builder)
            .map_err(StorageError::backend)?
            .layer(LoggingLayer::default())
            .finish();
        info!(bucket = %settings.bucket, "Configured S3 storage");
        Ok(Self { op, kind: "s3" })
    }

    /// Connects to an Azure Blob container.
    pub fn azure(settings: &AzureSettings) -> StorageResult<Self> {
        let endpoint = settings.endpoint.clone().unwrap_or_else(|| {
            format!("https://{}.blob.core.windows.net", settings.account_name)
        });
        let mut builder = Azblob::default()
            .container(&settings.container)
            .endpoint(&endpoint)
            .account_name(&settings.account_name);
        if let Some(key) = &settings.account_key {
            builder = builder.account_key(key);
        }

        let op = Operator::new(builder)
            .map_err(StorageError::backend)?
            .layer(LoggingLayer::default())
            .finish();
        info!(account = %settings.account_name, container = %settings.container, "Configured Azure storage");
        Ok(Self { op, kind: "azure" })
    }

    /// Wraps an existing operator.
    pub fn from_operator(op: Operator, kind: &'static str) -> Self {
        Self { op, kind }
    }

    fn raw(container: &str, key: &str) -> StorageResult<String> {
        validate_container(container)?;
        validate_key(key)?;
        Ok(Self::CODEC.encode_key(container, key))
    }

    fn companion(raw_folder: &str) -> String {
        format!("{raw_folder}{PROPERTIES_OBJECT}")
    }

    async fn stat(&self, raw: &str) -> StorageResult<Option<opendal::Metadata>> {
        match self.op.stat(raw).await {
            Ok(meta) => Ok(Some(meta)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::backend(e)),
        }
    }

    async fn require_container(&self, name: &str) -> StorageResult<()> {
        if self.container_exists(name).await? {
            Ok(())
        } else {
            Err(StorageError::container_not_found(name))
        }
    }

    /// Reads a companion payload; empty if there is none.
    async fn read_companion(&self, raw_folder: &str) -> StorageResult<Bytes> {
        match self.op.read(&Self::companion(raw_folder)).await {
            Ok(buf) => Ok(buf.to_bytes()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Bytes::new()),
            Err(e) => Err(StorageError::backend(e)),
        }
    }

    async fn write_companion(&self, raw_folder: &str, payload: Bytes) -> StorageResult<()> {
        let path = Self::companion(raw_folder);
        if payload.is_empty() {
            return self.op.delete(&path).await.map_err(StorageError::backend);
        }
        self.op
            .write_with(&path, payload)
            .content_type("application/json")
            .await
            .map_err(StorageError::backend)?;
        Ok(())
    }

    async fn container_metadata(&self, name: &str) -> StorageResult<Metadata> {
        let payload = self.read_companion(&Self::CODEC.container_key(name)).await?;
        if payload.is_empty() {
            return Ok(Metadata::new());
        }
        serde_json::from_slice(&payload)
            .map_err(|e| StorageError::backend(format!("corrupt container metadata for {name}: {e}")))
    }

    fn info_from(key: &str, meta: &opendal::Metadata) -> ObjectInfo {
        let is_dir = meta.mode() == EntryMode::DIR;
        ObjectInfo {
            key: key.to_string(),
            size: if is_dir { 0 } else { meta.content_length() },
            content_type: meta.content_type().map(str::to_string),
            last_modified: meta.last_modified(),
            metadata: meta
                .user_metadata()
                .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                .unwrap_or_default(),
        }
    }

    async fn write_bytes(&self, raw: &str, data: Bytes, options: &PutOptions) -> StorageResult<()> {
        let mut write = self.op.write_with(raw, data);
        if let Some(content_type) = &options.content_type {
            write = write.content_type(content_type);
        }
        if !options.metadata.is_empty() {
            write = write.user_metadata(options.metadata.clone());
        }
        write.await.map_err(StorageError::backend)?;
        Ok(())
    }

    async fn write_file(&self, raw: &str, path: &std::path::Path, options: &PutOptions) -> StorageResult<()> {
        let context = || path.display().to_string();
        let mut file = tokio::fs::File::open(path)
            .await
            .map_err(|e| StorageError::io(context(), e))?;

        let mut writer = self.op.writer_with(raw);
        if let Some(content_type) = &options.content_type {
            writer = writer.content_type(content_type);
        }
        if !options.metadata.is_empty() {
            writer = writer.user_metadata(options.metadata.clone());
        }
        let mut writer = writer.await.map_err(StorageError::backend)?;

        let mut buf = vec![0u8; UPLOAD_CHUNK];
        loop {
            let n = file
                .read(&mut buf)
                .await
                .map_err(|e| StorageError::io(context(), e))?;
            if n == 0 {
                break;
            }
            writer
                .write(Bytes::copy_from_slice(&buf[..n]))
                .await
                .map_err(StorageError::backend)?;
        }
        writer.close().await.map_err(StorageError::backend)?;
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for ObjectStoreBackend {
    fn kind(&self) -> &'static str {
        self.kind
    }

    async fn list_containers(&self) -> StorageResult<Vec<ContainerInfo>> {
        let entries = self.op.list("").await.map_err(StorageError::backend)?;
        let mut containers = Vec::new();
        for entry in entries {
            let Some(name) = Self::CODEC.decode_container(entry.path()) else {
                continue;
            };
            containers.push(ContainerInfo {
                metadata: self.container_metadata(&name).await?,
                last_modified: entry.metadata().last_modified(),
                name,
            });
        }
        containers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(containers)
    }

    async fn container_exists(&self, name: &str) -> StorageResult<bool> {
        validate_container(name)?;
        Ok(self.stat(&Self::CODEC.container_key(name)).await?.is_some())
    }

    async fn get_container(&self, name: &str) -> StorageResult<ContainerInfo> {
        validate_container(name)?;
        let meta = self
            .stat(&Self::CODEC.container_key(name))
            .await?
            .ok_or_else(|| StorageError::container_not_found(name))?;
        Ok(ContainerInfo {
            name: name.to_string(),
            last_modified: meta.last_modified(),
            metadata: self.container_metadata(name).await?,
        })
    }

    async fn create_container(&self, name: &str, metadata: &Metadata) -> StorageResult<()> {
        if self.container_exists(name).await? {
            return Ok(());
        }
        let raw = Self::CODEC.container_key(name);
        self.op.create_dir(&raw).await.map_err(StorageError::backend)?;
        if !metadata.is_empty() {
            self.set_container_metadata(name, metadata).await?;
        }
        info!(container = name, "Created container");
        Ok(())
    }

    async fn set_container_metadata(&self, name: &str, metadata: &Metadata) -> StorageResult<()> {
        self.require_container(name).await?;
        let payload = serde_json::to_vec(metadata).map_err(StorageError::backend)?;
        let payload = if metadata.is_empty() { Bytes::new() } else { Bytes::from(payload) };
        self.write_companion(&Self::CODEC.container_key(name), payload)
            .await
    }

    async fn delete_container(&self, name: &str) -> StorageResult<()> {
        self.require_container(name).await?;
        self.op
            .remove_all(&Self::CODEC.container_key(name))
            .await
            .map_err(StorageError::backend)?;
        info!(container = name, "Deleted container");
        Ok(())
    }

    async fn head_object(&self, container: &str, key: &str) -> StorageResult<Option<ObjectInfo>> {
        self.require_container(container).await?;
        if key.is_empty() {
            return Ok(None);
        }
        let raw = Self::raw(container, key)?;
        let Some(meta) = self.stat(&raw).await? else {
            return Ok(None);
        };
        let mut info = Self::info_from(key, &meta);
        if codec::is_folder_key(key) {
            info.size = self.read_companion(&raw).await?.len() as u64;
        }
        Ok(Some(info))
    }

    async fn put_object(
        &self,
        container: &str,
        key: &str,
        source: PutSource,
        options: &PutOptions,
    ) -> StorageResult<()> {
        self.require_container(container).await?;
        let raw = Self::raw(container, key)?;

        if codec::is_folder_key(key) {
            self.op.create_dir(&raw).await.map_err(StorageError::backend)?;
            let payload = match source {
                PutSource::Bytes(data) => data,
                PutSource::File(path) => tokio::fs::read(&path)
                    .await
                    .map(Bytes::from)
                    .map_err(|e| StorageError::io(path.display().to_string(), e))?,
            };
            return self.write_companion(&raw, payload).await;
        }

        match source {
            PutSource::Bytes(data) => self.write_bytes(&raw, data, options).await?,
            PutSource::File(path) => self.write_file(&raw, &path, options).await?,
        }
        debug!(container, key, "object store put");
        Ok(())
    }

    async fn copy_object(
        &self,
        container: &str,
        key: &str,
        src_container: &str,
        src_key: &str,
    ) -> StorageResult<()> {
        self.require_container(container).await?;
        self.require_container(src_container).await?;
        let src = Self::raw(src_container, src_key)?;
        let dest = Self::raw(container, key)?;

        if codec::is_folder_key(src_key) {
            if self.stat(&src).await?.is_none() {
                return Err(StorageError::object_not_found(src_key));
            }
            self.op.create_dir(&dest).await.map_err(StorageError::backend)?;
            let payload = self.read_companion(&src).await?;
            return self.write_companion(&dest, payload).await;
        }

        match self.op.copy(&src, &dest).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::Unsupported => {
                // No server-side copy: read it back and rewrite.
                let meta = self
                    .stat(&src)
                    .await?
                    .ok_or_else(|| StorageError::object_not_found(src_key))?;
                let data = self.op.read(&src).await.map_err(op_err(src_key))?;
                let info = Self::info_from(src_key, &meta);
                let options = PutOptions {
                    content_type: info.content_type,
                    metadata: info.metadata,
                };
                self.write_bytes(&dest, data.to_bytes(), &options).await
            },
            Err(e) => Err(op_err(src_key)(e)),
        }
    }

    async fn get_object(&self, container: &str, key: &str) -> StorageResult<Bytes> {
        self.require_container(container).await?;
        let raw = Self::raw(container, key)?;
        if codec::is_folder_key(key) {
            if self.stat(&raw).await?.is_none() {
                return Err(StorageError::object_not_found(key));
            }
            return self.read_companion(&raw).await;
        }
        self.op
            .read(&raw)
            .await
            .map(|buf| buf.to_bytes())
            .map_err(op_err(key))
    }

    async fn stream_object(&self, container: &str, key: &str) -> StorageResult<ObjectStream> {
        let info = self
            .head_object(container, key)
            .await?
            .ok_or_else(|| StorageError::object_not_found(key))?;

        if info.is_folder() {
            let payload = self.get_object(container, key).await?;
            return Ok(ObjectStream {
                info,
                body: futures::stream::iter([Ok(payload)]).boxed(),
            });
        }

        let raw = Self::raw(container, key)?;
        let reader = self.op.reader(&raw).await.map_err(op_err(key))?;
        let body = reader
            .into_bytes_stream(..)
            .await
            .map_err(op_err(key))?
            .map(|chunk| chunk.map_err(std::io::Error::other))
            .boxed();
        Ok(ObjectStream { info, body })
    }

    async fn delete_object(&self, container: &str, key: &str) -> StorageResult<()> {
        self.require_container(container).await?;
        if key.is_empty() {
            return Err(StorageError::invalid("cannot delete the container root as an object"));
        }
        let raw = Self::raw(container, key)?;
        if codec::is_folder_key(key) {
            self.op
                .delete(&Self::companion(&raw))
                .await
                .map_err(StorageError::backend)?;
        }
        self.op.delete(&raw).await.map_err(StorageError::backend)
    }

    async fn list_objects(
        &self,
        container: &str,
        prefix: &str,
        delimiter: Option<char>,
    ) -> StorageResult<ObjectListing> {
        self.require_container(container).await?;
        let raw_prefix = Self::raw(container, prefix)?;

        let entries = match self
            .op
            .list_with(&raw_prefix)
            .recursive(delimiter.is_none())
            .await
        {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(StorageError::backend(e)),
        };

        let mut listing = ObjectListing::default();
        let mut common = BTreeSet::new();
        for entry in entries {
            let Some(key) = Self::CODEC.decode_key(container, entry.path()) else {
                continue;
            };
            if codec::short_name(&key) == PROPERTIES_OBJECT && !codec::is_folder_key(&key) {
                continue;
            }
            if delimiter.is_some() && codec::is_folder_key(&key) && key != prefix {
                common.insert(key);
                continue;
            }
            listing.objects.push(Self::info_from(&key, entry.metadata()));
        }

        listing.objects.sort_by(|a, b| a.key.cmp(&b.key));
        listing.common_prefixes = common.into_iter().collect();
        debug!(container, prefix, delimited = delimiter.is_some(), count = listing.objects.len(), "object store list");
        Ok(listing)
    }
}
