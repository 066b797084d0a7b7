//! Object-level file operations on top of any [`StorageBackend`].

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use tracing::{debug, info, warn};

use super::batch::{self, BatchReport};
use super::content;
use super::folder::ensure_container;
use crate::error::{StorageError, StorageResult};
use crate::storage::backend::ByteStream;
use crate::storage::codec::{self, DELIMITER};
use crate::storage::{Metadata, ObjectInfo, PutOptions, PutSource, SharedBackend};

/// A file in a listing or a mutation acknowledgement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileEntry {
    pub name: String,
    /// `<container>/<relative-path>`
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_length: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
}

impl FileEntry {
    pub fn new(container: &str, key: &str) -> Self {
        Self {
            name: codec::short_name(key).to_string(),
            path: format!("{container}{DELIMITER}{key}"),
            content_type: None,
            content_length: None,
            last_modified: None,
        }
    }

    pub fn from_info(container: &str, info: &ObjectInfo) -> Self {
        Self {
            content_type: info.content_type.clone(),
            content_length: Some(info.size),
            last_modified: info.last_modified,
            ..Self::new(container, &info.key)
        }
    }
}

/// Full property set of one file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileProperties {
    #[serde(flatten)]
    pub entry: FileEntry,
    #[serde(skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Options for [`FileEngine::write`] and [`FileEngine::move_from`].
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    /// The content is base64 text to decode before storing
    pub is_base64: bool,
    /// Fail with `AlreadyExists` instead of overwriting
    pub check_exist: bool,
    /// Explicit content type; inferred when absent
    pub content_type: Option<String>,
    pub metadata: Metadata,
}

/// An opened file ready to be sent to a client.
pub struct StreamedFile {
    pub name: String,
    pub content_type: String,
    pub content_length: u64,
    pub last_modified: Option<DateTime<Utc>>,
    /// `inline; filename=".."` or `attachment; filename=".."`
    pub disposition: String,
    pub body: ByteStream,
}

impl std::fmt::Debug for StreamedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamedFile")
            .field("name", &self.name)
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Builds a `Content-Disposition` value.
///
/// ```
/// use blobgate::vfs::file::content_disposition;
///
/// assert_eq!(content_disposition("a.txt", true), "attachment; filename=\"a.txt\"");
/// assert_eq!(content_disposition("a\"b.txt", false), "inline; filename=\"a_b.txt\"");
/// ```
pub fn content_disposition(name: &str, download: bool) -> String {
    let kind = if download { "attachment" } else { "inline" };
    let safe: String = name
        .chars()
        .map(|c| if c == '"' || c == '\\' || c.is_control() { '_' } else { c })
        .collect();
    format!("{kind}; filename=\"{safe}\"")
}

fn file_key(path: &str) -> StorageResult<String> {
    codec::normalize_file(path)
        .ok_or_else(|| StorageError::invalid(format!("not a file path: '{path}'")))
}

fn as_file_error(key: &str, err: StorageError) -> StorageError {
    if err.is_not_found() && !matches!(err, StorageError::NotFound { kind: "container", .. }) {
        StorageError::file_not_found(key)
    } else {
        err
    }
}

/// File operations.
#[derive(Clone)]
pub struct FileEngine {
    backend: SharedBackend,
}

impl FileEngine {
    pub fn new(backend: SharedBackend) -> Self {
        Self { backend }
    }

    /// True if the file exists. A missing container is just `false`.
    pub async fn exists(&self, container: &str, path: &str) -> StorageResult<bool> {
        let key = file_key(path)?;
        if !self.backend.container_exists(container).await? {
            return Ok(false);
        }
        self.backend.object_exists(container, &key).await
    }

    /// Reads a whole file.
    pub async fn read(&self, container: &str, path: &str) -> StorageResult<Bytes> {
        let key = file_key(path)?;
        self.backend
            .get_object(container, &key)
            .await
            .map_err(|e| as_file_error(&key, e))
    }

    /// Reads a whole file as base64 text.
    pub async fn read_base64(&self, container: &str, path: &str) -> StorageResult<String> {
        Ok(BASE64.encode(self.read(container, path).await?))
    }

    /// Writes a file's content to a local path without buffering it.
    pub async fn read_to_file(
        &self,
        container: &str,
        path: &str,
        local_path: &Path,
    ) -> StorageResult<()> {
        let key = file_key(path)?;
        self.backend
            .get_object_to_file(container, &key, local_path)
            .await
            .map_err(|e| as_file_error(&key, e))
    }

    async fn head(&self, container: &str, key: &str) -> StorageResult<ObjectInfo> {
        self.backend
            .head_object(container, key)
            .await?
            .ok_or_else(|| StorageError::file_not_found(key))
    }

    /// Returns a file's properties, optionally with its content.
    pub async fn get_properties(
        &self,
        container: &str,
        path: &str,
        include_content: bool,
        content_as_base64: bool,
    ) -> StorageResult<FileProperties> {
        let key = file_key(path)?;
        let mut info = self.head(container, &key).await?;
        if info.content_type.is_none() {
            info.content_type = Some(content::infer_content_type(&key, &[]));
        }

        let content = if include_content {
            let data = self.read(container, &key).await?;
            Some(if content_as_base64 {
                BASE64.encode(&data)
            } else {
                String::from_utf8_lossy(&data).into_owned()
            })
        } else {
            None
        };

        Ok(FileProperties {
            entry: FileEntry::from_info(container, &info),
            metadata: std::mem::take(&mut info.metadata),
            content,
        })
    }

    /// Checks shared by every write path; creates the container on first use.
    async fn prepare_write(&self, container: &str, key: &str, check_exist: bool) -> StorageResult<()> {
        ensure_container(self.backend.as_ref(), container).await?;
        if check_exist && self.backend.object_exists(container, key).await? {
            return Err(StorageError::file_exists(key));
        }
        let parent = codec::parent_folder(key);
        if !parent.is_empty() && !self.backend.object_exists(container, parent).await? {
            return Err(StorageError::parent_not_found(parent));
        }
        Ok(())
    }

    /// Creates or replaces a file from in-memory content.
    ///
    /// # Errors
    ///
    /// - `AlreadyExists` if the file exists and `check_exist` is set
    /// - `ParentNotFound` if the parent folder is missing
    /// - `InvalidArgument` for undecodable base64 content
    pub async fn write(
        &self,
        container: &str,
        path: &str,
        content: Bytes,
        options: &WriteOptions,
    ) -> StorageResult<FileEntry> {
        let key = file_key(path)?;
        let data = if options.is_base64 {
            let text: Vec<u8> = content.iter().copied().filter(|b| !b.is_ascii_whitespace()).collect();
            BASE64
                .decode(text)
                .map(Bytes::from)
                .map_err(|e| StorageError::invalid(format!("invalid base64 content: {e}")))?
        } else {
            content
        };
        self.prepare_write(container, &key, options.check_exist).await?;

        let content_type = options.content_type.clone().unwrap_or_else(|| {
            content::infer_content_type(&key, &data[..data.len().min(content::SNIFF_LEN)])
        });
        let size = data.len() as u64;
        self.backend
            .put_object(
                container,
                &key,
                PutSource::Bytes(data),
                &PutOptions {
                    content_type: Some(content_type.clone()),
                    metadata: options.metadata.clone(),
                },
            )
            .await?;
        debug!(container, path = %key, size, "Wrote file");
        Ok(FileEntry {
            content_type: Some(content_type),
            content_length: Some(size),
            ..FileEntry::new(container, &key)
        })
    }

    /// Ingests an externally staged local file, removing it afterwards.
    ///
    /// Same rules as [`FileEngine::write`]; `is_base64` is ignored.
    pub async fn move_from(
        &self,
        container: &str,
        path: &str,
        local_file: &Path,
        options: &WriteOptions,
    ) -> StorageResult<FileEntry> {
        let key = file_key(path)?;
        self.prepare_write(container, &key, options.check_exist).await?;

        let content_type = match &options.content_type {
            Some(content_type) => content_type.clone(),
            None => {
                let head = content::read_head(local_file)
                    .await
                    .map_err(|e| StorageError::io(local_file.display().to_string(), e))?;
                content::infer_content_type(&key, &head)
            },
        };
        self.backend
            .put_object(
                container,
                &key,
                PutSource::File(local_file.to_path_buf()),
                &PutOptions {
                    content_type: Some(content_type.clone()),
                    metadata: options.metadata.clone(),
                },
            )
            .await?;

        if let Err(e) = tokio::fs::remove_file(local_file).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(path = %local_file.display(), error = %e, "Failed to remove staged file");
        }
        debug!(container, path = %key, "Moved staged file into storage");
        Ok(FileEntry {
            content_type: Some(content_type),
            ..FileEntry::new(container, &key)
        })
    }

    /// Copies one file.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the source is missing
    /// - `AlreadyExists` if the destination exists and `check_exist` is set
    /// - `ParentNotFound` if the destination's parent folder is missing
    pub async fn copy(
        &self,
        container: &str,
        dest_path: &str,
        src_container: &str,
        src_path: &str,
        check_exist: bool,
    ) -> StorageResult<FileEntry> {
        let dest = file_key(dest_path)?;
        let src = file_key(src_path)?;
        if !self.exists(src_container, &src).await? {
            return Err(StorageError::file_not_found(&src));
        }
        self.prepare_write(container, &dest, check_exist).await?;
        self.backend
            .copy_object(container, &dest, src_container, &src)
            .await
            .map_err(|e| as_file_error(&src, e))?;
        info!(container, dest = %dest, src_container, src = %src, "Copied file");
        Ok(FileEntry::new(container, &dest))
    }

    /// Replaces a file's user metadata, leaving its content untouched.
    pub async fn update_metadata(
        &self,
        container: &str,
        path: &str,
        metadata: Metadata,
    ) -> StorageResult<FileEntry> {
        let key = file_key(path)?;
        let info = self.head(container, &key).await?;
        let data = self.read(container, &key).await?;
        let options = PutOptions {
            content_type: info.content_type.clone(),
            metadata,
        };
        self.backend
            .put_object(container, &key, PutSource::Bytes(data), &options)
            .await?;
        Ok(FileEntry::from_info(container, &info))
    }

    /// Deletes a file. Deleting a missing file succeeds.
    pub async fn delete(&self, container: &str, path: &str) -> StorageResult<FileEntry> {
        let key = file_key(path)?;
        self.backend.delete_object(container, &key).await?;
        debug!(container, path = %key, "Deleted file");
        Ok(FileEntry::new(container, &key))
    }

    /// Deletes each listed file independently. See [`BatchReport`].
    pub async fn delete_batch(&self, container: &str, items: Vec<Value>, root: &str) -> BatchReport {
        let mut report = BatchReport::new();
        for item in items {
            let result = match batch::resolve_item_path(&item, root) {
                Ok(path) => self.delete(container, &path).await,
                Err(e) => Err(e),
            };
            report.record(item, result);
        }
        report
    }

    /// Creates each listed file independently.
    ///
    /// An item carries `content` (base64 with `is_base64`), optional
    /// `content_type`, or `source_path` for a server-side copy.
    pub async fn create_batch(
        &self,
        container: &str,
        items: Vec<Value>,
        root: &str,
        check_exist: bool,
    ) -> BatchReport {
        let mut report = BatchReport::new();
        for item in items {
            let result = self.create_item(container, &item, root, check_exist).await;
            report.record(item, result);
        }
        report
    }

    async fn create_item(
        &self,
        container: &str,
        item: &Value,
        root: &str,
        check_exist: bool,
    ) -> StorageResult<FileEntry> {
        let path = batch::resolve_item_path(item, root)?;
        if let Some(src) = batch::str_field(item, "source_path") {
            return self.copy(container, &path, container, src, check_exist).await;
        }
        let content = batch::str_field(item, "content").unwrap_or_default();
        let options = WriteOptions {
            is_base64: batch::bool_field(item, "is_base64"),
            check_exist,
            content_type: batch::str_field(item, "content_type").map(str::to_string),
            metadata: Metadata::new(),
        };
        self.write(container, &path, Bytes::copy_from_slice(content.as_bytes()), &options)
            .await
    }

    /// Opens a file for streaming with its response headers resolved.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the file is missing, distinct from backend failures.
    pub async fn stream(
        &self,
        container: &str,
        path: &str,
        download: bool,
    ) -> StorageResult<StreamedFile> {
        let key = file_key(path)?;
        let stream = self
            .backend
            .stream_object(container, &key)
            .await
            .map_err(|e| as_file_error(&key, e))?;
        let name = codec::short_name(&key).to_string();
        let content_type = stream
            .info
            .content_type
            .clone()
            .unwrap_or_else(|| content::infer_content_type(&key, &[]));

        Ok(StreamedFile {
            disposition: content_disposition(&name, download),
            name,
            content_type,
            content_length: stream.info.size,
            last_modified: stream.info.last_modified,
            body: stream.body,
        })
    }
}
