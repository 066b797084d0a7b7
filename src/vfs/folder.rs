//! Virtual folders on top of any [`StorageBackend`].
//!
//! A folder is an object whose key ends in `/`. On a filesystem that is a
//! directory; on an object store it is a marker object. The engine only
//! relies on the trait, so the same rules apply to every medium.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use super::batch::{self, BatchReport};
use super::file::FileEntry;
use crate::error::{StorageError, StorageResult};
use crate::storage::codec::{self, DELIMITER};
use crate::storage::{Metadata, ObjectInfo, PutOptions, SharedBackend, StorageBackend};

/// A folder in a listing or a mutation acknowledgement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FolderEntry {
    pub name: String,
    /// `<container>/<relative-path>/`
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<Value>,
}

impl FolderEntry {
    pub fn new(container: &str, key: &str) -> Self {
        Self {
            name: codec::short_name(key).to_string(),
            path: format!("{container}{DELIMITER}{key}"),
            last_modified: None,
            properties: None,
        }
    }
}

/// Result of [`FolderEngine::list`], serialized as `{ "folder": [..], "file": [..] }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FolderListing {
    #[serde(rename = "folder", skip_serializing_if = "Option::is_none")]
    pub folders: Option<Vec<FolderEntry>>,
    #[serde(rename = "file", skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<FileEntry>>,
}

/// Flags for [`FolderEngine::list`].
#[derive(Debug, Clone, Copy)]
pub struct ListOptions {
    pub include_files: bool,
    pub include_folders: bool,
    pub full_tree: bool,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            include_files: true,
            include_folders: true,
            full_tree: false,
        }
    }
}

/// Parses a marker payload. Non-JSON payloads come back as a string.
fn parse_properties(payload: &[u8]) -> Option<Value> {
    if payload.is_empty() {
        return None;
    }
    serde_json::from_slice(payload)
        .ok()
        .or_else(|| Some(Value::String(String::from_utf8_lossy(payload).into_owned())))
}

fn encode_properties(properties: Option<&Value>) -> StorageResult<Bytes> {
    match properties {
        None | Some(Value::Null) => Ok(Bytes::new()),
        Some(value) => serde_json::to_vec(value)
            .map(Bytes::from)
            .map_err(|e| StorageError::invalid(format!("invalid folder properties: {e}"))),
    }
}

fn folder_key(path: &str) -> StorageResult<String> {
    let key = codec::normalize_folder(path);
    if key.is_empty() {
        return Err(StorageError::invalid("folder path cannot be empty"));
    }
    Ok(key)
}

/// Creates the container if it does not exist yet. Idempotent.
pub(crate) async fn ensure_container(
    backend: &dyn StorageBackend,
    container: &str,
) -> StorageResult<()> {
    if !backend.container_exists(container).await? {
        backend.create_container(container, &Metadata::new()).await?;
        info!(container, "Created container on first write");
    }
    Ok(())
}

/// Hierarchical folder operations.
#[derive(Clone)]
pub struct FolderEngine {
    backend: SharedBackend,
}

impl FolderEngine {
    pub fn new(backend: SharedBackend) -> Self {
        Self { backend }
    }

    /// True iff the folder's marker exists. The empty path is the container root.
    pub async fn exists(&self, container: &str, path: &str) -> StorageResult<bool> {
        if !self.backend.container_exists(container).await? {
            return Ok(false);
        }
        let key = codec::normalize_folder(path);
        if key.is_empty() {
            return Ok(true);
        }
        self.backend.object_exists(container, &key).await
    }

    /// Lists a folder's children (or its whole subtree with `full_tree`).
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the container or folder does not exist.
    pub async fn list(
        &self,
        container: &str,
        path: &str,
        options: ListOptions,
    ) -> StorageResult<FolderListing> {
        let prefix = codec::normalize_folder(path);
        let delimiter = (!options.full_tree).then_some(DELIMITER);
        let listing = self
            .backend
            .list_objects(container, &prefix, delimiter)
            .await?;

        if !prefix.is_empty()
            && listing.objects.is_empty()
            && listing.common_prefixes.is_empty()
        {
            return Err(StorageError::folder_not_found(prefix));
        }

        let mut folders = Vec::new();
        let mut files = Vec::new();
        for object in &listing.objects {
            if object.key == prefix {
                continue;
            }
            if object.is_folder() {
                folders.push(self.folder_entry(container, object));
            } else {
                files.push(FileEntry::from_info(container, object));
            }
        }
        for key in &listing.common_prefixes {
            let entry = FolderEntry::new(container, key);
            if !folders.iter().any(|f| f.path == entry.path) {
                folders.push(entry);
            }
        }
        folders.sort_by(|a, b| a.path.cmp(&b.path));

        debug!(container, path = %prefix, folders = folders.len(), files = files.len(), "Listed folder");
        Ok(FolderListing {
            folders: options.include_folders.then_some(folders),
            files: options.include_files.then_some(files),
        })
    }

    fn folder_entry(&self, container: &str, object: &ObjectInfo) -> FolderEntry {
        FolderEntry {
            last_modified: object.last_modified,
            ..FolderEntry::new(container, &object.key)
        }
    }

    /// Returns a folder with its properties payload.
    pub async fn get_properties(&self, container: &str, path: &str) -> StorageResult<FolderEntry> {
        let key = codec::normalize_folder(path);
        if key.is_empty() {
            let info = self.backend.get_container(container).await?;
            return Ok(FolderEntry {
                name: container.to_string(),
                path: format!("{container}{DELIMITER}"),
                last_modified: info.last_modified,
                properties: None,
            });
        }
        let info = self
            .backend
            .head_object(container, &key)
            .await?
            .ok_or_else(|| StorageError::folder_not_found(&key))?;
        let payload = self.backend.get_object(container, &key).await?;
        Ok(FolderEntry {
            last_modified: info.last_modified,
            properties: parse_properties(&payload),
            ..FolderEntry::new(container, &key)
        })
    }

    /// Creates a folder, creating missing ancestors first.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyExists` if the folder exists and `check_exist` is set.
    pub async fn create(
        &self,
        container: &str,
        path: &str,
        properties: Option<&Value>,
        check_exist: bool,
    ) -> StorageResult<FolderEntry> {
        let key = folder_key(path)?;
        ensure_container(self.backend.as_ref(), container).await?;

        if self.backend.object_exists(container, &key).await? {
            if check_exist {
                return Err(StorageError::folder_exists(&key));
            }
            if properties.is_some() {
                self.write_marker(container, &key, properties).await?;
            }
            return Ok(FolderEntry::new(container, &key));
        }

        self.create_parent_chain(container, codec::parent_folder(&key))
            .await?;
        self.write_marker(container, &key, properties).await?;
        info!(container, path = %key, "Created folder");
        Ok(FolderEntry::new(container, &key))
    }

    /// Makes sure `path` exists as an upload destination. Only the folder
    /// itself is created; missing ancestors are not.
    ///
    /// # Errors
    ///
    /// Returns `ParentNotFound` if the folder is missing and so is its parent.
    pub async fn ensure_leaf(&self, container: &str, path: &str) -> StorageResult<FolderEntry> {
        let key = folder_key(path)?;
        ensure_container(self.backend.as_ref(), container).await?;
        if self.backend.object_exists(container, &key).await? {
            return Ok(FolderEntry::new(container, &key));
        }
        let parent = codec::parent_folder(&key);
        if !parent.is_empty() && !self.backend.object_exists(container, parent).await? {
            return Err(StorageError::parent_not_found(parent));
        }
        self.write_marker(container, &key, None).await?;
        info!(container, path = %key, "Created folder");
        Ok(FolderEntry::new(container, &key))
    }

    /// Creates every missing folder from the root down to `folder`, with
    /// `check_exist` off so folders that already exist are left alone.
    ///
    /// The container must already exist.
    pub async fn create_parent_chain(&self, container: &str, folder: &str) -> StorageResult<()> {
        let folder = codec::normalize_folder(folder);
        if folder.is_empty() {
            return Ok(());
        }
        let mut chain = codec::ancestors(&folder);
        chain.push(&folder);
        for key in chain {
            if !self.backend.object_exists(container, key).await? {
                self.write_marker(container, key, None).await?;
                debug!(container, path = key, "Created missing parent folder");
            }
        }
        Ok(())
    }

    async fn write_marker(
        &self,
        container: &str,
        key: &str,
        properties: Option<&Value>,
    ) -> StorageResult<()> {
        let payload = encode_properties(properties)?;
        self.backend
            .put_object(container, key, payload.into(), &PutOptions::default())
            .await
    }

    /// Replaces a folder's properties payload.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the folder does not exist.
    pub async fn update_properties(
        &self,
        container: &str,
        path: &str,
        properties: &Value,
    ) -> StorageResult<FolderEntry> {
        let key = folder_key(path)?;
        if !self.backend.object_exists(container, &key).await? {
            return Err(StorageError::folder_not_found(&key));
        }
        self.write_marker(container, &key, Some(properties)).await?;
        Ok(FolderEntry {
            properties: Some(properties.clone()),
            ..FolderEntry::new(container, &key)
        })
    }

    /// Copies a folder and everything below it.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the source folder is missing
    /// - `AlreadyExists` if the destination exists and `check_exist` is set
    /// - `ParentNotFound` if the destination's parent folder is missing
    pub async fn copy(
        &self,
        container: &str,
        dest_path: &str,
        src_container: &str,
        src_path: &str,
        check_exist: bool,
    ) -> StorageResult<FolderEntry> {
        let dest = folder_key(dest_path)?;
        let src = folder_key(src_path)?;

        if !self.exists(src_container, &src).await? {
            return Err(StorageError::folder_not_found(&src));
        }
        if container == src_container && dest.starts_with(&src) {
            return Err(StorageError::invalid(format!(
                "cannot copy {src} into itself"
            )));
        }
        ensure_container(self.backend.as_ref(), container).await?;
        if check_exist && self.backend.object_exists(container, &dest).await? {
            return Err(StorageError::folder_exists(&dest));
        }
        let parent = codec::parent_folder(&dest);
        if !self.exists(container, parent).await? {
            return Err(StorageError::parent_not_found(parent));
        }

        self.backend
            .copy_object(container, &dest, src_container, &src)
            .await?;
        self.backend
            .copy_prefix(container, &dest, src_container, &src)
            .await?;
        info!(container, dest = %dest, src_container, src = %src, "Copied folder");
        Ok(FolderEntry::new(container, &dest))
    }

    /// Deletes a folder.
    ///
    /// Without `force` the folder must be empty. With it every descendant
    /// is removed, deepest first, before the marker itself.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the folder does not exist
    /// - `NotEmpty` if it has descendants and `force` is off
    pub async fn delete(
        &self,
        container: &str,
        path: &str,
        force: bool,
    ) -> StorageResult<FolderEntry> {
        let key = folder_key(path)?;
        let listing = self.backend.list_objects(container, &key, None).await?;
        let has_marker = listing.objects.iter().any(|o| o.key == key);
        let descendants: Vec<&str> = listing
            .objects
            .iter()
            .map(|o| o.key.as_str())
            .filter(|k| *k != key)
            .collect();

        if !has_marker && descendants.is_empty() {
            return Err(StorageError::folder_not_found(&key));
        }
        if !descendants.is_empty() && !force {
            return Err(StorageError::not_empty(&key));
        }

        self.delete_keys(container, descendants).await?;
        self.backend.delete_object(container, &key).await?;
        info!(container, path = %key, force, "Deleted folder");
        Ok(FolderEntry::new(container, &key))
    }

    /// Deletes everything below a folder but keeps the folder itself.
    /// The empty path empties the whole container.
    pub async fn delete_contents(&self, container: &str, path: &str) -> StorageResult<usize> {
        let key = codec::normalize_folder(path);
        let listing = self.backend.list_objects(container, &key, None).await?;
        let descendants: Vec<&str> = listing
            .objects
            .iter()
            .map(|o| o.key.as_str())
            .filter(|k| *k != key)
            .collect();
        let count = descendants.len();
        self.delete_keys(container, descendants).await?;
        debug!(container, path = %key, count, "Emptied folder");
        Ok(count)
    }

    /// Deletes keys children-first so directories are empty when reached.
    async fn delete_keys(&self, container: &str, mut keys: Vec<&str>) -> StorageResult<()> {
        // A child key always sorts after its parent's key.
        keys.sort_unstable_by(|a, b| b.cmp(a));
        for key in keys {
            self.backend.delete_object(container, key).await?;
        }
        Ok(())
    }

    /// Deletes each listed folder independently.
    ///
    /// Items are `{ "name": .. }` (relative to `root`) or `{ "path": .. }`.
    /// A failing item gets an `error` attached and the rest still run.
    pub async fn delete_batch(
        &self,
        container: &str,
        items: Vec<Value>,
        root: &str,
        force: bool,
    ) -> BatchReport {
        let mut report = BatchReport::new();
        for item in items {
            let force = force || batch::bool_field(&item, "force");
            let result = match batch::resolve_item_path(&item, root) {
                Ok(path) => self.delete(container, &path, force).await,
                Err(e) => Err(e),
            };
            report.record(item, result);
        }
        report
    }

    /// Creates (or copies, with `source_path`) each listed folder independently.
    pub async fn create_batch(
        &self,
        container: &str,
        items: Vec<Value>,
        root: &str,
        check_exist: bool,
    ) -> BatchReport {
        let mut report = BatchReport::new();
        for item in items {
            let result = match batch::resolve_item_path(&item, root) {
                Ok(path) => match batch::str_field(&item, "source_path") {
                    Some(src) => self.copy(container, &path, container, src, check_exist).await,
                    None => {
                        self.create(container, &path, item.get("properties"), check_exist)
                            .await
                    },
                },
                Err(e) => Err(e),
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

    fn engine() -> FolderEngine {
        FolderEngine::new(Arc::new(MemoryBackend::new()))
    }

    fn names(entries: &[FolderEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.name.as_str()).collect()
    }

    #[tokio::test]
    async fn test_create_then_list_parent() {
        let folders = engine();
        folders.create("media", "reports/2024", None, true).await.unwrap();

        assert!(folders.exists("media", "reports/2024/").await.unwrap());
        assert!(folders.exists("media", "reports").await.unwrap());

        let listing = folders.list("media", "reports", ListOptions::default()).await.unwrap();
        let entries = listing.folders.unwrap();
        assert_eq!(names(&entries), vec!["2024"]);
        assert_eq!(entries[0].path, "media/reports/2024/");
        assert!(listing.files.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_check_exist() {
        let folders = engine();
        folders.create("media", "a", None, true).await.unwrap();
        let err = folders.create("media", "a/", None, true).await.unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists { .. }));
        folders.create("media", "a", None, false).await.unwrap();
    }

    #[tokio::test]
    async fn test_properties_round_trip() {
        let folders = engine();
        let props = json!({ "color": "blue" });
        folders.create("media", "docs", Some(&props), true).await.unwrap();
        assert_eq!(
            folders.get_properties("media", "docs").await.unwrap().properties,
            Some(props)
        );

        let updated = json!({ "color": "red" });
        folders.update_properties("media", "docs", &updated).await.unwrap();
        assert_eq!(
            folders.get_properties("media", "docs").await.unwrap().properties,
            Some(updated)
        );

        let err = folders
            .update_properties("media", "missing", &json!({}))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete_requires_force() {
        let folders = engine();
        folders.create("media", "a/b/c", None, true).await.unwrap();

        let err = folders.delete("media", "a", false).await.unwrap_err();
        assert!(matches!(err, StorageError::NotEmpty { .. }));
        assert!(folders.exists("media", "a/b/c").await.unwrap());

        folders.delete("media", "a", true).await.unwrap();
        assert!(!folders.exists("media", "a").await.unwrap());
        assert!(!folders.exists("media", "a/b/c").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_batch_partial_failure() {
        let folders = engine();
        for name in ["one", "two", "three"] {
            folders.create("media", name, None, true).await.unwrap();
        }
        let items = vec![
            json!({ "name": "one" }),
            json!({ "name": "missing" }),
            json!({ "path": "three/" }),
            json!({ "name": "two" }),
        ];

        let report = folders.delete_batch("media", items, "", false).await;
        assert_eq!(report.len(), 4);
        assert_eq!(report.failure_count(), 1);
        assert!(report.outcomes()[1].error.is_some());
        for name in ["one", "two", "three"] {
            assert!(!folders.exists("media", name).await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_ensure_leaf_needs_parent() {
        let folders = engine();
        let err = folders.ensure_leaf("media", "a/b/").await.unwrap_err();
        assert!(matches!(err, StorageError::ParentNotFound { .. }));
        assert!(!folders.exists("media", "a/").await.unwrap());

        folders.ensure_leaf("media", "a/").await.unwrap();
        let entry = folders.ensure_leaf("media", "a/b/").await.unwrap();
        assert_eq!(entry.path, "media/a/b/");
        assert!(folders.exists("media", "a/b/").await.unwrap());
    }

    #[tokio::test]
    async fn test_copy_rules() {
        let folders = engine();
        folders.create("media", "src/sub", None, true).await.unwrap();
        folders.create("media", "dst", None, true).await.unwrap();

        let err = folders
            .copy("media", "nowhere/dst", "media", "src", false)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::ParentNotFound { .. }));

        let err = folders.copy("media", "dst", "media", "src", true).await.unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists { .. }));

        let err = folders.copy("media", "x", "media", "missing", false).await.unwrap_err();
        assert!(err.is_not_found());

        folders.copy("media", "dst/copy", "media", "src", true).await.unwrap();
        assert!(folders.exists("media", "dst/copy/sub").await.unwrap());
    }

    #[tokio::test]
    async fn test_full_tree_listing() {
        let folders = engine();
        folders.create("media", "a/b", None, true).await.unwrap();
        folders.create("media", "c", None, true).await.unwrap();

        let options = ListOptions {
            full_tree: true,
            ..ListOptions::default()
        };
        let listing = folders.list("media", "", options).await.unwrap();
        assert_eq!(names(&listing.folders.unwrap()), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_list_missing_folder() {
        let folders = engine();
        folders.create("media", "a", None, true).await.unwrap();
        let err = folders
            .list("media", "nope", ListOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
