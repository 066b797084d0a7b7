//! Filesystem-backed storage backend.
//!
//! Containers are directories under the storage root, folders are native
//! directories and files are plain files. Content types, user metadata,
//! folder properties and container metadata are tracked in redb.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

use super::backend::{
    ContainerInfo, Metadata, ObjectInfo, ObjectListing, ObjectStream, PutOptions, PutSource,
    StorageBackend,
};
use super::codec::{self, DELIMITER, PathCodec};
use super::metadata::{MetaStore, StoredMeta};
use super::validation::{object_path, validate_container};
use crate::error::{StorageError, StorageResult};

/// Name of the metadata database inside the storage root.
pub const META_DB_FILE: &str = ".blobgate-meta.redb";

/// Read size for streamed file bodies.
const CHUNK_SIZE: usize = 64 * 1024;

fn modified(md: &fs::Metadata) -> Option<DateTime<Utc>> {
    md.modified().ok().map(DateTime::<Utc>::from)
}

/// Filesystem-backed storage backend.
///
/// # Thread Safety
///
/// `FilesystemBackend` is `Clone` and can be shared across threads. All
/// filesystem work runs on the blocking pool.
#[derive(Clone)]
pub struct FilesystemBackend {
    root: PathBuf,
    meta: MetaStore,
}

impl FilesystemBackend {
    const CODEC: PathCodec = PathCodec::prefixed();

    /// Creates or opens the storage backend at the given root directory.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The root directory cannot be created
    /// - The metadata database cannot be opened or initialized
    /// - Pruning orphaned metadata fails
    pub fn open<P: AsRef<Path>>(root: P) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)
            .map_err(|e| StorageError::io(format!("create {}", root.display()), e))?;

        let meta = MetaStore::open(&root.join(META_DB_FILE))?;
        meta.prune(&root)?;

        info!(root = %root.display(), "Opened filesystem storage");
        Ok(Self { root, meta })
    }

    /// Root directory of this backend.
    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn blocking<T, F>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(Self) -> StorageResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let backend = self.clone();
        tokio::task::spawn_blocking(move || f(backend))
            .await
            .map_err(|e| StorageError::backend(format!("Task join error: {e}")))?
    }

    fn container_dir(&self, name: &str) -> StorageResult<PathBuf> {
        validate_container(name)?;
        Ok(self.root.join(name))
    }

    fn require_container(&self, name: &str) -> StorageResult<PathBuf> {
        let dir = self.container_dir(name)?;
        if dir.is_dir() {
            Ok(dir)
        } else {
            Err(StorageError::container_not_found(name))
        }
    }

    fn container_info_sync(&self, name: &str) -> StorageResult<ContainerInfo> {
        let dir = self.require_container(name)?;
        let md = fs::metadata(&dir).map_err(|e| StorageError::from_io("container", name, e))?;
        let stored = self.meta.load(&Self::CODEC.container_key(name))?;
        Ok(ContainerInfo {
            name: name.to_string(),
            last_modified: modified(&md),
            metadata: stored.map(|m| m.metadata).unwrap_or_default(),
        })
    }

    fn list_containers_sync(&self) -> StorageResult<Vec<ContainerInfo>> {
        let entries = fs::read_dir(&self.root)
            .map_err(|e| StorageError::io(self.root.display().to_string(), e))?;

        let mut containers = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StorageError::io(self.root.display().to_string(), e))?;
            let is_dir = entry.file_type().is_ok_and(|t| t.is_dir());
            if let (true, Some(name)) = (is_dir, entry.file_name().to_str()) {
                containers.push(self.container_info_sync(name)?);
            }
        }
        containers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(containers)
    }

    fn create_container_sync(&self, name: &str, metadata: &Metadata) -> StorageResult<()> {
        let dir = self.container_dir(name)?;
        if dir.is_dir() {
            return Ok(());
        }
        fs::create_dir_all(&dir).map_err(|e| StorageError::io(format!("container {name}"), e))?;
        self.meta.save(
            &Self::CODEC.container_key(name),
            &StoredMeta {
                metadata: metadata.clone(),
                updated_at: Utc::now(),
                ..StoredMeta::default()
            },
        )?;
        info!(container = name, "Created container");
        Ok(())
    }

    fn set_container_metadata_sync(&self, name: &str, metadata: &Metadata) -> StorageResult<()> {
        self.require_container(name)?;
        let key = Self::CODEC.container_key(name);
        let mut stored = self.meta.load(&key)?.unwrap_or_default();
        stored.metadata = metadata.clone();
        stored.updated_at = Utc::now();
        self.meta.save(&key, &stored)
    }

    fn delete_container_sync(&self, name: &str) -> StorageResult<()> {
        let dir = self.require_container(name)?;
        fs::remove_dir_all(&dir).map_err(|e| StorageError::from_io("container", name, e))?;
        self.meta.remove_prefix(&Self::CODEC.container_key(name))?;
        info!(container = name, "Deleted container");
        Ok(())
    }

    /// Builds the info record for a path already known to exist.
    fn info_for(&self, container: &str, key: &str, md: &fs::Metadata) -> StorageResult<ObjectInfo> {
        let stored = self
            .meta
            .load(&Self::CODEC.encode_key(container, key))?
            .unwrap_or_default();
        let size = if md.is_dir() {
            stored.payload.len() as u64
        } else {
            md.len()
        };
        Ok(ObjectInfo {
            key: key.to_string(),
            size,
            content_type: stored.content_type,
            last_modified: modified(md),
            metadata: stored.metadata,
        })
    }

    fn head_sync(&self, container: &str, key: &str) -> StorageResult<Option<ObjectInfo>> {
        self.require_container(container)?;
        let path = object_path(&self.root, container, key)?;
        // The container root itself is not an object.
        if key.is_empty() {
            return Ok(None);
        }
        let md = match fs::metadata(&path) {
            Ok(md) => md,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::io(key, e)),
        };
        if md.is_dir() != codec::is_folder_key(key) {
            return Ok(None);
        }
        self.info_for(container, key, &md).map(Some)
    }

    fn put_sync(
        &self,
        container: &str,
        key: &str,
        source: PutSource,
        options: &PutOptions,
    ) -> StorageResult<()> {
        self.require_container(container)?;
        let path = object_path(&self.root, container, key)?;
        let meta_key = Self::CODEC.encode_key(container, key);

        if codec::is_folder_key(key) {
            fs::create_dir_all(&path).map_err(|e| StorageError::io(key, e))?;
            let payload = match source {
                PutSource::Bytes(data) => data.to_vec(),
                PutSource::File(src) => {
                    fs::read(&src).map_err(|e| StorageError::io(src.display().to_string(), e))?
                },
            };
            return self.meta.save(
                &meta_key,
                &StoredMeta {
                    content_type: options.content_type.clone(),
                    metadata: options.metadata.clone(),
                    payload,
                    updated_at: Utc::now(),
                },
            );
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| StorageError::io(key, e))?;
        }
        let size = match source {
            PutSource::Bytes(data) => {
                fs::write(&path, &data).map_err(|e| StorageError::io(key, e))?;
                data.len() as u64
            },
            PutSource::File(src) => fs::copy(&src, &path)
                .map_err(|e| StorageError::io(src.display().to_string(), e))?,
        };
        self.meta.save(
            &meta_key,
            &StoredMeta {
                content_type: options.content_type.clone(),
                metadata: options.metadata.clone(),
                payload: Vec::new(),
                updated_at: Utc::now(),
            },
        )?;
        debug!(container, key, size, "filesystem put");
        Ok(())
    }

    fn copy_sync(
        &self,
        container: &str,
        key: &str,
        src_container: &str,
        src_key: &str,
    ) -> StorageResult<()> {
        self.require_container(container)?;
        self.require_container(src_container)?;
        if self.head_sync(src_container, src_key)?.is_none() {
            return Err(StorageError::object_not_found(src_key));
        }
        let src = object_path(&self.root, src_container, src_key)?;
        let dest = object_path(&self.root, container, key)?;

        if codec::is_folder_key(key) {
            fs::create_dir_all(&dest).map_err(|e| StorageError::io(key, e))?;
        } else {
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent).map_err(|e| StorageError::io(key, e))?;
            }
            fs::copy(&src, &dest).map_err(|e| StorageError::from_io("object", src_key, e))?;
        }

        let dest_meta = Self::CODEC.encode_key(container, key);
        match self.meta.load(&Self::CODEC.encode_key(src_container, src_key))? {
            Some(stored) => self.meta.save(&dest_meta, &stored),
            None => self.meta.remove(&dest_meta),
        }
    }

    fn get_sync(&self, container: &str, key: &str) -> StorageResult<Bytes> {
        let info = self
            .head_sync(container, key)?
            .ok_or_else(|| StorageError::object_not_found(key))?;
        if info.is_folder() {
            return self.folder_payload(container, key);
        }
        let path = object_path(&self.root, container, key)?;
        fs::read(&path)
            .map(Bytes::from)
            .map_err(|e| StorageError::from_io("object", key, e))
    }

    fn get_to_file_sync(&self, container: &str, key: &str, dest: &Path) -> StorageResult<()> {
        self.require_container(container)?;
        let src = object_path(&self.root, container, key)?;
        if codec::is_folder_key(key) || !src.is_file() {
            return Err(StorageError::object_not_found(key));
        }
        fs::copy(&src, dest)
            .map(|_| ())
            .map_err(|e| StorageError::from_io("object", key, e))
    }

    fn folder_payload(&self, container: &str, key: &str) -> StorageResult<Bytes> {
        Ok(self
            .meta
            .load(&Self::CODEC.encode_key(container, key))?
            .map(|m| Bytes::from(m.payload))
            .unwrap_or_default())
    }

    fn delete_sync(&self, container: &str, key: &str) -> StorageResult<()> {
        self.require_container(container)?;
        let path = object_path(&self.root, container, key)?;
        if key.is_empty() {
            return Err(StorageError::invalid("cannot delete the container root as an object"));
        }

        let result = if codec::is_folder_key(key) {
            fs::remove_dir(&path)
        } else if path.is_dir() {
            // A file key never removes a directory.
            Ok(())
        } else {
            fs::remove_file(&path)
        };
        match result {
            Ok(()) => {},
            Err(e) if e.kind() == ErrorKind::NotFound => {},
            Err(e) if e.kind() == ErrorKind::DirectoryNotEmpty => {
                return Err(StorageError::not_empty(key));
            },
            Err(e) => return Err(StorageError::io(key, e)),
        }
        self.meta.remove(&Self::CODEC.encode_key(container, key))
    }

    fn list_sync(
        &self,
        container: &str,
        prefix: &str,
        delimiter: Option<char>,
    ) -> StorageResult<ObjectListing> {
        self.require_container(container)?;

        // A prefix that stops mid-name lists its parent directory filtered by the tail.
        let (dir_key, name_filter) = if prefix.is_empty() || codec::is_folder_key(prefix) {
            (prefix, "")
        } else {
            (codec::parent_folder(prefix), codec::short_name(prefix))
        };
        let dir = object_path(&self.root, container, dir_key)?;

        let mut listing = ObjectListing::default();
        if !dir.is_dir() {
            return Ok(listing);
        }
        if !dir_key.is_empty() && name_filter.is_empty() {
            let md = fs::metadata(&dir).map_err(|e| StorageError::io(dir_key, e))?;
            listing.objects.push(self.info_for(container, dir_key, &md)?);
        }

        match delimiter {
            Some(_) => {
                for (name, md) in read_entries(&dir)? {
                    if !name.starts_with(name_filter) {
                        continue;
                    }
                    if md.is_dir() {
                        listing
                            .common_prefixes
                            .push(format!("{dir_key}{name}{DELIMITER}"));
                    } else {
                        let key = format!("{dir_key}{name}");
                        listing.objects.push(self.info_for(container, &key, &md)?);
                    }
                }
            },
            None => {
                for (name, md) in read_entries(&dir)? {
                    if name.starts_with(name_filter) {
                        self.walk(container, &dir.join(&name), format!("{dir_key}{name}"), &md, &mut listing.objects)?;
                    }
                }
            },
        }

        listing.objects.sort_by(|a, b| a.key.cmp(&b.key));
        listing.common_prefixes.sort();
        Ok(listing)
    }

    /// Depth-first walk emitting directory markers and files.
    fn walk(
        &self,
        container: &str,
        path: &Path,
        key: String,
        md: &fs::Metadata,
        out: &mut Vec<ObjectInfo>,
    ) -> StorageResult<()> {
        if !md.is_dir() {
            out.push(self.info_for(container, &key, md)?);
            return Ok(());
        }
        let folder_key = format!("{key}{DELIMITER}");
        out.push(self.info_for(container, &folder_key, md)?);
        for (name, child) in read_entries(path)? {
            self.walk(container, &path.join(&name), format!("{folder_key}{name}"), &child, out)?;
        }
        Ok(())
    }

    fn copy_tree_sync(
        &self,
        container: &str,
        dest_prefix: &str,
        src_container: &str,
        src_prefix: &str,
    ) -> StorageResult<()> {
        self.require_container(container)?;
        self.require_container(src_container)?;
        let src = object_path(&self.root, src_container, src_prefix)?;
        let dest = object_path(&self.root, container, dest_prefix)?;
        if !src.is_dir() {
            return Err(StorageError::folder_not_found(src_prefix));
        }
        if dest.starts_with(&src) && dest != src {
            return Err(StorageError::invalid(format!(
                "cannot copy {src_prefix} into its own subtree"
            )));
        }
        copy_dir_recursive(&src, &dest)?;
        self.meta.copy_prefix(
            &Self::CODEC.encode_key(src_container, src_prefix),
            &Self::CODEC.encode_key(container, dest_prefix),
        )?;
        debug!(container, dest_prefix, src_container, src_prefix, "filesystem tree copy");
        Ok(())
    }
}

/// Reads a directory's entries sorted by name. Non UTF-8 names are skipped.
fn read_entries(dir: &Path) -> StorageResult<Vec<(String, fs::Metadata)>> {
    let context = || dir.display().to_string();
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| StorageError::io(context(), e))? {
        let entry = entry.map_err(|e| StorageError::io(context(), e))?;
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        let md = entry.metadata().map_err(|e| StorageError::io(context(), e))?;
        entries.push((name, md));
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(entries)
}

fn copy_dir_recursive(src: &Path, dest: &Path) -> StorageResult<()> {
    fs::create_dir_all(dest).map_err(|e| StorageError::io(dest.display().to_string(), e))?;
    for (name, md) in read_entries(src)? {
        let from = src.join(&name);
        let to = dest.join(&name);
        if md.is_dir() {
            copy_dir_recursive(&from, &to)?;
        } else {
            fs::copy(&from, &to).map_err(|e| StorageError::io(from.display().to_string(), e))?;
        }
    }
    Ok(())
}

#[async_trait]
impl StorageBackend for FilesystemBackend {
    fn kind(&self) -> &'static str {
        "local"
    }

    async fn list_containers(&self) -> StorageResult<Vec<ContainerInfo>> {
        self.blocking(|backend| backend.list_containers_sync()).await
    }

    async fn container_exists(&self, name: &str) -> StorageResult<bool> {
        let dir = self.container_dir(name)?;
        Ok(tokio::fs::metadata(&dir).await.is_ok_and(|md| md.is_dir()))
    }

    async fn get_container(&self, name: &str) -> StorageResult<ContainerInfo> {
        let name = name.to_string();
        self.blocking(move |backend| backend.container_info_sync(&name))
            .await
    }

    async fn create_container(&self, name: &str, metadata: &Metadata) -> StorageResult<()> {
        let name = name.to_string();
        let metadata = metadata.clone();
        self.blocking(move |backend| backend.create_container_sync(&name, &metadata))
            .await
    }

    async fn set_container_metadata(&self, name: &str, metadata: &Metadata) -> StorageResult<()> {
        let name = name.to_string();
        let metadata = metadata.clone();
        self.blocking(move |backend| backend.set_container_metadata_sync(&name, &metadata))
            .await
    }

    async fn delete_container(&self, name: &str) -> StorageResult<()> {
        let name = name.to_string();
        self.blocking(move |backend| backend.delete_container_sync(&name))
            .await
    }

    async fn head_object(&self, container: &str, key: &str) -> StorageResult<Option<ObjectInfo>> {
        let (container, key) = (container.to_string(), key.to_string());
        self.blocking(move |backend| backend.head_sync(&container, &key))
            .await
    }

    async fn put_object(
        &self,
        container: &str,
        key: &str,
        source: PutSource,
        options: &PutOptions,
    ) -> StorageResult<()> {
        let (container, key) = (container.to_string(), key.to_string());
        let options = options.clone();
        self.blocking(move |backend| backend.put_sync(&container, &key, source, &options))
            .await
    }

    async fn copy_object(
        &self,
        container: &str,
        key: &str,
        src_container: &str,
        src_key: &str,
    ) -> StorageResult<()> {
        let (container, key) = (container.to_string(), key.to_string());
        let (src_container, src_key) = (src_container.to_string(), src_key.to_string());
        self.blocking(move |backend| backend.copy_sync(&container, &key, &src_container, &src_key))
            .await
    }

    async fn get_object(&self, container: &str, key: &str) -> StorageResult<Bytes> {
        let (container, key) = (container.to_string(), key.to_string());
        self.blocking(move |backend| backend.get_sync(&container, &key))
            .await
    }

    async fn stream_object(&self, container: &str, key: &str) -> StorageResult<ObjectStream> {
        let info = self
            .head_object(container, key)
            .await?
            .ok_or_else(|| StorageError::object_not_found(key))?;

        if info.is_folder() {
            let (c, k) = (container.to_string(), key.to_string());
            let payload = self.blocking(move |backend| backend.folder_payload(&c, &k)).await?;
            return Ok(ObjectStream {
                info,
                body: futures::stream::iter([Ok(payload)]).boxed(),
            });
        }

        let path = object_path(&self.root, container, key)?;
        let file = tokio::fs::File::open(&path)
            .await
            .map_err(|e| StorageError::from_io("object", key, e))?;
        let body = futures::stream::try_unfold(file, |mut file| async move {
            let mut buf = vec![0u8; CHUNK_SIZE];
            match file.read(&mut buf).await {
                Ok(0) => Ok(None),
                Ok(n) => {
                    buf.truncate(n);
                    Ok(Some((Bytes::from(buf), file)))
                },
                Err(e) => Err(e),
            }
        })
        .boxed();
        Ok(ObjectStream { info, body })
    }

    async fn get_object_to_file(
        &self,
        container: &str,
        key: &str,
        local_path: &Path,
    ) -> StorageResult<()> {
        let (container, key) = (container.to_string(), key.to_string());
        let dest = local_path.to_path_buf();
        self.blocking(move |backend| backend.get_to_file_sync(&container, &key, &dest))
            .await
    }

    async fn delete_object(&self, container: &str, key: &str) -> StorageResult<()> {
        let (container, key) = (container.to_string(), key.to_string());
        self.blocking(move |backend| backend.delete_sync(&container, &key))
            .await
    }

    async fn list_objects(
        &self,
        container: &str,
        prefix: &str,
        delimiter: Option<char>,
    ) -> StorageResult<ObjectListing> {
        let (container, prefix) = (container.to_string(), prefix.to_string());
        self.blocking(move |backend| backend.list_sync(&container, &prefix, delimiter))
            .await
    }

    async fn copy_prefix(
        &self,
        container: &str,
        dest_prefix: &str,
        src_container: &str,
        src_prefix: &str,
    ) -> StorageResult<()> {
        let (container, dest_prefix) = (container.to_string(), dest_prefix.to_string());
        let (src_container, src_prefix) = (src_container.to_string(), src_prefix.to_string());
        self.blocking(move |backend| {
            backend.copy_tree_sync(&container, &dest_prefix, &src_container, &src_prefix)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn backend() -> (FilesystemBackend, TempDir) {
        let tmp = TempDir::new().unwrap();
        let backend = FilesystemBackend::open(tmp.path()).unwrap();
        backend
            .create_container("media", &Metadata::new())
            .await
            .unwrap();
        (backend, tmp)
    }

    async fn put(backend: &FilesystemBackend, key: &str, data: &'static str) {
        backend
            .put_object("media", key, data.into(), &PutOptions::default())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_put_get_and_content_type() {
        let (backend, _tmp) = backend().await;
        backend
            .put_object(
                "media",
                "notes.txt",
                "hello".into(),
                &PutOptions::with_content_type("text/plain"),
            )
            .await
            .unwrap();

        assert_eq!(&backend.get_object("media", "notes.txt").await.unwrap()[..], b"hello");
        let info = backend.head_object("media", "notes.txt").await.unwrap().unwrap();
        assert_eq!(info.size, 5);
        assert_eq!(info.content_type.as_deref(), Some("text/plain"));
        assert!(info.last_modified.is_some());
    }

    #[tokio::test]
    async fn test_folder_marker_is_directory_with_payload() {
        let (backend, tmp) = backend().await;
        put(&backend, "docs/", "{\"color\":\"red\"}").await;

        assert!(tmp.path().join("media/docs").is_dir());
        assert!(backend.object_exists("media", "docs/").await.unwrap());
        assert!(!backend.object_exists("media", "docs").await.unwrap());
        assert_eq!(
            &backend.get_object("media", "docs/").await.unwrap()[..],
            b"{\"color\":\"red\"}"
        );
    }

    #[tokio::test]
    async fn test_delimited_and_full_listing() {
        let (backend, _tmp) = backend().await;
        put(&backend, "docs/", "").await;
        put(&backend, "docs/a.txt", "a").await;
        put(&backend, "docs/sub/", "").await;
        put(&backend, "docs/sub/b.txt", "b").await;

        let shallow = backend.list_objects("media", "docs/", Some(DELIMITER)).await.unwrap();
        let keys: Vec<_> = shallow.objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["docs/", "docs/a.txt"]);
        assert_eq!(shallow.common_prefixes, vec!["docs/sub/".to_string()]);

        let deep = backend.list_objects("media", "docs/", None).await.unwrap();
        let keys: Vec<_> = deep.objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["docs/", "docs/a.txt", "docs/sub/", "docs/sub/b.txt"]);
    }

    #[tokio::test]
    async fn test_delete_non_empty_folder_fails() {
        let (backend, _tmp) = backend().await;
        put(&backend, "docs/", "").await;
        put(&backend, "docs/a.txt", "a").await;

        let err = backend.delete_object("media", "docs/").await.unwrap_err();
        assert!(matches!(err, StorageError::NotEmpty { .. }));

        backend.delete_object("media", "docs/a.txt").await.unwrap();
        backend.delete_object("media", "docs/").await.unwrap();
        backend.delete_object("media", "docs/").await.unwrap();
        assert!(!backend.object_exists("media", "docs/").await.unwrap());
    }

    #[tokio::test]
    async fn test_copy_prefix_native_tree() {
        let (backend, _tmp) = backend().await;
        put(&backend, "src/", "props").await;
        put(&backend, "src/a.txt", "a").await;
        put(&backend, "src/deep/b.txt", "b").await;

        backend.copy_prefix("media", "dst/", "media", "src/").await.unwrap();
        assert_eq!(&backend.get_object("media", "dst/deep/b.txt").await.unwrap()[..], b"b");
        assert_eq!(&backend.get_object("media", "dst/").await.unwrap()[..], b"props");

        let err = backend
            .copy_prefix("media", "src/inner/", "media", "src/")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_stream_object_chunks() {
        let (backend, _tmp) = backend().await;
        let data = vec![7u8; CHUNK_SIZE * 2 + 10];
        backend
            .put_object("media", "big.bin", data.clone().into(), &PutOptions::default())
            .await
            .unwrap();

        let stream = backend.stream_object("media", "big.bin").await.unwrap();
        let chunks: Vec<Bytes> = stream.body.map(|c| c.unwrap()).collect().await;
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.concat(), data);

        let err = backend.stream_object("media", "nope.bin").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_container_lifecycle_and_metadata() {
        let tmp = TempDir::new().unwrap();
        let backend = FilesystemBackend::open(tmp.path()).unwrap();
        let mut meta = Metadata::new();
        meta.insert("owner".into(), "ops".into());

        backend.create_container("media", &meta).await.unwrap();
        let containers = backend.list_containers().await.unwrap();
        assert_eq!(containers.len(), 1);
        assert_eq!(containers[0].metadata, meta);

        backend.delete_container("media").await.unwrap();
        assert!(!backend.container_exists("media").await.unwrap());
        assert!(backend.delete_container("media").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_metadata_survives_reopen() {
        let tmp = TempDir::new().unwrap();
        {
            let backend = FilesystemBackend::open(tmp.path()).unwrap();
            backend.create_container("media", &Metadata::new()).await.unwrap();
            backend
                .put_object("media", "a.css", "x".into(), &PutOptions::with_content_type("text/css"))
                .await
                .unwrap();
        }
        let backend = FilesystemBackend::open(tmp.path()).unwrap();
        let info = backend.head_object("media", "a.css").await.unwrap().unwrap();
        assert_eq!(info.content_type.as_deref(), Some("text/css"));
    }
}
