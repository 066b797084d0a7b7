//! Zip packaging and unpacking of folder trees.
//!
//! The `zip` crate is synchronous, so the archive side of both directions
//! runs on a blocking thread and talks to the async storage side over a
//! small bounded channel. Export streams object chunks into the writer and
//! import hands extracted files over as temp files, so neither direction
//! holds more than one entry in memory.

use bytes::Bytes;
use futures::StreamExt;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use tempfile::{NamedTempFile, TempPath};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{StorageError, StorageResult};
use crate::storage::codec::{self, DELIMITER};
use crate::vfs::StorageService;
use crate::vfs::file::WriteOptions;
use crate::vfs::folder::ensure_container;

/// Entries in flight between the two sides of a transfer.
const CHANNEL_DEPTH: usize = 8;

/// What the export side feeds to the zip writer.
enum ExportChunk {
    Directory(String),
    File(String),
    Data(Bytes),
}

/// What the import side hands back from the zip reader.
enum ImportEntry {
    Folder(String),
    File(String, TempPath),
}

/// Counts of what an import created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct ImportSummary {
    pub folders: usize,
    pub files: usize,
}

fn join_err(e: tokio::task::JoinError) -> StorageError {
    StorageError::archive(format!("archive worker failed: {e}"))
}

/// Packs a folder's whole subtree into a zip file at `dest`.
///
/// Entry names are relative to `path`; every folder below it becomes an
/// empty directory entry. Returns the written archive path.
///
/// # Errors
///
/// - `NotFound` if the container or folder does not exist
/// - `Archive` if `dest` exists without `overwrite` or cannot be written
pub async fn export_folder_as_zip(
    service: &StorageService,
    container: &str,
    path: &str,
    dest: &Path,
    overwrite: bool,
) -> StorageResult<PathBuf> {
    let folder = codec::normalize_folder(path);
    if !service.backend.container_exists(container).await? {
        return Err(StorageError::container_not_found(container));
    }
    if !service.folders.exists(container, &folder).await? {
        return Err(StorageError::folder_not_found(&folder));
    }
    if !overwrite && tokio::fs::try_exists(dest).await.unwrap_or(false) {
        return Err(StorageError::archive(format!(
            "destination already exists: {}",
            dest.display()
        )));
    }

    let mut listing = service.backend.list_objects(container, &folder, None).await?;
    listing.objects.sort_by(|a, b| a.key.cmp(&b.key));

    let (tx, mut rx) = mpsc::channel::<ExportChunk>(CHANNEL_DEPTH);
    let dest_path = dest.to_path_buf();
    let writer = tokio::task::spawn_blocking(move || -> StorageResult<()> {
        let file = File::create(&dest_path).map_err(|e| {
            StorageError::archive(format!("cannot create {}: {e}", dest_path.display()))
        })?;
        let mut zip = ZipWriter::new(file);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let zip_err = |e: zip::result::ZipError| StorageError::archive(e);

        while let Some(chunk) = rx.blocking_recv() {
            match chunk {
                ExportChunk::Directory(name) => zip.add_directory(name, options).map_err(zip_err)?,
                ExportChunk::File(name) => zip.start_file(name, options).map_err(zip_err)?,
                ExportChunk::Data(data) => zip
                    .write_all(&data)
                    .map_err(|e| StorageError::io(dest_path.display().to_string(), e))?,
            }
        }
        zip.finish().map_err(zip_err)?;
        Ok(())
    });

    let mut files = 0usize;
    let fed = feed_export(service, container, &folder, &listing.objects, &tx, &mut files).await;
    drop(tx);
    let written = writer.await.map_err(join_err)?;

    // A writer failure closes the channel, which surfaces as a feed failure too.
    if let Err(e) = written.and(fed) {
        if let Err(cleanup) = tokio::fs::remove_file(dest).await {
            debug!(dest = %dest.display(), error = %cleanup, "No partial archive to remove");
        }
        return Err(e);
    }
    info!(container, path = %folder, files, dest = %dest.display(), "Exported folder as zip");
    Ok(dest.to_path_buf())
}

async fn feed_export(
    service: &StorageService,
    container: &str,
    folder: &str,
    objects: &[crate::storage::ObjectInfo],
    tx: &mpsc::Sender<ExportChunk>,
    files: &mut usize,
) -> StorageResult<()> {
    let closed = || StorageError::archive("archive writer stopped");
    for object in objects {
        let Some(name) = object.key.strip_prefix(folder).filter(|n| !n.is_empty()) else {
            continue;
        };
        if object.is_folder() {
            tx.send(ExportChunk::Directory(name.to_string()))
                .await
                .map_err(|_| closed())?;
            continue;
        }

        tx.send(ExportChunk::File(name.to_string()))
            .await
            .map_err(|_| closed())?;
        let mut stream = service.backend.stream_object(container, &object.key).await?;
        while let Some(chunk) = stream.body.next().await {
            let chunk = chunk.map_err(|e| StorageError::io(object.key.clone(), e))?;
            tx.send(ExportChunk::Data(chunk)).await.map_err(|_| closed())?;
        }
        *files += 1;
        debug!(container, path = %object.key, "Added file to archive");
    }
    Ok(())
}

/// Turns a safe archive entry path into a `/`-delimited key fragment.
fn entry_key(enclosed: &Path, is_dir: bool) -> Option<String> {
    let parts: Vec<&str> = enclosed
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect();
    if parts.is_empty() {
        return None;
    }
    let mut key = parts.join("/");
    if is_dir {
        key.push(DELIMITER);
    }
    Some(key)
}

fn open_archive(archive: &Path) -> StorageResult<ZipArchive<File>> {
    let file = File::open(archive).map_err(|e| {
        StorageError::archive(format!("cannot open {}: {e}", archive.display()))
    })?;
    ZipArchive::new(file).map_err(|e| StorageError::archive(format!("unreadable zip archive: {e}")))
}

fn read_archive(mut zip: ZipArchive<File>, tx: &mpsc::Sender<ImportEntry>) -> StorageResult<()> {
    for index in 0..zip.len() {
        let mut entry = zip
            .by_index(index)
            .map_err(|e| StorageError::archive(format!("unreadable entry {index}: {e}")))?;
        let Some(key) = entry
            .enclosed_name()
            .and_then(|enclosed| entry_key(&enclosed, entry.is_dir()))
        else {
            warn!(entry = entry.name(), "Skipping archive entry with unsafe path");
            continue;
        };

        let message = if entry.is_dir() {
            ImportEntry::Folder(key)
        } else {
            let mut staged = NamedTempFile::new()
                .map_err(|e| StorageError::io("staging archive entry", e))?;
            io::copy(&mut entry, &mut staged)
                .map_err(|e| StorageError::archive(format!("cannot extract {key}: {e}")))?;
            ImportEntry::File(key, staged.into_temp_path())
        };
        if tx.blocking_send(message).is_err() {
            // The storage side failed and reports its own error.
            break;
        }
    }
    Ok(())
}

/// Unpacks a zip archive below `dest_path`.
///
/// The archive is opened before anything is written. With `clean`
/// everything under `dest_path` is then deleted, keeping the folder itself. `drop_path_prefix` is stripped from entry names that
/// start with it. Missing intermediate folders are created on the way.
///
/// # Errors
///
/// Returns `Archive` if the archive cannot be opened or read. Storage
/// errors for individual entries abort the import.
pub async fn import_zip(
    service: &StorageService,
    container: &str,
    dest_path: &str,
    archive: &Path,
    clean: bool,
    drop_path_prefix: Option<&str>,
) -> StorageResult<ImportSummary> {
    let dest = codec::normalize_folder(dest_path);
    let drop_prefix = drop_path_prefix
        .map(codec::normalize_folder)
        .filter(|p| !p.is_empty());

    let archive_path = archive.to_path_buf();
    let zip = tokio::task::spawn_blocking(move || open_archive(&archive_path))
        .await
        .map_err(join_err)??;

    ensure_container(service.backend.as_ref(), container).await?;
    service.folders.create_parent_chain(container, &dest).await?;
    if clean {
        let removed = service.folders.delete_contents(container, &dest).await?;
        debug!(container, path = %dest, removed, "Cleaned import destination");
    }

    let (tx, mut rx) = mpsc::channel::<ImportEntry>(CHANNEL_DEPTH);
    let reader = tokio::task::spawn_blocking(move || read_archive(zip, &tx));

    let mut summary = ImportSummary::default();
    let mut stored = Ok(());
    while let Some(entry) = rx.recv().await {
        let prefix = drop_prefix.as_deref();
        if let Err(e) = store_entry(service, container, &dest, prefix, entry, &mut summary).await {
            stored = Err(e);
            break;
        }
    }
    drop(rx);
    let read = reader.await.map_err(join_err)?;

    read?;
    stored?;
    info!(
        container,
        path = %dest,
        folders = summary.folders,
        files = summary.files,
        "Imported zip archive"
    );
    Ok(summary)
}

async fn store_entry(
    service: &StorageService,
    container: &str,
    dest: &str,
    drop_prefix: Option<&str>,
    entry: ImportEntry,
    summary: &mut ImportSummary,
) -> StorageResult<()> {
    let strip = |name: &str| -> String {
        let rest = drop_prefix
            .and_then(|prefix| name.strip_prefix(prefix))
            .unwrap_or(name);
        codec::join(dest, rest)
    };
    match entry {
        ImportEntry::Folder(name) => {
            let target = strip(&name);
            if target != dest {
                service.folders.create_parent_chain(container, &target).await?;
                summary.folders += 1;
            }
        },
        ImportEntry::File(name, staged) => {
            let target = strip(&name);
            if codec::is_folder_key(&target) || target.is_empty() {
                return Ok(());
            }
            service
                .folders
                .create_parent_chain(container, codec::parent_folder(&target))
                .await?;
            service
                .files
                .move_from(container, &target, &staged, &WriteOptions::default())
                .await?;
            summary.files += 1;
        },
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryBackend, SharedBackend};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn service() -> StorageService {
        let backend: SharedBackend = Arc::new(MemoryBackend::new());
        StorageService::new(backend)
    }

    async fn seed(service: &StorageService) {
        service.folders.create("media", "docs/sub/", None, false).await.unwrap();
        service
            .files
            .write("media", "docs/a.txt", Bytes::from_static(b"alpha"), &WriteOptions::default())
            .await
            .unwrap();
        service
            .files
            .write("media", "docs/sub/b.txt", Bytes::from_static(b"beta"), &WriteOptions::default())
            .await
            .unwrap();
    }

    fn zip_names(path: &Path) -> Vec<String> {
        let mut zip = ZipArchive::new(File::open(path).unwrap()).unwrap();
        (0..zip.len())
            .map(|i| zip.by_index(i).unwrap().name().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_export_then_import_round_trip() {
        let service = service();
        seed(&service).await;
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("docs.zip");

        export_folder_as_zip(&service, "media", "docs", &out, false).await.unwrap();
        let names = zip_names(&out);
        assert!(names.contains(&"a.txt".to_string()));
        assert!(names.contains(&"sub/".to_string()));
        assert!(names.contains(&"sub/b.txt".to_string()));

        service.folders.create("media", "restore/", None, false).await.unwrap();
        service
            .files
            .write("media", "restore/stale.txt", Bytes::from_static(b"old"), &WriteOptions::default())
            .await
            .unwrap();
        let summary = import_zip(&service, "media", "restore", &out, true, None).await.unwrap();
        assert_eq!(summary.files, 2);

        assert_eq!(&service.files.read("media", "restore/a.txt").await.unwrap()[..], b"alpha");
        assert_eq!(&service.files.read("media", "restore/sub/b.txt").await.unwrap()[..], b"beta");
        assert!(!service.files.exists("media", "restore/stale.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_export_refuses_existing_destination() {
        let service = service();
        seed(&service).await;
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("docs.zip");
        std::fs::write(&out, b"keep").unwrap();

        let err = export_folder_as_zip(&service, "media", "docs/", &out, false)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Archive(_)));
        assert_eq!(std::fs::read(&out).unwrap(), b"keep");

        export_folder_as_zip(&service, "media", "docs/", &out, true).await.unwrap();
        assert_eq!(zip_names(&out).len(), 3);
    }

    #[tokio::test]
    async fn test_export_missing_folder() {
        let service = service();
        seed(&service).await;
        let dir = TempDir::new().unwrap();
        let err = export_folder_as_zip(&service, "media", "nope", &dir.path().join("x.zip"), true)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_import_drops_prefix_and_skips_unsafe_entries() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("bundle.zip");
        {
            let mut zip = ZipWriter::new(File::create(&archive).unwrap());
            let options = SimpleFileOptions::default();
            zip.start_file("bundle/readme.md", options).unwrap();
            zip.write_all(b"# hi").unwrap();
            zip.start_file("../evil.txt", options).unwrap();
            zip.write_all(b"nope").unwrap();
            zip.add_directory("bundle/empty/", options).unwrap();
            zip.finish().unwrap();
        }

        let service = service();
        let summary = import_zip(&service, "media", "site", &archive, false, Some("bundle"))
            .await
            .unwrap();
        assert_eq!(summary, ImportSummary { folders: 1, files: 1 });
        assert_eq!(&service.files.read("media", "site/readme.md").await.unwrap()[..], b"# hi");
        assert!(service.folders.exists("media", "site/empty/").await.unwrap());
        assert!(!service.files.exists("media", "evil.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_import_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("bad.zip");
        std::fs::write(&archive, b"not a zip at all").unwrap();

        let err = import_zip(&service(), "media", "", &archive, false, None)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Archive(_)));
    }

    #[tokio::test]
    async fn test_unreadable_archive_keeps_destination_on_clean() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("bad.zip");
        std::fs::write(&archive, b"not a zip").unwrap();

        let service = service();
        service.folders.create("media", "dst/", None, false).await.unwrap();
        service
            .files
            .write("media", "dst/keep.txt", Bytes::from_static(b"keep"), &WriteOptions::default())
            .await
            .unwrap();

        let err = import_zip(&service, "media", "dst/", &archive, true, None)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Archive(_)));
        assert_eq!(&service.files.read("media", "dst/keep.txt").await.unwrap()[..], b"keep");
    }

    #[test]
    fn test_entry_key() {
        assert_eq!(entry_key(Path::new("a/b.txt"), false).as_deref(), Some("a/b.txt"));
        assert_eq!(entry_key(Path::new("a/b"), true).as_deref(), Some("a/b/"));
        assert_eq!(entry_key(Path::new(""), false), None);
    }
}
