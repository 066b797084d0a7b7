//! Folder and file behavior shared by every backend.
//!
//! Each scenario runs against the memory backend, the filesystem backend
//! and the object-store backend over OpenDAL's in-memory service.

use blobgate::StorageError;
use blobgate::archive::{export_folder_as_zip, import_zip};
use blobgate::storage::{FilesystemBackend, MemoryBackend, ObjectStoreBackend, SharedBackend};
use blobgate::vfs::{ListOptions, StorageService, WriteOptions};
use bytes::Bytes;
use opendal::Operator;
use opendal::services::Memory;
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

/// A service plus whatever keeps its storage alive.
struct Fixture {
    service: StorageService,
    _dir: Option<TempDir>,
}

fn fixtures() -> Vec<(&'static str, Fixture)> {
    let memory: SharedBackend = Arc::new(MemoryBackend::new());
    let dir = TempDir::new().unwrap();
    let filesystem: SharedBackend = Arc::new(FilesystemBackend::open(dir.path()).unwrap());
    let operator = Operator::new(Memory::default()).unwrap().finish();
    let object_store: SharedBackend = Arc::new(ObjectStoreBackend::from_operator(operator, "memory"));
    vec![
        (
            "memory",
            Fixture {
                service: StorageService::new(memory),
                _dir: None,
            },
        ),
        (
            "filesystem",
            Fixture {
                service: StorageService::new(filesystem),
                _dir: Some(dir),
            },
        ),
        (
            "object_store",
            Fixture {
                service: StorageService::new(object_store),
                _dir: None,
            },
        ),
    ]
}

fn checked() -> WriteOptions {
    WriteOptions {
        check_exist: true,
        ..WriteOptions::default()
    }
}

async fn write(service: &StorageService, path: &str, content: &'static [u8]) {
    service
        .files
        .write("media", path, Bytes::from_static(content), &WriteOptions::default())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_check_exist_write_keeps_first_content() {
    for (kind, fixture) in fixtures() {
        let service = &fixture.service;
        service.folders.create("media", "reports/", None, false).await.unwrap();
        service
            .files
            .write("media", "reports/q1.csv", Bytes::from_static(b"a,b\n1,2"), &checked())
            .await
            .unwrap();

        let err = service
            .files
            .write("media", "reports/q1.csv", Bytes::from_static(b"x,y\n9,9"), &checked())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists { .. }), "{kind}: {err}");

        let content = service.files.read("media", "reports/q1.csv").await.unwrap();
        assert_eq!(&content[..], b"a,b\n1,2", "{kind}");
    }
}

#[tokio::test]
async fn test_created_folder_is_listed_by_parent() {
    for (kind, fixture) in fixtures() {
        let service = &fixture.service;
        service.folders.create("media", "a/b/c/", None, false).await.unwrap();

        for folder in ["a/", "a/b/", "a/b/c/"] {
            assert!(service.folders.exists("media", folder).await.unwrap(), "{kind}: {folder}");
        }
        let listing = service
            .folders
            .list("media", "a/b/", ListOptions::default())
            .await
            .unwrap();
        let folders = listing.folders.unwrap();
        assert_eq!(folders.len(), 1, "{kind}");
        assert_eq!(folders[0].name, "c", "{kind}");
        assert_eq!(folders[0].path, "media/a/b/c/", "{kind}");
    }
}

#[tokio::test]
async fn test_listing_is_repeatable() {
    for (kind, fixture) in fixtures() {
        let service = &fixture.service;
        service.folders.create("media", "docs/sub/", None, false).await.unwrap();
        write(service, "docs/a.txt", b"a").await;
        write(service, "docs/sub/b.txt", b"b").await;

        let first = service
            .folders
            .list("media", "docs/", ListOptions::default())
            .await
            .unwrap();
        let second = service
            .folders
            .list("media", "docs/", ListOptions::default())
            .await
            .unwrap();
        assert_eq!(first, second, "{kind}");
        assert_eq!(first.files.as_ref().unwrap().len(), 1, "{kind}");

        let tree = service
            .folders
            .list(
                "media",
                "docs/",
                ListOptions {
                    full_tree: true,
                    ..ListOptions::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(tree.files.unwrap().len(), 2, "{kind}");
    }
}

#[tokio::test]
async fn test_force_delete_semantics() {
    for (kind, fixture) in fixtures() {
        let service = &fixture.service;
        service.folders.create("media", "tmp/nested/", None, false).await.unwrap();
        write(service, "tmp/nested/x.bin", b"x").await;
        write(service, "tmp/y.bin", b"y").await;

        let err = service.folders.delete("media", "tmp/", false).await.unwrap_err();
        assert!(matches!(err, StorageError::NotEmpty { .. }), "{kind}: {err}");
        assert!(service.files.exists("media", "tmp/nested/x.bin").await.unwrap(), "{kind}");
        assert!(service.files.exists("media", "tmp/y.bin").await.unwrap(), "{kind}");

        service.folders.delete("media", "tmp/", true).await.unwrap();
        assert!(!service.folders.exists("media", "tmp/").await.unwrap(), "{kind}");
        assert!(!service.folders.exists("media", "tmp/nested/").await.unwrap(), "{kind}");
        assert!(!service.files.exists("media", "tmp/nested/x.bin").await.unwrap(), "{kind}");
        assert!(!service.files.exists("media", "tmp/y.bin").await.unwrap(), "{kind}");
    }
}

#[tokio::test]
async fn test_batch_delete_reports_the_missing_folder() {
    for (kind, fixture) in fixtures() {
        let service = &fixture.service;
        for folder in ["one/", "two/", "four/"] {
            service.folders.create("media", folder, None, false).await.unwrap();
        }
        let items = vec![
            json!({ "name": "one" }),
            json!({ "name": "two" }),
            json!({ "name": "three" }),
            json!({ "path": "four/" }),
        ];
        let report = service.folders.delete_batch("media", items, "", false).await;
        assert_eq!(report.len(), 4, "{kind}");
        assert_eq!(report.failure_count(), 1, "{kind}");

        let values = report.into_values();
        assert!(values[2].get("error").is_some(), "{kind}");
        assert_eq!(values[2]["error"]["code"], 404, "{kind}");
        for folder in ["one/", "two/", "four/"] {
            assert!(!service.folders.exists("media", folder).await.unwrap(), "{kind}");
        }
    }
}

#[tokio::test]
async fn test_delete_missing_file_twice() {
    for (kind, fixture) in fixtures() {
        let service = &fixture.service;
        service.containers.create("media", &Default::default(), false).await.unwrap();
        let first = service.files.delete("media", "missing.txt").await;
        let second = service.files.delete("media", "missing.txt").await;
        assert!(first.is_ok(), "{kind}");
        assert!(second.is_ok(), "{kind}");
    }
}

#[tokio::test]
async fn test_zip_round_trip() {
    for (kind, fixture) in fixtures() {
        let service = &fixture.service;
        service.folders.create("media", "src/sub/", None, false).await.unwrap();
        write(service, "src/a.txt", b"alpha contents").await;
        write(service, "src/sub/b.txt", b"beta contents").await;

        let out_dir = TempDir::new().unwrap();
        let zip_path = out_dir.path().join("src.zip");
        export_folder_as_zip(service, "media", "src/", &zip_path, false)
            .await
            .unwrap();

        let summary = import_zip(service, "media", "dest/", &zip_path, true, None)
            .await
            .unwrap();
        assert_eq!(summary.files, 2, "{kind}");

        let a = service.files.read("media", "dest/a.txt").await.unwrap();
        let b = service.files.read("media", "dest/sub/b.txt").await.unwrap();
        assert_eq!(&a[..], b"alpha contents", "{kind}");
        assert_eq!(&b[..], b"beta contents", "{kind}");
    }
}

#[tokio::test]
async fn test_write_needs_parent_folder() {
    for (kind, fixture) in fixtures() {
        let service = &fixture.service;
        let err = service
            .files
            .write("media", "nowhere/a.txt", Bytes::from_static(b"x"), &WriteOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::ParentNotFound { .. }), "{kind}: {err}");
    }
}

#[tokio::test]
async fn test_folder_copy_and_properties() {
    for (kind, fixture) in fixtures() {
        let service = &fixture.service;
        let props = json!({ "owner": "ops" });
        service
            .folders
            .create("media", "site/", Some(&props), false)
            .await
            .unwrap();
        service.folders.create("media", "site/img/", None, false).await.unwrap();
        write(service, "site/img/logo.png", b"png").await;

        service
            .folders
            .copy("media", "backup/", "media", "site/", false)
            .await
            .unwrap();
        let logo = service.files.read("media", "backup/img/logo.png").await.unwrap();
        assert_eq!(&logo[..], b"png", "{kind}");

        let copied = service.folders.get_properties("media", "backup/").await.unwrap();
        assert_eq!(copied.properties, Some(props.clone()), "{kind}");
    }
}

#[tokio::test]
async fn test_read_to_file() {
    for (kind, fixture) in fixtures() {
        let service = &fixture.service;
        let out_dir = TempDir::new().unwrap();
        let out = out_dir.path().join("copy.bin");

        let err = service.files.read_to_file("ghost", "a.txt", &out).await.unwrap_err();
        assert!(err.is_not_found(), "{kind}: {err}");

        service.folders.create("media", "docs/", None, false).await.unwrap();
        let err = service.files.read_to_file("media", "docs", &out).await.unwrap_err();
        assert!(err.is_not_found(), "{kind}: {err}");

        write(service, "docs/a.txt", b"alpha").await;
        service.files.read_to_file("media", "docs/a.txt", &out).await.unwrap();
        assert_eq!(std::fs::read(&out).unwrap(), b"alpha", "{kind}");
    }
}
