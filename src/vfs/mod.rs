//! Virtual file system: folders and files over any storage backend.
//!
//! The engines here hold all hierarchy rules (parent checks, recursive
//! copy and delete, properties). Backends only move bytes.

pub mod batch;
pub mod container;
pub mod content;
pub mod file;
pub mod folder;

pub use batch::BatchReport;
pub use container::{ContainerEngine, ContainerEntry};
pub use file::{FileEngine, FileEntry, FileProperties, StreamedFile, WriteOptions};
pub use folder::{FolderEngine, FolderEntry, FolderListing, ListOptions};

use crate::storage::SharedBackend;

/// One configured service: a backend plus the engines bound to it.
#[derive(Clone)]
pub struct StorageService {
    pub backend: SharedBackend,
    pub containers: ContainerEngine,
    pub folders: FolderEngine,
    pub files: FileEngine,
}

impl StorageService {
    pub fn new(backend: SharedBackend) -> Self {
        Self {
            containers: ContainerEngine::new(backend.clone()),
            folders: FolderEngine::new(backend.clone()),
            files: FileEngine::new(backend.clone()),
            backend,
        }
    }
}

impl std::fmt::Debug for StorageService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageService")
            .field("backend", &self.backend.kind())
            .finish_non_exhaustive()
    }
}
