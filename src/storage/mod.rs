//! Storage layer: one capability trait, three media.
//!
//! - [`FilesystemBackend`] - native directories, metadata in redb
//! - [`ObjectStoreBackend`] - Amazon S3 / Azure Blob through OpenDAL
//! - [`MemoryBackend`] - flat in-process store without delimiter support
//!
//! Everything above this module talks to `dyn StorageBackend` only.

pub mod backend;
pub mod codec;
pub mod factory;
pub mod filesystem;
pub mod memory;
pub mod metadata;
pub mod object_store;
pub mod validation;

pub use backend::{
    ContainerInfo, Metadata, ObjectInfo, ObjectListing, ObjectStream, PutOptions, PutSource,
    StorageBackend,
};
pub use factory::{SharedBackend, build_backend, build_registry};
pub use filesystem::FilesystemBackend;
pub use memory::MemoryBackend;
pub use object_store::ObjectStoreBackend;
