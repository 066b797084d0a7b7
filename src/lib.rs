//! blobgate: a REST front-end over local disk, Amazon S3 and Azure Blob
//! storage with emulated folders.
//!
//! - [`storage`] - one backend trait and its three media
//! - [`vfs`] - containers, folders and files on top of any backend
//! - [`archive`] - zip export and import of folder trees
//! - [`http`] - the `/api/v2/{service}/...` router
//! - [`config`] - `blobgate.toml`

pub mod archive;
pub mod config;
pub mod error;
pub mod http;
pub mod storage;
pub mod vfs;

pub use error::{StorageError, StorageResult};
