//! Metadata database for the filesystem backend.
//!
//! A directory cannot carry a payload and a plain file cannot carry a
//! content type or user metadata, so the filesystem backend keeps both in a
//! redb database at the storage root. Entries are keyed by the
//! container-prefixed object key (`media/docs/` for a folder marker,
//! `media/docs/a.txt` for a file, `media/` for the container itself).

use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use super::backend::Metadata;
use crate::error::{StorageError, StorageResult};

/// Table for object metadata storage
const OBJECTS_TABLE: TableDefinition<'static, &'static str, &'static [u8]> =
    TableDefinition::new("objects");

/// Persisted side information for one key.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredMeta {
    /// Content type supplied at write time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// User metadata
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
    /// Marker payload (folder properties)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub payload: Vec<u8>,
    /// When the entry was written
    pub updated_at: DateTime<Utc>,
}

impl StoredMeta {
    pub fn is_empty(&self) -> bool {
        self.content_type.is_none() && self.metadata.is_empty() && self.payload.is_empty()
    }
}

fn db_err<E: std::fmt::Display>(context: &'static str) -> impl FnOnce(E) -> StorageError {
    move |e| StorageError::Backend(format!("{context}: {e}"))
}

/// Handle to the metadata database.
#[derive(Clone)]
pub struct MetaStore {
    db: Arc<Database>,
}

impl MetaStore {
    /// Creates or opens the metadata database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let db = Database::create(path).map_err(db_err("Failed to open metadata database"))?;

        let write_txn = db
            .begin_write()
            .map_err(db_err("Failed to begin initialization transaction"))?;
        {
            let _table = write_txn
                .open_table(OBJECTS_TABLE)
                .map_err(db_err("Failed to initialize objects table"))?;
        }
        write_txn
            .commit()
            .map_err(db_err("Failed to commit initialization transaction"))?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Saves metadata for a key, removing the entry when it carries nothing.
    pub fn save(&self, key: &str, meta: &StoredMeta) -> StorageResult<()> {
        if meta.is_empty() {
            return self.remove(key);
        }
        let json = serde_json::to_vec(meta).map_err(db_err("Failed to serialize metadata"))?;

        let write_txn = self
            .db
            .begin_write()
            .map_err(db_err("Failed to begin write transaction"))?;
        {
            let mut table = write_txn
                .open_table(OBJECTS_TABLE)
                .map_err(db_err("Failed to open objects table"))?;
            table
                .insert(key, json.as_slice())
                .map_err(db_err("Failed to insert metadata"))?;
        }
        write_txn
            .commit()
            .map_err(db_err("Failed to commit metadata save"))
    }

    /// Loads metadata for a key.
    pub fn load(&self, key: &str) -> StorageResult<Option<StoredMeta>> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(db_err("Failed to begin read transaction"))?;
        let table = read_txn
            .open_table(OBJECTS_TABLE)
            .map_err(db_err("Failed to open objects table"))?;

        match table.get(key).map_err(db_err("Failed to read metadata"))? {
            Some(guard) => serde_json::from_slice(guard.value())
                .map(Some)
                .map_err(db_err("Failed to deserialize metadata")),
            None => Ok(None),
        }
    }

    /// Removes the entry for a key. A no-op if absent.
    pub fn remove(&self, key: &str) -> StorageResult<()> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(db_err("Failed to begin write transaction"))?;
        {
            let mut table = write_txn
                .open_table(OBJECTS_TABLE)
                .map_err(db_err("Failed to open objects table"))?;
            table
                .remove(key)
                .map_err(db_err("Failed to remove metadata"))?;
        }
        write_txn
            .commit()
            .map_err(db_err("Failed to commit metadata removal"))
    }

    fn keys_with_prefix(&self, prefix: &str) -> StorageResult<Vec<(String, Vec<u8>)>> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(db_err("Failed to begin read transaction"))?;
        let table = read_txn
            .open_table(OBJECTS_TABLE)
            .map_err(db_err("Failed to open objects table"))?;

        let mut entries = Vec::new();
        for item in table.iter().map_err(db_err("Failed to iterate objects table"))? {
            let (key, value) = item.map_err(db_err("Failed to read metadata entry"))?;
            if key.value().starts_with(prefix) {
                entries.push((key.value().to_string(), value.value().to_vec()));
            }
        }
        Ok(entries)
    }

    /// Removes every entry whose key starts with `prefix`.
    pub fn remove_prefix(&self, prefix: &str) -> StorageResult<usize> {
        let doomed = self.keys_with_prefix(prefix)?;
        if doomed.is_empty() {
            return Ok(0);
        }

        let write_txn = self
            .db
            .begin_write()
            .map_err(db_err("Failed to begin write transaction"))?;
        {
            let mut table = write_txn
                .open_table(OBJECTS_TABLE)
                .map_err(db_err("Failed to open objects table"))?;
            for (key, _) in &doomed {
                table
                    .remove(key.as_str())
                    .map_err(db_err("Failed to remove metadata"))?;
            }
        }
        write_txn
            .commit()
            .map_err(db_err("Failed to commit metadata removal"))?;
        Ok(doomed.len())
    }

    /// Copies every entry under `from` to the same relative key under `to`.
    pub fn copy_prefix(&self, from: &str, to: &str) -> StorageResult<()> {
        let entries = self.keys_with_prefix(from)?;
        if entries.is_empty() {
            return Ok(());
        }

        let write_txn = self
            .db
            .begin_write()
            .map_err(db_err("Failed to begin write transaction"))?;
        {
            let mut table = write_txn
                .open_table(OBJECTS_TABLE)
                .map_err(db_err("Failed to open objects table"))?;
            for (key, value) in &entries {
                let dest = format!("{to}{}", &key[from.len()..]);
                table
                    .insert(dest.as_str(), value.as_slice())
                    .map_err(db_err("Failed to insert metadata"))?;
            }
        }
        write_txn
            .commit()
            .map_err(db_err("Failed to commit metadata copy"))
    }

    /// Removes entries whose file or directory no longer exists under `root`.
    ///
    /// Called on startup to drop metadata for objects deleted outside the
    /// service. Files added outside the service need no entry: their
    /// content type is inferred on read.
    pub fn prune(&self, root: &Path) -> StorageResult<usize> {
        let orphaned: Vec<String> = self
            .keys_with_prefix("")?
            .into_iter()
            .map(|(key, _)| key)
            .filter(|key| {
                let relative = key.trim_end_matches('/');
                !root.join(relative).exists()
            })
            .collect();

        for key in &orphaned {
            self.remove(key)?;
        }
        if !orphaned.is_empty() {
            tracing::info!(count = orphaned.len(), "Removed orphaned metadata entries");
        }
        Ok(orphaned.len())
    }
}
