//! Per-item batch results.
//!
//! A batch call never fails as a whole because one item failed. Every item
//! is attempted, and the result list echoes the input items in their
//! original order with an `error: { message, code }` object injected into
//! the ones that failed.

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::error::{ErrorBody, StorageError, StorageResult};
use crate::storage::codec;

/// One attempted item.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    /// Position in the input array
    pub index: usize,
    /// The input item as posted
    pub item: Value,
    /// Set when the item failed
    pub error: Option<ErrorBody>,
}

/// Result of a batch call, in input order.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    outcomes: Vec<BatchOutcome>,
}

impl BatchReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the outcome of the next item.
    pub fn record<T>(&mut self, item: Value, result: StorageResult<T>) {
        let index = self.outcomes.len();
        let error = match result {
            Ok(_) => None,
            Err(err) => {
                warn!(index, error = %err, "Batch item failed");
                Some(err.to_body())
            },
        };
        self.outcomes.push(BatchOutcome { index, item, error });
    }

    pub fn outcomes(&self) -> &[BatchOutcome] {
        &self.outcomes
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// True if at least one item failed.
    pub fn has_failures(&self) -> bool {
        self.outcomes.iter().any(|o| o.error.is_some())
    }

    /// Number of failed items.
    pub fn failure_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.error.is_some()).count()
    }

    /// Input items with errors injected, in input order.
    pub fn into_values(self) -> Vec<Value> {
        self.outcomes
            .into_iter()
            .map(|outcome| match (outcome.item, outcome.error) {
                (item, None) => item,
                (Value::Object(mut map), Some(error)) => {
                    map.insert("error".to_string(), error_value(&error));
                    Value::Object(map)
                },
                (other, Some(error)) => {
                    let mut map = serde_json::Map::new();
                    map.insert("item".to_string(), other);
                    map.insert("error".to_string(), error_value(&error));
                    Value::Object(map)
                },
            })
            .collect()
    }
}

impl Serialize for BatchReport {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.clone().into_values().serialize(serializer)
    }
}

fn error_value(error: &ErrorBody) -> Value {
    serde_json::json!({ "message": error.message, "code": error.code })
}

/// Reads an optional string field from a batch item.
pub fn str_field<'a>(item: &'a Value, field: &str) -> Option<&'a str> {
    item.get(field).and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// Reads an optional boolean field, accepting `true`/`"true"`/`1`.
pub fn bool_field(item: &Value, field: &str) -> bool {
    match item.get(field) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(s.to_ascii_lowercase().as_str(), "true" | "1" | "yes"),
        Some(Value::Number(n)) => n.as_i64() == Some(1),
        _ => false,
    }
}

/// Resolves the container-relative path a batch item names.
///
/// An explicit `path` wins over `root` + `name`. Items that carry neither
/// are rejected.
///
/// ```
/// use blobgate::vfs::batch::resolve_item_path;
/// use serde_json::json;
///
/// let item = json!({ "name": "a.txt" });
/// assert_eq!(resolve_item_path(&item, "docs/").unwrap(), "docs/a.txt");
///
/// let item = json!({ "name": "ignored", "path": "other/b.txt" });
/// assert_eq!(resolve_item_path(&item, "docs/").unwrap(), "other/b.txt");
/// ```
pub fn resolve_item_path(item: &Value, root: &str) -> StorageResult<String> {
    if let Some(path) = str_field(item, "path") {
        return Ok(path.trim_start_matches(codec::DELIMITER).to_string());
    }
    match str_field(item, "name") {
        Some(name) => Ok(codec::join(&codec::normalize_folder(root), name)),
        None => Err(StorageError::invalid(
            "batch item requires a 'name' or 'path'",
        )),
    }
}
