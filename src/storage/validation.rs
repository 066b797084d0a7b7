//! Path validation and security checks for storage keys.
//!
//! Provides protection against directory traversal and rejects names the
//! backends cannot represent. Every key reaching a backend has passed
//! through here.

use crate::error::{StorageError, StorageResult};
use std::path::{Path, PathBuf};

use super::codec::DELIMITER;

/// Validates a container name.
///
/// # Security
/// Rejects names that:
/// - Are empty
/// - Contain the folder delimiter or a backslash
/// - Are `.` or `..`
/// - Contain NUL or other control characters
pub fn validate_container(name: &str) -> StorageResult<()> {
    if name.is_empty() {
        return Err(StorageError::invalid("container name cannot be empty"));
    }
    if name == "." || name == ".." {
        return Err(StorageError::invalid(format!(
            "container name is reserved: {name}"
        )));
    }
    if name.contains(DELIMITER) || name.contains('\\') {
        return Err(StorageError::invalid(format!(
            "container name cannot contain path separators: {name}"
        )));
    }
    if name.chars().any(char::is_control) {
        return Err(StorageError::invalid(
            "container name cannot contain control characters",
        ));
    }
    Ok(())
}

/// Validates a container-relative key (file or folder).
///
/// The empty key (container root) is valid. Every segment must be a plain
/// name: no `.`/`..`, no backslashes, no control characters.
///
/// # Examples
/// ```
/// use blobgate::storage::validation::validate_key;
///
/// assert!(validate_key("images/logo.png").is_ok());
/// assert!(validate_key("images/").is_ok());
/// assert!(validate_key("../etc/passwd").is_err());
/// assert!(validate_key("a/./b").is_err());
/// ```
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.starts_with(DELIMITER) {
        return Err(StorageError::invalid(format!(
            "path cannot be absolute: {key}"
        )));
    }
    let body = key.strip_suffix(DELIMITER).unwrap_or(key);
    if body.is_empty() {
        return if key.is_empty() {
            Ok(())
        } else {
            Err(StorageError::invalid("path normalized to empty path"))
        };
    }
    for segment in body.split(DELIMITER) {
        match segment {
            "" => {
                return Err(StorageError::invalid(format!(
                    "path contains an empty segment: {key}"
                )));
            },
            "." | ".." => {
                return Err(StorageError::invalid(format!(
                    "path cannot contain '.' or '..': {key}"
                )));
            },
            s if s.contains('\\') || s.chars().any(char::is_control) => {
                return Err(StorageError::invalid(format!(
                    "path contains an illegal character: {key}"
                )));
            },
            _ => {},
        }
    }
    Ok(())
}

/// Returns the filesystem path for a key inside a container directory.
pub fn object_path(root: &Path, container: &str, key: &str) -> StorageResult<PathBuf> {
    validate_container(container)?;
    validate_key(key)?;
    let mut path = root.join(container);
    for segment in key.split(DELIMITER).filter(|s| !s.is_empty()) {
        path.push(segment);
    }
    Ok(path)
}
