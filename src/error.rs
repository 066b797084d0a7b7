//! Storage error types for typed error handling.
//!
//! Every failure the storage layer can report maps onto one taxonomy kind.
//! The HTTP layer only needs [`StorageError::status_code`] and
//! [`StorageError::code`] to turn a kind into a response; nothing below the
//! router knows about transports.

use serde::Serialize;

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Storage errors with structured context.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StorageError {
    /// Container, folder or file absent when required.
    #[error("{kind} not found: {path}")]
    NotFound { kind: &'static str, path: String },

    /// Conflict on a `check_exist` write.
    #[error("{kind} already exists: {path}")]
    AlreadyExists { kind: &'static str, path: String },

    /// Write target's parent folder is missing.
    #[error("parent folder does not exist: {path}")]
    ParentNotFound { path: String },

    /// Folder delete blocked without `force`.
    #[error("folder is not empty: {path}")]
    NotEmpty { path: String },

    /// Empty or malformed name or path.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Unreadable archive or unopenable archive destination.
    #[error("archive error: {0}")]
    Archive(String),

    /// Transport or auth failure from the underlying store.
    #[error("backend error: {0}")]
    Backend(String),

    /// Local IO error with context.
    #[error("IO error in {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    /// Create a not-found error for a container.
    pub fn container_not_found(name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "container",
            path: name.into(),
        }
    }

    /// Create a not-found error for a folder.
    pub fn folder_not_found(path: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "folder",
            path: path.into(),
        }
    }

    /// Create a not-found error for a file.
    pub fn file_not_found(path: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "file",
            path: path.into(),
        }
    }

    /// Create a not-found error for a raw backend object.
    pub fn object_not_found(path: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "object",
            path: path.into(),
        }
    }

    pub fn container_exists(name: impl Into<String>) -> Self {
        Self::AlreadyExists {
            kind: "container",
            path: name.into(),
        }
    }

    pub fn folder_exists(path: impl Into<String>) -> Self {
        Self::AlreadyExists {
            kind: "folder",
            path: path.into(),
        }
    }

    pub fn file_exists(path: impl Into<String>) -> Self {
        Self::AlreadyExists {
            kind: "file",
            path: path.into(),
        }
    }

    pub fn parent_not_found(path: impl Into<String>) -> Self {
        Self::ParentNotFound { path: path.into() }
    }

    pub fn not_empty(path: impl Into<String>) -> Self {
        Self::NotEmpty { path: path.into() }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidArgument(reason.into())
    }

    pub fn backend(reason: impl ToString) -> Self {
        Self::Backend(reason.to_string())
    }

    pub fn archive(reason: impl ToString) -> Self {
        Self::Archive(reason.to_string())
    }

    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Map an IO error, turning `ErrorKind::NotFound` into a typed not-found.
    pub fn from_io(kind: &'static str, path: &str, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound {
                kind,
                path: path.to_string(),
            }
        } else {
            Self::io(format!("{kind} {path}"), source)
        }
    }

    /// Returns true for the "absent when required" kind.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Get the appropriate HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound { .. } | Self::ParentNotFound { .. } => 404,
            Self::AlreadyExists { .. } | Self::NotEmpty { .. } => 409,
            Self::InvalidArgument(_) | Self::Archive(_) => 400,
            Self::Backend(_) | Self::Io { .. } => 500,
        }
    }

    /// Numeric code carried in structured error bodies.
    pub fn code(&self) -> u16 {
        self.status_code()
    }

    /// Structured `{ message, code }` form of this error.
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            message: self.to_string(),
            code: self.code(),
        }
    }
}

/// Structured error object surfaced to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub message: String,
    pub code: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(StorageError::file_not_found("a.txt").status_code(), 404);
        assert_eq!(StorageError::parent_not_found("a/").status_code(), 404);
        assert_eq!(StorageError::folder_exists("a/").status_code(), 409);
        assert_eq!(StorageError::not_empty("a/").status_code(), 409);
        assert_eq!(StorageError::invalid("empty name").status_code(), 400);
        assert_eq!(StorageError::backend("timeout").status_code(), 500);
    }

    #[test]
    fn test_from_io_maps_not_found() {
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(StorageError::from_io("file", "a.txt", err).is_not_found());

        let err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        let mapped = StorageError::from_io("file", "a.txt", err);
        assert!(!mapped.is_not_found());
        assert_eq!(mapped.status_code(), 500);
    }

    #[test]
    fn test_error_body() {
        let body = StorageError::container_not_found("media").to_body();
        assert_eq!(body.code, 404);
        assert_eq!(body.message, "container not found: media");
    }
}
