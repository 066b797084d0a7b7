//! Path translation between logical `container/folder/file` paths and
//! backend keys.
//!
//! Conventions shared by every backend:
//! - keys are relative to their container and never start with `/`
//! - a key ending in [`DELIMITER`] names a folder (its marker object)
//! - a key not ending in [`DELIMITER`] names a file
//!
//! Everything here is pure; no function touches a backend.

use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};
use std::borrow::Cow;

/// Folder delimiter used in every logical path and backend key.
pub const DELIMITER: char = '/';

/// Characters object stores reject or mangle in keys. `%` is included so
/// that decoding is always the exact inverse of encoding.
const KEY_UNSAFE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'%')
    .add(b'"')
    .add(b'#')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'\\')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// Returns true if the key names a folder marker.
pub fn is_folder_key(key: &str) -> bool {
    key.ends_with(DELIMITER)
}

/// Normalizes a folder path so it ends with exactly one delimiter.
///
/// Leading delimiters and empty segments are dropped. The container root
/// normalizes to the empty string.
///
/// ```
/// use blobgate::storage::codec::normalize_folder;
///
/// assert_eq!(normalize_folder("reports"), "reports/");
/// assert_eq!(normalize_folder("/reports//2024///"), "reports/2024/");
/// assert_eq!(normalize_folder("/"), "");
/// ```
pub fn normalize_folder(path: &str) -> String {
    let mut out = String::with_capacity(path.len() + 1);
    for segment in path.split(DELIMITER).filter(|s| !s.is_empty()) {
        out.push_str(segment);
        out.push(DELIMITER);
    }
    out
}

/// Normalizes a file path: no leading delimiter, no empty segments.
///
/// Returns `None` for paths that would name a folder or nothing at all.
pub fn normalize_file(path: &str) -> Option<String> {
    if path.is_empty() || is_folder_key(path) {
        return None;
    }
    let folder = normalize_folder(path);
    let file = folder.trim_end_matches(DELIMITER);
    if file.is_empty() {
        None
    } else {
        Some(file.to_string())
    }
}

/// Returns the parent folder key of a file or folder key.
///
/// ```
/// use blobgate::storage::codec::parent_folder;
///
/// assert_eq!(parent_folder("a/b/c.txt"), "a/b/");
/// assert_eq!(parent_folder("a/b/"), "a/");
/// assert_eq!(parent_folder("a/"), "");
/// assert_eq!(parent_folder("c.txt"), "");
/// ```
pub fn parent_folder(key: &str) -> &str {
    let trimmed = key.strip_suffix(DELIMITER).unwrap_or(key);
    match trimmed.rfind(DELIMITER) {
        Some(idx) => &key[..=idx],
        None => "",
    }
}

/// Returns the substring after the last remaining delimiter.
///
/// ```
/// use blobgate::storage::codec::short_name;
///
/// assert_eq!(short_name("a/b/c.txt"), "c.txt");
/// assert_eq!(short_name("a/b/"), "b");
/// assert_eq!(short_name(""), "");
/// ```
pub fn short_name(key: &str) -> &str {
    let trimmed = key.strip_suffix(DELIMITER).unwrap_or(key);
    match trimmed.rfind(DELIMITER) {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    }
}

/// Joins a folder key and a relative name.
pub fn join(folder: &str, name: &str) -> String {
    let name = name.trim_start_matches(DELIMITER);
    if folder.is_empty() {
        name.to_string()
    } else if is_folder_key(folder) {
        format!("{folder}{name}")
    } else {
        format!("{folder}{DELIMITER}{name}")
    }
}

/// Moves `key` from under `from` to the equivalent position under `to`.
///
/// Returns `None` if `key` is not under `from`.
pub fn rebase(key: &str, from: &str, to: &str) -> Option<String> {
    key.strip_prefix(from).map(|rest| format!("{to}{rest}"))
}

/// Splits the ancestors of a folder key, shallowest first.
///
/// ```
/// use blobgate::storage::codec::ancestors;
///
/// assert_eq!(ancestors("a/b/c/"), vec!["a/", "a/b/"]);
/// assert!(ancestors("a/").is_empty());
/// ```
pub fn ancestors(folder: &str) -> Vec<&str> {
    folder
        .match_indices(DELIMITER)
        .map(|(idx, _)| &folder[..=idx])
        .filter(|prefix| prefix.len() < folder.len())
        .collect()
}

/// Translates between (container, key) pairs and raw backend keys.
///
/// Object stores that hold every container inside a single bucket prefix
/// the container name onto the key; stores that reject some characters
/// get them percent-encoded. `decode_key(c, encode_key(c, k)) == Some(k)`
/// holds for every key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathCodec {
    container_prefixed: bool,
    escape: bool,
}

impl PathCodec {
    /// Keys are stored as-is, relative to their container.
    pub const fn plain() -> Self {
        Self {
            container_prefixed: false,
            escape: false,
        }
    }

    /// Container name is prepended as the first key segment.
    pub const fn prefixed() -> Self {
        Self {
            container_prefixed: true,
            escape: false,
        }
    }

    /// Container prefix plus percent-encoding of unsafe characters.
    pub const fn escaped() -> Self {
        Self {
            container_prefixed: true,
            escape: true,
        }
    }

    fn encode_segment<'a>(&self, raw: &'a str) -> Cow<'a, str> {
        if self.escape {
            utf8_percent_encode(raw, KEY_UNSAFE).into()
        } else {
            Cow::Borrowed(raw)
        }
    }

    fn decode_segment<'a>(&self, raw: &'a str) -> Option<Cow<'a, str>> {
        if self.escape {
            percent_decode_str(raw).decode_utf8().ok()
        } else {
            Some(Cow::Borrowed(raw))
        }
    }

    /// Raw key of a container's own marker.
    pub fn container_key(&self, container: &str) -> String {
        self.encode_key(container, "")
    }

    /// Encodes a container-relative key into the raw backend key.
    pub fn encode_key(&self, container: &str, key: &str) -> String {
        let key = self.encode_segment(key);
        if self.container_prefixed {
            let container = self.encode_segment(container);
            format!("{container}{DELIMITER}{key}")
        } else {
            key.into_owned()
        }
    }

    /// Decodes a raw backend key back to a container-relative key.
    ///
    /// Returns `None` if the raw key belongs to another container or is not
    /// a valid encoding.
    pub fn decode_key(&self, container: &str, raw: &str) -> Option<String> {
        let rest = if self.container_prefixed {
            let prefix = self.container_key(container);
            raw.strip_prefix(prefix.as_str())?
        } else {
            raw
        };
        self.decode_segment(rest).map(Cow::into_owned)
    }

    /// Extracts the container name from a raw container marker key.
    pub fn decode_container(&self, raw: &str) -> Option<String> {
        if !self.container_prefixed {
            return None;
        }
        let name = raw.trim_start_matches(DELIMITER).strip_suffix(DELIMITER)?;
        if name.is_empty() || name.contains(DELIMITER) {
            return None;
        }
        self.decode_segment(name).map(Cow::into_owned)
    }
}
