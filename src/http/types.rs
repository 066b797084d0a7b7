//! Request query flags and response bodies.

use serde::{Deserialize, Deserializer, Serialize};

use crate::vfs::ListOptions;

/// Query flags accepted on every storage route.
///
/// Boolean flags accept `true`/`false`, `1`/`0`, `yes`/`no`, and a bare
/// key (`?zip`) meaning `true`.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageQuery {
    #[serde(default, deserialize_with = "flag")]
    pub include_properties: bool,
    #[serde(default = "yes", deserialize_with = "flag")]
    pub include_files: bool,
    #[serde(default = "yes", deserialize_with = "flag")]
    pub include_folders: bool,
    #[serde(default, deserialize_with = "flag")]
    pub full_tree: bool,
    #[serde(default, deserialize_with = "flag")]
    pub zip: bool,
    #[serde(default, deserialize_with = "flag")]
    pub extract: bool,
    #[serde(default, deserialize_with = "flag")]
    pub clean: bool,
    #[serde(default, deserialize_with = "flag")]
    pub check_exist: bool,
    /// Include file content in property responses
    #[serde(default, deserialize_with = "flag")]
    pub content: bool,
    #[serde(default, deserialize_with = "flag")]
    pub is_base64: bool,
    #[serde(default, deserialize_with = "flag")]
    pub download: bool,
    #[serde(default, deserialize_with = "flag")]
    pub force: bool,
    /// Remote source for an upload
    #[serde(default)]
    pub url: Option<String>,
    /// Archive-internal prefix stripped on extract
    #[serde(default)]
    pub drop_path: Option<String>,
}

impl Default for StorageQuery {
    fn default() -> Self {
        Self {
            include_properties: false,
            include_files: true,
            include_folders: true,
            full_tree: false,
            zip: false,
            extract: false,
            clean: false,
            check_exist: false,
            content: false,
            is_base64: false,
            download: false,
            force: false,
            url: None,
            drop_path: None,
        }
    }
}

impl StorageQuery {
    pub fn list_options(&self) -> ListOptions {
        ListOptions {
            include_files: self.include_files,
            include_folders: self.include_folders,
            full_tree: self.full_tree,
        }
    }
}

fn yes() -> bool {
    true
}

fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_flag(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid flag value '{raw}'")))
}

/// Parses a query flag value.
///
/// ```
/// use blobgate::http::types::parse_flag;
///
/// assert_eq!(parse_flag(""), Some(true));
/// assert_eq!(parse_flag("False"), Some(false));
/// assert_eq!(parse_flag("maybe"), None);
/// ```
pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "" | "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

/// `GET /health`
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub services: usize,
}

/// One entry of `GET /api/v2`.
#[derive(Debug, Serialize)]
pub struct ServiceEntry {
    pub name: String,
    pub kind: &'static str,
}

/// `GET /api/v2`
#[derive(Debug, Serialize)]
pub struct ServiceListResponse {
    #[serde(rename = "service")]
    pub services: Vec<ServiceEntry>,
}
