//! Staging of uploaded content into temp files.
//!
//! Upload bodies (raw, multipart or fetched from a URL) are streamed to a
//! temp file first and then handed to the file engine or the zip importer.
//! The temp file is removed when the returned [`StagedUpload`] drops.

use axum::body::Body;
use axum::extract::Multipart;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::fmt::Display;
use tempfile::{NamedTempFile, TempPath};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::{AppError, metrics};
use crate::error::StorageError;
use crate::vfs::content::{self, SNIFF_LEN};

/// Multipart field names that carry files.
const FILE_FIELDS: &[&str] = &["files", "file"];

/// An upload written to local disk.
#[derive(Debug)]
pub(crate) struct StagedUpload {
    pub name: String,
    /// Content type announced by the client, if any
    pub content_type: Option<String>,
    /// Leading bytes for sniffing
    pub head: Vec<u8>,
    pub size: u64,
    pub file: TempPath,
}

impl StagedUpload {
    pub fn is_zip(&self) -> bool {
        content::is_zip(&self.name, &self.head)
    }
}

/// Check if a host is allowed for `url=` fetches.
///
/// Patterns are `"*"` (any host), `"*.example.com"` (the domain and every
/// subdomain) or an exact host name. Matching ignores ASCII case. An empty
/// pattern list allows nothing.
///
/// ```
/// use blobgate::http::is_http_host_allowed;
///
/// assert!(is_http_host_allowed("anything.com", &["*".to_string()]));
/// assert!(is_http_host_allowed("API.example.com", &["*.example.com".to_string()]));
/// assert!(is_http_host_allowed("example.com", &["*.example.com".to_string()]));
/// assert!(!is_http_host_allowed("example.org", &["*.example.com".to_string()]));
/// assert!(!is_http_host_allowed("example.com", &[]));
/// ```
pub fn is_http_host_allowed(host: &str, allowed_patterns: &[String]) -> bool {
    let host = host.to_ascii_lowercase();
    allowed_patterns.iter().any(|pattern| {
        let pattern = pattern.to_ascii_lowercase();
        if pattern == "*" {
            return true;
        }
        match pattern.strip_prefix("*.") {
            Some(suffix) => host == suffix || host.ends_with(&format!(".{suffix}")),
            None => pattern == host,
        }
    })
}

async fn temp_path() -> Result<TempPath, AppError> {
    tokio::task::spawn_blocking(|| NamedTempFile::new().map(NamedTempFile::into_temp_path))
        .await
        .map_err(|e| AppError::Internal(format!("staging task failed: {e}")))?
        .map_err(|e| StorageError::io("creating upload staging file", e).into())
}

async fn stage_stream<S, E>(
    name: String,
    content_type: Option<String>,
    stream: S,
) -> Result<StagedUpload, AppError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Display,
{
    let path = temp_path().await?;
    let io_err = |e| AppError::from(StorageError::io(path.display().to_string(), e));
    let mut file = tokio::fs::File::create(&path).await.map_err(io_err)?;
    let mut stream = std::pin::pin!(stream);
    let mut head = Vec::with_capacity(SNIFF_LEN);
    let mut size = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| AppError::BadRequest(format!("upload interrupted: {e}")))?;
        if head.len() < SNIFF_LEN {
            let take = (SNIFF_LEN - head.len()).min(chunk.len());
            head.extend_from_slice(&chunk[..take]);
        }
        file.write_all(&chunk).await.map_err(io_err)?;
        size += chunk.len() as u64;
    }
    file.flush().await.map_err(io_err)?;

    metrics::record_upload(size);
    debug!(name = %name, size, "Staged upload");
    Ok(StagedUpload {
        name,
        content_type,
        head,
        size,
        file: path,
    })
}

/// Stages a raw request body.
pub(crate) async fn stage_body(
    name: String,
    content_type: Option<String>,
    body: Body,
) -> Result<StagedUpload, AppError> {
    stage_stream(name, content_type, body.into_data_stream()).await
}

/// Stages every file field of a multipart form.
pub(crate) async fn stage_multipart(mut multipart: Multipart) -> Result<Vec<StagedUpload>, AppError> {
    let mut staged = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("malformed multipart body: {e}")))?
    {
        if !field.name().is_some_and(|name| FILE_FIELDS.contains(&name)) {
            continue;
        }
        let Some(name) = field.file_name().map(str::to_string) else {
            return Err(AppError::BadRequest("multipart file field has no file name".into()));
        };
        let content_type = field.content_type().map(str::to_string);
        staged.push(stage_stream(name, content_type, field).await?);
    }
    if staged.is_empty() {
        return Err(AppError::BadRequest("multipart body carries no 'files' field".into()));
    }
    Ok(staged)
}

/// Fetches a remote file into a temp file.
///
/// Only `http`/`https` URLs whose host matches `allowed_hosts` are fetched.
pub(crate) async fn stage_url(
    client: &reqwest::Client,
    raw_url: &str,
    name: Option<String>,
    allowed_hosts: &[String],
) -> Result<StagedUpload, AppError> {
    let url = url::Url::parse(raw_url)
        .map_err(|e| AppError::BadRequest(format!("invalid url '{raw_url}': {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(AppError::BadRequest(format!(
            "unsupported url scheme '{}'",
            url.scheme()
        )));
    }
    let host = url.host_str().unwrap_or_default();
    if !is_http_host_allowed(host, allowed_hosts) {
        return Err(AppError::Forbidden(format!(
            "fetching from host '{host}' is not allowed"
        )));
    }

    let name = name
        .or_else(|| {
            url.path_segments()
                .and_then(|mut segments| segments.next_back())
                .filter(|segment| !segment.is_empty())
                .map(str::to_string)
        })
        .ok_or_else(|| AppError::BadRequest("cannot derive a file name from url".into()))?;

    let response = client
        .get(url.clone())
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(|e| AppError::BadGateway(format!("fetching {url} failed: {e}")))?;
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    stage_stream(name, content_type, response.bytes_stream()).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_patterns() {
        let allowed = vec!["files.example.com".to_string(), "*.cdn.net".to_string()];
        assert!(is_http_host_allowed("FILES.example.com", &allowed));
        assert!(is_http_host_allowed("eu.cdn.net", &allowed));
        assert!(is_http_host_allowed("cdn.net", &allowed));
        assert!(!is_http_host_allowed("evilcdn.net", &allowed));
        assert!(!is_http_host_allowed("other.example.com", &allowed));
    }

    #[tokio::test]
    async fn test_stage_body_keeps_head() {
        let staged = stage_body("a.zip".into(), None, Body::from("PK\x03\x04rest"))
            .await
            .unwrap();
        assert!(staged.is_zip());
        assert_eq!(staged.size, 8);
        assert_eq!(std::fs::read(&staged.file).unwrap(), b"PK\x03\x04rest");
    }

    #[tokio::test]
    async fn test_url_rejects_disallowed_host() {
        let client = reqwest::Client::new();
        let err = stage_url(&client, "https://example.com/a.txt", None, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let err = stage_url(&client, "ftp://example.com/a.txt", None, &["*".into()])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
