//! Content type inference from file extension plus sniffed content.

use std::path::Path;

/// Fallback when neither the name nor the bytes say anything.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Number of leading bytes [`sniff`] looks at.
pub const SNIFF_LEN: usize = 512;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// Guesses a MIME type from leading bytes.
pub fn sniff(head: &[u8]) -> Option<&'static str> {
    const SIGNATURES: &[(&[u8], &str)] = &[
        (b"\x89PNG\r\n\x1a\n", "image/png"),
        (b"\xff\xd8\xff", "image/jpeg"),
        (b"GIF87a", "image/gif"),
        (b"GIF89a", "image/gif"),
        (b"%PDF-", "application/pdf"),
        (ZIP_MAGIC, "application/zip"),
        (b"\x1f\x8b", "application/gzip"),
        (b"<?xml", "application/xml"),
    ];
    if let Some((_, mime)) = SIGNATURES.iter().find(|(magic, _)| head.starts_with(magic)) {
        return Some(*mime);
    }
    if head.is_empty() {
        return None;
    }

    let text = match std::str::from_utf8(head) {
        Ok(text) => text,
        // A multi-byte character cut off by the sniff window is still text.
        Err(e) if e.error_len().is_none() => {
            std::str::from_utf8(&head[..e.valid_up_to()]).unwrap_or_default()
        },
        Err(_) => return None,
    };
    if text.chars().any(|c| c.is_control() && !c.is_whitespace()) {
        return None;
    }
    let trimmed = text.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        Some("application/json")
    } else if trimmed
        .get(..5)
        .is_some_and(|tag| tag.eq_ignore_ascii_case("<html"))
        || trimmed.starts_with("<!DOCTYPE html")
    {
        Some("text/html")
    } else {
        Some("text/plain")
    }
}

/// Infers a content type from the file name, falling back to the content.
///
/// ```
/// use blobgate::vfs::content::infer_content_type;
///
/// assert_eq!(infer_content_type("report.csv", b"a,b"), "text/csv");
/// assert_eq!(infer_content_type("blob", b"\x89PNG\r\n\x1a\n...."), "image/png");
/// assert_eq!(infer_content_type("blob", &[0, 159, 146, 150]), "application/octet-stream");
/// ```
pub fn infer_content_type(name: &str, head: &[u8]) -> String {
    mime_guess::from_path(name)
        .first()
        .map(|mime| mime.to_string())
        .or_else(|| sniff(head).map(str::to_string))
        .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string())
}

/// Returns true if an upload should be treated as a zip archive.
pub fn is_zip(name: &str, head: &[u8]) -> bool {
    Path::new(name)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"))
        || head.starts_with(ZIP_MAGIC)
}

/// Reads the first [`SNIFF_LEN`] bytes of a local file.
pub async fn read_head(path: &Path) -> std::io::Result<Vec<u8>> {
    use tokio::io::AsyncReadExt;

    let file = tokio::fs::File::open(path).await?;
    let mut head = Vec::with_capacity(SNIFF_LEN);
    file.take(SNIFF_LEN as u64).read_to_end(&mut head).await?;
    Ok(head)
}
