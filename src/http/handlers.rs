//! Storage request dispatch.
//!
//! A request is resolved into a [`Verb`] and a [`Target`] and then makes
//! exactly one pass through [`dispatch`]. The table:
//!
//! | verb        | root               | container / folder                  | file                       |
//! |-------------|--------------------|-------------------------------------|----------------------------|
//! | GET         | list containers    | list, or zip export with `zip`      | stream, or properties      |
//! | POST / PUT  | create container(s)| upload, batch create, or create     | write (zip-aware upload)   |
//! | PATCH/MERGE | -                  | replace metadata / properties       | replace metadata           |
//! | DELETE      | batch delete       | delete, or batch delete with a body | delete                     |

use axum::{
    Json,
    body::{Body, to_bytes},
    extract::{FromRequest, Multipart, Path, Query, Request, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use percent_encoding::percent_decode_str;
use serde::Serialize;
use serde_json::{Map, Value};
use tempfile::{NamedTempFile, TempPath};
use tokio::io::AsyncReadExt;
use tracing::debug;

use super::types::{HealthResponse, ServiceEntry, ServiceListResponse, StorageQuery};
use super::upload::{self, StagedUpload};
use super::{AppError, SharedState, metrics};
use crate::archive;
use crate::error::StorageError;
use crate::storage::codec::{self, DELIMITER};
use crate::vfs::container::metadata_from_value;
use crate::vfs::{BatchReport, StorageService, WriteOptions};

/// Header naming the file carried by a raw upload body at folder depth.
pub const FILE_NAME_HEADER: &str = "x-file-name";

/// Headers that let a POST stand in for another verb.
const METHOD_OVERRIDE_HEADERS: &[&str] = &["x-http-method", "x-http-method-override"];

const ZIP_CHUNK_SIZE: usize = 64 * 1024;

/// Request verb after method-override resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Get,
    Post,
    Put,
    /// PATCH or MERGE
    Patch,
    Delete,
}

impl Verb {
    /// Resolves the effective verb. A POST may carry `X-HTTP-Method`.
    pub fn resolve(method: &Method, headers: &HeaderMap) -> Result<Self, AppError> {
        let overridden = (method == Method::POST)
            .then(|| {
                METHOD_OVERRIDE_HEADERS
                    .iter()
                    .find_map(|name| headers.get(*name)?.to_str().ok())
            })
            .flatten();
        let name = overridden.unwrap_or(method.as_str()).to_ascii_uppercase();
        match name.as_str() {
            "GET" | "HEAD" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" | "MERGE" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            other => Err(AppError::MethodNotAllowed(format!(
                "method {other} is not supported"
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

/// Resource depth addressed by the request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Root,
    Container { container: String },
    /// `path` is a normalized folder key ending in `/`
    Folder { container: String, path: String },
    File { container: String, path: String },
}

impl Target {
    /// Parses `{container}/{folder_path*}/{file_name}`. A trailing `/`
    /// selects folder depth.
    ///
    /// ```
    /// use blobgate::http::handlers::Target;
    ///
    /// assert_eq!(Target::parse("").unwrap(), Target::Root);
    /// assert!(matches!(Target::parse("media/").unwrap(), Target::Container { .. }));
    /// assert!(matches!(Target::parse("media/docs/").unwrap(), Target::Folder { .. }));
    /// assert!(matches!(Target::parse("media/docs/a.txt").unwrap(), Target::File { .. }));
    /// ```
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        let raw = raw.trim_start_matches(DELIMITER);
        if raw.is_empty() {
            return Ok(Self::Root);
        }
        let (container, rest) = raw.split_once(DELIMITER).unwrap_or((raw, ""));
        let container = container.to_string();
        if rest.trim_matches(DELIMITER).is_empty() {
            return Ok(Self::Container { container });
        }
        if codec::is_folder_key(rest) {
            return Ok(Self::Folder {
                container,
                path: codec::normalize_folder(rest),
            });
        }
        let path = codec::normalize_file(rest)
            .ok_or_else(|| AppError::BadRequest(format!("invalid file path '{rest}'")))?;
        Ok(Self::File { container, path })
    }

    fn depth(&self) -> &'static str {
        match self {
            Self::Root => "root",
            Self::Container { .. } => "container",
            Self::Folder { .. } => "folder",
            Self::File { .. } => "file",
        }
    }
}

/// GET /health
pub(crate) async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        services: state.services.len(),
    })
}

/// GET /api/v2 - Configured services.
pub(crate) async fn list_services(State(state): State<SharedState>) -> Json<ServiceListResponse> {
    let mut services: Vec<ServiceEntry> = state
        .services
        .iter()
        .map(|(name, service)| ServiceEntry {
            name: name.clone(),
            kind: service.backend.kind(),
        })
        .collect();
    services.sort_by(|a, b| a.name.cmp(&b.name));
    Json(ServiceListResponse { services })
}

/// ANY /api/v2/{service}
pub(crate) async fn service_root(
    State(state): State<SharedState>,
    Path(service): Path<String>,
    Query(query): Query<StorageQuery>,
    request: Request,
) -> Response {
    respond(state, &service, "", query, request).await
}

/// ANY /api/v2/{service}/{*path}
pub(crate) async fn service_path(
    State(state): State<SharedState>,
    Path((service, path)): Path<(String, String)>,
    Query(query): Query<StorageQuery>,
    request: Request,
) -> Response {
    respond(state, &service, &path, query, request).await
}

async fn respond(
    state: SharedState,
    service: &str,
    path: &str,
    query: StorageQuery,
    request: Request,
) -> Response {
    match dispatch(&state, service, path, query, request).await {
        Ok(response) => response,
        Err(e) => {
            metrics::record_error(e.status().as_u16());
            e.into_response()
        },
    }
}

/// Everything a handler needs from the request besides the query.
struct Input {
    verb: Verb,
    headers: HeaderMap,
    body: Body,
}

async fn dispatch(
    state: &SharedState,
    service_name: &str,
    path: &str,
    query: StorageQuery,
    request: Request,
) -> Result<Response, AppError> {
    let service = state.service(service_name)?;
    let target = Target::parse(path)?;
    let (parts, body) = request.into_parts();
    let verb = Verb::resolve(&parts.method, &parts.headers)?;
    metrics::record_request(service_name, verb.as_str(), target.depth());
    debug!(service = service_name, verb = verb.as_str(), depth = target.depth(), path, "Dispatching");

    let input = Input {
        verb,
        headers: parts.headers,
        body,
    };
    match verb {
        Verb::Get => get(service, &target, &query).await,
        Verb::Post | Verb::Put => create(state, service, &target, &query, input).await,
        Verb::Patch => update(state, service, &target, input).await,
        Verb::Delete => delete(state, service, &target, &query, input).await,
    }
}

// ---------------------------------------------------------------------------
// GET
// ---------------------------------------------------------------------------

async fn get(
    service: &StorageService,
    target: &Target,
    query: &StorageQuery,
) -> Result<Response, AppError> {
    match target {
        Target::Root => {
            let containers = service.containers.list(query.include_properties).await?;
            Ok(Json(serde_json::json!({ "container": containers })).into_response())
        },
        Target::Container { container } if query.zip => export_zip(service, container, "").await,
        Target::Folder { container, path } if query.zip => {
            export_zip(service, container, path).await
        },
        Target::Container { container } => {
            let listing = service.folders.list(container, "", query.list_options()).await?;
            let mut body = to_object(&listing)?;
            if query.include_properties {
                body.extend(to_object(&service.containers.get_properties(container).await?)?);
            }
            Ok(Json(Value::Object(body)).into_response())
        },
        Target::Folder { container, path } => {
            let listing = service.folders.list(container, path, query.list_options()).await?;
            let mut body = to_object(&listing)?;
            if query.include_properties {
                body.extend(to_object(&service.folders.get_properties(container, path).await?)?);
            }
            Ok(Json(Value::Object(body)).into_response())
        },
        Target::File { container, path } if query.include_properties => {
            let properties = service
                .files
                .get_properties(container, path, query.content, query.is_base64)
                .await?;
            Ok(Json(properties).into_response())
        },
        Target::File { container, path } => stream_file(service, container, path, query.download).await,
    }
}

fn to_object<T: Serialize>(value: &T) -> Result<Map<String, Value>, AppError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Ok(Map::new()),
        Err(e) => Err(AppError::Internal(format!("serializing response failed: {e}"))),
    }
}

fn header_value(value: &str) -> Result<HeaderValue, AppError> {
    HeaderValue::from_bytes(value.as_bytes())
        .map_err(|e| AppError::Internal(format!("invalid header value '{value}': {e}")))
}

fn http_date(time: chrono::DateTime<chrono::Utc>) -> String {
    time.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

async fn stream_file(
    service: &StorageService,
    container: &str,
    path: &str,
    download: bool,
) -> Result<Response, AppError> {
    let streamed = match service.files.stream(container, path, download).await {
        Ok(streamed) => streamed,
        Err(e) if e.is_not_found() => {
            return Ok((
                StatusCode::NOT_FOUND,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                e.to_string(),
            )
                .into_response());
        },
        Err(e) => return Err(e.into()),
    };

    let mut response = Response::new(Body::from_stream(streamed.body));
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, header_value(&streamed.content_type)?);
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(streamed.content_length));
    headers.insert(header::CONTENT_DISPOSITION, header_value(&streamed.disposition)?);
    if let Some(modified) = streamed.last_modified {
        headers.insert(header::LAST_MODIFIED, header_value(&http_date(modified))?);
    }
    Ok(response)
}

async fn new_temp_path() -> Result<TempPath, AppError> {
    tokio::task::spawn_blocking(|| NamedTempFile::new().map(NamedTempFile::into_temp_path))
        .await
        .map_err(|e| AppError::Internal(format!("temp file task failed: {e}")))?
        .map_err(|e| StorageError::io("creating temp archive", e).into())
}

/// Packs a folder into a temp zip and streams it; the temp file is removed
/// when the body finishes or the client goes away.
async fn export_zip(
    service: &StorageService,
    container: &str,
    path: &str,
) -> Result<Response, AppError> {
    let temp = new_temp_path().await?;
    archive::export_folder_as_zip(service, container, path, &temp, true).await?;

    let file = tokio::fs::File::open(&temp)
        .await
        .map_err(|e| StorageError::io("opening temp archive", e))?;
    let size = file
        .metadata()
        .await
        .map_err(|e| StorageError::io("reading temp archive", e))?
        .len();

    let body = futures::stream::try_unfold((file, temp), |(mut file, temp)| async move {
        let mut buf = vec![0u8; ZIP_CHUNK_SIZE];
        let n = file.read(&mut buf).await?;
        if n == 0 {
            return Ok::<_, std::io::Error>(None);
        }
        buf.truncate(n);
        Ok(Some((Bytes::from(buf), (file, temp))))
    });

    let name = match codec::short_name(path) {
        "" => container,
        folder => folder,
    };
    let disposition = crate::vfs::file::content_disposition(&format!("{name}.zip"), true);

    let mut response = Response::new(Body::from_stream(body));
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/zip"));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(size));
    headers.insert(header::CONTENT_DISPOSITION, header_value(&disposition)?);
    Ok(response)
}

// ---------------------------------------------------------------------------
// POST / PUT
// ---------------------------------------------------------------------------

fn is_multipart(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("multipart/form-data"))
}

fn file_name_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get(FILE_NAME_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| percent_decode_str(v).decode_utf8_lossy().into_owned())
        .filter(|v| !v.is_empty())
}

/// Content type announced for a raw body, ignoring values that say nothing.
fn announced_content_type(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.starts_with("application/octet-stream") && !v.starts_with("multipart/"))
        .map(str::to_string)
}

fn created_status(verb: Verb) -> StatusCode {
    if verb == Verb::Post {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    }
}

async fn read_json(body: Body, limit: usize) -> Result<Option<Value>, AppError> {
    let bytes = to_bytes(body, limit)
        .await
        .map_err(|e| AppError::BadRequest(format!("unreadable request body: {e}")))?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| AppError::BadRequest(format!("request body is not valid JSON: {e}")))
}

/// Takes a batch array out of a body. A single object counts as one item.
fn take_items(body: &mut Value, key: &str) -> Result<Option<Vec<Value>>, AppError> {
    match body.get_mut(key).map(Value::take) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => Ok(Some(items)),
        Some(item @ Value::Object(_)) => Ok(Some(vec![item])),
        Some(_) => Err(AppError::BadRequest(format!(
            "'{key}' must be an array of objects"
        ))),
    }
}

fn batch_response(folder: Option<BatchReport>, file: Option<BatchReport>) -> Response {
    let mut body = Map::new();
    for (kind, report) in [("folder", folder), ("file", file)] {
        if let Some(report) = report {
            metrics::record_batch(kind, report.len(), report.failure_count());
            body.insert(kind.to_string(), Value::Array(report.into_values()));
        }
    }
    Json(Value::Object(body)).into_response()
}

/// Collects upload sources: multipart, `url=`, or a named raw body.
async fn stage_uploads(
    state: &SharedState,
    query: &StorageQuery,
    headers: &HeaderMap,
    body: Body,
    default_name: Option<String>,
) -> Result<Vec<StagedUpload>, AppError> {
    let name = file_name_header(headers).or(default_name);
    if is_multipart(headers) {
        let mut request = Request::new(body);
        *request.headers_mut() = headers.clone();
        let multipart = Multipart::from_request(request, &())
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;
        return upload::stage_multipart(multipart).await;
    }
    if let Some(url) = &query.url {
        let staged = upload::stage_url(
            &state.http_client,
            url,
            name,
            &state.server.allowed_url_hosts,
        )
        .await?;
        return Ok(vec![staged]);
    }
    let name = name.ok_or_else(|| {
        AppError::BadRequest(format!("raw uploads need a {FILE_NAME_HEADER} header"))
    })?;
    Ok(vec![
        upload::stage_body(name, announced_content_type(headers), body).await?,
    ])
}

/// Stores staged uploads under `folder`, extracting zips when asked.
async fn store_uploads(
    service: &StorageService,
    container: &str,
    folder: &str,
    uploads: Vec<StagedUpload>,
    query: &StorageQuery,
) -> Result<Value, AppError> {
    let mut files = Vec::new();
    let mut archives = Vec::new();
    for upload in uploads {
        if query.extract && upload.is_zip() {
            let summary = archive::import_zip(
                service,
                container,
                folder,
                &upload.file,
                query.clean,
                query.drop_path.as_deref(),
            )
            .await?;
            archives.push(serde_json::json!({ "name": upload.name, "imported": summary }));
            continue;
        }
        let target = codec::join(folder, &upload.name);
        let options = WriteOptions {
            check_exist: query.check_exist,
            content_type: upload.content_type.clone(),
            ..WriteOptions::default()
        };
        let mut entry = service
            .files
            .move_from(container, &target, &upload.file, &options)
            .await?;
        entry.content_length = Some(upload.size);
        files.push(entry);
    }

    let mut body = Map::new();
    if !files.is_empty() {
        let files = serde_json::to_value(files)
            .map_err(|e| AppError::Internal(format!("serializing response failed: {e}")))?;
        body.insert("file".into(), files);
    }
    if !archives.is_empty() {
        body.insert("archive".into(), Value::Array(archives));
    }
    Ok(Value::Object(body))
}

async fn create(
    state: &SharedState,
    service: &StorageService,
    target: &Target,
    query: &StorageQuery,
    input: Input,
) -> Result<Response, AppError> {
    let status = created_status(input.verb);
    let limit = state.server.max_upload_bytes;
    match target {
        Target::Root => {
            let mut body = read_json(input.body, limit)
                .await?
                .ok_or_else(|| AppError::BadRequest("container name required".into()))?;
            if let Some(items) = take_items(&mut body, "container")? {
                let report = service.containers.create_batch(items, query.check_exist).await;
                metrics::record_batch("container", report.len(), report.failure_count());
                return Ok(Json(serde_json::json!({ "container": report })).into_response());
            }
            let name = body
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| AppError::BadRequest("container name required".into()))?;
            let metadata = metadata_from_value(body.get("metadata"))?;
            let entry = service.containers.create(name, &metadata, query.check_exist).await?;
            Ok((status, Json(entry)).into_response())
        },
        Target::Container { container } | Target::Folder { container, .. } => {
            let folder = match target {
                Target::Folder { path, .. } => path.as_str(),
                _ => "",
            };
            let has_upload = is_multipart(&input.headers)
                || query.url.is_some()
                || file_name_header(&input.headers).is_some();
            if has_upload {
                let uploads = stage_uploads(state, query, &input.headers, input.body, None).await?;
                if !folder.is_empty() {
                    service.folders.ensure_leaf(container, folder).await?;
                }
                let body = store_uploads(service, container, folder, uploads, query).await?;
                return Ok((status, Json(body)).into_response());
            }

            let body = read_json(input.body, limit).await?;
            create_at_folder(service, container, folder, query, body, status).await
        },
        Target::File { container, path } => {
            let default_name = Some(codec::short_name(path).to_string());
            let mut uploads =
                stage_uploads(state, query, &input.headers, input.body, default_name).await?;
            if uploads.len() != 1 {
                return Err(AppError::BadRequest(
                    "a file path takes exactly one upload".into(),
                ));
            }
            let upload = uploads.remove(0);
            if query.extract && upload.is_zip() {
                let parent = codec::parent_folder(path);
                let body = store_uploads(service, container, parent, vec![upload], query).await?;
                return Ok((status, Json(body)).into_response());
            }

            let options = WriteOptions {
                is_base64: query.is_base64,
                check_exist: query.check_exist,
                content_type: upload.content_type.clone(),
                ..WriteOptions::default()
            };
            let entry = if query.is_base64 {
                let text = tokio::fs::read(&upload.file)
                    .await
                    .map_err(|e| StorageError::io("reading staged upload", e))?;
                service
                    .files
                    .write(container, path, Bytes::from(text), &options)
                    .await?
            } else {
                let mut entry = service
                    .files
                    .move_from(container, path, &upload.file, &options)
                    .await?;
                entry.content_length = Some(upload.size);
                entry
            };
            Ok((status, Json(entry)).into_response())
        },
    }
}

/// JSON-bodied create at container or folder depth: batch arrays, a
/// server-side copy, or a plain create.
async fn create_at_folder(
    service: &StorageService,
    container: &str,
    folder: &str,
    query: &StorageQuery,
    body: Option<Value>,
    status: StatusCode,
) -> Result<Response, AppError> {
    let Some(mut body) = body else {
        let response = if folder.is_empty() {
            let entry = service
                .containers
                .create(container, &Default::default(), query.check_exist)
                .await?;
            (status, Json(entry)).into_response()
        } else {
            let entry = service
                .folders
                .create(container, folder, None, query.check_exist)
                .await?;
            (status, Json(entry)).into_response()
        };
        return Ok(response);
    };

    let folder_items = take_items(&mut body, "folder")?;
    let file_items = take_items(&mut body, "file")?;
    if folder_items.is_some() || file_items.is_some() {
        let folders = match folder_items {
            Some(items) => Some(
                service
                    .folders
                    .create_batch(container, items, folder, query.check_exist)
                    .await,
            ),
            None => None,
        };
        let files = match file_items {
            Some(items) => Some(
                service
                    .files
                    .create_batch(container, items, folder, query.check_exist)
                    .await,
            ),
            None => None,
        };
        return Ok(batch_response(folders, files));
    }

    if folder.is_empty() {
        let metadata = metadata_from_value(body.get("metadata"))?;
        let entry = service
            .containers
            .create(container, &metadata, query.check_exist)
            .await?;
        return Ok((status, Json(entry)).into_response());
    }
    if let Some(src) = body.get("source_path").and_then(Value::as_str) {
        let src_container = body
            .get("source_container")
            .and_then(Value::as_str)
            .unwrap_or(container);
        let entry = service
            .folders
            .copy(container, folder, src_container, src, query.check_exist)
            .await?;
        return Ok((status, Json(entry)).into_response());
    }
    let properties = body.get("properties").unwrap_or(&body);
    let entry = service
        .folders
        .create(container, folder, Some(properties), query.check_exist)
        .await?;
    Ok((status, Json(entry)).into_response())
}

// ---------------------------------------------------------------------------
// PATCH / MERGE
// ---------------------------------------------------------------------------

async fn update(
    state: &SharedState,
    service: &StorageService,
    target: &Target,
    input: Input,
) -> Result<Response, AppError> {
    let body = read_json(input.body, state.server.max_upload_bytes)
        .await?
        .ok_or_else(|| AppError::BadRequest("properties body required".into()))?;
    match target {
        Target::Root => Err(AppError::MethodNotAllowed(
            "properties can only be updated on a container, folder or file".into(),
        )),
        Target::Container { container } => {
            let metadata = metadata_from_value(Some(body.get("metadata").unwrap_or(&body)))?;
            let entry = service.containers.update_properties(container, &metadata).await?;
            Ok(Json(entry).into_response())
        },
        Target::Folder { container, path } => {
            let properties = body.get("properties").unwrap_or(&body);
            let entry = service
                .folders
                .update_properties(container, path, properties)
                .await?;
            Ok(Json(entry).into_response())
        },
        Target::File { container, path } => {
            let metadata = metadata_from_value(Some(body.get("metadata").unwrap_or(&body)))?;
            let entry = service.files.update_metadata(container, path, metadata).await?;
            Ok(Json(entry).into_response())
        },
    }
}

// ---------------------------------------------------------------------------
// DELETE
// ---------------------------------------------------------------------------

async fn delete(
    state: &SharedState,
    service: &StorageService,
    target: &Target,
    query: &StorageQuery,
    input: Input,
) -> Result<Response, AppError> {
    let body = read_json(input.body, state.server.max_upload_bytes).await?;
    match (target, body) {
        (Target::Root, Some(mut body)) => {
            let items = take_items(&mut body, "container")?
                .ok_or_else(|| AppError::BadRequest("'container' array required".into()))?;
            let report = service.containers.delete_batch(items).await;
            metrics::record_batch("container", report.len(), report.failure_count());
            Ok(Json(serde_json::json!({ "container": report })).into_response())
        },
        (Target::Root, None) => Err(AppError::BadRequest(
            "name the container in the path or list containers in the body".into(),
        )),
        (Target::Container { container }, None) => {
            Ok(Json(service.containers.delete(container).await?).into_response())
        },
        (Target::Folder { container, path }, None) => {
            let entry = service.folders.delete(container, path, query.force).await?;
            Ok(Json(entry).into_response())
        },
        (Target::Container { container }, Some(mut body))
        | (Target::Folder { container, .. }, Some(mut body)) => {
            let root = match target {
                Target::Folder { path, .. } => path.as_str(),
                _ => "",
            };
            let folders = match take_items(&mut body, "folder")? {
                Some(items) => Some(
                    service
                        .folders
                        .delete_batch(container, items, root, query.force)
                        .await,
                ),
                None => None,
            };
            let files = match take_items(&mut body, "file")? {
                Some(items) => Some(service.files.delete_batch(container, items, root).await),
                None => None,
            };
            if folders.is_none() && files.is_none() {
                return Err(AppError::BadRequest(
                    "body must list 'folder' and/or 'file' items".into(),
                ));
            }
            Ok(batch_response(folders, files))
        },
        (Target::File { container, path }, _) => {
            Ok(Json(service.files.delete(container, path).await?).into_response())
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_parsing() {
        assert_eq!(Target::parse("/").unwrap(), Target::Root);
        assert_eq!(
            Target::parse("media").unwrap(),
            Target::Container {
                container: "media".into()
            }
        );
        assert_eq!(
            Target::parse("media//reports//").unwrap(),
            Target::Folder {
                container: "media".into(),
                path: "reports/".into()
            }
        );
        assert_eq!(
            Target::parse("media/reports/q1.csv").unwrap(),
            Target::File {
                container: "media".into(),
                path: "reports/q1.csv".into()
            }
        );
    }

    #[test]
    fn test_verb_override() {
        let mut headers = HeaderMap::new();
        assert_eq!(Verb::resolve(&Method::PUT, &headers).unwrap(), Verb::Put);

        headers.insert("x-http-method", HeaderValue::from_static("MERGE"));
        assert_eq!(Verb::resolve(&Method::POST, &headers).unwrap(), Verb::Patch);
        // Only POST may be overridden.
        assert_eq!(Verb::resolve(&Method::GET, &headers).unwrap(), Verb::Get);

        let merge = Method::from_bytes(b"MERGE").unwrap();
        assert_eq!(Verb::resolve(&merge, &HeaderMap::new()).unwrap(), Verb::Patch);
        assert!(Verb::resolve(&Method::OPTIONS, &HeaderMap::new()).is_err());
    }

    #[test]
    fn test_take_items() {
        let mut body = serde_json::json!({ "folder": [{ "name": "a" }], "file": { "name": "b" } });
        assert_eq!(take_items(&mut body, "folder").unwrap().unwrap().len(), 1);
        assert_eq!(take_items(&mut body, "file").unwrap().unwrap().len(), 1);
        assert!(take_items(&mut body, "container").unwrap().is_none());

        let mut bad = serde_json::json!({ "folder": "nope" });
        assert!(take_items(&mut bad, "folder").is_err());
    }

    #[test]
    fn test_http_date() {
        let time = chrono::DateTime::parse_from_rfc3339("2024-03-05T07:08:09Z")
            .unwrap()
            .with_timezone(&chrono::Utc);
        assert_eq!(http_date(time), "Tue, 05 Mar 2024 07:08:09 GMT");
    }
}
