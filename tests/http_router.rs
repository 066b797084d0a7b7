//! Router tests driving the axum app in-process against the memory backend.

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use blobgate::config::{Config, ServiceConfig};
use blobgate::http::{AppState, build_services, router};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::io::Write;
use std::sync::Arc;
use tower::ServiceExt;

fn app() -> Router {
    let config = Config {
        services: vec![ServiceConfig::memory("mem")],
        ..Config::default()
    };
    let services = build_services(&config).unwrap();
    router(Arc::new(AppState::new(services, config.server.clone())))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes().to_vec();
    (status, headers, body)
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let (status, _, bytes) = send(app, request).await;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::String(String::from_utf8_lossy(&bytes).into()))
    };
    (status, value)
}

async fn put_file(app: &Router, uri: &str, content: &'static [u8]) -> StatusCode {
    let request = Request::builder()
        .method("PUT")
        .uri(uri)
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from(content))
        .unwrap();
    send(app, request).await.0
}

#[tokio::test]
async fn test_health_and_service_list() {
    let app = app();
    let (status, body) = call(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok", "services": 1 }));

    let (status, body) = call(&app, "GET", "/api/v2", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service"][0]["name"], "mem");
    assert_eq!(body["service"][0]["kind"], "memory");

    let (status, _) = call(&app, "GET", "/api/v2/nope/", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_container_folder_file_lifecycle() {
    let app = app();
    let (status, body) = call(&app, "POST", "/api/v2/mem", Some(json!({ "name": "media" }))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["path"], "media/");

    let (status, body) = call(&app, "POST", "/api/v2/mem/media/reports/", None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["name"], "reports");
    assert_eq!(body["path"], "media/reports/");

    assert_eq!(put_file(&app, "/api/v2/mem/media/reports/q1.csv", b"a,b\n1,2").await, StatusCode::OK);

    let (status, body) = call(&app, "GET", "/api/v2/mem/media/reports/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["file"][0]["name"], "q1.csv");
    assert_eq!(body["file"][0]["path"], "media/reports/q1.csv");

    let (status, body) = call(&app, "GET", "/api/v2/mem/media/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["folder"][0]["name"], "reports");

    let request = Request::builder()
        .uri("/api/v2/mem/media/reports/q1.csv?download=true")
        .body(Body::empty())
        .unwrap();
    let (status, headers, bytes) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bytes, b"a,b\n1,2");
    assert_eq!(headers[header::CONTENT_TYPE], "text/plain");
    assert_eq!(headers[header::CONTENT_LENGTH], "7");
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"q1.csv\""
    );

    let (status, _) = call(&app, "DELETE", "/api/v2/mem/media/reports/", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, _) = call(&app, "DELETE", "/api/v2/mem/media/reports/?force=true", None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(&app, "GET", "/api/v2/mem/media/reports/", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], 404);
}

#[tokio::test]
async fn test_check_exist_conflict() {
    let app = app();
    call(&app, "POST", "/api/v2/mem/media/", None).await;
    let uri = "/api/v2/mem/media/q1.csv?check_exist=true";
    assert_eq!(put_file(&app, uri, b"first").await, StatusCode::OK);

    let request = Request::builder()
        .method("PUT")
        .uri(uri)
        .body(Body::from("second"))
        .unwrap();
    let (status, _, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["error"]["code"], 409);

    let (_, _, bytes) = send(
        &app,
        Request::builder()
            .uri("/api/v2/mem/media/q1.csv")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(bytes, b"first");
}

#[tokio::test]
async fn test_missing_file_stream_is_plain_404() {
    let app = app();
    call(&app, "POST", "/api/v2/mem/media/", None).await;
    let request = Request::builder()
        .uri("/api/v2/mem/media/missing.txt")
        .body(Body::empty())
        .unwrap();
    let (status, headers, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(
        headers[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/plain")
    );
}

#[tokio::test]
async fn test_batch_create_and_delete() {
    let app = app();
    let body = json!({
        "folder": [{ "name": "a" }, { "name": "b" }],
        "file": [
            { "name": "a/one.txt", "content": "one" },
            { "name": "b/two.txt", "content": "dHdv", "is_base64": true },
            { "name": "zzz/three.txt", "content": "3" }
        ]
    });
    let (status, result) = call(&app, "POST", "/api/v2/mem/media/", Some(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["folder"].as_array().unwrap().len(), 2);
    assert!(result["file"][0].get("error").is_none());
    assert!(result["file"][1].get("error").is_none());
    assert_eq!(result["file"][2]["error"]["code"], 404);

    let (_, _, bytes) = send(
        &app,
        Request::builder()
            .uri("/api/v2/mem/media/b/two.txt")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(bytes, b"two");

    let body = json!({ "folder": [{ "name": "a" }, { "name": "missing" }, { "name": "b" }] });
    let (status, result) = call(&app, "DELETE", "/api/v2/mem/media/?force=true", Some(body)).await;
    assert_eq!(status, StatusCode::OK);
    let items = result["folder"].as_array().unwrap();
    assert_eq!(items.len(), 3);
    assert!(items[0].get("error").is_none());
    assert_eq!(items[1]["error"]["code"], 404);
    assert_eq!(items[1]["name"], "missing");
    assert!(items[2].get("error").is_none());
}

#[tokio::test]
async fn test_merge_updates_properties() {
    let app = app();
    call(&app, "POST", "/api/v2/mem/media/docs/", None).await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/v2/mem/media/docs/")
        .header("X-HTTP-Method", "MERGE")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "properties": { "color": "blue" } }).to_string()))
        .unwrap();
    let (status, _, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(&app, "GET", "/api/v2/mem/media/docs/?include_properties=true", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["properties"], json!({ "color": "blue" }));

    let (status, _) = call(&app, "PATCH", "/api/v2/mem", Some(json!({}))).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_upload_zip_with_extract_then_export() {
    let mut archive = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut archive));
        let options = zip::write::SimpleFileOptions::default();
        zip.start_file("a.txt", options).unwrap();
        zip.write_all(b"alpha").unwrap();
        zip.start_file("sub/b.txt", options).unwrap();
        zip.write_all(b"beta").unwrap();
        zip.finish().unwrap();
    }

    let app = app();
    let request = Request::builder()
        .method("POST")
        .uri("/api/v2/mem/media/site/?extract=true&clean=true")
        .header("X-File-Name", "bundle.zip")
        .body(Body::from(archive))
        .unwrap();
    let (status, _, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::CREATED);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["archive"][0]["imported"]["files"], 2);

    let (_, _, bytes) = send(
        &app,
        Request::builder()
            .uri("/api/v2/mem/media/site/sub/b.txt")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(bytes, b"beta");

    let request = Request::builder()
        .uri("/api/v2/mem/media/site/?zip=true")
        .body(Body::empty())
        .unwrap();
    let (status, headers, bytes) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "application/zip");
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"site.zip\""
    );
    let mut exported = zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();
    let mut names: Vec<String> = (0..exported.len())
        .map(|i| exported.by_index(i).unwrap().name().to_string())
        .collect();
    names.sort();
    assert_eq!(names, vec!["a.txt", "sub/", "sub/b.txt"]);
}

#[tokio::test]
async fn test_container_batch_delete() {
    let app = app();
    let body = json!({ "container": [{ "name": "one" }, { "name": "two" }] });
    let (status, _) = call(&app, "POST", "/api/v2/mem", Some(body)).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = call(&app, "GET", "/api/v2/mem", None).await;
    assert_eq!(body["container"].as_array().unwrap().len(), 2);

    let body = json!({ "container": [{ "name": "one" }, { "name": "ghost" }] });
    let (status, result) = call(&app, "DELETE", "/api/v2/mem/", Some(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(result["container"][0].get("error").is_none());
    assert_eq!(result["container"][1]["error"]["code"], 404);
}

#[tokio::test]
async fn test_folder_upload_needs_existing_parent() {
    let app = app();
    call(&app, "POST", "/api/v2/mem/media/", None).await;
    let upload = |uri: &'static str| {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("X-File-Name", "f.txt")
            .body(Body::from("hello"))
            .unwrap()
    };

    let (status, _, body) = send(&app, upload("/api/v2/mem/media/a/b/c/")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["error"]["code"], 404);
    let (status, _) = call(&app, "GET", "/api/v2/mem/media/a/", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, body) = send(&app, upload("/api/v2/mem/media/a/")).await;
    assert_eq!(status, StatusCode::CREATED);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["file"][0]["path"], "media/a/f.txt");
}
