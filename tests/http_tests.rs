//! HTTP API tests, driven through the router without binding a socket.

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use file_vault::config::VaultConfig;
use file_vault::server::{self, AppState};
use file_vault::VaultStore;
use serde_json::Value;
use std::fs;
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "vault-test-boundary";

fn setup_app(secret: Option<&str>) -> (TempDir, Router) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let mut config = VaultConfig::under(temp_dir.path());
    if let Some(secret) = secret {
        config = config.with_secret(secret);
    }
    let store = VaultStore::open(&config).expect("Failed to open store");
    (temp_dir, server::router(AppState::new(store)))
}

/// Build a multipart body from `(field, file name, contents)` parts.
fn multipart_parts_request(uri: &str, parts: &[(&str, Option<&str>, &[u8])]) -> Request<Body> {
    let mut body = Vec::new();
    for (field, file_name, contents) in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        let disposition = match file_name {
            Some(file_name) => format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                field, file_name
            ),
            None => format!("Content-Disposition: form-data; name=\"{}\"\r\n", field),
        };
        body.extend_from_slice(disposition.as_bytes());
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(contents);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

/// Build a multipart body with one `field` part per `(file name, contents)`.
fn multipart_request(uri: &str, field: &str, files: &[(&str, &[u8])]) -> Request<Body> {
    let parts: Vec<(&str, Option<&str>, &[u8])> = files
        .iter()
        .map(|(file_name, contents)| (field, Some(*file_name), *contents))
        .collect();
    multipart_parts_request(uri, &parts)
}

fn request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

async fn send_json(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let (status, body) = send(app, req).await;
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_upload_and_download() {
    let (temp_dir, app) = setup_app(Some("test-key"));

    let (status, json) = send_json(
        &app,
        multipart_request("/upload", "file", &[("a b.txt", b"hello world")]),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["name"], "a_b.txt");
    assert_eq!(json["size"], 32);

    let envelope = fs::read(temp_dir.path().join("encrypted-files/a_b.txt")).unwrap();
    assert_eq!(envelope.len(), 32);

    let response = app
        .clone()
        .oneshot(request("GET", "/download/a_b.txt"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"a_b.txt\""
    );
    assert_eq!(response.headers()[header::CONTENT_LENGTH], "11");
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"hello world");

    assert_eq!(
        fs::read(temp_dir.path().join("decrypted-files/a_b.txt")).unwrap(),
        b"hello world"
    );
}

#[tokio::test]
async fn test_upload_without_file_field() {
    let (_temp_dir, app) = setup_app(Some("test-key"));

    let (status, json) = send_json(
        &app,
        multipart_request("/upload", "other", &[("x.txt", b"data")]),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["msg"].as_str().unwrap().contains("No file uploaded"));
}

#[tokio::test]
async fn test_download_missing_file() {
    let (_temp_dir, app) = setup_app(Some("test-key"));

    let (status, json) = send_json(&app, request("GET", "/download/nope.txt")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["msg"].is_string());
}

#[tokio::test]
async fn test_download_corrupt_file() {
    let (temp_dir, app) = setup_app(Some("test-key"));
    fs::write(temp_dir.path().join("encrypted-files/bad.bin"), b"short").unwrap();

    let (status, _) = send_json(&app, request("GET", "/download/bad.bin")).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_missing_key_is_server_error() {
    let (temp_dir, app) = setup_app(None);
    fs::write(temp_dir.path().join("encrypted-files/kept.bin"), [0u8; 32]).unwrap();

    let (status, json) = send_json(
        &app,
        multipart_request("/upload", "file", &[("a.txt", b"data")]),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["msg"], "Encryption key not found");

    let (status, _) = send_json(&app, request("GET", "/download/kept.bin")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    let (status, json) = send_json(&app, request("GET", "/_status/healthz")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["key_configured"], false);
}

#[tokio::test]
async fn test_upload_multiple_and_decrypt_all() {
    let (temp_dir, app) = setup_app(Some("batch-key"));

    let (status, json) = send_json(
        &app,
        multipart_request(
            "/upload-multiple",
            "files",
            &[("one.txt", b"first"), ("two.txt", b"second"), ("..", b"bad")],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total_files"], 3);
    assert_eq!(json["successful_files"], 2);
    assert_eq!(json["failed_files"], 1);
    assert_eq!(json["files"][2]["success"], false);

    // A corrupt envelope alongside the good ones
    fs::write(temp_dir.path().join("encrypted-files/three.txt"), b"12345").unwrap();

    let (status, json) = send_json(&app, request("POST", "/decrypt-all")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["succeeded_count"], 2);
    assert_eq!(json["failed_count"], 1);
    assert_eq!(json["failed"][0]["name"], "three.txt");

    let (_, json) = send_json(&app, request("GET", "/fetch-decrypted")).await;
    assert_eq!(json["files"], serde_json::json!(["one.txt", "two.txt"]));

    let (_, json) = send_json(&app, request("GET", "/fetch-encrypted")).await;
    assert_eq!(
        json["files"],
        serde_json::json!(["one.txt", "three.txt", "two.txt"])
    );
}

#[tokio::test]
async fn test_delete_purges_decrypted() {
    let (temp_dir, app) = setup_app(Some("test-key"));

    send(
        &app,
        multipart_request("/upload", "file", &[("doc.txt", b"contents")]),
    )
    .await;
    send(&app, request("GET", "/download/doc.txt")).await;
    assert!(temp_dir.path().join("decrypted-files/doc.txt").exists());

    let (status, json) = send_json(&app, request("DELETE", "/delete")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["deleted"], 1);

    let (_, json) = send_json(&app, request("GET", "/fetch-decrypted")).await;
    assert_eq!(json["files"], serde_json::json!([]));
    assert!(temp_dir.path().join("encrypted-files/doc.txt").exists());
}

#[tokio::test]
async fn test_unknown_route() {
    let (_temp_dir, app) = setup_app(Some("test-key"));

    let req = Request::builder()
        .uri("/nowhere")
        .header(header::ACCEPT, "application/json")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_upload_rejects_path_in_name() {
    let (temp_dir, app) = setup_app(Some("test-key"));

    let (status, json) = send_json(
        &app,
        multipart_request("/upload", "file", &[("a/b", b"data")]),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["msg"].as_str().unwrap().contains("Invalid file name"));
    assert_eq!(
        fs::read_dir(temp_dir.path().join("encrypted-files"))
            .unwrap()
            .count(),
        0
    );

    let (status, _) = send_json(&app, request("GET", "/download/..")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_upload_with_two_files_stores_nothing() {
    let (temp_dir, app) = setup_app(Some("test-key"));

    let (status, json) = send_json(
        &app,
        multipart_request(
            "/upload",
            "file",
            &[("first.txt", b"first"), ("second.txt", b"second")],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["msg"].as_str().unwrap().contains("/upload-multiple"));
    assert_eq!(
        fs::read_dir(temp_dir.path().join("encrypted-files"))
            .unwrap()
            .count(),
        0
    );
}

#[tokio::test]
async fn test_upload_multiple_part_without_filename() {
    let (_temp_dir, app) = setup_app(Some("test-key"));

    let (status, json) = send_json(
        &app,
        multipart_parts_request(
            "/upload-multiple",
            &[
                ("files", None, b"anonymous"),
                ("files", Some("named.txt"), b"named"),
            ],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total_files"], 2);
    assert_eq!(json["successful_files"], 1);
    assert_eq!(json["files"][0]["success"], false);
    assert_eq!(json["files"][1]["name"], "named.txt");

    let (_, json) = send_json(&app, request("GET", "/fetch-encrypted")).await;
    assert_eq!(json["files"], serde_json::json!(["named.txt"]));
}

#[tokio::test]
async fn test_large_upload_streams_through() {
    let (temp_dir, app) = setup_app(Some("test-key"));
    let content: Vec<u8> = (0..300_007u32).map(|i| (i % 251) as u8).collect();

    let (status, json) = send_json(
        &app,
        multipart_request("/upload", "file", &[("big.bin", &content[..])]),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["size"], 16 + 300_016);
    assert_eq!(
        fs::metadata(temp_dir.path().join("encrypted-files/big.bin"))
            .unwrap()
            .len(),
        16 + 300_016
    );

    let (status, body) = send(&app, request("GET", "/download/big.bin")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, content);
}
