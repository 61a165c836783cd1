mod common;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use common::{MIB, MockStorageService, file_service_with_queue, setup_test_db, test_config};
use file_ingest_backend::config::AppConfig;
use file_ingest_backend::services::replication_queue::ReplicationJob;
use file_ingest_backend::services::storage::StorageService;
use file_ingest_backend::{AppState, create_app};
use http_body_util::BodyExt;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tower::ServiceExt;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const BOUNDARY: &str = "---------------------------123456789012345678901234567";

async fn setup_app(dir: &Path) -> (Router, mpsc::Receiver<ReplicationJob>) {
    let storage = MockStorageService::with_existing_bucket("files");
    setup_app_with(dir, test_config(dir), storage).await
}

async fn setup_app_with(
    dir: &Path,
    config: AppConfig,
    storage: MockStorageService,
) -> (Router, mpsc::Receiver<ReplicationJob>) {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::new("file_ingest_backend=debug,tower_http=debug"))
        .with(fmt::layer().with_test_writer())
        .try_init();

    let db = setup_test_db().await;
    let storage: Arc<dyn StorageService> = Arc::new(storage);
    let (file_service, rx) = file_service_with_queue(db.clone(), dir).await;

    let state = AppState {
        db,
        storage,
        file_service: Arc::new(file_service),
        config,
    };

    (create_app(state), rx)
}

fn multipart_body(parts: &[(&str, Option<(&str, &str)>, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, file, content) in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match file {
            Some((filename, content_type)) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                        name, filename, content_type
                    )
                    .as_bytes(),
                );
            }
            None => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name)
                        .as_bytes(),
                );
            }
        }
        body.extend_from_slice(content);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn upload_request(body: Body) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/upload_file")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(body)
        .unwrap()
}

fn multipart_request(parts: &[(&str, Option<(&str, &str)>, &[u8])]) -> Request<Body> {
    upload_request(Body::from(multipart_body(parts)))
}

/// Same form sent as a chunked stream with no known length
fn streamed_multipart_request(parts: &[(&str, Option<(&str, &str)>, &[u8])]) -> Request<Body> {
    let chunks: Vec<Result<Vec<u8>, std::io::Error>> = multipart_body(parts)
        .chunks(64 * 1024)
        .map(|c| Ok(c.to_vec()))
        .collect();
    upload_request(Body::from_stream(futures::stream::iter(chunks)))
}

/// Config whose body limit is only the multipart headroom
fn tiny_limit_config(dir: &Path) -> AppConfig {
    AppConfig {
        max_file_size: 1,
        ..test_config(dir)
    }
}

async fn get(app: &Router, uri: &str) -> axum::response::Response {
    app.clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_upload_then_fetch_metadata_and_content() {
    let dir = tempfile::tempdir().unwrap();
    let (app, mut rx) = setup_app(dir.path()).await;

    let content = b"Integration test content";
    let response = app
        .clone()
        .oneshot(multipart_request(&[
            ("size", None, &b"24"[..]),
            ("file", Some(("api_test.txt", "text/plain")), &content[..]),
        ]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = json_body(response).await;
    assert_eq!(json["name"], "api_test");
    assert_eq!(json["extension"], ".txt");
    assert_eq!(json["format"], "text/plain");
    assert_eq!(json["size"], 24);
    assert!(json.get("created_at").is_none());
    let id = json["id"].as_str().unwrap().to_string();

    let job = rx.try_recv().unwrap();
    assert_eq!(job.key, format!("{}.txt", id));

    // Metadata
    let response = get(&app, &format!("/file/{}", id)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let fetched = json_body(response).await;
    assert_eq!(fetched, json);

    // Content
    let response = get(&app, &format!("/file/{}/download", id)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers().clone();
    assert_eq!(headers[header::CONTENT_TYPE], "text/plain");
    assert_eq!(headers[header::CONTENT_LENGTH], "24");
    let disposition = headers[header::CONTENT_DISPOSITION].to_str().unwrap();
    assert!(disposition.starts_with("attachment; filename=\"api_test.txt\""));

    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], content);
}

#[tokio::test]
async fn test_upload_without_file_is_bad_request() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _rx) = setup_app(dir.path()).await;

    let response = app
        .clone()
        .oneshot(multipart_request(&[("size", None, &b"10"[..])]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert_eq!(json["error"], "No file provided");
}

#[tokio::test]
async fn test_upload_without_declared_size_reports_bytes_written() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _rx) = setup_app(dir.path()).await;

    let response = app
        .clone()
        .oneshot(multipart_request(&[(
            "file",
            Some(("data", "application/octet-stream")),
            &[5u8; 1000][..],
        )]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["size"], 1000);
    assert_eq!(json["extension"], "");
}

#[tokio::test]
async fn test_unknown_file_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _rx) = setup_app(dir.path()).await;

    let id = uuid::Uuid::new_v4();
    let response = get(&app, &format!("/file/{}", id)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = get(&app, &format!("/file/{}/download", id)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_malformed_id_is_bad_request() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _rx) = setup_app(dir.path()).await;

    let response = get(&app, "/file/not-a-uuid").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_download_after_sweep_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _rx) = setup_app(dir.path()).await;

    let response = app
        .clone()
        .oneshot(multipart_request(&[(
            "file",
            Some(("old.log", "text/plain")),
            &b"stale"[..],
        )]))
        .await
        .unwrap();
    let json = json_body(response).await;
    let id = json["id"].as_str().unwrap().to_string();

    std::fs::remove_file(dir.path().join(format!("{}.log", id))).unwrap();

    let response = get(&app, &format!("/file/{}", id)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let response = get(&app, &format!("/file/{}/download", id)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health_check() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _rx) = setup_app(dir.path()).await;

    let response = get(&app, "/health").await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["database"], "connected");
    assert_eq!(json["storage"], "connected");
}

#[tokio::test]
async fn test_health_check_reports_missing_bucket() {
    let dir = tempfile::tempdir().unwrap();
    let storage = MockStorageService::new("files");
    let (app, _rx) = setup_app_with(dir.path(), test_config(dir.path()), storage).await;

    let response = get(&app, "/health").await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["storage"], "bucket missing");
}

#[tokio::test]
async fn test_oversized_upload_is_payload_too_large() {
    let dir = tempfile::tempdir().unwrap();
    let (app, mut rx) = setup_app_with(
        dir.path(),
        tiny_limit_config(dir.path()),
        MockStorageService::with_existing_bucket("files"),
    )
    .await;

    let content = vec![0u8; 12 * MIB];
    let parts = [("file", Some(("big.bin", "application/octet-stream")), &content[..])];

    for request in [multipart_request(&parts), streamed_multipart_request(&parts)] {
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let json = json_body(response).await;
        assert!(json["error"].as_str().unwrap().contains("maximum allowed limit"));
    }

    // Nothing incomplete is handed to replication
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_oversized_size_field_is_payload_too_large() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _rx) = setup_app_with(
        dir.path(),
        tiny_limit_config(dir.path()),
        MockStorageService::with_existing_bucket("files"),
    )
    .await;

    let size = vec![b'1'; 12 * MIB];
    let response = app
        .clone()
        .oneshot(streamed_multipart_request(&[
            ("size", None, &size[..]),
            ("file", Some(("a.txt", "text/plain")), &b"abc"[..]),
        ]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}
