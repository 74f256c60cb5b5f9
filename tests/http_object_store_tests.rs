//! Wire-level tests for `HttpObjectStore` against a throwaway axum server.

use axum::{
    Json, Router,
    extract::{Multipart, Path, State},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
    routing::{delete, get, post},
};
use bytes::Bytes;
use chrono::Utc;
use media_library::services::object_store::{
    HttpObjectStore, HttpObjectStoreConfig, ObjectStore, ObjectStoreError, RemoteDeletion,
    UploadRequest,
};
use serde_json::json;
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::net::TcpListener;

#[derive(Clone, Default)]
struct Provider {
    received: Arc<Mutex<Vec<String>>>,
}

// base64("key:secret")
const EXPECTED_AUTH: &str = "Basic a2V5OnNlY3JldA==";

async fn upload(
    State(provider): State<Provider>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> impl IntoResponse {
    if headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) != Some(EXPECTED_AUTH) {
        return (StatusCode::UNAUTHORIZED, "bad credentials").into_response();
    }

    let mut folder = String::new();
    let mut filename = String::new();
    let mut size = 0usize;
    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "folder" => folder = field.text().await.unwrap(),
            "file" => {
                filename = field.file_name().unwrap_or_default().to_string();
                size = field.bytes().await.unwrap().len();
            }
            _ => {}
        }
    }
    provider
        .received
        .lock()
        .unwrap()
        .push(format!("upload {folder} {filename} {size}"));

    if filename == "reject.png" {
        return (StatusCode::UNPROCESSABLE_ENTITY, "unsupported image").into_response();
    }

    let stem = filename.rsplit_once('.').map(|(s, _)| s).unwrap_or(&filename);
    let width = if filename == "zero.png" { 0 } else { 800 };
    Json(json!({
        "asset_id": "3f2a9c4e5b6d7e8f9a0b1c2d3e4f5a6b",
        "public_id": format!("{folder}/{stem}"),
        "version_id": "1712345678",
        "signature": "abc123",
        "width": width,
        "height": 600,
        "format": "png",
        "resource_type": "image",
        "bytes": size,
        "url": format!("http://cdn.test/{folder}/{stem}.png"),
        "secure_url": format!("https://cdn.test/{folder}/{stem}.png"),
        "asset_folder": folder,
        "original_filename": stem,
        "created_at": Utc::now(),
    }))
    .into_response()
}

async fn remove(State(provider): State<Provider>, Path(public_id): Path<String>) -> StatusCode {
    provider
        .received
        .lock()
        .unwrap()
        .push(format!("delete {public_id}"));
    match public_id.as_str() {
        "media/gone" => StatusCode::NOT_FOUND,
        "media/broken" => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::OK,
    }
}

async fn spawn_provider() -> (String, Provider) {
    let provider = Provider::default();
    let app = Router::new()
        .route("/v1/upload", post(upload))
        .route("/v1/resources/{public_id}", delete(remove))
        .route("/v1/health", get(|| async { StatusCode::OK }))
        .with_state(provider.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/v1"), provider)
}

fn store(base_url: &str) -> HttpObjectStore {
    HttpObjectStore::new(HttpObjectStoreConfig {
        base_url: base_url.into(),
        api_key: "key".into(),
        api_secret: "secret".into(),
        timeout: Duration::from_secs(5),
    })
    .unwrap()
}

fn request(filename: &str) -> UploadRequest {
    UploadRequest {
        bytes: Bytes::from_static(b"0123456789"),
        filename: filename.into(),
        folder: "media".into(),
    }
}

#[tokio::test]
async fn uploads_multipart_and_parses_descriptor() {
    let (base, provider) = spawn_provider().await;
    let store = store(&base);

    let descriptor = store.upload(request("logo.png")).await.unwrap();

    assert_eq!(descriptor.public_id, "media/logo");
    assert_eq!(descriptor.asset_folder, "media");
    assert_eq!(descriptor.width, Some(800));
    assert_eq!(descriptor.bytes, 10);
    assert_eq!(descriptor.display_name, None);
    assert_eq!(
        provider.received.lock().unwrap().as_slice(),
        ["upload media logo.png 10"]
    );
}

#[tokio::test]
async fn rejected_upload_carries_status() {
    let (base, _) = spawn_provider().await;

    let err = store(&base).upload(request("reject.png")).await.unwrap_err();

    assert!(matches!(
        err,
        ObjectStoreError::Rejected { status: 422, ref message } if message.contains("unsupported")
    ));
}

#[tokio::test]
async fn wrong_credentials_are_rejected() {
    let (base, _) = spawn_provider().await;
    let store = HttpObjectStore::new(HttpObjectStoreConfig {
        base_url: base,
        api_key: "key".into(),
        api_secret: "wrong".into(),
        timeout: Duration::from_secs(5),
    })
    .unwrap();

    let err = store.upload(request("logo.png")).await.unwrap_err();
    assert!(matches!(err, ObjectStoreError::Rejected { status: 401, .. }));
}

#[tokio::test]
async fn non_positive_dimensions_are_invalid() {
    let (base, _) = spawn_provider().await;

    let err = store(&base).upload(request("zero.png")).await.unwrap_err();
    assert!(matches!(err, ObjectStoreError::InvalidResponse(_)));
}

#[tokio::test]
async fn delete_maps_statuses() {
    let (base, provider) = spawn_provider().await;
    let store = store(&base);

    assert_eq!(store.delete("media/logo").await.unwrap(), RemoteDeletion::Deleted);
    assert_eq!(
        store.delete("media/gone").await.unwrap(),
        RemoteDeletion::AlreadyAbsent
    );
    assert!(matches!(
        store.delete("media/broken").await.unwrap_err(),
        ObjectStoreError::Rejected { status: 500, .. }
    ));

    // the public id travels as one encoded path segment
    assert_eq!(
        provider.received.lock().unwrap().as_slice(),
        ["delete media/logo", "delete media/gone", "delete media/broken"]
    );
}

#[tokio::test]
async fn health_check_and_unreachable_store() {
    let (base, _) = spawn_provider().await;
    assert!(store(&base).health_check().await.is_ok());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let closed = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let err = store(&closed).health_check().await.unwrap_err();
    assert!(matches!(err, ObjectStoreError::Transport(_)));
}
