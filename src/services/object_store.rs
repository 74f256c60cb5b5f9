//! src/services/object_store.rs
//!
//! The remote object store seam. `ObjectStore` is the capability the
//! ingestion and deletion paths depend on; `HttpObjectStore` talks to a
//! provider over HTTP and is constructed explicitly from its config, so no
//! provider state lives in globals.

use crate::models::asset::AssetDescriptor;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode, Url, multipart};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, warn};

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("object store request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("object store rejected request with HTTP {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("object store returned an invalid descriptor: {0}")]
    InvalidResponse(String),
    #[error("object store unavailable: {0}")]
    Unavailable(String),
}

/// One file on its way to the store.
#[derive(Clone, Debug)]
pub struct UploadRequest {
    pub bytes: Bytes,
    pub filename: String,
    pub folder: String,
}

/// Acknowledgement of a remote delete.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemoteDeletion {
    Deleted,
    /// Nothing stored under that public id; the store is already consistent.
    AlreadyAbsent,
}

/// Remote blob service used by the library.
///
/// Each call is a single attempt. Timeouts and retries are the caller's
/// business.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store the bytes under `folder` and return the canonical descriptor.
    async fn upload(&self, request: UploadRequest) -> Result<AssetDescriptor, ObjectStoreError>;

    /// Remove the object stored under `public_id`.
    async fn delete(&self, public_id: &str) -> Result<RemoteDeletion, ObjectStoreError>;

    /// Cheap reachability check used by `/readyz`.
    async fn health_check(&self) -> Result<(), ObjectStoreError>;
}

/// Reject descriptors that would violate the asset invariants.
pub fn validate_descriptor(descriptor: &AssetDescriptor) -> Result<(), ObjectStoreError> {
    if descriptor.public_id.trim().is_empty() {
        return Err(ObjectStoreError::InvalidResponse("empty public_id".into()));
    }
    if descriptor.asset_id.trim().is_empty() {
        return Err(ObjectStoreError::InvalidResponse("empty asset_id".into()));
    }
    for (name, value) in [("width", descriptor.width), ("height", descriptor.height)] {
        if let Some(v) = value {
            if v <= 0 {
                return Err(ObjectStoreError::InvalidResponse(format!(
                    "{name} must be positive, got {v}"
                )));
            }
        }
    }
    if descriptor.bytes < 0 {
        return Err(ObjectStoreError::InvalidResponse(format!(
            "bytes must not be negative, got {}",
            descriptor.bytes
        )));
    }
    Ok(())
}

/// Connection settings for [`HttpObjectStore`].
#[derive(Clone, Debug)]
pub struct HttpObjectStoreConfig {
    pub base_url: String,
    pub api_key: String,
    pub api_secret: String,
    /// Transport-level ceiling for a single request.
    pub timeout: Duration,
}

/// Object store reached over HTTP(S).
///
/// - `POST {base}/upload` — multipart `file` + `folder`, returns the descriptor
/// - `DELETE {base}/resources/{public_id}` — 2xx deleted, 404 already absent
/// - `GET {base}/health` — reachability
pub struct HttpObjectStore {
    config: HttpObjectStoreConfig,
    base_url: Url,
    client: Client,
}

impl HttpObjectStore {
    pub fn new(config: HttpObjectStoreConfig) -> Result<Self, ObjectStoreError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Self::with_client(config, client)
    }

    /// Create a store sharing an existing HTTP client.
    pub fn with_client(config: HttpObjectStoreConfig, client: Client) -> Result<Self, ObjectStoreError> {
        let base_url = Url::parse(config.base_url.trim_end_matches('/')).map_err(|err| {
            ObjectStoreError::Unavailable(format!("invalid base url `{}`: {err}", config.base_url))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ObjectStoreError::Unavailable(format!(
                "base url `{}` cannot carry a path",
                config.base_url
            )));
        }
        Ok(Self {
            config,
            base_url,
            client,
        })
    }

    /// Append path segments to the base URL, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty();
            path.extend(segments);
        }
        url
    }

    async fn rejection(response: reqwest::Response) -> ObjectStoreError {
        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        ObjectStoreError::Rejected { status, message }
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    #[instrument(skip(self, request), fields(filename = %request.filename, folder = %request.folder, size = request.bytes.len()))]
    async fn upload(&self, request: UploadRequest) -> Result<AssetDescriptor, ObjectStoreError> {
        let url = self.endpoint(&["upload"]);
        let length = request.bytes.len() as u64;
        let part = multipart::Part::stream_with_length(request.bytes, length)
            .file_name(request.filename.clone());
        let form = multipart::Form::new()
            .text("folder", request.folder.clone())
            .part("file", part);

        debug!(%url, "uploading to object store");

        let response = self
            .client
            .post(url)
            .basic_auth(&self.config.api_key, Some(&self.config.api_secret))
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }

        let descriptor: AssetDescriptor = response
            .json()
            .await
            .map_err(|err| ObjectStoreError::InvalidResponse(err.to_string()))?;
        validate_descriptor(&descriptor)?;

        debug!(public_id = %descriptor.public_id, "upload acknowledged");
        Ok(descriptor)
    }

    #[instrument(skip(self))]
    async fn delete(&self, public_id: &str) -> Result<RemoteDeletion, ObjectStoreError> {
        let url = self.endpoint(&["resources", public_id]);
        let response = self
            .client
            .delete(url)
            .basic_auth(&self.config.api_key, Some(&self.config.api_secret))
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(RemoteDeletion::Deleted),
            StatusCode::NOT_FOUND => {
                warn!(public_id, "remote object already absent");
                Ok(RemoteDeletion::AlreadyAbsent)
            }
            _ => Err(Self::rejection(response).await),
        }
    }

    async fn health_check(&self) -> Result<(), ObjectStoreError> {
        let response = self.client.get(self.endpoint(&["health"])).send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(ObjectStoreError::Unavailable(format!(
                "health endpoint returned HTTP {}",
                response.status()
            )))
        }
    }
}
