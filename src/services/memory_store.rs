//! In-process object store.
//!
//! Keeps payloads in a map keyed by public id. Backs the `memory` object
//! store mode for local development and the HTTP API tests; nothing survives
//! a restart.

use crate::{
    models::asset::{AssetDescriptor, alt_from_filename},
    services::object_store::{ObjectStore, ObjectStoreError, RemoteDeletion, UploadRequest},
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};
use tracing::debug;
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct StoredObject {
    pub descriptor: AssetDescriptor,
    pub bytes: Bytes,
}

#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, StoredObject>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, StoredObject>>, ObjectStoreError> {
        self.objects
            .lock()
            .map_err(|_| ObjectStoreError::Unavailable("memory store lock poisoned".into()))
    }

    pub fn get(&self, public_id: &str) -> Option<StoredObject> {
        self.lock().ok()?.get(public_id).cloned()
    }

    pub fn contains(&self, public_id: &str) -> bool {
        self.get(public_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.lock().map(|objects| objects.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Public ids currently stored, sorted.
    pub fn public_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .lock()
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }
}

/// Lowercase extension of a filename, if any.
fn extension(filename: &str) -> String {
    match filename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => ext.to_ascii_lowercase(),
        _ => String::new(),
    }
}

fn resource_type(format: &str) -> &'static str {
    match format {
        "png" | "jpg" | "jpeg" | "gif" | "webp" | "avif" | "bmp" | "svg" | "tiff" => "image",
        "mp4" | "mov" | "webm" | "mkv" => "video",
        _ => "raw",
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn upload(&self, request: UploadRequest) -> Result<AssetDescriptor, ObjectStoreError> {
        let asset_id = Uuid::new_v4().simple().to_string();
        let stem = alt_from_filename(&request.filename);
        let stem = if stem.is_empty() { "file".to_string() } else { stem };
        let folder = request.folder.trim_matches('/');
        let public_id = format!("{}/{}_{}", folder, stem, &asset_id[..6]);
        let format = extension(&request.filename);
        let signature = format!("{:x}", md5::compute(&request.bytes));
        let url = format!("memory://{public_id}");

        let descriptor = AssetDescriptor {
            asset_id,
            public_id: public_id.clone(),
            version_id: Utc::now().timestamp_millis().to_string(),
            signature,
            width: None,
            height: None,
            resource_type: resource_type(&format).to_string(),
            format,
            bytes: request.bytes.len() as i64,
            url: url.clone(),
            secure_url: url,
            asset_folder: folder.to_string(),
            display_name: Some(stem.clone()),
            original_filename: stem,
            created_at: Utc::now(),
        };

        self.lock()?.insert(
            public_id.clone(),
            StoredObject {
                descriptor: descriptor.clone(),
                bytes: request.bytes,
            },
        );
        debug!(%public_id, "stored object in memory");
        Ok(descriptor)
    }

    async fn delete(&self, public_id: &str) -> Result<RemoteDeletion, ObjectStoreError> {
        match self.lock()?.remove(public_id) {
            Some(_) => Ok(RemoteDeletion::Deleted),
            None => Ok(RemoteDeletion::AlreadyAbsent),
        }
    }

    async fn health_check(&self) -> Result<(), ObjectStoreError> {
        self.lock().map(|_| ())
    }
}
