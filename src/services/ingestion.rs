//! src/services/ingestion.rs
//!
//! Multi-file ingestion: validate every entry, upload all of them to the
//! object store concurrently, then record the whole batch in the metadata
//! store with one call. Either every entry gets a row or none does.

use crate::{
    errors::LibraryError,
    models::asset::{AssetDescriptor, AssetRecord, NewAsset, normalize_alt},
    services::{
        metadata_repository::MetadataRepository,
        object_store::{ObjectStore, UploadRequest},
    },
};
use bytes::Bytes;
use futures::future::join_all;
use serde::Serialize;
use std::{fmt, str::FromStr, sync::Arc, time::Duration};
use tokio::{task::JoinSet, time::timeout};
use tracing::{debug, error, info, instrument, warn};

/// What to do with objects that reached the remote store when their batch
/// cannot be committed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OrphanPolicy {
    /// Delete them again before reporting the failure.
    #[default]
    Compensate,
    /// Leave them in place and log their public ids for reconciliation.
    Keep,
}

impl FromStr for OrphanPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "compensate" => Ok(OrphanPolicy::Compensate),
            "keep" => Ok(OrphanPolicy::Keep),
            other => Err(format!(
                "unknown orphan policy `{other}` (expected compensate or keep)"
            )),
        }
    }
}

impl fmt::Display for OrphanPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrphanPolicy::Compensate => f.write_str("compensate"),
            OrphanPolicy::Keep => f.write_str("keep"),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct IngestionSettings {
    /// Upper bound for every single remote call.
    pub remote_timeout: Duration,
    pub max_file_size: usize,
    pub max_files: usize,
    /// Extra attempts per file after a failed or timed-out upload.
    pub upload_retries: u32,
    pub orphan_policy: OrphanPolicy,
}

impl Default for IngestionSettings {
    fn default() -> Self {
        Self {
            remote_timeout: Duration::from_secs(30),
            max_file_size: 10 * 1024 * 1024,
            max_files: 20,
            upload_retries: 0,
            orphan_policy: OrphanPolicy::Compensate,
        }
    }
}

/// One file submitted for ingestion.
#[derive(Clone, Debug)]
pub struct UploadEntry {
    pub bytes: Bytes,
    pub filename: String,
    /// Declared alt text; absent or blank means "derive from the filename".
    pub alt: Option<String>,
}

impl UploadEntry {
    pub fn new(bytes: impl Into<Bytes>, filename: impl Into<String>, alt: Option<String>) -> Self {
        Self {
            bytes: bytes.into(),
            filename: filename.into(),
            alt,
        }
    }
}

#[derive(Serialize, Debug, Default, Clone)]
pub struct IngestionReport {
    pub count: usize,
    pub assets: Vec<AssetRecord>,
}

struct PreparedUpload {
    index: usize,
    request: UploadRequest,
    alt: String,
}

type UploadOutcome = (usize, Result<AssetDescriptor, String>);

#[derive(Clone)]
pub struct IngestionPipeline {
    store: Arc<dyn ObjectStore>,
    repository: Arc<dyn MetadataRepository>,
    settings: IngestionSettings,
}

impl IngestionPipeline {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        repository: Arc<dyn MetadataRepository>,
        settings: IngestionSettings,
    ) -> Self {
        Self {
            store,
            repository,
            settings,
        }
    }

    pub fn settings(&self) -> &IngestionSettings {
        &self.settings
    }

    /// Upload `entries` into `folder` and record them.
    ///
    /// An empty batch is a successful no-op. On any upload failure no rows
    /// are written and the orphan policy decides what happens to objects
    /// that already landed.
    #[instrument(skip(self, entries), fields(entries = entries.len()))]
    pub async fn ingest(
        &self,
        entries: Vec<UploadEntry>,
        folder: &str,
    ) -> Result<IngestionReport, LibraryError> {
        if entries.is_empty() {
            debug!("empty batch, nothing to ingest");
            return Ok(IngestionReport::default());
        }

        let prepared = self.prepare(entries, folder)?;
        let uploaded = self.upload_all(prepared).await?;
        self.persist(uploaded).await
    }

    /// Reject malformed entries before anything leaves the process.
    fn prepare(
        &self,
        entries: Vec<UploadEntry>,
        folder: &str,
    ) -> Result<Vec<PreparedUpload>, LibraryError> {
        let folder = folder.trim().trim_matches('/');
        if folder.is_empty() {
            return Err(LibraryError::Validation(
                "destination folder must not be empty".into(),
            ));
        }
        if entries.len() > self.settings.max_files {
            return Err(LibraryError::Validation(format!(
                "{} files submitted, at most {} allowed per upload",
                entries.len(),
                self.settings.max_files
            )));
        }

        let mut prepared = Vec::with_capacity(entries.len());
        for (index, entry) in entries.into_iter().enumerate() {
            if entry.bytes.is_empty() {
                return Err(LibraryError::Validation(format!(
                    "entry {index} (`{}`) is empty",
                    entry.filename
                )));
            }
            if entry.bytes.len() > self.settings.max_file_size {
                return Err(LibraryError::Validation(format!(
                    "entry {index} (`{}`) is {} bytes, limit is {}",
                    entry.filename,
                    entry.bytes.len(),
                    self.settings.max_file_size
                )));
            }

            let alt = normalize_alt(entry.alt.as_deref(), &entry.filename);
            prepared.push(PreparedUpload {
                index,
                request: UploadRequest {
                    bytes: entry.bytes,
                    filename: entry.filename,
                    folder: folder.to_string(),
                },
                alt,
            });
        }
        Ok(prepared)
    }

    /// Fan out one task per entry and wait until all succeed or one fails.
    async fn upload_all(
        &self,
        prepared: Vec<PreparedUpload>,
    ) -> Result<Vec<(AssetDescriptor, String)>, LibraryError> {
        let total = prepared.len();
        let mut alts = Vec::with_capacity(total);
        let mut tasks: JoinSet<UploadOutcome> = JoinSet::new();

        for upload in prepared {
            alts.push(upload.alt);
            let store = Arc::clone(&self.store);
            let settings = self.settings;
            let index = upload.index;
            let request = upload.request;
            tasks.spawn(async move {
                let result = upload_with_retries(store.as_ref(), request, &settings).await;
                (index, result)
            });
        }

        let mut uploaded: Vec<Option<AssetDescriptor>> = vec![None; total];
        while let Some(joined) = tasks.join_next().await {
            let (index, message) = match joined {
                Ok((index, Ok(descriptor))) => {
                    debug!(index, public_id = %descriptor.public_id, "entry uploaded");
                    uploaded[index] = Some(descriptor);
                    continue;
                }
                Ok((index, Err(message))) => (Some(index), message),
                Err(err) => (None, format!("upload task failed: {err}")),
            };

            warn!(index = ?index, error = %message, "upload failed, abandoning batch");
            let completed: Vec<String> = uploaded
                .into_iter()
                .flatten()
                .map(|descriptor| descriptor.public_id)
                .collect();
            let orphaned = self.abandon(completed, tasks).await;
            return Err(LibraryError::RemoteStore {
                index,
                message,
                orphaned,
            });
        }

        let descriptors = uploaded
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| LibraryError::RemoteStore {
                index: None,
                message: "upload task finished without a result".into(),
                orphaned: Vec::new(),
            })?;
        Ok(descriptors.into_iter().zip(alts).collect())
    }

    /// Apply the orphan policy to a failed batch and return the public ids
    /// that are still stored remotely.
    ///
    /// `completed` objects are handled before returning. Uploads still in
    /// flight are drained in the background so late arrivals are deleted
    /// (`Compensate`) or logged (`Keep`) as they land.
    async fn abandon(
        &self,
        completed: Vec<String>,
        mut in_flight: JoinSet<UploadOutcome>,
    ) -> Vec<String> {
        let policy = self.settings.orphan_policy;
        let orphaned = match policy {
            OrphanPolicy::Compensate => {
                let leftover =
                    compensate(self.store.as_ref(), &completed, self.settings.remote_timeout).await;
                if !leftover.is_empty() {
                    warn!(orphaned = ?leftover, "compensation left remote objects behind");
                }
                leftover
            }
            OrphanPolicy::Keep => {
                if !completed.is_empty() {
                    warn!(orphaned = ?completed, "batch failed, uploaded objects kept without metadata");
                }
                completed
            }
        };

        if !in_flight.is_empty() {
            let store = Arc::clone(&self.store);
            let remote_timeout = self.settings.remote_timeout;
            tokio::spawn(async move {
                while let Some(joined) = in_flight.join_next().await {
                    let Ok((index, Ok(descriptor))) = joined else {
                        continue;
                    };
                    match policy {
                        OrphanPolicy::Compensate => {
                            let ids = [descriptor.public_id];
                            let leftover = compensate(store.as_ref(), &ids, remote_timeout).await;
                            if !leftover.is_empty() {
                                warn!(orphaned = ?leftover, "late upload could not be removed");
                            }
                        }
                        OrphanPolicy::Keep => {
                            warn!(index, public_id = %descriptor.public_id, "late upload kept without metadata");
                        }
                    }
                }
            });
        }

        orphaned
    }

    /// Record a fully uploaded batch.
    async fn persist(
        &self,
        uploaded: Vec<(AssetDescriptor, String)>,
    ) -> Result<IngestionReport, LibraryError> {
        let public_ids: Vec<String> = uploaded
            .iter()
            .map(|(descriptor, _)| descriptor.public_id.clone())
            .collect();
        let assets: Vec<NewAsset> = uploaded
            .into_iter()
            .map(|(descriptor, alt)| NewAsset::from_descriptor(descriptor, alt))
            .collect();

        match self.repository.insert_batch(assets).await {
            Ok(records) => {
                info!(count = records.len(), "batch ingested");
                Ok(IngestionReport {
                    count: records.len(),
                    assets: records,
                })
            }
            Err(err) => {
                error!(error = %err, public_ids = ?public_ids, "metadata insert failed after uploads");
                let orphaned = match self.settings.orphan_policy {
                    OrphanPolicy::Compensate => {
                        compensate(self.store.as_ref(), &public_ids, self.settings.remote_timeout)
                            .await
                    }
                    OrphanPolicy::Keep => public_ids,
                };
                Err(LibraryError::Persistence {
                    message: err.to_string(),
                    orphaned,
                })
            }
        }
    }
}

/// Upload once, then retry up to `upload_retries` more times.
async fn upload_with_retries(
    store: &dyn ObjectStore,
    request: UploadRequest,
    settings: &IngestionSettings,
) -> Result<AssetDescriptor, String> {
    let attempts = settings.upload_retries.saturating_add(1);
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        match timeout(settings.remote_timeout, store.upload(request.clone())).await {
            Ok(Ok(descriptor)) => return Ok(descriptor),
            Ok(Err(err)) => last_error = err.to_string(),
            Err(_) => {
                last_error = format!("upload timed out after {:?}", settings.remote_timeout)
            }
        }
        if attempt < attempts {
            warn!(attempt, filename = %request.filename, error = %last_error, "upload attempt failed, retrying");
        }
    }
    Err(last_error)
}

/// Delete the given remote objects concurrently. Returns the ids that could
/// not be removed.
async fn compensate(store: &dyn ObjectStore, public_ids: &[String], limit: Duration) -> Vec<String> {
    let outcomes = join_all(public_ids.iter().map(|public_id| async move {
        (public_id, timeout(limit, store.delete(public_id)).await)
    }))
    .await;

    outcomes
        .into_iter()
        .filter_map(|(public_id, outcome)| match outcome {
            Ok(Ok(_)) => {
                debug!(%public_id, "compensated remote object");
                None
            }
            Ok(Err(err)) => {
                warn!(%public_id, error = %err, "compensating delete failed");
                Some(public_id.clone())
            }
            Err(_) => {
                warn!(%public_id, "compensating delete timed out");
                Some(public_id.clone())
            }
        })
        .collect()
}
