//! Asset deletion across both stores.
//!
//! The metadata row goes first, the remote object second. A crash between
//! the two steps can leave an unreferenced remote object but never a row
//! pointing at nothing.

use crate::{
    errors::LibraryError,
    models::asset::AssetRecord,
    services::{
        metadata_repository::MetadataRepository,
        object_store::{ObjectStore, RemoteDeletion},
    },
};
use std::{sync::Arc, time::Duration};
use tokio::time::timeout;
use tracing::{info, instrument, warn};

#[derive(Clone)]
pub struct DeletionOrchestrator {
    store: Arc<dyn ObjectStore>,
    repository: Arc<dyn MetadataRepository>,
    remote_timeout: Duration,
}

impl DeletionOrchestrator {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        repository: Arc<dyn MetadataRepository>,
        remote_timeout: Duration,
    ) -> Self {
        Self {
            store,
            repository,
            remote_timeout,
        }
    }

    /// Delete asset `id` and its remote object.
    ///
    /// Returns the removed record on success. If the row is missing the
    /// remote store is never contacted. If the remote delete fails or times
    /// out the result is `PartialFailure`; the row is already gone by then.
    #[instrument(skip(self))]
    pub async fn delete_asset(&self, id: i64) -> Result<AssetRecord, LibraryError> {
        let record = self.repository.delete_by_id(id).await?;

        let outcome = timeout(self.remote_timeout, self.store.delete(&record.public_id)).await;
        let message = match outcome {
            Ok(Ok(RemoteDeletion::Deleted)) => {
                info!(id, public_id = %record.public_id, "asset deleted");
                return Ok(record);
            }
            Ok(Ok(RemoteDeletion::AlreadyAbsent)) => {
                info!(id, public_id = %record.public_id, "asset deleted, remote object was already gone");
                return Ok(record);
            }
            Ok(Err(err)) => err.to_string(),
            Err(_) => format!("remote delete timed out after {:?}", self.remote_timeout),
        };

        warn!(id, public_id = %record.public_id, error = %message, "metadata removed but remote delete failed");
        Err(LibraryError::PartialFailure {
            id,
            public_id: record.public_id,
            message,
        })
    }
}
