//! src/services/library_service.rs
//!
//! LibraryService — the shared state handed to every HTTP handler. It wires
//! one object store and one metadata repository into the ingestion, deletion
//! and catalog services so they all see the same collaborators.

use crate::services::{
    catalog::CatalogService,
    deletion::DeletionOrchestrator,
    ingestion::{IngestionPipeline, IngestionSettings},
    metadata_repository::MetadataRepository,
    object_store::ObjectStore,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct LibraryService {
    pub ingestion: IngestionPipeline,
    pub deletion: DeletionOrchestrator,
    pub catalog: CatalogService,

    /// Used directly by the readiness check.
    pub repository: Arc<dyn MetadataRepository>,
    pub store: Arc<dyn ObjectStore>,

    /// Folder used when an upload does not name one.
    pub default_folder: String,
}

impl LibraryService {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        repository: Arc<dyn MetadataRepository>,
        settings: IngestionSettings,
        default_folder: impl Into<String>,
    ) -> Self {
        Self {
            ingestion: IngestionPipeline::new(store.clone(), repository.clone(), settings),
            deletion: DeletionOrchestrator::new(
                store.clone(),
                repository.clone(),
                settings.remote_timeout,
            ),
            catalog: CatalogService::new(repository.clone()),
            repository,
            store,
            default_folder: default_folder.into(),
        }
    }

    /// Largest request body the upload endpoint should accept.
    pub fn upload_body_limit(&self) -> usize {
        let settings = self.ingestion.settings();
        settings
            .max_file_size
            .saturating_mul(settings.max_files)
            .saturating_add(1024 * 1024)
    }
}
