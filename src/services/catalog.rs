//! Catalog reads plus maintenance of descriptive fields.

use crate::{
    errors::LibraryError,
    models::{
        asset::{AssetRecord, AssetUpdate},
        catalog::{CatalogQuery, CatalogResponse},
    },
    services::metadata_repository::MetadataRepository,
};
use std::sync::Arc;
use tracing::{debug, instrument};

#[derive(Clone)]
pub struct CatalogService {
    repository: Arc<dyn MetadataRepository>,
}

impl CatalogService {
    pub fn new(repository: Arc<dyn MetadataRepository>) -> Self {
        Self { repository }
    }

    /// Return one page of the catalog.
    ///
    /// No matches and pages past the end are ordinary empty pages carrying
    /// the real total.
    #[instrument(skip(self))]
    pub async fn list(&self, query: CatalogQuery) -> Result<CatalogResponse, LibraryError> {
        let query = query.normalized()?;
        let (records, total) = self.repository.query(&query).await?;
        debug!(returned = records.len(), total, "catalog page");
        Ok(CatalogResponse::new(
            records,
            total,
            query.page,
            query.page_size,
        ))
    }

    pub async fn get(&self, id: i64) -> Result<AssetRecord, LibraryError> {
        Ok(self.repository.get(id).await?)
    }

    /// Update title, alt text or display name. Identity fields are not
    /// reachable from here.
    #[instrument(skip(self))]
    pub async fn update(&self, id: i64, update: AssetUpdate) -> Result<AssetRecord, LibraryError> {
        if update.is_empty() {
            return Err(LibraryError::Validation(
                "update must set at least one of title, alt or displayName".into(),
            ));
        }
        let update = AssetUpdate {
            title: update.title.map(|t| t.trim().to_string()),
            display_name: update.display_name.map(|d| d.trim().to_string()),
            alt: update.alt,
        };
        if update.title.as_deref() == Some("") {
            return Err(LibraryError::Validation("title must not be empty".into()));
        }
        if update.display_name.as_deref() == Some("") {
            return Err(LibraryError::Validation(
                "displayName must not be empty".into(),
            ));
        }
        Ok(self.repository.update(id, update).await?)
    }
}
