//! HTTP handlers for the media library.
//! Parse and validate the request, delegate to `LibraryService`, and shape
//! the JSON response.

use crate::{
    errors::AppError,
    models::{
        asset::AssetUpdate,
        catalog::{CatalogParams, CatalogQuery, CatalogResponse},
    },
    services::{ingestion::UploadEntry, library_service::LibraryService},
};
use axum::{
    Json,
    extract::{
        Multipart, Path, Query, State,
        multipart::MultipartError,
        rejection::JsonRejection,
    },
    http::StatusCode,
    response::IntoResponse,
};
use bytes::Bytes;
use serde_json::json;
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Default)]
struct PendingEntry {
    file: Option<(Bytes, String)>,
    alt: Option<String>,
}

/// `POST /api/media/upload`
///
/// Multipart fields `file_{i}` (bytes), `alt_{i}` (text) and an optional
/// `folder`. Entries are ingested in ascending index order.
pub async fn upload_media(
    State(service): State<LibraryService>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut pending: BTreeMap<usize, PendingEntry> = BTreeMap::new();
    let mut folder: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();

        if name == "folder" {
            folder = Some(field.text().await.map_err(multipart_error)?);
        } else if let Some(index) = field_index(&name, "file_") {
            let filename = field
                .file_name()
                .map(str::to_string)
                .unwrap_or_else(|| format!("file_{index}"));
            let bytes = field.bytes().await.map_err(multipart_error)?;
            let entry = pending.entry(index).or_default();
            if entry.file.is_some() {
                return Err(AppError::validation(format!("duplicate field `{name}`")));
            }
            entry.file = Some((bytes, filename));
        } else if let Some(index) = field_index(&name, "alt_") {
            let text = field.text().await.map_err(multipart_error)?;
            pending.entry(index).or_default().alt = Some(text);
        } else {
            return Err(AppError::validation(format!(
                "unexpected multipart field `{name}`"
            )));
        }
    }

    let mut entries = Vec::with_capacity(pending.len());
    for (index, entry) in pending {
        let Some((bytes, filename)) = entry.file else {
            return Err(AppError::validation(format!(
                "alt_{index} has no matching file_{index}"
            )));
        };
        entries.push(UploadEntry::new(bytes, filename, entry.alt));
    }

    let folder = folder
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty())
        .unwrap_or_else(|| service.default_folder.clone());

    debug!(entries = entries.len(), %folder, "upload request parsed");
    let report = service.ingestion.ingest(entries, &folder).await?;

    let status = if report.count == 0 {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    let message = match report.count {
        0 => "no files to upload".to_string(),
        1 => "1 file uploaded".to_string(),
        n => format!("{n} files uploaded"),
    };
    Ok((
        status,
        Json(json!({
            "message": message,
            "count": report.count,
            "data": report.assets,
        })),
    ))
}

/// `GET /api/media`
pub async fn list_media(
    State(service): State<LibraryService>,
    Query(params): Query<CatalogParams>,
) -> Result<Json<CatalogResponse>, AppError> {
    let query = CatalogQuery::from_params(params)?;
    Ok(Json(service.catalog.list(query).await?))
}

/// `GET /api/media/{id}`
pub async fn get_media(
    State(service): State<LibraryService>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let record = service.catalog.get(id).await?;
    Ok(Json(json!({ "data": record })))
}

/// `PATCH /api/media/{id}`
pub async fn update_media(
    State(service): State<LibraryService>,
    Path(id): Path<i64>,
    body: Result<Json<AssetUpdate>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(update) = body.map_err(|rejection| AppError::validation(rejection.body_text()))?;
    let record = service.catalog.update(id, update).await?;
    Ok(Json(json!({
        "message": "asset updated",
        "data": record,
    })))
}

/// `DELETE /api/media/{id}`
pub async fn delete_media(
    State(service): State<LibraryService>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let record = service.deletion.delete_asset(id).await?;
    Ok(Json(json!({
        "message": "asset deleted",
        "data": record,
    })))
}

/// `file_3` with prefix `file_` -> `Some(3)`.
fn field_index(name: &str, prefix: &str) -> Option<usize> {
    name.strip_prefix(prefix)?.parse().ok()
}

fn multipart_error(err: MultipartError) -> AppError {
    AppError::new(err.status(), "validation_error", err.body_text())
}
