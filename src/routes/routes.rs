//! Defines routes for the media library API.
//!
//! ## Structure
//! - **Collection endpoints**
//!   - `POST   /api/media/upload` — multipart batch upload
//!   - `GET    /api/media` — paginated, searchable listing
//!
//! - **Asset endpoints**
//!   - `GET    /api/media/{id}` — fetch one record
//!   - `PATCH  /api/media/{id}` — update title, alt text or display name
//!   - `DELETE /api/media/{id}` — delete record and remote object
//!
//! - **Health**: `GET /healthz`, `GET /readyz`

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        media_handlers::{delete_media, get_media, list_media, update_media, upload_media},
    },
    services::library_service::LibraryService,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

/// Build the router. `upload_body_limit` caps the multipart upload body;
/// every other route keeps axum's default limit.
pub fn routes(upload_body_limit: usize) -> Router<LibraryService> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route(
            "/api/media/upload",
            post(upload_media).layer(DefaultBodyLimit::max(upload_body_limit)),
        )
        .route("/api/media", get(list_media))
        .route(
            "/api/media/{id}",
            get(get_media).patch(update_media).delete(delete_media),
        )
}

/// Router with state attached, ready to serve.
pub fn app(service: LibraryService) -> Router {
    let limit = service.upload_body_limit();
    routes(limit).with_state(service)
}
