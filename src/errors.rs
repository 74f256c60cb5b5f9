use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use std::fmt;
use thiserror::Error;

/// Failure taxonomy shared by ingestion, deletion and catalog operations.
///
/// Every variant carries enough context (entry index, asset id, public id)
/// for an operator to tell what happened without reading logs.
#[derive(Debug, Error)]
pub enum LibraryError {
    /// Malformed input; nothing was processed.
    #[error("{0}")]
    Validation(String),

    /// The object store failed or timed out. `orphaned` lists objects from
    /// the same batch that are still stored remotely.
    #[error("remote store error{}: {message}", entry_suffix(.index))]
    RemoteStore {
        index: Option<usize>,
        message: String,
        orphaned: Vec<String>,
    },

    /// The metadata store failed. `orphaned` lists remote objects that now
    /// exist without a metadata row.
    #[error("metadata store error: {message}")]
    Persistence {
        message: String,
        orphaned: Vec<String>,
    },

    #[error("asset {0} not found")]
    NotFound(i64),

    /// Metadata was removed but the remote object may still exist.
    #[error("asset {id} removed but remote object `{public_id}` was not deleted: {message}")]
    PartialFailure {
        id: i64,
        public_id: String,
        message: String,
    },
}

fn entry_suffix(index: &Option<usize>) -> String {
    index
        .map(|i| format!(" for entry {i}"))
        .unwrap_or_default()
}

impl LibraryError {
    /// Stable machine-readable kind, echoed in every error response.
    pub fn kind(&self) -> &'static str {
        match self {
            LibraryError::Validation(_) => "validation_error",
            LibraryError::RemoteStore { .. } => "remote_store_error",
            LibraryError::Persistence { .. } => "persistence_error",
            LibraryError::NotFound(_) => "not_found",
            LibraryError::PartialFailure { .. } => "partial_failure",
        }
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        LibraryError::Persistence {
            message: message.into(),
            orphaned: Vec::new(),
        }
    }
}

/// A lightweight wrapper for errors that leave through the HTTP layer.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub kind: &'static str,
    pub message: String,
    pub details: Option<Value>,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, kind: &'static str, msg: impl Into<String>) -> Self {
        Self {
            status,
            kind,
            message: msg.into(),
            details: None,
        }
    }

    /// Shortcut for 400 Bad Request
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "validation_error", msg)
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut body = json!({
            "error": self.message,
            "kind": self.kind,
            "status": self.status.as_u16()
        });
        if let Some(details) = self.details {
            body["details"] = details;
        }

        (self.status, Json(body)).into_response()
    }
}

impl From<LibraryError> for AppError {
    fn from(err: LibraryError) -> Self {
        let kind = err.kind();
        let message = err.to_string();
        match err {
            LibraryError::Validation(_) => AppError::new(StatusCode::BAD_REQUEST, kind, message),
            LibraryError::NotFound(id) => AppError::new(StatusCode::NOT_FOUND, kind, message)
                .with_details(json!({ "id": id })),
            LibraryError::RemoteStore {
                index, orphaned, ..
            } => AppError::new(StatusCode::BAD_GATEWAY, kind, message)
                .with_details(json!({ "index": index, "orphanedPublicIds": orphaned })),
            LibraryError::PartialFailure { id, public_id, .. } => {
                AppError::new(StatusCode::BAD_GATEWAY, kind, message)
                    .with_details(json!({ "id": id, "publicId": public_id }))
            }
            LibraryError::Persistence { orphaned, .. } => {
                AppError::new(StatusCode::INTERNAL_SERVER_ERROR, kind, message)
                    .with_details(json!({ "orphanedPublicIds": orphaned }))
            }
        }
    }
}
