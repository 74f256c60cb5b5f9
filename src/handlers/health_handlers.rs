//! Health & readiness handlers.
//!
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /readyz   -> readiness that checks the metadata store and the object store

use crate::services::library_service::LibraryService;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::{collections::HashMap, time::Duration};
use tokio::time::timeout;

const CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// `GET /healthz`
///
/// Liveness only; never touches either store.
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
        }),
    )
}

/// `GET /readyz`
///
/// Pings the metadata repository and the object store. HTTP 200 when both
/// answer, HTTP 503 when either fails or does not answer in time.
pub async fn readyz(State(service): State<LibraryService>) -> impl IntoResponse {
    let (metadata, object_store) = tokio::join!(
        timeout(CHECK_TIMEOUT, service.repository.ping()),
        timeout(CHECK_TIMEOUT, service.store.health_check()),
    );

    let metadata_check = match metadata {
        Ok(Ok(())) => CheckStatus::ok(),
        Ok(Err(e)) => CheckStatus::failed(format!("error: {e}")),
        Err(_) => CheckStatus::failed("timed out".into()),
    };
    let store_check = match object_store {
        Ok(Ok(())) => CheckStatus::ok(),
        Ok(Err(e)) => CheckStatus::failed(format!("error: {e}")),
        Err(_) => CheckStatus::failed("timed out".into()),
    };

    let overall_ok = metadata_check.ok && store_check.ok;

    let mut checks = HashMap::new();
    checks.insert("metadata", metadata_check);
    checks.insert("object_store", store_check);

    let body = ReadyResponse {
        status: if overall_ok {
            "ok".into()
        } else {
            "error".into()
        },
        checks,
    };

    let status = if overall_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    checks: HashMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}

impl CheckStatus {
    fn ok() -> Self {
        Self {
            ok: true,
            error: None,
        }
    }

    fn failed(error: String) -> Self {
        Self {
            ok: false,
            error: Some(error),
        }
    }
}
