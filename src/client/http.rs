//! Thin reqwest client for the catalog listing endpoint.

use crate::{
    client::cache::{IncrementalCache, MergeOutcome},
    models::catalog::{CatalogQuery, CatalogResponse},
};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("connection error: {0}")]
    Connection(#[from] reqwest::Error),

    /// The server answered with an error body.
    #[error("HTTP {status} [{kind}]: {message}")]
    Api {
        status: u16,
        kind: String,
        message: String,
    },

    #[error("failed to deserialize response: {0}")]
    Deserialization(String),
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
    kind: String,
}

#[derive(Clone, Debug)]
pub struct LibraryClient {
    client: Client,
    base_url: String,
}

impl LibraryClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Fetch one catalog page.
    pub async fn list(&self, query: &CatalogQuery) -> Result<CatalogResponse, ClientError> {
        let url = format!("{}/api/media", self.base_url);
        debug!(%url, page = query.page, "fetching catalog page");

        let response = self.client.get(&url).query(query).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(match serde_json::from_str::<ErrorBody>(&text) {
                Ok(body) => ClientError::Api {
                    status: status.as_u16(),
                    kind: body.kind,
                    message: body.error,
                },
                Err(_) => ClientError::Api {
                    status: status.as_u16(),
                    kind: "unknown".into(),
                    message: text,
                },
            });
        }

        response
            .json()
            .await
            .map_err(|err| ClientError::Deserialization(err.to_string()))
    }

    /// Fetch `query` and merge the result into `cache`. A query whose
    /// filters differ from the cached ones is fetched from page 1.
    pub async fn load_into(
        &self,
        cache: &mut IncrementalCache,
        query: &CatalogQuery,
    ) -> Result<MergeOutcome, ClientError> {
        let request = cache.request_for(query);
        let response = self.list(&request).await?;
        Ok(cache.apply(&request, response))
    }

    /// Fetch the page after the last one in `cache` for `query`'s filters.
    pub async fn load_next(
        &self,
        cache: &mut IncrementalCache,
        query: &CatalogQuery,
    ) -> Result<MergeOutcome, ClientError> {
        let next = cache.next_query(query);
        let response = self.list(&next).await?;
        Ok(cache.apply(&next, response))
    }
}
