//! HTTP client for the console REST backend.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use shared::{
    error::ApiError,
    protocol::{AccessIdRecord, WorkbasketPage, WorkbasketQueryParameters},
};
use tracing::{debug, warn};
use url::Url;

use crate::{error::TransportError, AccessIdSearch, WorkbasketQuery};

const WORKBASKETS_ENDPOINT: &str = "v1/workbaskets";
const ACCESS_IDS_ENDPOINT: &str = "v1/access-ids";

#[derive(Clone)]
pub struct HttpConsoleApi {
    http: Client,
    base_url: Url,
}

impl HttpConsoleApi {
    /// `base_url` is the REST root, e.g. `http://localhost:8080/kadai/api`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let normalized = format!("{}/", base_url.trim_end_matches('/'));
        let parsed = Url::parse(&normalized).map_err(|source| TransportError::InvalidBaseUrl {
            url: base_url.to_string(),
            source,
        })?;
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| TransportError::Request {
                endpoint: "client",
                source,
            })?;
        Ok(Self {
            http,
            base_url: parsed,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        query: &[(String, String)],
    ) -> Result<T, TransportError> {
        let url = self
            .base_url
            .join(endpoint)
            .map_err(|source| TransportError::InvalidBaseUrl {
                url: self.base_url.to_string(),
                source,
            })?;
        debug!(%url, params = query.len(), "console api request");

        let response = self
            .http
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|source| TransportError::Request { endpoint, source })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let error = serde_json::from_str::<ApiError>(&body).unwrap_or_else(|_| {
                let message = if body.trim().is_empty() {
                    status.canonical_reason().unwrap_or("request failed").to_string()
                } else {
                    body.trim().to_string()
                };
                ApiError::from_status(status.as_u16(), message)
            });
            warn!(endpoint, status = status.as_u16(), message = %error.message, "console api error");
            return Err(TransportError::Api {
                endpoint,
                status: status.as_u16(),
                error,
            });
        }

        response
            .json()
            .await
            .map_err(|source| TransportError::Decode { endpoint, source })
    }
}

#[async_trait]
impl WorkbasketQuery for HttpConsoleApi {
    async fn query_workbaskets(&self, params: &WorkbasketQueryParameters) -> Result<WorkbasketPage> {
        let page = self
            .get_json(WORKBASKETS_ENDPOINT, &params.query_pairs())
            .await?;
        Ok(page)
    }
}

#[async_trait]
impl AccessIdSearch for HttpConsoleApi {
    async fn search_for_access_id(&self, query: &str) -> Result<Vec<AccessIdRecord>> {
        let records = self
            .get_json(
                ACCESS_IDS_ENDPOINT,
                &[("search-for".to_string(), query.to_string())],
            )
            .await?;
        Ok(records)
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
