//! Catalog fetching

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};
use vmdesk_common::{Error, Result};

use crate::config::SessionConfig;

/// HTTP status the edge returns when the origin server is unreachable
pub const ORIGIN_DOWN_STATUS: u16 = 523;

/// Source of raw catalog payloads
#[async_trait]
pub trait CatalogFetcher: Send + Sync {
    /// Errors: `OriginDown` for the distinguished unreachable signal,
    /// `CatalogUnreachable` for transport failures and non-2xx statuses,
    /// `CatalogInvalid` for bodies that are not JSON.
    async fn fetch(&self) -> Result<Value>;

    /// The moderator overlay for this viewer. `None` when there is none.
    async fn fetch_overlay(&self) -> Result<Option<Value>> {
        Ok(None)
    }
}

/// Fetches `GET <api-root>/list`
pub struct HttpCatalogFetcher {
    client: reqwest::Client,
    url: String,
    overlay_url: Option<String>,
}

impl HttpCatalogFetcher {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(format!("http client: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
            overlay_url: None,
        })
    }

    /// Catalog and overlay endpoints as configured
    pub fn from_config(config: &SessionConfig) -> Result<Self> {
        let fetcher = Self::new(config.list_url(), config.timing.fetch_timeout)?;
        Ok(match &config.viewer.overlay_url {
            Some(url) => fetcher.with_overlay(url.clone()),
            None => fetcher,
        })
    }

    pub fn with_overlay(mut self, url: impl Into<String>) -> Self {
        self.overlay_url = Some(url.into());
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn overlay_url(&self) -> Option<&str> {
        self.overlay_url.as_deref()
    }

    async fn get_json(&self, url: &str) -> Result<Value> {
        let resp = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                Error::CatalogUnreachable(format!("timed out fetching {}", url))
            } else {
                Error::CatalogUnreachable(e.to_string())
            }
        })?;

        classify_status(resp.status())?;

        let body = resp
            .bytes()
            .await
            .map_err(|e| Error::CatalogUnreachable(e.to_string()))?;

        serde_json::from_slice(&body).map_err(|e| {
            warn!("Body from {} is not JSON: {}", url, e);
            Error::CatalogInvalid(format!("not JSON: {}", e))
        })
    }
}

#[async_trait]
impl CatalogFetcher for HttpCatalogFetcher {
    async fn fetch(&self) -> Result<Value> {
        debug!("Fetching catalog from {}", self.url);
        self.get_json(&self.url).await
    }

    async fn fetch_overlay(&self) -> Result<Option<Value>> {
        let Some(url) = &self.overlay_url else {
            return Ok(None);
        };
        debug!("Fetching moderator overlay from {}", url);
        self.get_json(url).await.map(Some)
    }
}

/// Map an HTTP status to the catalog error taxonomy
pub fn classify_status(status: StatusCode) -> Result<()> {
    if status.as_u16() == ORIGIN_DOWN_STATUS {
        return Err(Error::OriginDown);
    }
    if !status.is_success() {
        return Err(Error::CatalogUnreachable(format!("HTTP {}", status)));
    }
    Ok(())
}
