//! CLI Commands

pub mod connect;
pub mod list;
pub mod status;
pub mod url;

use anyhow::{anyhow, Result};
use tracing::warn;
use vmdesk_common::Error;
use vmdesk_session::{CatalogFetcher, CatalogStore, HttpCatalogFetcher, SessionConfig};

/// Fetch and normalize the catalog once
pub async fn fetch_catalog(config: &SessionConfig) -> Result<CatalogStore> {
    let fetcher = HttpCatalogFetcher::from_config(config)?;
    let payload = fetcher.fetch().await.map_err(|e| match e {
        Error::OriginDown => anyhow!("The VM server is down right now, try again later"),
        other => anyhow!(other),
    })?;

    let mut catalog = CatalogStore::new(config.viewer.clone());
    match fetcher.fetch_overlay().await {
        Ok(Some(overlay)) => catalog.set_overlay(&overlay)?,
        Ok(None) => {}
        Err(e) => warn!("Moderator overlay unavailable: {}", e),
    }
    catalog.replace(&payload)?;
    Ok(catalog)
}
