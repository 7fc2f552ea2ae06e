//! Status Command

use anyhow::Result;
use clap::Parser;
use serde::Serialize;
use vmdesk_common::store::{PASSWORD_PREFIX, RULES_ACCEPTED_AT_PREFIX, SPAWN_PREFERENCE_KEY};
use vmdesk_common::{Error, KvStore, SpawnPreference};
use vmdesk_session::{CatalogFetcher, CatalogStore, HttpCatalogFetcher, SessionConfig};

use crate::output::{print_item, print_success, OutputFormat, TableDisplay};

#[derive(Parser)]
pub struct StatusArgs {
    /// Change the start-up spawn preference (random, default)
    #[arg(long)]
    pub set_spawn: Option<SpawnPreference>,

    /// Skip the catalog reachability check
    #[arg(long)]
    pub offline: bool,
}

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub api_root: String,
    pub catalog: String,
    pub store: String,
    pub remembered_passwords: usize,
    pub accepted_rules: usize,
    pub spawn_preference: String,
}

impl TableDisplay for StatusReport {
    fn headers() -> Vec<&'static str> {
        vec!["API", "Catalog", "Store", "Passwords", "Rules accepted", "Spawn"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.api_root.clone(),
            self.catalog.clone(),
            self.store.clone(),
            self.remembered_passwords.to_string(),
            self.accepted_rules.to_string(),
            self.spawn_preference.clone(),
        ]
    }
}

async fn probe_catalog(config: &SessionConfig) -> String {
    let fetcher = match HttpCatalogFetcher::from_config(config) {
        Ok(f) => f,
        Err(e) => return format!("error: {}", e),
    };
    match fetcher.fetch().await {
        Ok(payload) => {
            let mut catalog = CatalogStore::new(config.viewer.clone());
            match catalog.replace(&payload) {
                Ok(count) => format!("online ({} VMs)", count),
                Err(e) => format!("invalid: {}", e),
            }
        }
        Err(Error::OriginDown) => "origin down".to_string(),
        Err(e) => format!("unreachable: {}", e),
    }
}

pub async fn execute(args: StatusArgs, config: &SessionConfig, format: OutputFormat) -> Result<()> {
    let store = KvStore::open(&config.store_path)?;

    if let Some(preference) = args.set_spawn {
        store.set(SPAWN_PREFERENCE_KEY, &preference.to_string())?;
        print_success(&format!("Spawn preference set to {}", preference));
    }

    let spawn_preference = store
        .get(SPAWN_PREFERENCE_KEY)?
        .and_then(|raw| raw.parse::<SpawnPreference>().ok())
        .unwrap_or_default();

    let catalog = if args.offline {
        "not checked".to_string()
    } else {
        probe_catalog(config).await
    };

    let report = StatusReport {
        api_root: config.api_root.clone(),
        catalog,
        store: config.store_path.display().to_string(),
        remembered_passwords: store.keys_with_prefix(PASSWORD_PREFIX)?.len(),
        accepted_rules: store.keys_with_prefix(RULES_ACCEPTED_AT_PREFIX)?.len(),
        spawn_preference: spawn_preference.to_string(),
    };

    print_item(&report, format);
    Ok(())
}
