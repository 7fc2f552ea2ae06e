//! Periodic catalog refresh

use std::sync::Arc;
use tracing::{debug, info, warn};
use vmdesk_common::{Error, Result};

use crate::controller::SessionController;
use crate::emergency::EmergencyOutcome;
use crate::events::SessionEvent;
use crate::fetch::CatalogFetcher;
use crate::scheduler::TimerKey;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Catalog replaced with this many entries
    Updated(usize),
    /// Catalog browser open; tick skipped
    Skipped,
    /// Payload rejected; previous snapshot kept
    Invalid,
    /// Fetch failed or timed out
    Failed,
    /// Origin server down; emergency mode entered
    OriginDown,
    /// Emergency mode already entered
    Stopped,
}

/// Polls the catalog endpoint on a fixed interval
#[derive(Clone)]
pub struct ListRefreshScheduler {
    controller: SessionController,
    fetcher: Arc<dyn CatalogFetcher>,
}

impl ListRefreshScheduler {
    pub fn new(controller: SessionController, fetcher: Arc<dyn CatalogFetcher>) -> Self {
        Self { controller, fetcher }
    }

    /// Install the refresh timer. First tick fires one interval from now.
    pub fn start(&self) -> bool {
        if self.controller.context().emergency_entered() {
            return false;
        }
        let this = self.clone();
        let interval = self.controller.config().timing.refresh_interval;
        let installed = self
            .controller
            .scheduler()
            .schedule_every(TimerKey::CatalogRefresh, interval, move || {
                let this = this.clone();
                async move {
                    this.tick().await;
                }
            });
        if installed {
            info!("Catalog refresh every {:?}", interval);
        }
        installed
    }

    pub fn stop(&self) {
        self.controller.scheduler().cancel(TimerKey::CatalogRefresh);
    }

    /// A timer tick: skipped while the user is browsing the catalog.
    pub async fn tick(&self) -> RefreshOutcome {
        if self.controller.inner.surface.catalog_browser_open() {
            debug!("Catalog browser open, skipping refresh");
            return RefreshOutcome::Skipped;
        }
        self.refresh_once().await
    }

    /// Fetch and apply the catalog once.
    pub async fn refresh_once(&self) -> RefreshOutcome {
        if self.controller.context().emergency_entered() {
            return RefreshOutcome::Stopped;
        }

        match self.fetch().await {
            Ok(payload) => {
                let overlay = self.fetch_overlay().await;
                let applied = {
                    let mut catalog = self.controller.inner.catalog.write();
                    match overlay {
                        Ok(Some(raw)) => {
                            if let Err(e) = catalog.set_overlay(&raw) {
                                warn!("Ignoring moderator overlay: {}", e);
                            }
                        }
                        Ok(None) => catalog.clear_overlay(),
                        Err(e) => debug!("Moderator overlay unavailable, keeping previous: {}", e),
                    }
                    catalog.replace(&payload)
                };
                match applied {
                    Ok(count) => {
                        debug!("Catalog refreshed: {} entries", count);
                        self.controller
                            .context()
                            .notifier()
                            .emit(SessionEvent::CatalogUpdated { count });
                        RefreshOutcome::Updated(count)
                    }
                    Err(e) => {
                        self.report_failure(&e);
                        RefreshOutcome::Invalid
                    }
                }
            }
            Err(e) if e.is_terminal() => {
                warn!("Catalog fetch: {}", e);
                self.stop();
                if self.controller.enter_emergency_mode() == EmergencyOutcome::AlreadyActive {
                    return RefreshOutcome::Stopped;
                }
                RefreshOutcome::OriginDown
            }
            Err(e) => {
                self.report_failure(&e);
                RefreshOutcome::Failed
            }
        }
    }

    async fn fetch(&self) -> Result<serde_json::Value> {
        let timeout = self.controller.config().timing.fetch_timeout;
        match tokio::time::timeout(timeout, self.fetcher.fetch()).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                seconds: timeout.as_secs(),
            }),
        }
    }

    async fn fetch_overlay(&self) -> Result<Option<serde_json::Value>> {
        let timeout = self.controller.config().timing.fetch_timeout;
        match tokio::time::timeout(timeout, self.fetcher.fetch_overlay()).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                seconds: timeout.as_secs(),
            }),
        }
    }

    /// Only the first load is surfaced; later failures keep the last snapshot.
    fn report_failure(&self, error: &Error) {
        if self.controller.inner.catalog.read().is_loaded() {
            debug!("Catalog refresh failed, keeping previous list: {}", error);
            return;
        }
        warn!("Initial catalog load failed: {}", error);
        self.controller
            .inner
            .surface
            .show_error_banner(&format!("Could not load the VM list: {}", error));
    }
}
