//! Emergency fallback
//!
//! Entered when the catalog endpoint reports the origin server down. If an
//! integration layer already owns the page (its marker is present), only our
//! polling stops. Otherwise every timer is cancelled, the transport is torn
//! down and the surface switches to its chat-only fallback.

use tracing::{info, warn};

use crate::controller::SessionController;
use crate::events::SessionEvent;
use crate::scheduler::TimerKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmergencyOutcome {
    /// Fallback took over the surface
    Activated,
    /// Integration marker present; polling stopped, nothing else touched
    PollingStopped,
    /// Already entered earlier
    AlreadyActive,
}

impl SessionController {
    /// Enter emergency mode. Runs at most once per session.
    ///
    /// Synchronous: it may be called from the refresh timer it cancels.
    pub fn enter_emergency_mode(&self) -> EmergencyOutcome {
        if !self.inner.context.claim_emergency() {
            return EmergencyOutcome::AlreadyActive;
        }

        if self.inner.surface.integration_marker_present() {
            info!("Origin down, integration layer present; stopping polling only");
            self.inner.scheduler.cancel(TimerKey::CatalogRefresh);
            self.inner.scheduler.cancel(TimerKey::ThumbnailRefresh);
            return EmergencyOutcome::PollingStopped;
        }

        warn!("Origin down, entering emergency mode");
        self.teardown_for_emergency();
        self.inner.surface.activate_fallback();
        let notifier = self.inner.context.notifier();
        notifier.status("Server unreachable, chat only");
        notifier.emit(SessionEvent::EmergencyActivated);
        EmergencyOutcome::Activated
    }
}
