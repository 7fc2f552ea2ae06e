//! Change notifications emitted by the session core
//!
//! The selected code is published on a `watch` channel so readers always see
//! the latest write; everything else goes out on a `broadcast` channel.

use tokio::sync::{broadcast, watch};
use tracing::trace;
use vmdesk_common::SessionPhase;

const EVENT_CAPACITY: usize = 256;

/// Events observable by UI code
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SelectionChanged(Option<String>),
    CatalogUpdated { count: usize },
    Status(String),
    PhaseChanged(SessionPhase),
    ThumbnailsStale,
    EmergencyActivated,
}

/// Fan-out point for session notifications
pub struct Notifier {
    selected: watch::Sender<Option<String>>,
    events: broadcast::Sender<SessionEvent>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier {
    pub fn new() -> Self {
        let (selected, _) = watch::channel(None);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self { selected, events }
    }

    /// Subscribe to the selected code
    pub fn watch_selected(&self) -> watch::Receiver<Option<String>> {
        self.selected.subscribe()
    }

    /// Subscribe to all events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn selected(&self) -> Option<String> {
        self.selected.borrow().clone()
    }

    /// Every write notifies, even when the code is unchanged.
    pub fn set_selected(&self, code: Option<String>) {
        self.selected.send_replace(code.clone());
        self.emit(SessionEvent::SelectionChanged(code));
    }

    pub fn status(&self, message: impl Into<String>) {
        self.emit(SessionEvent::Status(message.into()));
    }

    pub fn emit(&self, event: SessionEvent) {
        trace!("Session event: {:?}", event);
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_selection_is_observable_immediately() {
        let notifier = Notifier::new();
        let mut rx = notifier.watch_selected();
        let mut events = notifier.subscribe();

        notifier.set_selected(Some("10".to_string()));

        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().as_deref(), Some("10"));
        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::SelectionChanged(Some("10".to_string()))
        );
        assert_eq!(notifier.selected().as_deref(), Some("10"));
    }

    #[test]
    fn test_emit_without_subscribers() {
        let notifier = Notifier::new();
        notifier.status("Connecting…");
        notifier.set_selected(None);
        assert_eq!(notifier.selected(), None);
    }
}
