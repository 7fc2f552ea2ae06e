mod support;

use support::{settle, Harness};
use tokio::sync::broadcast;
use vmdesk_common::SessionPhase;
use vmdesk_session::scheduler::TimerKey;
use vmdesk_session::{PasswordPrompt, SessionEvent, SwitchOutcome, TransportEvent};

fn statuses(events: &mut broadcast::Receiver<SessionEvent>) -> Vec<String> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let SessionEvent::Status(message) = event {
            seen.push(message);
        }
    }
    seen
}

async fn connected() -> Harness {
    let h = Harness::loaded().await;
    assert_eq!(h.controller.switch_to("10").await, SwitchOutcome::Started);
    h.connector.emit(0, TransportEvent::Connected);
    settle().await;
    assert_eq!(h.controller.phase(), SessionPhase::Connected);
    h
}

#[tokio::test(start_paused = true)]
async fn unclean_disconnect_reconnects_and_resets_counter() {
    let h = connected().await;
    let delay = h.controller.config().timing.reconnect_delay;
    let mut events = h.controller.context().subscribe();

    h.connector.emit(0, TransportEvent::Disconnected { clean: false });
    settle().await;
    assert_eq!(h.controller.phase(), SessionPhase::Disconnected);
    assert!(h.controller.scheduler().is_pending(TimerKey::Reconnect));
    assert!(statuses(&mut events).contains(&"Connection lost".to_string()));

    tokio::time::sleep(delay).await;
    settle().await;
    assert_eq!(h.connector.open_count(), 2);
    assert_eq!(h.controller.context().retry_count(), 1);
    assert_eq!(h.controller.phase(), SessionPhase::Reconnecting);
    assert!(statuses(&mut events).contains(&"Reconnecting… (1)".to_string()));

    // Second attempt drops before connecting
    h.connector.emit(1, TransportEvent::Disconnected { clean: false });
    settle().await;
    tokio::time::sleep(delay).await;
    settle().await;
    assert_eq!(h.connector.open_count(), 3);
    assert_eq!(h.controller.context().retry_count(), 2);

    h.connector.emit(2, TransportEvent::Connected);
    settle().await;
    assert_eq!(h.controller.phase(), SessionPhase::Connected);
    assert_eq!(h.controller.context().retry_count(), 0);
    assert!(!h.controller.scheduler().is_pending(TimerKey::Reconnect));
    assert!(statuses(&mut events).contains(&"Connected to Ten".to_string()));
}

#[tokio::test(start_paused = true)]
async fn failed_reconnect_reschedules() {
    let h = connected().await;
    let delay = h.controller.config().timing.reconnect_delay;
    let mut events = h.controller.context().subscribe();

    h.connector.fail_next(1);
    h.connector.emit(0, TransportEvent::Disconnected { clean: false });
    settle().await;

    tokio::time::sleep(delay).await;
    settle().await;
    assert_eq!(h.connector.open_count(), 1);
    assert!(h.controller.scheduler().is_pending(TimerKey::Reconnect));
    assert!(statuses(&mut events).contains(&"Reconnect failed… Retrying".to_string()));

    tokio::time::sleep(delay).await;
    settle().await;
    assert_eq!(h.connector.open_count(), 2);
    assert_eq!(h.controller.context().retry_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn reconnect_is_noop_while_transport_live() {
    let h = connected().await;

    h.controller.try_reconnect().await;

    assert_eq!(h.connector.open_count(), 1);
    assert_eq!(h.controller.context().retry_count(), 0);
    assert_eq!(h.controller.phase(), SessionPhase::Connected);
}

#[tokio::test(start_paused = true)]
async fn reconnect_timer_is_not_stacked() {
    let h = connected().await;
    h.connector.emit(0, TransportEvent::Disconnected { clean: true });
    settle().await;

    assert!(!h.controller.schedule_reconnect());
    h.controller.try_reconnect().await;
    assert_eq!(h.connector.open_count(), 1);

    tokio::time::sleep(h.controller.config().timing.reconnect_delay).await;
    settle().await;
    assert_eq!(h.connector.open_count(), 2);
    assert_eq!(h.controller.context().retry_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn user_disconnect_does_not_reconnect() {
    let h = connected().await;

    h.controller.disconnect();
    tokio::time::sleep(h.controller.config().timing.reconnect_delay * 3).await;

    assert!(h.connector.is_closed(0));
    assert_eq!(h.connector.open_count(), 1);
    assert_eq!(h.controller.phase(), SessionPhase::Disconnected);
    assert_eq!(h.controller.selected().as_deref(), Some("10"));
}

#[tokio::test(start_paused = true)]
async fn switch_cancels_pending_reconnect() {
    let h = connected().await;
    h.connector.emit(0, TransportEvent::Disconnected { clean: false });
    settle().await;
    assert!(h.controller.scheduler().is_pending(TimerKey::Reconnect));

    assert_eq!(h.controller.switch_to("9").await, SwitchOutcome::Started);
    assert!(!h.controller.scheduler().is_pending(TimerKey::Reconnect));

    tokio::time::sleep(h.controller.config().timing.reconnect_delay * 2).await;
    assert_eq!(h.connector.open_count(), 2);
    assert_eq!(h.controller.context().retry_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn drop_during_cancelled_switch_still_reconnects() {
    let h = connected().await;
    let delay = h.controller.config().timing.reconnect_delay;

    let answer = h.prompts.hold_password();
    let switching = tokio::spawn({
        let controller = h.controller.clone();
        async move { controller.switch_to("11").await }
    });
    settle().await;
    assert!(h.controller.context().switch_in_flight());

    // The old transport drops while the prompt is open
    h.connector.emit(0, TransportEvent::Disconnected { clean: false });
    settle().await;
    tokio::time::sleep(delay).await;
    settle().await;
    assert_eq!(h.connector.open_count(), 1);
    assert!(h.controller.scheduler().is_pending(TimerKey::Reconnect));

    let _ = answer.send(PasswordPrompt::Cancelled);
    assert_eq!(switching.await.unwrap(), SwitchOutcome::Cancelled);
    assert_eq!(h.controller.selected().as_deref(), Some("10"));
    assert_eq!(h.controller.phase(), SessionPhase::Disconnected);
    assert!(!h.controller.context().has_transport());
    assert!(h.controller.scheduler().is_pending(TimerKey::Reconnect));

    tokio::time::sleep(delay).await;
    settle().await;
    assert_eq!(h.connector.open_count(), 2);
    assert!(h.connector.url(1).contains("/vnc/10"));

    h.connector.emit(1, TransportEvent::Connected);
    settle().await;
    assert_eq!(h.controller.phase(), SessionPhase::Connected);
}

#[tokio::test(start_paused = true)]
async fn cancelled_switch_keeps_live_transport() {
    let h = connected().await;
    h.prompts.answer_password(PasswordPrompt::Cancelled);

    assert_eq!(h.controller.switch_to("11").await, SwitchOutcome::Cancelled);
    assert_eq!(h.controller.selected().as_deref(), Some("10"));
    assert_eq!(h.controller.phase(), SessionPhase::Connected);
    assert!(!h.connector.is_closed(0));
    assert!(!h.controller.scheduler().is_pending(TimerKey::Reconnect));
}
