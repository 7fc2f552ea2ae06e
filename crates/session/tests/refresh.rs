mod support;

use serde_json::{json, Value};
use std::sync::atomic::Ordering;
use support::{settle, Harness, Reply, CATALOG_LEN};
use tokio::sync::broadcast;
use vmdesk_common::SessionPhase;
use vmdesk_session::scheduler::TimerKey;
use vmdesk_session::{EmergencyOutcome, RefreshOutcome, SessionEvent, SwitchOutcome, TransportEvent};

fn drain(events: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

#[tokio::test(start_paused = true)]
async fn periodic_refresh_publishes_updates() {
    let h = Harness::loaded().await;
    let mut events = h.controller.context().subscribe();

    assert!(h.refresh.start());
    tokio::time::sleep(h.controller.config().timing.refresh_interval).await;
    settle().await;

    assert_eq!(h.fetcher.calls(), 2);
    assert!(drain(&mut events).contains(&SessionEvent::CatalogUpdated { count: CATALOG_LEN }));
}

#[tokio::test(start_paused = true)]
async fn refresh_skipped_while_browsing() {
    let h = Harness::loaded().await;
    h.surface.browser_open.store(true, Ordering::SeqCst);

    assert_eq!(h.refresh.tick().await, RefreshOutcome::Skipped);
    h.refresh.start();
    tokio::time::sleep(h.controller.config().timing.refresh_interval * 3).await;
    settle().await;
    assert_eq!(h.fetcher.calls(), 1);

    h.surface.browser_open.store(false, Ordering::SeqCst);
    tokio::time::sleep(h.controller.config().timing.refresh_interval).await;
    settle().await;
    assert_eq!(h.fetcher.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn invalid_payload_keeps_snapshot() {
    let h = Harness::loaded().await;

    for payload in [Value::Null, json!({}), json!({ "/vm/1": 5 }), json!([1, 2])] {
        h.fetcher.reply(Reply::Payload(payload));
        assert_eq!(h.refresh.refresh_once().await, RefreshOutcome::Invalid);
        assert_eq!(h.controller.catalog().read().len(), CATALOG_LEN);
    }
    assert_eq!(h.surface.banner_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn only_first_load_failure_is_surfaced() {
    let h = Harness::new();

    h.fetcher.reply(Reply::Unreachable);
    assert_eq!(h.refresh.refresh_once().await, RefreshOutcome::Failed);
    assert_eq!(h.surface.banner_count(), 1);

    h.fetcher.reply(Reply::Payload(Value::Null));
    assert_eq!(h.refresh.refresh_once().await, RefreshOutcome::Invalid);
    assert_eq!(h.surface.banner_count(), 2);
    assert!(!h.controller.catalog().read().is_loaded());

    h.fetcher.reply(Reply::Payload(support::catalog()));
    assert_eq!(
        h.refresh.refresh_once().await,
        RefreshOutcome::Updated(CATALOG_LEN)
    );

    h.fetcher.reply(Reply::Unreachable);
    assert_eq!(h.refresh.refresh_once().await, RefreshOutcome::Failed);
    assert_eq!(h.surface.banner_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn hung_fetch_times_out() {
    let h = Harness::new();
    h.fetcher.reply(Reply::Hang);

    assert_eq!(h.refresh.refresh_once().await, RefreshOutcome::Failed);
    assert_eq!(h.surface.banner_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn origin_down_enters_emergency_mode() {
    let h = Harness::loaded().await;
    h.controller.switch_to("10").await;
    h.connector.emit(0, TransportEvent::Connected);
    settle().await;

    h.refresh.start();
    h.controller.start_thumbnail_refresh();
    let mut events = h.controller.context().subscribe();

    h.fetcher.reply(Reply::OriginDown);
    tokio::time::sleep(h.controller.config().timing.refresh_interval).await;
    settle().await;

    assert_eq!(h.controller.phase(), SessionPhase::EmergencyMode);
    assert!(h.surface.fallback_active());
    assert!(h.connector.is_closed(0));
    assert!(h.controller.scheduler().pending().is_empty());
    assert!(drain(&mut events).contains(&SessionEvent::EmergencyActivated));

    // Nothing restarts
    let calls = h.fetcher.calls();
    assert_eq!(h.controller.select("10", false).await, SwitchOutcome::Halted);
    assert!(!h.refresh.start());
    tokio::time::sleep(h.controller.config().timing.refresh_interval * 4).await;
    assert_eq!(h.fetcher.calls(), calls);
    assert_eq!(h.connector.open_count(), 1);
    assert_eq!(h.controller.enter_emergency_mode(), EmergencyOutcome::AlreadyActive);
}

#[tokio::test(start_paused = true)]
async fn integration_marker_only_stops_polling() {
    let h = Harness::loaded().await;
    h.surface.marker.store(true, Ordering::SeqCst);
    h.controller.switch_to("10").await;
    h.connector.emit(0, TransportEvent::Connected);
    settle().await;

    h.refresh.start();
    h.controller.start_thumbnail_refresh();
    h.fetcher.reply(Reply::OriginDown);
    tokio::time::sleep(h.controller.config().timing.refresh_interval).await;
    settle().await;

    assert_eq!(h.controller.phase(), SessionPhase::Connected);
    assert!(!h.surface.fallback_active());
    assert!(!h.connector.is_closed(0));
    assert!(!h.controller.scheduler().is_pending(TimerKey::CatalogRefresh));
    assert!(!h.controller.scheduler().is_pending(TimerKey::ThumbnailRefresh));
    assert_eq!(h.controller.enter_emergency_mode(), EmergencyOutcome::AlreadyActive);
}

#[tokio::test(start_paused = true)]
async fn thumbnails_go_stale_periodically() {
    let h = Harness::loaded().await;
    let mut events = h.controller.context().subscribe();

    assert!(h.controller.start_thumbnail_refresh());
    tokio::time::sleep(h.controller.config().timing.thumbnail_interval).await;
    settle().await;

    assert!(drain(&mut events).contains(&SessionEvent::ThumbnailsStale));
}

#[tokio::test(start_paused = true)]
async fn moderator_overlay_applies_on_refresh() {
    let h = Harness::loaded().await;
    h.fetcher.overlay(Some(json!({
        "10": { "blacklisted": true, "blacklistReason": "whitelist" },
        "/vm/99": { "name": "Staging", "host": "staging.example.net" }
    })));

    assert_eq!(
        h.refresh.refresh_once().await,
        RefreshOutcome::Updated(CATALOG_LEN + 1)
    );
    {
        let catalog = h.controller.catalog();
        let catalog = catalog.read();
        let ten = catalog.get("10").unwrap();
        assert!(ten.access.is_blacklisted);
        assert_eq!(ten.name, "Ten");
        assert_eq!(catalog.get("99").unwrap().name, "Staging");
    }
    assert_eq!(h.controller.select("10", false).await, SwitchOutcome::Denied);
    assert_eq!(h.connector.open_count(), 0);

    h.fetcher.overlay(None);
    assert_eq!(h.refresh.refresh_once().await, RefreshOutcome::Updated(CATALOG_LEN));
    assert!(!h.controller.catalog().read().get("10").unwrap().access.is_blacklisted);
    assert_eq!(h.controller.select("10", false).await, SwitchOutcome::Started);
}
