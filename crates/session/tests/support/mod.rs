//! Scripted collaborators for session tests
#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use url::Url;
use vmdesk_common::{Error, KvStore, Result, VmDescriptor};
use vmdesk_session::config::SessionConfig;
use vmdesk_session::transport::EventSink;
use vmdesk_session::{
    CatalogFetcher, ConsentChoice, ListRefreshScheduler, PasswordPrompt, Prompts, RefreshOutcome,
    SessionController, SessionDeps, Surface, TransportConnector, TransportEvent, TransportHandle,
    TransportStatus,
};

/// Published catalog used across the session tests
pub fn catalog() -> Value {
    json!({
        "/vm/7": { "name": "Seven", "host": "node7.example.net", "path": "/vnc/7", "rules": ["Be nice"] },
        "/vm/8": { "name": "Eight", "host": "node8.example.net", "path": "/vnc/8", "rules": ["No bots"], "prompt": "Why are you here?" },
        "/vm/9": { "name": "Nine", "host": "node9.example.net", "path": "/vnc/9", "private": true },
        "/vm/10": { "name": "Ten", "host": "node1.example.net", "path": "/vnc/10", "password": "websim2" },
        "/vm/11": { "name": "Eleven", "host": "node11.example.net", "path": "/vnc/11", "password": true, "private": true },
        "/vm/12": { "name": "Twelve", "host": "node12.example.net", "blacklisted": true, "blacklistReason": "spam" },
        "/vm/30": { "name": "Thirty", "url": "https://embed.example.net/30", "private": true }
    })
}

pub const CATALOG_LEN: usize = 7;

pub fn config() -> SessionConfig {
    SessionConfig {
        api_root: "https://vms.example.net/api".to_string(),
        origin: "https://vms.example.net".to_string(),
        username: "guest user".to_string(),
        ..Default::default()
    }
}

/// Let spawned tasks drain their queues
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

// ============================================================================
// Prompts
// ============================================================================

#[derive(Default)]
pub struct ScriptedPrompts {
    passwords: Mutex<VecDeque<PasswordPrompt>>,
    rules: Mutex<VecDeque<ConsentChoice>>,
    held: Mutex<Option<oneshot::Receiver<PasswordPrompt>>>,
    pub password_requests: Mutex<Vec<String>>,
    pub rules_shown: Mutex<Vec<String>>,
    pub blacklist_notices: Mutex<Vec<String>>,
}

impl ScriptedPrompts {
    pub fn answer_password(&self, answer: PasswordPrompt) {
        self.passwords.lock().push_back(answer);
    }

    /// Keep the next password prompt open until the returned sender answers
    pub fn hold_password(&self) -> oneshot::Sender<PasswordPrompt> {
        let (tx, rx) = oneshot::channel();
        *self.held.lock() = Some(rx);
        tx
    }

    pub fn answer_rules(&self, answer: ConsentChoice) {
        self.rules.lock().push_back(answer);
    }

    pub fn rules_shown(&self) -> Vec<String> {
        self.rules_shown.lock().clone()
    }
}

#[async_trait]
impl Prompts for ScriptedPrompts {
    async fn request_password(&self, vm: &VmDescriptor) -> PasswordPrompt {
        self.password_requests.lock().push(vm.code.clone());
        let held = self.held.lock().take();
        if let Some(answer) = held {
            return answer.await.unwrap_or(PasswordPrompt::Cancelled);
        }
        self.passwords
            .lock()
            .pop_front()
            .unwrap_or(PasswordPrompt::Cancelled)
    }

    async fn show_rules(&self, vm: &VmDescriptor) -> ConsentChoice {
        self.rules_shown.lock().push(vm.code.clone());
        self.rules.lock().pop_front().unwrap_or(ConsentChoice::Declined)
    }

    async fn show_blacklist_notice(&self, _vm: &VmDescriptor, message: &str) {
        self.blacklist_notices.lock().push(message.to_string());
    }
}

// ============================================================================
// Surface
// ============================================================================

#[derive(Default)]
pub struct RecordingSurface {
    pub browser_open: AtomicBool,
    pub marker: AtomicBool,
    pub clears: AtomicUsize,
    pub notices: Mutex<Vec<String>>,
    pub banners: Mutex<Vec<String>>,
    pub fallback: AtomicBool,
}

impl RecordingSurface {
    pub fn banner_count(&self) -> usize {
        self.banners.lock().len()
    }

    pub fn fallback_active(&self) -> bool {
        self.fallback.load(Ordering::SeqCst)
    }
}

impl Surface for RecordingSurface {
    fn catalog_browser_open(&self) -> bool {
        self.browser_open.load(Ordering::SeqCst)
    }

    fn integration_marker_present(&self) -> bool {
        self.marker.load(Ordering::SeqCst)
    }

    fn clear_display(&self) {
        self.clears.fetch_add(1, Ordering::SeqCst);
    }

    fn show_notice(&self, message: &str) {
        self.notices.lock().push(message.to_string());
    }

    fn show_error_banner(&self, message: &str) {
        self.banners.lock().push(message.to_string());
    }

    fn activate_fallback(&self) {
        self.fallback.store(true, Ordering::SeqCst);
    }
}

// ============================================================================
// Transport
// ============================================================================

pub struct MockHandle {
    status: Arc<Mutex<TransportStatus>>,
    credentials: Arc<Mutex<Vec<String>>>,
}

impl TransportHandle for MockHandle {
    fn status(&self) -> TransportStatus {
        *self.status.lock()
    }

    fn send_credentials(&self, password: &str) {
        self.credentials.lock().push(password.to_string());
    }

    fn close(&self) {
        *self.status.lock() = TransportStatus::Closed;
    }
}

/// Test-side view of an opened handle
pub struct OpenedTransport {
    pub url: Url,
    pub sink: EventSink,
    pub status: Arc<Mutex<TransportStatus>>,
    pub credentials: Arc<Mutex<Vec<String>>>,
}

#[derive(Default)]
pub struct MockConnector {
    opened: Mutex<Vec<OpenedTransport>>,
    failures: AtomicUsize,
}

impl MockConnector {
    pub fn open_count(&self) -> usize {
        self.opened.lock().len()
    }

    /// Fail the next `n` opens
    pub fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    pub fn url(&self, index: usize) -> String {
        self.opened.lock()[index].url.to_string()
    }

    pub fn is_closed(&self, index: usize) -> bool {
        *self.opened.lock()[index].status.lock() == TransportStatus::Closed
    }

    pub fn credentials(&self, index: usize) -> Vec<String> {
        self.opened.lock()[index].credentials.lock().clone()
    }

    /// Report an event from the handle opened at `index`
    pub fn emit(&self, index: usize, event: TransportEvent) {
        let opened = self.opened.lock();
        let transport = &opened[index];
        match event {
            TransportEvent::Connected => *transport.status.lock() = TransportStatus::Connected,
            TransportEvent::Disconnected { .. } => *transport.status.lock() = TransportStatus::Closed,
            TransportEvent::CredentialsRequired => {}
        }
        let _ = transport.sink.send(event);
    }
}

impl TransportConnector for MockConnector {
    fn open(&self, url: &Url, events: EventSink) -> Result<Box<dyn TransportHandle>> {
        let failures = self.failures.load(Ordering::SeqCst);
        if failures > 0 {
            self.failures.store(failures - 1, Ordering::SeqCst);
            return Err(Error::TransportFailure("scripted failure".to_string()));
        }

        let status = Arc::new(Mutex::new(TransportStatus::Connecting));
        let credentials = Arc::new(Mutex::new(Vec::new()));
        self.opened.lock().push(OpenedTransport {
            url: url.clone(),
            sink: events,
            status: status.clone(),
            credentials: credentials.clone(),
        });
        Ok(Box::new(MockHandle { status, credentials }))
    }
}

// ============================================================================
// Fetcher
// ============================================================================

#[derive(Debug, Clone)]
pub enum Reply {
    Payload(Value),
    OriginDown,
    Unreachable,
    Hang,
}

pub struct MockFetcher {
    reply: Mutex<Reply>,
    overlay: Mutex<Option<Value>>,
    pub calls: AtomicUsize,
}

impl MockFetcher {
    pub fn new(reply: Reply) -> Self {
        Self {
            reply: Mutex::new(reply),
            overlay: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn reply(&self, reply: Reply) {
        *self.reply.lock() = reply;
    }

    pub fn overlay(&self, overlay: Option<Value>) {
        *self.overlay.lock() = overlay;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CatalogFetcher for MockFetcher {
    async fn fetch(&self) -> Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = self.reply.lock().clone();
        match reply {
            Reply::Payload(value) => Ok(value),
            Reply::OriginDown => Err(Error::OriginDown),
            Reply::Unreachable => Err(Error::CatalogUnreachable("connection refused".to_string())),
            Reply::Hang => futures::future::pending().await,
        }
    }

    async fn fetch_overlay(&self) -> Result<Option<Value>> {
        Ok(self.overlay.lock().clone())
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub controller: SessionController,
    pub refresh: ListRefreshScheduler,
    pub prompts: Arc<ScriptedPrompts>,
    pub surface: Arc<RecordingSurface>,
    pub connector: Arc<MockConnector>,
    pub fetcher: Arc<MockFetcher>,
    pub store: KvStore,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(config(), "")
    }

    pub fn with_query(query: &str) -> Self {
        Self::build(config(), query)
    }

    pub fn build(config: SessionConfig, query: &str) -> Self {
        let prompts = Arc::new(ScriptedPrompts::default());
        let surface = Arc::new(RecordingSurface::default());
        let connector = Arc::new(MockConnector::default());
        let fetcher = Arc::new(MockFetcher::new(Reply::Payload(catalog())));
        let store = KvStore::open_memory().expect("memory store");

        let deps = SessionDeps::new(prompts.clone(), surface.clone(), connector.clone(), store.clone());
        let controller = SessionController::new(config, deps, query);
        let refresh = ListRefreshScheduler::new(controller.clone(), fetcher.clone());

        Self {
            controller,
            refresh,
            prompts,
            surface,
            connector,
            fetcher,
            store,
        }
    }

    /// A harness whose catalog has loaded once
    pub async fn loaded() -> Self {
        let harness = Self::new();
        harness.load().await;
        harness
    }

    pub async fn load(&self) {
        assert_eq!(
            self.refresh.refresh_once().await,
            RefreshOutcome::Updated(CATALOG_LEN)
        );
    }
}
