//! Session controller
//!
//! Owns the selected VM and the transport handle, and drives
//! `Idle → Connecting → Connected → Disconnected → Reconnecting → …`.
//! Banned and EmergencyMode are terminal.
//!
//! Only one switch runs at a time. The single-flight flag is taken
//! synchronously before the first suspension point and released by
//! [`SwitchGuard`] on every exit path. Later requests are dropped, not queued.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};
use vmdesk_common::store::SPAWN_PREFERENCE_KEY;
use vmdesk_common::{ConnectionKind, KvStore, Result, SessionPhase, SpawnPreference, VmDescriptor};

use crate::access::AccessGuard;
use crate::catalog::{CatalogStore, SharedCatalog};
use crate::clock::{Clock, SystemClock};
use crate::config::SessionConfig;
use crate::consent::{ConsentGate, ConsentOutcome};
use crate::credentials::CredentialVault;
use crate::events::{Notifier, SessionEvent};
use crate::scheduler::{Scheduler, TimerKey};
use crate::transport::{
    connection_url, TransportConnector, TransportEvent, TransportHandle, TransportStatus,
};
use crate::ui::{Prompts, Surface};
use crate::ws::redact;

const UNSUPPORTED_NOTICE: &str = "This VM runs an unsupported OS and cannot be opened here.";

/// How a switch or selection ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchOutcome {
    /// Transport handle opened; waiting for it to report connected
    Started,
    /// Embedded VM marked connected
    Embedded,
    /// Another switch was in flight
    Dropped,
    /// Catalog not loaded yet; retry scheduled
    Deferred,
    /// Unknown code
    Unsupported,
    /// Blacklisted or admin-disabled
    Denied,
    /// Rules declined with nowhere else to go
    Declined,
    /// Password prompt cancelled
    Cancelled,
    /// Transport could not be opened; reconnect scheduled
    Failed,
    /// Banned or in emergency mode
    Halted,
}

/// External collaborators
pub struct SessionDeps {
    pub prompts: Arc<dyn Prompts>,
    pub surface: Arc<dyn Surface>,
    pub connector: Arc<dyn TransportConnector>,
    pub store: KvStore,
    pub clock: Arc<dyn Clock>,
}

impl SessionDeps {
    pub fn new(
        prompts: Arc<dyn Prompts>,
        surface: Arc<dyn Surface>,
        connector: Arc<dyn TransportConnector>,
        store: KvStore,
    ) -> Self {
        Self {
            prompts,
            surface,
            connector,
            store,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

struct LiveTransport {
    generation: u64,
    code: String,
    handle: Box<dyn TransportHandle>,
    pump: JoinHandle<()>,
}

impl LiveTransport {
    fn shutdown(self) {
        self.handle.close();
        self.pump.abort();
        debug!("Closed transport #{} for {}", self.generation, self.code);
    }
}

struct SessionState {
    phase: SessionPhase,
    transport: Option<LiveTransport>,
    switch_in_flight: bool,
    retry_count: u32,
    emergency_entered: bool,
    next_generation: u64,
}

/// Process-wide session state. The controller is the only writer.
pub struct SessionContext {
    state: Mutex<SessionState>,
    notifier: Notifier,
}

impl SessionContext {
    fn new() -> Self {
        Self {
            state: Mutex::new(SessionState {
                phase: SessionPhase::Idle,
                transport: None,
                switch_in_flight: false,
                retry_count: 0,
                emergency_entered: false,
                next_generation: 1,
            }),
            notifier: Notifier::new(),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.lock().phase
    }

    pub fn selected(&self) -> Option<String> {
        self.notifier.selected()
    }

    pub fn retry_count(&self) -> u32 {
        self.state.lock().retry_count
    }

    pub fn switch_in_flight(&self) -> bool {
        self.state.lock().switch_in_flight
    }

    pub fn emergency_entered(&self) -> bool {
        self.state.lock().emergency_entered
    }

    /// Code of the VM the live transport belongs to
    pub fn transport_code(&self) -> Option<String> {
        self.state.lock().transport.as_ref().map(|t| t.code.clone())
    }

    pub fn has_transport(&self) -> bool {
        self.state.lock().transport.is_some()
    }

    pub fn watch_selected(&self) -> watch::Receiver<Option<String>> {
        self.notifier.watch_selected()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.notifier.subscribe()
    }

    /// False if emergency mode was already entered
    pub(crate) fn claim_emergency(&self) -> bool {
        let mut state = self.state.lock();
        !std::mem::replace(&mut state.emergency_entered, true)
    }

    pub(crate) fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    fn set_phase(&self, phase: SessionPhase) {
        let changed = {
            let mut state = self.state.lock();
            let changed = state.phase != phase;
            state.phase = phase;
            changed
        };
        if changed {
            debug!("Session phase -> {}", phase);
            self.notifier.emit(SessionEvent::PhaseChanged(phase));
        }
    }
}

/// Releases the single-flight flag when dropped
struct SwitchGuard<'a> {
    context: &'a SessionContext,
}

impl<'a> SwitchGuard<'a> {
    fn acquire(context: &'a SessionContext) -> Option<Self> {
        let mut state = context.state.lock();
        if state.switch_in_flight {
            return None;
        }
        state.switch_in_flight = true;
        Some(Self { context })
    }
}

impl Drop for SwitchGuard<'_> {
    fn drop(&mut self) {
        self.context.state.lock().switch_in_flight = false;
    }
}

enum Lookup {
    Found(VmDescriptor),
    NotLoaded,
    Unknown,
}

/// What a deferred entry re-runs once the catalog is loaded
#[derive(Debug, Clone)]
enum Deferred {
    Start(Option<String>),
    Select { code: String, force_rules: bool },
    Switch(String),
}

pub(crate) struct Inner {
    pub(crate) config: SessionConfig,
    pub(crate) context: SessionContext,
    pub(crate) catalog: SharedCatalog,
    pub(crate) vault: CredentialVault,
    pub(crate) consent: ConsentGate,
    pub(crate) guard: AccessGuard,
    pub(crate) surface: Arc<dyn Surface>,
    pub(crate) connector: Arc<dyn TransportConnector>,
    pub(crate) scheduler: Scheduler,
    pub(crate) store: KvStore,
}

/// The session state machine. Cheap to clone.
#[derive(Clone)]
pub struct SessionController {
    pub(crate) inner: Arc<Inner>,
}

impl SessionController {
    /// `navigation_query` is the query string the session was opened with;
    /// it may carry a ban signal.
    pub fn new(config: SessionConfig, deps: SessionDeps, navigation_query: &str) -> Self {
        let catalog = CatalogStore::shared(config.viewer.clone());
        let inner = Inner {
            vault: CredentialVault::new(deps.store.clone(), deps.prompts.clone()),
            consent: ConsentGate::new(deps.store.clone(), deps.clock.clone(), deps.prompts.clone()),
            guard: AccessGuard::new(deps.prompts.clone(), navigation_query),
            context: SessionContext::new(),
            surface: deps.surface,
            connector: deps.connector,
            scheduler: Scheduler::new(),
            store: deps.store,
            catalog,
            config,
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn context(&self) -> &SessionContext {
        &self.inner.context
    }

    pub fn catalog(&self) -> SharedCatalog {
        self.inner.catalog.clone()
    }

    pub fn consent(&self) -> &ConsentGate {
        &self.inner.consent
    }

    pub fn credentials(&self) -> &CredentialVault {
        &self.inner.vault
    }

    pub fn access(&self) -> &AccessGuard {
        &self.inner.guard
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    pub fn phase(&self) -> SessionPhase {
        self.inner.context.phase()
    }

    pub fn selected(&self) -> Option<String> {
        self.inner.context.selected()
    }

    /// Banned or in emergency mode
    pub fn is_halted(&self) -> bool {
        self.phase().is_terminal()
    }

    fn status(&self, message: impl Into<String>) {
        let message = message.into();
        debug!("Status: {}", message);
        self.inner.context.notifier.status(message);
    }

    fn lookup(&self, code: &str) -> Lookup {
        let catalog = self.inner.catalog.read();
        if !catalog.is_loaded() {
            return Lookup::NotLoaded;
        }
        match catalog.get(code) {
            Some(vm) => Lookup::Found(vm.clone()),
            None => Lookup::Unknown,
        }
    }

    fn unsupported(&self, code: &str) {
        warn!("No usable configuration for VM {}", code);
        self.inner.surface.show_notice(UNSUPPORTED_NOTICE);
        self.status(format!("Cannot open {}", code));
    }

    /// Check for a ban and go terminal if present.
    fn ban_check(&self) -> bool {
        if self.inner.guard.check_ban() {
            self.enter_banned();
            return true;
        }
        false
    }

    // ========================================================================
    // Start-up
    // ========================================================================

    /// Pick the initial VM: a deep link wins, then a configured code, then
    /// the stored spawn preference.
    pub async fn start(&self, navigation_path: Option<&str>) -> SwitchOutcome {
        if self.is_halted() || self.ban_check() {
            return SwitchOutcome::Halted;
        }

        let initial = {
            let catalog = self.inner.catalog.read();
            if !catalog.is_loaded() {
                None
            } else {
                let from_path = navigation_path.and_then(|p| catalog.resolve_from_path(p));
                let configured = self
                    .inner
                    .config
                    .spawn
                    .code
                    .clone()
                    .filter(|c| catalog.get(c).is_some());
                Some(from_path.or(configured).or_else(|| match self.spawn_preference() {
                    SpawnPreference::Random => catalog.auto_spawn_candidate(),
                    SpawnPreference::Default => catalog.first().map(|vm| vm.code.clone()),
                }))
            }
        };

        match initial {
            None => {
                self.defer(Deferred::Start(navigation_path.map(str::to_string)));
                SwitchOutcome::Deferred
            }
            Some(None) => {
                info!("Catalog is empty, nothing to start");
                self.status("No VMs available");
                SwitchOutcome::Unsupported
            }
            Some(Some(code)) => {
                self.start_thumbnail_refresh();
                info!("Starting session on {}", code);
                self.select(&code, false).await
            }
        }
    }

    pub fn spawn_preference(&self) -> SpawnPreference {
        match self.inner.store.get(SPAWN_PREFERENCE_KEY) {
            Ok(Some(raw)) => raw.parse().unwrap_or_default(),
            Ok(None) => SpawnPreference::default(),
            Err(e) => {
                warn!("Failed to read spawn preference: {}", e);
                SpawnPreference::default()
            }
        }
    }

    pub fn set_spawn_preference(&self, preference: SpawnPreference) -> Result<()> {
        self.inner.store.set(SPAWN_PREFERENCE_KEY, &preference.to_string())
    }

    /// Emit `ThumbnailsStale` periodically
    pub fn start_thumbnail_refresh(&self) -> bool {
        if self.is_halted() {
            return false;
        }
        let this = self.clone();
        self.inner.scheduler.schedule_every(
            TimerKey::ThumbnailRefresh,
            self.inner.config.timing.thumbnail_interval,
            move || {
                let this = this.clone();
                async move {
                    this.inner.context.notifier.emit(SessionEvent::ThumbnailsStale);
                }
            },
        )
    }

    fn defer(&self, entry: Deferred) {
        self.status("Loading VM list…");
        debug!("Catalog not loaded, deferring {:?}", entry);
        let this = self.clone();
        self.inner.scheduler.schedule_once(
            TimerKey::PendingSwitch,
            self.inner.config.timing.surface_retry_delay,
            move || async move {
                match entry {
                    Deferred::Start(path) => {
                        this.start(path.as_deref()).await;
                    }
                    Deferred::Select { code, force_rules } => {
                        this.select(&code, force_rules).await;
                    }
                    Deferred::Switch(code) => {
                        this.switch_to(&code).await;
                    }
                }
            },
        );
    }

    // ========================================================================
    // Switching
    // ========================================================================

    /// User-initiated switch: access and rules gates, then the switch itself.
    ///
    /// Declined rules may route entry to an alternative VM.
    pub async fn select(&self, code: &str, force_rules: bool) -> SwitchOutcome {
        if self.is_halted() || self.ban_check() {
            return SwitchOutcome::Halted;
        }

        let Some(guard) = SwitchGuard::acquire(&self.inner.context) else {
            debug!("Switch in flight, dropping selection of {}", code);
            return SwitchOutcome::Dropped;
        };

        let mut code = code.to_string();
        let mut force_rules = force_rules;
        let mut visited = HashSet::new();
        visited.insert(code.clone());

        loop {
            let vm = match self.lookup(&code) {
                Lookup::Found(vm) => vm,
                Lookup::NotLoaded => {
                    drop(guard);
                    self.defer(Deferred::Select { code, force_rules });
                    return SwitchOutcome::Deferred;
                }
                Lookup::Unknown => {
                    self.unsupported(&code);
                    return SwitchOutcome::Unsupported;
                }
            };

            if let Err(denied) = self.inner.guard.check_blacklist(&vm).await {
                debug!("{}", denied);
                self.status(format!("Access to {} denied", vm.name));
                return SwitchOutcome::Denied;
            }

            match self
                .inner
                .consent
                .require_agreement(&vm, &self.inner.catalog, force_rules)
                .await
            {
                ConsentOutcome::Proceed => {}
                ConsentOutcome::Redirect(alternative) => {
                    if !visited.insert(alternative.clone()) {
                        self.status("No other VM available");
                        return SwitchOutcome::Declined;
                    }
                    code = alternative;
                    force_rules = false;
                    continue;
                }
                ConsentOutcome::NoAlternative => {
                    self.status("No other VM available");
                    return SwitchOutcome::Declined;
                }
            }

            if self.is_halted() {
                return SwitchOutcome::Halted;
            }
            return self.perform_switch(vm, &guard).await;
        }
    }

    /// Switch without gates. Dropped while another switch is in flight.
    pub async fn switch_to(&self, code: &str) -> SwitchOutcome {
        if self.is_halted() {
            return SwitchOutcome::Halted;
        }

        let Some(guard) = SwitchGuard::acquire(&self.inner.context) else {
            debug!("Switch in flight, dropping switch to {}", code);
            return SwitchOutcome::Dropped;
        };

        match self.lookup(code) {
            Lookup::Found(vm) => self.perform_switch(vm, &guard).await,
            Lookup::NotLoaded => {
                drop(guard);
                self.defer(Deferred::Switch(code.to_string()));
                SwitchOutcome::Deferred
            }
            Lookup::Unknown => {
                self.unsupported(code);
                SwitchOutcome::Unsupported
            }
        }
    }

    async fn perform_switch(&self, vm: VmDescriptor, _guard: &SwitchGuard<'_>) -> SwitchOutcome {
        let context = &self.inner.context;

        match &vm.connection {
            ConnectionKind::Embedded { url } => {
                self.inner.scheduler.cancel(TimerKey::Reconnect);
                self.teardown_transport();
                context.notifier.set_selected(Some(vm.code.clone()));
                context.state.lock().retry_count = 0;
                context.set_phase(SessionPhase::Connected);
                info!("Embedded VM {} at {}", vm.code, url);
                self.status(format!("Connected to {}", vm.name));
                SwitchOutcome::Embedded
            }
            ConnectionKind::RemoteDesktop { host, port, path } => {
                let previous_selection = context.selected();
                let previous_phase = context.phase();

                self.inner.surface.clear_display();
                context.notifier.set_selected(Some(vm.code.clone()));
                context.set_phase(SessionPhase::Connecting);
                self.status("Connecting…");

                let password = match self.inner.vault.resolve(&vm).await {
                    Ok(password) => password,
                    Err(e) => {
                        info!("Switch to {} abandoned: {}", vm.code, e);
                        self.restore_after_cancel(previous_selection, previous_phase);
                        self.status("Password entry cancelled");
                        return SwitchOutcome::Cancelled;
                    }
                };

                self.inner.scheduler.cancel(TimerKey::Reconnect);
                self.teardown_transport();

                tokio::time::sleep(self.inner.config.timing.settle_delay).await;
                if self.is_halted() {
                    return SwitchOutcome::Halted;
                }

                match self.open_transport(&vm, host, *port, path, &password) {
                    Ok(()) => SwitchOutcome::Started,
                    Err(e) => {
                        warn!("Failed to open transport for {}: {}", vm.code, e);
                        context.set_phase(SessionPhase::Disconnected);
                        self.status("Connection failed… Retrying");
                        self.schedule_reconnect();
                        SwitchOutcome::Failed
                    }
                }
            }
        }
    }

    /// Put the selection back after an abandoned switch. The phase follows
    /// what the transport is doing now, since it may have dropped while the
    /// prompt was open.
    fn restore_after_cancel(&self, previous: Option<String>, previous_phase: SessionPhase) {
        let context = &self.inner.context;
        let status = context
            .state
            .lock()
            .transport
            .as_ref()
            .map(|t| t.handle.status());

        let embedded = previous.as_deref().map_or(false, |code| {
            matches!(
                self.lookup(code),
                Lookup::Found(VmDescriptor {
                    connection: ConnectionKind::Embedded { .. },
                    ..
                })
            )
        });
        context.notifier.set_selected(previous);

        let phase = match status {
            Some(TransportStatus::Connected) => SessionPhase::Connected,
            Some(TransportStatus::Connecting) if previous_phase == SessionPhase::Reconnecting => {
                SessionPhase::Reconnecting
            }
            Some(TransportStatus::Connecting) => SessionPhase::Connecting,
            _ if embedded => previous_phase,
            _ => match previous_phase {
                SessionPhase::Connected | SessionPhase::Connecting | SessionPhase::Reconnecting => {
                    context.set_phase(SessionPhase::Disconnected);
                    self.schedule_reconnect();
                    return;
                }
                other => other,
            },
        };
        context.set_phase(phase);
    }

    /// Close the live transport, if any. Its pending events are discarded.
    fn teardown_transport(&self) {
        let live = self.inner.context.state.lock().transport.take();
        if let Some(live) = live {
            live.shutdown();
        }
    }

    fn open_transport(
        &self,
        vm: &VmDescriptor,
        host: &str,
        port: u16,
        path: &str,
        password: &str,
    ) -> Result<()> {
        let url = connection_url(&self.inner.config, host, port, path, password)?;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = self.inner.connector.open(&url, tx)?;

        let generation = {
            let mut state = self.inner.context.state.lock();
            let generation = state.next_generation;
            state.next_generation += 1;
            generation
        };

        let this = self.clone();
        let pump = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                this.on_transport_event(generation, event).await;
            }
        });

        let previous = self.inner.context.state.lock().transport.replace(LiveTransport {
            generation,
            code: vm.code.clone(),
            handle,
            pump,
        });
        if let Some(previous) = previous {
            previous.shutdown();
        }

        info!("Opened transport #{} to {}", generation, redact(&url));
        Ok(())
    }

    fn is_current(&self, generation: u64) -> bool {
        self.inner
            .context
            .state
            .lock()
            .transport
            .as_ref()
            .map_or(false, |t| t.generation == generation)
    }

    fn transport_live(&self) -> bool {
        self.inner
            .context
            .state
            .lock()
            .transport
            .as_ref()
            .map_or(false, |t| t.handle.status().is_live())
    }

    // ========================================================================
    // Transport events
    // ========================================================================

    async fn on_transport_event(&self, generation: u64, event: TransportEvent) {
        if !self.is_current(generation) {
            trace!("Ignoring {:?} from stale transport #{}", event, generation);
            return;
        }

        match event {
            TransportEvent::Connected => self.on_connected(),
            TransportEvent::Disconnected { clean } => self.on_disconnected(clean),
            TransportEvent::CredentialsRequired => self.on_credentials_required(generation).await,
        }
    }

    fn on_connected(&self) {
        let context = &self.inner.context;
        self.inner.scheduler.cancel(TimerKey::Reconnect);
        context.state.lock().retry_count = 0;
        context.set_phase(SessionPhase::Connected);

        let name = context
            .transport_code()
            .and_then(|code| self.inner.catalog.read().get(&code).map(|vm| vm.name.clone()))
            .unwrap_or_else(|| "VM".to_string());
        info!("Connected to {}", name);
        self.status(format!("Connected to {}", name));
    }

    fn on_disconnected(&self, clean: bool) {
        self.teardown_transport();
        if self.is_halted() {
            return;
        }

        self.inner.context.set_phase(SessionPhase::Disconnected);
        if clean {
            info!("Transport closed");
            self.status("Disconnected");
        } else {
            warn!("Transport dropped");
            self.status("Connection lost");
        }
        self.schedule_reconnect();
    }

    async fn on_credentials_required(&self, generation: u64) {
        let Some(code) = self.inner.context.transport_code() else {
            return;
        };
        let Lookup::Found(vm) = self.lookup(&code) else {
            return;
        };

        // The stored password was rejected
        self.inner.vault.forget(&code);
        let answer = self.inner.vault.resolve(&vm).await.ok();

        let state = self.inner.context.state.lock();
        let Some(live) = state.transport.as_ref().filter(|t| t.generation == generation) else {
            return;
        };
        match answer {
            Some(password) => live.handle.send_credentials(&password),
            None => {
                drop(state);
                info!("Credentials for {} not provided, closing transport", code);
                self.inner.context.set_phase(SessionPhase::Disconnected);
                self.status("Password required");
                self.teardown_transport();
            }
        }
    }

    // ========================================================================
    // Reconnect
    // ========================================================================

    /// Install the reconnect timer unless one is already pending.
    pub fn schedule_reconnect(&self) -> bool {
        if self.is_halted() || self.inner.scheduler.is_pending(TimerKey::Reconnect) {
            return false;
        }
        let this = self.clone();
        self.inner.scheduler.schedule_once(
            TimerKey::Reconnect,
            self.inner.config.timing.reconnect_delay,
            move || async move { this.try_reconnect().await },
        )
    }

    /// One reconnect attempt. Failures reschedule on the same fixed delay.
    pub async fn try_reconnect(&self) {
        if self.is_halted() || self.ban_check() {
            return;
        }
        if self.inner.scheduler.is_pending(TimerKey::Reconnect) {
            trace!("Reconnect already pending");
            return;
        }
        if self.transport_live() {
            trace!("Transport live, skipping reconnect");
            return;
        }
        if self.inner.context.switch_in_flight() {
            // The switch cancels this timer once it commits to a new transport
            trace!("Switch in flight, retrying reconnect later");
            self.schedule_reconnect();
            return;
        }
        let Some(code) = self.selected() else {
            return;
        };

        let vm = match self.lookup(&code) {
            Lookup::Found(vm) => vm,
            Lookup::NotLoaded => {
                debug!("Catalog not loaded, retrying reconnect later");
                self.schedule_reconnect();
                return;
            }
            Lookup::Unknown => {
                self.unsupported(&code);
                return;
            }
        };

        if let Err(denied) = self.inner.guard.check_blacklist(&vm).await {
            debug!("{}", denied);
            self.inner.context.set_phase(SessionPhase::Disconnected);
            self.status(format!("Access to {} denied", vm.name));
            return;
        }
        if self.is_halted() || self.transport_live() {
            return;
        }

        let attempt = {
            let mut state = self.inner.context.state.lock();
            state.retry_count += 1;
            state.retry_count
        };
        self.inner.context.set_phase(SessionPhase::Reconnecting);
        self.status(format!("Reconnecting… ({})", attempt));
        info!("Reconnect attempt {} for {}", attempt, code);

        let (host, port, path) = match &vm.connection {
            ConnectionKind::RemoteDesktop { host, port, path } => (host.clone(), *port, path.clone()),
            ConnectionKind::Embedded { .. } => {
                self.inner.context.set_phase(SessionPhase::Connected);
                self.status(format!("Connected to {}", vm.name));
                return;
            }
        };

        let password = match self.inner.vault.resolve(&vm).await {
            Ok(password) => password,
            Err(e) => {
                info!("Reconnect to {} abandoned: {}", code, e);
                self.inner.context.set_phase(SessionPhase::Disconnected);
                self.status("Password entry cancelled");
                return;
            }
        };
        if self.is_halted() || self.transport_live() {
            return;
        }

        if let Err(e) = self.open_transport(&vm, &host, port, &path, &password) {
            error!("Reconnect to {} failed: {}", code, e);
            self.inner.context.set_phase(SessionPhase::Disconnected);
            self.status("Reconnect failed… Retrying");
            self.schedule_reconnect();
        }
    }

    /// User-initiated disconnect. No reconnect is scheduled.
    pub fn disconnect(&self) {
        self.inner.scheduler.cancel(TimerKey::Reconnect);
        self.teardown_transport();
        if !self.is_halted() {
            self.inner.context.set_phase(SessionPhase::Disconnected);
            self.status("Disconnected");
        }
    }

    // ========================================================================
    // Terminal states
    // ========================================================================

    /// Ban pushed by the server
    pub fn mark_banned(&self) {
        self.inner.guard.mark_banned_by_server();
        self.enter_banned();
    }

    /// Stop everything until restart
    pub fn enter_banned(&self) {
        if self.phase() == SessionPhase::Banned {
            return;
        }
        warn!("Session banned, halting");
        self.inner.scheduler.halt();
        self.teardown_transport();
        self.inner.context.set_phase(SessionPhase::Banned);
        self.status("You have been banned");
    }

    pub(crate) fn teardown_for_emergency(&self) {
        self.inner.scheduler.halt();
        self.teardown_transport();
        self.inner.context.set_phase(SessionPhase::EmergencyMode);
    }
}
