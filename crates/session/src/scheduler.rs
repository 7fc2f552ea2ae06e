//! Cancellable timers keyed by purpose
//!
//! Each purpose owns at most one timer. Installing a timer for a key aborts
//! the previous one, and `cancel_all` is the single sweep used when the
//! session is banned or falls back to emergency mode.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Shortest period a repeating timer runs at
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// What a timer is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKey {
    CatalogRefresh,
    Reconnect,
    ThumbnailRefresh,
    /// Deferred switch while the catalog is still loading
    PendingSwitch,
}

impl std::fmt::Display for TimerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimerKey::CatalogRefresh => write!(f, "catalogRefresh"),
            TimerKey::Reconnect => write!(f, "reconnect"),
            TimerKey::ThumbnailRefresh => write!(f, "thumbnailRefresh"),
            TimerKey::PendingSwitch => write!(f, "pendingSwitch"),
        }
    }
}

struct Timer {
    id: u64,
    handle: JoinHandle<()>,
}

/// Owner of all session timers
#[derive(Clone, Default)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

#[derive(Default)]
struct SchedulerInner {
    timers: Mutex<HashMap<TimerKey, Timer>>,
    next_id: AtomicU64,
    halted: AtomicBool,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` once after `delay`. Replaces any timer under `key`.
    ///
    /// The entry is removed before `task` starts, so `is_pending(key)` is false
    /// while the task runs and it may reschedule itself.
    pub fn schedule_once<F, Fut>(&self, key: TimerKey, delay: Duration, task: F) -> bool
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.is_halted() {
            trace!("Scheduler halted, not installing {}", key);
            return false;
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let inner = self.inner.clone();

        // Held across spawn so the task cannot look for its entry before it exists
        let mut timers = self.inner.timers.lock();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut timers = inner.timers.lock();
                if timers.get(&key).map(|t| t.id) == Some(id) {
                    timers.remove(&key);
                }
            }
            task().await;
        });
        if let Some(previous) = timers.insert(key, Timer { id, handle }) {
            previous.handle.abort();
        }
        drop(timers);

        debug!("Scheduled {} in {:?}", key, delay);
        true
    }

    /// Run `tick` every `period`, first firing one period from now.
    pub fn schedule_every<F, Fut>(&self, key: TimerKey, period: Duration, tick: F) -> bool
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.is_halted() {
            trace!("Scheduler halted, not installing {}", key);
            return false;
        }

        let period = period.max(MIN_PERIOD);
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                tick().await;
            }
        });

        if let Some(previous) = self.inner.timers.lock().insert(key, Timer { id, handle }) {
            previous.handle.abort();
        }
        debug!("Scheduled {} every {:?}", key, period);
        true
    }

    /// Whether a timer under `key` is installed and has not fired yet.
    pub fn is_pending(&self, key: TimerKey) -> bool {
        self.inner
            .timers
            .lock()
            .get(&key)
            .map_or(false, |t| !t.handle.is_finished())
    }

    pub fn cancel(&self, key: TimerKey) -> bool {
        match self.inner.timers.lock().remove(&key) {
            Some(timer) => {
                timer.handle.abort();
                debug!("Cancelled {}", key);
                true
            }
            None => false,
        }
    }

    /// Abort every timer
    pub fn cancel_all(&self) {
        let drained: Vec<(TimerKey, Timer)> = self.inner.timers.lock().drain().collect();
        for (key, timer) in drained {
            timer.handle.abort();
            debug!("Cancelled {}", key);
        }
    }

    /// Cancel everything and refuse new timers from now on.
    pub fn halt(&self) {
        self.inner.halted.store(true, Ordering::SeqCst);
        self.cancel_all();
    }

    pub fn is_halted(&self) -> bool {
        self.inner.halted.load(Ordering::SeqCst)
    }

    pub fn pending(&self) -> Vec<TimerKey> {
        self.inner
            .timers
            .lock()
            .iter()
            .filter(|(_, t)| !t.handle.is_finished())
            .map(|(k, _)| *k)
            .collect()
    }
}
