//! Serialized refresh: manual, periodic and pull-gesture triggers all funnel
//! into one single-flight sync.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use futures::future::join_all;
use lunaguard_core::{DEFAULT_SYNC_INTERVAL, PULL_THRESHOLD, format_time_since};
use tokio::{
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::{
    collaborators::{Notice, Notifier},
    error::RefreshError,
    events::{ClientEvent, EventBus},
    lock,
};

const MIN_SYNC_INTERVAL: Duration = Duration::from_secs(1);

/// One read-only data source reloaded on every sync.
#[async_trait]
pub trait Refresher: Send + Sync {
    fn name(&self) -> &str;
    async fn refresh(&self) -> Result<(), RefreshError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    pub interval: Duration,
    pub pull_to_refresh: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_SYNC_INTERVAL,
            pull_to_refresh: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Completed,
    /// At least one refresher failed; the user was notified.
    Failed,
    /// Another sync was in flight; this trigger was dropped.
    Skipped,
}

/// Tracks one touch sequence of a pull-to-refresh gesture.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct PullGesture {
    start_y: Option<f64>,
    armed: bool,
}

impl PullGesture {
    pub fn touch_start(&mut self, y: f64, at_top: bool, refreshing: bool) {
        if at_top && !refreshing {
            self.start_y = Some(y);
            self.armed = false;
        }
    }

    pub fn touch_move(&mut self, y: f64, at_top: bool, refreshing: bool) {
        if !at_top || refreshing {
            return;
        }
        if let Some(start) = self.start_y
            && y - start > PULL_THRESHOLD
        {
            self.armed = true;
        }
    }

    /// `true` when the released gesture should trigger a sync. Always disarms.
    pub fn touch_end(&mut self, refreshing: bool) -> bool {
        let fire = self.armed && !refreshing;
        *self = Self::default();
        fire
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }
}

struct SyncShared {
    refreshers: Vec<Arc<dyn Refresher>>,
    refreshing: AtomicBool,
    last_sync: Mutex<Option<Instant>>,
    notifier: Arc<dyn Notifier>,
    bus: EventBus,
}

/// Clears the single-flight flag however the sync future ends.
struct InFlight<'a> {
    shared: &'a SyncShared,
    ok: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.shared.refreshing.store(false, Ordering::Release);
        self.shared
            .bus
            .publish(ClientEvent::SyncFinished { ok: self.ok });
    }
}

impl SyncShared {
    async fn run_sync(&self) -> SyncOutcome {
        if self
            .refreshing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("sync already in flight; trigger dropped");
            return SyncOutcome::Skipped;
        }
        let mut flight = InFlight {
            shared: self,
            ok: false,
        };
        self.bus.publish(ClientEvent::SyncStarted);

        let results = join_all(
            self.refreshers
                .iter()
                .map(|r| async move { (r.name().to_owned(), r.refresh().await) }),
        )
        .await;
        *lock(&self.last_sync) = Some(Instant::now());

        let mut failed = false;
        for (name, result) in results {
            if let Err(err) = result {
                warn!(refresher = %name, "sync step failed: {}", err);
                failed = true;
            }
        }

        if failed {
            self.notifier.notify(Notice::error(
                "Error de sincronización",
                "No se pudieron actualizar los datos",
            ));
            SyncOutcome::Failed
        } else {
            flight.ok = true;
            debug!("sync completed");
            SyncOutcome::Completed
        }
    }
}

pub struct SyncCoordinator {
    shared: Arc<SyncShared>,
    config: Mutex<SyncConfig>,
    periodic: Mutex<Option<JoinHandle<()>>>,
    gesture: Mutex<PullGesture>,
}

impl SyncCoordinator {
    pub fn new(
        config: SyncConfig,
        refreshers: Vec<Arc<dyn Refresher>>,
        notifier: Arc<dyn Notifier>,
        bus: EventBus,
    ) -> Self {
        Self {
            shared: Arc::new(SyncShared {
                refreshers,
                refreshing: AtomicBool::new(false),
                last_sync: Mutex::new(None),
                notifier,
                bus,
            }),
            config: Mutex::new(config),
            periodic: Mutex::new(None),
            gesture: Mutex::new(PullGesture::default()),
        }
    }

    pub fn is_refreshing(&self) -> bool {
        self.shared.refreshing.load(Ordering::Acquire)
    }

    pub fn last_sync_time(&self) -> Option<Instant> {
        *lock(&self.shared.last_sync)
    }

    pub fn config(&self) -> SyncConfig {
        *lock(&self.config)
    }

    pub fn time_since_last_sync(&self) -> String {
        format_time_since(self.last_sync_time().map(|at| at.elapsed()))
    }

    pub async fn manual_sync(&self) -> SyncOutcome {
        self.shared.run_sync().await
    }

    /// Arms the periodic timer, replacing any previous one. Runs an immediate
    /// sync first when nothing has been synced yet.
    pub fn start(&self) {
        let config = self.config();
        let period = config.interval.max(MIN_SYNC_INTERVAL);
        let shared = Arc::clone(&self.shared);
        let sync_now = self.last_sync_time().is_none();

        let mut slot = lock(&self.periodic);
        if let Some(previous) = slot.take() {
            previous.abort();
        }
        *slot = Some(tokio::spawn(async move {
            if sync_now {
                shared.run_sync().await;
            }
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if !shared.refreshing.load(Ordering::Acquire) {
                    shared.run_sync().await;
                }
            }
        }));
        info!(interval_ms = period.as_millis() as u64, "periodic sync armed");
    }

    /// Applies a new configuration; a running timer is re-created with it.
    pub fn reconfigure(&self, config: SyncConfig) {
        *lock(&self.config) = config;
        if !config.pull_to_refresh {
            *lock(&self.gesture) = PullGesture::default();
        }
        if self.is_running() {
            self.start();
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.periodic).is_some()
    }

    pub fn stop(&self) {
        if let Some(handle) = lock(&self.periodic).take() {
            handle.abort();
            debug!("periodic sync stopped");
        }
    }

    pub fn on_touch_start(&self, y: f64, scroll_top: f64) {
        if !self.config().pull_to_refresh {
            return;
        }
        let refreshing = self.is_refreshing();
        lock(&self.gesture).touch_start(y, scroll_top <= 0.0, refreshing);
    }

    pub fn on_touch_move(&self, y: f64, scroll_top: f64) {
        if !self.config().pull_to_refresh {
            return;
        }
        let refreshing = self.is_refreshing();
        lock(&self.gesture).touch_move(y, scroll_top <= 0.0, refreshing);
    }

    /// Releases the touch; an armed gesture runs exactly one sync.
    pub async fn on_touch_end(&self) -> Option<SyncOutcome> {
        let refreshing = self.is_refreshing();
        let fire = lock(&self.gesture).touch_end(refreshing);
        if fire && self.config().pull_to_refresh {
            Some(self.manual_sync().await)
        } else {
            None
        }
    }
}

impl Drop for SyncCoordinator {
    fn drop(&mut self) {
        self.stop();
    }
}
