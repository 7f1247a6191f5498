#![allow(dead_code)]

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use lunaguard_client::{
    CommandDispatcher, DeviceController, StatusPoller,
    collaborators::{EventEntry, EventLog, Notice, Notifier, SessionTerminator},
    controller::ControllerOptions,
    error::{CollaboratorError, RefreshError},
    events::EventBus,
    sync::Refresher,
};
use lunaguard_core::{Command, DeviceSnapshot};

/// In-process stand-in for the relay with scriptable answers.
pub struct FakeRelay {
    pub healthy: AtomicBool,
    pub status_outage: AtomicBool,
    pub accept_commands: AtomicBool,
    /// Accepted commands change the reported snapshot.
    pub apply_commands: AtomicBool,
    snapshot: Mutex<DeviceSnapshot>,
    sent: Mutex<Vec<Command>>,
    health_calls: AtomicUsize,
    status_calls: AtomicUsize,
}

impl FakeRelay {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            healthy: AtomicBool::new(true),
            status_outage: AtomicBool::new(false),
            accept_commands: AtomicBool::new(true),
            apply_commands: AtomicBool::new(true),
            snapshot: Mutex::new(DeviceSnapshot::initial(Utc::now())),
            sent: Mutex::new(Vec::new()),
            health_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
        })
    }

    pub fn offline() -> Arc<Self> {
        let relay = Self::new();
        relay.healthy.store(false, Ordering::SeqCst);
        relay.status_outage.store(true, Ordering::SeqCst);
        relay
    }

    pub fn snapshot(&self) -> DeviceSnapshot {
        self.snapshot.lock().unwrap().clone()
    }

    pub fn sent(&self) -> Vec<Command> {
        self.sent.lock().unwrap().clone()
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn health_calls(&self) -> usize {
        self.health_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatusPoller for FakeRelay {
    async fn check_server_health(&self) -> bool {
        self.health_calls.fetch_add(1, Ordering::SeqCst);
        self.healthy.load(Ordering::SeqCst)
    }

    async fn get_device_status(&self) -> Option<DeviceSnapshot> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        if self.status_outage.load(Ordering::SeqCst) {
            return None;
        }
        Some(self.snapshot())
    }
}

#[async_trait]
impl CommandDispatcher for FakeRelay {
    async fn send_command(&self, command: Command) -> bool {
        self.sent.lock().unwrap().push(command);
        if !self.accept_commands.load(Ordering::SeqCst) {
            return false;
        }
        if self.apply_commands.load(Ordering::SeqCst) {
            let mut snapshot = self.snapshot.lock().unwrap();
            *snapshot = snapshot.after_command(command, Utc::now());
        }
        true
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices.lock().unwrap().push(notice);
    }
}

#[derive(Default)]
pub struct RecordingEventLog {
    entries: Mutex<Vec<EventEntry>>,
}

impl RecordingEventLog {
    pub fn entries(&self) -> Vec<EventEntry> {
        self.entries.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventLog for RecordingEventLog {
    async fn log_event(&self, entry: EventEntry) -> Result<(), CollaboratorError> {
        self.entries.lock().unwrap().push(entry);
        Ok(())
    }
}

#[derive(Default)]
pub struct CountingSignOut {
    calls: AtomicUsize,
}

impl CountingSignOut {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionTerminator for CountingSignOut {
    async fn sign_out(&self) -> Result<(), CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Refresher that takes `delay` and records how many runs overlap.
pub struct ScriptedRefresher {
    delay: Duration,
    pub fail: AtomicBool,
    calls: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl ScriptedRefresher {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            fail: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Refresher for ScriptedRefresher {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn refresh(&self) -> Result<(), RefreshError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(RefreshError::Collaborator {
                name: "scripted".to_owned(),
                reason: "backend down".to_owned(),
            });
        }
        Ok(())
    }
}

pub struct ControllerHarness {
    pub relay: Arc<FakeRelay>,
    pub notifier: Arc<RecordingNotifier>,
    pub event_log: Arc<RecordingEventLog>,
    pub bus: EventBus,
    pub controller: Arc<DeviceController>,
}

pub fn controller_with(relay: Arc<FakeRelay>, settle_delay: Duration) -> ControllerHarness {
    let notifier = Arc::new(RecordingNotifier::default());
    let event_log = Arc::new(RecordingEventLog::default());
    let bus = EventBus::new();
    let controller = Arc::new(DeviceController::new(
        relay.clone(),
        relay.clone(),
        event_log.clone(),
        notifier.clone(),
        bus.clone(),
        ControllerOptions {
            settle_delay,
            vehicle_id: Some("veh-1".to_owned()),
        },
    ));
    ControllerHarness {
        relay,
        notifier,
        event_log,
        bus,
        controller,
    }
}
