//! Typed broadcast of client-side happenings.
//!
//! Views that need to reload (vehicle list, user list, event history)
//! subscribe here instead of listening for ad hoc named signals.

use async_trait::async_trait;
use lunaguard_core::DeviceSnapshot;
use tokio::sync::broadcast;

use crate::{
    control::{ControlKind, ControlPhase},
    error::RefreshError,
    sync::Refresher,
};

const EVENT_BUS_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefreshTopic {
    Users,
    Vehicles,
    Events,
}

impl RefreshTopic {
    pub fn as_str(self) -> &'static str {
        match self {
            RefreshTopic::Users => "users",
            RefreshTopic::Vehicles => "vehicles",
            RefreshTopic::Events => "events",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    SyncStarted,
    SyncFinished { ok: bool },
    SnapshotReplaced {
        snapshot: Option<DeviceSnapshot>,
        server_reachable: bool,
    },
    ControlChanged { kind: ControlKind, phase: ControlPhase },
    RefreshRequested(RefreshTopic),
    SessionTerminated,
}

#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ClientEvent>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self { tx }
    }

    /// Having no subscribers is fine; the event is simply dropped.
    pub fn publish(&self, event: ClientEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Asks the views subscribed to `topic` to reload on every sync.
#[derive(Debug, Clone)]
pub struct TopicRefresher {
    topic: RefreshTopic,
    bus: EventBus,
}

impl TopicRefresher {
    pub fn new(topic: RefreshTopic, bus: EventBus) -> Self {
        Self { topic, bus }
    }
}

#[async_trait]
impl Refresher for TopicRefresher {
    fn name(&self) -> &str {
        self.topic.as_str()
    }

    async fn refresh(&self) -> Result<(), RefreshError> {
        self.bus.publish(ClientEvent::RefreshRequested(self.topic));
        Ok(())
    }
}
