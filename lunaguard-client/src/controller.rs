//! UI-facing owner of the device view and the lock/power/panic controls.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join;
use lunaguard_core::{DeviceSnapshot, SETTLE_DELAY, is_device_online};
use tracing::{debug, info, warn};

use crate::{
    collaborators::{EventLog, Notice, Notifier, spawn_log_event},
    control::{ControlKind, ControlPhase, Controls},
    error::RefreshError,
    events::{ClientEvent, EventBus},
    lock,
    relay::{CommandDispatcher, StatusPoller},
    sync::Refresher,
};

/// What the UI renders. Replaced as a whole after every completed poll.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceView {
    pub snapshot: Option<DeviceSnapshot>,
    pub server_reachable: bool,
    pub last_check: Option<DateTime<Utc>>,
}

impl DeviceView {
    pub fn is_online(&self, now: DateTime<Utc>) -> bool {
        is_device_online(self.snapshot.as_ref(), now)
    }

    pub fn controls_enabled(&self) -> bool {
        self.server_reachable && self.snapshot.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// Accepted and re-polled. `matched` is whether the device reached the
    /// intended state; the polled `state` is what the control shows either way.
    Confirmed { state: bool, matched: bool },
    /// The relay did not accept the command; the control was reverted.
    Rejected,
    /// Accepted, but the follow-up poll failed; the control was reverted.
    Unconfirmed,
    /// A command for this control is already in flight.
    Busy,
    /// Server unreachable or no snapshot yet.
    Unavailable,
}

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub settle_delay: Duration,
    /// Vehicle the audit log entries are attached to.
    pub vehicle_id: Option<String>,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            settle_delay: SETTLE_DELAY,
            vehicle_id: None,
        }
    }
}

#[derive(Debug)]
struct ControllerState {
    view: DeviceView,
    controls: Controls,
}

pub struct DeviceController {
    poller: Arc<dyn StatusPoller>,
    dispatcher: Arc<dyn CommandDispatcher>,
    event_log: Arc<dyn EventLog>,
    notifier: Arc<dyn Notifier>,
    bus: EventBus,
    options: ControllerOptions,
    state: Mutex<ControllerState>,
}

impl DeviceController {
    pub fn new(
        poller: Arc<dyn StatusPoller>,
        dispatcher: Arc<dyn CommandDispatcher>,
        event_log: Arc<dyn EventLog>,
        notifier: Arc<dyn Notifier>,
        bus: EventBus,
        options: ControllerOptions,
    ) -> Self {
        Self {
            poller,
            dispatcher,
            event_log,
            notifier,
            bus,
            options,
            state: Mutex::new(ControllerState {
                view: DeviceView::default(),
                controls: Controls::from_snapshot(None),
            }),
        }
    }

    pub fn view(&self) -> DeviceView {
        lock(&self.state).view.clone()
    }

    pub fn control(&self, kind: ControlKind) -> ControlPhase {
        lock(&self.state).controls.get(kind)
    }

    pub fn is_control_enabled(&self, kind: ControlKind) -> bool {
        let state = lock(&self.state);
        state.view.controls_enabled() && !state.controls.get(kind).is_pending()
    }

    /// Health and status in parallel; both always resolve.
    async fn poll(&self) -> (bool, Option<DeviceSnapshot>) {
        join(
            self.poller.check_server_health(),
            self.poller.get_device_status(),
        )
        .await
    }

    fn replace_view(&self, server_reachable: bool, snapshot: Option<DeviceSnapshot>) -> DeviceView {
        let view = DeviceView {
            snapshot,
            server_reachable,
            last_check: Some(Utc::now()),
        };
        {
            let mut state = lock(&self.state);
            state.view = view.clone();
            state.controls.observe(view.snapshot.as_ref());
        }
        self.bus.publish(ClientEvent::SnapshotReplaced {
            snapshot: view.snapshot.clone(),
            server_reachable,
        });
        view
    }

    /// Fetches the authoritative state and makes it current, failure included.
    pub async fn refresh_status(&self) -> DeviceView {
        let (reachable, snapshot) = self.poll().await;
        debug!(
            reachable,
            has_snapshot = snapshot.is_some(),
            "device status refreshed"
        );
        self.replace_view(reachable, snapshot)
    }

    /// Flips one control through the relay.
    ///
    /// The control stays pending from dispatch until the post-settle poll
    /// resolves it, and a second toggle in that window returns `Busy`
    /// without dispatching. Dropping the future early reverts the control.
    pub async fn toggle(&self, kind: ControlKind) -> ToggleOutcome {
        let (current, pending) = {
            let mut state = lock(&self.state);
            if !state.view.controls_enabled() {
                return ToggleOutcome::Unavailable;
            }
            let phase = state.controls.get_mut(kind);
            let Some(current) = phase.begin() else {
                return ToggleOutcome::Busy;
            };
            (current, *phase)
        };
        let mut guard = PendingControl {
            controller: self,
            kind,
            resolved: false,
        };
        self.publish_phase(kind, pending);

        let command = kind.command_leaving(current);
        info!(control = %kind, %command, "dispatching command");
        if !self.dispatcher.send_command(command).await {
            guard.revert();
            self.notifier.notify(Notice::error(
                "Error",
                "No se pudo enviar el comando al dispositivo",
            ));
            return ToggleOutcome::Rejected;
        }

        spawn_log_event(
            Arc::clone(&self.event_log),
            kind.accepted_entry(current, self.options.vehicle_id.as_deref()),
        );
        self.notifier.notify(kind.accepted_notice(current));

        tokio::time::sleep(self.options.settle_delay).await;
        let (reachable, snapshot) = self.poll().await;
        let Some(snapshot) = snapshot else {
            warn!(control = %kind, %command, "no device status after settle; reverting");
            guard.revert();
            self.notifier.notify(Notice::error(
                "Error de conexión",
                "No se pudo conectar con el dispositivo",
            ));
            return ToggleOutcome::Unconfirmed;
        };

        let observed = kind.state_of(Some(&snapshot));
        self.replace_view(reachable, Some(snapshot));
        let resolved = {
            let mut state = lock(&self.state);
            let phase = state.controls.get_mut(kind);
            phase.confirm(observed);
            *phase
        };
        guard.resolved = true;
        self.publish_phase(kind, resolved);

        let matched = observed != current;
        if !matched {
            info!(control = %kind, %command, "device did not reach the requested state");
        }
        ToggleOutcome::Confirmed {
            state: observed,
            matched,
        }
    }

    fn revert(&self, kind: ControlKind) {
        let phase = {
            let mut state = lock(&self.state);
            let phase = state.controls.get_mut(kind);
            phase.revert();
            *phase
        };
        self.publish_phase(kind, phase);
    }

    fn publish_phase(&self, kind: ControlKind, phase: ControlPhase) {
        self.bus.publish(ClientEvent::ControlChanged { kind, phase });
    }
}

/// Reverts a pending control unless the toggle resolved it first.
struct PendingControl<'a> {
    controller: &'a DeviceController,
    kind: ControlKind,
    resolved: bool,
}

impl PendingControl<'_> {
    fn revert(&mut self) {
        self.resolved = true;
        self.controller.revert(self.kind);
    }
}

impl Drop for PendingControl<'_> {
    fn drop(&mut self) {
        if !self.resolved {
            debug!(control = %self.kind, "toggle cancelled while pending; reverting");
            self.controller.revert(self.kind);
        }
    }
}

#[async_trait]
impl Refresher for DeviceController {
    fn name(&self) -> &str {
        "device"
    }

    async fn refresh(&self) -> Result<(), RefreshError> {
        let view = self.refresh_status().await;
        if view.snapshot.is_none() {
            return Err(RefreshError::DeviceUnavailable);
        }
        Ok(())
    }
}
