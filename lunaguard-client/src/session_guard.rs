//! Signs the user out when the app stays hidden or unfocused too long.
//!
//! `Active` → (hidden / blurred) → `Pending { deadline }` → either back to
//! `Active` (visible / focused before the deadline) or `Terminated` after one
//! sign-out. At most one deadline task exists at any time.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use tokio::{task::JoinHandle, time::Instant};
use tracing::{debug, error, info};

use crate::{
    collaborators::SessionTerminator,
    events::{ClientEvent, EventBus},
    lock,
    settings::AppSettings,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionGuardConfig {
    pub enabled: bool,
    pub timeout: Duration,
}

impl SessionGuardConfig {
    pub fn new(enabled: bool, timeout_seconds: u64) -> Self {
        Self {
            enabled,
            timeout: Duration::from_secs(timeout_seconds),
        }
    }
}

impl Default for SessionGuardConfig {
    fn default() -> Self {
        AppSettings::default().guard_config()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardPhase {
    /// No session to protect.
    Idle,
    Active,
    Pending { deadline: Instant },
    /// Sign-out fired; dormant until the next `start_session`.
    Terminated,
}

#[derive(Debug)]
struct GuardState {
    config: SessionGuardConfig,
    phase: GuardPhase,
    page_hidden: bool,
    timer: Option<JoinHandle<()>>,
    /// Bumped on every arm/disarm so a stale deadline task can tell it lost.
    generation: u64,
}

impl GuardState {
    fn disarm(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.generation = self.generation.wrapping_add(1);
    }
}

pub struct SessionGuard {
    state: Arc<Mutex<GuardState>>,
    terminator: Arc<dyn SessionTerminator>,
    bus: EventBus,
}

impl SessionGuard {
    pub fn new(
        config: SessionGuardConfig,
        terminator: Arc<dyn SessionTerminator>,
        bus: EventBus,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(GuardState {
                config,
                phase: GuardPhase::Idle,
                page_hidden: false,
                timer: None,
                generation: 0,
            })),
            terminator,
            bus,
        }
    }

    pub fn phase(&self) -> GuardPhase {
        lock(&self.state).phase
    }

    pub fn config(&self) -> SessionGuardConfig {
        lock(&self.state).config
    }

    pub fn start_session(&self) {
        let mut state = lock(&self.state);
        state.disarm();
        state.phase = GuardPhase::Active;
        state.page_hidden = false;
        debug!("session guard active");
    }

    /// Sign-out elsewhere or teardown: drops any pending deadline.
    pub fn end_session(&self) {
        let mut state = lock(&self.state);
        state.disarm();
        state.phase = GuardPhase::Idle;
    }

    pub fn set_config(&self, config: SessionGuardConfig) {
        let mut state = lock(&self.state);
        state.config = config;
        if !config.enabled && matches!(state.phase, GuardPhase::Pending { .. }) {
            state.disarm();
            state.phase = GuardPhase::Active;
        }
    }

    pub fn on_visibility_change(&self, hidden: bool) {
        let mut state = lock(&self.state);
        state.page_hidden = hidden;
        if hidden {
            self.arm(&mut state);
        } else {
            Self::cancel(&mut state);
        }
    }

    /// Window lost focus while the page itself is still visible.
    pub fn on_window_blur(&self) {
        let mut state = lock(&self.state);
        if !state.page_hidden {
            self.arm(&mut state);
        }
    }

    pub fn on_window_focus(&self) {
        Self::cancel(&mut lock(&self.state));
    }

    fn arm(&self, state: &mut GuardState) {
        if !state.config.enabled {
            return;
        }
        if !matches!(state.phase, GuardPhase::Active | GuardPhase::Pending { .. }) {
            return;
        }

        state.disarm();
        let generation = state.generation;
        let timeout = state.config.timeout;
        let deadline = Instant::now() + timeout;
        state.phase = GuardPhase::Pending { deadline };

        let shared = Arc::clone(&self.state);
        let terminator = Arc::clone(&self.terminator);
        let bus = self.bus.clone();
        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            {
                let mut state = lock(&shared);
                if state.generation != generation
                    || !matches!(state.phase, GuardPhase::Pending { .. })
                {
                    return;
                }
                state.phase = GuardPhase::Terminated;
                state.timer = None;
            }

            info!(
                timeout_secs = timeout.as_secs(),
                "app hidden past the auto-logout timeout; signing out"
            );
            if let Err(err) = terminator.sign_out().await {
                error!("auto-logout sign-out failed: {}", err);
            }
            bus.publish(ClientEvent::SessionTerminated);
        }));
        debug!(timeout_ms = timeout.as_millis() as u64, "auto-logout timer armed");
    }

    fn cancel(state: &mut GuardState) {
        if let GuardPhase::Pending { .. } = state.phase {
            state.disarm();
            state.phase = GuardPhase::Active;
            debug!("auto-logout timer cancelled");
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        lock(&self.state).disarm();
    }
}
