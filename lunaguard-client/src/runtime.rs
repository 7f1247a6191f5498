use std::{path::PathBuf, sync::Arc, time::Duration};

use lunaguard_core::{DEFAULT_RELAY_URL, SETTLE_DELAY};
use tracing::{info, warn};

use crate::{
    collaborators::Collaborators,
    controller::{ControllerOptions, DeviceController},
    error::{RelayError, SettingsError},
    events::{EventBus, RefreshTopic, TopicRefresher},
    relay::{RelayClient, RelayTimeouts},
    session_guard::SessionGuard,
    settings::{AppSettings, SettingsPatch, SettingsStore, default_settings_path},
    sync::{Refresher, SyncConfig, SyncCoordinator},
};

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub relay_url: String,
    pub timeouts: RelayTimeouts,
    pub sync: SyncConfig,
    pub settle_delay: Duration,
    pub settings_path: PathBuf,
    pub vehicle_id: Option<String>,
    /// Sibling views reloaded alongside the device on every sync.
    pub refresh_topics: Vec<RefreshTopic>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relay_url: DEFAULT_RELAY_URL.to_owned(),
            timeouts: RelayTimeouts::default(),
            sync: SyncConfig::default(),
            settle_delay: SETTLE_DELAY,
            settings_path: default_settings_path(),
            vehicle_id: None,
            refresh_topics: vec![RefreshTopic::Vehicles],
        }
    }
}

/// Everything one signed-in session needs, wired together.
pub struct ClientRuntime {
    pub bus: EventBus,
    pub relay: Arc<RelayClient>,
    pub controller: Arc<DeviceController>,
    pub sync: SyncCoordinator,
    pub guard: SessionGuard,
    settings: SettingsStore,
}

impl ClientRuntime {
    pub fn build(config: ClientConfig, collaborators: Collaborators) -> Result<Self, RelayError> {
        let bus = EventBus::new();
        let relay = Arc::new(RelayClient::new(&config.relay_url, config.timeouts)?);
        let settings = SettingsStore::open(config.settings_path.clone());

        let controller = Arc::new(DeviceController::new(
            relay.clone(),
            relay.clone(),
            collaborators.event_log,
            collaborators.notifier.clone(),
            bus.clone(),
            ControllerOptions {
                settle_delay: config.settle_delay,
                vehicle_id: config.vehicle_id.clone(),
            },
        ));

        let mut refreshers: Vec<Arc<dyn Refresher>> = Vec::new();
        refreshers.push(controller.clone());
        for topic in &config.refresh_topics {
            refreshers.push(Arc::new(TopicRefresher::new(*topic, bus.clone())));
        }
        let sync = SyncCoordinator::new(
            config.sync,
            refreshers,
            collaborators.notifier,
            bus.clone(),
        );

        let guard = SessionGuard::new(
            settings.settings().guard_config(),
            collaborators.terminator,
            bus.clone(),
        );

        info!(relay = %relay.base_url(), "client runtime ready");
        Ok(Self {
            bus,
            relay,
            controller,
            sync,
            guard,
            settings,
        })
    }

    pub fn settings(&self) -> AppSettings {
        self.settings.settings()
    }

    /// Persists the change and applies it to the running guard.
    pub fn update_settings(&mut self, patch: SettingsPatch) -> Result<AppSettings, SettingsError> {
        let result = self.settings.update(patch);
        self.guard.set_config(self.settings.settings().guard_config());
        if let Err(err) = &result {
            warn!("settings not persisted: {}", err);
        }
        result
    }

    pub fn start_session(&self) {
        self.guard.start_session();
        self.sync.start();
    }

    pub fn end_session(&self) {
        self.sync.stop();
        self.guard.end_session();
    }
}
