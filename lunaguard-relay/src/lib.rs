use std::{sync::Arc, time::Duration};

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use lunaguard_core::{
    CommandRequest, CommandResponse, DEVICE_COMMAND_PATH, DEVICE_STATUS_PATH, DeviceSnapshot,
    HEALTH_PATH, HealthResponse,
};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::{debug, info, warn};

/// Misbehaviour the relay can be told to simulate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Faults {
    /// Added before every response.
    pub latency: Duration,
    /// Replaces the `"ok"` health status.
    pub health_status: Option<String>,
    /// Replaces the `"sent"` command status; the command is then not applied.
    pub command_status: Option<String>,
    /// `/device/status` answers 503.
    pub status_outage: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayCounters {
    pub health_requests: u64,
    pub status_requests: u64,
    pub commands_applied: u64,
}

#[derive(Debug)]
struct RelayState {
    device: DeviceSnapshot,
    faults: Faults,
    counters: RelayCounters,
}

#[derive(Debug, Clone)]
pub struct AppState {
    inner: Arc<RwLock<RelayState>>,
}

impl AppState {
    #[must_use]
    pub fn new() -> Self {
        Self::with_device(DeviceSnapshot::initial(Utc::now()))
    }

    #[must_use]
    pub fn with_device(device: DeviceSnapshot) -> Self {
        Self {
            inner: Arc::new(RwLock::new(RelayState {
                device,
                faults: Faults::default(),
                counters: RelayCounters::default(),
            })),
        }
    }

    pub async fn set_faults(&self, faults: Faults) {
        self.inner.write().await.faults = faults;
    }

    pub async fn set_device(&self, device: DeviceSnapshot) {
        self.inner.write().await.device = device;
    }

    pub async fn device(&self) -> DeviceSnapshot {
        self.inner.read().await.device.clone()
    }

    pub async fn counters(&self) -> RelayCounters {
        self.inner.read().await.counters
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(HEALTH_PATH, get(health_handler))
        .route(DEVICE_STATUS_PATH, get(device_status_handler))
        .route(DEVICE_COMMAND_PATH, post(device_command_handler))
        .with_state(state)
}

pub async fn serve(listener: TcpListener, state: AppState) -> Result<(), String> {
    info!(
        "relay listening on {}",
        listener
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_owned())
    );
    axum::serve(listener, build_router(state))
        .await
        .map_err(|err| err.to_string())
}

async fn simulate_latency(state: &AppState) -> Faults {
    let faults = state.inner.read().await.faults.clone();
    if !faults.latency.is_zero() {
        tokio::time::sleep(faults.latency).await;
    }
    faults
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let faults = simulate_latency(&state).await;
    state.inner.write().await.counters.health_requests += 1;
    match faults.health_status {
        Some(status) => Json(HealthResponse { status }),
        None => Json(HealthResponse::ok()),
    }
}

async fn device_status_handler(State(state): State<AppState>) -> Response {
    let faults = simulate_latency(&state).await;
    let mut relay = state.inner.write().await;
    relay.counters.status_requests += 1;
    if faults.status_outage {
        warn!("device status unavailable (simulated outage)");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({"error": "device unavailable"})),
        )
            .into_response();
    }
    Json(relay.device.clone()).into_response()
}

async fn device_command_handler(
    State(state): State<AppState>,
    payload: Result<Json<CommandRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            warn!("rejecting malformed command body: {}", rejection.body_text());
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": rejection.body_text()})),
            )
                .into_response();
        }
    };

    let faults = simulate_latency(&state).await;
    if let Some(status) = faults.command_status {
        debug!(command = %request.command, %status, "command not forwarded");
        return Json(CommandResponse {
            status,
            command: Some(request.command.as_str().to_owned()),
        })
        .into_response();
    }

    let mut relay = state.inner.write().await;
    relay.device = relay.device.after_command(request.command, Utc::now());
    relay.counters.commands_applied += 1;
    drop(relay);

    info!(command = %request.command, "command forwarded to device");
    Json(CommandResponse::sent(request.command)).into_response()
}
