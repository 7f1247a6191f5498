//! HTTP client for the device-command relay.
//!
//! `RelayClient` exposes the fallible calls (`fetch_*`, `post_command`) and
//! implements [`StatusPoller`] and [`CommandDispatcher`], which normalize
//! every failure to `false`/`None` so nothing escapes to the UI layer.

use std::{future::Future, time::Duration};

use async_trait::async_trait;
use lunaguard_core::{
    COMMAND_TIMEOUT, Command, CommandRequest, CommandResponse, DEVICE_COMMAND_PATH,
    DEVICE_STATUS_PATH, DeviceSnapshot, HEALTH_PATH, HEALTH_TIMEOUT, HealthResponse,
    STATUS_TIMEOUT,
};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use crate::error::RelayError;

#[async_trait]
pub trait StatusPoller: Send + Sync {
    /// `true` only for a 2xx answer whose payload says `"ok"`.
    async fn check_server_health(&self) -> bool;
    /// The relay's last-known device state, `None` on any failure.
    async fn get_device_status(&self) -> Option<DeviceSnapshot>;
}

#[async_trait]
pub trait CommandDispatcher: Send + Sync {
    /// `true` when the relay accepted the command. Says nothing about whether
    /// the device executed it.
    async fn send_command(&self, command: Command) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayTimeouts {
    pub health: Duration,
    pub status: Duration,
    pub command: Duration,
}

impl Default for RelayTimeouts {
    fn default() -> Self {
        Self {
            health: HEALTH_TIMEOUT,
            status: STATUS_TIMEOUT,
            command: COMMAND_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RelayClient {
    http: reqwest::Client,
    base: Url,
    timeouts: RelayTimeouts,
}

impl RelayClient {
    pub fn new(base_url: &str, timeouts: RelayTimeouts) -> Result<Self, RelayError> {
        let base = Url::parse(base_url).map_err(|err| RelayError::InvalidBaseUrl {
            url: base_url.to_owned(),
            reason: err.to_string(),
        })?;
        if base.scheme() != "http" && base.scheme() != "https" {
            return Err(RelayError::InvalidBaseUrl {
                url: base_url.to_owned(),
                reason: format!("unsupported scheme '{}'", base.scheme()),
            });
        }
        if base.cannot_be_a_base() || base.host_str().is_none() {
            return Err(RelayError::InvalidBaseUrl {
                url: base_url.to_owned(),
                reason: "missing host".to_owned(),
            });
        }

        let http = reqwest::Client::builder()
            .build()
            .map_err(|err| RelayError::Setup(err.to_string()))?;
        Ok(Self {
            http,
            base,
            timeouts,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    pub fn timeouts(&self) -> RelayTimeouts {
        self.timeouts
    }

    pub async fn fetch_health(&self) -> Result<HealthResponse, RelayError> {
        let request = self.http.get(self.endpoint(HEALTH_PATH));
        self.exchange(request, self.timeouts.health).await
    }

    pub async fn fetch_device_status(&self) -> Result<DeviceSnapshot, RelayError> {
        let request = self.http.get(self.endpoint(DEVICE_STATUS_PATH));
        self.exchange(request, self.timeouts.status).await
    }

    pub async fn post_command(&self, command: Command) -> Result<CommandResponse, RelayError> {
        let request = self
            .http
            .post(self.endpoint(DEVICE_COMMAND_PATH))
            .json(&CommandRequest { command });
        self.exchange(request, self.timeouts.command).await
    }

    /// Appends `path` to the base URL, keeping any path prefix the base has.
    fn endpoint(&self, path: &str) -> Url {
        let mut url = self.base.clone();
        let prefix = self.base.path().trim_end_matches('/');
        url.set_path(&format!("{prefix}{path}"));
        url
    }

    async fn exchange<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        limit: Duration,
    ) -> Result<T, RelayError> {
        with_deadline(limit, async {
            let response = request.send().await.map_err(classify)?;
            let status = response.status();
            if !status.is_success() {
                return Err(RelayError::Rejected {
                    status: status.as_u16(),
                });
            }
            response.json::<T>().await.map_err(classify)
        })
        .await
    }
}

/// Hard cap over the whole exchange, body included.
async fn with_deadline<T>(
    limit: Duration,
    fut: impl Future<Output = Result<T, RelayError>>,
) -> Result<T, RelayError> {
    tokio::time::timeout(limit, fut)
        .await
        .unwrap_or(Err(RelayError::TimedOut(limit)))
}

fn classify(err: reqwest::Error) -> RelayError {
    if err.is_decode() {
        RelayError::Malformed(err.to_string())
    } else if let Some(status) = err.status() {
        RelayError::Rejected {
            status: status.as_u16(),
        }
    } else {
        RelayError::Unreachable(err.to_string())
    }
}

#[async_trait]
impl StatusPoller for RelayClient {
    async fn check_server_health(&self) -> bool {
        match self.fetch_health().await {
            Ok(health) if health.is_ok() => true,
            Ok(health) => {
                debug!(status = %health.status, "relay reports unhealthy");
                false
            }
            Err(err) => {
                warn!("health check failed: {}", err);
                false
            }
        }
    }

    async fn get_device_status(&self) -> Option<DeviceSnapshot> {
        match self.fetch_device_status().await {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                warn!("device status fetch failed: {}", err);
                None
            }
        }
    }
}

#[async_trait]
impl CommandDispatcher for RelayClient {
    async fn send_command(&self, command: Command) -> bool {
        match self.post_command(command).await {
            Ok(response) if response.is_accepted() => {
                debug!(%command, echoed = ?response.command, "command accepted");
                true
            }
            Ok(response) => {
                warn!(%command, status = %response.status, "command not accepted");
                false
            }
            Err(err) => {
                warn!(%command, "command send failed: {}", err);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_keeps_base_path_prefix() {
        let client = RelayClient::new("https://relay.example/api/", RelayTimeouts::default())
            .expect("valid base");
        assert_eq!(
            client.endpoint(DEVICE_STATUS_PATH).as_str(),
            "https://relay.example/api/device/status"
        );

        let bare = RelayClient::new("http://127.0.0.1:8080", RelayTimeouts::default())
            .expect("valid base");
        assert_eq!(
            bare.endpoint(HEALTH_PATH).as_str(),
            "http://127.0.0.1:8080/health"
        );
    }

    #[test]
    fn rejects_non_http_base() {
        let err = RelayClient::new("ftp://relay.example", RelayTimeouts::default()).unwrap_err();
        assert!(matches!(err, RelayError::InvalidBaseUrl { .. }));

        let err = RelayClient::new("not a url", RelayTimeouts::default()).unwrap_err();
        assert!(matches!(err, RelayError::InvalidBaseUrl { .. }));
    }

    #[test]
    fn default_timeouts_match_relay_contract() {
        let timeouts = RelayTimeouts::default();
        assert_eq!(timeouts.health, Duration::from_secs(10));
        assert_eq!(timeouts.status, Duration::from_secs(10));
        assert_eq!(timeouts.command, Duration::from_secs(15));
    }

    #[tokio::test]
    async fn deadline_resolves_to_timed_out() {
        let result: Result<(), RelayError> = with_deadline(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(RelayError::TimedOut(_))));
    }
}
