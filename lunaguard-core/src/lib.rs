use std::{fmt, str::FromStr, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_RELAY_URL: &str = "https://mqtt-broker-service-nine.vercel.app";
pub const HEALTH_PATH: &str = "/health";
pub const DEVICE_STATUS_PATH: &str = "/device/status";
pub const DEVICE_COMMAND_PATH: &str = "/device/command";

pub const HEALTH_TIMEOUT: Duration = Duration::from_secs(10);
pub const STATUS_TIMEOUT: Duration = Duration::from_secs(10);
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(15);

/// Wait between a command's acceptance and the follow-up status poll.
pub const SETTLE_DELAY: Duration = Duration::from_millis(1000);
/// A snapshot older than this is treated as an offline device.
pub const FRESHNESS_WINDOW: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_millis(3_600_000);
/// Downward pull distance that arms the refresh gesture.
pub const PULL_THRESHOLD: f64 = 80.0;

pub const STATUS_OK: &str = "ok";
pub const STATUS_SENT: &str = "sent";

pub const NEVER_SYNCED: &str = "Nunca";
pub const JUST_SYNCED: &str = "Hace unos segundos";

/// Last-known device state as reported by the relay.
///
/// Snapshots are values: every poll produces a new one that replaces the
/// previous snapshot wholesale.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSnapshot {
    pub is_locked: bool,
    pub has_power: bool,
    pub panic: bool,
    #[serde(rename = "lastUpdate", alias = "lastUpdateTime")]
    pub last_update_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_command: Option<String>,
}

impl DeviceSnapshot {
    /// Factory state of a freshly installed controller: locked, powered, no panic.
    pub fn initial(now: DateTime<Utc>) -> Self {
        Self {
            is_locked: true,
            has_power: true,
            panic: false,
            last_update_time: now,
            last_command: None,
        }
    }

    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        let age_ms = now
            .signed_duration_since(self.last_update_time)
            .num_milliseconds();
        age_ms < FRESHNESS_WINDOW.as_millis() as i64
    }

    /// The state a device reports after executing `command` at `now`.
    #[must_use]
    pub fn after_command(&self, command: Command, now: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        match command {
            Command::Lock => next.is_locked = true,
            Command::Unlock => next.is_locked = false,
            Command::Disconnect => next.has_power = false,
            Command::Reconnect => next.has_power = true,
            Command::Panic => next.panic = true,
            Command::NoPanic => next.panic = false,
        }
        next.last_update_time = now;
        next.last_command = Some(command.as_str().to_owned());
        next
    }
}

/// Online means a snapshot was obtained and it is still fresh.
pub fn is_device_online(snapshot: Option<&DeviceSnapshot>, now: DateTime<Utc>) -> bool {
    snapshot.is_some_and(|s| s.is_fresh(now))
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Command {
    Lock,
    Unlock,
    Disconnect,
    Reconnect,
    Panic,
    NoPanic,
}

impl Command {
    pub const ALL: [Command; 6] = [
        Command::Lock,
        Command::Unlock,
        Command::Disconnect,
        Command::Reconnect,
        Command::Panic,
        Command::NoPanic,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Command::Lock => "lock",
            Command::Unlock => "unlock",
            Command::Disconnect => "disconnect",
            Command::Reconnect => "reconnect",
            Command::Panic => "panic",
            Command::NoPanic => "no-panic",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Command::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| CoreError::UnknownCommand(s.to_owned()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandRequest {
    pub command: Command,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandResponse {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

impl CommandResponse {
    pub fn sent(command: Command) -> Self {
        Self {
            status: STATUS_SENT.to_owned(),
            command: Some(command.as_str().to_owned()),
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.status == STATUS_SENT
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthResponse {
    pub status: String,
}

impl HealthResponse {
    pub fn ok() -> Self {
        Self {
            status: STATUS_OK.to_owned(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unknown command {0:?}")]
    UnknownCommand(String),
}

/// Human-readable recency of the last sync, `None` meaning never synced.
pub fn format_time_since(elapsed: Option<Duration>) -> String {
    let Some(elapsed) = elapsed else {
        return NEVER_SYNCED.to_owned();
    };

    let minutes = elapsed.as_secs() / 60;
    let hours = minutes / 60;
    if hours > 0 {
        format!("Hace {}h {}m", hours, minutes % 60)
    } else if minutes > 0 {
        format!("Hace {minutes}m")
    } else {
        JUST_SYNCED.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_735_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn command_wire_names() {
        let names: Vec<String> = Command::ALL
            .iter()
            .map(|c| serde_json::to_string(c).unwrap())
            .collect();
        assert_eq!(
            names,
            vec![
                "\"lock\"",
                "\"unlock\"",
                "\"disconnect\"",
                "\"reconnect\"",
                "\"panic\"",
                "\"no-panic\""
            ]
        );
        for c in Command::ALL {
            assert_eq!(c.to_string().parse::<Command>().unwrap(), c);
        }
    }

    #[test]
    fn unknown_command_is_rejected() {
        let err = "explode".parse::<Command>().unwrap_err();
        assert!(matches!(err, CoreError::UnknownCommand(ref s) if s == "explode"));
    }

    #[test]
    fn snapshot_parses_relay_payload() {
        let raw = r#"{
            "isLocked": false,
            "hasPower": true,
            "panic": false,
            "lastUpdate": "2025-01-01T10:00:00Z",
            "lastCommand": "unlock"
        }"#;
        let snapshot: DeviceSnapshot = serde_json::from_str(raw).unwrap();
        assert!(!snapshot.is_locked);
        assert!(snapshot.has_power);
        assert_eq!(snapshot.last_command.as_deref(), Some("unlock"));

        let aliased = r#"{"isLocked":true,"hasPower":false,"panic":true,"lastUpdateTime":"2025-01-01T10:00:00Z"}"#;
        let snapshot: DeviceSnapshot = serde_json::from_str(aliased).unwrap();
        assert!(snapshot.panic);
        assert_eq!(snapshot.last_command, None);
    }

    #[test]
    fn snapshot_missing_field_is_malformed() {
        let raw = r#"{"isLocked":true,"lastUpdate":"2025-01-01T10:00:00Z"}"#;
        assert!(serde_json::from_str::<DeviceSnapshot>(raw).is_err());
    }

    #[test]
    fn freshness_window_is_five_minutes() {
        let snapshot = DeviceSnapshot::initial(at(0));
        assert!(snapshot.is_fresh(at(299)));
        assert!(!snapshot.is_fresh(at(300)));
        assert!(snapshot.is_fresh(at(-30)));

        assert!(is_device_online(Some(&snapshot), at(10)));
        assert!(!is_device_online(Some(&snapshot), at(3_600)));
        assert!(!is_device_online(None, at(0)));
    }

    #[test]
    fn after_command_replaces_only_the_targeted_state() {
        let base = DeviceSnapshot::initial(at(0));
        let unlocked = base.after_command(Command::Unlock, at(5));
        assert!(!unlocked.is_locked);
        assert!(unlocked.has_power);
        assert_eq!(unlocked.last_update_time, at(5));
        assert_eq!(unlocked.last_command.as_deref(), Some("unlock"));

        let panicked = unlocked.after_command(Command::Panic, at(6));
        assert!(panicked.panic);
        assert!(!panicked.is_locked);
        assert_eq!(base.last_command, None);
    }

    #[test]
    fn time_since_last_sync_phrases() {
        assert_eq!(format_time_since(None), "Nunca");
        assert_eq!(
            format_time_since(Some(Duration::from_secs(30))),
            "Hace unos segundos"
        );
        assert_eq!(format_time_since(Some(Duration::from_secs(90))), "Hace 1m");
        assert_eq!(
            format_time_since(Some(Duration::from_secs(3_700))),
            "Hace 1h 1m"
        );
        assert_eq!(
            format_time_since(Some(Duration::from_secs(7_200))),
            "Hace 2h 0m"
        );
    }

    #[test]
    fn response_markers() {
        assert!(CommandResponse::sent(Command::Lock).is_accepted());
        let queued: CommandResponse = serde_json::from_str(r#"{"status":"queued"}"#).unwrap();
        assert!(!queued.is_accepted());
        assert!(HealthResponse::ok().is_ok());
        let degraded: HealthResponse = serde_json::from_str(r#"{"status":"degraded"}"#).unwrap();
        assert!(!degraded.is_ok());
    }
}
