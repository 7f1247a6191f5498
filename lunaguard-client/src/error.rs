use std::io;

use thiserror::Error;

/// Why a relay call did not produce a usable answer.
///
/// Call failures never reach users of `StatusPoller`/`CommandDispatcher`; they
/// are logged and normalized to `false`/`None` at that boundary. Only the
/// setup variants surface, from `RelayClient::new`.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("invalid relay base url {url:?}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },
    #[error("http client setup failed: {0}")]
    Setup(String),
    #[error("relay unreachable: {0}")]
    Unreachable(String),
    #[error("relay did not answer within {0:?}")]
    TimedOut(std::time::Duration),
    #[error("relay answered with HTTP {status}")]
    Rejected { status: u16 },
    #[error("relay payload malformed: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("device status unavailable")]
    DeviceUnavailable,
    #[error("{name} refresh failed: {reason}")]
    Collaborator { name: String, reason: String },
}

#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("event log rejected entry: {0}")]
    EventLog(String),
    #[error("sign-out failed: {0}")]
    SignOut(String),
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("metadata read failed: {0}")]
    Metadata(#[source] io::Error),
    #[error("file too large: {size} bytes (max {max})")]
    TooLarge { size: u64, max: u64 },
    #[error("read failed: {0}")]
    Read(#[source] io::Error),
    #[error("parse failed: {0}")]
    Parse(#[source] serde_json::Error),
    #[error("serialize failed: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("tmp write failed: {0}")]
    WriteTmp(#[source] io::Error),
    #[error("rename failed: {0}")]
    Rename(#[source] io::Error),
    #[error("remove failed: {0}")]
    Remove(#[source] io::Error),
}
