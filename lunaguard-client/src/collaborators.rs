//! Contracts with the rest of the app: audit log, session termination and
//! user-facing notices.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::error::CollaboratorError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EventCategory {
    Security,
    Vehicle,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventEntry {
    pub kind: String,
    pub message: String,
    #[serde(default)]
    pub related_entity_id: Option<String>,
    pub severity: Severity,
    pub category: EventCategory,
}

#[async_trait]
pub trait EventLog: Send + Sync {
    async fn log_event(&self, entry: EventEntry) -> Result<(), CollaboratorError>;
}

#[async_trait]
pub trait SessionTerminator: Send + Sync {
    async fn sign_out(&self) -> Result<(), CollaboratorError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeVariant {
    Success,
    Error,
}

/// A toast-style message for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub title: String,
    pub description: String,
    pub variant: NoticeVariant,
}

impl Notice {
    pub fn success(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            variant: NoticeVariant::Success,
        }
    }

    pub fn error(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            variant: NoticeVariant::Error,
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Notices end up in the log; used by the CLI.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notice: Notice) {
        match notice.variant {
            NoticeVariant::Success => info!(title = %notice.title, "{}", notice.description),
            NoticeVariant::Error => warn!(title = %notice.title, "{}", notice.description),
        }
    }
}

/// Forwards notices to whoever renders them.
impl Notifier for mpsc::UnboundedSender<Notice> {
    fn notify(&self, notice: Notice) {
        let _ = self.send(notice);
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventLog;

#[async_trait]
impl EventLog for TracingEventLog {
    async fn log_event(&self, entry: EventEntry) -> Result<(), CollaboratorError> {
        info!(
            kind = %entry.kind,
            severity = ?entry.severity,
            category = ?entry.category,
            related = ?entry.related_entity_id,
            "{}",
            entry.message
        );
        Ok(())
    }
}

/// The app-side implementations a client runtime is built with.
pub struct Collaborators {
    pub event_log: Arc<dyn EventLog>,
    pub terminator: Arc<dyn SessionTerminator>,
    pub notifier: Arc<dyn Notifier>,
}

/// Fire-and-forget: the entry is written on its own task and a failure is
/// only logged.
pub fn spawn_log_event(log: Arc<dyn EventLog>, entry: EventEntry) {
    tokio::spawn(async move {
        let kind = entry.kind.clone();
        if let Err(err) = log.log_event(entry).await {
            error!(%kind, "event log write failed: {}", err);
        }
    });
}
