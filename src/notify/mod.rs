//! Out-of-band user notifications
//!
//! Upload outcomes are reported through a [`NotificationSink`] rather than as
//! return values, because folder-upload workers finish after control has left
//! the caller. Delivery is fire-and-forget: sinks log their own failures and
//! never report them back.

use crate::error::HostFilesError;
use crossbeam::channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Notification severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Operation completed
    Success,
    /// Operation failed
    Error,
}

/// A human-readable, severity-tagged message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Severity
    pub severity: Severity,
    /// Short title
    pub title: String,
    /// Message body
    pub body: String,
}

impl Notification {
    /// Success message
    pub fn success(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            severity: Severity::Success,
            title: title.into(),
            body: body.into(),
        }
    }

    /// Error message
    pub fn error(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            title: title.into(),
            body: body.into(),
        }
    }

    /// Error message carrying the error's code and text
    pub fn from_error(title: impl Into<String>, action: &str, err: &HostFilesError) -> Self {
        Self::error(
            title,
            format!(
                "{} failed:\nerrCode: {}, errMsg: {}",
                action,
                err.code(),
                err
            ),
        )
    }
}

/// Receiver of notifications
pub trait NotificationSink: Send + Sync {
    /// Deliver a notification to `recipient`
    fn send(&self, recipient: &str, notification: Notification);
}

/// Writes notifications to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn send(&self, recipient: &str, notification: Notification) {
        match notification.severity {
            Severity::Success => tracing::info!(
                recipient,
                title = %notification.title,
                "{}",
                notification.body
            ),
            Severity::Error => tracing::error!(
                recipient,
                title = %notification.title,
                "{}",
                notification.body
            ),
        }
    }
}

/// A delivered notification with its recipient
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Addressee
    pub recipient: String,
    /// Delivered message
    pub notification: Notification,
}

/// Forwards notifications over a channel
pub struct ChannelSink {
    tx: Sender<Delivery>,
}

impl ChannelSink {
    /// Create a sink and the receiving end of its channel
    pub fn new() -> (Self, Receiver<Delivery>) {
        let (tx, rx) = unbounded();
        (Self { tx }, rx)
    }
}

impl NotificationSink for ChannelSink {
    fn send(&self, recipient: &str, notification: Notification) {
        let delivery = Delivery {
            recipient: recipient.to_string(),
            notification,
        };
        if self.tx.send(delivery).is_err() {
            tracing::warn!("Notification receiver dropped, message discarded");
        }
    }
}

/// Keeps every notification in memory, in delivery order
#[derive(Debug, Default)]
pub struct CollectingSink {
    delivered: Mutex<Vec<Delivery>>,
}

impl CollectingSink {
    /// Create an empty collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of delivered notifications
    pub fn delivered(&self) -> Vec<Delivery> {
        self.delivered
            .lock()
            .map(|d| d.clone())
            .unwrap_or_default()
    }

    /// Delivered notifications of one severity
    pub fn with_severity(&self, severity: Severity) -> Vec<Notification> {
        self.delivered()
            .into_iter()
            .map(|d| d.notification)
            .filter(|n| n.severity == severity)
            .collect()
    }
}

impl NotificationSink for CollectingSink {
    fn send(&self, recipient: &str, notification: Notification) {
        if let Ok(mut delivered) = self.delivered.lock() {
            delivered.push(Delivery {
                recipient: recipient.to_string(),
                notification,
            });
        }
    }
}
