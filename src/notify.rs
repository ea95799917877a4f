use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::observability::NOTIFICATIONS_TOTAL;

/// One message to one recipient. The engine builds these; it never sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyError(pub String);

impl std::fmt::Display for NotifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "notification failed: {}", self.0)
    }
}

impl std::error::Error for NotifyError {}

/// Outbound message transport (email, SMS, queue, ...).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, recipient: &str, subject: &str, body: &str) -> Result<(), NotifyError>;
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub sent: usize,
    pub failed: usize,
}

/// Best-effort fan-out. Failures are logged and counted, never returned:
/// committed cancellations stay committed whatever the transport does.
pub async fn dispatch(notifier: &dyn Notifier, notifications: &[Notification]) -> DispatchReport {
    let results = futures::future::join_all(notifications.iter().map(|n| async move {
        (n, notifier.notify(&n.recipient, &n.subject, &n.body).await)
    }))
    .await;

    let mut report = DispatchReport::default();
    for (n, result) in results {
        match result {
            Ok(()) => {
                report.sent += 1;
                metrics::counter!(NOTIFICATIONS_TOTAL, "status" => "sent").increment(1);
            }
            Err(e) => {
                report.failed += 1;
                metrics::counter!(NOTIFICATIONS_TOTAL, "status" => "failed").increment(1);
                warn!(recipient = %n.recipient, subject = %n.subject, "{e}");
            }
        }
    }
    report
}

/// Writes every message to the log. Used when no transport is wired in.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, recipient: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
        info!(%recipient, %subject, body_len = body.len(), "notification");
        Ok(())
    }
}

/// Keeps every delivered message in memory; recipients in `failing` get an error.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    failing: HashSet<String>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for<I, S>(recipients: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sent: Mutex::new(Vec::new()),
            failing: recipients.into_iter().map(Into::into).collect(),
        }
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, recipient: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
        if self.failing.contains(recipient) {
            return Err(NotifyError(format!("mailbox {recipient} unreachable")));
        }
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Notification {
                recipient: recipient.to_string(),
                subject: subject.to_string(),
                body: body.to_string(),
            });
        Ok(())
    }
}
