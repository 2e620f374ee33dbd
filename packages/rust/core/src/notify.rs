//! Notification sink for publish outcomes.

use serde::Serialize;

/// Severity of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeKind {
    Info,
    Success,
    Error,
}

/// Metadata attached to a notification message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub kind: NoticeKind,
    /// Link to the affected record, when there is one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Notice {
    pub fn info(url: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Info,
            url: Some(url.into()),
        }
    }

    pub fn success(url: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Success,
            url: Some(url.into()),
        }
    }
}

/// Receives the single human-readable outcome of a publish.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str, notice: &Notice);
}

impl<F> Notifier for F
where
    F: Fn(&str, &Notice) + Send + Sync,
{
    fn notify(&self, message: &str, notice: &Notice) {
        self(message, notice)
    }
}

/// No-op notifier for headless/test usage.
pub struct SilentNotifier;

impl Notifier for SilentNotifier {
    fn notify(&self, _message: &str, _notice: &Notice) {}
}
