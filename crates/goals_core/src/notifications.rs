use serde::{Deserialize, Serialize};

/// A notification ready to be shown by the host platform.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationRequest {
    pub title: String,
    pub body: String,
}

/// Platform-specific notification adapters implement this trait.
///
/// Delivery is fire-and-forget: an adapter that cannot show the notification
/// (capability missing, permission denied) drops the request; the only
/// observable symptom is the notification not appearing.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, request: NotificationRequest);
}

/// Sink for hosts without a notification capability.
#[derive(Debug, Default)]
pub struct NullSink;

impl NotificationSink for NullSink {
    fn notify(&self, request: NotificationRequest) {
        tracing::debug!(title = %request.title, "no notification capability, dropping");
    }
}
