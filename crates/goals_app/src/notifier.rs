use goals_core::notifications::{NotificationRequest, NotificationSink};
use notify_rust::Notification;
use tracing::warn;

/// Desktop notifications via the system notification daemon. Delivery
/// failures are logged and dropped; the reminder contract treats a missing
/// notification as the only acceptable symptom.
#[derive(Debug, Default)]
pub struct DesktopNotifier;

impl NotificationSink for DesktopNotifier {
    fn notify(&self, request: NotificationRequest) {
        if let Err(err) = Notification::new()
            .summary(&request.title)
            .body(&request.body)
            .show()
        {
            warn!(%err, title = %request.title, "failed to show notification");
        }
    }
}
