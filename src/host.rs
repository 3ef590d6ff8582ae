//! The host notification channel.
//!
//! The surrounding application (the "host") owns the actual display surface
//! and the transport to it. This crate only ever talks to it through
//! [`HostNotifier`], keeping the wire protocol a black box.

use std::sync::Arc;

use crate::registry::InstanceKey;

// ============================================================================
// PollStatus
// ============================================================================

/// Status of the most recent poll, surfaced to a companion UI (such as a
/// settings inspector) so it can show current health without waiting for
/// the next tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollStatus {
    /// Whether the poll succeeded.
    pub success: bool,
    /// A short human-readable status, e.g. `"Success"` or an error message.
    pub status_message: String,
}

impl PollStatus {
    /// Status for a successful poll.
    pub fn succeeded() -> Self {
        Self {
            success: true,
            status_message: "Success".into(),
        }
    }

    /// Status for a failed poll with the given message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            status_message: message.into(),
        }
    }
}

// ============================================================================
// HostNotifier
// ============================================================================

/// Channel for pushing display updates to the host.
///
/// Implementations are expected to be cheap, synchronous sends (an outbound
/// message queue); all composition work happens before these calls.
pub trait HostNotifier: Send + Sync {
    /// Sets the displayed image for an action instance.
    ///
    /// `None` restores the host's default image for the action.
    fn set_image(&self, key: &InstanceKey, image: Option<String>);

    /// Sets the textual title overlay for an action instance.
    fn set_title(&self, key: &InstanceKey, title: &str);

    /// Reports the status of the most recent poll. Defaults to a no-op for
    /// hosts without a companion UI.
    fn poll_status(&self, _key: &InstanceKey, _status: PollStatus) {}
}

impl<T: HostNotifier + ?Sized> HostNotifier for Arc<T> {
    fn set_image(&self, key: &InstanceKey, image: Option<String>) {
        (**self).set_image(key, image);
    }

    fn set_title(&self, key: &InstanceKey, title: &str) {
        (**self).set_title(key, title);
    }

    fn poll_status(&self, key: &InstanceKey, status: PollStatus) {
        (**self).poll_status(key, status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_status_constructors() {
        let ok = PollStatus::succeeded();
        assert!(ok.success);
        assert_eq!(ok.status_message, "Success");

        let failed = PollStatus::failed("Unauthorized");
        assert!(!failed.success);
        assert_eq!(failed.status_message, "Unauthorized");
    }
}
