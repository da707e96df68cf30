//! Notification dispatch.
//!
//! Services call [`Notifier::notify`] after their store transaction has
//! committed; delivery is fire-and-forget and a failed or slow notifier
//! can never roll back ledger state. Transport is out of scope here, so
//! the production implementation emits structured log events.

use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
pub enum NotifyTarget {
    User(Uuid),
    Admins,
}

pub trait Notifier: Send + Sync {
    fn notify(&self, target: NotifyTarget, event: &str, payload: Value);
}

/// Emits every notification as a tracing event.
#[derive(Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, target: NotifyTarget, event: &str, payload: Value) {
        match target {
            NotifyTarget::User(user_id) => {
                tracing::info!(user = %user_id, event, %payload, "notification dispatched");
            }
            NotifyTarget::Admins => {
                tracing::info!(audience = "admins", event, %payload, "notification dispatched");
            }
        }
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Collects notifications for assertions.
    #[derive(Default)]
    pub struct RecordingNotifier {
        pub events: Mutex<Vec<(String, Value)>>,
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, _target: NotifyTarget, event: &str, payload: Value) {
            self.events
                .lock()
                .expect("notifier mutex poisoned")
                .push((event.to_string(), payload));
        }
    }
}
