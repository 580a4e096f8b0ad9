//! Listener registries and notification fan-out.

use crate::notification::Notification;
use crate::path::path_matches;
use parking_lot::RwLock;
use serde_json::Value;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Callback invoked for a matching status update or event.
///
/// Arguments are `(device_id, path, value, notification)`.
pub type Listener = Arc<dyn Fn(&str, &str, &Value, &Notification) + Send + Sync>;

/// Handle returned on registration, used to remove a listener again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Clone)]
struct Registration {
    id: ListenerId,
    pattern: String,
    callback: Listener,
}

/// Dispatches decoded notifications to listeners registered by path pattern.
///
/// Status and event listeners live in separate registries. Within a registry,
/// listeners are invoked in registration order.
#[derive(Default)]
pub struct NotificationRouter {
    status: RwLock<Vec<Registration>>,
    events: RwLock<Vec<Registration>>,
    next_id: AtomicU64,
}

impl NotificationRouter {
    /// Create an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for status updates matching `pattern`.
    pub fn on_status<F>(&self, pattern: impl Into<String>, callback: F) -> ListenerId
    where
        F: Fn(&str, &str, &Value, &Notification) + Send + Sync + 'static,
    {
        self.register(&self.status, pattern.into(), Arc::new(callback))
    }

    /// Register a listener for events matching `pattern`.
    pub fn on_event<F>(&self, pattern: impl Into<String>, callback: F) -> ListenerId
    where
        F: Fn(&str, &str, &Value, &Notification) + Send + Sync + 'static,
    {
        self.register(&self.events, pattern.into(), Arc::new(callback))
    }

    fn register(
        &self,
        registry: &RwLock<Vec<Registration>>,
        pattern: String,
        callback: Listener,
    ) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(pattern = %pattern, "Registered listener");
        registry.write().push(Registration {
            id,
            pattern,
            callback,
        });
        id
    }

    /// Remove a previously registered listener.
    ///
    /// Returns `false` if no listener with this id exists.
    pub fn remove(&self, id: ListenerId) -> bool {
        for registry in [&self.status, &self.events] {
            let mut registrations = registry.write();
            if let Some(index) = registrations.iter().position(|r| r.id == id) {
                registrations.remove(index);
                return true;
            }
        }
        false
    }

    /// Number of registered status listeners.
    #[must_use]
    pub fn status_listener_count(&self) -> usize {
        self.status.read().len()
    }

    /// Number of registered event listeners.
    #[must_use]
    pub fn event_listener_count(&self) -> usize {
        self.events.read().len()
    }

    /// Dispatch one notification.
    ///
    /// Returns how many listener invocations were made. Actions are not
    /// dispatched here; they need signature verification first.
    pub fn process(&self, notification: &Notification) -> usize {
        match notification {
            Notification::Status { updates, .. } => {
                fan_out(&self.status, updates, notification)
            }
            Notification::Events { events, .. } => fan_out(&self.events, events, notification),
            Notification::HealthCheck { .. } => {
                tracing::debug!("Received health check");
                0
            }
            Notification::Action { .. } => {
                tracing::debug!("Action notifications are handled by the session");
                0
            }
            Notification::Unknown { kind, .. } => {
                tracing::debug!(kind = %kind, "Dropping unknown notification");
                0
            }
        }
    }
}

impl std::fmt::Debug for NotificationRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationRouter")
            .field("status_listeners", &self.status_listener_count())
            .field("event_listeners", &self.event_listener_count())
            .finish()
    }
}

fn fan_out(
    registry: &RwLock<Vec<Registration>>,
    entries: &[(String, Value)],
    notification: &Notification,
) -> usize {
    // Snapshot so callbacks can register listeners without deadlocking.
    let registrations = registry.read().clone();
    let device_id = notification.device_id();
    let mut invoked = 0;

    for (path, value) in entries {
        for registration in &registrations {
            if !path_matches(path, &registration.pattern) {
                continue;
            }

            invoked += 1;
            let callback = &registration.callback;
            let result = catch_unwind(AssertUnwindSafe(|| {
                callback(device_id, path, value, notification);
            }));
            if result.is_err() {
                tracing::error!(
                    path = %path,
                    pattern = %registration.pattern,
                    "Listener panicked, continuing dispatch"
                );
            }
        }
    }

    invoked
}
