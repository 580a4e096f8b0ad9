//! Notification records delivered by the cloud.
//!
//! The wire format is a flat JSON object tagged by `type`. Records are decoded
//! once, at the boundary, into [`Notification`] so the router never inspects
//! raw JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of a notification record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NotificationKind {
    /// Status values changed on a device
    Status,
    /// One or more device events fired
    Events,
    /// Periodic liveness message from the cloud
    HealthCheck,
    /// Signed action message (deactivation, update, ...)
    Action,
    /// Any type this client does not know about
    Unknown,
}

impl NotificationKind {
    /// Parse the wire `type` tag.
    #[must_use]
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "status" => Self::Status,
            "events" => Self::Events,
            "healthCheck" => Self::HealthCheck,
            "action" => Self::Action,
            _ => Self::Unknown,
        }
    }
}

/// Fields common to every notification record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Integration (app) identifier
    pub app_id: Option<String>,
    /// Device the record originates from
    pub device_id: Option<String>,
    /// Workspace the device belongs to
    pub workspace_id: Option<String>,
    /// Organization identifier
    pub org_id: Option<String>,
    /// Server timestamp, as sent
    pub timestamp: Option<String>,
}

impl Envelope {
    fn from_record(record: &Value) -> Self {
        Self {
            app_id: string_field(record, "appId"),
            device_id: string_field(record, "deviceId"),
            workspace_id: string_field(record, "workspaceId"),
            org_id: string_field(record, "orgId"),
            timestamp: string_field(record, "timestamp"),
        }
    }
}

/// A decoded notification record.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// `changes.updated` of a status record, as `(path, value)` pairs
    Status {
        /// Common record fields
        envelope: Envelope,
        /// Updated status values
        updates: Vec<(String, Value)>,
    },
    /// `events[]` of an events record, as `(key, value)` pairs
    Events {
        /// Common record fields
        envelope: Envelope,
        /// Fired events
        events: Vec<(String, Value)>,
    },
    /// Health check, informational only
    HealthCheck {
        /// Common record fields
        envelope: Envelope,
    },
    /// Signed action; must be verified before use
    Action {
        /// Common record fields
        envelope: Envelope,
        /// Signed action token
        jwt: String,
    },
    /// Unrecognized record, kept verbatim
    Unknown {
        /// Wire `type` tag (empty if missing)
        kind: String,
        /// Common record fields
        envelope: Envelope,
        /// Full record
        raw: Value,
    },
}

impl Notification {
    /// Decode a wire record.
    ///
    /// # Errors
    ///
    /// Returns error if the record is not an object, or if a known record
    /// type lacks the fields it is defined by.
    pub fn from_value(record: Value) -> Result<Self, NotificationError> {
        if !record.is_object() {
            return Err(NotificationError::NotAnObject);
        }

        let tag = string_field(&record, "type").unwrap_or_default();
        let envelope = Envelope::from_record(&record);

        let notification = match NotificationKind::from_tag(&tag) {
            NotificationKind::Status => {
                let updates = record
                    .pointer("/changes/updated")
                    .and_then(Value::as_object)
                    .map(|updated| {
                        updated
                            .iter()
                            .map(|(path, value)| (path.clone(), value.clone()))
                            .collect()
                    })
                    .unwrap_or_default();
                Self::Status { envelope, updates }
            }
            NotificationKind::Events => {
                let entries = record
                    .get("events")
                    .and_then(Value::as_array)
                    .ok_or(NotificationError::MissingField("events"))?;
                let events = entries
                    .iter()
                    .filter_map(|entry| {
                        let key = entry.get("key").and_then(Value::as_str)?;
                        let value = entry.get("value").cloned().unwrap_or(Value::Null);
                        Some((key.to_string(), value))
                    })
                    .collect();
                Self::Events { envelope, events }
            }
            NotificationKind::HealthCheck => Self::HealthCheck { envelope },
            NotificationKind::Action => {
                let jwt = string_field(&record, "jwt")
                    .ok_or(NotificationError::MissingField("jwt"))?;
                Self::Action { envelope, jwt }
            }
            NotificationKind::Unknown => Self::Unknown {
                kind: tag,
                envelope,
                raw: record,
            },
        };

        Ok(notification)
    }

    /// The kind of this record.
    #[must_use]
    pub fn kind(&self) -> NotificationKind {
        match self {
            Self::Status { .. } => NotificationKind::Status,
            Self::Events { .. } => NotificationKind::Events,
            Self::HealthCheck { .. } => NotificationKind::HealthCheck,
            Self::Action { .. } => NotificationKind::Action,
            Self::Unknown { .. } => NotificationKind::Unknown,
        }
    }

    /// Common record fields.
    #[must_use]
    pub fn envelope(&self) -> &Envelope {
        match self {
            Self::Status { envelope, .. }
            | Self::Events { envelope, .. }
            | Self::HealthCheck { envelope }
            | Self::Action { envelope, .. }
            | Self::Unknown { envelope, .. } => envelope,
        }
    }

    /// Originating device, or an empty string when the record has none.
    #[must_use]
    pub fn device_id(&self) -> &str {
        self.envelope().device_id.as_deref().unwrap_or_default()
    }
}

fn string_field(record: &Value, key: &str) -> Option<String> {
    record.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Errors that can occur decoding notification records.
#[derive(Debug, Clone, thiserror::Error)]
pub enum NotificationError {
    /// Record is not a JSON object
    #[error("notification record is not an object")]
    NotAnObject,
    /// A field required by the record type is absent
    #[error("notification record missing field: {0}")]
    MissingField(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_status_record() {
        let record = json!({
            "type": "status",
            "deviceId": "dev-1",
            "orgId": "org-1",
            "timestamp": "2024-01-01T00:00:00Z",
            "changes": { "updated": { "Audio.Volume": 33 }, "removed": [] }
        });

        let notification = Notification::from_value(record).unwrap();

        assert_eq!(notification.kind(), NotificationKind::Status);
        assert_eq!(notification.device_id(), "dev-1");
        let Notification::Status { updates, .. } = notification else {
            panic!("expected status");
        };
        assert_eq!(updates, vec![("Audio.Volume".to_string(), json!(33))]);
    }

    #[test]
    fn status_without_changes_has_no_updates() {
        let notification = Notification::from_value(json!({ "type": "status" })).unwrap();
        assert!(
            matches!(notification, Notification::Status { updates, .. } if updates.is_empty())
        );
    }

    #[test]
    fn decode_events_record() {
        let record = json!({
            "type": "events",
            "deviceId": "dev-2",
            "events": [
                { "key": "UserInterface.Extensions.Widget.Action", "value": { "WidgetId": "w1" } },
                { "key": "Standby.Activated", "value": true },
                { "value": "no key, skipped" }
            ]
        });

        let Notification::Events { events, envelope } = Notification::from_value(record).unwrap()
        else {
            panic!("expected events");
        };

        assert_eq!(envelope.device_id.as_deref(), Some("dev-2"));
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].0, "UserInterface.Extensions.Widget.Action");
        assert_eq!(events[1].1, json!(true));
    }

    #[test]
    fn events_record_requires_events_array() {
        let result = Notification::from_value(json!({ "type": "events" }));
        assert!(matches!(result, Err(NotificationError::MissingField("events"))));
    }

    #[test]
    fn decode_action_record() {
        let record = json!({ "type": "action", "jwt": "a.b.c" });
        let notification = Notification::from_value(record).unwrap();
        assert!(matches!(notification, Notification::Action { jwt, .. } if jwt == "a.b.c"));
    }

    #[test]
    fn unknown_type_is_kept() {
        let record = json!({ "type": "somethingNew", "deviceId": "dev-3" });
        let notification = Notification::from_value(record.clone()).unwrap();

        assert_eq!(notification.kind(), NotificationKind::Unknown);
        let Notification::Unknown { kind, raw, .. } = notification else {
            panic!("expected unknown");
        };
        assert_eq!(kind, "somethingNew");
        assert_eq!(raw, record);
    }

    #[test]
    fn non_object_is_rejected() {
        assert!(matches!(
            Notification::from_value(json!([1, 2])),
            Err(NotificationError::NotAnObject)
        ));
    }
}
