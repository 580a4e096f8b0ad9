//! Request and response bodies of the cloud API.
//!
//! Responses are decoded leniently: unknown fields are kept in `extra` and
//! missing ones fall back to defaults.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Body of the refresh-token exchange.
#[derive(Debug, Clone, Serialize)]
pub struct TokenRequest {
    /// Always `refresh_token`
    pub grant_type: &'static str,
    /// Integration client id
    pub client_id: String,
    /// Integration client secret
    pub client_secret: String,
    /// Long-lived refresh token from the activation code
    pub refresh_token: String,
}

impl TokenRequest {
    /// Build a refresh-token grant.
    #[must_use]
    pub fn refresh(client_id: &str, client_secret: &str, refresh_token: &str) -> Self {
        Self {
            grant_type: "refresh_token",
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            refresh_token: refresh_token.to_string(),
        }
    }
}

impl std::fmt::Display for TokenRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} for client {}", self.grant_type, self.client_id)
    }
}

/// Successful token exchange.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    /// Bearer value
    pub access_token: String,
    /// Lifetime in seconds
    pub expires_in: u64,
    /// Rotated refresh token, when the server issues one
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Token type, normally `Bearer`
    #[serde(default)]
    pub token_type: Option<String>,
}

/// How the cloud delivers notifications to the integration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationMode {
    /// The integration polls a queue URL
    #[serde(rename = "longpolling")]
    LongPolling,
    /// The cloud posts to a public URL
    Webhook,
    /// No notifications
    #[default]
    None,
}

/// How webhook deliveries are authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookType {
    /// HMAC signature over the body using `secret`
    HmacSignature,
    /// HTTP basic authentication
    BasicAuthentication,
    /// Removes the webhook
    None,
}

/// Public webhook registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Webhook {
    /// HTTPS URL the cloud posts to
    pub target_url: String,
    /// Authentication scheme
    #[serde(rename = "type")]
    pub kind: WebhookType,
    /// Shared secret sent with every delivery
    pub secret: String,
    /// Basic auth user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Basic auth password
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// Queue settings in an activation request or app info.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Queue {
    /// Long-poll URL (response only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_url: Option<String>,
    /// `enabled` or `disabled`
    #[serde(default)]
    pub state: String,
}

/// Body PATCHed to the app URL to activate the integration.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivationRequest {
    /// Always `completed`
    pub provisioning_state: &'static str,
    /// Webhook registration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook: Option<Webhook>,
    /// Where signed actions are posted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actions_url: Option<String>,
    /// Enables the long-poll queue
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue: Option<Queue>,
}

impl ActivationRequest {
    /// Build the request for the given delivery mode.
    #[must_use]
    pub fn new(
        mode: NotificationMode,
        webhook: Option<Webhook>,
        actions_url: Option<String>,
    ) -> Self {
        let queue = (mode == NotificationMode::LongPolling).then(|| Queue {
            poll_url: None,
            state: "enabled".to_string(),
        });
        let webhook = if mode == NotificationMode::Webhook {
            webhook
        } else {
            None
        };

        Self {
            provisioning_state: "completed",
            webhook,
            actions_url,
            queue,
        }
    }
}

/// xAPI access granted by the manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XapiAccessKeys {
    /// Allowed commands
    #[serde(default)]
    pub commands: Vec<String>,
    /// Allowed statuses
    #[serde(default)]
    pub statuses: Vec<String>,
    /// Allowed events
    #[serde(default)]
    pub events: Vec<String>,
}

/// Integration details returned by the app URL.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppInfo {
    /// Integration id
    pub id: String,
    /// Manifest version
    pub manifest_version: u32,
    /// Granted OAuth scopes
    pub scopes: Vec<String>,
    /// Granted roles
    pub roles: Vec<String>,
    /// xAPI access
    pub xapi_access_keys: XapiAccessKeys,
    /// Provisioning state, `completed` once activated
    pub provisioning_state: String,
    /// Locations the integration may see
    pub public_location_ids: Vec<String>,
    /// Long-poll queue, when enabled
    pub queue: Option<Queue>,
    /// Availability, e.g. `org_private`
    pub availability: String,
    /// Fields not modeled above
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AppInfo {
    /// Long-poll URL, if the queue is enabled.
    #[must_use]
    pub fn poll_url(&self) -> Option<&str> {
        self.queue.as_ref().and_then(|q| q.poll_url.as_deref())
    }
}

/// One operation of a JSON-patch configuration update.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigPatch {
    /// Always `replace`
    pub op: &'static str,
    /// `<Config.Path>/sources/configured/value`
    pub path: String,
    /// New value
    pub value: Value,
}

impl ConfigPatch {
    /// Replace the configured value of `config_path`.
    #[must_use]
    pub fn replace(config_path: &str, value: Value) -> Self {
        Self {
            op: "replace",
            path: format!("{config_path}/sources/configured/value"),
            value,
        }
    }
}

/// Body of an xAPI command.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandRequest {
    /// Target device
    pub device_id: String,
    /// Command parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
    /// Multiline command body
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

/// A device as listed by the devices API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Device {
    /// Device id
    pub id: String,
    /// Display name
    pub display_name: String,
    /// Workspace the device is in
    pub workspace_id: Option<String>,
    /// Organization id
    pub org_id: String,
    /// Product name, e.g. `Cisco Room Kit`
    pub product: String,
    /// `roomdesk`, `accessory`, `webexgo` or `unknown`
    #[serde(rename = "type")]
    pub kind: String,
    /// Tags set in Control Hub
    pub tags: Vec<String>,
    /// Serial number
    pub serial: String,
    /// Software version
    pub software: String,
    /// `connected`, `disconnected`, ...
    pub connection_status: String,
    /// Fields not modeled above
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A workspace as listed by the workspaces API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Workspace {
    /// Workspace id
    pub id: String,
    /// Organization id
    pub org_id: String,
    /// Display name
    pub display_name: String,
    /// SIP address
    pub sip_address: String,
    /// Seating capacity
    pub capacity: Option<u32>,
    /// `meetingRoom`, `huddle`, `desk`, ...
    #[serde(rename = "type")]
    pub kind: String,
    /// Hot desking, `on` or `off`
    pub hotdesking_status: String,
    /// Fields not modeled above
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A page of a listing endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    /// Entries on this page
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}
