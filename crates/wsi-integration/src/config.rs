//! Integration configuration.

use crate::error::ValidationError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use wsi_http::{NotificationMode, Webhook};

const KNOWN_KEYS: &[&str] = &[
    "clientId",
    "clientSecret",
    "activationCode",
    "notifications",
    "webhook",
    "actionsUrl",
    "logLevel",
    "http",
];

/// The activation code as copied from Control Hub, or already decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActivationCode {
    /// Signed JWT, verified on connect
    Jwt(String),
    /// Decoded claims, trusted as given
    Decoded(Value),
}

impl ActivationCode {
    /// Parse a raw value: a JSON object is decoded claims, anything else a JWT.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match serde_json::from_str::<Value>(raw) {
            Ok(value @ Value::Object(_)) => Self::Decoded(value),
            _ => Self::Jwt(raw.to_string()),
        }
    }
}

/// Amount of SDK logging.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Errors only
    #[default]
    Error,
    /// Warnings and errors
    Warn,
    /// Lifecycle messages
    Info,
    /// Everything
    Verbose,
}

impl LogLevel {
    /// Equivalent `tracing` filter directive.
    #[must_use]
    pub fn as_filter(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Verbose => "debug",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "verbose" | "debug" => Ok(Self::Verbose),
            other => anyhow::bail!("unknown log level: {other}"),
        }
    }
}

/// HTTP client settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpSettings {
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self { timeout_secs: 60 }
    }
}

impl HttpSettings {
    /// Per-request timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Everything needed to connect an integration.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationConfig {
    /// OAuth client id
    #[serde(default)]
    pub client_id: String,
    /// OAuth client secret
    #[serde(default)]
    pub client_secret: String,
    /// Activation code from Control Hub
    #[serde(default)]
    pub activation_code: Option<ActivationCode>,
    /// Notification delivery
    #[serde(default)]
    pub notifications: NotificationMode,
    /// Webhook, for webhook delivery
    #[serde(default)]
    pub webhook: Option<Webhook>,
    /// Public URL receiving signed actions
    #[serde(default)]
    pub actions_url: Option<String>,
    /// SDK log level
    #[serde(default)]
    pub log_level: LogLevel,
    /// HTTP client settings
    #[serde(default)]
    pub http: HttpSettings,
}

impl std::fmt::Debug for IntegrationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntegrationConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("activation_code", &self.activation_code.is_some())
            .field("notifications", &self.notifications)
            .field("actions_url", &self.actions_url)
            .field("log_level", &self.log_level)
            .field("http", &self.http)
            .finish_non_exhaustive()
    }
}

impl IntegrationConfig {
    /// Load from a JSON value. Unknown keys are logged and ignored.
    ///
    /// # Errors
    ///
    /// Returns error if a known key has the wrong shape.
    pub fn from_value(value: Value) -> Result<Self> {
        if let Some(object) = value.as_object() {
            for key in object.keys() {
                if !KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown config key, ignoring");
                }
            }
        }

        serde_json::from_value(value).context("Invalid integration config")
    }

    /// Load from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let value: Value = serde_json::from_str(&text)
            .with_context(|| format!("Config file {} is not JSON", path.display()))?;
        Self::from_value(value)
    }

    /// Load configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `WSI_CLIENT_ID`: OAuth client id
    /// - `WSI_CLIENT_SECRET`: OAuth client secret
    /// - `WSI_ACTIVATION_CODE`: JWT, or decoded claims as a JSON object
    /// - `WSI_NOTIFICATIONS`: `longpolling`, `webhook` or `none`
    /// - `WSI_ACTIONS_URL`: Public URL receiving signed actions
    /// - `WSI_LOG_LEVEL`: `error`, `warn`, `info` or `verbose`
    /// - `WSI_HTTP_TIMEOUT_SECS`: Per-request timeout
    ///
    /// # Errors
    ///
    /// Returns error if a variable is present but invalid.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(id) = std::env::var("WSI_CLIENT_ID") {
            config.client_id = id;
        }

        if let Ok(secret) = std::env::var("WSI_CLIENT_SECRET") {
            config.client_secret = secret;
        }

        if let Ok(code) = std::env::var("WSI_ACTIVATION_CODE") {
            config.activation_code = Some(ActivationCode::parse(&code));
        }

        if let Ok(mode) = std::env::var("WSI_NOTIFICATIONS") {
            config.notifications = serde_json::from_value(Value::String(mode.trim().to_string()))
                .context("Invalid WSI_NOTIFICATIONS")?;
        }

        if let Ok(url) = std::env::var("WSI_ACTIONS_URL") {
            config.actions_url = Some(url);
        }

        if let Ok(level) = std::env::var("WSI_LOG_LEVEL") {
            config.log_level = level.parse().context("Invalid WSI_LOG_LEVEL")?;
        }

        if let Ok(secs) = std::env::var("WSI_HTTP_TIMEOUT_SECS") {
            config.http.timeout_secs = secs
                .trim()
                .parse()
                .context("Invalid WSI_HTTP_TIMEOUT_SECS")?;
        }

        Ok(config)
    }

    /// Check required fields before any network call.
    ///
    /// # Errors
    ///
    /// Returns error if credentials or the activation code are missing,
    /// webhook delivery has no webhook, or the request timeout is zero.
    pub fn validate(&self) -> Result<&ActivationCode, ValidationError> {
        let activation = match &self.activation_code {
            Some(code) if !self.client_id.is_empty() && !self.client_secret.is_empty() => code,
            _ => return Err(ValidationError::MissingConfig),
        };

        if let ActivationCode::Decoded(claims) = activation {
            for key in ["oauthUrl", "webexapisBaseUrl"] {
                if claims.get(key).and_then(Value::as_str).is_none() {
                    return Err(ValidationError::IncompleteActivationCode(key));
                }
            }
        }

        if self.notifications == NotificationMode::Webhook && self.webhook.is_none() {
            return Err(ValidationError::MissingWebhook);
        }

        if self.http.timeout_secs == 0 {
            return Err(ValidationError::ZeroTimeout);
        }

        Ok(activation)
    }
}
