//! Bearer token storage shared between the token lifecycle and API callers.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

/// An opaque bearer token with its absolute expiry.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// Create a token expiring at `expires_at`.
    #[must_use]
    pub fn new(value: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            value: value.into(),
            expires_at,
        }
    }

    /// Create a token valid for `lifetime` from now.
    #[must_use]
    pub fn with_lifetime(value: impl Into<String>, lifetime: Duration) -> Self {
        Self::new(value, Utc::now() + lifetime)
    }

    /// The bearer value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// When the token stops being accepted.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Time left until expiry; negative once expired.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.expires_at - Utc::now()
    }

    /// Whether the expiry is in the past.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.remaining() <= Duration::zero()
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Shared slot holding the current access token.
///
/// Clones share the slot. Writers replace the whole token, so readers
/// always see either the old or the new value.
#[derive(Debug, Clone, Default)]
pub struct TokenStore {
    inner: Arc<RwLock<Option<AccessToken>>>,
}

impl TokenStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding `token`.
    #[must_use]
    pub fn with_token(token: AccessToken) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Some(token))),
        }
    }

    /// Snapshot of the current token.
    pub async fn current(&self) -> Option<AccessToken> {
        self.inner.read().await.clone()
    }

    /// Current bearer value.
    pub async fn bearer(&self) -> Option<String> {
        self.inner
            .read()
            .await
            .as_ref()
            .map(|token| token.value.clone())
    }

    /// Swap in a new token.
    pub async fn replace(&self, token: AccessToken) {
        *self.inner.write().await = Some(token);
    }

    /// Forget the current token.
    pub async fn clear(&self) {
        *self.inner.write().await = None;
    }
}
