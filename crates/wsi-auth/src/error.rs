//! Error types for token handling and credential verification.

use wsi_http::TransportError;

/// Errors from the access-token lifecycle.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthError {
    /// Token endpoint could not be reached or refused the grant
    #[error("token exchange failed: {0}")]
    Exchange(#[source] TransportError),
    /// Token endpoint answered with something other than a token
    #[error("malformed token response: {0}")]
    MalformedResponse(String),
    /// Integration activation was refused
    #[error("integration activation failed: {0}")]
    Activation(#[source] TransportError),
}

impl AuthError {
    pub(crate) fn from_exchange(err: TransportError) -> Self {
        match err {
            TransportError::Parse(message) => Self::MalformedResponse(message),
            other => Self::Exchange(other),
        }
    }
}

/// Reasons a signed credential is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialError {
    /// Not three base64url segments of JSON
    #[error("not able to decode token: {0}")]
    Malformed(String),
    /// Payload carries no `jti`
    #[error("token has no jti")]
    MissingNonce,
    /// `jti` was seen before
    #[error("token jti already used: {0}")]
    Replayed(String),
    /// Explicit expiry is in the past
    #[error("token expired at {0}")]
    Expired(String),
    /// No explicit expiry and `iat` is missing or older than five minutes
    #[error("token iat too old")]
    Stale,
    /// `region` is not in the key-set table
    #[error("unknown region: {0}")]
    UnknownRegion(String),
    /// Header carries no `kid`
    #[error("token header has no kid")]
    MissingKeyId,
    /// Key set could not be fetched or decoded
    #[error("key fetch failed: {0}")]
    KeyFetch(String),
    /// Key set does not contain the requested key
    #[error("key {kid} not found at {url}")]
    KeyNotFound {
        /// Requested key id
        kid: String,
        /// Key-set URL
        url: String,
    },
    /// Signature does not verify against the resolved key
    #[error("invalid signature: {0}")]
    InvalidSignature(String),
    /// Verified payload lacks a field the caller needs
    #[error("credential missing field: {0}")]
    MissingField(&'static str),
}
