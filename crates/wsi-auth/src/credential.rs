//! Verification of signed credentials.
//!
//! The activation code and every action message are JWTs signed by the
//! cloud. A credential is accepted only if its `jti` is unused, it is fresh,
//! and its signature verifies against the key published for its region.

use crate::error::CredentialError;
use crate::jwks::{key_set_url, JwksResolver, KeyResolver};
use crate::nonce::NonceCache;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{Header, Validation};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, OnceLock};

/// Maximum age, in seconds, of a credential without explicit expiry.
pub const MAX_CREDENTIAL_AGE_SECS: i64 = 5 * 60;

/// Connection data carried by an activation code.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    /// Token endpoint
    pub oauth_url: String,
    /// Long-lived refresh token
    pub refresh_token: String,
    /// Base URL of the device API
    pub webexapis_base_url: String,
    /// Integration resource, PATCHed on activation
    #[serde(default)]
    pub app_url: Option<String>,
    /// Signing key id
    #[serde(default)]
    pub kid: Option<String>,
    /// Issuing region
    #[serde(default)]
    pub region: Option<String>,
    /// Token id
    #[serde(default)]
    pub jti: Option<String>,
    /// Explicit expiry
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    /// Issue time
    #[serde(default)]
    pub issued_at: Option<DateTime<Utc>>,
}

impl Credential {
    /// Extract connection data from decoded claims.
    ///
    /// Accepts both raw activation-code claims (`expiryTime`, `iat`) and the
    /// serialized form of a [`Credential`].
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::MissingField`] if the OAuth URL, refresh
    /// token, or device-API base URL is absent.
    pub fn from_claims(claims: &Value, kid: Option<&str>) -> Result<Self, CredentialError> {
        let required = |key: &'static str| {
            string_claim(claims, key).ok_or(CredentialError::MissingField(key))
        };

        Ok(Self {
            oauth_url: required("oauthUrl")?,
            refresh_token: required("refreshToken")?,
            webexapis_base_url: required("webexapisBaseUrl")?,
            app_url: string_claim(claims, "appUrl"),
            kid: kid
                .map(str::to_string)
                .or_else(|| string_claim(claims, "kid")),
            region: string_claim(claims, "region"),
            jti: string_claim(claims, "jti"),
            expires_at: explicit_expiry(claims).ok().flatten().or_else(|| {
                claims
                    .get("expiresAt")
                    .and_then(|v| serde_json::from_value(v.clone()).ok())
            }),
            issued_at: claims
                .get("iat")
                .and_then(Value::as_i64)
                .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
                .or_else(|| {
                    claims
                        .get("issuedAt")
                        .and_then(|v| serde_json::from_value(v.clone()).ok())
                }),
        })
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("oauth_url", &self.oauth_url)
            .field("refresh_token", &"<redacted>")
            .field("webexapis_base_url", &self.webexapis_base_url)
            .field("app_url", &self.app_url)
            .field("region", &self.region)
            .field("jti", &self.jti)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Header and payload of a token, not yet verified.
#[derive(Debug, Clone)]
pub struct DecodedToken {
    /// JOSE header
    pub header: Header,
    /// Payload claims
    pub claims: Value,
}

/// Split a token and decode its header and payload without verifying it.
///
/// # Errors
///
/// Returns [`CredentialError::Malformed`] if the token is not three
/// base64url segments or a segment is not JSON.
pub fn decode_unverified(token: &str) -> Result<DecodedToken, CredentialError> {
    let parts: Vec<&str> = token.trim().split('.').collect();
    let [_, payload, _] = parts.as_slice() else {
        return Err(CredentialError::Malformed(format!(
            "expected 3 segments, found {}",
            parts.len()
        )));
    };

    let header = jsonwebtoken::decode_header(token.trim())
        .map_err(|e| CredentialError::Malformed(e.to_string()))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| CredentialError::Malformed(e.to_string()))?;
    let claims: Value =
        serde_json::from_slice(&bytes).map_err(|e| CredentialError::Malformed(e.to_string()))?;

    if !claims.is_object() {
        return Err(CredentialError::Malformed("payload is not an object".into()));
    }

    Ok(DecodedToken { header, claims })
}

/// Verifies signed credentials and remembers their ids.
pub struct CredentialVerifier {
    keys: Arc<dyn KeyResolver>,
    nonces: SharedNonces,
}

/// Token ids remembered across verifiers.
pub type SharedNonces = Arc<Mutex<NonceCache>>;

/// The replay set used by every verifier built with
/// [`CredentialVerifier::new`].
#[must_use]
pub fn process_nonces() -> SharedNonces {
    static NONCES: OnceLock<SharedNonces> = OnceLock::new();
    NONCES.get_or_init(SharedNonces::default).clone()
}

impl CredentialVerifier {
    /// Create a verifier that resolves keys through `keys`.
    ///
    /// All such verifiers share one replay set, so a credential is accepted
    /// at most once per process.
    #[must_use]
    pub fn new(keys: Arc<dyn KeyResolver>) -> Self {
        Self::with_nonces(keys, process_nonces())
    }

    /// Create a verifier checking token ids against `nonces`.
    #[must_use]
    pub fn with_nonces(keys: Arc<dyn KeyResolver>, nonces: SharedNonces) -> Self {
        Self { keys, nonces }
    }

    /// Create a verifier fetching the regional JWKS documents.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be created.
    pub fn with_jwks(timeout: std::time::Duration) -> Result<Self, CredentialError> {
        Ok(Self::new(Arc::new(JwksResolver::new(timeout)?)))
    }

    /// Verify a token and return its claims.
    ///
    /// # Errors
    ///
    /// Returns the first check that fails, in order: decoding, nonce,
    /// freshness, region, key id, key lookup, signature.
    pub async fn verify(&self, token: &str) -> Result<Value, CredentialError> {
        self.verify_decoded(token).await.map(|decoded| decoded.claims)
    }

    /// Verify a token, logging and swallowing any failure.
    pub async fn decode_and_verify(&self, token: &str) -> Option<Value> {
        match self.verify(token).await {
            Ok(claims) => Some(claims),
            Err(e) => {
                tracing::warn!(error = %e, "Credential rejected");
                None
            }
        }
    }

    /// Verify an activation code and extract its connection data.
    ///
    /// # Errors
    ///
    /// Returns error if verification fails or connection data is missing.
    pub async fn verify_activation(&self, token: &str) -> Result<Credential, CredentialError> {
        let decoded = self.verify_decoded(token).await?;
        Credential::from_claims(&decoded.claims, decoded.header.kid.as_deref())
    }

    /// Number of token ids currently remembered by this verifier's set.
    #[must_use]
    pub fn remembered_nonces(&self) -> usize {
        self.nonces.lock().len()
    }

    async fn verify_decoded(&self, token: &str) -> Result<DecodedToken, CredentialError> {
        let decoded = decode_unverified(token)?;
        let claims = &decoded.claims;
        let now = Utc::now();
        let max_age = Duration::seconds(MAX_CREDENTIAL_AGE_SECS);

        let expiry = explicit_expiry(claims)?;
        let issued_at = claims
            .get("iat")
            .and_then(Value::as_i64)
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single());

        let jti = string_claim(claims, "jti").ok_or(CredentialError::MissingNonce)?;
        let keep_until = expiry
            .or_else(|| issued_at.map(|iat| iat + max_age))
            .unwrap_or(now + max_age);
        if !self.nonces.lock().check_and_record(&jti, keep_until, now) {
            return Err(CredentialError::Replayed(jti));
        }

        match (expiry, issued_at) {
            (Some(expiry), _) if now > expiry => {
                return Err(CredentialError::Expired(expiry.to_rfc3339()));
            }
            (Some(_), _) => {}
            (None, Some(iat)) if now - iat <= max_age => {}
            (None, _) => return Err(CredentialError::Stale),
        }

        let url = key_set_url(string_claim(claims, "region").as_deref())?;
        let kid = decoded
            .header
            .kid
            .as_deref()
            .ok_or(CredentialError::MissingKeyId)?;
        let key = self.keys.resolve(url, kid).await?;

        let algorithm = key.algorithm.unwrap_or(decoded.header.alg);
        if algorithm != decoded.header.alg {
            return Err(CredentialError::InvalidSignature(format!(
                "token signed with {:?}, key requires {algorithm:?}",
                decoded.header.alg
            )));
        }

        let mut validation = Validation::new(algorithm);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        jsonwebtoken::decode::<Value>(token.trim(), &key.key, &validation)
            .map_err(|e| CredentialError::InvalidSignature(e.to_string()))?;

        tracing::debug!(%jti, kid, "Credential verified");
        Ok(decoded)
    }
}

impl std::fmt::Debug for CredentialVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialVerifier")
            .field("remembered_nonces", &self.remembered_nonces())
            .finish_non_exhaustive()
    }
}

fn string_claim(claims: &Value, key: &str) -> Option<String> {
    claims.get(key).and_then(Value::as_str).map(str::to_string)
}

/// `expiryTime` (RFC 3339 or epoch seconds), falling back to `exp`.
fn explicit_expiry(claims: &Value) -> Result<Option<DateTime<Utc>>, CredentialError> {
    let from_secs = |secs: i64| {
        Utc.timestamp_opt(secs, 0)
            .single()
            .ok_or_else(|| CredentialError::Malformed(format!("invalid timestamp {secs}")))
    };

    match claims.get("expiryTime") {
        Some(Value::String(text)) => DateTime::parse_from_rfc3339(text)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(|e| CredentialError::Malformed(format!("expiryTime {text}: {e}"))),
        Some(Value::Number(n)) => {
            let secs = n
                .as_i64()
                .ok_or_else(|| CredentialError::Malformed(format!("expiryTime {n}")))?;
            from_secs(secs).map(Some)
        }
        _ => claims
            .get("exp")
            .and_then(Value::as_i64)
            .map(from_secs)
            .transpose(),
    }
}
