//! Signing-key lookup.
//!
//! Credentials name their issuing region; each region publishes its keys as
//! a JWKS document at a fixed URL.

use crate::error::CredentialError;
use async_trait::async_trait;
use jsonwebtoken::jwk::{JwkSet, KeyAlgorithm};
use jsonwebtoken::{Algorithm, DecodingKey};
use parking_lot::Mutex;
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;

/// Region assumed when a credential does not name one.
pub const DEFAULT_REGION: &str = "us-east-2_a";

const REGION_KEY_SETS: &[(&str, &str)] = &[
    ("us-west-2_r", "https://xapi-r.wbx2.com/jwks"),
    ("us-east-2_a", "https://xapi-a.wbx2.com/jwks"),
    ("eu-central-1_k", "https://xapi-k.wbx2.com/jwks"),
    ("us-east-1_int13", "https://xapi-intb.wbx2.com/jwks"),
    ("us-gov-west-1_a1", "https://xapi.gov.ciscospark.com/jwks"),
];

/// Key-set URL for a region.
///
/// # Errors
///
/// Returns [`CredentialError::UnknownRegion`] for a region outside the table.
pub fn key_set_url(region: Option<&str>) -> Result<&'static str, CredentialError> {
    let region = region.unwrap_or(DEFAULT_REGION);
    REGION_KEY_SETS
        .iter()
        .find(|(name, _)| *name == region)
        .map(|(_, url)| *url)
        .ok_or_else(|| CredentialError::UnknownRegion(region.to_string()))
}

/// A key able to verify credential signatures.
#[derive(Clone)]
pub struct VerifyingKey {
    /// Decoding key material
    pub key: DecodingKey,
    /// Algorithm the key is pinned to; `None` trusts the token header
    pub algorithm: Option<Algorithm>,
}

impl std::fmt::Debug for VerifyingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerifyingKey")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// Resolves `(key-set URL, kid)` to a verifying key.
#[async_trait]
pub trait KeyResolver: Send + Sync {
    /// Look up key `kid` in the set published at `url`.
    async fn resolve(&self, url: &str, kid: &str) -> Result<VerifyingKey, CredentialError>;
}

/// [`KeyResolver`] that downloads JWKS documents and keeps them in memory.
///
/// A key-set is fetched again when it lacks the requested `kid`, which picks
/// up rotated keys.
pub struct JwksResolver {
    client: Client,
    sets: Mutex<HashMap<String, JwkSet>>,
}

impl JwksResolver {
    /// Create a resolver with the given request timeout.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be created.
    pub fn new(timeout: Duration) -> Result<Self, CredentialError> {
        let client = Client::builder()
            .timeout(timeout)
            .use_rustls_tls()
            .build()
            .map_err(|e| CredentialError::KeyFetch(e.to_string()))?;

        Ok(Self {
            client,
            sets: Mutex::new(HashMap::new()),
        })
    }

    fn cached(&self, url: &str, kid: &str) -> Option<Result<VerifyingKey, CredentialError>> {
        let sets = self.sets.lock();
        let jwk = sets.get(url)?.find(kid)?;
        Some(to_verifying_key(jwk))
    }

    async fn fetch(&self, url: &str) -> Result<JwkSet, CredentialError> {
        tracing::debug!(url, "Fetching signing keys");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| CredentialError::KeyFetch(e.to_string()))?;

        if !response.status().is_success() {
            return Err(CredentialError::KeyFetch(format!(
                "{url} answered {}",
                response.status()
            )));
        }

        response
            .json::<JwkSet>()
            .await
            .map_err(|e| CredentialError::KeyFetch(e.to_string()))
    }
}

impl std::fmt::Debug for JwksResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwksResolver")
            .field("cached_sets", &self.sets.lock().len())
            .finish()
    }
}

#[async_trait]
impl KeyResolver for JwksResolver {
    async fn resolve(&self, url: &str, kid: &str) -> Result<VerifyingKey, CredentialError> {
        if let Some(key) = self.cached(url, kid) {
            return key;
        }

        let set = self.fetch(url).await?;
        let key = set.find(kid).map(to_verifying_key);
        self.sets.lock().insert(url.to_string(), set);

        key.unwrap_or_else(|| {
            Err(CredentialError::KeyNotFound {
                kid: kid.to_string(),
                url: url.to_string(),
            })
        })
    }
}

fn to_verifying_key(jwk: &jsonwebtoken::jwk::Jwk) -> Result<VerifyingKey, CredentialError> {
    let key = DecodingKey::from_jwk(jwk).map_err(|e| CredentialError::KeyFetch(e.to_string()))?;
    let algorithm = jwk.common.key_algorithm.as_ref().and_then(signing_algorithm);
    Ok(VerifyingKey { key, algorithm })
}

fn signing_algorithm(algorithm: &KeyAlgorithm) -> Option<Algorithm> {
    match algorithm {
        KeyAlgorithm::HS256 => Some(Algorithm::HS256),
        KeyAlgorithm::HS384 => Some(Algorithm::HS384),
        KeyAlgorithm::HS512 => Some(Algorithm::HS512),
        KeyAlgorithm::RS256 => Some(Algorithm::RS256),
        KeyAlgorithm::RS384 => Some(Algorithm::RS384),
        KeyAlgorithm::RS512 => Some(Algorithm::RS512),
        KeyAlgorithm::PS256 => Some(Algorithm::PS256),
        KeyAlgorithm::PS384 => Some(Algorithm::PS384),
        KeyAlgorithm::PS512 => Some(Algorithm::PS512),
        KeyAlgorithm::ES256 => Some(Algorithm::ES256),
        KeyAlgorithm::ES384 => Some(Algorithm::ES384),
        KeyAlgorithm::EdDSA => Some(Algorithm::EdDSA),
        _ => None,
    }
}
