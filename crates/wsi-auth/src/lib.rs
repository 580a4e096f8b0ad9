//! # Workspace Integrations Auth
//!
//! Credential handling for the integration client:
//!
//! - [`TokenManager`] keeps an access token valid by refreshing it in the
//!   background, fifteen minutes before expiry
//! - [`CredentialVerifier`] checks signed activation codes and action
//!   messages (replay, freshness, regional signing key, signature)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod credential;
pub mod error;
pub mod jwks;
pub mod nonce;
pub mod token_manager;

pub use credential::{
    decode_unverified, process_nonces, Credential, CredentialVerifier, DecodedToken, SharedNonces,
};
pub use error::{AuthError, CredentialError};
pub use jwks::{key_set_url, JwksResolver, KeyResolver, VerifyingKey, DEFAULT_REGION};
pub use nonce::NonceCache;
pub use token_manager::{refresh_delay, ClientCredentials, ErrorHandler, TokenManager};
