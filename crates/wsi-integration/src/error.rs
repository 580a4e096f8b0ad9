//! Error types of the integration session.

use wsi_auth::{AuthError, CredentialError};
use wsi_http::TransportError;

/// Invalid configuration or call arguments, detected before any request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Client id, secret, or activation code absent
    #[error("missing clientId, clientSecret or activationCode in config")]
    MissingConfig,
    /// Activation code lacks connection data
    #[error("activationCode does not contain the expected data: missing {0}")]
    IncompleteActivationCode(&'static str),
    /// Webhook delivery selected without a webhook
    #[error("webhook notifications need a webhook configuration")]
    MissingWebhook,
    /// Activation code carries no app URL
    #[error("activationCode has no appUrl")]
    MissingAppUrl,
    /// Request timeout of zero seconds
    #[error("http.timeoutSecs must be greater than zero")]
    ZeroTimeout,
    /// xAPI call without device id or path
    #[error("{0}: missing deviceId or path")]
    MissingDeviceOrPath(&'static str),
    /// xAPI command parameters are not a JSON object
    #[error("{0}: params must be object")]
    ParamsNotObject(&'static str),
}

/// Errors from xAPI calls.
#[derive(Debug, Clone, thiserror::Error)]
pub enum XapiError {
    /// Arguments rejected before sending
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Request failed
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// Device answered with nothing for the path
    #[error("{0} not found. Did you include the API in the manifest?")]
    NotFound(String),
}

/// Errors from establishing or using an integration session.
#[derive(Debug, Clone, thiserror::Error)]
pub enum IntegrationError {
    /// Configuration is invalid
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Activation code rejected
    #[error("activation code rejected: {0}")]
    Credential(#[from] CredentialError),
    /// Token exchange or activation failed
    #[error(transparent)]
    Auth(#[from] AuthError),
    /// Request failed
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// xAPI call failed
    #[error(transparent)]
    Xapi(#[from] XapiError),
    /// Long polling was requested but the cloud returned no queue URL
    #[error("activation response has no queue.pollUrl")]
    MissingPollUrl,
}
