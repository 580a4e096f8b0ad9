//! # Workspace Integrations HTTP
//!
//! Network layer of the integration client.
//!
//! - [`Transport`]: the one seam between the client and HTTP, with a
//!   `reqwest` implementation in [`ReqwestTransport`]
//! - [`TokenStore`]: the shared slot holding the current [`AccessToken`]
//! - [`ApiClient`]: device-API calls (xAPI commands, status, configuration)
//!   authenticated with whatever token is current at call time

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod encoding;
pub mod token;
pub mod transport;
pub mod types;

pub use client::{
    activate, exchange_refresh_token, ApiClient, PollBatch, JSON_PATCH_CONTENT_TYPE,
};
pub use encoding::{encode_component, join_url, query_string};
pub use reqwest::Method;
pub use token::{AccessToken, TokenStore};
pub use transport::{
    ApiRequest, ReqwestTransport, Transport, TransportConfig, TransportError, JSON_CONTENT_TYPE,
};
pub use types::{
    ActivationRequest, AppInfo, Device, NotificationMode, Page, TokenRequest, TokenResponse,
    Webhook, WebhookType, Workspace,
};
