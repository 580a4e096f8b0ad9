//! HTTP transport abstraction.
//!
//! Everything above this module talks to the network through [`Transport`],
//! so tests can substitute a scripted in-memory implementation.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method};
use serde_json::Value;
use std::time::Duration;

/// Default content type for request bodies.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// A single outbound request.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    /// HTTP method
    pub method: Method,
    /// Absolute URL
    pub url: String,
    /// Bearer token sent in the `Authorization` header
    pub bearer: Option<String>,
    /// JSON body
    pub body: Option<Value>,
    /// Body content type, defaults to `application/json`
    pub content_type: Option<String>,
}

impl ApiRequest {
    /// Create a request without body or credentials.
    #[must_use]
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            bearer: None,
            body: None,
            content_type: None,
        }
    }

    /// Attach a bearer token.
    #[must_use]
    pub fn bearer(mut self, token: Option<&str>) -> Self {
        self.bearer = token.map(str::to_string);
        self
    }

    /// Attach a JSON body.
    #[must_use]
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Override the body content type.
    #[must_use]
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// Minimal request/response contract used by the integration client.
///
/// Implementations return the decoded JSON body of a 2xx response (or
/// `Value::Null` for an empty one) and map everything else to a
/// [`TransportError`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request and decode the response body.
    async fn send(&self, request: ApiRequest) -> Result<Value, TransportError>;

    /// `GET url`.
    async fn get(&self, url: &str, bearer: Option<&str>) -> Result<Value, TransportError> {
        self.send(ApiRequest::new(Method::GET, url).bearer(bearer))
            .await
    }

    /// `POST url` with a JSON body.
    async fn post(
        &self,
        url: &str,
        bearer: Option<&str>,
        body: Value,
    ) -> Result<Value, TransportError> {
        self.send(ApiRequest::new(Method::POST, url).bearer(bearer).json(body))
            .await
    }

    /// `PATCH url` with a body of the given content type.
    async fn patch(
        &self,
        url: &str,
        bearer: Option<&str>,
        body: Value,
        content_type: &str,
    ) -> Result<Value, TransportError> {
        self.send(
            ApiRequest::new(Method::PATCH, url)
                .bearer(bearer)
                .json(body)
                .content_type(content_type),
        )
        .await
    }
}

/// Settings for [`ReqwestTransport`].
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Per-request timeout
    pub timeout: Duration,
    /// `User-Agent` header value
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            user_agent: concat!("wsi-rs/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// [`Transport`] backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Create a transport.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be created.
    pub fn new(config: &TransportConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .use_rustls_tls()
            .build()
            .map_err(|e| TransportError::Init(e.to_string()))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: ApiRequest) -> Result<Value, TransportError> {
        let url = url::Url::parse(&request.url)
            .map_err(|e| TransportError::InvalidUrl(format!("{}: {e}", request.url)))?;

        tracing::debug!(method = %request.method, url = %url, "Sending request");

        let mut builder = self.client.request(request.method.clone(), url);
        if let Some(token) = &request.bearer {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        if let Some(body) = &request.body {
            let bytes =
                serde_json::to_vec(body).map_err(|e| TransportError::Parse(e.to_string()))?;
            let content_type = request.content_type.as_deref().unwrap_or(JSON_CONTENT_TYPE);
            builder = builder.header(CONTENT_TYPE, content_type).body(bytes);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&text).map_err(|e| TransportError::Parse(e.to_string()))
    }
}

/// Errors that can occur talking to the cloud API.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// Client initialization error
    #[error("client initialization error: {0}")]
    Init(String),
    /// Network or protocol failure
    #[error("request error: {0}")]
    Request(String),
    /// Non-2xx response
    #[error("api error {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, as text
        body: String,
    },
    /// Body could not be encoded or decoded
    #[error("parse error: {0}")]
    Parse(String),
    /// URL could not be parsed
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    /// No access token is available yet
    #[error("no access token available")]
    MissingToken,
}

impl TransportError {
    /// HTTP status of a non-2xx response.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the server rejected the credentials.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self.status(), Some(401 | 403))
    }
}
