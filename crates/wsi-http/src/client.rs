//! Authenticated client for the device API.
//!
//! [`ApiClient`] binds a [`Transport`], the device-API base URL, and the
//! shared [`TokenStore`]. The bearer token is read from the store on every
//! call, so a refresh takes effect for the next request without rebuilding
//! the client.

use crate::encoding::{join_url, query_string};
use crate::token::TokenStore;
use crate::transport::{ApiRequest, Transport, TransportError};
use crate::types::{
    ActivationRequest, AppInfo, CommandRequest, ConfigPatch, TokenRequest, TokenResponse,
};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

/// Content type of configuration updates.
pub const JSON_PATCH_CONTENT_TYPE: &str = "application/json-patch+json";

/// Messages returned by one long-poll request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PollBatch {
    /// Raw notification records, in delivery order
    pub messages: Vec<Value>,
}

/// Device-API client.
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    base_url: String,
    token: TokenStore,
}

impl ApiClient {
    /// Create a client for `base_url` (trailing slashes are dropped).
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, base_url: &str, token: TokenStore) -> Self {
        Self {
            transport,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    /// Device-API base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The shared token slot this client reads from.
    #[must_use]
    pub fn token_store(&self) -> &TokenStore {
        &self.token
    }

    /// The underlying transport.
    #[must_use]
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Resolve a partial URL such as `/devices` against the base URL.
    #[must_use]
    pub fn full_url(&self, partial: &str) -> String {
        join_url(&self.base_url, partial)
    }

    async fn bearer(&self) -> Result<String, TransportError> {
        self.token.bearer().await.ok_or(TransportError::MissingToken)
    }

    async fn send(&self, request: ApiRequest) -> Result<Value, TransportError> {
        let bearer = self.bearer().await?;
        self.transport.send(request.bearer(Some(bearer.as_str()))).await
    }

    /// `GET` a partial or absolute URL.
    ///
    /// # Errors
    ///
    /// Returns error if no token is available or the request fails.
    pub async fn get(&self, partial: &str) -> Result<Value, TransportError> {
        self.send(ApiRequest::new(Method::GET, self.full_url(partial)))
            .await
    }

    /// `GET` and decode into `T`.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the body does not decode.
    pub async fn get_as<T: DeserializeOwned>(&self, partial: &str) -> Result<T, TransportError> {
        let body = self.get(partial).await?;
        serde_json::from_value(body).map_err(|e| TransportError::Parse(e.to_string()))
    }

    /// Call any endpoint of the API with the current token.
    ///
    /// # Errors
    ///
    /// Returns error if no token is available or the request fails.
    pub async fn web_api(
        &self,
        partial: &str,
        method: Method,
        body: Option<Value>,
        content_type: Option<&str>,
    ) -> Result<Value, TransportError> {
        let mut request = ApiRequest::new(method, self.full_url(partial));
        if let Some(body) = body {
            request = request.json(body);
        }
        if let Some(content_type) = content_type {
            request = request.content_type(content_type);
        }
        self.send(request).await
    }

    /// Fetch one batch from the long-poll queue.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the body has no `messages` array.
    pub async fn poll(&self, poll_url: &str) -> Result<PollBatch, TransportError> {
        let body = self.send(ApiRequest::new(Method::GET, poll_url)).await?;

        let messages = body
            .get("messages")
            .and_then(Value::as_array)
            .cloned()
            .ok_or_else(|| TransportError::Parse("poll response has no messages array".into()))?;

        Ok(PollBatch { messages })
    }

    /// Read the integration details from the app URL.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the body does not decode.
    pub async fn ping(&self, app_url: &str) -> Result<AppInfo, TransportError> {
        let body = self.send(ApiRequest::new(Method::GET, app_url)).await?;
        serde_json::from_value(body).map_err(|e| TransportError::Parse(e.to_string()))
    }

    /// Invoke `command` (dot-separated) on a device.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    pub async fn x_command(
        &self,
        device_id: &str,
        command: &str,
        arguments: Option<Value>,
        multiline: Option<&str>,
    ) -> Result<Value, TransportError> {
        let body = CommandRequest {
            device_id: device_id.to_string(),
            arguments,
            body: multiline.map(str::to_string),
        };
        let body = serde_json::to_value(body).map_err(|e| TransportError::Parse(e.to_string()))?;
        let url = self.full_url(&format!("xapi/command/{command}"));

        tracing::debug!(device_id, command, "xCommand");
        self.send(ApiRequest::new(Method::POST, url).json(body))
            .await
    }

    /// Read the status subtree `name` of a device.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    pub async fn x_status(&self, device_id: &str, name: &str) -> Result<Value, TransportError> {
        let query = query_string(&[("deviceId", device_id), ("name", name)]);
        tracing::debug!(device_id, name, "xStatus");
        self.get(&format!("xapi/status?{query}")).await
    }

    /// Read configurations under `key` of a device.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    pub async fn x_config(&self, device_id: &str, key: &str) -> Result<Value, TransportError> {
        let query = query_string(&[("deviceId", device_id), ("key", key)]);
        tracing::debug!(device_id, key, "xConfig");
        self.get(&format!("deviceConfigurations?{query}")).await
    }

    /// Replace configured values on a device in one request.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    pub async fn x_config_set(
        &self,
        device_id: &str,
        configs: &[(String, Value)],
    ) -> Result<Value, TransportError> {
        let patches: Vec<ConfigPatch> = configs
            .iter()
            .map(|(path, value)| ConfigPatch::replace(path, value.clone()))
            .collect();
        let body =
            serde_json::to_value(patches).map_err(|e| TransportError::Parse(e.to_string()))?;
        let query = query_string(&[("deviceId", device_id)]);
        let url = self.full_url(&format!("deviceConfigurations?{query}"));

        tracing::debug!(device_id, count = configs.len(), "xConfiguration set");
        self.send(
            ApiRequest::new(Method::PATCH, url)
                .json(body)
                .content_type(JSON_PATCH_CONTENT_TYPE),
        )
        .await
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

/// Exchange a refresh token for an access token.
///
/// # Errors
///
/// Returns error if the request fails or the response does not decode.
pub async fn exchange_refresh_token(
    transport: &dyn Transport,
    oauth_url: &str,
    request: &TokenRequest,
) -> Result<TokenResponse, TransportError> {
    tracing::debug!(oauth_url, %request, "Requesting access token");
    let body = serde_json::to_value(request).map_err(|e| TransportError::Parse(e.to_string()))?;
    let response = transport.post(oauth_url, None, body).await?;
    serde_json::from_value(response).map_err(|e| TransportError::Parse(e.to_string()))
}

/// Mark the integration as provisioned and configure notification delivery.
///
/// # Errors
///
/// Returns error if the request fails or the response does not decode.
pub async fn activate(
    transport: &dyn Transport,
    bearer: &str,
    app_url: &str,
    request: &ActivationRequest,
) -> Result<AppInfo, TransportError> {
    let body = serde_json::to_value(request).map_err(|e| TransportError::Parse(e.to_string()))?;
    let response = transport
        .patch(app_url, Some(bearer), body, crate::transport::JSON_CONTENT_TYPE)
        .await?;
    serde_json::from_value(response).map_err(|e| TransportError::Parse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::AccessToken;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Transport double that records requests and answers with a fixed body.
    #[derive(Default)]
    struct Recorded {
        requests: Mutex<Vec<ApiRequest>>,
        reply: Value,
    }

    #[async_trait]
    impl Transport for Recorded {
        async fn send(&self, request: ApiRequest) -> Result<Value, TransportError> {
            self.requests.lock().unwrap().push(request);
            Ok(self.reply.clone())
        }
    }

    fn client(transport: Arc<Recorded>, token: Option<&str>) -> ApiClient {
        let store = match token {
            Some(value) => TokenStore::with_token(AccessToken::with_lifetime(
                value,
                chrono::Duration::hours(1),
            )),
            None => TokenStore::new(),
        };
        ApiClient::new(transport, "https://webexapis.com/v1/", store)
    }

    #[test]
    fn full_url_joins_base() {
        let c = client(Arc::new(Recorded::default()), None);
        assert_eq!(c.full_url("/devices"), "https://webexapis.com/v1/devices");
        assert_eq!(c.base_url(), "https://webexapis.com/v1");
    }

    #[tokio::test]
    async fn missing_token_fails_without_sending() {
        let transport = Arc::new(Recorded::default());
        let c = client(transport.clone(), None);

        let result = c.get("devices").await;

        assert!(matches!(result, Err(TransportError::MissingToken)));
        assert!(transport.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn token_is_read_per_call() {
        let transport = Arc::new(Recorded::default());
        let c = client(transport.clone(), Some("first"));

        c.get("devices").await.unwrap();
        c.token_store()
            .replace(AccessToken::with_lifetime("second", chrono::Duration::hours(1)))
            .await;
        c.get("devices").await.unwrap();

        let requests = transport.requests.lock().unwrap();
        assert_eq!(requests[0].bearer.as_deref(), Some("first"));
        assert_eq!(requests[1].bearer.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn command_body_shape() {
        let transport = Arc::new(Recorded {
            reply: json!({ "result": {} }),
            ..Recorded::default()
        });
        let c = client(transport.clone(), Some("t"));

        c.x_command("dev-1", "Audio.Volume.Set", Some(json!({ "Level": 40 })), None)
            .await
            .unwrap();

        let requests = transport.requests.lock().unwrap();
        assert_eq!(requests[0].method, Method::POST);
        assert_eq!(
            requests[0].url,
            "https://webexapis.com/v1/xapi/command/Audio.Volume.Set"
        );
        assert_eq!(
            requests[0].body,
            Some(json!({ "deviceId": "dev-1", "arguments": { "Level": 40 } }))
        );
    }

    #[tokio::test]
    async fn poll_requires_messages() {
        let transport = Arc::new(Recorded {
            reply: json!({ "nothing": [] }),
            ..Recorded::default()
        });
        let c = client(transport, Some("t"));

        let result = c.poll("https://poll.example.test/q").await;
        assert!(matches!(result, Err(TransportError::Parse(_))));
    }
}
