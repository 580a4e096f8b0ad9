//! Access-token lifecycle.
//!
//! The manager exchanges the activation code's refresh token for short-lived
//! access tokens and keeps the shared [`TokenStore`] current. One background
//! task sleeps until fifteen minutes before expiry, refreshes, and re-arms
//! from the new expiry. The first refresh failure is reported to the error
//! handler and ends the task. A later successful [`TokenManager::refresh`]
//! starts it again.

use crate::credential::Credential;
use crate::error::AuthError;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use wsi_http::{exchange_refresh_token, AccessToken, TokenRequest, TokenStore, Transport};

/// Refresh this long before the access token expires.
pub const REFRESH_MARGIN: Duration = Duration::from_secs(15 * 60);

/// Lower bound on the refresh delay for short-lived tokens.
pub const MIN_REFRESH_DELAY: Duration = Duration::from_secs(30);

/// Callback receiving fatal background errors.
pub type ErrorHandler = Arc<dyn Fn(String) + Send + Sync>;

/// Integration client id and secret.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientCredentials {
    /// Client id
    pub client_id: String,
    /// Client secret
    pub client_secret: String,
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Delay before refreshing a token that lives `expires_in` seconds.
#[must_use]
pub fn refresh_delay(expires_in: u64) -> Duration {
    Duration::from_secs(expires_in)
        .saturating_sub(REFRESH_MARGIN)
        .max(MIN_REFRESH_DELAY)
}

struct Inner {
    transport: Arc<dyn Transport>,
    oauth_url: String,
    request: TokenRequest,
    store: TokenStore,
    exchange_lock: tokio::sync::Mutex<()>,
    deadline: Mutex<Option<Instant>>,
    rearm: Notify,
    on_error: RwLock<Option<ErrorHandler>>,
}

impl Inner {
    async fn exchange(&self) -> Result<AccessToken, AuthError> {
        let _guard = self.exchange_lock.lock().await;

        let response =
            exchange_refresh_token(self.transport.as_ref(), &self.oauth_url, &self.request)
                .await
                .map_err(AuthError::from_exchange)?;

        if response.access_token.is_empty() {
            return Err(AuthError::MalformedResponse("empty access_token".into()));
        }

        let lifetime = chrono::Duration::seconds(i64::from(
            u32::try_from(response.expires_in).unwrap_or(u32::MAX),
        ));
        let token = AccessToken::new(response.access_token, Utc::now() + lifetime);
        self.store.replace(token.clone()).await;

        let delay = refresh_delay(response.expires_in);
        *self.deadline.lock() = Some(Instant::now() + delay);
        tracing::debug!(
            expires_in = response.expires_in,
            next_refresh_secs = delay.as_secs(),
            "Stored access token"
        );

        Ok(token)
    }

    fn report(&self, message: String) {
        let handler = self.on_error.read().clone();
        match handler {
            Some(handler) => handler(message),
            None => tracing::warn!(error = %message, "No error handler registered"),
        }
    }
}

/// Keeps an access token valid for as long as it runs.
pub struct TokenManager {
    inner: Arc<Inner>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl TokenManager {
    /// Create a manager for the given credential, writing to `store`.
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        client: &ClientCredentials,
        credential: &Credential,
        store: TokenStore,
    ) -> Self {
        let request = TokenRequest::refresh(
            &client.client_id,
            &client.client_secret,
            &credential.refresh_token,
        );

        Self {
            inner: Arc::new(Inner {
                transport,
                oauth_url: credential.oauth_url.clone(),
                request,
                store,
                exchange_lock: tokio::sync::Mutex::new(()),
                deadline: Mutex::new(None),
                rearm: Notify::new(),
                on_error: RwLock::new(None),
            }),
            task: Mutex::new(None),
        }
    }

    /// Resume with a previously obtained token.
    ///
    /// The first refresh is scheduled fifteen minutes before its expiry,
    /// immediately if that has passed.
    #[must_use]
    pub fn from_existing(
        transport: Arc<dyn Transport>,
        client: &ClientCredentials,
        credential: &Credential,
        store: TokenStore,
        token: &AccessToken,
    ) -> Self {
        let manager = Self::new(transport, client, credential, store);
        let remaining = token.remaining().to_std().unwrap_or(Duration::ZERO);
        *manager.inner.deadline.lock() =
            Some(Instant::now() + remaining.saturating_sub(REFRESH_MARGIN));
        manager
    }

    /// The store this manager writes to.
    #[must_use]
    pub fn store(&self) -> &TokenStore {
        &self.inner.store
    }

    /// Register the handler for background refresh failures.
    pub fn set_error_handler(&self, handler: ErrorHandler) {
        *self.inner.on_error.write() = Some(handler);
    }

    /// Obtain the first access token.
    ///
    /// # Errors
    ///
    /// Returns error if the exchange fails.
    pub async fn acquire(&self) -> Result<AccessToken, AuthError> {
        let token = self.inner.exchange().await?;
        tracing::info!(expires_at = %token.expires_at(), "Got initial access token");
        Ok(token)
    }

    /// Refresh now and re-arm the timer from the new expiry.
    ///
    /// # Errors
    ///
    /// Returns error if the exchange fails. The timer keeps its old deadline.
    pub async fn refresh(&self) -> Result<AccessToken, AuthError> {
        let token = self.inner.exchange().await?;

        // A task that ended on a failed refresh is restarted; a stopped or
        // never started manager stays idle.
        let ended = self
            .task
            .lock()
            .as_ref()
            .is_some_and(JoinHandle::is_finished);
        if ended {
            tracing::info!("Restarting token refresh");
            self.start();
        } else {
            self.inner.rearm.notify_one();
        }
        tracing::info!(expires_at = %token.expires_at(), "Fetched new access token");
        Ok(token)
    }

    /// Start the background refresh task, replacing a running one.
    pub fn start(&self) {
        let inner = self.inner.clone();
        let handle = tokio::spawn(async move {
            loop {
                let deadline = (*inner.deadline.lock()).unwrap_or_else(Instant::now);
                tracing::debug!(
                    in_secs = deadline.saturating_duration_since(Instant::now()).as_secs(),
                    "Next token refresh scheduled"
                );

                tokio::select! {
                    () = tokio::time::sleep_until(deadline) => {}
                    () = inner.rearm.notified() => continue,
                }

                match inner.exchange().await {
                    Ok(token) => {
                        tracing::info!(expires_at = %token.expires_at(), "Fetched new access token");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Unable to refresh token");
                        inner.report(format!("Not able to refresh token. {e}"));
                        break;
                    }
                }
            }
        });

        if let Some(previous) = self.task.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Stop the background refresh task.
    pub fn stop(&self) {
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
            tracing::debug!("Token refresh stopped");
        }
    }

    /// Whether the background refresh task is alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for TokenManager {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("oauth_url", &self.inner.oauth_url)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wsi_http::{ApiRequest, TransportError};

    /// Token endpoint double answering from a script and timing each call.
    #[derive(Default)]
    struct ScriptedTokens {
        replies: Mutex<VecDeque<Result<Value, TransportError>>>,
        calls: Mutex<Vec<Instant>>,
    }

    impl ScriptedTokens {
        fn new(replies: Vec<Result<Value, TransportError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                calls: Mutex::default(),
            })
        }

        fn call_times(&self) -> Vec<Instant> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTokens {
        async fn send(&self, _request: ApiRequest) -> Result<Value, TransportError> {
            self.calls.lock().push(Instant::now());
            self.replies
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::Request("script exhausted".into())))
        }
    }

    fn token(value: &str, expires_in: u64) -> Result<Value, TransportError> {
        Ok(json!({ "access_token": value, "expires_in": expires_in }))
    }

    fn credential() -> Credential {
        Credential::from_claims(
            &json!({
                "oauthUrl": "https://oauth.example.test/access_token",
                "refreshToken": "refresh",
                "webexapisBaseUrl": "https://api.example.test/v1"
            }),
            None,
        )
        .unwrap()
    }

    fn manager(transport: Arc<ScriptedTokens>) -> TokenManager {
        let client = ClientCredentials {
            client_id: "id".into(),
            client_secret: "secret".into(),
        };
        TokenManager::new(transport, &client, &credential(), TokenStore::new())
    }

    #[test]
    fn delay_is_fifteen_minutes_before_expiry() {
        assert_eq!(refresh_delay(3600), Duration::from_secs(2700));
        assert_eq!(refresh_delay(600), MIN_REFRESH_DELAY);
    }

    #[tokio::test(start_paused = true)]
    async fn refreshes_fifteen_minutes_before_expiry() {
        let transport = ScriptedTokens::new(vec![
            token("first", 3600),
            token("second", 3600),
            token("third", 3600),
        ]);
        let manager = manager(transport.clone());

        manager.acquire().await.unwrap();
        manager.start();

        tokio::time::sleep(Duration::from_secs(2699)).await;
        assert_eq!(transport.call_times().len(), 1);
        assert_eq!(manager.store().bearer().await.as_deref(), Some("first"));

        tokio::time::sleep(Duration::from_secs(2)).await;
        let calls = transport.call_times();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1] - calls[0], Duration::from_secs(2700));
        assert_eq!(manager.store().bearer().await.as_deref(), Some("second"));

        tokio::time::sleep(Duration::from_secs(2700)).await;
        let calls = transport.call_times();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[2] - calls[1], Duration::from_secs(2700));
    }

    #[tokio::test(start_paused = true)]
    async fn failure_is_reported_once_and_stops_refreshing() {
        let transport = ScriptedTokens::new(vec![
            token("first", 3600),
            Err(TransportError::Status {
                status: 400,
                body: "invalid_grant".into(),
            }),
        ]);
        let manager = manager(transport.clone());
        let reports = Arc::new(Mutex::new(Vec::new()));
        let sink = reports.clone();
        manager.set_error_handler(Arc::new(move |message| sink.lock().push(message)));

        manager.acquire().await.unwrap();
        manager.start();
        tokio::time::sleep(Duration::from_secs(24 * 3600)).await;

        let reports = reports.lock();
        assert_eq!(reports.len(), 1);
        assert!(reports[0].starts_with("Not able to refresh token. "));
        assert!(reports[0].contains("invalid_grant"));
        assert_eq!(transport.call_times().len(), 2);
        assert!(!manager.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn manual_refresh_rearms_timer() {
        let transport = ScriptedTokens::new(vec![
            token("first", 3600),
            token("manual", 3600),
            token("timer", 3600),
        ]);
        let manager = manager(transport.clone());
        manager.acquire().await.unwrap();
        manager.start();

        tokio::time::sleep(Duration::from_secs(1000)).await;
        manager.refresh().await.unwrap();

        // The old deadline at 2700 s must not fire.
        tokio::time::sleep(Duration::from_secs(2000)).await;
        assert_eq!(transport.call_times().len(), 2);

        tokio::time::sleep(Duration::from_secs(701)).await;
        let calls = transport.call_times();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[2] - calls[1], Duration::from_secs(2700));
    }

    #[tokio::test(start_paused = true)]
    async fn manual_refresh_after_failure_resumes_timer() {
        let transport = ScriptedTokens::new(vec![
            token("first", 3600),
            Err(TransportError::Status {
                status: 500,
                body: "unavailable".into(),
            }),
            token("manual", 3600),
            token("timer", 3600),
        ]);
        let manager = manager(transport.clone());
        manager.acquire().await.unwrap();
        manager.start();

        tokio::time::sleep(Duration::from_secs(2701)).await;
        assert_eq!(transport.call_times().len(), 2);
        assert!(!manager.is_running());

        manager.refresh().await.unwrap();
        assert!(manager.is_running());

        tokio::time::sleep(Duration::from_secs(2701)).await;
        let calls = transport.call_times();
        assert_eq!(calls.len(), 4);
        assert_eq!(calls[3] - calls[2], Duration::from_secs(2700));
        assert_eq!(manager.store().bearer().await.as_deref(), Some("timer"));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_pending_refresh() {
        let transport = ScriptedTokens::new(vec![token("first", 3600), token("second", 3600)]);
        let manager = manager(transport.clone());
        manager.acquire().await.unwrap();
        manager.start();
        assert!(manager.is_running());

        manager.stop();
        tokio::time::sleep(Duration::from_secs(4000)).await;

        assert_eq!(transport.call_times().len(), 1);
        assert!(!manager.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn resumed_token_refreshes_before_its_expiry() {
        let transport = ScriptedTokens::new(vec![token("fresh", 3600)]);
        let client = ClientCredentials {
            client_id: "id".into(),
            client_secret: "secret".into(),
        };
        let existing = AccessToken::with_lifetime("persisted", chrono::Duration::minutes(20));
        let store = TokenStore::with_token(existing.clone());
        let manager = TokenManager::from_existing(
            transport.clone(),
            &client,
            &credential(),
            store,
            &existing,
        );
        let started = Instant::now();
        manager.start();

        tokio::time::sleep(Duration::from_secs(4 * 60)).await;
        assert!(transport.call_times().is_empty());

        tokio::time::sleep(Duration::from_secs(2 * 60)).await;
        let calls = transport.call_times();
        assert_eq!(calls.len(), 1);
        assert!(calls[0] - started <= Duration::from_secs(5 * 60));
        assert_eq!(manager.store().bearer().await.as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn malformed_response_is_distinguished() {
        let transport = ScriptedTokens::new(vec![Ok(json!({ "error": "nope" }))]);
        let manager = manager(transport);

        assert!(matches!(
            manager.acquire().await,
            Err(AuthError::MalformedResponse(_))
        ));
    }
}
