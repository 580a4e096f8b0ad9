//! Integration session.
//!
//! [`Integration::connect`] turns a configuration into a running session:
//!
//! 1. validate the configuration, before any request is made
//! 2. verify the activation code and extract the connection data
//! 3. obtain the first access token and start background refresh
//! 4. activate the integration (notification delivery, actions URL)
//! 5. in long-polling mode, start the [`PollLoop`]
//!
//! Status updates and events reach the listeners registered through
//! [`Integration::xapi`]. Signed actions are verified and handed to the
//! handler set with [`Integration::on_action`].

use crate::config::{ActivationCode, IntegrationConfig};
use crate::devices::Devices;
use crate::error::{IntegrationError, ValidationError};
use crate::poller::{decode_batch, NotificationSink, PollLoop};
use crate::workspaces::Workspaces;
use crate::xapi::Xapi;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use wsi_auth::{
    AuthError, ClientCredentials, Credential, CredentialError, CredentialVerifier, JwksResolver,
    KeyResolver, TokenManager,
};
use wsi_core::{Notification, NotificationRouter};
use wsi_http::{
    activate, AccessToken, ActivationRequest, ApiClient, AppInfo, Method, NotificationMode,
    ReqwestTransport, TokenStore, Transport, TransportConfig,
};

/// Callback receiving the verified claims of an action message.
pub type ActionHandler = Arc<dyn Fn(Value) + Send + Sync>;

/// Routes decoded notifications: actions to the action handler, the rest to
/// the listener registries.
struct Dispatcher {
    router: Arc<NotificationRouter>,
    verifier: Arc<CredentialVerifier>,
    on_action: RwLock<Option<ActionHandler>>,
}

impl Dispatcher {
    async fn handle_action(&self, jwt: &str) {
        // Unverified, so the token id stays unused until a handler exists.
        let handler = self.on_action.read().clone();
        let Some(handler) = handler else {
            tracing::debug!("No action handler registered");
            return;
        };

        let Some(claims) = self.verifier.decode_and_verify(jwt).await else {
            tracing::warn!("Not able to verify action message, ignoring it");
            return;
        };

        if catch_unwind(AssertUnwindSafe(|| handler(claims))).is_err() {
            tracing::error!("Action handler panicked");
        }
    }
}

#[async_trait]
impl NotificationSink for Dispatcher {
    async fn deliver(&self, batch: Vec<Notification>) {
        for notification in batch {
            match &notification {
                Notification::Action { jwt, .. } => self.handle_action(jwt).await,
                other => {
                    let invoked = self.router.process(other);
                    tracing::debug!(
                        kind = ?other.kind(),
                        device_id = other.device_id(),
                        invoked,
                        "Dispatched notification"
                    );
                }
            }
        }
    }
}

/// Everything needed to resume a session without a new activation.
///
/// Treat as opaque: persist it with `serde` and pass it back to
/// [`Integration::resume`].
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    /// OAuth client id
    pub client_id: String,
    /// OAuth client secret
    pub client_secret: String,
    /// Connection data from the activation code
    pub credential: Credential,
    /// Last access token, if one was held
    #[serde(default)]
    pub access_token: Option<AccessToken>,
    /// Long-poll queue URL
    #[serde(default)]
    pub poll_url: Option<String>,
    /// Notification delivery
    #[serde(default)]
    pub notifications: NotificationMode,
}

impl std::fmt::Debug for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionState")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("credential", &self.credential)
            .field("access_token", &self.access_token)
            .field("poll_url", &self.poll_url)
            .field("notifications", &self.notifications)
            .finish()
    }
}

/// Pieces shared by [`Integration::connect_with`] and
/// [`Integration::resume_with`].
struct Parts {
    transport: Arc<dyn Transport>,
    client: ClientCredentials,
    credential: Credential,
    notifications: NotificationMode,
    tokens: TokenManager,
    verifier: Arc<CredentialVerifier>,
    poll_url: Option<String>,
}

/// A connected integration.
///
/// Dropping the session stops token refresh and long polling.
pub struct Integration {
    client: ClientCredentials,
    credential: Credential,
    notifications: NotificationMode,
    api: ApiClient,
    tokens: TokenManager,
    dispatcher: Arc<Dispatcher>,
    xapi: Xapi,
    devices: Devices,
    workspaces: Workspaces,
    poll_url: Option<String>,
    shutdown: watch::Sender<bool>,
    poller: Mutex<Option<JoinHandle<()>>>,
}

fn transport_for(config: &IntegrationConfig) -> Result<Arc<dyn Transport>, IntegrationError> {
    let transport = ReqwestTransport::new(&TransportConfig {
        timeout: config.http.timeout(),
        ..TransportConfig::default()
    })?;
    Ok(Arc::new(transport))
}

/// Report missing connection data as a validation error.
fn incomplete(error: CredentialError) -> IntegrationError {
    match error {
        CredentialError::MissingField(key) => {
            ValidationError::IncompleteActivationCode(key).into()
        }
        other => other.into(),
    }
}

impl Integration {
    /// Connect with the default HTTP transport and regional signing keys.
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid, the activation code is
    /// rejected, or token exchange or activation fails.
    pub async fn connect(config: IntegrationConfig) -> Result<Self, IntegrationError> {
        config.validate()?;
        let transport = transport_for(&config)?;
        let keys = Arc::new(JwksResolver::new(config.http.timeout())?);
        Self::connect_with(config, transport, keys).await
    }

    /// Connect through the given transport and key resolver.
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid, the activation code is
    /// rejected, or token exchange or activation fails.
    pub async fn connect_with(
        config: IntegrationConfig,
        transport: Arc<dyn Transport>,
        keys: Arc<dyn KeyResolver>,
    ) -> Result<Self, IntegrationError> {
        let activation = config.validate()?;
        let verifier = Arc::new(CredentialVerifier::new(keys));

        let credential = match activation {
            ActivationCode::Jwt(token) => verifier.verify_activation(token).await,
            ActivationCode::Decoded(claims) => Credential::from_claims(claims, None),
        }
        .map_err(incomplete)?;
        let app_url = credential
            .app_url
            .clone()
            .ok_or(ValidationError::MissingAppUrl)?;

        let client = ClientCredentials {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
        };
        let tokens = TokenManager::new(
            transport.clone(),
            &client,
            &credential,
            TokenStore::new(),
        );
        let token = tokens.acquire().await?;

        let request = ActivationRequest::new(
            config.notifications,
            config.webhook.clone(),
            config.actions_url.clone(),
        );
        let info = activate(transport.as_ref(), token.value(), &app_url, &request)
            .await
            .map_err(AuthError::Activation)?;
        tracing::info!(
            app_id = %info.id,
            notifications = ?config.notifications,
            "Integration activated"
        );

        let poll_url = match config.notifications {
            NotificationMode::LongPolling => Some(
                info.poll_url()
                    .ok_or(IntegrationError::MissingPollUrl)?
                    .to_string(),
            ),
            _ => None,
        };

        Ok(Self::assemble(Parts {
            transport,
            client,
            credential,
            notifications: config.notifications,
            tokens,
            verifier,
            poll_url,
        }))
    }

    /// Resume a serialized session with the default HTTP transport.
    ///
    /// # Errors
    ///
    /// Returns error if a token has to be fetched and the exchange fails.
    pub async fn resume(state: SessionState) -> Result<Self, IntegrationError> {
        let transport = transport_for(&IntegrationConfig::default())?;
        let keys = Arc::new(JwksResolver::new(TransportConfig::default().timeout)?);
        Self::resume_with(state, transport, keys).await
    }

    /// Resume a serialized session without activating again.
    ///
    /// A persisted token is reused and refreshed ahead of its expiry; without
    /// one a new token is fetched first.
    ///
    /// # Errors
    ///
    /// Returns error if a token has to be fetched and the exchange fails.
    pub async fn resume_with(
        state: SessionState,
        transport: Arc<dyn Transport>,
        keys: Arc<dyn KeyResolver>,
    ) -> Result<Self, IntegrationError> {
        let client = ClientCredentials {
            client_id: state.client_id,
            client_secret: state.client_secret,
        };

        let tokens = match &state.access_token {
            Some(token) => TokenManager::from_existing(
                transport.clone(),
                &client,
                &state.credential,
                TokenStore::with_token(token.clone()),
                token,
            ),
            None => {
                let tokens = TokenManager::new(
                    transport.clone(),
                    &client,
                    &state.credential,
                    TokenStore::new(),
                );
                tokens.acquire().await?;
                tokens
            }
        };
        tracing::info!("Integration resumed");

        Ok(Self::assemble(Parts {
            transport,
            client,
            credential: state.credential,
            notifications: state.notifications,
            tokens,
            verifier: Arc::new(CredentialVerifier::new(keys)),
            poll_url: state.poll_url,
        }))
    }

    fn assemble(parts: Parts) -> Self {
        let api = ApiClient::new(
            parts.transport,
            &parts.credential.webexapis_base_url,
            parts.tokens.store().clone(),
        );
        let router = Arc::new(NotificationRouter::new());
        let dispatcher = Arc::new(Dispatcher {
            router: router.clone(),
            verifier: parts.verifier,
            on_action: RwLock::new(None),
        });

        parts.tokens.start();

        let (shutdown, watcher) = watch::channel(false);
        let poller = parts.poll_url.as_ref().map(|url| {
            PollLoop::new(api.clone(), url.clone(), dispatcher.clone()).spawn(watcher)
        });

        Self {
            client: parts.client,
            credential: parts.credential,
            notifications: parts.notifications,
            xapi: Xapi::new(api.clone(), router),
            devices: Devices::new(api.clone()),
            workspaces: Workspaces::new(api.clone()),
            api,
            tokens: parts.tokens,
            dispatcher,
            poll_url: parts.poll_url,
            shutdown,
            poller: Mutex::new(poller),
        }
    }

    /// Register the handler for background failures such as a token refresh
    /// that did not succeed.
    pub fn on_error<F>(&self, handler: F)
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        self.tokens.set_error_handler(Arc::new(handler));
    }

    /// Register the handler for verified action messages, replacing any
    /// previous one.
    pub fn on_action<F>(&self, handler: F)
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        *self.dispatcher.on_action.write() = Some(Arc::new(handler));
    }

    /// Fetch a new access token now.
    ///
    /// # Errors
    ///
    /// Returns error if the exchange fails.
    pub async fn refresh_token(&self) -> Result<AccessToken, IntegrationError> {
        Ok(self.tokens.refresh().await?)
    }

    /// Call any device-API endpoint with the current token.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    pub async fn web_api(
        &self,
        partial: &str,
        method: Method,
        body: Option<Value>,
        content_type: Option<&str>,
    ) -> Result<Value, IntegrationError> {
        Ok(self.api.web_api(partial, method, body, content_type).await?)
    }

    /// Read the integration details from the app URL.
    ///
    /// # Errors
    ///
    /// Returns error if the activation code had no app URL or the request
    /// fails.
    pub async fn app_info(&self) -> Result<AppInfo, IntegrationError> {
        let app_url = self
            .credential
            .app_url
            .as_deref()
            .ok_or(ValidationError::MissingAppUrl)?;
        Ok(self.api.ping(app_url).await?)
    }

    /// Dispatch notification records received by a webhook.
    pub async fn process_notifications(&self, messages: Vec<Value>) {
        self.dispatcher.deliver(decode_batch(messages)).await;
    }

    /// Verify a signed message, returning its claims or `None`.
    pub async fn decode_and_verify(&self, jwt: &str) -> Option<Value> {
        self.dispatcher.verifier.decode_and_verify(jwt).await
    }

    /// Snapshot of the session for [`Integration::resume`].
    pub async fn serialize(&self) -> SessionState {
        SessionState {
            client_id: self.client.client_id.clone(),
            client_secret: self.client.client_secret.clone(),
            credential: self.credential.clone(),
            access_token: self.tokens.store().current().await,
            poll_url: self.poll_url.clone(),
            notifications: self.notifications,
        }
    }

    /// Stop token refresh and long polling, waiting for the poller to exit.
    pub async fn shutdown(&self) {
        self.shutdown.send_replace(true);
        self.tokens.stop();

        let poller = self.poller.lock().take();
        if let Some(handle) = poller {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Poller task ended abnormally");
            }
        }
        tracing::info!("Integration shut down");
    }

    /// xAPI commands, status, configurations and events.
    #[must_use]
    pub fn xapi(&self) -> &Xapi {
        &self.xapi
    }

    /// Devices visible to the integration.
    #[must_use]
    pub fn devices(&self) -> &Devices {
        &self.devices
    }

    /// Workspaces visible to the integration.
    #[must_use]
    pub fn workspaces(&self) -> &Workspaces {
        &self.workspaces
    }

    /// Device-API client using the session token.
    #[must_use]
    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    /// Connection data from the activation code.
    #[must_use]
    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    /// Long-poll queue URL, in long-polling mode.
    #[must_use]
    pub fn poll_url(&self) -> Option<&str> {
        self.poll_url.as_deref()
    }
}

impl std::fmt::Debug for Integration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Integration")
            .field("client", &self.client)
            .field("credential", &self.credential)
            .field("notifications", &self.notifications)
            .field("poll_url", &self.poll_url)
            .finish_non_exhaustive()
    }
}

impl Drop for Integration {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}
