//! Test doubles shared by the unit tests of this crate.

use async_trait::async_trait;
use jsonwebtoken::{encode, Algorithm, DecodingKey, EncodingKey, Header};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::time::Instant;
use wsi_auth::{CredentialError, KeyResolver, VerifyingKey};
use wsi_http::{AccessToken, ApiClient, ApiRequest, TokenStore, Transport, TransportError};

pub const SIGNING_SECRET: &[u8] = b"integration-test-secret";
pub const KEY_ID: &str = "test-key";

enum Reply {
    Answer(Result<Value, TransportError>),
    Hang,
}

struct Route {
    method: String,
    fragment: String,
    replies: VecDeque<Reply>,
}

/// Scripted cloud: answers requests by method and URL fragment, in order.
///
/// A route whose replies ran out answers with a request error. A `hang`
/// reply never answers and stays at the front of its queue.
#[derive(Default)]
pub struct FakeCloud {
    routes: Mutex<Vec<Route>>,
    requests: Mutex<Vec<(ApiRequest, Instant)>>,
}

impl FakeCloud {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn push(&self, method: &str, fragment: &str, reply: Reply) {
        let mut routes = self.routes.lock();
        match routes
            .iter_mut()
            .find(|r| r.method == method && r.fragment == fragment)
        {
            Some(route) => route.replies.push_back(reply),
            None => routes.push(Route {
                method: method.to_string(),
                fragment: fragment.to_string(),
                replies: VecDeque::from([reply]),
            }),
        }
    }

    pub fn reply(&self, method: &str, fragment: &str, reply: Result<Value, TransportError>) {
        self.push(method, fragment, Reply::Answer(reply));
    }

    pub fn hang(&self, method: &str, fragment: &str) {
        self.push(method, fragment, Reply::Hang);
    }

    pub fn api(self: &Arc<Self>, base_url: &str, store: TokenStore) -> ApiClient {
        ApiClient::new(self.clone(), base_url, store)
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().iter().map(|(r, _)| r.clone()).collect()
    }

    pub fn requests_with_time(&self) -> Vec<(ApiRequest, Instant)> {
        self.requests.lock().clone()
    }

    pub fn urls(&self) -> Vec<String> {
        self.requests.lock().iter().map(|(r, _)| r.url.clone()).collect()
    }

    fn next_reply(&self, request: &ApiRequest) -> Option<Result<Value, TransportError>> {
        let mut routes = self.routes.lock();
        let route = routes.iter_mut().find(|r| {
            r.method == request.method.as_str()
                && request.url.contains(&r.fragment)
                && !r.replies.is_empty()
        });

        match route {
            Some(route) if matches!(route.replies.front(), Some(Reply::Hang)) => None,
            Some(route) => match route.replies.pop_front() {
                Some(Reply::Answer(answer)) => Some(answer),
                _ => None,
            },
            None => Some(Err(TransportError::Request(format!(
                "no scripted reply for {} {}",
                request.method, request.url
            )))),
        }
    }
}

#[async_trait]
impl Transport for FakeCloud {
    async fn send(&self, request: ApiRequest) -> Result<Value, TransportError> {
        self.requests.lock().push((request.clone(), Instant::now()));
        match self.next_reply(&request) {
            Some(answer) => answer,
            None => std::future::pending().await,
        }
    }
}

pub fn token_store() -> TokenStore {
    TokenStore::with_token(AccessToken::with_lifetime(
        "test-access-token",
        chrono::Duration::hours(1),
    ))
}

/// Resolves every key id to the shared HS256 secret.
pub struct StaticKeys;

#[async_trait]
impl KeyResolver for StaticKeys {
    async fn resolve(&self, url: &str, kid: &str) -> Result<VerifyingKey, CredentialError> {
        if kid != KEY_ID {
            return Err(CredentialError::KeyNotFound {
                kid: kid.to_string(),
                url: url.to_string(),
            });
        }
        Ok(VerifyingKey {
            key: DecodingKey::from_secret(SIGNING_SECRET),
            algorithm: Some(Algorithm::HS256),
        })
    }
}

/// Sign `claims` with the shared secret, adding a fresh `jti` and `iat`.
pub fn sign(mut claims: Value) -> String {
    if let Value::Object(map) = &mut claims {
        map.entry("jti")
            .or_insert_with(|| Value::String(uuid::Uuid::new_v4().to_string()));
        map.entry("iat")
            .or_insert_with(|| Value::from(chrono::Utc::now().timestamp()));
    }
    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some(KEY_ID.to_string());
    encode(&header, &claims, &EncodingKey::from_secret(SIGNING_SECRET)).unwrap()
}
