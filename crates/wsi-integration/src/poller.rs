//! Long-poll acquisition loop.
//!
//! The loop fetches one batch at a time from the queue URL handed out on
//! activation and passes the decoded notifications on in order. Failed polls
//! are retried after a fixed backoff; only the shutdown flag ends the loop.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use wsi_core::Notification;
use wsi_http::ApiClient;

/// Pause after a failed poll before trying again.
pub const RETRY_BACKOFF: Duration = Duration::from_secs(5);

/// Receives decoded notification batches.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Handle one batch, in delivery order.
    async fn deliver(&self, batch: Vec<Notification>);
}

/// Decode raw records, skipping the ones that cannot be decoded.
#[must_use]
pub fn decode_batch(messages: Vec<Value>) -> Vec<Notification> {
    messages
        .into_iter()
        .filter_map(|record| match Notification::from_value(record) {
            Ok(notification) => Some(notification),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping undecodable notification");
                None
            }
        })
        .collect()
}

/// Repeatedly polls the queue and feeds a [`NotificationSink`].
pub struct PollLoop {
    api: ApiClient,
    poll_url: String,
    sink: Arc<dyn NotificationSink>,
    backoff: Duration,
}

impl PollLoop {
    /// Create a loop polling `poll_url` with the session's client.
    #[must_use]
    pub fn new(
        api: ApiClient,
        poll_url: impl Into<String>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            api,
            poll_url: poll_url.into(),
            sink,
            backoff: RETRY_BACKOFF,
        }
    }

    /// Override the retry backoff.
    #[must_use]
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Poll until `shutdown` becomes `true` or its sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(poll_url = %self.poll_url, "Long polling started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let result = tokio::select! {
                result = self.api.poll(&self.poll_url) => result,
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            };

            match result {
                Ok(batch) => {
                    let notifications = decode_batch(batch.messages);
                    if !notifications.is_empty() {
                        tracing::debug!(count = notifications.len(), "Received notifications");
                        self.sink.deliver(notifications).await;
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        retry_in_secs = self.backoff.as_secs(),
                        "Long poll failed"
                    );
                    tokio::select! {
                        () = tokio::time::sleep(self.backoff) => {}
                        changed = shutdown.changed() => {
                            if changed.is_err() {
                                break;
                            }
                        }
                    }
                }
            }
        }

        tracing::info!(poll_url = %self.poll_url, "Long polling stopped");
    }

    /// Run the loop on a new task.
    #[must_use]
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}

impl std::fmt::Debug for PollLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollLoop")
            .field("poll_url", &self.poll_url)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}
