//! Headless consumer of the notification stream.
//!
//! Connects with a bearer token, decodes SSE frames into the
//! [`NotificationStore`], and reconnects with [`Backoff`] whenever the stream
//! errors or ends. Missed events are not replayed after a reconnect.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::watch;

use crate::client::backoff::{Backoff, DEFAULT_MAX_BACKOFF, MIN_BACKOFF};
use crate::client::store::NotificationStore;
use crate::wire::FrameDecoder;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("stream rejected credentials")]
    Unauthorized,

    #[error("stream returned status {0}")]
    Status(StatusCode),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

pub struct StreamClient {
    http: Client,
    url: String,
    token: String,
    store: Arc<NotificationStore>,
    min_backoff: Duration,
    max_backoff: Duration,
}

#[derive(Deserialize)]
struct UnreadCount {
    count: u64,
}

impl StreamClient {
    pub fn new(url: impl Into<String>, token: impl Into<String>, store: Arc<NotificationStore>) -> Self {
        // No overall timeout: the stream is meant to stay open.
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            http,
            url: url.into(),
            token: token.into(),
            store,
            min_backoff: MIN_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }

    /// Override the reconnect delays. The floor stays at one second.
    pub fn with_backoff(mut self, min: Duration, max: Duration) -> Self {
        self.min_backoff = min;
        self.max_backoff = max;
        self
    }

    /// Consume the stream until `shutdown` flips to `true` (or its sender is
    /// dropped). An in-flight read or reconnect wait is cancelled immediately.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut backoff = Backoff::new(self.min_backoff, self.max_backoff);
        let mut decoder = FrameDecoder::new();

        loop {
            if *shutdown.borrow() {
                break;
            }

            let outcome = tokio::select! {
                outcome = self.consume(&mut decoder, &mut backoff) => outcome,
                _ = shutdown.changed() => break,
            };

            match outcome {
                Ok(()) => tracing::info!(url = %self.url, "notification stream ended"),
                Err(ClientError::Unauthorized) => {
                    tracing::warn!(url = %self.url, "notification stream rejected credentials")
                }
                Err(e) => tracing::warn!(url = %self.url, error = %e, "notification stream failed"),
            }

            decoder.reset();
            let delay = backoff.next_delay();
            tracing::debug!(attempt = backoff.attempt(), ?delay, "reconnecting");

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => break,
            }
        }

        tracing::info!(url = %self.url, "notification client stopped");
    }

    async fn consume(
        &self,
        decoder: &mut FrameDecoder,
        backoff: &mut Backoff,
    ) -> Result<(), ClientError> {
        let resp = self
            .http
            .get(&self.url)
            .bearer_auth(&self.token)
            .header(header::ACCEPT, "text/event-stream")
            .send()
            .await?;

        match resp.status() {
            StatusCode::UNAUTHORIZED => return Err(ClientError::Unauthorized),
            status if !status.is_success() => return Err(ClientError::Status(status)),
            _ => {}
        }

        backoff.reset();
        tracing::info!(url = %self.url, "notification stream connected");

        let mut body = resp.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            for event in decoder.push(&chunk) {
                if self.store.on_stream_event(&event) {
                    tracing::debug!(
                        unread = self.store.snapshot().count(),
                        message_id = %event.message().id,
                        "unread count incremented"
                    );
                }
            }
        }

        Ok(())
    }

    /// Manually reconcile the unread count from a `{count}` endpoint.
    pub async fn refresh_unread(&self, url: &str) -> anyhow::Result<u64> {
        let resp = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .timeout(Duration::from_secs(10))
            .send()
            .await?
            .error_for_status()?;
        let UnreadCount { count } = resp.json().await?;
        self.store.apply_unread_count(count);
        Ok(count)
    }
}
