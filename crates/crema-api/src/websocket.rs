//! Push channel: websocket delta stream with auto-reconnect.
//!
//! Connects to the machine's events websocket and forwards every property
//! update as a [`PushDelta`] through a bounded [`tokio::sync::mpsc`]
//! channel. Handles reconnection with exponential backoff + jitter
//! automatically.
//!
//! # Example
//!
//! ```rust,ignore
//! use crema_api::websocket::{PushRegistration, ReconnectConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! let (tx, mut rx) = tokio::sync::mpsc::channel(64);
//! let url = url::Url::parse("wss://gw.example.com/api/v1/machines/GS012345/events")?;
//! let registration = PushRegistration::connect(url, ReconnectConfig::default(), CancellationToken::new(), None, tx);
//!
//! while let Some(delta) = rx.recv().await {
//!     println!("{} = {}", delta.key, delta.value);
//! }
//!
//! registration.close().await;
//! ```

use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;
use crate::status::{PushDelta, StatusValue};

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Exponential backoff configuration for websocket reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,

    /// Maximum reconnection attempts before giving up.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: None,
        }
    }
}

// ── PushRegistration ─────────────────────────────────────────────────

/// Registration handle for a running push channel.
///
/// The socket itself is owned by the background task; the holder of this
/// handle can only close it.
pub struct PushRegistration {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl PushRegistration {
    /// Spawn the reconnection loop and return immediately.
    ///
    /// The first connection attempt happens asynchronously. Deltas are
    /// delivered in frame order; when `deltas` is full the reader waits,
    /// which applies backpressure to the socket rather than dropping updates.
    pub fn connect(
        ws_url: Url,
        reconnect: ReconnectConfig,
        cancel: CancellationToken,
        bearer: Option<String>,
        deltas: mpsc::Sender<PushDelta>,
    ) -> Self {
        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            ws_loop(ws_url, deltas, reconnect, task_cancel, bearer).await;
        });

        Self {
            cancel,
            task: Some(task),
        }
    }

    /// A registration with no background task, closed by cancelling `cancel`.
    ///
    /// Used by sources that deliver deltas through other means.
    pub fn detached(cancel: CancellationToken) -> Self {
        Self { cancel, task: None }
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Signal the background task to stop and wait for it to exit.
    pub async fn close(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::debug!(error = %e, "push task ended abnormally");
            }
        }
    }
}

// ── Background reconnection loop ─────────────────────────────────────

/// Main loop: connect → read → on error, backoff → reconnect.
async fn ws_loop(
    ws_url: Url,
    deltas: mpsc::Sender<PushDelta>,
    reconnect: ReconnectConfig,
    cancel: CancellationToken,
    bearer: Option<String>,
) {
    let mut attempt: u32 = 0;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = connect_and_read(&ws_url, &deltas, &cancel, bearer.as_deref()) => {
                match result {
                    Ok(ReadOutcome::ReceiverGone) => {
                        tracing::debug!("push receiver dropped, stopping websocket");
                        break;
                    }
                    // Clean disconnect: reset attempt counter and reconnect immediately.
                    Ok(ReadOutcome::Disconnected) => {
                        tracing::info!("push websocket disconnected cleanly, reconnecting");
                        attempt = 0;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, attempt, "push websocket error");

                        if let Some(max) = reconnect.max_retries {
                            if attempt >= max {
                                tracing::error!(
                                    max_retries = max,
                                    "push websocket reconnection limit reached, giving up"
                                );
                                break;
                            }
                        }

                        let delay = calculate_backoff(attempt, &reconnect);
                        tracing::info!(
                            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                            attempt,
                            "waiting before reconnect"
                        );

                        tokio::select! {
                            biased;
                            () = cancel.cancelled() => break,
                            () = tokio::time::sleep(delay) => {}
                        }

                        attempt = attempt.saturating_add(1);
                    }
                }
            }
        }
    }

    tracing::debug!("push websocket loop exiting");
}

enum ReadOutcome {
    Disconnected,
    ReceiverGone,
}

// ── Single connection lifecycle ──────────────────────────────────────

/// Establish a single websocket connection, read frames until it drops.
async fn connect_and_read(
    url: &Url,
    deltas: &mpsc::Sender<PushDelta>,
    cancel: &CancellationToken,
    bearer: Option<&str>,
) -> Result<ReadOutcome, Error> {
    tracing::info!(url = %url, "connecting push websocket");

    let uri: tungstenite::http::Uri = url
        .as_str()
        .parse()
        .map_err(|e: tungstenite::http::uri::InvalidUri| Error::WebSocketConnect(e.to_string()))?;

    let mut request = ClientRequestBuilder::new(uri);
    if let Some(value) = bearer {
        request = request.with_header("Authorization", value);
    }

    let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

    tracing::info!("push websocket connected");

    let (_write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(ReadOutcome::Disconnected),
            frame = read.next() => {
                match frame {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        for delta in parse_frame(&text) {
                            if deltas.send(delta).await.is_err() {
                                return Ok(ReadOutcome::ReceiverGone);
                            }
                        }
                    }
                    Some(Ok(tungstenite::Message::Ping(_))) => {
                        // tungstenite handles pong replies automatically
                        tracing::trace!("push websocket ping");
                    }
                    Some(Ok(tungstenite::Message::Close(frame))) => {
                        if let Some(cf) = frame {
                            tracing::info!(
                                code = %cf.code,
                                reason = %cf.reason,
                                "push websocket close frame received"
                            );
                        }
                        return Ok(ReadOutcome::Disconnected);
                    }
                    Some(Err(e)) => {
                        return Err(Error::WebSocketConnect(e.to_string()));
                    }
                    None => {
                        tracing::info!("push websocket stream ended");
                        return Ok(ReadOutcome::Disconnected);
                    }
                    Some(Ok(_)) => {
                        // Binary, Pong, Frame -- ignore
                    }
                }
            }
        }
    }
}

// ── Frame parsing ────────────────────────────────────────────────────

/// Parse a text frame of the form `{ "<property>": <value>, ... }`.
///
/// Malformed frames are logged and yield nothing; they never tear down
/// the connection.
fn parse_frame(text: &str) -> Vec<PushDelta> {
    let obj = match serde_json::from_str::<serde_json::Value>(text) {
        Ok(serde_json::Value::Object(obj)) => obj,
        Ok(_) => {
            tracing::debug!("push frame is not a JSON object, skipping");
            return Vec::new();
        }
        Err(e) => {
            tracing::debug!(error = %e, "failed to parse push frame");
            return Vec::new();
        }
    };

    obj.into_iter()
        .filter_map(|(key, raw)| {
            StatusValue::from_json(raw).map(|value| PushDelta { key, value })
        })
        .collect()
}

// ── Backoff calculation ──────────────────────────────────────────────

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) + jitter`
///
/// Jitter is +-25% to spread out reconnection storms from multiple clients.
#[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exp = attempt.min(31) as i32;
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exp);
    let capped = base.min(config.max_delay.as_secs_f64());

    // Deterministic "jitter" seeded from the attempt number.
    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    let with_jitter = (capped * jitter_factor).max(0.0);

    Duration::from_secs_f64(with_jitter)
}

// ── Tests ────────────────────────────────────────────────────────────
