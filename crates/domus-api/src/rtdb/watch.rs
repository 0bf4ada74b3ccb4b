//! Streaming subscription to one database path, with auto-reconnect.
//!
//! Each connection opens an event stream, mirrors the subtree locally and
//! forwards the whole value at the watched path whenever it changes.
//! Failures are reported as [`WatchEvent::Error`] and followed by a
//! reconnect using exponential backoff with jitter.

use std::time::Duration;

use futures_util::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::RtdbClient;
use super::sse::{self, StreamPayload};
use crate::error::Error;

// ── WatchEvent ───────────────────────────────────────────────────────

/// Item delivered to watchers.
#[derive(Debug)]
pub enum WatchEvent {
    /// Current value at the watched path. `None` when the path is absent.
    Value(Option<Value>),
    /// The stream failed; a reconnect follows unless retries are exhausted.
    Error(Error),
}

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Exponential backoff configuration for stream reconnection.
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

// ── Background reconnection loop ─────────────────────────────────────

/// Per-watch state that survives reconnects.
struct WatchState {
    /// Last value forwarded. Outer `None` means nothing sent yet.
    last: Option<Option<Value>>,
}

impl WatchState {
    /// Forward `value` unless it equals the last one sent.
    fn emit(&mut self, value: Option<Value>, tx: &mpsc::UnboundedSender<WatchEvent>) {
        if self.last.as_ref() == Some(&value) {
            return;
        }
        self.last = Some(value.clone());
        let _ = tx.send(WatchEvent::Value(value));
    }
}

/// Main loop: connect → read → on error, backoff → reconnect.
pub(super) async fn watch_loop(
    client: RtdbClient,
    path: String,
    reconnect: ReconnectConfig,
    tx: mpsc::UnboundedSender<WatchEvent>,
    cancel: CancellationToken,
) {
    let mut attempt: u32 = 0;
    let mut state = WatchState { last: None };

    loop {
        if cancel.is_cancelled() || tx.is_closed() {
            break;
        }

        let delay = match connect_and_read(&client, &path, &tx, &cancel, &mut state).await {
            Ok(()) if cancel.is_cancelled() => break,
            Ok(()) => {
                tracing::debug!(path, "event stream ended, reconnecting");
                attempt = 0;
                calculate_backoff(0, &reconnect)
            }
            Err(e) => {
                tracing::warn!(path, error = %e, attempt, "event stream error");
                let _ = tx.send(WatchEvent::Error(e));

                if let Some(max) = reconnect.max_retries {
                    if attempt >= max {
                        tracing::error!(path, max_retries = max, "giving up on event stream");
                        break;
                    }
                }
                let delay = calculate_backoff(attempt, &reconnect);
                attempt = attempt.saturating_add(1);
                delay
            }
        };

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }
    }

    tracing::debug!(path, "watch loop exiting");
}

// ── Single connection lifecycle ──────────────────────────────────────

/// Open one event stream and fold events until it drops or is cancelled.
async fn connect_and_read(
    client: &RtdbClient,
    path: &str,
    tx: &mpsc::UnboundedSender<WatchEvent>,
    cancel: &CancellationToken,
    state: &mut WatchState,
) -> Result<(), Error> {
    let resp = tokio::select! {
        biased;
        () = cancel.cancelled() => return Ok(()),
        resp = client.open_stream(path) => resp?,
    };
    tracing::debug!(path, "event stream connected");

    let events = sse::events(resp.bytes_stream());
    futures_util::pin_mut!(events);
    let mut tree = Value::Null;

    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(()),
            () = tx.closed() => return Ok(()),
            next = events.next() => next,
        };
        let Some(event) = next else {
            return Ok(());
        };
        let event = event?;

        match event.event.as_str() {
            "put" | "patch" => {
                let payload: StreamPayload =
                    serde_json::from_str(&event.data).map_err(|e| Error::Deserialization {
                        message: e.to_string(),
                        body: event.data.clone(),
                    })?;
                if event.event == "put" {
                    sse::apply_put(&mut tree, &payload.path, payload.data);
                } else {
                    sse::apply_patch(&mut tree, &payload.path, payload.data)?;
                }
                let value = (!tree.is_null()).then(|| tree.clone());
                state.emit(value, tx);
            }
            "keep-alive" => tracing::trace!(path, "keep-alive"),
            "cancel" => {
                return Err(Error::StreamCancelled {
                    reason: event.data.trim_matches('"').to_owned(),
                });
            }
            "auth_revoked" => {
                return Err(Error::StreamCancelled {
                    reason: "auth_revoked".into(),
                });
            }
            other => tracing::debug!(path, event = other, "ignoring unknown stream event"),
        }
    }
}

// ── Backoff calculation ──────────────────────────────────────────────

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) * (1 +- 0.25)`
#[allow(clippy::as_conversions, clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
pub(crate) fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exp = attempt.min(30) as i32;
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exp);
    let capped = base.min(config.max_delay.as_secs_f64());

    // Deterministic jitter seeded from the attempt number.
    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    Duration::from_secs_f64((capped * jitter_factor).max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_reconnect_config() {
        let config = ReconnectConfig::default();
        assert_eq!(config.initial_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(30));
        assert!(config.max_retries.is_none());
    }

    #[test]
    fn backoff_grows_and_stays_capped() {
        let config = ReconnectConfig::default();
        let first = calculate_backoff(0, &config);
        let third = calculate_backoff(3, &config);
        assert!(third > first);
        for attempt in 0..64 {
            let d = calculate_backoff(attempt, &config);
            assert!(d.as_secs_f64() <= 30.0 * 1.25 + f64::EPSILON);
        }
    }

    #[test]
    fn backoff_is_deterministic() {
        let config = ReconnectConfig::default();
        assert_eq!(calculate_backoff(5, &config), calculate_backoff(5, &config));
    }

    #[test]
    fn emit_suppresses_duplicates() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut state = WatchState { last: None };
        state.emit(None, &tx);
        state.emit(None, &tx);
        state.emit(Some(Value::from(1)), &tx);
        state.emit(Some(Value::from(1)), &tx);

        assert!(matches!(rx.try_recv(), Ok(WatchEvent::Value(None))));
        assert!(matches!(rx.try_recv(), Ok(WatchEvent::Value(Some(_)))));
        assert!(rx.try_recv().is_err());
    }
}
