// ── Realtime database client ──
//
// REST point reads and writes against `{base}/{path}.json`, plus streaming
// subscriptions over server-sent events. Every request carries the id token
// from the shared auth handle, when one is set.

mod sse;
mod watch;

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::auth::SharedToken;
use crate::error::Error;
use crate::transport::TransportConfig;

pub use watch::{ReconnectConfig, WatchEvent};

/// Error envelope returned by the REST endpoint.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Client for one database instance.
///
/// Cheaply cloneable; clones share the HTTP connection pool and token.
#[derive(Clone)]
pub struct RtdbClient {
    inner: Arc<RtdbInner>,
}

struct RtdbInner {
    http: reqwest::Client,
    base_url: Url,
    token: SharedToken,
    timeout: Duration,
}

impl RtdbClient {
    pub fn new(base_url: Url, token: SharedToken, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self::with_client(http, base_url, token, transport.timeout))
    }

    /// Build on top of an existing `reqwest::Client`.
    pub fn with_client(
        http: reqwest::Client,
        mut base_url: Url,
        token: SharedToken,
        timeout: Duration,
    ) -> Self {
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Self {
            inner: Arc::new(RtdbInner {
                http,
                base_url,
                token,
                timeout,
            }),
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// `{base}{path}.json?auth={token}`
    pub(crate) fn url_for(&self, path: &str) -> Result<Url, Error> {
        let trimmed = path.trim_matches('/');
        let mut url = self.inner.base_url.join(&format!("{trimmed}.json"))?;
        if let Some(token) = self.inner.token.get() {
            url.query_pairs_mut()
                .append_pair("auth", token.expose_secret());
        }
        Ok(url)
    }

    // ── Point operations ─────────────────────────────────────────────

    /// Read the value at `path`. `Ok(None)` when nothing is stored there.
    pub async fn get(&self, path: &str) -> Result<Option<Value>, Error> {
        let url = self.url_for(path)?;
        debug!(path, "GET");
        let resp = self
            .inner
            .http
            .get(url)
            .timeout(self.inner.timeout)
            .send()
            .await?;
        let body = check_status(resp, path).await?;

        let value: Value = serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body,
        })?;
        Ok((!value.is_null()).then_some(value))
    }

    /// Replace the value at `path`.
    pub async fn put(&self, path: &str, value: &Value) -> Result<(), Error> {
        let url = self.url_for(path)?;
        debug!(path, "PUT");
        let resp = self
            .inner
            .http
            .put(url)
            .json(value)
            .timeout(self.inner.timeout)
            .send()
            .await?;
        check_status(resp, path).await?;
        Ok(())
    }

    // ── Streaming ────────────────────────────────────────────────────

    /// Subscribe to `path`. The first item is always the current value;
    /// later items arrive only when it changes. Stops when `cancel` fires
    /// or the receiver is dropped.
    pub fn watch(
        &self,
        path: &str,
        reconnect: ReconnectConfig,
        cancel: CancellationToken,
    ) -> mpsc::UnboundedReceiver<WatchEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = self.clone();
        let path = path.to_owned();
        tokio::spawn(async move {
            watch::watch_loop(client, path, reconnect, tx, cancel).await;
        });
        rx
    }

    /// Open the raw event stream. No overall timeout: the stream is long-lived.
    pub(crate) async fn open_stream(&self, path: &str) -> Result<reqwest::Response, Error> {
        let url = self.url_for(path)?;
        let resp = self
            .inner
            .http
            .get(url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        Err(status_error(status, path, &resp.text().await.unwrap_or_default()))
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

async fn check_status(resp: reqwest::Response, path: &str) -> Result<String, Error> {
    let status = resp.status();
    let body = resp.text().await?;
    if status.is_success() {
        Ok(body)
    } else {
        Err(status_error(status, path, &body))
    }
}

fn status_error(status: StatusCode, path: &str, body: &str) -> Error {
    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        return Error::PermissionDenied {
            path: path.to_owned(),
        };
    }
    let message = serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.error)
        .unwrap_or_else(|_| body.trim().to_owned());
    Error::Database {
        status: status.as_u16(),
        message,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::SecretString;

    use super::*;

    fn client(base: &str, token: Option<&str>) -> RtdbClient {
        let token = token.map_or_else(SharedToken::new, |t| SharedToken::fixed(SecretString::from(t)));
        RtdbClient::new(Url::parse(base).unwrap(), token, &TransportConfig::default()).unwrap()
    }

    #[test]
    fn base_url_gains_trailing_slash() {
        let c = client("https://home.example.com/db", None);
        assert_eq!(c.base_url().as_str(), "https://home.example.com/db/");
    }

    #[test]
    fn url_for_appends_json_and_token() {
        let c = client("https://home.example.com/", Some("tok"));
        let url = c.url_for("/feedback/bedRoomLightFeedback").unwrap();
        assert_eq!(
            url.as_str(),
            "https://home.example.com/feedback/bedRoomLightFeedback.json?auth=tok"
        );
    }

    #[test]
    fn url_for_without_token_has_no_query() {
        let c = client("https://home.example.com/", None);
        let url = c.url_for("heartbeat").unwrap();
        assert_eq!(url.as_str(), "https://home.example.com/heartbeat.json");
    }

    #[test]
    fn permission_statuses_map_to_permission_denied() {
        let e = status_error(StatusCode::UNAUTHORIZED, "/x", "");
        assert!(matches!(e, Error::PermissionDenied { .. }));
    }

    #[test]
    fn database_error_message_is_extracted() {
        let e = status_error(StatusCode::BAD_REQUEST, "/x", r#"{"error":"Invalid data"}"#);
        match e {
            Error::Database { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "Invalid data");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
