// ── Password sign-in client ──
//
// Email/password sign-in against the identity provider, with a background
// task that exchanges the refresh token for a new id token shortly before
// the current one expires. The current id token is published through a
// `SharedToken` that the database client reads on every request.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::{Mutex, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::Error;
use crate::transport::TransportConfig;

const DEFAULT_IDENTITY_URL: &str = "https://identitytoolkit.googleapis.com/";
const DEFAULT_TOKEN_URL: &str = "https://securetoken.googleapis.com/";

/// Refresh this long before the id token's stated expiry.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);
/// Never schedule a refresh sooner than this.
const MIN_REFRESH_DELAY: Duration = Duration::from_secs(5);
/// Back-off after a transport failure during refresh.
const REFRESH_RETRY_DELAY: Duration = Duration::from_secs(30);

// ── Shared token ─────────────────────────────────────────────────────

/// Lock-free handle to the current id token.
///
/// Cloned into the database client so every request picks up the most
/// recently refreshed token without coordination.
#[derive(Debug, Clone, Default)]
pub struct SharedToken(Arc<ArcSwapOption<SecretString>>);

impl SharedToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that never changes. Useful for database secrets and tests.
    pub fn fixed(token: SecretString) -> Self {
        let shared = Self::default();
        shared.set(Some(token));
        shared
    }

    pub fn set(&self, token: Option<SecretString>) {
        self.0.store(token.map(Arc::new));
    }

    pub fn get(&self) -> Option<Arc<SecretString>> {
        self.0.load_full()
    }

    pub fn is_set(&self) -> bool {
        self.0.load().is_some()
    }
}

// ── Configuration ────────────────────────────────────────────────────

/// Endpoints and project key for the identity provider.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub api_key: SecretString,
    pub identity_url: Url,
    pub token_url: Url,
}

impl AuthConfig {
    /// Config pointing at the hosted identity endpoints.
    pub fn new(api_key: SecretString) -> Result<Self, Error> {
        Ok(Self {
            api_key,
            identity_url: Url::parse(DEFAULT_IDENTITY_URL)?,
            token_url: Url::parse(DEFAULT_TOKEN_URL)?,
        })
    }

    /// Point both endpoints at the same base (used by tests and emulators).
    pub fn with_base_url(mut self, base: &Url) -> Self {
        self.identity_url = base.clone();
        self.token_url = base.clone();
        self
    }
}

/// The signed-in principal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub uid: String,
    pub email: String,
}

// ── Wire types ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    id_token: String,
    #[serde(default)]
    email: String,
    refresh_token: String,
    expires_in: String,
    local_id: String,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    expires_in: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

// ── Client ───────────────────────────────────────────────────────────

/// Email/password sign-in client.
///
/// Cheaply cloneable; all clones share one auth state.
#[derive(Clone)]
pub struct AuthClient {
    inner: Arc<AuthInner>,
}

struct AuthInner {
    http: reqwest::Client,
    config: AuthConfig,
    timeout: Duration,
    token: SharedToken,
    state_tx: watch::Sender<Option<AuthUser>>,
    refresh_cancel: Mutex<Option<CancellationToken>>,
}

impl AuthClient {
    pub fn new(config: AuthConfig, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        let (state_tx, _) = watch::channel(None);
        Ok(Self {
            inner: Arc::new(AuthInner {
                http,
                config,
                timeout: transport.timeout,
                token: SharedToken::new(),
                state_tx,
                refresh_cancel: Mutex::new(None),
            }),
        })
    }

    /// Handle to the id token, to hand to `RtdbClient`.
    pub fn token(&self) -> SharedToken {
        self.inner.token.clone()
    }

    /// Observe sign-in state changes. `None` means signed out.
    pub fn state(&self) -> watch::Receiver<Option<AuthUser>> {
        self.inner.state_tx.subscribe()
    }

    pub fn current_user(&self) -> Option<AuthUser> {
        self.inner.state_tx.borrow().clone()
    }

    /// Sign in with email and password.
    ///
    /// On success the id token is published, the state watch emits the
    /// user, and a refresh task is started.
    pub async fn sign_in(&self, email: &str, password: &SecretString) -> Result<AuthUser, Error> {
        let url = self
            .inner
            .config
            .identity_url
            .join("v1/accounts:signInWithPassword")?;

        debug!(email, "signing in");
        let resp = self
            .inner
            .http
            .post(url)
            .query(&[("key", self.inner.config.api_key.expose_secret())])
            .json(&serde_json::json!({
                "email": email,
                "password": password.expose_secret(),
                "returnSecureToken": true,
            }))
            .timeout(self.inner.timeout)
            .send()
            .await?;

        let body: SignInResponse = parse_auth_response(resp).await?;
        let user = AuthUser {
            uid: body.local_id,
            email: if body.email.is_empty() {
                email.to_owned()
            } else {
                body.email
            },
        };

        self.inner
            .token
            .set(Some(SecretString::from(body.id_token)));
        self.start_refresh(
            SecretString::from(body.refresh_token),
            parse_expires_in(&body.expires_in),
        )
        .await;
        self.inner.state_tx.send_replace(Some(user.clone()));

        info!(uid = %user.uid, "signed in");
        Ok(user)
    }

    /// Drop the session: stop refreshing, forget the token, emit `None`.
    pub async fn sign_out(&self) {
        if let Some(cancel) = self.inner.refresh_cancel.lock().await.take() {
            cancel.cancel();
        }
        self.inner.token.set(None);
        if self.inner.state_tx.send_replace(None).is_some() {
            info!("signed out");
        }
    }

    async fn start_refresh(&self, refresh_token: SecretString, expires_in: Duration) {
        let cancel = CancellationToken::new();
        if let Some(previous) = self
            .inner
            .refresh_cancel
            .lock()
            .await
            .replace(cancel.clone())
        {
            previous.cancel();
        }

        let client = self.clone();
        tokio::spawn(async move {
            client.refresh_loop(refresh_token, expires_in, cancel).await;
        });
    }

    async fn refresh_loop(
        &self,
        mut refresh_token: SecretString,
        mut expires_in: Duration,
        cancel: CancellationToken,
    ) {
        let mut delay = expires_in
            .saturating_sub(REFRESH_MARGIN)
            .max(MIN_REFRESH_DELAY);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }

            match self.refresh(&refresh_token).await {
                Ok(resp) => {
                    self.inner
                        .token
                        .set(Some(SecretString::from(resp.id_token)));
                    refresh_token = SecretString::from(resp.refresh_token);
                    expires_in = parse_expires_in(&resp.expires_in);
                    delay = expires_in
                        .saturating_sub(REFRESH_MARGIN)
                        .max(MIN_REFRESH_DELAY);
                    debug!(next_in_secs = delay.as_secs(), "id token refreshed");
                }
                Err(e) if e.is_auth_error() => {
                    warn!(error = %e, "token refresh rejected, signing out");
                    self.inner.token.set(None);
                    self.inner.state_tx.send_replace(None);
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "token refresh failed, retrying");
                    delay = REFRESH_RETRY_DELAY;
                }
            }
        }
    }

    async fn refresh(&self, refresh_token: &SecretString) -> Result<RefreshResponse, Error> {
        let url = self.inner.config.token_url.join("v1/token")?;
        let resp = self
            .inner
            .http
            .post(url)
            .query(&[("key", self.inner.config.api_key.expose_secret())])
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.expose_secret()),
            ])
            .timeout(self.inner.timeout)
            .send()
            .await?;
        parse_auth_response(resp).await
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

async fn parse_auth_response<T: serde::de::DeserializeOwned>(
    resp: reqwest::Response,
) -> Result<T, Error> {
    let status = resp.status();
    let body = resp.text().await?;

    if !status.is_success() {
        let message = serde_json::from_str::<ErrorEnvelope>(&body)
            .map(|e| e.error.message)
            .unwrap_or_else(|_| format!("HTTP {}", status.as_u16()));
        return Err(if status.is_client_error() {
            Error::Authentication { message }
        } else {
            Error::Database {
                status: status.as_u16(),
                message,
            }
        });
    }

    serde_json::from_str(&body).map_err(|e| Error::Deserialization {
        message: e.to_string(),
        body,
    })
}

/// `expiresIn` arrives as a decimal string of seconds.
fn parse_expires_in(raw: &str) -> Duration {
    raw.trim()
        .parse::<u64>()
        .map_or(Duration::from_secs(3600), Duration::from_secs)
}
