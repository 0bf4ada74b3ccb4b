// ── Controller ──
//
// Top-level lifecycle: owns the store and the identity provider, watches
// the signed-in user, and starts a fresh session whenever a user appears
// and closes it when they leave.

use std::sync::Arc;

use secrecy::SecretString;
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use domus_api::{AuthClient, AuthConfig, RtdbClient, TransportConfig};

use crate::alert::{Alert, AlertBus, AlertKind};
use crate::auth::{Authenticator, User};
use crate::config::{ConnectionConfig, SessionConfig};
use crate::error::CoreError;
use crate::registry::DeviceRegistry;
use crate::session::Session;
use crate::settings::Settings;
use crate::store::{LiveStore, RtdbStore};

/// Entry point for front ends. Cheaply cloneable.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    store: Arc<dyn LiveStore>,
    auth: Arc<dyn Authenticator>,
    registry: Arc<DeviceRegistry>,
    config: SessionConfig,
    alerts: AlertBus,
    session: watch::Sender<Option<Session>>,
    // Serializes session replacement.
    lifecycle: Mutex<()>,
    cancel: CancellationToken,
    auth_task: Mutex<Option<JoinHandle<()>>>,
}

impl Controller {
    /// Wire a controller from parts. Does not start watching the user;
    /// call [`start()`](Self::start).
    pub fn new(
        store: Arc<dyn LiveStore>,
        auth: Arc<dyn Authenticator>,
        registry: DeviceRegistry,
        config: SessionConfig,
    ) -> Self {
        let (session, _) = watch::channel(None);
        Self {
            inner: Arc::new(ControllerInner {
                store,
                auth,
                registry: Arc::new(registry),
                config,
                alerts: AlertBus::new(),
                session,
                lifecycle: Mutex::new(()),
                cancel: CancellationToken::new(),
                auth_task: Mutex::new(None),
            }),
        }
    }

    /// Build the hosted-backend clients and wire a controller from them.
    pub fn connect(
        connection: &ConnectionConfig,
        registry: DeviceRegistry,
        config: SessionConfig,
    ) -> Result<Self, CoreError> {
        let transport = TransportConfig {
            timeout: connection.timeout,
            ..TransportConfig::default()
        };
        let mut auth_config = AuthConfig::new(connection.api_key.clone())?;
        if let Some(url) = &connection.auth_url {
            auth_config = auth_config.with_base_url(url);
        }
        let auth = AuthClient::new(auth_config, &transport)?;
        let client = RtdbClient::new(connection.database_url.clone(), auth.token(), &transport)?;
        debug!(database = %connection.database_url, "backend clients built");

        Ok(Self::new(
            Arc::new(RtdbStore::new(client)),
            Arc::new(auth),
            registry,
            config,
        ))
    }

    /// Start following the identity provider. Idempotent.
    pub async fn start(&self) {
        let mut task = self.inner.auth_task.lock().await;
        if task.is_some() {
            return;
        }
        let users = self.inner.auth.state();
        *task = Some(tokio::spawn(auth_watch_task(
            self.clone(),
            users,
            self.inner.cancel.clone(),
        )));
    }

    // ── Authentication ───────────────────────────────────────────────

    /// Sign in. Failures are returned and also raised as an alert; no
    /// device state is touched.
    pub async fn sign_in(&self, email: &str, password: &SecretString) -> Result<User, CoreError> {
        match self.inner.auth.sign_in(email, password).await {
            Ok(user) => {
                info!(uid = %user.uid, "signed in");
                Ok(user)
            }
            Err(e) => {
                self.inner.alerts.raise(Alert::new(
                    AlertKind::Auth,
                    None,
                    format!("Login failed: {e}"),
                ));
                Err(e)
            }
        }
    }

    pub async fn sign_out(&self) {
        self.inner.auth.sign_out().await;
        info!("signed out");
    }

    // ── Sessions ─────────────────────────────────────────────────────

    /// The running session, if a user is signed in.
    pub fn session(&self) -> Option<Session> {
        self.inner.session.borrow().clone()
    }

    /// Follow session changes (sign-in, sign-out, reload).
    pub fn sessions(&self) -> watch::Receiver<Option<Session>> {
        self.inner.session.subscribe()
    }

    /// Wait until a session is running.
    pub async fn wait_for_session(&self) -> Result<Session, CoreError> {
        let mut sessions = self.sessions();
        loop {
            if let Some(session) = sessions.borrow_and_update().clone() {
                return Ok(session);
            }
            tokio::select! {
                biased;
                () = self.inner.cancel.cancelled() => return Err(CoreError::SessionClosed),
                changed = sessions.changed() => {
                    if changed.is_err() {
                        return Err(CoreError::SessionClosed);
                    }
                }
            }
        }
    }

    /// Restart the session for the current user, picking up registry
    /// changes from the settings document.
    pub async fn reload(&self) -> Result<Session, CoreError> {
        let user = self.inner.auth.state().borrow().clone();
        if user.is_none() {
            return Err(CoreError::NotSignedIn);
        }
        self.replace_session(user.as_ref()).await;
        self.session().ok_or(CoreError::SessionClosed)
    }

    pub fn alerts(&self) -> broadcast::Receiver<Alert> {
        self.inner.alerts.subscribe()
    }

    pub fn banner(&self) -> watch::Receiver<Option<Alert>> {
        self.inner.alerts.banner()
    }

    pub fn store(&self) -> &Arc<dyn LiveStore> {
        &self.inner.store
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Stop following the user and close the running session.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        if let Some(task) = self.inner.auth_task.lock().await.take() {
            let _ = task.await;
        }
        self.replace_session(None).await;
        debug!("controller shut down");
    }

    /// Close the current session and, when `user` is present, start a
    /// new one.
    async fn replace_session(&self, user: Option<&User>) {
        let _guard = self.inner.lifecycle.lock().await;
        let previous = self.inner.session.send_replace(None);
        if let Some(previous) = previous {
            previous.close().await;
        }
        let Some(user) = user else { return };
        if self.inner.cancel.is_cancelled() {
            return;
        }

        let registry = self.session_registry().await;
        let session = Session::start(
            Arc::clone(&self.inner.store),
            registry,
            self.inner.config.clone(),
            self.inner.alerts.clone(),
        )
        .await;
        info!(uid = %user.uid, "session ready");
        self.inner.session.send_replace(Some(session));
    }

    async fn session_registry(&self) -> Arc<DeviceRegistry> {
        if !self.inner.config.registry_from_settings {
            return Arc::clone(&self.inner.registry);
        }
        let loaded = Settings::load(self.inner.store.as_ref(), &self.inner.config.settings_path)
            .await
            .and_then(|settings| DeviceRegistry::from_settings(&settings));
        match loaded {
            Ok(registry) => Arc::new(registry),
            Err(e) => {
                warn!(error = %e, "settings registry unavailable, using built-in catalog");
                Arc::clone(&self.inner.registry)
            }
        }
    }
}

async fn auth_watch_task(
    controller: Controller,
    mut users: watch::Receiver<Option<User>>,
    cancel: CancellationToken,
) {
    let mut current: Option<String> = None;
    loop {
        let user = users.borrow_and_update().clone();
        match user {
            Some(user) if current.as_deref() != Some(user.uid.as_str()) => {
                controller.replace_session(Some(&user)).await;
                current = Some(user.uid);
            }
            None if current.is_some() => {
                controller.replace_session(None).await;
                current = None;
            }
            _ => {}
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            changed = users.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
    debug!("auth watch stopped");
}
