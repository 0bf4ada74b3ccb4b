// ── Session ──
//
// Everything scoped to one signed-in user: device views, the feedback
// cache, pending commands, debounce slots, animations, liveness, and the
// background tasks that feed them. Created on sign-in, closed on
// sign-out; nothing survives into the next session.

mod view;

use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::alert::{Alert, AlertBus};
use crate::config::SessionConfig;
use crate::debounce::Debouncer;
use crate::dispatcher::Dispatcher;
use crate::liveness::{Liveness, LivenessMonitor};
use crate::model::{DeviceId, DisplayState};
use crate::pending::{PendingTracker, Resolution};
use crate::reconcile::{self, Animator, OnCount};
use crate::registry::DeviceRegistry;
use crate::store::LiveStore;
use crate::stream::ViewStream;

pub use view::DeviceView;
pub(crate) use view::ViewCollection;

/// Handle to a running session. Cheaply cloneable.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    config: SessionConfig,
    registry: Arc<DeviceRegistry>,
    store: Arc<dyn LiveStore>,
    cancel: CancellationToken,
    views: ViewCollection,
    feedback: DashMap<DeviceId, DisplayState>,
    pending: PendingTracker,
    debounce: Debouncer,
    animator: Animator,
    alerts: AlertBus,
    liveness: LivenessMonitor,
    on_count: watch::Sender<OnCount>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Session {
    /// Build a session without loading anything or starting tasks.
    pub(crate) fn new(
        store: Arc<dyn LiveStore>,
        registry: Arc<DeviceRegistry>,
        config: SessionConfig,
        alerts: AlertBus,
    ) -> Self {
        let views = ViewCollection::new(&registry);
        let (on_count, _) = watch::channel(OnCount {
            on: 0,
            total: registry.len(),
        });

        Self {
            inner: Arc::new(SessionInner {
                pending: PendingTracker::new(config.pending_timeout),
                debounce: Debouncer::new(config.debounce),
                animator: Animator::new(config.animation, config.animation_frame),
                liveness: LivenessMonitor::new(),
                cancel: CancellationToken::new(),
                feedback: DashMap::new(),
                tasks: Mutex::new(Vec::new()),
                views,
                on_count,
                config,
                registry,
                store,
                alerts,
            }),
        }
    }

    /// Paint the initial state from point reads, then start the feedback,
    /// acknowledgment, and heartbeat subscriptions.
    pub async fn start(
        store: Arc<dyn LiveStore>,
        registry: Arc<DeviceRegistry>,
        config: SessionConfig,
        alerts: AlertBus,
    ) -> Self {
        let session = Self::new(store, registry, config, alerts);
        reconcile::initial_load(&session).await;
        reconcile::spawn_watchers(&session);
        let monitor = LivenessMonitor::spawn(&session);
        session.track(monitor);
        info!(devices = session.registry().len(), "session started");
        session
    }

    /// Cancel every subscription, timer, and animation, wait for the
    /// background tasks to finish, then take down the offline banner.
    /// Idempotent.
    pub async fn close(&self) {
        if self.inner.cancel.is_cancelled() {
            return;
        }
        self.inner.cancel.cancel();
        let handles: Vec<_> = self
            .inner
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for handle in handles {
            let _ = handle.await;
        }
        self.inner.alerts.clear_offline();
        info!("session closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Resolves once the session has been closed.
    pub async fn closed(&self) {
        self.inner.cancel.cancelled().await;
    }

    // ── Read access ──────────────────────────────────────────────────

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.inner.registry
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Subscribe to device view changes.
    pub fn views(&self) -> ViewStream {
        ViewStream::new(self.inner.views.subscribe())
    }

    pub fn view(&self, id: DeviceId) -> Option<Arc<DeviceView>> {
        self.inner.views.get(id)
    }

    /// Current views in registry order.
    pub fn snapshot(&self) -> Arc<Vec<Arc<DeviceView>>> {
        self.inner.views.snapshot()
    }

    /// Last display state derived from feedback, if any arrived.
    pub fn feedback(&self, id: DeviceId) -> Option<DisplayState> {
        self.inner.feedback.get(&id).map(|s| *s)
    }

    pub fn pending(&self) -> &PendingTracker {
        &self.inner.pending
    }

    pub fn alerts(&self) -> broadcast::Receiver<Alert> {
        self.inner.alerts.subscribe()
    }

    /// The persistent alert banner.
    pub fn banner(&self) -> watch::Receiver<Option<Alert>> {
        self.inner.alerts.banner()
    }

    pub fn on_count(&self) -> watch::Receiver<OnCount> {
        self.inner.on_count.subscribe()
    }

    pub fn liveness(&self) -> watch::Receiver<Liveness> {
        self.inner.liveness.subscribe()
    }

    /// Every pending entry as it ends.
    pub fn resolutions(&self) -> broadcast::Receiver<Resolution> {
        self.inner.pending.subscribe()
    }

    /// Issue commands against this session.
    pub fn dispatcher(&self) -> Dispatcher<'_> {
        Dispatcher::new(self)
    }

    // ── Crate-internal plumbing ──────────────────────────────────────

    pub(crate) fn store(&self) -> &dyn LiveStore {
        self.inner.store.as_ref()
    }

    pub(crate) fn child_token(&self) -> CancellationToken {
        self.inner.cancel.child_token()
    }

    pub(crate) fn view_collection(&self) -> &ViewCollection {
        &self.inner.views
    }

    pub(crate) fn alert_bus(&self) -> &AlertBus {
        &self.inner.alerts
    }

    pub(crate) fn debouncer(&self) -> &Debouncer {
        &self.inner.debounce
    }

    pub(crate) fn animator(&self) -> &Animator {
        &self.inner.animator
    }

    pub(crate) fn monitor(&self) -> &LivenessMonitor {
        &self.inner.liveness
    }

    pub(crate) fn cache_feedback(&self, id: DeviceId, state: DisplayState) {
        self.inner.feedback.insert(id, state);
    }

    pub(crate) fn feedback_states(&self) -> Vec<DisplayState> {
        self.inner.feedback.iter().map(|e| *e.value()).collect()
    }

    pub(crate) fn publish_on_count(&self, count: OnCount) {
        self.inner.on_count.send_if_modified(|current| {
            if *current == count {
                false
            } else {
                debug!(on = count.on, total = count.total, "on count changed");
                *current = count;
                true
            }
        });
    }

    /// Keep a background task so `close` can wait for it.
    pub(crate) fn track(&self, handle: JoinHandle<()>) {
        self.inner
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("devices", &self.inner.registry.len())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
