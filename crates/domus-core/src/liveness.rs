// ── Liveness monitor ──
//
// One heartbeat subscription and one poll timer per session. Heartbeat
// arrivals move the state to Online straight from the subscription
// handler; the poll only ever moves it to Offline. Side effects fire on
// state edges, never on repeats.

use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use strum::Display;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::session::Session;

const OFFLINE_MESSAGE: &str = "Device offline (no heartbeat)";

/// Whether the devices are reporting in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Liveness {
    /// No heartbeat has ever been seen.
    Unknown,
    Online,
    Offline,
}

pub(crate) struct LivenessMonitor {
    state: watch::Sender<Liveness>,
    last_heartbeat: Mutex<Option<Instant>>,
}

impl LivenessMonitor {
    pub(crate) fn new() -> Self {
        let (state, _) = watch::channel(Liveness::Unknown);
        Self {
            state,
            last_heartbeat: Mutex::new(None),
        }
    }

    pub(crate) fn current(&self) -> Liveness {
        *self.state.borrow()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Liveness> {
        self.state.subscribe()
    }

    /// Start the heartbeat subscription and the poll timer.
    pub(crate) fn spawn(session: &Session) -> JoinHandle<()> {
        let config = session.config();
        let mut sub = session.store().subscribe(&config.heartbeat_path);
        let poll = config.heartbeat_poll;
        let cancel = session.child_token();
        let session = session.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + poll, poll);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    update = sub.recv() => match update {
                        Some(Ok(Some(_))) => session.monitor().heartbeat(&session, Instant::now()),
                        Some(Ok(None)) => debug!("heartbeat cleared; ignoring"),
                        Some(Err(e)) => warn!(error = %e, "heartbeat subscription error"),
                        None => break,
                    },
                    _ = ticker.tick() => session.monitor().check(&session, Instant::now()),
                }
            }
            debug!("liveness monitor stopped");
        })
    }

    /// A heartbeat arrived at `at`.
    pub(crate) fn heartbeat(&self, session: &Session, at: Instant) {
        *self
            .last_heartbeat
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(at);
        self.transition(session, Liveness::Online);
    }

    /// Poll: go Offline once the last heartbeat is older than the
    /// staleness threshold. Without any heartbeat, stay Unknown.
    pub(crate) fn check(&self, session: &Session, now: Instant) {
        let last = *self
            .last_heartbeat
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(last) = last else { return };
        if now.saturating_duration_since(last) > session.config().heartbeat_stale {
            self.transition(session, Liveness::Offline);
        }
    }

    fn transition(&self, session: &Session, next: Liveness) {
        let previous = self.state.send_replace(next);
        if previous == next {
            return;
        }
        info!(from = %previous, to = %next, "liveness changed");
        match next {
            Liveness::Offline => {
                session.view_collection().update_all(|v| v.enabled = false);
                session.alert_bus().raise_offline(OFFLINE_MESSAGE);
            }
            Liveness::Online => {
                session.view_collection().update_all(|v| v.enabled = true);
                session.alert_bus().clear_offline();
            }
            Liveness::Unknown => {}
        }
    }
}
