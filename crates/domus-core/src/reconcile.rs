// ── Reconciliation engine ──
//
// Feedback is the only source of displayed truth for devices that have
// it. Each feedback emission recomputes the display, value-matches the
// pending entry, animates sliders toward the new value, and recounts the
// ON summary. Acknowledgment emissions confirm by command id.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use futures_util::future::join_all;
use serde::Serialize;
use serde_json::Value;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, trace, warn};

use crate::model::{ControlMode, Device, DeviceId, DisplayState};
use crate::session::Session;
use crate::store::Subscription;

/// How many devices report ON, out of the whole registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OnCount {
    pub on: usize,
    pub total: usize,
}

impl std::fmt::Display for OnCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{} on", self.on, self.total)
    }
}

/// `lastCmdId` from an acknowledgment object.
pub(crate) fn last_cmd_id(ack: &Value) -> Option<&str> {
    ack.get("lastCmdId").and_then(Value::as_str)
}

// ── Initial load ─────────────────────────────────────────────────────

/// Point-read every feedback address and paint it, without animation and
/// without touching pending state.
pub(crate) async fn initial_load(session: &Session) {
    let reads = session.registry().iter().filter_map(|device| {
        let path = device.feedback.as_ref()?;
        Some(async move { (device, session.store().read(path).await) })
    });

    for (device, result) in join_all(reads).await {
        match result {
            Ok(value) => {
                let state = DisplayState::from_feedback(device.kind, value.as_ref());
                session.cache_feedback(device.id, state);
                session.view_collection().update(device.id, |v| v.show(state));
            }
            Err(e) => {
                warn!(device = %device.id, error = %e, "initial feedback read failed");
            }
        }
    }
    recount(session);
    debug!("initial load complete");
}

// ── Subscriptions ────────────────────────────────────────────────────

/// One feedback subscription per device with feedback, and one
/// acknowledgment subscription per verified device.
pub(crate) fn spawn_watchers(session: &Session) {
    let ack_root = &session.config().ack_root;
    for device in session.registry().iter() {
        if let Some(feedback) = &device.feedback {
            let sub = session.store().subscribe(feedback);
            session.track(tokio::spawn(feedback_task(
                session.clone(),
                device.clone(),
                sub,
            )));
        }
        if device.mode == ControlMode::Verified {
            let sub = session.store().subscribe(&device.ack_path(ack_root));
            session.track(tokio::spawn(ack_task(session.clone(), device.clone(), sub)));
        }
    }
}

async fn feedback_task(session: Session, device: Device, mut sub: Subscription) {
    let cancel = session.child_token();
    loop {
        let update = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            update = sub.recv() => update,
        };
        match update {
            Some(Ok(value)) => apply_feedback(&session, &device, value.as_ref()),
            Some(Err(e)) => warn!(device = %device.id, path = %sub.path(), error = %e, "feedback subscription error"),
            None => break,
        }
    }
    debug!(device = %device.id, "feedback subscription ended");
}

async fn ack_task(session: Session, device: Device, mut sub: Subscription) {
    let cancel = session.child_token();
    loop {
        let update = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            update = sub.recv() => update,
        };
        match update {
            Some(Ok(Some(ack))) => {
                if let Some(id) = last_cmd_id(&ack) {
                    trace!(device = %device.id, cmd_id = id, "acknowledgment received");
                    session.pending().confirm_ack(&session, &device, id);
                }
            }
            Some(Ok(None)) => {}
            Some(Err(e)) => warn!(device = %device.id, path = %sub.path(), error = %e, "ack subscription error"),
            None => break,
        }
    }
}

/// Handle one feedback emission.
pub(crate) fn apply_feedback(session: &Session, device: &Device, value: Option<&Value>) {
    let state = DisplayState::from_feedback(device.kind, value);
    debug!(device = %device.id, state = %state, "feedback");
    session.cache_feedback(device.id, state);

    let previous = session.view(device.id).and_then(|v| v.shown);
    match (previous, state) {
        (Some(DisplayState::Slider(from)), DisplayState::Slider(to)) => {
            session.view_collection().update(device.id, |v| v.state = Some(state));
            session.animator().animate(session, device.id, from, to);
        }
        _ => {
            session.animator().stop(device.id);
            session.view_collection().update(device.id, |v| v.show(state));
        }
    }

    session.pending().confirm_value(session, device, state);
    recount(session);
}

/// Recompute the ON summary from cached feedback.
pub(crate) fn recount(session: &Session) {
    let on = session
        .feedback_states()
        .into_iter()
        .filter(|s| s.is_on())
        .count();
    session.publish_on_count(OnCount {
        on,
        total: session.registry().len(),
    });
}

// ── Slider animation ─────────────────────────────────────────────────

/// Moves a slider's rendered value toward its target in fixed frames. A
/// new animation for the same device replaces the running one.
pub(crate) struct Animator {
    running: DashMap<DeviceId, u64>,
    next_generation: AtomicU64,
    duration: Duration,
    frame: Duration,
}

impl Animator {
    pub(crate) fn new(duration: Duration, frame: Duration) -> Self {
        Self {
            running: DashMap::new(),
            next_generation: AtomicU64::new(0),
            duration,
            frame,
        }
    }

    pub(crate) fn stop(&self, id: DeviceId) {
        self.running.remove(&id);
    }

    pub(crate) fn animate(&self, session: &Session, id: DeviceId, from: u8, to: u8) {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        if from == to || self.duration.is_zero() || self.frame.is_zero() {
            self.running.remove(&id);
            session
                .view_collection()
                .update(id, |v| v.shown = Some(DisplayState::Slider(to)));
            return;
        }
        self.running.insert(id, generation);

        let session = session.clone();
        let cancel = session.child_token();
        let (duration, frame) = (self.duration, self.frame);
        tokio::spawn(async move {
            let start = Instant::now();
            let mut ticker = tokio::time::interval_at(start + frame, frame);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return,
                    _ = ticker.tick() => {}
                }
                let animator = session.animator();
                if animator.running.get(&id).map(|g| *g) != Some(generation) {
                    return;
                }
                let t = (start.elapsed().as_secs_f64() / duration.as_secs_f64()).min(1.0);
                let level = interpolate(from, to, t);
                session
                    .view_collection()
                    .update(id, |v| v.shown = Some(DisplayState::Slider(level)));
                if t >= 1.0 {
                    animator.running.remove_if(&id, |_, g| *g == generation);
                    return;
                }
            }
        });
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::as_conversions)]
fn interpolate(from: u8, to: u8, t: f64) -> u8 {
    let from = f64::from(from);
    let diff = f64::from(to) - from;
    (from + diff * t).round().clamp(0.0, 100.0) as u8
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::alert::AlertBus;
    use crate::config::SessionConfig;
    use crate::registry::DeviceRegistry;
    use crate::store::MemoryStore;

    fn session(store: &MemoryStore) -> Session {
        Session::new(
            Arc::new(store.clone()),
            Arc::new(DeviceRegistry::default_catalog()),
            SessionConfig::default(),
            AlertBus::new(),
        )
    }

    #[test]
    fn interpolation_endpoints() {
        assert_eq!(interpolate(0, 80, 0.0), 0);
        assert_eq!(interpolate(0, 80, 0.5), 40);
        assert_eq!(interpolate(0, 80, 1.0), 80);
        assert_eq!(interpolate(80, 20, 0.5), 50);
    }

    #[test]
    fn last_cmd_id_reads_the_ack_object() {
        assert_eq!(last_cmd_id(&json!({ "lastCmdId": "abc" })), Some("abc"));
        assert_eq!(last_cmd_id(&json!({ "lastCmdId": 5 })), None);
        assert_eq!(last_cmd_id(&json!("abc")), None);
    }

    #[tokio::test(start_paused = true)]
    async fn initial_load_paints_without_pending() {
        let store = MemoryStore::new();
        store.set("/feedback/bedRoomLightFeedback", json!(1));
        store.set("/feedback/bedRoomWindow", json!(45));
        let session = session(&store);

        initial_load(&session).await;

        let light = session.view(DeviceId(2)).unwrap();
        assert_eq!(light.state, Some(DisplayState::Switch(true)));
        assert!(!light.pending);
        let window = session.view(DeviceId(5)).unwrap();
        assert_eq!(window.shown, Some(DisplayState::Slider(45)));
        assert!(session.pending().is_empty());
        assert_eq!(*session.on_count().borrow(), OnCount { on: 2, total: 6 });
    }

    #[tokio::test(start_paused = true)]
    async fn on_count_ignores_devices_without_feedback() {
        let store = MemoryStore::new();
        let session = session(&store);
        initial_load(&session).await;
        assert_eq!(*session.on_count().borrow(), OnCount { on: 0, total: 6 });

        let socket = session.registry().get(DeviceId(3)).unwrap().clone();
        assert!(socket.feedback.is_none());
        session
            .view_collection()
            .update(socket.id, |v| v.show(DisplayState::Switch(true)));
        recount(&session);
        assert_eq!(session.on_count().borrow().on, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn switch_feedback_is_shown_immediately() {
        let store = MemoryStore::new();
        let session = session(&store);
        let light = session.registry().get(DeviceId(1)).unwrap().clone();

        apply_feedback(&session, &light, Some(&json!(true)));
        let view = session.view(light.id).unwrap();
        assert_eq!(view.state, Some(DisplayState::Switch(true)));
        assert_eq!(view.shown, Some(DisplayState::Switch(true)));
    }
}
