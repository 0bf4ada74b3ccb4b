#![allow(clippy::unwrap_used)]
// Session scenarios driven by the in-memory store with paused time.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tokio::sync::broadcast;

use domus_core::{
    Alert, AlertBus, AlertKind, CommandStatus, ControlMode, CoreError, Device, DeviceId,
    DeviceKind, DeviceRegistry, DisplayState, LiveStore, Liveness, MemoryStore, OnCount, Outcome,
    Preset, Session, SessionConfig, StoreError, StorePath, StoreUpdate, Subscription,
};

const SITTING_LIGHT: DeviceId = DeviceId(1);
const BEDROOM_LIGHT: DeviceId = DeviceId(2);
const SITTING_SOCKET: DeviceId = DeviceId(3);
const BEDROOM_SOCKET: DeviceId = DeviceId(4);
const BEDROOM_WINDOW: DeviceId = DeviceId(5);

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup(store: &MemoryStore) -> (Session, broadcast::Receiver<Alert>) {
    start(Arc::new(store.clone()), DeviceRegistry::default_catalog()).await
}

async fn start(
    store: Arc<dyn LiveStore>,
    registry: DeviceRegistry,
) -> (Session, broadcast::Receiver<Alert>) {
    let alerts = AlertBus::new();
    let rx = alerts.subscribe();
    let session = Session::start(
        store,
        Arc::new(registry),
        SessionConfig::default(),
        alerts,
    )
    .await;
    settle().await;
    (session, rx)
}

type CmdIdHook = Box<dyn FnOnce(&MemoryStore, &Value) + Send>;

/// Memory store that runs a one-shot hook right after the next `cmdId`
/// write lands, before the write call returns.
#[derive(Clone)]
struct HookedStore {
    inner: MemoryStore,
    hook: Arc<Mutex<Option<CmdIdHook>>>,
}

impl HookedStore {
    fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            hook: Arc::new(Mutex::new(None)),
        }
    }

    fn on_next_cmd_id(&self, hook: impl FnOnce(&MemoryStore, &Value) + Send + 'static) {
        *self.hook.lock().unwrap() = Some(Box::new(hook));
    }
}

impl LiveStore for HookedStore {
    fn read<'a>(&'a self, path: &'a StorePath) -> BoxFuture<'a, StoreUpdate> {
        self.inner.read(path)
    }

    fn write<'a>(
        &'a self,
        path: &'a StorePath,
        value: Value,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        async move {
            self.inner.write(path, value.clone()).await?;
            if path.as_str().ends_with("/cmdId") {
                let hook = self.hook.lock().unwrap().take();
                if let Some(hook) = hook {
                    hook(&self.inner, &value);
                }
            }
            Ok(())
        }
        .boxed()
    }

    fn subscribe(&self, path: &StorePath) -> Subscription {
        self.inner.subscribe(path)
    }
}

/// Let spawned tasks drain their queues.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

fn value_writes(store: &MemoryStore, control: &str) -> Vec<Value> {
    let target = StorePath::new(control).child("value");
    store
        .writes()
        .into_iter()
        .filter(|(p, _)| *p == target)
        .map(|(_, v)| v)
        .collect()
}

fn state(session: &Session, id: DeviceId) -> Option<DisplayState> {
    session.view(id).unwrap().state
}

// ── Verified toggle ─────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn verified_toggle_writes_cmd_id_then_value() {
    let store = MemoryStore::new();
    store.set("/feedback/bedRoomLightFeedback", json!(0));
    let (session, _alerts) = setup(&store).await;

    let outcome = session.dispatcher().toggle(BEDROOM_LIGHT).await.unwrap();
    assert_eq!(outcome.status, CommandStatus::Pending);
    assert_eq!(outcome.value, 1);

    let writes = store.writes();
    let cmd_id = outcome.cmd_id.unwrap();
    assert_eq!(
        writes,
        vec![
            (StorePath::new("/bedRoomLight/cmdId"), json!(cmd_id.as_str())),
            (StorePath::new("/bedRoomLight/value"), json!(1)),
        ]
    );
    assert!(session.view(BEDROOM_LIGHT).unwrap().pending);
    // Display does not move until the hardware reports.
    assert_eq!(state(&session, BEDROOM_LIGHT), Some(DisplayState::Switch(false)));
}

#[tokio::test(start_paused = true)]
async fn value_feedback_confirms_before_ack() {
    let store = MemoryStore::new();
    store.set("/feedback/bedRoomLightFeedback", json!(0));
    let (session, _alerts) = setup(&store).await;
    let mut resolutions = session.resolutions();

    let outcome = session.dispatcher().toggle(BEDROOM_LIGHT).await.unwrap();
    store.set("/feedback/bedRoomLightFeedback", json!(1));
    settle().await;

    let resolution = resolutions.recv().await.unwrap();
    assert_eq!(resolution.outcome, Outcome::Confirmed);
    assert!(session.pending().is_empty());
    assert_eq!(state(&session, BEDROOM_LIGHT), Some(DisplayState::Switch(true)));

    // The late acknowledgment finds nothing to clear.
    store.set(
        "/ack/bedRoomLight",
        json!({ "lastCmdId": outcome.cmd_id.unwrap().as_str() }),
    );
    settle().await;
    assert!(resolutions.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn ack_confirms_but_display_waits_for_feedback() {
    let store = MemoryStore::new();
    store.set("/feedback/bedRoomLightFeedback", json!(0));
    let (session, _alerts) = setup(&store).await;
    let mut resolutions = session.resolutions();

    let outcome = session.dispatcher().toggle(BEDROOM_LIGHT).await.unwrap();
    store.set(
        "/ack/bedRoomLight",
        json!({ "lastCmdId": outcome.cmd_id.unwrap().as_str() }),
    );
    settle().await;

    assert_eq!(resolutions.recv().await.unwrap().outcome, Outcome::Acknowledged);
    assert!(!session.view(BEDROOM_LIGHT).unwrap().pending);
    assert_eq!(state(&session, BEDROOM_LIGHT), Some(DisplayState::Switch(false)));

    store.set("/feedback/bedRoomLightFeedback", json!(1));
    settle().await;
    assert_eq!(state(&session, BEDROOM_LIGHT), Some(DisplayState::Switch(true)));
}

#[tokio::test(start_paused = true)]
async fn stale_ack_does_not_confirm() {
    let store = MemoryStore::new();
    store.set("/ack/bedRoomLight", json!({ "lastCmdId": "previous" }));
    let (session, _alerts) = setup(&store).await;

    let outcome = session.dispatcher().toggle(BEDROOM_LIGHT).await.unwrap();
    assert_eq!(outcome.status, CommandStatus::Pending);
    assert_eq!(session.pending().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn rapid_toggles_follow_the_pending_value() {
    let store = MemoryStore::new();
    store.set("/feedback/sittingRoomLightFeedback", json!(0));
    let (session, _alerts) = setup(&store).await;
    let mut resolutions = session.resolutions();

    let first = session.dispatcher().toggle(SITTING_LIGHT).await.unwrap();
    let second = session.dispatcher().toggle(SITTING_LIGHT).await.unwrap();
    assert_eq!(first.value, 1);
    assert_eq!(second.value, 0);

    // The light never left off, so the second click is already satisfied.
    assert_eq!(second.status, CommandStatus::Confirmed);
    assert!(session.pending().is_empty());
    let superseded = resolutions.recv().await.unwrap();
    assert_eq!(superseded.outcome, Outcome::Superseded);
    assert_eq!(superseded.command.cmd_id, first.cmd_id);
    let confirmed = resolutions.recv().await.unwrap();
    assert_eq!(confirmed.outcome, Outcome::Confirmed);
    assert_eq!(confirmed.command.cmd_id, second.cmd_id);
}

#[tokio::test(start_paused = true)]
async fn feedback_landing_mid_toggle_does_not_steer_the_request() {
    let memory = MemoryStore::new();
    memory.set("/feedback/bedRoomLightFeedback", json!(0));
    let store = HookedStore::new(memory.clone());
    let (session, _alerts) = start(
        Arc::new(store.clone()),
        DeviceRegistry::default_catalog(),
    )
    .await;
    let mut resolutions = session.resolutions();

    let first = session.dispatcher().toggle(BEDROOM_LIGHT).await.unwrap();
    assert_eq!(first.value, 1);
    assert_eq!(first.status, CommandStatus::Pending);

    // The light reports on while the second click is being written.
    store.on_next_cmd_id(|m, _| m.set("/feedback/bedRoomLightFeedback", json!(1)));
    let second = session.dispatcher().toggle(BEDROOM_LIGHT).await.unwrap();
    assert_eq!(second.value, 0);
    assert_eq!(second.status, CommandStatus::Pending);
    settle().await;

    assert_eq!(state(&session, BEDROOM_LIGHT), Some(DisplayState::Switch(true)));
    let pending = session
        .pending()
        .get(&StorePath::new("/bedRoomLight"))
        .unwrap();
    assert_eq!(pending.expected, 0);
    assert_eq!(pending.cmd_id, second.cmd_id);
    assert!(session.view(BEDROOM_LIGHT).unwrap().pending);
    assert_eq!(resolutions.recv().await.unwrap().outcome, Outcome::Superseded);

    memory.set("/feedback/bedRoomLightFeedback", json!(0));
    settle().await;
    let confirmed = resolutions.recv().await.unwrap();
    assert_eq!(confirmed.outcome, Outcome::Confirmed);
    assert_eq!(confirmed.command.cmd_id, second.cmd_id);
    assert_eq!(state(&session, BEDROOM_LIGHT), Some(DisplayState::Switch(false)));
}

#[tokio::test(start_paused = true)]
async fn ack_landing_before_write_returns_confirms_immediately() {
    let memory = MemoryStore::new();
    memory.set("/feedback/bedRoomLightFeedback", json!(0));
    let store = HookedStore::new(memory.clone());
    store.on_next_cmd_id(|m, cmd_id| m.set("/ack/bedRoomLight", json!({ "lastCmdId": cmd_id })));
    let (session, _alerts) = start(Arc::new(store), DeviceRegistry::default_catalog()).await;
    let mut resolutions = session.resolutions();

    let outcome = session.dispatcher().toggle(BEDROOM_LIGHT).await.unwrap();
    assert_eq!(outcome.status, CommandStatus::Confirmed);
    assert!(session.pending().is_empty());
    assert!(!session.view(BEDROOM_LIGHT).unwrap().pending);

    let resolution = resolutions.recv().await.unwrap();
    assert_eq!(resolution.outcome, Outcome::Acknowledged);
    assert_eq!(resolution.command.cmd_id, outcome.cmd_id);

    // The acknowledgment watcher finds nothing left to clear.
    settle().await;
    assert!(resolutions.try_recv().is_err());
    assert_eq!(state(&session, BEDROOM_LIGHT), Some(DisplayState::Switch(false)));
}

#[tokio::test(start_paused = true)]
async fn feedback_already_at_target_confirms_immediately() {
    let store = MemoryStore::new();
    store.set("/feedback/bedRoomWindow", json!(45));
    let (session, _alerts) = setup(&store).await;
    let mut resolutions = session.resolutions();

    let outcome = session
        .dispatcher()
        .set_percent(BEDROOM_WINDOW, 45)
        .await
        .unwrap();
    assert_eq!(outcome.status, CommandStatus::Confirmed);
    assert!(session.pending().is_empty());
    assert!(!session.view(BEDROOM_WINDOW).unwrap().pending);
    assert_eq!(resolutions.recv().await.unwrap().outcome, Outcome::Confirmed);
    assert_eq!(value_writes(&store, "/bedRoomWindow"), vec![json!(45)]);
}

#[tokio::test(start_paused = true)]
async fn verified_write_failure_clears_pending_and_alerts() {
    let store = MemoryStore::new();
    store.fail_writes_under("/bedRoomLight");
    let (session, mut alerts) = setup(&store).await;

    let err = session.dispatcher().toggle(BEDROOM_LIGHT).await.unwrap_err();
    assert!(matches!(err, CoreError::Store(_)));
    assert!(session.pending().is_empty());
    assert!(!session.view(BEDROOM_LIGHT).unwrap().pending);

    let alert = alerts.recv().await.unwrap();
    assert_eq!(alert.kind, AlertKind::Transport);
    assert!(alert.message.starts_with("Failed to send toggle request: "));
}

// ── Display purity ──────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn display_follows_feedback_regardless_of_pending() {
    let store = MemoryStore::new();
    let (session, _alerts) = setup(&store).await;

    session.dispatcher().toggle(BEDROOM_SOCKET).await.unwrap();
    for (value, on) in [
        (json!("yes"), true),
        (json!(0), false),
        (json!(""), false),
        (json!({ "state": 1 }), true),
    ] {
        store.set("/feedback/bedRoomSocketFeedback", value);
        settle().await;
        assert_eq!(state(&session, BEDROOM_SOCKET), Some(DisplayState::Switch(on)));
    }
}

// ── Timeout ─────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn unconfirmed_command_expires_exactly_once() {
    let store = MemoryStore::new();
    let (session, mut alerts) = setup(&store).await;

    session.dispatcher().toggle(BEDROOM_LIGHT).await.unwrap();
    tokio::time::sleep(Duration::from_millis(7900)).await;
    assert_eq!(session.pending().len(), 1);
    assert!(alerts.try_recv().is_err());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(session.pending().is_empty());
    assert!(!session.view(BEDROOM_LIGHT).unwrap().pending);
    let alert = alerts.try_recv().unwrap();
    assert_eq!(alert.kind, AlertKind::Unconfirmed);
    assert_eq!(alert.message, "Command not confirmed: Bedroom Light");

    tokio::time::sleep(Duration::from_secs(20)).await;
    assert!(alerts.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn superseding_command_restarts_the_timer() {
    let store = MemoryStore::new();
    store.set("/feedback/bedRoomWindow", json!(0));
    let (session, mut alerts) = setup(&store).await;

    session
        .dispatcher()
        .set_percent(BEDROOM_WINDOW, 80)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;
    let second = session
        .dispatcher()
        .set_percent(BEDROOM_WINDOW, 60)
        .await
        .unwrap();
    assert_eq!(second.status, CommandStatus::Pending);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(alerts.try_recv().is_err());
    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(alerts.try_recv().unwrap().kind, AlertKind::Unconfirmed);
    assert!(alerts.try_recv().is_err());
}

// ── Debounce ────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn dragging_writes_only_the_last_value() {
    let store = MemoryStore::new();
    let (session, _alerts) = setup(&store).await;

    for value in [10, 20, 30, 40, 50] {
        session.dispatcher().slider_input(BEDROOM_WINDOW, value).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(session.view(BEDROOM_WINDOW).unwrap().pending);
    assert!(value_writes(&store, "/bedRoomWindow").is_empty());

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(value_writes(&store, "/bedRoomWindow"), vec![json!(50)]);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(value_writes(&store, "/bedRoomWindow").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn commit_mid_drag_writes_once() {
    let store = MemoryStore::new();
    let (session, _alerts) = setup(&store).await;

    session.dispatcher().slider_input(BEDROOM_WINDOW, 10).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    session.dispatcher().slider_input(BEDROOM_WINDOW, 20).unwrap();
    session
        .dispatcher()
        .slider_commit(BEDROOM_WINDOW, 70)
        .await
        .unwrap();
    assert_eq!(value_writes(&store, "/bedRoomWindow"), vec![json!(70)]);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(value_writes(&store, "/bedRoomWindow"), vec![json!(70)]);
}

#[tokio::test(start_paused = true)]
async fn assumed_slider_drag_never_shows_pending() {
    let store = MemoryStore::new();
    let registry = DeviceRegistry::new(vec![Device {
        id: DeviceId(9),
        label: "Blind".into(),
        control: StorePath::new("/blind"),
        feedback: None,
        kind: DeviceKind::Slider,
        mode: ControlMode::Assumed,
    }])
    .unwrap();
    let (session, _alerts) = start(Arc::new(store.clone()), registry).await;

    session.dispatcher().slider_input(DeviceId(9), 40).unwrap();
    assert!(!session.view(DeviceId(9)).unwrap().pending);

    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(store.writes(), vec![(StorePath::new("/blind"), json!(40))]);
    let view = session.view(DeviceId(9)).unwrap();
    assert_eq!(view.state, Some(DisplayState::Slider(40)));
    assert!(!view.pending);
    assert!(session.pending().is_empty());
}

// ── Scenario: bedroom window 0 → 80 ─────────────────────────────────

#[tokio::test(start_paused = true)]
async fn bedroom_window_round_trip_with_animation() {
    let store = MemoryStore::new();
    store.set("/feedback/bedRoomWindow", json!(0));
    let (session, _alerts) = setup(&store).await;
    let mut resolutions = session.resolutions();

    let outcome = session
        .dispatcher()
        .set_percent(BEDROOM_WINDOW, 80)
        .await
        .unwrap();
    assert_eq!(outcome.status, CommandStatus::Pending);
    assert_eq!(
        store.get("/bedRoomWindow"),
        Some(json!({ "cmdId": outcome.cmd_id.clone().unwrap().as_str(), "value": 80 }))
    );
    assert!(session.view(BEDROOM_WINDOW).unwrap().pending);

    // Device echoes the id, then reports the new position.
    store.set(
        "/ack/bedRoomWindow",
        json!({ "lastCmdId": outcome.cmd_id.unwrap().as_str() }),
    );
    settle().await;
    assert_eq!(resolutions.recv().await.unwrap().outcome, Outcome::Acknowledged);

    store.set("/feedback/bedRoomWindow", json!(80));
    settle().await;
    let view = session.view(BEDROOM_WINDOW).unwrap();
    assert_eq!(view.state, Some(DisplayState::Slider(80)));
    assert!(!view.pending);

    tokio::time::sleep(Duration::from_millis(150)).await;
    let midway = session.view(BEDROOM_WINDOW).unwrap().shown.unwrap().level();
    assert!(midway > 0 && midway < 80, "midway was {midway}");

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(
        session.view(BEDROOM_WINDOW).unwrap().shown,
        Some(DisplayState::Slider(80))
    );
}

#[tokio::test(start_paused = true)]
async fn presets_fall_back_to_defaults() {
    let store = MemoryStore::new();
    store.set("/settings/presets/bedRoomWindow", json!({ "half": 45 }));
    let (session, _alerts) = setup(&store).await;

    let half = session
        .dispatcher()
        .apply_preset(BEDROOM_WINDOW, Preset::Half)
        .await
        .unwrap();
    assert_eq!(half.value, 45);
    let open = session
        .dispatcher()
        .apply_preset(BEDROOM_WINDOW, Preset::Open)
        .await
        .unwrap();
    assert_eq!(open.value, 100);

    let err = session
        .dispatcher()
        .apply_preset(BEDROOM_LIGHT, Preset::Open)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::WrongDeviceKind { .. }));
}

#[tokio::test(start_paused = true)]
async fn percent_out_of_range_is_rejected() {
    let store = MemoryStore::new();
    let (session, _alerts) = setup(&store).await;
    let err = session
        .dispatcher()
        .set_percent(BEDROOM_WINDOW, 101)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidPercent { value: 101 }));
    assert!(store.writes().is_empty());
}

// ── Scenario: sitting room socket (assumed) ─────────────────────────

#[tokio::test(start_paused = true)]
async fn assumed_socket_flips_and_rolls_back() {
    let store = MemoryStore::new();
    let (session, mut alerts) = setup(&store).await;
    assert_eq!(state(&session, SITTING_SOCKET), Some(DisplayState::Switch(false)));

    let outcome = session.dispatcher().toggle(SITTING_SOCKET).await.unwrap();
    assert_eq!(outcome.status, CommandStatus::Assumed);
    assert_eq!(outcome.cmd_id, None);
    assert_eq!(store.writes(), vec![(StorePath::new("/sittingRoomSocket"), json!(1))]);
    assert_eq!(state(&session, SITTING_SOCKET), Some(DisplayState::Switch(true)));
    assert!(session.pending().is_empty());

    store.fail_writes_under("/sittingRoomSocket");
    session.dispatcher().toggle(SITTING_SOCKET).await.unwrap_err();
    assert_eq!(state(&session, SITTING_SOCKET), Some(DisplayState::Switch(true)));
    let alert = alerts.recv().await.unwrap();
    assert_eq!(alert.kind, AlertKind::Transport);
    assert_eq!(alert.device, Some(SITTING_SOCKET));

    // Never part of the ON count.
    assert_eq!(session.on_count().borrow().on, 0);
}

// ── All off ─────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn all_off_requires_confirmation() {
    let store = MemoryStore::new();
    let (session, _alerts) = setup(&store).await;
    let err = session.dispatcher().all_off(false).await.unwrap_err();
    assert!(matches!(err, CoreError::ConfirmationRequired));
    assert!(store.writes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn all_off_continues_past_failures() {
    let store = MemoryStore::new();
    store.fail_writes_under("/bedRoomSocket");
    let (session, _alerts) = setup(&store).await;

    let report = session.dispatcher().all_off(true).await.unwrap();
    let sent: Vec<DeviceId> = report.sent.iter().map(|o| o.device).collect();
    assert_eq!(sent, vec![SITTING_LIGHT, BEDROOM_LIGHT, SITTING_SOCKET]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].device, BEDROOM_SOCKET);

    assert_eq!(store.get("/sittingRoomSocket"), Some(json!(0)));
    assert_eq!(value_writes(&store, "/sittingRoomLight"), vec![json!(0)]);
    assert!(value_writes(&store, "/bedRoomWindow").is_empty());
}

// ── ON count ────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn on_count_tracks_feedback() {
    let store = MemoryStore::new();
    store.set("/feedback/sittingRoomLightFeedback", json!(1));
    let (session, _alerts) = setup(&store).await;
    let count = session.on_count();
    assert_eq!(*count.borrow(), OnCount { on: 1, total: 6 });

    store.set("/feedback/bedRoomWindow", json!(20));
    store.set("/feedback/bedRoomLightFeedback", json!(true));
    settle().await;
    assert_eq!(*count.borrow(), OnCount { on: 3, total: 6 });

    store.set("/feedback/bedRoomWindow", json!("closed"));
    settle().await;
    assert_eq!(count.borrow().on, 2);
}

// ── Liveness ────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn liveness_timeline() {
    let store = MemoryStore::new();
    let (session, mut alerts) = setup(&store).await;
    let liveness = session.liveness();
    assert_eq!(*liveness.borrow(), Liveness::Unknown);

    store.set("/heartbeat", json!(1));
    settle().await;
    assert_eq!(*liveness.borrow(), Liveness::Online);

    tokio::time::sleep(Duration::from_millis(7400)).await;
    assert_eq!(*liveness.borrow(), Liveness::Online);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(*liveness.borrow(), Liveness::Offline);
    assert!(session.snapshot().iter().all(|v| !v.enabled));
    let alert = alerts.try_recv().unwrap();
    assert_eq!(alert.kind, AlertKind::Offline);
    assert_eq!(alert.message, "Device offline (no heartbeat)");
    assert!(session.banner().borrow().is_some());

    let err = session.dispatcher().toggle(BEDROOM_LIGHT).await.unwrap_err();
    assert!(matches!(err, CoreError::ControlsDisabled));

    // A heartbeat at t=10s restores everything immediately.
    tokio::time::sleep(Duration::from_millis(2400)).await;
    store.set("/heartbeat", json!(2));
    settle().await;
    assert_eq!(*liveness.borrow(), Liveness::Online);
    assert!(session.snapshot().iter().all(|v| v.enabled));
    assert!(session.banner().borrow().is_none());
    assert!(alerts.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn null_heartbeat_is_ignored() {
    let store = MemoryStore::new();
    let (session, _alerts) = setup(&store).await;
    store.set("/heartbeat", json!(1));
    settle().await;
    store.set("/heartbeat", Value::Null);
    settle().await;
    assert_eq!(*session.liveness().borrow(), Liveness::Online);

    tokio::time::sleep(Duration::from_secs(8)).await;
    assert_eq!(*session.liveness().borrow(), Liveness::Offline);
}

// ── Lifecycle ───────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn close_unsubscribes_everything() {
    let store = MemoryStore::new();
    let (session, _alerts) = setup(&store).await;
    assert!(store.subscriber_count("/") > 0);

    session.dispatcher().toggle(BEDROOM_LIGHT).await.unwrap();
    session.close().await;
    settle().await;

    assert_eq!(store.subscriber_count("/"), 0);
    let err = session.dispatcher().toggle(BEDROOM_LIGHT).await.unwrap_err();
    assert!(matches!(err, CoreError::SessionClosed));
}
