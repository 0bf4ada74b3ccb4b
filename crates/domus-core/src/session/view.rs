// ── Device views ──
//
// What each device card shows, kept in a `DashMap` with a `watch`
// snapshot in registry order for push-based rendering.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::watch;

use crate::model::{ControlMode, Device, DeviceId, DeviceKind, DisplayState};
use crate::registry::DeviceRegistry;

/// Render state of one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceView {
    pub id: DeviceId,
    pub key: String,
    pub label: String,
    pub kind: DeviceKind,
    pub mode: ControlMode,
    /// Displayed truth. `None` until the first feedback arrives.
    pub state: Option<DisplayState>,
    /// What the control currently renders; trails `state` while a
    /// slider animates toward a new value.
    pub shown: Option<DisplayState>,
    /// A command is awaiting confirmation.
    pub pending: bool,
    /// Controls accept input (false while offline).
    pub enabled: bool,
}

impl DeviceView {
    fn new(device: &Device) -> Self {
        // Devices without a feedback channel start from "off"; the
        // dashboard is their only source of state.
        let initial = device
            .feedback
            .is_none()
            .then(|| DisplayState::off(device.kind));
        Self {
            id: device.id,
            key: device.key().to_owned(),
            label: device.label.clone(),
            kind: device.kind,
            mode: device.mode,
            state: initial,
            shown: initial,
            pending: false,
            enabled: true,
        }
    }

    /// Set both truth and rendered value.
    pub(crate) fn show(&mut self, state: DisplayState) {
        self.state = Some(state);
        self.shown = Some(state);
    }
}

pub(crate) type ViewSnapshot = Arc<Vec<Arc<DeviceView>>>;

/// Reactive collection of device views.
pub(crate) struct ViewCollection {
    by_id: DashMap<DeviceId, Arc<DeviceView>>,
    order: Vec<DeviceId>,
    snapshot: watch::Sender<ViewSnapshot>,
}

impl ViewCollection {
    pub(crate) fn new(registry: &DeviceRegistry) -> Self {
        let by_id = DashMap::new();
        let mut order = Vec::with_capacity(registry.len());
        for device in registry.iter() {
            by_id.insert(device.id, Arc::new(DeviceView::new(device)));
            order.push(device.id);
        }
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));
        let views = Self {
            by_id,
            order,
            snapshot,
        };
        views.rebuild_snapshot();
        views
    }

    pub(crate) fn get(&self, id: DeviceId) -> Option<Arc<DeviceView>> {
        self.by_id.get(&id).map(|r| Arc::clone(r.value()))
    }

    /// Apply `f` to one view. Subscribers are notified only when the
    /// view actually changed.
    pub(crate) fn update(&self, id: DeviceId, f: impl FnOnce(&mut DeviceView)) -> bool {
        let changed = match self.by_id.get_mut(&id) {
            Some(mut entry) => {
                let mut next = DeviceView::clone(entry.value());
                f(&mut next);
                if next == **entry.value() {
                    false
                } else {
                    *entry.value_mut() = Arc::new(next);
                    true
                }
            }
            None => false,
        };
        if changed {
            self.rebuild_snapshot();
        }
        changed
    }

    /// Apply `f` to every view, notifying once.
    pub(crate) fn update_all(&self, f: impl Fn(&mut DeviceView)) {
        let mut changed = false;
        for id in &self.order {
            if let Some(mut entry) = self.by_id.get_mut(id) {
                let mut next = DeviceView::clone(entry.value());
                f(&mut next);
                if next != **entry.value() {
                    *entry.value_mut() = Arc::new(next);
                    changed = true;
                }
            }
        }
        if changed {
            self.rebuild_snapshot();
        }
    }

    pub(crate) fn snapshot(&self) -> ViewSnapshot {
        self.snapshot.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<ViewSnapshot> {
        self.snapshot.subscribe()
    }

    /// Rebuild inside the watch lock so concurrent updates cannot publish
    /// an older snapshot after a newer one.
    fn rebuild_snapshot(&self) {
        self.snapshot.send_modify(|snap| {
            *snap = Arc::new(
                self.order
                    .iter()
                    .filter_map(|id| self.by_id.get(id).map(|r| Arc::clone(r.value())))
                    .collect(),
            );
        });
    }
}
