// ── Slider debounce ──
//
// While a slider is dragged, each input cancels the previously scheduled
// write for that device and schedules a new one after the quiet period.
// At most one scheduled write exists per device.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::model::{Device, DeviceId};
use crate::session::Session;

struct Scheduled {
    generation: u64,
    value: u8,
    cancel: CancellationToken,
}

pub(crate) struct Debouncer {
    slots: DashMap<DeviceId, Scheduled>,
    next_generation: AtomicU64,
    quiet: Duration,
}

impl Debouncer {
    pub(crate) fn new(quiet: Duration) -> Self {
        Self {
            slots: DashMap::new(),
            next_generation: AtomicU64::new(0),
            quiet,
        }
    }

    /// Value waiting to be written for `id`, if any.
    #[cfg(test)]
    pub(crate) fn scheduled(&self, id: DeviceId) -> Option<u8> {
        self.slots.get(&id).map(|s| s.value)
    }

    /// Replace any scheduled write for `device` with one for `value`.
    pub(crate) fn schedule(&self, session: &Session, device: &Device, value: u8) {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let cancel = session.child_token();
        if let Some(previous) = self.slots.insert(
            device.id,
            Scheduled {
                generation,
                value,
                cancel: cancel.clone(),
            },
        ) {
            previous.cancel.cancel();
        }
        debug!(device = %device.id, value, "slider write scheduled");

        let quiet = self.quiet;
        let session = session.clone();
        let device = device.clone();
        let id = device.id;
        tokio::spawn(async move {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                () = tokio::time::sleep(quiet) => {}
            }
            if session
                .debouncer()
                .slots
                .remove_if(&id, |_, s| s.generation == generation)
                .is_none()
            {
                return;
            }
            if let Err(e) = session.dispatcher().send_percent(id, value).await {
                warn!(device = %id, error = %e, "debounced slider write failed");
                if session.pending().get(&device.control).is_none() {
                    session.view_collection().update(id, |v| v.pending = false);
                }
            }
        });
    }

    /// Cancel the scheduled write for `id`. Returns whether one existed.
    pub(crate) fn cancel(&self, id: DeviceId) -> bool {
        match self.slots.remove(&id) {
            Some((_, scheduled)) => {
                scheduled.cancel.cancel();
                true
            }
            None => false,
        }
    }
}
