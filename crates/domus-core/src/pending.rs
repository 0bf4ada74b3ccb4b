// ── Pending command tracker ──
//
// At most one in-flight command per control address. An entry ends in
// exactly one way: confirmed by feedback, acknowledged by command id,
// superseded by a newer command, cleared after a failed write, or
// expired by its timer. Removal goes through `DashMap::remove_if`, so a
// late confirmation and a firing timer cannot both win.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use strum::Display;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::alert::{Alert, AlertKind};
use crate::model::{CommandId, Device, DeviceId, DisplayState, StorePath};
use crate::session::Session;

const RESOLUTION_CHANNEL_SIZE: usize = 64;

/// A command awaiting confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingCommand {
    /// Value the device should eventually report.
    pub expected: u8,
    /// Present for verified devices.
    pub cmd_id: Option<CommandId>,
}

/// How a pending command ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Outcome {
    /// Feedback reported the expected value.
    Confirmed,
    /// The device echoed the command id.
    Acknowledged,
    /// A newer command replaced it.
    Superseded,
    /// Cleared without confirmation (write failure, explicit clear).
    Cleared,
    /// The timer fired first.
    Expired,
}

impl Outcome {
    pub fn is_confirmed(self) -> bool {
        matches!(self, Self::Confirmed | Self::Acknowledged)
    }
}

/// Published whenever a pending entry ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub device: DeviceId,
    pub command: PendingCommand,
    pub outcome: Outcome,
}

struct PendingEntry {
    command: PendingCommand,
    generation: u64,
    timer: CancellationToken,
}

/// Per-address table of in-flight commands.
pub struct PendingTracker {
    entries: DashMap<StorePath, PendingEntry>,
    next_generation: AtomicU64,
    timeout: Duration,
    resolutions: broadcast::Sender<Resolution>,
}

impl PendingTracker {
    pub(crate) fn new(timeout: Duration) -> Self {
        let (resolutions, _) = broadcast::channel(RESOLUTION_CHANNEL_SIZE);
        Self {
            entries: DashMap::new(),
            next_generation: AtomicU64::new(0),
            timeout,
            resolutions,
        }
    }

    pub fn get(&self, control: &StorePath) -> Option<PendingCommand> {
        self.entries.get(control).map(|e| e.command.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Resolution> {
        self.resolutions.subscribe()
    }

    /// Register a command, replacing any entry for the same address,
    /// and start its expiry timer.
    pub(crate) fn set(
        &self,
        session: &Session,
        device: &Device,
        expected: u8,
        cmd_id: Option<CommandId>,
    ) {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let timer = session.child_token();
        let command = PendingCommand { expected, cmd_id };

        debug!(device = %device.id, expected, cmd_id = ?command.cmd_id, "pending command registered");
        let previous = self.entries.insert(
            device.control.clone(),
            PendingEntry {
                command,
                generation,
                timer: timer.clone(),
            },
        );
        if let Some(prev) = previous {
            prev.timer.cancel();
            self.publish(device.id, prev.command, Outcome::Superseded);
        }
        session.view_collection().update(device.id, |v| v.pending = true);

        let timeout = self.timeout;
        let task_session = session.clone();
        let device = device.clone();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                () = timer.cancelled() => {}
                () = tokio::time::sleep(timeout) => {
                    task_session.pending().expire(&task_session, &device, generation);
                }
            }
        });
    }

    /// Drop any entry for `device`. Idempotent.
    pub(crate) fn clear(&self, session: &Session, device: &Device) -> bool {
        let removed = self.entries.remove(&device.control);
        session.view_collection().update(device.id, |v| v.pending = false);
        match removed {
            Some((_, entry)) => {
                self.finish(device.id, entry, Outcome::Cleared);
                true
            }
            None => false,
        }
    }

    /// Drop the entry only if it still belongs to `cmd_id`.
    pub(crate) fn clear_command(
        &self,
        session: &Session,
        device: &Device,
        cmd_id: &CommandId,
    ) -> bool {
        self.remove_where(session, device, Outcome::Cleared, |c| {
            c.cmd_id.as_ref() == Some(cmd_id)
        })
    }

    /// Feedback arrived; confirm if it shows the expected value.
    pub(crate) fn confirm_value(
        &self,
        session: &Session,
        device: &Device,
        state: DisplayState,
    ) -> bool {
        self.remove_where(session, device, Outcome::Confirmed, |c| {
            state.matches(c.expected)
        })
    }

    /// Acknowledgment arrived; confirm if it echoes the pending id.
    pub(crate) fn confirm_ack(&self, session: &Session, device: &Device, last_cmd_id: &str) -> bool {
        self.remove_where(session, device, Outcome::Acknowledged, |c| {
            c.cmd_id.as_ref().is_some_and(|id| id.as_str() == last_cmd_id)
        })
    }

    fn expire(&self, session: &Session, device: &Device, generation: u64) {
        let Some((_, entry)) = self
            .entries
            .remove_if(&device.control, |_, e| e.generation == generation)
        else {
            return;
        };
        session.view_collection().update(device.id, |v| v.pending = false);
        info!(device = %device.id, expected = entry.command.expected, "command not confirmed in time");
        session.alert_bus().raise(Alert::new(
            AlertKind::Unconfirmed,
            Some(device.id),
            format!("Command not confirmed: {}", device.label),
        ));
        self.finish(device.id, entry, Outcome::Expired);
    }

    fn remove_where(
        &self,
        session: &Session,
        device: &Device,
        outcome: Outcome,
        pred: impl Fn(&PendingCommand) -> bool,
    ) -> bool {
        let Some((_, entry)) = self
            .entries
            .remove_if(&device.control, |_, e| pred(&e.command))
        else {
            return false;
        };
        session.view_collection().update(device.id, |v| v.pending = false);
        debug!(device = %device.id, outcome = %outcome, "pending command resolved");
        self.finish(device.id, entry, outcome);
        true
    }

    fn finish(&self, device: DeviceId, entry: PendingEntry, outcome: Outcome) {
        entry.timer.cancel();
        self.publish(device, entry.command, outcome);
    }

    fn publish(&self, device: DeviceId, command: PendingCommand, outcome: Outcome) {
        let _ = self.resolutions.send(Resolution {
            device,
            command,
            outcome,
        });
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::alert::AlertBus;
    use crate::config::SessionConfig;
    use crate::model::DeviceId;
    use crate::registry::DeviceRegistry;
    use crate::store::MemoryStore;

    fn session() -> Session {
        Session::new(
            Arc::new(MemoryStore::new()),
            Arc::new(DeviceRegistry::default_catalog()),
            SessionConfig::default(),
            AlertBus::new(),
        )
    }

    fn light(session: &Session) -> Device {
        session.registry().get(DeviceId(2)).unwrap().clone()
    }

    #[tokio::test(start_paused = true)]
    async fn clear_is_idempotent() {
        let session = session();
        let device = light(&session);
        session.pending().set(&session, &device, 1, None);
        assert!(session.view(device.id).unwrap().pending);

        assert!(session.pending().clear(&session, &device));
        assert!(!session.pending().clear(&session, &device));
        assert!(session.pending().is_empty());
        assert!(!session.view(device.id).unwrap().pending);
    }

    #[tokio::test(start_paused = true)]
    async fn value_and_ack_confirm_independently() {
        let session = session();
        let device = light(&session);
        let id = CommandId::new();
        session.pending().set(&session, &device, 1, Some(id.clone()));

        assert!(!session.pending().confirm_value(&session, &device, DisplayState::Switch(false)));
        assert!(!session.pending().confirm_ack(&session, &device, "someone-else"));
        assert!(session.pending().confirm_ack(&session, &device, id.as_str()));
        assert!(!session.pending().confirm_value(&session, &device, DisplayState::Switch(true)));
    }

    #[tokio::test(start_paused = true)]
    async fn superseded_entry_is_reported() {
        let session = session();
        let device = light(&session);
        let mut resolutions = session.pending().subscribe();

        session.pending().set(&session, &device, 1, Some(CommandId::new()));
        session.pending().set(&session, &device, 0, Some(CommandId::new()));

        let r = resolutions.recv().await.unwrap();
        assert_eq!(r.outcome, Outcome::Superseded);
        assert_eq!(r.command.expected, 1);
        assert_eq!(session.pending().get(&device.control).unwrap().expected, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn clear_command_ignores_newer_commands() {
        let session = session();
        let device = light(&session);
        let old = CommandId::new();
        session.pending().set(&session, &device, 1, Some(old.clone()));
        session.pending().set(&session, &device, 0, Some(CommandId::new()));

        assert!(!session.pending().clear_command(&session, &device, &old));
        assert_eq!(session.pending().len(), 1);
    }
}
