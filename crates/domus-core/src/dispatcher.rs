// ── Command dispatcher ──
//
// Turns user intents into store writes. Each device is driven by one
// strategy chosen from its control mode: verified devices get a command
// id and a pending entry and are confirmed by feedback or acknowledgment;
// assumed devices flip their display optimistically and roll back if the
// write fails.

use serde::Serialize;
use serde_json::Value;
use strum::Display;
use tracing::{debug, info};

use crate::alert::{Alert, AlertKind};
use crate::error::CoreError;
use crate::liveness::Liveness;
use crate::model::{
    CommandId, ControlMode, Device, DeviceId, DeviceKind, DisplayState, Preset, PresetValues,
    StorePath,
};
use crate::reconcile::last_cmd_id;
use crate::session::Session;
use crate::store::StoreError;

const TOGGLE_FAILED: &str = "Failed to send toggle request";
const SLIDER_FAILED: &str = "Failed to send slider command";
const PRESET_FAILED: &str = "Failed to apply preset";
const ALL_OFF_FAILED: &str = "Failed to send All Off";

/// Where a dispatched command stands when the call returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CommandStatus {
    /// Already confirmed by acknowledgment or feedback.
    Confirmed,
    /// Awaiting confirmation; watch the session's resolutions.
    Pending,
    /// Written without confirmation (assumed mode).
    Assumed,
}

/// Result of a successfully written command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandOutcome {
    pub device: DeviceId,
    pub value: u8,
    pub cmd_id: Option<CommandId>,
    pub status: CommandStatus,
}

/// Per-device results of [`Dispatcher::all_off`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct AllOffReport {
    pub sent: Vec<CommandOutcome>,
    pub failed: Vec<DeviceFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceFailure {
    pub device: DeviceId,
    pub error: String,
}

enum ControlStrategy {
    Verified { ack: StorePath },
    Assumed,
}

impl ControlStrategy {
    fn for_device(device: &Device, session: &Session) -> Self {
        match device.mode {
            ControlMode::Verified => Self::Verified {
                ack: device.ack_path(&session.config().ack_root),
            },
            ControlMode::Assumed => Self::Assumed,
        }
    }
}

/// Borrowed command interface of a [`Session`].
pub struct Dispatcher<'s> {
    session: &'s Session,
}

impl<'s> Dispatcher<'s> {
    pub(crate) fn new(session: &'s Session) -> Self {
        Self { session }
    }

    // ── Switches ─────────────────────────────────────────────────────

    /// Flip a switch.
    pub async fn toggle(&self, id: DeviceId) -> Result<CommandOutcome, CoreError> {
        let device = self.device(id, DeviceKind::Switch)?;
        self.ensure_enabled()?;

        match ControlStrategy::for_device(device, self.session) {
            ControlStrategy::Verified { ack } => {
                let requested = self.requested_toggle(device).await?;
                self.send_verified(device, &ack, requested, TOGGLE_FAILED)
                    .await
            }
            ControlStrategy::Assumed => {
                let current = self
                    .session
                    .view(id)
                    .and_then(|v| v.state)
                    .is_some_and(DisplayState::is_on);
                self.send_assumed(device, u8::from(!current), TOGGLE_FAILED)
                    .await
            }
        }
    }

    /// Opposite of the in-flight command if there is one, otherwise of
    /// what the device currently reports.
    async fn requested_toggle(&self, device: &Device) -> Result<u8, CoreError> {
        if let Some(pending) = self.session.pending().get(&device.control) {
            return Ok(u8::from(pending.expected == 0));
        }
        let current = match &device.feedback {
            Some(path) => match self.session.store().read(path).await {
                Ok(value) => DisplayState::from_feedback(device.kind, value.as_ref()),
                Err(e) => {
                    self.transport_alert(device, TOGGLE_FAILED, &e);
                    return Err(e.into());
                }
            },
            None => DisplayState::off(device.kind),
        };
        self.ensure_open()?;
        Ok(u8::from(!current.is_on()))
    }

    // ── Sliders ──────────────────────────────────────────────────────

    /// Move a slider now, dropping any scheduled drag write.
    pub async fn set_percent(&self, id: DeviceId, value: u8) -> Result<CommandOutcome, CoreError> {
        let device = self.device(id, DeviceKind::Slider)?;
        check_percent(value)?;
        self.ensure_enabled()?;
        self.session.debouncer().cancel(id);
        self.send_value(device, value, SLIDER_FAILED).await
    }

    /// Write from the debounce timer; leaves newer scheduled input alone.
    pub(crate) async fn send_percent(
        &self,
        id: DeviceId,
        value: u8,
    ) -> Result<CommandOutcome, CoreError> {
        let device = self.device(id, DeviceKind::Slider)?;
        self.ensure_enabled()?;
        self.send_value(device, value, SLIDER_FAILED).await
    }

    /// Drag input: schedule a write after the quiet period, replacing any
    /// earlier scheduled value.
    pub fn slider_input(&self, id: DeviceId, value: u8) -> Result<(), CoreError> {
        let device = self.device(id, DeviceKind::Slider)?;
        check_percent(value)?;
        self.ensure_enabled()?;
        if device.mode == ControlMode::Verified {
            self.session
                .view_collection()
                .update(id, |v| v.pending = true);
        }
        self.session.debouncer().schedule(self.session, device, value);
        Ok(())
    }

    /// Drag released: write immediately.
    pub async fn slider_commit(&self, id: DeviceId, value: u8) -> Result<CommandOutcome, CoreError> {
        self.set_percent(id, value).await
    }

    /// Move a slider to one of its stored presets.
    pub async fn apply_preset(
        &self,
        id: DeviceId,
        preset: Preset,
    ) -> Result<CommandOutcome, CoreError> {
        let device = self.device(id, DeviceKind::Slider)?;
        self.ensure_enabled()?;
        let path = device.presets_path(&self.session.config().presets_root);
        let stored = match self.session.store().read(&path).await {
            Ok(v) => v,
            Err(e) => {
                self.transport_alert(device, PRESET_FAILED, &e);
                return Err(e.into());
            }
        };
        let value = PresetValues::from_value(stored.as_ref()).get(preset);
        debug!(device = %id, preset = %preset, value, "preset resolved");
        self.session.debouncer().cancel(id);
        self.send_value(device, value, PRESET_FAILED).await
    }

    // ── Bulk ─────────────────────────────────────────────────────────

    /// Switch every switch off. Refused unless `confirmed`; one failing
    /// device does not stop the rest.
    pub async fn all_off(&self, confirmed: bool) -> Result<AllOffReport, CoreError> {
        if !confirmed {
            return Err(CoreError::ConfirmationRequired);
        }
        self.ensure_enabled()?;

        let mut report = AllOffReport::default();
        for device in self.session.registry().switches() {
            match self.send_value(device, 0, ALL_OFF_FAILED).await {
                Ok(outcome) => report.sent.push(outcome),
                Err(e) => report.failed.push(DeviceFailure {
                    device: device.id,
                    error: e.to_string(),
                }),
            }
        }
        info!(
            sent = report.sent.len(),
            failed = report.failed.len(),
            "all off dispatched"
        );
        Ok(report)
    }

    // ── Strategies ───────────────────────────────────────────────────

    async fn send_value(
        &self,
        device: &Device,
        value: u8,
        context: &str,
    ) -> Result<CommandOutcome, CoreError> {
        match ControlStrategy::for_device(device, self.session) {
            ControlStrategy::Verified { ack } => {
                self.send_verified(device, &ack, value, context).await
            }
            ControlStrategy::Assumed => self.send_assumed(device, value, context).await,
        }
    }

    /// Register pending, write `cmdId` then `value`, then check whether the
    /// device has already confirmed.
    async fn send_verified(
        &self,
        device: &Device,
        ack: &StorePath,
        value: u8,
        context: &str,
    ) -> Result<CommandOutcome, CoreError> {
        let session = self.session;
        let cmd_id = CommandId::new();
        session
            .pending()
            .set(session, device, value, Some(cmd_id.clone()));

        let written = async {
            session
                .store()
                .write(
                    &device.control.child("cmdId"),
                    Value::from(cmd_id.as_str()),
                )
                .await?;
            session
                .store()
                .write(&device.control.child("value"), Value::from(value))
                .await
        }
        .await;
        self.ensure_open()?;

        if let Err(e) = written {
            session.pending().clear_command(session, device, &cmd_id);
            self.transport_alert(device, context, &e);
            return Err(e.into());
        }
        info!(device = %device.id, value, cmd_id = %cmd_id, "command sent");

        let mut confirmed = match session.store().read(ack).await {
            Ok(Some(ack)) => last_cmd_id(&ack)
                .is_some_and(|id| session.pending().confirm_ack(session, device, id)),
            Ok(None) => false,
            Err(e) => {
                debug!(device = %device.id, error = %e, "acknowledgment read failed");
                false
            }
        };
        if !confirmed {
            if let Some(state) = self.current_feedback(device).await {
                confirmed = session.pending().confirm_value(session, device, state);
            }
        }

        Ok(CommandOutcome {
            device: device.id,
            value,
            cmd_id: Some(cmd_id),
            status: if confirmed {
                CommandStatus::Confirmed
            } else {
                CommandStatus::Pending
            },
        })
    }

    /// Fresh point read of the feedback address. Falls back to the cached
    /// value when the read fails.
    async fn current_feedback(&self, device: &Device) -> Option<DisplayState> {
        let path = device.feedback.as_ref()?;
        match self.session.store().read(path).await {
            Ok(value) => Some(DisplayState::from_feedback(device.kind, value.as_ref())),
            Err(e) => {
                debug!(device = %device.id, error = %e, "feedback read failed");
                self.session.feedback(device.id)
            }
        }
    }

    /// Show the requested state now, write the scalar, revert on failure.
    async fn send_assumed(
        &self,
        device: &Device,
        value: u8,
        context: &str,
    ) -> Result<CommandOutcome, CoreError> {
        let session = self.session;
        let optimistic = DisplayState::from_level(device.kind, value);
        let previous = session.view(device.id).and_then(|v| v.state);
        session.animator().stop(device.id);
        session
            .view_collection()
            .update(device.id, |v| v.show(optimistic));

        let written = session
            .store()
            .write(&device.control, Value::from(value))
            .await;
        self.ensure_open()?;

        if let Err(e) = written {
            session.view_collection().update(device.id, |v| {
                if v.state == Some(optimistic) {
                    v.state = previous;
                    v.shown = previous;
                }
            });
            self.transport_alert(device, context, &e);
            return Err(e.into());
        }
        info!(device = %device.id, value, "command sent (assumed)");

        Ok(CommandOutcome {
            device: device.id,
            value,
            cmd_id: None,
            status: CommandStatus::Assumed,
        })
    }

    // ── Guards ───────────────────────────────────────────────────────

    fn device(&self, id: DeviceId, expected: DeviceKind) -> Result<&'s Device, CoreError> {
        let device = self
            .session
            .registry()
            .get(id)
            .ok_or_else(|| CoreError::DeviceNotFound {
                identifier: id.to_string(),
            })?;
        if device.kind != expected {
            return Err(CoreError::WrongDeviceKind {
                id,
                expected,
                actual: device.kind,
            });
        }
        Ok(device)
    }

    fn ensure_open(&self) -> Result<(), CoreError> {
        if self.session.is_closed() {
            return Err(CoreError::SessionClosed);
        }
        Ok(())
    }

    fn ensure_enabled(&self) -> Result<(), CoreError> {
        self.ensure_open()?;
        if self.session.monitor().current() == Liveness::Offline {
            return Err(CoreError::ControlsDisabled);
        }
        Ok(())
    }

    fn transport_alert(&self, device: &Device, context: &str, error: &StoreError) {
        self.session.alert_bus().raise(Alert::new(
            AlertKind::Transport,
            Some(device.id),
            format!("{context}: {error}"),
        ));
    }
}

fn check_percent(value: u8) -> Result<(), CoreError> {
    if value > 100 {
        return Err(CoreError::InvalidPercent {
            value: i64::from(value),
        });
    }
    Ok(())
}
