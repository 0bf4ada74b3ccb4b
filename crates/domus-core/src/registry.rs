// ── Device registry ──
//
// Ordered, immutable catalog of the devices a session controls. Built
// from the compiled-in catalog or from the settings document; changing
// it means starting a new session.

use std::collections::HashSet;

use crate::error::CoreError;
use crate::model::{ControlMode, Device, DeviceId, DeviceKind, StorePath};
use crate::settings::Settings;

/// Validated, ordered device list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRegistry {
    devices: Vec<Device>,
}

impl DeviceRegistry {
    /// Validate and wrap a device list.
    ///
    /// Rejects duplicate ids, duplicate control addresses, and verified
    /// devices without a feedback address.
    pub fn new(devices: Vec<Device>) -> Result<Self, CoreError> {
        let mut ids = HashSet::new();
        let mut controls = HashSet::new();

        for device in &devices {
            if !ids.insert(device.id) {
                return Err(invalid(format!("duplicate device id {}", device.id)));
            }
            if device.control.is_root() {
                return Err(invalid(format!("device {} has an empty control path", device.id)));
            }
            if !controls.insert(device.control.clone()) {
                return Err(invalid(format!("duplicate control path {}", device.control)));
            }
            if device.mode == ControlMode::Verified && device.feedback.is_none() {
                return Err(invalid(format!(
                    "device {} is verified but has no feedback path",
                    device.id
                )));
            }
        }

        Ok(Self { devices })
    }

    /// The catalog the dashboard ships with.
    pub fn default_catalog() -> Self {
        let device = |id, label: &str, control: &str, feedback: Option<&str>, kind, mode| Device {
            id: DeviceId(id),
            label: label.to_owned(),
            control: StorePath::new(control),
            feedback: feedback.map(StorePath::new),
            kind,
            mode,
        };

        Self {
            devices: vec![
                device(
                    1,
                    "Sitting Room Light",
                    "/sittingRoomLight",
                    Some("/feedback/sittingRoomLightFeedback"),
                    DeviceKind::Switch,
                    ControlMode::Verified,
                ),
                device(
                    2,
                    "Bedroom Light",
                    "/bedRoomLight",
                    Some("/feedback/bedRoomLightFeedback"),
                    DeviceKind::Switch,
                    ControlMode::Verified,
                ),
                device(
                    3,
                    "Sitting Room Socket",
                    "/sittingRoomSocket",
                    None,
                    DeviceKind::Switch,
                    ControlMode::Assumed,
                ),
                device(
                    4,
                    "Bedroom Socket",
                    "/bedRoomSocket",
                    Some("/feedback/bedRoomSocketFeedback"),
                    DeviceKind::Switch,
                    ControlMode::Verified,
                ),
                device(
                    5,
                    "Bedroom Window",
                    "/bedRoomWindow",
                    Some("/feedback/bedRoomWindow"),
                    DeviceKind::Slider,
                    ControlMode::Verified,
                ),
                device(
                    6,
                    "Sitting Room Window",
                    "/sittingRoomWindow",
                    Some("/feedback/sittingRoomWindow"),
                    DeviceKind::Slider,
                    ControlMode::Verified,
                ),
            ],
        }
    }

    /// Build from the admin settings document.
    ///
    /// Control paths are `/{prefix}/{path}`; feedback defaults to
    /// `/{prefix}/feedback/{path}` for verified devices.
    pub fn from_settings(settings: &Settings) -> Result<Self, CoreError> {
        let prefix = StorePath::new(&settings.prefix);
        let devices = settings
            .relays
            .iter()
            .map(|relay| {
                let control = StorePath::new(&relay.path).under(&prefix);
                let mode = relay.mode.unwrap_or_default();
                let feedback = match (&relay.feedback, mode) {
                    (Some(fb), _) => Some(StorePath::new(fb)),
                    (None, ControlMode::Verified) => Some(
                        StorePath::new(&relay.path).under(&prefix.child("feedback")),
                    ),
                    (None, ControlMode::Assumed) => None,
                };
                Device {
                    id: DeviceId(relay.id),
                    label: relay.label.clone(),
                    control,
                    feedback,
                    kind: relay.kind,
                    mode,
                }
            })
            .collect();
        Self::new(devices)
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        self.devices.iter()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn get(&self, id: DeviceId) -> Option<&Device> {
        self.devices.iter().find(|d| d.id == id)
    }

    pub fn by_control(&self, control: &StorePath) -> Option<&Device> {
        self.devices.iter().find(|d| &d.control == control)
    }

    pub fn switches(&self) -> impl Iterator<Item = &Device> {
        self.devices.iter().filter(|d| d.is_switch())
    }

    /// Look a device up by numeric id, control key (`bedRoomWindow`),
    /// or label, case-insensitively.
    pub fn resolve(&self, identifier: &str) -> Result<&Device, CoreError> {
        let wanted = identifier.trim();
        let by_id = wanted
            .parse::<u32>()
            .ok()
            .and_then(|id| self.get(DeviceId(id)));

        by_id
            .or_else(|| {
                self.devices.iter().find(|d| {
                    d.key().eq_ignore_ascii_case(wanted)
                        || d.control.as_str().eq_ignore_ascii_case(wanted)
                        || d.label.eq_ignore_ascii_case(wanted)
                })
            })
            .ok_or_else(|| CoreError::DeviceNotFound {
                identifier: identifier.to_owned(),
            })
    }
}

fn invalid(message: String) -> CoreError {
    CoreError::InvalidRegistry { message }
}
