// ── Device domain types ──

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::path::StorePath;

/// Small, stable integer identifying a device within the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub u32);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Control surface of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum DeviceKind {
    /// On/off, written as 0 or 1.
    Switch,
    /// Integer percentage 0..=100.
    Slider,
}

/// How a command is confirmed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ControlMode {
    /// Command id round trip through the acknowledgment address, plus
    /// feedback value matching.
    #[default]
    Verified,
    /// The write is trusted; the display flips optimistically.
    Assumed,
}

/// A controllable device from the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    pub label: String,
    /// Where commands are written.
    pub control: StorePath,
    /// Where the hardware reports its real state.
    pub feedback: Option<StorePath>,
    pub kind: DeviceKind,
    pub mode: ControlMode,
}

impl Device {
    /// Short name used to address the device from the command line,
    /// e.g. `bedRoomWindow` for `/bedRoomWindow`.
    pub fn key(&self) -> &str {
        self.control.key()
    }

    pub fn is_switch(&self) -> bool {
        self.kind == DeviceKind::Switch
    }

    pub fn is_slider(&self) -> bool {
        self.kind == DeviceKind::Slider
    }

    /// `{ack_root}{control}`; only meaningful for verified devices.
    pub fn ack_path(&self, ack_root: &StorePath) -> StorePath {
        self.control.under(ack_root)
    }

    /// `{presets_root}{control}`
    pub fn presets_path(&self, presets_root: &StorePath) -> StorePath {
        self.control.under(presets_root)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn kinds_parse_case_insensitively() {
        assert_eq!(DeviceKind::from_str("Slider").unwrap(), DeviceKind::Slider);
        assert_eq!(ControlMode::from_str("ASSUMED").unwrap(), ControlMode::Assumed);
        assert_eq!(DeviceKind::Switch.to_string(), "switch");
    }

    #[test]
    fn derived_paths() {
        let d = Device {
            id: DeviceId(5),
            label: "Bedroom Window".into(),
            control: StorePath::new("/bedRoomWindow"),
            feedback: Some(StorePath::new("/feedback/bedRoomWindow")),
            kind: DeviceKind::Slider,
            mode: ControlMode::Verified,
        };
        assert_eq!(d.key(), "bedRoomWindow");
        assert_eq!(d.ack_path(&StorePath::new("/ack")).as_str(), "/ack/bedRoomWindow");
        assert_eq!(
            d.presets_path(&StorePath::new("/settings/presets")).as_str(),
            "/settings/presets/bedRoomWindow"
        );
    }
}
