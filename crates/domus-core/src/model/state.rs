// ── Displayed state and command values ──
//
// Feedback values arrive as loosely typed JSON written by device firmware.
// Everything here is a pure function of that JSON, so the same emission
// always produces the same display.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};

use super::device::DeviceKind;

/// What a device card shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "value")]
pub enum DisplayState {
    Switch(bool),
    Slider(u8),
}

impl DisplayState {
    /// Derive the display from a feedback emission. Switches use
    /// truthiness; sliders a rounded, clamped percentage (0 when absent
    /// or not numeric).
    pub fn from_feedback(kind: DeviceKind, value: Option<&Value>) -> Self {
        match kind {
            DeviceKind::Switch => Self::Switch(value.is_some_and(is_truthy)),
            DeviceKind::Slider => Self::Slider(parse_percent(value).unwrap_or(0)),
        }
    }

    /// The state a command writing `level` asks for.
    pub fn from_level(kind: DeviceKind, level: u8) -> Self {
        match kind {
            DeviceKind::Switch => Self::Switch(level != 0),
            DeviceKind::Slider => Self::Slider(level.min(100)),
        }
    }

    /// The "nothing known yet" state for a kind.
    pub fn off(kind: DeviceKind) -> Self {
        match kind {
            DeviceKind::Switch => Self::Switch(false),
            DeviceKind::Slider => Self::Slider(0),
        }
    }

    /// Switch on, or slider above zero.
    pub fn is_on(self) -> bool {
        match self {
            Self::Switch(on) => on,
            Self::Slider(pct) => pct > 0,
        }
    }

    /// The value a command would write to reach this state.
    pub fn level(self) -> u8 {
        match self {
            Self::Switch(on) => u8::from(on),
            Self::Slider(pct) => pct,
        }
    }

    /// Whether this state confirms a command that wrote `expected`.
    pub fn matches(self, expected: u8) -> bool {
        match self {
            Self::Switch(on) => on == (expected != 0),
            Self::Slider(pct) => pct == expected,
        }
    }
}

impl fmt::Display for DisplayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Switch(true) => f.write_str("ON"),
            Self::Switch(false) => f.write_str("OFF"),
            Self::Slider(pct) => write!(f, "{pct}%"),
        }
    }
}

// ── Feedback parsing ─────────────────────────────────────────────────

/// JavaScript-style truthiness, which is what device firmware assumes.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Interpret a value as a percentage: numbers and numeric strings are
/// rounded and clamped to 0..=100, booleans count as 0/1. `None` for
/// anything else.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::as_conversions)]
pub fn parse_percent(value: Option<&Value>) -> Option<u8> {
    let raw = match value? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        Value::Bool(b) => f64::from(u8::from(*b)),
        _ => return None,
    };
    if raw.is_nan() {
        return None;
    }
    Some(raw.round().clamp(0.0, 100.0) as u8)
}

// ── Presets ──────────────────────────────────────────────────────────

/// Named slider positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Preset {
    Open,
    Half,
    Close,
}

/// Percentages for each preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresetValues {
    pub open: u8,
    pub half: u8,
    pub close: u8,
}

impl Default for PresetValues {
    fn default() -> Self {
        Self {
            open: 100,
            half: 50,
            close: 0,
        }
    }
}

impl PresetValues {
    pub fn get(&self, preset: Preset) -> u8 {
        match preset {
            Preset::Open => self.open,
            Preset::Half => self.half,
            Preset::Close => self.close,
        }
    }

    /// Read a stored preset object leniently: each missing or non-numeric
    /// field falls back to its default, and values are clamped.
    pub fn from_value(value: Option<&Value>) -> Self {
        let defaults = Self::default();
        let field = |name: &str, fallback: u8| {
            parse_percent(value.and_then(|v| v.get(name))).unwrap_or(fallback)
        };
        Self {
            open: field("open", defaults.open),
            half: field("half", defaults.half),
            close: field("close", defaults.close),
        }
    }
}

// ── Command identity ─────────────────────────────────────────────────

/// Unique token written alongside a verified command and echoed back by
/// the device in its acknowledgment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandId(String);

impl CommandId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CommandId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CommandId {
    fn from(raw: &str) -> Self {
        Self(raw.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn switch_display_uses_truthiness() {
        let cases = [
            (json!(1), true),
            (json!(0), false),
            (json!(true), true),
            (json!("on"), true),
            (json!(""), false),
            (json!({}), true),
            (Value::Null, false),
        ];
        for (value, expected) in cases {
            assert_eq!(
                DisplayState::from_feedback(DeviceKind::Switch, Some(&value)),
                DisplayState::Switch(expected),
                "{value}"
            );
        }
        assert_eq!(
            DisplayState::from_feedback(DeviceKind::Switch, None),
            DisplayState::Switch(false)
        );
    }

    #[test]
    fn slider_display_is_clamped_and_rounded() {
        let cases = [
            (json!(80), 80),
            (json!(42.6), 43),
            (json!(250), 100),
            (json!(-3), 0),
            (json!("55"), 55),
            (json!("half"), 0),
            (json!([1]), 0),
        ];
        for (value, expected) in cases {
            assert_eq!(
                DisplayState::from_feedback(DeviceKind::Slider, Some(&value)),
                DisplayState::Slider(expected),
                "{value}"
            );
        }
    }

    #[test]
    fn matching_rules() {
        assert!(DisplayState::Switch(true).matches(1));
        assert!(DisplayState::Switch(false).matches(0));
        assert!(!DisplayState::Switch(true).matches(0));
        assert!(DisplayState::Slider(80).matches(80));
        assert!(!DisplayState::Slider(79).matches(80));
    }

    #[test]
    fn presets_fall_back_per_field() {
        let stored = json!({ "open": 90, "half": "x" });
        let presets = PresetValues::from_value(Some(&stored));
        assert_eq!(presets.get(Preset::Open), 90);
        assert_eq!(presets.get(Preset::Half), 50);
        assert_eq!(presets.get(Preset::Close), 0);
        assert_eq!(PresetValues::from_value(None), PresetValues::default());
    }

    #[test]
    fn command_ids_are_unique() {
        assert_ne!(CommandId::new(), CommandId::new());
    }
}
