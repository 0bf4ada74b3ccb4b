// ── Admin settings document ──
//
// Device labels, paths and slider presets stored at `/settings`. Stored
// data is loosely shaped (relays as an array or a keyed object, missing
// fields), so loading normalizes and falls back to defaults.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::CoreError;
use crate::model::{ControlMode, DeviceKind, PresetValues, StorePath};
use crate::store::LiveStore;

/// One configurable device entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relay {
    pub id: u32,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub path: String,
    #[serde(rename = "type", default = "default_kind")]
    pub kind: DeviceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<ControlMode>,
}

fn default_kind() -> DeviceKind {
    DeviceKind::Switch
}

/// The full settings document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub relays: Vec<Relay>,
    #[serde(default)]
    pub prefix: String,
    /// Slider presets keyed by device path.
    #[serde(default)]
    pub presets: IndexMap<String, PresetValues>,
}

impl Default for Settings {
    fn default() -> Self {
        let relay = |id, label: &str, path: &str, kind| Relay {
            id,
            label: label.to_owned(),
            path: path.to_owned(),
            kind,
            feedback: None,
            mode: None,
        };
        let mut presets = IndexMap::new();
        presets.insert("bedroom_window".to_owned(), PresetValues::default());
        presets.insert("sittingroom_window".to_owned(), PresetValues::default());

        Self {
            relays: vec![
                relay(1, "Bedroom Light", "bedroom_light", DeviceKind::Switch),
                relay(2, "Bedroom Socket", "bedroom_socket", DeviceKind::Switch),
                relay(3, "Sitting Room Light", "sittingroom_light", DeviceKind::Switch),
                relay(4, "Sitting Room Socket", "sittingroom_socket", DeviceKind::Switch),
                relay(5, "Bedroom Window", "bedroom_window", DeviceKind::Slider),
                relay(6, "Sitting Room Window", "sittingroom_window", DeviceKind::Slider),
            ],
            prefix: String::new(),
            presets,
        }
    }
}

impl Settings {
    /// Read and normalize the document at `path`. Missing or malformed
    /// documents yield the defaults; store failures are returned.
    pub async fn load(store: &dyn LiveStore, path: &StorePath) -> Result<Self, CoreError> {
        let value = store.read(path).await?;
        Ok(value.map_or_else(
            || {
                debug!(path = %path, "no settings stored, using defaults");
                Self::default()
            },
            |v| Self::from_value(&v),
        ))
    }

    /// Lenient conversion from stored JSON.
    pub fn from_value(value: &Value) -> Self {
        let Value::Object(doc) = value else {
            warn!("settings document is not an object, using defaults");
            return Self::default();
        };
        let defaults = Self::default();

        let raw_relays: Vec<&Value> = match doc.get("relays") {
            Some(Value::Array(items)) => items.iter().collect(),
            Some(Value::Object(map)) => map.values().collect(),
            _ => Vec::new(),
        };
        let relays: Vec<Relay> = raw_relays
            .into_iter()
            .filter(|v| !v.is_null())
            .filter_map(|v| match serde_json::from_value::<Relay>(v.clone()) {
                Ok(relay) => Some(relay),
                Err(e) => {
                    warn!(error = %e, "skipping malformed relay entry");
                    None
                }
            })
            .collect();

        let prefix = doc
            .get("prefix")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();

        let presets = match doc.get("presets") {
            Some(Value::Object(map)) => map
                .iter()
                .map(|(k, v)| (k.clone(), PresetValues::from_value(Some(v))))
                .collect(),
            _ => defaults.presets.clone(),
        };

        Self {
            relays: if relays.is_empty() {
                defaults.relays
            } else {
                relays
            },
            prefix,
            presets,
        }
    }

    /// Device paths must be unique.
    pub fn validate(&self) -> Result<(), CoreError> {
        let mut seen = std::collections::HashSet::new();
        for relay in &self.relays {
            let path = relay.path.trim();
            if !seen.insert(path) {
                return Err(CoreError::InvalidSettings {
                    message: format!("Device paths must be unique. Duplicate: {path}"),
                });
            }
        }
        Ok(())
    }

    /// Fill blank labels and paths, trim the prefix, and clamp presets.
    pub fn sanitize(&mut self) {
        for relay in &mut self.relays {
            relay.label = relay.label.trim().to_owned();
            if relay.label.is_empty() {
                relay.label = format!("Device {}", relay.id);
            }
            relay.path = relay.path.trim().to_owned();
            if relay.path.is_empty() {
                relay.path = format!("device{}", relay.id);
            }
        }
        self.prefix = self.prefix.trim().trim_matches('/').to_owned();
        for preset in self.presets.values_mut() {
            preset.open = preset.open.min(100);
            preset.half = preset.half.min(100);
            preset.close = preset.close.min(100);
        }
    }

    /// Sanitize, validate, and write the document to `path`.
    pub async fn save(&self, store: &dyn LiveStore, path: &StorePath) -> Result<Self, CoreError> {
        let mut doc = self.clone();
        doc.sanitize();
        doc.validate()?;
        let value = serde_json::to_value(&doc).map_err(|e| CoreError::Internal(e.to_string()))?;
        store.write(path, value).await?;
        Ok(doc)
    }

    /// Presets for a device path, defaulting to 100/50/0.
    pub fn presets_for(&self, path: &str) -> PresetValues {
        self.presets.get(path).copied().unwrap_or_default()
    }
}
