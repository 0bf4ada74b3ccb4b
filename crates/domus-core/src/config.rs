// ── Runtime configuration ──
//
// Core never reads files or the environment; `domus-config` builds these
// from profiles and the CLI passes them in.

use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use crate::model::StorePath;

/// Timing and addressing knobs for one signed-in session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long a command may stay unconfirmed before it expires.
    pub pending_timeout: Duration,
    /// Quiet period before a dragged slider value is written.
    pub debounce: Duration,
    /// Heartbeat age after which the devices are considered offline.
    pub heartbeat_stale: Duration,
    /// How often heartbeat age is checked.
    pub heartbeat_poll: Duration,
    /// Length of the slider animation toward a new feedback value.
    pub animation: Duration,
    pub animation_frame: Duration,

    pub heartbeat_path: StorePath,
    pub ack_root: StorePath,
    pub presets_root: StorePath,
    pub settings_path: StorePath,

    /// Build the registry from the settings document instead of the
    /// compiled-in catalog.
    pub registry_from_settings: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            pending_timeout: Duration::from_secs(8),
            debounce: Duration::from_millis(300),
            heartbeat_stale: Duration::from_secs(7),
            heartbeat_poll: Duration::from_millis(1500),
            animation: Duration::from_millis(300),
            animation_frame: Duration::from_millis(16),
            heartbeat_path: StorePath::new("/heartbeat"),
            ack_root: StorePath::new("/ack"),
            presets_root: StorePath::new("/settings/presets"),
            settings_path: StorePath::new("/settings"),
            registry_from_settings: false,
        }
    }
}

/// Where the backend lives and how to authenticate against it.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub database_url: Url,
    pub api_key: SecretString,
    /// Override the identity endpoint (emulators, tests).
    pub auth_url: Option<Url>,
    pub timeout: Duration,
}

impl ConnectionConfig {
    pub fn new(database_url: Url, api_key: SecretString) -> Self {
        Self {
            database_url,
            api_key,
            auth_url: None,
            timeout: Duration::from_secs(15),
        }
    }
}
