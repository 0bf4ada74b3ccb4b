//! Shared configuration for the domus command line.
//!
//! TOML profiles merged with `DOMUS_`-prefixed environment, credential
//! resolution (plaintext, environment, OS keyring), and translation to
//! `domus_core::{ConnectionConfig, SessionConfig}`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use domus_core::{ConnectionConfig, SessionConfig, StorePath};

const KEYRING_SERVICE: &str = "domus";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{name}' not found")]
    ProfileNotFound { name: String },

    #[error("no {what} configured for profile '{profile}'")]
    NoCredentials { profile: String, what: &'static str },

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is selected on the command line.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named backend profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// The profile name in effect: explicit selection, then the
    /// configured default, then `"default"`.
    pub fn active_profile_name(&self, selected: Option<&str>) -> String {
        selected
            .map(str::to_owned)
            .or_else(|| self.default_profile.clone())
            .unwrap_or_else(|| "default".into())
    }

    pub fn profile(&self, name: &str) -> Result<&Profile, ConfigError> {
        self.profiles
            .get(name)
            .ok_or_else(|| ConfigError::ProfileNotFound { name: name.into() })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            timeout: default_timeout(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    15
}

/// A named backend profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Profile {
    /// Realtime database root URL.
    pub database_url: String,

    /// Web API key of the project.
    pub api_key: Option<String>,

    /// Environment variable holding the API key.
    pub api_key_env: Option<String>,

    /// Identity endpoint override (emulators).
    pub auth_url: Option<String>,

    /// Sign-in email.
    pub email: Option<String>,

    /// Sign-in password (plaintext; prefer keyring).
    pub password: Option<String>,

    /// Environment variable holding the password.
    pub password_env: Option<String>,

    /// Override request timeout.
    pub timeout: Option<u64>,

    /// Build the device list from the settings document.
    #[serde(default)]
    pub registry_from_settings: bool,

    #[serde(default, skip_serializing_if = "Timings::is_empty")]
    pub timings: Timings,

    #[serde(default, skip_serializing_if = "Paths::is_empty")]
    pub paths: Paths,
}

/// Optional timing overrides, in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Timings {
    pub pending_timeout_ms: Option<u64>,
    pub debounce_ms: Option<u64>,
    pub heartbeat_stale_ms: Option<u64>,
    pub heartbeat_poll_ms: Option<u64>,
    pub animation_ms: Option<u64>,
}

impl Timings {
    fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Optional store path overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Paths {
    pub heartbeat: Option<String>,
    pub ack_root: Option<String>,
    pub presets_root: Option<String>,
    pub settings: Option<String>,
}

impl Paths {
    fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "domus", "domus").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("domus");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path` + environment. A missing file yields the defaults.
///
/// Environment keys nest with a double underscore:
/// `DOMUS_PROFILES__HOME__EMAIL=...`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("DOMUS_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if loading fails.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(cfg, &path)?;
    Ok(path)
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve the sign-in password: plaintext, then `password_env`, then
/// the OS keyring.
pub fn resolve_password(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    // 1. Plaintext in config
    if let Some(ref pw) = profile.password {
        return Ok(SecretString::from(pw.clone()));
    }

    // 2. Profile's password_env → env var lookup
    if let Some(ref env_name) = profile.password_env {
        if let Ok(pw) = std::env::var(env_name) {
            return Ok(SecretString::from(pw));
        }
    }

    // 3. Keyring
    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &keyring_user(profile_name)) {
        if let Ok(pw) = entry.get_password() {
            return Ok(SecretString::from(pw));
        }
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
        what: "password",
    })
}

/// Store the password for `profile_name` in the OS keyring.
pub fn store_password(profile_name: &str, password: &str) -> Result<(), ConfigError> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, &keyring_user(profile_name))?;
    entry.set_password(password)?;
    Ok(())
}

fn keyring_user(profile_name: &str) -> String {
    format!("{profile_name}/password")
}

/// Resolve the project API key: plaintext, then `api_key_env`.
pub fn resolve_api_key(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    if let Some(ref key) = profile.api_key {
        return Ok(SecretString::from(key.clone()));
    }
    if let Some(ref env_name) = profile.api_key_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
    }
    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
        what: "API key",
    })
}

/// Sign-in email of a profile.
pub fn resolve_email(profile: &Profile, profile_name: &str) -> Result<String, ConfigError> {
    profile
        .email
        .clone()
        .filter(|e| !e.trim().is_empty())
        .ok_or_else(|| ConfigError::NoCredentials {
            profile: profile_name.into(),
            what: "email",
        })
}

// ── Translation to core configs ─────────────────────────────────────

fn parse_url(field: &str, raw: &str) -> Result<url::Url, ConfigError> {
    raw.parse().map_err(|_| ConfigError::Validation {
        field: field.into(),
        reason: format!("invalid URL: {raw}"),
    })
}

/// Build a `ConnectionConfig` from a profile.
pub fn profile_to_connection_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<ConnectionConfig, ConfigError> {
    let database_url = parse_url("database_url", &profile.database_url)?;
    let api_key = resolve_api_key(profile, profile_name)?;

    let mut config = ConnectionConfig::new(database_url, api_key);
    config.auth_url = profile
        .auth_url
        .as_deref()
        .map(|raw| parse_url("auth_url", raw))
        .transpose()?;
    config.timeout = Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout));
    Ok(config)
}

/// Build a `SessionConfig` from a profile, keeping the defaults for
/// anything not overridden.
pub fn profile_to_session_config(profile: &Profile) -> SessionConfig {
    let mut config = SessionConfig {
        registry_from_settings: profile.registry_from_settings,
        ..SessionConfig::default()
    };

    let t = &profile.timings;
    let ms = Duration::from_millis;
    if let Some(v) = t.pending_timeout_ms {
        config.pending_timeout = ms(v);
    }
    if let Some(v) = t.debounce_ms {
        config.debounce = ms(v);
    }
    if let Some(v) = t.heartbeat_stale_ms {
        config.heartbeat_stale = ms(v);
    }
    if let Some(v) = t.heartbeat_poll_ms {
        config.heartbeat_poll = ms(v);
    }
    if let Some(v) = t.animation_ms {
        config.animation = ms(v);
    }

    let p = &profile.paths;
    if let Some(ref v) = p.heartbeat {
        config.heartbeat_path = StorePath::new(v);
    }
    if let Some(ref v) = p.ack_root {
        config.ack_root = StorePath::new(v);
    }
    if let Some(ref v) = p.presets_root {
        config.presets_root = StorePath::new(v);
    }
    if let Some(ref v) = p.settings {
        config.settings_path = StorePath::new(v);
    }
    config
}
