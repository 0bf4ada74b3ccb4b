//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors with
//! actionable help text and process exit codes.

use miette::Diagnostic;
use thiserror::Error;

use domus_config::ConfigError;
use domus_core::{CoreError, StoreError};

/// Process exit codes.
pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const PERMISSION: i32 = 5;
    pub const CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
#[allow(dead_code, unused_assignments)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────

    #[error("Realtime database unavailable: {message}")]
    #[diagnostic(
        code(domus::store_unavailable),
        help(
            "Check the database URL in your profile and your network connection.\n\
             Try: domus config show"
        )
    )]
    StoreUnavailable { message: String },

    #[error("Devices are offline (no heartbeat)")]
    #[diagnostic(
        code(domus::offline),
        help("Controls stay disabled until the controller publishes a heartbeat again.")
    )]
    DevicesOffline,

    #[error("Session ended before the command finished")]
    #[diagnostic(code(domus::session_closed))]
    SessionClosed,

    // ── Authentication ───────────────────────────────────────────────

    #[error("Authentication failed: {reason}")]
    #[diagnostic(
        code(domus::auth_failed),
        help(
            "Verify the email and password for profile '{profile}'.\n\
             Run: domus config set-password --profile {profile}"
        )
    )]
    AuthFailed { profile: String, reason: String },

    #[error("No {what} configured for profile '{profile}'")]
    #[diagnostic(
        code(domus::no_credentials),
        help(
            "Configure credentials with: domus config init\n\
             Or set DOMUS_EMAIL / DOMUS_PASSWORD / DOMUS_API_KEY."
        )
    )]
    NoCredentials { profile: String, what: String },

    #[error("Permission denied for {path}")]
    #[diagnostic(
        code(domus::permission_denied),
        help("The signed-in account may not read or write this path.")
    )]
    PermissionDenied { path: String },

    // ── Devices ──────────────────────────────────────────────────────

    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(domus::not_found),
        help("Run: domus {list_command} to see available {resource_type}s")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    #[error("Device {device} is a {actual}, not a {expected}")]
    #[diagnostic(
        code(domus::wrong_device_kind),
        help("Switches take `toggle`; sliders take `set` and `preset`.")
    )]
    WrongDeviceKind {
        device: String,
        expected: String,
        actual: String,
    },

    // ── Confirmation ─────────────────────────────────────────────────

    #[error("{message}")]
    #[diagnostic(
        code(domus::unconfirmed),
        help(
            "The command was written but {device} never reported the new state.\n\
             Check the device, or run: domus watch"
        )
    )]
    Unconfirmed { device: String, message: String },

    #[error("Command for {device} was replaced before it was confirmed")]
    #[diagnostic(code(domus::superseded))]
    Superseded { device: String },

    #[error("{failed} of {total} devices could not be turned off")]
    #[diagnostic(code(domus::partial_failure))]
    PartialFailure { failed: usize, total: usize },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(domus::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(domus::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: domus config init"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("Configuration file not found")]
    #[diagnostic(
        code(domus::no_config),
        help(
            "Create one with: domus config init\n\
             Expected at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(domus::config))]
    Config(ConfigError),

    // ── Interactive ──────────────────────────────────────────────────

    #[error("Destructive operation '{action}' requires confirmation")]
    #[diagnostic(
        code(domus::confirmation_required),
        help("Use --yes (-y) to skip confirmation in non-interactive contexts.")
    )]
    NonInteractiveRequiresYes { action: String },

    // ── Timeout ──────────────────────────────────────────────────────

    #[error("Timed out after {seconds}s")]
    #[diagnostic(
        code(domus::timeout),
        help("Increase timeout with --timeout or check the backend's responsiveness.")
    )]
    Timeout { seconds: u64 },

    // ── IO / Serialization ────────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to render JSON: {0}")]
    #[diagnostic(code(domus::json))]
    Json(#[from] serde_json::Error),

    #[error("Failed to render YAML: {0}")]
    #[diagnostic(code(domus::yaml))]
    Yaml(#[from] serde_yaml::Error),

    #[error("Internal error: {0}")]
    #[diagnostic(code(domus::internal))]
    Internal(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::StoreUnavailable { .. } | Self::DevicesOffline => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::PermissionDenied { .. } => exit_code::PERMISSION,
            Self::NotFound { .. } | Self::ProfileNotFound { .. } => exit_code::NOT_FOUND,
            Self::Superseded { .. } => exit_code::CONFLICT,
            Self::Unconfirmed { .. } | Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. }
            | Self::WrongDeviceKind { .. }
            | Self::NonInteractiveRequiresYes { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Store(StoreError::PermissionDenied { path }) => {
                CliError::PermissionDenied { path }
            }
            CoreError::Store(other) => CliError::StoreUnavailable {
                message: other.to_string(),
            },

            CoreError::AuthenticationFailed { message } => CliError::AuthFailed {
                profile: "current".into(),
                reason: message,
            },

            CoreError::NotSignedIn => CliError::AuthFailed {
                profile: "current".into(),
                reason: "not signed in".into(),
            },

            CoreError::SessionClosed => CliError::SessionClosed,

            CoreError::DeviceNotFound { identifier } => CliError::NotFound {
                resource_type: "device".into(),
                identifier,
                list_command: "devices list".into(),
            },

            CoreError::WrongDeviceKind {
                id,
                expected,
                actual,
            } => CliError::WrongDeviceKind {
                device: id.to_string(),
                expected: expected.to_string(),
                actual: actual.to_string(),
            },

            CoreError::InvalidPercent { value } => CliError::Validation {
                field: "percent".into(),
                reason: format!("{value} is outside 0-100"),
            },

            CoreError::ControlsDisabled => CliError::DevicesOffline,

            CoreError::ConfirmationRequired => CliError::NonInteractiveRequiresYes {
                action: "all-off".into(),
            },

            CoreError::InvalidRegistry { message } => CliError::Validation {
                field: "registry".into(),
                reason: message,
            },

            CoreError::InvalidSettings { message } => CliError::Validation {
                field: "settings".into(),
                reason: message,
            },

            CoreError::Internal(msg) => CliError::Internal(msg),
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::ProfileNotFound { name } => CliError::ProfileNotFound {
                name,
                available: "(none)".into(),
            },
            ConfigError::NoCredentials { profile, what } => CliError::NoCredentials {
                profile,
                what: what.into(),
            },
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::Io(e) => CliError::Io(e),
            other => CliError::Config(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use domus_core::{DeviceId, DeviceKind};

    use super::*;

    #[test]
    fn core_errors_map_to_exit_codes() {
        let cases = [
            (
                CoreError::DeviceNotFound {
                    identifier: "garage".into(),
                },
                exit_code::NOT_FOUND,
            ),
            (
                CoreError::AuthenticationFailed {
                    message: "INVALID_PASSWORD".into(),
                },
                exit_code::AUTH,
            ),
            (CoreError::ControlsDisabled, exit_code::CONNECTION),
            (CoreError::InvalidPercent { value: 140 }, exit_code::USAGE),
            (
                CoreError::WrongDeviceKind {
                    id: DeviceId(1),
                    expected: DeviceKind::Slider,
                    actual: DeviceKind::Switch,
                },
                exit_code::USAGE,
            ),
            (
                CoreError::Store(StoreError::PermissionDenied {
                    path: "/bedRoomLight".into(),
                }),
                exit_code::PERMISSION,
            ),
            (
                CoreError::Store(StoreError::Unavailable {
                    message: "connection reset".into(),
                }),
                exit_code::CONNECTION,
            ),
        ];
        for (core, code) in cases {
            let cli = CliError::from(core);
            assert_eq!(cli.exit_code(), code, "{cli}");
        }
    }

    #[test]
    fn missing_credentials_name_what_is_missing() {
        let cli = CliError::from(ConfigError::NoCredentials {
            profile: "home".into(),
            what: "password",
        });
        assert_eq!(cli.exit_code(), exit_code::AUTH);
        assert_eq!(
            cli.to_string(),
            "No password configured for profile 'home'"
        );
    }
}
