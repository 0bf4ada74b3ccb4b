// ── Core error types ──
//
// User-facing errors from domus-core. Consumers never see HTTP status
// codes or stream framing failures directly; the `From<domus_api::Error>`
// impl translates transport-layer errors into domain variants.

use thiserror::Error;

use crate::model::{DeviceId, DeviceKind};
use crate::store::StoreError;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Store / session errors ───────────────────────────────────────
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Not signed in")]
    NotSignedIn,

    #[error("Session closed")]
    SessionClosed,

    // ── Command errors ───────────────────────────────────────────────
    #[error("Device not found: {identifier}")]
    DeviceNotFound { identifier: String },

    #[error("Device {id} is a {actual}, not a {expected}")]
    WrongDeviceKind {
        id: DeviceId,
        expected: DeviceKind,
        actual: DeviceKind,
    },

    #[error("Percentage out of range: {value} (expected 0-100)")]
    InvalidPercent { value: i64 },

    #[error("Controls are disabled while the devices are offline")]
    ControlsDisabled,

    #[error("Turning everything off requires confirmation")]
    ConfirmationRequired,

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Invalid device registry: {message}")]
    InvalidRegistry { message: String },

    #[error("Invalid settings: {message}")]
    InvalidSettings { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<domus_api::Error> for CoreError {
    fn from(err: domus_api::Error) -> Self {
        match err {
            domus_api::Error::Authentication { message } => {
                CoreError::AuthenticationFailed { message }
            }
            domus_api::Error::NotSignedIn => CoreError::NotSignedIn,
            domus_api::Error::InvalidUrl(e) => CoreError::Internal(format!("Invalid URL: {e}")),
            domus_api::Error::Tls(msg) => CoreError::Internal(format!("TLS error: {msg}")),
            other => CoreError::Store(StoreError::from(other)),
        }
    }
}
