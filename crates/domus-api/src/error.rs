use thiserror::Error;

/// Top-level error type for the `domus-api` crate.
///
/// Covers every failure mode of the two remote surfaces: the password
/// sign-in provider and the realtime database (REST calls and the
/// event stream). `domus-core` maps these into domain errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Sign-in or token refresh rejected (wrong password, disabled user, ...).
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// A call that needs an id token was made while signed out.
    #[error("Not signed in")]
    NotSignedIn,

    // ── Database ────────────────────────────────────────────────────
    /// Security rules rejected the read/write (HTTP 401/403).
    #[error("Permission denied for {path}")]
    PermissionDenied { path: String },

    /// Any other non-success response from the database REST endpoint.
    #[error("Database error (HTTP {status}): {message}")]
    Database { status: u16, message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, timeout, ...).
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Building the HTTP client failed.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Event stream ────────────────────────────────────────────────
    /// The server closed the stream with a `cancel` or `auth_revoked` event.
    #[error("Event stream cancelled by server: {reason}")]
    StreamCancelled { reason: String },

    /// Malformed event on the stream.
    #[error("Event stream error: {0}")]
    Stream(String),

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Whether the failure came from credentials rather than the network.
    pub fn is_auth_error(&self) -> bool {
        matches!(
            self,
            Self::Authentication { .. } | Self::NotSignedIn | Self::PermissionDenied { .. }
        )
    }

    /// Whether retrying the same request later could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Database { status, .. } => *status >= 500,
            Self::Stream(_) | Self::StreamCancelled { .. } => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_errors_are_classified() {
        assert!(Error::NotSignedIn.is_auth_error());
        assert!(
            Error::PermissionDenied {
                path: "/x".into()
            }
            .is_auth_error()
        );
        assert!(!Error::Stream("bad frame".into()).is_auth_error());
    }

    #[test]
    fn server_errors_are_transient() {
        let e = Error::Database {
            status: 503,
            message: "unavailable".into(),
        };
        assert!(e.is_transient());
        let e = Error::Database {
            status: 400,
            message: "bad request".into(),
        };
        assert!(!e.is_transient());
    }
}
