// Shared transport configuration for building reqwest::Client instances.
//
// The sign-in client and the database client share timeout and user-agent
// settings through this module. The overall request timeout is applied per
// request, never on the client, so long-lived event streams are not cut off.

use std::time::Duration;

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Per-request timeout for point reads, writes and sign-in calls.
    pub timeout: Duration,
    /// TCP connect timeout, also applied to the event stream.
    pub connect_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, crate::error::Error> {
        reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .user_agent(concat!("domus/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| crate::error::Error::Tls(format!("failed to build HTTP client: {e}")))
    }
}
