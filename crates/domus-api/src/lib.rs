// domus-api: Async Rust clients for the realtime database and password sign-in

pub mod auth;
pub mod error;
pub mod rtdb;
pub mod transport;

pub use auth::{AuthClient, AuthConfig, AuthUser, SharedToken};
pub use error::Error;
pub use rtdb::{ReconnectConfig, RtdbClient, WatchEvent};
pub use transport::TransportConfig;
