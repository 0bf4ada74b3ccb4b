//! Feedback-first command and confirmation engine between `domus-api` and
//! front ends.
//!
//! Displayed device state is derived only from what the hardware reports.
//! Commands are fire-and-track: they are written to the store, tracked as
//! pending, and resolved by a feedback value match, a command-id
//! acknowledgment, or a timeout.
//!
//! - **[`Controller`]**: follows the signed-in user and starts a fresh
//!   [`Session`] on every sign-in.
//!
//! - **[`Session`]**: device views, the feedback cache, pending commands,
//!   liveness, and the subscriptions feeding them. Commands go through
//!   [`Session::dispatcher()`].
//!
//! - **[`LiveStore`]**: key-path store with point reads, point writes, and
//!   subscriptions. [`RtdbStore`] talks to the hosted realtime database;
//!   [`MemoryStore`] keeps everything in process.
//!
//! - **[`ViewStream`]**: `current()` / `latest()` / `changed()` access to
//!   the device views for push-based rendering.

pub mod alert;
pub mod auth;
pub mod config;
pub mod controller;
mod debounce;
pub mod dispatcher;
pub mod error;
pub mod liveness;
pub mod model;
pub mod pending;
pub mod reconcile;
pub mod registry;
pub mod session;
pub mod settings;
pub mod store;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use alert::{Alert, AlertBus, AlertKind};
pub use auth::{Authenticator, User};
pub use config::{ConnectionConfig, SessionConfig};
pub use controller::Controller;
pub use dispatcher::{AllOffReport, CommandOutcome, CommandStatus, DeviceFailure, Dispatcher};
pub use error::CoreError;
pub use liveness::Liveness;
pub use pending::{Outcome, PendingCommand, PendingTracker, Resolution};
pub use reconcile::OnCount;
pub use registry::DeviceRegistry;
pub use session::{DeviceView, Session};
pub use settings::{Relay, Settings};
pub use store::{LiveStore, MemoryStore, RtdbStore, StoreError, StoreUpdate, Subscription};
pub use stream::{ViewStream, ViewWatchStream};

pub use model::{
    CommandId, ControlMode, Device, DeviceId, DeviceKind, DisplayState, Preset, PresetValues,
    StorePath,
};
