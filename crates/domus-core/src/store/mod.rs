// ── Live store abstraction ──
//
// Key-path addressed store with point reads, point writes and change
// subscriptions. The session only talks to `dyn LiveStore`; the realtime
// database adapter and the in-memory store both implement it.

pub mod memory;
pub mod rtdb;

use futures_util::future::BoxFuture;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::model::StorePath;

pub use memory::MemoryStore;
pub use rtdb::RtdbStore;

/// Result item delivered by a [`Subscription`].
pub type StoreUpdate = Result<Option<Value>, StoreError>;

// ── StoreError ───────────────────────────────────────────────────────

/// Failure of a single store operation.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Permission denied for {path}")]
    PermissionDenied { path: String },

    #[error("Store unavailable: {message}")]
    Unavailable { message: String },

    #[error("Store rejected the request: {message}")]
    Rejected { message: String },

    #[error("Malformed data: {message}")]
    Malformed { message: String },
}

impl From<domus_api::Error> for StoreError {
    fn from(err: domus_api::Error) -> Self {
        match err {
            domus_api::Error::PermissionDenied { path } => Self::PermissionDenied { path },
            domus_api::Error::Database { status, message } if status < 500 => Self::Rejected {
                message: format!("HTTP {status}: {message}"),
            },
            domus_api::Error::Deserialization { message, .. } => Self::Malformed { message },
            domus_api::Error::NotSignedIn | domus_api::Error::Authentication { .. } => {
                Self::PermissionDenied {
                    path: String::new(),
                }
            }
            other => Self::Unavailable {
                message: other.to_string(),
            },
        }
    }
}

// ── LiveStore ────────────────────────────────────────────────────────

/// The store the session reads, writes and watches.
pub trait LiveStore: Send + Sync + 'static {
    /// Point read. `Ok(None)` when nothing is stored at `path`.
    fn read<'a>(&'a self, path: &'a StorePath) -> BoxFuture<'a, StoreUpdate>;

    /// Point write; `Value::Null` deletes.
    fn write<'a>(&'a self, path: &'a StorePath, value: Value)
    -> BoxFuture<'a, Result<(), StoreError>>;

    /// Watch `path`. The first item is the current value; later items
    /// arrive on change. Dropping the subscription unsubscribes.
    fn subscribe(&self, path: &StorePath) -> Subscription;
}

// ── Subscription ─────────────────────────────────────────────────────

/// Handle to a live subscription. Dropping it cancels the source.
pub struct Subscription {
    path: StorePath,
    rx: mpsc::UnboundedReceiver<StoreUpdate>,
    _guard: DropGuard,
}

impl Subscription {
    /// Wrap a receiver fed by a source that stops when `cancel` fires.
    pub fn new(
        path: StorePath,
        rx: mpsc::UnboundedReceiver<StoreUpdate>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            path,
            rx,
            _guard: cancel.drop_guard(),
        }
    }

    pub fn path(&self) -> &StorePath {
        &self.path
    }

    /// Next update, or `None` once the source has shut down.
    pub async fn recv(&mut self) -> Option<StoreUpdate> {
        self.rx.recv().await
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}
