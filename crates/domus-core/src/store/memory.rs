// ── In-memory live store ──
//
// A JSON tree with the same change semantics as the realtime database:
// subscribers get the current value on subscribe and again whenever the
// value at their path changes. Writes through the `LiveStore` trait are
// recorded so callers can assert on exactly what was sent; `set` models
// writes made by the hardware side and is not recorded.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::{LiveStore, StoreError, StoreUpdate, Subscription};
use crate::model::StorePath;

/// In-memory [`LiveStore`]. Cheaply cloneable; clones share one tree.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    tree: Mutex<Value>,
    subscribers: Mutex<Vec<Subscriber>>,
    writes: Mutex<Vec<(StorePath, Value)>>,
    failing: Mutex<Vec<StorePath>>,
}

struct Subscriber {
    path: StorePath,
    tx: mpsc::UnboundedSender<StoreUpdate>,
    cancel: CancellationToken,
    last: Option<Value>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing tree.
    pub fn with_data(data: Value) -> Self {
        let store = Self::default();
        *lock(&store.inner.tree) = data;
        store
    }

    /// Current value at `path`.
    pub fn get(&self, path: impl Into<StorePath>) -> Option<Value> {
        value_at(&lock(&self.inner.tree), &path.into())
    }

    /// Write as an outside party (device firmware, heartbeat source).
    /// Not recorded in [`writes`](Self::writes).
    pub fn set(&self, path: impl Into<StorePath>, value: Value) {
        self.apply(&path.into(), value);
    }

    /// Every write made through the `LiveStore` interface, in order.
    pub fn writes(&self) -> Vec<(StorePath, Value)> {
        lock(&self.inner.writes).clone()
    }

    /// Recorded writes under `prefix`.
    pub fn writes_under(&self, prefix: impl Into<StorePath>) -> Vec<(StorePath, Value)> {
        let prefix = prefix.into();
        lock(&self.inner.writes)
            .iter()
            .filter(|(p, _)| prefix.contains(p))
            .cloned()
            .collect()
    }

    pub fn clear_writes(&self) {
        lock(&self.inner.writes).clear();
    }

    /// Make every subsequent write at or below `path` fail.
    pub fn fail_writes_under(&self, path: impl Into<StorePath>) {
        lock(&self.inner.failing).push(path.into());
    }

    /// Stop injecting write failures.
    pub fn heal(&self) {
        lock(&self.inner.failing).clear();
    }

    /// Number of live subscriptions at or below `path`.
    pub fn subscriber_count(&self, path: impl Into<StorePath>) -> usize {
        let path = path.into();
        let mut subs = lock(&self.inner.subscribers);
        subs.retain(|s| !s.cancel.is_cancelled() && !s.tx.is_closed());
        subs.iter().filter(|s| path.contains(&s.path)).count()
    }

    fn apply(&self, path: &StorePath, value: Value) {
        let tree = {
            let mut tree = lock(&self.inner.tree);
            let segs: Vec<&str> = path.segments().collect();
            put_at(&mut tree, &segs, value);
            tree.clone()
        };

        let mut subs = lock(&self.inner.subscribers);
        subs.retain(|s| !s.cancel.is_cancelled() && !s.tx.is_closed());
        for sub in subs.iter_mut().filter(|s| s.path.overlaps(path)) {
            let current = value_at(&tree, &sub.path);
            if current != sub.last {
                trace!(path = %sub.path, "notify subscriber");
                sub.last.clone_from(&current);
                let _ = sub.tx.send(Ok(current));
            }
        }
    }
}

impl LiveStore for MemoryStore {
    fn read<'a>(&'a self, path: &'a StorePath) -> BoxFuture<'a, StoreUpdate> {
        let value = self.get(path.clone());
        async move { Ok(value) }.boxed()
    }

    fn write<'a>(
        &'a self,
        path: &'a StorePath,
        value: Value,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        let failing = lock(&self.inner.failing).iter().any(|p| p.contains(path));
        let result = if failing {
            Err(StoreError::Unavailable {
                message: format!("write to {path} failed"),
            })
        } else {
            lock(&self.inner.writes).push((path.clone(), value.clone()));
            self.apply(path, value);
            Ok(())
        };
        async move { result }.boxed()
    }

    fn subscribe(&self, path: &StorePath) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let mut subs = lock(&self.inner.subscribers);
        let current = self.get(path.clone());
        let _ = tx.send(Ok(current.clone()));
        subs.push(Subscriber {
            path: path.clone(),
            tx,
            cancel: cancel.clone(),
            last: current,
        });
        Subscription::new(path.clone(), rx, cancel)
    }
}

// ── Tree helpers ─────────────────────────────────────────────────────

fn value_at(tree: &Value, path: &StorePath) -> Option<Value> {
    let mut node = tree;
    for seg in path.segments() {
        node = node.get(seg)?;
    }
    (!node.is_null()).then(|| node.clone())
}

fn put_at(node: &mut Value, segs: &[&str], data: Value) {
    let Some((head, rest)) = segs.split_first() else {
        *node = data;
        return;
    };
    if !node.is_object() {
        if data.is_null() {
            return;
        }
        *node = Value::Object(Map::new());
    }
    let Value::Object(map) = node else {
        return;
    };
    let child = map.entry((*head).to_owned()).or_insert(Value::Null);
    put_at(child, rest, data);
    if child.is_null() || child.as_object().is_some_and(Map::is_empty) {
        map.remove(*head);
    }
    if map.is_empty() {
        *node = Value::Null;
    }
}
