// ── Realtime database adapter ──
//
// `LiveStore` on top of `domus_api::RtdbClient`. Subscriptions ride the
// client's reconnecting event stream; stream errors are forwarded as
// `Err` items and the stream keeps reconnecting underneath.

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use domus_api::{ReconnectConfig, RtdbClient, WatchEvent};

use super::{LiveStore, StoreError, StoreUpdate, Subscription};
use crate::model::StorePath;

/// [`LiveStore`] backed by the hosted realtime database.
#[derive(Clone)]
pub struct RtdbStore {
    client: RtdbClient,
    reconnect: ReconnectConfig,
}

impl RtdbStore {
    pub fn new(client: RtdbClient) -> Self {
        Self {
            client,
            reconnect: ReconnectConfig::default(),
        }
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    pub fn client(&self) -> &RtdbClient {
        &self.client
    }
}

impl LiveStore for RtdbStore {
    fn read<'a>(&'a self, path: &'a StorePath) -> BoxFuture<'a, StoreUpdate> {
        async move { self.client.get(path.as_str()).await.map_err(StoreError::from) }.boxed()
    }

    fn write<'a>(
        &'a self,
        path: &'a StorePath,
        value: Value,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        async move {
            self.client
                .put(path.as_str(), &value)
                .await
                .map_err(StoreError::from)
        }
        .boxed()
    }

    fn subscribe(&self, path: &StorePath) -> Subscription {
        let cancel = CancellationToken::new();
        let mut events = self
            .client
            .watch(path.as_str(), self.reconnect.clone(), cancel.clone());
        let (tx, rx) = mpsc::unbounded_channel();

        let forward_cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    biased;
                    () = forward_cancel.cancelled() => break,
                    event = events.recv() => event,
                };
                let Some(event) = event else { break };
                let item = match event {
                    WatchEvent::Value(value) => Ok(value),
                    WatchEvent::Error(e) => Err(StoreError::from(e)),
                };
                if tx.send(item).is_err() {
                    break;
                }
            }
        });

        Subscription::new(path.clone(), rx, cancel)
    }
}
