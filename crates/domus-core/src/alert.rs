// ── User-facing alerts ──
//
// Every alert is broadcast to listeners. Offline alerts additionally
// occupy the persistent banner until the devices come back.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::Display;
use tokio::sync::{broadcast, watch};
use tracing::{info, warn};

use crate::model::DeviceId;

const ALERT_CHANNEL_SIZE: usize = 64;

/// What went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AlertKind {
    /// A store read or write failed.
    Transport,
    /// A command was not confirmed within the pending timeout.
    Unconfirmed,
    /// No heartbeat within the staleness threshold.
    Offline,
    /// Sign-in or sign-out failed.
    Auth,
}

/// One alert, as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub device: Option<DeviceId>,
    pub message: String,
    pub raised_at: DateTime<Utc>,
}

impl Alert {
    pub fn new(kind: AlertKind, device: Option<DeviceId>, message: impl Into<String>) -> Self {
        Self {
            kind,
            device,
            message: message.into(),
            raised_at: Utc::now(),
        }
    }
}

/// Fan-out point for alerts. Cheaply cloneable.
#[derive(Clone)]
pub struct AlertBus {
    inner: Arc<AlertBusInner>,
}

struct AlertBusInner {
    tx: broadcast::Sender<Alert>,
    banner: watch::Sender<Option<Alert>>,
}

impl Default for AlertBus {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(ALERT_CHANNEL_SIZE);
        let (banner, _) = watch::channel(None);
        Self {
            inner: Arc::new(AlertBusInner { tx, banner }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Alert> {
        self.inner.tx.subscribe()
    }

    pub fn banner(&self) -> watch::Receiver<Option<Alert>> {
        self.inner.banner.subscribe()
    }

    /// Broadcast a transient alert.
    pub fn raise(&self, alert: Alert) {
        warn!(kind = %alert.kind, device = ?alert.device, "{}", alert.message);
        let _ = self.inner.tx.send(alert);
    }

    /// Broadcast the offline alert and pin it to the banner.
    pub fn raise_offline(&self, message: impl Into<String>) {
        let alert = Alert::new(AlertKind::Offline, None, message);
        self.inner.banner.send_replace(Some(alert.clone()));
        self.raise(alert);
    }

    /// Take the offline alert off the banner. Returns whether one was shown.
    pub fn clear_offline(&self) -> bool {
        let cleared = self.inner.banner.send_if_modified(|banner| banner.take().is_some());
        if cleared {
            info!("offline alert cleared");
        }
        cleared
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn offline_alert_holds_the_banner_until_cleared() {
        let bus = AlertBus::new();
        let mut rx = bus.subscribe();
        let banner = bus.banner();

        bus.raise_offline("Device offline (no heartbeat)");
        assert_eq!(rx.try_recv().unwrap().kind, AlertKind::Offline);
        assert_eq!(banner.borrow().as_ref().unwrap().kind, AlertKind::Offline);

        assert!(bus.clear_offline());
        assert!(banner.borrow().is_none());
        assert!(!bus.clear_offline());
    }

    #[test]
    fn transient_alerts_leave_the_banner_alone() {
        let bus = AlertBus::new();
        bus.raise(Alert::new(AlertKind::Unconfirmed, Some(DeviceId(2)), "Command not confirmed"));
        assert!(bus.banner().borrow().is_none());
    }
}
