//! Connectivity observation.
//!
//! The monitor wraps a `watch` channel over a single boolean: online or
//! not. Subscribers wake exactly once per actual transition - repeated
//! reports of the same state are dropped at the sender. The monitor never
//! fails; a misbehaving platform probe degrades to "assume online" so
//! saves are never blocked indefinitely by a broken signal source.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;

/// Error from an underlying platform connectivity probe.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("connectivity probe failed: {0}")]
pub struct ProbeError(pub String);

/// A source of raw online/offline readings (platform API, heartbeat ping).
pub trait ConnectivityProbe: Send + Sync {
    fn poll_online(&self) -> Result<bool, ProbeError>;
}

/// Observes online/offline transitions of the runtime environment.
#[derive(Debug)]
pub struct ConnectivityMonitor {
    tx: watch::Sender<bool>,
}

impl ConnectivityMonitor {
    /// Create a monitor with a known initial state.
    pub fn new(initially_online: bool) -> Self {
        let (tx, _) = watch::channel(initially_online);
        Self { tx }
    }

    /// Create a monitor wrapped in `Arc` for sharing.
    pub fn shared(initially_online: bool) -> Arc<Self> {
        Arc::new(Self::new(initially_online))
    }

    /// Current connectivity.
    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Report a connectivity reading.
    ///
    /// Subscribers are notified only when the state actually changes.
    pub fn set_online(&self, online: bool) {
        let changed = self.tx.send_if_modified(|state| {
            if *state == online {
                false
            } else {
                *state = online;
                true
            }
        });
        if changed {
            tracing::info!(online, "connectivity changed");
        }
    }

    /// Pull a fresh reading from a platform probe.
    ///
    /// A failing probe is logged and treated as online rather than
    /// blocking saves behind a broken signal source.
    pub fn refresh(&self, probe: &dyn ConnectivityProbe) {
        match probe.poll_online() {
            Ok(online) => self.set_online(online),
            Err(err) => {
                tracing::warn!(error = %err, "connectivity probe failed; assuming online");
                self.set_online(true);
            }
        }
    }

    /// Subscribe to connectivity transitions.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedProbe(Result<bool, ProbeError>);

    impl ConnectivityProbe for FixedProbe {
        fn poll_online(&self) -> Result<bool, ProbeError> {
            self.0.clone()
        }
    }

    #[tokio::test]
    async fn reports_initial_state() {
        let monitor = ConnectivityMonitor::new(true);
        assert!(monitor.is_online());

        let monitor = ConnectivityMonitor::new(false);
        assert!(!monitor.is_online());
    }

    #[tokio::test]
    async fn notifies_once_per_transition() {
        let monitor = ConnectivityMonitor::new(true);
        let mut rx = monitor.subscribe();

        // repeated identical reports must not wake the subscriber
        monitor.set_online(true);
        monitor.set_online(true);
        assert!(!rx.has_changed().unwrap());

        monitor.set_online(false);
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();

        monitor.set_online(false);
        assert!(!rx.has_changed().unwrap());

        monitor.set_online(true);
        assert!(rx.has_changed().unwrap());
        assert!(*rx.borrow_and_update());
    }

    #[tokio::test]
    async fn probe_readings_apply() {
        let monitor = ConnectivityMonitor::new(true);
        monitor.refresh(&FixedProbe(Ok(false)));
        assert!(!monitor.is_online());
    }

    #[tokio::test]
    async fn failing_probe_degrades_to_online() {
        let monitor = ConnectivityMonitor::new(false);
        monitor.refresh(&FixedProbe(Err(ProbeError("no such API".into()))));
        assert!(monitor.is_online());
    }
}
