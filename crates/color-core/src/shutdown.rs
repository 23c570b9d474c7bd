//! Cooperative stop signals.
//!
//! A [`StopHandle`] / [`StopSignal`] pair built on `watch<bool>`. The acquisition thread
//! polls [`StopSignal::is_stopped`] between frame attempts; async tasks await
//! [`StopSignal::stopped`] inside `select!`. Dropping the handle counts as a stop.

use std::sync::Arc;
use tokio::sync::watch;

/// Create a linked stop handle and signal.
#[must_use]
pub fn stop_channel() -> (StopHandle, StopSignal) {
    let (tx, rx) = watch::channel(false);
    (
        StopHandle { tx },
        StopSignal {
            rx,
            _keepalive: None,
        },
    )
}

/// Requests a stop.
#[derive(Debug)]
pub struct StopHandle {
    tx: watch::Sender<bool>,
}

impl StopHandle {
    /// Request every linked signal to stop. Idempotent.
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    /// Another signal linked to this handle.
    #[must_use]
    pub fn signal(&self) -> StopSignal {
        StopSignal {
            rx: self.tx.subscribe(),
            _keepalive: None,
        }
    }
}

/// Observes a stop request.
#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
    _keepalive: Option<Arc<watch::Sender<bool>>>,
}

impl StopSignal {
    /// A signal that never fires.
    ///
    /// Useful for bounded runs that only end by themselves.
    #[must_use]
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            rx,
            _keepalive: Some(Arc::new(tx)),
        }
    }

    /// True once a stop was requested or the handle was dropped.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Resolve once a stop is requested or the handle is dropped.
    pub async fn stopped(&mut self) {
        // wait_for returns Err only when the sender is gone, which also means stop
        let _ = self.rx.wait_for(|stopped| *stopped).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_stop_is_observed_synchronously() {
        let (handle, signal) = stop_channel();
        assert!(!signal.is_stopped());
        handle.stop();
        assert!(signal.is_stopped());
        handle.stop();
        assert!(signal.is_stopped());
    }

    #[test]
    fn test_dropped_handle_counts_as_stop() {
        let (handle, signal) = stop_channel();
        drop(handle);
        assert!(signal.is_stopped());
    }

    #[test]
    fn test_never_signal_stays_running() {
        let signal = StopSignal::never();
        assert!(!signal.is_stopped());
    }

    #[tokio::test]
    async fn test_stopped_resolves_after_stop() {
        let (handle, signal) = stop_channel();
        let mut waiter = signal.clone();
        let task = tokio::spawn(async move { waiter.stopped().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!task.is_finished());
        handle.stop();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
        assert!(signal.is_stopped());
    }

    #[tokio::test]
    async fn test_stopped_resolves_when_handle_dropped() {
        let (handle, mut signal) = stop_channel();
        drop(handle);
        tokio::time::timeout(Duration::from_secs(1), signal.stopped())
            .await
            .unwrap();
    }
}
