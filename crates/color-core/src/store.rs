//! Latest-sample register.
//!
//! [`SampleStore`] holds the single most recent [`ColorSample`] (or nothing, before the
//! first frame). It is built on `tokio::sync::watch`, so a write is one atomic replace and
//! every read clones a complete sample out from under the lock. A reader that falls behind
//! simply observes the newest value; there is no queue.
//!
//! Ownership expresses the single-writer rule: only the owner of the [`SampleStore`] can
//! write, and the store is not `Clone`. Everyone else gets a [`SampleReader`].
//!
//! ```rust,ignore
//! let mut store = SampleStore::new();
//! let reader = store.reader();
//!
//! store.write(sample);
//! assert_eq!(reader.read(), Some(sample));
//! ```

use crate::sample::ColorSample;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// Single-writer latest-value register.
#[derive(Debug)]
pub struct SampleStore {
    tx: watch::Sender<Option<ColorSample>>,
    writes: Arc<AtomicU64>,
}

impl SampleStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self {
            tx,
            writes: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Replace the current sample.
    ///
    /// Never blocks on readers and succeeds even when nobody is subscribed.
    pub fn write(&mut self, sample: ColorSample) {
        self.tx.send_replace(Some(sample));
        self.writes.fetch_add(1, Ordering::Release);
    }

    /// Last written sample, or `None` if nothing has been written yet.
    #[must_use]
    pub fn read(&self) -> Option<ColorSample> {
        *self.tx.borrow()
    }

    /// Number of writes so far.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.writes.load(Ordering::Acquire)
    }

    /// Read-only handle for another task or thread.
    #[must_use]
    pub fn reader(&self) -> SampleReader {
        SampleReader {
            rx: self.tx.subscribe(),
            writes: Arc::clone(&self.writes),
        }
    }

    /// Raw change-notification receiver.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<ColorSample>> {
        self.tx.subscribe()
    }
}

impl Default for SampleStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only view of a [`SampleStore`].
///
/// Cheap to clone; keeps working after the store itself is dropped and then keeps
/// returning the last value written.
#[derive(Debug, Clone)]
pub struct SampleReader {
    rx: watch::Receiver<Option<ColorSample>>,
    writes: Arc<AtomicU64>,
}

impl SampleReader {
    /// Latest sample, or `None` if nothing has been written yet.
    #[must_use]
    pub fn read(&self) -> Option<ColorSample> {
        *self.rx.borrow()
    }

    /// Number of writes the store has seen.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.writes.load(Ordering::Acquire)
    }

    /// Wait until a sample newer than the last one seen by this reader is written.
    ///
    /// Returns `None` once the store has been dropped.
    pub async fn changed(&mut self) -> Option<ColorSample> {
        self.rx.changed().await.ok()?;
        *self.rx.borrow_and_update()
    }
}
