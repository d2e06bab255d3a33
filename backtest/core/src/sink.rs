//! Snapshot Sinks
//!
//! The session manager never stores snapshots itself. For every processed
//! event it hands the sink a [`SnapshotUpdate`]: a function from the
//! previous snapshot to the next one. The sink owns the storage and decides
//! how readers observe it.
//!
//! [`SnapshotStore`] is the default sink. It keeps the latest snapshot
//! behind a `tokio::sync::watch` channel, so readers always get an
//! immutable `Arc<ResultSnapshot>` and can await changes. The previous
//! snapshot is moved into the update when no reader holds it, and copied
//! otherwise.

use std::sync::Arc;

use tokio::sync::watch;

use crate::result::ResultSnapshot;

/// Function producing the next snapshot from the previous one
pub type SnapshotUpdate = Box<dyn FnOnce(Option<ResultSnapshot>) -> ResultSnapshot + Send>;

/// Receiver of snapshot updates
pub trait ResultSink: Send + Sync + 'static {
    /// Apply one update; called once per processed event, in arrival order
    fn apply(&self, update: SnapshotUpdate);
}

/// Latest-value snapshot storage backed by a watch channel
#[derive(Clone, Debug)]
pub struct SnapshotStore {
    tx: Arc<watch::Sender<Option<Arc<ResultSnapshot>>>>,
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotStore {
    /// Create an empty store (no run requested yet)
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Latest snapshot, if any event has been applied since the last reset
    #[must_use]
    pub fn latest(&self) -> Option<Arc<ResultSnapshot>> {
        self.tx.borrow().clone()
    }

    /// Subscribe to snapshot changes
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<Option<Arc<ResultSnapshot>>> {
        self.tx.subscribe()
    }

    /// Discard the current snapshot before an unrelated job starts
    pub fn reset(&self) {
        self.tx.send_replace(None);
    }
}

impl ResultSink for SnapshotStore {
    fn apply(&self, update: SnapshotUpdate) {
        self.tx.send_modify(|slot| {
            let prev = slot.take().map(Arc::unwrap_or_clone);
            *slot = Some(Arc::new(update(prev)));
        });
    }
}
