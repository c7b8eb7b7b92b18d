//! Snapshot replication.
//!
//! The authoritative session is the only writer. After each committed change
//! it publishes a full [`Snapshot`] to every subscriber; replicas replace
//! their state wholesale and never mutate it themselves.
//!
//! Channels are unbounded so the newest snapshot is never dropped. Replicas
//! ignore snapshots older than the one they already hold.

use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use workbench_common::SchemaVersion;

use crate::grid::GridState;
use crate::history::HistoryCache;

/// Full replicated state after one committed change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Snapshot schema version
    pub version: SchemaVersion,
    /// Monotonic revision, starting at 1
    pub revision: u64,
    /// Grid state including the derived output
    pub grid: GridState,
    /// History entries, selection and stash
    pub history: HistoryCache,
}

/// Fan-out of snapshots to subscribers.
#[derive(Debug, Default)]
pub struct SnapshotPublisher {
    subscribers: Vec<Sender<Snapshot>>,
    revision: u64,
}

impl SnapshotPublisher {
    /// Create a publisher with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new replica.
    pub fn subscribe(&mut self) -> WorkbenchMirror {
        let (sender, receiver) = unbounded();
        self.subscribers.push(sender);
        debug!("Replica subscribed ({} total)", self.subscribers.len());
        WorkbenchMirror::new(receiver)
    }

    /// Publish the current state. Disconnected subscribers are dropped.
    pub fn publish(&mut self, grid: &GridState, history: &HistoryCache) -> u64 {
        self.revision += 1;
        let snapshot = Snapshot {
            version: SchemaVersion::SNAPSHOT,
            revision: self.revision,
            grid: grid.clone(),
            history: history.clone(),
        };
        self.subscribers
            .retain(|sender| sender.send(snapshot.clone()).is_ok());
        trace!(
            "Published revision {} to {} replicas",
            self.revision,
            self.subscribers.len()
        );
        self.revision
    }

    /// Revision of the last published snapshot.
    #[must_use]
    pub const fn revision(&self) -> u64 {
        self.revision
    }

    /// Number of connected subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

/// Read-only replica fed by a [`SnapshotPublisher`].
#[derive(Debug)]
pub struct WorkbenchMirror {
    receiver: Receiver<Snapshot>,
    latest: Option<Snapshot>,
}

impl WorkbenchMirror {
    fn new(receiver: Receiver<Snapshot>) -> Self {
        Self {
            receiver,
            latest: None,
        }
    }

    /// Drain pending snapshots, keeping the newest.
    ///
    /// Returns true if the held state changed.
    pub fn sync(&mut self) -> bool {
        let mut updated = false;
        while let Ok(snapshot) = self.receiver.try_recv() {
            if snapshot.revision > self.revision() {
                self.latest = Some(snapshot);
                updated = true;
            }
        }
        updated
    }

    /// Latest snapshot received.
    #[must_use]
    pub fn latest(&self) -> Option<&Snapshot> {
        self.latest.as_ref()
    }

    /// Revision of the held snapshot (0 before the first one).
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.latest.as_ref().map_or(0, |s| s.revision)
    }

    /// Replicated grid.
    #[must_use]
    pub fn grid(&self) -> Option<&GridState> {
        self.latest.as_ref().map(|s| &s.grid)
    }

    /// Replicated history.
    #[must_use]
    pub fn history(&self) -> Option<&HistoryCache> {
        self.latest.as_ref().map(|s| &s.history)
    }
}

/// Latest snapshot shared between threads.
#[derive(Debug, Clone, Default)]
pub struct SharedMirror {
    inner: Arc<RwLock<Option<Snapshot>>>,
}

impl SharedMirror {
    /// Create an empty shared mirror.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the held snapshot unless `snapshot` is stale.
    pub fn apply(&self, snapshot: Snapshot) -> bool {
        let mut guard = self.inner.write();
        let current = guard.as_ref().map_or(0, |s| s.revision);
        if snapshot.revision <= current {
            return false;
        }
        *guard = Some(snapshot);
        true
    }

    /// Pull everything pending on `mirror` and share its newest snapshot.
    pub fn update_from(&self, mirror: &mut WorkbenchMirror) -> bool {
        mirror.sync();
        match mirror.latest() {
            Some(snapshot) => self.apply(snapshot.clone()),
            None => false,
        }
    }

    /// Copy of the held snapshot.
    #[must_use]
    pub fn latest(&self) -> Option<Snapshot> {
        self.inner.read().clone()
    }

    /// Revision of the held snapshot (0 before the first one).
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.inner.read().as_ref().map_or(0, |s| s.revision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_reaches_all_subscribers() {
        let mut publisher = SnapshotPublisher::new();
        let mut a = publisher.subscribe();
        let mut b = publisher.subscribe();

        publisher.publish(&GridState::new(), &HistoryCache::new(4));
        assert!(a.sync());
        assert!(b.sync());
        assert_eq!(a.revision(), 1);
        assert_eq!(b.history().map(HistoryCache::capacity), Some(4));
    }

    #[test]
    fn test_mirror_keeps_newest() {
        let mut publisher = SnapshotPublisher::new();
        let mut mirror = publisher.subscribe();
        publisher.publish(&GridState::new(), &HistoryCache::new(1));
        publisher.publish(&GridState::new(), &HistoryCache::new(2));
        assert!(mirror.sync());
        assert_eq!(mirror.revision(), 2);
        assert_eq!(mirror.history().map(HistoryCache::capacity), Some(2));
        assert!(!mirror.sync());
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let mut publisher = SnapshotPublisher::new();
        let mirror = publisher.subscribe();
        drop(mirror);
        publisher.publish(&GridState::new(), &HistoryCache::default());
        assert_eq!(publisher.subscriber_count(), 0);
    }

    #[test]
    fn test_shared_mirror_ignores_stale() {
        let mut publisher = SnapshotPublisher::new();
        let mut mirror = publisher.subscribe();
        let shared = SharedMirror::new();

        publisher.publish(&GridState::new(), &HistoryCache::new(3));
        assert!(shared.update_from(&mut mirror));
        let snapshot = shared.latest().expect("snapshot");
        assert!(!shared.apply(snapshot));
        assert_eq!(shared.revision(), 1);

        let reader = shared.clone();
        let handle = std::thread::spawn(move || reader.revision());
        assert_eq!(handle.join().expect("thread"), 1);
    }
}
