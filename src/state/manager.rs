//! Partition state manager implementation
//!
//! Owns the offset pair of every known partition and notifies its listener
//! exactly when the computed state of a partition changes.

use super::listener::PartitionStateListener;
use super::types::{OffsetPair, PartitionSnapshot, PartitionState};
use crate::error::{Error, Result};
use crate::types::{Offset, PartitionKey};
use std::collections::HashMap;
use tracing::trace;

/// Offsets of one partition plus the last state reported to the listener
#[derive(Debug, Clone, Copy, Default)]
struct TrackedPartition {
    offsets: OffsetPair,
    /// `None` until the partition has a local offset
    reported: Option<PartitionState>,
}

impl TrackedPartition {
    fn snapshot(&self) -> Option<PartitionSnapshot> {
        self.reported.map(|state| PartitionSnapshot {
            state,
            offsets: self.offsets,
        })
    }
}

/// Map of tracked partitions driving a [`PartitionStateListener`]
///
/// The manager holds no locks: it is owned by a single poll loop and all
/// mutation happens there.
#[derive(Debug)]
pub struct PartitionStateManager<L> {
    partitions: HashMap<PartitionKey, TrackedPartition>,
    listener: L,
}

impl<L: PartitionStateListener> PartitionStateManager<L> {
    /// Create a manager reporting to `listener`
    pub fn new(listener: L) -> Self {
        Self {
            partitions: HashMap::new(),
            listener,
        }
    }

    /// Set the next offset this consumer expects to read
    pub fn set_local_offset(&mut self, topic: &str, partition: i32, offset: Offset) {
        self.update(PartitionKey::new(topic, partition), |offsets| {
            offsets.local = Some(offset);
        });
    }

    /// Set the next offset the synchronizing group will read
    pub fn set_remote_offset(&mut self, topic: &str, partition: i32, offset: Offset) {
        self.update(PartitionKey::new(topic, partition), |offsets| {
            offsets.remote = Some(offset);
        });
    }

    /// Check that a delivered message is the one this partition expects next.
    ///
    /// Never mutates state. Partitions without a local offset are accepted.
    pub fn validate_local_message(&self, topic: &str, partition: i32, offset: Offset) -> Result<()> {
        let expected = self
            .partitions
            .get(&PartitionKey::new(topic, partition))
            .and_then(|p| p.offsets.local);

        match expected {
            Some(expected) if expected != offset => {
                Err(Error::offset_validation(topic, partition, expected, offset))
            }
            _ => Ok(()),
        }
    }

    /// Forget the local tracking of a partition.
    ///
    /// Used on revocation and before reseeding a reassigned partition. The
    /// remote offset is kept; the next local update is reported as a fresh
    /// transition. Returns the snapshot that was dropped, if any.
    pub fn reset_partition(&mut self, topic: &str, partition: i32) -> Option<PartitionSnapshot> {
        let key = PartitionKey::new(topic, partition);
        let tracked = self.partitions.get_mut(&key)?;
        let previous = tracked.snapshot();

        tracked.offsets.local = None;
        tracked.reported = None;
        if tracked.offsets.remote.is_none() {
            self.partitions.remove(&key);
        }

        previous
    }

    /// Current snapshot of a locally tracked partition
    pub fn snapshot(&self, topic: &str, partition: i32) -> Option<PartitionSnapshot> {
        self.partitions
            .get(&PartitionKey::new(topic, partition))?
            .snapshot()
    }

    /// Current state of a locally tracked partition
    pub fn state(&self, topic: &str, partition: i32) -> Option<PartitionState> {
        self.snapshot(topic, partition).map(|s| s.state)
    }

    /// Offsets known for a partition, tracked locally or not
    pub fn offsets(&self, topic: &str, partition: i32) -> Option<OffsetPair> {
        self.partitions
            .get(&PartitionKey::new(topic, partition))
            .map(|p| p.offsets)
    }

    /// Partitions with a local offset, sorted by key
    pub fn tracked_partitions(&self) -> Vec<(PartitionKey, PartitionSnapshot)> {
        let mut tracked: Vec<_> = self
            .partitions
            .iter()
            .filter_map(|(key, p)| p.snapshot().map(|s| (key.clone(), s)))
            .collect();
        tracked.sort_by(|a, b| a.0.cmp(&b.0));
        tracked
    }

    /// Number of known partitions, including remote-only entries
    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    /// Check if no partition is known
    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    /// Drop every partition without notifying the listener
    pub fn clear(&mut self) {
        self.partitions.clear();
    }

    /// Get the listener
    pub fn listener(&self) -> &L {
        &self.listener
    }

    /// Get mutable listener
    pub fn listener_mut(&mut self) -> &mut L {
        &mut self.listener
    }

    fn update(&mut self, key: PartitionKey, apply: impl FnOnce(&mut OffsetPair)) {
        let tracked = self.partitions.entry(key.clone()).or_default();
        let previous = tracked.snapshot();

        apply(&mut tracked.offsets);
        let current = tracked.offsets.state();
        if current == tracked.reported {
            return;
        }
        tracked.reported = current;

        // Remote-only partitions have no state to report.
        let Some(current) = tracked.snapshot() else {
            trace!(partition = %key, "offsets updated for untracked partition");
            return;
        };

        self.listener
            .on_state_change(&key.topic, key.partition, previous.as_ref(), &current);
    }
}
