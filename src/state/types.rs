//! State types for tracking partition progress
//!
//! A partition's state is never stored on its own: it is always derived
//! from the offset pair by [`compute_state`].

use crate::types::Offset;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Flow state of a partition relative to the synchronizing group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PartitionState {
    /// No remote progress observed yet
    Unknown,
    /// Local offset trails the remote commit; consumption may continue
    LocalBehind,
    /// Local offset equals the remote commit
    Synchronized,
    /// Local offset is ahead of the last known remote commit
    RemoteBehind,
}

impl PartitionState {
    /// Whether a partition in this state must be paused
    pub fn should_pause(self) -> bool {
        !matches!(self, Self::LocalBehind)
    }

    /// Stable name used in logs
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::LocalBehind => "LOCAL_BEHIND",
            Self::Synchronized => "SYNCHRONIZED",
            Self::RemoteBehind => "REMOTE_BEHIND",
        }
    }
}

impl fmt::Display for PartitionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compute the state of a partition from its local and remote offsets
pub fn compute_state(local: Offset, remote: Option<Offset>) -> PartitionState {
    let Some(remote) = remote else {
        return PartitionState::Unknown;
    };

    match local.cmp(&remote) {
        Ordering::Less => PartitionState::LocalBehind,
        Ordering::Equal => PartitionState::Synchronized,
        Ordering::Greater => PartitionState::RemoteBehind,
    }
}

/// Local and remote offsets of one partition
///
/// Both offsets are next-offset-to-read values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetPair {
    /// Next offset this consumer expects to read
    pub local: Option<Offset>,
    /// Next offset the synchronizing group will read, from the commit log
    pub remote: Option<Offset>,
}

impl OffsetPair {
    /// Create an offset pair
    pub fn new(local: Option<Offset>, remote: Option<Offset>) -> Self {
        Self { local, remote }
    }

    /// State of this pair; `None` while the partition is not tracked locally
    pub fn state(&self) -> Option<PartitionState> {
        self.local.map(|local| compute_state(local, self.remote))
    }
}

/// State and offsets of a partition at one point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionSnapshot {
    /// Computed state
    pub state: PartitionState,
    /// Offsets the state was computed from
    pub offsets: OffsetPair,
}

impl PartitionSnapshot {
    /// Local offset of the snapshot
    pub fn local(&self) -> Option<Offset> {
        self.offsets.local
    }

    /// Remote offset of the snapshot
    pub fn remote(&self) -> Option<Offset> {
        self.offsets.remote
    }
}
