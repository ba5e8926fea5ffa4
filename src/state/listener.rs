//! State change observers
//!
//! The manager reports transitions through [`PartitionStateListener`]; the
//! consumer registers a [`FlowController`] which queues the matching
//! pause/resume actions for the main client.

use super::types::{PartitionSnapshot, PartitionState};
use crate::types::{Offset, PartitionKey};
use std::collections::VecDeque;
use tracing::info;

/// Observer notified whenever the computed state of a partition changes
pub trait PartitionStateListener {
    /// Called once per transition.
    ///
    /// `previous` is `None` when the partition was not tracked locally before
    /// this update.
    fn on_state_change(
        &mut self,
        topic: &str,
        partition: i32,
        previous: Option<&PartitionSnapshot>,
        current: &PartitionSnapshot,
    );
}

/// Broker-level flow control requested for a partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowAction {
    /// Stop fetching the partition
    Pause {
        /// Partition to pause
        key: PartitionKey,
        /// Local offset at the time of the transition
        offset: Offset,
    },
    /// Start fetching the partition again
    Resume {
        /// Partition to resume
        key: PartitionKey,
        /// Local offset at the time of the transition
        offset: Offset,
    },
}

impl FlowAction {
    /// Action required when a partition enters `state`
    pub fn for_state(state: PartitionState, key: PartitionKey, offset: Offset) -> Self {
        if state.should_pause() {
            Self::Pause { key, offset }
        } else {
            Self::Resume { key, offset }
        }
    }

    /// Partition the action applies to
    pub fn key(&self) -> &PartitionKey {
        match self {
            Self::Pause { key, .. } | Self::Resume { key, .. } => key,
        }
    }

    /// Check if this is a pause action
    pub fn is_pause(&self) -> bool {
        matches!(self, Self::Pause { .. })
    }
}

/// Listener that maps state transitions to pending pause/resume actions
#[derive(Debug, Default)]
pub struct FlowController {
    pending: VecDeque<FlowAction>,
}

impl FlowController {
    /// Create a new flow controller
    pub fn new() -> Self {
        Self::default()
    }

    /// Take all actions queued since the last drain, in transition order
    pub fn drain(&mut self) -> Vec<FlowAction> {
        self.pending.drain(..).collect()
    }

    /// Number of queued actions
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

impl PartitionStateListener for FlowController {
    fn on_state_change(
        &mut self,
        topic: &str,
        partition: i32,
        previous: Option<&PartitionSnapshot>,
        current: &PartitionSnapshot,
    ) {
        info!(
            topic,
            partition,
            previous = previous.map_or("UNTRACKED", |p| p.state.as_str()),
            current = current.state.as_str(),
            local = ?current.local(),
            remote = ?current.remote(),
            "partition state changed"
        );

        // Only partitions assigned to the main client have a local offset.
        let Some(offset) = current.local() else {
            return;
        };

        self.pending.push_back(FlowAction::for_state(
            current.state,
            PartitionKey::new(topic, partition),
            offset,
        ));
    }
}
