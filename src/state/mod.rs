//! Partition state tracking
//!
//! Tracks the local and remote offsets of every partition and derives the
//! flow state that decides whether a partition may be consumed.
//!
//! # Overview
//!
//! The state module provides:
//! - `PartitionState` - The four-valued state computed from an offset pair
//! - `PartitionStateManager` - Owns the offset map and reports transitions
//! - `PartitionStateListener` - Observer notified exactly on state change
//! - `FlowController` - Listener that turns transitions into pause/resume actions

mod listener;
mod manager;
mod types;

pub use listener::{FlowAction, FlowController, PartitionStateListener};
pub use manager::PartitionStateManager;
pub use types::{compute_state, OffsetPair, PartitionSnapshot, PartitionState};
