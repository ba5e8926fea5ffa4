//! Broker client abstraction
//!
//! The synchronized consumer drives two clients through [`BrokerClient`]:
//! one subscribed to the primary topics and one to the commit log.
//!
//! # Implementations
//!
//! - `KafkaClient` - rdkafka `StreamConsumer` with a rebalance-recording context
//! - `MemoryClient` - scripted in-memory client that never blocks

mod kafka;
mod memory;

pub use kafka::{KafkaClient, RebalanceContext};
pub use memory::{ClientCall, MemoryClient};

use crate::error::Result;
use crate::types::{ConsumedMessage, Offset, PartitionKey};
use async_trait::async_trait;
use std::time::Duration;

/// A partition handed to a client by a rebalance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignedPartition {
    /// Assigned partition
    pub key: PartitionKey,
    /// Explicit start offset, if the assignment carried one
    pub offset: Option<Offset>,
}

impl AssignedPartition {
    /// Create an assignment without an explicit offset
    pub fn new(topic: impl Into<String>, partition: i32) -> Self {
        Self {
            key: PartitionKey::new(topic, partition),
            offset: None,
        }
    }

    /// Set an explicit start offset
    #[must_use]
    pub fn at(mut self, offset: Offset) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// Something a client surfaced while polling
///
/// Rebalance events are delivered before any message fetched after them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// A record
    Message(ConsumedMessage),
    /// Partitions were assigned to the client
    Assigned(Vec<AssignedPartition>),
    /// Partitions were taken away from the client
    Revoked(Vec<PartitionKey>),
}

/// Whether a commit waits for the broker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommitMode {
    /// Block until the broker acknowledges the commit
    #[default]
    Sync,
    /// Return immediately
    Async,
}

/// Offsets to commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitRequest {
    /// Every offset stored by the client so far
    ConsumerState,
    /// Explicit next-offset-to-read values
    Offsets(Vec<(PartitionKey, Offset)>),
}

/// Operations the synchronized consumer needs from a broker client
#[async_trait]
pub trait BrokerClient: Send {
    /// Name used in logs and errors
    fn name(&self) -> &str;

    /// Wait up to `timeout` for the next event
    async fn poll(&mut self, timeout: Duration) -> Result<Option<ClientEvent>>;

    /// Stop fetching a partition
    fn pause(&mut self, key: &PartitionKey, offset: Offset) -> Result<()>;

    /// Resume fetching a partition
    fn resume(&mut self, key: &PartitionKey, offset: Offset) -> Result<()>;

    /// Move the given partitions back to the beginning of their topic
    fn rewind(&mut self, partitions: &[PartitionKey]) -> Result<()>;

    /// Offset committed by this client's group for a partition
    fn committed_offset(&mut self, key: &PartitionKey) -> Result<Option<Offset>>;

    /// Lowest offset still available for a partition
    fn low_watermark(&mut self, key: &PartitionKey) -> Result<Offset>;

    /// Commit offsets
    fn commit(&mut self, request: &CommitRequest, mode: CommitMode) -> Result<()>;

    /// Leave the group; no offsets are committed
    fn close(&mut self) -> Result<()>;
}
