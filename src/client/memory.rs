//! In-memory broker client
//!
//! Plays back scripted events and records every call made against it.
//! Messages of paused partitions stay queued until the partition is resumed,
//! the same way a broker stops fetching a paused partition.

use super::{AssignedPartition, BrokerClient, ClientEvent, CommitMode, CommitRequest};
use crate::error::{Error, Result};
use crate::types::{ConsumedMessage, Offset, PartitionKey};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::time::Duration;

/// A call made against a [`MemoryClient`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCall {
    /// `pause()`
    Pause(PartitionKey, Offset),
    /// `resume()`
    Resume(PartitionKey, Offset),
    /// `rewind()`
    Rewind(Vec<PartitionKey>),
    /// `commit()`
    Commit(CommitRequest, CommitMode),
    /// `close()`
    Close,
}

/// Scripted broker client that never blocks
#[derive(Debug, Default)]
pub struct MemoryClient {
    name: String,
    events: VecDeque<ClientEvent>,
    paused: BTreeSet<PartitionKey>,
    committed: HashMap<PartitionKey, Offset>,
    low_watermarks: HashMap<PartitionKey, Offset>,
    calls: Vec<ClientCall>,
    closed: bool,
}

impl MemoryClient {
    /// Create an empty client
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Queue a message
    pub fn push_message(&mut self, message: ConsumedMessage) -> &mut Self {
        self.events.push_back(ClientEvent::Message(message));
        self
    }

    /// Queue a keyed record with a text payload
    pub fn push_record(
        &mut self,
        topic: &str,
        partition: i32,
        offset: Offset,
        key: &str,
        value: &str,
    ) -> &mut Self {
        self.push_message(
            ConsumedMessage::new(topic, partition, offset)
                .with_key(key.to_string())
                .with_payload(value.to_string()),
        )
    }

    /// Queue an assignment
    pub fn push_assignment(&mut self, partitions: Vec<AssignedPartition>) -> &mut Self {
        self.events.push_back(ClientEvent::Assigned(partitions));
        self
    }

    /// Queue a revocation
    pub fn push_revocation(&mut self, partitions: Vec<PartitionKey>) -> &mut Self {
        self.events.push_back(ClientEvent::Revoked(partitions));
        self
    }

    /// Set the committed offset reported for a partition
    pub fn set_committed(&mut self, key: PartitionKey, offset: Offset) -> &mut Self {
        self.committed.insert(key, offset);
        self
    }

    /// Set the low watermark reported for a partition
    pub fn set_low_watermark(&mut self, key: PartitionKey, offset: Offset) -> &mut Self {
        self.low_watermarks.insert(key, offset);
        self
    }

    /// Every call made so far, in order
    pub fn calls(&self) -> &[ClientCall] {
        &self.calls
    }

    /// Forget recorded calls
    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    /// Pause and resume calls only
    pub fn flow_calls(&self) -> Vec<ClientCall> {
        self.calls
            .iter()
            .filter(|c| matches!(c, ClientCall::Pause(..) | ClientCall::Resume(..)))
            .cloned()
            .collect()
    }

    /// Check if a partition is paused
    pub fn is_paused(&self, key: &PartitionKey) -> bool {
        self.paused.contains(key)
    }

    /// Currently paused partitions
    pub fn paused_partitions(&self) -> Vec<PartitionKey> {
        self.paused.iter().cloned().collect()
    }

    /// Number of events still queued, deliverable or not
    pub fn queued(&self) -> usize {
        self.events.len()
    }

    /// Check if `close()` was called
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn next_deliverable(&self) -> Option<usize> {
        self.events.iter().position(|event| match event {
            ClientEvent::Message(m) => !self.paused.contains(&m.partition_key()),
            _ => true,
        })
    }
}

#[async_trait]
impl BrokerClient for MemoryClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn poll(&mut self, _timeout: Duration) -> Result<Option<ClientEvent>> {
        if self.closed {
            return Err(Error::client(format!("{} is closed", self.name)));
        }

        let Some(index) = self.next_deliverable() else {
            return Ok(None);
        };
        Ok(self.events.remove(index))
    }

    fn pause(&mut self, key: &PartitionKey, offset: Offset) -> Result<()> {
        self.paused.insert(key.clone());
        self.calls.push(ClientCall::Pause(key.clone(), offset));
        Ok(())
    }

    fn resume(&mut self, key: &PartitionKey, offset: Offset) -> Result<()> {
        self.paused.remove(key);
        self.calls.push(ClientCall::Resume(key.clone(), offset));
        Ok(())
    }

    fn rewind(&mut self, partitions: &[PartitionKey]) -> Result<()> {
        self.calls.push(ClientCall::Rewind(partitions.to_vec()));
        Ok(())
    }

    fn committed_offset(&mut self, key: &PartitionKey) -> Result<Option<Offset>> {
        Ok(self.committed.get(key).copied())
    }

    fn low_watermark(&mut self, key: &PartitionKey) -> Result<Offset> {
        Ok(self.low_watermarks.get(key).copied().unwrap_or(0))
    }

    fn commit(&mut self, request: &CommitRequest, mode: CommitMode) -> Result<()> {
        if let CommitRequest::Offsets(offsets) = request {
            for (key, offset) in offsets {
                self.committed.insert(key.clone(), *offset);
            }
        }
        self.calls.push(ClientCall::Commit(request.clone(), mode));
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        self.calls.push(ClientCall::Close);
        Ok(())
    }
}
