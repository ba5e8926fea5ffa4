//! Consumer types
//!
//! Handler trait, commit passthrough and statistics for the synchronized
//! consumer.

use crate::client::{BrokerClient, CommitMode, CommitRequest};
use crate::error::Result;
use crate::types::ConsumedMessage;
use async_trait::async_trait;
use serde::Serialize;

/// Business logic applied to every primary-topic message
///
/// An error returned from `handle` stops the consumer; the message's offset
/// is not advanced.
#[async_trait]
pub trait MessageHandler: Send {
    /// Process one message
    async fn handle(&mut self, message: &ConsumedMessage, committer: &mut Committer<'_>)
        -> Result<()>;
}

/// Commit passthrough to the main client, handed to [`MessageHandler::handle`]
pub struct Committer<'a> {
    client: &'a mut dyn BrokerClient,
}

impl<'a> Committer<'a> {
    /// Wrap a client
    pub fn new(client: &'a mut dyn BrokerClient) -> Self {
        Self { client }
    }

    /// Forward a commit request to the main client
    pub fn commit(&mut self, request: &CommitRequest, mode: CommitMode) -> Result<()> {
        self.client.commit(request, mode)
    }

    /// Commit every offset stored by the main client
    pub fn commit_state(&mut self, mode: CommitMode) -> Result<()> {
        self.commit(&CommitRequest::ConsumerState, mode)
    }

    /// Commit the position after `message`
    pub fn commit_message(&mut self, message: &ConsumedMessage, mode: CommitMode) -> Result<()> {
        self.commit(
            &CommitRequest::Offsets(vec![(message.partition_key(), message.offset + 1)]),
            mode,
        )
    }
}

/// Counters for a running consumer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConsumerStats {
    /// Primary-topic messages handled successfully
    pub messages_handled: u64,
    /// Primary-topic messages withheld from the handler (untracked or paused partition)
    pub messages_skipped: u64,
    /// Commit log records applied as remote offsets
    pub commit_log_applied: u64,
    /// Commit log records of other groups
    pub commit_log_ignored: u64,
    /// Undecodable commit log records
    pub commit_log_dropped: u64,
    /// Pause calls issued to the main client
    pub pauses: u64,
    /// Resume calls issued to the main client
    pub resumes: u64,
    /// Partitions assigned to the main client
    pub partitions_assigned: u64,
    /// Partitions revoked from the main client
    pub partitions_revoked: u64,
    /// Commit log rewinds after assignment
    pub commit_log_rewinds: u64,
    /// Loop iterations where neither client had anything
    pub idle_polls: u64,
}

impl ConsumerStats {
    /// Create new stats
    pub fn new() -> Self {
        Self::default()
    }
}
