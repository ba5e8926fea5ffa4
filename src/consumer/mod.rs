//! Synchronized consumer
//!
//! Consumes the primary topics while pausing every partition that would
//! otherwise overtake the synchronizing group's committed progress.
//!
//! # Overview
//!
//! The consumer module provides:
//! - `SynchronizedConsumer` - Typestate lifecycle (`NotStarted` -> `Started`)
//! - `MessageHandler` - Business logic invoked per primary-topic message
//! - `Committer` - Explicit commit passthrough to the main client
//! - `ConsumerStats` - Counters for a running consumer
//!
//! # Poll loop
//!
//! Every iteration polls the main client, then the commit log client, each
//! with a bounded timeout, and processes one event from each to completion.
//! When neither yields anything the loop sleeps for the idle backoff. Flow
//! control is only expressed as broker-level pause/resume.

mod types;

pub use types::{Committer, ConsumerStats, MessageHandler};

use crate::client::{
    AssignedPartition, BrokerClient, ClientEvent, CommitMode, CommitRequest, KafkaClient,
};
use crate::commit_log::CommitLogEntry;
use crate::config::{new_instance_id, ConsumerConfig};
use crate::error::{Error, Result};
use crate::state::{FlowAction, FlowController, PartitionSnapshot, PartitionStateManager};
use crate::types::{ConsumedMessage, Offset, PartitionKey};
use std::future::Future;
use tracing::{debug, info, warn};

/// Name of the client consuming the primary topics
pub const MAIN_CLIENT: &str = "main";

/// Name of the client consuming the commit log
pub const COMMIT_LOG_CLIENT: &str = "commit-log";

/// Lifecycle state before any broker client exists
#[derive(Debug, Default)]
pub struct NotStarted;

/// Lifecycle state owning both broker clients and the partition states
pub struct Started<C> {
    main: C,
    commit_log: C,
    manager: PartitionStateManager<FlowController>,
    stats: ConsumerStats,
}

/// Consumer pacing the primary topics behind another group's commits
pub struct SynchronizedConsumer<S = NotStarted> {
    config: ConsumerConfig,
    instance_id: String,
    lifecycle: S,
}

impl<S> SynchronizedConsumer<S> {
    /// Get the configuration
    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    /// Identifier of this instance, part of its default commit log group
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }
}

impl SynchronizedConsumer<NotStarted> {
    /// Create a consumer from a validated configuration
    pub fn new(config: ConsumerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            instance_id: new_instance_id(),
            lifecycle: NotStarted,
        })
    }

    /// Create both Kafka clients and subscribe them
    pub fn start(self) -> Result<SynchronizedConsumer<Started<KafkaClient>>> {
        let timeout = self.config.poll.operation_timeout();

        let main = KafkaClient::new(
            MAIN_CLIENT,
            &self.config.main_client_properties(),
            timeout,
        )?;
        main.subscribe(&self.config.topics)?;

        let commit_log = KafkaClient::new(
            COMMIT_LOG_CLIENT,
            &self.config.commit_log_client_properties(&self.instance_id),
            timeout,
        )?;
        commit_log.subscribe(std::slice::from_ref(&self.config.commit_log_topic))?;

        Ok(self.start_with(main, commit_log))
    }

    /// Start with already subscribed clients
    pub fn start_with<C: BrokerClient>(self, main: C, commit_log: C) -> SynchronizedConsumer<Started<C>> {
        info!(
            topics = ?self.config.topics,
            consumer_group = %self.config.consumer_group,
            commit_log_topic = %self.config.commit_log_topic,
            synchronize_commit_group = %self.config.synchronize_commit_group,
            commit_log_group = %self.config.commit_log_group(&self.instance_id),
            "starting synchronized consumer"
        );

        SynchronizedConsumer {
            config: self.config,
            instance_id: self.instance_id,
            lifecycle: Started {
                main,
                commit_log,
                manager: PartitionStateManager::new(FlowController::new()),
                stats: ConsumerStats::new(),
            },
        }
    }
}

impl<C: BrokerClient> SynchronizedConsumer<Started<C>> {
    /// Run the poll loop until an error occurs
    pub async fn run<H: MessageHandler>(&mut self, handler: &mut H) -> Result<()> {
        loop {
            self.poll_once(handler).await?;
        }
    }

    /// Run the poll loop until `shutdown` resolves or an error occurs.
    ///
    /// Shutdown is checked between iterations; an iteration in progress,
    /// including its `handle()` call, always completes.
    pub async fn run_until<H, F>(&mut self, handler: &mut H, shutdown: F) -> Result<()>
    where
        H: MessageHandler,
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                biased;
                () = &mut shutdown => {
                    info!("shutdown requested, leaving poll loop");
                    return Ok(());
                }
                () = std::future::ready(()) => {}
            }
            self.poll_once(handler).await?;
        }
    }

    /// Run one scheduler iteration; returns whether any event was processed
    pub async fn poll_once<H: MessageHandler>(&mut self, handler: &mut H) -> Result<bool> {
        let mut progressed = false;

        let main_timeout = self.config.poll.main_timeout();
        if let Some(event) = self.lifecycle.main.poll(main_timeout).await? {
            self.on_main_event(event, handler).await?;
            progressed = true;
        }

        let commit_log_timeout = self.config.poll.commit_log_timeout();
        if let Some(event) = self.lifecycle.commit_log.poll(commit_log_timeout).await? {
            self.on_commit_log_event(event)?;
            progressed = true;
        }

        if !progressed {
            self.lifecycle.stats.idle_polls += 1;
            let backoff = self.config.poll.idle_backoff();
            if backoff.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(backoff).await;
            }
        }

        Ok(progressed)
    }

    /// Forward a commit to the main client
    pub fn commit(&mut self, request: &CommitRequest, mode: CommitMode) -> Result<()> {
        self.lifecycle.main.commit(request, mode)
    }

    /// Current snapshot of a partition tracked by the main client
    pub fn partition_state(&self, topic: &str, partition: i32) -> Option<PartitionSnapshot> {
        self.lifecycle.manager.snapshot(topic, partition)
    }

    /// Get the partition state manager
    pub fn manager(&self) -> &PartitionStateManager<FlowController> {
        &self.lifecycle.manager
    }

    /// Get statistics
    pub fn stats(&self) -> &ConsumerStats {
        &self.lifecycle.stats
    }

    /// Get the main client
    pub fn main_client(&self) -> &C {
        &self.lifecycle.main
    }

    /// Get the mutable main client
    pub fn main_client_mut(&mut self) -> &mut C {
        &mut self.lifecycle.main
    }

    /// Get the commit log client
    pub fn commit_log_client(&self) -> &C {
        &self.lifecycle.commit_log
    }

    /// Get the mutable commit log client
    pub fn commit_log_client_mut(&mut self) -> &mut C {
        &mut self.lifecycle.commit_log
    }

    /// Close both clients without committing
    pub fn close(mut self) -> Result<ConsumerStats> {
        self.lifecycle.main.close()?;
        self.lifecycle.commit_log.close()?;
        info!(stats = ?self.lifecycle.stats, "synchronized consumer closed");
        Ok(self.lifecycle.stats)
    }

    // ========================================================================
    // Main client
    // ========================================================================

    async fn on_main_event<H: MessageHandler>(
        &mut self,
        event: ClientEvent,
        handler: &mut H,
    ) -> Result<()> {
        match event {
            ClientEvent::Message(message) => self.on_main_message(message, handler).await,
            ClientEvent::Assigned(partitions) => self.on_main_assigned(partitions),
            ClientEvent::Revoked(partitions) => {
                self.on_main_revoked(&partitions);
                Ok(())
            }
        }
    }

    async fn on_main_message<H: MessageHandler>(
        &mut self,
        message: ConsumedMessage,
        handler: &mut H,
    ) -> Result<()> {
        if !self.config.topics.contains(&message.topic) {
            return Err(Error::unrecognized_source(
                self.lifecycle.main.name(),
                message.topic,
                message.partition,
            ));
        }

        // Only partitions that are assigned and behind the synchronizing group
        // may reach the handler.
        let Some(snapshot) = self
            .lifecycle
            .manager
            .snapshot(&message.topic, message.partition)
        else {
            debug!(
                partition = %message.partition_key(),
                offset = message.offset,
                "skipping message of untracked partition"
            );
            self.lifecycle.stats.messages_skipped += 1;
            return Ok(());
        };
        if snapshot.state.should_pause() {
            let key = message.partition_key();
            debug!(
                partition = %key,
                offset = message.offset,
                state = %snapshot.state,
                "skipping message of paused partition"
            );
            self.lifecycle.stats.messages_skipped += 1;
            // Pausing again rewinds the client to the next expected offset.
            if let Some(local) = snapshot.local() {
                self.lifecycle.main.pause(&key, local)?;
            }
            return Ok(());
        }

        self.lifecycle.manager.validate_local_message(
            &message.topic,
            message.partition,
            message.offset,
        )?;

        let mut committer = Committer::new(&mut self.lifecycle.main);
        handler.handle(&message, &mut committer).await?;

        self.lifecycle
            .manager
            .set_local_offset(&message.topic, message.partition, message.offset + 1);
        self.lifecycle.stats.messages_handled += 1;
        self.apply_flow_actions()
    }

    fn on_main_assigned(&mut self, partitions: Vec<AssignedPartition>) -> Result<()> {
        for assigned in partitions {
            let offset = self.starting_offset(&assigned)?;
            let key = assigned.key;
            info!(partition = %key, offset, "partition assigned to main client");

            self.lifecycle.manager.reset_partition(&key.topic, key.partition);
            self.lifecycle
                .manager
                .set_local_offset(&key.topic, key.partition, offset);
            self.lifecycle.stats.partitions_assigned += 1;
        }
        self.apply_flow_actions()
    }

    fn on_main_revoked(&mut self, partitions: &[PartitionKey]) {
        for key in partitions {
            let dropped = self
                .lifecycle
                .manager
                .reset_partition(&key.topic, key.partition);
            info!(
                partition = %key,
                state = ?dropped.map(|s| s.state),
                "partition revoked from main client"
            );
            self.lifecycle.stats.partitions_revoked += 1;
        }
    }

    /// Assigned offset, else the committed offset, else the low watermark
    fn starting_offset(&mut self, assigned: &AssignedPartition) -> Result<Offset> {
        if let Some(offset) = assigned.offset {
            return Ok(offset);
        }
        if let Some(offset) = self.lifecycle.main.committed_offset(&assigned.key)? {
            return Ok(offset);
        }
        self.lifecycle.main.low_watermark(&assigned.key)
    }

    fn apply_flow_actions(&mut self) -> Result<()> {
        for action in self.lifecycle.manager.listener_mut().drain() {
            match action {
                FlowAction::Pause { key, offset } => {
                    self.lifecycle.main.pause(&key, offset)?;
                    self.lifecycle.stats.pauses += 1;
                    debug!(partition = %key, offset, "paused partition");
                }
                FlowAction::Resume { key, offset } => {
                    self.lifecycle.main.resume(&key, offset)?;
                    self.lifecycle.stats.resumes += 1;
                    debug!(partition = %key, offset, "resumed partition");
                }
            }
        }
        Ok(())
    }

    // ========================================================================
    // Commit log client
    // ========================================================================

    fn on_commit_log_event(&mut self, event: ClientEvent) -> Result<()> {
        match event {
            ClientEvent::Message(message) => self.on_commit_log_message(&message),
            ClientEvent::Assigned(partitions) => {
                let keys: Vec<PartitionKey> = partitions.into_iter().map(|p| p.key).collect();
                // Remote offsets are only rebuilt by replaying the whole log.
                self.lifecycle.commit_log.rewind(&keys)?;
                self.lifecycle.stats.commit_log_rewinds += 1;
                info!(partitions = keys.len(), "commit log assigned, replaying from beginning");
                Ok(())
            }
            ClientEvent::Revoked(partitions) => {
                debug!(partitions = partitions.len(), "commit log partitions revoked");
                Ok(())
            }
        }
    }

    fn on_commit_log_message(&mut self, message: &ConsumedMessage) -> Result<()> {
        if message.topic != self.config.commit_log_topic {
            return Err(Error::unrecognized_source(
                self.lifecycle.commit_log.name(),
                message.topic.clone(),
                message.partition,
            ));
        }

        let entry = match CommitLogEntry::from_message(message) {
            Ok(entry) => entry,
            Err(err) if !err.is_fatal() => {
                warn!(
                    partition = message.partition,
                    offset = message.offset,
                    error = %err,
                    "dropping undecodable commit log record"
                );
                self.lifecycle.stats.commit_log_dropped += 1;
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        if entry.group != self.config.synchronize_commit_group {
            debug!(
                group = %entry.group,
                topic = %entry.topic,
                partition = entry.partition,
                "ignoring commit of non-synchronizing group"
            );
            self.lifecycle.stats.commit_log_ignored += 1;
            return Ok(());
        }

        self.lifecycle
            .manager
            .set_remote_offset(&entry.topic, entry.partition, entry.offset);
        self.lifecycle.stats.commit_log_applied += 1;
        self.apply_flow_actions()
    }
}

#[cfg(test)]
mod tests;
