//! rdkafka-backed broker client

use super::{AssignedPartition, BrokerClient, ClientEvent, CommitMode, CommitRequest};
use crate::error::{Result, ResultExt};
use crate::types::{ConsumedMessage, Offset, PartitionKey, StringMap};
use async_trait::async_trait;
use bytes::Bytes;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, ConsumerContext, Rebalance, StreamConsumer};
use rdkafka::message::BorrowedMessage;
use rdkafka::{ClientContext, Message, TopicPartitionList};
use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

// ============================================================================
// Rebalance Context
// ============================================================================

/// Consumer context recording rebalances as [`ClientEvent`]s
///
/// rdkafka runs rebalance callbacks from inside the consumer's poll; the
/// context only queues the events, the poll loop applies them.
pub struct RebalanceContext {
    client: String,
    events: Mutex<VecDeque<ClientEvent>>,
}

impl RebalanceContext {
    /// Create a context for the named client
    pub fn new(client: impl Into<String>) -> Self {
        Self {
            client: client.into(),
            events: Mutex::new(VecDeque::new()),
        }
    }

    /// Take every recorded event
    pub fn drain(&self) -> Vec<ClientEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect()
    }

    fn record(&self, event: ClientEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(event);
    }
}

impl ClientContext for RebalanceContext {}

impl ConsumerContext for RebalanceContext {
    fn pre_rebalance(&self, rebalance: &Rebalance<'_>) {
        match rebalance {
            Rebalance::Revoke(tpl) => {
                let revoked: Vec<PartitionKey> = tpl
                    .elements()
                    .iter()
                    .map(|e| PartitionKey::new(e.topic(), e.partition()))
                    .collect();
                info!(
                    client = %self.client,
                    partitions_revoked = revoked.len(),
                    "kafka rebalance: partitions revoked"
                );
                self.record(ClientEvent::Revoked(revoked));
            }
            Rebalance::Assign(_) => {}
            Rebalance::Error(err) => {
                warn!(client = %self.client, error = %err, "kafka rebalance error");
            }
        }
    }

    fn post_rebalance(&self, rebalance: &Rebalance<'_>) {
        if let Rebalance::Assign(tpl) = rebalance {
            let assigned: Vec<AssignedPartition> = tpl
                .elements()
                .iter()
                .map(|e| AssignedPartition {
                    key: PartitionKey::new(e.topic(), e.partition()),
                    offset: e.offset().to_raw().filter(|o| *o >= 0),
                })
                .collect();
            info!(
                client = %self.client,
                partitions_assigned = assigned.len(),
                "kafka rebalance: partitions assigned"
            );
            self.record(ClientEvent::Assigned(assigned));
        }
    }
}

// ============================================================================
// Kafka Client
// ============================================================================

/// Broker client backed by an rdkafka `StreamConsumer`
pub struct KafkaClient {
    name: String,
    consumer: StreamConsumer<RebalanceContext>,
    pending: VecDeque<ClientEvent>,
    /// Partitions whose rewind failed because fetching had not started yet
    unrewound: HashSet<PartitionKey>,
    operation_timeout: Duration,
}

impl KafkaClient {
    /// Create a client from librdkafka properties
    pub fn new(
        name: impl Into<String>,
        properties: &StringMap,
        operation_timeout: Duration,
    ) -> Result<Self> {
        let name = name.into();
        let mut config = ClientConfig::new();
        for (key, value) in properties {
            config.set(key, value);
        }

        let consumer: StreamConsumer<RebalanceContext> =
            config
                .create_with_context(RebalanceContext::new(name.clone()))
                .with_context(|| format!("Failed to create {name} client"))?;

        Ok(Self {
            name,
            consumer,
            pending: VecDeque::new(),
            unrewound: HashSet::new(),
            operation_timeout,
        })
    }

    /// Subscribe to topics; partitions arrive through rebalance events
    pub fn subscribe(&self, topics: &[String]) -> Result<()> {
        let topics: Vec<&str> = topics.iter().map(String::as_str).collect();
        self.consumer
            .subscribe(&topics)
            .with_context(|| format!("Failed to subscribe {} to {topics:?}", self.name))?;
        info!(client = %self.name, ?topics, "subscribed");
        Ok(())
    }

    fn collect_rebalances(&mut self) {
        for event in self.consumer.context().drain() {
            if let ClientEvent::Revoked(keys) = &event {
                for key in keys {
                    self.unrewound.remove(key);
                }
            }
            self.pending.push_back(event);
        }
    }

    fn seek_to_beginning(&self, key: &PartitionKey) -> Result<()> {
        self.consumer.seek(
            &key.topic,
            key.partition,
            rdkafka::Offset::Beginning,
            self.operation_timeout,
        )?;
        Ok(())
    }

    /// Complete a deferred rewind once the partition delivers its first message.
    ///
    /// Returns whether `message` must be discarded.
    fn finish_rewind(&mut self, message: &ConsumedMessage) -> Result<bool> {
        let key = message.partition_key();
        if !self.unrewound.contains(&key) {
            return Ok(false);
        }
        self.seek_to_beginning(&key)?;
        self.unrewound.remove(&key);
        purge_messages(&mut self.pending, &key);
        debug!(client = %self.name, partition = %key, skipped_offset = message.offset, "deferred rewind done");
        Ok(true)
    }
}

fn owned_message(message: &BorrowedMessage<'_>) -> ConsumedMessage {
    ConsumedMessage {
        topic: message.topic().to_string(),
        partition: message.partition(),
        offset: message.offset(),
        key: message.key().map(Bytes::copy_from_slice),
        payload: message.payload().map(Bytes::copy_from_slice),
        timestamp_ms: message.timestamp().to_millis(),
    }
}

fn partition_list(entries: &[(PartitionKey, Offset)]) -> Result<TopicPartitionList> {
    let mut tpl = TopicPartitionList::new();
    for (key, offset) in entries {
        tpl.add_partition_offset(&key.topic, key.partition, rdkafka::Offset::Offset(*offset))?;
    }
    Ok(tpl)
}

/// Drop queued messages of `key`; returns how many were dropped
fn purge_messages(pending: &mut VecDeque<ClientEvent>, key: &PartitionKey) -> usize {
    let before = pending.len();
    pending.retain(|event| match event {
        ClientEvent::Message(m) => m.topic != key.topic || m.partition != key.partition,
        _ => true,
    });
    before - pending.len()
}

impl From<CommitMode> for rdkafka::consumer::CommitMode {
    fn from(mode: CommitMode) -> Self {
        match mode {
            CommitMode::Sync => rdkafka::consumer::CommitMode::Sync,
            CommitMode::Async => rdkafka::consumer::CommitMode::Async,
        }
    }
}

#[async_trait]
impl BrokerClient for KafkaClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn poll(&mut self, timeout: Duration) -> Result<Option<ClientEvent>> {
        self.collect_rebalances();
        if let Some(event) = self.pending.pop_front() {
            return Ok(Some(event));
        }

        let message = match tokio::time::timeout(timeout, self.consumer.recv()).await {
            Ok(received) => Some(owned_message(&received?)),
            Err(_) => None,
        };

        // A rebalance served during recv() must be applied before the message.
        self.collect_rebalances();
        if let Some(message) = message {
            if !self.finish_rewind(&message)? {
                self.pending.push_back(ClientEvent::Message(message));
            }
        }
        Ok(self.pending.pop_front())
    }

    fn pause(&mut self, key: &PartitionKey, offset: Offset) -> Result<()> {
        let tpl = partition_list(&[(key.clone(), offset)])?;
        self.consumer.pause(&tpl)?;

        // librdkafka only drops its own fetch queue; messages already taken
        // from it must be fetched again after resume.
        let purged = purge_messages(&mut self.pending, key);
        if purged > 0 {
            self.consumer.seek(
                &key.topic,
                key.partition,
                rdkafka::Offset::Offset(offset),
                self.operation_timeout,
            )?;
        }
        debug!(client = %self.name, partition = %key, offset, purged, "paused");
        Ok(())
    }

    fn resume(&mut self, key: &PartitionKey, offset: Offset) -> Result<()> {
        let tpl = partition_list(&[(key.clone(), offset)])?;
        self.consumer.resume(&tpl)?;
        debug!(client = %self.name, partition = %key, offset, "resumed");
        Ok(())
    }

    fn rewind(&mut self, partitions: &[PartitionKey]) -> Result<()> {
        for key in partitions {
            purge_messages(&mut self.pending, key);
            // Seeking fails until the partition's fetcher has started; the
            // rewind is then retried on the partition's first message.
            if let Err(err) = self.seek_to_beginning(key) {
                debug!(client = %self.name, partition = %key, error = %err, "deferring rewind");
                self.unrewound.insert(key.clone());
            }
        }
        debug!(client = %self.name, partitions = partitions.len(), "rewound to beginning");
        Ok(())
    }

    fn committed_offset(&mut self, key: &PartitionKey) -> Result<Option<Offset>> {
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition(&key.topic, key.partition);
        let committed = self
            .consumer
            .committed_offsets(tpl, self.operation_timeout)?;

        Ok(committed
            .find_partition(&key.topic, key.partition)
            .and_then(|e| match e.offset() {
                rdkafka::Offset::Offset(offset) => Some(offset),
                _ => None,
            }))
    }

    fn low_watermark(&mut self, key: &PartitionKey) -> Result<Offset> {
        let (low, _high) =
            self.consumer
                .fetch_watermarks(&key.topic, key.partition, self.operation_timeout)?;
        Ok(low)
    }

    fn commit(&mut self, request: &CommitRequest, mode: CommitMode) -> Result<()> {
        match request {
            CommitRequest::ConsumerState => self.consumer.commit_consumer_state(mode.into())?,
            CommitRequest::Offsets(offsets) => {
                let tpl = partition_list(offsets)?;
                self.consumer.commit(&tpl, mode.into())?;
            }
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.consumer.unsubscribe();
        self.pending.clear();
        self.unrewound.clear();
        info!(client = %self.name, "unsubscribed");
        Ok(())
    }
}
