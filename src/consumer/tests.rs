//! Tests for SynchronizedConsumer

use super::*;
use crate::client::{ClientCall, MemoryClient};
use crate::config::PollConfig;
use crate::state::PartitionState;
use async_trait::async_trait;
use pretty_assertions::assert_eq;

const TOPIC: &str = "t";
const COMMIT_LOG: &str = "commit-log";
const GROUP: &str = "g";

/// Handler recording every offset it sees
#[derive(Debug, Default)]
struct RecordingHandler {
    handled: Vec<(String, i32, Offset)>,
    commit: Option<CommitMode>,
    fail_at: Option<Offset>,
}

impl RecordingHandler {
    fn committing(mode: CommitMode) -> Self {
        Self {
            commit: Some(mode),
            ..Default::default()
        }
    }

    fn failing_at(offset: Offset) -> Self {
        Self {
            fail_at: Some(offset),
            ..Default::default()
        }
    }

    fn offsets(&self) -> Vec<Offset> {
        self.handled.iter().map(|h| h.2).collect()
    }
}

#[async_trait]
impl MessageHandler for RecordingHandler {
    async fn handle(
        &mut self,
        message: &ConsumedMessage,
        committer: &mut Committer<'_>,
    ) -> Result<()> {
        if self.fail_at == Some(message.offset) {
            return Err(Error::handler(format!("refusing offset {}", message.offset)));
        }
        self.handled
            .push((message.topic.clone(), message.partition, message.offset));
        if let Some(mode) = self.commit {
            committer.commit_message(message, mode)?;
        }
        Ok(())
    }
}

fn test_config() -> ConsumerConfig {
    ConsumerConfig::new(
        "localhost:9092",
        vec![TOPIC.to_string()],
        "consumer",
        COMMIT_LOG,
        GROUP,
    )
    .with_poll(PollConfig::immediate())
}

fn started() -> SynchronizedConsumer<Started<MemoryClient>> {
    SynchronizedConsumer::new(test_config()).unwrap().start_with(
        MemoryClient::new(MAIN_CLIENT),
        MemoryClient::new(COMMIT_LOG_CLIENT),
    )
}

fn p0() -> PartitionKey {
    PartitionKey::new(TOPIC, 0)
}

/// Poll until both clients are drained of deliverable events
async fn drain(
    consumer: &mut SynchronizedConsumer<Started<MemoryClient>>,
    handler: &mut RecordingHandler,
) -> usize {
    let mut iterations = 0;
    while consumer.poll_once(handler).await.unwrap() {
        iterations += 1;
    }
    iterations
}

/// Assign at 0, learn the remote offset 3, catch up to it
async fn caught_up() -> (SynchronizedConsumer<Started<MemoryClient>>, RecordingHandler) {
    let mut consumer = started();
    let mut handler = RecordingHandler::default();

    consumer
        .main_client_mut()
        .push_assignment(vec![AssignedPartition::new(TOPIC, 0).at(0)])
        .push_record(TOPIC, 0, 0, "k", "a")
        .push_record(TOPIC, 0, 1, "k", "b")
        .push_record(TOPIC, 0, 2, "k", "c");
    consumer
        .commit_log_client_mut()
        .push_record(COMMIT_LOG, 0, 0, "g:t:0", "3");

    drain(&mut consumer, &mut handler).await;
    (consumer, handler)
}

// ============================================================================
// Lifecycle Tests
// ============================================================================

#[test]
fn test_new_rejects_invalid_config() {
    let mut config = test_config();
    config.topics.clear();
    assert!(SynchronizedConsumer::new(config).is_err());
}

#[test]
fn test_instances_get_distinct_commit_log_groups() {
    let first = SynchronizedConsumer::new(test_config()).unwrap();
    let second = SynchronizedConsumer::new(test_config()).unwrap();

    assert_ne!(first.instance_id(), second.instance_id());
    assert_ne!(
        first.config().commit_log_group(first.instance_id()),
        second.config().commit_log_group(second.instance_id())
    );
}

#[tokio::test]
async fn test_close_returns_stats_and_closes_clients() {
    let (consumer, _) = caught_up().await;
    let stats = consumer.close().unwrap();
    assert_eq!(stats.messages_handled, 3);
}

#[tokio::test]
async fn test_closed_clients_stop_polling() {
    let mut consumer = started();
    consumer.main_client_mut().close().unwrap();
    consumer.commit_log_client_mut().close().unwrap();
    assert!(consumer.main_client().is_closed());
    assert!(consumer.commit_log_client().is_closed());

    let mut handler = RecordingHandler::default();
    assert!(consumer.poll_once(&mut handler).await.is_err());
}

#[tokio::test]
async fn test_idle_poll() {
    let mut consumer = started();
    let mut handler = RecordingHandler::default();

    assert!(!consumer.poll_once(&mut handler).await.unwrap());
    assert!(!consumer.poll_once(&mut handler).await.unwrap());
    assert_eq!(consumer.stats().idle_polls, 2);
}

// ============================================================================
// Synchronization Tests
// ============================================================================

#[tokio::test]
async fn test_catch_up_to_remote() {
    let (consumer, handler) = caught_up().await;

    assert_eq!(handler.offsets(), vec![0, 1, 2]);
    assert_eq!(
        consumer.main_client().flow_calls(),
        vec![
            ClientCall::Pause(p0(), 0),
            ClientCall::Resume(p0(), 0),
            ClientCall::Pause(p0(), 3),
        ]
    );

    let snapshot = consumer.partition_state(TOPIC, 0).unwrap();
    assert_eq!(snapshot.state, PartitionState::Synchronized);
    assert_eq!(snapshot.local(), Some(3));
    assert_eq!(snapshot.remote(), Some(3));
    assert!(consumer.main_client().is_paused(&p0()));
}

#[tokio::test]
async fn test_duplicate_commit_is_silent() {
    let (mut consumer, mut handler) = caught_up().await;
    consumer.main_client_mut().clear_calls();

    consumer
        .commit_log_client_mut()
        .push_record(COMMIT_LOG, 0, 1, "g:t:0", "3");
    drain(&mut consumer, &mut handler).await;

    assert!(consumer.main_client().flow_calls().is_empty());
    assert_eq!(consumer.stats().commit_log_applied, 2);
    assert_eq!(
        consumer.manager().state(TOPIC, 0),
        Some(PartitionState::Synchronized)
    );
}

#[tokio::test]
async fn test_other_group_is_ignored() {
    let (mut consumer, mut handler) = caught_up().await;
    consumer.main_client_mut().clear_calls();

    consumer
        .commit_log_client_mut()
        .push_record(COMMIT_LOG, 0, 1, "other:t:0", "10");
    drain(&mut consumer, &mut handler).await;

    assert!(consumer.main_client().flow_calls().is_empty());
    assert_eq!(consumer.stats().commit_log_ignored, 1);
    assert_eq!(consumer.partition_state(TOPIC, 0).unwrap().remote(), Some(3));
}

#[tokio::test]
async fn test_offset_gap_is_fatal() {
    let (mut consumer, mut handler) = caught_up().await;

    // The remote moves on, so the partition is resumed and the gap delivered.
    consumer.main_client_mut().push_record(TOPIC, 0, 5, "k", "gap");
    consumer
        .commit_log_client_mut()
        .push_record(COMMIT_LOG, 0, 1, "g:t:0", "10");
    assert!(consumer.poll_once(&mut handler).await.unwrap());
    let before = consumer.partition_state(TOPIC, 0).unwrap();
    assert_eq!(before.state, PartitionState::LocalBehind);

    let err = consumer.poll_once(&mut handler).await.unwrap_err();
    assert!(matches!(
        err,
        Error::OffsetValidation {
            expected: 3,
            received: 5,
            ..
        }
    ));
    assert_eq!(consumer.partition_state(TOPIC, 0), Some(before));
    assert_eq!(handler.offsets(), vec![0, 1, 2]);
}

#[tokio::test]
async fn test_remote_behind_pauses() {
    let (mut consumer, mut handler) = caught_up().await;

    consumer
        .commit_log_client_mut()
        .push_record(COMMIT_LOG, 0, 1, "g:t:0", "5")
        .push_record(COMMIT_LOG, 0, 2, "g:t:0", "2");
    consumer
        .main_client_mut()
        .push_record(TOPIC, 0, 3, "k", "d")
        .push_record(TOPIC, 0, 4, "k", "e");
    drain(&mut consumer, &mut handler).await;

    // local 4 against remote 2; offset 4 stays with the paused partition
    assert_eq!(handler.offsets(), vec![0, 1, 2, 3]);
    assert_eq!(consumer.main_client().queued(), 1);
    assert_eq!(
        consumer.manager().state(TOPIC, 0),
        Some(PartitionState::RemoteBehind)
    );
    assert!(consumer.main_client().is_paused(&p0()));
}

#[tokio::test]
async fn test_paused_iff_not_local_behind() {
    let (mut consumer, mut handler) = caught_up().await;

    for (offset, remote) in [(1, "4"), (2, "1"), (3, "9")] {
        consumer
            .commit_log_client_mut()
            .push_record(COMMIT_LOG, 0, offset, "g:t:0", remote);
        consumer.poll_once(&mut handler).await.unwrap();

        let state = consumer.manager().state(TOPIC, 0).unwrap();
        assert_eq!(
            consumer.main_client().is_paused(&p0()),
            state != PartitionState::LocalBehind,
            "state {state}"
        );
    }
}

// ============================================================================
// Gating Tests
// ============================================================================

#[tokio::test]
async fn test_untracked_partition_message_is_skipped() {
    let mut consumer = started();
    let mut handler = RecordingHandler::default();
    consumer.main_client_mut().push_record(TOPIC, 0, 5, "k", "v");
    drain(&mut consumer, &mut handler).await;

    assert!(handler.handled.is_empty());
    assert_eq!(consumer.partition_state(TOPIC, 0), None);
    assert!(consumer.manager().is_empty());
    assert!(consumer.main_client().flow_calls().is_empty());
    assert_eq!(consumer.stats().messages_skipped, 1);
}

#[tokio::test]
async fn test_message_after_revocation_is_skipped() {
    let (mut consumer, mut handler) = caught_up().await;
    consumer
        .commit_log_client_mut()
        .push_record(COMMIT_LOG, 0, 1, "g:t:0", "10");
    drain(&mut consumer, &mut handler).await;
    assert!(!consumer.main_client().is_paused(&p0()));
    consumer.main_client_mut().clear_calls();

    // Fetched before the revocation, delivered after it.
    consumer
        .main_client_mut()
        .push_revocation(vec![p0()])
        .push_record(TOPIC, 0, 3, "k", "stale");
    drain(&mut consumer, &mut handler).await;

    assert_eq!(handler.offsets(), vec![0, 1, 2]);
    assert_eq!(consumer.partition_state(TOPIC, 0), None);
    assert!(consumer.main_client().flow_calls().is_empty());
    assert_eq!(consumer.stats().messages_skipped, 1);
}

#[tokio::test]
async fn test_message_of_paused_partition_is_skipped() {
    let mut consumer = started();
    let mut handler = RecordingHandler::default();
    consumer
        .main_client_mut()
        .push_assignment(vec![AssignedPartition::new(TOPIC, 0).at(0)]);
    drain(&mut consumer, &mut handler).await;
    assert_eq!(consumer.manager().state(TOPIC, 0), Some(PartitionState::Unknown));

    // A message fetched ahead of the pause still reaches the consumer.
    consumer.main_client_mut().resume(&p0(), 0).unwrap();
    consumer.main_client_mut().clear_calls();
    consumer.main_client_mut().push_record(TOPIC, 0, 0, "k", "early");
    drain(&mut consumer, &mut handler).await;

    assert!(handler.handled.is_empty());
    assert_eq!(
        consumer.main_client().flow_calls(),
        vec![ClientCall::Pause(p0(), 0)]
    );
    assert!(consumer.main_client().is_paused(&p0()));
    assert_eq!(consumer.partition_state(TOPIC, 0).unwrap().local(), Some(0));
    assert_eq!(consumer.stats().messages_skipped, 1);
}

// ============================================================================
// Source and Decoding Tests
// ============================================================================

#[tokio::test]
async fn test_main_client_unrecognized_topic() {
    let mut consumer = started();
    let mut handler = RecordingHandler::default();
    consumer
        .main_client_mut()
        .push_record("unexpected", 0, 0, "k", "v");

    let err = consumer.poll_once(&mut handler).await.unwrap_err();
    assert!(matches!(err, Error::UnrecognizedSource { .. }));
    assert!(handler.handled.is_empty());
}

#[tokio::test]
async fn test_commit_log_client_unrecognized_topic() {
    let mut consumer = started();
    let mut handler = RecordingHandler::default();
    consumer
        .commit_log_client_mut()
        .push_record(TOPIC, 0, 0, "g:t:0", "3");

    let err = consumer.poll_once(&mut handler).await.unwrap_err();
    assert!(matches!(err, Error::UnrecognizedSource { .. }));
    assert!(consumer.manager().is_empty());
}

#[tokio::test]
async fn test_undecodable_commit_log_records_are_dropped() {
    let mut consumer = started();
    let mut handler = RecordingHandler::default();
    consumer
        .commit_log_client_mut()
        .push_record(COMMIT_LOG, 0, 0, "not-a-key", "3")
        .push_record(COMMIT_LOG, 0, 1, "g:t:0", "three")
        .push_message(ConsumedMessage::new(COMMIT_LOG, 0, 2).with_key("g:t:0"))
        .push_record(COMMIT_LOG, 0, 3, "g:t:0", "3");

    assert_eq!(drain(&mut consumer, &mut handler).await, 4);
    assert_eq!(consumer.stats().commit_log_dropped, 3);
    assert_eq!(consumer.stats().commit_log_applied, 1);
    // Remote-only partitions are stored but not reported.
    assert_eq!(consumer.partition_state(TOPIC, 0), None);
    assert!(consumer.main_client().flow_calls().is_empty());
}

// ============================================================================
// Rebalance Tests
// ============================================================================

#[tokio::test]
async fn test_remote_before_assignment() {
    let mut consumer = started();
    let mut handler = RecordingHandler::default();
    consumer
        .commit_log_client_mut()
        .push_record(COMMIT_LOG, 0, 0, "g:t:0", "4");
    drain(&mut consumer, &mut handler).await;

    consumer
        .main_client_mut()
        .push_assignment(vec![AssignedPartition::new(TOPIC, 0).at(1)]);
    drain(&mut consumer, &mut handler).await;

    assert_eq!(
        consumer.main_client().flow_calls(),
        vec![ClientCall::Resume(p0(), 1)]
    );
    assert_eq!(
        consumer.manager().state(TOPIC, 0),
        Some(PartitionState::LocalBehind)
    );
}

#[tokio::test]
async fn test_revoke_and_reassign_reseeds_from_committed() {
    let (mut consumer, mut handler) = caught_up().await;
    consumer.main_client_mut().clear_calls();

    consumer
        .main_client_mut()
        .push_revocation(vec![p0()])
        .set_committed(p0(), 2)
        .push_assignment(vec![AssignedPartition::new(TOPIC, 0)]);

    assert!(consumer.poll_once(&mut handler).await.unwrap());
    assert_eq!(consumer.partition_state(TOPIC, 0), None);
    assert_eq!(consumer.stats().partitions_revoked, 1);

    assert!(consumer.poll_once(&mut handler).await.unwrap());
    let snapshot = consumer.partition_state(TOPIC, 0).unwrap();
    assert_eq!(snapshot.local(), Some(2));
    assert_eq!(snapshot.remote(), Some(3));
    assert_eq!(snapshot.state, PartitionState::LocalBehind);
    assert_eq!(
        consumer.main_client().flow_calls(),
        vec![ClientCall::Resume(p0(), 2)]
    );
}

#[tokio::test]
async fn test_assignment_falls_back_to_low_watermark() {
    let mut consumer = started();
    let mut handler = RecordingHandler::default();
    consumer
        .main_client_mut()
        .set_low_watermark(p0(), 7)
        .push_assignment(vec![AssignedPartition::new(TOPIC, 0)]);
    drain(&mut consumer, &mut handler).await;

    let snapshot = consumer.partition_state(TOPIC, 0).unwrap();
    assert_eq!(snapshot.local(), Some(7));
    assert_eq!(snapshot.state, PartitionState::Unknown);
    assert_eq!(
        consumer.main_client().flow_calls(),
        vec![ClientCall::Pause(p0(), 7)]
    );
}

#[tokio::test]
async fn test_commit_log_assignment_rewinds() {
    let mut consumer = started();
    let mut handler = RecordingHandler::default();
    let log0 = PartitionKey::new(COMMIT_LOG, 0);
    consumer
        .commit_log_client_mut()
        .push_assignment(vec![AssignedPartition::new(COMMIT_LOG, 0).at(40)]);
    drain(&mut consumer, &mut handler).await;

    assert_eq!(
        consumer.commit_log_client().calls(),
        &[ClientCall::Rewind(vec![log0])]
    );
    assert_eq!(consumer.stats().commit_log_rewinds, 1);
}

// ============================================================================
// Handler and Commit Tests
// ============================================================================

#[tokio::test]
async fn test_handler_commits_through_main_client() {
    let mut consumer = started();
    let mut handler = RecordingHandler::committing(CommitMode::Async);
    consumer
        .main_client_mut()
        .push_assignment(vec![AssignedPartition::new(TOPIC, 0).at(0)]);
    consumer
        .commit_log_client_mut()
        .push_record(COMMIT_LOG, 0, 0, "g:t:0", "9");
    consumer.main_client_mut().push_record(TOPIC, 0, 0, "k", "v");
    drain(&mut consumer, &mut handler).await;

    assert!(consumer.main_client().calls().contains(&ClientCall::Commit(
        CommitRequest::Offsets(vec![(p0(), 1)]),
        CommitMode::Async
    )));
    assert_eq!(consumer.main_client_mut().committed_offset(&p0()).unwrap(), Some(1));
    assert!(consumer.commit_log_client().calls().is_empty());
}

#[tokio::test]
async fn test_consumer_commit_forwards_to_main_client() {
    let mut consumer = started();
    consumer
        .commit(&CommitRequest::ConsumerState, CommitMode::Sync)
        .unwrap();
    assert_eq!(
        consumer.main_client().calls(),
        &[ClientCall::Commit(CommitRequest::ConsumerState, CommitMode::Sync)]
    );
}

#[tokio::test]
async fn test_handler_error_does_not_advance() {
    let mut consumer = started();
    let mut handler = RecordingHandler::failing_at(1);
    consumer
        .main_client_mut()
        .push_assignment(vec![AssignedPartition::new(TOPIC, 0).at(0)])
        .push_record(TOPIC, 0, 0, "k", "a")
        .push_record(TOPIC, 0, 1, "k", "b");
    consumer
        .commit_log_client_mut()
        .push_record(COMMIT_LOG, 0, 0, "g:t:0", "5");

    let err = consumer.run(&mut handler).await.unwrap_err();
    assert!(matches!(err, Error::Handler { .. }));
    assert_eq!(consumer.partition_state(TOPIC, 0).unwrap().local(), Some(1));
    assert_eq!(consumer.stats().messages_handled, 1);
}

#[tokio::test]
async fn test_run_until_stops_on_shutdown() {
    let mut consumer = started();
    let mut handler = RecordingHandler::default();
    consumer.main_client_mut().push_record(TOPIC, 0, 0, "k", "v");

    consumer
        .run_until(&mut handler, std::future::ready(()))
        .await
        .unwrap();
    assert!(handler.handled.is_empty());
    assert_eq!(consumer.main_client().queued(), 1);
}

#[tokio::test]
async fn test_run_until_processes_before_shutdown() {
    let mut consumer = started();
    let mut handler = RecordingHandler::default();
    consumer
        .main_client_mut()
        .push_assignment(vec![AssignedPartition::new(TOPIC, 0).at(0)])
        .push_record(TOPIC, 0, 0, "k", "v");
    consumer
        .commit_log_client_mut()
        .push_record(COMMIT_LOG, 0, 0, "g:t:0", "1");

    let shutdown = tokio::time::sleep(std::time::Duration::from_millis(50));
    consumer.run_until(&mut handler, shutdown).await.unwrap();

    assert_eq!(handler.offsets(), vec![0]);
    assert_eq!(
        consumer.manager().state(TOPIC, 0),
        Some(PartitionState::Synchronized)
    );
}
