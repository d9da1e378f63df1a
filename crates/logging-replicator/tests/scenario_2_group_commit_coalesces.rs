//! Spec §8 scenario 2: group commit coalesces barriers.

mod support;

use async_trait::async_trait;
use futures::future::join_all;
use logging_replicator::checkpoint_manager::CheckpointManager;
use logging_replicator::contracts::ReplicatorTransport;
use logging_replicator::log::FileLogicalLog;
use logging_replicator::physical_log_writer::PhysicalLogWriter;
use logging_replicator::ids::{Psn, RecordPosition, TransactionId};
use logging_replicator::record::{
    BeginTransactionRecord, EndTransactionRecord, LogRecord, OperationRecord, RecordHeader, TransactionOutcome,
};
use logging_replicator::replicated_log_manager::ReplicatedLogManager;
use logging_replicator::transaction_map::TransactionMap;
use logging_replicator::truncation_manager::LogTruncationManager;
use logging_replicator::{ApplyError, Epoch, LogManager, Lsn, ReplicaId, ReplicatorConfig};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use support::RecordingStateProvider;
use uuid::Uuid;

/// Yields once before assigning an LSN, widening the race window so the 10
/// concurrently-issued `request_group_commit` calls in this test actually
/// overlap instead of running to completion one at a time.
struct YieldingTransport {
    next_lsn: AtomicI64,
}

#[async_trait]
impl ReplicatorTransport for YieldingTransport {
    async fn replicate_and_log(&self, _record: &LogRecord) -> Result<Lsn, ApplyError> {
        tokio::task::yield_now().await;
        Ok(Lsn(self.next_lsn.fetch_add(1, Ordering::SeqCst)))
    }
    async fn update_epoch(&self, _epoch: Epoch, _last_lsn: Lsn) -> Result<(), ApplyError> {
        Ok(())
    }
    fn local_replica_id(&self) -> ReplicaId {
        ReplicaId(Uuid::nil())
    }
}

#[tokio::test]
async fn ten_concurrent_group_commit_requests_append_exactly_one_barrier() {
    let dir = tempfile::tempdir().unwrap();
    let (log_manager, _bootstrapped) = LogManager::open(dir.path()).await.unwrap();
    let log_manager = Arc::new(log_manager);
    let current_log: Arc<FileLogicalLog> = log_manager.current_log();

    let writer = Arc::new(PhysicalLogWriter::new(current_log.clone(), 1 << 20));
    let transport = Arc::new(YieldingTransport { next_lsn: AtomicI64::new(2) });
    let replicated = Arc::new(ReplicatedLogManager::new(transport, writer.clone(), Epoch::ZERO));
    let provider = Arc::new(RecordingStateProvider::default());
    let tx_map = Arc::new(TransactionMap::new());
    let truncation = Arc::new(LogTruncationManager::new(Arc::new(ReplicatorConfig::default())));
    // Begin tx T1 (BeginTx + Op + EndTx commit) before any group commit is
    // requested.
    replicated
        .replicate_and_log(LogRecord::BeginTransaction(BeginTransactionRecord {
            header: RecordHeader { lsn: Lsn::INVALID, psn: Psn::INVALID, record_position: RecordPosition(0), previous_physical_record: None },
            transaction_id: TransactionId(1),
            is_single_operation: false,
        }))
        .await
        .unwrap();
    replicated
        .replicate_and_log(LogRecord::Operation(OperationRecord {
            header: RecordHeader { lsn: Lsn::INVALID, psn: Psn::INVALID, record_position: RecordPosition(0), previous_physical_record: None },
            transaction_id: TransactionId(1),
            previous_logical_lsn: Lsn(2),
            redo: vec![],
            undo: vec![],
        }))
        .await
        .unwrap();
    let (_, end_tx_lsn, _) = replicated
        .replicate_and_log(LogRecord::EndTransaction(EndTransactionRecord {
            header: RecordHeader { lsn: Lsn::INVALID, psn: Psn::INVALID, record_position: RecordPosition(0), previous_physical_record: None },
            transaction_id: TransactionId(1),
            outcome: TransactionOutcome::Committed,
        }))
        .await
        .unwrap();

    let checkpoint_manager = Arc::new(CheckpointManager::new(
        replicated,
        log_manager,
        provider,
        tx_map,
        truncation,
    ));

    let requests = (0..10).map(|_| {
        let checkpoint_manager = checkpoint_manager.clone();
        async move { checkpoint_manager.request_group_commit().await }
    });
    let results = join_all(requests).await;
    assert!(results.iter().all(Result::is_ok));

    writer.flush_async().await.unwrap();
    let records = PhysicalLogWriter::<FileLogicalLog>::read_all_records(&current_log).await.unwrap();
    let barrier_count = records.iter().filter(|r| matches!(r, LogRecord::Barrier(_))).count();
    assert_eq!(barrier_count, 1, "10 concurrent requests must coalesce onto a single barrier append");

    assert_eq!(
        checkpoint_manager.last_stable_lsn().await,
        end_tx_lsn,
        "lastStableLsn must fence to the EndTx LSN, not the barrier's own newly assigned LSN"
    );
}
