//! `RecoveryManager` (component E, spec §4.10).
//!
//! `OpenAsync` bootstraps a brand-new log with the genesis record sequence
//! (spec §4.3/scenario 1) or, for an existing log, locates the last
//! completed checkpoint chain; `PerformRecoveryAsync` replays every record
//! since that point through the normal apply pipeline, rebuilding
//! `TransactionMap` along the way.

use crate::checkpoint_manager::CheckpointManager;
use crate::contracts::{ApplyContext, ProcessingMode};
use crate::error::RecoveryError;
use crate::ids::{Epoch, Lsn};
use crate::log::LogicalLog;
use crate::log_manager::LogManager;
use crate::operation_processor::{FailureMode, OperationProcessor};
use crate::physical_log_writer::PhysicalLogWriter;
use crate::record::{InformationEvent, LogRecord, TruncateHeadRecord};
use crate::replicated_log_manager::ReplicatedLogManager;
use crate::transaction_map::TransactionMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Bounds the backward walk for the last `TruncateHead` record (spec §9
/// Open question 3): a malformed or cyclic chain fails recovery instead of
/// looping forever.
const MAX_CHECKPOINT_CHAIN_WALK: usize = 10_000;

pub struct RecoveryManager<L: LogicalLog> {
    log_manager: Arc<LogManager>,
    replicated_log_manager: Arc<ReplicatedLogManager<L>>,
    checkpoint_manager: Arc<CheckpointManager<L>>,
    operation_processor: Arc<OperationProcessor>,
    transaction_map: Arc<TransactionMap>,
}

impl<L: LogicalLog> RecoveryManager<L> {
    #[must_use]
    pub fn new(
        log_manager: Arc<LogManager>,
        replicated_log_manager: Arc<ReplicatedLogManager<L>>,
        checkpoint_manager: Arc<CheckpointManager<L>>,
        operation_processor: Arc<OperationProcessor>,
        transaction_map: Arc<TransactionMap>,
    ) -> Self {
        Self {
            log_manager,
            replicated_log_manager,
            checkpoint_manager,
            operation_processor,
            transaction_map,
        }
    }

    /// Spec §4.3/§4.10 `OpenAsync`. `bootstrapped` is `LogManager::open`'s
    /// second return value: `true` for a freshly created, empty log.
    #[instrument(skip_all, fields(bootstrapped))]
    pub async fn open_async(&self, bootstrapped: bool) -> Result<Lsn, RecoveryError> {
        if bootstrapped {
            self.bootstrap_genesis().await?;
            return Ok(Lsn::ZERO);
        }
        self.perform_recovery_async().await
    }

    /// Scenario 1: `Indexing(0) -> UpdateEpoch(0,0) -> BeginCheckpoint(zero)
    /// -> Barrier(LSN=1) -> EndCheckpoint -> CompleteCheckpoint`. Reuses
    /// `CheckpointManager`'s already-tested state machine for the
    /// checkpoint half instead of re-deriving the `BeginCheckpoint ->
    /// EndCheckpoint -> CompleteCheckpoint` sequence here.
    async fn bootstrap_genesis(&self) -> Result<(), RecoveryError> {
        info!("bootstrapping genesis record sequence on empty log");
        let genesis_indexing = LogManager::genesis_indexing_record();
        self.replicated_log_manager
            .replicate_and_log(LogRecord::Indexing(genesis_indexing))
            .await?;

        self.replicated_log_manager.update_epoch(Epoch::ZERO).await?;

        self.checkpoint_manager.initiate_checkpoint(true, false).await?;
        self.checkpoint_manager.request_group_commit().await?;
        self.checkpoint_manager.perform_checkpoint_async(None).await?;

        self.replicated_log_manager.information(InformationEvent::Recovered).await?;
        Ok(())
    }

    /// Spec §4.10 `PerformRecoveryAsync`: reads the whole physical log,
    /// locates the last `TruncateHead` marker (bounded walk, §9 decision
    /// 3), rebuilds `TransactionMap` from the `BeginTransaction`/
    /// `Operation`/`EndTransaction` records seen, and redoes every record
    /// through `OperationProcessor` honoring its normal processing-mode
    /// classification. Apply/unlock failures during recovery are fatal
    /// (spec §4.7) and abort the open.
    #[instrument(skip_all)]
    pub async fn perform_recovery_async(&self) -> Result<Lsn, RecoveryError> {
        self.operation_processor.set_failure_mode(FailureMode::Recovering).await;

        let records = PhysicalLogWriter::read_all_records(&*self.log_manager.current_log()).await?;
        let _last_truncate_head = Self::recovered_last_truncate_head(&records)?;

        let mut last_lsn = Lsn::ZERO;
        for record in &records {
            self.operation_processor.register_for_lookup(record.clone()).await;
            last_lsn = record.lsn();

            if let Some(tx_id) = record.transaction_id() {
                match record {
                    LogRecord::BeginTransaction(_) => {
                        self.transaction_map.begin_transaction(tx_id, record.lsn(), record.clone());
                    }
                    LogRecord::Operation(_) => {
                        self.transaction_map.add_operation(tx_id, record.clone());
                    }
                    LogRecord::EndTransaction(_) => {
                        self.transaction_map.end_transaction(tx_id, record.clone());
                    }
                    _ => unreachable!("transaction_id() only set for these three variants"),
                }
            }

            match OperationProcessor::identify_processing_mode(record) {
                ProcessingMode::Normal => {
                    self.operation_processor.apply_one(record, ApplyContext::Redo).await?;
                    self.operation_processor.unlock_one(record).await?;
                }
                ProcessingMode::ApplyImmediately => {
                    self.operation_processor.apply_one(record, ApplyContext::Redo).await?;
                }
                ProcessingMode::ProcessImmediately => {}
            }
        }

        self.transaction_map.advance_stable_lsn(last_lsn);
        self.operation_processor.set_failure_mode(FailureMode::SteadyState).await;
        self.replicated_log_manager.information(InformationEvent::Recovered).await?;

        info!(replayed = records.len(), last_lsn = last_lsn.0, "recovery complete");
        Ok(last_lsn)
    }

    /// Spec §9 Open question 3: walks `records` backward looking for the
    /// last `TruncateHead` marker, capped at `MAX_CHECKPOINT_CHAIN_WALK`
    /// steps. Returns `BrokenCheckpointChain` instead of looping forever on
    /// a log with no `TruncateHead` within the bound and no earlier
    /// terminator.
    fn recovered_last_truncate_head(records: &[LogRecord]) -> Result<Option<&TruncateHeadRecord>, RecoveryError> {
        for (steps, record) in records.iter().rev().enumerate() {
            if let LogRecord::TruncateHead(r) = record {
                return Ok(Some(r));
            }
            if let LogRecord::Indexing(_) = record {
                // Reached the log's own head marker: a TruncateHead record,
                // if any, must be before this point in a well-formed log.
                return Ok(None);
            }
            if steps >= MAX_CHECKPOINT_CHAIN_WALK {
                warn!(steps, "checkpoint chain walk exceeded bound without finding Indexing or TruncateHead");
                return Err(RecoveryError::BrokenCheckpointChain);
            }
        }
        Ok(None)
    }
}
