//! `CheckpointManager` (component K, spec §4.6).
//!
//! Drives the `BeginCheckpoint -> EndCheckpoint -> CompleteCheckpoint` state
//! machine, coalesces concurrent `RequestGroupCommit` callers onto a single
//! in-flight barrier the way `FlushCallbackManager` coalesces flush
//! completions, and advances the stable LSN on each barrier completion.

use crate::contracts::StateProvider;
use crate::error::CheckpointError;
use crate::ids::{Lsn, RecordHandle};
use crate::log::LogicalLog;
use crate::log_manager::LogManager;
use crate::record::{BeginCheckpointRecord, CompleteCheckpointRecord, EndCheckpointRecord, LogRecord, RecordHeader};
use crate::replicated_log_manager::ReplicatedLogManager;
use crate::transaction_map::TransactionMap;
use crate::truncation_manager::LogTruncationManager;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tracing::{info, instrument, warn};

/// Per-checkpoint state machine (spec §4.6): `Invalid -> Ready -> Applied ->
/// Completed`, with `Faulted`/`Aborted` reachable from any pre-completion
/// state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointState {
    Invalid,
    Ready,
    Applied,
    Completed,
    Faulted,
    Aborted,
}

struct InFlightCheckpoint {
    handle: RecordHandle,
    lsn: Lsn,
    state: CheckpointState,
    is_first_on_full_copy: bool,
}

struct GroupCommit {
    inflight: bool,
    waiters: usize,
}

/// Drives checkpoints and the barrier-coalescing group-commit loop. Holds no
/// log storage itself; delegates appends to [`ReplicatedLogManager`].
pub struct CheckpointManager<L: LogicalLog> {
    replicated_log_manager: Arc<ReplicatedLogManager<L>>,
    log_manager: Arc<LogManager>,
    state_provider: Arc<dyn StateProvider>,
    transaction_map: Arc<TransactionMap>,
    truncation_manager: Arc<LogTruncationManager>,
    current: Mutex<Option<InFlightCheckpoint>>,
    last_stable_lsn: Mutex<Lsn>,
    last_completed_end_checkpoint: Mutex<Option<RecordHandle>>,
    group_commit: Mutex<GroupCommit>,
    group_commit_done: Notify,
}

impl<L: LogicalLog> CheckpointManager<L> {
    #[must_use]
    pub fn new(
        replicated_log_manager: Arc<ReplicatedLogManager<L>>,
        log_manager: Arc<LogManager>,
        state_provider: Arc<dyn StateProvider>,
        transaction_map: Arc<TransactionMap>,
        truncation_manager: Arc<LogTruncationManager>,
    ) -> Self {
        Self {
            replicated_log_manager,
            log_manager,
            state_provider,
            transaction_map,
            truncation_manager,
            current: Mutex::new(None),
            last_stable_lsn: Mutex::new(Lsn::ZERO),
            last_completed_end_checkpoint: Mutex::new(None),
            group_commit: Mutex::new(GroupCommit {
                inflight: false,
                waiters: 0,
            }),
            group_commit_done: Notify::new(),
        }
    }

    /// Spec §4.6 `InitiateCheckpoint`: assembles and appends a
    /// `BeginCheckpoint` record, moving the in-flight checkpoint to `Ready`.
    #[instrument(skip_all, fields(is_primary, is_first_on_full_copy))]
    pub async fn initiate_checkpoint(
        &self,
        is_primary: bool,
        is_first_on_full_copy: bool,
    ) -> Result<Lsn, CheckpointError> {
        let _ = is_primary;
        let mut current = self.current.lock().await;
        if let Some(existing) = current.as_ref() {
            if !matches!(existing.state, CheckpointState::Completed | CheckpointState::Aborted | CheckpointState::Faulted) {
                return Err(CheckpointError::UnexpectedState {
                    state: format!("{:?}", existing.state),
                    expected: "Completed | Aborted | Faulted".to_string(),
                });
            }
        }

        let progress_vector = self.replicated_log_manager.progress_vector_snapshot().await;
        let earliest_pending_tx_offset = self
            .transaction_map
            .oldest_pending()
            .map_or(0, |(lsn, _)| lsn.0.max(0) as u64);
        let last_stable_lsn = *self.last_stable_lsn.lock().await;
        let last_completed_begin_checkpoint = *self.last_completed_end_checkpoint.lock().await;

        let record = LogRecord::BeginCheckpoint(BeginCheckpointRecord {
            header: RecordHeader {
                lsn: crate::ids::Lsn::INVALID,
                psn: crate::ids::Psn::INVALID,
                record_position: crate::ids::RecordPosition(0),
                previous_physical_record: None,
            },
            progress_vector,
            earliest_pending_tx_offset,
            last_completed_begin_checkpoint,
            last_stable_lsn,
        });

        let (_, lsn, handle) = self
            .replicated_log_manager
            .replicate_and_log(record)
            .await
            .map_err(CheckpointError::Log)?;

        *current = Some(InFlightCheckpoint {
            handle,
            lsn,
            state: CheckpointState::Ready,
            is_first_on_full_copy,
        });
        info!(lsn = lsn.0, "checkpoint initiated");
        Ok(lsn)
    }

    /// Spec §4.6 `PerformCheckpointAsync`: runs the state-provider
    /// prepare/perform pair once the begin-checkpoint record has become
    /// `Applied` via group commit. On a full-copy's first checkpoint, stops
    /// after phase 1 (the drain pump drives phase 2 separately).
    #[instrument(skip_all)]
    pub async fn perform_checkpoint_async(&self, processing_error: Option<String>) -> Result<(), CheckpointError> {
        let mut current = self.current.lock().await;
        let Some(checkpoint) = current.as_mut() else {
            return Err(CheckpointError::UnexpectedState {
                state: "None".to_string(),
                expected: "Applied".to_string(),
            });
        };

        if processing_error.is_some() || checkpoint.state != CheckpointState::Applied {
            checkpoint.state = CheckpointState::Faulted;
            return Err(CheckpointError::StateProviderFailed(
                processing_error.unwrap_or_else(|| format!("checkpoint not Applied: {:?}", checkpoint.state)),
            ));
        }

        let lsn = checkpoint.lsn;
        let is_first_on_full_copy = checkpoint.is_first_on_full_copy;
        drop(current);

        self.state_provider
            .prepare_checkpoint(lsn)
            .await
            .map_err(|e| CheckpointError::StateProviderFailed(e.to_string()))?;
        self.state_provider
            .perform_checkpoint()
            .await
            .map_err(|e| CheckpointError::StateProviderFailed(e.to_string()))?;

        if is_first_on_full_copy {
            info!("first checkpoint on full copy: phase 1 complete, awaiting drain pump for phase 2");
            return Ok(());
        }

        self.complete_checkpoint_and_rename_if_needed(false).await
    }

    /// Spec §4.6 `CompleteCheckpointAndRenameIfNeeded`.
    #[instrument(skip_all, fields(rename_copy_log))]
    pub async fn complete_checkpoint_and_rename_if_needed(&self, rename_copy_log: bool) -> Result<(), CheckpointError> {
        let begin_handle = {
            let current = self.current.lock().await;
            current.as_ref().map(|c| c.handle).ok_or_else(|| CheckpointError::UnexpectedState {
                state: "None".to_string(),
                expected: "Applied".to_string(),
            })?
        };

        let end_record = LogRecord::EndCheckpoint(EndCheckpointRecord {
            header: RecordHeader {
                lsn: crate::ids::Lsn::INVALID,
                psn: crate::ids::Psn::INVALID,
                record_position: crate::ids::RecordPosition(0),
                previous_physical_record: None,
            },
            begin_checkpoint: begin_handle,
            log_head_epoch: crate::ids::Epoch::ZERO,
        });
        let (_, _, end_handle) = self
            .replicated_log_manager
            .replicate_and_log(end_record)
            .await
            .map_err(CheckpointError::Log)?;

        if rename_copy_log {
            self.log_manager.rename_copy_log_atomically_async().await?;
        }

        self.state_provider
            .complete_checkpoint()
            .await
            .map_err(|e| CheckpointError::StateProviderFailed(e.to_string()))?;

        let complete_record = LogRecord::CompleteCheckpoint(CompleteCheckpointRecord {
            header: RecordHeader {
                lsn: crate::ids::Lsn::INVALID,
                psn: crate::ids::Psn::INVALID,
                record_position: crate::ids::RecordPosition(0),
                previous_physical_record: None,
            },
            end_checkpoint: end_handle,
        });
        self.replicated_log_manager
            .replicate_and_log(complete_record)
            .await
            .map_err(CheckpointError::Log)?;

        let mut current = self.current.lock().await;
        if let Some(checkpoint) = current.as_mut() {
            checkpoint.state = CheckpointState::Completed;
        }
        *self.last_completed_end_checkpoint.lock().await = Some(end_handle);
        self.truncation_manager.reset_after_checkpoint();
        info!("checkpoint completed");
        Ok(())
    }

    /// Spec §4.6 group-commit loop: coalesces concurrent callers onto a
    /// single barrier emission. On the barrier's completion, advances
    /// `last_stable_lsn`, drops now-stable transactions, and promotes the
    /// in-flight checkpoint (or truncate-head) to `Applied` if its LSN has
    /// become stable.
    #[instrument(skip_all)]
    pub async fn request_group_commit(&self) -> Result<(), CheckpointError> {
        {
            let mut gc = self.group_commit.lock().await;
            if gc.inflight {
                gc.waiters += 1;
                drop(gc);
                self.group_commit_done.notified().await;
                return Ok(());
            }
            gc.inflight = true;
        }

        // The barrier's own LSN is not what becomes stable: stability is
        // fenced to the tail as it stood at emission (the last logical
        // record the barrier was requested after), not the barrier record's
        // own newly assigned LSN (spec §4.6 scenario 2).
        let fenced_tail_lsn = self.replicated_log_manager.tail_lsn().await;
        self.replicated_log_manager
            .append_barrier(fenced_tail_lsn)
            .await
            .map_err(CheckpointError::Log)?;

        *self.last_stable_lsn.lock().await = fenced_tail_lsn;
        self.transaction_map.advance_stable_lsn(fenced_tail_lsn);

        let mut current = self.current.lock().await;
        if let Some(checkpoint) = current.as_mut() {
            if checkpoint.state == CheckpointState::Ready && checkpoint.lsn <= fenced_tail_lsn {
                checkpoint.state = CheckpointState::Applied;
            }
        }
        drop(current);

        let mut gc = self.group_commit.lock().await;
        gc.inflight = false;
        let woken = gc.waiters;
        gc.waiters = 0;
        drop(gc);
        for _ in 0..woken {
            self.group_commit_done.notify_one();
        }

        Ok(())
    }

    /// Spec §9 `AbortPendingCheckpoint`: idempotent; a no-op once the
    /// checkpoint has already reached `Faulted` or `Completed` (L4).
    pub async fn abort_pending_checkpoint(&self) {
        let mut current = self.current.lock().await;
        if let Some(checkpoint) = current.as_mut() {
            if !matches!(checkpoint.state, CheckpointState::Faulted | CheckpointState::Completed) {
                warn!(lsn = checkpoint.lsn.0, "aborting pending checkpoint");
                checkpoint.state = CheckpointState::Aborted;
            }
        }
    }

    pub async fn last_stable_lsn(&self) -> Lsn {
        *self.last_stable_lsn.lock().await
    }

    pub async fn current_state(&self) -> Option<CheckpointState> {
        self.current.lock().await.as_ref().map(|c| c.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::ReplicatorTransport;
    use crate::error::ApplyError;
    use crate::ids::{Epoch, ReplicaId};
    use crate::log::FileLogicalLog;
    use crate::physical_log_writer::PhysicalLogWriter;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicI64, Ordering};
    use uuid::Uuid;

    struct SequentialTransport {
        next_lsn: AtomicI64,
    }

    #[async_trait]
    impl ReplicatorTransport for SequentialTransport {
        async fn replicate_and_log(&self, _record: &LogRecord) -> Result<Lsn, ApplyError> {
            Ok(Lsn(self.next_lsn.fetch_add(1, Ordering::SeqCst)))
        }
        async fn update_epoch(&self, _epoch: Epoch, _last_lsn: Lsn) -> Result<(), ApplyError> {
            Ok(())
        }
        fn local_replica_id(&self) -> ReplicaId {
            ReplicaId(Uuid::nil())
        }
    }

    struct NoopStateProvider;

    #[async_trait]
    impl StateProvider for NoopStateProvider {
        async fn apply(&self, _record: &LogRecord, _context: crate::contracts::ApplyContext) -> Result<(), ApplyError> {
            Ok(())
        }
        async fn unlock(&self, _record: &LogRecord) -> Result<(), ApplyError> {
            Ok(())
        }
        async fn prepare_checkpoint(&self, _checkpoint_lsn: Lsn) -> Result<(), ApplyError> {
            Ok(())
        }
        async fn perform_checkpoint(&self) -> Result<(), ApplyError> {
            Ok(())
        }
        async fn complete_checkpoint(&self) -> Result<(), ApplyError> {
            Ok(())
        }
        async fn backup_state(&self, _folder: &Path) -> Result<(), ApplyError> {
            Ok(())
        }
    }

    async fn make_manager(dir: &Path) -> (CheckpointManager<FileLogicalLog>, Arc<ReplicatedLogManager<FileLogicalLog>>) {
        let log = Arc::new(FileLogicalLog::open(dir.join("current.log")).await.unwrap());
        let writer = Arc::new(PhysicalLogWriter::new(log, 1 << 20));
        let transport = Arc::new(SequentialTransport { next_lsn: AtomicI64::new(1) });
        let replicated = Arc::new(ReplicatedLogManager::new(transport, writer, Epoch::ZERO));
        let (log_manager, _) = LogManager::open(dir).await.unwrap();
        let log_manager = Arc::new(log_manager);
        let state_provider = Arc::new(NoopStateProvider);
        let tx_map = Arc::new(TransactionMap::new());
        let truncation = Arc::new(LogTruncationManager::new(Arc::new(crate::config::ReplicatorConfig::default())));
        let manager = CheckpointManager::new(replicated.clone(), log_manager, state_provider, tx_map, truncation);
        (manager, replicated)
    }

    /// Spec §4.6 scenario 2: stable advances to the fenced tail LSN at
    /// emission (the last logical record appended before the barrier), not
    /// to the barrier record's own assigned LSN.
    #[tokio::test]
    async fn p7_group_commit_advances_stable_lsn_to_the_fenced_tail_not_the_barriers_own_lsn() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, replicated) = make_manager(dir.path()).await;

        let (_, end_tx_lsn, _) = replicated
            .replicate_and_log(LogRecord::Information(crate::record::InformationRecord {
                header: RecordHeader { lsn: Lsn::ZERO, psn: crate::ids::Psn::INVALID, record_position: crate::ids::RecordPosition(0), previous_physical_record: None },
                event: crate::record::InformationEvent::Recovered,
            }))
            .await
            .unwrap();

        manager.request_group_commit().await.unwrap();

        assert_eq!(
            manager.last_stable_lsn().await,
            end_tx_lsn,
            "stable must fence to the last logical record's own LSN, not the barrier's newly assigned LSN"
        );
    }

    #[tokio::test]
    async fn l4_abort_is_noop_once_faulted() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, _replicated) = make_manager(dir.path()).await;
        manager.initiate_checkpoint(true, false).await.unwrap();
        manager.perform_checkpoint_async(Some("boom".to_string())).await.unwrap_err();
        assert_eq!(manager.current_state().await, Some(CheckpointState::Faulted));

        manager.abort_pending_checkpoint().await;
        assert_eq!(manager.current_state().await, Some(CheckpointState::Faulted));
    }

    #[tokio::test]
    async fn full_checkpoint_cycle_reaches_completed() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, _replicated) = make_manager(dir.path()).await;
        manager.initiate_checkpoint(true, false).await.unwrap();
        manager.request_group_commit().await.unwrap();
        manager.perform_checkpoint_async(None).await.unwrap();
        assert_eq!(manager.current_state().await, Some(CheckpointState::Completed));
    }
}
