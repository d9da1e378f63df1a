//! `LoggingReplicator` (component G, spec §4.13): the top-level
//! orchestrator. Owns the primary election state machine and drives the
//! open/close sequencing across every other component.

use crate::checkpoint_manager::CheckpointManager;
use crate::error::ReplicatorError;
use crate::ids::Epoch;
use crate::log::LogicalLog;
use crate::operation_processor::{FailureMode, OperationProcessor};
use crate::recovery::RecoveryManager;
use crate::record::{InformationEvent, LogRecord};
use crate::replicated_log_manager::ReplicatedLogManager;
use crate::transaction_map::TransactionMap;
use crate::truncation_manager::LogTruncationManager;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, instrument};

/// Primary election status (spec §4.13). The source's commented-out
/// `Retained` path is unreachable per spec §9 and intentionally omitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimaryRole {
    None,
    Elected,
    Established,
    SwappingOut,
}

pub struct LoggingReplicator<L: LogicalLog> {
    replicated_log_manager: Arc<ReplicatedLogManager<L>>,
    checkpoint_manager: Arc<CheckpointManager<L>>,
    recovery_manager: Arc<RecoveryManager<L>>,
    operation_processor: Arc<OperationProcessor>,
    transaction_map: Arc<TransactionMap>,
    truncation_manager: Arc<LogTruncationManager>,
    role: RwLock<PrimaryRole>,
    epoch_established_on_disk: AtomicBool,
}

impl<L: LogicalLog> LoggingReplicator<L> {
    #[must_use]
    pub fn new(
        replicated_log_manager: Arc<ReplicatedLogManager<L>>,
        checkpoint_manager: Arc<CheckpointManager<L>>,
        recovery_manager: Arc<RecoveryManager<L>>,
        operation_processor: Arc<OperationProcessor>,
        transaction_map: Arc<TransactionMap>,
        truncation_manager: Arc<LogTruncationManager>,
    ) -> Self {
        Self {
            replicated_log_manager,
            checkpoint_manager,
            recovery_manager,
            operation_processor,
            transaction_map,
            truncation_manager,
            role: RwLock::new(PrimaryRole::None),
            epoch_established_on_disk: AtomicBool::new(false),
        }
    }

    /// Drives recovery/bootstrap (component E) then switches the operation
    /// processor into steady-state dispatch.
    #[instrument(skip_all)]
    pub async fn open_async(&self, bootstrapped: bool) -> Result<(), ReplicatorError> {
        self.recovery_manager.open_async(bootstrapped).await?;
        self.operation_processor.set_failure_mode(FailureMode::SteadyState).await;
        Ok(())
    }

    /// Spec §4.13: a replica is elected primary for `new_epoch`. The epoch
    /// is not yet durable until the first logical operation after election
    /// forces a `Barrier`.
    #[instrument(skip_all, fields(data_loss_version = new_epoch.data_loss_version, configuration_version = new_epoch.configuration_version))]
    pub async fn change_role_to_primary(&self, new_epoch: Epoch) -> Result<(), ReplicatorError> {
        *self.role.write().await = PrimaryRole::Elected;
        self.epoch_established_on_disk.store(false, Ordering::SeqCst);
        self.replicated_log_manager.update_epoch(new_epoch).await?;
        info!("elected primary, epoch not yet established on disk");
        Ok(())
    }

    /// Called before the first replicated logical operation after election:
    /// forces a `Barrier` to establish the new epoch on disk exactly once,
    /// then transitions `Elected -> Established`.
    #[instrument(skip_all)]
    pub async fn ensure_epoch_established(&self) -> Result<(), ReplicatorError> {
        if self.epoch_established_on_disk.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let stable_lsn = self.replicated_log_manager.current_log_tail_lsn().await;
        self.replicated_log_manager.append_barrier(stable_lsn).await?;
        let mut role = self.role.write().await;
        if *role == PrimaryRole::Elected {
            *role = PrimaryRole::Established;
        }
        info!("epoch established on disk");
        Ok(())
    }

    pub async fn current_role(&self) -> PrimaryRole {
        *self.role.read().await
    }

    /// Spec §4.13 role-transition close sequence: drain outstanding
    /// copy/replication, emit the appropriate `Information` record, wait
    /// for logical records to complete, abort any pending checkpoint, then
    /// close. `reason` selects which lifecycle marker to emit.
    #[instrument(skip_all)]
    pub async fn close_async(&self, reason: InformationEvent) -> Result<(), ReplicatorError> {
        *self.role.write().await = PrimaryRole::SwappingOut;

        self.replicated_log_manager.information(reason).await?;
        self.wait_for_pending_transactions().await;
        self.checkpoint_manager.abort_pending_checkpoint().await;
        self.replicated_log_manager.information(InformationEvent::Closed).await?;

        info!(?reason, "logging replicator closed");
        Ok(())
    }

    async fn wait_for_pending_transactions(&self) {
        while self.transaction_map.pending_count() > 0 {
            tokio::task::yield_now().await;
        }
    }

    /// Convenience entry point for a single logical operation: rejects
    /// non-primary callers, establishes the epoch on first use, then
    /// delegates to `ReplicatedLogManager`.
    #[instrument(skip_all)]
    pub async fn replicate_and_log(&self, record: LogRecord) -> Result<crate::ids::Lsn, ReplicatorError> {
        if !matches!(*self.role.read().await, PrimaryRole::Elected | PrimaryRole::Established) {
            return Err(ReplicatorError::NotPrimary);
        }
        self.ensure_epoch_established().await?;
        let (_, lsn, _) = self.replicated_log_manager.replicate_and_log(record).await?;
        self.truncation_manager.record_appended_bytes(0);
        Ok(lsn)
    }
}
