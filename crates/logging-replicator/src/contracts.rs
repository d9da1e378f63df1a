//! External contracts this crate depends on but does not implement
//! (spec §1 "Explicitly out of scope").
//!
//! The state-provider manager, the replication transport, and the raw
//! logical-log driver are all owned by the embedding process. This module
//! only declares the shape of those collaborators so the rest of the crate
//! can be written and tested against a fake.

use crate::error::ApplyError;
use crate::ids::{Epoch, Lsn, ReplicaId};
use crate::record::LogRecord;
use async_trait::async_trait;

/// How a record should be dispatched, decided by
/// `OperationProcessor::identify_processing_mode` (spec §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingMode {
    Normal,
    ApplyImmediately,
    ProcessImmediately,
}

/// Whether an apply call is redoing forward progress or undoing
/// false-progressed records (spec §4.9 `TruncateTailAsync`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyContext {
    Redo,
    FalseProgressUndo,
}

/// The opaque state-provider manager (spec §1): exposes Apply/Unlock and
/// the three-phase checkpoint protocol. Implemented by the embedding
/// process; this crate only calls through the trait.
#[async_trait]
pub trait StateProvider: Send + Sync {
    async fn apply(&self, record: &LogRecord, context: ApplyContext) -> Result<(), ApplyError>;

    async fn unlock(&self, record: &LogRecord) -> Result<(), ApplyError>;

    async fn prepare_checkpoint(&self, checkpoint_lsn: Lsn) -> Result<(), ApplyError>;

    async fn perform_checkpoint(&self) -> Result<(), ApplyError>;

    async fn complete_checkpoint(&self) -> Result<(), ApplyError>;

    /// Backs up state into `folder` (spec §4.11, full backup only).
    async fn backup_state(&self, folder: &std::path::Path) -> Result<(), ApplyError>;
}

/// The inter-replica transport (spec §1): assigns LSNs and drives actual
/// network replication. This crate only calls through the trait; the real
/// implementation lives in the embedding process's replication stack.
#[async_trait]
pub trait ReplicatorTransport: Send + Sync {
    /// Assigns the next LSN for `record` and starts replicating it to the
    /// rest of the replica set. Returns the assigned LSN.
    async fn replicate_and_log(&self, record: &LogRecord) -> Result<Lsn, ApplyError>;

    async fn update_epoch(&self, epoch: Epoch, last_lsn: Lsn) -> Result<(), ApplyError>;

    fn local_replica_id(&self) -> ReplicaId;
}
