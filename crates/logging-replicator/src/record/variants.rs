use super::header::RecordHeader;
use super::{InformationEvent, TransactionOutcome};
use crate::ids::{Epoch, Lsn, RecordHandle, ReplicaId, TransactionId};
use crate::progress_vector::ProgressVector;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Physical: starting point of a log region; records the epoch in force at
/// that position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingRecord {
    pub header: RecordHeader,
    pub epoch: Epoch,
}

/// Logical: epoch change. LSN is set to the last LSN of the previous epoch
/// (spec §3.2); behaves as a barrier for apply ordering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateEpochRecord {
    pub header: RecordHeader,
    pub epoch: Epoch,
    pub replica_id: ReplicaId,
}

/// Logical: apply-order fence; carries the stable LSN known at emission
/// time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BarrierRecord {
    pub header: RecordHeader,
    pub last_stable_lsn: Lsn,
}

/// Logical: opens a transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeginTransactionRecord {
    pub header: RecordHeader,
    pub transaction_id: TransactionId,
    pub is_single_operation: bool,
}

/// Logical: redo/undo payload within a transaction or atomic operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationRecord {
    pub header: RecordHeader,
    pub transaction_id: TransactionId,
    pub previous_logical_lsn: Lsn,
    pub redo: Vec<u8>,
    pub undo: Vec<u8>,
}

/// Logical: commit or abort; links back to the matching `BeginTransaction`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndTransactionRecord {
    pub header: RecordHeader,
    pub transaction_id: TransactionId,
    pub outcome: TransactionOutcome,
}

/// Physical: snapshot of progress vector, earliest pending tx offset, and
/// the last completed backup record pointer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeginCheckpointRecord {
    pub header: RecordHeader,
    pub progress_vector: ProgressVector,
    pub earliest_pending_tx_offset: u64,
    pub last_completed_begin_checkpoint: Option<RecordHandle>,
    pub last_stable_lsn: Lsn,
}

/// Physical: completes phase 1; points back to its `BeginCheckpoint` and
/// carries log-head information for truncation decisions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndCheckpointRecord {
    pub header: RecordHeader,
    pub begin_checkpoint: RecordHandle,
    pub log_head_epoch: Epoch,
}

/// Physical: completes phase 2 of a checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteCheckpointRecord {
    pub header: RecordHeader,
    pub end_checkpoint: RecordHandle,
}

/// Physical: establishes a new log head, linked to the `Indexing` record it
/// truncates to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TruncateHeadRecord {
    pub header: RecordHeader,
    pub new_head_indexing: RecordHandle,
}

/// Logical: records the tail-truncation point chosen by a secondary during
/// false-progress recovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TruncateTailRecord {
    pub header: RecordHeader,
    pub truncated_to_lsn: Lsn,
}

/// Physical: lifecycle marker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InformationRecord {
    pub header: RecordHeader,
    pub event: InformationEvent,
}

/// Logical: last-completed backup identity and its parent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupLogRecord {
    pub header: RecordHeader,
    pub backup_id: Uuid,
    pub parent_backup_id: Uuid,
    pub backup_epoch: Epoch,
    pub backup_lsn: Lsn,
}
