//! Log record model (spec §3.2).
//!
//! Every record carries a shared header (`RecordHeader`) plus a
//! variant-specific body. Physical records additionally carry a
//! `linked_physical_record` handle; logical records carry enough of the
//! transaction chain to let `TransactionMap` rebuild history without
//! re-reading the whole log.

mod header;
mod variants;

pub use header::RecordHeader;
pub use variants::*;

use crate::ids::{Epoch, Lsn, Psn, RecordHandle, RecordPosition, TransactionId};
use serde::{Deserialize, Serialize};

/// Tagged sum of every on-disk record variant (spec §3.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LogRecord {
    Indexing(IndexingRecord),
    UpdateEpoch(UpdateEpochRecord),
    Barrier(BarrierRecord),
    BeginTransaction(BeginTransactionRecord),
    Operation(OperationRecord),
    EndTransaction(EndTransactionRecord),
    BeginCheckpoint(BeginCheckpointRecord),
    EndCheckpoint(EndCheckpointRecord),
    CompleteCheckpoint(CompleteCheckpointRecord),
    TruncateHead(TruncateHeadRecord),
    TruncateTail(TruncateTailRecord),
    Information(InformationRecord),
    Backup(BackupLogRecord),
}

impl LogRecord {
    #[must_use]
    pub fn header(&self) -> &RecordHeader {
        match self {
            Self::Indexing(r) => &r.header,
            Self::UpdateEpoch(r) => &r.header,
            Self::Barrier(r) => &r.header,
            Self::BeginTransaction(r) => &r.header,
            Self::Operation(r) => &r.header,
            Self::EndTransaction(r) => &r.header,
            Self::BeginCheckpoint(r) => &r.header,
            Self::EndCheckpoint(r) => &r.header,
            Self::CompleteCheckpoint(r) => &r.header,
            Self::TruncateHead(r) => &r.header,
            Self::TruncateTail(r) => &r.header,
            Self::Information(r) => &r.header,
            Self::Backup(r) => &r.header,
        }
    }

    #[must_use]
    pub fn header_mut(&mut self) -> &mut RecordHeader {
        match self {
            Self::Indexing(r) => &mut r.header,
            Self::UpdateEpoch(r) => &mut r.header,
            Self::Barrier(r) => &mut r.header,
            Self::BeginTransaction(r) => &mut r.header,
            Self::Operation(r) => &mut r.header,
            Self::EndTransaction(r) => &mut r.header,
            Self::BeginCheckpoint(r) => &mut r.header,
            Self::EndCheckpoint(r) => &mut r.header,
            Self::CompleteCheckpoint(r) => &mut r.header,
            Self::TruncateHead(r) => &mut r.header,
            Self::TruncateTail(r) => &mut r.header,
            Self::Information(r) => &mut r.header,
            Self::Backup(r) => &mut r.header,
        }
    }

    #[must_use]
    pub fn lsn(&self) -> Lsn {
        self.header().lsn
    }

    #[must_use]
    pub fn psn(&self) -> Psn {
        self.header().psn
    }

    #[must_use]
    pub fn record_position(&self) -> RecordPosition {
        self.header().record_position
    }

    /// True for the record kinds the spec calls "physical" (they carry a
    /// `linked_physical_record` in addition to `previous_physical_record`).
    #[must_use]
    pub fn is_physical(&self) -> bool {
        matches!(
            self,
            Self::Indexing(_)
                | Self::BeginCheckpoint(_)
                | Self::EndCheckpoint(_)
                | Self::CompleteCheckpoint(_)
                | Self::TruncateHead(_)
                | Self::Information(_)
        )
    }

    #[must_use]
    pub fn is_logical(&self) -> bool {
        !self.is_physical()
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Indexing(_) => "Indexing",
            Self::UpdateEpoch(_) => "UpdateEpoch",
            Self::Barrier(_) => "Barrier",
            Self::BeginTransaction(_) => "BeginTransaction",
            Self::Operation(_) => "Operation",
            Self::EndTransaction(_) => "EndTransaction",
            Self::BeginCheckpoint(_) => "BeginCheckpoint",
            Self::EndCheckpoint(_) => "EndCheckpoint",
            Self::CompleteCheckpoint(_) => "CompleteCheckpoint",
            Self::TruncateHead(_) => "TruncateHead",
            Self::TruncateTail(_) => "TruncateTail",
            Self::Information(_) => "Information",
            Self::Backup(_) => "Backup",
        }
    }

    /// Transaction id this record participates in, if any (spec §3.3,
    /// `TransactionMap`).
    #[must_use]
    pub fn transaction_id(&self) -> Option<TransactionId> {
        match self {
            Self::BeginTransaction(r) => Some(r.transaction_id),
            Self::Operation(r) => Some(r.transaction_id),
            Self::EndTransaction(r) => Some(r.transaction_id),
            _ => None,
        }
    }
}

/// Lifecycle markers carried by `Information` records (spec §3.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InformationEvent {
    Recovered,
    PrimarySwap,
    Closed,
    RemovingState,
    ReplicationFinished,
}

/// Commit or abort outcome carried by `EndTransaction` (ambient detail the
/// distilled spec leaves implicit in "commit/abort").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionOutcome {
    Committed,
    Aborted,
}
