//! Crate-wide error types.
//!
//! Each subsystem defines its own narrow error enum; [`ReplicatorError`]
//! composes them with `#[from]` so a caller that only wants "did this
//! succeed" can match on one type, while a caller that cares about a specific
//! subsystem can match the nested variant directly.

use thiserror::Error;

use crate::ids::{Lsn, Psn};

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ReplicatorError>;

/// Errors raised by the logical/physical log layer (components L, P, M).
#[derive(Error, Debug)]
pub enum LogError {
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("record serialization failed: {source}")]
    Serialization {
        #[from]
        source: bincode::Error,
    },

    #[error("corruption detected at record position {position}: {reason}")]
    Corruption { position: u64, reason: String },

    #[error("log reader range rejected: start position {start} is before log head {head}")]
    ReaderBeforeHead { start: u64, head: u64 },

    #[error("head truncation at psn {0:?} would cross an active reader range")]
    HeadTruncationBlocked(Psn),

    #[error("the log has been closed")]
    Closed,

    #[error("operation was cancelled")]
    Cancelled,
}

/// Errors raised by the checkpoint/truncation state machine (components K, T).
#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("checkpoint is in state {state}, expected {expected}")]
    UnexpectedState { state: String, expected: String },

    #[error("state provider checkpoint failed: {0}")]
    StateProviderFailed(String),

    #[error("checkpoint was aborted")]
    Aborted,

    #[error(transparent)]
    Log(#[from] LogError),
}

/// Errors raised while dispatching records to the state provider (component O).
#[derive(Error, Debug)]
pub enum ApplyError {
    #[error("apply failed for lsn {lsn:?}: {reason}")]
    ApplyFailed { lsn: Lsn, reason: String },

    #[error("unlock failed for lsn {lsn:?}: {reason}")]
    UnlockFailed { lsn: Lsn, reason: String },

    #[error("fatal apply error during recovery at lsn {lsn:?}: {reason}")]
    FatalDuringRecovery { lsn: Lsn, reason: String },
}

/// Errors raised by the backup/restore pipeline (component B).
#[derive(Error, Debug)]
pub enum BackupError {
    #[error("no full backup found in folder")]
    MissingFullBackup,

    #[error("more than one full backup found in folder")]
    MultipleFullBackups,

    #[error("backup chain broken: entry {backup_id} does not chain from {expected_parent}")]
    BrokenChain {
        backup_id: uuid::Uuid,
        expected_parent: uuid::Uuid,
    },

    #[error("backup chain contains inconsistent data loss versions")]
    InconsistentDataLossVersion,

    #[error("backup chain entry {backup_id} does not strictly increase its predecessor's LSN")]
    NonIncreasingBackupLsn { backup_id: uuid::Uuid },

    #[error("backup log for {backup_id} contains non-monotone logical LSNs")]
    NonMonotoneLogicalLsn { backup_id: uuid::Uuid },

    #[error("backup log block at offset {offset} failed CRC64 validation")]
    BlockChecksumMismatch { offset: u64 },

    #[error("backup log block at offset {offset} claims size {claimed} exceeding file bounds")]
    BlockSizeOutOfBounds { offset: u64, claimed: u64 },

    #[error("first record of backup log must be Indexing, found {found}")]
    FirstRecordNotIndexing { found: String },

    #[error("accumulated incremental backup size exceeds configured fraction of state size")]
    IncrementalTooLarge,

    #[error("state provider backup failed: {0}")]
    StateProviderFailed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Log(#[from] LogError),
}

/// Errors raised while recovering a log on open or after restore (component E).
#[derive(Error, Debug)]
pub enum RecoveryError {
    #[error("no complete checkpoint chain could be located during recovery")]
    BrokenCheckpointChain,

    #[error(transparent)]
    Apply(#[from] ApplyError),

    #[error(transparent)]
    Log(#[from] LogError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}

/// Errors raised while producing or consuming a copy stream (components Y, S).
#[derive(Error, Debug)]
pub enum CopyError {
    #[error("target progress vector diverges from source with no resolvable copy mode")]
    UnresolvableCopyMode,

    #[error(transparent)]
    Log(#[from] LogError),

    #[error(transparent)]
    Apply(#[from] ApplyError),
}

/// Top-level error type returned by the crate's public APIs.
#[derive(Error, Debug)]
pub enum ReplicatorError {
    #[error(transparent)]
    Log(#[from] LogError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    Apply(#[from] ApplyError),

    #[error(transparent)]
    Backup(#[from] BackupError),

    #[error(transparent)]
    Recovery(#[from] RecoveryError),

    #[error(transparent)]
    Copy(#[from] CopyError),

    #[error("not primary")]
    NotPrimary,

    #[error("service too busy")]
    ServiceTooBusy,

    #[error("object closed")]
    ObjectClosed,

    #[error("operation cancelled")]
    Cancelled,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("name collision: {0}")]
    NameCollision(String),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}
