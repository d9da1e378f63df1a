//! The `LogicalLog` abstraction (component L).
//!
//! Spec §1 places the raw block-file / shared-log driver out of scope and
//! only requires "a logical log abstraction with append, flush, read,
//! truncate-head, truncate-tail, close." [`LogicalLog`] is that contract;
//! [`FileLogicalLog`] is the concrete, file-backed implementation this crate
//! ships so the rest of the engine has something to run against, grounded on
//! the donor's `LogWriter` (`storage/wal/log_writer.rs`): a `tokio::fs::File`
//! wrapped in a `BufWriter`, append-only, with an explicit flush boundary.

mod file_log;

pub use file_log::FileLogicalLog;

use crate::error::LogError;
use async_trait::async_trait;

/// Append-only byte log with truncate-head/tail and read streams.
///
/// Implementors need not be internally synchronized against concurrent
/// appenders — the logical log is single-writer by construction (spec §5,
/// "the logical log file is single-writer... and multi-reader").
#[async_trait]
pub trait LogicalLog: Send + Sync {
    /// Appends `bytes` at the current end of the log and returns the byte
    /// offset it was written at. Buffered; not guaranteed durable until
    /// `flush` returns.
    async fn append(&self, bytes: &[u8]) -> Result<u64, LogError>;

    /// Makes all appends since the last flush durable.
    async fn flush(&self) -> Result<(), LogError>;

    /// Reads `len` bytes starting at `offset`.
    async fn read(&self, offset: u64, len: u64) -> Result<Vec<u8>, LogError>;

    /// Discards all bytes before `offset`. Implementations may choose to
    /// physically reclaim space lazily.
    async fn truncate_head(&self, offset: u64) -> Result<(), LogError>;

    /// Discards all bytes at or after `offset`, resuming appends from there.
    async fn truncate_tail(&self, offset: u64) -> Result<(), LogError>;

    /// Current end-of-log offset.
    async fn len(&self) -> Result<u64, LogError>;

    async fn is_empty(&self) -> Result<bool, LogError> {
        Ok(self.len().await? == 0)
    }

    /// Closes the log; further operations return `LogError::Closed`.
    async fn close(&self) -> Result<(), LogError>;
}
