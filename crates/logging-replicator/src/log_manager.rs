//! `LogManager` (component M, spec §4.3).
//!
//! Owns the log file lifecycle (current / `_Copy` / `_Backup` suffixes),
//! the ref-counted `LogReaderRange` table, and head-truncation gating
//! (I8: head truncation never crosses the earliest live reader).

use crate::error::LogError;
use crate::ids::{Epoch, RecordPosition};
use crate::log::{FileLogicalLog, LogicalLog};
use crate::record::{IndexingRecord, LogRecord, RecordHeader};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tracing::{info, instrument, warn};

/// A reader's claim on a range of the log (spec §3.3 `LogReaderRange`).
/// Head truncation is gated by `min(starting_record_position)` across live
/// readers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaderType {
    Copy,
    FullCopy,
    Backup,
}

#[derive(Debug, Clone)]
struct ReaderRange {
    starting_position: u64,
    name: String,
    reader_type: ReaderType,
    ref_count: u32,
}

struct PendingHeadTruncation {
    target_position: u64,
    notify: Arc<Notify>,
}

struct Readers {
    ranges: HashMap<u64, ReaderRange>,
    pending_truncation: Option<PendingHeadTruncation>,
}

/// Owns the current logical log plus the reader-range table gating head
/// truncation. Grounded on the donor's file-lifecycle handling in
/// `storage/wal/mod.rs` (`WALManager` opening/rotating segment files),
/// adapted to the spec's current/copy/backup suffix model.
pub struct LogManager {
    work_folder: PathBuf,
    current: Arc<FileLogicalLog>,
    log_head_position: AtomicU64,
    readers: Mutex<Readers>,
}

impl LogManager {
    /// Spec §4.3 `OpenAsync`: opens or creates the current log. If empty,
    /// bootstraps the genesis record sequence. Returns the manager plus the
    /// genesis records if bootstrapping occurred (empty otherwise — the
    /// caller, `RecoveryManager`, decides what to do with them).
    #[instrument(skip_all, fields(work_folder = %work_folder.as_ref().display()))]
    pub async fn open(work_folder: impl AsRef<Path>) -> Result<(Self, bool), LogError> {
        let work_folder = work_folder.as_ref().to_path_buf();
        let current_path = work_folder.join("current.log");
        let log = Arc::new(FileLogicalLog::open(&current_path).await?);
        let bootstrapped = log.is_empty().await?;

        let manager = Self {
            work_folder,
            current: log,
            log_head_position: AtomicU64::new(0),
            readers: Mutex::new(Readers {
                ranges: HashMap::new(),
                pending_truncation: None,
            }),
        };

        if bootstrapped {
            info!("log is empty, caller must bootstrap genesis records");
        }

        Ok((manager, bootstrapped))
    }

    #[must_use]
    pub fn current_log(&self) -> Arc<FileLogicalLog> {
        Arc::clone(&self.current)
    }

    #[must_use]
    pub fn log_head_position(&self) -> u64 {
        self.log_head_position.load(Ordering::Acquire)
    }

    /// Builds the genesis record sequence for a freshly created log
    /// (spec §4.3): `Indexing(0) -> UpdateEpoch(0,0) -> BeginCheckpoint(zero)
    /// -> Barrier(LSN=1) -> EndCheckpoint -> CompleteCheckpoint`. Returns the
    /// records for the caller (`RecoveryManager`) to insert through the
    /// physical writer; `LogManager` does not itself own record
    /// construction for the non-`Indexing` variants, which need handles from
    /// the arena the physical writer maintains.
    #[must_use]
    pub fn genesis_indexing_record() -> IndexingRecord {
        IndexingRecord {
            header: RecordHeader {
                lsn: crate::ids::Lsn::ZERO,
                psn: crate::ids::Psn::INVALID,
                record_position: RecordPosition(0),
                previous_physical_record: None,
            },
            epoch: Epoch::ZERO,
        }
    }

    /// Spec §4.3 `AddLogReader`: rejects a start position before the log
    /// head; otherwise ref-counts an existing identical range or inserts a
    /// new one. A `FullCopy` reader arriving at an existing position
    /// upgrades that range's type.
    pub async fn add_log_reader(
        &self,
        starting_position: u64,
        name: impl Into<String>,
        reader_type: ReaderType,
    ) -> Result<(), LogError> {
        let head = self.log_head_position();
        if starting_position < head {
            return Err(LogError::ReaderBeforeHead {
                start: starting_position,
                head,
            });
        }

        let mut readers = self.readers.lock().await;
        match readers.ranges.get_mut(&starting_position) {
            Some(range) => {
                range.ref_count += 1;
                if reader_type == ReaderType::FullCopy {
                    range.reader_type = ReaderType::FullCopy;
                }
            }
            None => {
                readers.ranges.insert(
                    starting_position,
                    ReaderRange {
                        starting_position,
                        name: name.into(),
                        reader_type,
                        ref_count: 1,
                    },
                );
            }
        }
        Ok(())
    }

    /// Spec §4.3 `RemoveLogReader`: decrements the ref count; on zero,
    /// removes the range and performs any truncation that was gated on it.
    pub async fn remove_log_reader(&self, starting_position: u64) -> Result<(), LogError> {
        let mut readers = self.readers.lock().await;
        let should_remove = if let Some(range) = readers.ranges.get_mut(&starting_position) {
            range.ref_count -= 1;
            range.ref_count == 0
        } else {
            false
        };
        if should_remove {
            readers.ranges.remove(&starting_position);
        }

        let earliest = readers.ranges.keys().copied().min();
        if let Some(pending) = &readers.pending_truncation {
            let unblocked = earliest.is_none_or(|e| e >= pending.target_position);
            if unblocked {
                let target = pending.target_position;
                let notify = Arc::clone(&pending.notify);
                readers.pending_truncation = None;
                drop(readers);
                self.do_truncate_head(target).await?;
                notify.notify_waiters();
            }
        }
        Ok(())
    }

    /// Spec §4.3 `ProcessLogHeadTruncationAsync`: truncates immediately if
    /// no reader blocks the proposed position (I8); otherwise parks a
    /// pending truncation until the earliest blocking reader leaves.
    #[instrument(skip_all, fields(target_position))]
    pub async fn process_log_head_truncation_async(&self, target_position: u64) -> Result<(), LogError> {
        let mut readers = self.readers.lock().await;
        let earliest = readers.ranges.keys().copied().min();

        match earliest {
            Some(e) if e < target_position => {
                warn!(earliest = e, target_position, "head truncation blocked by active reader");
                readers.pending_truncation = Some(PendingHeadTruncation {
                    target_position,
                    notify: Arc::new(Notify::new()),
                });
                Ok(())
            }
            _ => {
                drop(readers);
                self.do_truncate_head(target_position).await
            }
        }
    }

    async fn do_truncate_head(&self, target_position: u64) -> Result<(), LogError> {
        self.current.truncate_head(target_position).await?;
        self.log_head_position.store(target_position, Ordering::Release);
        info!(target_position, "log head truncated");
        Ok(())
    }

    /// Spec §4.3 `CreateCopyLogAsync`: creates the `_Copy` log file, writes
    /// a starting `Indexing` record, and returns the new logical log for
    /// the caller (`CheckpointManager`/`SecondaryDrainManager`) to attach a
    /// fresh `PhysicalLogWriter` to.
    pub async fn create_copy_log_async(&self) -> Result<Arc<FileLogicalLog>, LogError> {
        let copy_path = self.work_folder.join("current.log_Copy");
        let copy_log = Arc::new(FileLogicalLog::open(&copy_path).await?);
        Ok(copy_log)
    }

    /// Spec §4.3 `RenameCopyLogAtomicallyAsync`: after a full-copy
    /// checkpoint completes, atomically replaces the current log with the
    /// copy log (current -> `_Backup`, copy -> current).
    #[instrument(skip_all)]
    pub async fn rename_copy_log_atomically_async(&self) -> Result<(), LogError> {
        self.current.close().await?;
        let current_path = self.work_folder.join("current.log");
        let backup_path = self.work_folder.join("current.log_Backup");
        let copy_path = self.work_folder.join("current.log_Copy");

        tokio::fs::rename(&current_path, &backup_path).await?;
        tokio::fs::rename(&copy_path, &current_path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn p6_add_log_reader_rejects_before_head() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, _) = LogManager::open(dir.path()).await.unwrap();
        manager.process_log_head_truncation_async(10).await.unwrap();
        let err = manager.add_log_reader(5, "reader", ReaderType::Copy).await.unwrap_err();
        assert!(matches!(err, LogError::ReaderBeforeHead { .. }));
    }

    #[tokio::test]
    async fn scenario_3_head_truncation_gated_by_reader() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, _) = LogManager::open(dir.path()).await.unwrap();

        manager.add_log_reader(100, "reader-at-i1", ReaderType::Copy).await.unwrap();
        manager.process_log_head_truncation_async(200).await.unwrap();
        assert_eq!(manager.log_head_position(), 0, "truncation must be blocked");

        manager.remove_log_reader(100).await.unwrap();
        assert_eq!(manager.log_head_position(), 200, "truncation proceeds once reader leaves");
    }
}
