//! `BackupManager` (component B, spec §4.11).
//!
//! Orchestrates full and incremental backups: drives `StateProvider` for the
//! state snapshot (full backups only), writes the relevant log tail through
//! `BackupLogFile`, and persists `BackupFolderInfo` metadata so the chain can
//! be validated later without re-reading every log file.

pub mod folder_info;
pub mod log_file;

pub use folder_info::{BackupFolderInfo, BackupMetadata, BackupVersion};
pub use log_file::BackupLogFile;

use crate::contracts::StateProvider;
use crate::error::BackupError;
use crate::ids::{Epoch, Lsn};
use crate::record::{IndexingRecord, LogRecord, RecordHeader};
use crate::ids::{Psn, RecordPosition};
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use tokio::fs::OpenOptions;
use tracing::{info, instrument};
use uuid::Uuid;

pub struct BackupManager {
    state_provider: Arc<dyn StateProvider>,
}

impl BackupManager {
    #[must_use]
    pub fn new(state_provider: Arc<dyn StateProvider>) -> Self {
        Self { state_provider }
    }

    /// Spec §4.11 full backup: snapshots state via `StateProvider`, writes
    /// the entire log tail (genesis onward) into `backup.log`, and records
    /// metadata with `parent_backup_id` set to the nil UUID.
    #[instrument(skip_all, fields(folder = %folder.display()))]
    pub async fn backup_full_async(
        &self,
        folder: &Path,
        genesis_epoch: Epoch,
        backup_epoch: Epoch,
        backup_lsn: Lsn,
        tail_records: &[LogRecord],
    ) -> Result<BackupMetadata, BackupError> {
        tokio::fs::create_dir_all(folder).await?;
        self.state_provider
            .backup_state(folder)
            .await
            .map_err(|e| BackupError::StateProviderFailed(e.to_string()))?;

        let mut records = Vec::with_capacity(tail_records.len() + 1);
        records.push(genesis_indexing(genesis_epoch));
        records.extend_from_slice(tail_records);

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(folder.join("backup.log"))
            .await?;
        BackupLogFile::write_records(&mut file, &records).await?;

        let metadata = BackupMetadata {
            backup_id: Uuid::new_v4(),
            parent_backup_id: Uuid::nil(),
            is_full: true,
            version: BackupVersion { epoch: backup_epoch, lsn: backup_lsn },
            backup_time: Utc::now(),
        };
        BackupFolderInfo::write_metadata_async(folder, &metadata).await?;
        info!(backup_id = %metadata.backup_id, records = records.len(), "full backup written");
        Ok(metadata)
    }

    /// Spec §4.11 incremental backup: no state snapshot, just the log
    /// records produced since `parent.version`. Rejects an incremental that
    /// would exceed `backup_incremental_size_fraction` of the full backup's
    /// recorded state size (spec §4.14); the caller supplies the already
    /// computed ratio since this crate does not measure state size itself.
    #[instrument(skip_all, fields(folder = %folder.display()))]
    pub async fn backup_incremental_async(
        &self,
        folder: &Path,
        parent: &BackupMetadata,
        backup_epoch: Epoch,
        backup_lsn: Lsn,
        records_since_parent: &[LogRecord],
        size_fraction_of_full: f64,
        max_fraction: f64,
    ) -> Result<BackupMetadata, BackupError> {
        if size_fraction_of_full > max_fraction {
            return Err(BackupError::IncrementalTooLarge);
        }

        tokio::fs::create_dir_all(folder).await?;

        let mut records = Vec::with_capacity(records_since_parent.len() + 1);
        records.push(genesis_indexing(backup_epoch));
        records.extend_from_slice(records_since_parent);

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(folder.join("backup.log"))
            .await?;
        BackupLogFile::write_records(&mut file, &records).await?;

        let metadata = BackupMetadata {
            backup_id: Uuid::new_v4(),
            parent_backup_id: parent.backup_id,
            is_full: false,
            version: BackupVersion { epoch: backup_epoch, lsn: backup_lsn },
            backup_time: Utc::now(),
        };
        BackupFolderInfo::write_metadata_async(folder, &metadata).await?;
        info!(backup_id = %metadata.backup_id, parent = %parent.backup_id, "incremental backup written");
        Ok(metadata)
    }
}

fn genesis_indexing(epoch: Epoch) -> LogRecord {
    LogRecord::Indexing(IndexingRecord {
        header: RecordHeader {
            lsn: Lsn::ZERO,
            psn: Psn::ZERO,
            record_position: RecordPosition(0),
            previous_physical_record: None,
        },
        epoch,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::ApplyContext;
    use crate::error::ApplyError;
    use async_trait::async_trait;

    struct NoopStateProvider;

    #[async_trait]
    impl StateProvider for NoopStateProvider {
        async fn apply(&self, _record: &LogRecord, _context: ApplyContext) -> Result<(), ApplyError> {
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

    #[tokio::test]
    async fn full_then_incremental_chain_analyzes_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let manager = BackupManager::new(Arc::new(NoopStateProvider));

        let full_folder = dir.path().join("full");
        let full = manager
            .backup_full_async(&full_folder, Epoch::ZERO, Epoch::new(1, 1), Lsn(10), &[])
            .await
            .unwrap();

        let inc_folder = dir.path().join("inc1");
        let inc = manager
            .backup_incremental_async(&inc_folder, &full, Epoch::new(1, 1), Lsn(20), &[], 0.1, 0.5)
            .await
            .unwrap();

        let mut candidates = BackupFolderInfo::read_folder_async(&full_folder).await.unwrap();
        candidates.extend(BackupFolderInfo::read_folder_async(&inc_folder).await.unwrap());

        let info = BackupFolderInfo::analyze(candidates).await.unwrap();
        assert_eq!(info.full.backup_id, full.backup_id);
        assert_eq!(info.chain.len(), 1);
        assert_eq!(info.chain[0].backup_id, inc.backup_id);
    }

    #[tokio::test]
    async fn incremental_over_size_fraction_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let manager = BackupManager::new(Arc::new(NoopStateProvider));
        let full = manager
            .backup_full_async(&dir.path().join("full"), Epoch::ZERO, Epoch::new(1, 1), Lsn(10), &[])
            .await
            .unwrap();

        let result = manager
            .backup_incremental_async(&dir.path().join("inc1"), &full, Epoch::new(1, 1), Lsn(20), &[], 0.9, 0.5)
            .await;
        assert!(matches!(result, Err(BackupError::IncrementalTooLarge)));
    }
}
