//! `BackupFolderInfo` (spec §4.11/§6.3, scenario 5, property P8).
//!
//! A backup folder holds one full backup plus zero or more incrementals,
//! each naming its parent by id. `analyze` trims to the single chain
//! anchored on the newest incremental and walked backward to the full
//! backup, then verifies every kept entry's `backup.log` on disk.

use crate::backup::log_file::BackupLogFile;
use crate::error::BackupError;
use crate::ids::{Epoch, Lsn};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// `(Epoch, Lsn)`, ordered the same way `Epoch` orders: by data-loss version
/// then configuration version then LSN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BackupVersion {
    pub epoch: Epoch,
    pub lsn: Lsn,
}

/// One backup's sidecar metadata (spec §6.3), persisted as
/// `<backup_id>.backupmetadata.json` next to the backup's data files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupMetadata {
    pub backup_id: Uuid,
    pub parent_backup_id: Uuid,
    pub is_full: bool,
    pub version: BackupVersion,
    pub backup_time: DateTime<Utc>,
}

/// The result of analyzing a folder: the full backup plus the validated
/// incremental chain, in apply order.
pub struct BackupFolderInfo {
    pub full: BackupMetadata,
    pub chain: Vec<BackupMetadata>,
}

impl BackupFolderInfo {
    /// Spec §4.11 `AnalyzeAsync` step 3 (`Trim`) / P8: exactly one full
    /// backup is required. Incrementals chain by `parent_backup_id`; the
    /// chain is anchored on the single newest (highest-`BackupVersion`)
    /// incremental and walked backward to the full backup, so any sibling
    /// branch not on that path is trimmed. If the walk back never reaches
    /// the full backup, the whole incremental set is discarded rather than
    /// kept as a partial chain. Every kept entry — full and incrementals —
    /// must share the same data-loss version.
    ///
    /// Step 4 (`Verify`) then reads each kept entry's `backup.log` (via
    /// `path` in `candidates`) and validates block framing, CRC64, the
    /// leading `Indexing` record, and monotone logical LSNs; LSNs must also
    /// strictly increase along the metadata chain itself.
    pub async fn analyze(candidates: Vec<(BackupMetadata, PathBuf)>) -> Result<Self, BackupError> {
        let full_count = candidates.iter().filter(|(b, _)| b.is_full).count();
        let (full, full_path) = match full_count {
            0 => return Err(BackupError::MissingFullBackup),
            1 => candidates.iter().find(|(b, _)| b.is_full).cloned().expect("counted above"),
            _ => return Err(BackupError::MultipleFullBackups),
        };

        let incrementals: Vec<(BackupMetadata, PathBuf)> =
            candidates.into_iter().filter(|(b, _)| !b.is_full).collect();
        let by_id: HashMap<Uuid, (BackupMetadata, PathBuf)> =
            incrementals.iter().cloned().map(|(m, p)| (m.backup_id, (m, p))).collect();

        let Some(tip) = incrementals.iter().max_by_key(|(m, _)| m.version).cloned() else {
            Self::verify_log_async(&full, &full_path).await?;
            return Ok(Self { full, chain: Vec::new() });
        };

        let mut reverse_chain = vec![tip];
        loop {
            let current = reverse_chain.last().expect("just pushed");
            if current.0.parent_backup_id == full.backup_id {
                break;
            }
            match by_id.get(&current.0.parent_backup_id) {
                Some(parent) => reverse_chain.push(parent.clone()),
                None => {
                    Self::verify_log_async(&full, &full_path).await?;
                    return Ok(Self { full, chain: Vec::new() });
                }
            }
        }
        reverse_chain.reverse();

        let mut current_dlv = full.version.epoch.data_loss_version;
        let mut current_lsn = full.version.lsn;
        for (entry, _) in &reverse_chain {
            if entry.version.epoch.data_loss_version != current_dlv {
                return Err(BackupError::InconsistentDataLossVersion);
            }
            if entry.version.lsn <= current_lsn {
                return Err(BackupError::NonIncreasingBackupLsn { backup_id: entry.backup_id });
            }
            current_dlv = entry.version.epoch.data_loss_version;
            current_lsn = entry.version.lsn;
        }

        Self::verify_log_async(&full, &full_path).await?;
        for (entry, path) in &reverse_chain {
            Self::verify_log_async(entry, path).await?;
        }

        Ok(Self { full, chain: reverse_chain.into_iter().map(|(m, _)| m).collect() })
    }

    /// Reads `folder/backup.log` and validates it end to end: block
    /// framing, CRC64, and a leading `Indexing` record are checked by
    /// [`BackupLogFile::read_records`] itself; this adds the monotone
    /// logical-LSN check across the decoded records.
    async fn verify_log_async(metadata: &BackupMetadata, folder: &Path) -> Result<(), BackupError> {
        let mut file = tokio::fs::OpenOptions::new().read(true).open(folder.join("backup.log")).await?;
        let records = BackupLogFile::read_records(&mut file).await?;

        let mut previous_lsn: Option<Lsn> = None;
        for record in &records {
            let lsn = record.lsn();
            if let Some(prev) = previous_lsn {
                if lsn <= prev {
                    return Err(BackupError::NonMonotoneLogicalLsn { backup_id: metadata.backup_id });
                }
            }
            previous_lsn = Some(lsn);
        }
        Ok(())
    }

    /// Reads every `*.backupmetadata.json` file under `folder` as a
    /// candidate for [`analyze`], paired with `folder` itself (where the
    /// entry's `backup.log` lives).
    pub async fn read_folder_async(folder: &Path) -> Result<Vec<(BackupMetadata, PathBuf)>, BackupError> {
        let mut entries = tokio::fs::read_dir(folder).await?;
        let mut metadata = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.to_string_lossy().ends_with(".backupmetadata.json") {
                let bytes = tokio::fs::read(&path).await?;
                let parsed: BackupMetadata =
                    serde_json::from_slice(&bytes).map_err(|e| BackupError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
                metadata.push((parsed, folder.to_path_buf()));
            }
        }
        Ok(metadata)
    }

    pub async fn write_metadata_async(folder: &Path, metadata: &BackupMetadata) -> Result<(), BackupError> {
        let path = folder.join(format!("{}.backupmetadata.json", metadata.backup_id));
        let bytes = serde_json::to_vec_pretty(metadata).map_err(|e| BackupError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
        tokio::fs::write(path, bytes).await?;
        Ok(())
    }
}
