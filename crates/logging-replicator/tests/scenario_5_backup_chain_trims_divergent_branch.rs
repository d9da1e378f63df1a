//! Spec §8 scenario 5: a backup folder with one divergent incremental is
//! trimmed to the single consistent chain anchored on the newest entry.

use logging_replicator::backup::{BackupFolderInfo, BackupLogFile, BackupMetadata, BackupVersion};
use logging_replicator::record::{IndexingRecord, LogRecord, RecordHeader};
use logging_replicator::{Epoch, Lsn, Psn};
use logging_replicator::ids::RecordPosition;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use uuid::Uuid;

fn metadata(id: Uuid, parent: Uuid, is_full: bool, dlv: i64, cv: i64, lsn: i64, minute: i64) -> BackupMetadata {
    BackupMetadata {
        backup_id: id,
        parent_backup_id: parent,
        is_full,
        version: BackupVersion { epoch: Epoch::new(dlv, cv), lsn: Lsn(lsn) },
        backup_time: DateTime::<Utc>::UNIX_EPOCH + chrono::Duration::minutes(minute),
    }
}

async fn write_backup_log(root: &std::path::Path, id: Uuid, lsn: i64) -> PathBuf {
    let dir = root.join(id.to_string());
    tokio::fs::create_dir_all(&dir).await.unwrap();
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(dir.join("backup.log"))
        .await
        .unwrap();
    let record = LogRecord::Indexing(IndexingRecord {
        header: RecordHeader { lsn: Lsn(lsn), psn: Psn(lsn), record_position: RecordPosition(0), previous_physical_record: None },
        epoch: Epoch::ZERO,
    });
    BackupLogFile::write_records(&mut file, &[record]).await.unwrap();
    dir
}

#[tokio::test]
async fn full_then_incremental_chain_trims_the_divergent_sibling() {
    let tmp = tempfile::tempdir().unwrap();

    let full_id = Uuid::from_u128(0xA);
    let i1_id = Uuid::from_u128(0x1);
    let i2_kept_id = Uuid::from_u128(0x2B);
    let i2_trimmed_id = Uuid::from_u128(0x2A);

    let full = metadata(full_id, Uuid::nil(), true, 1, 1, 10, 0);
    let i1 = metadata(i1_id, full_id, false, 1, 1, 20, 1);
    // Two incrementals claim the same parent (a divergent branch, e.g. from
    // a failed-over primary re-proposing a backup at the same point). The
    // newest BackupVersion wins the chain; its sibling is trimmed.
    let i2_kept = metadata(i2_kept_id, i1_id, false, 1, 1, 30, 3);
    let i2_trimmed = metadata(i2_trimmed_id, i1_id, false, 1, 1, 29, 2);

    let full_path = write_backup_log(tmp.path(), full_id, 10).await;
    let i1_path = write_backup_log(tmp.path(), i1_id, 20).await;
    let i2_kept_path = write_backup_log(tmp.path(), i2_kept_id, 30).await;
    let i2_trimmed_path = write_backup_log(tmp.path(), i2_trimmed_id, 29).await;

    let info = BackupFolderInfo::analyze(vec![
        (full.clone(), full_path),
        (i1.clone(), i1_path),
        (i2_trimmed, i2_trimmed_path),
        (i2_kept.clone(), i2_kept_path),
    ])
    .await
    .unwrap();

    assert_eq!(info.full.backup_id, full_id);
    let chain_ids: Vec<Uuid> = info.chain.iter().map(|m| m.backup_id).collect();
    assert_eq!(chain_ids, vec![i1_id, i2_kept_id], "the older sibling must not appear in the trimmed chain");
}
