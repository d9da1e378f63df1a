//! Spec §8 scenario 6: a target that shares a common epoch with the source
//! but lags behind it gets a partial copy mode and a log-only copy stream
//! bounded to exactly the missing LSN range.

use logging_replicator::ids::{Psn, RecordPosition, TransactionId};
use logging_replicator::record::{LogRecord, OperationRecord, RecordHeader};
use logging_replicator::{CopyMode, CopyPacket, CopyStream, Epoch, Lsn, ProgressVector, ReplicaId};
use chrono::{DateTime, Utc};
use uuid::Uuid;

fn entry(dlv: i64, cv: i64, lsn: i64) -> logging_replicator::progress_vector::ProgressVectorEntry {
    logging_replicator::progress_vector::ProgressVectorEntry {
        epoch: Epoch::new(dlv, cv),
        lsn: Lsn(lsn),
        replica_id: ReplicaId(Uuid::nil()),
        timestamp: DateTime::<Utc>::UNIX_EPOCH,
    }
}

fn operation(lsn: i64) -> LogRecord {
    LogRecord::Operation(OperationRecord {
        header: RecordHeader {
            lsn: Lsn(lsn),
            psn: Psn(lsn),
            record_position: RecordPosition(0),
            previous_physical_record: None,
        },
        transaction_id: TransactionId(1),
        previous_logical_lsn: Lsn(lsn - 1),
        redo: vec![],
        undo: vec![],
    })
}

#[test]
fn shared_epoch_with_lag_selects_partial_copy_and_streams_only_the_gap() {
    let mut source = ProgressVector::new();
    source.push(entry(1, 1, 10));
    source.push(entry(1, 2, 30));

    let mut target = ProgressVector::new();
    target.push(entry(1, 1, 10));
    target.push(entry(1, 2, 18));

    let mode = ProgressVector::find_copy_mode(&source, &target);
    let (source_starting_lsn, target_starting_lsn) = match mode {
        CopyMode::Partial { source_starting_lsn, target_starting_lsn } => (source_starting_lsn, target_starting_lsn),
        other => panic!("expected Partial copy mode for a common-epoch lagging target, got {other:?}"),
    };
    assert_eq!(source_starting_lsn, Lsn(18));
    assert_eq!(target_starting_lsn, Lsn(18));

    let tail_records: Vec<LogRecord> = (11..=30).map(operation).collect();
    let mut stream = CopyStream::build(&source, &target, ReplicaId(Uuid::nil()), Epoch::new(1, 2), &tail_records, Lsn(30), 5);

    match stream.next_packet().expect("stream must start with a Metadata packet") {
        CopyPacket::Metadata { copy_mode, .. } => {
            assert_eq!(copy_mode, logging_replicator::copy_stream::CopyModeKind::Log);
        }
        other => panic!("expected Metadata, got {other:?}"),
    }

    let mut replayed_lsns = Vec::new();
    while let Some(packet) = stream.next_packet() {
        match packet {
            CopyPacket::Log(batch) => {
                assert!(batch.len() <= 5, "each CopyLog batch must respect the batch_record_count bound");
                replayed_lsns.extend(batch.iter().map(|r| r.lsn().0));
            }
            other => panic!("a log-only copy must not emit state packets, got {other:?}"),
        }
    }

    assert!(stream.is_drained());
    assert_eq!(replayed_lsns, (19..=30).collect::<Vec<_>>(), "only records strictly past the target's tail must be replayed");
}

#[test]
fn disjoint_epochs_fall_back_to_full_copy() {
    let mut source = ProgressVector::new();
    source.push(entry(2, 1, 5));
    let target = ProgressVector::new();

    let mode = ProgressVector::find_copy_mode(&source, &target);
    assert!(matches!(mode, CopyMode::Full), "a target with no shared epoch must trigger a full copy");

    let mut stream = CopyStream::build(&source, &target, ReplicaId(Uuid::nil()), Epoch::new(2, 1), &[], Lsn(5), 10);
    assert!(matches!(
        stream.next_packet(),
        Some(CopyPacket::Metadata { copy_mode: logging_replicator::copy_stream::CopyModeKind::State, .. })
    ));
    assert!(matches!(stream.next_packet(), Some(CopyPacket::State(_))));
    assert!(matches!(stream.next_packet(), Some(CopyPacket::StateMetadata { .. })));
}
