//! `CopyStream` (component Y, spec §4.8).
//!
//! Produces, in order, the packet sequence a target replica consumes to
//! build itself from a source: `CopyMetadata -> (CopyNone | CopyState ->
//! CopyLog | CopyFalseProgress -> CopyLog) -> Drained`. State-chunk
//! production itself is the state provider's job (§1 out of scope); this
//! module only sequences the packets and slices the log.

use crate::ids::{Epoch, Lsn, ReplicaId};
use crate::progress_vector::{CopyMode, ProgressVector};
use crate::record::LogRecord;
use std::collections::VecDeque;

/// One packet in the copy wire sequence (spec §6.5, abstracted: the actual
/// byte framing is the transport's job).
#[derive(Debug, Clone)]
pub enum CopyPacket {
    Metadata {
        copy_mode: CopyModeKind,
        source_replica_id: ReplicaId,
    },
    State(Vec<u8>),
    StateMetadata {
        progress_vector: ProgressVector,
        checkpoint_epoch: Epoch,
        starting_lsn: Lsn,
        upto_lsn: Lsn,
        current_tail_lsn: Lsn,
    },
    FalseProgress {
        target_starting_lsn: Lsn,
    },
    Log(Vec<LogRecord>),
}

/// Discriminant carried in the `CopyMetadata` prologue (spec §6.5
/// `copyStage`), kept separate from [`CopyMode`] because the wire format only
/// needs the tag, not the LSNs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyModeKind {
    None,
    State,
    FalseProgress,
    Log,
}

impl From<&CopyMode> for CopyModeKind {
    fn from(mode: &CopyMode) -> Self {
        match mode {
            CopyMode::None => Self::None,
            CopyMode::Full => Self::State,
            CopyMode::PartialFalseProgress { .. } => Self::FalseProgress,
            CopyMode::Partial { .. } => Self::Log,
        }
    }
}

/// A built, ordered packet sequence. Consumed one packet at a time by
/// `SecondaryDrainManager`; disposing the stream (dropping it) disposes the
/// underlying buffer (spec §4.8 "Cancellation").
pub struct CopyStream {
    packets: VecDeque<CopyPacket>,
}

impl CopyStream {
    /// Builds the packet sequence for copying `source` to `target`. State
    /// chunks for a full copy are represented by a single opaque
    /// placeholder packet here — the real chunking is driven by
    /// `StateProvider::backup_state`-equivalent enumeration in the embedding
    /// process.
    #[must_use]
    pub fn build(
        source: &ProgressVector,
        target: &ProgressVector,
        source_replica_id: ReplicaId,
        state_checkpoint_epoch: Epoch,
        tail_records: &[LogRecord],
        current_tail_lsn: Lsn,
        batch_record_count: usize,
    ) -> Self {
        let mode = ProgressVector::find_copy_mode(source, target);
        let mut packets = VecDeque::new();
        packets.push_back(CopyPacket::Metadata {
            copy_mode: CopyModeKind::from(&mode),
            source_replica_id,
        });

        match mode {
            CopyMode::None => {}
            CopyMode::Full => {
                packets.push_back(CopyPacket::State(Vec::new()));
                packets.push_back(CopyPacket::StateMetadata {
                    progress_vector: source.clone(),
                    checkpoint_epoch: state_checkpoint_epoch,
                    starting_lsn: Lsn::ZERO,
                    upto_lsn: current_tail_lsn,
                    current_tail_lsn,
                });
                push_log_batches(tail_records, Lsn::ZERO, current_tail_lsn, batch_record_count, &mut packets);
            }
            CopyMode::PartialFalseProgress { target_starting_lsn } => {
                packets.push_back(CopyPacket::FalseProgress { target_starting_lsn });
                push_log_batches(tail_records, target_starting_lsn, current_tail_lsn, batch_record_count, &mut packets);
            }
            CopyMode::Partial { source_starting_lsn, .. } => {
                push_log_batches(tail_records, source_starting_lsn, current_tail_lsn, batch_record_count, &mut packets);
            }
        }

        Self { packets }
    }

    pub fn next_packet(&mut self) -> Option<CopyPacket> {
        self.packets.pop_front()
    }

    #[must_use]
    pub fn is_drained(&self) -> bool {
        self.packets.is_empty()
    }
}

/// Bounds each `CopyLog` packet by `batch_record_count` (spec §4.8/§4.14
/// `copy_batch_record_count`); records strictly after `starting_lsn` and at
/// or before `upto_lsn`.
fn push_log_batches(
    records: &[LogRecord],
    starting_lsn: Lsn,
    upto_lsn: Lsn,
    batch_record_count: usize,
    packets: &mut VecDeque<CopyPacket>,
) {
    let in_range: Vec<LogRecord> = records
        .iter()
        .filter(|r| r.lsn() > starting_lsn && r.lsn() <= upto_lsn)
        .cloned()
        .collect();

    let batch_size = batch_record_count.max(1);
    for chunk in in_range.chunks(batch_size) {
        packets.push_back(CopyPacket::Log(chunk.to_vec()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{Psn, RecordPosition, TransactionId};
    use crate::progress_vector::ProgressVectorEntry;
    use crate::record::{OperationRecord, RecordHeader};
    use chrono::{DateTime, Utc};
    use uuid::Uuid;

    fn pv_entry(dlv: i64, cv: i64, lsn: i64) -> ProgressVectorEntry {
        ProgressVectorEntry {
            epoch: Epoch::new(dlv, cv),
            lsn: Lsn(lsn),
            replica_id: ReplicaId(Uuid::nil()),
            timestamp: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    fn op(lsn: i64) -> LogRecord {
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
    fn scenario_6_partial_copy_emits_only_in_range_log_records() {
        let mut source = ProgressVector::new();
        source.push(pv_entry(1, 1, 10));
        source.push(pv_entry(1, 2, 30));

        let mut target = ProgressVector::new();
        target.push(pv_entry(1, 1, 10));
        target.push(pv_entry(1, 2, 25));

        let records: Vec<LogRecord> = (20..=30).map(op).collect();

        let mut stream = CopyStream::build(
            &source,
            &target,
            ReplicaId(Uuid::nil()),
            Epoch::new(1, 2),
            &records,
            Lsn(30),
            100,
        );

        match stream.next_packet().unwrap() {
            CopyPacket::Metadata { copy_mode, .. } => assert_eq!(copy_mode, CopyModeKind::Log),
            other => panic!("expected Metadata, got {other:?}"),
        }

        match stream.next_packet().unwrap() {
            CopyPacket::Log(batch) => {
                assert!(batch.iter().all(|r| r.lsn() > Lsn(25) && r.lsn() <= Lsn(30)));
                assert_eq!(batch.len(), 5);
            }
            other => panic!("expected Log, got {other:?}"),
        }

        assert!(stream.next_packet().is_none());
        assert!(stream.is_drained());
    }

    #[test]
    fn no_common_epoch_triggers_full_copy_with_state_packets() {
        let mut source = ProgressVector::new();
        source.push(pv_entry(1, 1, 10));
        let target = ProgressVector::new();

        let mut stream = CopyStream::build(&source, &target, ReplicaId(Uuid::nil()), Epoch::new(1, 1), &[], Lsn(10), 10);

        assert!(matches!(stream.next_packet(), Some(CopyPacket::Metadata { copy_mode: CopyModeKind::State, .. })));
        assert!(matches!(stream.next_packet(), Some(CopyPacket::State(_))));
        assert!(matches!(stream.next_packet(), Some(CopyPacket::StateMetadata { .. })));
    }
}
