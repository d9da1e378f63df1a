//! `TruncateTailManager` (component T half of S, spec §4.9
//! `TruncateTailAsync`).
//!
//! Rewinds a secondary that has logged records its source never saw
//! (false progress, spec §4.8 scenario 4): walks the tail newest-first,
//! undoing every record beyond the target LSN, then truncates the physical
//! log and records the new tail with a `TruncateTail` marker.

use crate::contracts::{ApplyContext, ProcessingMode};
use crate::error::CopyError;
use crate::ids::{Lsn, Psn, TransactionId};
use crate::log::LogicalLog;
use crate::operation_processor::OperationProcessor;
use crate::physical_log_writer::PhysicalLogWriter;
use crate::record::{LogRecord, RecordHeader, TruncateTailRecord};
use crate::replicated_log_manager::ReplicatedLogManager;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, instrument};

pub struct TruncateTailManager<L: LogicalLog> {
    operation_processor: Arc<OperationProcessor>,
    replicated_log_manager: Arc<ReplicatedLogManager<L>>,
    writer: Arc<PhysicalLogWriter<L>>,
}

impl<L: LogicalLog> TruncateTailManager<L> {
    #[must_use]
    pub fn new(
        operation_processor: Arc<OperationProcessor>,
        replicated_log_manager: Arc<ReplicatedLogManager<L>>,
        writer: Arc<PhysicalLogWriter<L>>,
    ) -> Self {
        Self {
            operation_processor,
            replicated_log_manager,
            writer,
        }
    }

    /// Undoes every record with LSN strictly greater than `target_lsn`, per
    /// spec §4.9: `BeginTransaction`/`Operation`/`EndTransaction` ("Normal"
    /// processing mode, per [`OperationProcessor::identify_processing_mode`])
    /// are undone and unlocked; physical records and `UpdateEpoch` carry no
    /// lock and are left alone (the progress vector is trimmed separately
    /// below via `rewind_tail_after_truncation`). Undoing a committed
    /// `EndTransaction` walks its whole transaction chain backward — every
    /// `BeginTransaction`/`Operation` sharing its transaction id is undone
    /// too, even if that participant's own LSN does not exceed `target_lsn`,
    /// since the transaction as a whole never should have become durable.
    ///
    /// `tail_records_newest_first` must already be ordered by descending
    /// LSN (the natural order of walking a log backward from its tail) and
    /// must include every participant of any transaction straddling
    /// `target_lsn`, not just the records strictly past it.
    #[instrument(skip_all, fields(target_lsn = ?target_lsn))]
    pub async fn truncate_tail_async(
        &self,
        target_lsn: Lsn,
        tail_records_newest_first: &[LogRecord],
    ) -> Result<(), CopyError> {
        let mut new_tail_psn = Psn(-1);
        let mut new_tail_offset: u64 = 0;
        for record in tail_records_newest_first {
            if record.lsn() > target_lsn {
                new_tail_offset = record.record_position().0;
            } else {
                new_tail_psn = record.psn();
                break;
            }
        }

        let mut chain_participants: HashMap<TransactionId, Vec<&LogRecord>> = HashMap::new();
        for record in tail_records_newest_first {
            if matches!(record, LogRecord::BeginTransaction(_) | LogRecord::Operation(_)) {
                if let Some(tx_id) = record.transaction_id() {
                    chain_participants.entry(tx_id).or_default().push(record);
                }
            }
        }

        let mut visited: HashSet<Lsn> = HashSet::new();
        let mut undone = 0usize;

        for record in tail_records_newest_first {
            if record.lsn() <= target_lsn {
                continue;
            }
            if OperationProcessor::identify_processing_mode(record) != ProcessingMode::Normal {
                continue;
            }
            if visited.contains(&record.lsn()) {
                continue;
            }

            self.undo_one(record, &mut visited).await?;
            undone += 1;

            if let LogRecord::EndTransaction(end) = record {
                if let Some(participants) = chain_participants.get(&end.transaction_id) {
                    for participant in participants {
                        if visited.contains(&participant.lsn()) {
                            continue;
                        }
                        self.undo_one(participant, &mut visited).await?;
                        undone += 1;
                    }
                }
            }
        }

        info!(undone, target_lsn = ?target_lsn, "undid false-progressed records");

        self.replicated_log_manager.rewind_tail_after_truncation(target_lsn).await;
        self.writer.truncate_log_tail(new_tail_offset, new_tail_psn).await?;

        let marker = LogRecord::TruncateTail(TruncateTailRecord {
            header: RecordHeader {
                lsn: target_lsn,
                psn: Psn::INVALID,
                record_position: crate::ids::RecordPosition(0),
                previous_physical_record: None,
            },
            truncated_to_lsn: target_lsn,
        });
        self.replicated_log_manager.replicate_and_log(marker).await?;
        self.writer.flush_async().await?;

        Ok(())
    }

    async fn undo_one(&self, record: &LogRecord, visited: &mut HashSet<Lsn>) -> Result<(), CopyError> {
        self.operation_processor
            .apply_one(record, ApplyContext::FalseProgressUndo)
            .await?;
        self.operation_processor.unlock_one(record).await?;
        visited.insert(record.lsn());
        Ok(())
    }
}
