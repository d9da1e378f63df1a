//! `ReplicatedLogManager` (component R, spec §4.4).
//!
//! Serializes logical appends on the primary path: calls the transport to
//! assign an LSN, appends physically via `PhysicalLogWriter`, then runs the
//! checkpoint/truncation hooks. The append lock (§5 Level 3) is held only
//! while assigning LSN/PSN and buffering, never across I/O.

use crate::contracts::ReplicatorTransport;
use crate::error::LogError;
use crate::ids::{Epoch, Lsn, RecordHandle};
use crate::log::LogicalLog;
use crate::physical_log_writer::PhysicalLogWriter;
use crate::progress_vector::{ProgressVector, ProgressVectorEntry};
use crate::record::{BarrierRecord, InformationEvent, InformationRecord, LogRecord, RecordHeader, UpdateEpochRecord};
use crate::ids::{Psn, RecordPosition};
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::instrument;

struct TailState {
    tail_lsn: Lsn,
    tail_epoch: Epoch,
    progress_vector: ProgressVector,
    last_in_progress_checkpoint: Option<RecordHandle>,
    last_completed_end_checkpoint: Option<RecordHandle>,
    last_in_progress_truncate_head: Option<RecordHandle>,
    last_information_record: Option<InformationEvent>,
}

/// Serializes logical appends. Holds the append lock (`std::sync::Mutex`
/// equivalent realized here as a `tokio::sync::Mutex` around the
/// bookkeeping-only critical section, matching §5's "append lock... never
/// held across I/O").
pub struct ReplicatedLogManager<L: LogicalLog> {
    transport: Arc<dyn ReplicatorTransport>,
    writer: Arc<PhysicalLogWriter<L>>,
    append_lock: Mutex<TailState>,
    accepting_appends: AtomicBool,
}

impl<L: LogicalLog> ReplicatedLogManager<L> {
    #[must_use]
    pub fn new(transport: Arc<dyn ReplicatorTransport>, writer: Arc<PhysicalLogWriter<L>>, starting_epoch: Epoch) -> Self {
        Self {
            transport,
            writer,
            append_lock: Mutex::new(TailState {
                tail_lsn: Lsn::ZERO,
                tail_epoch: starting_epoch,
                progress_vector: ProgressVector::new(),
                last_in_progress_checkpoint: None,
                last_completed_end_checkpoint: None,
                last_in_progress_truncate_head: None,
                last_information_record: None,
            }),
            accepting_appends: AtomicBool::new(true),
        }
    }

    /// Spec §4.4 `ReplicateAndLog`: assigns LSN via the transport, appends
    /// physically, and returns the number of bytes now buffered, the
    /// assigned LSN, and the arena handle the physical writer assigned the
    /// record (so checkpoint/truncate-head records can link back to it).
    #[instrument(skip_all)]
    pub async fn replicate_and_log(&self, mut record: LogRecord) -> Result<(usize, Lsn, RecordHandle), LogError> {
        if !self.accepting_appends.load(Ordering::Acquire) {
            return Err(LogError::Closed);
        }

        let mut state = self.append_lock.lock().await;

        let lsn = self
            .transport
            .replicate_and_log(&record)
            .await
            .map_err(|e| LogError::Corruption {
                position: 0,
                reason: format!("transport rejected append: {e}"),
            })?;
        record.header_mut().lsn = lsn;

        let (buffered_bytes, handle) = self.writer.insert_buffered_record(record).await?;
        state.tail_lsn = lsn;

        Ok((buffered_bytes, lsn, handle))
    }

    /// The LSN of the most recently appended logical record, i.e. the
    /// fenced tail at this instant. Used to stamp a barrier's own
    /// `last_stable_lsn` field at emission time (spec §4.6 scenario 2).
    pub async fn tail_lsn(&self) -> Lsn {
        self.append_lock.lock().await.tail_lsn
    }

    /// Spec §4.4 `AppendBarrier`: appends a `Barrier` logical record,
    /// carrying the stable LSN known at emission time.
    pub async fn append_barrier(&self, last_stable_lsn: Lsn) -> Result<(usize, Lsn, RecordHandle), LogError> {
        let record = LogRecord::Barrier(BarrierRecord {
            header: RecordHeader {
                lsn: Lsn::INVALID,
                psn: Psn::INVALID,
                record_position: RecordPosition(0),
                previous_physical_record: None,
            },
            last_stable_lsn,
        });
        self.replicate_and_log(record).await
    }

    /// Spec §4.4 `UpdateEpoch`: LSN is set to the previous epoch's last LSN;
    /// behaves as a barrier for apply ordering.
    #[instrument(skip_all)]
    pub async fn update_epoch(&self, new_epoch: Epoch) -> Result<(), LogError> {
        let mut state = self.append_lock.lock().await;
        let previous_epoch_last_lsn = state.tail_lsn;

        self.transport
            .update_epoch(new_epoch, previous_epoch_last_lsn)
            .await
            .map_err(|e| LogError::Corruption {
                position: 0,
                reason: format!("transport rejected epoch update: {e}"),
            })?;

        let record = LogRecord::UpdateEpoch(UpdateEpochRecord {
            header: RecordHeader {
                lsn: previous_epoch_last_lsn,
                psn: Psn::INVALID,
                record_position: RecordPosition(0),
                previous_physical_record: None,
            },
            epoch: new_epoch,
            replica_id: self.transport.local_replica_id(),
        });
        self.writer.insert_buffered_record(record).await?;

        state.tail_epoch = new_epoch;
        state.progress_vector.push(ProgressVectorEntry {
            epoch: new_epoch,
            lsn: previous_epoch_last_lsn,
            replica_id: self.transport.local_replica_id(),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Spec §4.4 `Information`: emits a lifecycle marker. `Closed` and
    /// `RemovingState` stop further appends.
    pub async fn information(&self, event: InformationEvent) -> Result<(), LogError> {
        let record = LogRecord::Information(InformationRecord {
            header: RecordHeader {
                lsn: Lsn::INVALID,
                psn: Psn::INVALID,
                record_position: RecordPosition(0),
                previous_physical_record: None,
            },
            event,
        });
        self.writer.insert_buffered_record(record).await?;

        let mut state = self.append_lock.lock().await;
        state.last_information_record = Some(event);
        if matches!(event, InformationEvent::Closed | InformationEvent::RemovingState) {
            self.accepting_appends.store(false, Ordering::Release);
        }
        Ok(())
    }

    pub async fn current_log_tail_lsn(&self) -> Lsn {
        self.append_lock.lock().await.tail_lsn
    }

    pub async fn current_log_tail_epoch(&self) -> Epoch {
        self.append_lock.lock().await.tail_epoch
    }

    pub async fn progress_vector_snapshot(&self) -> ProgressVector {
        self.append_lock.lock().await.progress_vector.clone()
    }

    pub fn is_accepting_appends(&self) -> bool {
        self.accepting_appends.load(Ordering::Acquire)
    }

    /// Rewinds the in-memory tail view after `TruncateTailManager` undoes
    /// false-progressed records (spec §4.9): only ever called on a replica
    /// that is not yet accepting primary-path appends.
    pub async fn rewind_tail_after_truncation(&self, new_tail_lsn: Lsn) {
        let mut state = self.append_lock.lock().await;
        state.tail_lsn = new_tail_lsn;
        state.progress_vector.trim_after(new_tail_lsn);
    }
}
