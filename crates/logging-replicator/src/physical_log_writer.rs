//! `PhysicalLogWriter` (component P, spec §4.1).
//!
//! Buffers records, assigns PSN, chains physical records, and flushes to the
//! `LogicalLog` in batches. Grounded on the donor's `LogWriter`
//! (`storage/wal/log_writer.rs`) for the buffer/flush/rotate shape, adapted
//! to PSN-chained records instead of segment files.

use crate::error::LogError;
use crate::ids::{Psn, RecordHandle, RecordPosition};
use crate::log::LogicalLog;
use crate::record::LogRecord;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

/// A contiguous range of newly-flushed records, delivered to the
/// `FlushCallbackManager` (spec §4.1/§4.2).
#[derive(Debug, Clone)]
pub struct LoggedRecords {
    pub start_psn: Psn,
    pub end_psn: Psn,
    pub log_error: Option<String>,
}

struct Buffered {
    record: LogRecord,
    bytes: Vec<u8>,
    handle: RecordHandle,
}

struct WriterState {
    buffer: Vec<Buffered>,
    buffered_bytes: usize,
    last_psn: Psn,
    last_handle: Option<RecordHandle>,
    next_handle: u64,
    next_record_offset: u64,
    flush_error: Option<String>,
}

/// Buffers appended records and flushes them to a [`LogicalLog`] in batches.
///
/// The append side (`insert_buffered_record`) is single-threaded by design
/// (spec §4.1); callers serialize through `ReplicatedLogManager`'s append
/// lock. `flush` itself may be called concurrently: concurrent calls
/// coalesce onto whichever flush is already in flight.
pub struct PhysicalLogWriter<L: LogicalLog> {
    log: Arc<L>,
    state: Mutex<WriterState>,
    throttle_high_water_mark: usize,
    flush_lock: Mutex<()>,
}

impl<L: LogicalLog> PhysicalLogWriter<L> {
    #[must_use]
    pub fn new(log: Arc<L>, throttle_high_water_mark: usize) -> Self {
        Self {
            log,
            state: Mutex::new(WriterState {
                buffer: Vec::new(),
                buffered_bytes: 0,
                last_psn: Psn(-1),
                last_handle: None,
                next_handle: 0,
                next_record_offset: 0,
                flush_error: None,
            }),
            throttle_high_water_mark,
            flush_lock: Mutex::new(()),
        }
    }

    /// Assigns PSN, links `previous_physical_record`, serializes, and
    /// buffers `record`. Returns the number of bytes now buffered and the
    /// handle assigned to the inserted record.
    #[instrument(skip_all)]
    pub async fn insert_buffered_record(
        &self,
        mut record: LogRecord,
    ) -> Result<(usize, RecordHandle), LogError> {
        let bytes = bincode::serialize(&record)?;
        let mut state = self.state.lock().await;

        let psn = state.last_psn.next();
        let handle = RecordHandle(state.next_handle);
        state.next_handle += 1;
        let record_offset = state.next_record_offset;
        let framed_len = 4 + bytes.len() as u64;

        {
            let header = record.header_mut();
            header.psn = psn;
            header.previous_physical_record = state.last_handle;
            header.record_position = RecordPosition(record_offset);
        }

        state.last_psn = psn;
        state.last_handle = Some(handle);
        state.next_record_offset += framed_len;
        state.buffered_bytes += bytes.len();
        state.buffer.push(Buffered { record, bytes, handle });

        debug!(psn = psn.0, buffered_bytes = state.buffered_bytes, "buffered record");
        Ok((state.buffered_bytes, handle))
    }

    /// True when buffered-plus-pending bytes exceed the configured
    /// high-water mark (spec §4.1 `ShouldThrottleWrites`).
    pub async fn should_throttle_writes(&self) -> bool {
        self.state.lock().await.buffered_bytes >= self.throttle_high_water_mark
    }

    /// Atomically snapshots the buffered range and writes it to the
    /// logical log in one I/O. Concurrent callers coalesce onto the same
    /// flush via `flush_lock`.
    #[instrument(skip_all)]
    pub async fn flush_async(&self) -> Result<LoggedRecords, LogError> {
        let _flush_guard = self.flush_lock.lock().await;

        let mut state = self.state.lock().await;
        if state.buffer.is_empty() {
            let psn = state.last_psn;
            return Ok(LoggedRecords {
                start_psn: psn,
                end_psn: psn,
                log_error: state.flush_error.clone(),
            });
        }

        let start_psn = state.buffer.first().expect("non-empty").record.psn();
        let end_psn = state.buffer.last().expect("non-empty").record.psn();
        let mut batch = Vec::with_capacity(state.buffered_bytes + state.buffer.len() * 4);
        for buffered in &state.buffer {
            batch.extend_from_slice(&(buffered.bytes.len() as u32).to_le_bytes());
            batch.extend_from_slice(&buffered.bytes);
        }
        state.buffer.clear();
        state.buffered_bytes = 0;
        drop(state);

        let result = async {
            self.log.append(&batch).await?;
            self.log.flush().await
        }
        .await;

        let log_error = result.err().map(|e| {
            warn!(error = %e, "flush failed, tainting subsequent flushes");
            e.to_string()
        });

        if log_error.is_some() {
            self.state.lock().await.flush_error = log_error.clone();
        }

        Ok(LoggedRecords { start_psn, end_psn, log_error })
    }

    /// Stops accepting appends, truncates the logical log to `new_tail`'s
    /// end offset, and resets writer state to resume from there
    /// (spec §4.1 `TruncateLogTail`).
    pub async fn truncate_log_tail(&self, new_tail_offset: u64, new_tail_psn: Psn) -> Result<(), LogError> {
        let mut state = self.state.lock().await;
        self.log.truncate_tail(new_tail_offset).await?;
        state.buffer.clear();
        state.buffered_bytes = 0;
        state.last_psn = new_tail_psn;
        state.next_record_offset = new_tail_offset;
        state.flush_error = None;
        Ok(())
    }

    pub async fn truncate_log_head_async(&self, offset: u64) -> Result<(), LogError> {
        self.log.truncate_head(offset).await
    }

    pub async fn last_psn(&self) -> Psn {
        self.state.lock().await.last_psn
    }

    /// Spec §4.10 `PerformRecoveryAsync`: parses every `[u32 len][payload]`
    /// frame out of `log`'s full contents, in append order. The length
    /// prefix is the physical log writer's own framing (spec §9 Open
    /// question 1), not bincode's — `bincode::deserialize` only consumes
    /// the payload slice it's handed.
    pub async fn read_all_records(log: &L) -> Result<Vec<LogRecord>, LogError> {
        let len = log.len().await?;
        let bytes = log.read(0, len).await?;

        let mut records = Vec::new();
        let mut offset = 0usize;
        while offset < bytes.len() {
            if offset + 4 > bytes.len() {
                return Err(LogError::Corruption {
                    position: offset as u64,
                    reason: "truncated length prefix".to_string(),
                });
            }
            let record_len = u32::from_le_bytes(bytes[offset..offset + 4].try_into().expect("checked above")) as usize;
            offset += 4;

            if offset + record_len > bytes.len() {
                return Err(LogError::Corruption {
                    position: offset as u64,
                    reason: "truncated record payload".to_string(),
                });
            }
            let record: LogRecord = bincode::deserialize(&bytes[offset..offset + record_len])?;
            offset += record_len;
            records.push(record);
        }
        Ok(records)
    }
}
