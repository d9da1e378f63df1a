//! `TransactionMap` (component X, spec §3.3, §4.5, §4.6).
//!
//! Tracks, per transaction, the latest record seen and whether it is still
//! pending (no `EndTransaction` yet), completed-but-not-stable, or unstable
//! (ended but its LSN has not yet passed the stable watermark). Backed by
//! `dashmap` for lock-free concurrent access, mirroring the donor's
//! preference for `dashmap` over `RwLock<HashMap<_>>` on hot concurrent
//! paths.

use crate::ids::{Lsn, TransactionId};
use crate::record::LogRecord;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Per-transaction bookkeeping kept by `TransactionMap`.
#[derive(Debug, Clone)]
pub struct TransactionEntry {
    pub transaction_id: TransactionId,
    pub latest_record: LogRecord,
    pub begin_lsn: Lsn,
}

pub struct TransactionMap {
    latest_by_tx_id: DashMap<TransactionId, TransactionEntry>,
    /// Ordered by LSN so "the oldest pending transaction" is a
    /// `first_key_value` lookup; a `std::sync::Mutex` rather than `dashmap`
    /// because ordered range queries are the point, not sharded concurrency.
    lsn_pending: Mutex<BTreeMap<Lsn, TransactionId>>,
    completed: DashMap<TransactionId, LogRecord>,
    unstable: DashMap<TransactionId, LogRecord>,
}

impl Default for TransactionMap {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionMap {
    #[must_use]
    pub fn new() -> Self {
        Self {
            latest_by_tx_id: DashMap::new(),
            lsn_pending: Mutex::new(BTreeMap::new()),
            completed: DashMap::new(),
            unstable: DashMap::new(),
        }
    }

    /// Records a `BeginTransaction`; the transaction becomes pending.
    pub fn begin_transaction(&self, tx_id: TransactionId, begin_lsn: Lsn, record: LogRecord) {
        self.latest_by_tx_id.insert(
            tx_id,
            TransactionEntry {
                transaction_id: tx_id,
                latest_record: record,
                begin_lsn,
            },
        );
        self.lsn_pending.lock().expect("lsn_pending poisoned").insert(begin_lsn, tx_id);
    }

    /// Records an `Operation` within an already-open transaction.
    pub fn add_operation(&self, tx_id: TransactionId, record: LogRecord) {
        if let Some(mut entry) = self.latest_by_tx_id.get_mut(&tx_id) {
            entry.latest_record = record;
        }
    }

    /// Records an `EndTransaction`: moves the transaction from pending to
    /// unstable (spec §3.3: "a transaction is either pending... or unstable
    /// (has end-record but LSN > stable)").
    pub fn end_transaction(&self, tx_id: TransactionId, end_record: LogRecord) {
        if let Some((_, entry)) = self.latest_by_tx_id.remove(&tx_id) {
            self.lsn_pending
                .lock()
                .expect("lsn_pending poisoned")
                .remove(&entry.begin_lsn);
        }
        self.unstable.insert(tx_id, end_record);
    }

    /// Moves every unstable transaction whose end-record LSN is at or below
    /// `stable_lsn` into `completed` and returns their ids — called from the
    /// group-commit loop on each barrier completion (spec §4.6).
    pub fn advance_stable_lsn(&self, stable_lsn: Lsn) -> Vec<TransactionId> {
        let mut now_stable = Vec::new();
        self.unstable.retain(|tx_id, record| {
            if record.lsn() <= stable_lsn {
                self.completed.insert(*tx_id, record.clone());
                now_stable.push(*tx_id);
                false
            } else {
                true
            }
        });
        now_stable
    }

    /// Removes a now-stable-and-fully-processed transaction from
    /// `completed`.
    pub fn remove_completed(&self, tx_id: TransactionId) {
        self.completed.remove(&tx_id);
    }

    /// The oldest pending transaction's begin-LSN, if any (spec §4.5/§4.6:
    /// used for the checkpoint's `earliest_pending_tx_offset` and the
    /// tx-abort-threshold check).
    #[must_use]
    pub fn oldest_pending(&self) -> Option<(Lsn, TransactionId)> {
        self.lsn_pending
            .lock()
            .expect("lsn_pending poisoned")
            .iter()
            .next()
            .map(|(lsn, tx)| (*lsn, *tx))
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.lsn_pending.lock().expect("lsn_pending poisoned").len()
    }

    #[must_use]
    pub fn latest(&self, tx_id: TransactionId) -> Option<LogRecord> {
        self.latest_by_tx_id.get(&tx_id).map(|e| e.latest_record.clone())
    }

    #[must_use]
    pub fn is_pending(&self, tx_id: TransactionId) -> bool {
        self.latest_by_tx_id.contains_key(&tx_id)
    }

    #[must_use]
    pub fn is_unstable(&self, tx_id: TransactionId) -> bool {
        self.unstable.contains_key(&tx_id)
    }
}
