//! Concurrency model and lock hierarchy documentation.
//!
//! This module has no runtime behavior; it documents the lock hierarchy used
//! throughout the replicator so new code can be checked against it by
//! inspection rather than by discovering deadlocks at runtime.
//!
//! ## Lock hierarchy
//!
//! Locks must be acquired in order from **Level 1 (highest)** to **Level 5
//! (lowest)**. Never acquire a higher-level lock while holding a lower-level
//! one.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                    REPLICATOR LOCK HIERARCHY                     │
//! │                                                                  │
//! │  Level 1   Backup-and-copy-consistency lock (tokio::sync::RwLock)│
//! │            held by: backup, restore, copy-stream creation,       │
//! │            CompleteCheckpointAndRenameIfNeeded                   │
//! │                              │                                   │
//! │                              ▼                                   │
//! │  Level 2   State-manager-API lock (tokio::sync::Mutex)            │
//! │            held around Prepare/Perform/Complete checkpoint calls │
//! │                              │                                   │
//! │                              ▼                                   │
//! │  Level 3   Append lock (std::sync::Mutex, ReplicatedLogManager)  │
//! │            held only while assigning LSN/PSN and buffering;      │
//! │            never across I/O or user callbacks                    │
//! │                              │                                   │
//! │                ┌─────────────┼─────────────┐                     │
//! │                ▼             ▼             ▼                     │
//! │  Level 4   Readers lock   Transaction-map   Flush-callback       │
//! │            (LogManager)   lock (dashmap)    queue mutex          │
//! │                              │                                   │
//! │                              ▼                                   │
//! │  Level 5   Record completion futures table (one-shot per record) │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Lock types
//!
//! - `tokio::sync::RwLock` / `tokio::sync::Mutex`: used wherever the lock may
//!   be held across an `.await` point — the backup-and-copy-consistency lock
//!   and the state-manager-API lock are the two cases called out by the
//!   design.
//! - `std::sync::Mutex` and `dashmap` maps: used for bookkeeping that never
//!   suspends — append-path LSN/PSN assignment, the reader-range table, the
//!   transaction map, and the flush-callback queue. Holding one of these
//!   across an `.await` is a bug.
//!
//! ```text
//! // WRONG: std::sync guard held across an await
//! let guard = transaction_map_lock.lock().unwrap();
//! flush_async().await; // blocks the executor thread while held
//! drop(guard);
//!
//! // CORRECT
//! let pending = {
//!     let guard = transaction_map_lock.lock().unwrap();
//!     guard.lsn_pending.clone()
//! };
//! flush_async().await;
//! ```
//!
//! ## Deadlock prevention rules
//!
//! 1. Acquire locks in hierarchy order (Level 1 → Level 5).
//! 2. Never hold a `std::sync` guard across an `.await`.
//! 3. Keep critical sections short; do I/O and state-provider calls outside
//!    the readers/transaction-map locks.
//! 4. The append lock is never held while calling the transport or the
//!    logical log's I/O methods.

use std::fmt;

/// Lock level in the hierarchy (lower number = higher priority).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LockLevel {
    /// Level 1: backup-and-copy-consistency lock.
    BackupAndCopyConsistency = 1,
    /// Level 2: state-manager-API lock.
    StateManagerApi = 2,
    /// Level 3: append lock (`ReplicatedLogManager`).
    Append = 3,
    /// Level 4: readers lock, transaction-map lock, flush-callback queue.
    Bookkeeping = 4,
    /// Level 5: per-record completion futures table.
    RecordCompletion = 5,
}

impl fmt::Display for LockLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BackupAndCopyConsistency => write!(f, "Level 1 (BackupAndCopyConsistency)"),
            Self::StateManagerApi => write!(f, "Level 2 (StateManagerApi)"),
            Self::Append => write!(f, "Level 3 (Append)"),
            Self::Bookkeeping => write!(f, "Level 4 (Bookkeeping)"),
            Self::RecordCompletion => write!(f, "Level 5 (RecordCompletion)"),
        }
    }
}
