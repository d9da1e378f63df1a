//! Shared test doubles for the scenario integration tests (spec §8).

use async_trait::async_trait;
use logging_replicator::contracts::{ApplyContext, ReplicatorTransport, StateProvider};
use logging_replicator::{ApplyError, Epoch, Lsn, LogRecord, ReplicaId};
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

/// Assigns sequential LSNs as if a replication layer had ack'd each record
/// immediately; used wherever a scenario needs a primary-path replicator
/// transport but isn't itself testing replication.
pub struct SequentialTransport {
    next_lsn: AtomicI64,
}

impl SequentialTransport {
    #[must_use]
    pub fn new(starting_lsn: i64) -> Self {
        Self { next_lsn: AtomicI64::new(starting_lsn) }
    }
}

#[async_trait]
impl ReplicatorTransport for SequentialTransport {
    async fn replicate_and_log(&self, _record: &LogRecord) -> Result<Lsn, ApplyError> {
        Ok(Lsn(self.next_lsn.fetch_add(1, Ordering::SeqCst)))
    }
    async fn update_epoch(&self, _epoch: Epoch, _last_lsn: Lsn) -> Result<(), ApplyError> {
        Ok(())
    }
    fn local_replica_id(&self) -> ReplicaId {
        ReplicaId(Uuid::nil())
    }
}

/// Records every `apply`/`unlock` call it receives, in order, for scenarios
/// that assert on undo/redo ordering (e.g. scenario 4's false-progress undo).
#[derive(Default)]
pub struct RecordingStateProvider {
    pub calls: Mutex<Vec<String>>,
}

#[async_trait]
impl StateProvider for RecordingStateProvider {
    async fn apply(&self, record: &LogRecord, context: ApplyContext) -> Result<(), ApplyError> {
        self.calls
            .lock()
            .expect("test double mutex poisoned")
            .push(format!("apply({}, lsn={}, {:?})", record.type_name(), record.lsn().0, context));
        Ok(())
    }
    async fn unlock(&self, record: &LogRecord) -> Result<(), ApplyError> {
        self.calls
            .lock()
            .expect("test double mutex poisoned")
            .push(format!("unlock({}, lsn={})", record.type_name(), record.lsn().0));
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
