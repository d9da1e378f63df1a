//! `SecondaryDrainManager` and `TruncateTailManager` (component S, spec
//! §4.9).
//!
//! Drives a secondary replica's end of the copy/build protocol: consumes
//! the packet sequence a primary's `CopyStream` produces, rewinding on
//! false progress before replaying the copied log tail through the normal
//! apply pipeline.

pub mod truncate_tail;

pub use truncate_tail::TruncateTailManager;

use crate::contracts::ApplyContext;
use crate::copy_stream::{CopyPacket, CopyStream};
use crate::error::CopyError;
use crate::log::LogicalLog;
use crate::operation_processor::OperationProcessor;
use crate::record::LogRecord;
use std::sync::Arc;
use tracing::{info, instrument};

pub struct SecondaryDrainManager<L: LogicalLog> {
    operation_processor: Arc<OperationProcessor>,
    truncate_tail: Arc<TruncateTailManager<L>>,
}

impl<L: LogicalLog> SecondaryDrainManager<L> {
    #[must_use]
    pub fn new(operation_processor: Arc<OperationProcessor>, truncate_tail: Arc<TruncateTailManager<L>>) -> Self {
        Self {
            operation_processor,
            truncate_tail,
        }
    }

    /// Spec §4.8/§4.9 `CopyOrBuildReplicaAsync`: drains every packet from
    /// `stream` in order. State chunks are handed to the embedding
    /// process's `StateProvider` out-of-band (spec §1); this crate only
    /// sequences `FalseProgress` rewinds and `Log` replay.
    #[instrument(skip_all)]
    pub async fn copy_or_build_replica_async(
        &self,
        mut stream: CopyStream,
        local_tail_records_newest_first: &[LogRecord],
    ) -> Result<(), CopyError> {
        let mut replayed = 0usize;

        while let Some(packet) = stream.next_packet() {
            match packet {
                CopyPacket::Metadata { .. } | CopyPacket::State(_) | CopyPacket::StateMetadata { .. } => {}
                CopyPacket::FalseProgress { target_starting_lsn } => {
                    self.truncate_tail
                        .truncate_tail_async(target_starting_lsn, local_tail_records_newest_first)
                        .await?;
                }
                CopyPacket::Log(records) => {
                    for record in records {
                        self.operation_processor.register_for_lookup(record.clone()).await;
                        self.operation_processor.apply_one(&record, ApplyContext::Redo).await?;
                        self.operation_processor.unlock_one(&record).await?;
                        replayed += 1;
                    }
                }
            }
        }

        info!(replayed, "replica build drained");
        Ok(())
    }
}
