//! # Logging Replicator
//!
//! The write-ahead-log, replication-drain, checkpoint/truncation, and
//! backup-chain-validation core of a distributed transactional replicated
//! state store: the local durability and replication-ordering substrate
//! underneath a higher-level state manager, not the state manager itself.

pub mod backup;
pub mod checkpoint_manager;
pub mod concurrency;
pub mod config;
pub mod contracts;
pub mod copy_stream;
pub mod drain;
pub mod error;
pub mod flush_callback_manager;
pub mod ids;
pub mod log;
pub mod log_manager;
pub mod operation_processor;
pub mod physical_log_writer;
pub mod progress_vector;
pub mod record;
pub mod recovery;
pub mod replicated_log_manager;
pub mod replicator;
pub mod telemetry;
pub mod transaction_map;
pub mod truncation_manager;
pub mod version_manager;

pub use backup::{BackupFolderInfo, BackupLogFile, BackupManager, BackupMetadata, BackupVersion};
pub use checkpoint_manager::CheckpointManager;
pub use config::ReplicatorConfig;
pub use copy_stream::{CopyPacket, CopyStream};
pub use drain::{SecondaryDrainManager, TruncateTailManager};
pub use error::{
    ApplyError, BackupError, CheckpointError, CopyError, LogError, RecoveryError, ReplicatorError,
};
pub use flush_callback_manager::FlushCallbackManager;
pub use ids::{Epoch, Lsn, Psn, RecordHandle, ReplicaId, TransactionId};
pub use log::{FileLogicalLog, LogicalLog};
pub use log_manager::LogManager;
pub use operation_processor::OperationProcessor;
pub use physical_log_writer::PhysicalLogWriter;
pub use progress_vector::{CopyMode, ProgressVector};
pub use record::LogRecord;
pub use recovery::RecoveryManager;
pub use replicated_log_manager::ReplicatedLogManager;
pub use replicator::{LoggingReplicator, PrimaryRole};
pub use transaction_map::TransactionMap;
pub use truncation_manager::LogTruncationManager;
pub use version_manager::VersionManager;
