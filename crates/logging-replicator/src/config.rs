//! `ReplicatorConfig` (ambient, SPEC_FULL.md §4.14): layered configuration
//! for every numeric policy threshold referenced by `LogTruncationManager`,
//! `CheckpointManager`, `BackupManager`, and `CopyStream`.
//!
//! Loaded the way the donor's `config` workspace dependency implies:
//! compiled-in defaults, optionally overridden by a TOML file, then by
//! `REPLICATOR_`-prefixed environment variables.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicatorConfig {
    pub throttle_high_water_mark_bytes: u64,
    pub checkpoint_interval_bytes: u64,
    pub min_log_size_bytes: u64,
    pub truncation_threshold_bytes: u64,
    pub min_truncation_amount_bytes: u64,
    pub index_interval_bytes: u64,
    pub tx_abort_threshold_secs: u64,
    pub truncation_interval_secs: u64,
    pub periodic_checkpoint_interval_secs: u64,
    pub backup_incremental_size_fraction: f64,
    pub copy_batch_size_bytes: u64,
    pub copy_batch_record_count: usize,
    pub flush_block_size_bytes: u64,
}

impl Default for ReplicatorConfig {
    fn default() -> Self {
        Self {
            throttle_high_water_mark_bytes: 64 * 1024 * 1024,
            checkpoint_interval_bytes: 64 * 1024 * 1024,
            min_log_size_bytes: 8 * 1024 * 1024,
            truncation_threshold_bytes: 128 * 1024 * 1024,
            min_truncation_amount_bytes: 16 * 1024 * 1024,
            index_interval_bytes: 16 * 1024 * 1024,
            tx_abort_threshold_secs: 300,
            truncation_interval_secs: 60,
            periodic_checkpoint_interval_secs: 300,
            backup_incremental_size_fraction: 0.5,
            copy_batch_size_bytes: 4 * 1024 * 1024,
            copy_batch_record_count: 4096,
            flush_block_size_bytes: 64 * 1024,
        }
    }
}

impl ReplicatorConfig {
    pub fn tx_abort_threshold(&self) -> Duration {
        Duration::from_secs(self.tx_abort_threshold_secs)
    }

    pub fn truncation_interval(&self) -> Duration {
        Duration::from_secs(self.truncation_interval_secs)
    }

    pub fn periodic_checkpoint_interval(&self) -> Duration {
        Duration::from_secs(self.periodic_checkpoint_interval_secs)
    }

    /// Loads defaults, layered with an optional TOML file and
    /// `REPLICATOR_`-prefixed environment overrides.
    pub fn load(file: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default())?);

        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(false));
        }

        builder = builder.add_source(config::Environment::with_prefix("REPLICATOR"));
        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_load_without_a_file() {
        let config = ReplicatorConfig::load(None).unwrap();
        assert_eq!(config.truncation_threshold_bytes, ReplicatorConfig::default().truncation_threshold_bytes);
    }
}
