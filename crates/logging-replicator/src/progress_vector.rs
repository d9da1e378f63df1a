//! `ProgressVector` and copy-mode selection (spec §3.3, §4.8 scenario 6).

use crate::ids::{Epoch, Lsn, ReplicaId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry in a replica's progress history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressVectorEntry {
    pub epoch: Epoch,
    pub lsn: Lsn,
    pub replica_id: ReplicaId,
    pub timestamp: DateTime<Utc>,
}

/// Ordered sequence of `(Epoch, Lsn, ReplicaId, Timestamp)` entries,
/// strictly non-decreasing by epoch and LSN (spec §3.3, I1/I2 analog for the
/// progress history rather than the physical chain).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgressVector {
    entries: Vec<ProgressVectorEntry>,
}

/// Copy mode chosen by `FindCopyMode` (spec §4.8).
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum CopyMode {
    None,
    Partial { source_starting_lsn: Lsn, target_starting_lsn: Lsn },
    PartialFalseProgress { target_starting_lsn: Lsn },
    Full,
}

impl ProgressVector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: ProgressVectorEntry) {
        debug_assert!(
            self.entries.last().is_none_or(|last| {
                last.epoch < entry.epoch || (last.epoch == entry.epoch && last.lsn <= entry.lsn)
            }),
            "progress vector entries must be non-decreasing by (epoch, lsn)"
        );
        self.entries.push(entry);
    }

    #[must_use]
    pub fn entries(&self) -> &[ProgressVectorEntry] {
        &self.entries
    }

    #[must_use]
    pub fn last(&self) -> Option<&ProgressVectorEntry> {
        self.entries.last()
    }

    /// Removes every entry whose LSN exceeds `lsn` (used by
    /// `TruncateTailManager::TruncateTailAsync`, spec §4.9).
    pub fn trim_after(&mut self, lsn: Lsn) {
        self.entries.retain(|e| e.lsn <= lsn);
    }

    /// Finds the last entry whose epoch matches `epoch`, if any.
    #[must_use]
    pub fn find_by_epoch(&self, epoch: Epoch) -> Option<&ProgressVectorEntry> {
        self.entries.iter().rev().find(|e| e.epoch == epoch)
    }

    /// Implements the copy-mode decision described in spec §4.8 / scenario
    /// 6: compares `source` (the primary building a new secondary) against
    /// `target` (the replica being built).
    #[must_use]
    pub fn find_copy_mode(source: &ProgressVector, target: &ProgressVector) -> CopyMode {
        let (Some(source_last), Some(target_last)) = (source.last(), target.last()) else {
            return CopyMode::Full;
        };

        if source_last.epoch.data_loss_version != target_last.epoch.data_loss_version {
            // Target has progressed through a data-loss event the source
            // never saw, or vice versa: cannot reconcile logs, full copy.
            return CopyMode::Full;
        }

        // Find the last epoch both vectors agree on.
        let common_epoch = source
            .entries
            .iter()
            .rev()
            .map(|e| e.epoch)
            .find(|epoch| target.find_by_epoch(*epoch).is_some());

        let Some(common_epoch) = common_epoch else {
            return CopyMode::Full;
        };

        let source_entry = source.find_by_epoch(common_epoch).expect("checked above");
        let target_entry = target.find_by_epoch(common_epoch).expect("checked above");

        if target_entry.lsn > source_entry.lsn {
            // Target has logged records beyond what the source knows about
            // for this epoch: false progress.
            return CopyMode::PartialFalseProgress {
                target_starting_lsn: source_entry.lsn,
            };
        }

        let starting_lsn = source_entry.lsn.min(target_entry.lsn);
        CopyMode::Partial {
            source_starting_lsn: starting_lsn,
            target_starting_lsn: starting_lsn,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn entry(dlv: i64, cv: i64, lsn: i64) -> ProgressVectorEntry {
        ProgressVectorEntry {
            epoch: Epoch::new(dlv, cv),
            lsn: Lsn(lsn),
            replica_id: ReplicaId(Uuid::nil()),
            timestamp: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    #[test]
    fn scenario_6_copy_mode_partial() {
        let mut source = ProgressVector::new();
        source.push(entry(1, 1, 10));
        source.push(entry(1, 2, 30));

        let mut target = ProgressVector::new();
        target.push(entry(1, 1, 10));
        target.push(entry(1, 2, 25));

        match ProgressVector::find_copy_mode(&source, &target) {
            CopyMode::Partial {
                source_starting_lsn,
                target_starting_lsn,
            } => {
                assert_eq!(source_starting_lsn, Lsn(25));
                assert_eq!(target_starting_lsn, Lsn(25));
            }
            other => panic!("expected Partial, got {other:?}"),
        }
    }

    #[test]
    fn empty_target_forces_full_copy() {
        let mut source = ProgressVector::new();
        source.push(entry(1, 1, 10));
        let target = ProgressVector::new();
        assert_eq!(ProgressVector::find_copy_mode(&source, &target), CopyMode::Full);
    }
}

impl std::fmt::Debug for CopyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Partial {
                source_starting_lsn,
                target_starting_lsn,
            } => write!(
                f,
                "Partial {{ source_starting_lsn: {source_starting_lsn:?}, target_starting_lsn: {target_starting_lsn:?} }}"
            ),
            Self::PartialFalseProgress { target_starting_lsn } => {
                write!(f, "PartialFalseProgress {{ target_starting_lsn: {target_starting_lsn:?} }}")
            }
            Self::Full => write!(f, "Full"),
        }
    }
}
