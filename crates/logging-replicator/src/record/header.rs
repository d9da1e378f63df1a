use crate::ids::{Lsn, Psn, RecordHandle, RecordPosition};
use serde::{Deserialize, Serialize};

/// Fields shared by every record variant (spec §3.2).
///
/// `previous_physical_record` is an arena handle rather than a pointer
/// (spec §9) so the in-memory chain can be walked and truncated without
/// reference counting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordHeader {
    pub lsn: Lsn,
    pub psn: Psn,
    pub record_position: RecordPosition,
    pub previous_physical_record: Option<RecordHandle>,
}
