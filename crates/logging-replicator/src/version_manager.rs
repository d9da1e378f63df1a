//! `VersionManager` (component V, spec §4.12).
//!
//! Tracks registered read-visibility sequence numbers (VSNs) so
//! `CheckpointManager` can ask "is it safe to drop the checkpoint at X given
//! the next one is at Y" without itself knowing who holds a snapshot read.

use crate::ids::Lsn;
use std::collections::BTreeSet;
use tokio::sync::{Mutex, Notify};

pub struct VersionManager {
    registered: Mutex<BTreeSet<i64>>,
    released: Notify,
}

impl Default for VersionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl VersionManager {
    #[must_use]
    pub fn new() -> Self {
        Self {
            registered: Mutex::new(BTreeSet::new()),
            released: Notify::new(),
        }
    }

    pub async fn register(&self, vsn: Lsn) {
        self.registered.lock().await.insert(vsn.0);
    }

    pub async fn unregister(&self, vsn: Lsn) {
        self.registered.lock().await.remove(&vsn.0);
        self.released.notify_waiters();
    }

    /// True iff no registered VSN lies in `[low, high)`.
    pub async fn can_remove_checkpoint(&self, low: Lsn, high: Lsn) -> bool {
        !self
            .registered
            .lock()
            .await
            .range(low.0..high.0)
            .next()
            .is_some()
    }

    /// Blocks until `can_remove_checkpoint(low, high)` would return true.
    pub async fn wait_until_removable(&self, low: Lsn, high: Lsn) {
        loop {
            if self.can_remove_checkpoint(low, high).await {
                return;
            }
            self.released.notified().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn removable_when_no_vsn_in_range() {
        let manager = VersionManager::new();
        assert!(manager.can_remove_checkpoint(Lsn(10), Lsn(20)).await);
        manager.register(Lsn(15)).await;
        assert!(!manager.can_remove_checkpoint(Lsn(10), Lsn(20)).await);
        manager.unregister(Lsn(15)).await;
        assert!(manager.can_remove_checkpoint(Lsn(10), Lsn(20)).await);
    }

    #[tokio::test]
    async fn wait_until_removable_unblocks_on_unregister() {
        let manager = std::sync::Arc::new(VersionManager::new());
        manager.register(Lsn(15)).await;

        let waiter = {
            let manager = manager.clone();
            tokio::spawn(async move {
                manager.wait_until_removable(Lsn(10), Lsn(20)).await;
            })
        };

        tokio::task::yield_now().await;
        manager.unregister(Lsn(15)).await;
        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .expect("wait_until_removable should unblock")
            .unwrap();
    }
}
