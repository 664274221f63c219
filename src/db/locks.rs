//! Per-asset write serialization
//!
//! Ledger appends, checklist creation and asset deletion for the same asset
//! run one at a time inside a process. Cross-process consistency comes from
//! the store's uniqueness and version checks.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Keyed async mutexes, one per asset id
#[derive(Default)]
pub struct AssetLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl AssetLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the write lock for an asset
    pub async fn lock(&self, asset_id: &str) -> OwnedMutexGuard<()> {
        let mutex = self
            .locks
            .entry(asset_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        mutex.lock_owned().await
    }
}
