//! Shot ledger
//!
//! Append-only production counts per asset. The current total is the
//! `total_after` of the newest entry; there is no separate counter to drift
//! out of sync with the log.
//!
//! Appends for one asset are serialized with the per-asset lock, and the
//! store rejects a duplicate `(asset_id, seq)` so two writers on different
//! processes cannot both build on the same stale total. A rejected insert is
//! retried against the fresh tail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::db::{AssetLocks, Store};
use crate::types::{KeeperError, Result};

/// Attempts to append against a moving tail before giving up
const APPEND_RETRIES: usize = 5;

/// Machine state reported alongside a count increment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    #[default]
    Running,
    Stopped,
    Maintenance,
}

/// One ledger line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShotEntry {
    pub asset_id: String,
    /// 1-based insertion index within the asset's ledger
    pub seq: u64,
    pub delta: u64,
    pub total_after: u64,
    pub run_state: RunState,
    pub recorded_at: DateTime<Utc>,
    pub recorded_by: String,
}

/// Append-only shot log
#[derive(Clone)]
pub struct ShotLedger {
    store: Arc<dyn Store>,
    locks: Arc<AssetLocks>,
    history_max_limit: usize,
}

impl ShotLedger {
    pub fn new(store: Arc<dyn Store>, locks: Arc<AssetLocks>, history_max_limit: usize) -> Self {
        Self {
            store,
            locks,
            history_max_limit: history_max_limit.max(1),
        }
    }

    /// Record `delta` more shots. Negative deltas are rejected; corrections
    /// are an asset-level reconciliation, not a ledger write.
    pub async fn append(
        &self,
        asset_id: &str,
        delta: i64,
        run_state: RunState,
        actor: &str,
    ) -> Result<ShotEntry> {
        if delta < 0 {
            return Err(KeeperError::InvalidDelta(format!(
                "shot counts only increase, got {}",
                delta
            )));
        }
        let delta = delta as u64;

        let _guard = self.locks.lock(asset_id).await;

        if self.store.get_asset(asset_id).await?.is_none() {
            return Err(KeeperError::NotFound(format!("asset {}", asset_id)));
        }

        for attempt in 0..APPEND_RETRIES {
            let (seq, previous_total) = match self.store.latest_shot(asset_id).await? {
                Some(last) => (last.seq + 1, last.total_after),
                None => (1, 0),
            };

            let total_after = previous_total.checked_add(delta).ok_or_else(|| {
                KeeperError::InvalidDelta(format!("total would overflow at {}", previous_total))
            })?;

            let entry = ShotEntry {
                asset_id: asset_id.to_string(),
                seq,
                delta,
                total_after,
                run_state,
                recorded_at: Utc::now(),
                recorded_by: actor.to_string(),
            };

            match self.store.insert_shot(&entry).await {
                Ok(()) => {
                    info!(
                        asset_id = %asset_id,
                        seq,
                        delta,
                        total_after,
                        actor = %actor,
                        "Shots recorded"
                    );
                    return Ok(entry);
                }
                Err(KeeperError::Conflict(_)) => {
                    debug!(asset_id = %asset_id, seq, attempt, "Ledger tail moved, retrying append");
                }
                Err(e) => return Err(e),
            }
        }

        warn!(asset_id = %asset_id, "Ledger append exhausted retries");
        Err(KeeperError::Conflict(format!(
            "ledger for asset {} is under heavy contention",
            asset_id
        )))
    }

    /// Current total, 0 for an asset without entries
    pub async fn current_total(&self, asset_id: &str) -> Result<u64> {
        Ok(self
            .store
            .latest_shot(asset_id)
            .await?
            .map(|e| e.total_after)
            .unwrap_or(0))
    }

    /// Newest-first page of entries. Pass the smallest `seq` of a page as
    /// `before_seq` to fetch the next one.
    pub async fn history(
        &self,
        asset_id: &str,
        limit: usize,
        before_seq: Option<u64>,
    ) -> Result<Vec<ShotEntry>> {
        let limit = limit.clamp(1, self.history_max_limit);
        self.store.shot_history(asset_id, before_seq, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::registry::{AssetRegistry, NewAsset};

    async fn setup() -> ShotLedger {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let locks = Arc::new(AssetLocks::new());
        let registry = AssetRegistry::new(Arc::clone(&store), Arc::clone(&locks));
        for (id, part) in [("M-1", "PN-1"), ("M-2", "PN-2")] {
            registry
                .register(NewAsset {
                    asset_id: Some(id.into()),
                    part_number: part.into(),
                    cavity_count: 1,
                    ..NewAsset::default()
                })
                .await
                .unwrap();
        }
        ShotLedger::new(store, locks, 50)
    }

    #[tokio::test]
    async fn test_empty_ledger_total_is_zero() {
        let ledger = setup().await;
        assert_eq!(ledger.current_total("M-1").await.unwrap(), 0);
        assert!(ledger.history("M-1", 10, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_total_is_sum_of_deltas() {
        let ledger = setup().await;
        let deltas = [60_000i64, 35_000, 0, 10_000, 1];
        let mut previous = 0;
        for (i, delta) in deltas.iter().enumerate() {
            let entry = ledger.append("M-1", *delta, RunState::Running, "op").await.unwrap();
            assert_eq!(entry.seq, i as u64 + 1);
            assert_eq!(entry.total_after, previous + *delta as u64);
            assert!(entry.total_after >= previous);
            previous = entry.total_after;
        }
        assert_eq!(ledger.current_total("M-1").await.unwrap(), 105_001);
        assert_eq!(ledger.current_total("M-2").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_negative_delta_rejected() {
        let ledger = setup().await;
        ledger.append("M-1", 5, RunState::Running, "op").await.unwrap();
        let err = ledger.append("M-1", -1, RunState::Running, "op").await.unwrap_err();
        assert!(matches!(err, KeeperError::InvalidDelta(_)));
        assert_eq!(ledger.current_total("M-1").await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_unknown_asset() {
        let ledger = setup().await;
        let err = ledger.append("M-404", 5, RunState::Running, "op").await.unwrap_err();
        assert!(matches!(err, KeeperError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_concurrent_appends_form_a_chain() {
        let ledger = setup().await;
        let tasks: Vec<_> = (1..=40u64)
            .map(|i| {
                let ledger = ledger.clone();
                tokio::spawn(async move {
                    ledger
                        .append("M-1", i as i64, RunState::Running, "op")
                        .await
                        .unwrap()
                })
            })
            .collect();
        for result in futures_util::future::join_all(tasks).await {
            result.unwrap();
        }

        assert_eq!(ledger.current_total("M-1").await.unwrap(), (1..=40u64).sum::<u64>());

        let mut entries = ledger.history("M-1", 50, None).await.unwrap();
        entries.reverse();
        assert_eq!(entries.len(), 40);
        let mut running = 0;
        for (i, entry) in entries.iter().enumerate() {
            assert_eq!(entry.seq, i as u64 + 1);
            running += entry.delta;
            assert_eq!(entry.total_after, running);
        }
    }

    #[tokio::test]
    async fn test_history_pagination() {
        let ledger = setup().await;
        for _ in 0..7 {
            ledger.append("M-1", 10, RunState::Running, "op").await.unwrap();
        }

        let first = ledger.history("M-1", 3, None).await.unwrap();
        let seqs: Vec<_> = first.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![7, 6, 5]);

        let second = ledger.history("M-1", 3, Some(5)).await.unwrap();
        let seqs: Vec<_> = second.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![4, 3, 2]);

        let last = ledger.history("M-1", 3, Some(2)).await.unwrap();
        assert_eq!(last.len(), 1);
        assert_eq!(last[0].seq, 1);

        // limit is clamped to the configured maximum
        assert_eq!(ledger.history("M-1", 10_000, None).await.unwrap().len(), 7);
    }
}
