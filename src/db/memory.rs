//! In-process store
//!
//! Used in dev mode without MongoDB and throughout the tests. Honours the
//! same uniqueness and version rules as the Mongo backend.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use super::Store;
use crate::checklist::ChecklistSubmission;
use crate::ledger::ShotEntry;
use crate::registry::Asset;
use crate::repair::RepairReport;
use crate::types::{KeeperError, Result};

/// Assets plus the part-number index; both change together
#[derive(Default)]
struct AssetTable {
    by_id: HashMap<String, Asset>,
    by_part_number: HashMap<String, String>,
}

#[derive(Default)]
pub struct MemoryStore {
    assets: Mutex<AssetTable>,
    /// asset id -> seq -> entry
    shots: DashMap<String, BTreeMap<u64, ShotEntry>>,
    submissions: DashMap<String, ChecklistSubmission>,
    repairs: DashMap<String, RepairReport>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn assets(&self) -> Result<MutexGuard<'_, AssetTable>> {
        self.assets
            .lock()
            .map_err(|_| KeeperError::Internal("asset table lock poisoned".into()))
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn insert_asset(&self, asset: &Asset) -> Result<()> {
        let mut table = self.assets()?;
        if table.by_id.contains_key(&asset.asset_id) {
            return Err(KeeperError::DuplicateIdentity(format!(
                "asset id {} already registered",
                asset.asset_id
            )));
        }
        if table.by_part_number.contains_key(&asset.part_number) {
            return Err(KeeperError::DuplicateIdentity(format!(
                "part number {} already registered",
                asset.part_number
            )));
        }
        table
            .by_part_number
            .insert(asset.part_number.clone(), asset.asset_id.clone());
        table.by_id.insert(asset.asset_id.clone(), asset.clone());
        Ok(())
    }

    async fn get_asset(&self, asset_id: &str) -> Result<Option<Asset>> {
        Ok(self.assets()?.by_id.get(asset_id).cloned())
    }

    async fn list_assets(&self) -> Result<Vec<Asset>> {
        let mut assets: Vec<Asset> = self.assets()?.by_id.values().cloned().collect();
        assets.sort_by(|a, b| a.asset_id.cmp(&b.asset_id));
        Ok(assets)
    }

    async fn replace_asset(&self, asset: &Asset, expected_version: u64) -> Result<()> {
        let mut table = self.assets()?;
        let current = table
            .by_id
            .get(&asset.asset_id)
            .ok_or_else(|| KeeperError::NotFound(format!("asset {}", asset.asset_id)))?;
        if current.version != expected_version {
            return Err(KeeperError::Conflict(format!(
                "asset {} is at version {}, expected {}",
                asset.asset_id, current.version, expected_version
            )));
        }

        let old_part = current.part_number.clone();
        if old_part != asset.part_number {
            if table.by_part_number.contains_key(&asset.part_number) {
                return Err(KeeperError::DuplicateIdentity(format!(
                    "part number {} already registered",
                    asset.part_number
                )));
            }
            table.by_part_number.remove(&old_part);
            table
                .by_part_number
                .insert(asset.part_number.clone(), asset.asset_id.clone());
        }
        table.by_id.insert(asset.asset_id.clone(), asset.clone());
        Ok(())
    }

    async fn delete_asset(&self, asset_id: &str) -> Result<bool> {
        let mut table = self.assets()?;
        match table.by_id.remove(asset_id) {
            Some(asset) => {
                table.by_part_number.remove(&asset.part_number);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn latest_shot(&self, asset_id: &str) -> Result<Option<ShotEntry>> {
        Ok(self
            .shots
            .get(asset_id)
            .and_then(|entries| entries.values().next_back().cloned()))
    }

    async fn insert_shot(&self, entry: &ShotEntry) -> Result<()> {
        let mut entries = self.shots.entry(entry.asset_id.clone()).or_default();
        if entries.contains_key(&entry.seq) {
            return Err(KeeperError::Conflict(format!(
                "shot seq {} already recorded for asset {}",
                entry.seq, entry.asset_id
            )));
        }
        entries.insert(entry.seq, entry.clone());
        Ok(())
    }

    async fn shot_history(
        &self,
        asset_id: &str,
        before_seq: Option<u64>,
        limit: usize,
    ) -> Result<Vec<ShotEntry>> {
        let Some(entries) = self.shots.get(asset_id) else {
            return Ok(Vec::new());
        };
        let upper = before_seq.unwrap_or(u64::MAX);
        Ok(entries
            .range(..upper)
            .rev()
            .take(limit)
            .map(|(_, e)| e.clone())
            .collect())
    }

    async fn count_shots(&self, asset_id: &str) -> Result<u64> {
        Ok(self
            .shots
            .get(asset_id)
            .map(|entries| entries.len() as u64)
            .unwrap_or(0))
    }

    async fn insert_submission(&self, submission: &ChecklistSubmission) -> Result<()> {
        match self.submissions.entry(submission.submission_id.clone()) {
            Entry::Occupied(_) => Err(KeeperError::DuplicateIdentity(format!(
                "checklist {} already exists",
                submission.submission_id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(submission.clone());
                Ok(())
            }
        }
    }

    async fn get_submission(&self, submission_id: &str) -> Result<Option<ChecklistSubmission>> {
        Ok(self.submissions.get(submission_id).map(|s| s.clone()))
    }

    async fn replace_submission(
        &self,
        submission: &ChecklistSubmission,
        expected_version: u64,
    ) -> Result<()> {
        let mut current = self
            .submissions
            .get_mut(&submission.submission_id)
            .ok_or_else(|| {
                KeeperError::NotFound(format!("checklist {}", submission.submission_id))
            })?;
        if current.version != expected_version {
            return Err(KeeperError::Conflict(format!(
                "checklist {} is at version {}, expected {}",
                submission.submission_id, current.version, expected_version
            )));
        }
        *current = submission.clone();
        Ok(())
    }

    async fn latest_submission(&self, asset_id: &str) -> Result<Option<ChecklistSubmission>> {
        Ok(self
            .submissions
            .iter()
            .filter(|s| s.asset_id == asset_id)
            .max_by(|a, b| {
                a.created_at
                    .cmp(&b.created_at)
                    .then_with(|| a.submission_id.cmp(&b.submission_id))
            })
            .map(|s| s.clone()))
    }

    async fn count_submissions(&self, asset_id: &str) -> Result<u64> {
        Ok(self
            .submissions
            .iter()
            .filter(|s| s.asset_id == asset_id)
            .count() as u64)
    }

    async fn insert_repair(&self, repair: &RepairReport) -> Result<()> {
        match self.repairs.entry(repair.repair_id.clone()) {
            Entry::Occupied(_) => Err(KeeperError::DuplicateIdentity(format!(
                "repair {} already exists",
                repair.repair_id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(repair.clone());
                Ok(())
            }
        }
    }

    async fn get_repair(&self, repair_id: &str) -> Result<Option<RepairReport>> {
        Ok(self.repairs.get(repair_id).map(|r| r.clone()))
    }

    async fn replace_repair(&self, repair: &RepairReport, expected_version: u64) -> Result<()> {
        let mut current = self
            .repairs
            .get_mut(&repair.repair_id)
            .ok_or_else(|| KeeperError::NotFound(format!("repair {}", repair.repair_id)))?;
        if current.version != expected_version {
            return Err(KeeperError::Conflict(format!(
                "repair {} is at version {}, expected {}",
                repair.repair_id, current.version, expected_version
            )));
        }
        *current = repair.clone();
        Ok(())
    }

    async fn repairs_for_asset(&self, asset_id: &str) -> Result<Vec<RepairReport>> {
        let mut repairs: Vec<RepairReport> = self
            .repairs
            .iter()
            .filter(|r| r.asset_id == asset_id)
            .map(|r| r.clone())
            .collect();
        repairs.sort_by(|a, b| b.reported_at.cmp(&a.reported_at));
        Ok(repairs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::RunState;
    use chrono::Utc;

    fn asset(id: &str, part: &str) -> Asset {
        Asset {
            asset_id: id.into(),
            part_number: part.into(),
            cavity_count: 1,
            version: 1,
            ..Asset::default()
        }
    }

    fn shot(seq: u64, total: u64) -> ShotEntry {
        ShotEntry {
            asset_id: "M-1".into(),
            seq,
            delta: 10,
            total_after: total,
            run_state: RunState::Running,
            recorded_at: Utc::now(),
            recorded_by: "op".into(),
        }
    }

    #[tokio::test]
    async fn test_duplicate_seq_is_conflict() {
        let store = MemoryStore::new();
        store.insert_shot(&shot(1, 10)).await.unwrap();
        assert!(matches!(
            store.insert_shot(&shot(1, 20)).await,
            Err(KeeperError::Conflict(_))
        ));
        assert_eq!(store.latest_shot("M-1").await.unwrap().unwrap().total_after, 10);
    }

    #[tokio::test]
    async fn test_versioned_replace() {
        let store = MemoryStore::new();
        store.insert_asset(&asset("M-1", "PN-1")).await.unwrap();

        let mut next = asset("M-1", "PN-9");
        next.version = 2;
        store.replace_asset(&next, 1).await.unwrap();
        assert!(matches!(
            store.replace_asset(&next, 1).await,
            Err(KeeperError::Conflict(_))
        ));
        assert!(matches!(
            store.replace_asset(&asset("M-2", "PN-2"), 1).await,
            Err(KeeperError::NotFound(_))
        ));

        // old part number was released
        store.insert_asset(&asset("M-3", "PN-1")).await.unwrap();
        assert!(matches!(
            store.insert_asset(&asset("M-4", "PN-9")).await,
            Err(KeeperError::DuplicateIdentity(_))
        ));
    }

    #[tokio::test]
    async fn test_history_range() {
        let store = MemoryStore::new();
        for seq in 1..=5 {
            store.insert_shot(&shot(seq, seq * 10)).await.unwrap();
        }
        let page = store.shot_history("M-1", Some(4), 2).await.unwrap();
        let seqs: Vec<_> = page.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![3, 2]);
        assert_eq!(store.count_shots("M-1").await.unwrap(), 5);
        assert!(store.shot_history("M-9", None, 5).await.unwrap().is_empty());
    }
}
