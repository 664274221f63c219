//! Asset registry
//!
//! Identity and static attributes of physical molds. The part number is the
//! natural key. Assets are never removed while shot entries, checklist
//! submissions or open repairs still point at them.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::db::{AssetLocks, Store};
use crate::types::{KeeperError, Result};

/// Attempts for a versioned update before giving up with `Conflict`
const UPDATE_RETRIES: usize = 5;

/// A registered tooling asset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub asset_id: String,
    pub part_number: String,
    #[serde(default)]
    pub part_name: String,
    #[serde(default)]
    pub material: String,
    #[serde(default)]
    pub cavity_count: u32,
    /// Rated life of the mold in shots (0 = unknown)
    #[serde(default)]
    pub max_life_shots: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_maintenance: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: DateTime<Utc>,
}

/// Registration payload
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAsset {
    /// Explicit id (e.g. the code printed on the mold); generated when absent
    #[serde(default)]
    pub asset_id: Option<String>,
    pub part_number: String,
    #[serde(default)]
    pub part_name: String,
    #[serde(default)]
    pub material: String,
    #[serde(default = "default_cavity_count")]
    pub cavity_count: u32,
    #[serde(default)]
    pub max_life_shots: u64,
    #[serde(default)]
    pub next_maintenance: Option<NaiveDate>,
    #[serde(default)]
    pub manufacturer: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

fn default_cavity_count() -> u32 {
    1
}

/// Partial attribute update; absent fields are left untouched
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetPatch {
    pub part_number: Option<String>,
    pub part_name: Option<String>,
    pub material: Option<String>,
    pub cavity_count: Option<u32>,
    pub max_life_shots: Option<u64>,
    /// `Some(None)` clears the due date
    #[serde(default, with = "double_option")]
    pub next_maintenance: Option<Option<NaiveDate>>,
    pub manufacturer: Option<String>,
    pub notes: Option<String>,
}

impl AssetPatch {
    fn apply(&self, asset: &mut Asset) {
        if let Some(ref v) = self.part_number {
            asset.part_number = v.trim().to_string();
        }
        if let Some(ref v) = self.part_name {
            asset.part_name = v.clone();
        }
        if let Some(ref v) = self.material {
            asset.material = v.clone();
        }
        if let Some(v) = self.cavity_count {
            asset.cavity_count = v;
        }
        if let Some(v) = self.max_life_shots {
            asset.max_life_shots = v;
        }
        if let Some(v) = self.next_maintenance {
            asset.next_maintenance = v;
        }
        if let Some(ref v) = self.manufacturer {
            asset.manufacturer = Some(v.clone());
        }
        if let Some(ref v) = self.notes {
            asset.notes = Some(v.clone());
        }
    }
}

mod double_option {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        T: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}

fn validate_attributes(asset: &Asset) -> Result<()> {
    if asset.asset_id.trim().is_empty() {
        return Err(KeeperError::invalid_field("assetId", "must not be empty"));
    }
    if asset.part_number.trim().is_empty() {
        return Err(KeeperError::invalid_field("partNumber", "must not be empty"));
    }
    if asset.cavity_count == 0 {
        return Err(KeeperError::invalid_field("cavityCount", "must be at least 1"));
    }
    Ok(())
}

fn generate_asset_id() -> String {
    let raw = uuid::Uuid::new_v4().simple().to_string().to_uppercase();
    format!("M-{}", &raw[..8])
}

/// Registry of assets backed by the shared store
#[derive(Clone)]
pub struct AssetRegistry {
    store: Arc<dyn Store>,
    locks: Arc<AssetLocks>,
}

impl AssetRegistry {
    pub fn new(store: Arc<dyn Store>, locks: Arc<AssetLocks>) -> Self {
        Self { store, locks }
    }

    /// Register a new asset; part number and asset id must be unused
    pub async fn register(&self, attrs: NewAsset) -> Result<Asset> {
        let now = Utc::now();
        let asset = Asset {
            asset_id: attrs
                .asset_id
                .map(|id| id.trim().to_string())
                .unwrap_or_else(generate_asset_id),
            part_number: attrs.part_number.trim().to_string(),
            part_name: attrs.part_name,
            material: attrs.material,
            cavity_count: attrs.cavity_count,
            max_life_shots: attrs.max_life_shots,
            next_maintenance: attrs.next_maintenance,
            manufacturer: attrs.manufacturer,
            notes: attrs.notes,
            version: 1,
            created_at: now,
            updated_at: now,
        };
        validate_attributes(&asset)?;

        self.store.insert_asset(&asset).await?;
        info!(
            asset_id = %asset.asset_id,
            part_number = %asset.part_number,
            "Asset registered"
        );
        Ok(asset)
    }

    pub async fn get(&self, asset_id: &str) -> Result<Asset> {
        self.store
            .get_asset(asset_id)
            .await?
            .ok_or_else(|| KeeperError::NotFound(format!("asset {}", asset_id)))
    }

    pub async fn list(&self) -> Result<Vec<Asset>> {
        self.store.list_assets().await
    }

    /// Amend attributes. A part number change onto another asset's part
    /// number fails with `DuplicateIdentity`.
    pub async fn update(&self, asset_id: &str, patch: AssetPatch) -> Result<Asset> {
        for attempt in 0..UPDATE_RETRIES {
            let current = self.get(asset_id).await?;
            let mut next = current.clone();
            patch.apply(&mut next);
            validate_attributes(&next)?;
            next.version = current.version + 1;
            next.updated_at = Utc::now();

            match self.store.replace_asset(&next, current.version).await {
                Ok(()) => {
                    info!(asset_id = %asset_id, version = next.version, "Asset updated");
                    return Ok(next);
                }
                Err(KeeperError::Conflict(_)) => {
                    debug!(asset_id = %asset_id, attempt, "Asset update raced, retrying");
                }
                Err(e) => return Err(e),
            }
        }

        Err(KeeperError::Conflict(format!(
            "asset {} kept changing during update",
            asset_id
        )))
    }

    /// Remove an asset that nothing references any more
    pub async fn delete(&self, asset_id: &str) -> Result<()> {
        let _guard = self.locks.lock(asset_id).await;

        self.get(asset_id).await?;

        let shots = self.store.count_shots(asset_id).await?;
        let submissions = self.store.count_submissions(asset_id).await?;
        let open_repairs = self
            .store
            .repairs_for_asset(asset_id)
            .await?
            .into_iter()
            .filter(|r| !r.status.is_terminal())
            .count();

        if shots > 0 || submissions > 0 || open_repairs > 0 {
            return Err(KeeperError::HasDependents(format!(
                "asset {} has {} shot entries, {} checklist submissions, {} open repairs",
                asset_id, shots, submissions, open_repairs
            )));
        }

        if !self.store.delete_asset(asset_id).await? {
            return Err(KeeperError::NotFound(format!("asset {}", asset_id)));
        }
        info!(asset_id = %asset_id, "Asset deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::ledger::{RunState, ShotLedger};
    use crate::repair::{NewRepair, RepairLog, RepairPriority, RepairStatus};

    fn setup() -> (AssetRegistry, Arc<dyn Store>, Arc<AssetLocks>) {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let locks = Arc::new(AssetLocks::new());
        (
            AssetRegistry::new(Arc::clone(&store), Arc::clone(&locks)),
            store,
            locks,
        )
    }

    fn new_asset(id: &str, part: &str) -> NewAsset {
        NewAsset {
            asset_id: Some(id.to_string()),
            part_number: part.to_string(),
            material: "NAK80".to_string(),
            cavity_count: 2,
            max_life_shots: 1_000_000,
            ..NewAsset::default()
        }
    }

    #[tokio::test]
    async fn test_register_and_get() {
        let (registry, _, _) = setup();
        let asset = registry.register(new_asset("M-2024-001", "PN-100")).await.unwrap();
        assert_eq!(asset.version, 1);

        let fetched = registry.get("M-2024-001").await.unwrap();
        assert_eq!(fetched, asset);
        assert!(matches!(
            registry.get("M-missing").await,
            Err(KeeperError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_generated_id() {
        let (registry, _, _) = setup();
        let mut attrs = new_asset("x", "PN-1");
        attrs.asset_id = None;
        let asset = registry.register(attrs).await.unwrap();
        assert!(asset.asset_id.starts_with("M-"));
        assert_eq!(asset.asset_id.len(), 10);
    }

    #[tokio::test]
    async fn test_duplicate_part_number_rejected() {
        let (registry, _, _) = setup();
        registry.register(new_asset("M-1", "PN-100")).await.unwrap();
        let err = registry.register(new_asset("M-2", "PN-100")).await.unwrap_err();
        assert!(matches!(err, KeeperError::DuplicateIdentity(_)));

        let err = registry.register(new_asset("M-1", "PN-200")).await.unwrap_err();
        assert!(matches!(err, KeeperError::DuplicateIdentity(_)));
    }

    #[tokio::test]
    async fn test_invalid_attributes() {
        let (registry, _, _) = setup();
        let mut attrs = new_asset("M-1", "  ");
        let err = registry.register(attrs.clone()).await.unwrap_err();
        assert_eq!(err.field(), Some("partNumber"));

        attrs.part_number = "PN-1".into();
        attrs.cavity_count = 0;
        let err = registry.register(attrs).await.unwrap_err();
        assert_eq!(err.field(), Some("cavityCount"));
    }

    #[tokio::test]
    async fn test_update_patch_and_natural_key() {
        let (registry, _, _) = setup();
        registry.register(new_asset("M-1", "PN-100")).await.unwrap();
        registry.register(new_asset("M-2", "PN-200")).await.unwrap();

        let patch = AssetPatch {
            material: Some("STAVAX".into()),
            next_maintenance: Some(NaiveDate::from_ymd_opt(2024, 7, 1)),
            ..AssetPatch::default()
        };
        let updated = registry.update("M-1", patch).await.unwrap();
        assert_eq!(updated.material, "STAVAX");
        assert_eq!(updated.version, 2);
        assert_eq!(updated.part_number, "PN-100");

        let clash = AssetPatch {
            part_number: Some("PN-200".into()),
            ..AssetPatch::default()
        };
        assert!(matches!(
            registry.update("M-1", clash).await,
            Err(KeeperError::DuplicateIdentity(_))
        ));

        let missing = registry.update("M-9", AssetPatch::default()).await;
        assert!(matches!(missing, Err(KeeperError::NotFound(_))));
    }

    #[test]
    fn test_patch_can_clear_due_date() {
        let patch: AssetPatch = serde_json::from_str(r#"{"nextMaintenance": null}"#).unwrap();
        assert_eq!(patch.next_maintenance, Some(None));

        let patch: AssetPatch = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(patch.next_maintenance, None);
    }

    #[tokio::test]
    async fn test_delete_blocked_by_shots() {
        let (registry, store, locks) = setup();
        registry.register(new_asset("M-1", "PN-100")).await.unwrap();
        let ledger = ShotLedger::new(Arc::clone(&store), locks, 100);
        ledger.append("M-1", 10, RunState::Running, "op").await.unwrap();

        assert!(matches!(
            registry.delete("M-1").await,
            Err(KeeperError::HasDependents(_))
        ));
        assert!(registry.get("M-1").await.is_ok());
    }

    #[tokio::test]
    async fn test_delete_blocked_only_by_open_repairs() {
        let (registry, store, locks) = setup();
        registry.register(new_asset("M-1", "PN-100")).await.unwrap();
        let repairs = RepairLog::new(Arc::clone(&store), locks);
        let repair = repairs
            .report(
                "M-1",
                NewRepair {
                    title: "Cracked slide".into(),
                    description: None,
                    priority: RepairPriority::Normal,
                },
                "op",
            )
            .await
            .unwrap();

        assert!(matches!(
            registry.delete("M-1").await,
            Err(KeeperError::HasDependents(_))
        ));

        repairs
            .update_status(&repair.repair_id, RepairStatus::Completed, "op")
            .await
            .unwrap();
        registry.delete("M-1").await.unwrap();
        assert!(matches!(
            registry.get("M-1").await,
            Err(KeeperError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_unknown() {
        let (registry, _, _) = setup();
        assert!(matches!(
            registry.delete("nope").await,
            Err(KeeperError::NotFound(_))
        ));
    }
}
