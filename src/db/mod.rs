//! Storage layer for Moldkeeper
//!
//! Components talk to persistence through the [`Store`] trait. Two backends:
//! - [`MemoryStore`]: process-local tables, used in dev mode and tests
//! - [`MongoStore`]: MongoDB collections with unique indexes
//!
//! Contract every backend honours:
//! - `insert_shot` rejects a second entry with the same `(asset_id, seq)`
//!   with [`KeeperError::Conflict`]
//! - `replace_*` only succeeds when the stored version equals
//!   `expected_version`, otherwise `Conflict` (or `NotFound` if the record is
//!   gone)
//! - natural-key collisions surface as [`KeeperError::DuplicateIdentity`]
//! - everything else is a [`KeeperError::Database`] fault

pub mod locks;
pub mod memory;
pub mod mongo;
pub mod schemas;

use async_trait::async_trait;

use crate::checklist::ChecklistSubmission;
use crate::ledger::ShotEntry;
use crate::registry::Asset;
use crate::repair::RepairReport;
use crate::types::Result;

pub use locks::AssetLocks;
pub use memory::MemoryStore;
pub use mongo::{MongoClient, MongoCollection, MongoStore};

/// Persistence contract consumed by the maintenance components
#[async_trait]
pub trait Store: Send + Sync {
    /// Backend name for health reporting
    fn backend(&self) -> &'static str;

    /// Round trip to the backing service, used by the readiness probe
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    // Assets

    async fn insert_asset(&self, asset: &Asset) -> Result<()>;
    async fn get_asset(&self, asset_id: &str) -> Result<Option<Asset>>;
    async fn list_assets(&self) -> Result<Vec<Asset>>;
    async fn replace_asset(&self, asset: &Asset, expected_version: u64) -> Result<()>;
    /// Returns false when the asset did not exist
    async fn delete_asset(&self, asset_id: &str) -> Result<bool>;

    // Shot ledger

    async fn latest_shot(&self, asset_id: &str) -> Result<Option<ShotEntry>>;
    async fn insert_shot(&self, entry: &ShotEntry) -> Result<()>;
    /// Entries with `seq < before_seq` (all when `None`), newest first
    async fn shot_history(
        &self,
        asset_id: &str,
        before_seq: Option<u64>,
        limit: usize,
    ) -> Result<Vec<ShotEntry>>;
    async fn count_shots(&self, asset_id: &str) -> Result<u64>;

    // Checklist submissions

    async fn insert_submission(&self, submission: &ChecklistSubmission) -> Result<()>;
    async fn get_submission(&self, submission_id: &str) -> Result<Option<ChecklistSubmission>>;
    async fn replace_submission(
        &self,
        submission: &ChecklistSubmission,
        expected_version: u64,
    ) -> Result<()>;
    async fn latest_submission(&self, asset_id: &str) -> Result<Option<ChecklistSubmission>>;
    async fn count_submissions(&self, asset_id: &str) -> Result<u64>;

    // Repairs

    async fn insert_repair(&self, repair: &RepairReport) -> Result<()>;
    async fn get_repair(&self, repair_id: &str) -> Result<Option<RepairReport>>;
    async fn replace_repair(&self, repair: &RepairReport, expected_version: u64) -> Result<()>;
    async fn repairs_for_asset(&self, asset_id: &str) -> Result<Vec<RepairReport>>;
}
