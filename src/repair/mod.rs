//! Repair reports
//!
//! Field-reported defects with a priority and a short lifecycle:
//! `reported → in-progress → completed | cancelled`. Urgent, non-terminal
//! reports feed the notification engine and block asset deletion.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::db::{AssetLocks, Store};
use crate::types::{KeeperError, Result};

const UPDATE_RETRIES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RepairPriority {
    Low,
    #[default]
    Normal,
    Urgent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RepairStatus {
    #[default]
    Reported,
    InProgress,
    Completed,
    Cancelled,
}

impl RepairStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

/// A repair report against one asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairReport {
    pub repair_id: String,
    pub asset_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub priority: RepairPriority,
    pub status: RepairStatus,
    pub reported_at: DateTime<Utc>,
    pub reported_by: String,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub version: u64,
}

impl RepairReport {
    /// Urgent and still open
    pub fn is_urgent_open(&self) -> bool {
        self.priority == RepairPriority::Urgent && !self.status.is_terminal()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRepair {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: RepairPriority,
}

/// Repair report service
#[derive(Clone)]
pub struct RepairLog {
    store: Arc<dyn Store>,
    locks: Arc<AssetLocks>,
}

impl RepairLog {
    pub fn new(store: Arc<dyn Store>, locks: Arc<AssetLocks>) -> Self {
        Self { store, locks }
    }

    pub async fn report(&self, asset_id: &str, input: NewRepair, actor: &str) -> Result<RepairReport> {
        if input.title.trim().is_empty() {
            return Err(KeeperError::invalid_field("title", "must not be empty"));
        }

        // Held until the insert lands so a concurrent delete sees this report
        let _guard = self.locks.lock(asset_id).await;
        if self.store.get_asset(asset_id).await?.is_none() {
            return Err(KeeperError::NotFound(format!("asset {}", asset_id)));
        }

        let now = Utc::now();
        let report = RepairReport {
            repair_id: format!("rep_{}", uuid::Uuid::new_v4().simple()),
            asset_id: asset_id.to_string(),
            title: input.title.trim().to_string(),
            description: input.description,
            priority: input.priority,
            status: RepairStatus::Reported,
            reported_at: now,
            reported_by: actor.to_string(),
            updated_at: now,
            version: 1,
        };

        self.store.insert_repair(&report).await?;
        info!(
            asset_id = %asset_id,
            repair_id = %report.repair_id,
            priority = ?report.priority,
            "Repair reported"
        );
        Ok(report)
    }

    pub async fn get(&self, repair_id: &str) -> Result<RepairReport> {
        self.store
            .get_repair(repair_id)
            .await?
            .ok_or_else(|| KeeperError::NotFound(format!("repair {}", repair_id)))
    }

    /// Move a report to a new status. Terminal reports are frozen.
    pub async fn update_status(
        &self,
        repair_id: &str,
        status: RepairStatus,
        actor: &str,
    ) -> Result<RepairReport> {
        for attempt in 0..UPDATE_RETRIES {
            let current = self.get(repair_id).await?;
            if current.status.is_terminal() {
                return Err(KeeperError::InvalidState(format!(
                    "repair {} is already {:?}",
                    repair_id, current.status
                )));
            }

            let mut next = current.clone();
            next.status = status;
            next.updated_at = Utc::now();
            next.version = current.version + 1;

            match self.store.replace_repair(&next, current.version).await {
                Ok(()) => {
                    info!(
                        repair_id = %repair_id,
                        status = ?status,
                        actor = %actor,
                        "Repair status changed"
                    );
                    return Ok(next);
                }
                Err(KeeperError::Conflict(_)) => {
                    debug!(repair_id = %repair_id, attempt, "Repair update raced, retrying");
                }
                Err(e) => return Err(e),
            }
        }

        Err(KeeperError::Conflict(format!("repair {} kept changing", repair_id)))
    }

    pub async fn for_asset(&self, asset_id: &str) -> Result<Vec<RepairReport>> {
        self.store.repairs_for_asset(asset_id).await
    }

    /// Reports that are neither completed nor cancelled
    pub async fn open_for_asset(&self, asset_id: &str) -> Result<Vec<RepairReport>> {
        Ok(self
            .for_asset(asset_id)
            .await?
            .into_iter()
            .filter(|r| !r.status.is_terminal())
            .collect())
    }
}
