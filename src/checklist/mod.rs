//! Maintenance checklists
//!
//! A submission moves `draft → pending → approved`. Edits are allowed until
//! approval; once approved the record is frozen and every mutation fails
//! with `Immutable`. All writes go through a versioned replace so an edit
//! racing an approval cannot slip in after the approval landed.

pub mod edit;
pub mod model;

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

use crate::db::{AssetLocks, Store};
use crate::types::{KeeperError, Result};

pub use edit::ChecklistEdit;
pub use model::{
    missing_required, validate_categories, ApprovalStatus, Attachment, ChecklistCategory,
    ChecklistItem, ChecklistSubmission, Completion, FieldValue,
};

const MUTATE_RETRIES: usize = 5;

/// Checklist workflow service
#[derive(Clone)]
pub struct ChecklistWorkflow {
    store: Arc<dyn Store>,
    locks: Arc<AssetLocks>,
    require_complete: bool,
}

impl ChecklistWorkflow {
    /// `require_complete` makes `submit` refuse while required items are open
    pub fn new(store: Arc<dyn Store>, locks: Arc<AssetLocks>, require_complete: bool) -> Self {
        Self {
            store,
            locks,
            require_complete,
        }
    }

    /// Validate the whole payload and store it as a draft
    pub async fn create(
        &self,
        asset_id: &str,
        categories: Vec<ChecklistCategory>,
        actor: &str,
    ) -> Result<ChecklistSubmission> {
        validate_categories(&categories)?;

        let _guard = self.locks.lock(asset_id).await;
        if self.store.get_asset(asset_id).await?.is_none() {
            return Err(KeeperError::NotFound(format!("asset {}", asset_id)));
        }

        let now = Utc::now();
        let submission = ChecklistSubmission {
            submission_id: format!("chk_{}", uuid::Uuid::new_v4().simple()),
            asset_id: asset_id.to_string(),
            status: ApprovalStatus::Draft,
            categories,
            version: 1,
            created_at: now,
            created_by: actor.to_string(),
            updated_at: now,
            submitted_at: None,
            approved_at: None,
            approved_by: None,
        };
        self.store.insert_submission(&submission).await?;

        info!(
            asset_id = %asset_id,
            submission_id = %submission.submission_id,
            categories = submission.categories.len(),
            "Checklist created"
        );
        Ok(submission)
    }

    /// Create and immediately submit. Under the strict completeness policy
    /// an incomplete payload is refused before anything is stored.
    pub async fn create_submitted(
        &self,
        asset_id: &str,
        categories: Vec<ChecklistCategory>,
        actor: &str,
    ) -> Result<ChecklistSubmission> {
        if self.require_complete {
            let missing = model::missing_required(&categories);
            if !missing.is_empty() {
                return Err(KeeperError::Incomplete { missing });
            }
        }
        let draft = self.create(asset_id, categories, actor).await?;
        self.submit(&draft.submission_id, actor).await
    }

    pub async fn get(&self, submission_id: &str) -> Result<ChecklistSubmission> {
        self.store
            .get_submission(submission_id)
            .await?
            .ok_or_else(|| KeeperError::NotFound(format!("checklist {}", submission_id)))
    }

    /// Most recently created submission for an asset
    pub async fn latest_for_asset(&self, asset_id: &str) -> Result<Option<ChecklistSubmission>> {
        self.store.latest_submission(asset_id).await
    }

    pub async fn edit(
        &self,
        submission_id: &str,
        edit: &ChecklistEdit,
        actor: &str,
    ) -> Result<ChecklistSubmission> {
        let updated = self.mutate(submission_id, |s| edit.apply(s)).await?;
        debug!(submission_id = %submission_id, actor = %actor, "Checklist edited");
        Ok(updated)
    }

    /// Hand a draft over for approval
    pub async fn submit(&self, submission_id: &str, actor: &str) -> Result<ChecklistSubmission> {
        let require_complete = self.require_complete;
        let updated = self
            .mutate(submission_id, |s| {
                if s.status != ApprovalStatus::Draft {
                    return Err(KeeperError::InvalidState(format!(
                        "checklist is {:?}, only drafts can be submitted",
                        s.status
                    )));
                }
                if require_complete {
                    let missing = s.missing_required();
                    if !missing.is_empty() {
                        return Err(KeeperError::Incomplete { missing });
                    }
                }
                s.status = ApprovalStatus::Pending;
                s.submitted_at = Some(Utc::now());
                Ok(())
            })
            .await?;

        info!(
            submission_id = %submission_id,
            actor = %actor,
            completion = updated.completion().completion_rate,
            "Checklist submitted"
        );
        Ok(updated)
    }

    /// Approve a pending submission; the record is frozen afterwards
    pub async fn approve(&self, submission_id: &str, approver: &str) -> Result<ChecklistSubmission> {
        let updated = self
            .mutate(submission_id, |s| {
                if s.status != ApprovalStatus::Pending {
                    return Err(KeeperError::InvalidState(format!(
                        "checklist is {:?}, only pending checklists can be approved",
                        s.status
                    )));
                }
                let now = Utc::now();
                s.status = ApprovalStatus::Approved;
                s.approved_at = Some(now);
                s.approved_by = Some(approver.to_string());
                Ok(())
            })
            .await?;

        info!(submission_id = %submission_id, approver = %approver, "Checklist approved");
        Ok(updated)
    }

    /// Load, refuse if approved, apply `change` to a copy and write it back
    /// under the version read. A lost race re-reads, so a concurrent
    /// approval is seen and reported as `Immutable`.
    async fn mutate<F>(&self, submission_id: &str, change: F) -> Result<ChecklistSubmission>
    where
        F: Fn(&mut ChecklistSubmission) -> Result<()>,
    {
        for attempt in 0..MUTATE_RETRIES {
            let current = self.get(submission_id).await?;
            if current.status == ApprovalStatus::Approved {
                return Err(KeeperError::Immutable(format!(
                    "checklist {} is approved",
                    submission_id
                )));
            }

            let mut next = current.clone();
            change(&mut next)?;
            next.version = current.version + 1;
            next.updated_at = Utc::now();

            match self.store.replace_submission(&next, current.version).await {
                Ok(()) => return Ok(next),
                Err(KeeperError::Conflict(_)) => {
                    debug!(submission_id = %submission_id, attempt, "Checklist write raced, retrying");
                }
                Err(e) => return Err(e),
            }
        }

        Err(KeeperError::Conflict(format!(
            "checklist {} kept changing",
            submission_id
        )))
    }
}
