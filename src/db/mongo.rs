//! MongoDB client, collection wrapper and store backend

use async_trait::async_trait;
use bson::{doc, Document};
use futures_util::TryStreamExt;
use mongodb::{
    error::{ErrorKind, WriteFailure},
    options::IndexOptions,
    Client, Collection, IndexModel,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{info, warn};

use super::schemas::{ASSET_COLLECTION, REPAIR_COLLECTION, SHOT_COLLECTION, SUBMISSION_COLLECTION};
use super::Store;
use crate::checklist::ChecklistSubmission;
use crate::ledger::ShotEntry;
use crate::registry::Asset;
use crate::repair::RepairReport;
use crate::types::{KeeperError, Result};

/// MongoDB duplicate key error code
const DUPLICATE_KEY: i32 = 11000;

/// Trait for schemas that provide index definitions
pub trait IntoIndexes {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)>;
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(e)) if e.code == DUPLICATE_KEY
    )
}

/// Clamp an unsigned counter into the signed range BSON stores
fn as_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// MongoDB client wrapper
#[derive(Clone)]
pub struct MongoClient {
    client: Client,
    db_name: String,
}

impl MongoClient {
    pub async fn new(uri: &str, db_name: &str) -> Result<Self> {
        info!("Connecting to MongoDB");

        // Fail fast on an unreachable server instead of hanging startup
        let timeout_uri = if uri.contains('?') {
            format!("{}&serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        } else {
            format!("{}?serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        };

        let client = Client::with_uri_str(&timeout_uri)
            .await
            .map_err(|e| KeeperError::Database(format!("Failed to connect to MongoDB: {}", e)))?;

        client
            .database(db_name)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| KeeperError::Database(format!("MongoDB ping failed: {}", e)))?;

        info!("Connected to MongoDB database '{}'", db_name);

        Ok(Self {
            client,
            db_name: db_name.to_string(),
        })
    }

    pub async fn collection<T>(&self, name: &str) -> Result<MongoCollection<T>>
    where
        T: Serialize + DeserializeOwned + Unpin + Send + Sync + IntoIndexes,
    {
        MongoCollection::new(&self.client, &self.db_name, name).await
    }

    pub async fn ping(&self) -> Result<()> {
        self.client
            .database(&self.db_name)
            .run_command(doc! { "ping": 1 })
            .await
            .map(|_| ())
            .map_err(|e| KeeperError::Database(format!("MongoDB ping failed: {}", e)))
    }
}

/// Typed collection with schema-defined indexes applied on open
#[derive(Debug, Clone)]
pub struct MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync,
{
    inner: Collection<T>,
}

impl<T> MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync + IntoIndexes,
{
    pub async fn new(client: &Client, db_name: &str, collection_name: &str) -> Result<Self> {
        let collection = client.database(db_name).collection::<T>(collection_name);
        let mongo_collection = MongoCollection { inner: collection };
        mongo_collection.apply_indexes().await?;
        Ok(mongo_collection)
    }

    async fn apply_indexes(&self) -> Result<()> {
        let schema_indices = T::into_indices();
        if schema_indices.is_empty() {
            return Ok(());
        }

        let indices: Vec<IndexModel> = schema_indices
            .into_iter()
            .map(|(keys, opts)| IndexModel::builder().keys(keys).options(opts).build())
            .collect();

        self.inner
            .create_indexes(indices)
            .await
            .map_err(|e| KeeperError::Database(format!("Failed to create indexes: {}", e)))?;
        Ok(())
    }

    /// Insert; `on_duplicate` builds the error for a unique index violation
    pub async fn insert_one(
        &self,
        item: &T,
        on_duplicate: impl FnOnce() -> KeeperError,
    ) -> Result<()> {
        match self.inner.insert_one(item).await {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate_key(&e) => Err(on_duplicate()),
            Err(e) => Err(KeeperError::Database(format!("Insert failed: {}", e))),
        }
    }

    pub async fn find_one(&self, filter: Document) -> Result<Option<T>> {
        self.inner
            .find_one(filter)
            .await
            .map_err(|e| KeeperError::Database(format!("Find failed: {}", e)))
    }

    pub async fn find_many(
        &self,
        filter: Document,
        sort: Option<Document>,
        limit: Option<i64>,
    ) -> Result<Vec<T>> {
        let mut action = self.inner.find(filter);
        if let Some(sort) = sort {
            action = action.sort(sort);
        }
        if let Some(limit) = limit {
            action = action.limit(limit);
        }

        let cursor = action
            .await
            .map_err(|e| KeeperError::Database(format!("Find failed: {}", e)))?;
        cursor
            .try_collect()
            .await
            .map_err(|e| KeeperError::Database(format!("Reading documents failed: {}", e)))
    }

    /// Replace the document matching `filter`; returns whether one matched
    pub async fn replace_one(
        &self,
        filter: Document,
        item: &T,
        on_duplicate: impl FnOnce() -> KeeperError,
    ) -> Result<bool> {
        match self.inner.replace_one(filter, item).await {
            Ok(result) => Ok(result.matched_count > 0),
            Err(e) if is_duplicate_key(&e) => Err(on_duplicate()),
            Err(e) => Err(KeeperError::Database(format!("Replace failed: {}", e))),
        }
    }

    pub async fn delete_one(&self, filter: Document) -> Result<bool> {
        self.inner
            .delete_one(filter)
            .await
            .map(|r| r.deleted_count > 0)
            .map_err(|e| KeeperError::Database(format!("Delete failed: {}", e)))
    }

    pub async fn count(&self, filter: Document) -> Result<u64> {
        self.inner
            .count_documents(filter)
            .await
            .map_err(|e| KeeperError::Database(format!("Count failed: {}", e)))
    }
}

/// Store backend over four collections
pub struct MongoStore {
    client: MongoClient,
    assets: MongoCollection<Asset>,
    shots: MongoCollection<ShotEntry>,
    submissions: MongoCollection<ChecklistSubmission>,
    repairs: MongoCollection<RepairReport>,
}

impl MongoStore {
    /// Open collections and ensure indexes
    pub async fn connect(uri: &str, db_name: &str) -> Result<Self> {
        let client = MongoClient::new(uri, db_name).await?;
        Ok(Self {
            assets: client.collection(ASSET_COLLECTION).await?,
            shots: client.collection(SHOT_COLLECTION).await?,
            submissions: client.collection(SUBMISSION_COLLECTION).await?,
            repairs: client.collection(REPAIR_COLLECTION).await?,
            client,
        })
    }

    /// A versioned replace matched nothing: tell a vanished record from a
    /// stale version
    async fn missed_replace<T>(
        collection: &MongoCollection<T>,
        id_filter: Document,
        what: String,
        expected_version: u64,
    ) -> KeeperError
    where
        T: Serialize + DeserializeOwned + Unpin + Send + Sync + IntoIndexes,
    {
        match collection.count(id_filter).await {
            Ok(0) => KeeperError::NotFound(what),
            Ok(_) => KeeperError::Conflict(format!(
                "{} changed since version {}",
                what, expected_version
            )),
            Err(e) => {
                warn!(error = %e, "Could not classify failed replace");
                e
            }
        }
    }
}

#[async_trait]
impl Store for MongoStore {
    fn backend(&self) -> &'static str {
        "mongodb"
    }

    async fn ping(&self) -> Result<()> {
        self.client.ping().await
    }

    async fn insert_asset(&self, asset: &Asset) -> Result<()> {
        self.assets
            .insert_one(asset, || {
                KeeperError::DuplicateIdentity(format!(
                    "asset {} or part number {} already registered",
                    asset.asset_id, asset.part_number
                ))
            })
            .await
    }

    async fn get_asset(&self, asset_id: &str) -> Result<Option<Asset>> {
        self.assets.find_one(doc! { "assetId": asset_id }).await
    }

    async fn list_assets(&self) -> Result<Vec<Asset>> {
        self.assets
            .find_many(doc! {}, Some(doc! { "assetId": 1 }), None)
            .await
    }

    async fn replace_asset(&self, asset: &Asset, expected_version: u64) -> Result<()> {
        let filter = doc! { "assetId": asset.asset_id.as_str(), "version": as_i64(expected_version) };
        let matched = self
            .assets
            .replace_one(filter, asset, || {
                KeeperError::DuplicateIdentity(format!(
                    "part number {} already registered",
                    asset.part_number
                ))
            })
            .await?;
        if matched {
            return Ok(());
        }
        Err(Self::missed_replace(
            &self.assets,
            doc! { "assetId": asset.asset_id.as_str() },
            format!("asset {}", asset.asset_id),
            expected_version,
        )
        .await)
    }

    async fn delete_asset(&self, asset_id: &str) -> Result<bool> {
        self.assets.delete_one(doc! { "assetId": asset_id }).await
    }

    async fn latest_shot(&self, asset_id: &str) -> Result<Option<ShotEntry>> {
        Ok(self
            .shots
            .find_many(doc! { "assetId": asset_id }, Some(doc! { "seq": -1 }), Some(1))
            .await?
            .into_iter()
            .next())
    }

    async fn insert_shot(&self, entry: &ShotEntry) -> Result<()> {
        self.shots
            .insert_one(entry, || {
                KeeperError::Conflict(format!(
                    "shot seq {} already recorded for asset {}",
                    entry.seq, entry.asset_id
                ))
            })
            .await
    }

    async fn shot_history(
        &self,
        asset_id: &str,
        before_seq: Option<u64>,
        limit: usize,
    ) -> Result<Vec<ShotEntry>> {
        let mut filter = doc! { "assetId": asset_id };
        if let Some(before) = before_seq {
            filter.insert("seq", doc! { "$lt": as_i64(before) });
        }
        self.shots
            .find_many(
                filter,
                Some(doc! { "seq": -1 }),
                Some(as_i64(limit as u64)),
            )
            .await
    }

    async fn count_shots(&self, asset_id: &str) -> Result<u64> {
        self.shots.count(doc! { "assetId": asset_id }).await
    }

    async fn insert_submission(&self, submission: &ChecklistSubmission) -> Result<()> {
        self.submissions
            .insert_one(submission, || {
                KeeperError::DuplicateIdentity(format!(
                    "checklist {} already exists",
                    submission.submission_id
                ))
            })
            .await
    }

    async fn get_submission(&self, submission_id: &str) -> Result<Option<ChecklistSubmission>> {
        self.submissions
            .find_one(doc! { "submissionId": submission_id })
            .await
    }

    async fn replace_submission(
        &self,
        submission: &ChecklistSubmission,
        expected_version: u64,
    ) -> Result<()> {
        let filter = doc! {
            "submissionId": submission.submission_id.as_str(),
            "version": as_i64(expected_version),
        };
        let matched = self
            .submissions
            .replace_one(filter, submission, || {
                KeeperError::Internal("submission replace hit a unique index".into())
            })
            .await?;
        if matched {
            return Ok(());
        }
        Err(Self::missed_replace(
            &self.submissions,
            doc! { "submissionId": submission.submission_id.as_str() },
            format!("checklist {}", submission.submission_id),
            expected_version,
        )
        .await)
    }

    async fn latest_submission(&self, asset_id: &str) -> Result<Option<ChecklistSubmission>> {
        // Timestamps are stored as RFC 3339 strings, so order in process
        Ok(self
            .submissions
            .find_many(doc! { "assetId": asset_id }, None, None)
            .await?
            .into_iter()
            .max_by(|a, b| {
                a.created_at
                    .cmp(&b.created_at)
                    .then_with(|| a.submission_id.cmp(&b.submission_id))
            }))
    }

    async fn count_submissions(&self, asset_id: &str) -> Result<u64> {
        self.submissions.count(doc! { "assetId": asset_id }).await
    }

    async fn insert_repair(&self, repair: &RepairReport) -> Result<()> {
        self.repairs
            .insert_one(repair, || {
                KeeperError::DuplicateIdentity(format!("repair {} already exists", repair.repair_id))
            })
            .await
    }

    async fn get_repair(&self, repair_id: &str) -> Result<Option<RepairReport>> {
        self.repairs.find_one(doc! { "repairId": repair_id }).await
    }

    async fn replace_repair(&self, repair: &RepairReport, expected_version: u64) -> Result<()> {
        let filter = doc! {
            "repairId": repair.repair_id.as_str(),
            "version": as_i64(expected_version),
        };
        let matched = self
            .repairs
            .replace_one(filter, repair, || {
                KeeperError::Internal("repair replace hit a unique index".into())
            })
            .await?;
        if matched {
            return Ok(());
        }
        Err(Self::missed_replace(
            &self.repairs,
            doc! { "repairId": repair.repair_id.as_str() },
            format!("repair {}", repair.repair_id),
            expected_version,
        )
        .await)
    }

    async fn repairs_for_asset(&self, asset_id: &str) -> Result<Vec<RepairReport>> {
        let mut repairs = self
            .repairs
            .find_many(doc! { "assetId": asset_id }, None, None)
            .await?;
        repairs.sort_by(|a, b| b.reported_at.cmp(&a.reported_at));
        Ok(repairs)
    }
}
