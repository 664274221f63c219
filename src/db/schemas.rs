//! Collection names and index definitions
//!
//! Unique indexes carry the store contract on MongoDB: natural keys for
//! assets, `(assetId, seq)` for the ledger, primary ids for the rest.

use bson::{doc, Document};
use mongodb::options::IndexOptions;

use super::mongo::IntoIndexes;
use crate::checklist::ChecklistSubmission;
use crate::ledger::ShotEntry;
use crate::registry::Asset;
use crate::repair::RepairReport;

pub const ASSET_COLLECTION: &str = "assets";
pub const SHOT_COLLECTION: &str = "shot_entries";
pub const SUBMISSION_COLLECTION: &str = "checklist_submissions";
pub const REPAIR_COLLECTION: &str = "repair_reports";

fn unique(name: &str) -> Option<IndexOptions> {
    Some(
        IndexOptions::builder()
            .unique(true)
            .name(name.to_string())
            .build(),
    )
}

fn named(name: &str) -> Option<IndexOptions> {
    Some(IndexOptions::builder().name(name.to_string()).build())
}

impl IntoIndexes for Asset {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (doc! { "assetId": 1 }, unique("asset_id_unique")),
            (doc! { "partNumber": 1 }, unique("part_number_unique")),
        ]
    }
}

impl IntoIndexes for ShotEntry {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(doc! { "assetId": 1, "seq": -1 }, unique("asset_seq_unique"))]
    }
}

impl IntoIndexes for ChecklistSubmission {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (doc! { "submissionId": 1 }, unique("submission_id_unique")),
            (doc! { "assetId": 1 }, named("submission_asset")),
        ]
    }
}

impl IntoIndexes for RepairReport {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (doc! { "repairId": 1 }, unique("repair_id_unique")),
            (doc! { "assetId": 1, "status": 1 }, named("repair_asset_status")),
        ]
    }
}
