//! Asset, ledger, schedule and notification endpoints

use bytes::Bytes;
use chrono::{DateTime, Utc};
use http_body_util::Full;
use hyper::{HeaderMap, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{authorize, json_response, parse_json};
use crate::auth::Operation;
use crate::checklist::ApprovalStatus;
use crate::ledger::RunState;
use crate::registry::{Asset, AssetPatch, NewAsset};
use crate::server::AppState;
use crate::types::{KeeperError, Result};

const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Latest checklist summary shown alongside an asset
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistSummary {
    pub submission_id: String,
    pub approval_status: ApprovalStatus,
    pub completion_rate: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetView {
    #[serde(flatten)]
    pub asset: Asset,
    pub current_total: u64,
    pub latest_checklist: Option<ChecklistSummary>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShotRequest {
    /// Kept raw so a non-integer count is reported against `delta`
    #[serde(default)]
    delta: Value,
    #[serde(default)]
    run_state: RunState,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ShotResponse {
    asset_id: String,
    seq: u64,
    total_after: u64,
    recorded_at: DateTime<Utc>,
}

/// Whole shot count from the request, or `InvalidDelta`
fn shot_delta(raw: &Value) -> Result<i64> {
    match raw {
        Value::Null => Err(KeeperError::InvalidDelta("delta is required".into())),
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| KeeperError::InvalidDelta(format!("{} is not a whole shot count", n))),
        other => Err(KeeperError::InvalidDelta(format!(
            "expected an integer, got {}",
            other
        ))),
    }
}

#[derive(Debug, Default, Deserialize)]
struct HistoryQuery {
    limit: Option<usize>,
    before: Option<u64>,
}

pub async fn register(
    state: &AppState,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<Response<Full<Bytes>>> {
    authorize(state, headers, None, Operation::RegisterAsset)?;
    let attrs: NewAsset = parse_json(body)?;
    let asset = state.registry.register(attrs).await?;
    Ok(json_response(StatusCode::CREATED, &asset))
}

pub async fn list(state: &AppState) -> Result<Response<Full<Bytes>>> {
    let assets = state.registry.list().await?;
    Ok(json_response(StatusCode::OK, &assets))
}

pub async fn get(state: &AppState, asset_id: &str) -> Result<Response<Full<Bytes>>> {
    let asset = state.registry.get(asset_id).await?;
    let current_total = state.ledger.current_total(asset_id).await?;
    let latest_checklist = state
        .checklists
        .latest_for_asset(asset_id)
        .await?
        .map(|s| ChecklistSummary {
            completion_rate: s.completion().completion_rate,
            submission_id: s.submission_id,
            approval_status: s.status,
        });

    Ok(json_response(
        StatusCode::OK,
        &AssetView {
            asset,
            current_total,
            latest_checklist,
        },
    ))
}

pub async fn update(
    state: &AppState,
    headers: &HeaderMap,
    asset_id: &str,
    body: &Bytes,
) -> Result<Response<Full<Bytes>>> {
    authorize(state, headers, Some(asset_id), Operation::UpdateAsset)?;
    let patch: AssetPatch = parse_json(body)?;
    let asset = state.registry.update(asset_id, patch).await?;
    Ok(json_response(StatusCode::OK, &asset))
}

pub async fn delete(
    state: &AppState,
    headers: &HeaderMap,
    asset_id: &str,
) -> Result<Response<Full<Bytes>>> {
    let actor = authorize(state, headers, Some(asset_id), Operation::DeleteAsset)?;
    state.registry.delete(asset_id).await?;
    Ok(json_response(
        StatusCode::OK,
        &serde_json::json!({ "deleted": asset_id, "by": actor }),
    ))
}

pub async fn record_shots(
    state: &AppState,
    headers: &HeaderMap,
    asset_id: &str,
    body: &Bytes,
) -> Result<Response<Full<Bytes>>> {
    let actor = authorize(state, headers, Some(asset_id), Operation::RecordShots)?;
    let request: ShotRequest = parse_json(body)?;
    let delta = shot_delta(&request.delta)?;
    let entry = state
        .ledger
        .append(asset_id, delta, request.run_state, &actor)
        .await?;

    Ok(json_response(
        StatusCode::CREATED,
        &ShotResponse {
            asset_id: entry.asset_id,
            seq: entry.seq,
            total_after: entry.total_after,
            recorded_at: entry.recorded_at,
        },
    ))
}

pub async fn shot_history(
    state: &AppState,
    asset_id: &str,
    query: Option<&str>,
) -> Result<Response<Full<Bytes>>> {
    let query: HistoryQuery = match query {
        Some(raw) => serde_urlencoded::from_str(raw)
            .map_err(|e| KeeperError::BadRequest(format!("Invalid query: {}", e)))?,
        None => HistoryQuery::default(),
    };
    state.registry.get(asset_id).await?;

    let entries = state
        .ledger
        .history(
            asset_id,
            query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT),
            query.before,
        )
        .await?;
    Ok(json_response(StatusCode::OK, &entries))
}

pub async fn schedule(state: &AppState, asset_id: &str) -> Result<Response<Full<Bytes>>> {
    let asset = state.registry.get(asset_id).await?;
    let total = state.ledger.current_total(asset_id).await?;
    let report = state.scheduler.evaluate(&asset, total, Utc::now());
    Ok(json_response(StatusCode::OK, &report))
}

pub async fn notifications(state: &AppState, asset_id: &str) -> Result<Response<Full<Bytes>>> {
    let notifications = state.notifications.for_asset(asset_id, Utc::now()).await?;
    Ok(json_response(StatusCode::OK, &notifications))
}
