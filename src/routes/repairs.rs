//! Repair report endpoints

use bytes::Bytes;
use http_body_util::Full;
use hyper::{HeaderMap, Response, StatusCode};
use serde::Deserialize;

use super::{authorize, json_response, parse_json};
use crate::auth::Operation;
use crate::repair::{NewRepair, RepairStatus};
use crate::server::AppState;
use crate::types::{KeeperError, Result};

#[derive(Debug, Default, Deserialize)]
struct ListQuery {
    #[serde(default)]
    open: bool,
}

#[derive(Debug, Deserialize)]
struct StatusRequest {
    status: RepairStatus,
}

pub async fn report(
    state: &AppState,
    headers: &HeaderMap,
    asset_id: &str,
    body: &Bytes,
) -> Result<Response<Full<Bytes>>> {
    let actor = authorize(state, headers, Some(asset_id), Operation::ReportRepair)?;
    let input: NewRepair = parse_json(body)?;
    let repair = state.repairs.report(asset_id, input, &actor).await?;
    Ok(json_response(StatusCode::CREATED, &repair))
}

pub async fn list(
    state: &AppState,
    asset_id: &str,
    query: Option<&str>,
) -> Result<Response<Full<Bytes>>> {
    let query: ListQuery = match query {
        Some(raw) => serde_urlencoded::from_str(raw)
            .map_err(|e| KeeperError::BadRequest(format!("Invalid query: {}", e)))?,
        None => ListQuery::default(),
    };
    state.registry.get(asset_id).await?;

    let repairs = if query.open {
        state.repairs.open_for_asset(asset_id).await?
    } else {
        state.repairs.for_asset(asset_id).await?
    };
    Ok(json_response(StatusCode::OK, &repairs))
}

pub async fn update_status(
    state: &AppState,
    headers: &HeaderMap,
    repair_id: &str,
    body: &Bytes,
) -> Result<Response<Full<Bytes>>> {
    let current = state.repairs.get(repair_id).await?;
    let actor = authorize(state, headers, Some(&current.asset_id), Operation::UpdateRepair)?;
    let request: StatusRequest = parse_json(body)?;

    let updated = state
        .repairs
        .update_status(repair_id, request.status, &actor)
        .await?;
    Ok(json_response(StatusCode::OK, &updated))
}
