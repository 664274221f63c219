//! Asset session issuance
//!
//! The caller proves physical presence by scanning the mold's code. By
//! default the service only checks that the asset exists before handing out
//! a token scoped to it, which makes the session a scoping aid rather than
//! an access control. With `--session-requires-credential` the caller must
//! also present an operator (or higher) staff credential.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{HeaderMap, Response, StatusCode};
use serde::Deserialize;
use tracing::info;

use super::{authorize, json_response, parse_json};
use crate::auth::Operation;
use crate::server::AppState;
use crate::types::Result;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionRequest {
    asset_id: String,
}

pub async fn issue(
    state: &AppState,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<Response<Full<Bytes>>> {
    if state.args.session_requires_credential {
        authorize(state, headers, None, Operation::IssueSession)?;
    }
    let request: SessionRequest = parse_json(body)?;
    let asset = state.registry.get(request.asset_id.trim()).await?;
    let token = state.sessions.issue(&asset.asset_id)?;

    info!(asset_id = %asset.asset_id, expires_at = %token.expires_at, "Session issued");
    Ok(json_response(StatusCode::CREATED, &token))
}
