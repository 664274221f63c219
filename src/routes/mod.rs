//! HTTP routes for Moldkeeper
//!
//! [`route`] takes an already-collected request so handlers can be driven
//! directly in tests without a socket.

pub mod assets;
pub mod checklist;
pub mod health;
pub mod repairs;
pub mod session;

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::AUTHORIZATION;
use hyper::{HeaderMap, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::auth::{extract_token_from_header, is_operation_allowed, Operation};
use crate::server::AppState;
use crate::session::SESSION_HEADER;
use crate::types::{KeeperError, Result};

pub use health::{health_check, readiness_check};

/// Dispatch one request
pub async fn route(
    state: Arc<AppState>,
    method: &Method,
    path: &str,
    query: Option<&str>,
    headers: &HeaderMap,
    body: Bytes,
) -> Response<Full<Bytes>> {
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();

    let result = match (method, segments.as_slice()) {
        (&Method::GET, ["health"]) => Ok(health_check(&state)),
        (&Method::GET, ["ready"]) => Ok(readiness_check(&state).await),

        (&Method::POST, ["session"]) => session::issue(&state, headers, &body).await,

        (&Method::POST, ["asset"]) => assets::register(&state, headers, &body).await,
        (&Method::GET, ["assets"]) => assets::list(&state).await,
        (&Method::GET, ["asset", id]) => assets::get(&state, id).await,
        (&Method::PATCH, ["asset", id]) => assets::update(&state, headers, id, &body).await,
        (&Method::DELETE, ["asset", id]) => assets::delete(&state, headers, id).await,
        (&Method::POST, ["asset", id, "shot"]) => {
            assets::record_shots(&state, headers, id, &body).await
        }
        (&Method::GET, ["asset", id, "shots"]) => assets::shot_history(&state, id, query).await,
        (&Method::GET, ["asset", id, "schedule"]) => assets::schedule(&state, id).await,
        (&Method::GET, ["asset", id, "notifications"]) => {
            assets::notifications(&state, id).await
        }

        (&Method::POST, ["asset", id, "checklist"]) => {
            checklist::create(&state, headers, id, &body).await
        }
        (&Method::GET, ["checklist", id]) => checklist::get(&state, id).await,
        (&Method::POST, ["checklist", id, "edit"]) => {
            checklist::edit(&state, headers, id, &body).await
        }
        (&Method::POST, ["checklist", id, "submit"]) => {
            checklist::submit(&state, headers, id).await
        }
        (&Method::POST, ["checklist", id, "approve"]) => {
            checklist::approve(&state, headers, id).await
        }

        (&Method::POST, ["asset", id, "repair"]) => {
            repairs::report(&state, headers, id, &body).await
        }
        (&Method::GET, ["asset", id, "repairs"]) => repairs::list(&state, id, query).await,
        (&Method::POST, ["repair", id, "status"]) => {
            repairs::update_status(&state, headers, id, &body).await
        }

        (&Method::OPTIONS, _) => Ok(preflight_response()),

        _ => Err(KeeperError::NotFound(format!("route {} {}", method, path))),
    };

    match result {
        Ok(response) => response,
        Err(err) => {
            if err.status_code().is_server_error() {
                warn!(path = %path, error = %err, "Request failed");
            } else {
                debug!(path = %path, code = err.code(), "Request rejected");
            }
            error_response(&err)
        }
    }
}

/// Resolve who is writing and check they may.
///
/// A session token, when present, must be valid and scoped to `asset_id`;
/// its failures are reported as-is. Operations that need more than the
/// operator role ignore session tokens and require a staff credential.
pub fn authorize(
    state: &AppState,
    headers: &HeaderMap,
    asset_id: Option<&str>,
    operation: Operation,
) -> Result<String> {
    let session_token = headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|t| !t.is_empty());

    if let (Some(token), Some(asset_id)) = (session_token, asset_id) {
        if operation.session_allowed() {
            state.sessions.authorize_write(token, asset_id)?;
            return Ok(format!("session:{}", asset_id));
        }
    }

    let bearer = extract_token_from_header(
        headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()),
    );
    let Some(token) = bearer else {
        return Err(KeeperError::Unauthorized(format!(
            "{} requires a session token or staff credential",
            operation
        )));
    };

    let claims = state.admin_jwt.verify_token(token).into_claims()?;
    if !is_operation_allowed(operation, claims.role) {
        return Err(KeeperError::Forbidden(format!(
            "{} needs a higher role than {}",
            operation, claims.role
        )));
    }
    Ok(claims.sub)
}

/// Decode a JSON request body
pub fn parse_json<T: DeserializeOwned>(body: &Bytes) -> Result<T> {
    if body.is_empty() {
        return Err(KeeperError::BadRequest("Request body is required".into()));
    }
    serde_json::from_slice(body)
        .map_err(|e| KeeperError::BadRequest(format!("Invalid request body: {}", e)))
}

/// JSON response with the given status
pub fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<Full<Bytes>> {
    match serde_json::to_vec(value) {
        Ok(body) => Response::builder()
            .status(status)
            .header("Content-Type", "application/json")
            .header("Access-Control-Allow-Origin", "*")
            .body(Full::new(Bytes::from(body)))
            .unwrap(),
        Err(e) => error_response(&KeeperError::Internal(format!(
            "Failed to encode response: {}",
            e
        ))),
    }
}

/// `{ error, code, field?, details? }` body for a failure
pub fn error_response(err: &KeeperError) -> Response<Full<Bytes>> {
    let mut body = serde_json::json!({
        "error": err.to_string(),
        "code": err.code(),
    });
    if let Some(field) = err.field() {
        body["field"] = serde_json::Value::String(field.to_string());
    }
    if let Some(details) = err.details() {
        body["details"] = details;
    }

    Response::builder()
        .status(err.status_code())
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}

pub fn timeout_response() -> Response<Full<Bytes>> {
    let body = serde_json::json!({
        "error": "Request timed out",
        "code": "TIMEOUT",
    });

    Response::builder()
        .status(StatusCode::GATEWAY_TIMEOUT)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}

/// CORS preflight response
fn preflight_response() -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::OK)
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Headers", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, PATCH, DELETE, OPTIONS")
        .body(Full::new(Bytes::new()))
        .unwrap()
}
