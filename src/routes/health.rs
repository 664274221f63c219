//! Health check endpoints
//!
//! - /health - liveness: 200 while the process is serving
//! - /ready - readiness: 200 only when the store answers a ping

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;

use super::json_response;
use crate::server::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub healthy: bool,
    /// `online` or `degraded`
    pub status: &'static str,
    pub version: &'static str,
    /// Seconds since startup
    pub uptime: u64,
    pub storage: &'static str,
    pub mode: &'static str,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn build_health_response(state: &AppState, storage_error: Option<String>) -> HealthResponse {
    HealthResponse {
        healthy: storage_error.is_none(),
        status: if storage_error.is_none() {
            "online"
        } else {
            "degraded"
        },
        version: env!("CARGO_PKG_VERSION"),
        uptime: state.started_at.elapsed().as_secs(),
        storage: state.store.backend(),
        mode: if state.args.dev_mode {
            "development"
        } else {
            "production"
        },
        timestamp: chrono::Utc::now().to_rfc3339(),
        error: storage_error,
    }
}

pub fn health_check(state: &AppState) -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, &build_health_response(state, None))
}

pub async fn readiness_check(state: &AppState) -> Response<Full<Bytes>> {
    let storage_error = state.store.ping().await.err().map(|e| e.to_string());
    let status = if storage_error.is_none() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    json_response(status, &build_health_response(state, storage_error))
}
