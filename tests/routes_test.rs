//! HTTP route integration tests
//!
//! Requests are dispatched through `routes::route` without a socket:
//! - Asset session scoping on write endpoints
//! - Staff roles for manager-only operations
//! - Approved checklists rejecting further edits

use bytes::Bytes;
use clap::Parser;
use http_body_util::BodyExt;
use hyper::header::{HeaderValue, AUTHORIZATION};
use hyper::{HeaderMap, Method, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;

use moldkeeper::auth::{Role, TokenInput};
use moldkeeper::config::Args;
use moldkeeper::routes;
use moldkeeper::session::SESSION_HEADER;
use moldkeeper::AppState;

struct Harness {
    state: Arc<AppState>,
}

impl Harness {
    fn new() -> Self {
        Self::with_flags(&[])
    }

    fn with_flags(flags: &[&str]) -> Self {
        let mut argv = vec!["moldkeeper", "--dev-mode"];
        argv.extend_from_slice(flags);
        let args = Args::parse_from(argv);
        Self {
            state: Arc::new(AppState::new(args).unwrap()),
        }
    }

    fn staff(&self, role: Role) -> HeaderMap {
        let token = self
            .state
            .admin_jwt
            .generate_token(TokenInput {
                subject: format!("{}-1", role),
                role,
            })
            .unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );
        headers
    }

    async fn session(&self, asset_id: &str) -> HeaderMap {
        let (status, body) = self
            .call(Method::POST, "/session", HeaderMap::new(), json!({ "assetId": asset_id }))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let mut headers = HeaderMap::new();
        headers.insert(
            SESSION_HEADER,
            HeaderValue::from_str(body["token"].as_str().unwrap()).unwrap(),
        );
        headers
    }

    async fn call(
        &self,
        method: Method,
        path: &str,
        headers: HeaderMap,
        body: Value,
    ) -> (StatusCode, Value) {
        let body = if body.is_null() {
            Bytes::new()
        } else {
            Bytes::from(body.to_string())
        };
        let (path, query) = match path.split_once('?') {
            Some((p, q)) => (p, Some(q)),
            None => (path, None),
        };

        let response =
            routes::route(Arc::clone(&self.state), &method, path, query, &headers, body).await;
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn register(&self, asset_id: &str, part_number: &str) {
        let (status, _) = self
            .call(
                Method::POST,
                "/asset",
                self.staff(Role::Manager),
                json!({ "assetId": asset_id, "partNumber": part_number }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }
}

fn checklist_body(submit: bool) -> Value {
    json!({
        "submit": submit,
        "categories": [{
            "id": "cleaning",
            "title": "Cleaning",
            "items": [
                {
                    "id": "vents",
                    "label": "Vent cleaning",
                    "checked": true,
                    "field": { "fieldType": "free-text", "value": "clear" }
                },
                {
                    "id": "finish",
                    "label": "Surface finish",
                    "field": {
                        "fieldType": "single-select",
                        "options": ["good", "scratched"]
                    }
                }
            ]
        }]
    })
}

#[tokio::test]
async fn test_health_reports_memory_storage() {
    let h = Harness::new();
    let (status, body) = h.call(Method::GET, "/health", HeaderMap::new(), Value::Null).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["healthy"], true);
    assert_eq!(body["storage"], "memory");

    let (status, _) = h.call(Method::GET, "/ready", HeaderMap::new(), Value::Null).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_session_write_records_shots_for_its_asset() {
    let h = Harness::new();
    h.register("M-2024-001", "PN-1").await;
    let session = h.session("M-2024-001").await;

    let (status, body) = h
        .call(
            Method::POST,
            "/asset/M-2024-001/shot",
            session,
            json!({ "delta": 60000 }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["seq"], 1);
    assert_eq!(body["totalAfter"], 60000);

    let (status, body) = h
        .call(Method::GET, "/asset/M-2024-001/shots?limit=10", HeaderMap::new(), Value::Null)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_session_for_one_asset_cannot_write_another() {
    let h = Harness::new();
    h.register("M-A", "PN-A").await;
    h.register("M-B", "PN-B").await;
    let session_a = h.session("M-A").await;

    let (status, body) = h
        .call(Method::POST, "/asset/M-B/shot", session_a, json!({ "delta": 10 }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "SCOPE_MISMATCH");

    let (_, body) = h.call(Method::GET, "/asset/M-B", HeaderMap::new(), Value::Null).await;
    assert_eq!(body["currentTotal"], 0);
}

#[tokio::test]
async fn test_non_integer_shot_delta_is_invalid_delta() {
    let h = Harness::new();
    h.register("M-A", "PN-A").await;
    let session = h.session("M-A").await;

    for delta in [json!("abc"), json!(1.5), json!(-3)] {
        let (status, body) = h
            .call(
                Method::POST,
                "/asset/M-A/shot",
                session.clone(),
                json!({ "delta": delta }),
            )
            .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "delta {}", delta);
        assert_eq!(body["code"], "INVALID_DELTA");
        assert_eq!(body["field"], "delta");
    }

    let (status, body) = h
        .call(Method::POST, "/asset/M-A/shot", session, json!({ "runState": "running" }))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "INVALID_DELTA");

    let (_, body) = h.call(Method::GET, "/asset/M-A", HeaderMap::new(), Value::Null).await;
    assert_eq!(body["currentTotal"], 0);
}

#[tokio::test]
async fn test_session_issuance_can_require_operator_credential() {
    let h = Harness::with_flags(&["--session-requires-credential"]);
    h.register("M-A", "PN-A").await;

    let (status, body) = h
        .call(Method::POST, "/session", HeaderMap::new(), json!({ "assetId": "M-A" }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");

    let (status, body) = h
        .call(
            Method::POST,
            "/session",
            h.staff(Role::Operator),
            json!({ "assetId": "M-A" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["assetId"], "M-A");
}

#[tokio::test]
async fn test_repair_listing_filters_open_reports() {
    let h = Harness::new();
    h.register("M-R", "PN-R").await;
    let session = h.session("M-R").await;

    let mut ids = Vec::new();
    for title in ["Worn gate", "Cracked slide"] {
        let (status, body) = h
            .call(
                Method::POST,
                "/asset/M-R/repair",
                session.clone(),
                json!({ "title": title, "priority": "urgent" }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        ids.push(body["repairId"].as_str().unwrap().to_string());
    }

    let (status, _) = h
        .call(
            Method::POST,
            &format!("/repair/{}/status", ids[0]),
            session,
            json!({ "status": "completed" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, all) = h.call(Method::GET, "/asset/M-R/repairs", HeaderMap::new(), Value::Null).await;
    assert_eq!(all.as_array().unwrap().len(), 2);

    let (_, open) = h
        .call(Method::GET, "/asset/M-R/repairs?open=true", HeaderMap::new(), Value::Null)
        .await;
    let open = open.as_array().unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0]["repairId"], ids[1].as_str());
}

#[tokio::test]
async fn test_write_without_credentials_is_unauthorized() {
    let h = Harness::new();
    h.register("M-A", "PN-A").await;

    let (status, body) = h
        .call(Method::POST, "/asset/M-A/shot", HeaderMap::new(), json!({ "delta": 10 }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_session_for_unknown_asset_is_not_found() {
    let h = Harness::new();
    let (status, body) = h
        .call(Method::POST, "/session", HeaderMap::new(), json!({ "assetId": "M-NOPE" }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_duplicate_part_number_is_rejected() {
    let h = Harness::new();
    h.register("M-A", "PN-SAME").await;

    let (status, body) = h
        .call(
            Method::POST,
            "/asset",
            h.staff(Role::Manager),
            json!({ "assetId": "M-B", "partNumber": "PN-SAME" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "DUPLICATE_IDENTITY");
}

#[tokio::test]
async fn test_operator_cannot_register_assets() {
    let h = Harness::new();
    let (status, body) = h
        .call(
            Method::POST,
            "/asset",
            h.staff(Role::Operator),
            json!({ "partNumber": "PN-X" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");
}

#[tokio::test]
async fn test_checklist_approval_locks_submission() {
    let h = Harness::new();
    h.register("M-CHK", "PN-CHK").await;
    let session = h.session("M-CHK").await;

    let (status, body) = h
        .call(
            Method::POST,
            "/asset/M-CHK/checklist",
            session.clone(),
            checklist_body(true),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["approvalStatus"], "pending");
    assert_eq!(body["totalItems"], 2);
    assert_eq!(body["checkedItems"], 1);
    let submission_id = body["submissionId"].as_str().unwrap().to_string();

    // A session token is never enough to approve
    let (status, _) = h
        .call(
            Method::POST,
            &format!("/checklist/{}/approve", submission_id),
            session.clone(),
            Value::Null,
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = h
        .call(
            Method::POST,
            &format!("/checklist/{}/approve", submission_id),
            h.staff(Role::Manager),
            Value::Null,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "approved");
    assert_eq!(body["approvedBy"], "manager-1");

    let (status, body) = h
        .call(
            Method::POST,
            &format!("/checklist/{}/edit", submission_id),
            session,
            json!({
                "op": "select",
                "categoryId": "cleaning",
                "itemId": "finish",
                "option": "good"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "IMMUTABLE");

    let (_, body) = h.call(Method::GET, "/asset/M-CHK", HeaderMap::new(), Value::Null).await;
    assert_eq!(body["latestChecklist"]["approvalStatus"], "approved");
}

#[tokio::test]
async fn test_edit_with_unknown_option_names_the_field() {
    let h = Harness::new();
    h.register("M-EDIT", "PN-EDIT").await;
    let session = h.session("M-EDIT").await;

    let (_, body) = h
        .call(
            Method::POST,
            "/asset/M-EDIT/checklist",
            session.clone(),
            checklist_body(false),
        )
        .await;
    let submission_id = body["submissionId"].as_str().unwrap().to_string();

    let (status, body) = h
        .call(
            Method::POST,
            &format!("/checklist/{}/edit", submission_id),
            session,
            json!({
                "op": "select",
                "categoryId": "cleaning",
                "itemId": "finish",
                "option": "melted"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "INVALID_FIELD");
    assert_eq!(body["field"], "option");
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let h = Harness::new();
    let (status, _) = h.call(Method::GET, "/molds", HeaderMap::new(), Value::Null).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
