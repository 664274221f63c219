//! Checklist endpoints

use bytes::Bytes;
use http_body_util::Full;
use hyper::{HeaderMap, Response, StatusCode};
use serde::{Deserialize, Serialize};

use super::{authorize, json_response, parse_json};
use crate::auth::Operation;
use crate::checklist::{
    ApprovalStatus, ChecklistCategory, ChecklistEdit, ChecklistSubmission, Completion,
};
use crate::server::AppState;
use crate::types::Result;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateRequest {
    categories: Vec<ChecklistCategory>,
    #[serde(default = "default_submit")]
    submit: bool,
}

fn default_submit() -> bool {
    true
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateResponse {
    submission_id: String,
    approval_status: ApprovalStatus,
    completion_rate: f64,
    total_items: usize,
    checked_items: usize,
}

/// Submission with its completion computed at read time
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionView {
    #[serde(flatten)]
    pub submission: ChecklistSubmission,
    pub completion: Completion,
}

impl From<ChecklistSubmission> for SubmissionView {
    fn from(submission: ChecklistSubmission) -> Self {
        Self {
            completion: submission.completion(),
            submission,
        }
    }
}

pub async fn create(
    state: &AppState,
    headers: &HeaderMap,
    asset_id: &str,
    body: &Bytes,
) -> Result<Response<Full<Bytes>>> {
    let actor = authorize(state, headers, Some(asset_id), Operation::CreateChecklist)?;
    let request: CreateRequest = parse_json(body)?;

    let submission = if request.submit {
        state
            .checklists
            .create_submitted(asset_id, request.categories, &actor)
            .await?
    } else {
        state
            .checklists
            .create(asset_id, request.categories, &actor)
            .await?
    };

    let completion = submission.completion();
    Ok(json_response(
        StatusCode::CREATED,
        &CreateResponse {
            submission_id: submission.submission_id,
            approval_status: submission.status,
            completion_rate: completion.completion_rate,
            total_items: completion.total_items,
            checked_items: completion.checked_items,
        },
    ))
}

pub async fn get(state: &AppState, submission_id: &str) -> Result<Response<Full<Bytes>>> {
    let submission = state.checklists.get(submission_id).await?;
    Ok(json_response(StatusCode::OK, &SubmissionView::from(submission)))
}

pub async fn edit(
    state: &AppState,
    headers: &HeaderMap,
    submission_id: &str,
    body: &Bytes,
) -> Result<Response<Full<Bytes>>> {
    let current = state.checklists.get(submission_id).await?;
    let actor = authorize(state, headers, Some(&current.asset_id), Operation::EditChecklist)?;
    let edit: ChecklistEdit = parse_json(body)?;

    let updated = state.checklists.edit(submission_id, &edit, &actor).await?;
    Ok(json_response(StatusCode::OK, &SubmissionView::from(updated)))
}

pub async fn submit(
    state: &AppState,
    headers: &HeaderMap,
    submission_id: &str,
) -> Result<Response<Full<Bytes>>> {
    let current = state.checklists.get(submission_id).await?;
    let actor = authorize(state, headers, Some(&current.asset_id), Operation::SubmitChecklist)?;

    let updated = state.checklists.submit(submission_id, &actor).await?;
    Ok(json_response(StatusCode::OK, &SubmissionView::from(updated)))
}

pub async fn approve(
    state: &AppState,
    headers: &HeaderMap,
    submission_id: &str,
) -> Result<Response<Full<Bytes>>> {
    let current = state.checklists.get(submission_id).await?;
    let approver = authorize(
        state,
        headers,
        Some(&current.asset_id),
        Operation::ApproveChecklist,
    )?;

    let updated = state.checklists.approve(submission_id, &approver).await?;
    Ok(json_response(StatusCode::OK, &SubmissionView::from(updated)))
}
