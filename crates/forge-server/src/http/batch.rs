//! Admin JSON API for batches and release apps. Handlers are
//! intentionally thin: decode, call one `forge-core` method, render the
//! envelope.

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use forge_core::domain::ApprovalStatus;
use forge_core::lifecycle::Event;
use forge_core::store::{BatchDraft, BatchFilter, BatchPatch};
use serde::Deserialize;
use uuid::Uuid;

use crate::envelope::Envelope;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateBatchRequest {
    pub batch_number: String,
    pub project_id: Uuid,
    pub initiator: String,
    pub release_notes: Option<String>,
    #[serde(default)]
    pub app_ids: Vec<Uuid>,
}

pub async fn create_batch(
    State(state): State<AppState>,
    Json(req): Json<CreateBatchRequest>,
) -> Envelope {
    let initiator = req.initiator.clone();
    let draft = BatchDraft {
        batch_number: req.batch_number,
        project_id: req.project_id,
        initiator: req.initiator,
        release_notes: req.release_notes,
        app_ids: req.app_ids,
    };
    crate::envelope::render(state.batch_service.create(draft, &initiator).await)
}

#[derive(Debug, Deserialize)]
pub struct UpdateBatchRequest {
    pub batch_id: Uuid,
    #[serde(default)]
    pub release_notes: Option<Option<String>>,
    #[serde(default)]
    pub add_app_ids: Vec<Uuid>,
    #[serde(default)]
    pub remove_app_ids: Vec<Uuid>,
}

pub async fn update_batch(
    State(state): State<AppState>,
    Json(req): Json<UpdateBatchRequest>,
) -> Envelope {
    let patch = BatchPatch {
        release_notes: req.release_notes,
        add_app_ids: req.add_app_ids,
        remove_app_ids: req.remove_app_ids,
    };
    crate::envelope::render(state.batch_service.update(req.batch_id, patch).await)
}

#[derive(Debug, Deserialize)]
pub struct DeleteBatchRequest {
    pub batch_id: Uuid,
}

pub async fn delete_batch(
    State(state): State<AppState>,
    Json(req): Json<DeleteBatchRequest>,
) -> Envelope {
    match state.batch_service.delete(req.batch_id).await {
        Ok(()) => Envelope::ok_empty(),
        Err(err) => Envelope::from_core_error(err),
    }
}

#[derive(Debug, Deserialize)]
pub struct BatchActionRequest {
    pub batch_id: Uuid,
    pub action: String,
    pub operator: String,
    pub reason: Option<String>,
}

pub async fn batch_action(
    State(state): State<AppState>,
    Json(req): Json<BatchActionRequest>,
) -> Envelope {
    let Some(event) = Event::parse(&req.action) else {
        return Envelope::from_core_error(forge_core::error::CoreError::BadRequest(format!(
            "unknown action: {}",
            req.action
        )));
    };

    if event == Event::Seal {
        return crate::envelope::render(state.batch_service.seal(req.batch_id).await);
    }

    crate::envelope::render(
        state
            .lifecycle
            .handle_action(req.batch_id, event, req.operator, req.reason, Utc::now())
            .await,
    )
}

#[derive(Debug, Deserialize)]
pub struct ApprovalRequest {
    pub batch_id: Uuid,
    pub operator: String,
    pub reason: Option<String>,
}

pub async fn approve_batch(
    State(state): State<AppState>,
    Json(req): Json<ApprovalRequest>,
) -> Envelope {
    crate::envelope::render(state.batch_service.approve(req.batch_id, req.operator).await)
}

pub async fn reject_batch(
    State(state): State<AppState>,
    Json(req): Json<ApprovalRequest>,
) -> Envelope {
    crate::envelope::render(
        state
            .batch_service
            .reject(req.batch_id, req.operator, req.reason)
            .await,
    )
}

#[derive(Debug, Deserialize)]
pub struct GetBatchQuery {
    pub id: Uuid,
}

pub async fn get_batch(State(state): State<AppState>, Query(q): Query<GetBatchQuery>) -> Envelope {
    let Some(batch) = state.batch_service.get(q.id).await else {
        return Envelope::from_core_error(forge_core::error::CoreError::NotFound(format!(
            "batch {}",
            q.id
        )));
    };
    let release_apps = state.batch_service.list_release_apps(q.id).await;
    Envelope::ok(serde_json::json!({ "batch": batch, "release_apps": release_apps }))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListBatchesQuery {
    #[serde(default)]
    pub status: Vec<i32>,
    pub initiator: Option<String>,
    pub approval_status: Option<String>,
    pub created_at_start: Option<DateTime<Utc>>,
    pub created_at_end: Option<DateTime<Utc>>,
    pub keyword: Option<String>,
}

pub async fn list_batches(
    State(state): State<AppState>,
    Query(q): Query<ListBatchesQuery>,
) -> Envelope {
    let status = q
        .status
        .iter()
        .filter_map(|code| status_from_code(*code))
        .collect();
    let approval_status = q.approval_status.as_deref().and_then(parse_approval_status);
    let filter = BatchFilter {
        status,
        initiator: q.initiator,
        approval_status,
        created_after: q.created_at_start,
        created_before: q.created_at_end,
        keyword: q.keyword,
    };
    let batches = state.batch_service.list(&filter).await;
    Envelope::ok(serde_json::json!({ "batches": batches }))
}

fn status_from_code(code: i32) -> Option<forge_core::domain::BatchStatus> {
    use forge_core::domain::BatchStatus::*;
    Some(match code {
        0 => Draft,
        10 => Sealed,
        20 => PreWaiting,
        21 => PreDeploying,
        22 => PreDeployed,
        24 => PreFailed,
        25 => PreAccepted,
        30 => ProdWaiting,
        31 => ProdDeploying,
        32 => ProdDeployed,
        34 => ProdFailed,
        35 => ProdAccepted,
        40 => Completed,
        90 => Cancelled,
        _ => return None,
    })
}

fn parse_approval_status(raw: &str) -> Option<ApprovalStatus> {
    Some(match raw {
        "pending" => ApprovalStatus::Pending,
        "approved" => ApprovalStatus::Approved,
        "rejected" => ApprovalStatus::Rejected,
        "skipped" => ApprovalStatus::Skipped,
        _ => return None,
    })
}

#[derive(Debug, Deserialize)]
pub struct UpdateReleaseAppBuildsRequest {
    pub batch_id: Uuid,
    pub selections: Vec<BuildSelection>,
}

#[derive(Debug, Deserialize)]
pub struct BuildSelection {
    pub app_id: Uuid,
    pub build_id: Uuid,
}

pub async fn update_release_app_builds(
    State(state): State<AppState>,
    Json(req): Json<UpdateReleaseAppBuildsRequest>,
) -> Envelope {
    let selections: Vec<(Uuid, Uuid)> = req
        .selections
        .into_iter()
        .map(|s| (s.app_id, s.build_id))
        .collect();
    crate::envelope::render(state.batch_service.update_builds(req.batch_id, &selections).await)
}

#[derive(Debug, Deserialize)]
pub struct TriggerDeployRequest {
    pub release_app_id: Uuid,
    pub new_build_id: Uuid,
    pub env: String,
}

pub async fn trigger_deploy(
    State(state): State<AppState>,
    Json(req): Json<TriggerDeployRequest>,
) -> Envelope {
    crate::envelope::render(
        state
            .planner
            .switch_version(req.release_app_id, req.new_build_id, &req.env)
            .await,
    )
}

#[derive(Debug, Deserialize)]
pub struct ManualDeployRequest {
    pub release_app_id: Uuid,
    pub env: String,
}

pub async fn manual_deploy(
    State(state): State<AppState>,
    Json(req): Json<ManualDeployRequest>,
) -> Envelope {
    crate::envelope::render(state.planner.manual_deploy(req.release_app_id, &req.env).await)
}

#[derive(Debug, Deserialize)]
pub struct UpdateTempDepsRequest {
    pub release_app_id: Uuid,
    /// Absent field leaves `tempDependsOn` unset; present-but-empty clears
    /// it to an explicit empty override (see `ReleaseApp::temp_depends_on`).
    #[serde(default)]
    pub temp_depends_on: Option<Vec<Uuid>>,
}

pub async fn update_temp_deps(
    State(state): State<AppState>,
    Json(req): Json<UpdateTempDepsRequest>,
) -> Envelope {
    crate::envelope::render(
        state
            .store
            .update_temp_deps(req.release_app_id, req.temp_depends_on)
            .await,
    )
}

pub async fn retry_deployment(
    State(state): State<AppState>,
    Path(deployment_id): Path<Uuid>,
) -> Envelope {
    crate::envelope::render(state.dispatcher.retry(deployment_id).await)
}
