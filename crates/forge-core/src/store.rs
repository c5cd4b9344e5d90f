//! Store - the transactional persistence boundary.
//!
//! `Store` is the only thing in this crate allowed to own mutable state.
//! Every method here represents one transaction: all multi-row writes it
//! makes are atomic with respect to other calls. The in-memory
//! implementation (`memory::InMemoryStore`) stands in for a real database -
//! the database engine itself is out of scope here - but the trait
//! boundary is where a `sqlx`/Postgres adapter would plug in without
//! touching any service.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    ApprovalStatus, Application, Batch, BatchStatus, Build, BuildEvent, BuildStatus, Deployment,
    Project, ReleaseApp, Repository,
};
use crate::error::{AppConflictEntry, CoreError};

/// Input to `Store::create_batch`.
#[derive(Debug, Clone)]
pub struct BatchDraft {
    pub batch_number: String,
    pub project_id: Uuid,
    pub initiator: String,
    pub release_notes: Option<String>,
    pub app_ids: Vec<Uuid>,
}

/// Input to `Store::update_batch_draft`. `None` leaves a field unchanged;
/// `Some(None)` on `release_notes` clears it.
#[derive(Debug, Clone, Default)]
pub struct BatchPatch {
    pub release_notes: Option<Option<String>>,
    pub add_app_ids: Vec<Uuid>,
    pub remove_app_ids: Vec<Uuid>,
}

/// Filters for `GET /batches`.
#[derive(Debug, Clone, Default)]
pub struct BatchFilter {
    pub status: Vec<BatchStatus>,
    pub initiator: Option<String>,
    pub approval_status: Option<ApprovalStatus>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub keyword: Option<String>,
}

/// A CI-reported build, normalized by the `BuildIngestor` before it reaches
/// the Store.
#[derive(Debug, Clone)]
pub struct NormalizedBuild {
    pub repo_id: Uuid,
    pub app_id: Uuid,
    pub build_number: i64,
    pub build_status: BuildStatus,
    pub build_event: BuildEvent,
    pub commit_sha: String,
    pub commit_ref: String,
    pub commit_branch: String,
    pub commit_author: String,
    pub image_tag: String,
    pub image_url: Option<String>,
    pub build_created: DateTime<Utc>,
    pub build_started: DateTime<Utc>,
    pub build_finished: DateTime<Utc>,
}

/// Spec for a deployment row the `DeploymentPlanner` wants created.
#[derive(Debug, Clone)]
pub struct DeploymentSpec {
    pub batch_id: Uuid,
    pub release_id: Uuid,
    pub app_id: Uuid,
    pub env: String,
    pub cluster_name: String,
    pub namespace: String,
    pub deployment_name: String,
    pub driver_type: String,
    pub max_retry_count: u32,
    pub replicas: u32,
    pub image_tag: String,
}

#[async_trait]
pub trait Store: Send + Sync {
    // ---- Reference data (owned by external CRUD in the real system; the
    // in-memory store holds it directly since that CRUD layer is a Non-goal
    // here) ----
    async fn put_project(&self, project: Project);
    async fn get_project(&self, id: Uuid) -> Option<Project>;
    async fn put_repository(&self, repo: Repository);
    async fn get_repository_by_namespace_name(&self, namespace: &str, name: &str) -> Option<Repository>;
    async fn put_application(&self, app: Application);
    async fn get_application(&self, id: Uuid) -> Option<Application>;
    async fn get_application_by_repo_and_name(&self, repo_id: Uuid, name: &str) -> Option<Application>;
    async fn set_deployed_tag(&self, app_id: Uuid, tag: String);

    // ---- Batch ----
    async fn create_batch(&self, draft: BatchDraft) -> Result<Batch, CoreError>;
    async fn get_batch(&self, id: Uuid) -> Option<Batch>;
    async fn get_batch_by_number(&self, number: &str) -> Option<Batch>;
    async fn list_batches(&self, filter: &BatchFilter) -> Vec<Batch>;
    async fn update_batch_draft(&self, batch_id: Uuid, patch: BatchPatch) -> Result<Batch, CoreError>;
    async fn delete_batch(&self, batch_id: Uuid) -> Result<(), CoreError>;
    async fn find_live_conflicts(
        &self,
        app_ids: &[Uuid],
        exclude_batch_id: Option<Uuid>,
    ) -> HashMap<Uuid, AppConflictEntry>;
    async fn set_approval(
        &self,
        batch_id: Uuid,
        status: ApprovalStatus,
        actor: Option<String>,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Batch, CoreError>;
    /// Atomically checks all seal preconditions and, if they
    /// hold, transitions the batch to `Sealed`, snapshots
    /// `previousDeployedTag`, and locks every release app. Returns the
    /// sealed batch and its (now locked) release apps.
    async fn seal_batch(&self, batch_id: Uuid, now: DateTime<Utc>) -> Result<(Batch, Vec<ReleaseApp>), CoreError>;
    async fn cancel_batch(
        &self,
        batch_id: Uuid,
        cancelled_by: String,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Batch, CoreError>;
    async fn set_batch_status(
        &self,
        batch_id: Uuid,
        status: BatchStatus,
        now: DateTime<Utc>,
    ) -> Result<Batch, CoreError>;

    // ---- ReleaseApp ----
    async fn list_release_apps(&self, batch_id: Uuid) -> Vec<ReleaseApp>;
    async fn get_release_app(&self, id: Uuid) -> Option<ReleaseApp>;
    async fn get_live_release_app_for_app(&self, app_id: Uuid) -> Option<(Batch, ReleaseApp)>;
    async fn put_release_app(&self, release_app: ReleaseApp);
    async fn set_release_app_build(
        &self,
        batch_id: Uuid,
        app_id: Uuid,
        build_id: Uuid,
    ) -> Result<ReleaseApp, CoreError>;
    async fn update_temp_deps(
        &self,
        release_app_id: Uuid,
        new_temp_deps: Option<Vec<Uuid>>,
    ) -> Result<ReleaseApp, CoreError>;

    // ---- Build ----
    async fn upsert_build(&self, build: NormalizedBuild) -> Result<(Build, bool), CoreError>;
    async fn get_build(&self, id: Uuid) -> Option<Build>;
    async fn list_recent_builds(&self, app_id: Uuid, limit: usize) -> Vec<Build>;
    async fn list_recent_builds_since(
        &self,
        app_id: Uuid,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Vec<Build>;
    async fn get_latest_success_builds_after_deployment(
        &self,
        app_ids: &[Uuid],
    ) -> HashMap<Uuid, Build>;

    // ---- Deployment ----
    async fn create_deployments(&self, specs: Vec<DeploymentSpec>) -> Result<Vec<Deployment>, CoreError>;
    async fn get_deployment(&self, id: Uuid) -> Option<Deployment>;
    async fn update_deployment(&self, deployment: Deployment) -> Result<(), CoreError>;
    async fn supersede(&self, old_id: Uuid, new_id: Uuid) -> Result<(), CoreError>;
    async fn list_deployments_for_release(&self, release_id: Uuid) -> Vec<Deployment>;
    async fn list_deployments_for_batch(&self, batch_id: Uuid) -> Vec<Deployment>;
    /// Claims up to `limit` ready deployments: `pending`, batch not
    /// cancelled, release app dispatchable, dependencies satisfied. Flips
    /// them to `running` atomically (CAS on `status=pending`) before
    /// returning them.
    async fn claim_ready_deployments(&self, limit: usize) -> Vec<Deployment>;
    async fn retry_deployment(&self, id: Uuid) -> Result<Deployment, CoreError>;
}

pub mod memory;
