//! BatchService - CRUD and seal/cancel of batches; thin orchestration
//! over `Store` plus the planner it triggers on seal.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::domain::{ApprovalStatus, Batch, ReleaseApp};
use crate::error::CoreError;
use crate::planner::DeploymentPlanner;
use crate::store::{BatchDraft, BatchFilter, BatchPatch, Store};

/// Caller-supplied access predicate.
pub trait AccessControl: Send + Sync {
    fn can_access(&self, user: &str, project_id: Uuid) -> bool;
}

/// Permits everyone; `forge-server` wires a real predicate in front of this
/// service when authorization is configured.
pub struct AllowAll;
impl AccessControl for AllowAll {
    fn can_access(&self, _user: &str, _project_id: Uuid) -> bool {
        true
    }
}

pub struct BatchService {
    store: Arc<dyn Store>,
    planner: Arc<DeploymentPlanner>,
    access: Arc<dyn AccessControl>,
}

impl BatchService {
    pub fn new(store: Arc<dyn Store>, planner: Arc<DeploymentPlanner>, access: Arc<dyn AccessControl>) -> Self {
        Self { store, planner, access }
    }

    pub async fn create(&self, draft: BatchDraft, actor: &str) -> Result<Batch, CoreError> {
        if !self.access.can_access(actor, draft.project_id) {
            return Err(CoreError::BadRequest(format!("{actor} cannot access this project")));
        }
        self.store.create_batch(draft).await
    }

    pub async fn update(&self, batch_id: Uuid, patch: BatchPatch) -> Result<Batch, CoreError> {
        self.store.update_batch_draft(batch_id, patch).await
    }

    /// `updateBuilds(batchId, map appId→buildId)`: only in Draft, each
    /// `buildId` must be a success build matching the app.
    pub async fn update_builds(
        &self,
        batch_id: Uuid,
        selections: &[(Uuid, Uuid)],
    ) -> Result<Vec<ReleaseApp>, CoreError> {
        let mut updated = Vec::with_capacity(selections.len());
        for (app_id, build_id) in selections {
            updated.push(
                self.store
                    .set_release_app_build(batch_id, *app_id, *build_id)
                    .await?,
            );
        }
        Ok(updated)
    }

    pub async fn delete(&self, batch_id: Uuid) -> Result<(), CoreError> {
        self.store.delete_batch(batch_id).await
    }

    /// Seal: delegates precondition enforcement to the Store transaction,
    /// then immediately plans deployments for the newly sealed batch
    ///.
    pub async fn seal(&self, batch_id: Uuid) -> Result<Batch, CoreError> {
        let now = Utc::now();
        let (batch, release_apps) = self.store.seal_batch(batch_id, now).await?;
        self.planner.plan_for_sealed_batch(&release_apps).await?;
        Ok(batch)
    }

    pub async fn approve(&self, batch_id: Uuid, actor: String) -> Result<Batch, CoreError> {
        self.store
            .set_approval(batch_id, ApprovalStatus::Approved, Some(actor), None, Utc::now())
            .await
    }

    pub async fn reject(&self, batch_id: Uuid, actor: String, reason: Option<String>) -> Result<Batch, CoreError> {
        self.store
            .set_approval(batch_id, ApprovalStatus::Rejected, Some(actor), reason, Utc::now())
            .await
    }

    pub async fn cancel(&self, batch_id: Uuid, actor: String, reason: Option<String>) -> Result<Batch, CoreError> {
        self.store.cancel_batch(batch_id, actor, reason, Utc::now()).await
    }

    pub async fn get(&self, batch_id: Uuid) -> Option<Batch> {
        self.store.get_batch(batch_id).await
    }

    pub async fn get_by_number(&self, number: &str) -> Option<Batch> {
        self.store.get_batch_by_number(number).await
    }

    pub async fn list(&self, filter: &BatchFilter) -> Vec<Batch> {
        self.store.list_batches(filter).await
    }

    pub async fn list_release_apps(&self, batch_id: Uuid) -> Vec<ReleaseApp> {
        self.store.list_release_apps(batch_id).await
    }
}
