//! In-memory `Store` implementation.
//!
//! Stands in for a real database adapter: the choice of database engine is
//! out of scope here. All state lives behind one `tokio::sync::RwLock`,
//! which gives every method below transactional atomicity with respect to
//! every other method - a stricter guarantee than strictly necessary (only
//! per-batch-row serialization is required), but the simplest correct
//! choice for a reference implementation at this scale. See DESIGN.md.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{
    ApprovalStatus, Application, Batch, BatchStatus, Build, Deployment, DeploymentStatus,
    Project, ReleaseApp, ReleaseAppStatus, Repository,
};
use crate::error::{AppConflictEntry, CoreError, ConflictError, PreconditionError, TransitionError};
use crate::resolver;

use super::{BatchDraft, BatchFilter, BatchPatch, DeploymentSpec, NormalizedBuild, Store};

#[derive(Default)]
struct StoreState {
    projects: HashMap<Uuid, Project>,
    repositories: HashMap<Uuid, Repository>,
    applications: HashMap<Uuid, Application>,
    batches: HashMap<Uuid, Batch>,
    batch_numbers: HashMap<String, Uuid>,
    release_apps: HashMap<Uuid, ReleaseApp>,
    builds: HashMap<Uuid, Build>,
    build_keys: HashMap<(Uuid, i64), Uuid>,
    deployments: HashMap<Uuid, Deployment>,
}

/// Reference `Store` implementation backed by a single in-process lock.
pub struct InMemoryStore {
    inner: RwLock<StoreState>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self {
            inner: RwLock::new(StoreState::default()),
        }
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn live_conflicts_locked(
    state: &StoreState,
    app_ids: &[Uuid],
    exclude_batch_id: Option<Uuid>,
) -> HashMap<Uuid, AppConflictEntry> {
    let mut conflicts = HashMap::new();
    for app_id in app_ids {
        for ra in state.release_apps.values() {
            if ra.app_id != *app_id {
                continue;
            }
            if Some(ra.batch_id) == exclude_batch_id {
                continue;
            }
            if let Some(batch) = state.batches.get(&ra.batch_id) {
                if batch.status.is_live() {
                    conflicts.insert(
                        *app_id,
                        AppConflictEntry {
                            app_id: *app_id,
                            batch_id: batch.id,
                            batch_number: batch.batch_number.clone(),
                            batch_status: batch.status.as_code(),
                        },
                    );
                    break;
                }
            }
        }
    }
    conflicts
}

fn stamp_for_status(batch: &mut Batch, status: BatchStatus, now: DateTime<Utc>) {
    use BatchStatus::*;
    match status {
        PreWaiting if batch.timestamps.pre_started_at.is_none() => {
            batch.timestamps.pre_started_at = Some(now)
        }
        PreAccepted if batch.timestamps.pre_finished_at.is_none() => {
            batch.timestamps.pre_finished_at = Some(now)
        }
        ProdWaiting if batch.timestamps.prod_started_at.is_none() => {
            batch.timestamps.prod_started_at = Some(now)
        }
        ProdAccepted if batch.timestamps.prod_finished_at.is_none() => {
            batch.timestamps.prod_finished_at = Some(now)
        }
        Completed if batch.timestamps.final_accepted_at.is_none() => {
            batch.timestamps.final_accepted_at = Some(now)
        }
        _ => {}
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn put_project(&self, project: Project) {
        self.inner.write().await.projects.insert(project.id, project);
    }

    async fn get_project(&self, id: Uuid) -> Option<Project> {
        self.inner.read().await.projects.get(&id).cloned()
    }

    async fn put_repository(&self, repo: Repository) {
        self.inner.write().await.repositories.insert(repo.id, repo);
    }

    async fn get_repository_by_namespace_name(&self, namespace: &str, name: &str) -> Option<Repository> {
        self.inner
            .read()
            .await
            .repositories
            .values()
            .find(|r| r.namespace == namespace && r.name == name)
            .cloned()
    }

    async fn put_application(&self, app: Application) {
        self.inner.write().await.applications.insert(app.id, app);
    }

    async fn get_application(&self, id: Uuid) -> Option<Application> {
        self.inner.read().await.applications.get(&id).cloned()
    }

    async fn get_application_by_repo_and_name(&self, repo_id: Uuid, name: &str) -> Option<Application> {
        self.inner
            .read()
            .await
            .applications
            .values()
            .find(|a| a.repo_id == repo_id && a.name == name)
            .cloned()
    }

    async fn set_deployed_tag(&self, app_id: Uuid, tag: String) {
        if let Some(app) = self.inner.write().await.applications.get_mut(&app_id) {
            app.deployed_tag = Some(tag);
        }
    }

    async fn create_batch(&self, draft: BatchDraft) -> Result<Batch, CoreError> {
        let mut state = self.inner.write().await;

        if state.batch_numbers.contains_key(&draft.batch_number) {
            return Err(ConflictError::DuplicateBatchNumber(draft.batch_number).into());
        }
        let conflicts = live_conflicts_locked(&state, &draft.app_ids, None);
        if !conflicts.is_empty() {
            return Err(ConflictError::AppConflict(conflicts.into_values().collect()).into());
        }

        let batch = Batch::new(draft.batch_number.clone(), draft.project_id, draft.initiator);
        let mut batch = batch;
        batch.release_notes = draft.release_notes;

        for app_id in &draft.app_ids {
            let ra = ReleaseApp::new(batch.id, *app_id);
            state.release_apps.insert(ra.id, ra);
        }
        state.batch_numbers.insert(batch.batch_number.clone(), batch.id);
        state.batches.insert(batch.id, batch.clone());
        Ok(batch)
    }

    async fn get_batch(&self, id: Uuid) -> Option<Batch> {
        self.inner.read().await.batches.get(&id).cloned()
    }

    async fn get_batch_by_number(&self, number: &str) -> Option<Batch> {
        let state = self.inner.read().await;
        state
            .batch_numbers
            .get(number)
            .and_then(|id| state.batches.get(id))
            .cloned()
    }

    async fn list_batches(&self, filter: &BatchFilter) -> Vec<Batch> {
        let state = self.inner.read().await;
        state
            .batches
            .values()
            .filter(|b| filter.status.is_empty() || filter.status.contains(&b.status))
            .filter(|b| {
                filter
                    .initiator
                    .as_ref()
                    .map(|i| &b.initiator == i)
                    .unwrap_or(true)
            })
            .filter(|b| {
                filter
                    .approval_status
                    .map(|a| b.approval_status == a)
                    .unwrap_or(true)
            })
            .filter(|b| {
                filter
                    .keyword
                    .as_ref()
                    .map(|k| {
                        b.batch_number.contains(k.as_str())
                            || b.release_notes.as_deref().unwrap_or("").contains(k.as_str())
                    })
                    .unwrap_or(true)
            })
            .cloned()
            .collect()
    }

    async fn update_batch_draft(&self, batch_id: Uuid, patch: BatchPatch) -> Result<Batch, CoreError> {
        let mut state = self.inner.write().await;
        let status = state
            .batches
            .get(&batch_id)
            .ok_or_else(|| CoreError::NotFound(format!("batch {batch_id}")))?
            .status;
        if status != BatchStatus::Draft {
            return Err(PreconditionError::NotDraft {
                batch_id,
                status: format!("{status:?}"),
            }
            .into());
        }

        if !patch.add_app_ids.is_empty() {
            let conflicts = live_conflicts_locked(&state, &patch.add_app_ids, Some(batch_id));
            if !conflicts.is_empty() {
                return Err(ConflictError::AppConflict(conflicts.into_values().collect()).into());
            }
        }

        for app_id in &patch.add_app_ids {
            let already = state
                .release_apps
                .values()
                .any(|ra| ra.batch_id == batch_id && ra.app_id == *app_id);
            if !already {
                let ra = ReleaseApp::new(batch_id, *app_id);
                state.release_apps.insert(ra.id, ra);
            }
        }
        if !patch.remove_app_ids.is_empty() {
            state
                .release_apps
                .retain(|_, ra| !(ra.batch_id == batch_id && patch.remove_app_ids.contains(&ra.app_id)));
        }

        let batch = state.batches.get_mut(&batch_id).expect("checked above");
        if let Some(notes) = patch.release_notes {
            batch.release_notes = notes;
        }
        Ok(batch.clone())
    }

    async fn delete_batch(&self, batch_id: Uuid) -> Result<(), CoreError> {
        let mut state = self.inner.write().await;
        let batch = state
            .batches
            .get(&batch_id)
            .ok_or_else(|| CoreError::NotFound(format!("batch {batch_id}")))?;
        if batch.status != BatchStatus::Draft {
            return Err(PreconditionError::NotDraft {
                batch_id,
                status: format!("{:?}", batch.status),
            }
            .into());
        }
        state.batch_numbers.remove(&batch.batch_number);
        state.batches.remove(&batch_id);
        state.release_apps.retain(|_, ra| ra.batch_id != batch_id);
        Ok(())
    }

    async fn find_live_conflicts(
        &self,
        app_ids: &[Uuid],
        exclude_batch_id: Option<Uuid>,
    ) -> HashMap<Uuid, AppConflictEntry> {
        let state = self.inner.read().await;
        live_conflicts_locked(&state, app_ids, exclude_batch_id)
    }

    async fn set_approval(
        &self,
        batch_id: Uuid,
        status: ApprovalStatus,
        actor: Option<String>,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Batch, CoreError> {
        let mut state = self.inner.write().await;
        let batch = state
            .batches
            .get_mut(&batch_id)
            .ok_or_else(|| CoreError::NotFound(format!("batch {batch_id}")))?;
        batch.approval_status = status;
        match status {
            ApprovalStatus::Approved => {
                batch.approved_by = actor;
                batch.timestamps.approved_at = Some(now);
                batch.reject_reason = None;
            }
            ApprovalStatus::Rejected => {
                batch.reject_reason = reason;
            }
            _ => {}
        }
        Ok(batch.clone())
    }

    async fn seal_batch(
        &self,
        batch_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(Batch, Vec<ReleaseApp>), CoreError> {
        let mut state = self.inner.write().await;

        let batch = state
            .batches
            .get(&batch_id)
            .ok_or_else(|| CoreError::NotFound(format!("batch {batch_id}")))?
            .clone();
        if batch.status != BatchStatus::Draft {
            return Err(TransitionError::IllegalTransition {
                state: format!("{:?}", batch.status),
                event: "seal".into(),
            }
            .into());
        }

        let mut release_apps: Vec<ReleaseApp> = state
            .release_apps
            .values()
            .filter(|ra| ra.batch_id == batch_id)
            .cloned()
            .collect();
        if release_apps.is_empty() {
            return Err(PreconditionError::EmptyBatch(batch_id).into());
        }

        for ra in &release_apps {
            let build_ok = ra
                .build_id
                .and_then(|bid| state.builds.get(&bid))
                .map(|b| b.build_status.is_success() && b.app_id == ra.app_id)
                .unwrap_or(false);
            if !build_ok {
                return Err(PreconditionError::MissingSuccessBuild {
                    release_app_id: ra.id,
                }
                .into());
            }
        }

        let project = state
            .projects
            .get(&batch.project_id)
            .ok_or_else(|| CoreError::NotFound(format!("project {}", batch.project_id)))?
            .clone();
        if project.require_approval_to_seal && batch.approval_status != ApprovalStatus::Approved {
            return Err(PreconditionError::ApprovalRequired(batch_id).into());
        }

        let apps_in_batch: Vec<Uuid> = release_apps.iter().map(|ra| ra.app_id).collect();
        let in_batch_set: std::collections::HashSet<Uuid> = apps_in_batch.iter().copied().collect();
        let by_app: HashMap<Uuid, &ReleaseApp> =
            release_apps.iter().map(|ra| (ra.app_id, ra)).collect();
        let apps: HashMap<Uuid, Application> = apps_in_batch
            .iter()
            .filter_map(|id| state.applications.get(id).cloned().map(|a| (*id, a)))
            .collect();

        resolver::validate_graph(&apps_in_batch, |app_id| {
            let default_deps = apps
                .get(&app_id)
                .map(|a| a.default_depends_on.clone())
                .unwrap_or_default();
            let raw = by_app
                .get(&app_id)
                .map(|ra| ra.raw_deps(&default_deps))
                .unwrap_or_default();
            resolver::effective_deps(&raw, &in_batch_set)
        })?;

        let app_ids: Vec<Uuid> = apps_in_batch.clone();
        let conflicts = live_conflicts_locked(&state, &app_ids, Some(batch_id));
        if !conflicts.is_empty() {
            return Err(ConflictError::AppConflict(conflicts.into_values().collect()).into());
        }

        for ra in release_apps.iter_mut() {
            let deployed_tag = apps.get(&ra.app_id).and_then(|a| a.deployed_tag.clone());
            ra.previous_deployed_tag = deployed_tag;
            ra.is_locked = true;
            state.release_apps.insert(ra.id, ra.clone());
        }

        let batch = {
            let batch = state.batches.get_mut(&batch_id).expect("checked above");
            batch.status = BatchStatus::Sealed;
            batch.timestamps.sealed_at = Some(now);
            batch.clone()
        };

        Ok((batch, release_apps))
    }

    async fn cancel_batch(
        &self,
        batch_id: Uuid,
        cancelled_by: String,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Batch, CoreError> {
        let mut state = self.inner.write().await;
        let batch = state
            .batches
            .get_mut(&batch_id)
            .ok_or_else(|| CoreError::NotFound(format!("batch {batch_id}")))?;
        if batch.status >= BatchStatus::Completed {
            return Err(TransitionError::IllegalTransition {
                state: format!("{:?}", batch.status),
                event: "cancel".into(),
            }
            .into());
        }
        batch.status = BatchStatus::Cancelled;
        batch.cancelled_by = Some(cancelled_by);
        batch.cancel_reason = reason;
        batch.timestamps.cancelled_at = Some(now);
        Ok(batch.clone())
    }

    async fn set_batch_status(
        &self,
        batch_id: Uuid,
        status: BatchStatus,
        now: DateTime<Utc>,
    ) -> Result<Batch, CoreError> {
        let mut state = self.inner.write().await;
        let batch = state
            .batches
            .get_mut(&batch_id)
            .ok_or_else(|| CoreError::NotFound(format!("batch {batch_id}")))?;
        batch.status = status;
        stamp_for_status(batch, status, now);
        Ok(batch.clone())
    }

    async fn list_release_apps(&self, batch_id: Uuid) -> Vec<ReleaseApp> {
        self.inner
            .read()
            .await
            .release_apps
            .values()
            .filter(|ra| ra.batch_id == batch_id)
            .cloned()
            .collect()
    }

    async fn get_release_app(&self, id: Uuid) -> Option<ReleaseApp> {
        self.inner.read().await.release_apps.get(&id).cloned()
    }

    async fn get_live_release_app_for_app(&self, app_id: Uuid) -> Option<(Batch, ReleaseApp)> {
        let state = self.inner.read().await;
        state
            .release_apps
            .values()
            .filter(|ra| ra.app_id == app_id)
            .find_map(|ra| {
                state
                    .batches
                    .get(&ra.batch_id)
                    .filter(|b| b.status.is_live())
                    .map(|b| (b.clone(), ra.clone()))
            })
    }

    async fn put_release_app(&self, release_app: ReleaseApp) {
        self.inner
            .write()
            .await
            .release_apps
            .insert(release_app.id, release_app);
    }

    async fn set_release_app_build(
        &self,
        batch_id: Uuid,
        app_id: Uuid,
        build_id: Uuid,
    ) -> Result<ReleaseApp, CoreError> {
        let mut state = self.inner.write().await;
        let status = state
            .batches
            .get(&batch_id)
            .ok_or_else(|| CoreError::NotFound(format!("batch {batch_id}")))?
            .status;
        if status != BatchStatus::Draft {
            return Err(PreconditionError::NotDraft {
                batch_id,
                status: format!("{status:?}"),
            }
            .into());
        }
        let build = state
            .builds
            .get(&build_id)
            .ok_or_else(|| CoreError::NotFound(format!("build {build_id}")))?
            .clone();
        if !build.build_status.is_success() || build.app_id != app_id {
            return Err(PreconditionError::MissingSuccessBuild {
                release_app_id: app_id,
            }
            .into());
        }
        let ra = state
            .release_apps
            .values_mut()
            .find(|ra| ra.batch_id == batch_id && ra.app_id == app_id)
            .ok_or_else(|| CoreError::NotFound(format!("release app for app {app_id}")))?;
        ra.build_id = Some(build_id);
        ra.latest_build_id = Some(build_id);
        ra.target_tag = Some(build.image_tag.clone());
        if ra.status == ReleaseAppStatus::Pending {
            ra.status = ReleaseAppStatus::Tagged;
        }
        Ok(ra.clone())
    }

    async fn update_temp_deps(
        &self,
        release_app_id: Uuid,
        new_temp_deps: Option<Vec<Uuid>>,
    ) -> Result<ReleaseApp, CoreError> {
        let mut state = self.inner.write().await;
        let ra = state
            .release_apps
            .get(&release_app_id)
            .ok_or_else(|| CoreError::NotFound(format!("release app {release_app_id}")))?
            .clone();
        if ra.is_locked {
            return Err(PreconditionError::Locked(release_app_id).into());
        }
        let batch_status = state
            .batches
            .get(&ra.batch_id)
            .map(|b| b.status)
            .unwrap_or(BatchStatus::Draft);
        if batch_status >= BatchStatus::Sealed {
            return Err(PreconditionError::Locked(release_app_id).into());
        }

        let apps_in_batch: std::collections::BTreeSet<Uuid> = state
            .release_apps
            .values()
            .filter(|r| r.batch_id == ra.batch_id)
            .map(|r| r.app_id)
            .collect();

        let normalized = match &new_temp_deps {
            None => None,
            Some(deps) => Some(resolver::validate_temp_deps(ra.app_id, deps, &apps_in_batch)?),
        };

        // Re-validate acyclicity of the whole batch with this override applied.
        let mut by_app: HashMap<Uuid, ReleaseApp> = state
            .release_apps
            .values()
            .filter(|r| r.batch_id == ra.batch_id)
            .map(|r| (r.app_id, r.clone()))
            .collect();
        if let Some(entry) = by_app.get_mut(&ra.app_id) {
            entry.temp_depends_on = normalized.clone();
        }
        let apps_vec: Vec<Uuid> = apps_in_batch.iter().copied().collect();
        let apps_ref: HashMap<Uuid, Application> = apps_vec
            .iter()
            .filter_map(|id| state.applications.get(id).cloned().map(|a| (*id, a)))
            .collect();
        resolver::validate_graph(&apps_vec, |app_id| {
            let default_deps = apps_ref
                .get(&app_id)
                .map(|a| a.default_depends_on.clone())
                .unwrap_or_default();
            let raw = by_app
                .get(&app_id)
                .map(|r| r.raw_deps(&default_deps))
                .unwrap_or_default();
            resolver::effective_deps(&raw, &apps_in_batch.iter().copied().collect())
        })?;

        let ra_mut = state
            .release_apps
            .get_mut(&release_app_id)
            .expect("checked above");
        ra_mut.temp_depends_on = normalized;
        Ok(ra_mut.clone())
    }

    async fn upsert_build(&self, build: NormalizedBuild) -> Result<(Build, bool), CoreError> {
        let mut state = self.inner.write().await;
        let key = (build.app_id, build.build_number);
        if let Some(existing_id) = state.build_keys.get(&key).copied() {
            let existing = state.builds.get(&existing_id).expect("key index is consistent").clone();
            let unchanged = existing.build_status == build.build_status
                && existing.image_tag == build.image_tag
                && existing.commit_sha == build.commit_sha;
            if unchanged {
                return Ok((existing, false));
            }
            // Every build status is terminal, so a build is immutable once written;
            // a re-delivery for the same (app_id, build_number) with different
            // content is a conflicting retelling of history, not an update.
            return Err(ConflictError::BuildRedelivery {
                app_id: build.app_id,
                build_number: build.build_number,
            }
            .into());
        }

        let new_build = Build {
            id: Uuid::new_v4(),
            repo_id: build.repo_id,
            app_id: build.app_id,
            build_number: build.build_number,
            build_status: build.build_status,
            build_event: build.build_event,
            commit_sha: build.commit_sha,
            commit_ref: build.commit_ref,
            commit_branch: build.commit_branch,
            commit_author: build.commit_author,
            image_tag: build.image_tag,
            image_url: build.image_url,
            build_created: build.build_created,
            build_started: build.build_started,
            build_finished: build.build_finished,
        };
        state.build_keys.insert(key, new_build.id);
        state.builds.insert(new_build.id, new_build.clone());
        Ok((new_build, true))
    }

    async fn get_build(&self, id: Uuid) -> Option<Build> {
        self.inner.read().await.builds.get(&id).cloned()
    }

    async fn list_recent_builds(&self, app_id: Uuid, limit: usize) -> Vec<Build> {
        let state = self.inner.read().await;
        let mut builds: Vec<Build> = state
            .builds
            .values()
            .filter(|b| b.app_id == app_id)
            .cloned()
            .collect();
        builds.sort_by(|a, b| b.build_created.cmp(&a.build_created));
        builds.truncate(limit);
        builds
    }

    async fn list_recent_builds_since(
        &self,
        app_id: Uuid,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Vec<Build> {
        let state = self.inner.read().await;
        let mut builds: Vec<Build> = state
            .builds
            .values()
            .filter(|b| b.app_id == app_id && b.build_created >= since)
            .cloned()
            .collect();
        builds.sort_by(|a, b| b.build_created.cmp(&a.build_created));
        builds.truncate(limit);
        builds
    }

    async fn get_latest_success_builds_after_deployment(
        &self,
        app_ids: &[Uuid],
    ) -> HashMap<Uuid, Build> {
        let state = self.inner.read().await;
        let mut out = HashMap::new();
        for app_id in app_ids {
            let deployed_tag = state.applications.get(app_id).and_then(|a| a.deployed_tag.clone());
            let anchor_build_number = deployed_tag.and_then(|tag| {
                state
                    .builds
                    .values()
                    .filter(|b| b.app_id == *app_id && b.image_tag == tag)
                    .map(|b| b.build_number)
                    .max()
            });
            let newest = state
                .builds
                .values()
                .filter(|b| b.app_id == *app_id && b.build_status.is_success())
                .filter(|b| anchor_build_number.map(|n| b.build_number > n).unwrap_or(true))
                .max_by_key(|b| b.build_number)
                .cloned();
            if let Some(build) = newest {
                out.insert(*app_id, build);
            }
        }
        out
    }

    async fn create_deployments(&self, specs: Vec<DeploymentSpec>) -> Result<Vec<Deployment>, CoreError> {
        let mut state = self.inner.write().await;
        let mut created = Vec::with_capacity(specs.len());
        for spec in specs {
            let clash = state.deployments.values().any(|d| {
                !d.is_superseded()
                    && d.release_id == spec.release_id
                    && d.env == spec.env
                    && d.cluster_name == spec.cluster_name
            });
            if clash {
                return Err(CoreError::BadRequest(format!(
                    "deployment already exists for release {} env {} cluster {}",
                    spec.release_id, spec.env, spec.cluster_name
                )));
            }
            let project = state
                .batches
                .get(&spec.batch_id)
                .and_then(|b| state.projects.get(&b.project_id))
                .cloned();
            let phase = project
                .as_ref()
                .and_then(|p| p.phase_for_env(&spec.env))
                .unwrap_or(crate::domain::Phase::Pre);
            let deployment = Deployment {
                id: Uuid::new_v4(),
                batch_id: spec.batch_id,
                release_id: spec.release_id,
                app_id: spec.app_id,
                phase,
                env: spec.env,
                cluster_name: spec.cluster_name,
                namespace: spec.namespace,
                deployment_name: spec.deployment_name,
                driver_type: spec.driver_type,
                status: DeploymentStatus::Pending,
                retry_count: 0,
                max_retry_count: spec.max_retry_count,
                error_message: None,
                superseded_by: None,
                started_at: None,
                finished_at: None,
                replicas: spec.replicas,
                image_tag: spec.image_tag,
                attempts: Vec::new(),
            };
            state.deployments.insert(deployment.id, deployment.clone());
            created.push(deployment);
        }
        Ok(created)
    }

    async fn get_deployment(&self, id: Uuid) -> Option<Deployment> {
        self.inner.read().await.deployments.get(&id).cloned()
    }

    async fn update_deployment(&self, deployment: Deployment) -> Result<(), CoreError> {
        let mut state = self.inner.write().await;
        state.deployments.insert(deployment.id, deployment);
        Ok(())
    }

    async fn supersede(&self, old_id: Uuid, new_id: Uuid) -> Result<(), CoreError> {
        let mut state = self.inner.write().await;
        let old = state
            .deployments
            .get_mut(&old_id)
            .ok_or_else(|| CoreError::NotFound(format!("deployment {old_id}")))?;
        old.superseded_by = Some(new_id);
        Ok(())
    }

    async fn list_deployments_for_release(&self, release_id: Uuid) -> Vec<Deployment> {
        self.inner
            .read()
            .await
            .deployments
            .values()
            .filter(|d| d.release_id == release_id)
            .cloned()
            .collect()
    }

    async fn list_deployments_for_batch(&self, batch_id: Uuid) -> Vec<Deployment> {
        self.inner
            .read()
            .await
            .deployments
            .values()
            .filter(|d| d.batch_id == batch_id)
            .cloned()
            .collect()
    }

    async fn claim_ready_deployments(&self, limit: usize) -> Vec<Deployment> {
        let mut state = self.inner.write().await;
        let now = Utc::now();

        let candidate_ids: Vec<Uuid> = {
            let mut candidates: Vec<Uuid> = Vec::new();
            for d in state.deployments.values() {
                if d.status != DeploymentStatus::Pending || d.is_superseded() {
                    continue;
                }
                let Some(batch) = state.batches.get(&d.batch_id) else { continue };
                if !batch.status.is_live() {
                    continue;
                }
                let Some(ra) = state.release_apps.get(&d.release_id) else { continue };
                if !resolver::is_dispatchable(ra.status, d.phase) {
                    continue;
                }
                candidates.push(d.id);
            }
            candidates.sort();
            candidates.truncate(limit);
            candidates
        };

        let mut claimed = Vec::with_capacity(candidate_ids.len());
        for id in candidate_ids {
            let Some(d) = state.deployments.get_mut(&id) else { continue };
            if d.status != DeploymentStatus::Pending {
                continue;
            }
            d.status = DeploymentStatus::Running;
            d.started_at = Some(now);
            let (release_id, phase) = (d.release_id, d.phase);
            claimed.push(d.clone());

            // First claim for this release app in this phase moves it from
            // "can trigger" to "triggered" so the aggregator's rollup (which
            // only fires from *Triggered) can later land on *Deployed/*Failed.
            if let Some(ra) = state.release_apps.get_mut(&release_id) {
                let triggered = match phase {
                    crate::domain::Phase::Pre if ra.status == ReleaseAppStatus::PreCanTrigger => {
                        Some(ReleaseAppStatus::PreTriggered)
                    }
                    crate::domain::Phase::Prod if ra.status == ReleaseAppStatus::ProdCanTrigger => {
                        Some(ReleaseAppStatus::ProdTriggered)
                    }
                    _ => None,
                };
                if let Some(next) = triggered {
                    ra.status = next;
                }
            }
        }
        claimed
    }

    async fn retry_deployment(&self, id: Uuid) -> Result<Deployment, CoreError> {
        let mut state = self.inner.write().await;
        let d = state
            .deployments
            .get_mut(&id)
            .ok_or_else(|| CoreError::NotFound(format!("deployment {id}")))?;
        if d.status != DeploymentStatus::Failed || d.is_superseded() {
            return Err(PreconditionError::NotRetryable(id).into());
        }
        d.status = DeploymentStatus::Pending;
        d.retry_count += 1;
        d.error_message = None;
        d.started_at = None;
        d.finished_at = None;
        Ok(d.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BuildEvent, BuildStatus, Project};

    fn project(id: Uuid) -> Project {
        Project {
            id,
            name: "acme".into(),
            allowed_env_clusters: Default::default(),
            default_env_clusters: Default::default(),
            require_approval_to_seal: false,
            lifecycle_envs: ["pre".into(), "prod".into()],
        }
    }

    fn success_build(app_id: Uuid, number: i64, tag: &str) -> NormalizedBuild {
        NormalizedBuild {
            repo_id: Uuid::new_v4(),
            app_id,
            build_number: number,
            build_status: BuildStatus::Success,
            build_event: BuildEvent::Tag,
            commit_sha: "abc".into(),
            commit_ref: "refs/tags/v1".into(),
            commit_branch: "main".into(),
            commit_author: "bob".into(),
            image_tag: tag.into(),
            image_url: None,
            build_created: Utc::now(),
            build_started: Utc::now(),
            build_finished: Utc::now(),
        }
    }

    // An app already live in one batch cannot be added to another.
    #[tokio::test]
    async fn create_batch_rejects_app_already_in_a_live_batch() {
        let store = InMemoryStore::new();
        let project_id = Uuid::new_v4();
        store.put_project(project(project_id)).await;
        let app_id = Uuid::new_v4();

        let first = store
            .create_batch(BatchDraft {
                batch_number: "BN-001".into(),
                project_id,
                initiator: "alice".into(),
                release_notes: None,
                app_ids: vec![app_id],
            })
            .await
            .expect("first batch creation succeeds");
        assert_eq!(first.status, BatchStatus::Draft);

        let second = store
            .create_batch(BatchDraft {
                batch_number: "BN-002".into(),
                project_id,
                initiator: "alice".into(),
                release_notes: None,
                app_ids: vec![app_id],
            })
            .await;

        match second {
            Err(CoreError::Conflict(ConflictError::AppConflict(entries))) => {
                assert_eq!(entries.len(), 1);
                assert_eq!(entries[0].app_id, app_id);
                assert_eq!(entries[0].batch_number, "BN-001");
            }
            other => panic!("expected AppConflict, got {other:?}"),
        }
    }

    // Once the first batch is cancelled (no longer live), the app is free.
    #[tokio::test]
    async fn create_batch_allows_app_once_prior_batch_is_no_longer_live() {
        let store = InMemoryStore::new();
        let project_id = Uuid::new_v4();
        store.put_project(project(project_id)).await;
        let app_id = Uuid::new_v4();

        let first = store
            .create_batch(BatchDraft {
                batch_number: "BN-001".into(),
                project_id,
                initiator: "alice".into(),
                release_notes: None,
                app_ids: vec![app_id],
            })
            .await
            .unwrap();
        store
            .cancel_batch(first.id, "alice".into(), None, Utc::now())
            .await
            .unwrap();

        let second = store
            .create_batch(BatchDraft {
                batch_number: "BN-002".into(),
                project_id,
                initiator: "alice".into(),
                release_notes: None,
                app_ids: vec![app_id],
            })
            .await;
        assert!(second.is_ok());
    }

    // Sealing requires every release app to carry a successful build.
    #[tokio::test]
    async fn seal_batch_rejects_missing_success_build() {
        let store = InMemoryStore::new();
        let project_id = Uuid::new_v4();
        store.put_project(project(project_id)).await;
        let app_id = Uuid::new_v4();
        let batch = store
            .create_batch(BatchDraft {
                batch_number: "BN-001".into(),
                project_id,
                initiator: "alice".into(),
                release_notes: None,
                app_ids: vec![app_id],
            })
            .await
            .unwrap();

        let result = store.seal_batch(batch.id, Utc::now()).await;
        assert!(matches!(
            result,
            Err(CoreError::Precondition(PreconditionError::MissingSuccessBuild { .. }))
        ));
    }

    // Once every release app has a success build, sealing locks them and
    // snapshots previousDeployedTag.
    #[tokio::test]
    async fn seal_batch_locks_release_apps_on_success() {
        let store = InMemoryStore::new();
        let project_id = Uuid::new_v4();
        store.put_project(project(project_id)).await;
        let app_id = Uuid::new_v4();
        store
            .put_application(Application {
                id: app_id,
                name: "widgets".into(),
                project_id,
                repo_id: Uuid::new_v4(),
                app_type: "service".into(),
                team_id: None,
                deployed_tag: Some("v0".into()),
                default_depends_on: vec![],
                env_configs: vec![],
            })
            .await;
        let batch = store
            .create_batch(BatchDraft {
                batch_number: "BN-001".into(),
                project_id,
                initiator: "alice".into(),
                release_notes: None,
                app_ids: vec![app_id],
            })
            .await
            .unwrap();

        let (build, inserted) = store.upsert_build(success_build(app_id, 1, "v1")).await.unwrap();
        assert!(inserted);
        store
            .set_release_app_build(batch.id, app_id, build.id)
            .await
            .unwrap();

        let (sealed, release_apps) = store.seal_batch(batch.id, Utc::now()).await.unwrap();
        assert_eq!(sealed.status, BatchStatus::Sealed);
        assert_eq!(release_apps.len(), 1);
        assert!(release_apps[0].is_locked);
        assert_eq!(release_apps[0].previous_deployed_tag.as_deref(), Some("v0"));

        // Sealing twice is rejected - not a Draft anymore.
        let reseal = store.seal_batch(batch.id, Utc::now()).await;
        assert!(matches!(
            reseal,
            Err(CoreError::Transition(TransitionError::IllegalTransition { .. }))
        ));
    }

    // Supersede marks the old deployment without deleting it.
    #[tokio::test]
    async fn supersede_marks_old_deployment_superseded() {
        let store = InMemoryStore::new();
        let project_id = Uuid::new_v4();
        store.put_project(project(project_id)).await;
        let batch = store
            .create_batch(BatchDraft {
                batch_number: "BN-001".into(),
                project_id,
                initiator: "alice".into(),
                release_notes: None,
                app_ids: vec![],
            })
            .await
            .unwrap();
        let release_id = Uuid::new_v4();
        let old = store
            .create_deployments(vec![DeploymentSpec {
                batch_id: batch.id,
                release_id,
                app_id: Uuid::new_v4(),
                env: "pre".into(),
                cluster_name: "c-pre".into(),
                namespace: "ns".into(),
                deployment_name: "widgets".into(),
                driver_type: "simulated".into(),
                max_retry_count: 3,
                replicas: 1,
                image_tag: "v1".into(),
            }])
            .await
            .unwrap()
            .remove(0);

        let new_id = Uuid::new_v4();
        store.supersede(old.id, new_id).await.unwrap();
        let refreshed = store.get_deployment(old.id).await.unwrap();
        assert!(refreshed.is_superseded());
        assert_eq!(refreshed.superseded_by, Some(new_id));
    }

    // A second deployment for the same release/env/cluster clashes
    // unless the first has been superseded.
    #[tokio::test]
    async fn create_deployments_rejects_clash_with_live_deployment() {
        let store = InMemoryStore::new();
        let project_id = Uuid::new_v4();
        store.put_project(project(project_id)).await;
        let batch = store
            .create_batch(BatchDraft {
                batch_number: "BN-001".into(),
                project_id,
                initiator: "alice".into(),
                release_notes: None,
                app_ids: vec![],
            })
            .await
            .unwrap();
        let release_id = Uuid::new_v4();
        let spec = DeploymentSpec {
            batch_id: batch.id,
            release_id,
            app_id: Uuid::new_v4(),
            env: "pre".into(),
            cluster_name: "c-pre".into(),
            namespace: "ns".into(),
            deployment_name: "widgets".into(),
            driver_type: "simulated".into(),
            max_retry_count: 3,
            replicas: 1,
            image_tag: "v1".into(),
        };
        store.create_deployments(vec![spec.clone()]).await.unwrap();
        let clash = store.create_deployments(vec![spec]).await;
        assert!(clash.is_err());
    }

    // Re-ingesting the same (app, build_number) with identical content
    // is a no-op; reporting only the first write as "inserted".
    #[tokio::test]
    async fn upsert_build_is_idempotent_for_identical_resubmission() {
        let store = InMemoryStore::new();
        let app_id = Uuid::new_v4();
        let (first, inserted_first) = store.upsert_build(success_build(app_id, 5, "v5")).await.unwrap();
        assert!(inserted_first);

        let (second, inserted_second) = store.upsert_build(success_build(app_id, 5, "v5")).await.unwrap();
        assert!(!inserted_second);
        assert_eq!(first.id, second.id);
    }

    // A build is terminal and immutable once written; resubmitting the same
    // build number with different content is a rejected re-delivery, not an
    // in-place update.
    #[tokio::test]
    async fn upsert_build_rejects_redelivery_with_changed_content() {
        let store = InMemoryStore::new();
        let app_id = Uuid::new_v4();
        let (first, _) = store.upsert_build(success_build(app_id, 5, "v5")).await.unwrap();

        let mut changed = success_build(app_id, 5, "v5-patched");
        changed.commit_sha = "def".into();
        let err = store.upsert_build(changed).await.unwrap_err();
        assert!(matches!(
            err,
            CoreError::Conflict(ConflictError::BuildRedelivery { .. })
        ));

        // The original row is untouched.
        let unchanged = store.get_build(first.id).await.unwrap();
        assert_eq!(unchanged.image_tag, "v5");
    }

    // The claim-time fix: claiming a deployment also advances its release
    // app from *CanTrigger to *Triggered so the rollup can later fire.
    #[tokio::test]
    async fn claim_ready_deployments_advances_release_app_to_triggered() {
        let store = InMemoryStore::new();
        let project_id = Uuid::new_v4();
        store.put_project(project(project_id)).await;
        let batch = store
            .create_batch(BatchDraft {
                batch_number: "BN-001".into(),
                project_id,
                initiator: "alice".into(),
                release_notes: None,
                app_ids: vec![],
            })
            .await
            .unwrap();

        let mut ra = ReleaseApp::new(batch.id, Uuid::new_v4());
        ra.status = ReleaseAppStatus::PreCanTrigger;
        store.put_release_app(ra.clone()).await;

        store
            .create_deployments(vec![DeploymentSpec {
                batch_id: batch.id,
                release_id: ra.id,
                app_id: ra.app_id,
                env: "pre".into(),
                cluster_name: "c-pre".into(),
                namespace: "ns".into(),
                deployment_name: "widgets".into(),
                driver_type: "simulated".into(),
                max_retry_count: 3,
                replicas: 1,
                image_tag: "v1".into(),
            }])
            .await
            .unwrap();

        let claimed = store.claim_ready_deployments(10).await;
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].status, DeploymentStatus::Running);

        let updated_ra = store.get_release_app(ra.id).await.unwrap();
        assert_eq!(updated_ra.status, ReleaseAppStatus::PreTriggered);
    }
}
