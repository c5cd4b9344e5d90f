//! LifecycleEngine - the batch & release-app state machine.
//!
//! `transition` is a table-driven pure function:
//! `(BatchStatus, Event) -> Result<BatchStatus, TransitionError>`. Side
//! effects (touching ReleaseApp rows, emitting pending deployments) are
//! handled by `LifecycleEngine`'s methods, which call `transition` for the
//! legality check and then orchestrate the Store writes - keeping the pure
//! transition table separate from the service that drives it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::aggregator;
use crate::domain::{Batch, BatchStatus, Build, Phase, ReleaseAppStatus};
use crate::error::{CoreError, TransitionError};
use crate::resolver;
use crate::store::Store;

/// Operator- or system-issued lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Seal,
    StartPreDeploy,
    FinishPreDeploy,
    StartProdDeploy,
    FinishProdDeploy,
    Complete,
    Cancel,
}

impl Event {
    pub fn as_str(self) -> &'static str {
        match self {
            Event::Seal => "seal",
            Event::StartPreDeploy => "start_pre_deploy",
            Event::FinishPreDeploy => "finish_pre_deploy",
            Event::StartProdDeploy => "start_prod_deploy",
            Event::FinishProdDeploy => "finish_prod_deploy",
            Event::Complete => "complete",
            Event::Cancel => "cancel",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "seal" => Event::Seal,
            "start_pre_deploy" => Event::StartPreDeploy,
            "finish_pre_deploy" => Event::FinishPreDeploy,
            "start_prod_deploy" => Event::StartProdDeploy,
            "finish_prod_deploy" => Event::FinishProdDeploy,
            "complete" => Event::Complete,
            "cancel" => Event::Cancel,
            _ => return None,
        })
    }
}

/// Table-driven transition check.
/// `Cancel` is legal from any state `< Completed`; everything else follows
/// the fixed happy-path order.
pub fn transition(state: BatchStatus, event: Event) -> Result<BatchStatus, TransitionError> {
    use BatchStatus::*;
    use Event::*;

    if event == Cancel {
        return if state < Completed {
            Ok(Cancelled)
        } else {
            Err(illegal(state, event))
        };
    }

    let next = match (state, event) {
        (Draft, Seal) => Sealed,
        (Sealed, StartPreDeploy) => PreWaiting,
        // PreWaiting -> PreDeploying happens implicitly once the first
        // deployment is claimed; exposed here so callers that want to mark
        // it explicitly (e.g. a retry-from-failed path) can.
        (PreWaiting, StartPreDeploy) => PreDeploying,
        (PreDeploying, FinishPreDeploy) => PreAccepted,
        (PreDeployed, FinishPreDeploy) => PreAccepted,
        (PreFailed, StartPreDeploy) => PreDeploying,
        (PreAccepted, StartProdDeploy) => ProdWaiting,
        (ProdWaiting, StartProdDeploy) => ProdDeploying,
        (ProdDeploying, FinishProdDeploy) => ProdAccepted,
        (ProdDeployed, FinishProdDeploy) => ProdAccepted,
        (ProdFailed, StartProdDeploy) => ProdDeploying,
        (ProdAccepted, Complete) => Completed,
        _ => return Err(illegal(state, event)),
    };
    Ok(next)
}

fn illegal(state: BatchStatus, event: Event) -> TransitionError {
    TransitionError::IllegalTransition {
        state: format!("{state:?}"),
        event: event.as_str().to_string(),
    }
}

/// Advance a just-new-or-revisited build into any live release app for
/// `app_id`. Shared by `BuildIngestor` and
/// anything else that learns about a build out of band.
pub async fn on_new_build(store: &dyn Store, app_id: Uuid, build: &Build) -> Result<(), CoreError> {
    let Some((batch, mut release_app)) = store.get_live_release_app_for_app(app_id).await else {
        return Ok(());
    };

    release_app.latest_build_id = Some(build.id);
    if batch.status == BatchStatus::Draft && build.build_status.is_success() {
        release_app.build_id = Some(build.id);
        release_app.target_tag = Some(build.image_tag.clone());
        if release_app.status == ReleaseAppStatus::Pending {
            release_app.status = ReleaseAppStatus::Tagged;
        }
        release_app.push_reason(format!("build #{} advanced target tag", build.build_number));
    } else {
        release_app.push_reason(format!(
            "build #{} observed (latest_build_id only)",
            build.build_number
        ));
    }
    store.put_release_app(release_app).await;
    Ok(())
}

/// Orchestrates batch/release-app transitions on top of the pure
/// `transition` table. Holds only a `Store` handle; every other dependency
/// is passed explicitly into the methods that need it.
pub struct LifecycleEngine {
    store: Arc<dyn Store>,
}

impl LifecycleEngine {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Handles an operator-issued action (`POST /batch/action`). `Seal` is
    /// delegated to `Store::seal_batch`, which owns the full precondition
    /// chain; every other event first checks legality here,
    /// then fans the side effect out to release apps.
    pub async fn handle_action(
        &self,
        batch_id: Uuid,
        event: Event,
        operator: String,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Batch, CoreError> {
        if event == Event::Seal {
            let (batch, _apps) = self.store.seal_batch(batch_id, now).await?;
            return Ok(batch);
        }

        let batch = self
            .store
            .get_batch(batch_id)
            .await
            .ok_or_else(|| CoreError::NotFound(format!("batch {batch_id}")))?;

        if event == Event::Cancel {
            let release_apps = self.store.list_release_apps(batch_id).await;
            for mut ra in release_apps {
                ra.push_reason(format!("batch cancelled by {operator}"));
                self.store.put_release_app(ra).await;
            }
            return self.store.cancel_batch(batch_id, operator, reason, now).await;
        }

        let next = transition(batch.status, event)?;

        match event {
            Event::StartPreDeploy => self.start_phase(batch_id, Phase::Pre).await?,
            Event::StartProdDeploy => self.start_phase(batch_id, Phase::Prod).await?,
            Event::Complete => self.complete_release_apps(batch_id).await?,
            _ => {}
        }

        self.store.set_batch_status(batch_id, next, now).await
    }

    /// On `complete`, each release app's live tag becomes whatever it was
    /// last deployed to, so later batches snapshot the right
    /// `previous_deployed_tag` and the anchor-build lookup sees the current
    /// version.
    async fn complete_release_apps(&self, batch_id: Uuid) -> Result<(), CoreError> {
        let release_apps = self.store.list_release_apps(batch_id).await;
        for ra in release_apps {
            if let Some(tag) = ra.target_tag.clone() {
                self.store.set_deployed_tag(ra.app_id, tag).await;
            }
        }
        Ok(())
    }

    /// `start_pre_deploy`/`start_prod_deploy`: release apps whose in-batch
    /// dependencies are already empty become immediately dispatchable
    /// (`*CanTrigger`); the rest wait.
    async fn start_phase(&self, batch_id: Uuid, phase: Phase) -> Result<(), CoreError> {
        let release_apps = self.store.list_release_apps(batch_id).await;
        let in_batch: std::collections::HashSet<Uuid> =
            release_apps.iter().map(|ra| ra.app_id).collect();

        let mut apps_by_id = std::collections::HashMap::new();
        for ra in &release_apps {
            if let Some(app) = self.store.get_application(ra.app_id).await {
                apps_by_id.insert(ra.app_id, app);
            }
        }

        for mut ra in release_apps {
            let default_deps = apps_by_id
                .get(&ra.app_id)
                .map(|a| a.default_depends_on.clone())
                .unwrap_or_default();
            let raw = ra.raw_deps(&default_deps);
            let deps = resolver::effective_deps(&raw, &in_batch);

            let (waiting, can_trigger) = match phase {
                Phase::Pre => (ReleaseAppStatus::PreWaiting, ReleaseAppStatus::PreCanTrigger),
                Phase::Prod => (ReleaseAppStatus::ProdWaiting, ReleaseAppStatus::ProdCanTrigger),
            };

            ra.status = if deps.is_empty() { can_trigger } else { waiting };
            self.store.put_release_app(ra).await;
        }
        Ok(())
    }

    /// `onDeploymentOutcome`: recompute the owning release app's status from
    /// its non-superseded deployments in the just-finished phase, and
    /// auto-advance the batch if every release app reached the same rollup
    ///. Also unblocks dependents whose deps just became
    /// satisfied.
    pub async fn on_deployment_outcome(&self, deployment_id: Uuid) -> Result<(), CoreError> {
        let deployment = self
            .store
            .get_deployment(deployment_id)
            .await
            .ok_or_else(|| CoreError::NotFound(format!("deployment {deployment_id}")))?;
        if deployment.is_superseded() {
            return Ok(());
        }

        let mut release_app = self
            .store
            .get_release_app(deployment.release_id)
            .await
            .ok_or_else(|| CoreError::NotFound(format!("release app {}", deployment.release_id)))?;

        let siblings: Vec<_> = self
            .store
            .list_deployments_for_release(deployment.release_id)
            .await
            .into_iter()
            .filter(|d| !d.is_superseded() && d.phase == deployment.phase)
            .map(|d| d.status)
            .collect();

        let rollup = aggregator::rollup_env(&siblings);
        if let Some(next) =
            aggregator::next_release_app_status(release_app.status, deployment.phase, rollup)
        {
            release_app.status = next;
            release_app.push_reason(format!("{:?} rollup -> {:?}", deployment.phase, next));
            self.store.put_release_app(release_app.clone()).await;
        }

        self.maybe_unblock_dependents(deployment.batch_id, deployment.app_id, deployment.phase)
            .await?;
        self.maybe_advance_batch(deployment.batch_id, deployment.phase).await
    }

    /// A release app reaching `*Deployed` may unblock dependents whose
    /// `effectiveDeps` now all resolve to `Deployed` in this phase.
    async fn maybe_unblock_dependents(
        &self,
        batch_id: Uuid,
        deployed_app_id: Uuid,
        phase: Phase,
    ) -> Result<(), CoreError> {
        let release_apps = self.store.list_release_apps(batch_id).await;
        let in_batch: std::collections::HashSet<Uuid> =
            release_apps.iter().map(|ra| ra.app_id).collect();
        let outcomes: std::collections::HashMap<Uuid, resolver::EnvOutcome> = release_apps
            .iter()
            .map(|ra| (ra.app_id, resolver::env_outcome(ra.status, phase)))
            .collect();

        let waiting_status = match phase {
            Phase::Pre => ReleaseAppStatus::PreWaiting,
            Phase::Prod => ReleaseAppStatus::ProdWaiting,
        };
        let can_trigger_status = match phase {
            Phase::Pre => ReleaseAppStatus::PreCanTrigger,
            Phase::Prod => ReleaseAppStatus::ProdCanTrigger,
        };

        for mut ra in release_apps {
            if ra.status != waiting_status {
                continue;
            }
            let Some(app) = self.store.get_application(ra.app_id).await else {
                continue;
            };
            let raw = ra.raw_deps(&app.default_depends_on);
            if !raw.contains(&deployed_app_id) {
                continue;
            }
            let deps = resolver::effective_deps(&raw, &in_batch);
            if resolver::ready_for_env(&deps, &outcomes) {
                ra.status = can_trigger_status;
                ra.push_reason(format!("unblocked for {phase:?} by {deployed_app_id}"));
                self.store.put_release_app(ra).await;
            }
        }
        Ok(())
    }

    async fn maybe_advance_batch(&self, batch_id: Uuid, phase: Phase) -> Result<(), CoreError> {
        let batch = self
            .store
            .get_batch(batch_id)
            .await
            .ok_or_else(|| CoreError::NotFound(format!("batch {batch_id}")))?;
        if !batch.status.is_live() {
            return Ok(());
        }
        let release_apps = self.store.list_release_apps(batch_id).await;
        let statuses: Vec<ReleaseAppStatus> = release_apps.iter().map(|ra| ra.status).collect();

        if let Some(next) = aggregator::batch_rollup(&statuses, phase) {
            if next != batch.status {
                self.store.set_batch_status(batch_id, next, Utc::now()).await?;
            }
        }
        Ok(())
    }
}
