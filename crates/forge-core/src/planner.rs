//! DeploymentPlanner - expands a sealed batch into concrete
//! `Deployment` rows, and handles mid-flight version switches.

use std::sync::Arc;

use uuid::Uuid;

use crate::domain::{Phase, ReleaseApp, ReleaseAppStatus};
use crate::error::{CoreError, PreconditionError};
use crate::store::{DeploymentSpec, Store};

/// Naming/driver policy the planner consults when expanding a release app
/// into deployments. `forge-server` supplies a concrete implementation
/// wired from project/app config; kept as a trait so the planner stays
/// Store-agnostic about *how* names are templated.
pub trait NamingPolicy: Send + Sync {
    fn deployment_name(&self, app_name: &str, env: &str, override_name: Option<&str>) -> String {
        override_name.map(str::to_string).unwrap_or_else(|| format!("{app_name}-{env}"))
    }
    fn namespace(&self, app_name: &str, env: &str) -> String {
        format!("{app_name}-{env}")
    }
    fn driver_type(&self, app_type: &str) -> String {
        app_type.to_string()
    }
}

/// Default naming policy: `{app}-{env}` namespace/name, driver keyed by
/// app type directly. A real deployment accepts project-level overrides by
/// supplying a different `NamingPolicy` impl.
#[derive(Default)]
pub struct DefaultNamingPolicy;
impl NamingPolicy for DefaultNamingPolicy {}

pub struct DeploymentPlanner {
    store: Arc<dyn Store>,
    naming: Arc<dyn NamingPolicy>,
    default_max_retry_count: u32,
}

impl DeploymentPlanner {
    pub fn new(store: Arc<dyn Store>, naming: Arc<dyn NamingPolicy>, default_max_retry_count: u32) -> Self {
        Self {
            store,
            naming,
            default_max_retry_count,
        }
    }

    /// On seal, create one `pending` `Deployment` per `AppEnvConfig` of each
    /// release app's application whose env is part of the fixed lifecycle
    /// (`pre`/`prod`, per the project's `lifecycle_envs`) and allowed by the
    /// project's `allowedEnvClusters`.
    pub async fn plan_for_sealed_batch(
        &self,
        release_apps: &[ReleaseApp],
    ) -> Result<usize, CoreError> {
        let mut specs = Vec::new();
        for ra in release_apps {
            let app = self
                .store
                .get_application(ra.app_id)
                .await
                .ok_or_else(|| CoreError::NotFound(format!("application {}", ra.app_id)))?;
            let project = self
                .store
                .get_project(app.project_id)
                .await
                .ok_or_else(|| CoreError::NotFound(format!("project {}", app.project_id)))?;
            let target_tag = ra
                .target_tag
                .clone()
                .ok_or_else(|| CoreError::BadRequest(format!("release app {} has no target_tag", ra.id)))?;

            for phase in Phase::ALL {
                let env = project.env_for_phase(phase);
                if ra.skip_pre_env && phase == Phase::Pre {
                    continue;
                }
                for cfg in app.env_configs.iter().filter(|c| c.env == env) {
                    if !project.allows(&cfg.env, &cfg.cluster) {
                        continue;
                    }
                    specs.push(DeploymentSpec {
                        batch_id: ra.batch_id,
                        release_id: ra.id,
                        app_id: ra.app_id,
                        env: cfg.env.clone(),
                        cluster_name: cfg.cluster.clone(),
                        namespace: self.naming.namespace(&app.name, &cfg.env),
                        deployment_name: self.naming.deployment_name(
                            &app.name,
                            &cfg.env,
                            cfg.deployment_name_override.as_deref(),
                        ),
                        driver_type: self.naming.driver_type(&app.app_type),
                        max_retry_count: self.default_max_retry_count,
                        replicas: cfg.replicas,
                        image_tag: target_tag.clone(),
                    });
                }
            }
        }
        let created = specs.len();
        if created > 0 {
            self.store.create_deployments(specs).await?;
        }
        Ok(created)
    }

    /// `SwitchVersion`: writes the new build/tag onto the release app and
    /// supersedes its pending/running deployments in the target env,
    /// re-creating them against the new tag.
    ///
    /// Permitted only while the release app is actively deploying to `env`
    /// (`PreTriggered`/`ProdTriggered`); rejected once the env has already
    /// reached its terminal deployed/failed state.
    pub async fn switch_version(
        &self,
        release_app_id: Uuid,
        new_build_id: Uuid,
        env: &str,
    ) -> Result<Vec<Uuid>, CoreError> {
        let mut ra = self
            .store
            .get_release_app(release_app_id)
            .await
            .ok_or_else(|| CoreError::NotFound(format!("release app {release_app_id}")))?;
        let build = self
            .store
            .get_build(new_build_id)
            .await
            .ok_or_else(|| CoreError::NotFound(format!("build {new_build_id}")))?;
        if !build.build_status.is_success() || build.app_id != ra.app_id {
            return Err(CoreError::BadRequest(format!(
                "build {new_build_id} is not a success build for app {}",
                ra.app_id
            )));
        }

        let app = self
            .store
            .get_application(ra.app_id)
            .await
            .ok_or_else(|| CoreError::NotFound(format!("application {}", ra.app_id)))?;
        let project = self
            .store
            .get_project(app.project_id)
            .await
            .ok_or_else(|| CoreError::NotFound(format!("project {}", app.project_id)))?;

        let switch_phase = project
            .phase_for_env(env)
            .ok_or_else(|| CoreError::BadRequest(format!("env {env} is not part of the lifecycle")))?;
        let deploying = match switch_phase {
            Phase::Pre => ra.status == ReleaseAppStatus::PreTriggered,
            Phase::Prod => ra.status == ReleaseAppStatus::ProdTriggered,
        };
        if !deploying {
            return Err(PreconditionError::NotDeploying {
                release_app_id,
                env: env.to_string(),
                status: format!("{:?}", ra.status),
            }
            .into());
        }

        ra.build_id = Some(new_build_id);
        ra.latest_build_id = Some(new_build_id);
        ra.target_tag = Some(build.image_tag.clone());
        ra.push_reason(format!("version switched to build #{}", build.build_number));

        let existing = self
            .store
            .list_deployments_for_release(release_app_id)
            .await;
        let mut new_ids = Vec::new();
        let mut new_specs = Vec::new();
        for old in existing.into_iter().filter(|d| d.env == env && !d.is_superseded()) {
            let cfg = app
                .env_configs
                .iter()
                .find(|c| c.env == old.env && c.cluster == old.cluster_name);
            let (namespace, deployment_name, replicas) = match cfg {
                Some(cfg) => (
                    self.naming.namespace(&app.name, &cfg.env),
                    self.naming
                        .deployment_name(&app.name, &cfg.env, cfg.deployment_name_override.as_deref()),
                    cfg.replicas,
                ),
                None => (old.namespace.clone(), old.deployment_name.clone(), old.replicas),
            };
            new_specs.push((
                old.id,
                DeploymentSpec {
                    batch_id: old.batch_id,
                    release_id: old.release_id,
                    app_id: old.app_id,
                    env: old.env.clone(),
                    cluster_name: old.cluster_name.clone(),
                    namespace,
                    deployment_name,
                    driver_type: old.driver_type.clone(),
                    max_retry_count: old.max_retry_count,
                    replicas,
                    image_tag: build.image_tag.clone(),
                },
            ));
        }

        ra.status = match switch_phase {
            Phase::Pre => ReleaseAppStatus::PreCanTrigger,
            Phase::Prod => ReleaseAppStatus::ProdCanTrigger,
        };
        self.store.put_release_app(ra).await;

        let (old_ids, specs): (Vec<_>, Vec<_>) = new_specs.into_iter().unzip();
        if !specs.is_empty() {
            let created = self.store.create_deployments(specs).await?;
            for (old_id, new) in old_ids.into_iter().zip(created.iter()) {
                self.store.supersede(old_id, new.id).await?;
                new_ids.push(new.id);
            }
        }
        Ok(new_ids)
    }

    /// `ManualDeploy`: enqueues a one-shot deployment for `env` bypassing
    /// readiness gates, still honoring env-config membership.
    pub async fn manual_deploy(&self, release_app_id: Uuid, env: &str) -> Result<Vec<Uuid>, CoreError> {
        let ra = self
            .store
            .get_release_app(release_app_id)
            .await
            .ok_or_else(|| CoreError::NotFound(format!("release app {release_app_id}")))?;
        let app = self
            .store
            .get_application(ra.app_id)
            .await
            .ok_or_else(|| CoreError::NotFound(format!("application {}", ra.app_id)))?;
        let project = self
            .store
            .get_project(app.project_id)
            .await
            .ok_or_else(|| CoreError::NotFound(format!("project {}", app.project_id)))?;
        let target_tag = ra
            .target_tag
            .clone()
            .ok_or_else(|| CoreError::BadRequest(format!("release app {release_app_id} has no target_tag")))?;

        let mut specs = Vec::new();
        for cfg in app.env_configs.iter().filter(|c| c.env == env) {
            if !project.allows(&cfg.env, &cfg.cluster) {
                return Err(CoreError::BadRequest(format!(
                    "env/cluster {}/{} not allowed for project",
                    cfg.env, cfg.cluster
                )));
            }
            specs.push(DeploymentSpec {
                batch_id: ra.batch_id,
                release_id: ra.id,
                app_id: ra.app_id,
                env: cfg.env.clone(),
                cluster_name: cfg.cluster.clone(),
                namespace: self.naming.namespace(&app.name, &cfg.env),
                deployment_name: self.naming.deployment_name(
                    &app.name,
                    &cfg.env,
                    cfg.deployment_name_override.as_deref(),
                ),
                driver_type: self.naming.driver_type(&app.app_type),
                max_retry_count: self.default_max_retry_count,
                replicas: cfg.replicas,
                image_tag: target_tag.clone(),
            });
        }
        if specs.is_empty() {
            return Err(CoreError::BadRequest(format!(
                "no env-config for app {} at env {env}",
                ra.app_id
            )));
        }
        let created = self.store.create_deployments(specs).await?;
        Ok(created.into_iter().map(|d| d.id).collect())
    }
}
