//! Reference entities that the engine consumes but does not own the CRUD
//! lifecycle of: projects, clusters, teams, users, repositories, apps and
//! their per-environment deployment configuration.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A deployable environment/cluster pair, e.g. `(pre, c-pre)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EnvCluster {
    pub env: String,
    pub cluster: String,
}

impl EnvCluster {
    pub fn new(env: impl Into<String>, cluster: impl Into<String>) -> Self {
        Self {
            env: env.into(),
            cluster: cluster.into(),
        }
    }
}

/// `Project { id, name, allowedEnvClusters, defaultEnvClusters }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    /// env -> allowed clusters for that env.
    pub allowed_env_clusters: BTreeMap<String, BTreeSet<String>>,
    /// Subset of `allowed_env_clusters` used when a batch is sealed without
    /// explicit per-app cluster overrides.
    pub default_env_clusters: BTreeMap<String, BTreeSet<String>>,
    /// Whether sealing a batch for this project requires `approvalStatus =
    /// approved` first. A per-project policy flag rather than a global one,
    /// since not every project wants the approval gate.
    pub require_approval_to_seal: bool,
    /// Ordered `[pre_env_name, prod_env_name]` binding the two fixed
    /// lifecycle phases to this project's environment names (see
    /// `domain::phase`). Defaults to `["pre", "prod"]`.
    pub lifecycle_envs: [String; 2],
}

impl Project {
    pub fn allows(&self, env: &str, cluster: &str) -> bool {
        self.allowed_env_clusters
            .get(env)
            .map(|clusters| clusters.contains(cluster))
            .unwrap_or(false)
    }

    pub fn env_for_phase(&self, phase: super::Phase) -> &str {
        match phase {
            super::Phase::Pre => &self.lifecycle_envs[0],
            super::Phase::Prod => &self.lifecycle_envs[1],
        }
    }

    pub fn phase_for_env(&self, env: &str) -> Option<super::Phase> {
        if env == self.lifecycle_envs[0] {
            Some(super::Phase::Pre)
        } else if env == self.lifecycle_envs[1] {
            Some(super::Phase::Prod)
        } else {
            None
        }
    }
}

/// Reference entity, unique by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    pub id: Uuid,
    pub name: String,
}

/// Reference entity, unique by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    pub id: Uuid,
    pub name: String,
}

/// Reference entity, unique by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
}

/// `Repository { id, namespace, name, gitType, projectId?, teamId? }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub id: Uuid,
    pub namespace: String,
    pub name: String,
    pub git_type: String,
    pub project_id: Option<Uuid>,
    pub team_id: Option<Uuid>,
}

/// `Application { id, name, projectId, repoId, appType, teamId?,
/// deployedTag?, defaultDependsOn, envConfigs }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    pub id: Uuid,
    pub name: String,
    pub project_id: Uuid,
    pub repo_id: Uuid,
    pub app_type: String,
    pub team_id: Option<Uuid>,
    pub deployed_tag: Option<String>,
    /// Acyclic DAG over apps, normalized: positive ids only, de-duplicated
    /// preserving first occurrence, stored sorted ascending.
    pub default_depends_on: Vec<Uuid>,
    pub env_configs: Vec<AppEnvConfig>,
}

impl Application {
    pub fn env_config(&self, env: &str, cluster: &str) -> Option<&AppEnvConfig> {
        self.env_configs
            .iter()
            .find(|c| c.env == env && c.cluster == cluster)
    }
}

/// `AppEnvConfig { id, appId, env, cluster, replicas, deploymentNameOverride? }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppEnvConfig {
    pub id: Uuid,
    pub app_id: Uuid,
    pub env: String,
    pub cluster: String,
    pub replicas: u32,
    pub deployment_name_override: Option<String>,
}

impl AppEnvConfig {
    /// Precondition: `replicas >= 1`.
    pub fn validate(&self) -> Result<(), String> {
        if self.replicas < 1 {
            return Err(format!(
                "app_env_config {}/{} must have replicas >= 1",
                self.env, self.cluster
            ));
        }
        Ok(())
    }
}
