//! `Deployment` - a concrete (env, cluster) rollout unit derived from a
//! `ReleaseApp`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Phase;

/// `DeploymentStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    Pending,
    Running,
    Success,
    Failed,
    WaitingDependencies,
}

/// One dispatch attempt, kept for operator visibility: a retryable unit
/// with its own start/finish timestamps and outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentAttempt {
    pub attempt_number: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub success: bool,
    pub message: Option<String>,
}

/// `Deployment { id, batchId, releaseId, appId, env, clusterName, namespace,
/// deploymentName, driverType, status, retryCount, maxRetryCount,
/// errorMessage?, supersededBy?, startedAt?, finishedAt? }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    pub id: Uuid,
    pub batch_id: Uuid,
    pub release_id: Uuid,
    pub app_id: Uuid,
    /// Denormalized from `env` via `Project::phase_for_env` at creation
    /// time so the dispatcher can answer "is this release app's *this*
    /// phase dependency-ready" without re-resolving project config on every
    /// claim cycle (see `domain::phase`).
    pub phase: Phase,
    pub env: String,
    pub cluster_name: String,
    pub namespace: String,
    pub deployment_name: String,
    pub driver_type: String,
    pub status: DeploymentStatus,
    pub retry_count: u32,
    pub max_retry_count: u32,
    pub error_message: Option<String>,
    pub superseded_by: Option<Uuid>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub replicas: u32,
    pub image_tag: String,
    pub attempts: Vec<DeploymentAttempt>,
}

impl Deployment {
    pub fn is_superseded(&self) -> bool {
        self.superseded_by.is_some()
    }

    pub fn retries_exhausted(&self) -> bool {
        self.retry_count >= self.max_retry_count
    }
}
