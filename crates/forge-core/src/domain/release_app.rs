//! `ReleaseApp` - the per-application row within a batch.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// `ReleaseAppStatus` - the per-app state within a batch's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseAppStatus {
    Pending = 0,
    Tagged = 1,
    PreWaiting = 10,
    PreCanTrigger = 11,
    PreTriggered = 12,
    PreDeployed = 13,
    PreFailed = 14,
    ProdWaiting = 20,
    ProdCanTrigger = 21,
    ProdTriggered = 22,
    ProdDeployed = 23,
    ProdFailed = 24,
}

/// Bounded append-only history of human-readable status-change reasons,
/// accumulated rather than one-shot since a ReleaseApp lives through many
/// transitions.
const REASON_HISTORY_CAP: usize = 50;

/// `ReleaseApp { id, batchId, appId, buildId?, targetTag?,
/// previousDeployedTag?, latestBuildId?, status, isLocked, skipPreEnv,
/// tempDependsOn, releaseNotes?, reasonHistory }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseApp {
    pub id: Uuid,
    pub batch_id: Uuid,
    pub app_id: Uuid,
    pub build_id: Option<Uuid>,
    pub target_tag: Option<String>,
    pub previous_deployed_tag: Option<String>,
    pub latest_build_id: Option<Uuid>,
    pub status: ReleaseAppStatus,
    pub is_locked: bool,
    pub skip_pre_env: bool,
    /// Overrides `Application::default_depends_on` when set.
    pub temp_depends_on: Option<Vec<Uuid>>,
    pub release_notes: Option<String>,
    pub reason_history: Vec<String>,
}

impl ReleaseApp {
    pub fn new(batch_id: Uuid, app_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            batch_id,
            app_id,
            build_id: None,
            target_tag: None,
            previous_deployed_tag: None,
            latest_build_id: None,
            status: ReleaseAppStatus::Pending,
            is_locked: false,
            skip_pre_env: false,
            temp_depends_on: None,
            release_notes: None,
            reason_history: Vec::new(),
        }
    }

    pub fn push_reason(&mut self, reason: impl Into<String>) {
        self.reason_history.push(reason.into());
        if self.reason_history.len() > REASON_HISTORY_CAP {
            let overflow = self.reason_history.len() - REASON_HISTORY_CAP;
            self.reason_history.drain(0..overflow);
        }
    }

    /// Raw (pre-`∩ S`) dependency list: `tempDependsOn` fully overrides
    /// `defaultDependsOn` when set; the `S`-intersection and de-duplication
    /// against the batch's app set is the resolver's job.
    pub fn raw_deps(&self, default_depends_on: &[Uuid]) -> Vec<Uuid> {
        match &self.temp_depends_on {
            Some(temp) => temp.clone(),
            None => default_depends_on.to_vec(),
        }
    }
}
