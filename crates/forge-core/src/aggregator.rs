//! Aggregator - pure rollup of deployment outcomes into release-app and
//! batch status. No I/O: callers (the `Dispatcher` and `LifecycleEngine`)
//! feed it slices already read from the `Store` and apply the decisions it
//! returns.

use crate::domain::{BatchStatus, DeploymentStatus, Phase, ReleaseAppStatus};

/// Per-env rollup of a release app's non-superseded deployments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvRollup {
    /// Nothing dispatched yet, or still pending/running.
    Triggered,
    /// Every non-superseded deployment in this env succeeded.
    Deployed,
    /// At least one non-superseded deployment failed with retries exhausted.
    Failed,
}

/// `deployments` must already be filtered to one release app's
/// non-superseded rows for the given `phase`'s env.
pub fn rollup_env(statuses: &[DeploymentStatus]) -> EnvRollup {
    if statuses.is_empty() {
        return EnvRollup::Triggered;
    }
    if statuses.iter().all(|s| *s == DeploymentStatus::Success) {
        return EnvRollup::Deployed;
    }
    if statuses.iter().any(|s| *s == DeploymentStatus::Failed) {
        return EnvRollup::Failed;
    }
    EnvRollup::Triggered
}

/// Next `ReleaseAppStatus` given the current one, which phase just rolled
/// up, and the rollup outcome. Returns `None` when the
/// rollup doesn't warrant a transition (e.g. still triggered).
pub fn next_release_app_status(
    current: ReleaseAppStatus,
    phase: Phase,
    rollup: EnvRollup,
) -> Option<ReleaseAppStatus> {
    use ReleaseAppStatus::*;
    match (phase, rollup) {
        (Phase::Pre, EnvRollup::Deployed) if current == PreTriggered => Some(PreDeployed),
        (Phase::Pre, EnvRollup::Failed) if current == PreTriggered => Some(PreFailed),
        (Phase::Prod, EnvRollup::Deployed) if current == ProdTriggered => Some(ProdDeployed),
        (Phase::Prod, EnvRollup::Failed) if current == ProdTriggered => Some(ProdFailed),
        _ => None,
    }
}

/// Batch-level rollup: given every release app's status in the batch and
/// which phase is active, decide whether the batch should auto-advance
///.
pub fn batch_rollup(statuses: &[ReleaseAppStatus], phase: Phase) -> Option<BatchStatus> {
    use ReleaseAppStatus::*;
    if statuses.is_empty() {
        return None;
    }
    match phase {
        Phase::Pre => {
            if statuses.iter().all(|s| *s == PreDeployed) {
                Some(BatchStatus::PreDeployed)
            } else if statuses
                .iter()
                .any(|s| *s == PreFailed)
            {
                Some(BatchStatus::PreFailed)
            } else {
                None
            }
        }
        Phase::Prod => {
            if statuses.iter().all(|s| *s == ProdDeployed) {
                Some(BatchStatus::ProdDeployed)
            } else if statuses.iter().any(|s| *s == ProdFailed) {
                Some(BatchStatus::ProdFailed)
            } else {
                None
            }
        }
    }
}
