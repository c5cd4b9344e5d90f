//! Dispatcher - background loop that claims ready deployments, invokes
//! a `DeployDriver`, and records outcomes with retry/supersession.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::task::JoinSet;
use tracing::{info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::RetryPolicy;
use crate::domain::{Deployment, DeploymentAttempt, DeploymentStatus};
use crate::error::CoreError;
use crate::lifecycle::LifecycleEngine;
use crate::store::Store;

/// What the dispatcher hands to a driver for one deployment attempt.
#[derive(Debug, Clone)]
pub struct DeploySpec {
    pub deployment_id: Uuid,
    pub deployment_name: String,
    pub namespace: String,
    pub cluster_name: String,
    pub env: String,
    pub image_tag: String,
    pub replicas: u32,
}

/// Outcome a driver reports back. `Transient` drives a retry (while budget
/// remains); `Fatal` fails the deployment immediately.
#[derive(Debug, Clone)]
pub enum DriverOutcome {
    Success,
    Transient(String),
    Fatal(String),
}

/// Abstraction over the actual rollout mechanism. The core never talks to
/// Kubernetes/Helm directly; a real cluster client would implement this
/// trait in an adapter crate, keeping its own driver-specific error type
/// behind this boundary.
#[async_trait]
pub trait DeployDriver: Send + Sync {
    async fn apply(&self, spec: &DeploySpec) -> DriverOutcome;
}

/// In-memory test double: deterministic-ish failures driven by a
/// configurable failure rate, for exercising retry/supersession paths
/// without a real cluster.
pub struct SimulatedDriver {
    failure_rate: f64,
    latency: Duration,
}

impl SimulatedDriver {
    pub fn new(failure_rate: f64, latency: Duration) -> Self {
        Self { failure_rate, latency }
    }

    pub fn always_succeeds() -> Self {
        Self::new(0.0, Duration::from_millis(0))
    }
}

impl Default for SimulatedDriver {
    fn default() -> Self {
        Self::always_succeeds()
    }
}

#[async_trait]
impl DeployDriver for SimulatedDriver {
    async fn apply(&self, spec: &DeploySpec) -> DriverOutcome {
        if self.latency > Duration::ZERO {
            tokio::time::sleep(self.latency).await;
        }
        let roll: f64 = rand::thread_rng().gen();
        if roll < self.failure_rate {
            DriverOutcome::Transient(format!(
                "simulated transient failure deploying {}",
                spec.deployment_name
            ))
        } else {
            DriverOutcome::Success
        }
    }
}

pub struct Dispatcher {
    store: Arc<dyn Store>,
    driver: Arc<dyn DeployDriver>,
    lifecycle: Arc<LifecycleEngine>,
    clock: Arc<dyn Clock>,
    retry_policy: RetryPolicy,
    claim_batch_size: usize,
    worker_pool_size: usize,
    driver_call_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn Store>,
        driver: Arc<dyn DeployDriver>,
        lifecycle: Arc<LifecycleEngine>,
        clock: Arc<dyn Clock>,
        retry_policy: RetryPolicy,
        claim_batch_size: usize,
        worker_pool_size: usize,
        driver_call_timeout_ms: u64,
    ) -> Self {
        Self {
            store,
            driver,
            lifecycle,
            clock,
            retry_policy,
            claim_batch_size,
            worker_pool_size,
            driver_call_timeout: Duration::from_millis(driver_call_timeout_ms),
        }
    }

    /// One dispatch cycle: claim ready deployments, fan them
    /// out across a bounded worker pool, record each outcome. Returns the
    /// number of deployments processed.
    pub async fn run_once(&self) -> usize {
        let claimed = self.store.claim_ready_deployments(self.claim_batch_size).await;
        if claimed.is_empty() {
            return 0;
        }
        info!(count = claimed.len(), "dispatcher claimed deployments");

        let mut set: JoinSet<()> = JoinSet::new();
        let mut iter = claimed.into_iter();
        let mut in_flight = 0usize;
        let mut total = 0usize;

        loop {
            while in_flight < self.worker_pool_size {
                let Some(deployment) = iter.next() else { break };
                let store = self.store.clone();
                let driver = self.driver.clone();
                let lifecycle = self.lifecycle.clone();
                let clock = self.clock.clone();
                let retry_policy = self.retry_policy.clone();
                let driver_call_timeout = self.driver_call_timeout;
                set.spawn(async move {
                    process_one(
                        store,
                        driver,
                        lifecycle,
                        clock,
                        retry_policy,
                        driver_call_timeout,
                        deployment,
                    )
                    .await;
                });
                in_flight += 1;
                total += 1;
            }
            if in_flight == 0 {
                break;
            }
            if set.join_next().await.is_some() {
                in_flight -= 1;
            } else {
                break;
            }
        }
        total
    }

    /// Operator-issued manual retry: legal only when
    /// `status=failed` and not superseded.
    pub async fn retry(&self, deployment_id: Uuid) -> Result<Deployment, CoreError> {
        self.store.retry_deployment(deployment_id).await
    }
}

async fn process_one(
    store: Arc<dyn Store>,
    driver: Arc<dyn DeployDriver>,
    lifecycle: Arc<LifecycleEngine>,
    clock: Arc<dyn Clock>,
    retry_policy: RetryPolicy,
    driver_call_timeout: Duration,
    mut deployment: Deployment,
) {
    let batch = store.get_batch(deployment.batch_id).await;
    let batch_cancelled = batch.map(|b| !b.status.is_live()).unwrap_or(true);

    let spec = DeploySpec {
        deployment_id: deployment.id,
        deployment_name: deployment.deployment_name.clone(),
        namespace: deployment.namespace.clone(),
        cluster_name: deployment.cluster_name.clone(),
        env: deployment.env.clone(),
        image_tag: deployment.image_tag.clone(),
        replicas: deployment.replicas,
    };

    let started_at = clock.now();
    let outcome = match tokio::time::timeout(driver_call_timeout, driver.apply(&spec)).await {
        Ok(outcome) => outcome,
        Err(_) => DriverOutcome::Transient(format!(
            "driver call for {} exceeded {:?} deadline",
            spec.deployment_name, driver_call_timeout
        )),
    };
    let finished_at = clock.now();

    let (success, message) = match &outcome {
        DriverOutcome::Success => (true, None),
        DriverOutcome::Transient(msg) => (false, Some(msg.clone())),
        DriverOutcome::Fatal(msg) => (false, Some(msg.clone())),
    };
    deployment.attempts.push(DeploymentAttempt {
        attempt_number: deployment.retry_count + 1,
        started_at,
        finished_at,
        success,
        message: message.clone(),
    });

    match outcome {
        DriverOutcome::Success => {
            deployment.status = DeploymentStatus::Success;
            deployment.finished_at = Some(finished_at);
            deployment.error_message = None;
        }
        DriverOutcome::Fatal(msg) => {
            deployment.status = DeploymentStatus::Failed;
            deployment.finished_at = Some(finished_at);
            deployment.error_message = Some(msg);
        }
        DriverOutcome::Transient(msg) => {
            let attempted_count = deployment.retry_count + 1;
            if !batch_cancelled && attempted_count < deployment.max_retry_count {
                deployment.retry_count = attempted_count;
                deployment.status = DeploymentStatus::Pending;
                deployment.error_message = Some(msg);
                let jitter = rand::thread_rng().gen::<f64>();
                let delay = retry_policy.backoff_for(deployment.retry_count, jitter);
                let store_for_delay = store.clone();
                let deployment_id = deployment.id;
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if let Some(mut d) = store_for_delay.get_deployment(deployment_id).await {
                        if d.status == DeploymentStatus::Pending {
                            d.started_at = None;
                            let _ = store_for_delay.update_deployment(d).await;
                        }
                    }
                });
            } else {
                deployment.retry_count = attempted_count;
                deployment.status = DeploymentStatus::Failed;
                deployment.finished_at = Some(finished_at);
                deployment.error_message = Some(msg);
            }
        }
    }

    let deployment_id = deployment.id;
    let status = deployment.status;
    if let Err(err) = store.update_deployment(deployment).await {
        warn!(%deployment_id, error = %err, "failed to persist deployment outcome");
        return;
    }

    if status != DeploymentStatus::Pending {
        if let Err(err) = lifecycle.on_deployment_outcome(deployment_id).await {
            warn!(%deployment_id, error = %err, "lifecycle failed to process deployment outcome");
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::clock::TestClock;
    use crate::domain::Phase;
    use crate::store::memory::InMemoryStore;

    #[tokio::test]
    async fn simulated_driver_always_succeeds_with_zero_failure_rate() {
        let driver = SimulatedDriver::always_succeeds();
        let spec = DeploySpec {
            deployment_id: Uuid::new_v4(),
            deployment_name: "x".into(),
            namespace: "x".into(),
            cluster_name: "c".into(),
            env: "pre".into(),
            image_tag: "v1".into(),
            replicas: 1,
        };
        matches!(driver.apply(&spec).await, DriverOutcome::Success);
    }

    /// A driver that never returns within any reasonable deadline.
    struct HangingDriver;

    #[async_trait]
    impl DeployDriver for HangingDriver {
        async fn apply(&self, _spec: &DeploySpec) -> DriverOutcome {
            std::future::pending().await
        }
    }

    fn deployment_fixture() -> Deployment {
        Deployment {
            id: Uuid::new_v4(),
            batch_id: Uuid::new_v4(),
            release_id: Uuid::new_v4(),
            app_id: Uuid::new_v4(),
            phase: Phase::Pre,
            env: "pre".into(),
            cluster_name: "c-pre".into(),
            namespace: "ns".into(),
            deployment_name: "svc-pre".into(),
            driver_type: "k8s".into(),
            status: DeploymentStatus::Running,
            retry_count: 0,
            max_retry_count: 3,
            error_message: None,
            superseded_by: None,
            started_at: None,
            finished_at: None,
            replicas: 1,
            image_tag: "v1".into(),
            attempts: Vec::new(),
        }
    }

    #[tokio::test]
    async fn process_one_treats_timeout_as_transient_failure() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let driver: Arc<dyn DeployDriver> = Arc::new(HangingDriver);
        let lifecycle = Arc::new(LifecycleEngine::new(store.clone()));
        let clock: Arc<dyn Clock> = Arc::new(TestClock::new(Utc::now()));
        let deployment = deployment_fixture();
        let deployment_id = deployment.id;

        process_one(
            store.clone(),
            driver,
            lifecycle,
            clock,
            RetryPolicy::default(),
            Duration::from_millis(1),
            deployment,
        )
        .await;

        let persisted = store.get_deployment(deployment_id).await.unwrap();
        assert_eq!(persisted.attempts.len(), 1);
        assert!(!persisted.attempts[0].success);
        assert!(persisted.attempts[0]
            .message
            .as_deref()
            .unwrap_or_default()
            .contains("deadline"));
    }
}
