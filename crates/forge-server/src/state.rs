//! Application state: wires `forge-core`'s services to a concrete `Store`
//! and `DeployDriver`, then hands the assembled handles to the HTTP router.

use std::sync::Arc;
use std::time::Duration;

use forge_core::batch_service::{AllowAll, BatchService};
use forge_core::clock::{Clock, SystemClock};
use forge_core::config::EngineConfig;
use forge_core::dispatcher::{DeployDriver, Dispatcher, SimulatedDriver};
use forge_core::ingestor::BuildIngestor;
use forge_core::lifecycle::LifecycleEngine;
use forge_core::planner::{DefaultNamingPolicy, DeploymentPlanner};
use forge_core::store::memory::InMemoryStore;
use forge_core::store::Store;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub batch_service: Arc<BatchService>,
    pub ingestor: Arc<BuildIngestor>,
    pub planner: Arc<DeploymentPlanner>,
    pub lifecycle: Arc<LifecycleEngine>,
    pub dispatcher: Arc<Dispatcher>,
    pub engine_config: EngineConfig,
}

impl AppState {
    pub fn new(engine_config: EngineConfig) -> Self {
        Self::with_driver(engine_config, Arc::new(SimulatedDriver::always_succeeds()))
    }

    pub fn with_driver(engine_config: EngineConfig, driver: Arc<dyn DeployDriver>) -> Self {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let naming = Arc::new(DefaultNamingPolicy);
        let planner = Arc::new(DeploymentPlanner::new(
            store.clone(),
            naming,
            engine_config.retry.default_max_retry_count,
        ));
        let access = Arc::new(AllowAll);
        let batch_service = Arc::new(BatchService::new(store.clone(), planner.clone(), access));
        let ingestor = Arc::new(BuildIngestor::new(store.clone()));
        let lifecycle = Arc::new(LifecycleEngine::new(store.clone()));
        let dispatcher = Arc::new(Dispatcher::new(
            store.clone(),
            driver,
            lifecycle.clone(),
            clock,
            engine_config.retry.clone(),
            engine_config.dispatcher.claim_batch_size,
            engine_config.dispatcher.worker_pool_size,
            engine_config.dispatcher.driver_call_timeout_ms,
        ));

        Self {
            store,
            batch_service,
            ingestor,
            planner,
            lifecycle,
            dispatcher,
            engine_config,
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.engine_config.dispatcher.tick_interval_ms)
    }
}
