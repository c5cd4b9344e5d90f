//! Supplemental `/healthz` and `/metrics` liveness routes, kept minimal
//! since metrics collection itself is out of scope here.

use axum::extract::State;
use axum::Json;
use serde_json::json;

use crate::state::AppState;

pub async fn healthz() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Reuses already-tracked dispatcher configuration rather than adding a
/// metrics backend (an explicit Non-goal); a real deployment would wire
/// this to the counters a `prometheus` crate would expose.
pub async fn metrics(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "dispatcher_worker_pool_size": state.engine_config.dispatcher.worker_pool_size,
        "dispatcher_claim_batch_size": state.engine_config.dispatcher.claim_batch_size,
        "dispatcher_tick_interval_ms": state.engine_config.dispatcher.tick_interval_ms,
    }))
}
