pub mod batch;
pub mod health;
pub mod webhook;

use axum::routing::{get, post, put};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/webhook/build", post(webhook::ingest_build))
        .route("/batch", post(batch::create_batch).put(batch::update_batch).get(batch::get_batch))
        .route("/batch/delete", post(batch::delete_batch))
        .route("/batch/action", post(batch::batch_action))
        .route("/batch/approve", post(batch::approve_batch))
        .route("/batch/reject", post(batch::reject_batch))
        .route("/batches", get(batch::list_batches))
        .route("/batch/release_app", put(batch::update_release_app_builds))
        .route("/release_app/temp_deps", put(batch::update_temp_deps))
        .route("/release_app/trigger_deploy", post(batch::trigger_deploy))
        .route("/release_app/manual_deploy", post(batch::manual_deploy))
        .route("/deployment/:id/retry", post(batch::retry_deployment))
        .route("/healthz", get(health::healthz))
        .route("/metrics", get(health::metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
