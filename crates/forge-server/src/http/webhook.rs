//! `POST /webhook/build` - the CI build notification ingress.

use axum::extract::State;
use axum::Json;
use forge_core::ingestor::BuildNotification;

use crate::envelope::Envelope;
use crate::state::AppState;

pub async fn ingest_build(
    State(state): State<AppState>,
    Json(notif): Json<BuildNotification>,
) -> Envelope {
    match state.ingestor.ingest(notif).await {
        Ok(report) if report.is_partial() => Envelope::partial(
            format!(
                "{} succeeded, {} skipped",
                report.succeeded.len(),
                report.skipped.len()
            ),
            serde_json::json!({ "succeeded": report.succeeded, "skipped": report.skipped }),
        ),
        Ok(report) => Envelope::ok(serde_json::json!({ "succeeded": report.succeeded })),
        Err(err) => Envelope::from_core_error(err),
    }
}
