//! Centralized error types for the engine.
//!
//! Uses `thiserror` for typed errors that can be matched on: one top-level
//! enum wrapping a per-subsystem error enum for each failure domain.

use thiserror::Error;
use uuid::Uuid;

/// Top-level error type for engine operations.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error(transparent)]
    Precondition(#[from] PreconditionError),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("partial success: {succeeded} of {total} applied, failures: {failures:?}")]
    PartialSuccess {
        succeeded: usize,
        total: usize,
        failures: Vec<String>,
    },
}

/// `Conflict` - an app already live in another batch, seal-after-modify,
/// unique-constraint clashes.
#[derive(Error, Debug)]
pub enum ConflictError {
    #[error("app(s) already live in another batch: {0:?}")]
    AppConflict(Vec<AppConflictEntry>),

    #[error("batch {0} is sealed and can no longer be modified as a draft")]
    BatchSealed(Uuid),

    #[error("duplicate batch_number: {0}")]
    DuplicateBatchNumber(String),

    #[error("build #{build_number} for app {app_id} was already recorded with different content; re-delivery cannot change a terminal build")]
    BuildRedelivery { app_id: Uuid, build_number: i64 },
}

/// One conflicting app, reported as `{app_id, batch_number, batch_status}`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AppConflictEntry {
    pub app_id: Uuid,
    pub batch_id: Uuid,
    pub batch_number: String,
    pub batch_status: i32,
}

/// `PreconditionFailed` - seal invariants or transition guards failed.
#[derive(Error, Debug)]
pub enum PreconditionError {
    #[error("batch {0} has no release apps; cannot seal an empty batch")]
    EmptyBatch(Uuid),

    #[error("release app {release_app_id} has no build assigned, or its build is not a success build for the same app")]
    MissingSuccessBuild { release_app_id: Uuid },

    #[error("batch {0} requires approval before it can be sealed")]
    ApprovalRequired(Uuid),

    #[error("dependency cycle detected: {0}")]
    CycleDetected(String),

    #[error("release app {0} is locked and cannot be modified")]
    Locked(Uuid),

    #[error("temp dependency references an app outside the batch: {0}")]
    DependencyOutsideBatch(Uuid),

    #[error("an app cannot depend on itself: {0}")]
    SelfDependency(Uuid),

    #[error("batch {batch_id} is past Draft ({status:?}); build selections can no longer be changed")]
    NotDraft { batch_id: Uuid, status: String },

    #[error("deployment {0} is not retryable (must be failed and not superseded)")]
    NotRetryable(Uuid),

    #[error("release app {release_app_id} is not actively deploying to {env} (status {status}); version switch is only permitted mid-deploy")]
    NotDeploying {
        release_app_id: Uuid,
        env: String,
        status: String,
    },
}

/// Table-driven lifecycle transition failures.
#[derive(Error, Debug)]
pub enum TransitionError {
    #[error("event {event} is not legal from state {state}")]
    IllegalTransition { state: String, event: String },

    #[error("batch {0} is cancelled")]
    BatchCancelled(Uuid),
}

/// Store-layer errors, kept distinct from domain errors so a future real
/// database adapter can map its own driver errors into this shape without
/// touching the service layer.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("optimistic concurrency conflict on {0}")]
    Stale(String),
}
