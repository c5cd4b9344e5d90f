//! `{code, message, detail?, data?}` response envelope and the
//! `CoreError -> envelope` mapping. Handlers never render the
//! envelope by hand - they decode the request, call one `forge-core`
//! service method, and pass the `Result` through `Envelope::from_result`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use forge_core::error::{ConflictError, CoreError, PreconditionError, TransitionError};
use serde::Serialize;
use serde_json::Value;

use crate::codes;

#[derive(Debug, Serialize)]
pub struct Envelope {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Envelope {
    pub fn ok(data: impl Serialize) -> Self {
        Self {
            code: codes::SUCCESS,
            message: "ok".to_string(),
            detail: None,
            data: Some(serde_json::to_value(data).unwrap_or(Value::Null)),
        }
    }

    pub fn ok_empty() -> Self {
        Self {
            code: codes::SUCCESS,
            message: "ok".to_string(),
            detail: None,
            data: None,
        }
    }

    pub fn partial(message: impl Into<String>, data: impl Serialize) -> Self {
        Self {
            code: codes::PARTIAL_SUCCESS,
            message: message.into(),
            detail: None,
            data: Some(serde_json::to_value(data).unwrap_or(Value::Null)),
        }
    }

    pub fn from_core_error(err: CoreError) -> Self {
        // Business codes live in the body; HTTP status is always 200, so
        // no StatusCode is threaded through here.
        match err {
            CoreError::BadRequest(msg) => Self {
                code: codes::BAD_REQUEST,
                message: "bad request".into(),
                detail: Some(msg),
                data: None,
            },
            CoreError::NotFound(msg) => Self {
                code: codes::NOT_FOUND,
                message: "not found".into(),
                detail: Some(msg),
                data: None,
            },
            CoreError::Conflict(conflict) => Self::from_conflict(conflict),
            CoreError::Precondition(precondition) => Self::from_precondition(precondition),
            CoreError::Transition(transition) => Self::from_transition(transition),
            CoreError::PartialSuccess {
                succeeded,
                total,
                failures,
            } => Self {
                code: codes::PARTIAL_SUCCESS,
                message: format!("{succeeded} of {total} succeeded"),
                detail: Some(failures.join("; ")),
                data: None,
            },
        }
    }

    fn from_conflict(err: ConflictError) -> Self {
        match err {
            ConflictError::AppConflict(entries) => Self {
                code: codes::CONFLICT,
                message: "one or more apps are already live in another batch".into(),
                detail: None,
                data: Some(serde_json::json!({ "conflicts": entries })),
            },
            ConflictError::BatchSealed(id) => Self {
                code: codes::CONFLICT,
                message: "batch is sealed and can no longer be modified".into(),
                detail: Some(id.to_string()),
                data: None,
            },
            ConflictError::DuplicateBatchNumber(number) => Self {
                code: codes::CONFLICT,
                message: "duplicate batch_number".into(),
                detail: Some(number),
                data: None,
            },
        }
    }

    fn from_precondition(err: PreconditionError) -> Self {
        let detail = err.to_string();
        Self {
            code: codes::PRECONDITION_FAILED,
            message: "precondition failed".into(),
            detail: Some(detail),
            data: None,
        }
    }

    fn from_transition(err: TransitionError) -> Self {
        Self {
            code: codes::BAD_REQUEST,
            message: "illegal lifecycle transition".into(),
            detail: Some(err.to_string()),
            data: None,
        }
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self {
            code: codes::INTERNAL,
            message: "internal error".into(),
            detail: Some(detail.into()),
            data: None,
        }
    }
}

impl IntoResponse for Envelope {
    fn into_response(self) -> Response {
        // HTTP status is always 200; the business code carries the outcome.
        (StatusCode::OK, Json(self)).into_response()
    }
}

pub fn render<T: Serialize>(result: Result<T, CoreError>) -> Envelope {
    match result {
        Ok(data) => Envelope::ok(data),
        Err(err) => Envelope::from_core_error(err),
    }
}
