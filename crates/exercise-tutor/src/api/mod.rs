//! HTTP handlers - JSON transport for the exercise UI

pub mod assistance_api;
pub mod exercise_api;
pub mod metrics_api;

pub use assistance_api::{request_assistance, AssistanceRequest, AssistanceResponse};
pub use exercise_api::{execute, get_task, submit, CodeRequest, ExecuteResponse, SubmitResponse};
pub use metrics_api::{healthz, metrics};

use axum::{extract::rejection::JsonRejection, http::StatusCode, Json};
use serde::Serialize;
use tracing::error;

use crate::error::TutorError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn status_for(err: &TutorError) -> StatusCode {
    match err {
        TutorError::GatewayFailure(_) => StatusCode::BAD_GATEWAY,
        TutorError::CorpusUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        TutorError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        TutorError::StorageWriteFailure(_)
        | TutorError::IndexFormat(_)
        | TutorError::InvalidConfig(_)
        | TutorError::ExecutionFault(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Log, count and convert a failure for `route` into a JSON error body.
pub fn api_error(route: &str, err: TutorError) -> ApiError {
    let status = status_for(&err);
    error!("{} failed with {}: {}", route, status, err);
    crate::metrics::inc_request(route, status.as_str());
    (status, Json(ErrorResponse { error: err.to_string() }))
}

/// JSON body whose rejection is handled by the route, not by axum's plain-text default.
pub type JsonBody<T> = Result<Json<T>, JsonRejection>;

/// Unwrap a JSON body, turning a malformed one into a 400 with a JSON error.
pub fn parse_body<T>(route: &str, body: JsonBody<T>) -> Result<T, ApiError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| api_error(route, TutorError::InvalidRequest(rejection.body_text())))
}

pub fn record_success(route: &str) {
    crate::metrics::inc_request(route, StatusCode::OK.as_str());
}
