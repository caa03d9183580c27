// Execute / submit / task endpoints
use axum::extract::{Json, State};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{api_error, parse_body, record_success, ApiError, JsonBody};
use crate::shared_state::AppState;
use crate::task::TaskDescription;

/// Body shared by the execute and submit actions.
#[derive(Debug, Deserialize)]
pub struct CodeRequest {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct ExecuteResponse {
    pub output: String,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub status: &'static str,
}

/// Run the learner's code; faults come back as `Error: ...` output, not HTTP errors.
pub async fn execute(
    State(state): State<AppState>,
    body: JsonBody<CodeRequest>,
) -> Result<Json<ExecuteResponse>, ApiError> {
    state.counters.inc_total_requests();
    let req = parse_body("execute", body)?;
    let n = state.counters.inc_executions();
    info!("Execute request #{} from user '{}' ({} chars)", n, req.user_id, req.code.len());

    let output = state
        .execution
        .execute(&req.code, &req.user_id)
        .await
        .map_err(|e| api_error("execute", e))?;
    record_success("execute");
    Ok(Json(ExecuteResponse { output }))
}

pub async fn submit(
    State(state): State<AppState>,
    body: JsonBody<CodeRequest>,
) -> Result<Json<SubmitResponse>, ApiError> {
    state.counters.inc_total_requests();
    let req = parse_body("submit", body)?;
    let n = state.counters.inc_submissions();
    info!("Submit request #{} from user '{}'", n, req.user_id);

    state
        .execution
        .submit(&req.code, &req.user_id)
        .await
        .map_err(|e| api_error("submit", e))?;
    record_success("submit");
    Ok(Json(SubmitResponse { status: "recorded" }))
}

pub async fn get_task(State(state): State<AppState>) -> Json<TaskDescription> {
    record_success("task");
    Json(state.task.clone())
}
