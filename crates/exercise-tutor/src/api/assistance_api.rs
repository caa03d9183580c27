// Tutoring endpoint: drains the streamed answer and returns it whole
use axum::extract::{Json, State};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{api_error, parse_body, record_success, ApiError, JsonBody};
use crate::error::TutorError;
use crate::shared_state::AppState;

#[derive(Debug, Deserialize)]
pub struct AssistanceRequest {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct AssistanceResponse {
    /// The code that was evaluated, unchanged.
    pub code: String,
    pub assistance: String,
}

pub async fn request_assistance(
    State(state): State<AppState>,
    body: JsonBody<AssistanceRequest>,
) -> Result<Json<AssistanceResponse>, ApiError> {
    state.counters.inc_total_requests();
    let req = parse_body("assistance", body)?;
    let n = state.counters.inc_assistance_requests();
    info!("Assistance request #{} from user '{}'", n, req.user_id);

    let Some(orchestrator) = state.assistance.clone() else {
        return Err(api_error(
            "assistance",
            TutorError::CorpusUnavailable {
                corpus_dir: state.config.corpus_dir.clone(),
                index_dir: state.config.index_dir.clone(),
            },
        ));
    };

    let (code, assistance) = orchestrator
        .request_assistance(&req.user_id, &req.code)
        .await
        .map_err(|e| api_error("assistance", e))?;
    record_success("assistance");
    Ok(Json(AssistanceResponse { code, assistance }))
}
