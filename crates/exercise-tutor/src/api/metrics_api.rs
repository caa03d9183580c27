// Liveness and Prometheus exposition
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use tracing::warn;

use crate::shared_state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub assistance_available: bool,
    pub last_sequence_number: i64,
    pub total_requests: usize,
    /// Stored records per submission kind; empty when the ledger cannot be read.
    pub recorded: BTreeMap<&'static str, i64>,
}

pub async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    let store = state.ledger_db.submissions.clone();
    let recorded = match tokio::task::spawn_blocking(move || store.count_by_kind()).await {
        Ok(Ok(counts)) => counts.into_iter().map(|(kind, n)| (kind.as_str(), n)).collect(),
        Ok(Err(e)) => {
            warn!("Cannot count ledger records: {}", e);
            BTreeMap::new()
        }
        Err(e) => {
            warn!("Ledger count task failed: {}", e);
            BTreeMap::new()
        }
    };
    Json(HealthResponse {
        status: "OK",
        assistance_available: state.assistance.is_some(),
        last_sequence_number: state.ledger.last_sequence(),
        total_requests: state.counters.total_requests.load(Ordering::Relaxed),
        recorded,
    })
}

pub async fn metrics() -> Response {
    match crate::metrics::gather_text() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}
