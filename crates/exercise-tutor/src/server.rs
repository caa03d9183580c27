//! Server startup and routing
//!
//! Opens the ledger, brings the knowledge index up, and serves the JSON API
//! the exercise UI talks to.

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::{
    config::Config,
    execution::PythonProcessRunner,
    ledger_db::LedgerDatabase,
    llm_client::OpenAiChatClient,
    shared_state::AppState,
};

pub async fn run_server(cfg: Config) -> anyhow::Result<()> {
    crate::telemetry::init_tracing("info");
    crate::metrics::init_metrics();
    cfg.print_config();

    // A ledger that cannot be opened aborts startup.
    let ledger_db = LedgerDatabase::open(&cfg.ledger_uri, &cfg.db_name, &cfg.collection_name)
        .with_context(|| format!("Failed to open ledger at {}", cfg.ledger_uri))?;

    let runner = Arc::new(PythonProcessRunner::new(
        cfg.python_bin.clone(),
        Duration::from_secs(cfg.exec_timeout_seconds),
    ));
    let backend = Arc::new(
        OpenAiChatClient::new(cfg.chat_base_url.clone(), cfg.openai_api_key.clone(), cfg.chat_model.clone())
            .with_temperature(cfg.chat_temperature),
    );

    let addr = cfg.api_addr()?;
    let state = AppState::initialize(cfg, ledger_db, runner, backend).await;

    info!("Starting HTTP server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, build_router(state)).await?;

    Ok(())
}

/// Upper bound on every route except `/assistance`.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

pub fn build_router(state: AppState) -> axum::Router {
    routes(state, REQUEST_TIMEOUT)
}

fn routes(state: AppState, request_timeout: Duration) -> axum::Router {
    use axum::{
        routing::{get, post},
        Router,
    };
    use tower_http::{
        cors::{Any, CorsLayer},
        timeout::TimeoutLayer,
        trace::TraceLayer,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers(Any);

    let timed = Router::new()
        .route("/execute", post(crate::api::execute))
        .route("/submit", post(crate::api::submit))
        .route("/task", get(crate::api::get_task))
        .route("/healthz", get(crate::api::healthz))
        .route("/metrics", get(crate::api::metrics))
        .layer(TimeoutLayer::new(request_timeout));

    // Untimed: a streamed answer may run long, and it is recorded even if the client leaves.
    Router::new()
        .merge(timed)
        .route("/assistance", post(crate::api::request_assistance))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
