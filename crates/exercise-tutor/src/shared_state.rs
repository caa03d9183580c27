//! Shared application state
//!
//! Everything a request handler needs, wired once at startup and handed to
//! axum by `Arc`. The assistance feature is optional: it is only present when
//! the knowledge index reached `Ready`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    config::Config,
    context_engine::AssistanceOrchestrator,
    execution::{CodeRunner, ExecutionAdapter},
    knowledge::KnowledgeGateway,
    ledger_db::{LedgerDatabase, SubmissionLedger},
    llm_client::ChatBackend,
    task::TaskDescription,
};

/// Lock-free per-action counters for health reporting
#[derive(Debug, Default)]
pub struct AtomicCounters {
    pub total_requests: AtomicUsize,
    pub executions: AtomicUsize,
    pub submissions: AtomicUsize,
    pub assistance_requests: AtomicUsize,
}

impl AtomicCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_total_requests(&self) -> usize {
        self.total_requests.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn inc_executions(&self) -> usize {
        self.executions.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn inc_submissions(&self) -> usize {
        self.submissions.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn inc_assistance_requests(&self) -> usize {
        self.assistance_requests.fetch_add(1, Ordering::Relaxed) + 1
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Held so the database outlives every handler.
    pub ledger_db: Arc<LedgerDatabase>,
    pub ledger: Arc<SubmissionLedger>,
    pub execution: Arc<ExecutionAdapter>,
    pub assistance: Option<Arc<AssistanceOrchestrator>>,
    pub task: TaskDescription,
    pub counters: Arc<AtomicCounters>,
}

impl AppState {
    /// Wire the core components and bring the knowledge index to `Ready`.
    ///
    /// An index that cannot be built or loaded disables assistance for the
    /// lifetime of the process; execution and submission stay available.
    pub async fn initialize(
        config: Config,
        ledger_db: LedgerDatabase,
        runner: Arc<dyn CodeRunner>,
        backend: Arc<dyn ChatBackend>,
    ) -> Self {
        let ledger_db = Arc::new(ledger_db);
        let ledger = Arc::new(SubmissionLedger::new(ledger_db.submissions.clone()));
        let execution = Arc::new(ExecutionAdapter::new(runner, Arc::clone(&ledger)));
        let task = TaskDescription::new(config.task_description.clone());

        let gateway = Arc::new(KnowledgeGateway::new(
            config.corpus_dir.clone(),
            config.index_dir.clone(),
            config.retrieval_top_k,
            backend,
        ));
        let assistance = match gateway.ready().await {
            Ok(index) => {
                info!("Knowledge index ready with {} chunks", index.len());
                Some(Arc::new(AssistanceOrchestrator::new(
                    gateway,
                    Arc::clone(&ledger),
                    task.clone(),
                )))
            }
            Err(e) => {
                warn!("Assistance disabled: {}", e);
                None
            }
        };

        Self {
            config: Arc::new(config),
            ledger_db,
            ledger,
            execution,
            assistance,
            task,
            counters: Arc::new(AtomicCounters::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::RunOutcome;
    use crate::llm_client::ScriptedBackend;
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct EchoRunner;

    #[async_trait]
    impl CodeRunner for EchoRunner {
        async fn run(&self, source: &str) -> RunOutcome {
            RunOutcome::success(source)
        }
    }

    fn config(root: &std::path::Path) -> Config {
        let corpus = root.join("data").display().to_string();
        let index = root.join("storage").display().to_string();
        let env: HashMap<&str, String> = [
            ("LEDGER_URI", ":memory:".to_string()),
            ("DB_NAME", "course".to_string()),
            ("COLLECTION_NAME", "submissions".to_string()),
            ("OPENAI_API_KEY", "sk-test".to_string()),
            ("CORPUS_DIR", corpus),
            ("INDEX_DIR", index),
        ]
        .into_iter()
        .collect();
        Config::from_lookup(|k| env.get(k).cloned()).unwrap()
    }

    #[tokio::test]
    async fn test_missing_corpus_disables_only_assistance() {
        let root = tempfile::tempdir().unwrap();
        let db = LedgerDatabase::new_in_memory("submissions").unwrap();
        let state = AppState::initialize(
            config(root.path()),
            db,
            Arc::new(EchoRunner),
            Arc::new(ScriptedBackend::new(&[])),
        )
        .await;

        assert!(state.assistance.is_none());
        assert_eq!(state.execution.execute("hi", "u").await.unwrap(), "hi");
        assert_eq!(state.ledger.last_sequence(), 1);
    }

    #[tokio::test]
    async fn test_corpus_present_enables_assistance() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("data")).unwrap();
        std::fs::write(root.path().join("data/guide.txt"), "split the string on the colon").unwrap();
        let db = LedgerDatabase::new_in_memory("submissions").unwrap();

        let state = AppState::initialize(
            config(root.path()),
            db,
            Arc::new(EchoRunner),
            Arc::new(ScriptedBackend::new(&["hint"])),
        )
        .await;

        assert!(state.assistance.is_some());
        assert!(state.task.as_str().contains("time_to_seconds"));
    }

    #[test]
    fn test_counters_increment() {
        let counters = AtomicCounters::new();
        assert_eq!(counters.inc_total_requests(), 1);
        assert_eq!(counters.inc_total_requests(), 2);
        assert_eq!(counters.inc_executions(), 1);
    }
}
