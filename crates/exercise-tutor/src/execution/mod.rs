//! Execution adapter - runs learner code and records every attempt
pub mod runner;

pub use runner::{CodeRunner, PythonProcessRunner, RunOutcome};

use std::sync::Arc;
use tracing::info;

use crate::error::{TutorError, TutorResult};
use crate::ledger_db::{SubmissionKind, SubmissionLedger};

pub struct ExecutionAdapter {
    runner: Arc<dyn CodeRunner>,
    ledger: Arc<SubmissionLedger>,
}

impl ExecutionAdapter {
    pub fn new(runner: Arc<dyn CodeRunner>, ledger: Arc<SubmissionLedger>) -> Self {
        Self { runner, ledger }
    }

    /// Run `code_input` and return its captured output, or `Error: <description>`
    /// when it faults. Both outcomes are recorded as an `execute` submission.
    ///
    /// The run and the ledger write happen on their own task; dropping the
    /// returned future neither kills the run nor skips the record. Only ledger
    /// failures are returned as errors.
    pub async fn execute(&self, code_input: &str, user_id: &str) -> TutorResult<String> {
        let runner = Arc::clone(&self.runner);
        let ledger = Arc::clone(&self.ledger);
        let (user, code) = (user_id.to_string(), code_input.to_string());

        tokio::spawn(async move {
            let output = match runner.run(&code).await.into_result() {
                Ok(stdout) => stdout,
                Err(TutorError::ExecutionFault(description)) => {
                    info!("Execution for user {} faulted: {}", user, description);
                    format!("Error: {}", description)
                }
                Err(other) => return Err(other),
            };
            record(ledger, user, code, SubmissionKind::Execute).await?;
            Ok(output)
        })
        .await
        .map_err(|e| TutorError::ExecutionFault(format!("execution task failed: {}", e)))?
    }

    /// Record a graded submission. Nothing is run.
    pub async fn submit(&self, code_input: &str, user_id: &str) -> TutorResult<()> {
        record(
            Arc::clone(&self.ledger),
            user_id.to_string(),
            code_input.to_string(),
            SubmissionKind::Submit,
        )
        .await
    }
}

/// Blocking ledger write on the blocking pool. Once started it runs to completion.
async fn record(ledger: Arc<SubmissionLedger>, user: String, code: String, kind: SubmissionKind) -> TutorResult<()> {
    tokio::task::spawn_blocking(move || ledger.record(&user, &code, None, kind))
        .await
        .map_err(TutorError::storage)??;
    Ok(())
}
