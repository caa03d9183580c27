//! Assistance orchestrator: prompt, gateway, aggregation, ledger.

use futures_util::StreamExt;
use std::sync::Arc;
use tracing::{debug, info};

use super::context_builder::ContextBuilder;
use super::prompt::tutoring_instruction;
use crate::error::{TutorError, TutorResult};
use crate::knowledge::KnowledgeGateway;
use crate::ledger_db::{SubmissionKind, SubmissionLedger};
use crate::task::TaskDescription;

pub struct AssistanceOrchestrator {
    gateway: Arc<KnowledgeGateway>,
    ledger: Arc<SubmissionLedger>,
    task: TaskDescription,
}

impl AssistanceOrchestrator {
    pub fn new(gateway: Arc<KnowledgeGateway>, ledger: Arc<SubmissionLedger>, task: TaskDescription) -> Self {
        Self { gateway, ledger, task }
    }

    /// Ask the tutor about `code_input` and record the reply.
    ///
    /// Each request starts from an empty history. Generation and the ledger
    /// write run on their own task, so dropping the returned future does not
    /// abort them. Gateway failures propagate and leave the ledger untouched.
    pub async fn request_assistance(&self, user_id: &str, code_input: &str) -> TutorResult<(String, String)> {
        let instruction = tutoring_instruction(&self.task, code_input);
        let gateway = Arc::clone(&self.gateway);
        let ledger = Arc::clone(&self.ledger);
        let (user, code) = (user_id.to_string(), code_input.to_string());

        tokio::spawn(async move {
            let response = drain_answer(&gateway, &instruction).await?;
            info!("Assistance for user {} aggregated ({} bytes)", user, response.len());

            let reply = response.clone();
            let code = tokio::task::spawn_blocking(move || {
                ledger
                    .record(&user, &code, Some(&reply), SubmissionKind::GetAssistance)
                    .map(|_| code)
            })
            .await
            .map_err(TutorError::storage)??;
            Ok((code, response))
        })
        .await
        .map_err(|e| TutorError::gateway(format!("assistance task failed: {}", e)))?
    }
}

/// Concatenate every fragment of one answer, in order.
async fn drain_answer(gateway: &KnowledgeGateway, instruction: &str) -> TutorResult<String> {
    let context = ContextBuilder::build(&[]);
    let mut fragments = gateway.answer(instruction, &context).await?;
    let mut response = String::new();
    let mut count = 0usize;
    while let Some(fragment) = fragments.next().await {
        let fragment = fragment?;
        debug!("Received fragment of {} bytes", fragment.len());
        response.push_str(&fragment);
        count += 1;
    }
    crate::metrics::add_fragments(count);
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger_db::LedgerDatabase;
    use crate::llm_client::ScriptedBackend;
    use crate::message::Role;
    use std::fs;
    use std::time::Duration;

    struct Fixture {
        orchestrator: AssistanceOrchestrator,
        backend: Arc<ScriptedBackend>,
        db: LedgerDatabase,
        _root: tempfile::TempDir,
    }

    fn fixture(backend: ScriptedBackend) -> Fixture {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("data")).unwrap();
        fs::write(root.path().join("data/guide.md"), "Use split and float to convert time strings.").unwrap();

        let backend = Arc::new(backend);
        let gateway = Arc::new(KnowledgeGateway::new(
            root.path().join("data"),
            root.path().join("storage"),
            2,
            backend.clone(),
        ));
        let db = LedgerDatabase::new_in_memory("submissions").unwrap();
        let ledger = Arc::new(SubmissionLedger::new(db.submissions.clone()));
        Fixture {
            orchestrator: AssistanceOrchestrator::new(gateway, ledger, TaskDescription::default()),
            backend,
            db,
            _root: root,
        }
    }

    #[tokio::test]
    async fn test_round_trip_records_aggregated_answer() {
        let fx = fixture(ScriptedBackend::new(&["You evaluated print(1). ", "It prints ", "a constant."]));

        let (code, answer) = fx.orchestrator.request_assistance("learner-1", "print(1)").await.unwrap();

        assert_eq!(code, "print(1)");
        assert_eq!(answer, "You evaluated print(1). It prints a constant.");
        let records = fx.db.submissions.load_all().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].submission_kind, SubmissionKind::GetAssistance);
        assert_eq!(records[0].code_input, "print(1)");
        assert_eq!(records[0].assistance_response.as_deref(), Some(answer.as_str()));
    }

    #[tokio::test]
    async fn test_history_is_discarded_between_requests() {
        let fx = fixture(ScriptedBackend::new(&["ok"]));
        fx.orchestrator.request_assistance("u", "x = 1").await.unwrap();
        fx.orchestrator.request_assistance("u", "x = 2").await.unwrap();

        let sent = fx.backend.received.lock().unwrap();
        for messages in sent.iter() {
            let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
            assert_eq!(roles, vec![Role::System, Role::User]);
        }
        assert!(sent[1][1].content.contains("x = 2"));
        assert!(!sent[1][1].content.contains("x = 1"));
    }

    #[tokio::test]
    async fn test_dropped_caller_still_records_once() {
        let fx = fixture(ScriptedBackend::new(&["first ", "second"]).with_delay(Duration::from_millis(300)));

        let outcome = tokio::time::timeout(
            Duration::from_millis(100),
            fx.orchestrator.request_assistance("u", "print(1)"),
        )
        .await;
        assert!(outcome.is_err());

        tokio::time::sleep(Duration::from_millis(900)).await;
        let records = fx.db.submissions.load_all().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].assistance_response.as_deref(), Some("first second"));
    }

    #[tokio::test]
    async fn test_gateway_failure_propagates_without_record() {
        let fx = fixture(ScriptedBackend::failing());

        let err = fx.orchestrator.request_assistance("u", "print(1)").await.unwrap_err();

        assert!(matches!(err, TutorError::GatewayFailure(_)));
        assert!(fx.db.submissions.load_all().unwrap().is_empty());
    }
}
