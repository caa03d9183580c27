// exercise-tutor/crates/exercise-tutor/src/lib.rs

pub mod config;
pub mod context_engine;
pub mod error;
pub mod execution;
pub mod knowledge;
pub mod ledger_db;
pub mod llm_client;
pub mod message;
pub mod metrics;
pub mod shared_state;
pub mod task;
pub mod telemetry;
pub mod utils;

#[cfg(feature = "cli")]
pub mod api;
#[cfg(feature = "cli")]
pub mod server;

// Public API exports
pub use config::Config;
pub use context_engine::{AssistanceOrchestrator, ContextBuilder};
pub use error::{TutorError, TutorResult};
pub use execution::{CodeRunner, ExecutionAdapter, PythonProcessRunner, RunOutcome};
pub use knowledge::{GatewayState, KnowledgeGateway, KnowledgeIndex};
pub use ledger_db::{LedgerDatabase, SubmissionKind, SubmissionLedger, SubmissionRecord};
pub use llm_client::{ChatBackend, FragmentStream, OpenAiChatClient};
pub use message::{Message, MessagePair, Role};
pub use task::TaskDescription;

#[cfg(feature = "cli")]
pub use server::{build_router, run_server};
