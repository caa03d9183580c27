//! Context engine - builds chat transcripts and drives assistance requests

pub mod context_builder;
pub mod orchestrator;
pub mod prompt;

pub use context_builder::ContextBuilder;
pub use orchestrator::AssistanceOrchestrator;
pub use prompt::tutoring_instruction;
