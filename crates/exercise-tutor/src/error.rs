//! Error taxonomy for the tutoring core.
//!
//! `ExecutionFault` is recovered inside the execution adapter and turned into
//! learner-facing text. Everything else propagates to the caller.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TutorError {
    /// Learner code raised at runtime.
    #[error("{0}")]
    ExecutionFault(String),

    /// The chat backend (or the index feeding it) failed mid-request.
    #[error("chat backend failure: {0}")]
    GatewayFailure(String),

    /// Neither a corpus nor a persisted index could be read at startup.
    #[error(
        "knowledge corpus unavailable: no readable documents in {} and no persisted index in {}",
        corpus_dir.display(),
        index_dir.display()
    )]
    CorpusUnavailable {
        corpus_dir: PathBuf,
        index_dir: PathBuf,
    },

    /// The ledger could not persist a record.
    #[error("ledger write failed: {0}")]
    StorageWriteFailure(String),

    /// A persisted index exists but cannot be decoded or written.
    #[error("knowledge index format error: {0}")]
    IndexFormat(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A caller sent a request the core cannot act on.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl TutorError {
    pub fn gateway(err: impl std::fmt::Display) -> Self {
        TutorError::GatewayFailure(err.to_string())
    }

    pub fn storage(err: impl std::fmt::Display) -> Self {
        TutorError::StorageWriteFailure(err.to_string())
    }
}

pub type TutorResult<T> = Result<T, TutorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corpus_unavailable_names_both_locations() {
        let err = TutorError::CorpusUnavailable {
            corpus_dir: PathBuf::from("./data"),
            index_dir: PathBuf::from("./storage"),
        };
        let text = err.to_string();
        assert!(text.contains("./data"));
        assert!(text.contains("./storage"));
    }

    #[test]
    fn test_execution_fault_displays_bare_description() {
        let err = TutorError::ExecutionFault("division by zero".to_string());
        assert_eq!(err.to_string(), "division by zero");
    }

    #[test]
    fn test_helper_constructors() {
        assert!(matches!(TutorError::gateway("timeout"), TutorError::GatewayFailure(m) if m == "timeout"));
        assert!(matches!(TutorError::storage("disk full"), TutorError::StorageWriteFailure(m) if m == "disk full"));
    }
}
