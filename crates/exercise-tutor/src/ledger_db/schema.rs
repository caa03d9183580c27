//! Record types and table layout for the submission ledger
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Hours added to the capture time before a record is written.
pub const RECORDED_AT_SKEW_HOURS: i64 = 1;

/// Which learner action produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionKind {
    Execute,
    Submit,
    GetAssistance,
}

impl SubmissionKind {
    pub const ALL: [SubmissionKind; 3] = [
        SubmissionKind::Execute,
        SubmissionKind::Submit,
        SubmissionKind::GetAssistance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionKind::Execute => "execute",
            SubmissionKind::Submit => "submit",
            SubmissionKind::GetAssistance => "get_assistance",
        }
    }
}

impl fmt::Display for SubmissionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubmissionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SubmissionKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown submission kind: {}", s))
    }
}

/// One immutable ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub user_id: String,
    pub sequence_number: i64,
    pub submission_kind: SubmissionKind,
    pub recorded_at: DateTime<Utc>,
    pub code_input: String,
    pub assistance_response: Option<String>,
}

/// DDL for one collection. `collection` must already be a validated identifier.
///
/// `sequence_number` is not unique: the counter restarts at 1 with every
/// process, so numbers repeat across runs.
pub fn collection_schema_sql(collection: &str) -> String {
    format!(
        "
-- Submission records
CREATE TABLE IF NOT EXISTS {collection} (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    sequence_number INTEGER NOT NULL,
    submission_kind TEXT NOT NULL CHECK (submission_kind IN ('execute', 'submit', 'get_assistance')),
    recorded_at TIMESTAMP NOT NULL,
    code_input TEXT NOT NULL,
    assistance_response TEXT
);
"
    )
}
