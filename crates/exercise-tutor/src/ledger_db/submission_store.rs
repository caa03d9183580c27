use crate::error::{TutorError, TutorResult};
use crate::ledger_db::schema::*;
use chrono::{DateTime, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Row};
use std::sync::Arc;
use tracing::debug;

/// Durable destination for ledger records.
pub trait LedgerStore: Send + Sync {
    /// Append one record. Records are never updated or deleted afterwards.
    fn insert(&self, record: &SubmissionRecord) -> TutorResult<()>;
}

/// SQLite-backed collection of submission records
pub struct SubmissionStore {
    pool: Arc<Pool<SqliteConnectionManager>>,
    collection: String,
}

impl SubmissionStore {
    pub fn new(pool: Arc<Pool<SqliteConnectionManager>>, collection: impl Into<String>) -> Self {
        Self {
            pool,
            collection: collection.into(),
        }
    }

    fn get_conn(&self) -> anyhow::Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| anyhow::anyhow!("Failed to get connection from pool: {}", e))
    }

    /// All records in insertion order. Read side for audit and grading tools.
    pub fn load_all(&self) -> anyhow::Result<Vec<SubmissionRecord>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT user_id, sequence_number, submission_kind, recorded_at, code_input, assistance_response
             FROM {} ORDER BY id ASC",
            self.collection
        ))?;

        let mut rows = stmt.query([])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(Self::row_to_record(row)?);
        }
        Ok(records)
    }

    /// Number of records per kind, in `SubmissionKind::ALL` order.
    pub fn count_by_kind(&self) -> anyhow::Result<Vec<(SubmissionKind, i64)>> {
        let conn = self.get_conn()?;
        let mut counts = Vec::with_capacity(SubmissionKind::ALL.len());
        for kind in SubmissionKind::ALL {
            let count: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM {} WHERE submission_kind = ?1", self.collection),
                [kind.as_str()],
                |row| row.get(0),
            )?;
            counts.push((kind, count));
        }
        Ok(counts)
    }

    fn row_to_record(row: &Row<'_>) -> anyhow::Result<SubmissionRecord> {
        let kind_str: String = row.get(2)?;
        let recorded_at_str: String = row.get(3)?;
        let recorded_at = DateTime::parse_from_rfc3339(&recorded_at_str)
            .map_err(|e| anyhow::anyhow!("Failed to parse timestamp: {}", e))?
            .with_timezone(&Utc);

        Ok(SubmissionRecord {
            user_id: row.get(0)?,
            sequence_number: row.get(1)?,
            submission_kind: kind_str.parse().map_err(anyhow::Error::msg)?,
            recorded_at,
            code_input: row.get(4)?,
            assistance_response: row.get(5)?,
        })
    }
}

impl LedgerStore for SubmissionStore {
    fn insert(&self, record: &SubmissionRecord) -> TutorResult<()> {
        let conn = self.get_conn().map_err(TutorError::storage)?;
        conn.execute(
            &format!(
                "INSERT INTO {}
                 (user_id, sequence_number, submission_kind, recorded_at, code_input, assistance_response)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                self.collection
            ),
            params![
                record.user_id,
                record.sequence_number,
                record.submission_kind.as_str(),
                record.recorded_at.to_rfc3339(),
                record.code_input,
                record.assistance_response,
            ],
        )
        .map_err(TutorError::storage)?;

        debug!(
            "Inserted record #{} into collection {}",
            record.sequence_number, self.collection
        );
        Ok(())
    }
}
