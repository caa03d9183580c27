//! Submission ledger - append-only SQLite storage of learner actions
pub mod schema;
pub mod migration;
pub mod submission_store;
pub use schema::*;
pub use migration::MigrationManager;
pub use submission_store::{LedgerStore, SubmissionStore};

use crate::error::{TutorError, TutorResult};
use chrono::{Duration, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::info;

/// Connection pool plus the store for one configured collection
pub struct LedgerDatabase {
    pub submissions: Arc<SubmissionStore>,
    pool: Arc<Pool<SqliteConnectionManager>>,
}

impl LedgerDatabase {
    /// Open the store named by a connection string.
    ///
    /// `:memory:` opens a private in-memory database; anything else (optionally
    /// prefixed with `sqlite://`) is a directory holding `<db_name>.db`.
    pub fn open(uri: &str, db_name: &str, collection: &str) -> anyhow::Result<Self> {
        match resolve_db_path(uri, db_name) {
            Some(path) => Self::new(&path, collection),
            None => Self::new_in_memory(collection),
        }
    }

    pub fn new(db_path: &Path, collection: &str) -> anyhow::Result<Self> {
        info!("Opening ledger database at: {}", db_path.display());
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let manager = SqliteConnectionManager::file(db_path).with_flags(
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_FULL_MUTEX,
        );
        let pool = Pool::builder()
            .max_size(4)
            .build(manager)
            .map_err(|e| anyhow::anyhow!("Failed to create connection pool: {}", e))?;

        {
            let mut conn = pool.get()?;
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA busy_timeout = 5000;",
            )?;
            MigrationManager::new(&mut conn, collection).initialize_database()?;
        }

        let pool = Arc::new(pool);
        info!("Ledger database initialized successfully");
        Ok(Self {
            submissions: Arc::new(SubmissionStore::new(Arc::clone(&pool), collection)),
            pool,
        })
    }

    /// Every `:memory:` connection is its own database, so the pool holds one.
    pub fn new_in_memory(collection: &str) -> anyhow::Result<Self> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder().max_size(1).build(manager)?;
        {
            let mut conn = pool.get()?;
            MigrationManager::new(&mut conn, collection).initialize_database()?;
        }
        let pool = Arc::new(pool);
        Ok(Self {
            submissions: Arc::new(SubmissionStore::new(Arc::clone(&pool), collection)),
            pool,
        })
    }
}

impl Drop for LedgerDatabase {
    fn drop(&mut self) {
        if let Ok(conn) = self.pool.get() {
            let _ = conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);");
        }
    }
}

fn resolve_db_path(uri: &str, db_name: &str) -> Option<PathBuf> {
    let location = uri.strip_prefix("sqlite://").unwrap_or(uri);
    if location == ":memory:" {
        return None;
    }
    Some(Path::new(location).join(format!("{}.db", db_name)))
}

/// Append-only record of learner actions.
///
/// Owns the per-process sequence counter. The counter starts at zero with
/// every process and is never restored from storage.
pub struct SubmissionLedger {
    store: Arc<dyn LedgerStore>,
    last_sequence: Mutex<i64>,
}

impl SubmissionLedger {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self {
            store,
            last_sequence: Mutex::new(0),
        }
    }

    /// Assign the next sequence number and persist one record.
    ///
    /// The lock is held across the insert so numbers reach storage in order.
    /// A failed insert does not consume a number.
    pub fn record(
        &self,
        user_id: &str,
        code_input: &str,
        assistance_response: Option<&str>,
        kind: SubmissionKind,
    ) -> TutorResult<SubmissionRecord> {
        let mut last = self
            .last_sequence
            .lock()
            .map_err(|_| TutorError::StorageWriteFailure("ledger counter lock poisoned".to_string()))?;

        let record = SubmissionRecord {
            user_id: user_id.to_string(),
            sequence_number: *last + 1,
            submission_kind: kind,
            recorded_at: Utc::now() + Duration::hours(RECORDED_AT_SKEW_HOURS),
            code_input: code_input.to_string(),
            assistance_response: assistance_response.map(str::to_string),
        };

        self.store.insert(&record)?;
        *last = record.sequence_number;
        crate::metrics::inc_submission(kind);

        info!(
            "Stored {} submission for user {} with input number {}",
            kind, user_id, record.sequence_number
        );
        Ok(record)
    }

    /// Highest sequence number handed out so far in this process.
    pub fn last_sequence(&self) -> i64 {
        self.last_sequence.lock().map(|n| *n).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn ledger_with_db() -> (SubmissionLedger, LedgerDatabase) {
        let db = LedgerDatabase::new_in_memory("submissions").unwrap();
        let ledger = SubmissionLedger::new(db.submissions.clone());
        (ledger, db)
    }

    /// Store that rejects writes while `failing` is set.
    struct FlakyStore {
        inner: Arc<SubmissionStore>,
        failing: AtomicBool,
    }

    impl LedgerStore for FlakyStore {
        fn insert(&self, record: &SubmissionRecord) -> TutorResult<()> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(TutorError::storage("disk full"));
            }
            self.inner.insert(record)
        }
    }

    #[test]
    fn test_sequence_numbers_are_one_to_n_across_users_and_kinds() {
        let (ledger, db) = ledger_with_db();
        let calls = [
            ("alice", SubmissionKind::Execute),
            ("bob", SubmissionKind::Submit),
            ("alice", SubmissionKind::GetAssistance),
            ("carol", SubmissionKind::Execute),
            ("bob", SubmissionKind::Execute),
        ];
        for (user, kind) in calls {
            let help = (kind == SubmissionKind::GetAssistance).then_some("hint");
            ledger.record(user, "print(1)", help, kind).unwrap();
        }

        let records = db.submissions.load_all().unwrap();
        let numbers: Vec<i64> = records.iter().map(|r| r.sequence_number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4, 5]);
        assert_eq!(records[1].user_id, "bob");
        assert_eq!(records[2].submission_kind, SubmissionKind::GetAssistance);
        assert_eq!(ledger.last_sequence(), 5);
    }

    #[test]
    fn test_record_applies_recorded_at_skew() {
        let (ledger, _db) = ledger_with_db();
        let before = Utc::now();
        let record = ledger.record("u", "x = 1", None, SubmissionKind::Submit).unwrap();
        let after = Utc::now();

        assert!(record.recorded_at >= before + Duration::hours(1));
        assert!(record.recorded_at <= after + Duration::hours(1));
    }

    #[test]
    fn test_stored_fields_round_trip() {
        let (ledger, db) = ledger_with_db();
        let written = ledger
            .record("learner-7", "def f():\n    pass", Some("Looks close."), SubmissionKind::GetAssistance)
            .unwrap();

        let stored = db.submissions.load_all().unwrap();
        assert_eq!(stored, vec![written]);
        assert_eq!(stored[0].assistance_response.as_deref(), Some("Looks close."));
    }

    #[test]
    fn test_failed_write_surfaces_and_keeps_counter() {
        let db = LedgerDatabase::new_in_memory("submissions").unwrap();
        let store = Arc::new(FlakyStore {
            inner: db.submissions.clone(),
            failing: AtomicBool::new(false),
        });
        let ledger = SubmissionLedger::new(store.clone());

        ledger.record("u", "a", None, SubmissionKind::Execute).unwrap();
        store.failing.store(true, Ordering::SeqCst);
        let err = ledger.record("u", "b", None, SubmissionKind::Execute).unwrap_err();
        assert!(matches!(err, TutorError::StorageWriteFailure(_)));

        store.failing.store(false, Ordering::SeqCst);
        let next = ledger.record("u", "c", None, SubmissionKind::Execute).unwrap();
        assert_eq!(next.sequence_number, 2);
    }

    #[test]
    fn test_concurrent_writers_get_distinct_ordered_numbers() {
        let (ledger, db) = ledger_with_db();
        let ledger = Arc::new(ledger);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let ledger = ledger.clone();
                std::thread::spawn(move || {
                    for _ in 0..10 {
                        ledger
                            .record(&format!("user-{}", i), "pass", None, SubmissionKind::Execute)
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let numbers: Vec<i64> = db
            .submissions
            .load_all()
            .unwrap()
            .iter()
            .map(|r| r.sequence_number)
            .collect();
        assert_eq!(numbers, (1..=80).collect::<Vec<_>>());
    }

    #[test]
    fn test_count_by_kind() {
        let (ledger, db) = ledger_with_db();
        ledger.record("u", "a", None, SubmissionKind::Execute).unwrap();
        ledger.record("u", "a", None, SubmissionKind::Execute).unwrap();
        ledger.record("u", "a", None, SubmissionKind::Submit).unwrap();

        let counts = db.submissions.count_by_kind().unwrap();
        assert_eq!(
            counts,
            vec![
                (SubmissionKind::Execute, 2),
                (SubmissionKind::Submit, 1),
                (SubmissionKind::GetAssistance, 0),
            ]
        );
    }

    #[test]
    fn test_file_backed_ledger_creates_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let uri = format!("sqlite://{}", dir.path().display());
        {
            let db = LedgerDatabase::open(&uri, "course", "submissions").unwrap();
            let ledger = SubmissionLedger::new(db.submissions.clone());
            ledger.record("u", "print(7)", None, SubmissionKind::Execute).unwrap();
        }
        assert!(dir.path().join("course.db").exists());

        // A fresh process starts counting again from 1.
        let db = LedgerDatabase::open(&uri, "course", "submissions").unwrap();
        let ledger = SubmissionLedger::new(db.submissions.clone());
        let record = ledger.record("u", "print(8)", None, SubmissionKind::Execute).unwrap();
        assert_eq!(record.sequence_number, 1);
        assert_eq!(db.submissions.load_all().unwrap().len(), 2);
    }

    #[test]
    fn test_resolve_db_path() {
        assert_eq!(resolve_db_path(":memory:", "x"), None);
        assert_eq!(resolve_db_path("sqlite://:memory:", "x"), None);
        assert_eq!(
            resolve_db_path("sqlite:///srv/ledger", "course"),
            Some(PathBuf::from("/srv/ledger/course.db"))
        );
    }
}
