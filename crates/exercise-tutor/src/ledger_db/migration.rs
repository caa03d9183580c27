//! Ledger schema migrations

use rusqlite::{Connection, Result};
use tracing::{error, info};

use crate::ledger_db::schema;

/// Applies versioned schema changes to one collection
pub struct MigrationManager<'a> {
    conn: &'a mut Connection,
    collection: &'a str,
}

impl<'a> MigrationManager<'a> {
    pub fn new(conn: &'a mut Connection, collection: &'a str) -> Self {
        Self { conn, collection }
    }

    /// Create the version table if needed and bring the collection up to date
    pub fn initialize_database(&mut self) -> Result<()> {
        info!("Initializing ledger schema for collection '{}'...", self.collection);

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_version (
                collection TEXT NOT NULL,
                version INTEGER NOT NULL,
                applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (collection, version)
            )",
            [],
        )?;

        let current_version = self.get_current_version()?;
        info!("Current ledger schema version: {}", current_version);

        self.apply_migrations(current_version)
    }

    fn apply_migrations(&mut self, current_version: i32) -> Result<()> {
        for (version, migration_sql) in get_migrations(self.collection) {
            if version > current_version {
                info!("Applying ledger migration {}...", version);

                let tx = self.conn.transaction()?;

                if let Err(e) = tx.execute_batch(&migration_sql) {
                    error!("Failed to apply ledger migration {}: {}", version, e);
                    return Err(e);
                }

                tx.execute(
                    "INSERT INTO schema_version (collection, version) VALUES (?1, ?2)",
                    rusqlite::params![self.collection, version],
                )?;

                tx.commit()?;

                info!("Ledger migration {} applied successfully", version);
            }
        }

        Ok(())
    }

    pub fn get_current_version(&self) -> Result<i32> {
        self.conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version WHERE collection = ?1",
            [self.collection],
            |row| row.get(0),
        )
    }
}

fn get_migrations(collection: &str) -> Vec<(i32, String)> {
    vec![(1, schema::collection_schema_sql(collection))]
}
