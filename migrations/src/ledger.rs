//! Migration ledger
//!
//! A table in the live database recording every migration file that was
//! applied. A migration is applied when its row exists; rows are only ever
//! inserted.

use crate::driver::{ExecError, Executor};
use chrono::NaiveDateTime;
use std::collections::BTreeSet;

/// Default ledger table name
pub const DEFAULT_LEDGER_TABLE: &str = "migrations";

/// A row of the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRecord {
    pub filename: String,
    pub applied_at: NaiveDateTime,
}

/// The ledger table of one database
#[derive(Debug, Clone)]
pub struct Ledger {
    table: String,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new(DEFAULT_LEDGER_TABLE)
    }
}

impl Ledger {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
        }
    }

    /// Get the ledger table name
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Get the SQL to create the ledger table
    pub fn create_table_sql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (id INTEGER PRIMARY KEY AUTOINCREMENT, \
             filename TEXT NOT NULL UNIQUE, applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP);",
            self.table
        )
    }

    /// Create the ledger table if it is missing.
    ///
    /// A failed existence check is logged and answered by creating the table.
    pub fn ensure<E: Executor + ?Sized>(&self, conn: &mut E) -> Result<(), LedgerError> {
        match self.exists(conn) {
            Ok(true) => return Ok(()),
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(table = %self.table, error = %e, "could not read migration ledger, creating it");
            }
        }
        conn.execute_script(&self.create_table_sql())
            .map_err(|e| LedgerError::Create(e.0))?;
        tracing::info!(table = %self.table, "created migration ledger");
        Ok(())
    }

    fn exists<E: Executor + ?Sized>(&self, conn: &mut E) -> Result<bool, LedgerError> {
        conn.query_rows(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
            &[self.table.as_str()],
        )
        .map(|rows| !rows.is_empty())
        .map_err(|e| LedgerError::Access(e.0))
    }

    /// Every recorded filename
    pub fn applied<E: Executor + ?Sized>(&self, conn: &mut E) -> Result<BTreeSet<String>, LedgerError> {
        let rows = conn
            .query_rows(&format!("SELECT filename FROM {}", self.table), &[])
            .map_err(|e| LedgerError::Access(e.0))?;
        Ok(rows.into_iter().filter_map(|row| row.into_iter().next()).collect())
    }

    /// Every record in application order
    pub fn records<E: Executor + ?Sized>(&self, conn: &mut E) -> Result<Vec<MigrationRecord>, LedgerError> {
        let rows = conn
            .query_rows(
                &format!("SELECT filename, applied_at FROM {} ORDER BY id", self.table),
                &[],
            )
            .map_err(|e| LedgerError::Access(e.0))?;

        rows.into_iter()
            .map(|row| {
                let [filename, applied_at]: [String; 2] = row
                    .try_into()
                    .map_err(|_| LedgerError::Access("unexpected ledger row shape".into()))?;
                let applied_at = NaiveDateTime::parse_from_str(&applied_at, "%Y-%m-%d %H:%M:%S")
                    .map_err(|e| LedgerError::Access(format!("bad applied_at '{applied_at}': {e}")))?;
                Ok(MigrationRecord {
                    filename,
                    applied_at,
                })
            })
            .collect()
    }

    /// Run `sql` as one script and record `filename`.
    ///
    /// Nothing is recorded when the script fails. A transaction the script left
    /// open is rolled back first so the connection is usable again.
    pub fn apply<E: Executor + ?Sized>(
        &self,
        conn: &mut E,
        filename: &str,
        sql: &str,
    ) -> Result<(), ApplyError> {
        if let Err(ExecError(message)) = conn.execute_script(sql) {
            if !conn.is_autocommit() {
                if let Err(rollback) = conn.execute_script("ROLLBACK;") {
                    tracing::error!(file = %filename, error = %rollback, "rollback failed");
                }
            }
            return Err(ApplyError {
                filename: filename.to_string(),
                message,
            });
        }

        conn.execute(
            &format!("INSERT INTO {} (filename) VALUES (?1)", self.table),
            &[filename],
        )
        .map_err(|e| ApplyError {
            filename: filename.to_string(),
            message: format!("recording in ledger failed: {e}"),
        })?;

        tracing::info!(file = %filename, "applied migration");
        Ok(())
    }
}

/// Ledger access errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum LedgerError {
    #[error("Ledger access error: {0}")]
    Access(String),
    #[error("Could not create ledger: {0}")]
    Create(String),
}

/// A single migration failed to apply; it remains pending
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Migration {filename} failed: {message}")]
pub struct ApplyError {
    pub filename: String,
    pub message: String,
}

#[cfg(all(test, feature = "rusqlite"))]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn conn() -> Connection {
        Connection::open_in_memory().unwrap()
    }

    #[test]
    fn test_ensure_is_idempotent() {
        let mut conn = conn();
        let ledger = Ledger::default();
        ledger.ensure(&mut conn).unwrap();
        ledger.ensure(&mut conn).unwrap();
        assert!(ledger.applied(&mut conn).unwrap().is_empty());
    }

    #[test]
    fn test_applied_before_ensure_is_an_access_error() {
        let mut conn = conn();
        let err = Ledger::default().applied(&mut conn).unwrap_err();
        assert!(matches!(err, LedgerError::Access(_)));
    }

    #[test]
    fn test_apply_records_filename() {
        let mut conn = conn();
        let ledger = Ledger::new("schema_history");
        ledger.ensure(&mut conn).unwrap();
        ledger
            .apply(&mut conn, "1_up.sql", "CREATE TABLE a (id INTEGER);")
            .unwrap();

        let applied = ledger.applied(&mut conn).unwrap();
        assert!(applied.contains("1_up.sql"));

        let records = ledger.records(&mut conn).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].filename, "1_up.sql");
    }

    #[test]
    fn test_failed_script_is_not_recorded_and_rolls_back() {
        let mut conn = conn();
        let ledger = Ledger::default();
        ledger.ensure(&mut conn).unwrap();
        conn.execute_script("CREATE TABLE keep (id INTEGER);").unwrap();

        let err = ledger
            .apply(
                &mut conn,
                "2_up.sql",
                "BEGIN TRANSACTION;\nALTER TABLE keep RENAME TO keep_old;\nNOT VALID SQL;\nCOMMIT;",
            )
            .unwrap_err();
        assert_eq!(err.filename, "2_up.sql");
        assert!(ledger.applied(&mut conn).unwrap().is_empty());
        assert!(Executor::is_autocommit(&conn));

        let rows = conn
            .query_rows("SELECT name FROM sqlite_master WHERE name = 'keep'", &[])
            .unwrap();
        assert_eq!(rows.len(), 1);
    }
}
