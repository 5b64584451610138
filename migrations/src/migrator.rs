//! Migration runner
//!
//! Provides utilities to:
//! - Apply pending migrations in dependency-aware concurrent batches
//! - Report per-file status against the ledger
//! - Revert the most recent migration through its down file
//! - Generate the next migration from the live database (rusqlite)

use crate::batch::{self, Poisoned};
use crate::config::{ConfigError, VeloriaConfig};
use crate::driver::{ExecError, Executor};
use crate::ledger::{ApplyError, Ledger, LedgerError, MigrationRecord};
use crate::snapshot::SnapshotError;
use crate::sqlite::introspect::IntrospectError;
use crate::writer::{MigrationError, MigrationFile, MigrationStore, StoreError, DOWN_SUFFIX, UP_SUFFIX};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinSet;

/// Keeps `ALTER TABLE .. RENAME TO` from rewriting references held by other
/// tables. SQLite only honours the legacy rename with enforcement off.
const SESSION_PRAGMAS: &str = "PRAGMA foreign_keys = OFF;\nPRAGMA legacy_alter_table = ON;";

/// Where a migration file stands against the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationState {
    Pending,
    Applied,
}

/// Status line for one up file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    pub filename: String,
    pub state: MigrationState,
    /// Its down file has been applied
    pub reverted: bool,
}

/// Outcome of [`Migrator::migrate`], each list in batch order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrateReport {
    pub applied: Vec<String>,
    pub failed: Vec<ApplyError>,
    /// Not attempted because an earlier migration touching the same resources failed
    pub skipped: Vec<String>,
}

impl MigrateReport {
    /// Whether every pending migration was applied
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }
}

/// Runtime migrator over one database connection
pub struct Migrator<E: Executor> {
    conn: Arc<Mutex<E>>,
    store: MigrationStore,
    ledger: Ledger,
}

impl<E: Executor> Migrator<E> {
    /// Create a migrator for `conn` reading migrations from `dir`
    pub fn new(conn: E, dir: impl Into<PathBuf>) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            store: MigrationStore::new(dir),
            ledger: Ledger::default(),
        }
    }

    /// Create a migrator using the directory and ledger table from configuration
    pub fn from_config(conn: E, config: &VeloriaConfig) -> Self {
        Self::new(conn, config.migrations_dir()).with_ledger_table(config.ledger_table.clone())
    }

    /// Use a different ledger table
    pub fn with_ledger_table(mut self, table: impl Into<String>) -> Self {
        self.ledger = Ledger::new(table);
        self
    }

    pub fn store(&self) -> &MigrationStore {
        &self.store
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// The shared connection; hold the lock only briefly
    pub fn connection(&self) -> &Arc<Mutex<E>> {
        &self.conn
    }

    fn lock(&self) -> Result<MutexGuard<'_, E>, MigratorError> {
        self.conn.lock().map_err(|_| MigratorError::ConnectionPoisoned)
    }

    /// Create the ledger table if it is missing
    pub fn ensure_ledger(&self) -> Result<(), MigratorError> {
        let mut conn = self.lock()?;
        Ok(self.ledger.ensure(&mut *conn)?)
    }

    /// Filenames recorded in the ledger
    pub fn applied_filenames(&self) -> Result<BTreeSet<String>, MigratorError> {
        let mut conn = self.lock()?;
        Ok(self.ledger.applied(&mut *conn)?)
    }

    /// Ledger rows in application order
    pub fn records(&self) -> Result<Vec<MigrationRecord>, MigratorError> {
        let mut conn = self.lock()?;
        Ok(self.ledger.records(&mut *conn)?)
    }

    /// Run one script and record it under `filename`
    pub fn apply(&self, filename: &str, sql: &str) -> Result<(), MigratorError> {
        let mut conn = self.lock()?;
        Ok(self.ledger.apply(&mut *conn, filename, sql)?)
    }

    /// Up files not yet recorded, in numeric order
    pub fn pending(&self) -> Result<Vec<MigrationFile>, MigratorError> {
        let applied = {
            let mut conn = self.lock()?;
            self.ledger.ensure(&mut *conn)?;
            self.ledger.applied(&mut *conn)?
        };
        Ok(self.store.read_pending(&applied)?)
    }

    /// Every up file with its state
    pub fn status(&self) -> Result<Vec<MigrationStatus>, MigratorError> {
        let applied = {
            let mut conn = self.lock()?;
            self.ledger.ensure(&mut *conn)?;
            self.ledger.applied(&mut *conn)?
        };

        Ok(self
            .store
            .list_up()?
            .into_iter()
            .map(|file| {
                let state = if applied.contains(&file.filename) {
                    MigrationState::Applied
                } else {
                    MigrationState::Pending
                };
                let reverted = applied.contains(&down_filename(&file.filename));
                MigrationStatus {
                    filename: file.filename,
                    state,
                    reverted,
                }
            })
            .collect())
    }

    /// Apply every pending migration.
    ///
    /// Pending files are grouped into batches whose members touch disjoint
    /// tables and indexes. Batches run in order; the members of a batch run as
    /// concurrent blocking tasks that take turns on the connection. A failed
    /// migration stays pending, and later migrations touching its resources
    /// are skipped. Only ledger and file store failures abort the run; once
    /// batches have run, a failure to restore foreign key enforcement is
    /// logged and the report is still returned.
    pub async fn migrate(&self) -> Result<MigrateReport, MigratorError> {
        let pending = {
            let mut conn = self.lock()?;
            self.ledger.ensure(&mut *conn)?;
            let applied = self.ledger.applied(&mut *conn)?;
            self.store.read_pending(&applied)?
        };

        if pending.is_empty() {
            tracing::info!(dir = %self.store.dir().display(), "no pending migrations");
            return Ok(MigrateReport::default());
        }

        let enforced = self.begin_session()?;
        let report = self.run_batches(&pending).await;
        if let Err(e) = self.end_session(enforced) {
            tracing::error!(error = %e, "failed to restore foreign key enforcement");
        }
        report
    }

    /// Apply `pending` batch by batch
    async fn run_batches(&self, pending: &[MigrationFile]) -> Result<MigrateReport, MigratorError> {
        let mut report = MigrateReport::default();

        let touched: Vec<BTreeSet<String>> = pending.iter().map(|m| batch::resources(&m.sql)).collect();
        let batches = batch::plan_batches(&touched);
        tracing::debug!(pending = pending.len(), batches = batches.len(), "planned migration batches");

        let mut poisoned = Poisoned::default();
        for members in batches {
            let mut tasks = JoinSet::new();
            for i in members {
                let file = &pending[i];
                if poisoned.blocks(&touched[i]) {
                    tracing::warn!(file = %file.filename, "skipping migration after failed dependency");
                    poisoned.poison(&touched[i]);
                    report.skipped.push(file.filename.clone());
                    continue;
                }

                let conn = Arc::clone(&self.conn);
                let ledger = self.ledger.clone();
                let MigrationFile { filename, sql, .. } = file.clone();
                tasks.spawn_blocking(move || {
                    let result = match conn.lock() {
                        Ok(mut guard) => ledger.apply(&mut *guard, &filename, &sql),
                        Err(_) => Err(ApplyError {
                            filename,
                            message: "connection lock poisoned".to_string(),
                        }),
                    };
                    (i, result)
                });
            }

            let mut outcomes = Vec::new();
            while let Some(joined) = tasks.join_next().await {
                outcomes.push(joined.map_err(|e| MigratorError::Task(e.to_string()))?);
            }
            outcomes.sort_by_key(|(i, _)| *i);

            for (i, outcome) in outcomes {
                match outcome {
                    Ok(()) => report.applied.push(pending[i].filename.clone()),
                    Err(e) => {
                        tracing::error!(file = %e.filename, error = %e.message, "migration failed");
                        poisoned.poison(&touched[i]);
                        report.failed.push(e);
                    }
                }
            }
        }

        Ok(report)
    }

    /// Apply the down file of the most recent migration not yet reverted.
    ///
    /// The down file is recorded in the ledger under its own filename, and the
    /// up row is kept. Returns the down filename, or `None` when there is
    /// nothing left to revert.
    pub fn revert_last(&self) -> Result<Option<String>, MigratorError> {
        let mut conn = self.lock()?;
        self.ledger.ensure(&mut *conn)?;
        let records = self.ledger.records(&mut *conn)?;
        let recorded: BTreeSet<&str> = records.iter().map(|r| r.filename.as_str()).collect();

        let Some(last) = records
            .iter()
            .rev()
            .map(|r| r.filename.as_str())
            .filter(|f| f.ends_with(UP_SUFFIX))
            .find(|f| !recorded.contains(down_filename(f).as_str()))
        else {
            return Ok(None);
        };

        let down = self
            .store
            .read_down(last)?
            .ok_or_else(|| MigratorError::Irreversible(last.to_string()))?;

        let enforced = foreign_keys_enforced(&mut *conn)?;
        conn.execute_script(SESSION_PRAGMAS)?;
        let applied = self.ledger.apply(&mut *conn, &down.filename, &down.sql);
        if enforced {
            conn.execute_script("PRAGMA foreign_keys = ON;")?;
        }
        applied?;
        Ok(Some(down.filename))
    }

    /// Switch the session to migration pragmas; returns whether foreign keys
    /// were enforced before
    fn begin_session(&self) -> Result<bool, MigratorError> {
        let mut conn = self.lock()?;
        let enforced = foreign_keys_enforced(&mut *conn)?;
        conn.execute_script(SESSION_PRAGMAS)?;
        Ok(enforced)
    }

    fn end_session(&self, enforced: bool) -> Result<(), MigratorError> {
        if enforced {
            self.lock()?.execute_script("PRAGMA foreign_keys = ON;")?;
        }
        Ok(())
    }
}

fn foreign_keys_enforced<E: Executor + ?Sized>(conn: &mut E) -> Result<bool, MigratorError> {
    let rows = conn.query_rows("PRAGMA foreign_keys", &[])?;
    Ok(rows.first().and_then(|row| row.first()).is_some_and(|v| v == "1"))
}

fn down_filename(up_filename: &str) -> String {
    match up_filename.strip_suffix(UP_SUFFIX) {
        Some(stem) => format!("{stem}{DOWN_SUFFIX}"),
        None => up_filename.to_string(),
    }
}

// =============================================================================
// rusqlite helpers
// =============================================================================

#[cfg(feature = "rusqlite")]
mod live {
    use super::{Migrator, MigratorError, SESSION_PRAGMAS};
    use crate::config::VeloriaConfig;
    use crate::driver::Executor;
    use crate::snapshot::save_snapshot;
    use crate::sqlite::introspect::introspect;
    use crate::sqlite::MigrationBuilder;
    use crate::writer::{generate_migration, timestamp_now, MigrationError, MigrationStore, WrittenMigration};
    use rusqlite::Connection;
    use std::path::Path;
    use veloria_types::Schema;

    impl Migrator<Connection> {
        /// Open the database file at `path` with the given configuration
        pub fn open(path: &Path, config: &VeloriaConfig) -> Result<Self, MigratorError> {
            let conn = Connection::open(path).map_err(|e| MigratorError::Open {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
            Ok(Self::from_config(conn, config))
        }

        /// Read the live database schema, ignoring the ledger table
        pub fn introspect(&self) -> Result<Schema, MigratorError> {
            let conn = self.lock()?;
            Ok(introspect(&conn, self.ledger.table())?)
        }

        /// Diff the live database against `target` and write the next migration.
        ///
        /// The snapshot next to the migrations is refreshed either way. Returns
        /// `None` when the database already matches.
        pub fn generate(
            &self,
            target: &Schema,
            builder: &MigrationBuilder,
        ) -> Result<Option<WrittenMigration>, MigratorError> {
            let current = self.introspect()?;
            let written = match generate_migration(builder, &current, target, &self.store, &timestamp_now()) {
                Ok((_, written)) => Some(written),
                Err(MigrationError::NoChanges) => None,
                Err(e) => return Err(e.into()),
            };
            save_snapshot(&self.store.snapshot_path(), target)?;
            Ok(written)
        }
    }

    /// Replay every up file of `store` into an in-memory database and read
    /// back the resulting schema.
    pub fn replay_schema(store: &MigrationStore) -> Result<Schema, MigratorError> {
        let mut conn = Connection::open_in_memory().map_err(|e| MigratorError::Open {
            path: ":memory:".into(),
            message: e.to_string(),
        })?;
        conn.execute_script(SESSION_PRAGMAS)?;

        for file in store.list_up()? {
            conn.execute_script(&file.sql)
                .map_err(|e| MigratorError::Replay {
                    filename: file.filename.clone(),
                    message: e.0,
                })?;
        }
        Ok(introspect(&conn, "")?)
    }
}

#[cfg(feature = "rusqlite")]
pub use live::replay_schema;

// =============================================================================
// Errors
// =============================================================================

/// Runner errors
#[derive(Debug, thiserror::Error)]
pub enum MigratorError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Apply(#[from] ApplyError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Generate(#[from] MigrationError),

    #[error(transparent)]
    Introspect(#[from] IntrospectError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Exec(#[from] ExecError),

    #[error("Could not open database {}: {message}", path.display())]
    Open { path: PathBuf, message: String },

    #[error("Replaying {filename} failed: {message}")]
    Replay { filename: String, message: String },

    #[error("Migration {0} has no down file")]
    Irreversible(String),

    #[error("Connection lock poisoned")]
    ConnectionPoisoned,

    #[error("Migration task failed: {0}")]
    Task(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_down_filename() {
        assert_eq!(down_filename("20240101_up.sql"), "20240101_down.sql");
        assert_eq!(down_filename("other.sql"), "other.sql");
    }

    #[test]
    fn test_report_success() {
        let mut report = MigrateReport::default();
        assert!(report.is_success());
        report.skipped.push("2_up.sql".into());
        assert!(!report.is_success());
    }
}
