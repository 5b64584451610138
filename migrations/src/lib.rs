//! Veloria Migrations - schema migration engine for SQLite
//!
//! This crate provides:
//! - A reader for the declarative schema document
//! - A migration builder that diffs two schema models into paired up/down SQL
//! - An append-only store of `{timestamp}_up.sql` / `{timestamp}_down.sql` files
//! - A ledger table and a runner that applies pending migrations in
//!   dependency-aware concurrent batches
//!
//! # Generating a migration
//!
//! ```rust
//! use veloria_migrations::{MigrationBuilder, parser::read_schema};
//! use veloria_migrations::veloria_types::Schema;
//!
//! let target = read_schema(r#"
//! model User {
//!   id   Int    @id
//!   name String
//! }
//! "#).unwrap();
//!
//! let script = MigrationBuilder::new().generate(&Schema::new(), &target).unwrap();
//! assert_eq!(script.up, "CREATE TABLE IF NOT EXISTS User (id INTEGER PRIMARY KEY, name TEXT NOT NULL);");
//! assert_eq!(script.down, "DROP TABLE IF EXISTS User;");
//! ```
//!
//! # Applying migrations
//!
//! ```rust,ignore
//! use veloria_migrations::{Migrator, config::VeloriaConfig};
//!
//! let config = VeloriaConfig::load(&std::env::current_dir()?)?;
//! let migrator = Migrator::open(&config.database.clone().unwrap(), &config)?;
//! let report = migrator.migrate().await?;
//! for failure in &report.failed {
//!     eprintln!("{failure}");
//! }
//! ```

pub mod batch;
pub mod config;
pub mod driver;
pub mod ledger;
pub mod migrator;
pub mod parser;
pub mod snapshot;
pub mod sqlite;
pub mod writer;

pub use config::{ConfigError, VeloriaConfig};
pub use driver::{ExecError, Executor};
pub use ledger::{ApplyError, Ledger, LedgerError, MigrationRecord};
pub use migrator::{MigrateReport, MigrationState, MigrationStatus, Migrator, MigratorError};
pub use snapshot::{SnapshotError, load_snapshot, save_snapshot};
pub use sqlite::{
    MigrationBuilder, MigrationPlan, MigrationScript, SchemaError, Statement, TypeMappingError, generate,
};
pub use writer::{MigrationError, MigrationFile, MigrationStore, StoreError, WrittenMigration};

#[cfg(feature = "rusqlite")]
pub use migrator::replay_schema;

// Re-export the schema model
pub use veloria_types;
