//! # Veloria
//!
//! Declarative schema migrations for SQLite.
//!
//! Describe the schema you want in a schema document, and veloria diffs it
//! against the live database, writes paired up/down SQL files, and applies
//! pending files while recording them in a ledger table.
//!
//! ## Quick Start
//!
//! ```rust
//! use veloria::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let dir = tempfile::tempdir()?;
//! let target = read_schema(r#"
//! model User {
//!   id    Int    @id @default(autoincrement())
//!   email String @unique
//! }
//! "#)?;
//!
//! let migrator = Migrator::new(rusqlite::Connection::open_in_memory()?, dir.path());
//! migrator.generate(&target, &MigrationBuilder::new())?;
//!
//! let report = migrator.migrate().await?;
//! assert_eq!(report.applied.len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Crates
//!
//! | Crate                | Contents                                        |
//! |----------------------|-------------------------------------------------|
//! | `veloria-types`      | Schema model: tables, columns, indexes, keys    |
//! | `veloria-migrations` | Reader, builder, file store, ledger and runner  |

pub use veloria_migrations as migrations;
pub use veloria_types as types;

pub use veloria_migrations::{
    MigrateReport, MigrationBuilder, MigrationScript, MigrationStore, Migrator, MigratorError,
    VeloriaConfig,
};
pub use veloria_types::Schema;

/// Everything needed to read a schema, generate migrations, and apply them
pub mod prelude {
    pub use veloria_migrations::config::VeloriaConfig;
    pub use veloria_migrations::parser::{load_schema_file, read_schema};
    pub use veloria_migrations::{
        MigrateReport, MigrationBuilder, MigrationScript, MigrationStore, Migrator, generate,
    };
    pub use veloria_types::prelude::*;
}
