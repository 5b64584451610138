//! SQLite migration generation
//!
//! - [`ddl`] resolves the schema model into physical table definitions
//! - [`statements`] renders DDL statements
//! - [`diff`] compares two schemas and plans the migration
//! - [`introspect`] reads the schema of a live database

pub mod ddl;
pub mod diff;
pub mod introspect;
pub mod statements;

pub use ddl::{SchemaError, TypeMappingError, UnmappedColumn};
pub use diff::{MigrationBuilder, MigrationPlan, MigrationScript, generate};
pub use statements::Statement;
