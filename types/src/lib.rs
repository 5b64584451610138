//! Schema model for veloria
//!
//! This crate provides the engine-neutral intermediate representation that the
//! migration builder diffs:
//!
//! - [`Schema`] and [`Table`] - table containers with logical and physical names
//! - [`Column`] and [`DefaultValue`] - column definitions and generated-value markers
//! - [`Index`] and [`ForeignKey`] - secondary structures of a table
//! - [`ReferentialAction`] - foreign key actions and their SQL keywords
//! - [`SQLiteType`] - resolution of schema type tokens to SQLite types
//!
//! The model is plain data: it performs no I/O and is never mutated by the
//! migration builder.
//!
//! # Features
//!
//! - `serde` - Enable serde serialization/deserialization (used for schema snapshots)

mod column;
mod foreign_key;
mod index;
mod schema;
mod sql_type;

pub use column::{Column, DefaultValue, IdGenerator, Literal};
pub use foreign_key::{ForeignKey, ReferentialAction, ReferentialActionParseError};
pub use index::Index;
pub use schema::{Schema, Table};
pub use sql_type::{SQLiteType, TypeError};

/// Prelude module for commonly used types
pub mod prelude {
    pub use crate::{Column, DefaultValue, ForeignKey, Index, ReferentialAction, Schema, Table};
}
