//! Schema document reader
//!
//! Reads the declarative schema document (models, enums, datasource and
//! generator blocks) into a closed syntax tree, then translates the tree into
//! the [`Schema`] model the migration builder diffs against.
//!
//! # Example
//!
//! ```rust
//! use veloria_migrations::parser::read_schema;
//!
//! let schema = read_schema(r#"
//! model User {
//!   id    Int    @id @default(autoincrement())
//!   email String @unique
//! }
//! "#).unwrap();
//!
//! assert!(schema.get("User").unwrap().get_column("email").unwrap().unique);
//! ```

pub mod ast;
mod combinators;
mod convert;

pub use ast::SchemaDocument;
pub use convert::{ConvertError, to_schema};

use ast::Expr;
use std::path::{Path, PathBuf};
use veloria_types::Schema;

/// Parse a schema document into its syntax tree
pub fn parse_schema(src: &str) -> Result<SchemaDocument, SchemaParseError> {
    combinators::parse_document(src)
}

/// Parse and translate a schema document
pub fn read_schema(src: &str) -> Result<Schema, SchemaError> {
    let doc = parse_schema(src)?;
    Ok(to_schema(&doc)?)
}

/// A translated schema file
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaSource {
    pub schema: Schema,
    /// Database file named by the datasource url, relative to the schema file
    pub database: Option<PathBuf>,
}

/// Read, parse and translate the schema file at `path`
pub fn load_schema_file(path: &Path) -> Result<SchemaSource, SchemaError> {
    let src = std::fs::read_to_string(path)
        .map_err(|e| SchemaError::IoError(format!("{}: {e}", path.display())))?;
    let doc = parse_schema(&src)?;
    let schema = to_schema(&doc)?;

    let database = datasource_path(&doc).map(|db| match path.parent() {
        Some(dir) if db.is_relative() => dir.join(db),
        _ => db,
    });
    Ok(SchemaSource { schema, database })
}

/// Database path from the first datasource's `url`.
///
/// Accepts `"file:./dev.db"` and `env("VAR")`; query parameters are dropped.
pub fn datasource_path(doc: &SchemaDocument) -> Option<PathBuf> {
    let url = match doc.datasources().next()?.get("url")? {
        Expr::String(url) => url.clone(),
        Expr::Call { name, args } if name == "env" => {
            let var = args.first()?.value.as_str()?;
            std::env::var(var).ok()?
        }
        _ => return None,
    };

    let path = url.strip_prefix("file:").unwrap_or(&url);
    let path = path.split('?').next().unwrap_or(path);
    (!path.is_empty()).then(|| PathBuf::from(path))
}

// =============================================================================
// Errors
// =============================================================================

/// Syntax error with a 1-based position
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{line}:{column}: {message}")]
pub struct SchemaParseError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

/// Errors reading a schema document
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error at {0}")]
    Parse(#[from] SchemaParseError),

    #[error(transparent)]
    Convert(#[from] ConvertError),
}
