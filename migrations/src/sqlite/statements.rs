//! SQLite DDL statements and their SQL rendering
//!
//! Each clause (column, foreign key, primary key, index) renders on its own, and
//! `CREATE TABLE` is assembled from those pieces. The migration builder compares
//! rendered column fragments to decide whether a column changed, so the renderers
//! here are the single definition of column equality.

use super::ddl::{ColumnDef, ForeignKeyDef, IndexDef, TableDef};
use serde::{Deserialize, Serialize};
use veloria_types::{DefaultValue, Literal};

// =============================================================================
// Statement Types
// =============================================================================

/// A single migration step
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Statement {
    CreateTable(CreateTableStatement),
    DropTable(DropTableStatement),
    RebuildTable(RebuildTableStatement),
    CreateIndex(CreateIndexStatement),
    DropIndex(DropIndexStatement),
}

impl Statement {
    /// Get the statement type name
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::CreateTable(_) => "create_table",
            Self::DropTable(_) => "drop_table",
            Self::RebuildTable(_) => "rebuild_table",
            Self::CreateIndex(_) => "create_index",
            Self::DropIndex(_) => "drop_index",
        }
    }

    /// Render to SQL, one statement per element
    pub fn to_sql(&self) -> Vec<String> {
        match self {
            Self::CreateTable(st) => vec![render_create_table(&st.table)],
            Self::DropTable(st) => vec![render_drop_table(&st.name)],
            Self::RebuildTable(st) => render_rebuild_table(st),
            Self::CreateIndex(st) => vec![render_create_index(&st.index)],
            Self::DropIndex(st) => vec![render_drop_index(&st.name)],
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CreateTableStatement {
    pub table: TableDef,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct DropTableStatement {
    pub name: String,
}

/// Rename-and-rebuild of a table whose definition changed
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RebuildTableStatement {
    pub from: TableDef,
    pub to: TableDef,
    /// Copy the columns both definitions share into the rebuilt table
    pub copy_data: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CreateIndexStatement {
    pub index: IndexDef,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct DropIndexStatement {
    pub name: String,
}

/// Join statements into a script, one statement per line
pub fn statements_to_sql(statements: &[Statement]) -> String {
    statements
        .iter()
        .flat_map(Statement::to_sql)
        .collect::<Vec<_>>()
        .join("\n")
}

// =============================================================================
// Clause Rendering
// =============================================================================

/// Render a column fragment: `name type [NOT NULL] [UNIQUE] [PRIMARY KEY] [default]`
pub fn render_column(column: &ColumnDef) -> String {
    let mut sql = format!("{} {}", column.name, column.sql_type.to_sql_type());
    if column.not_null {
        sql.push_str(" NOT NULL");
    }
    if column.unique {
        sql.push_str(" UNIQUE");
    }
    if column.primary_key {
        sql.push_str(" PRIMARY KEY");
    }
    if let Some(default) = column.default.as_ref().and_then(render_default) {
        sql.push(' ');
        sql.push_str(&default);
    }
    sql
}

/// Render the default clause, if the default has one in SQL
pub fn render_default(default: &DefaultValue) -> Option<String> {
    match default {
        DefaultValue::Autoincrement => Some("AUTOINCREMENT".to_string()),
        DefaultValue::Now => Some("DEFAULT (strftime('%s', 'now'))".to_string()),
        // produced by the client before insert
        DefaultValue::ClientId { .. } => None,
        DefaultValue::Literal { value } => Some(format!("DEFAULT {}", render_literal(value))),
    }
}

fn render_literal(value: &Literal) -> String {
    match value {
        Literal::Text(s) => format!("'{}'", s.replace('\'', "''")),
        Literal::Integer(i) => i.to_string(),
        Literal::Real(f) => f.to_string(),
        Literal::Boolean(b) => if *b { "1" } else { "0" }.to_string(),
        Literal::Raw(expr) => {
            if is_simple_expr(expr) {
                expr.clone()
            } else {
                format!("({expr})")
            }
        }
    }
}

/// Keywords, numbers, and quoted strings can follow DEFAULT without parentheses
fn is_simple_expr(expr: &str) -> bool {
    let quoted = expr.len() >= 2 && expr.starts_with('\'') && expr.ends_with('\'');
    quoted
        || expr.parse::<f64>().is_ok()
        || (!expr.is_empty() && expr.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'))
}

/// Render `FOREIGN KEY (cols) REFERENCES table(cols) [ON UPDATE a] [ON DELETE a]`
pub fn render_foreign_key(fk: &ForeignKeyDef) -> String {
    let mut sql = format!(
        "FOREIGN KEY ({}) REFERENCES {}({})",
        fk.columns.join(", "),
        fk.table_to,
        fk.columns_to.join(", ")
    );
    if let Some(action) = fk.on_update {
        sql.push_str(" ON UPDATE ");
        sql.push_str(action.as_sql());
    }
    if let Some(action) = fk.on_delete {
        sql.push_str(" ON DELETE ");
        sql.push_str(action.as_sql());
    }
    sql
}

/// Render a table-level `PRIMARY KEY (a, b)` clause; `None` for inline keys
pub fn render_primary_key(table: &TableDef) -> Option<String> {
    (!table.primary_key.is_empty())
        .then(|| format!("PRIMARY KEY ({})", table.primary_key.join(", ")))
}

// =============================================================================
// Statement Rendering
// =============================================================================

pub fn render_create_table(table: &TableDef) -> String {
    let fields: Vec<String> = table
        .columns
        .iter()
        .map(render_column)
        .chain(render_primary_key(table))
        .chain(table.foreign_keys.iter().map(render_foreign_key))
        .collect();

    format!(
        "CREATE TABLE IF NOT EXISTS {} ({});",
        table.name,
        fields.join(", ")
    )
}

pub fn render_drop_table(name: &str) -> String {
    format!("DROP TABLE IF EXISTS {name};")
}

pub fn render_create_index(index: &IndexDef) -> String {
    format!(
        "CREATE {}INDEX IF NOT EXISTS {} ON {}({});",
        if index.unique { "UNIQUE " } else { "" },
        index.name,
        index.table,
        index.columns.join(", ")
    )
}

pub fn render_drop_index(name: &str) -> String {
    format!("DROP INDEX IF EXISTS {name};")
}

/// Render the rename-and-rebuild sequence.
///
/// SQLite cannot change a column set in place, so the live table is renamed
/// aside, the new definition is created under the original name, and the old
/// table is dropped. The sequence runs in one transaction. Indexes follow the
/// renamed table and vanish with it; the migration builder creates the new
/// definition's indexes once every index drop has run.
fn render_rebuild_table(st: &RebuildTableStatement) -> Vec<String> {
    let name = &st.to.name;
    let old_name = format!("{name}_old");

    let mut statements = vec![
        "BEGIN TRANSACTION;".to_string(),
        format!("ALTER TABLE {name} RENAME TO {old_name};"),
        render_create_table(&st.to),
    ];

    if st.copy_data {
        let common: Vec<&str> = st
            .to
            .columns
            .iter()
            .filter(|c| st.from.column(&c.name).is_some())
            .map(|c| c.name.as_str())
            .collect();
        if !common.is_empty() {
            let cols = common.join(", ");
            statements.push(format!(
                "INSERT INTO {name} ({cols}) SELECT {cols} FROM {old_name};"
            ));
        }
    }

    statements.push(format!("DROP TABLE {old_name};"));
    statements.push("COMMIT;".to_string());
    statements
}
