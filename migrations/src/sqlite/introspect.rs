//! SQLite database introspection
//!
//! Reads the catalog of a live database (`sqlite_master` plus the table, index,
//! and foreign key pragmas) and rebuilds the schema model from it. The raw rows
//! are processed by plain functions so the mapping can be tested without a
//! database; [`introspect`] runs the queries over rusqlite.

use super::ddl::normalize_raw_default;
use std::collections::{BTreeMap, HashMap, HashSet};
use veloria_types::{Column, DefaultValue, ForeignKey, Index, ReferentialAction, Schema, Table};

/// Error type for introspection operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum IntrospectError {
    #[error("Introspection query failed: {0}")]
    Query(String),
    #[error("Introspection error for '{table}': {message}")]
    Table { table: String, message: String },
}

/// Result type for introspection
pub type IntrospectResult<T> = Result<T, IntrospectError>;

/// Raw table row from sqlite_master
#[derive(Debug, Clone)]
pub struct RawTable {
    pub name: String,
    pub sql: Option<String>,
}

/// Raw column info from pragma_table_info
#[derive(Debug, Clone)]
pub struct RawColumnInfo {
    pub table: String,
    pub cid: i64,
    pub name: String,
    pub column_type: String,
    pub not_null: bool,
    pub default_value: Option<String>,
    /// 1-based position in the primary key, 0 if not part of it
    pub pk: i64,
}

/// Raw index info from pragma_index_list
#[derive(Debug, Clone)]
pub struct RawIndexInfo {
    pub table: String,
    pub name: String,
    pub unique: bool,
    /// 'c' for CREATE INDEX, 'u' for UNIQUE, 'pk' for PRIMARY KEY
    pub origin: String,
}

/// Raw index column from pragma_index_info
#[derive(Debug, Clone)]
pub struct RawIndexColumn {
    pub index_name: String,
    pub seqno: i64,
    /// `None` for expression columns
    pub name: Option<String>,
}

/// Raw foreign key info from pragma_foreign_key_list
#[derive(Debug, Clone)]
pub struct RawForeignKey {
    pub table: String,
    pub id: i64,
    pub seq: i64,
    pub to_table: String,
    pub from_column: String,
    pub to_column: Option<String>,
    pub on_update: String,
    pub on_delete: String,
}

/// Everything read from the catalog
#[derive(Debug, Clone, Default)]
pub struct RawCatalog {
    pub tables: Vec<RawTable>,
    pub columns: Vec<RawColumnInfo>,
    pub indexes: Vec<RawIndexInfo>,
    pub index_columns: Vec<RawIndexColumn>,
    pub foreign_keys: Vec<RawForeignKey>,
}

// =============================================================================
// Processing
// =============================================================================

const STRFTIME_NOW: &str = "strftime('%s','now')";

/// Build the schema model from raw catalog rows.
///
/// Introspected tables use their physical names as logical names.
pub fn build_schema(catalog: &RawCatalog) -> Schema {
    let mut tables: BTreeMap<&str, Table> = catalog
        .tables
        .iter()
        .map(|t| (t.name.as_str(), Table::new(t.name.clone())))
        .collect();

    let autoincrement: HashMap<&str, HashSet<String>> = catalog
        .tables
        .iter()
        .filter_map(|t| Some((t.name.as_str(), autoincrement_columns(t.sql.as_deref()?))))
        .collect();

    let mut columns: Vec<&RawColumnInfo> = catalog.columns.iter().collect();
    columns.sort_by(|a, b| (&a.table, a.cid).cmp(&(&b.table, b.cid)));

    for raw in columns {
        let Some(table) = tables.get_mut(raw.table.as_str()) else {
            continue;
        };
        let mut column = Column::new(raw.name.clone(), declared_type(&raw.column_type));
        column.primary_key = raw.pk > 0;
        column.nullable = !raw.not_null && raw.pk == 0;
        column.default = if autoincrement
            .get(raw.table.as_str())
            .is_some_and(|cols| cols.contains(&raw.name.to_lowercase()))
        {
            Some(DefaultValue::Autoincrement)
        } else {
            raw.default_value.as_deref().map(parse_default)
        };
        table.push_column(column);
    }

    let mut index_columns: HashMap<&str, Vec<&RawIndexColumn>> = HashMap::new();
    for col in &catalog.index_columns {
        index_columns.entry(col.index_name.as_str()).or_default().push(col);
    }

    for raw in &catalog.indexes {
        let Some(table) = tables.get_mut(raw.table.as_str()) else {
            continue;
        };
        let mut cols = index_columns.remove(raw.name.as_str()).unwrap_or_default();
        cols.sort_by_key(|c| c.seqno);
        let Some(names) = cols.iter().map(|c| c.name.clone()).collect::<Option<Vec<_>>>() else {
            tracing::warn!(index = %raw.name, "skipping expression index");
            continue;
        };

        match raw.origin.as_str() {
            "pk" => {}
            "u" if names.len() == 1 => {
                let name = &names[0];
                if let Some(column) = table.columns.iter_mut().find(|c| &c.name == name) {
                    column.unique = true;
                }
            }
            "u" => {
                tracing::warn!(
                    index = %raw.name,
                    table = %raw.table,
                    "multi-column UNIQUE constraint is not represented in the schema model"
                );
            }
            _ => {
                let mut index = Index::new(names).named(raw.name.clone());
                index.unique = raw.unique;
                table.indexes.push(index);
            }
        }
    }

    let primary_keys: HashMap<&str, Vec<String>> = catalog.columns.iter().fold(
        HashMap::new(),
        |mut acc: HashMap<&str, Vec<(i64, String)>>, c| {
            if c.pk > 0 {
                acc.entry(c.table.as_str()).or_default().push((c.pk, c.name.clone()));
            }
            acc
        },
    )
    .into_iter()
    .map(|(table, mut cols)| {
        cols.sort();
        (table, cols.into_iter().map(|(_, name)| name).collect())
    })
    .collect();

    // composite keys keep their key order, which can differ from column order
    for (name, key) in &primary_keys {
        if let Some(table) = tables.get_mut(name).filter(|_| key.len() > 1) {
            table.primary_key = key.clone();
        }
    }

    let mut grouped: BTreeMap<(&str, i64), Vec<&RawForeignKey>> = BTreeMap::new();
    for fk in &catalog.foreign_keys {
        grouped.entry((fk.table.as_str(), fk.id)).or_default().push(fk);
    }

    for ((table_name, _), mut rows) in grouped {
        rows.sort_by_key(|r| r.seq);
        let Some(first) = rows.first() else {
            continue;
        };
        let columns: Vec<String> = rows.iter().map(|r| r.from_column.clone()).collect();
        let referenced: Vec<String> = match rows
            .iter()
            .map(|r| r.to_column.clone())
            .collect::<Option<Vec<_>>>()
        {
            Some(cols) => cols,
            None => primary_keys
                .get(first.to_table.as_str())
                .cloned()
                .unwrap_or_default(),
        };
        let mut fk = ForeignKey::new(columns, first.to_table.clone(), referenced);
        fk.on_update = referential_action(&first.on_update);
        fk.on_delete = referential_action(&first.on_delete);

        if let Some(table) = tables.get_mut(table_name) {
            table.foreign_keys.push(fk);
        }
    }

    tables.into_values().collect()
}

/// `NO ACTION` is the engine default and maps to no explicit action
fn referential_action(sql: &str) -> Option<ReferentialAction> {
    ReferentialAction::from_sql(sql).filter(|a| *a != ReferentialAction::NoAction)
}

/// Strip size arguments from a declared type: `VARCHAR(255)` becomes `VARCHAR`
fn declared_type(ty: &str) -> String {
    ty.split('(').next().unwrap_or(ty).trim().to_string()
}

/// Parse a `dflt_value` back into the default vocabulary
pub fn parse_default(raw: &str) -> DefaultValue {
    let expr = normalize_raw_default(raw);

    let compact: String = expr
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase();
    if compact == STRFTIME_NOW {
        return DefaultValue::Now;
    }

    if let Some(text) = single_quoted(expr) {
        return DefaultValue::text(text);
    }
    if let Ok(i) = expr.parse::<i64>() {
        return DefaultValue::integer(i);
    }
    if let Ok(f) = expr.parse::<f64>() {
        return DefaultValue::real(f);
    }
    DefaultValue::raw(expr)
}

/// Contents of a single SQL string literal, with doubled quotes collapsed
fn single_quoted(expr: &str) -> Option<String> {
    let inner = expr.strip_prefix('\'')?.strip_suffix('\'')?;
    if inner.replace("''", "").contains('\'') {
        return None;
    }
    Some(inner.replace("''", "'"))
}

/// Lower-cased names of the columns declared AUTOINCREMENT in a CREATE TABLE
fn autoincrement_columns(sql: &str) -> HashSet<String> {
    let mut out = HashSet::new();
    let (Some(start), Some(end)) = (sql.find('('), sql.rfind(')')) else {
        return out;
    };
    if end <= start {
        return out;
    }

    for part in split_top_level(&sql[start + 1..end]) {
        let is_autoincrement = part
            .split_whitespace()
            .any(|word| word.eq_ignore_ascii_case("AUTOINCREMENT"));
        if !is_autoincrement {
            continue;
        }
        if let Some(name) = part.split_whitespace().next() {
            let name = name.trim_matches(|c| matches!(c, '"' | '`' | '[' | ']'));
            out.insert(name.to_lowercase());
        }
    }
    out
}

/// Split on commas outside parentheses and quotes
fn split_top_level(body: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut in_quote = false;
    let mut start = 0usize;
    for (i, ch) in body.char_indices() {
        match ch {
            '\'' => in_quote = !in_quote,
            '(' if !in_quote => depth += 1,
            ')' if !in_quote => depth -= 1,
            ',' if depth == 0 && !in_quote => {
                parts.push(body[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(body[start..].trim());
    parts
}

// =============================================================================
// Queries
// =============================================================================

/// SQL queries for SQLite introspection
pub mod queries {
    /// All user tables except the ledger (bound as `?1`)
    pub const TABLES_QUERY: &str = r#"
        SELECT name, sql
        FROM sqlite_master
        WHERE type = 'table'
          AND name != ?1
          AND name NOT LIKE 'sqlite\_%' ESCAPE '\'
        ORDER BY name
    "#;

    /// Query template to get the columns of a table
    pub fn columns_query(table_name: &str) -> String {
        format!("PRAGMA table_info(\"{}\")", table_name)
    }

    /// Query template to get indexes for a table
    pub fn indexes_query(table_name: &str) -> String {
        format!("PRAGMA index_list(\"{}\")", table_name)
    }

    /// Query template to get index columns
    pub fn index_info_query(index_name: &str) -> String {
        format!("PRAGMA index_info(\"{}\")", index_name)
    }

    /// Query template to get foreign keys for a table
    pub fn foreign_keys_query(table_name: &str) -> String {
        format!("PRAGMA foreign_key_list(\"{}\")", table_name)
    }
}

/// Read the catalog of a rusqlite connection
#[cfg(feature = "rusqlite")]
pub fn read_catalog(conn: &rusqlite::Connection, ledger_table: &str) -> IntrospectResult<RawCatalog> {
    let query = |e: rusqlite::Error| IntrospectError::Query(e.to_string());
    let mut catalog = RawCatalog::default();

    let mut stmt = conn.prepare(queries::TABLES_QUERY).map_err(query)?;
    catalog.tables = stmt
        .query_map([ledger_table], |row| {
            Ok(RawTable {
                name: row.get(0)?,
                sql: row.get(1)?,
            })
        })
        .map_err(query)?
        .collect::<Result<_, _>>()
        .map_err(query)?;

    for table in &catalog.tables {
        let name = table.name.as_str();
        let in_table = |e: rusqlite::Error| IntrospectError::Table {
            table: name.to_string(),
            message: e.to_string(),
        };

        let mut stmt = conn.prepare(&queries::columns_query(name)).map_err(in_table)?;
        let columns = stmt
            .query_map([], |row| {
                Ok(RawColumnInfo {
                    table: name.to_string(),
                    cid: row.get("cid")?,
                    name: row.get("name")?,
                    column_type: row.get("type")?,
                    not_null: row.get::<_, i64>("notnull")? != 0,
                    default_value: row.get("dflt_value")?,
                    pk: row.get("pk")?,
                })
            })
            .map_err(in_table)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(in_table)?;
        catalog.columns.extend(columns);

        let mut stmt = conn.prepare(&queries::indexes_query(name)).map_err(in_table)?;
        let indexes = stmt
            .query_map([], |row| {
                Ok(RawIndexInfo {
                    table: name.to_string(),
                    name: row.get("name")?,
                    unique: row.get::<_, i64>("unique")? != 0,
                    origin: row.get("origin")?,
                })
            })
            .map_err(in_table)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(in_table)?;

        for index in &indexes {
            let mut stmt = conn
                .prepare(&queries::index_info_query(&index.name))
                .map_err(in_table)?;
            let cols = stmt
                .query_map([], |row| {
                    Ok(RawIndexColumn {
                        index_name: index.name.clone(),
                        seqno: row.get("seqno")?,
                        name: row.get("name")?,
                    })
                })
                .map_err(in_table)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(in_table)?;
            catalog.index_columns.extend(cols);
        }
        catalog.indexes.extend(indexes);

        let mut stmt = conn
            .prepare(&queries::foreign_keys_query(name))
            .map_err(in_table)?;
        let fks = stmt
            .query_map([], |row| {
                Ok(RawForeignKey {
                    table: name.to_string(),
                    id: row.get("id")?,
                    seq: row.get("seq")?,
                    to_table: row.get("table")?,
                    from_column: row.get("from")?,
                    to_column: row.get("to")?,
                    on_update: row.get("on_update")?,
                    on_delete: row.get("on_delete")?,
                })
            })
            .map_err(in_table)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(in_table)?;
        catalog.foreign_keys.extend(fks);
    }

    Ok(catalog)
}

/// Introspect a live database into the schema model, skipping the ledger table
#[cfg(feature = "rusqlite")]
pub fn introspect(conn: &rusqlite::Connection, ledger_table: &str) -> IntrospectResult<Schema> {
    let catalog = read_catalog(conn, ledger_table)?;
    tracing::debug!(tables = catalog.tables.len(), "introspected database");
    Ok(build_schema(&catalog))
}
