//! Resolved SQLite DDL definitions
//!
//! The schema model speaks in logical names and engine-neutral type tokens. Before
//! anything is diffed or rendered, each active table is resolved into a
//! [`TableDef`]: physical names everywhere, a concrete [`SQLiteType`] per column,
//! and a name for every index. Resolution is all-or-nothing; every column whose
//! type cannot be mapped is collected into one [`TypeMappingError`], and two
//! tables sharing a physical name are rejected.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use veloria_types::{DefaultValue, ReferentialAction, SQLiteType, Schema, Table, TypeError};

// =============================================================================
// Definitions
// =============================================================================

/// A column with its physical name and resolved type
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDef {
    pub name: String,
    pub sql_type: SQLiteType,
    pub not_null: bool,
    pub unique: bool,
    /// Inline `PRIMARY KEY`; only set for single-column keys
    pub primary_key: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<DefaultValue>,
}

/// A foreign key clause with physical names on both sides
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ForeignKeyDef {
    pub columns: Vec<String>,
    pub table_to: String,
    pub columns_to: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_update: Option<ReferentialAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_delete: Option<ReferentialAction>,
}

/// A named index on a physical table
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct IndexDef {
    pub name: String,
    pub table: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

/// A fully resolved table
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TableDef {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    /// Table-level primary key; empty unless the key spans several columns
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub primary_key: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub foreign_keys: Vec<ForeignKeyDef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indexes: Vec<IndexDef>,
}

impl TableDef {
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> BTreeSet<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Physical tables this table references, excluding itself
    pub fn references(&self) -> BTreeSet<&str> {
        self.foreign_keys
            .iter()
            .map(|fk| fk.table_to.as_str())
            .filter(|t| *t != self.name)
            .collect()
    }
}

/// Active tables of a schema keyed by physical name
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SchemaDef {
    pub tables: BTreeMap<String, TableDef>,
    /// Physical names of ignored tables
    pub ignored: BTreeSet<String>,
}

impl SchemaDef {
    pub fn table(&self, name: &str) -> Option<&TableDef> {
        self.tables.get(name)
    }
}

// =============================================================================
// Errors
// =============================================================================

/// A column whose type token has no SQLite mapping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnmappedColumn {
    pub table: String,
    pub column: String,
    pub reason: TypeError,
}

impl fmt::Display for UnmappedColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}: {}", self.table, self.column, self.reason)
    }
}

/// Raised when one or more columns cannot be mapped to a SQLite type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot map column types: {}", list_columns(.columns))]
pub struct TypeMappingError {
    pub columns: Vec<UnmappedColumn>,
}

/// Raised when a schema cannot be resolved into table definitions
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error(transparent)]
    TypeMapping(#[from] TypeMappingError),

    #[error("Tables {first} and {second} both map to physical table {name}")]
    DuplicateTable {
        name: String,
        first: String,
        second: String,
    },
}

fn list_columns(columns: &[UnmappedColumn]) -> String {
    columns
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

// =============================================================================
// Resolution
// =============================================================================

/// Physical names of the tables `schema` marks as ignored
pub fn ignored_tables(schema: &Schema) -> BTreeSet<String> {
    schema
        .tables()
        .filter(|t| t.ignored)
        .map(|t| t.physical_name().to_string())
        .collect()
}

/// Resolve every active table of `schema`
pub fn resolve_schema(schema: &Schema) -> Result<SchemaDef, SchemaError> {
    resolve_schema_excluding(schema, &BTreeSet::new())
}

/// Resolve every active table of `schema` whose physical name is not in `excluded`.
///
/// Excluded tables are recorded as ignored and never resolved, so their column
/// types do not have to map.
pub fn resolve_schema_excluding(
    schema: &Schema,
    excluded: &BTreeSet<String>,
) -> Result<SchemaDef, SchemaError> {
    let mut def = SchemaDef::default();
    let mut owners: BTreeMap<&str, &str> = BTreeMap::new();
    let mut unmapped = Vec::new();

    for table in schema.tables() {
        let physical = table.physical_name();
        if table.ignored || excluded.contains(physical) {
            def.ignored.insert(physical.to_string());
            continue;
        }
        if let Some(first) = owners.insert(physical, &table.name) {
            return Err(SchemaError::DuplicateTable {
                name: physical.to_string(),
                first: first.to_string(),
                second: table.name.clone(),
            });
        }
        match resolve_table(schema, table) {
            Ok(resolved) => {
                def.tables.insert(resolved.name.clone(), resolved);
            }
            Err(mut columns) => unmapped.append(&mut columns),
        }
    }

    if unmapped.is_empty() {
        Ok(def)
    } else {
        Err(TypeMappingError { columns: unmapped }.into())
    }
}

/// Resolve one table against the schema it belongs to
pub fn resolve_table(schema: &Schema, table: &Table) -> Result<TableDef, Vec<UnmappedColumn>> {
    let name = table.physical_name().to_string();
    let pk_count = table.primary_key_columns().len();
    let mut unmapped = Vec::new();
    let mut columns = Vec::with_capacity(table.columns.len());

    for column in &table.columns {
        let sql_type = match SQLiteType::from_token(&column.ty) {
            Ok(ty) => ty,
            Err(reason) => {
                unmapped.push(UnmappedColumn {
                    table: name.clone(),
                    column: column.physical_name().to_string(),
                    reason,
                });
                continue;
            }
        };
        let inline_pk = column.primary_key && pk_count == 1;
        columns.push(ColumnDef {
            name: column.physical_name().to_string(),
            sql_type,
            not_null: !column.nullable && !inline_pk,
            unique: column.unique,
            primary_key: inline_pk,
            default: column.default.clone(),
        });
    }

    if !unmapped.is_empty() {
        return Err(unmapped);
    }

    let primary_key = if pk_count > 1 {
        table
            .primary_key_columns()
            .iter()
            .map(|c| c.physical_name().to_string())
            .collect()
    } else {
        Vec::new()
    };

    let foreign_keys = table
        .foreign_keys
        .iter()
        .map(|fk| {
            let target = schema.get(&fk.referenced_table);
            ForeignKeyDef {
                columns: physical_columns(table, &fk.columns),
                table_to: target
                    .map(|t| t.physical_name().to_string())
                    .unwrap_or_else(|| fk.referenced_table.clone()),
                columns_to: match target {
                    Some(t) => physical_columns(t, &fk.referenced_columns),
                    None => fk.referenced_columns.clone(),
                },
                on_update: fk.on_update.filter(|a| *a != ReferentialAction::NoAction),
                on_delete: fk.on_delete.filter(|a| *a != ReferentialAction::NoAction),
            }
        })
        .collect();

    let indexes = table
        .indexes
        .iter()
        .map(|index| {
            let index_columns = physical_columns(table, &index.columns);
            IndexDef {
                name: index.name.clone().unwrap_or_else(|| {
                    veloria_types::Index::synthesized_name(&name, &index_columns)
                }),
                table: name.clone(),
                columns: index_columns,
                unique: index.unique,
            }
        })
        .collect();

    Ok(TableDef {
        name,
        columns,
        primary_key,
        foreign_keys,
        indexes,
    })
}

fn physical_columns(table: &Table, names: &[String]) -> Vec<String> {
    names
        .iter()
        .map(|n| {
            table
                .get_column(n)
                .map(|c| c.physical_name().to_string())
                .unwrap_or_else(|| n.clone())
        })
        .collect()
}

/// Strip redundant wrapping parentheses from a raw default expression.
///
/// `(a) + (b)` is left alone; only parentheses enclosing the whole expression
/// are removed.
pub fn normalize_raw_default(expr: &str) -> &str {
    let mut s = expr.trim();
    while s.starts_with('(') && s.ends_with(')') && encloses_all(s) {
        s = s[1..s.len() - 1].trim();
    }
    s
}

fn encloses_all(s: &str) -> bool {
    let mut depth = 0usize;
    let mut in_quote = false;
    for (i, c) in s.char_indices() {
        match c {
            '\'' => in_quote = !in_quote,
            '(' if !in_quote => depth += 1,
            ')' if !in_quote => {
                depth = depth.saturating_sub(1);
                if depth == 0 && i != s.len() - 1 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}
