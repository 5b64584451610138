//! Schema and table containers

use crate::{Column, ForeignKey, Index};
use std::collections::BTreeMap;

/// A table in the schema model
#[derive(Clone, Debug, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct Table {
    pub name: String,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub mapped_name: Option<String>,
    /// Columns in declaration order
    pub columns: Vec<Column>,
    /// Ordered composite key by column name; empty when the key order follows
    /// the `primary_key` column flags
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Vec::is_empty"))]
    pub primary_key: Vec<String>,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Vec::is_empty"))]
    pub indexes: Vec<Index>,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Vec::is_empty"))]
    pub foreign_keys: Vec<ForeignKey>,
    /// Ignored tables are never created, altered, or dropped by migrations
    #[cfg_attr(feature = "serde", serde(default))]
    pub ignored: bool,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Override the physical table name
    #[must_use]
    pub fn mapped(mut self, name: impl Into<String>) -> Self {
        self.mapped_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn column(mut self, column: Column) -> Self {
        self.push_column(column);
        self
    }

    /// Declare the primary key with an explicit column order
    #[must_use]
    pub fn primary_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_primary_key(columns.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn index(mut self, index: Index) -> Self {
        self.indexes.push(index);
        self
    }

    #[must_use]
    pub fn foreign_key(mut self, fk: ForeignKey) -> Self {
        self.foreign_keys.push(fk);
        self
    }

    #[must_use]
    pub fn ignored(mut self) -> Self {
        self.ignored = true;
        self
    }

    /// Add a column, replacing any existing column of the same name
    pub fn push_column(&mut self, column: Column) {
        match self.columns.iter_mut().find(|c| c.name == column.name) {
            Some(existing) => *existing = column,
            None => self.columns.push(column),
        }
    }

    /// Replace the primary key, flagging exactly the listed columns
    pub fn set_primary_key(&mut self, columns: Vec<String>) {
        for column in &mut self.columns {
            column.primary_key = columns.contains(&column.name);
        }
        self.primary_key = columns;
    }

    /// Name of the table in the database
    pub fn physical_name(&self) -> &str {
        self.mapped_name.as_deref().unwrap_or(&self.name)
    }

    /// Look up a column by logical name, falling back to its physical name
    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .or_else(|| self.columns.iter().find(|c| c.physical_name() == name))
    }

    /// Columns that make up the primary key, in key order.
    ///
    /// Without an explicit key order this is declaration order.
    pub fn primary_key_columns(&self) -> Vec<&Column> {
        if self.primary_key.is_empty() {
            self.columns.iter().filter(|c| c.primary_key).collect()
        } else {
            self.primary_key
                .iter()
                .filter_map(|name| self.get_column(name))
                .collect()
        }
    }
}

/// A schema: logical table name to table.
///
/// Iteration order is by logical name, so every consumer sees the same order
/// regardless of how the schema was assembled.
///
/// # Examples
///
/// ```
/// use veloria_types::{Column, Schema, Table};
///
/// let mut schema = Schema::new();
/// schema.insert(Table::new("User").mapped("users").column(Column::new("id", "Int").primary_key()));
///
/// assert!(schema.get("User").is_some());
/// assert!(schema.get("users").is_some());
/// assert_eq!(schema.len(), 1);
/// ```
#[derive(Clone, Debug, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Schema {
    tables: BTreeMap<String, Table>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a table keyed by its logical name, returning the table it replaced
    pub fn insert(&mut self, table: Table) -> Option<Table> {
        self.tables.insert(table.name.clone(), table)
    }

    /// Builder-style [`insert`](Self::insert)
    #[must_use]
    pub fn with_table(mut self, table: Table) -> Self {
        self.insert(table);
        self
    }

    /// Look up a table by logical name, falling back to its physical name
    pub fn get(&self, name: &str) -> Option<&Table> {
        self.tables
            .get(name)
            .or_else(|| self.tables.values().find(|t| t.physical_name() == name))
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Table> {
        self.tables.get_mut(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Table> {
        self.tables.remove(name)
    }

    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.values()
    }

    /// Tables that take part in migrations
    pub fn active_tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.values().filter(|t| !t.ignored)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

impl FromIterator<Table> for Schema {
    fn from_iter<I: IntoIterator<Item = Table>>(iter: I) -> Self {
        let mut schema = Schema::new();
        for table in iter {
            schema.insert(table);
        }
        schema
    }
}

impl Extend<Table> for Schema {
    fn extend<I: IntoIterator<Item = Table>>(&mut self, iter: I) {
        for table in iter {
            self.insert(table);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> Table {
        Table::new("User")
            .mapped("users")
            .column(Column::new("id", "Int").primary_key())
            .column(Column::new("fullName", "String").mapped("full_name"))
    }

    #[test]
    fn test_lookup_by_mapped_name() {
        let schema: Schema = [user(), Table::new("Post")].into_iter().collect();

        assert_eq!(schema.get("User").map(|t| t.name.as_str()), Some("User"));
        assert_eq!(schema.get("users").map(|t| t.name.as_str()), Some("User"));
        assert!(schema.get("Comment").is_none());
    }

    #[test]
    fn test_column_lookup() {
        let table = user();
        assert_eq!(
            table.get_column("full_name").map(|c| c.name.as_str()),
            Some("fullName")
        );
        assert_eq!(table.get_column("fullName").map(Column::physical_name), Some("full_name"));
    }

    #[test]
    fn test_push_column_replaces() {
        let mut table = user();
        table.push_column(Column::new("id", "BigInt").primary_key());
        assert_eq!(table.columns.len(), 2);
        assert_eq!(table.columns[0].ty, "BigInt");
    }

    #[test]
    fn test_active_tables_skip_ignored() {
        let schema = Schema::new()
            .with_table(user())
            .with_table(Table::new("Legacy").ignored());
        let names: Vec<_> = schema.active_tables().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["User"]);
        assert_eq!(schema.len(), 2);
    }

    #[test]
    fn test_primary_key_columns() {
        let table = Table::new("Membership")
            .column(Column::new("userId", "Int").primary_key())
            .column(Column::new("groupId", "Int").primary_key())
            .column(Column::new("role", "String"));
        let pk: Vec<_> = table.primary_key_columns().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(pk, vec!["userId", "groupId"]);
    }

    #[test]
    fn test_explicit_primary_key_order() {
        let table = Table::new("Membership")
            .column(Column::new("userId", "Int"))
            .column(Column::new("groupId", "Int"))
            .column(Column::new("role", "String"))
            .primary_key(["groupId", "userId"]);
        let pk: Vec<_> = table.primary_key_columns().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(pk, vec!["groupId", "userId"]);
        assert!(table.get_column("userId").is_some_and(|c| c.primary_key));
        assert!(table.get_column("role").is_some_and(|c| !c.primary_key));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_json_shape() {
        use crate::DefaultValue;

        let schema = Schema::new().with_table(
            Table::new("User").column(
                Column::new("id", "Int")
                    .primary_key()
                    .default(DefaultValue::Autoincrement),
            ),
        );
        let json = serde_json::to_value(&schema).unwrap();
        assert_eq!(json["User"]["columns"][0]["type"], "Int");
        assert_eq!(json["User"]["columns"][0]["default"]["type"], "autoincrement");

        let back: Schema = serde_json::from_value(json).unwrap();
        assert_eq!(back, schema);
    }
}
