//! Schema diffing and migration planning
//!
//! [`MigrationBuilder::generate`] compares the schema of a live database with a
//! target schema and produces an up script and a down script. Work happens in
//! five steps:
//!
//! 1. drop indexes that go away
//! 2. create tables
//! 3. drop tables
//! 4. rebuild changed tables
//! 5. create indexes that are new
//!
//! Every step yields an up part and a down part; the down script is the down
//! parts in reverse step order, so it undoes the up script when run top to
//! bottom. Index names are global to a database, so no index is created while
//! an index it replaces may still exist.

use super::ddl::{
    IndexDef, SchemaDef, SchemaError, TableDef, ignored_tables, resolve_schema_excluding,
};
use super::statements::{
    CreateIndexStatement, CreateTableStatement, DropIndexStatement, DropTableStatement,
    RebuildTableStatement, Statement, render_column, render_foreign_key, render_primary_key,
    statements_to_sql,
};
use std::collections::{BTreeMap, BTreeSet};
use veloria_types::Schema;

// =============================================================================
// Output Types
// =============================================================================

/// Generated SQL for one migration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationScript {
    pub up: String,
    pub down: String,
}

impl MigrationScript {
    /// Check if there are no changes
    pub fn is_empty(&self) -> bool {
        self.up.is_empty() && self.down.is_empty()
    }
}

/// Structured form of a migration before rendering
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MigrationPlan {
    pub up: Vec<Statement>,
    pub down: Vec<Statement>,
}

impl MigrationPlan {
    pub fn is_empty(&self) -> bool {
        self.up.is_empty() && self.down.is_empty()
    }

    /// Render both directions to SQL
    pub fn to_script(&self) -> MigrationScript {
        MigrationScript {
            up: statements_to_sql(&self.up),
            down: statements_to_sql(&self.down),
        }
    }
}

/// One forward change and its inverse
#[derive(Debug, Default)]
struct Step {
    up: Vec<Statement>,
    down: Vec<Statement>,
}

// =============================================================================
// Builder
// =============================================================================

/// Migration builder for SQLite
#[derive(Debug, Clone)]
pub struct MigrationBuilder {
    preserve_data: bool,
}

impl Default for MigrationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MigrationBuilder {
    pub fn new() -> Self {
        Self {
            preserve_data: true,
        }
    }

    /// Copy shared columns into rebuilt tables (enabled by default)
    pub fn preserve_data(mut self, enabled: bool) -> Self {
        self.preserve_data = enabled;
        self
    }

    /// Create a builder from project configuration
    pub fn from_config(config: &crate::config::VeloriaConfig) -> Self {
        Self::new().preserve_data(config.preserve_data)
    }

    /// Diff `current` against `target` and render the result
    pub fn generate(
        &self,
        current: &Schema,
        target: &Schema,
    ) -> Result<MigrationScript, SchemaError> {
        self.plan(current, target).map(|plan| plan.to_script())
    }

    /// Diff `current` against `target` without rendering.
    ///
    /// Both schemas are resolved before any step runs, so a type mapping
    /// failure in either one produces no output at all. A table ignored on
    /// either side is left out of both before resolution.
    pub fn plan(&self, current: &Schema, target: &Schema) -> Result<MigrationPlan, SchemaError> {
        let mut ignored = ignored_tables(current);
        ignored.extend(ignored_tables(target));

        let (current, target) = match (
            resolve_schema_excluding(current, &ignored),
            resolve_schema_excluding(target, &ignored),
        ) {
            (Ok(c), Ok(t)) => (c, t),
            (Err(SchemaError::TypeMapping(mut a)), Err(SchemaError::TypeMapping(mut b))) => {
                a.columns.append(&mut b.columns);
                return Err(a.into());
            }
            (Err(e), _) | (_, Err(e)) => return Err(e),
        };

        let rebuilt = rebuilt_tables(&current, &target);
        let (drop_indexes, create_indexes) = diff_indexes(&current, &target, &rebuilt);

        let mut steps = vec![drop_indexes];
        self.diff_tables(&current, &target, &rebuilt, &mut steps);
        steps.push(create_indexes);

        let mut plan = MigrationPlan::default();
        for step in &mut steps {
            plan.up.append(&mut step.up);
        }
        for step in steps.iter_mut().rev() {
            plan.down.append(&mut step.down);
        }
        Ok(plan)
    }

    /// Table creation, removal, and rebuild steps
    fn diff_tables(
        &self,
        current: &SchemaDef,
        target: &SchemaDef,
        rebuilt: &BTreeMap<String, &'static str>,
        steps: &mut Vec<Step>,
    ) {
        let created: BTreeMap<&str, &TableDef> = target
            .tables
            .iter()
            .filter(|(name, _)| !current.tables.contains_key(*name))
            .map(|(name, table)| (name.as_str(), table))
            .collect();

        for table in sort_for_create(&created) {
            tracing::debug!(table = %table.name, "create table");
            steps.push(Step {
                up: vec![Statement::CreateTable(CreateTableStatement {
                    table: table.clone(),
                })],
                down: vec![Statement::DropTable(DropTableStatement {
                    name: table.name.clone(),
                })],
            });
        }

        let dropped: BTreeMap<&str, &TableDef> = current
            .tables
            .iter()
            .filter(|(name, _)| !target.tables.contains_key(*name))
            .map(|(name, table)| (name.as_str(), table))
            .collect();

        let mut drop_order = sort_for_create(&dropped);
        drop_order.reverse();
        for table in drop_order {
            tracing::debug!(table = %table.name, "drop table");
            let mut down = vec![Statement::CreateTable(CreateTableStatement {
                table: table.clone(),
            })];
            down.extend(table.indexes.iter().map(|index| {
                Statement::CreateIndex(CreateIndexStatement {
                    index: index.clone(),
                })
            }));
            steps.push(Step {
                up: vec![Statement::DropTable(DropTableStatement {
                    name: table.name.clone(),
                })],
                down,
            });
        }

        for (name, reason) in rebuilt {
            let (Some(from), Some(to)) = (current.tables.get(name), target.tables.get(name)) else {
                continue;
            };
            tracing::debug!(table = %name, reason, "rebuild table");
            steps.push(Step {
                up: vec![Statement::RebuildTable(RebuildTableStatement {
                    from: from.clone(),
                    to: to.clone(),
                    copy_data: self.preserve_data,
                })],
                down: vec![Statement::RebuildTable(RebuildTableStatement {
                    from: to.clone(),
                    to: from.clone(),
                    copy_data: self.preserve_data,
                })],
            });
        }
    }
}

/// Diff with default options
pub fn generate(current: &Schema, target: &Schema) -> Result<MigrationScript, SchemaError> {
    MigrationBuilder::new().generate(current, target)
}

/// Tables present in both schemas that must be rebuilt, with the reason
fn rebuilt_tables(current: &SchemaDef, target: &SchemaDef) -> BTreeMap<String, &'static str> {
    target
        .tables
        .iter()
        .filter_map(|(name, to)| {
            let from = current.tables.get(name)?;
            rebuild_reason(from, to).map(|reason| (name.clone(), reason))
        })
        .collect()
}

/// Why a table present in both schemas must be rebuilt, if it must
fn rebuild_reason(from: &TableDef, to: &TableDef) -> Option<&'static str> {
    if from.column_names() != to.column_names() {
        return Some("columns added or removed");
    }

    let changed = to.columns.iter().any(|column| {
        from.column(&column.name)
            .is_some_and(|old| render_column(old) != render_column(column))
    });
    if changed {
        return Some("column definition changed");
    }

    if constraint_clauses(from) != constraint_clauses(to) {
        return Some("constraints changed");
    }

    None
}

fn constraint_clauses(table: &TableDef) -> Vec<String> {
    let mut clauses: Vec<String> = table.foreign_keys.iter().map(render_foreign_key).collect();
    clauses.sort();
    clauses.extend(render_primary_key(table));
    clauses
}

/// Index reconciliation by name, per table present in the target.
///
/// Returns the drop step and the create step. An index is kept when its table
/// is not rebuilt and still has an index of that name. The indexes of a rebuilt
/// table vanish with the renamed-aside table, so they are never dropped
/// explicitly, and the rebuilt table gets every target index afterwards.
fn diff_indexes(
    current: &SchemaDef,
    target: &SchemaDef,
    rebuilt: &BTreeMap<String, &'static str>,
) -> (Step, Step) {
    let mut drops = Step::default();
    let mut creates = Step::default();

    for (name, table) in &target.tables {
        let is_rebuilt = rebuilt.contains_key(name);
        let existing = current
            .tables
            .get(name)
            .map(|t| t.indexes.as_slice())
            .unwrap_or_default();
        let kept = |index_name: &str, other: &[IndexDef]| {
            !is_rebuilt && other.iter().any(|i| i.name == index_name)
        };

        for index in existing {
            if kept(&index.name, &table.indexes) {
                continue;
            }
            tracing::debug!(index = %index.name, table = %name, "drop index");
            if !is_rebuilt {
                drops.up.push(Statement::DropIndex(DropIndexStatement {
                    name: index.name.clone(),
                }));
            }
            drops.down.push(Statement::CreateIndex(CreateIndexStatement {
                index: index.clone(),
            }));
        }

        for index in &table.indexes {
            if kept(&index.name, existing) {
                continue;
            }
            tracing::debug!(index = %index.name, table = %name, "create index");
            creates.up.push(Statement::CreateIndex(CreateIndexStatement {
                index: index.clone(),
            }));
            if !is_rebuilt {
                creates.down.push(Statement::DropIndex(DropIndexStatement {
                    name: index.name.clone(),
                }));
            }
        }
    }

    (drops, creates)
}

/// Order tables so referenced tables come before the tables referencing them.
///
/// References to tables outside `tables` are ignored. Tables caught in a
/// reference cycle are appended in name order.
fn sort_for_create<'a>(tables: &BTreeMap<&'a str, &'a TableDef>) -> Vec<&'a TableDef> {
    let mut sorted = Vec::with_capacity(tables.len());
    let mut placed: BTreeSet<&str> = BTreeSet::new();

    loop {
        let ready: Vec<&str> = tables
            .iter()
            .filter(|(name, _)| !placed.contains(*name))
            .filter(|(_, table)| {
                table
                    .references()
                    .iter()
                    .all(|r| placed.contains(r) || !tables.contains_key(r))
            })
            .map(|(name, _)| *name)
            .collect();

        if ready.is_empty() {
            break;
        }
        for name in ready {
            placed.insert(name);
            sorted.push(tables[name]);
        }
    }

    for (name, table) in tables {
        if !placed.contains(name) {
            tracing::warn!(table = %name, "foreign key cycle, creating in name order");
            sorted.push(*table);
        }
    }
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;
    use veloria_types::{Column, ForeignKey, Index, Table};

    #[test]
    fn test_create_order_follows_references() {
        let target = Schema::new()
            .with_table(
                Table::new("A_Comment")
                    .column(Column::new("id", "Int").primary_key())
                    .column(Column::new("postId", "Int"))
                    .foreign_key(ForeignKey::new(["postId"], "B_Post", ["id"])),
            )
            .with_table(
                Table::new("B_Post")
                    .column(Column::new("id", "Int").primary_key())
                    .column(Column::new("authorId", "Int"))
                    .foreign_key(ForeignKey::new(["authorId"], "C_User", ["id"])),
            )
            .with_table(Table::new("C_User").column(Column::new("id", "Int").primary_key()));

        let plan = MigrationBuilder::new().plan(&Schema::new(), &target).unwrap();
        let created: Vec<&str> = plan
            .up
            .iter()
            .map(|s| match s {
                Statement::CreateTable(st) => st.table.name.as_str(),
                other => panic!("unexpected {}", other.type_name()),
            })
            .collect();
        assert_eq!(created, vec!["C_User", "B_Post", "A_Comment"]);

        let dropped: Vec<&str> = plan
            .down
            .iter()
            .map(|s| match s {
                Statement::DropTable(st) => st.name.as_str(),
                other => panic!("unexpected {}", other.type_name()),
            })
            .collect();
        assert_eq!(dropped, vec!["A_Comment", "B_Post", "C_User"]);
    }

    #[test]
    fn test_reference_cycle_still_creates_everything() {
        let target = Schema::new()
            .with_table(
                Table::new("A")
                    .column(Column::new("bId", "Int"))
                    .foreign_key(ForeignKey::new(["bId"], "B", ["aId"])),
            )
            .with_table(
                Table::new("B")
                    .column(Column::new("aId", "Int"))
                    .foreign_key(ForeignKey::new(["aId"], "A", ["bId"])),
            );
        let plan = MigrationBuilder::new().plan(&Schema::new(), &target).unwrap();
        assert_eq!(plan.up.len(), 2);
    }

    #[test]
    fn test_self_reference_is_not_a_dependency() {
        let target = Schema::new().with_table(
            Table::new("Category")
                .column(Column::new("id", "Int").primary_key())
                .column(Column::new("parentId", "Int").nullable())
                .foreign_key(ForeignKey::new(["parentId"], "Category", ["id"])),
        );
        let script = generate(&Schema::new(), &target).unwrap();
        assert_eq!(
            script.up,
            "CREATE TABLE IF NOT EXISTS Category (id INTEGER PRIMARY KEY, parentId INTEGER, \
             FOREIGN KEY (parentId) REFERENCES Category(id));"
        );
    }

    #[test]
    fn test_column_order_alone_does_not_rebuild() {
        let current = Schema::new().with_table(
            Table::new("T")
                .column(Column::new("a", "Int"))
                .column(Column::new("b", "String")),
        );
        let target = Schema::new().with_table(
            Table::new("T")
                .column(Column::new("b", "String"))
                .column(Column::new("a", "Int")),
        );
        assert!(generate(&current, &target).unwrap().is_empty());
    }

    #[test]
    fn test_index_drops_come_before_creates() {
        let t = Table::new("T").column(Column::new("a", "Int"));
        let u = Table::new("U").column(Column::new("c", "Int"));
        let current = Schema::new()
            .with_table(t.clone())
            .with_table(u.clone().index(Index::new(["c"]).named("x")));
        let target = Schema::new()
            .with_table(t.index(Index::new(["a"]).named("x")))
            .with_table(u);

        let plan = MigrationBuilder::new().plan(&current, &target).unwrap();
        let kinds = |statements: &[Statement]| -> Vec<&'static str> {
            statements.iter().map(Statement::type_name).collect()
        };
        assert_eq!(kinds(&plan.up), vec!["drop_index", "create_index"]);
        assert_eq!(kinds(&plan.down), vec!["drop_index", "create_index"]);
        assert_eq!(plan.to_script().up, "DROP INDEX IF EXISTS x;\nCREATE INDEX IF NOT EXISTS x ON T(a);");
        assert_eq!(plan.to_script().down, "DROP INDEX IF EXISTS x;\nCREATE INDEX IF NOT EXISTS x ON U(c);");
    }
}
