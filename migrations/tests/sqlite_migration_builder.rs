//! SQLite Migration Builder Tests
//!
//! Diffs between schema models, checked both as rendered SQL and by running
//! the generated scripts against an in-memory database and reading the
//! resulting schema back.

use rusqlite::Connection;
use veloria_migrations::sqlite::introspect::introspect;
use veloria_migrations::writer::{MigrationStore, generate_migration};
use veloria_migrations::{MigrationBuilder, MigrationError, SchemaError, generate};
use veloria_types::{Column, DefaultValue, ForeignKey, Index, ReferentialAction, Schema, Table};

// =============================================================================
// Helper Functions
// =============================================================================

fn user(columns: Vec<Column>) -> Schema {
    let mut table = Table::new("User");
    for column in columns {
        table.push_column(column);
    }
    Schema::new().with_table(table)
}

fn id() -> Column {
    Column::new("id", "Int").primary_key()
}

fn name() -> Column {
    Column::new("name", "String")
}

fn lines(sql: &str) -> Vec<&str> {
    sql.lines().collect()
}

/// Open a connection configured the way the runner configures it
fn connection() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch("PRAGMA foreign_keys = OFF;\nPRAGMA legacy_alter_table = ON;")
        .unwrap();
    conn
}

/// Indexes and foreign keys in a stable order so introspected schemas compare
fn normalized(mut schema: Schema) -> Schema {
    let names: Vec<String> = schema.tables().map(|t| t.name.clone()).collect();
    for name in names {
        if let Some(table) = schema.get_mut(&name) {
            table.indexes.sort_by(|a, b| a.name.cmp(&b.name));
            table
                .foreign_keys
                .sort_by(|a, b| (&a.referenced_table, &a.columns).cmp(&(&b.referenced_table, &b.columns)));
        }
    }
    schema
}

fn read_back(conn: &Connection) -> Schema {
    normalized(introspect(conn, "migrations").unwrap())
}

fn blog_v1() -> Schema {
    Schema::new()
        .with_table(
            Table::new("User")
                .column(Column::new("id", "Int").primary_key().default(DefaultValue::Autoincrement))
                .column(Column::new("name", "String"))
                .column(Column::new("createdAt", "DateTime").default(DefaultValue::Now)),
        )
        .with_table(
            Table::new("Post")
                .column(Column::new("id", "Int").primary_key())
                .column(Column::new("title", "String").default(DefaultValue::text("untitled")))
                .column(Column::new("authorId", "Int"))
                .index(Index::new(["title"]))
                .foreign_key(
                    ForeignKey::new(["authorId"], "User", ["id"]).on_delete(ReferentialAction::Cascade),
                ),
        )
        .with_table(
            Table::new("Tag")
                .column(Column::new("id", "Int").primary_key())
                .column(Column::new("label", "String").unique()),
        )
}

fn blog_v2() -> Schema {
    Schema::new()
        .with_table(
            Table::new("User")
                .column(Column::new("id", "Int").primary_key().default(DefaultValue::Autoincrement))
                .column(Column::new("name", "String").nullable())
                .column(Column::new("email", "String").nullable().unique())
                .column(Column::new("createdAt", "DateTime").default(DefaultValue::Now)),
        )
        .with_table(
            Table::new("Post")
                .column(Column::new("id", "Int").primary_key())
                .column(Column::new("title", "String").default(DefaultValue::text("untitled")))
                .column(Column::new("authorId", "Int"))
                .index(Index::new(["title"]).named("post_title_idx"))
                .foreign_key(
                    ForeignKey::new(["authorId"], "User", ["id"]).on_delete(ReferentialAction::Cascade),
                ),
        )
        .with_table(
            Table::new("Comment")
                .mapped("comments")
                .column(Column::new("id", "Int").primary_key())
                .column(Column::new("postId", "Int").mapped("post_id"))
                .column(Column::new("body", "String"))
                .index(Index::new(["postId"]))
                .foreign_key(ForeignKey::new(["postId"], "Post", ["id"])),
        )
}

// =============================================================================
// Scenarios
// =============================================================================

#[test]
fn test_adding_a_column_rebuilds_the_table() {
    let current = user(vec![id(), name()]);
    let target = user(vec![id(), name(), Column::new("email", "String").nullable().unique()]);

    let script = MigrationBuilder::new()
        .preserve_data(false)
        .generate(&current, &target)
        .unwrap();

    assert_eq!(
        lines(&script.up),
        vec![
            "BEGIN TRANSACTION;",
            "ALTER TABLE User RENAME TO User_old;",
            "CREATE TABLE IF NOT EXISTS User (id INTEGER PRIMARY KEY, name TEXT NOT NULL, email TEXT UNIQUE);",
            "DROP TABLE User_old;",
            "COMMIT;",
        ]
    );
    assert_eq!(
        lines(&script.down),
        vec![
            "BEGIN TRANSACTION;",
            "ALTER TABLE User RENAME TO User_old;",
            "CREATE TABLE IF NOT EXISTS User (id INTEGER PRIMARY KEY, name TEXT NOT NULL);",
            "DROP TABLE User_old;",
            "COMMIT;",
        ]
    );
}

#[test]
fn test_preserving_data_copies_shared_columns() {
    let current = user(vec![id(), name()]);
    let target = user(vec![id(), name(), Column::new("email", "String").nullable()]);

    let script = generate(&current, &target).unwrap();
    assert!(script
        .up
        .contains("INSERT INTO User (id, name) SELECT id, name FROM User_old;"));
    assert!(script
        .down
        .contains("INSERT INTO User (id, name) SELECT id, name FROM User_old;"));
}

#[test]
fn test_named_unique_index() {
    let current = user(vec![id(), Column::new("email", "String")]);
    let target = Schema::new().with_table(
        Table::new("User")
            .column(id())
            .column(Column::new("email", "String"))
            .index(Index::new(["email"]).unique().named("user_email_idx")),
    );

    let script = generate(&current, &target).unwrap();
    assert_eq!(script.up, "CREATE UNIQUE INDEX IF NOT EXISTS user_email_idx ON User(email);");
    assert_eq!(script.down, "DROP INDEX IF EXISTS user_email_idx;");
}

#[test]
fn test_same_schema_generates_nothing() {
    let schema = blog_v2();
    let script = generate(&schema, &schema).unwrap();
    assert!(script.is_empty());
    assert_eq!(script.up, "");
    assert_eq!(script.down, "");
}

#[test]
fn test_nullability_flip_rebuilds() {
    let current = user(vec![id(), name()]);
    let target = user(vec![id(), name().nullable()]);

    let script = generate(&current, &target).unwrap();
    let up = lines(&script.up);
    assert_eq!(up.first(), Some(&"BEGIN TRANSACTION;"));
    assert!(up.contains(&"ALTER TABLE User RENAME TO User_old;"));
    assert!(up.contains(&"CREATE TABLE IF NOT EXISTS User (id INTEGER PRIMARY KEY, name TEXT);"));
    assert!(up.contains(&"DROP TABLE User_old;"));
    assert_eq!(up.last(), Some(&"COMMIT;"));
}

#[test]
fn test_renaming_an_index_is_one_drop_and_one_create() {
    let base = Table::new("Post").column(id()).column(Column::new("title", "String"));
    let current = Schema::new().with_table(base.clone().index(Index::new(["title"]).named("old_idx")));
    let target = Schema::new().with_table(base.index(Index::new(["title"]).named("new_idx")));

    let script = generate(&current, &target).unwrap();
    assert_eq!(
        lines(&script.up),
        vec![
            "DROP INDEX IF EXISTS old_idx;",
            "CREATE INDEX IF NOT EXISTS new_idx ON Post(title);",
        ]
    );
    assert_eq!(
        lines(&script.down),
        vec![
            "DROP INDEX IF EXISTS new_idx;",
            "CREATE INDEX IF NOT EXISTS old_idx ON Post(title);",
        ]
    );
}

#[test]
fn test_composite_key_renders_in_declared_order() {
    let target = Schema::new().with_table(
        Table::new("Membership")
            .column(Column::new("a", "Int"))
            .column(Column::new("b", "Int"))
            .primary_key(["b", "a"]),
    );
    let script = generate(&Schema::new(), &target).unwrap();
    assert_eq!(
        script.up,
        "CREATE TABLE IF NOT EXISTS Membership (a INTEGER NOT NULL, b INTEGER NOT NULL, PRIMARY KEY (b, a));"
    );
}

#[test]
fn test_two_tables_with_one_physical_name_are_rejected() {
    let target = Schema::new()
        .with_table(Table::new("Account").mapped("users").column(id()))
        .with_table(Table::new("User").mapped("users").column(id()).column(name()));

    let err = generate(&Schema::new(), &target).unwrap_err();
    assert_eq!(
        err,
        SchemaError::DuplicateTable {
            name: "users".into(),
            first: "Account".into(),
            second: "User".into(),
        }
    );
}

#[test]
fn test_ignored_tables_are_left_alone() {
    let legacy = Table::new("Legacy").column(id()).ignored();
    let current = Schema::new().with_table(Table::new("Legacy").column(id()).column(name()));

    let script = generate(&current, &Schema::new().with_table(legacy.clone())).unwrap();
    assert!(script.is_empty());

    let script = generate(&Schema::new(), &Schema::new().with_table(legacy)).unwrap();
    assert!(script.is_empty());
}

#[test]
fn test_ignored_table_with_unmappable_columns() {
    let current = Schema::new()
        .with_table(Table::new("legacy").column(Column::new("payload", "TIMESTAMP")))
        .with_table(Table::new("User").column(id()));
    let target = Schema::new()
        .with_table(Table::new("Legacy").mapped("legacy").ignored())
        .with_table(Table::new("User").column(id()));

    let script = generate(&current, &target).unwrap();
    assert!(script.is_empty(), "unexpected changes:\n{}", script.up);
}

#[test]
fn test_unmapped_types_write_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let store = MigrationStore::new(dir.path());
    let target = Schema::new().with_table(
        Table::new("Event")
            .column(id())
            .column(Column::new("payload", "Json"))
            .column(Column::new("shape", "Polygon")),
    );

    let err = generate_migration(&MigrationBuilder::new(), &Schema::new(), &target, &store, "1")
        .unwrap_err();
    match err {
        MigrationError::Schema(SchemaError::TypeMapping(e)) => {
            let columns: Vec<&str> = e.columns.iter().map(|c| c.column.as_str()).collect();
            assert_eq!(columns, vec!["payload", "shape"]);
        }
        other => panic!("expected a type mapping error, got {other:?}"),
    }
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

// =============================================================================
// Against a live database
// =============================================================================

#[test]
fn test_generated_schema_reads_back_without_changes() {
    let conn = connection();
    let target = blog_v2();
    conn.execute_batch(&generate(&Schema::new(), &target).unwrap().up)
        .unwrap();

    let live = introspect(&conn, "migrations").unwrap();
    let script = generate(&live, &target).unwrap();
    assert!(script.is_empty(), "unexpected drift:\n{}", script.up);
}

#[test]
fn test_up_then_down_restores_the_schema() {
    let conn = connection();
    conn.execute_batch(&generate(&Schema::new(), &blog_v1()).unwrap().up)
        .unwrap();
    conn.execute_batch("INSERT INTO User (name) VALUES ('ada');").unwrap();
    let before = read_back(&conn);

    let live = introspect(&conn, "migrations").unwrap();
    let script = generate(&live, &blog_v2()).unwrap();
    conn.execute_batch(&script.up).unwrap();

    let during = read_back(&conn);
    assert!(during.get("comments").is_some());
    assert!(during.get("Tag").is_none());
    let name: String = conn
        .query_row("SELECT name FROM User", [], |row| row.get(0))
        .unwrap();
    assert_eq!(name, "ada");

    conn.execute_batch(&script.down).unwrap();
    assert_eq!(read_back(&conn), before);
}

#[test]
fn test_rebuild_keeps_references_from_other_tables() {
    let conn = connection();
    conn.execute_batch(&generate(&Schema::new(), &blog_v1()).unwrap().up)
        .unwrap();

    let mut target = blog_v1();
    if let Some(user) = target.get_mut("User") {
        user.push_column(Column::new("bio", "String").nullable());
    }
    let live = introspect(&conn, "migrations").unwrap();
    conn.execute_batch(&generate(&live, &target).unwrap().up).unwrap();

    let post = read_back(&conn).get("Post").cloned().unwrap();
    assert_eq!(post.foreign_keys[0].referenced_table, "User");
}

#[test]
fn test_live_ignored_table_is_never_read_into_the_diff() {
    let conn = connection();
    conn.execute_batch("CREATE TABLE legacy (payload TIMESTAMP, extra);").unwrap();

    let target = Schema::new()
        .with_table(Table::new("legacy").ignored())
        .with_table(Table::new("User").column(id()).column(name()));
    let live = introspect(&conn, "migrations").unwrap();
    let script = generate(&live, &target).unwrap();
    assert_eq!(
        script.up,
        "CREATE TABLE IF NOT EXISTS User (id INTEGER PRIMARY KEY, name TEXT NOT NULL);"
    );
    assert_eq!(script.down, "DROP TABLE IF EXISTS User;");
}

#[test]
fn test_index_name_moving_onto_a_rebuilt_table() {
    let conn = connection();
    let current = Schema::new()
        .with_table(Table::new("T").column(Column::new("a", "Int")))
        .with_table(
            Table::new("U")
                .column(Column::new("c", "Int"))
                .index(Index::new(["c"]).named("x")),
        );
    let target = Schema::new()
        .with_table(
            Table::new("T")
                .column(Column::new("a", "Int"))
                .column(Column::new("b", "Int").nullable())
                .index(Index::new(["a"]).named("x")),
        )
        .with_table(Table::new("U").column(Column::new("c", "Int")));

    conn.execute_batch(&generate(&Schema::new(), &current).unwrap().up)
        .unwrap();
    let before = read_back(&conn);

    let script = generate(&introspect(&conn, "migrations").unwrap(), &target).unwrap();
    let up = lines(&script.up);
    assert_eq!(up.first(), Some(&"DROP INDEX IF EXISTS x;"));
    assert_eq!(up.last(), Some(&"CREATE INDEX IF NOT EXISTS x ON T(a);"));

    conn.execute_batch(&script.up).unwrap();
    let live = introspect(&conn, "migrations").unwrap();
    assert_eq!(live.get("T").unwrap().indexes, vec![Index::new(["a"]).named("x")]);
    assert!(live.get("U").unwrap().indexes.is_empty());
    let drift = generate(&live, &target).unwrap();
    assert!(drift.is_empty(), "unexpected drift:\n{}", drift.up);

    conn.execute_batch(&script.down).unwrap();
    assert_eq!(read_back(&conn), before);
}

#[test]
fn test_composite_key_order_reads_back() {
    let conn = connection();
    let target = Schema::new().with_table(
        Table::new("Membership")
            .column(Column::new("a", "Int"))
            .column(Column::new("b", "Int"))
            .primary_key(["b", "a"]),
    );
    conn.execute_batch(&generate(&Schema::new(), &target).unwrap().up)
        .unwrap();

    let live = introspect(&conn, "migrations").unwrap();
    assert_eq!(live.get("Membership").unwrap().primary_key, vec!["b", "a"]);
    let script = generate(&live, &target).unwrap();
    assert!(script.is_empty(), "unexpected drift:\n{}", script.up);
}
