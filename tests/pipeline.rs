//! End-to-end: schema file and project config through generation, the file
//! store, and the runner against a database on disk.

use std::path::Path;
use std::time::Duration;
use veloria::migrations::parser::load_schema_file;
use veloria::prelude::*;

const CONFIG: &str = r#"
out = "db/migrations"
ledger_table = "veloria_migrations"
"#;

const SCHEMA_V1: &str = r#"
datasource db {
  provider = "sqlite"
  url      = "file:./app.db"
}

model User {
  id        Int      @id @default(autoincrement())
  email     String   @unique
  createdAt DateTime @default(now())
  posts     Post[]
}

model Post {
  id       Int    @id @default(autoincrement())
  title    String
  author   User   @relation(fields: [authorId], references: [id], onDelete: Cascade)
  authorId Int

  @@index([authorId])
}
"#;

const SCHEMA_V2: &str = r#"
datasource db {
  provider = "sqlite"
  url      = "file:./app.db"
}

enum Role {
  USER
  ADMIN
}

model User {
  id        Int      @id @default(autoincrement())
  email     String   @unique
  role      Role     @default(USER)
  createdAt DateTime @default(now())
  posts     Post[]
}

model Post {
  id       Int    @id @default(autoincrement())
  title    String
  author   User   @relation(fields: [authorId], references: [id], onDelete: Cascade)
  authorId Int

  @@index([authorId])
  @@map("posts")
}
"#;

fn project(root: &Path, schema: &str) -> (VeloriaConfig, Schema, std::path::PathBuf) {
    std::fs::write(root.join("veloria.toml"), CONFIG).unwrap();
    std::fs::write(root.join("schema.prisma"), schema).unwrap();

    let config = VeloriaConfig::load(root).unwrap();
    let source = load_schema_file(&config.schema).unwrap();
    let database = config.database.clone().or(source.database).unwrap();
    (config, source.schema, database)
}

fn up_files(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .unwrap()
        .filter(|e| {
            e.as_ref()
                .unwrap()
                .file_name()
                .to_string_lossy()
                .ends_with("_up.sql")
        })
        .count()
}

#[tokio::test]
async fn test_schema_file_to_database_and_back() {
    let root = tempfile::tempdir().unwrap();
    let (config, target, database) = project(root.path(), SCHEMA_V1);
    assert_eq!(database, root.path().join("./app.db"));
    assert_eq!(config.migrations_dir(), root.path().join("db/migrations"));

    let migrator = Migrator::open(&database, &config).unwrap();
    let builder = MigrationBuilder::from_config(&config);

    assert!(migrator.generate(&target, &builder).unwrap().is_some());
    let report = migrator.migrate().await.unwrap();
    assert!(report.is_success());
    assert_eq!(report.applied.len(), 1);
    assert_eq!(migrator.generate(&target, &builder).unwrap(), None);

    {
        let conn = migrator.connection().lock().unwrap();
        conn.execute_batch(
            "INSERT INTO User (email) VALUES ('ada@example.com');\n\
             INSERT INTO Post (title, authorId) VALUES ('hello', 1);",
        )
        .unwrap();
    }

    // second revision: new column with an enum default and a renamed table
    std::thread::sleep(Duration::from_millis(5));
    let (_, target, _) = project(root.path(), SCHEMA_V2);
    assert!(migrator.generate(&target, &builder).unwrap().is_some());
    let report = migrator.migrate().await.unwrap();
    assert!(report.is_success(), "{:?}", report.failed);
    assert_eq!(migrator.generate(&target, &builder).unwrap(), None);

    {
        let conn = migrator.connection().lock().unwrap();
        let role: String = conn
            .query_row("SELECT role FROM User WHERE id = 1", [], |row| row.get(0))
            .unwrap();
        assert_eq!(role, "USER");
        let email: String = conn
            .query_row("SELECT email FROM User WHERE id = 1", [], |row| row.get(0))
            .unwrap();
        assert_eq!(email, "ada@example.com");
    }

    assert_eq!(up_files(config.migrations_dir()), 2);
    let history = veloria::migrations::replay_schema(&MigrationStore::new(config.migrations_dir())).unwrap();
    assert!(generate(&history, &target).unwrap().is_empty());

    // a fresh process sees everything applied
    drop(migrator);
    let reopened = Migrator::open(&database, &config).unwrap();
    assert!(reopened.pending().unwrap().is_empty());
    assert!(reopened.migrate().await.unwrap().applied.is_empty());
}
