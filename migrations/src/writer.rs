//! Migration file store
//!
//! Migrations live in one directory as `{timestamp}_up.sql` and an optional
//! `{timestamp}_down.sql`. Timestamps are digits only, and files are ordered by
//! the numeric value of that prefix.

use crate::sqlite::{MigrationBuilder, MigrationScript, SchemaError};
use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use veloria_types::Schema;

/// Suffix of forward migration files
pub const UP_SUFFIX: &str = "_up.sql";
/// Suffix of reverse migration files
pub const DOWN_SUFFIX: &str = "_down.sql";

/// A migration file read from disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    /// File name, e.g. `20240102030405123_up.sql`
    pub filename: String,
    /// Numeric timestamp prefix
    pub prefix: u64,
    /// SQL contents
    pub sql: String,
}

/// Paths of a freshly written migration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenMigration {
    pub up: PathBuf,
    pub down: Option<PathBuf>,
}

/// Migration file store rooted at a directory
#[derive(Debug, Clone)]
pub struct MigrationStore {
    dir: PathBuf,
}

impl MigrationStore {
    /// Create a store for the given directory
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Get the migrations directory path
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Get the path of the schema snapshot kept next to the migrations
    pub fn snapshot_path(&self) -> PathBuf {
        self.dir.join(crate::snapshot::SNAPSHOT_FILE)
    }

    /// Ensure the migrations directory exists
    pub fn ensure_dir(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).map_err(|e| StoreError::io(&self.dir, e))
    }

    /// Write `{timestamp}_up.sql` and, when given, `{timestamp}_down.sql`.
    ///
    /// Existing files are never overwritten. If the down file cannot be written
    /// the up file is removed again.
    pub fn write_migration(
        &self,
        timestamp: &str,
        up: &str,
        down: Option<&str>,
    ) -> Result<WrittenMigration, StoreError> {
        if timestamp.is_empty() || !timestamp.bytes().all(|b| b.is_ascii_digit()) {
            return Err(StoreError::InvalidTimestamp(timestamp.to_string()));
        }
        self.ensure_dir()?;

        let up_path = self.dir.join(format!("{timestamp}{UP_SUFFIX}"));
        write_new(&up_path, up)?;

        let down_path = match down {
            Some(sql) => {
                let path = self.dir.join(format!("{timestamp}{DOWN_SUFFIX}"));
                if let Err(e) = write_new(&path, sql) {
                    remove_partial(&up_path);
                    return Err(e);
                }
                Some(path)
            }
            None => None,
        };

        tracing::info!(path = %up_path.display(), "wrote migration");
        Ok(WrittenMigration {
            up: up_path,
            down: down_path,
        })
    }

    /// All up migrations in numeric prefix order
    pub fn list_up(&self) -> Result<Vec<MigrationFile>, StoreError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&self.dir, e)),
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io(&self.dir, e))?;
            let filename = entry.file_name().to_string_lossy().into_owned();
            if !filename.ends_with(UP_SUFFIX) {
                continue;
            }
            let Some(prefix) = migration_prefix(&filename) else {
                tracing::warn!(file = %filename, "skipping migration without a numeric prefix");
                continue;
            };
            let path = entry.path();
            let sql = fs::read_to_string(&path).map_err(|e| StoreError::io(&path, e))?;
            files.push(MigrationFile {
                filename,
                prefix,
                sql,
            });
        }

        files.sort_by(|a, b| a.prefix.cmp(&b.prefix).then_with(|| a.filename.cmp(&b.filename)));
        Ok(files)
    }

    /// Up migrations whose filename is not in `applied`, in numeric prefix order
    pub fn read_pending(&self, applied: &BTreeSet<String>) -> Result<Vec<MigrationFile>, StoreError> {
        Ok(self
            .list_up()?
            .into_iter()
            .filter(|m| !applied.contains(&m.filename))
            .collect())
    }

    /// The down migration paired with an up file name, if one was written
    pub fn read_down(&self, up_filename: &str) -> Result<Option<MigrationFile>, StoreError> {
        let Some(stem) = up_filename.strip_suffix(UP_SUFFIX) else {
            return Ok(None);
        };
        let filename = format!("{stem}{DOWN_SUFFIX}");
        let path = self.dir.join(&filename);
        match fs::read_to_string(&path) {
            Ok(sql) => Ok(Some(MigrationFile {
                prefix: migration_prefix(&filename).unwrap_or_default(),
                filename,
                sql,
            })),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(&path, e)),
        }
    }
}

fn write_new(path: &Path, contents: &str) -> Result<(), StoreError> {
    write_new_with(path, |file| file.write_all(contents.as_bytes()))
}

/// Create `path`, which must not exist, and fill it with `fill`.
/// A file left half written by a failed `fill` is removed.
fn write_new_with<F>(path: &Path, fill: F) -> Result<(), StoreError>
where
    F: FnOnce(&mut fs::File) -> io::Result<()>,
{
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| StoreError::io(path, e))?;
    if let Err(e) = fill(&mut file) {
        drop(file);
        remove_partial(path);
        return Err(StoreError::io(path, e));
    }
    Ok(())
}

fn remove_partial(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        tracing::warn!(path = %path.display(), error = %e, "failed to remove partial migration");
    }
}

/// Numeric prefix before the first underscore: `10_up.sql` gives `10`
pub fn migration_prefix(filename: &str) -> Option<u64> {
    let (prefix, _) = filename.split_once('_')?;
    if prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    prefix.parse().ok()
}

/// Current UTC time as a digits-only timestamp with millisecond precision
pub fn timestamp_now() -> String {
    chrono::Utc::now().format("%Y%m%d%H%M%S%3f").to_string()
}

/// Generate and persist a migration.
///
/// The builder runs before anything touches the filesystem, so a type mapping
/// failure leaves the directory untouched.
pub fn generate_migration(
    builder: &MigrationBuilder,
    current: &Schema,
    target: &Schema,
    store: &MigrationStore,
    timestamp: &str,
) -> Result<(MigrationScript, WrittenMigration), MigrationError> {
    let script = builder.generate(current, target)?;
    if script.is_empty() {
        return Err(MigrationError::NoChanges);
    }
    let down = (!script.down.is_empty()).then_some(script.down.as_str());
    let written = store.write_migration(timestamp, &script.up, down)?;
    Ok((script, written))
}

/// File store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error at {}: {message}", path.display())]
    IoError { path: PathBuf, message: String },

    #[error("Invalid migration timestamp '{0}': expected digits only")]
    InvalidTimestamp(String),
}

impl StoreError {
    fn io(path: &Path, err: io::Error) -> Self {
        Self::IoError {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }
}

/// Migration generation errors
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("No schema changes detected")]
    NoChanges,
}
