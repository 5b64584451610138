//! Configuration types for veloria.toml

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the project configuration file
pub const CONFIG_FILE: &str = "veloria.toml";

/// Main configuration struct for veloria.toml
///
/// Relative paths are resolved against the directory holding the file.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct VeloriaConfig {
    /// Schema document describing the target schema
    #[serde(default = "default_schema")]
    pub schema: PathBuf,
    /// Output directory for migrations
    #[serde(default = "default_out")]
    pub out: PathBuf,
    /// SQLite database file; falls back to the schema's datasource url
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<PathBuf>,
    /// Table name for tracking applied migrations
    #[serde(default = "default_ledger_table")]
    pub ledger_table: String,
    /// Copy shared columns when a table is rebuilt
    #[serde(default = "default_preserve_data")]
    pub preserve_data: bool,
}

fn default_schema() -> PathBuf {
    PathBuf::from("schema.prisma")
}

fn default_out() -> PathBuf {
    PathBuf::from("migrations")
}

fn default_ledger_table() -> String {
    crate::ledger::DEFAULT_LEDGER_TABLE.to_string()
}

fn default_preserve_data() -> bool {
    true
}

impl Default for VeloriaConfig {
    fn default() -> Self {
        Self {
            schema: default_schema(),
            out: default_out(),
            database: None,
            ledger_table: default_ledger_table(),
            preserve_data: default_preserve_data(),
        }
    }
}

impl VeloriaConfig {
    /// Load configuration from a TOML file, resolving relative paths against its directory
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(format!("{}: {e}", path.display())))?;
        let config = Self::parse(&contents)?;
        Ok(match path.parent() {
            Some(root) => config.relative_to(root),
            None => config,
        })
    }

    /// Parse configuration from a TOML string
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Load `veloria.toml` from the nearest project root above `start`.
    ///
    /// Without a config file the defaults apply, relative to `start`.
    pub fn load(start: &Path) -> Result<Self, ConfigError> {
        match find_project_root(start) {
            Some(root) => Self::from_file(&root.join(CONFIG_FILE)),
            None => {
                tracing::debug!(dir = %start.display(), "no {CONFIG_FILE} found, using defaults");
                Ok(Self::default().relative_to(start))
            }
        }
    }

    /// Resolve relative paths against `root`
    pub fn relative_to(mut self, root: &Path) -> Self {
        let resolve = |p: &Path| {
            if p.is_absolute() {
                p.to_path_buf()
            } else {
                root.join(p)
            }
        };
        self.schema = resolve(&self.schema);
        self.out = resolve(&self.out);
        self.database = self.database.as_deref().map(resolve);
        self
    }

    /// Get the migrations directory path
    pub fn migrations_dir(&self) -> &Path {
        &self.out
    }
}

/// Walk up from `start` to the first directory containing `veloria.toml`
pub fn find_project_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(CONFIG_FILE).is_file())
        .map(Path::to_path_buf)
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
}
