//! Schema snapshots
//!
//! After a migration is generated the target schema is written as JSON next to
//! the migration files, so code generators can consume the reconciled schema
//! without parsing the schema document again.

use std::fs;
use std::path::Path;
use veloria_types::Schema;

/// File name of the snapshot inside the migrations directory
pub const SNAPSHOT_FILE: &str = "schema.json";

/// Save a schema as pretty JSON
pub fn save_snapshot(path: &Path, schema: &Schema) -> Result<(), SnapshotError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| SnapshotError::IoError(e.to_string()))?;
    }
    let json =
        serde_json::to_string_pretty(schema).map_err(|e| SnapshotError::Serialize(e.to_string()))?;
    fs::write(path, json).map_err(|e| SnapshotError::IoError(e.to_string()))
}

/// Load a schema snapshot
pub fn load_snapshot(path: &Path) -> Result<Schema, SnapshotError> {
    let contents = fs::read_to_string(path).map_err(|e| SnapshotError::IoError(e.to_string()))?;
    serde_json::from_str(&contents).map_err(|e| SnapshotError::Serialize(e.to_string()))
}

/// Snapshot errors
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Serialization error: {0}")]
    Serialize(String),
}
