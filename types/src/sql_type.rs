//! SQLite column type mapping
//!
//! Schema documents describe columns with engine-neutral tokens (`String`, `Int`,
//! `DateTime`, ...). This module resolves those tokens to the SQLite type affinity
//! used in rendered DDL.

use core::fmt;

/// Enum representing supported SQLite column types.
///
/// These correspond to the [SQLite storage classes](https://sqlite.org/datatype3.html#storage_classes_and_datatypes),
/// plus `DECIMAL` which SQLite accepts as a NUMERIC-affinity spelling.
///
/// # Examples
///
/// ```
/// use veloria_types::SQLiteType;
///
/// assert_eq!(SQLiteType::from_token("String"), Ok(SQLiteType::Text));
/// assert_eq!(SQLiteType::from_token("boolean"), Ok(SQLiteType::Integer));
/// assert_eq!(SQLiteType::Integer.to_sql_type(), "INTEGER");
/// assert!(SQLiteType::from_token("Json").is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "UPPERCASE"))]
pub enum SQLiteType {
    /// Signed integers up to 8 bytes. Booleans are stored here as 0/1.
    Integer,
    /// UTF-8 text.
    Text,
    /// Binary data stored exactly as input.
    Blob,
    /// 8-byte IEEE floating point.
    Real,
    /// NUMERIC affinity, used for timestamps.
    Numeric,
    /// Fixed-precision decimal, NUMERIC affinity.
    Decimal,
}

impl SQLiteType {
    /// Resolve a schema type token (case-insensitive).
    ///
    /// Both the logical spellings used by schema documents and the SQLite spellings
    /// read back from a live catalog are accepted, so an introspected schema and a
    /// declared one resolve to the same type.
    pub fn from_token(token: &str) -> Result<Self, TypeError> {
        let t = token.trim();
        let is = |names: &[&str]| names.iter().any(|n| t.eq_ignore_ascii_case(n));

        if is(&["string", "text", "varchar", "char"]) {
            Ok(Self::Text)
        } else if is(&["int", "integer", "bigint", "boolean", "bool"]) {
            Ok(Self::Integer)
        } else if is(&["float", "real", "double"]) {
            Ok(Self::Real)
        } else if is(&["decimal"]) {
            Ok(Self::Decimal)
        } else if is(&["datetime", "numeric"]) {
            Ok(Self::Numeric)
        } else if is(&["bytes", "blob"]) {
            Ok(Self::Blob)
        } else if is(&["json", "jsonb"]) {
            Err(TypeError::Unsupported(t.to_string()))
        } else {
            Err(TypeError::Unknown(t.to_string()))
        }
    }

    /// Get the SQL type string for this type
    #[must_use]
    pub const fn to_sql_type(&self) -> &'static str {
        match self {
            Self::Integer => "INTEGER",
            Self::Text => "TEXT",
            Self::Blob => "BLOB",
            Self::Real => "REAL",
            Self::Numeric => "NUMERIC",
            Self::Decimal => "DECIMAL",
        }
    }
}

impl fmt::Display for SQLiteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_sql_type())
    }
}

impl core::str::FromStr for SQLiteType {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_token(s)
    }
}

/// Error returned when a type token has no SQLite mapping
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeError {
    /// A known type the engine refuses to store (JSON)
    Unsupported(String),
    /// A token that is not a recognized type at all
    Unknown(String),
}

impl TypeError {
    /// The offending token
    pub fn token(&self) -> &str {
        match self {
            Self::Unsupported(t) | Self::Unknown(t) => t,
        }
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsupported(t) => write!(f, "type `{t}` is not supported by SQLite"),
            Self::Unknown(t) => write!(f, "unknown column type `{t}`"),
        }
    }
}

impl std::error::Error for TypeError {}
