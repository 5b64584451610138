//! Foreign keys and their referential actions

use core::fmt;

/// Foreign key referential action
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ReferentialAction {
    /// No action (default)
    #[default]
    NoAction,
    /// Cascade changes
    Cascade,
    /// Set to NULL
    SetNull,
    /// Set to default value
    SetDefault,
    /// Restrict deletion
    Restrict,
}

impl ReferentialAction {
    /// Get the SQL representation
    #[must_use]
    pub const fn as_sql(&self) -> &'static str {
        match self {
            Self::NoAction => "NO ACTION",
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
            Self::Restrict => "RESTRICT",
        }
    }

    /// Parse from SQL string (as reported by `PRAGMA foreign_key_list`)
    pub fn from_sql(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "NO ACTION" => Some(Self::NoAction),
            "CASCADE" => Some(Self::Cascade),
            "SET NULL" => Some(Self::SetNull),
            "SET DEFAULT" => Some(Self::SetDefault),
            "RESTRICT" => Some(Self::Restrict),
            _ => None,
        }
    }

    /// Parse from the logical name used in schema documents (`SetNull`, `Cascade`, ...)
    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "NoAction" => Some(Self::NoAction),
            "Cascade" => Some(Self::Cascade),
            "SetNull" => Some(Self::SetNull),
            "SetDefault" => Some(Self::SetDefault),
            "Restrict" => Some(Self::Restrict),
            _ => None,
        }
    }
}

impl fmt::Display for ReferentialAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl core::str::FromStr for ReferentialAction {
    type Err = ReferentialActionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s)
            .or_else(|| Self::from_sql(s))
            .ok_or_else(|| ReferentialActionParseError(s.to_string()))
    }
}

/// Error returned when parsing an unknown referential action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferentialActionParseError(pub String);

impl fmt::Display for ReferentialActionParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown referential action `{}`", self.0)
    }
}

impl std::error::Error for ReferentialActionParseError {}

/// A foreign key as declared on the referencing table.
///
/// Table and column names are logical names; they resolve to physical names
/// when the migration builder renders the owning table.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct ForeignKey {
    pub referenced_table: String,
    pub columns: Vec<String>,
    pub referenced_columns: Vec<String>,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub on_update: Option<ReferentialAction>,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub on_delete: Option<ReferentialAction>,
}

impl ForeignKey {
    /// Create a foreign key from `columns` to `referenced_table(referenced_columns)`
    pub fn new<I, J, S, T>(columns: I, referenced_table: impl Into<String>, referenced_columns: J) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        J: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            referenced_table: referenced_table.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            referenced_columns: referenced_columns.into_iter().map(Into::into).collect(),
            on_update: None,
            on_delete: None,
        }
    }

    /// Set ON UPDATE action
    #[must_use]
    pub fn on_update(mut self, action: ReferentialAction) -> Self {
        self.on_update = Some(action);
        self
    }

    /// Set ON DELETE action
    #[must_use]
    pub fn on_delete(mut self, action: ReferentialAction) -> Self {
        self.on_delete = Some(action);
        self
    }
}
