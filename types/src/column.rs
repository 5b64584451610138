//! Column definitions and default values

/// A literal default value
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", content = "value", rename_all = "snake_case"))]
pub enum Literal {
    Text(String),
    Integer(i64),
    Real(f64),
    Boolean(bool),
    /// SQL expression copied verbatim into the DEFAULT clause
    Raw(String),
}

/// Generator used for ids produced on the client before insert
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum IdGenerator {
    Cuid,
    Uuid,
}

/// Default value of a column: a literal or one of the generated-value markers
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type", rename_all = "snake_case"))]
pub enum DefaultValue {
    Literal { value: Literal },
    Autoincrement,
    /// Current timestamp at insert time
    Now,
    ClientId { generator: IdGenerator },
}

impl DefaultValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Literal {
            value: Literal::Text(value.into()),
        }
    }

    pub fn integer(value: i64) -> Self {
        Self::Literal {
            value: Literal::Integer(value),
        }
    }

    pub fn real(value: f64) -> Self {
        Self::Literal {
            value: Literal::Real(value),
        }
    }

    pub fn boolean(value: bool) -> Self {
        Self::Literal {
            value: Literal::Boolean(value),
        }
    }

    pub fn raw(sql: impl Into<String>) -> Self {
        Self::Literal {
            value: Literal::Raw(sql.into()),
        }
    }
}

/// A table column.
///
/// `ty` holds the engine-neutral type token as written in the schema source
/// (`String`, `Int`, `DateTime`, ...). It is resolved against
/// [`SQLiteType`](crate::SQLiteType) only when DDL is rendered, so an unmappable
/// token is reported by the migration builder rather than at construction.
///
/// # Examples
///
/// ```
/// use veloria_types::{Column, DefaultValue};
///
/// let id = Column::new("id", "Int").primary_key().default(DefaultValue::Autoincrement);
/// let email = Column::new("email", "String").unique().nullable();
///
/// assert!(id.primary_key);
/// assert!(email.nullable);
/// assert_eq!(email.physical_name(), "email");
/// ```
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct Column {
    pub name: String,
    #[cfg_attr(feature = "serde", serde(rename = "type"))]
    pub ty: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub nullable: bool,
    #[cfg_attr(feature = "serde", serde(default))]
    pub primary_key: bool,
    #[cfg_attr(feature = "serde", serde(default))]
    pub unique: bool,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub default: Option<DefaultValue>,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub mapped_name: Option<String>,
}

impl Column {
    /// Create a NOT NULL column with no constraints
    pub fn new(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
            nullable: false,
            primary_key: false,
            unique: false,
            default: None,
            mapped_name: None,
        }
    }

    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    #[must_use]
    pub fn default(mut self, value: DefaultValue) -> Self {
        self.default = Some(value);
        self
    }

    /// Override the physical column name
    #[must_use]
    pub fn mapped(mut self, name: impl Into<String>) -> Self {
        self.mapped_name = Some(name.into());
        self
    }

    /// Name of the column in the database
    pub fn physical_name(&self) -> &str {
        self.mapped_name.as_deref().unwrap_or(&self.name)
    }
}
