//! Index definitions

/// A table index.
///
/// `name` is optional in schema sources; when it is missing the migration
/// builder derives one with [`Index::synthesized_name`].
#[derive(Clone, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Index {
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub name: Option<String>,
    pub columns: Vec<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub unique: bool,
}

impl Index {
    /// Create a non-unique index over `columns`
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: None,
            columns: columns.into_iter().map(Into::into).collect(),
            unique: false,
        }
    }

    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Deterministic name for an unnamed index: `{table}_{col1}_{col2}_index`
    ///
    /// ```
    /// use veloria_types::Index;
    ///
    /// assert_eq!(
    ///     Index::synthesized_name("Post", ["authorId", "createdAt"]),
    ///     "Post_authorId_createdAt_index"
    /// );
    /// ```
    pub fn synthesized_name<I, S>(table: &str, columns: I) -> String
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut name = String::from(table);
        for column in columns {
            name.push('_');
            name.push_str(column.as_ref());
        }
        name.push_str("_index");
        name
    }
}
