//! Database access used by the ledger and runner
//!
//! The runner only needs to run scripts, run parameterised statements, and
//! read rows back as text. [`Executor`] captures exactly that so the ledger
//! logic does not depend on a particular driver.

/// Error reported by an [`Executor`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ExecError(pub String);

/// A connection the runner can apply migrations through
pub trait Executor: Send + 'static {
    /// Run a multi-statement script
    fn execute_script(&mut self, sql: &str) -> Result<(), ExecError>;

    /// Run a single statement with text parameters bound in order
    fn execute(&mut self, sql: &str, params: &[&str]) -> Result<usize, ExecError>;

    /// Run a query and return every row, each column rendered as text.
    /// NULL becomes an empty string.
    fn query_rows(&mut self, sql: &str, params: &[&str]) -> Result<Vec<Vec<String>>, ExecError>;

    /// Whether the connection is outside an explicit transaction
    fn is_autocommit(&self) -> bool;
}

#[cfg(feature = "rusqlite")]
mod rusqlite_impl {
    use super::{ExecError, Executor};
    use rusqlite::types::ValueRef;

    fn err(e: rusqlite::Error) -> ExecError {
        ExecError(e.to_string())
    }

    fn text(value: ValueRef<'_>) -> String {
        match value {
            ValueRef::Null => String::new(),
            ValueRef::Integer(i) => i.to_string(),
            ValueRef::Real(f) => f.to_string(),
            ValueRef::Text(t) | ValueRef::Blob(t) => String::from_utf8_lossy(t).into_owned(),
        }
    }

    impl Executor for rusqlite::Connection {
        fn execute_script(&mut self, sql: &str) -> Result<(), ExecError> {
            self.execute_batch(sql).map_err(err)
        }

        fn execute(&mut self, sql: &str, params: &[&str]) -> Result<usize, ExecError> {
            rusqlite::Connection::execute(self, sql, rusqlite::params_from_iter(params.iter()))
                .map_err(err)
        }

        fn query_rows(&mut self, sql: &str, params: &[&str]) -> Result<Vec<Vec<String>>, ExecError> {
            let mut stmt = self.prepare(sql).map_err(err)?;
            let width = stmt.column_count();
            let rows = stmt
                .query_map(rusqlite::params_from_iter(params.iter()), |row| {
                    (0..width)
                        .map(|i| row.get_ref(i).map(text))
                        .collect::<Result<Vec<_>, _>>()
                })
                .map_err(err)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(err)
        }

        fn is_autocommit(&self) -> bool {
            rusqlite::Connection::is_autocommit(self)
        }
    }
}
