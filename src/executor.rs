//! `StatementExecutor` - execution of built statements.
//!
//! The query builders produce parameterized SQL plus bound values. Running them against
//! a database is the job of a [`StatementExecutor`] implementation supplied by the
//! caller, e.g. a connection pool wrapper.

use std::collections::HashMap;

use sea_query::Value;

use crate::error::LifeError;
use crate::value::value_as_f64;

/// A result row keyed by column name.
pub type Row = HashMap<String, Value>;

/// Executes `SELECT` statements.
pub trait StatementExecutor {
    /// Execute a query and return all rows
    ///
    /// # Arguments
    ///
    /// * `query` - SQL query string with `$1`, `$2`, ... placeholders
    /// * `values` - Values bound to the placeholders, in order
    ///
    /// # Errors
    ///
    /// Returns `LifeError::Query` if the query execution fails.
    fn query_all(&self, query: &str, values: &[Value]) -> Result<Vec<Row>, LifeError>;

    /// Execute a query and return a single row
    ///
    /// # Errors
    ///
    /// Returns `LifeError` if the query fails or does not return exactly one row.
    fn query_one(&self, query: &str, values: &[Value]) -> Result<Row, LifeError> {
        let mut rows = self.query_all(query, values)?;
        match rows.len() {
            1 => Ok(rows.remove(0)),
            0 => Err(LifeError::Query("Query returned no rows".to_string())),
            n => Err(LifeError::Query(format!("Query returned {n} rows, expected one"))),
        }
    }
}

impl<E: StatementExecutor + ?Sized> StatementExecutor for &E {
    fn query_all(&self, query: &str, values: &[Value]) -> Result<Vec<Row>, LifeError> {
        (**self).query_all(query, values)
    }
}

/// Read a count column from a row.
pub fn count_from_row(row: &Row, column: &str) -> Result<u64, LifeError> {
    row.get(column)
        .and_then(value_as_f64)
        .map(|n| n as u64)
        .ok_or_else(|| LifeError::Query(format!("Missing count column '{column}'")))
}
