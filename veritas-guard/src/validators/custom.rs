//! Ad-hoc SQL validators.

use super::{error_rows_verdict, Validator, ValidatorKind, ValidatorOptions, Verdict, DEFAULT_MAX_ERROR_ROWS};
use crate::engines::Engine;
use async_trait::async_trait;
use veritas_core::sql::guard::validate_sql_query;
use veritas_core::prelude::*;

/// Runs a user-supplied query that selects error rows; passes when the query
/// returns nothing.
///
/// The query is wrapped with `LIMIT max_error_rows + 1` so a pathological
/// expectation cannot drag the whole table through the engine; overflow is
/// flagged on the sample.
///
/// # Examples
///
/// ```rust
/// use veritas_guard::validators::SqlErrorRowsValidator;
///
/// let validator = SqlErrorRowsValidator::new(
///     "SELECT * FROM orders WHERE total < 0",
/// ).unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct SqlErrorRowsValidator {
    sql: String,
    max_error_rows: usize,
    opts: ValidatorOptions,
}

impl SqlErrorRowsValidator {
    /// Creates the validator, rejecting non-SELECT or unsafe SQL.
    pub fn new(sql: impl Into<String>) -> Result<Self> {
        Self::with_options(sql, DEFAULT_MAX_ERROR_ROWS, ValidatorOptions::new())
    }

    pub fn with_options(
        sql: impl Into<String>,
        max_error_rows: usize,
        opts: ValidatorOptions,
    ) -> Result<Self> {
        let sql = sql.into();
        validate_sql_query(&sql)?;
        Ok(Self {
            sql,
            max_error_rows,
            opts,
        })
    }
}

#[async_trait]
impl Validator for SqlErrorRowsValidator {
    fn name(&self) -> &'static str {
        "SqlErrorRowsValidator"
    }

    fn kind(&self) -> ValidatorKind {
        ValidatorKind::Custom
    }

    fn options(&self) -> &ValidatorOptions {
        &self.opts
    }

    async fn execute(&self, engine: &dyn Engine, _table: &str) -> Result<Verdict> {
        let sql = format!(
            "SELECT * FROM ({}) AS error_rows LIMIT {}",
            self.sql.trim_end(),
            self.max_error_rows + 1
        );
        error_rows_verdict(
            engine,
            &sql,
            self.max_error_rows,
            "error_row_cnt",
            "error rows",
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_unsafe_sql() {
        assert!(SqlErrorRowsValidator::new("DELETE FROM t").is_err());
        assert!(SqlErrorRowsValidator::new("SELECT 1; SELECT 2").is_err());
        assert!(SqlErrorRowsValidator::new("SELECT * FROM t WHERE a < 0").is_ok());
    }
}
