//! Safety validation for SQL fragments supplied through configuration.
//!
//! Filter predicates and custom error-row queries arrive as raw text. Before
//! they are embedded in a statement they must be read-only: no DDL or DML
//! keywords, no statement separators, no comment sequences.

use crate::error::{Result, VeritasError};
use once_cell::sync::Lazy;
use regex::Regex;

const FORBIDDEN_KEYWORDS: &[&str] = &[
    "DROP", "DELETE", "INSERT", "UPDATE", "CREATE", "ALTER", "TRUNCATE", "GRANT", "REVOKE",
    "EXECUTE", "EXEC", "CALL", "MERGE", "REPLACE", "COMMIT", "ROLLBACK", "ATTACH",
];

static KEYWORD_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    FORBIDDEN_KEYWORDS
        .iter()
        .map(|kw| {
            // Word boundaries so UPDATED_AT does not match UPDATE.
            let re = Regex::new(&format!(r"\b{kw}\b")).expect("static keyword pattern");
            (*kw, re)
        })
        .collect()
});

fn reject_unsafe(sql: &str, what: &str) -> Result<()> {
    if sql.trim().is_empty() {
        return Err(VeritasError::config(format!("{what} must not be empty")));
    }
    if sql.contains(';') {
        return Err(VeritasError::config(format!(
            "{what} must not contain semicolons"
        )));
    }
    if sql.contains("--") || sql.contains("/*") || sql.contains("*/") {
        return Err(VeritasError::config(format!(
            "{what} must not contain comments"
        )));
    }
    let upper = sql.to_uppercase();
    for (kw, re) in KEYWORD_PATTERNS.iter() {
        if re.is_match(&upper) {
            return Err(VeritasError::config(format!(
                "{what} contains forbidden operation: {kw}"
            )));
        }
    }
    Ok(())
}

/// Validates a boolean filter predicate supplied as text.
pub fn validate_filter_sql(sql: &str) -> Result<()> {
    reject_unsafe(sql, "filter clause")
}

/// Validates a column or table identifier before it is embedded in SQL.
///
/// Accepts plain identifiers and dotted qualified names.
pub fn validate_identifier(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.split('.').all(|part| {
            !part.is_empty()
                && part
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_')
                && !part.chars().next().map(|c| c.is_ascii_digit()).unwrap_or(true)
        });
    if valid {
        Ok(())
    } else {
        Err(VeritasError::config(format!("invalid identifier '{name}'")))
    }
}

/// Validates a full read-only query supplied as text.
///
/// The query must be a `SELECT`; everything else is rejected.
pub fn validate_sql_query(sql: &str) -> Result<()> {
    reject_unsafe(sql, "SQL query")?;
    let upper = sql.trim_start().to_uppercase();
    if !upper.starts_with("SELECT") && !upper.starts_with("WITH") {
        return Err(VeritasError::config(
            "SQL query must be a SELECT statement".to_string(),
        ));
    }
    Ok(())
}
