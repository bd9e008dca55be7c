//! SQL dialect selection for the rendering pass.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A named SQL variant understood by the rendering pass.
///
/// Only SQL-standard constructs are required by the expression tree, so most
/// dialects need no special handling. The exceptions are regex matching and
/// percentiles, where function names and syntax differ between backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// Portable SQL using standard function names.
    #[default]
    Generic,
    /// DataFusion SQL, the embedded columnar backend.
    DataFusion,
    /// DuckDB SQL.
    DuckDb,
}

impl Dialect {
    /// Returns the dialect identifier.
    pub fn name(&self) -> &'static str {
        match self {
            Dialect::Generic => "generic",
            Dialect::DataFusion => "datafusion",
            Dialect::DuckDb => "duckdb",
        }
    }

    /// Returns the boolean regex-match function for this dialect.
    pub fn regexp_fn(&self) -> &'static str {
        match self {
            Dialect::Generic => "REGEXP_LIKE",
            Dialect::DataFusion => "regexp_like",
            Dialect::DuckDb => "regexp_matches",
        }
    }

    /// Renders a continuous percentile aggregate over `arg` at quantile `q`.
    pub(crate) fn render_percentile(&self, arg: &str, q: f64) -> String {
        match self {
            // DataFusion exposes percentiles as a plain aggregate function.
            Dialect::DataFusion => format!("approx_percentile_cont({arg}, {q})"),
            Dialect::Generic | Dialect::DuckDb => {
                format!("PERCENTILE_CONT({q}) WITHIN GROUP (ORDER BY {arg})")
            }
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
