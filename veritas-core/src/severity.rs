//! Outcome statuses and severity levels.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The severity a validator assigns to its failures.
///
/// Severity does not change how a validator is evaluated; it classifies the
/// failure for downstream reporting. `FAIL` blocks, `WARN` should be
/// investigated, `INFO` is observational.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info = 0,
    Warn = 1,
    #[default]
    Fail = 2,
}

impl Severity {
    /// Returns the string representation of the severity.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Fail => "FAIL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The outcome of a single validator.
///
/// `PASS` and `FAIL` describe the data; `ERROR` describes the infrastructure
/// (a statement that could not run, a timeout, an exhausted pool). Stores
/// persist all three uniformly so dashboards can distinguish "data bad" from
/// "system bad".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Pass,
    Fail,
    Error,
}

impl Status {
    /// Returns the string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pass => "PASS",
            Status::Fail => "FAIL",
            Status::Error => "ERROR",
        }
    }

    /// Returns true for `PASS`.
    pub fn is_pass(&self) -> bool {
        matches!(self, Status::Pass)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Fail > Severity::Warn);
        assert!(Severity::Warn > Severity::Info);
    }

    #[test]
    fn test_serde_uppercase() {
        assert_eq!(serde_json::to_string(&Severity::Fail).unwrap(), "\"FAIL\"");
        assert_eq!(serde_json::to_string(&Status::Error).unwrap(), "\"ERROR\"");
        let s: Severity = serde_json::from_str("\"WARN\"").unwrap();
        assert_eq!(s, Severity::Warn);
    }
}
