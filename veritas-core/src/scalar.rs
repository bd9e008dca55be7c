//! Typed scalar values returned by engines and carried in results.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single value from a result row.
///
/// Engines materialize their native column types into this enum; values the
/// engine cannot type precisely arrive as [`Scalar::Text`] in their display
/// form. Serializes untagged, so metric values round-trip as plain JSON
/// scalars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    /// Returns true for the NULL value.
    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    /// Numeric view of this value. Numeric text parses; NULL and booleans do
    /// not.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Int(v) => Some(*v as f64),
            Scalar::Float(v) => Some(*v),
            Scalar::Text(v) => v.trim().parse().ok(),
            Scalar::Null | Scalar::Bool(_) => None,
        }
    }

    /// Integer view of this value.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::Int(v) => Some(*v),
            Scalar::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            Scalar::Text(v) => v.trim().parse().ok(),
            _ => None,
        }
    }

    /// Canonical string form used for non-numeric equality.
    pub fn canonical_string(&self) -> String {
        match self {
            Scalar::Null => String::new(),
            Scalar::Bool(v) => v.to_string(),
            Scalar::Int(v) => v.to_string(),
            Scalar::Float(v) => {
                if v.fract() == 0.0 && v.is_finite() {
                    format!("{}", *v as i64)
                } else {
                    v.to_string()
                }
            }
            Scalar::Text(v) => v.clone(),
        }
    }

    /// Equality under reconciliation rules.
    ///
    /// Numeric pairs compare numerically (integers against floats included);
    /// everything else compares by canonical string. NaN never equals NaN.
    /// Exact equality unless `tolerance` is given, which then applies to
    /// numeric pairs only.
    pub fn recon_eq(&self, other: &Scalar, tolerance: Option<f64>) -> bool {
        match (self, other) {
            (Scalar::Null, Scalar::Null) => true,
            (Scalar::Null, _) | (_, Scalar::Null) => false,
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => {
                    if a.is_nan() || b.is_nan() {
                        false
                    } else {
                        match tolerance {
                            Some(tol) => (a - b).abs() <= tol,
                            None => a == b,
                        }
                    }
                }
                _ => self.canonical_string() == other.canonical_string(),
            },
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => write!(f, "NULL"),
            other => write!(f, "{}", other.canonical_string()),
        }
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::Int(v)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Float(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::Text(v.to_string())
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Scalar::Bool(v)
    }
}
