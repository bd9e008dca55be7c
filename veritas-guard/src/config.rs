//! Suite configuration: the serde models upstream loaders and services
//! marshal, plus the constructor registry turning them into bindings.
//!
//! A suite names an engine, a table, and a list of expectations. Each
//! expectation is a tagged variant keyed by `expectation_type`, with the
//! shared envelope (`where`, `severity`, `tags`) alongside. Unknown
//! expectation types are rejected during deserialization; column references
//! and regex patterns are validated at build time, before anything runs.
//!
//! Parsing stays format-agnostic: everything here derives serde, loading
//! YAML or anything else is the caller's concern. JSON helpers are provided
//! because the stores and the service surface speak JSON.

use crate::engines::EngineMap;
use crate::runner::Binding;
use crate::store::ResultStore;
use crate::validators::{
    CmpOp, ColumnDistinctCount, ColumnGreaterEqual, ColumnMapping, ColumnMatchesRegex, ColumnMax,
    ColumnMin, ColumnNotNull, ColumnNullPct, ColumnPercentile, ColumnRange,
    ColumnReconciliationValidator, ColumnValueInSet, ColumnZScoreOutlierRows,
    DuplicateRowValidator, MetricDriftValidator, PrimaryKeyUniquenessValidator, RowCountValidator,
    SqlErrorRowsValidator, TableFreshnessValidator, TableReconciliationValidator, Validator,
    ValidatorOptions,
};
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;
use veritas_core::sql::guard::validate_filter_sql;
use veritas_core::prelude::*;

fn default_tolerance() -> f64 {
    1e-6
}

fn default_z_thresh() -> f64 {
    3.0
}

fn default_max_error_rows() -> usize {
    20
}

fn default_window() -> usize {
    20
}

/// One expectation variant, keyed by `expectation_type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "expectation_type")]
pub enum ExpectationRule {
    ColumnNotNull {
        column: String,
    },
    ColumnNullPct {
        column: String,
        max_null_pct: f64,
    },
    ColumnDistinctCount {
        column: String,
        expected: i64,
        #[serde(default)]
        op: CmpOp,
    },
    ColumnMin {
        column: String,
        min_value: f64,
        #[serde(default)]
        strict: bool,
    },
    ColumnMax {
        column: String,
        max_value: f64,
        #[serde(default)]
        strict: bool,
    },
    ColumnRange {
        column: String,
        min_value: f64,
        max_value: f64,
    },
    ColumnPercentile {
        column: String,
        q: f64,
        expected: f64,
        #[serde(default = "default_tolerance")]
        tolerance: f64,
    },
    ColumnValueInSet {
        column: String,
        allowed_values: Vec<String>,
        #[serde(default)]
        allow_null: bool,
    },
    ColumnMatchesRegex {
        column: String,
        pattern: String,
    },
    ColumnGreaterEqual {
        column: String,
        other_column: String,
    },
    ColumnZScoreOutlierRows {
        column: String,
        #[serde(default = "default_z_thresh")]
        z_thresh: f64,
    },
    RowCountValidator {
        #[serde(default)]
        min_rows: Option<i64>,
        #[serde(default)]
        max_rows: Option<i64>,
    },
    PrimaryKeyUniquenessValidator {
        key_columns: Vec<String>,
    },
    DuplicateRowValidator {
        key_columns: Vec<String>,
    },
    SqlErrorRowsValidator {
        sql: String,
        #[serde(default = "default_max_error_rows")]
        max_error_rows: usize,
    },
    TableFreshnessValidator {
        timestamp_column: String,
        max_age_seconds: i64,
    },
    TableReconciliationValidator {
        comparer_engine: String,
        comparer_table: String,
        #[serde(default)]
        comparer_where: Option<String>,
    },
    ColumnReconciliationValidator {
        column_map: ColumnMapping,
        comparer_engine: String,
        comparer_table: String,
        #[serde(default)]
        comparer_where: Option<String>,
    },
    MetricDriftValidator {
        #[serde(default)]
        column: Option<String>,
        metric: String,
        #[serde(default = "default_window")]
        window: usize,
        #[serde(default = "default_z_thresh")]
        z_thresh: f64,
    },
}

impl ExpectationRule {
    /// Columns this rule reads on the suite's own table.
    fn referenced_columns(&self) -> Vec<&str> {
        match self {
            ExpectationRule::ColumnNotNull { column }
            | ExpectationRule::ColumnNullPct { column, .. }
            | ExpectationRule::ColumnDistinctCount { column, .. }
            | ExpectationRule::ColumnMin { column, .. }
            | ExpectationRule::ColumnMax { column, .. }
            | ExpectationRule::ColumnRange { column, .. }
            | ExpectationRule::ColumnPercentile { column, .. }
            | ExpectationRule::ColumnValueInSet { column, .. }
            | ExpectationRule::ColumnMatchesRegex { column, .. }
            | ExpectationRule::ColumnZScoreOutlierRows { column, .. }
            | ExpectationRule::TableFreshnessValidator {
                timestamp_column: column,
                ..
            } => vec![column],
            ExpectationRule::ColumnGreaterEqual {
                column,
                other_column,
            } => vec![column, other_column],
            ExpectationRule::PrimaryKeyUniquenessValidator { key_columns }
            | ExpectationRule::DuplicateRowValidator { key_columns } => {
                key_columns.iter().map(String::as_str).collect()
            }
            ExpectationRule::ColumnReconciliationValidator { column_map, .. } => {
                vec![&column_map.primary]
            }
            ExpectationRule::MetricDriftValidator { column, .. } => column
                .as_deref()
                .filter(|c| *c != "*")
                .map(|c| vec![c])
                .unwrap_or_default(),
            ExpectationRule::RowCountValidator { .. }
            | ExpectationRule::SqlErrorRowsValidator { .. }
            | ExpectationRule::TableReconciliationValidator { .. } => Vec::new(),
        }
    }
}

/// One configured expectation: a rule plus the shared envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpectationConfig {
    #[serde(flatten)]
    pub rule: ExpectationRule,
    #[serde(default, rename = "where", skip_serializing_if = "Option::is_none")]
    pub where_sql: Option<String>,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl ExpectationConfig {
    fn options(&self) -> Result<ValidatorOptions> {
        if let Some(where_sql) = &self.where_sql {
            validate_filter_sql(where_sql)?;
        }
        Ok(ValidatorOptions {
            where_sql: self.where_sql.clone(),
            severity: self.severity,
            tags: self.tags.clone(),
        })
    }

    /// Instantiates the configured validator.
    pub fn to_validator(
        &self,
        engines: &EngineMap,
        store: Option<&Arc<dyn ResultStore>>,
    ) -> Result<Arc<dyn Validator>> {
        let opts = self.options()?;
        let comparer = |name: &str| -> Result<_> {
            engines
                .get(name)
                .cloned()
                .ok_or_else(|| VeritasError::config(format!("unknown comparer engine '{name}'")))
        };

        let validator: Arc<dyn Validator> = match &self.rule {
            ExpectationRule::ColumnNotNull { column } => {
                Arc::new(ColumnNotNull::with_options(column, opts))
            }
            ExpectationRule::ColumnNullPct {
                column,
                max_null_pct,
            } => {
                if !(0.0..=1.0).contains(max_null_pct) {
                    return Err(VeritasError::config(
                        "max_null_pct must be between 0 and 1".to_string(),
                    ));
                }
                Arc::new(ColumnNullPct::with_options(column, *max_null_pct, opts))
            }
            ExpectationRule::ColumnDistinctCount {
                column,
                expected,
                op,
            } => Arc::new(ColumnDistinctCount::with_options(
                column, *expected, *op, opts,
            )),
            ExpectationRule::ColumnMin {
                column,
                min_value,
                strict,
            } => Arc::new(ColumnMin::with_options(column, *min_value, *strict, opts)),
            ExpectationRule::ColumnMax {
                column,
                max_value,
                strict,
            } => Arc::new(ColumnMax::with_options(column, *max_value, *strict, opts)),
            ExpectationRule::ColumnRange {
                column,
                min_value,
                max_value,
            } => Arc::new(ColumnRange::with_options(
                column, *min_value, *max_value, opts,
            )),
            ExpectationRule::ColumnPercentile {
                column,
                q,
                expected,
                tolerance,
            } => Arc::new(ColumnPercentile::with_options(
                column, *q, *expected, *tolerance, opts,
            )?),
            ExpectationRule::ColumnValueInSet {
                column,
                allowed_values,
                allow_null,
            } => {
                if allowed_values.is_empty() {
                    return Err(VeritasError::config(
                        "allowed_values must not be empty".to_string(),
                    ));
                }
                Arc::new(
                    ColumnValueInSet::new(column, allowed_values.clone(), *allow_null)
                        .with_options(opts),
                )
            }
            ExpectationRule::ColumnMatchesRegex { column, pattern } => {
                Arc::new(ColumnMatchesRegex::with_options(column, pattern, opts)?)
            }
            ExpectationRule::ColumnGreaterEqual {
                column,
                other_column,
            } => Arc::new(ColumnGreaterEqual::with_options(
                column,
                other_column,
                opts,
            )),
            ExpectationRule::ColumnZScoreOutlierRows { column, z_thresh } => Arc::new(
                ColumnZScoreOutlierRows::new(column)
                    .with_threshold(*z_thresh)
                    .with_options(opts),
            ),
            ExpectationRule::RowCountValidator { min_rows, max_rows } => {
                if min_rows.is_none() && max_rows.is_none() {
                    return Err(VeritasError::config(
                        "at least one of min_rows / max_rows must be provided".to_string(),
                    ));
                }
                Arc::new(RowCountValidator::with_options(*min_rows, *max_rows, opts))
            }
            ExpectationRule::PrimaryKeyUniquenessValidator { key_columns } => {
                if key_columns.is_empty() {
                    return Err(VeritasError::config(
                        "key_columns must not be empty".to_string(),
                    ));
                }
                Arc::new(PrimaryKeyUniquenessValidator::with_options(
                    key_columns.clone(),
                    opts,
                ))
            }
            ExpectationRule::DuplicateRowValidator { key_columns } => {
                if key_columns.is_empty() {
                    return Err(VeritasError::config(
                        "key_columns must not be empty".to_string(),
                    ));
                }
                Arc::new(DuplicateRowValidator::new(key_columns.clone()).with_options(opts))
            }
            ExpectationRule::SqlErrorRowsValidator {
                sql,
                max_error_rows,
            } => Arc::new(SqlErrorRowsValidator::with_options(
                sql,
                *max_error_rows,
                opts,
            )?),
            ExpectationRule::TableFreshnessValidator {
                timestamp_column,
                max_age_seconds,
            } => Arc::new(TableFreshnessValidator::with_options(
                timestamp_column,
                TimeDelta::seconds(*max_age_seconds),
                opts,
            )),
            ExpectationRule::TableReconciliationValidator {
                comparer_engine,
                comparer_table,
                comparer_where,
            } => {
                let mut validator =
                    TableReconciliationValidator::new(comparer(comparer_engine)?, comparer_table)
                        .with_options(opts);
                if let Some(where_sql) = comparer_where {
                    validator = validator.with_comparer_where(where_sql);
                }
                Arc::new(validator)
            }
            ExpectationRule::ColumnReconciliationValidator {
                column_map,
                comparer_engine,
                comparer_table,
                comparer_where,
            } => {
                let mut validator = ColumnReconciliationValidator::new(
                    column_map.clone(),
                    comparer(comparer_engine)?,
                    comparer_table,
                )
                .with_options(opts);
                if let Some(where_sql) = comparer_where {
                    validator = validator.with_comparer_where(where_sql);
                }
                Arc::new(validator)
            }
            ExpectationRule::MetricDriftValidator {
                column,
                metric,
                window,
                z_thresh,
            } => {
                let store = store
                    .ok_or_else(|| {
                        VeritasError::config(
                            "MetricDriftValidator requires a result store".to_string(),
                        )
                    })?
                    .clone();
                Arc::new(
                    MetricDriftValidator::new(column.clone(), metric, store)?
                        .with_window(*window)
                        .with_threshold(*z_thresh)
                        .with_options(opts),
                )
            }
        };
        Ok(validator)
    }
}

/// A named collection of expectations targeting one (engine, table).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteConfig {
    pub suite_name: String,
    pub engine: String,
    pub table: String,
    pub expectations: Vec<ExpectationConfig>,
}

impl SuiteConfig {
    /// Parses a suite from JSON, rejecting unknown expectation types.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| VeritasError::config(format!("invalid suite configuration: {e}")))
    }

    /// Builds runner bindings, validating column references against the
    /// engine's actual schema.
    pub async fn build_bindings(
        &self,
        engines: &EngineMap,
        store: Option<&Arc<dyn ResultStore>>,
    ) -> Result<Vec<Binding>> {
        let engine = engines
            .get(&self.engine)
            .ok_or_else(|| VeritasError::config(format!("unknown engine '{}'", self.engine)))?;
        let known: HashSet<String> = engine
            .list_columns(&self.table)
            .await?
            .into_iter()
            .collect();

        let mut bindings = Vec::with_capacity(self.expectations.len());
        for expectation in &self.expectations {
            for column in expectation.rule.referenced_columns() {
                if !known.contains(column) {
                    return Err(VeritasError::config(format!(
                        "suite '{}': column '{column}' not found on table '{}'",
                        self.suite_name, self.table
                    )));
                }
            }
            let validator = expectation.to_validator(engines, store)?;
            bindings.push(Binding::new(
                self.engine.clone(),
                self.table.clone(),
                validator,
            ));
        }
        debug!(
            suite.name = %self.suite_name,
            bindings.count = bindings.len(),
            "built suite bindings"
        );
        Ok(bindings)
    }
}

/// A named bundle of suites evaluated as a unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlaConfig {
    pub sla_name: String,
    pub suites: Vec<SuiteConfig>,
}

impl SlaConfig {
    /// Parses an SLA from JSON.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| VeritasError::config(format!("invalid SLA configuration: {e}")))
    }

    /// Aggregates bindings across all contained suites.
    pub async fn build_bindings(
        &self,
        engines: &EngineMap,
        store: Option<&Arc<dyn ResultStore>>,
    ) -> Result<Vec<Binding>> {
        let mut bindings = Vec::new();
        for suite in &self.suites {
            bindings.extend(suite.build_bindings(engines, store).await?);
        }
        Ok(bindings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_expectation_type_rejected() {
        let json = r#"{
            "suite_name": "s",
            "engine": "duck",
            "table": "t",
            "expectations": [
                {"expectation_type": "NoSuchValidator", "column": "a"}
            ]
        }"#;
        let err = SuiteConfig::from_json_str(json).unwrap_err();
        assert!(matches!(err, VeritasError::Config(_)));
    }

    #[test]
    fn test_parse_suite_with_envelope() {
        let json = r#"{
            "suite_name": "users_quality",
            "engine": "duck",
            "table": "users",
            "expectations": [
                {"expectation_type": "ColumnNotNull", "column": "id"},
                {
                    "expectation_type": "ColumnNullPct",
                    "column": "email",
                    "max_null_pct": 0.05,
                    "where": "status = 'active'",
                    "severity": "WARN",
                    "tags": ["pii"]
                },
                {"expectation_type": "RowCountValidator", "min_rows": 1}
            ]
        }"#;
        let suite = SuiteConfig::from_json_str(json).unwrap();
        assert_eq!(suite.expectations.len(), 3);
        assert_eq!(suite.expectations[1].severity, Severity::Warn);
        assert_eq!(
            suite.expectations[1].where_sql.as_deref(),
            Some("status = 'active'")
        );
        assert_eq!(suite.expectations[1].tags, vec!["pii"]);
    }

    #[test]
    fn test_bad_regex_rejected_at_build() {
        let config = ExpectationConfig {
            rule: ExpectationRule::ColumnMatchesRegex {
                column: "a".to_string(),
                pattern: "[unclosed".to_string(),
            },
            where_sql: None,
            severity: Severity::Fail,
            tags: Vec::new(),
        };
        let engines = EngineMap::new();
        assert!(config.to_validator(&engines, None).is_err());
    }

    #[test]
    fn test_row_count_requires_bound() {
        let config = ExpectationConfig {
            rule: ExpectationRule::RowCountValidator {
                min_rows: None,
                max_rows: None,
            },
            where_sql: None,
            severity: Severity::Fail,
            tags: Vec::new(),
        };
        let engines = EngineMap::new();
        assert!(config.to_validator(&engines, None).is_err());
    }

    #[test]
    fn test_sla_round_trips() {
        let json = r#"{
            "sla_name": "nightly",
            "suites": [{
                "suite_name": "s1",
                "engine": "duck",
                "table": "t",
                "expectations": [
                    {"expectation_type": "ColumnNotNull", "column": "a"}
                ]
            }]
        }"#;
        let sla = SlaConfig::from_json_str(json).unwrap();
        let serialized = serde_json::to_string(&sla).unwrap();
        assert!(serialized.contains("\"expectation_type\":\"ColumnNotNull\""));
    }
}
