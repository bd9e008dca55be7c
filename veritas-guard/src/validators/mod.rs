//! Declarative expectations about data.
//!
//! Validators come in two kinds. *Metric-backed* validators describe their
//! needs as [`MetricPlan`]s; the runner fuses all plans for one
//! (engine, table) target into a single scan and hands each validator its
//! scalars to interpret. *Custom* validators own their SQL and execute it
//! one statement at a time.
//!
//! Every validator carries a shared envelope ([`ValidatorOptions`]): an
//! optional `where` predicate (which feeds the per-request filter for
//! metric-backed validators), a severity, and free-form tags.

use crate::engines::Engine;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;
use veritas_core::prelude::*;

mod column;
mod custom;
mod drift;
mod reconciliation;
mod table;

pub use column::{
    CmpOp, ColumnDistinctCount, ColumnGreaterEqual, ColumnMatchesRegex, ColumnMax, ColumnMin,
    ColumnNotNull, ColumnNullPct, ColumnPercentile, ColumnRange, ColumnValueInSet,
    ColumnZScoreOutlierRows,
};
pub use custom::SqlErrorRowsValidator;
pub use drift::MetricDriftValidator;
pub use reconciliation::{
    CaseFold, CoerceTo, ColumnMapping, ColumnReconciliationValidator,
    TableReconciliationValidator,
};
pub use table::{
    DuplicateRowValidator, PrimaryKeyUniquenessValidator, RowCountValidator,
    TableFreshnessValidator,
};

/// Default bound on collected error rows.
pub const DEFAULT_MAX_ERROR_ROWS: usize = 20;

/// How a validator is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidatorKind {
    /// Folds into the batched metric query for its (engine, table) target.
    Metric,
    /// Issues its own statements through [`Validator::execute`].
    Custom,
}

/// Shared configuration carried by every validator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidatorOptions {
    /// Optional boolean SQL predicate restricting the rows considered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub where_sql: Option<String>,
    /// Severity assigned to failures.
    #[serde(default)]
    pub severity: Severity,
    /// Free-form labels for routing and reporting.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl ValidatorOptions {
    /// Creates default options: no filter, `FAIL` severity, no tags.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the row filter.
    pub fn with_where(mut self, where_sql: impl Into<String>) -> Self {
        self.where_sql = Some(where_sql.into());
        self
    }

    /// Sets the severity.
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Sets the tags.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// What a validator concluded about its target.
///
/// The runner combines a verdict with binding context and timing to build
/// the final [`ValidationResult`].
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    /// True when the expectation holds.
    pub passed: bool,
    /// Observed metric values keyed by metric name.
    pub metric_values: BTreeMap<String, Scalar>,
    /// Optional human-readable explanation, usually set on failures.
    pub message: Option<String>,
    /// Bounded sample of offending rows, for error-row validators.
    pub error_sample: Option<ErrorSample>,
}

impl Verdict {
    /// A passing verdict.
    pub fn pass() -> Self {
        Self {
            passed: true,
            metric_values: BTreeMap::new(),
            message: None,
            error_sample: None,
        }
    }

    /// A failing verdict with an explanation.
    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            metric_values: BTreeMap::new(),
            message: Some(message.into()),
            error_sample: None,
        }
    }

    /// Attaches an observed metric value.
    pub fn with_metric(mut self, key: impl Into<String>, value: Scalar) -> Self {
        self.metric_values.insert(key.into(), value);
        self
    }

    /// Attaches a message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Attaches an error-row sample.
    pub fn with_sample(mut self, sample: ErrorSample) -> Self {
        self.error_sample = Some(sample);
        self
    }
}

/// A single assertion about data.
///
/// Implementations are value objects: created once per suite load, freely
/// shared, and stateless across runs.
#[async_trait]
pub trait Validator: Debug + Send + Sync {
    /// Returns the validator type name recorded on results.
    fn name(&self) -> &'static str;

    /// Returns how this validator executes.
    fn kind(&self) -> ValidatorKind;

    /// Returns the shared option envelope.
    fn options(&self) -> &ValidatorOptions;

    /// Returns the primary column, for single-column validators.
    fn column(&self) -> Option<&str> {
        None
    }

    /// Metric-backed validators return the metric applications they need.
    /// Plans are aliased by the runner and answered in the same order via
    /// [`Validator::interpret`].
    fn metric_plans(&self) -> Result<Vec<MetricPlan>> {
        Err(VeritasError::NotSupported(format!(
            "{} is not a metric validator",
            self.name()
        )))
    }

    /// Metric-backed validators turn their scalars into a verdict.
    fn interpret(&self, values: &[Scalar]) -> Result<Verdict> {
        let _ = values;
        Err(VeritasError::NotSupported(format!(
            "{} is not a metric validator",
            self.name()
        )))
    }

    /// Custom validators issue their own statements and build a verdict.
    async fn execute(&self, engine: &dyn Engine, table: &str) -> Result<Verdict> {
        let _ = (engine, table);
        Err(VeritasError::NotSupported(format!(
            "{} is not a custom validator",
            self.name()
        )))
    }
}

/// A shareable validator handle.
pub type SharedValidator = Arc<dyn Validator>;

/// Reads a count-like scalar, treating NULL (no matching rows) as zero.
pub(crate) fn count_or_zero(value: Option<&Scalar>) -> i64 {
    value.and_then(|v| v.as_i64()).unwrap_or(0)
}

/// Combines a validator's `where` predicate with an extra condition.
pub(crate) fn combine_predicates(where_sql: Option<&str>, extra: &str) -> String {
    match where_sql {
        Some(w) => format!("({w}) AND ({extra})"),
        None => extra.to_string(),
    }
}

/// Runs an error-row query bounded by `max_rows + 1` and folds the outcome
/// into a verdict.
///
/// The statement must already carry its `LIMIT`. A verdict fails when any
/// row comes back; the sample holds at most `max_rows` rows and the
/// truncation flag records whether more existed.
pub(crate) async fn error_rows_verdict(
    engine: &dyn Engine,
    sql: &str,
    max_rows: usize,
    count_key: &str,
    what: &str,
) -> Result<Verdict> {
    let rows = engine.run_sql(sql).await?;
    let observed = rows.len();
    let truncated = observed > max_rows;

    if observed == 0 {
        return Ok(Verdict::pass().with_metric(count_key, Scalar::Int(0)));
    }

    let shown = observed.min(max_rows);
    let qualifier = if truncated { "at least " } else { "" };
    Ok(Verdict::fail(format!("{qualifier}{observed} {what}"))
        .with_metric(count_key, Scalar::Int(observed as i64))
        .with_sample(ErrorSample {
            rows: rows.json_rows(shown),
            truncated,
        }))
}
