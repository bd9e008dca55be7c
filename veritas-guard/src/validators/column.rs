//! Column-level validators.
//!
//! Metric-backed validators here fold into the batched metric query; the
//! custom ones (value sets, regex matching, row-wise comparisons, outliers)
//! collect offending rows with their own statements.

use super::{
    combine_predicates, count_or_zero, error_rows_verdict, Validator, ValidatorKind,
    ValidatorOptions, Verdict, DEFAULT_MAX_ERROR_ROWS,
};
use crate::engines::Engine;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use veritas_core::sql::guard::validate_identifier;
use veritas_core::prelude::*;

/// Comparison operators for [`ColumnDistinctCount`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CmpOp {
    #[default]
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
}

impl CmpOp {
    fn evaluate(&self, lhs: i64, rhs: i64) -> bool {
        match self {
            CmpOp::Eq => lhs == rhs,
            CmpOp::Ge => lhs >= rhs,
            CmpOp::Le => lhs <= rhs,
            CmpOp::Gt => lhs > rhs,
            CmpOp::Lt => lhs < rhs,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ge => ">=",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Lt => "<",
        }
    }
}

/// Passes when no NULLs are present in the column.
///
/// # Examples
///
/// ```rust
/// use veritas_guard::validators::ColumnNotNull;
///
/// let validator = ColumnNotNull::new("user_id");
/// ```
#[derive(Debug, Clone)]
pub struct ColumnNotNull {
    column: String,
    opts: ValidatorOptions,
}

impl ColumnNotNull {
    pub fn new(column: impl Into<String>) -> Self {
        Self::with_options(column, ValidatorOptions::new())
    }

    pub fn with_options(column: impl Into<String>, opts: ValidatorOptions) -> Self {
        Self {
            column: column.into(),
            opts,
        }
    }
}

#[async_trait]
impl Validator for ColumnNotNull {
    fn name(&self) -> &'static str {
        "ColumnNotNull"
    }

    fn kind(&self) -> ValidatorKind {
        ValidatorKind::Metric
    }

    fn options(&self) -> &ValidatorOptions {
        &self.opts
    }

    fn column(&self) -> Option<&str> {
        Some(&self.column)
    }

    fn metric_plans(&self) -> Result<Vec<MetricPlan>> {
        Ok(vec![MetricPlan::new("null_cnt", &self.column)
            .with_filter(self.opts.where_sql.clone())])
    }

    fn interpret(&self, values: &[Scalar]) -> Result<Verdict> {
        let null_cnt = count_or_zero(values.first());
        let verdict = if null_cnt == 0 {
            Verdict::pass()
        } else {
            Verdict::fail(format!(
                "column '{}' has {null_cnt} NULL values",
                self.column
            ))
        };
        Ok(verdict.with_metric("null_cnt", Scalar::Int(null_cnt)))
    }
}

/// Passes when the NULL fraction of the column is at most `max_null_pct`.
#[derive(Debug, Clone)]
pub struct ColumnNullPct {
    column: String,
    max_null_pct: f64,
    opts: ValidatorOptions,
}

impl ColumnNullPct {
    /// # Panics
    ///
    /// Panics if `max_null_pct` is outside `0.0..=1.0`.
    pub fn new(column: impl Into<String>, max_null_pct: f64) -> Self {
        Self::with_options(column, max_null_pct, ValidatorOptions::new())
    }

    pub fn with_options(
        column: impl Into<String>,
        max_null_pct: f64,
        opts: ValidatorOptions,
    ) -> Self {
        assert!(
            (0.0..=1.0).contains(&max_null_pct),
            "max_null_pct must be between 0.0 and 1.0"
        );
        Self {
            column: column.into(),
            max_null_pct,
            opts,
        }
    }
}

#[async_trait]
impl Validator for ColumnNullPct {
    fn name(&self) -> &'static str {
        "ColumnNullPct"
    }

    fn kind(&self) -> ValidatorKind {
        ValidatorKind::Metric
    }

    fn options(&self) -> &ValidatorOptions {
        &self.opts
    }

    fn column(&self) -> Option<&str> {
        Some(&self.column)
    }

    fn metric_plans(&self) -> Result<Vec<MetricPlan>> {
        Ok(vec![MetricPlan::new("null_pct", &self.column)
            .with_filter(self.opts.where_sql.clone())])
    }

    fn interpret(&self, values: &[Scalar]) -> Result<Verdict> {
        let observed = match values.first() {
            // NULL ratio means the table had no rows; nothing to violate.
            Some(Scalar::Null) | None => {
                return Ok(Verdict::pass().with_message("no rows to evaluate"))
            }
            Some(v) => v.as_f64().ok_or_else(|| {
                VeritasError::Internal(format!("null_pct returned non-numeric value {v}"))
            })?,
        };
        let verdict = if observed <= self.max_null_pct {
            Verdict::pass()
        } else {
            Verdict::fail(format!(
                "column '{}' NULL fraction {observed:.4} exceeds {:.4}",
                self.column, self.max_null_pct
            ))
        };
        Ok(verdict.with_metric("null_pct", Scalar::Float(observed)))
    }
}

/// Compares `COUNT(DISTINCT column)` against an expected value.
#[derive(Debug, Clone)]
pub struct ColumnDistinctCount {
    column: String,
    expected: i64,
    op: CmpOp,
    opts: ValidatorOptions,
}

impl ColumnDistinctCount {
    pub fn new(column: impl Into<String>, expected: i64, op: CmpOp) -> Self {
        Self::with_options(column, expected, op, ValidatorOptions::new())
    }

    pub fn with_options(
        column: impl Into<String>,
        expected: i64,
        op: CmpOp,
        opts: ValidatorOptions,
    ) -> Self {
        Self {
            column: column.into(),
            expected,
            op,
            opts,
        }
    }
}

#[async_trait]
impl Validator for ColumnDistinctCount {
    fn name(&self) -> &'static str {
        "ColumnDistinctCount"
    }

    fn kind(&self) -> ValidatorKind {
        ValidatorKind::Metric
    }

    fn options(&self) -> &ValidatorOptions {
        &self.opts
    }

    fn column(&self) -> Option<&str> {
        Some(&self.column)
    }

    fn metric_plans(&self) -> Result<Vec<MetricPlan>> {
        Ok(vec![MetricPlan::new("distinct_cnt", &self.column)
            .with_filter(self.opts.where_sql.clone())])
    }

    fn interpret(&self, values: &[Scalar]) -> Result<Verdict> {
        let distinct_cnt = count_or_zero(values.first());
        let verdict = if self.op.evaluate(distinct_cnt, self.expected) {
            Verdict::pass()
        } else {
            Verdict::fail(format!(
                "column '{}' distinct count {distinct_cnt} violates {} {}",
                self.column,
                self.op.as_str(),
                self.expected
            ))
        };
        Ok(verdict.with_metric("distinct_cnt", Scalar::Int(distinct_cnt)))
    }
}

/// Passes when `MIN(column)` respects the lower bound.
#[derive(Debug, Clone)]
pub struct ColumnMin {
    column: String,
    min_value: f64,
    strict: bool,
    opts: ValidatorOptions,
}

impl ColumnMin {
    pub fn new(column: impl Into<String>, min_value: f64, strict: bool) -> Self {
        Self::with_options(column, min_value, strict, ValidatorOptions::new())
    }

    pub fn with_options(
        column: impl Into<String>,
        min_value: f64,
        strict: bool,
        opts: ValidatorOptions,
    ) -> Self {
        Self {
            column: column.into(),
            min_value,
            strict,
            opts,
        }
    }
}

#[async_trait]
impl Validator for ColumnMin {
    fn name(&self) -> &'static str {
        "ColumnMin"
    }

    fn kind(&self) -> ValidatorKind {
        ValidatorKind::Metric
    }

    fn options(&self) -> &ValidatorOptions {
        &self.opts
    }

    fn column(&self) -> Option<&str> {
        Some(&self.column)
    }

    fn metric_plans(&self) -> Result<Vec<MetricPlan>> {
        Ok(vec![
            MetricPlan::new("min", &self.column).with_filter(self.opts.where_sql.clone())
        ])
    }

    fn interpret(&self, values: &[Scalar]) -> Result<Verdict> {
        interpret_bound(
            "min",
            &self.column,
            values.first(),
            self.min_value,
            self.strict,
            BoundSide::Lower,
        )
    }
}

/// Passes when `MAX(column)` respects the upper bound.
#[derive(Debug, Clone)]
pub struct ColumnMax {
    column: String,
    max_value: f64,
    strict: bool,
    opts: ValidatorOptions,
}

impl ColumnMax {
    pub fn new(column: impl Into<String>, max_value: f64, strict: bool) -> Self {
        Self::with_options(column, max_value, strict, ValidatorOptions::new())
    }

    pub fn with_options(
        column: impl Into<String>,
        max_value: f64,
        strict: bool,
        opts: ValidatorOptions,
    ) -> Self {
        Self {
            column: column.into(),
            max_value,
            strict,
            opts,
        }
    }
}

#[async_trait]
impl Validator for ColumnMax {
    fn name(&self) -> &'static str {
        "ColumnMax"
    }

    fn kind(&self) -> ValidatorKind {
        ValidatorKind::Metric
    }

    fn options(&self) -> &ValidatorOptions {
        &self.opts
    }

    fn column(&self) -> Option<&str> {
        Some(&self.column)
    }

    fn metric_plans(&self) -> Result<Vec<MetricPlan>> {
        Ok(vec![
            MetricPlan::new("max", &self.column).with_filter(self.opts.where_sql.clone())
        ])
    }

    fn interpret(&self, values: &[Scalar]) -> Result<Verdict> {
        interpret_bound(
            "max",
            &self.column,
            values.first(),
            self.max_value,
            self.strict,
            BoundSide::Upper,
        )
    }
}

#[derive(Clone, Copy)]
enum BoundSide {
    Lower,
    Upper,
}

fn interpret_bound(
    metric: &str,
    column: &str,
    value: Option<&Scalar>,
    bound: f64,
    strict: bool,
    side: BoundSide,
) -> Result<Verdict> {
    let observed = match value {
        Some(Scalar::Null) | None => {
            return Ok(Verdict::pass().with_message("no rows to evaluate"))
        }
        Some(v) => match v.as_f64() {
            Some(n) => n,
            None => {
                return Ok(Verdict::fail(format!(
                    "column '{column}' {metric} value '{v}' is not numeric"
                )))
            }
        },
    };
    let ok = match (side, strict) {
        (BoundSide::Lower, false) => observed >= bound,
        (BoundSide::Lower, true) => observed > bound,
        (BoundSide::Upper, false) => observed <= bound,
        (BoundSide::Upper, true) => observed < bound,
    };
    let verdict = if ok {
        Verdict::pass()
    } else {
        let relation = match side {
            BoundSide::Lower => "below",
            BoundSide::Upper => "above",
        };
        Verdict::fail(format!(
            "column '{column}' {metric} {observed} is {relation} bound {bound}"
        ))
    };
    Ok(verdict.with_metric(metric, Scalar::Float(observed)))
}

/// Passes when both `MIN(column)` and `MAX(column)` fall inside the range.
#[derive(Debug, Clone)]
pub struct ColumnRange {
    column: String,
    min_value: f64,
    max_value: f64,
    opts: ValidatorOptions,
}

impl ColumnRange {
    pub fn new(column: impl Into<String>, min_value: f64, max_value: f64) -> Self {
        Self::with_options(column, min_value, max_value, ValidatorOptions::new())
    }

    pub fn with_options(
        column: impl Into<String>,
        min_value: f64,
        max_value: f64,
        opts: ValidatorOptions,
    ) -> Self {
        Self {
            column: column.into(),
            min_value,
            max_value,
            opts,
        }
    }
}

#[async_trait]
impl Validator for ColumnRange {
    fn name(&self) -> &'static str {
        "ColumnRange"
    }

    fn kind(&self) -> ValidatorKind {
        ValidatorKind::Metric
    }

    fn options(&self) -> &ValidatorOptions {
        &self.opts
    }

    fn column(&self) -> Option<&str> {
        Some(&self.column)
    }

    fn metric_plans(&self) -> Result<Vec<MetricPlan>> {
        let filter = self.opts.where_sql.clone();
        Ok(vec![
            MetricPlan::new("min", &self.column).with_filter(filter.clone()),
            MetricPlan::new("max", &self.column).with_filter(filter),
        ])
    }

    fn interpret(&self, values: &[Scalar]) -> Result<Verdict> {
        let (min_v, max_v) = match (values.first(), values.get(1)) {
            (Some(a), Some(b)) if !a.is_null() && !b.is_null() => (a.clone(), b.clone()),
            _ => return Ok(Verdict::pass().with_message("no rows to evaluate")),
        };
        let observed_min = min_v.as_f64();
        let observed_max = max_v.as_f64();
        let verdict = match (observed_min, observed_max) {
            (Some(lo), Some(hi)) => {
                if lo >= self.min_value && hi <= self.max_value {
                    Verdict::pass()
                } else {
                    Verdict::fail(format!(
                        "column '{}' range [{lo}, {hi}] escapes [{}, {}]",
                        self.column, self.min_value, self.max_value
                    ))
                }
            }
            _ => Verdict::fail(format!("column '{}' is not numeric", self.column)),
        };
        Ok(verdict
            .with_metric("min", min_v)
            .with_metric("max", max_v))
    }
}

/// Passes when the observed percentile is within `tolerance` of `expected`.
#[derive(Debug, Clone)]
pub struct ColumnPercentile {
    column: String,
    metric_key: String,
    expected: f64,
    tolerance: f64,
    opts: ValidatorOptions,
}

impl ColumnPercentile {
    pub fn new(column: impl Into<String>, q: f64, expected: f64, tolerance: f64) -> Result<Self> {
        Self::with_options(column, q, expected, tolerance, ValidatorOptions::new())
    }

    pub fn with_options(
        column: impl Into<String>,
        q: f64,
        expected: f64,
        tolerance: f64,
        opts: ValidatorOptions,
    ) -> Result<Self> {
        let metric_key = global_metrics().register_percentile(q)?;
        Ok(Self {
            column: column.into(),
            metric_key,
            expected,
            tolerance,
            opts,
        })
    }
}

#[async_trait]
impl Validator for ColumnPercentile {
    fn name(&self) -> &'static str {
        "ColumnPercentile"
    }

    fn kind(&self) -> ValidatorKind {
        ValidatorKind::Metric
    }

    fn options(&self) -> &ValidatorOptions {
        &self.opts
    }

    fn column(&self) -> Option<&str> {
        Some(&self.column)
    }

    fn metric_plans(&self) -> Result<Vec<MetricPlan>> {
        Ok(vec![MetricPlan::new(&self.metric_key, &self.column)
            .with_filter(self.opts.where_sql.clone())])
    }

    fn interpret(&self, values: &[Scalar]) -> Result<Verdict> {
        let observed = match values.first().and_then(|v| v.as_f64()) {
            Some(n) => n,
            None => return Ok(Verdict::pass().with_message("no rows to evaluate")),
        };
        let verdict = if (observed - self.expected).abs() <= self.tolerance {
            Verdict::pass()
        } else {
            Verdict::fail(format!(
                "column '{}' {} is {observed}, expected {} (tolerance {})",
                self.column, self.metric_key, self.expected, self.tolerance
            ))
        };
        Ok(verdict.with_metric(self.metric_key.clone(), Scalar::Float(observed)))
    }
}

/// Passes when every value is inside `allowed_values`.
///
/// Offending rows are sampled, bounded by `max_error_rows`.
#[derive(Debug, Clone)]
pub struct ColumnValueInSet {
    column: String,
    allowed_values: Vec<String>,
    allow_null: bool,
    max_error_rows: usize,
    opts: ValidatorOptions,
}

impl ColumnValueInSet {
    pub fn new<I, S>(column: impl Into<String>, allowed_values: I, allow_null: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            column: column.into(),
            allowed_values: allowed_values.into_iter().map(Into::into).collect(),
            allow_null,
            max_error_rows: DEFAULT_MAX_ERROR_ROWS,
            opts: ValidatorOptions::new(),
        }
    }

    pub fn with_options(mut self, opts: ValidatorOptions) -> Self {
        self.opts = opts;
        self
    }
}

#[async_trait]
impl Validator for ColumnValueInSet {
    fn name(&self) -> &'static str {
        "ColumnValueInSet"
    }

    fn kind(&self) -> ValidatorKind {
        ValidatorKind::Custom
    }

    fn options(&self) -> &ValidatorOptions {
        &self.opts
    }

    fn column(&self) -> Option<&str> {
        Some(&self.column)
    }

    async fn execute(&self, engine: &dyn Engine, table: &str) -> Result<Verdict> {
        validate_identifier(&self.column)?;
        if self.allowed_values.is_empty() {
            return Err(VeritasError::config(
                "allowed_values must not be empty".to_string(),
            ));
        }
        let quoted: Vec<String> = self
            .allowed_values
            .iter()
            .map(|v| format!("'{}'", v.replace('\'', "''")))
            .collect();
        let mut condition = format!("{} NOT IN ({})", self.column, quoted.join(", "));
        if !self.allow_null {
            condition = format!("({condition} OR {} IS NULL)", self.column);
        }
        let condition = combine_predicates(self.opts.where_sql.as_deref(), &condition);
        let sql = format!(
            "SELECT * FROM {table} WHERE {condition} LIMIT {}",
            self.max_error_rows + 1
        );
        error_rows_verdict(
            engine,
            &sql,
            self.max_error_rows,
            "invalid_cnt",
            &format!("rows outside the allowed set for column '{}'", self.column),
        )
        .await
    }
}

/// Passes when every value matches `pattern`.
///
/// The pattern is compiled at construction, so malformed patterns are
/// rejected at load time. NULL values are not counted as mismatches.
#[derive(Debug, Clone)]
pub struct ColumnMatchesRegex {
    column: String,
    pattern: String,
    max_error_rows: usize,
    opts: ValidatorOptions,
}

impl ColumnMatchesRegex {
    pub fn new(column: impl Into<String>, pattern: impl Into<String>) -> Result<Self> {
        Self::with_options(column, pattern, ValidatorOptions::new())
    }

    pub fn with_options(
        column: impl Into<String>,
        pattern: impl Into<String>,
        opts: ValidatorOptions,
    ) -> Result<Self> {
        let pattern = pattern.into();
        regex::Regex::new(&pattern)
            .map_err(|e| VeritasError::config(format!("invalid regex '{pattern}': {e}")))?;
        Ok(Self {
            column: column.into(),
            pattern,
            max_error_rows: DEFAULT_MAX_ERROR_ROWS,
            opts,
        })
    }
}

#[async_trait]
impl Validator for ColumnMatchesRegex {
    fn name(&self) -> &'static str {
        "ColumnMatchesRegex"
    }

    fn kind(&self) -> ValidatorKind {
        ValidatorKind::Custom
    }

    fn options(&self) -> &ValidatorOptions {
        &self.opts
    }

    fn column(&self) -> Option<&str> {
        Some(&self.column)
    }

    async fn execute(&self, engine: &dyn Engine, table: &str) -> Result<Verdict> {
        validate_identifier(&self.column)?;
        let condition = format!(
            "NOT {}({}, '{}')",
            engine.dialect().regexp_fn(),
            self.column,
            self.pattern.replace('\'', "''")
        );
        let condition = combine_predicates(self.opts.where_sql.as_deref(), &condition);
        let sql = format!(
            "SELECT * FROM {table} WHERE {condition} LIMIT {}",
            self.max_error_rows + 1
        );
        error_rows_verdict(
            engine,
            &sql,
            self.max_error_rows,
            "mismatch_cnt",
            &format!("rows not matching pattern on column '{}'", self.column),
        )
        .await
    }
}

/// Passes when `column >= other_column` holds row-wise.
#[derive(Debug, Clone)]
pub struct ColumnGreaterEqual {
    column: String,
    other_column: String,
    opts: ValidatorOptions,
}

impl ColumnGreaterEqual {
    pub fn new(column: impl Into<String>, other_column: impl Into<String>) -> Self {
        Self::with_options(column, other_column, ValidatorOptions::new())
    }

    pub fn with_options(
        column: impl Into<String>,
        other_column: impl Into<String>,
        opts: ValidatorOptions,
    ) -> Self {
        Self {
            column: column.into(),
            other_column: other_column.into(),
            opts,
        }
    }
}

#[async_trait]
impl Validator for ColumnGreaterEqual {
    fn name(&self) -> &'static str {
        "ColumnGreaterEqual"
    }

    fn kind(&self) -> ValidatorKind {
        ValidatorKind::Custom
    }

    fn options(&self) -> &ValidatorOptions {
        &self.opts
    }

    fn column(&self) -> Option<&str> {
        Some(&self.column)
    }

    async fn execute(&self, engine: &dyn Engine, table: &str) -> Result<Verdict> {
        validate_identifier(&self.column)?;
        validate_identifier(&self.other_column)?;
        let mut sql = format!(
            "SELECT SUM(CASE WHEN {} < {} THEN 1 ELSE 0 END) AS violations FROM {table}",
            self.column, self.other_column
        );
        if let Some(where_sql) = &self.opts.where_sql {
            sql.push_str(&format!(" WHERE {where_sql}"));
        }
        let rows = engine.run_sql(&sql).await?;
        let violations = count_or_zero(rows.scalar());
        let verdict = if violations == 0 {
            Verdict::pass()
        } else {
            Verdict::fail(format!(
                "{violations} rows have {} < {}",
                self.column, self.other_column
            ))
        };
        Ok(verdict.with_metric("violation_cnt", Scalar::Int(violations)))
    }
}

/// Collects rows whose value lies more than `z_thresh` standard deviations
/// from the column mean.
#[derive(Debug, Clone)]
pub struct ColumnZScoreOutlierRows {
    column: String,
    z_thresh: f64,
    max_error_rows: usize,
    opts: ValidatorOptions,
}

impl ColumnZScoreOutlierRows {
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            z_thresh: 3.0,
            max_error_rows: DEFAULT_MAX_ERROR_ROWS,
            opts: ValidatorOptions::new(),
        }
    }

    pub fn with_threshold(mut self, z_thresh: f64) -> Self {
        self.z_thresh = z_thresh;
        self
    }

    pub fn with_options(mut self, opts: ValidatorOptions) -> Self {
        self.opts = opts;
        self
    }
}

#[async_trait]
impl Validator for ColumnZScoreOutlierRows {
    fn name(&self) -> &'static str {
        "ColumnZScoreOutlierRows"
    }

    fn kind(&self) -> ValidatorKind {
        ValidatorKind::Custom
    }

    fn options(&self) -> &ValidatorOptions {
        &self.opts
    }

    fn column(&self) -> Option<&str> {
        Some(&self.column)
    }

    async fn execute(&self, engine: &dyn Engine, table: &str) -> Result<Verdict> {
        validate_identifier(&self.column)?;
        let col = &self.column;
        let stats_where = match &self.opts.where_sql {
            Some(w) => format!(" WHERE {w}"),
            None => String::new(),
        };
        let outer_extra = match &self.opts.where_sql {
            Some(w) => format!(" AND ({w})"),
            None => String::new(),
        };
        let sql = format!(
            "SELECT t.* FROM {table} t CROSS JOIN \
             (SELECT AVG({col}) AS mu, STDDEV({col}) AS sigma FROM {table}{stats_where}) s \
             WHERE s.sigma > 0 AND ABS(t.{col} - s.mu) > {z} * s.sigma{outer_extra} \
             LIMIT {limit}",
            z = self.z_thresh,
            limit = self.max_error_rows + 1
        );
        error_rows_verdict(
            engine,
            &sql,
            self.max_error_rows,
            "outlier_cnt",
            &format!(
                "rows beyond {} standard deviations on column '{col}'",
                self.z_thresh
            ),
        )
        .await
    }
}
