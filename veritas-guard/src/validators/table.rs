//! Table-level validators.

use super::{
    count_or_zero, error_rows_verdict, Validator, ValidatorKind, ValidatorOptions, Verdict,
    DEFAULT_MAX_ERROR_ROWS,
};
use crate::engines::Engine;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use veritas_core::sql::guard::validate_identifier;
use veritas_core::prelude::*;

/// Passes when the table row count lies within `[min_rows, max_rows]`.
/// Either bound can be absent to disable that side.
///
/// # Examples
///
/// ```rust
/// use veritas_guard::validators::RowCountValidator;
///
/// let validator = RowCountValidator::new(Some(1), Some(10_000));
/// ```
#[derive(Debug, Clone)]
pub struct RowCountValidator {
    min_rows: Option<i64>,
    max_rows: Option<i64>,
    opts: ValidatorOptions,
}

impl RowCountValidator {
    /// # Panics
    ///
    /// Panics when both bounds are absent.
    pub fn new(min_rows: Option<i64>, max_rows: Option<i64>) -> Self {
        Self::with_options(min_rows, max_rows, ValidatorOptions::new())
    }

    pub fn with_options(
        min_rows: Option<i64>,
        max_rows: Option<i64>,
        opts: ValidatorOptions,
    ) -> Self {
        assert!(
            min_rows.is_some() || max_rows.is_some(),
            "at least one of min_rows / max_rows must be provided"
        );
        Self {
            min_rows,
            max_rows,
            opts,
        }
    }
}

#[async_trait]
impl Validator for RowCountValidator {
    fn name(&self) -> &'static str {
        "RowCountValidator"
    }

    fn kind(&self) -> ValidatorKind {
        ValidatorKind::Metric
    }

    fn options(&self) -> &ValidatorOptions {
        &self.opts
    }

    fn metric_plans(&self) -> Result<Vec<MetricPlan>> {
        Ok(vec![
            MetricPlan::new("row_cnt", "*").with_filter(self.opts.where_sql.clone())
        ])
    }

    fn interpret(&self, values: &[Scalar]) -> Result<Verdict> {
        let row_cnt = count_or_zero(values.first());
        let mut ok = true;
        if let Some(min) = self.min_rows {
            ok &= row_cnt >= min;
        }
        if let Some(max) = self.max_rows {
            ok &= row_cnt <= max;
        }
        let verdict = if ok {
            Verdict::pass()
        } else {
            Verdict::fail(format!(
                "row count {row_cnt} outside bounds [{}, {}]",
                self.min_rows.map_or("-".to_string(), |v| v.to_string()),
                self.max_rows.map_or("-".to_string(), |v| v.to_string())
            ))
        };
        Ok(verdict.with_metric("row_cnt", Scalar::Int(row_cnt)))
    }
}

/// Passes when `key_columns` uniquely identify every row: the table row
/// count equals the distinct count over the keys.
#[derive(Debug, Clone)]
pub struct PrimaryKeyUniquenessValidator {
    key_columns: Vec<String>,
    opts: ValidatorOptions,
}

impl PrimaryKeyUniquenessValidator {
    /// # Panics
    ///
    /// Panics when `key_columns` is empty.
    pub fn new<I, S>(key_columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_options(key_columns, ValidatorOptions::new())
    }

    pub fn with_options<I, S>(key_columns: I, opts: ValidatorOptions) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let key_columns: Vec<String> = key_columns.into_iter().map(Into::into).collect();
        assert!(!key_columns.is_empty(), "key_columns must not be empty");
        Self { key_columns, opts }
    }
}

#[async_trait]
impl Validator for PrimaryKeyUniquenessValidator {
    fn name(&self) -> &'static str {
        "PrimaryKeyUniquenessValidator"
    }

    fn kind(&self) -> ValidatorKind {
        ValidatorKind::Metric
    }

    fn options(&self) -> &ValidatorOptions {
        &self.opts
    }

    fn metric_plans(&self) -> Result<Vec<MetricPlan>> {
        let filter = self.opts.where_sql.clone();
        Ok(vec![
            MetricPlan::new("row_cnt", "*").with_filter(filter.clone()),
            MetricPlan::multi("distinct_cnt", self.key_columns.clone()).with_filter(filter),
        ])
    }

    fn interpret(&self, values: &[Scalar]) -> Result<Verdict> {
        let row_cnt = count_or_zero(values.first());
        let distinct_cnt = count_or_zero(values.get(1));
        let verdict = if row_cnt == distinct_cnt {
            Verdict::pass()
        } else {
            Verdict::fail(format!(
                "keys ({}) are not unique: {row_cnt} rows, {distinct_cnt} distinct",
                self.key_columns.join(", ")
            ))
        };
        Ok(verdict
            .with_metric("row_cnt", Scalar::Int(row_cnt))
            .with_metric("distinct_cnt", Scalar::Int(distinct_cnt)))
    }
}

/// Passes when no duplicate rows exist across `key_columns`.
///
/// Duplicated key groups are sampled so offenders show up in the result.
#[derive(Debug, Clone)]
pub struct DuplicateRowValidator {
    key_columns: Vec<String>,
    max_error_rows: usize,
    opts: ValidatorOptions,
}

impl DuplicateRowValidator {
    /// # Panics
    ///
    /// Panics when `key_columns` is empty.
    pub fn new<I, S>(key_columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let key_columns: Vec<String> = key_columns.into_iter().map(Into::into).collect();
        assert!(!key_columns.is_empty(), "key_columns must not be empty");
        Self {
            key_columns,
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
impl Validator for DuplicateRowValidator {
    fn name(&self) -> &'static str {
        "DuplicateRowValidator"
    }

    fn kind(&self) -> ValidatorKind {
        ValidatorKind::Custom
    }

    fn options(&self) -> &ValidatorOptions {
        &self.opts
    }

    async fn execute(&self, engine: &dyn Engine, table: &str) -> Result<Verdict> {
        for key in &self.key_columns {
            validate_identifier(key)?;
        }
        let keys = self.key_columns.join(", ");
        let where_clause = match &self.opts.where_sql {
            Some(w) => format!(" WHERE {w}"),
            None => String::new(),
        };
        let sql = format!(
            "SELECT {keys}, COUNT(*) AS dup_cnt FROM {table}{where_clause} \
             GROUP BY {keys} HAVING COUNT(*) > 1 LIMIT {}",
            self.max_error_rows + 1
        );
        error_rows_verdict(
            engine,
            &sql,
            self.max_error_rows,
            "duplicate_group_cnt",
            &format!("duplicated key groups over ({keys})"),
        )
        .await
    }
}

/// Passes when the most recent value of `timestamp_column` is within
/// `max_age` of now.
#[derive(Debug, Clone)]
pub struct TableFreshnessValidator {
    timestamp_column: String,
    max_age: TimeDelta,
    opts: ValidatorOptions,
}

impl TableFreshnessValidator {
    pub fn new(timestamp_column: impl Into<String>, max_age: TimeDelta) -> Self {
        Self::with_options(timestamp_column, max_age, ValidatorOptions::new())
    }

    pub fn with_options(
        timestamp_column: impl Into<String>,
        max_age: TimeDelta,
        opts: ValidatorOptions,
    ) -> Self {
        Self {
            timestamp_column: timestamp_column.into(),
            max_age,
            opts,
        }
    }
}

#[async_trait]
impl Validator for TableFreshnessValidator {
    fn name(&self) -> &'static str {
        "TableFreshnessValidator"
    }

    fn kind(&self) -> ValidatorKind {
        ValidatorKind::Metric
    }

    fn options(&self) -> &ValidatorOptions {
        &self.opts
    }

    fn column(&self) -> Option<&str> {
        Some(&self.timestamp_column)
    }

    fn metric_plans(&self) -> Result<Vec<MetricPlan>> {
        Ok(vec![MetricPlan::new("max", &self.timestamp_column)
            .with_filter(self.opts.where_sql.clone())])
    }

    fn interpret(&self, values: &[Scalar]) -> Result<Verdict> {
        let raw = match values.first() {
            Some(Scalar::Null) | None => {
                return Ok(
                    Verdict::fail("table has no timestamps").with_metric("max", Scalar::Null)
                )
            }
            Some(v) => v.clone(),
        };
        let latest = match parse_timestamp(&raw) {
            Some(ts) => ts,
            None => {
                return Ok(Verdict::fail(format!(
                    "cannot parse '{raw}' from column '{}' as a timestamp",
                    self.timestamp_column
                ))
                .with_metric("max", raw))
            }
        };
        let age = Utc::now() - latest;
        let verdict = if age <= self.max_age {
            Verdict::pass()
        } else {
            Verdict::fail(format!(
                "latest '{}' is {}s old, allowed {}s",
                self.timestamp_column,
                age.num_seconds(),
                self.max_age.num_seconds()
            ))
        };
        Ok(verdict.with_metric("max", raw))
    }
}

/// Parses the engine's display form of a timestamp value.
fn parse_timestamp(value: &Scalar) -> Option<DateTime<Utc>> {
    let text = match value {
        Scalar::Text(t) => t.as_str(),
        _ => return None,
    };
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(ts.and_utc());
        }
        if fmt == "%Y-%m-%d" {
            if let Ok(date) = chrono::NaiveDate::parse_from_str(text, fmt) {
                return Some(date.and_hms_opt(0, 0, 0)?.and_utc());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_count_bounds() {
        let v = RowCountValidator::new(Some(1), Some(10));
        assert!(v.interpret(&[Scalar::Int(5)]).unwrap().passed);
        assert!(!v.interpret(&[Scalar::Int(0)]).unwrap().passed);
        assert!(!v.interpret(&[Scalar::Int(11)]).unwrap().passed);

        let min_only = RowCountValidator::new(Some(6), None);
        assert!(!min_only.interpret(&[Scalar::Int(5)]).unwrap().passed);
        assert!(min_only.interpret(&[Scalar::Int(6)]).unwrap().passed);
    }

    #[test]
    #[should_panic(expected = "at least one of min_rows / max_rows")]
    fn test_row_count_requires_a_bound() {
        RowCountValidator::new(None, None);
    }

    #[test]
    fn test_pk_uniqueness() {
        let v = PrimaryKeyUniquenessValidator::new(["id"]);
        let plans = v.metric_plans().unwrap();
        assert_eq!(plans.len(), 2);
        assert_eq!(plans[0].metric, "row_cnt");
        assert_eq!(plans[1].metric, "distinct_cnt");

        let fail = v.interpret(&[Scalar::Int(3), Scalar::Int(2)]).unwrap();
        assert!(!fail.passed);
        assert_eq!(fail.metric_values["row_cnt"], Scalar::Int(3));
        assert_eq!(fail.metric_values["distinct_cnt"], Scalar::Int(2));

        assert!(v.interpret(&[Scalar::Int(3), Scalar::Int(3)]).unwrap().passed);
    }

    #[test]
    fn test_freshness_interpret() {
        let v = TableFreshnessValidator::new("ts", TimeDelta::hours(1));
        let recent = (Utc::now() - TimeDelta::minutes(5))
            .format("%Y-%m-%dT%H:%M:%S%.6f")
            .to_string();
        assert!(v.interpret(&[Scalar::Text(recent)]).unwrap().passed);

        let stale = (Utc::now() - TimeDelta::hours(2))
            .format("%Y-%m-%dT%H:%M:%S%.6f")
            .to_string();
        assert!(!v.interpret(&[Scalar::Text(stale)]).unwrap().passed);

        assert!(!v.interpret(&[Scalar::Null]).unwrap().passed);
    }
}
