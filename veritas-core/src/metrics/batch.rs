//! Batch builder: fuses many metric requests into a single SELECT.
//!
//! Each request names a registered metric, the columns it applies to, a
//! batch-unique alias, and an optional row filter. The builder emits exactly
//! one statement per call regardless of how many distinct filters appear;
//! filtered requests have their aggregates rewritten in place so the whole
//! batch still runs as one scan of the table.

use crate::error::{Result, VeritasError};
use crate::metrics::registry::{global_metrics, MetricSet};
use crate::sql::guard::validate_filter_sql;
use crate::sql::{AggFunc, Dialect, SelectStatement, SqlExpr};
use std::collections::HashSet;

/// A metric application before the runner assigns an alias.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricPlan {
    /// Registered metric key.
    pub metric: String,
    /// Columns handed to the builder. `["*"]` for table-level metrics.
    pub columns: Vec<String>,
    /// Optional boolean predicate applied to this request only.
    pub filter_sql: Option<String>,
}

impl MetricPlan {
    /// A plan over a single column (or `"*"`).
    pub fn new(metric: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            metric: metric.into(),
            columns: vec![column.into()],
            filter_sql: None,
        }
    }

    /// A plan over multiple columns.
    pub fn multi<I, S>(metric: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            metric: metric.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            filter_sql: None,
        }
    }

    /// Attaches a per-request filter.
    pub fn with_filter(mut self, filter_sql: Option<String>) -> Self {
        self.filter_sql = filter_sql;
        self
    }

    /// Turns this plan into a request with the given alias.
    pub fn into_request(self, alias: impl Into<String>) -> MetricRequest {
        MetricRequest {
            metric: self.metric,
            columns: self.columns,
            alias: alias.into(),
            filter_sql: self.filter_sql,
        }
    }
}

/// One metric application with an alias and optional filter.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRequest {
    /// Registered metric key.
    pub metric: String,
    /// Columns handed to the builder. `["*"]` for table-level metrics.
    pub columns: Vec<String>,
    /// Alias for the projected expression; unique within a batch.
    pub alias: String,
    /// Optional boolean predicate applied to this request only.
    pub filter_sql: Option<String>,
}

impl MetricRequest {
    /// A request over a single column (or `"*"`).
    pub fn new(
        metric: impl Into<String>,
        column: impl Into<String>,
        alias: impl Into<String>,
    ) -> Self {
        Self {
            metric: metric.into(),
            columns: vec![column.into()],
            alias: alias.into(),
            filter_sql: None,
        }
    }

    /// Attaches a per-request filter.
    pub fn with_filter(mut self, filter_sql: impl Into<String>) -> Self {
        self.filter_sql = Some(filter_sql.into());
        self
    }
}

/// Converts many [`MetricRequest`]s into a single query.
pub struct MetricBatchBuilder<'a> {
    table: String,
    requests: Vec<MetricRequest>,
    metrics: &'a MetricSet,
}

impl<'a> MetricBatchBuilder<'a> {
    /// Creates a builder over the process-wide metric set.
    pub fn new(table: impl Into<String>, requests: Vec<MetricRequest>) -> Self {
        Self::with_metrics(table, requests, global_metrics())
    }

    /// Creates a builder over an injected metric set.
    pub fn with_metrics(
        table: impl Into<String>,
        requests: Vec<MetricRequest>,
        metrics: &'a MetricSet,
    ) -> Self {
        Self {
            table: table.into(),
            requests,
            metrics,
        }
    }

    /// Builds the statement AST.
    ///
    /// Projected expressions appear in input order. When every request
    /// carries the identical filter a single global `WHERE` is emitted and
    /// the per-request rewrite is skipped.
    pub fn build(&self) -> Result<SelectStatement> {
        if self.requests.is_empty() {
            return Err(VeritasError::invalid_metric(
                "metric batch requires at least one request",
            ));
        }

        let mut seen = HashSet::new();
        for req in &self.requests {
            if !seen.insert(req.alias.as_str()) {
                return Err(VeritasError::DuplicateAlias {
                    alias: req.alias.clone(),
                });
            }
        }
        for req in &self.requests {
            if let Some(filter) = &req.filter_sql {
                validate_filter_sql(filter)?;
            }
        }

        let shared_filter = self.shared_filter();
        let mut stmt = SelectStatement::new(self.table.clone());
        for req in &self.requests {
            let builder = self.metrics.get(&req.metric)?;
            let expr = builder(&req.columns)?;
            if !expr.contains_aggregate() {
                return Err(VeritasError::invalid_metric(format!(
                    "metric '{}' did not produce an aggregate expression",
                    req.metric
                )));
            }
            let expr = match (&req.filter_sql, &shared_filter) {
                (_, Some(_)) | (None, _) => expr,
                (Some(filter), None) => apply_filter(&expr, &SqlExpr::Raw(filter.clone()))?,
            };
            stmt.project(expr, req.alias.clone());
        }
        stmt.where_clause = shared_filter.map(SqlExpr::Raw);
        Ok(stmt)
    }

    /// Builds and renders the statement for `dialect`.
    pub fn sql(&self, dialect: Dialect) -> Result<String> {
        Ok(self.build()?.render(dialect))
    }

    /// Returns the filter shared by every request, if any.
    fn shared_filter(&self) -> Option<String> {
        let first = self.requests.first()?.filter_sql.as_ref()?;
        if self
            .requests
            .iter()
            .all(|r| r.filter_sql.as_deref() == Some(first.as_str()))
        {
            Some(first.clone())
        } else {
            None
        }
    }
}

/// Rewrites every aggregate in `expr` so it only observes rows matching
/// `filter`.
///
/// Rules:
/// - `COUNT(*)`          becomes `SUM(CASE WHEN f THEN 1 ELSE 0 END)`
/// - `COUNT(x)`          becomes `SUM(CASE WHEN f AND x IS NOT NULL THEN 1 ELSE 0 END)`
/// - `COUNT(DISTINCT x)` becomes `COUNT(DISTINCT CASE WHEN f THEN x END)`
/// - `SUM/AVG/MIN/MAX/STDDEV(x)` wrap `x` as `CASE WHEN f THEN x END`
///
/// Ratio nodes, arithmetic, function calls and `CASE` branches are recursed
/// into so composite metrics rewrite each of their aggregates independently.
pub fn apply_filter(expr: &SqlExpr, filter: &SqlExpr) -> Result<SqlExpr> {
    expr.rewrite(&mut |node| match node {
        SqlExpr::Agg {
            func,
            args,
            distinct,
        } => Some(rewrite_aggregate(func, args, *distinct, filter)),
        _ => None,
    })
}

fn rewrite_aggregate(
    func: &AggFunc,
    args: &[SqlExpr],
    distinct: bool,
    filter: &SqlExpr,
) -> Result<SqlExpr> {
    if args.is_empty() {
        return Err(VeritasError::invalid_metric(
            "aggregate with no arguments cannot be filtered",
        ));
    }

    if matches!(func, AggFunc::Count) && !distinct {
        // COUNT collapses to a conditional SUM; the non-null condition on the
        // argument preserves COUNT's NULL-skipping behavior.
        let mut cond = filter.clone();
        for arg in args {
            if !matches!(arg, SqlExpr::Star) {
                cond = SqlExpr::and(cond, SqlExpr::is_not_null(arg.clone()));
            }
        }
        return Ok(SqlExpr::sum(SqlExpr::case_when(
            cond,
            SqlExpr::int(1),
            Some(SqlExpr::int(0)),
        )));
    }

    if matches!(func, AggFunc::Percentile(_)) {
        let mut new_args = args.to_vec();
        new_args[0] = SqlExpr::case_when(filter.clone(), new_args[0].clone(), None);
        return Ok(SqlExpr::Agg {
            func: func.clone(),
            args: new_args,
            distinct,
        });
    }

    let wrapped: Vec<SqlExpr> = args
        .iter()
        .map(|arg| {
            if matches!(arg, SqlExpr::Star) {
                Err(VeritasError::invalid_metric(
                    "'*' is only valid inside COUNT",
                ))
            } else {
                Ok(SqlExpr::case_when(filter.clone(), arg.clone(), None))
            }
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(SqlExpr::Agg {
        func: func.clone(),
        args: wrapped,
        distinct,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn sql_of(requests: Vec<MetricRequest>) -> Result<String> {
        MetricBatchBuilder::new("users", requests).sql(Dialect::Generic)
    }

    #[test]
    fn test_two_filtered_metrics_one_scan() {
        let sql = sql_of(vec![
            MetricRequest::new("row_cnt", "*", "total"),
            MetricRequest::new("row_cnt", "*", "active").with_filter("status = 'active'"),
        ])
        .unwrap();
        assert_eq!(
            sql,
            "SELECT COUNT(*) AS total, \
             SUM(CASE WHEN (status = 'active') THEN 1 ELSE 0 END) AS active \
             FROM users"
        );
    }

    #[test]
    fn test_projection_count_matches_input_order() {
        let stmt = MetricBatchBuilder::new(
            "t",
            vec![
                MetricRequest::new("max", "a", "v0"),
                MetricRequest::new("min", "a", "v1"),
                MetricRequest::new("row_cnt", "*", "v2"),
            ],
        )
        .build()
        .unwrap();
        let aliases: Vec<&str> = stmt.projections.iter().map(|(_, a)| a.as_str()).collect();
        assert_eq!(aliases, vec!["v0", "v1", "v2"]);
    }

    #[test]
    fn test_duplicate_alias_rejected() {
        let err = sql_of(vec![
            MetricRequest::new("row_cnt", "*", "v0"),
            MetricRequest::new("min", "a", "v0"),
        ])
        .unwrap_err();
        assert!(matches!(err, VeritasError::DuplicateAlias { .. }));
    }

    #[test]
    fn test_unknown_metric_rejected() {
        let err = sql_of(vec![MetricRequest::new("no_such_metric", "a", "v0")]).unwrap_err();
        assert!(matches!(err, VeritasError::UnknownMetric { .. }));
    }

    #[test]
    fn test_shared_filter_emits_single_where() {
        let sql = sql_of(vec![
            MetricRequest::new("row_cnt", "*", "v0").with_filter("region = 'eu'"),
            MetricRequest::new("min", "amount", "v1").with_filter("region = 'eu'"),
        ])
        .unwrap();
        assert_eq!(
            sql,
            "SELECT COUNT(*) AS v0, MIN(amount) AS v1 FROM users WHERE (region = 'eu')"
        );
    }

    #[test]
    fn test_filtered_count_column_keeps_null_skipping() {
        let sql = sql_of(vec![
            MetricRequest::new("non_null_cnt", "email", "v0").with_filter("age >= 18")
        ])
        .unwrap();
        assert_eq!(
            sql,
            "SELECT SUM(CASE WHEN ((age >= 18) AND email IS NOT NULL) THEN 1 ELSE 0 END) AS v0 \
             FROM users"
        );
    }

    #[test]
    fn test_filtered_count_distinct() {
        let sql = sql_of(vec![
            MetricRequest::new("distinct_cnt", "city", "v0").with_filter("age >= 18")
        ])
        .unwrap();
        assert_eq!(
            sql,
            "SELECT COUNT(DISTINCT CASE WHEN (age >= 18) THEN city END) AS v0 FROM users"
        );
    }

    #[test]
    fn test_filtered_min_wraps_argument() {
        let sql =
            sql_of(vec![MetricRequest::new("min", "amount", "v0").with_filter("a = 1")]).unwrap();
        assert_eq!(
            sql,
            "SELECT MIN(CASE WHEN (a = 1) THEN amount END) AS v0 FROM users"
        );
    }

    #[test]
    fn test_filtered_ratio_recurses_both_sides() {
        let sql =
            sql_of(vec![MetricRequest::new("null_pct", "a", "v0").with_filter("b = 1")]).unwrap();
        assert_eq!(
            sql,
            "SELECT (CAST(SUM(CASE WHEN (b = 1) THEN CASE WHEN a IS NULL THEN 1 ELSE 0 END END) AS DOUBLE) \
             / SUM(CASE WHEN (b = 1) THEN 1 ELSE 0 END)) AS v0 FROM users"
        );
    }

    #[test]
    fn test_non_aggregate_metric_rejected() {
        let set = MetricSet::with_builtins();
        let bare: crate::metrics::MetricBuilder =
            Arc::new(|cols: &[String]| Ok(SqlExpr::col(&cols[0])));
        set.register("bare_column", bare).unwrap();
        let err = MetricBatchBuilder::with_metrics(
            "t",
            vec![MetricRequest::new("bare_column", "a", "v0")],
            &set,
        )
        .build()
        .unwrap_err();
        assert!(matches!(err, VeritasError::InvalidMetric { .. }));
    }

    #[test]
    fn test_unsafe_filter_rejected() {
        let err = sql_of(vec![
            MetricRequest::new("row_cnt", "*", "v0").with_filter("1=1; DROP TABLE users")
        ])
        .unwrap_err();
        assert!(matches!(err, VeritasError::Config(_)));
    }

    #[test]
    fn test_empty_batch_rejected() {
        assert!(sql_of(vec![]).is_err());
    }
}
