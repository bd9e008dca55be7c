//! Metric registry: metric key to SQL-expression-builder mapping.
//!
//! A metric is a named, reusable aggregate expression builder. Builders are
//! content-free: given column names they return a fresh [`SqlExpr`] whose
//! top level is an aggregate (or a ratio of aggregates). The registry is
//! shared mutable state guarded by a mutex; builders are handed out as `Arc`
//! clones, so entries in flight are never replaced under a caller.

use crate::error::{Result, VeritasError};
use crate::sql::guard::validate_filter_sql;
use crate::sql::{AggFunc, BinOp, SqlExpr};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// A function turning column names into an aggregate SQL expression.
pub type MetricBuilder = Arc<dyn Fn(&[String]) -> Result<SqlExpr> + Send + Sync>;

/// A mapping from metric key to [`MetricBuilder`].
///
/// A process-wide instance is available through [`global_metrics`]; tests and
/// embedding applications may construct their own set and inject it into the
/// batch builder instead.
pub struct MetricSet {
    metrics: Mutex<HashMap<String, MetricBuilder>>,
}

impl std::fmt::Debug for MetricSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricSet")
            .field("keys", &self.keys())
            .finish()
    }
}

impl MetricSet {
    /// Creates an empty metric set.
    pub fn new() -> Self {
        Self {
            metrics: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a metric set preloaded with the built-in metrics.
    pub fn with_builtins() -> Self {
        let set = Self::new();
        set.install_builtins();
        set
    }

    /// Registers `builder` under `key`.
    ///
    /// Registering the identical builder object twice is a no-op; registering
    /// a different builder under an existing key fails with
    /// [`VeritasError::DuplicateMetric`].
    pub fn register(&self, key: impl Into<String>, builder: MetricBuilder) -> Result<()> {
        let key = key.into();
        let mut metrics = self.metrics.lock().expect("metric registry poisoned");
        if let Some(existing) = metrics.get(&key) {
            if Arc::ptr_eq(existing, &builder) {
                return Ok(());
            }
            return Err(VeritasError::DuplicateMetric { key });
        }
        metrics.insert(key, builder);
        Ok(())
    }

    /// Looks up the builder registered under `key`.
    pub fn get(&self, key: &str) -> Result<MetricBuilder> {
        let metrics = self.metrics.lock().expect("metric registry poisoned");
        metrics
            .get(key)
            .cloned()
            .ok_or_else(|| VeritasError::UnknownMetric {
                key: key.to_string(),
            })
    }

    /// Returns true if `key` is registered.
    pub fn contains(&self, key: &str) -> bool {
        self.metrics
            .lock()
            .expect("metric registry poisoned")
            .contains_key(key)
    }

    /// Returns all registered metric keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let metrics = self.metrics.lock().expect("metric registry poisoned");
        let mut keys: Vec<String> = metrics.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Registers a `pct_where` style metric under `key`.
    ///
    /// The synthesized expression is the fraction of rows for which the
    /// predicate holds: `SUM(CASE WHEN p THEN 1 ELSE 0 END) / NULLIF(COUNT(*), 0)`.
    pub fn register_pct_where(
        &self,
        key: impl Into<String>,
        predicate_sql: impl Into<String>,
    ) -> Result<()> {
        let predicate = predicate_sql.into();
        validate_filter_sql(&predicate)?;
        let builder: MetricBuilder = Arc::new(move |_cols| {
            let matched = SqlExpr::sum(SqlExpr::case_when(
                SqlExpr::Raw(predicate.clone()),
                SqlExpr::int(1),
                Some(SqlExpr::int(0)),
            ));
            let total = SqlExpr::Func {
                name: "NULLIF".to_string(),
                args: vec![SqlExpr::count_star(), SqlExpr::int(0)],
            };
            Ok(SqlExpr::div(matched, total))
        });
        self.register(key, builder)
    }

    /// Registers a continuous percentile metric for quantile `q` and returns
    /// its key (`pct_<q*100>`). Re-registering an existing quantile is a
    /// no-op.
    pub fn register_percentile(&self, q: f64) -> Result<String> {
        if !(0.0..=1.0).contains(&q) {
            return Err(VeritasError::config("quantile must be between 0 and 1"));
        }
        let key = format!("pct_{}", (q * 100.0).round() as i64);
        let mut metrics = self.metrics.lock().expect("metric registry poisoned");
        metrics.entry(key.clone()).or_insert_with(|| {
            Arc::new(move |cols: &[String]| -> Result<SqlExpr> {
                let column = single_column("percentile", cols)?;
                Ok(SqlExpr::agg(AggFunc::Percentile(q), SqlExpr::col(column)))
            })
        });
        Ok(key)
    }

    fn install_builtins(&self) {
        let mut metrics = self.metrics.lock().expect("metric registry poisoned");

        let mut add = |key: &str, builder: MetricBuilder| {
            metrics.insert(key.to_string(), builder);
        };

        add("row_cnt", Arc::new(|_cols| Ok(SqlExpr::count_star())));
        add(
            "null_cnt",
            Arc::new(|cols| {
                let column = single_column("null_cnt", cols)?;
                Ok(null_count_expr(column))
            }),
        );
        add(
            "null_pct",
            Arc::new(|cols| {
                let column = single_column("null_pct", cols)?;
                Ok(SqlExpr::div(null_count_expr(column), SqlExpr::count_star()))
            }),
        );
        add(
            "non_null_cnt",
            Arc::new(|cols| {
                let column = single_column("non_null_cnt", cols)?;
                Ok(SqlExpr::count(SqlExpr::col(column)))
            }),
        );
        add(
            "distinct_cnt",
            Arc::new(|cols| {
                let columns = at_least_one_column("distinct_cnt", cols)?;
                Ok(SqlExpr::count_distinct(columns))
            }),
        );
        add(
            "duplicate_cnt",
            Arc::new(|cols| {
                let column = single_column("duplicate_cnt", cols)?;
                Ok(SqlExpr::binary(
                    BinOp::Sub,
                    SqlExpr::count_star(),
                    SqlExpr::count_distinct(vec![SqlExpr::col(column)]),
                ))
            }),
        );
        add(
            "duplicate_row_cnt",
            Arc::new(|cols| {
                let columns = at_least_one_column("duplicate_row_cnt", cols)?;
                Ok(SqlExpr::binary(
                    BinOp::Sub,
                    SqlExpr::count_star(),
                    SqlExpr::count_distinct(columns),
                ))
            }),
        );
        add("min", simple_agg("min", AggFunc::Min));
        add("max", simple_agg("max", AggFunc::Max));
        add("avg", simple_agg("avg", AggFunc::Avg));
        add("stddev", simple_agg("stddev", AggFunc::Stddev));

        add(
            "set_overlap_pct",
            Arc::new(|cols| {
                let (a, b) = column_pair("set_overlap_pct", cols)?;
                let both = SqlExpr::sum(SqlExpr::case_when(
                    SqlExpr::and(
                        SqlExpr::is_not_null(SqlExpr::col(&a)),
                        SqlExpr::is_not_null(SqlExpr::col(&b)),
                    ),
                    SqlExpr::int(1),
                    None,
                ));
                let either = SqlExpr::sum(SqlExpr::case_when(
                    SqlExpr::or(
                        SqlExpr::is_not_null(SqlExpr::col(&a)),
                        SqlExpr::is_not_null(SqlExpr::col(&b)),
                    ),
                    SqlExpr::int(1),
                    None,
                ));
                Ok(SqlExpr::case_when(
                    SqlExpr::binary(BinOp::Eq, either.clone(), SqlExpr::int(0)),
                    SqlExpr::null(),
                    Some(SqlExpr::div(both, either)),
                ))
            }),
        );
        add(
            "missing_values_cnt",
            Arc::new(|cols| {
                let (a, b) = column_pair("missing_values_cnt", cols)?;
                Ok(SqlExpr::sum(SqlExpr::case_when(
                    SqlExpr::and(
                        SqlExpr::is_null(SqlExpr::col(&a)),
                        SqlExpr::is_not_null(SqlExpr::col(&b)),
                    ),
                    SqlExpr::int(1),
                    None,
                )))
            }),
        );
        add(
            "extra_values_cnt",
            Arc::new(|cols| {
                let (a, b) = column_pair("extra_values_cnt", cols)?;
                Ok(SqlExpr::sum(SqlExpr::case_when(
                    SqlExpr::and(
                        SqlExpr::is_not_null(SqlExpr::col(&a)),
                        SqlExpr::is_null(SqlExpr::col(&b)),
                    ),
                    SqlExpr::int(1),
                    None,
                )))
            }),
        );
    }
}

impl Default for MetricSet {
    fn default() -> Self {
        Self::with_builtins()
    }
}

fn null_count_expr(column: &str) -> SqlExpr {
    SqlExpr::sum(SqlExpr::case_when(
        SqlExpr::is_null(SqlExpr::col(column)),
        SqlExpr::int(1),
        Some(SqlExpr::int(0)),
    ))
}

fn simple_agg(key: &'static str, func: AggFunc) -> MetricBuilder {
    Arc::new(move |cols| {
        let column = single_column(key, cols)?;
        Ok(SqlExpr::agg(func.clone(), SqlExpr::col(column)))
    })
}

fn single_column<'a>(metric: &str, cols: &'a [String]) -> Result<&'a str> {
    match cols {
        [c] if c != "*" => Ok(c.as_str()),
        _ => Err(VeritasError::invalid_metric(format!(
            "metric '{metric}' requires exactly one column"
        ))),
    }
}

fn at_least_one_column(metric: &str, cols: &[String]) -> Result<Vec<SqlExpr>> {
    if cols.is_empty() || cols.iter().any(|c| c == "*") {
        return Err(VeritasError::invalid_metric(format!(
            "metric '{metric}' requires at least one named column"
        )));
    }
    Ok(cols.iter().map(SqlExpr::col).collect())
}

fn column_pair(metric: &str, cols: &[String]) -> Result<(String, String)> {
    match cols {
        [a, b] => Ok((a.clone(), b.clone())),
        _ => Err(VeritasError::invalid_metric(format!(
            "metric '{metric}' requires exactly two columns"
        ))),
    }
}

static GLOBAL_METRICS: Lazy<MetricSet> = Lazy::new(MetricSet::with_builtins);

/// Returns the process-wide metric set, preloaded with built-ins.
pub fn global_metrics() -> &'static MetricSet {
    &GLOBAL_METRICS
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::Dialect;

    fn render(set: &MetricSet, key: &str, cols: &[&str]) -> String {
        let cols: Vec<String> = cols.iter().map(|c| c.to_string()).collect();
        set.get(key).unwrap()(&cols).unwrap().render(Dialect::Generic)
    }

    #[test]
    fn test_builtin_shapes() {
        let set = MetricSet::with_builtins();
        assert_eq!(render(&set, "row_cnt", &["*"]), "COUNT(*)");
        assert_eq!(
            render(&set, "null_cnt", &["a"]),
            "SUM(CASE WHEN a IS NULL THEN 1 ELSE 0 END)"
        );
        assert_eq!(
            render(&set, "null_pct", &["a"]),
            "(CAST(SUM(CASE WHEN a IS NULL THEN 1 ELSE 0 END) AS DOUBLE) / COUNT(*))"
        );
        assert_eq!(render(&set, "non_null_cnt", &["a"]), "COUNT(a)");
        assert_eq!(render(&set, "distinct_cnt", &["a"]), "COUNT(DISTINCT a)");
        assert_eq!(
            render(&set, "duplicate_row_cnt", &["a", "b"]),
            "(COUNT(*) - COUNT(DISTINCT a, b))"
        );
        assert_eq!(render(&set, "min", &["a"]), "MIN(a)");
        assert_eq!(render(&set, "max", &["a"]), "MAX(a)");
    }

    #[test]
    fn test_register_get_roundtrip() {
        let set = MetricSet::new();
        let builder: MetricBuilder = Arc::new(|_| Ok(SqlExpr::count_star()));
        set.register("mine", builder.clone()).unwrap();
        let fetched = set.get("mine").unwrap();
        assert!(Arc::ptr_eq(&fetched, &builder));
    }

    #[test]
    fn test_register_identical_is_idempotent() {
        let set = MetricSet::new();
        let builder: MetricBuilder = Arc::new(|_| Ok(SqlExpr::count_star()));
        set.register("mine", builder.clone()).unwrap();
        set.register("mine", builder).unwrap();
    }

    #[test]
    fn test_register_conflict_fails() {
        let set = MetricSet::new();
        let first: MetricBuilder = Arc::new(|_| Ok(SqlExpr::count_star()));
        let second: MetricBuilder = Arc::new(|_| Ok(SqlExpr::count_star()));
        set.register("mine", first).unwrap();
        let err = set.register("mine", second).unwrap_err();
        assert!(matches!(err, VeritasError::DuplicateMetric { .. }));
    }

    #[test]
    fn test_unknown_metric() {
        let set = MetricSet::with_builtins();
        let err = match set.get("nope") {
            Err(e) => e,
            Ok(_) => panic!("expected an error"),
        };
        assert!(matches!(err, VeritasError::UnknownMetric { .. }));
    }

    #[test]
    fn test_pct_where_shape() {
        let set = MetricSet::with_builtins();
        set.register_pct_where("active_pct", "status = 'active'")
            .unwrap();
        assert_eq!(
            render(&set, "active_pct", &["*"]),
            "(CAST(SUM(CASE WHEN (status = 'active') THEN 1 ELSE 0 END) AS DOUBLE) / NULLIF(COUNT(*), 0))"
        );
    }

    #[test]
    fn test_pct_where_rejects_unsafe_predicate() {
        let set = MetricSet::with_builtins();
        assert!(set.register_pct_where("bad", "1=1; DROP TABLE t").is_err());
    }

    #[test]
    fn test_register_percentile_idempotent() {
        let set = MetricSet::with_builtins();
        let key = set.register_percentile(0.9).unwrap();
        assert_eq!(key, "pct_90");
        assert_eq!(set.register_percentile(0.9).unwrap(), "pct_90");
        assert!(set.register_percentile(1.5).is_err());
    }

    #[test]
    fn test_wrong_column_count() {
        let set = MetricSet::with_builtins();
        let cols: Vec<String> = vec![];
        assert!(matches!(
            set.get("null_cnt").unwrap()(&cols).unwrap_err(),
            VeritasError::InvalidMetric { .. }
        ));
    }

    #[test]
    fn test_global_registry_has_builtins() {
        assert!(global_metrics().contains("row_cnt"));
        assert!(global_metrics().contains("null_pct"));
    }
}
