//! Metric drift detection against recorded history.

use super::{Validator, ValidatorKind, ValidatorOptions, Verdict};
use crate::engines::Engine;
use crate::store::ResultStore;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;
use veritas_core::prelude::*;

/// Detects drift in any registered metric via a rolling z-score over prior
/// runs.
///
/// The validator computes the metric's current value with one batched
/// statement, then reads up to `window` historical values for the same
/// (table, column, metric) from an injected read-only store handle. It
/// passes while fewer than five historical points exist, and afterwards
/// while the current value stays within `z_thresh` standard deviations of
/// the recorded mean.
#[derive(Debug, Clone)]
pub struct MetricDriftValidator {
    column: Option<String>,
    metric: String,
    window: usize,
    z_thresh: f64,
    store: Arc<dyn ResultStore>,
    opts: ValidatorOptions,
}

impl MetricDriftValidator {
    /// Creates a drift validator for `metric` over `column` (None for
    /// table-level metrics).
    pub fn new(
        column: Option<String>,
        metric: impl Into<String>,
        store: Arc<dyn ResultStore>,
    ) -> Result<Self> {
        let metric = metric.into();
        if !global_metrics().contains(&metric) {
            return Err(VeritasError::UnknownMetric { key: metric });
        }
        Ok(Self {
            column,
            metric,
            window: 20,
            z_thresh: 3.0,
            store,
            opts: ValidatorOptions::new(),
        })
    }

    /// Sets how many historical points feed the baseline.
    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window;
        self
    }

    /// Sets the z-score threshold.
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
impl Validator for MetricDriftValidator {
    fn name(&self) -> &'static str {
        "MetricDriftValidator"
    }

    fn kind(&self) -> ValidatorKind {
        ValidatorKind::Custom
    }

    fn options(&self) -> &ValidatorOptions {
        &self.opts
    }

    fn column(&self) -> Option<&str> {
        self.column.as_deref()
    }

    async fn execute(&self, engine: &dyn Engine, table: &str) -> Result<Verdict> {
        let target = self.column.clone().unwrap_or_else(|| "*".to_string());
        let request = MetricPlan::new(&self.metric, target)
            .with_filter(self.opts.where_sql.clone())
            .into_request("metric_value");
        let sql = MetricBatchBuilder::new(table, vec![request]).sql(engine.dialect())?;
        let rows = engine.run_sql(&sql).await?;

        let current = match rows.value(0, "metric_value").and_then(|v| v.as_f64()) {
            Some(v) => v,
            None => {
                return Ok(Verdict::pass().with_message("metric produced no numeric value"));
            }
        };

        let history = self
            .store
            .metric_history(table, self.column.as_deref(), &self.metric, self.window)
            .await?;
        if history.len() < 5 {
            debug!(
                metric = %self.metric,
                history.points = history.len(),
                "insufficient history for drift baseline"
            );
            return Ok(Verdict::pass()
                .with_metric(self.metric.clone(), Scalar::Float(current))
                .with_message("insufficient history"));
        }

        let n = history.len() as f64;
        let mean = history.iter().sum::<f64>() / n;
        let variance = history.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
        let stddev = variance.sqrt();
        let z = if stddev == 0.0 {
            0.0
        } else {
            ((current - mean) / stddev).abs()
        };

        let verdict = if z <= self.z_thresh {
            Verdict::pass()
        } else {
            Verdict::fail(format!(
                "metric '{}' drifted: current {current}, mean {mean:.4}, z {z:.2} > {}",
                self.metric, self.z_thresh
            ))
        };
        Ok(verdict
            .with_metric(self.metric.clone(), Scalar::Float(current))
            .with_metric("mean", Scalar::Float(mean))
            .with_metric("stddev", Scalar::Float(stddev))
            .with_metric("z", Scalar::Float(z)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryResultStore;

    #[test]
    fn test_unknown_metric_rejected() {
        let store: Arc<dyn ResultStore> = Arc::new(MemoryResultStore::new());
        assert!(MetricDriftValidator::new(None, "no_such_metric", store).is_err());
    }

    #[test]
    fn test_known_metric_accepted() {
        let store: Arc<dyn ResultStore> = Arc::new(MemoryResultStore::new());
        let v = MetricDriftValidator::new(Some("a".to_string()), "null_pct", store).unwrap();
        assert_eq!(v.kind(), ValidatorKind::Custom);
        assert_eq!(v.column(), Some("a"));
    }
}
