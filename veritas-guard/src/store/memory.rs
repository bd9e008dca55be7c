//! Reference store: in-memory records queryable through the embedded
//! columnar engine.

use super::ResultStore;
use crate::config::SlaConfig;
use arrow::array::{ArrayRef, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use datafusion::datasource::MemTable;
use datafusion::prelude::SessionContext;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, instrument};
use veritas_core::prelude::*;

#[derive(Debug, Clone)]
struct SlaRecord {
    sla_name: String,
    config: String,
}

#[derive(Debug, Default)]
struct Inner {
    slas: Vec<SlaRecord>,
    runs: Vec<RunMetadata>,
    results: Vec<ValidationResult>,
    statistics: Vec<MetricStat>,
}

/// The reference result store.
///
/// Keeps every persisted record in memory and materializes four tables
/// (`slas`, `runs`, `results`, `statistics`) into a DataFusion session on
/// demand, so dashboards and tests inspect run history with plain SQL.
///
/// # Examples
///
/// ```rust,ignore
/// use veritas_guard::store::MemoryResultStore;
///
/// # async fn example() -> veritas_core::Result<()> {
/// let store = MemoryResultStore::new();
/// // ... persist_run(...) ...
/// let ctx = store.query_session().await?;
/// let df = ctx.sql("SELECT status, COUNT(*) FROM results GROUP BY status").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryResultStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryResultStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of persisted runs.
    pub async fn run_count(&self) -> usize {
        self.inner.read().await.runs.len()
    }

    /// Returns the number of persisted results.
    pub async fn result_count(&self) -> usize {
        self.inner.read().await.results.len()
    }

    /// Materializes the stored records as SQL tables in a fresh session.
    pub async fn query_session(&self) -> Result<SessionContext> {
        let inner = self.inner.read().await;
        let ctx = SessionContext::new();
        register(&ctx, "slas", slas_batch(&inner.slas)?)?;
        register(&ctx, "runs", runs_batch(&inner.runs)?)?;
        register(&ctx, "results", results_batch(&inner.results)?)?;
        register(&ctx, "statistics", statistics_batch(&inner.statistics)?)?;
        Ok(ctx)
    }
}

#[async_trait]
impl ResultStore for MemoryResultStore {
    #[instrument(skip(self, run, results, sla), fields(run.id = %run.run_id, results.count = results.len()))]
    async fn persist_run(
        &self,
        run: &RunMetadata,
        results: &[ValidationResult],
        sla: Option<&SlaConfig>,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        if let (Some(sla_name), Some(sla)) = (&run.sla_name, sla) {
            let config = serde_json::to_string(sla)?;
            match inner.slas.iter_mut().find(|s| &s.sla_name == sla_name) {
                Some(existing) => existing.config = config,
                None => inner.slas.push(SlaRecord {
                    sla_name: sla_name.clone(),
                    config,
                }),
            }
        }
        inner.runs.push(run.clone());
        inner.results.extend_from_slice(results);
        debug!(
            runs.total = inner.runs.len(),
            results.total = inner.results.len(),
            "persisted run"
        );
        Ok(())
    }

    async fn persist_stats(&self, _run: &RunMetadata, stats: &[MetricStat]) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.statistics.extend_from_slice(stats);
        Ok(())
    }

    async fn metric_history(
        &self,
        table: &str,
        column: Option<&str>,
        metric: &str,
        limit: usize,
    ) -> Result<Vec<f64>> {
        let inner = self.inner.read().await;
        Ok(inner
            .statistics
            .iter()
            .rev()
            .filter(|s| s.table == table && s.column.as_deref() == column && s.metric == metric)
            .filter_map(|s| s.value.as_f64())
            .take(limit)
            .collect())
    }
}

fn register(ctx: &SessionContext, name: &str, batch: RecordBatch) -> Result<()> {
    let table = MemTable::try_new(batch.schema(), vec![vec![batch]])
        .map_err(|e| VeritasError::Internal(format!("cannot build table '{name}': {e}")))?;
    ctx.register_table(name, Arc::new(table))
        .map_err(|e| VeritasError::Internal(format!("cannot register table '{name}': {e}")))?;
    Ok(())
}

fn utf8(values: Vec<Option<String>>) -> ArrayRef {
    Arc::new(StringArray::from(values))
}

fn int64(values: Vec<i64>) -> ArrayRef {
    Arc::new(Int64Array::from(values))
}

fn field(name: &str, nullable: bool) -> Field {
    Field::new(name, DataType::Utf8, nullable)
}

fn slas_batch(slas: &[SlaRecord]) -> Result<RecordBatch> {
    let schema = Arc::new(Schema::new(vec![field("sla_name", false), field("config", false)]));
    RecordBatch::try_new(
        schema,
        vec![
            utf8(slas.iter().map(|s| Some(s.sla_name.clone())).collect()),
            utf8(slas.iter().map(|s| Some(s.config.clone())).collect()),
        ],
    )
    .map_err(|e| VeritasError::Internal(format!("cannot build slas batch: {e}")))
}

fn runs_batch(runs: &[RunMetadata]) -> Result<RecordBatch> {
    let schema = Arc::new(Schema::new(vec![
        field("run_id", false),
        field("suite_name", false),
        field("sla_name", true),
        field("started_at", false),
        field("finished_at", true),
        field("status", false),
    ]));
    RecordBatch::try_new(
        schema,
        vec![
            utf8(runs.iter().map(|r| Some(r.run_id.clone())).collect()),
            utf8(runs.iter().map(|r| Some(r.suite_name.clone())).collect()),
            utf8(runs.iter().map(|r| r.sla_name.clone()).collect()),
            utf8(runs
                .iter()
                .map(|r| Some(r.started_at.to_rfc3339()))
                .collect()),
            utf8(runs
                .iter()
                .map(|r| r.finished_at.map(|t| t.to_rfc3339()))
                .collect()),
            utf8(runs
                .iter()
                .map(|r| Some(r.status.as_str().to_string()))
                .collect()),
        ],
    )
    .map_err(|e| VeritasError::Internal(format!("cannot build runs batch: {e}")))
}

fn results_batch(results: &[ValidationResult]) -> Result<RecordBatch> {
    let schema = Arc::new(Schema::new(vec![
        field("run_id", false),
        Field::new("binding_ix", DataType::Int64, false),
        field("validator_type", false),
        field("engine", false),
        field("table_name", false),
        field("column_name", true),
        field("status", false),
        field("severity", false),
        field("metric_values", false),
        field("error_sample", true),
        field("error_message", true),
        field("started_at", false),
        Field::new("duration_ms", DataType::Int64, false),
    ]));
    let metric_values: Vec<Option<String>> = results
        .iter()
        .map(|r| serde_json::to_string(&r.metric_values).ok())
        .collect();
    let error_samples: Vec<Option<String>> = results
        .iter()
        .map(|r| {
            r.error_sample
                .as_ref()
                .and_then(|s| serde_json::to_string(s).ok())
        })
        .collect();
    RecordBatch::try_new(
        schema,
        vec![
            utf8(results.iter().map(|r| Some(r.run_id.clone())).collect()),
            int64(results.iter().map(|r| r.binding_ix as i64).collect()),
            utf8(results
                .iter()
                .map(|r| Some(r.validator_type.clone()))
                .collect()),
            utf8(results.iter().map(|r| Some(r.engine.clone())).collect()),
            utf8(results.iter().map(|r| Some(r.table.clone())).collect()),
            utf8(results.iter().map(|r| r.column.clone()).collect()),
            utf8(results
                .iter()
                .map(|r| Some(r.status.as_str().to_string()))
                .collect()),
            utf8(results
                .iter()
                .map(|r| Some(r.severity.as_str().to_string()))
                .collect()),
            utf8(metric_values),
            utf8(error_samples),
            utf8(results.iter().map(|r| r.error_message.clone()).collect()),
            utf8(results
                .iter()
                .map(|r| Some(r.started_at.to_rfc3339()))
                .collect()),
            int64(results.iter().map(|r| r.duration_ms as i64).collect()),
        ],
    )
    .map_err(|e| VeritasError::Internal(format!("cannot build results batch: {e}")))
}

fn statistics_batch(stats: &[MetricStat]) -> Result<RecordBatch> {
    let schema = Arc::new(Schema::new(vec![
        field("run_id", false),
        field("engine", false),
        field("schema", true),
        field("table_name", false),
        field("column_name", true),
        field("metric", false),
        field("value", true),
    ]));
    RecordBatch::try_new(
        schema,
        vec![
            utf8(stats.iter().map(|s| Some(s.run_id.clone())).collect()),
            utf8(stats.iter().map(|s| Some(s.engine.clone())).collect()),
            utf8(stats.iter().map(|s| s.db_schema.clone()).collect()),
            utf8(stats.iter().map(|s| Some(s.table.clone())).collect()),
            utf8(stats.iter().map(|s| s.column.clone()).collect()),
            utf8(stats.iter().map(|s| Some(s.metric.clone())).collect()),
            utf8(stats
                .iter()
                .map(|s| match &s.value {
                    Scalar::Null => None,
                    other => Some(other.canonical_string()),
                })
                .collect()),
        ],
    )
    .map_err(|e| VeritasError::Internal(format!("cannot build statistics batch: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn sample_run() -> (RunMetadata, Vec<ValidationResult>) {
        let mut run = RunMetadata::new("demo");
        run.finish(RunStatus::Complete);
        let result = ValidationResult {
            run_id: run.run_id.clone(),
            binding_ix: 0,
            validator_type: "ColumnNotNull".to_string(),
            engine: "duck".to_string(),
            table: "t".to_string(),
            column: Some("a".to_string()),
            status: Status::Pass,
            severity: Severity::Fail,
            metric_values: BTreeMap::from([("null_cnt".to_string(), Scalar::Int(0))]),
            error_sample: None,
            error_message: None,
            started_at: Utc::now(),
            duration_ms: 3,
        };
        (run, vec![result])
    }

    #[tokio::test]
    async fn test_persist_and_query() {
        let store = MemoryResultStore::new();
        let (run, results) = sample_run();
        store.persist_run(&run, &results, None).await.unwrap();
        assert_eq!(store.run_count().await, 1);
        assert_eq!(store.result_count().await, 1);

        let ctx = store.query_session().await.unwrap();
        let df = ctx
            .sql("SELECT COUNT(*) AS n FROM results WHERE status = 'PASS'")
            .await
            .unwrap();
        let batches = df.collect().await.unwrap();
        let n = batches[0]
            .column(0)
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap()
            .value(0);
        assert_eq!(n, 1);
    }

    #[tokio::test]
    async fn test_metric_history_most_recent_first() {
        let store = MemoryResultStore::new();
        let (run, _) = sample_run();
        let stats: Vec<MetricStat> = (0..10)
            .map(|i| MetricStat {
                run_id: run.run_id.clone(),
                engine: "duck".to_string(),
                db_schema: None,
                table: "t".to_string(),
                column: Some("a".to_string()),
                metric: "null_pct".to_string(),
                value: Scalar::Float(i as f64 / 10.0),
            })
            .collect();
        store.persist_stats(&run, &stats).await.unwrap();

        let history = store
            .metric_history("t", Some("a"), "null_pct", 3)
            .await
            .unwrap();
        assert_eq!(history, vec![0.9, 0.8, 0.7]);

        let other = store.metric_history("t", None, "null_pct", 3).await.unwrap();
        assert!(other.is_empty());
    }
}
