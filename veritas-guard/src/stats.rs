//! Table statistics collection.
//!
//! Computes a metric profile for every column of a table with one batched
//! statement; the resulting [`MetricStat`] rows feed a result store's
//! statistics side and the drift baseline.

use crate::engines::EngineMap;
use tracing::{debug, instrument};
use veritas_core::prelude::*;

const DEFAULT_COLUMN_METRICS: [&str; 3] = ["null_pct", "min", "max"];
const DEFAULT_TABLE_METRICS: [&str; 1] = ["row_cnt"];

/// Computes statistics for all columns of a table.
#[derive(Debug)]
pub struct TableStatsCollector {
    engines: EngineMap,
}

impl TableStatsCollector {
    pub fn new(engines: EngineMap) -> Self {
        Self { engines }
    }

    /// Collects table and per-column metrics in a single scan.
    ///
    /// `column_metrics` defaults to `null_pct`, `min`, `max`;
    /// `table_metrics` defaults to `row_cnt`.
    #[instrument(skip(self), fields(engine = %engine_key, table = %table))]
    pub async fn collect(
        &self,
        engine_key: &str,
        table: &str,
        run_id: &str,
        column_metrics: Option<&[&str]>,
        table_metrics: Option<&[&str]>,
    ) -> Result<Vec<MetricStat>> {
        let column_metrics = column_metrics.unwrap_or(&DEFAULT_COLUMN_METRICS);
        let table_metrics = table_metrics.unwrap_or(&DEFAULT_TABLE_METRICS);

        let engine = self
            .engines
            .get(engine_key)
            .ok_or_else(|| VeritasError::config(format!("unknown engine '{engine_key}'")))?;
        let columns = engine.list_columns(table).await?;

        // Alias each request and remember which (column, metric) it answers.
        let mut requests = Vec::new();
        let mut targets: Vec<(Option<String>, String)> = Vec::new();
        for metric in table_metrics {
            let alias = format!("m{}", requests.len());
            requests.push(MetricRequest::new(*metric, "*", alias));
            targets.push((None, metric.to_string()));
        }
        for column in &columns {
            for metric in column_metrics {
                let alias = format!("m{}", requests.len());
                requests.push(MetricRequest::new(*metric, column.clone(), alias));
                targets.push((Some(column.clone()), metric.to_string()));
            }
        }
        let aliases: Vec<String> = requests.iter().map(|r| r.alias.clone()).collect();

        let sql = MetricBatchBuilder::new(table, requests).sql(engine.dialect())?;
        debug!(statement = %sql, metrics.count = targets.len(), "collecting statistics");
        let rows = engine.run_sql(&sql).await?;

        let db_schema = table
            .rsplit_once('.')
            .map(|(schema, _)| schema.to_string());
        Ok(targets
            .into_iter()
            .zip(aliases)
            .map(|((column, metric), alias)| MetricStat {
                run_id: run_id.to_string(),
                engine: engine_key.to_string(),
                db_schema: db_schema.clone(),
                table: table.to_string(),
                column,
                metric,
                value: rows.value(0, &alias).cloned().unwrap_or(Scalar::Null),
            })
            .collect())
    }
}
