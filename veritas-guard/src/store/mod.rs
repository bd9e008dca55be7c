//! Result stores: persistence backends for runs, results and statistics.
//!
//! Stores are append-only from the engine's perspective; pruning is an
//! out-of-band concern of the backend. The reference store keeps records in
//! memory and exposes them as SQL-queryable tables; the file store writes
//! one JSON artifact per run plus JSON-lines files of results and
//! statistics.

use crate::config::SlaConfig;
use async_trait::async_trait;
use std::fmt::Debug;
use veritas_core::prelude::*;

mod file;
mod memory;

pub use file::FileResultStore;
pub use memory::MemoryResultStore;

/// A persistence backend receiving finalized runs.
#[async_trait]
pub trait ResultStore: Debug + Send + Sync {
    /// Atomically records the run metadata and its results. The SLA
    /// configuration is stored when provided and the run names an SLA.
    async fn persist_run(
        &self,
        run: &RunMetadata,
        results: &[ValidationResult],
        sla: Option<&SlaConfig>,
    ) -> Result<()>;

    /// Records optional column statistics for a run.
    async fn persist_stats(&self, run: &RunMetadata, stats: &[MetricStat]) -> Result<()>;

    /// Returns up to `limit` historical values for a metric, most recent
    /// first. Drift validators read their baseline through this.
    async fn metric_history(
        &self,
        table: &str,
        column: Option<&str>,
        metric: &str,
        limit: usize,
    ) -> Result<Vec<f64>> {
        let _ = (table, column, metric, limit);
        Err(VeritasError::NotSupported(
            "metric_history not implemented for this store".to_string(),
        ))
    }
}
