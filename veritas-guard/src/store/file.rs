//! File-artifact result store.

use super::ResultStore;
use crate::config::SlaConfig;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};
use veritas_core::prelude::*;

/// Persists validation artifacts to a directory as JSON files.
///
/// Layout mirrors the reference store's tables:
///
/// ```text
/// <base>/runs/<run_id>.json
/// <base>/results/<run_id>.jsonl
/// <base>/slas/<sla_name>.json
/// <base>/statistics/<run_id>.jsonl
/// ```
#[derive(Debug, Clone)]
pub struct FileResultStore {
    base: PathBuf,
}

impl FileResultStore {
    /// Creates the store, making the directory layout if needed.
    pub async fn new(directory: impl AsRef<Path>) -> Result<Self> {
        let base = directory.as_ref().to_path_buf();
        for sub in ["runs", "results", "slas", "statistics"] {
            tokio::fs::create_dir_all(base.join(sub)).await?;
        }
        Ok(Self { base })
    }

    /// Returns the base directory.
    pub fn base_path(&self) -> &Path {
        &self.base
    }

    async fn write_jsonl<T: serde::Serialize>(&self, path: &Path, records: &[T]) -> Result<()> {
        let mut out = String::new();
        for record in records {
            out.push_str(&serde_json::to_string(record)?);
            out.push('\n');
        }
        let mut file = tokio::fs::File::create(path).await?;
        file.write_all(out.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl ResultStore for FileResultStore {
    #[instrument(skip(self, run, results, sla), fields(run.id = %run.run_id))]
    async fn persist_run(
        &self,
        run: &RunMetadata,
        results: &[ValidationResult],
        sla: Option<&SlaConfig>,
    ) -> Result<()> {
        let run_path = self.base.join("runs").join(format!("{}.json", run.run_id));
        tokio::fs::write(&run_path, serde_json::to_string(run)?).await?;

        let results_path = self
            .base
            .join("results")
            .join(format!("{}.jsonl", run.run_id));
        self.write_jsonl(&results_path, results).await?;

        if let (Some(sla_name), Some(sla)) = (&run.sla_name, sla) {
            let sla_path = self.base.join("slas").join(format!("{sla_name}.json"));
            tokio::fs::write(&sla_path, serde_json::to_string(sla)?).await?;
        }
        debug!(path = %run_path.display(), "persisted run artifact");
        Ok(())
    }

    async fn persist_stats(&self, run: &RunMetadata, stats: &[MetricStat]) -> Result<()> {
        let path = self
            .base
            .join("statistics")
            .join(format!("{}.jsonl", run.run_id));
        self.write_jsonl(&path, stats).await
    }

    async fn metric_history(
        &self,
        table: &str,
        column: Option<&str>,
        metric: &str,
        limit: usize,
    ) -> Result<Vec<f64>> {
        // Files carry no global ordering; most recently written first.
        let dir = self.base.join("statistics");
        let mut entries = Vec::new();
        let mut read_dir = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = read_dir.next_entry().await? {
            let modified = entry.metadata().await?.modified()?;
            entries.push((modified, entry.path()));
        }
        entries.sort_by(|a, b| b.0.cmp(&a.0));

        let mut history = Vec::new();
        for (_, path) in entries {
            if history.len() >= limit {
                break;
            }
            let contents = tokio::fs::read_to_string(&path).await?;
            for line in contents.lines() {
                let stat: MetricStat = serde_json::from_str(line)?;
                if stat.table == table
                    && stat.column.as_deref() == column
                    && stat.metric == metric
                {
                    if let Some(v) = stat.value.as_f64() {
                        history.push(v);
                        if history.len() >= limit {
                            break;
                        }
                    }
                }
            }
        }
        Ok(history)
    }
}
