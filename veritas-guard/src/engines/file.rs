//! File-backed engine: a named view over local data files.

use super::{Engine, FusionEngine, Rows};
use async_trait::async_trait;
use std::path::Path;
use tracing::{debug, instrument};
use veritas_core::prelude::*;

/// Supported file formats for [`FileEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Csv,
    Parquet,
    /// Newline-delimited JSON.
    Json,
}

impl FileFormat {
    /// Detects the format from a path or glob by extension.
    pub fn from_path(path: &str) -> Result<Self> {
        let lower = path.to_lowercase();
        if lower.ends_with(".csv") || lower.ends_with(".csv.gz") {
            Ok(FileFormat::Csv)
        } else if lower.ends_with(".parquet") {
            Ok(FileFormat::Parquet)
        } else if lower.ends_with(".json") || lower.ends_with(".jsonl") || lower.ends_with(".ndjson")
        {
            Ok(FileFormat::Json)
        } else {
            Err(VeritasError::config(format!(
                "cannot infer file format from '{path}'"
            )))
        }
    }
}

/// Exposes one or more data files as a SQL table.
///
/// On construction the engine creates a named view over the path (or glob)
/// on an inner [`FusionEngine`]; the view lives as long as the engine and is
/// removed on [`Engine::close`].
///
/// # Examples
///
/// ```rust,ignore
/// use veritas_guard::engines::{Engine, FileEngine};
///
/// # async fn example() -> veritas_core::Result<()> {
/// let engine = FileEngine::new("data/events-*.parquet", "events").await?;
/// let rows = engine.run_sql("SELECT COUNT(*) AS n FROM events").await?;
/// engine.close().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct FileEngine {
    inner: FusionEngine,
    path: String,
    table: String,
}

impl FileEngine {
    /// Creates an engine over `path`, inferring the format from the
    /// extension. `table` names the view.
    pub async fn new(path: impl Into<String>, table: impl Into<String>) -> Result<Self> {
        let path = path.into();
        let format = FileFormat::from_path(&path)?;
        Self::with_format(path, table, format).await
    }

    /// Creates an engine over `path` with an explicit format.
    pub async fn with_format(
        path: impl Into<String>,
        table: impl Into<String>,
        format: FileFormat,
    ) -> Result<Self> {
        Self::build(path.into(), table.into(), format, 1).await
    }

    /// Creates an engine with a larger statement pool.
    pub async fn with_pool(
        path: impl Into<String>,
        table: impl Into<String>,
        pool_size: usize,
    ) -> Result<Self> {
        let path = path.into();
        let format = FileFormat::from_path(&path)?;
        Self::build(path, table.into(), format, pool_size).await
    }

    #[instrument(skip(path, table), fields(format = ?format, pool_size))]
    async fn build(
        path: String,
        table: String,
        format: FileFormat,
        pool_size: usize,
    ) -> Result<Self> {
        ensure_matches(&path)?;

        let inner = FusionEngine::with_pool(pool_size);
        match format {
            FileFormat::Csv => inner.register_csv(&table, &path).await?,
            FileFormat::Parquet => inner.register_parquet(&table, &path).await?,
            FileFormat::Json => inner.register_json(&table, &path).await?,
        }
        debug!(view.table = %table, view.path = %path, "registered file view");
        Ok(Self { inner, path, table })
    }

    /// Returns the view name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Returns the path or glob the view reads.
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// Rejects paths and globs that match no files.
fn ensure_matches(path: &str) -> Result<()> {
    let is_glob = path.contains('*') || path.contains('?') || path.contains('[');
    if !is_glob {
        if Path::new(path).is_file() {
            return Ok(());
        }
        return Err(VeritasError::config(format!("no such file: '{path}'")));
    }
    let matches = glob::glob(path)
        .map_err(|e| VeritasError::config(format!("invalid glob pattern '{path}': {e}")))?;
    for entry in matches {
        let entry = entry.map_err(|e| VeritasError::Io(std::io::Error::other(e)))?;
        if entry.is_file() {
            return Ok(());
        }
    }
    Err(VeritasError::config(format!(
        "no files found matching '{path}'"
    )))
}

#[async_trait]
impl Engine for FileEngine {
    async fn run_sql(&self, sql: &str) -> Result<Rows> {
        self.inner.run_sql(sql).await
    }

    async fn list_columns(&self, table: &str) -> Result<Vec<String>> {
        self.inner.list_columns(table).await
    }

    fn dialect(&self) -> Dialect {
        self.inner.dialect()
    }

    async fn close(&self) -> Result<()> {
        // Drop the view, then release the pool.
        let _ = self.inner.deregister(&self.table);
        self.inner.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(dir: &tempfile::TempDir, name: &str, contents: &str) -> String {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path.to_str().unwrap().to_string()
    }

    #[test]
    fn test_format_inference() {
        assert_eq!(FileFormat::from_path("a.csv").unwrap(), FileFormat::Csv);
        assert_eq!(
            FileFormat::from_path("part-*.parquet").unwrap(),
            FileFormat::Parquet
        );
        assert_eq!(FileFormat::from_path("x.jsonl").unwrap(), FileFormat::Json);
        assert!(FileFormat::from_path("mystery.bin").is_err());
    }

    #[tokio::test]
    async fn test_csv_view_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(&dir, "users.csv", "id,status\n1,active\n2,active\n3,inactive\n");

        let engine = FileEngine::new(path, "users").await.unwrap();
        let rows = engine
            .run_sql("SELECT COUNT(*) AS n FROM users")
            .await
            .unwrap();
        assert_eq!(rows.value(0, "n"), Some(&Scalar::Int(3)));

        let cols = engine.list_columns("users").await.unwrap();
        assert_eq!(cols, vec!["id", "status"]);
        engine.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_glob_view() {
        let dir = tempfile::tempdir().unwrap();
        write_csv(&dir, "part1.csv", "id\n1\n2\n");
        write_csv(&dir, "part2.csv", "id\n3\n");
        let pattern = dir.path().join("part*.csv");

        let engine = FileEngine::new(pattern.to_str().unwrap(), "t").await.unwrap();
        let rows = engine.run_sql("SELECT COUNT(*) AS n FROM t").await.unwrap();
        assert_eq!(rows.value(0, "n"), Some(&Scalar::Int(3)));
    }

    #[tokio::test]
    async fn test_missing_file_rejected() {
        let err = FileEngine::new("/nope/missing.csv", "t").await.unwrap_err();
        assert!(matches!(err, VeritasError::Config(_)));
    }
}
