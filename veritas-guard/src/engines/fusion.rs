//! Embedded columnar engine backed by DataFusion.

use super::{Engine, Rows};
use async_trait::async_trait;
use datafusion::execution::context::SessionConfig;
use datafusion::prelude::{CsvReadOptions, NdJsonReadOptions, ParquetReadOptions, SessionContext};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, instrument};
use veritas_core::prelude::*;

/// The reference backend: an in-process DataFusion session.
///
/// Tables are registered programmatically (record batches for tests, local
/// files through the registration helpers) and every statement runs through
/// the shared session. A semaphore bounds concurrent statements to
/// `pool_size`; excess callers block, or fail with
/// [`VeritasError::PoolTimeout`] when a pool timeout is configured.
///
/// # Examples
///
/// ```rust,ignore
/// use veritas_guard::engines::{Engine, FusionEngine};
///
/// # async fn example() -> veritas_core::Result<()> {
/// let engine = FusionEngine::new();
/// engine.register_csv("users", "data/users.csv").await?;
/// let rows = engine.run_sql("SELECT COUNT(*) AS n FROM users").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct FusionEngine {
    ctx: SessionContext,
    pool: Arc<Semaphore>,
    pool_size: usize,
    pool_timeout: Option<Duration>,
}

impl std::fmt::Debug for FusionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FusionEngine")
            .field("pool_size", &self.pool_size)
            .field("pool_timeout", &self.pool_timeout)
            .finish()
    }
}

impl FusionEngine {
    /// Creates an engine with a single pooled connection.
    pub fn new() -> Self {
        Self::with_pool(1)
    }

    /// Creates an engine allowing up to `pool_size` concurrent statements.
    pub fn with_pool(pool_size: usize) -> Self {
        assert!(pool_size >= 1, "pool_size must be >= 1");
        let config = SessionConfig::new().with_target_partitions(num_cpus::get());
        Self {
            ctx: SessionContext::new_with_config(config),
            pool: Arc::new(Semaphore::new(pool_size)),
            pool_size,
            pool_timeout: None,
        }
    }

    /// Sets how long a statement may wait for a pooled connection before it
    /// fails with [`VeritasError::PoolTimeout`].
    pub fn with_pool_timeout(mut self, timeout: Duration) -> Self {
        self.pool_timeout = Some(timeout);
        self
    }

    /// Returns the underlying session for direct registration.
    pub fn session(&self) -> &SessionContext {
        &self.ctx
    }

    /// Returns the configured pool size.
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Registers an Arrow record batch as a table. Useful in tests and for
    /// validating in-memory data.
    pub fn register_batch(
        &self,
        table: &str,
        batch: arrow::record_batch::RecordBatch,
    ) -> Result<()> {
        self.ctx
            .register_batch(table, batch)
            .map(|_| ())
            .map_err(|e| VeritasError::Internal(format!("cannot register table '{table}': {e}")))
    }

    /// Registers a local csv file (or glob) as a table.
    pub async fn register_csv(&self, table: &str, path: &str) -> Result<()> {
        self.ctx
            .register_csv(table, path, CsvReadOptions::new().has_header(true))
            .await
            .map_err(|e| {
                VeritasError::Internal(format!("cannot register csv '{path}' as '{table}': {e}"))
            })
    }

    /// Registers a local parquet file (or glob) as a table.
    pub async fn register_parquet(&self, table: &str, path: &str) -> Result<()> {
        self.ctx
            .register_parquet(table, path, ParquetReadOptions::default())
            .await
            .map_err(|e| {
                VeritasError::Internal(format!(
                    "cannot register parquet '{path}' as '{table}': {e}"
                ))
            })
    }

    /// Registers a local newline-delimited json file (or glob) as a table.
    pub async fn register_json(&self, table: &str, path: &str) -> Result<()> {
        self.ctx
            .register_json(table, path, NdJsonReadOptions::default())
            .await
            .map_err(|e| {
                VeritasError::Internal(format!("cannot register json '{path}' as '{table}': {e}"))
            })
    }

    /// Removes a registered table from the session.
    pub fn deregister(&self, table: &str) -> Result<()> {
        self.ctx
            .deregister_table(table)
            .map(|_| ())
            .map_err(|e| VeritasError::Internal(format!("cannot deregister '{table}': {e}")))
    }

    async fn acquire(&self) -> Result<tokio::sync::SemaphorePermit<'_>> {
        match self.pool_timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.pool.acquire())
                .await
                .map_err(|_| VeritasError::PoolTimeout {
                    ms: timeout.as_millis() as u64,
                })?
                .map_err(|_| VeritasError::Internal("engine is closed".to_string())),
            None => self
                .pool
                .acquire()
                .await
                .map_err(|_| VeritasError::Internal("engine is closed".to_string())),
        }
    }
}

impl Default for FusionEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Engine for FusionEngine {
    #[instrument(skip(self, sql), fields(engine.dialect = "datafusion", sql.len = sql.len()))]
    async fn run_sql(&self, sql: &str) -> Result<Rows> {
        let _permit = self.acquire().await?;
        debug!(statement = %sql, "executing statement");
        let df = self
            .ctx
            .sql(sql)
            .await
            .map_err(|e| VeritasError::engine_with_source(sql, Box::new(e)))?;
        let batches = df
            .collect()
            .await
            .map_err(|e| VeritasError::engine_with_source(sql, Box::new(e)))?;
        Rows::from_batches(&batches)
    }

    async fn list_columns(&self, table: &str) -> Result<Vec<String>> {
        let df = self.ctx.table(table).await.map_err(|e| {
            VeritasError::engine(format!("DESCRIBE {table}"), format!("unknown table: {e}"))
        })?;
        Ok(df
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect())
    }

    fn dialect(&self) -> Dialect {
        Dialect::DataFusion
    }

    async fn close(&self) -> Result<()> {
        self.pool.close();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::record_batch::RecordBatch;

    fn users_batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("status", DataType::Utf8, true),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![1, 2, 3])),
                Arc::new(StringArray::from(vec![
                    Some("active"),
                    Some("active"),
                    Some("inactive"),
                ])),
            ],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_run_sql_returns_rows() {
        let engine = FusionEngine::new();
        engine.register_batch("users", users_batch()).unwrap();

        let rows = engine
            .run_sql("SELECT COUNT(*) AS total FROM users")
            .await
            .unwrap();
        assert_eq!(rows.value(0, "total"), Some(&Scalar::Int(3)));
    }

    #[tokio::test]
    async fn test_list_columns() {
        let engine = FusionEngine::new();
        engine.register_batch("users", users_batch()).unwrap();
        let cols = engine.list_columns("users").await.unwrap();
        assert_eq!(cols, vec!["id", "status"]);
    }

    #[tokio::test]
    async fn test_bad_sql_is_engine_error() {
        let engine = FusionEngine::new();
        let err = engine.run_sql("SELECT * FROM missing").await.unwrap_err();
        assert!(matches!(err, VeritasError::Engine { .. }));
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn test_closed_engine_rejects_statements() {
        let engine = FusionEngine::new();
        engine.register_batch("users", users_batch()).unwrap();
        engine.close().await.unwrap();
        assert!(engine.run_sql("SELECT 1").await.is_err());
    }

    #[tokio::test]
    async fn test_pool_allows_configured_concurrency() {
        let engine = FusionEngine::with_pool(2);
        engine.register_batch("users", users_batch()).unwrap();
        let (a, b) = tokio::join!(
            engine.run_sql("SELECT COUNT(*) AS n FROM users"),
            engine.run_sql("SELECT COUNT(*) AS n FROM users"),
        );
        assert!(a.is_ok() && b.is_ok());
    }
}
