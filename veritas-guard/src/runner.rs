//! Validation runner: groups bindings, batches metric queries, dispatches,
//! and assembles uniform result records.
//!
//! Bindings execute sequentially in document order within one call. The
//! runner partitions metric-backed validators by (engine, table) and sends
//! each partition through the batch builder as a single statement; custom
//! validators run their own statements one at a time. An engine failure is
//! contained at validator granularity: the affected validators get `ERROR`
//! results and the run continues.

use crate::engines::{Engine, EngineMap, Rows};
use crate::validators::{Validator, ValidatorKind, Verdict};
use chrono::{DateTime, Utc};
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};
use veritas_core::prelude::*;

/// Pairing of a validator with its (engine, table) target. The unit of
/// scheduling.
#[derive(Debug, Clone)]
pub struct Binding {
    pub engine: String,
    pub table: String,
    pub validator: Arc<dyn Validator>,
}

impl Binding {
    pub fn new(
        engine: impl Into<String>,
        table: impl Into<String>,
        validator: Arc<dyn Validator>,
    ) -> Self {
        Self {
            engine: engine.into(),
            table: table.into(),
            validator,
        }
    }
}

/// A cooperative cancellation signal checked between execution units.
///
/// Cancelling does not abort in-flight SQL; the run stops before the next
/// statement and returns the results produced so far.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    flag: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Returns true once cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Runner configuration.
#[derive(Debug, Clone, Default)]
pub struct RunnerOptions {
    /// Upper bound on one batched statement or one custom validator.
    /// Expiry produces `ERROR` results and the run proceeds.
    pub binding_timeout: Option<Duration>,
}

/// The outcome of one runner invocation.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Results in binding order. Shorter than the input when aborted.
    pub results: Vec<ValidationResult>,
    /// True when a cancellation stopped the run early.
    pub aborted: bool,
}

struct MetricGroup {
    engine: String,
    table: String,
    members: Vec<usize>,
}

/// Executes bindings against a map of named engines.
#[derive(Debug)]
pub struct ValidationRunner {
    engines: EngineMap,
    options: RunnerOptions,
}

impl ValidationRunner {
    /// Creates a runner with default options.
    pub fn new(engines: EngineMap) -> Self {
        Self::with_options(engines, RunnerOptions::default())
    }

    /// Creates a runner with explicit options.
    pub fn with_options(engines: EngineMap, options: RunnerOptions) -> Self {
        Self { engines, options }
    }

    /// Returns the engine registered under `name`.
    fn engine(&self, name: &str) -> Result<&Arc<dyn Engine>> {
        self.engines
            .get(name)
            .ok_or_else(|| VeritasError::config(format!("unknown engine '{name}'")))
    }

    /// Runs `bindings` in document order, stamping `run_id` on every result.
    ///
    /// Registry and batch-builder errors are programmer errors and abort the
    /// call; engine, timeout and pool errors become per-validator `ERROR`
    /// results.
    #[instrument(skip(self, bindings, cancel), fields(run.id = %run_id, bindings.count = bindings.len()))]
    pub async fn run(
        &self,
        bindings: &[Binding],
        run_id: &str,
        cancel: Option<&CancelFlag>,
    ) -> Result<RunReport> {
        info!(bindings.count = bindings.len(), "starting validation run");

        let mut slots: Vec<Option<ValidationResult>> = vec![None; bindings.len()];
        let (groups, customs) = partition(bindings);
        let mut aborted = false;

        for group in &groups {
            if is_cancelled(cancel) {
                aborted = true;
                break;
            }
            self.run_metric_group(bindings, group, run_id, &mut slots)
                .await?;
        }

        if !aborted {
            for &ix in &customs {
                if is_cancelled(cancel) {
                    aborted = true;
                    break;
                }
                self.run_custom(bindings, ix, run_id, &mut slots).await?;
            }
        }

        let results: Vec<ValidationResult> = slots.into_iter().flatten().collect();
        let failed = results.iter().filter(|r| r.status == Status::Fail).count();
        let errored = results.iter().filter(|r| r.status == Status::Error).count();
        info!(
            results.count = results.len(),
            results.failed = failed,
            results.errored = errored,
            run.aborted = aborted,
            "validation run finished"
        );
        Ok(RunReport { results, aborted })
    }

    /// Executes one (engine, table) partition of metric validators as a
    /// single batched statement.
    async fn run_metric_group(
        &self,
        bindings: &[Binding],
        group: &MetricGroup,
        run_id: &str,
        slots: &mut [Option<ValidationResult>],
    ) -> Result<()> {
        let engine = self.engine(&group.engine)?;

        let mut requests: Vec<MetricRequest> = Vec::new();
        let mut spans: Vec<(usize, Range<usize>)> = Vec::new();
        for &ix in &group.members {
            let plans = bindings[ix].validator.metric_plans()?;
            let start = requests.len();
            for plan in plans {
                let alias = format!("v{}", requests.len());
                requests.push(plan.into_request(alias));
            }
            spans.push((ix, start..requests.len()));
        }
        let aliases: Vec<String> = requests.iter().map(|r| r.alias.clone()).collect();
        let sql = MetricBatchBuilder::new(&group.table, requests).sql(engine.dialect())?;
        debug!(
            group.engine = %group.engine,
            group.table = %group.table,
            group.validators = group.members.len(),
            statement = %sql,
            "executing batched metric statement"
        );

        let started = Utc::now();
        let clock = Instant::now();
        match self.run_sql_bounded(engine.as_ref(), &sql).await {
            Ok(rows) => {
                let elapsed = clock.elapsed();
                for (ix, span) in spans {
                    let values: Vec<Scalar> = aliases[span]
                        .iter()
                        .map(|alias| rows.value(0, alias).cloned().unwrap_or(Scalar::Null))
                        .collect();
                    let outcome = bindings[ix].validator.interpret(&values);
                    slots[ix] = Some(build_result(
                        run_id,
                        ix,
                        &bindings[ix],
                        outcome,
                        started,
                        elapsed,
                    ));
                }
            }
            Err(err) if err.is_recoverable() => {
                let elapsed = clock.elapsed();
                warn!(
                    group.engine = %group.engine,
                    group.table = %group.table,
                    error = %err,
                    "batched statement failed; recording errors for the whole group"
                );
                let message = err.to_string();
                for (ix, _) in spans {
                    slots[ix] = Some(error_result(
                        run_id,
                        ix,
                        &bindings[ix],
                        message.clone(),
                        started,
                        elapsed,
                    ));
                }
            }
            Err(err) => return Err(err),
        }
        Ok(())
    }

    /// Executes one custom binding, containing any failure to that binding.
    async fn run_custom(
        &self,
        bindings: &[Binding],
        ix: usize,
        run_id: &str,
        slots: &mut [Option<ValidationResult>],
    ) -> Result<()> {
        let binding = &bindings[ix];
        let engine = self.engine(&binding.engine)?;
        debug!(
            binding.ix = ix,
            validator = binding.validator.name(),
            binding.table = %binding.table,
            "executing custom validator"
        );

        let started = Utc::now();
        let clock = Instant::now();
        let outcome = self
            .execute_bounded(engine.as_ref(), binding.validator.as_ref(), &binding.table)
            .await;
        if let Err(err) = &outcome {
            warn!(
                binding.ix = ix,
                validator = binding.validator.name(),
                error = %err,
                "custom validator errored"
            );
        }
        slots[ix] = Some(build_result(
            run_id,
            ix,
            binding,
            outcome,
            started,
            clock.elapsed(),
        ));
        Ok(())
    }

    async fn run_sql_bounded(&self, engine: &dyn Engine, sql: &str) -> Result<Rows> {
        match self.options.binding_timeout {
            Some(limit) => match tokio::time::timeout(limit, engine.run_sql(sql)).await {
                Ok(result) => result,
                Err(_) => Err(VeritasError::Timeout {
                    ms: limit.as_millis() as u64,
                }),
            },
            None => engine.run_sql(sql).await,
        }
    }

    async fn execute_bounded(
        &self,
        engine: &dyn Engine,
        validator: &dyn Validator,
        table: &str,
    ) -> Result<Verdict> {
        match self.options.binding_timeout {
            Some(limit) => match tokio::time::timeout(limit, validator.execute(engine, table)).await
            {
                Ok(result) => result,
                Err(_) => Err(VeritasError::Timeout {
                    ms: limit.as_millis() as u64,
                }),
            },
            None => validator.execute(engine, table).await,
        }
    }
}

fn is_cancelled(cancel: Option<&CancelFlag>) -> bool {
    cancel.map(CancelFlag::is_cancelled).unwrap_or(false)
}

/// Splits bindings into metric partitions (first-seen order) and custom
/// binding indices.
fn partition(bindings: &[Binding]) -> (Vec<MetricGroup>, Vec<usize>) {
    let mut groups: Vec<MetricGroup> = Vec::new();
    let mut customs = Vec::new();
    for (ix, binding) in bindings.iter().enumerate() {
        match binding.validator.kind() {
            ValidatorKind::Metric => {
                match groups
                    .iter_mut()
                    .find(|g| g.engine == binding.engine && g.table == binding.table)
                {
                    Some(group) => group.members.push(ix),
                    None => groups.push(MetricGroup {
                        engine: binding.engine.clone(),
                        table: binding.table.clone(),
                        members: vec![ix],
                    }),
                }
            }
            ValidatorKind::Custom => customs.push(ix),
        }
    }
    (groups, customs)
}

fn error_result(
    run_id: &str,
    binding_ix: usize,
    binding: &Binding,
    message: String,
    started_at: DateTime<Utc>,
    elapsed: Duration,
) -> ValidationResult {
    let mut result = build_result(
        run_id,
        binding_ix,
        binding,
        Ok(Verdict::pass()),
        started_at,
        elapsed,
    );
    result.status = Status::Error;
    result.error_message = Some(message);
    result
}

fn build_result(
    run_id: &str,
    binding_ix: usize,
    binding: &Binding,
    outcome: Result<Verdict>,
    started_at: DateTime<Utc>,
    elapsed: Duration,
) -> ValidationResult {
    let validator = binding.validator.as_ref();
    let (status, metric_values, error_sample, error_message) = match outcome {
        Ok(verdict) => {
            let status = if verdict.passed {
                Status::Pass
            } else {
                Status::Fail
            };
            (
                status,
                verdict.metric_values,
                verdict.error_sample,
                verdict.message,
            )
        }
        Err(err) => (
            Status::Error,
            Default::default(),
            None,
            Some(err.to_string()),
        ),
    };
    ValidationResult {
        run_id: run_id.to_string(),
        binding_ix,
        validator_type: validator.name().to_string(),
        engine: binding.engine.clone(),
        table: binding.table.clone(),
        column: validator.column().map(str::to_string),
        status,
        severity: validator.options().severity,
        metric_values,
        error_sample,
        error_message,
        started_at,
        duration_ms: elapsed.as_millis() as u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::FusionEngine;
    use crate::validators::{ColumnNotNull, RowCountValidator};
    use arrow::array::Int64Array;
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::record_batch::RecordBatch;

    fn engine_with_table() -> Arc<dyn Engine> {
        let engine = FusionEngine::new();
        let schema = Arc::new(Schema::new(vec![Field::new("c", DataType::Int64, true)]));
        let batch = RecordBatch::try_new(
            schema,
            vec![Arc::new(Int64Array::from(vec![Some(1), Some(2), Some(3)]))],
        )
        .unwrap();
        engine.register_batch("t", batch).unwrap();
        Arc::new(engine)
    }

    fn runner() -> ValidationRunner {
        let mut engines = EngineMap::new();
        engines.insert("duck".to_string(), engine_with_table());
        ValidationRunner::new(engines)
    }

    #[tokio::test]
    async fn test_output_length_and_order() {
        let bindings = vec![
            Binding::new("duck", "t", Arc::new(RowCountValidator::new(Some(1), None))),
            Binding::new("duck", "t", Arc::new(ColumnNotNull::new("c"))),
        ];
        let report = runner().run(&bindings, "r1", None).await.unwrap();
        assert_eq!(report.results.len(), 2);
        assert!(!report.aborted);
        assert_eq!(report.results[0].binding_ix, 0);
        assert_eq!(report.results[0].validator_type, "RowCountValidator");
        assert_eq!(report.results[1].validator_type, "ColumnNotNull");
    }

    #[tokio::test]
    async fn test_unknown_engine_fails_loudly() {
        let bindings = vec![Binding::new(
            "missing",
            "t",
            Arc::new(ColumnNotNull::new("c")),
        )];
        let err = runner().run(&bindings, "r1", None).await.unwrap_err();
        assert!(matches!(err, VeritasError::Config(_)));
    }

    #[tokio::test]
    async fn test_cancel_before_start_returns_empty_aborted() {
        let cancel = CancelFlag::new();
        cancel.cancel();
        let bindings = vec![Binding::new("duck", "t", Arc::new(ColumnNotNull::new("c")))];
        let report = runner().run(&bindings, "r1", Some(&cancel)).await.unwrap();
        assert!(report.aborted);
        assert!(report.results.is_empty());
    }

    #[tokio::test]
    async fn test_runner_is_deterministic() {
        let bindings = vec![
            Binding::new("duck", "t", Arc::new(ColumnNotNull::new("c"))),
            Binding::new("duck", "t", Arc::new(RowCountValidator::new(Some(4), None))),
        ];
        let r = runner();
        let first = r.run(&bindings, "r1", None).await.unwrap();
        let second = r.run(&bindings, "r1", None).await.unwrap();
        assert_eq!(first.results, second.results);
    }
}
