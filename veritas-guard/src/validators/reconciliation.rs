//! Cross-engine reconciliation validators.
//!
//! These validators compare a primary (engine, table) target against a
//! comparer engine and table: row counts for table reconciliation, a small
//! metric batch per column for column reconciliation. Comparisons are exact
//! unless the mapping declares a tolerance.

use super::{Validator, ValidatorKind, ValidatorOptions, Verdict};
use crate::engines::Engine;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;
use veritas_core::prelude::*;

/// Case normalization applied to text values before comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseFold {
    Lower,
    Upper,
}

/// Value coercion applied to one side of a mapping before comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoerceTo {
    Int,
    Float,
    Text,
}

fn coerce(value: Scalar, to: CoerceTo) -> Scalar {
    match to {
        CoerceTo::Int => value.as_i64().map(Scalar::Int).unwrap_or(value),
        CoerceTo::Float => value.as_f64().map(Scalar::Float).unwrap_or(value),
        CoerceTo::Text => Scalar::Text(value.canonical_string()),
    }
}

fn fold_case(value: Scalar, fold: CaseFold) -> Scalar {
    match value {
        Scalar::Text(t) => Scalar::Text(match fold {
            CaseFold::Lower => t.to_lowercase(),
            CaseFold::Upper => t.to_uppercase(),
        }),
        other => other,
    }
}

/// Maps a column between the primary and comparer tables.
///
/// # Examples
///
/// ```rust
/// use veritas_guard::validators::{CoerceTo, ColumnMapping};
///
/// // Same name on both sides, comparer values cast to float.
/// let mapping = ColumnMapping::new("amount").with_comparer_coerce(CoerceTo::Float);
///
/// // Renamed column on the comparer.
/// let mapping = ColumnMapping::new("user_id").with_comparer("customer_id");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnMapping {
    /// Column name on the primary table.
    pub primary: String,
    /// Column name on the comparer table; the primary name when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comparer: Option<String>,
    /// Coercion applied to primary-side metric values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_coerce: Option<CoerceTo>,
    /// Coercion applied to comparer-side metric values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comparer_coerce: Option<CoerceTo>,
    /// Case fold applied to primary-side text values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_case: Option<CaseFold>,
    /// Case fold applied to comparer-side text values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comparer_case: Option<CaseFold>,
    /// Numeric tolerance; exact equality when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerance: Option<f64>,
}

impl ColumnMapping {
    /// Maps `primary` to the same name on the comparer side.
    pub fn new(primary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            comparer: None,
            primary_coerce: None,
            comparer_coerce: None,
            primary_case: None,
            comparer_case: None,
            tolerance: None,
        }
    }

    /// Renames the column on the comparer side.
    pub fn with_comparer(mut self, comparer: impl Into<String>) -> Self {
        self.comparer = Some(comparer.into());
        self
    }

    /// Coerces comparer-side values before comparison.
    pub fn with_comparer_coerce(mut self, coerce: CoerceTo) -> Self {
        self.comparer_coerce = Some(coerce);
        self
    }

    /// Allows numeric differences up to `tolerance`.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = Some(tolerance);
        self
    }

    /// Returns the effective comparer column name.
    pub fn comparer_column(&self) -> &str {
        self.comparer.as_deref().unwrap_or(&self.primary)
    }

    /// Applies the declared conversions to a metric pair.
    pub fn convert(&self, primary: Scalar, comparer: Scalar) -> (Scalar, Scalar) {
        let mut p = primary;
        let mut c = comparer;
        if let Some(to) = self.primary_coerce {
            p = coerce(p, to);
        }
        if let Some(to) = self.comparer_coerce {
            c = coerce(c, to);
        }
        if let Some(fold) = self.primary_case {
            p = fold_case(p, fold);
        }
        if let Some(fold) = self.comparer_case {
            c = fold_case(c, fold);
        }
        (p, c)
    }

    /// Compares a converted metric pair under the mapping rules.
    pub fn values_equal(&self, primary: &Scalar, comparer: &Scalar) -> bool {
        primary.recon_eq(comparer, self.tolerance)
    }
}

/// Executes a small metric batch and returns alias-to-value pairs.
async fn run_metrics(
    engine: &dyn Engine,
    table: &str,
    plans: Vec<(String, MetricPlan)>,
) -> Result<BTreeMap<String, Scalar>> {
    let requests: Vec<MetricRequest> = plans
        .into_iter()
        .map(|(alias, plan)| plan.into_request(alias))
        .collect();
    let aliases: Vec<String> = requests.iter().map(|r| r.alias.clone()).collect();
    let sql = MetricBatchBuilder::new(table, requests).sql(engine.dialect())?;
    let rows = engine.run_sql(&sql).await?;
    Ok(aliases
        .into_iter()
        .map(|alias| {
            let value = rows.value(0, &alias).cloned().unwrap_or(Scalar::Null);
            (alias, value)
        })
        .collect())
}

/// Passes when the primary and comparer tables hold the same number of rows.
#[derive(Debug, Clone)]
pub struct TableReconciliationValidator {
    comparer_engine: Arc<dyn Engine>,
    comparer_table: String,
    comparer_where: Option<String>,
    opts: ValidatorOptions,
}

impl TableReconciliationValidator {
    pub fn new(comparer_engine: Arc<dyn Engine>, comparer_table: impl Into<String>) -> Self {
        Self {
            comparer_engine,
            comparer_table: comparer_table.into(),
            comparer_where: None,
            opts: ValidatorOptions::new(),
        }
    }

    /// Restricts the comparer-side count.
    pub fn with_comparer_where(mut self, where_sql: impl Into<String>) -> Self {
        self.comparer_where = Some(where_sql.into());
        self
    }

    pub fn with_options(mut self, opts: ValidatorOptions) -> Self {
        self.opts = opts;
        self
    }
}

#[async_trait]
impl Validator for TableReconciliationValidator {
    fn name(&self) -> &'static str {
        "TableReconciliationValidator"
    }

    fn kind(&self) -> ValidatorKind {
        ValidatorKind::Custom
    }

    fn options(&self) -> &ValidatorOptions {
        &self.opts
    }

    async fn execute(&self, engine: &dyn Engine, table: &str) -> Result<Verdict> {
        let primary = run_metrics(
            engine,
            table,
            vec![(
                "row_cnt".to_string(),
                MetricPlan::new("row_cnt", "*").with_filter(self.opts.where_sql.clone()),
            )],
        )
        .await?;
        let comparer = run_metrics(
            self.comparer_engine.as_ref(),
            &self.comparer_table,
            vec![(
                "row_cnt".to_string(),
                MetricPlan::new("row_cnt", "*").with_filter(self.comparer_where.clone()),
            )],
        )
        .await?;

        let primary_cnt = primary["row_cnt"].as_i64().unwrap_or(0);
        let comparer_cnt = comparer["row_cnt"].as_i64().unwrap_or(0);
        debug!(
            primary.rows = primary_cnt,
            comparer.rows = comparer_cnt,
            comparer.table = %self.comparer_table,
            "table reconciliation counts"
        );
        let verdict = if primary_cnt == comparer_cnt {
            Verdict::pass()
        } else {
            Verdict::fail(format!(
                "row counts differ: {primary_cnt} on '{table}', {comparer_cnt} on '{}'",
                self.comparer_table
            ))
        };
        Ok(verdict
            .with_metric("primary_row_cnt", Scalar::Int(primary_cnt))
            .with_metric("comparer_row_cnt", Scalar::Int(comparer_cnt)))
    }
}

/// Passes when a column's metric profile (count, non-null count, min, max)
/// matches on both sides of a mapping.
#[derive(Debug, Clone)]
pub struct ColumnReconciliationValidator {
    mapping: ColumnMapping,
    comparer_engine: Arc<dyn Engine>,
    comparer_table: String,
    comparer_where: Option<String>,
    opts: ValidatorOptions,
}

impl ColumnReconciliationValidator {
    const METRICS: [&'static str; 4] = ["row_cnt", "non_null_cnt", "min", "max"];

    pub fn new(
        mapping: ColumnMapping,
        comparer_engine: Arc<dyn Engine>,
        comparer_table: impl Into<String>,
    ) -> Self {
        Self {
            mapping,
            comparer_engine,
            comparer_table: comparer_table.into(),
            comparer_where: None,
            opts: ValidatorOptions::new(),
        }
    }

    /// Restricts the comparer-side metrics.
    pub fn with_comparer_where(mut self, where_sql: impl Into<String>) -> Self {
        self.comparer_where = Some(where_sql.into());
        self
    }

    pub fn with_options(mut self, opts: ValidatorOptions) -> Self {
        self.opts = opts;
        self
    }

    fn plans(column: &str, filter: Option<String>) -> Vec<(String, MetricPlan)> {
        Self::METRICS
            .iter()
            .map(|metric| {
                let target = if *metric == "row_cnt" { "*" } else { column };
                (
                    metric.to_string(),
                    MetricPlan::new(*metric, target).with_filter(filter.clone()),
                )
            })
            .collect()
    }

    async fn check_columns(&self, engine: &dyn Engine, table: &str) -> Result<()> {
        let primary_cols = engine.list_columns(table).await?;
        if !primary_cols.iter().any(|c| c == &self.mapping.primary) {
            return Err(VeritasError::config(format!(
                "column '{}' not found on table '{table}'",
                self.mapping.primary
            )));
        }
        let comparer_cols = self
            .comparer_engine
            .list_columns(&self.comparer_table)
            .await?;
        let comparer_name = self.mapping.comparer_column();
        if !comparer_cols.iter().any(|c| c == comparer_name) {
            return Err(VeritasError::config(format!(
                "column '{comparer_name}' not found on table '{}'",
                self.comparer_table
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Validator for ColumnReconciliationValidator {
    fn name(&self) -> &'static str {
        "ColumnReconciliationValidator"
    }

    fn kind(&self) -> ValidatorKind {
        ValidatorKind::Custom
    }

    fn options(&self) -> &ValidatorOptions {
        &self.opts
    }

    fn column(&self) -> Option<&str> {
        Some(&self.mapping.primary)
    }

    async fn execute(&self, engine: &dyn Engine, table: &str) -> Result<Verdict> {
        self.check_columns(engine, table).await?;

        let primary = run_metrics(
            engine,
            table,
            Self::plans(&self.mapping.primary, self.opts.where_sql.clone()),
        )
        .await?;
        let comparer = run_metrics(
            self.comparer_engine.as_ref(),
            &self.comparer_table,
            Self::plans(self.mapping.comparer_column(), self.comparer_where.clone()),
        )
        .await?;

        let mut verdict = Verdict::pass();
        let mut mismatches = Vec::new();
        for metric in Self::METRICS {
            let (p, c) = self.mapping.convert(
                primary.get(metric).cloned().unwrap_or(Scalar::Null),
                comparer.get(metric).cloned().unwrap_or(Scalar::Null),
            );
            if !self.mapping.values_equal(&p, &c) {
                mismatches.push(format!("{metric}: {p} vs {c}"));
            }
            verdict = verdict
                .with_metric(format!("primary_{metric}"), p)
                .with_metric(format!("comparer_{metric}"), c);
        }

        if mismatches.is_empty() {
            Ok(verdict)
        } else {
            verdict.passed = false;
            Ok(verdict.with_message(format!(
                "column '{}' disagrees with '{}.{}': {}",
                self.mapping.primary,
                self.comparer_table,
                self.mapping.comparer_column(),
                mismatches.join("; ")
            )))
        }
    }
}
