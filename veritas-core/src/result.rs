//! Typed artifacts passed from the runner to downstream stores and reporters.

use crate::scalar::Scalar;
use crate::severity::{Severity, Status};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Lifecycle state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    Running,
    Complete,
    Aborted,
}

impl RunStatus {
    /// Returns the string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "RUNNING",
            RunStatus::Complete => "COMPLETE",
            RunStatus::Aborted => "ABORTED",
        }
    }
}

/// Metadata describing one execution of a suite.
///
/// The `run_id` flows into every result produced by the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub run_id: String,
    pub suite_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sla_name: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
}

impl RunMetadata {
    /// Creates metadata for a run starting now, with a fresh run id.
    pub fn new(suite_name: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4().simple().to_string(),
            suite_name: suite_name.into(),
            sla_name: None,
            started_at: Utc::now(),
            finished_at: None,
            status: RunStatus::Running,
        }
    }

    /// Sets the SLA this run belongs to.
    pub fn with_sla(mut self, sla_name: impl Into<String>) -> Self {
        self.sla_name = Some(sla_name.into());
        self
    }

    /// Marks the run finished with the given status.
    pub fn finish(&mut self, status: RunStatus) {
        self.finished_at = Some(Utc::now());
        self.status = status;
    }
}

/// A bounded sample of offending rows collected by an error-row validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorSample {
    /// Offending rows as JSON objects, at most `max_error_rows` of them.
    pub rows: Vec<serde_json::Value>,
    /// True when more offending rows existed than the sample holds.
    pub truncated: bool,
}

/// The outcome of one validator against one (engine, table) target.
///
/// Immutable after construction. Equality ignores `started_at` and
/// `duration_ms` so that two runs over identical data compare equal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub run_id: String,
    /// Position of the binding in the input list.
    pub binding_ix: usize,
    pub validator_type: String,
    pub engine: String,
    pub table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    pub status: Status,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metric_values: BTreeMap<String, Scalar>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_sample: Option<ErrorSample>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl PartialEq for ValidationResult {
    fn eq(&self, other: &Self) -> bool {
        self.run_id == other.run_id
            && self.binding_ix == other.binding_ix
            && self.validator_type == other.validator_type
            && self.engine == other.engine
            && self.table == other.table
            && self.column == other.column
            && self.status == other.status
            && self.severity == other.severity
            && self.metric_values == other.metric_values
            && self.error_sample == other.error_sample
            && self.error_message == other.error_message
    }
}

/// A single metric value computed for a table or column, persisted by the
/// statistics side of a result store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricStat {
    pub run_id: String,
    pub engine: String,
    #[serde(
        default,
        rename = "schema",
        skip_serializing_if = "Option::is_none"
    )]
    pub db_schema: Option<String>,
    pub table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    pub metric: String,
    pub value: Scalar,
}
