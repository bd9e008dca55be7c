//! Convenience re-exports for the core crate.

pub use crate::error::{Result, VeritasError};
pub use crate::metrics::{
    global_metrics, MetricBatchBuilder, MetricBuilder, MetricPlan, MetricRequest, MetricSet,
};
pub use crate::result::{ErrorSample, MetricStat, RunMetadata, RunStatus, ValidationResult};
pub use crate::scalar::Scalar;
pub use crate::severity::{Severity, Status};
pub use crate::sql::{Dialect, SelectStatement, SqlExpr};
