//! Metric framework: named aggregate builders and the batch builder that
//! fuses many metric requests into one table scan.

mod batch;
mod registry;

pub use batch::{apply_filter, MetricBatchBuilder, MetricPlan, MetricRequest};
pub use registry::{global_metrics, MetricBuilder, MetricSet};
