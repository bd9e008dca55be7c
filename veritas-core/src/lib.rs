//! # Veritas Core
//!
//! Model layer for the Veritas data validation engine. This crate holds the
//! pieces that do no I/O:
//!
//! - **`sql`**: a minimal SQL expression tree with a per-dialect rendering
//!   pass and a rewriting visitor
//! - **`metrics`**: the metric registry (name to expression-builder mapping)
//!   and the batch builder that fuses many metric requests into one SELECT
//! - **`scalar`**, **`severity`**, **`result`**: typed values, outcome
//!   statuses, and the result and run records handed to stores
//! - **`error`**: the shared error type
//!
//! The execution layer (engines, validators, runner, stores) lives in the
//! `veritas-guard` crate.
//!
//! ## Example
//!
//! ```rust
//! use veritas_core::metrics::{MetricBatchBuilder, MetricRequest};
//! use veritas_core::sql::Dialect;
//!
//! let requests = vec![
//!     MetricRequest::new("row_cnt", "*", "total"),
//!     MetricRequest::new("row_cnt", "*", "active").with_filter("status = 'active'"),
//! ];
//! let sql = MetricBatchBuilder::new("users", requests)
//!     .sql(Dialect::Generic)
//!     .unwrap();
//! assert!(sql.starts_with("SELECT COUNT(*) AS total"));
//! ```

pub mod error;
pub mod metrics;
pub mod prelude;
pub mod result;
pub mod scalar;
pub mod severity;
pub mod sql;

pub use error::{Result, VeritasError};
