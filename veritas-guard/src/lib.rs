//! # Veritas — data quality validation for SQL-accessible data
//!
//! Veritas evaluates declarative suites of *expectations* (assertions about
//! rows, columns, or cross-table relationships) against one or more SQL
//! backends and produces a structured record of pass/fail outcomes.
//!
//! Three pieces do the heavy lifting:
//!
//! - A **metric framework** (`veritas-core`) turns named, reusable aggregate
//!   expressions into a SQL syntax tree and fuses many independent metrics,
//!   each possibly carrying its own row filter, into a single scan of the
//!   underlying table.
//! - A **validation runner** groups heterogeneous expectations into the
//!   minimum number of statements per (engine, table), dispatches them
//!   through the engine abstraction, and assembles uniform result records
//!   while surviving partial failures.
//! - A **pluggable engine layer** presents the same row-returning interface
//!   over the embedded columnar backend, file-backed views of csv/parquet
//!   data, and in principle any ODBC-reachable warehouse, with a bounded
//!   connection pool per engine.
//!
//! ## Quick start
//!
//! ```rust
//! use std::sync::Arc;
//! use veritas_guard::prelude::*;
//! use veritas_guard::validators::{ColumnNotNull, RowCountValidator};
//!
//! # async fn example() -> veritas_core::Result<()> {
//! // An embedded engine with a registered table (see FusionEngine docs).
//! let engine = FusionEngine::new();
//! // ... engine.register_csv("users", "data/users.csv").await? ...
//!
//! let mut engines = EngineMap::new();
//! engines.insert("local".to_string(), Arc::new(engine) as Arc<dyn Engine>);
//!
//! let bindings = vec![
//!     Binding::new("local", "users", Arc::new(ColumnNotNull::new("id"))),
//!     Binding::new("local", "users", Arc::new(RowCountValidator::new(Some(1), None))),
//! ];
//!
//! let runner = ValidationRunner::new(engines);
//! let store = MemoryResultStore::new();
//! let (run, results) = run_validations("users_quality", &bindings, &runner, &store, None, None).await?;
//!
//! for result in &results {
//!     println!("{} -> {}", result.validator_type, result.status);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Suites from configuration
//!
//! Upstream loaders deserialize [`config::SuiteConfig`] (from YAML, JSON, or
//! anything serde speaks), then [`config::SuiteConfig::build_bindings`]
//! validates column references against the live schema and instantiates the
//! validators. Unknown expectation types never get past deserialization.
//!
//! ## Outcome model
//!
//! Each validator either passes, fails (an expected-data condition), or
//! errors (infrastructure). All three are persisted uniformly through
//! [`store::ResultStore`] so downstream dashboards can distinguish
//! "data bad" from "system bad".

pub mod config;
pub mod engines;
pub mod logging;
pub mod prelude;
pub mod runner;
pub mod stats;
pub mod store;
pub mod validators;
pub mod workflow;
