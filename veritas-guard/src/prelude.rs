//! Convenience re-exports covering the common embedding surface.

pub use crate::config::{ExpectationConfig, ExpectationRule, SlaConfig, SuiteConfig};
pub use crate::engines::{Engine, EngineMap, FileEngine, FusionEngine, Rows};
pub use crate::runner::{Binding, CancelFlag, RunReport, RunnerOptions, ValidationRunner};
pub use crate::stats::TableStatsCollector;
pub use crate::store::{FileResultStore, MemoryResultStore, ResultStore};
pub use crate::validators::{Validator, ValidatorKind, ValidatorOptions, Verdict};
pub use crate::workflow::run_validations;
pub use veritas_core::prelude::*;
