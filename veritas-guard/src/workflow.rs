//! High level helper for executing and persisting a validation run.

use crate::config::SlaConfig;
use crate::runner::{Binding, CancelFlag, ValidationRunner};
use crate::store::ResultStore;
use tracing::{info, instrument};
use veritas_core::prelude::*;

/// Executes `bindings` and persists run metadata plus results.
///
/// A [`RunMetadata`] record is created up front so its `run_id` flows into
/// every result; `finished_at` and the terminal status are stamped right
/// before persisting. A cancelled run persists its partial results with
/// status `ABORTED`.
#[instrument(skip_all, fields(suite.name = %suite_name, bindings.count = bindings.len()))]
pub async fn run_validations(
    suite_name: &str,
    bindings: &[Binding],
    runner: &ValidationRunner,
    store: &dyn ResultStore,
    sla: Option<&SlaConfig>,
    cancel: Option<&CancelFlag>,
) -> Result<(RunMetadata, Vec<ValidationResult>)> {
    let mut run = RunMetadata::new(suite_name);
    if let Some(sla) = sla {
        run.sla_name = Some(sla.sla_name.clone());
    }

    let report = runner.run(bindings, &run.run_id, cancel).await?;
    run.finish(if report.aborted {
        RunStatus::Aborted
    } else {
        RunStatus::Complete
    });

    store.persist_run(&run, &report.results, sla).await?;
    info!(
        run.id = %run.run_id,
        run.status = ?run.status,
        results.count = report.results.len(),
        "run persisted"
    );
    Ok((run, report.results))
}
