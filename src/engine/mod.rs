//! Entry point every trigger source goes through to put work on the ledger.

use tracing::{debug, info};

use crate::db::workflow_run_repository::WorkflowRunRepository;
use crate::models::workflow_run::{EnqueueOutcome, NewWorkflowRun};
use crate::services::processor::ProcessorWaker;

/// Records the trigger in the ledger and, when it moved the row to `queued`,
/// wakes the processor. Triggers that hit an in-flight run do not wake it.
pub async fn enqueue_and_wake(
    ledger: &dyn WorkflowRunRepository,
    waker: &dyn ProcessorWaker,
    new_run: NewWorkflowRun,
) -> Result<EnqueueOutcome, sqlx::Error> {
    let triggered_by = new_run.triggered_by.as_str();
    let outcome = ledger.enqueue_run(new_run).await?;
    let run = outcome.run();

    if outcome.is_enqueued() {
        info!(
            run_id = %run.id,
            idempotency_key = %run.idempotency_key,
            triggered_by,
            outcome = outcome.label(),
            "workflow run queued"
        );
        waker.wake(run);
    } else {
        debug!(
            run_id = %run.id,
            idempotency_key = %run.idempotency_key,
            status = %run.status,
            "trigger ignored, run already in flight"
        );
    }
    Ok(outcome)
}
