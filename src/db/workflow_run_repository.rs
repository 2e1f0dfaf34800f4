use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::models::workflow_run::{EnqueueOutcome, NewWorkflowRun, RunStatus, WorkflowRun};
use crate::models::workflow_run_step::WorkflowRunStep;

/// Durable ledger of workflow runs keyed by idempotency key, plus their steps.
#[async_trait]
pub trait WorkflowRunRepository: Send + Sync {
    /// Create-or-reuse the row for `new.idempotency_key`.
    ///
    /// In-flight rows are left untouched. Finished rows get the new input, have
    /// their result fields and steps cleared, and go back to `queued`.
    async fn enqueue_run(&self, new: NewWorkflowRun) -> Result<EnqueueOutcome, sqlx::Error>;

    async fn get_run(&self, run_id: Uuid) -> Result<Option<WorkflowRun>, sqlx::Error>;

    async fn find_run_by_key(
        &self,
        idempotency_key: &str,
    ) -> Result<Option<WorkflowRun>, sqlx::Error>;

    async fn list_runs_by_status(
        &self,
        status: RunStatus,
        limit: i64,
    ) -> Result<Vec<WorkflowRun>, sqlx::Error>;

    // Processor contract
    /// `queued -> running`, conditional on the current status. `None` when another
    /// processor got there first or the row is not queued.
    async fn claim_run(&self, run_id: Uuid) -> Result<Option<WorkflowRun>, sqlx::Error>;

    /// `running -> success|failed|skipped`. Returns false when the row was not running.
    async fn complete_run(
        &self,
        run_id: Uuid,
        status: RunStatus,
        output: Option<Value>,
        error_message: Option<&str>,
    ) -> Result<bool, sqlx::Error>;

    // Step tracker
    async fn start_step(&self, run_id: Uuid, step_name: &str)
        -> Result<WorkflowRunStep, sqlx::Error>;

    async fn finish_step(
        &self,
        run_id: Uuid,
        step_id: Uuid,
        status: &str,
        error_message: Option<&str>,
    ) -> Result<Option<WorkflowRunStep>, sqlx::Error>;

    async fn list_steps(&self, run_id: Uuid) -> Result<Vec<WorkflowRunStep>, sqlx::Error>;
}
