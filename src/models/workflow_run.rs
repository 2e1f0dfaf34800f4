use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

pub const RUN_STATUS_QUEUED: &str = "queued";
pub const RUN_STATUS_RUNNING: &str = "running";
pub const RUN_STATUS_SUCCESS: &str = "success";
pub const RUN_STATUS_FAILED: &str = "failed";
pub const RUN_STATUS_SKIPPED: &str = "skipped";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Queued,
    Running,
    Success,
    Failed,
    Skipped,
}

impl RunStatus {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            RUN_STATUS_QUEUED => Some(Self::Queued),
            RUN_STATUS_RUNNING => Some(Self::Running),
            RUN_STATUS_SUCCESS => Some(Self::Success),
            RUN_STATUS_FAILED => Some(Self::Failed),
            RUN_STATUS_SKIPPED => Some(Self::Skipped),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => RUN_STATUS_QUEUED,
            Self::Running => RUN_STATUS_RUNNING,
            Self::Success => RUN_STATUS_SUCCESS,
            Self::Failed => RUN_STATUS_FAILED,
            Self::Skipped => RUN_STATUS_SKIPPED,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Skipped)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggeredBy {
    Webhook,
    Manual,
    Cron,
}

impl TriggeredBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Webhook => "webhook",
            Self::Manual => "manual",
            Self::Cron => "cron",
        }
    }
}

/// Builds the ledger key for a workflow acting on one external entity.
pub fn idempotency_key(workflow_name: &str, entity_id: &str) -> String {
    format!("{}:{}", workflow_name.trim(), entity_id.trim())
}

#[derive(Debug, FromRow, Serialize, Deserialize, Clone)]
pub struct WorkflowRun {
    pub id: Uuid,
    pub workflow_name: String,
    pub idempotency_key: String,
    pub triggered_by: String,
    pub input: serde_json::Value,
    pub output: Option<serde_json::Value>,
    pub status: String,
    pub error_message: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub started_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub finished_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl WorkflowRun {
    pub fn run_status(&self) -> Option<RunStatus> {
        RunStatus::parse(&self.status)
    }
}

#[derive(Debug, Clone)]
pub struct NewWorkflowRun {
    pub workflow_name: String,
    pub idempotency_key: String,
    pub triggered_by: TriggeredBy,
    pub input: serde_json::Value,
}

impl NewWorkflowRun {
    pub fn for_entity(
        workflow_name: &str,
        entity_id: &str,
        triggered_by: TriggeredBy,
        input: serde_json::Value,
    ) -> Self {
        Self {
            workflow_name: workflow_name.trim().to_string(),
            idempotency_key: idempotency_key(workflow_name, entity_id),
            triggered_by,
            input,
        }
    }
}

/// What a trigger did to the ledger row for its key.
#[derive(Debug, Clone)]
pub enum EnqueueOutcome {
    Created(WorkflowRun),
    Requeued(WorkflowRun),
    AlreadyProcessing(WorkflowRun),
}

impl EnqueueOutcome {
    pub fn run(&self) -> &WorkflowRun {
        match self {
            Self::Created(run) | Self::Requeued(run) | Self::AlreadyProcessing(run) => run,
        }
    }

    pub fn into_run(self) -> WorkflowRun {
        match self {
            Self::Created(run) | Self::Requeued(run) | Self::AlreadyProcessing(run) => run,
        }
    }

    /// True when this trigger put the row into `queued` and a processor should be woken.
    pub fn is_enqueued(&self) -> bool {
        !matches!(self, Self::AlreadyProcessing(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Created(_) => "created",
            Self::Requeued(_) => "requeued",
            Self::AlreadyProcessing(_) => "already_processing",
        }
    }
}

/// Decision for a trigger that hits an existing row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequeueDecision {
    AlreadyProcessing,
    Requeue,
}

impl RequeueDecision {
    /// Finished rows (including successes) may always be re-triggered; in-flight rows never.
    /// Unknown status strings are treated as in flight so a corrupt row is never double-enqueued.
    pub fn for_status(status: &str) -> Self {
        match RunStatus::parse(status) {
            Some(s) if s.is_terminal() => Self::Requeue,
            _ => Self::AlreadyProcessing,
        }
    }
}
