use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPhase {
    PreEvent,
    EventDay,
    PostEvent,
}

impl TaskPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreEvent => "pre_event",
            Self::EventDay => "event_day",
            Self::PostEvent => "post_event",
        }
    }
}

/// Local mirror of a remote task, keyed by `clickup_task_id`.
#[derive(Debug, FromRow, Serialize, Deserialize, Clone)]
pub struct SyncedTask {
    pub id: Uuid,
    pub clickup_task_id: String,
    pub event_id: Uuid,
    pub task_name: String,
    pub status: Option<String>,
    pub due_date: Option<Date>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
    pub responsible_person: Option<String>,
    pub phase: String,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewSyncedTask {
    pub clickup_task_id: String,
    pub event_id: Uuid,
    pub task_name: String,
    pub status: Option<String>,
    pub due_date: Option<Date>,
    pub completed_at: Option<OffsetDateTime>,
    pub responsible_person: Option<String>,
    pub phase: TaskPhase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}
