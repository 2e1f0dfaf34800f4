use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// A subscription held with the remote tracker for one list.
///
/// `event_id = None` marks a general-purpose registration that is not tied to
/// a local event.
#[derive(Debug, FromRow, Serialize, Deserialize, Clone)]
pub struct RemoteWebhookRegistration {
    pub id: Uuid,
    pub list_id: String,
    pub team_id: String,
    pub webhook_id: String,
    pub event_id: Option<Uuid>,
    pub active: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_sync_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewWebhookRegistration {
    pub list_id: String,
    pub team_id: String,
    pub webhook_id: String,
    pub event_id: Option<Uuid>,
}
