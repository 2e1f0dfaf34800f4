use async_trait::async_trait;
use uuid::Uuid;

use crate::models::event::{Event, ListLinkage};
use crate::models::synced_task::{NewSyncedTask, SyncedTask, TaskPhase, UpsertOutcome};
use crate::models::webhook_registration::{NewWebhookRegistration, RemoteWebhookRegistration};

/// Local side of the hierarchy sync: events, their list linkage, mirrored
/// tasks and remote webhook registrations.
#[async_trait]
pub trait SyncRepository: Send + Sync {
    async fn find_event(&self, event_id: Uuid) -> Result<Option<Event>, sqlx::Error>;

    /// Events with at least one linked remote list.
    async fn list_linked_events(&self) -> Result<Vec<Event>, sqlx::Error>;

    async fn find_event_by_list(
        &self,
        list_id: &str,
    ) -> Result<Option<(Event, TaskPhase)>, sqlx::Error>;

    async fn set_event_lists(
        &self,
        event_id: Uuid,
        folder_id: &str,
        linkage: &ListLinkage,
    ) -> Result<Option<Event>, sqlx::Error>;

    /// Insert or refresh in place, keyed on `clickup_task_id`.
    async fn upsert_synced_task(&self, task: NewSyncedTask)
        -> Result<UpsertOutcome, sqlx::Error>;

    async fn list_synced_tasks(&self, event_id: Uuid) -> Result<Vec<SyncedTask>, sqlx::Error>;

    async fn count_synced_tasks(&self, event_id: Uuid) -> Result<i64, sqlx::Error>;

    async fn find_active_webhook(
        &self,
        list_id: &str,
        event_id: Option<Uuid>,
    ) -> Result<Option<RemoteWebhookRegistration>, sqlx::Error>;

    /// Active registrations created for an event, oldest first.
    async fn list_event_webhooks(
        &self,
        event_id: Uuid,
    ) -> Result<Vec<RemoteWebhookRegistration>, sqlx::Error>;

    async fn insert_webhook_registration(
        &self,
        registration: NewWebhookRegistration,
    ) -> Result<RemoteWebhookRegistration, sqlx::Error>;

    async fn touch_webhook_sync(&self, registration_id: Uuid) -> Result<(), sqlx::Error>;

    async fn deactivate_webhook(&self, registration_id: Uuid) -> Result<bool, sqlx::Error>;
}
