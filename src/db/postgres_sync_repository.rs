use crate::{
    db::sync_repository::SyncRepository,
    models::event::{Event, ListLinkage},
    models::synced_task::{NewSyncedTask, SyncedTask, TaskPhase, UpsertOutcome},
    models::webhook_registration::{NewWebhookRegistration, RemoteWebhookRegistration},
};
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use uuid::Uuid;

const EVENT_COLUMNS: &str = "id, title, event_date, agent_name, clickup_folder_id, \
     pre_event_list_id, event_day_list_id, post_event_list_id, created_at, updated_at";

const TASK_COLUMNS: &str = "id, clickup_task_id, event_id, task_name, status, due_date, \
     completed_at, responsible_person, phase, updated_at";

const WEBHOOK_COLUMNS: &str =
    "id, list_id, team_id, webhook_id, event_id, active, last_sync_at, created_at";

pub struct PostgresSyncRepository {
    pub pool: PgPool,
}

#[async_trait]
impl SyncRepository for PostgresSyncRepository {
    async fn find_event(&self, event_id: Uuid) -> Result<Option<Event>, sqlx::Error> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1");
        sqlx::query_as::<_, Event>(&sql)
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn list_linked_events(&self) -> Result<Vec<Event>, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT {EVENT_COLUMNS}
            FROM events
            WHERE pre_event_list_id IS NOT NULL
               OR event_day_list_id IS NOT NULL
               OR post_event_list_id IS NOT NULL
            ORDER BY created_at ASC
            "#
        );
        sqlx::query_as::<_, Event>(&sql).fetch_all(&self.pool).await
    }

    async fn find_event_by_list(
        &self,
        list_id: &str,
    ) -> Result<Option<(Event, TaskPhase)>, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT {EVENT_COLUMNS}
            FROM events
            WHERE pre_event_list_id = $1
               OR event_day_list_id = $1
               OR post_event_list_id = $1
            LIMIT 1
            "#
        );
        let event = sqlx::query_as::<_, Event>(&sql)
            .bind(list_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(event.and_then(|event| {
            let phase = event.linkage().phase_of(list_id)?;
            Some((event, phase))
        }))
    }

    async fn set_event_lists(
        &self,
        event_id: Uuid,
        folder_id: &str,
        linkage: &ListLinkage,
    ) -> Result<Option<Event>, sqlx::Error> {
        let sql = format!(
            r#"
            UPDATE events
            SET clickup_folder_id = $2,
                pre_event_list_id = $3,
                event_day_list_id = $4,
                post_event_list_id = $5,
                updated_at = now()
            WHERE id = $1
            RETURNING {EVENT_COLUMNS}
            "#
        );
        sqlx::query_as::<_, Event>(&sql)
            .bind(event_id)
            .bind(folder_id)
            .bind(linkage.pre_event_list_id.as_deref())
            .bind(linkage.event_day_list_id.as_deref())
            .bind(linkage.post_event_list_id.as_deref())
            .fetch_optional(&self.pool)
            .await
    }

    async fn upsert_synced_task(
        &self,
        task: NewSyncedTask,
    ) -> Result<UpsertOutcome, sqlx::Error> {
        // xmax is zero only for a freshly inserted tuple.
        let row = sqlx::query(
            r#"
            INSERT INTO clickup_tasks (clickup_task_id, event_id, task_name, status,
                                       due_date, completed_at, responsible_person, phase,
                                       created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, now(), now())
            ON CONFLICT (clickup_task_id) DO UPDATE
            SET event_id = EXCLUDED.event_id,
                task_name = EXCLUDED.task_name,
                status = EXCLUDED.status,
                due_date = EXCLUDED.due_date,
                completed_at = EXCLUDED.completed_at,
                responsible_person = EXCLUDED.responsible_person,
                phase = EXCLUDED.phase,
                updated_at = now()
            RETURNING (xmax = 0) AS inserted
            "#,
        )
        .bind(&task.clickup_task_id)
        .bind(task.event_id)
        .bind(&task.task_name)
        .bind(task.status.as_deref())
        .bind(task.due_date)
        .bind(task.completed_at)
        .bind(task.responsible_person.as_deref())
        .bind(task.phase.as_str())
        .fetch_one(&self.pool)
        .await?;

        let inserted: bool = row.try_get("inserted")?;
        Ok(if inserted {
            UpsertOutcome::Inserted
        } else {
            UpsertOutcome::Updated
        })
    }

    async fn list_synced_tasks(&self, event_id: Uuid) -> Result<Vec<SyncedTask>, sqlx::Error> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM clickup_tasks WHERE event_id = $1 ORDER BY phase, due_date NULLS LAST, task_name"
        );
        sqlx::query_as::<_, SyncedTask>(&sql)
            .bind(event_id)
            .fetch_all(&self.pool)
            .await
    }

    async fn count_synced_tasks(&self, event_id: Uuid) -> Result<i64, sqlx::Error> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM clickup_tasks WHERE event_id = $1")
            .bind(event_id)
            .fetch_one(&self.pool)
            .await?;
        row.try_get("n")
    }

    async fn find_active_webhook(
        &self,
        list_id: &str,
        event_id: Option<Uuid>,
    ) -> Result<Option<RemoteWebhookRegistration>, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT {WEBHOOK_COLUMNS}
            FROM clickup_webhooks
            WHERE list_id = $1
              AND event_id IS NOT DISTINCT FROM $2
              AND active
            LIMIT 1
            "#
        );
        sqlx::query_as::<_, RemoteWebhookRegistration>(&sql)
            .bind(list_id)
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn list_event_webhooks(
        &self,
        event_id: Uuid,
    ) -> Result<Vec<RemoteWebhookRegistration>, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT {WEBHOOK_COLUMNS}
            FROM clickup_webhooks
            WHERE event_id = $1 AND active
            ORDER BY created_at ASC
            "#
        );
        sqlx::query_as::<_, RemoteWebhookRegistration>(&sql)
            .bind(event_id)
            .fetch_all(&self.pool)
            .await
    }

    async fn insert_webhook_registration(
        &self,
        registration: NewWebhookRegistration,
    ) -> Result<RemoteWebhookRegistration, sqlx::Error> {
        let sql = format!(
            r#"
            INSERT INTO clickup_webhooks
                (list_id, team_id, webhook_id, event_id, active, created_at)
            VALUES ($1, $2, $3, $4, TRUE, now())
            RETURNING {WEBHOOK_COLUMNS}
            "#
        );
        sqlx::query_as::<_, RemoteWebhookRegistration>(&sql)
            .bind(&registration.list_id)
            .bind(&registration.team_id)
            .bind(&registration.webhook_id)
            .bind(registration.event_id)
            .fetch_one(&self.pool)
            .await
    }

    async fn touch_webhook_sync(&self, registration_id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE clickup_webhooks SET last_sync_at = now() WHERE id = $1")
            .bind(registration_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn deactivate_webhook(&self, registration_id: Uuid) -> Result<bool, sqlx::Error> {
        let res = sqlx::query("UPDATE clickup_webhooks SET active = FALSE WHERE id = $1 AND active")
            .bind(registration_id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}
