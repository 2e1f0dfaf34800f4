use crate::{
    db::workflow_run_repository::WorkflowRunRepository,
    models::workflow_run::{
        EnqueueOutcome, NewWorkflowRun, RequeueDecision, RunStatus, WorkflowRun,
    },
    models::workflow_run_step::WorkflowRunStep,
};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

const RUN_COLUMNS: &str = "id, workflow_name, idempotency_key, triggered_by, input, output, \
     status, error_message, started_at, finished_at, created_at, updated_at";

const STEP_COLUMNS: &str = "id, run_id, step_name, status, error_message, started_at, finished_at";

// Two concurrent first-time inserts race on the unique key; the loser re-reads.
const ENQUEUE_MAX_ATTEMPTS: usize = 3;

pub struct PostgresWorkflowRunRepository {
    pub pool: PgPool,
}

impl PostgresWorkflowRunRepository {
    async fn try_insert_run(
        &self,
        new: &NewWorkflowRun,
    ) -> Result<Option<WorkflowRun>, sqlx::Error> {
        let sql = format!(
            r#"
            INSERT INTO workflow_runs
                (workflow_name, idempotency_key, triggered_by, input, status,
                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, 'queued', now(), now())
            RETURNING {RUN_COLUMNS}
            "#
        );
        let res = sqlx::query_as::<_, WorkflowRun>(&sql)
            .bind(&new.workflow_name)
            .bind(&new.idempotency_key)
            .bind(new.triggered_by.as_str())
            .bind(&new.input)
            .fetch_one(&self.pool)
            .await;

        match res {
            Ok(run) => Ok(Some(run)),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Locks the existing row for `key` and applies the re-queue policy.
    async fn requeue_existing(
        &self,
        new: &NewWorkflowRun,
    ) -> Result<Option<EnqueueOutcome>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let select = format!(
            "SELECT {RUN_COLUMNS} FROM workflow_runs WHERE idempotency_key = $1 FOR UPDATE"
        );
        let existing = sqlx::query_as::<_, WorkflowRun>(&select)
            .bind(&new.idempotency_key)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(existing) = existing else {
            tx.rollback().await?;
            return Ok(None);
        };

        if RequeueDecision::for_status(&existing.status) == RequeueDecision::AlreadyProcessing {
            tx.commit().await?;
            return Ok(Some(EnqueueOutcome::AlreadyProcessing(existing)));
        }

        sqlx::query("DELETE FROM workflow_run_steps WHERE run_id = $1")
            .bind(existing.id)
            .execute(&mut *tx)
            .await?;

        let update = format!(
            r#"
            UPDATE workflow_runs
            SET status = 'queued',
                input = $2,
                triggered_by = $3,
                output = NULL,
                error_message = NULL,
                started_at = NULL,
                finished_at = NULL,
                updated_at = now()
            WHERE id = $1
            RETURNING {RUN_COLUMNS}
            "#
        );
        let run = sqlx::query_as::<_, WorkflowRun>(&update)
            .bind(existing.id)
            .bind(&new.input)
            .bind(new.triggered_by.as_str())
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(EnqueueOutcome::Requeued(run)))
    }
}

#[async_trait]
impl WorkflowRunRepository for PostgresWorkflowRunRepository {
    async fn enqueue_run(&self, new: NewWorkflowRun) -> Result<EnqueueOutcome, sqlx::Error> {
        for attempt in 0..ENQUEUE_MAX_ATTEMPTS {
            if let Some(outcome) = self.requeue_existing(&new).await? {
                return Ok(outcome);
            }
            if let Some(run) = self.try_insert_run(&new).await? {
                return Ok(EnqueueOutcome::Created(run));
            }
            debug!(
                idempotency_key = %new.idempotency_key,
                attempt,
                "lost insert race on idempotency key; retrying as existing row"
            );
        }
        Err(sqlx::Error::Protocol(format!(
            "could not settle workflow run for key {}",
            new.idempotency_key
        )))
    }

    async fn get_run(&self, run_id: Uuid) -> Result<Option<WorkflowRun>, sqlx::Error> {
        let sql = format!("SELECT {RUN_COLUMNS} FROM workflow_runs WHERE id = $1");
        sqlx::query_as::<_, WorkflowRun>(&sql)
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn find_run_by_key(
        &self,
        idempotency_key: &str,
    ) -> Result<Option<WorkflowRun>, sqlx::Error> {
        let sql = format!("SELECT {RUN_COLUMNS} FROM workflow_runs WHERE idempotency_key = $1");
        sqlx::query_as::<_, WorkflowRun>(&sql)
            .bind(idempotency_key)
            .fetch_optional(&self.pool)
            .await
    }

    async fn list_runs_by_status(
        &self,
        status: RunStatus,
        limit: i64,
    ) -> Result<Vec<WorkflowRun>, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT {RUN_COLUMNS}
            FROM workflow_runs
            WHERE status = $1
            ORDER BY created_at ASC
            LIMIT $2
            "#
        );
        sqlx::query_as::<_, WorkflowRun>(&sql)
            .bind(status.as_str())
            .bind(limit)
            .fetch_all(&self.pool)
            .await
    }

    async fn claim_run(&self, run_id: Uuid) -> Result<Option<WorkflowRun>, sqlx::Error> {
        let sql = format!(
            r#"
            UPDATE workflow_runs
            SET status = 'running', started_at = now(), updated_at = now()
            WHERE id = $1 AND status = 'queued'
            RETURNING {RUN_COLUMNS}
            "#
        );
        sqlx::query_as::<_, WorkflowRun>(&sql)
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn complete_run(
        &self,
        run_id: Uuid,
        status: RunStatus,
        output: Option<Value>,
        error_message: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        if !status.is_terminal() {
            return Ok(false);
        }
        let output = if status == RunStatus::Success {
            output
        } else {
            None
        };
        let res = sqlx::query(
            r#"
            UPDATE workflow_runs
            SET status = $2,
                output = $3,
                error_message = $4,
                finished_at = now(),
                updated_at = now()
            WHERE id = $1 AND status = 'running'
            "#,
        )
        .bind(run_id)
        .bind(status.as_str())
        .bind(output)
        .bind(error_message)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn start_step(
        &self,
        run_id: Uuid,
        step_name: &str,
    ) -> Result<WorkflowRunStep, sqlx::Error> {
        let sql = format!(
            r#"
            INSERT INTO workflow_run_steps (run_id, step_name, status, started_at)
            VALUES ($1, $2, 'running', now())
            RETURNING {STEP_COLUMNS}
            "#
        );
        sqlx::query_as::<_, WorkflowRunStep>(&sql)
            .bind(run_id)
            .bind(step_name)
            .fetch_one(&self.pool)
            .await
    }

    async fn finish_step(
        &self,
        run_id: Uuid,
        step_id: Uuid,
        status: &str,
        error_message: Option<&str>,
    ) -> Result<Option<WorkflowRunStep>, sqlx::Error> {
        let sql = format!(
            r#"
            UPDATE workflow_run_steps
            SET status = $3, error_message = $4, finished_at = now()
            WHERE id = $2 AND run_id = $1
            RETURNING {STEP_COLUMNS}
            "#
        );
        sqlx::query_as::<_, WorkflowRunStep>(&sql)
            .bind(run_id)
            .bind(step_id)
            .bind(status)
            .bind(error_message)
            .fetch_optional(&self.pool)
            .await
    }

    async fn list_steps(&self, run_id: Uuid) -> Result<Vec<WorkflowRunStep>, sqlx::Error> {
        let sql = format!(
            "SELECT {STEP_COLUMNS} FROM workflow_run_steps WHERE run_id = $1 ORDER BY started_at ASC"
        );
        sqlx::query_as::<_, WorkflowRunStep>(&sql)
            .bind(run_id)
            .fetch_all(&self.pool)
            .await
    }
}
