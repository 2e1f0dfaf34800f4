use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::db::sync_repository::SyncRepository;
use crate::db::workflow_run_repository::WorkflowRunRepository;
use crate::models::event::{Event, ListLinkage};
use crate::models::synced_task::{NewSyncedTask, SyncedTask, TaskPhase, UpsertOutcome};
use crate::models::webhook_registration::{NewWebhookRegistration, RemoteWebhookRegistration};
use crate::models::workflow_run::{
    EnqueueOutcome, NewWorkflowRun, RequeueDecision, RunStatus, WorkflowRun,
};
use crate::models::workflow_run_step::WorkflowRunStep;

fn mock_failure() -> sqlx::Error {
    sqlx::Error::Protocol("Mock DB failure".into())
}

/// Ledger held in memory. A single lock around the map plays the role of the
/// unique constraint on `idempotency_key`.
#[derive(Default)]
pub struct InMemoryWorkflowRunRepository {
    pub runs: Mutex<HashMap<Uuid, WorkflowRun>>,
    pub steps: Mutex<Vec<WorkflowRunStep>>,
    pub should_fail: bool,
}

impl InMemoryWorkflowRunRepository {
    pub fn failing() -> Self {
        Self {
            should_fail: true,
            ..Default::default()
        }
    }

    pub fn run_count(&self) -> usize {
        self.runs.lock().unwrap().len()
    }

    pub fn find_key(&self, idempotency_key: &str) -> Option<WorkflowRun> {
        self.runs
            .lock()
            .unwrap()
            .values()
            .find(|run| run.idempotency_key == idempotency_key)
            .cloned()
    }

    /// Test helper: force a row into any status.
    pub fn set_status(&self, run_id: Uuid, status: RunStatus) {
        if let Some(run) = self.runs.lock().unwrap().get_mut(&run_id) {
            run.status = status.as_str().to_string();
        }
    }
}

#[async_trait]
impl WorkflowRunRepository for InMemoryWorkflowRunRepository {
    async fn enqueue_run(&self, new: NewWorkflowRun) -> Result<EnqueueOutcome, sqlx::Error> {
        if self.should_fail {
            return Err(mock_failure());
        }
        let now = OffsetDateTime::now_utc();
        let mut runs = self.runs.lock().unwrap();
        let existing = runs
            .values_mut()
            .find(|run| run.idempotency_key == new.idempotency_key);

        match existing {
            Some(run) => match RequeueDecision::for_status(&run.status) {
                RequeueDecision::AlreadyProcessing => {
                    Ok(EnqueueOutcome::AlreadyProcessing(run.clone()))
                }
                RequeueDecision::Requeue => {
                    run.status = RunStatus::Queued.as_str().to_string();
                    run.input = new.input;
                    run.triggered_by = new.triggered_by.as_str().to_string();
                    run.output = None;
                    run.error_message = None;
                    run.started_at = None;
                    run.finished_at = None;
                    run.updated_at = now;
                    let run_id = run.id;
                    let snapshot = run.clone();
                    self.steps.lock().unwrap().retain(|s| s.run_id != run_id);
                    Ok(EnqueueOutcome::Requeued(snapshot))
                }
            },
            None => {
                let run = WorkflowRun {
                    id: Uuid::new_v4(),
                    workflow_name: new.workflow_name,
                    idempotency_key: new.idempotency_key,
                    triggered_by: new.triggered_by.as_str().to_string(),
                    input: new.input,
                    output: None,
                    status: RunStatus::Queued.as_str().to_string(),
                    error_message: None,
                    started_at: None,
                    finished_at: None,
                    created_at: now,
                    updated_at: now,
                };
                runs.insert(run.id, run.clone());
                Ok(EnqueueOutcome::Created(run))
            }
        }
    }

    async fn get_run(&self, run_id: Uuid) -> Result<Option<WorkflowRun>, sqlx::Error> {
        if self.should_fail {
            return Err(mock_failure());
        }
        Ok(self.runs.lock().unwrap().get(&run_id).cloned())
    }

    async fn find_run_by_key(
        &self,
        idempotency_key: &str,
    ) -> Result<Option<WorkflowRun>, sqlx::Error> {
        Ok(self
            .runs
            .lock()
            .unwrap()
            .values()
            .find(|run| run.idempotency_key == idempotency_key)
            .cloned())
    }

    async fn list_runs_by_status(
        &self,
        status: RunStatus,
        limit: i64,
    ) -> Result<Vec<WorkflowRun>, sqlx::Error> {
        let mut runs: Vec<WorkflowRun> = self
            .runs
            .lock()
            .unwrap()
            .values()
            .filter(|run| run.status == status.as_str())
            .cloned()
            .collect();
        runs.sort_by_key(|run| run.created_at);
        runs.truncate(limit.max(0) as usize);
        Ok(runs)
    }

    async fn claim_run(&self, run_id: Uuid) -> Result<Option<WorkflowRun>, sqlx::Error> {
        let mut runs = self.runs.lock().unwrap();
        match runs.get_mut(&run_id) {
            Some(run) if run.status == RunStatus::Queued.as_str() => {
                let now = OffsetDateTime::now_utc();
                run.status = RunStatus::Running.as_str().to_string();
                run.started_at = Some(now);
                run.updated_at = now;
                Ok(Some(run.clone()))
            }
            _ => Ok(None),
        }
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
        let mut runs = self.runs.lock().unwrap();
        match runs.get_mut(&run_id) {
            Some(run) if run.status == RunStatus::Running.as_str() => {
                let now = OffsetDateTime::now_utc();
                run.status = status.as_str().to_string();
                run.output = if status == RunStatus::Success {
                    output
                } else {
                    None
                };
                run.error_message = error_message.map(|s| s.to_string());
                run.finished_at = Some(now);
                run.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn start_step(
        &self,
        run_id: Uuid,
        step_name: &str,
    ) -> Result<WorkflowRunStep, sqlx::Error> {
        let step = WorkflowRunStep {
            id: Uuid::new_v4(),
            run_id,
            step_name: step_name.to_string(),
            status: "running".to_string(),
            error_message: None,
            started_at: OffsetDateTime::now_utc(),
            finished_at: None,
        };
        self.steps.lock().unwrap().push(step.clone());
        Ok(step)
    }

    async fn finish_step(
        &self,
        run_id: Uuid,
        step_id: Uuid,
        status: &str,
        error_message: Option<&str>,
    ) -> Result<Option<WorkflowRunStep>, sqlx::Error> {
        let mut steps = self.steps.lock().unwrap();
        Ok(steps
            .iter_mut()
            .find(|s| s.id == step_id && s.run_id == run_id)
            .map(|step| {
                step.status = status.to_string();
                step.error_message = error_message.map(|s| s.to_string());
                step.finished_at = Some(OffsetDateTime::now_utc());
                step.clone()
            }))
    }

    async fn list_steps(&self, run_id: Uuid) -> Result<Vec<WorkflowRunStep>, sqlx::Error> {
        if self.should_fail {
            return Err(mock_failure());
        }
        let mut steps: Vec<WorkflowRunStep> = self
            .steps
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.run_id == run_id)
            .cloned()
            .collect();
        steps.sort_by_key(|s| s.started_at);
        Ok(steps)
    }
}

#[derive(Default)]
pub struct InMemorySyncRepository {
    pub events: Mutex<Vec<Event>>,
    pub tasks: Mutex<Vec<SyncedTask>>,
    pub webhooks: Mutex<Vec<RemoteWebhookRegistration>>,
    /// Upserts for these remote task IDs fail, to exercise per-unit error paths.
    pub failing_task_ids: Vec<String>,
}

impl InMemorySyncRepository {
    pub fn with_events(events: Vec<Event>) -> Self {
        Self {
            events: Mutex::new(events),
            ..Default::default()
        }
    }

    pub fn task_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .tasks
            .lock()
            .unwrap()
            .iter()
            .map(|t| t.clickup_task_id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn task(&self, clickup_task_id: &str) -> Option<SyncedTask> {
        self.tasks
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.clickup_task_id == clickup_task_id)
            .cloned()
    }
}

pub fn sample_event(title: &str, linkage: ListLinkage) -> Event {
    let now = OffsetDateTime::now_utc();
    Event {
        id: Uuid::new_v4(),
        title: title.to_string(),
        event_date: None,
        agent_name: Some("Dana Whitfield".to_string()),
        clickup_folder_id: None,
        pre_event_list_id: linkage.pre_event_list_id,
        event_day_list_id: linkage.event_day_list_id,
        post_event_list_id: linkage.post_event_list_id,
        created_at: now,
        updated_at: now,
    }
}

#[async_trait]
impl SyncRepository for InMemorySyncRepository {
    async fn find_event(&self, event_id: Uuid) -> Result<Option<Event>, sqlx::Error> {
        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.id == event_id)
            .cloned())
    }

    async fn list_linked_events(&self) -> Result<Vec<Event>, sqlx::Error> {
        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| !e.linkage().lists().is_empty())
            .cloned()
            .collect())
    }

    async fn find_event_by_list(
        &self,
        list_id: &str,
    ) -> Result<Option<(Event, TaskPhase)>, sqlx::Error> {
        Ok(self.events.lock().unwrap().iter().find_map(|e| {
            let phase = e.linkage().phase_of(list_id)?;
            Some((e.clone(), phase))
        }))
    }

    async fn set_event_lists(
        &self,
        event_id: Uuid,
        folder_id: &str,
        linkage: &ListLinkage,
    ) -> Result<Option<Event>, sqlx::Error> {
        let mut events = self.events.lock().unwrap();
        Ok(events.iter_mut().find(|e| e.id == event_id).map(|e| {
            e.clickup_folder_id = Some(folder_id.to_string());
            e.pre_event_list_id = linkage.pre_event_list_id.clone();
            e.event_day_list_id = linkage.event_day_list_id.clone();
            e.post_event_list_id = linkage.post_event_list_id.clone();
            e.updated_at = OffsetDateTime::now_utc();
            e.clone()
        }))
    }

    async fn upsert_synced_task(
        &self,
        task: NewSyncedTask,
    ) -> Result<UpsertOutcome, sqlx::Error> {
        if self.failing_task_ids.contains(&task.clickup_task_id) {
            return Err(mock_failure());
        }
        let now = OffsetDateTime::now_utc();
        let mut tasks = self.tasks.lock().unwrap();
        if let Some(existing) = tasks
            .iter_mut()
            .find(|t| t.clickup_task_id == task.clickup_task_id)
        {
            existing.event_id = task.event_id;
            existing.task_name = task.task_name;
            existing.status = task.status;
            existing.due_date = task.due_date;
            existing.completed_at = task.completed_at;
            existing.responsible_person = task.responsible_person;
            existing.phase = task.phase.as_str().to_string();
            existing.updated_at = now;
            return Ok(UpsertOutcome::Updated);
        }
        tasks.push(SyncedTask {
            id: Uuid::new_v4(),
            clickup_task_id: task.clickup_task_id,
            event_id: task.event_id,
            task_name: task.task_name,
            status: task.status,
            due_date: task.due_date,
            completed_at: task.completed_at,
            responsible_person: task.responsible_person,
            phase: task.phase.as_str().to_string(),
            updated_at: now,
        });
        Ok(UpsertOutcome::Inserted)
    }

    async fn list_synced_tasks(&self, event_id: Uuid) -> Result<Vec<SyncedTask>, sqlx::Error> {
        Ok(self
            .tasks
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.event_id == event_id)
            .cloned()
            .collect())
    }

    async fn count_synced_tasks(&self, event_id: Uuid) -> Result<i64, sqlx::Error> {
        Ok(self.list_synced_tasks(event_id).await?.len() as i64)
    }

    async fn find_active_webhook(
        &self,
        list_id: &str,
        event_id: Option<Uuid>,
    ) -> Result<Option<RemoteWebhookRegistration>, sqlx::Error> {
        Ok(self
            .webhooks
            .lock()
            .unwrap()
            .iter()
            .find(|w| w.active && w.list_id == list_id && w.event_id == event_id)
            .cloned())
    }

    async fn list_event_webhooks(
        &self,
        event_id: Uuid,
    ) -> Result<Vec<RemoteWebhookRegistration>, sqlx::Error> {
        Ok(self
            .webhooks
            .lock()
            .unwrap()
            .iter()
            .filter(|w| w.active && w.event_id == Some(event_id))
            .cloned()
            .collect())
    }

    async fn insert_webhook_registration(
        &self,
        registration: NewWebhookRegistration,
    ) -> Result<RemoteWebhookRegistration, sqlx::Error> {
        let mut webhooks = self.webhooks.lock().unwrap();
        let duplicate = webhooks.iter().any(|w| {
            w.active && w.list_id == registration.list_id && w.event_id == registration.event_id
        });
        if duplicate {
            return Err(sqlx::Error::Protocol(
                "duplicate active webhook registration".into(),
            ));
        }
        let row = RemoteWebhookRegistration {
            id: Uuid::new_v4(),
            list_id: registration.list_id,
            team_id: registration.team_id,
            webhook_id: registration.webhook_id,
            event_id: registration.event_id,
            active: true,
            last_sync_at: None,
            created_at: OffsetDateTime::now_utc(),
        };
        webhooks.push(row.clone());
        Ok(row)
    }

    async fn touch_webhook_sync(&self, registration_id: Uuid) -> Result<(), sqlx::Error> {
        if let Some(w) = self
            .webhooks
            .lock()
            .unwrap()
            .iter_mut()
            .find(|w| w.id == registration_id)
        {
            w.last_sync_at = Some(OffsetDateTime::now_utc());
        }
        Ok(())
    }

    async fn deactivate_webhook(&self, registration_id: Uuid) -> Result<bool, sqlx::Error> {
        Ok(self
            .webhooks
            .lock()
            .unwrap()
            .iter_mut()
            .find(|w| w.id == registration_id && w.active)
            .map(|w| w.active = false)
            .is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::workflow_run::TriggeredBy;
    use serde_json::json;
    use std::sync::Arc;

    fn trigger(input: Value) -> NewWorkflowRun {
        NewWorkflowRun::for_entity("generate-thumbnail", "task-1", TriggeredBy::Webhook, input)
    }

    #[tokio::test]
    async fn concurrent_triggers_create_exactly_one_row() {
        let repo = Arc::new(InMemoryWorkflowRunRepository::default());
        let mut handles = Vec::new();
        for i in 0..16 {
            let repo = repo.clone();
            handles.push(tokio::spawn(async move {
                repo.enqueue_run(trigger(json!({ "n": i }))).await.unwrap()
            }));
        }
        let mut created = 0;
        let mut already = 0;
        for handle in handles {
            match handle.await.unwrap() {
                EnqueueOutcome::Created(_) => created += 1,
                EnqueueOutcome::AlreadyProcessing(_) => already += 1,
                EnqueueOutcome::Requeued(_) => panic!("queued row must not be requeued"),
            }
        }
        assert_eq!(created, 1);
        assert_eq!(already, 15);
        assert_eq!(repo.run_count(), 1);
    }

    #[tokio::test]
    async fn finished_rows_requeue_and_drop_previous_attempt() {
        let repo = InMemoryWorkflowRunRepository::default();
        let outcome = repo.enqueue_run(trigger(json!({ "v": 1 }))).await.unwrap();
        let run = outcome.into_run();
        repo.claim_run(run.id).await.unwrap().expect("claimed");
        repo.start_step(run.id, "render").await.unwrap();
        assert!(repo
            .complete_run(run.id, RunStatus::Failed, None, Some("boom"))
            .await
            .unwrap());

        let outcome = repo.enqueue_run(trigger(json!({ "v": 2 }))).await.unwrap();
        let requeued = match outcome {
            EnqueueOutcome::Requeued(run) => run,
            other => panic!("unexpected outcome: {other:?}"),
        };
        assert_eq!(requeued.id, run.id);
        assert_eq!(requeued.status, "queued");
        assert_eq!(requeued.input, json!({ "v": 2 }));
        assert!(requeued.error_message.is_none());
        assert!(requeued.started_at.is_none());
        assert!(requeued.finished_at.is_none());
        assert!(repo.list_steps(run.id).await.unwrap().is_empty());
    }

    async fn run_to_completion(
        repo: &InMemoryWorkflowRunRepository,
        status: RunStatus,
        output: Option<Value>,
    ) -> WorkflowRun {
        let run = repo
            .enqueue_run(trigger(json!({ "v": 1 })))
            .await
            .unwrap()
            .into_run();
        repo.claim_run(run.id).await.unwrap().expect("claimed");
        repo.start_step(run.id, "render").await.unwrap();
        assert!(repo
            .complete_run(run.id, status, output, Some("note"))
            .await
            .unwrap());
        repo.get_run(run.id).await.unwrap().expect("run")
    }

    #[tokio::test]
    async fn successful_run_requeues_with_output_cleared() {
        let repo = InMemoryWorkflowRunRepository::default();
        let done = run_to_completion(
            &repo,
            RunStatus::Success,
            Some(json!({ "url": "https://cdn.example.com/t.png" })),
        )
        .await;
        assert!(done.output.is_some());

        let requeued = match repo.enqueue_run(trigger(json!({ "v": 2 }))).await.unwrap() {
            EnqueueOutcome::Requeued(run) => run,
            other => panic!("unexpected outcome: {other:?}"),
        };
        assert_eq!(requeued.id, done.id);
        assert_eq!(requeued.status, "queued");
        assert!(requeued.output.is_none());
        assert!(requeued.error_message.is_none());
        assert!(repo.list_steps(done.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn skipped_run_requeues() {
        let repo = InMemoryWorkflowRunRepository::default();
        let skipped = run_to_completion(&repo, RunStatus::Skipped, None).await;
        assert_eq!(skipped.status, "skipped");
        assert_eq!(skipped.error_message.as_deref(), Some("note"));

        let requeued = match repo.enqueue_run(trigger(json!({ "v": 3 }))).await.unwrap() {
            EnqueueOutcome::Requeued(run) => run,
            other => panic!("unexpected outcome: {other:?}"),
        };
        assert_eq!(requeued.status, "queued");
        assert_eq!(requeued.input, json!({ "v": 3 }));
        assert!(requeued.output.is_none());
        assert!(requeued.error_message.is_none());
        assert!(repo.list_steps(skipped.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn claim_is_conditional_on_queued() {
        let repo = InMemoryWorkflowRunRepository::default();
        let outcome = repo.enqueue_run(trigger(json!({}))).await.unwrap();
        let run = outcome.into_run();
        assert!(repo.claim_run(run.id).await.unwrap().is_some());
        assert!(repo.claim_run(run.id).await.unwrap().is_none());
        assert!(!repo
            .complete_run(run.id, RunStatus::Running, None, None)
            .await
            .unwrap());
    }
}
