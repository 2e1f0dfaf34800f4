use time::OffsetDateTime;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::inclusion::{select_included, to_synced_task};
use super::{BatchSyncReport, ListSyncReport, SyncError, SyncReport, Synchronizer};
use crate::models::event::Event;
use crate::models::synced_task::{TaskPhase, UpsertOutcome};
use crate::services::clickup::{ClickUpError, ClickUpTask, TASK_PAGE_SIZE};

// Upper bound on pages per list so a misbehaving remote cannot loop us forever.
const MAX_TASK_PAGES: u32 = 100;

/// Result of applying one task-change notification to the local mirror.
#[derive(Debug, Clone)]
pub enum TaskEventOutcome {
    Persisted {
        event_id: Uuid,
        phase: TaskPhase,
        upsert: UpsertOutcome,
        task: ClickUpTask,
    },
    NotIncluded,
    UnlinkedList(Option<String>),
    FetchFailed(String),
}

impl Synchronizer {
    /// All tasks of a list, subtasks and closed tasks included. Pages are
    /// requested until one comes back short.
    pub async fn fetch_list_tasks(&self, list_id: &str) -> Result<Vec<ClickUpTask>, ClickUpError> {
        let mut all = Vec::new();
        for page in 0..MAX_TASK_PAGES {
            let batch = self.tracker.list_tasks_page(list_id, page).await?;
            let full = batch.len() >= TASK_PAGE_SIZE;
            all.extend(batch);
            if !full {
                return Ok(all);
            }
        }
        warn!(list_id, pages = MAX_TASK_PAGES, "task pagination hit page cap");
        Ok(all)
    }

    /// Mirrors the tagged tasks of one remote list into the event's rows.
    ///
    /// A failed fetch is an error for the whole list. A failed upsert is
    /// recorded on the report and the remaining tasks still go through.
    pub async fn reconcile_list(
        &self,
        event_id: Uuid,
        phase: TaskPhase,
        list_id: &str,
    ) -> Result<ListSyncReport, SyncError> {
        let tasks = self.fetch_list_tasks(list_id).await?;
        let included = select_included(&tasks, &self.settings.event_tag);
        let now = OffsetDateTime::now_utc();

        let mut report = ListSyncReport {
            list_id: list_id.to_string(),
            phase,
            fetched: tasks.len(),
            included: included.len(),
            inserted: 0,
            updated: 0,
            errors: Vec::new(),
        };

        for task in included {
            let row = to_synced_task(task, event_id, phase, now);
            match self.repo.upsert_synced_task(row).await {
                Ok(UpsertOutcome::Inserted) => report.inserted += 1,
                Ok(UpsertOutcome::Updated) => report.updated += 1,
                Err(err) => {
                    warn!(
                        %event_id,
                        list_id,
                        task_id = %task.id,
                        ?err,
                        "failed to upsert synced task"
                    );
                    report.errors.push(format!("task {}: {}", task.id, err));
                }
            }
        }

        debug!(
            %event_id,
            list_id,
            fetched = report.fetched,
            included = report.included,
            inserted = report.inserted,
            updated = report.updated,
            "reconciled list"
        );
        Ok(report)
    }

    /// Reconciles every linked list of an event; one list failing does not
    /// stop the others.
    pub async fn sync_event(&self, event: &Event) -> SyncReport {
        let mut report = SyncReport {
            event_id: event.id,
            lists: Vec::new(),
            errors: Vec::new(),
        };

        for (phase, list_id) in event.linkage().lists() {
            match self.reconcile_list(event.id, phase, &list_id).await {
                Ok(list_report) => {
                    report.lists.push(list_report);
                    self.touch_registration(&list_id, event.id).await;
                }
                Err(err) => {
                    warn!(event_id = %event.id, %list_id, %err, "list sync failed");
                    report.errors.push(format!("list {}: {}", list_id, err));
                }
            }
        }
        report
    }

    async fn touch_registration(&self, list_id: &str, event_id: Uuid) {
        match self.repo.find_active_webhook(list_id, Some(event_id)).await {
            Ok(Some(registration)) => {
                if let Err(err) = self.repo.touch_webhook_sync(registration.id).await {
                    warn!(%event_id, list_id, ?err, "failed to stamp webhook sync time");
                }
            }
            Ok(None) => {}
            Err(err) => warn!(%event_id, list_id, ?err, "failed to look up webhook registration"),
        }
    }

    pub async fn sync_event_by_id(&self, event_id: Uuid) -> Result<SyncReport, SyncError> {
        let event = self
            .repo
            .find_event(event_id)
            .await?
            .ok_or(SyncError::EventNotFound(event_id))?;
        if event.linkage().lists().is_empty() {
            return Err(SyncError::NotLinked(event_id));
        }
        Ok(self.sync_event(&event).await)
    }

    /// Syncs every linked event concurrently. Only failing to enumerate the
    /// events is an error; per-event and per-task problems land in the
    /// report's `errors`.
    pub async fn sync_all(&self) -> Result<BatchSyncReport, SyncError> {
        let events = self.repo.list_linked_events().await?;
        let mut set = JoinSet::new();
        for event in events {
            let sync = self.clone();
            set.spawn(async move { sync.sync_event(&event).await });
        }

        let mut batch = BatchSyncReport::default();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(report) => {
                    let event_id = report.event_id;
                    batch.errors.extend(
                        report
                            .errors
                            .iter()
                            .map(|e| format!("event {}: {}", event_id, e)),
                    );
                    for list in &report.lists {
                        batch.errors.extend(list.errors.iter().map(|e| {
                            format!("event {}: list {}: {}", event_id, list.list_id, e)
                        }));
                    }
                    batch.events.push(report);
                }
                Err(err) => batch.errors.push(format!("sync task aborted: {}", err)),
            }
        }
        batch.events.sort_by_key(|r| r.event_id);

        info!(
            events = batch.events.len(),
            errors = batch.errors.len(),
            "full sync finished"
        );
        Ok(batch)
    }

    /// Tag check for a single task: its own tag, or its parent's.
    pub async fn is_task_included(&self, task: &ClickUpTask) -> bool {
        let tag = &self.settings.event_tag;
        if task.has_tag(tag) {
            return true;
        }
        let Some(parent_id) = task.parent.as_deref() else {
            return false;
        };
        match self.tracker.get_task(parent_id).await {
            Ok(parent) => parent.has_tag(tag),
            Err(err) => {
                warn!(task_id = %task.id, parent_id, %err, "could not fetch parent task");
                false
            }
        }
    }

    /// Applies a task-change notification. The webhook body is not trusted:
    /// the task is re-fetched before anything is persisted.
    pub async fn apply_task_event(
        &self,
        task_id: &str,
        payload_list_id: Option<&str>,
    ) -> Result<TaskEventOutcome, SyncError> {
        let task = match self.tracker.get_task(task_id).await {
            Ok(task) => task,
            Err(err) => {
                warn!(task_id, %err, "could not fetch task detail");
                return Ok(TaskEventOutcome::FetchFailed(err.to_string()));
            }
        };

        if !self.is_task_included(&task).await {
            return Ok(TaskEventOutcome::NotIncluded);
        }

        let list_id = task
            .list_id()
            .map(str::to_string)
            .or_else(|| payload_list_id.map(str::to_string));
        let linked = match list_id.as_deref() {
            Some(id) => self.repo.find_event_by_list(id).await?,
            None => None,
        };
        let Some((event, phase)) = linked else {
            return Ok(TaskEventOutcome::UnlinkedList(list_id));
        };

        let row = to_synced_task(&task, event.id, phase, OffsetDateTime::now_utc());
        let upsert = self.repo.upsert_synced_task(row).await?;
        Ok(TaskEventOutcome::Persisted {
            event_id: event.id,
            phase,
            upsert,
            task,
        })
    }
}
