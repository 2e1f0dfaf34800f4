use std::collections::HashSet;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::models::synced_task::{NewSyncedTask, TaskPhase};
use crate::services::clickup::ClickUpTask;

pub const DEFAULT_EVENT_TAG: &str = "event";
pub const DONE_STATUSES: [&str; 4] = ["done", "closed", "complete", "completed"];

/// Tasks that belong in the local mirror: those carrying `tag` themselves,
/// plus direct subtasks of those tasks. Inclusion does not cascade further
/// and does not depend on input order.
pub fn select_included<'a>(tasks: &'a [ClickUpTask], tag: &str) -> Vec<&'a ClickUpTask> {
    let tagged: HashSet<&str> = tasks
        .iter()
        .filter(|t| t.has_tag(tag))
        .map(|t| t.id.as_str())
        .collect();

    tasks
        .iter()
        .filter(|t| {
            tagged.contains(t.id.as_str())
                || t
                    .parent
                    .as_deref()
                    .map(|p| tagged.contains(p))
                    .unwrap_or(false)
        })
        .collect()
}

pub fn is_done_status(status: &str) -> bool {
    let lower = status.trim().to_lowercase();
    DONE_STATUSES.contains(&lower.as_str())
}

/// Remote dates are epoch milliseconds, usually as strings.
pub fn parse_epoch_ms(raw: Option<&str>) -> Option<OffsetDateTime> {
    let ms: i64 = raw?.trim().parse().ok()?;
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000).ok()
}

pub fn parse_epoch_ms_date(raw: Option<&str>) -> Option<Date> {
    parse_epoch_ms(raw).map(|dt| dt.date())
}

pub fn task_status(task: &ClickUpTask) -> Option<String> {
    task.status
        .as_ref()
        .and_then(|s| s.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub fn responsible_person(task: &ClickUpTask) -> Option<String> {
    let names: Vec<&str> = task
        .assignees
        .iter()
        .filter_map(|a| a.display_name())
        .collect();
    if names.is_empty() {
        None
    } else {
        Some(names.join(", "))
    }
}

/// `completed_at` is only set for done-bucket statuses, whatever date fields
/// the remote sends. Done tasks without a usable date get `now`.
pub fn completed_at(task: &ClickUpTask, now: OffsetDateTime) -> Option<OffsetDateTime> {
    let status = task_status(task)?;
    if !is_done_status(&status) {
        return None;
    }
    parse_epoch_ms(task.date_done.as_deref())
        .or_else(|| parse_epoch_ms(task.date_closed.as_deref()))
        .or(Some(now))
}

pub fn to_synced_task(
    task: &ClickUpTask,
    event_id: Uuid,
    phase: TaskPhase,
    now: OffsetDateTime,
) -> NewSyncedTask {
    NewSyncedTask {
        clickup_task_id: task.id.clone(),
        event_id,
        task_name: task.name.trim().to_string(),
        status: task_status(task),
        due_date: parse_epoch_ms_date(task.due_date.as_deref()),
        completed_at: completed_at(task, now),
        responsible_person: responsible_person(task),
        phase,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::clickup::mock::task;
    use crate::services::clickup::{ClickUpStatusField, ClickUpUser};
    use time::macros::{date, datetime};

    fn ids(tasks: Vec<&ClickUpTask>) -> Vec<String> {
        let mut ids: Vec<String> = tasks.into_iter().map(|t| t.id.clone()).collect();
        ids.sort();
        ids
    }

    #[test]
    fn tag_propagates_to_direct_subtasks_only() {
        let tasks = vec![
            task("A1", "Print flyers", &[], Some("A")),
            task("B", "Unrelated", &[], None),
            task("A", "Open house", &["event"], None),
            task("A1a", "Pick paper", &[], Some("A1")),
            task("C1", "Child of untagged", &[], Some("B")),
        ];
        assert_eq!(ids(select_included(&tasks, "event")), vec!["A", "A1"]);
    }

    #[test]
    fn tag_match_ignores_case_and_other_tags() {
        let tasks = vec![
            task("X", "x", &["marketing", "EVENT"], None),
            task("Y", "y", &["events"], None),
        ];
        assert_eq!(ids(select_included(&tasks, "event")), vec!["X"]);
        assert!(select_included(&tasks, "other").is_empty());
    }

    #[test]
    fn due_date_parse_is_tolerant() {
        assert_eq!(
            parse_epoch_ms_date(Some("1717243200000")),
            Some(date!(2024 - 06 - 01))
        );
        assert_eq!(parse_epoch_ms_date(Some("not-a-date")), None);
        assert_eq!(parse_epoch_ms_date(Some("")), None);
        assert_eq!(parse_epoch_ms_date(None), None);
    }

    #[test]
    fn completed_at_requires_done_status() {
        let now = datetime!(2024-06-02 12:00 UTC);
        let mut t = task("T", "t", &["event"], None);
        t.date_done = Some("1717243200000".into());

        t.status = Some(ClickUpStatusField::Object {
            status: Some("In Progress".into()),
        });
        assert_eq!(completed_at(&t, now), None);

        t.status = Some(ClickUpStatusField::Text("Complete".into()));
        assert_eq!(completed_at(&t, now), parse_epoch_ms(Some("1717243200000")));

        t.date_done = None;
        t.status = Some(ClickUpStatusField::Text("closed".into()));
        assert_eq!(completed_at(&t, now), Some(now));

        t.status = None;
        assert_eq!(completed_at(&t, now), None);
    }

    #[test]
    fn derived_row_joins_assignees() {
        let now = datetime!(2024-06-02 12:00 UTC);
        let mut t = task("T", "  Stage signs ", &["event"], None);
        t.assignees = vec![
            ClickUpUser {
                username: Some("Dana".into()),
                ..Default::default()
            },
            ClickUpUser::default(),
            ClickUpUser {
                email: Some("lee@example.com".into()),
                ..Default::default()
            },
        ];
        let event_id = Uuid::new_v4();
        let row = to_synced_task(&t, event_id, TaskPhase::EventDay, now);
        assert_eq!(row.task_name, "Stage signs");
        assert_eq!(
            row.responsible_person.as_deref(),
            Some("Dana, lee@example.com")
        );
        assert_eq!(row.phase, TaskPhase::EventDay);
        assert!(row.status.is_none());

        t.assignees.clear();
        assert!(to_synced_task(&t, event_id, TaskPhase::EventDay, now)
            .responsible_person
            .is_none());
    }
}
