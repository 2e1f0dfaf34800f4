use time::Date;

use crate::models::event::ListLinkage;
use crate::services::clickup::{ClickUpList, ClickUpTemplate};

pub const PRE_EVENT_LIST_NAME: &str = "Pre-Event";
pub const EVENT_DAY_LIST_NAME: &str = "Event Day";
pub const POST_EVENT_LIST_NAME: &str = "Post-Event";
pub const PHASE_LIST_NAMES: [&str; 3] =
    [PRE_EVENT_LIST_NAME, EVENT_DAY_LIST_NAME, POST_EVENT_LIST_NAME];

const TEMPLATE_MARKER: &str = "event";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListKind {
    Pre,
    Day,
    Post,
}

fn kind_of(name: &str) -> ListKind {
    let lower = name.to_lowercase();
    if lower.contains("pre") {
        ListKind::Pre
    } else if lower.contains("post") {
        ListKind::Post
    } else {
        ListKind::Day
    }
}

/// Assigns a folder's lists to the three event phases.
///
/// Names are matched by case-insensitive substring: "pre", then "post", and
/// anything else counts as event day; the first list of each kind wins. When
/// that leaves a phase empty and the folder has exactly three lists, the
/// lists are assigned by position instead (pre, day, post).
pub fn classify_lists(lists: &[ClickUpList]) -> ListLinkage {
    let first = |kind: ListKind| {
        lists
            .iter()
            .find(|l| kind_of(&l.name) == kind)
            .map(|l| l.id.clone())
    };

    let by_name = ListLinkage {
        pre_event_list_id: first(ListKind::Pre),
        event_day_list_id: first(ListKind::Day),
        post_event_list_id: first(ListKind::Post),
    };

    if by_name.is_complete() || lists.len() != 3 {
        return by_name;
    }

    ListLinkage {
        pre_event_list_id: Some(lists[0].id.clone()),
        event_day_list_id: Some(lists[1].id.clone()),
        post_event_list_id: Some(lists[2].id.clone()),
    }
}

pub fn find_event_template(templates: &[ClickUpTemplate]) -> Option<&ClickUpTemplate> {
    templates
        .iter()
        .find(|t| t.name.to_lowercase().contains(TEMPLATE_MARKER))
}

pub fn first_name(full_name: &str) -> Option<&str> {
    full_name.split_whitespace().next()
}

/// `"<AgentFirstName> [MM.DD.YY] <Title>"`; the agent part is dropped when unknown.
pub fn folder_name(agent_first_name: Option<&str>, date: Date, title: &str) -> String {
    let stamp = format!(
        "[{:02}.{:02}.{:02}]",
        u8::from(date.month()),
        date.day(),
        date.year().rem_euclid(100)
    );
    match agent_first_name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(agent) => format!("{} {} {}", agent, stamp, title.trim()),
        None => format!("{} {}", stamp, title.trim()),
    }
}
