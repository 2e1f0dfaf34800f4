use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use super::synced_task::TaskPhase;

/// Local CRM event that owns one remote folder and its three phase lists.
#[derive(Debug, FromRow, Serialize, Deserialize, Clone)]
pub struct Event {
    pub id: Uuid,
    pub title: String,
    pub event_date: Option<Date>,
    pub agent_name: Option<String>,
    pub clickup_folder_id: Option<String>,
    pub pre_event_list_id: Option<String>,
    pub event_day_list_id: Option<String>,
    pub post_event_list_id: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// The three remote list IDs an event syncs from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListLinkage {
    pub pre_event_list_id: Option<String>,
    pub event_day_list_id: Option<String>,
    pub post_event_list_id: Option<String>,
}

impl ListLinkage {
    pub fn is_complete(&self) -> bool {
        self.pre_event_list_id.is_some()
            && self.event_day_list_id.is_some()
            && self.post_event_list_id.is_some()
    }

    /// Linked lists paired with the phase their tasks belong to.
    pub fn lists(&self) -> Vec<(TaskPhase, String)> {
        [
            (TaskPhase::PreEvent, &self.pre_event_list_id),
            (TaskPhase::EventDay, &self.event_day_list_id),
            (TaskPhase::PostEvent, &self.post_event_list_id),
        ]
        .into_iter()
        .filter_map(|(phase, id)| id.clone().map(|id| (phase, id)))
        .collect()
    }

    pub fn phase_of(&self, list_id: &str) -> Option<TaskPhase> {
        self.lists()
            .into_iter()
            .find(|(_, id)| id == list_id)
            .map(|(phase, _)| phase)
    }
}

impl Event {
    pub fn linkage(&self) -> ListLinkage {
        ListLinkage {
            pre_event_list_id: self.pre_event_list_id.clone(),
            event_day_list_id: self.event_day_list_id.clone(),
            post_event_list_id: self.post_event_list_id.clone(),
        }
    }

    pub fn is_provisioned(&self) -> bool {
        self.clickup_folder_id.is_some() && self.linkage().is_complete()
    }
}
