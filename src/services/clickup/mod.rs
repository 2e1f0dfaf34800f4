use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;

mod live;
#[cfg(test)]
pub mod mock;

pub use live::ClickUpClient;

pub const CLICKUP_BASE_URL: &str = "https://api.clickup.com/api/v2";
/// The remote API caps task pages at this size.
pub const TASK_PAGE_SIZE: usize = 100;
pub const WEBHOOK_EVENTS: [&str; 4] = [
    "taskCreated",
    "taskUpdated",
    "taskStatusUpdated",
    "taskDeleted",
];

#[derive(Debug, Error)]
pub enum ClickUpError {
    #[error("ClickUp API request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("ClickUp API responded with status {status}: {message}")]
    Api {
        status: StatusCode,
        message: String,
        code: Option<String>,
    },
    #[error("ClickUp API returned an invalid response: {0}")]
    InvalidResponse(String),
}

impl ClickUpError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClickUpError::Api { status, .. } if *status == StatusCode::NOT_FOUND)
    }
}

/// Remote IDs and epoch-millisecond dates arrive as strings or numbers.
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(string_or_number(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct ClickUpTag {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct ClickUpUser {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub initials: Option<String>,
}

impl ClickUpUser {
    pub fn display_name(&self) -> Option<&str> {
        [&self.username, &self.email, &self.initials]
            .into_iter()
            .filter_map(|v| v.as_deref())
            .map(str::trim)
            .find(|v| !v.is_empty())
    }
}

/// Task status is normally `{ "status": "in progress", ... }` but older
/// payloads carry a bare string.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ClickUpStatusField {
    Text(String),
    Object {
        #[serde(default)]
        status: Option<String>,
    },
}

impl ClickUpStatusField {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ClickUpStatusField::Object { status } => status.as_deref(),
            ClickUpStatusField::Text(s) => Some(s.as_str()),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct ClickUpRef {
    #[serde(default, deserialize_with = "id_string")]
    pub id: String,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct ClickUpTask {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: Option<ClickUpStatusField>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub parent: Option<String>,
    #[serde(default)]
    pub tags: Vec<ClickUpTag>,
    #[serde(default)]
    pub assignees: Vec<ClickUpUser>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub due_date: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub date_done: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub date_closed: Option<String>,
    #[serde(default)]
    pub list: Option<ClickUpRef>,
}

impl ClickUpTask {
    pub fn has_tag(&self, tag: &str) -> bool {
        let wanted = tag.trim();
        self.tags
            .iter()
            .any(|t| t.name.trim().eq_ignore_ascii_case(wanted))
    }

    pub fn list_id(&self) -> Option<&str> {
        self.list
            .as_ref()
            .map(|l| l.id.as_str())
            .filter(|id| !id.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct ClickUpList {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct ClickUpFolder {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub lists: Vec<ClickUpList>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct ClickUpTemplate {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct ClickUpWebhook {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default)]
    pub secret: Option<String>,
}

/// The remote project-management API, narrowed to what the sync needs.
#[async_trait]
pub trait TrackerApi: Send + Sync {
    async fn get_task(&self, task_id: &str) -> Result<ClickUpTask, ClickUpError>;

    /// One page of a list's tasks, including subtasks and closed tasks.
    async fn list_tasks_page(
        &self,
        list_id: &str,
        page: u32,
    ) -> Result<Vec<ClickUpTask>, ClickUpError>;

    async fn list_folder_templates(
        &self,
        team_id: &str,
    ) -> Result<Vec<ClickUpTemplate>, ClickUpError>;

    async fn create_folder_from_template(
        &self,
        space_id: &str,
        template_id: &str,
        name: &str,
    ) -> Result<ClickUpFolder, ClickUpError>;

    async fn create_folder(&self, space_id: &str, name: &str)
        -> Result<ClickUpFolder, ClickUpError>;

    async fn create_list(&self, folder_id: &str, name: &str) -> Result<ClickUpList, ClickUpError>;

    async fn list_folder_lists(&self, folder_id: &str) -> Result<Vec<ClickUpList>, ClickUpError>;

    async fn create_webhook(
        &self,
        team_id: &str,
        endpoint: &str,
        list_id: &str,
    ) -> Result<ClickUpWebhook, ClickUpError>;

    async fn delete_webhook(&self, webhook_id: &str) -> Result<(), ClickUpError>;
}
