use std::env;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

use crate::services::clickup::CLICKUP_BASE_URL;
use crate::sync::inclusion::DEFAULT_EVENT_TAG;
use crate::sync::SyncSettings;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";
pub const DEFAULT_SYNC_INTERVAL_SECONDS: u64 = 900;
pub const DEFAULT_HTTP_TIMEOUT_SECONDS: u64 = 15;
pub const DEFAULT_ARTIFACT_WORKFLOW: &str = "generate-thumbnail";
pub const DEFAULT_TASK_WORKFLOW: &str = "process-task-event";
pub const WEBHOOK_PATH: &str = "/api/webhooks/clickup";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} is invalid: {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub clickup_api_token: String,
    pub clickup_api_base_url: String,
    pub clickup_team_id: Option<String>,
    pub clickup_space_id: Option<String>,
    pub clickup_webhook_secret: Option<String>,
    pub event_tag: String,
    pub processor_wake_url: Option<String>,
    pub processor_secret: Option<String>,
    pub public_base_url: Option<String>,
    pub agent_first_name: Option<String>,
    /// `None` disables the periodic sync worker.
    pub sync_interval: Option<Duration>,
    pub http_timeout: Duration,
    pub artifact_workflow_name: String,
    pub task_workflow_name: String,
    pub sentry_dsn: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok(); // Load .env file
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the config from any variable source; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let required = |name: &'static str| get(name).ok_or(ConfigError::Missing(name));

        let bind_raw = get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr: SocketAddr = bind_raw.parse().map_err(|_| ConfigError::Invalid {
            name: "BIND_ADDR",
            value: bind_raw.clone(),
        })?;

        let seconds = |name: &'static str, default: u64| -> Result<u64, ConfigError> {
            match get(name) {
                None => Ok(default),
                Some(raw) => match raw.parse() {
                    Ok(value) => Ok(value),
                    Err(_) => Err(ConfigError::Invalid { name, value: raw }),
                },
            }
        };
        let sync_secs = seconds("SYNC_INTERVAL_SECONDS", DEFAULT_SYNC_INTERVAL_SECONDS)?;
        let timeout_secs = seconds("HTTP_TIMEOUT_SECONDS", DEFAULT_HTTP_TIMEOUT_SECONDS)?;
        if timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "HTTP_TIMEOUT_SECONDS",
                value: "0".into(),
            });
        }

        Ok(Config {
            database_url: required("DATABASE_URL")?,
            bind_addr,
            clickup_api_token: required("CLICKUP_API_TOKEN")?,
            clickup_api_base_url: get("CLICKUP_API_BASE_URL")
                .unwrap_or_else(|| CLICKUP_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            clickup_team_id: get("CLICKUP_TEAM_ID"),
            clickup_space_id: get("CLICKUP_SPACE_ID"),
            clickup_webhook_secret: get("CLICKUP_WEBHOOK_SECRET"),
            event_tag: get("CLICKUP_EVENT_TAG").unwrap_or_else(|| DEFAULT_EVENT_TAG.to_string()),
            processor_wake_url: get("PROCESSOR_WAKE_URL"),
            processor_secret: get("PROCESSOR_SECRET"),
            public_base_url: get("PUBLIC_BASE_URL").map(|u| u.trim_end_matches('/').to_string()),
            agent_first_name: get("AGENT_FIRST_NAME"),
            sync_interval: (sync_secs > 0).then(|| Duration::from_secs(sync_secs)),
            http_timeout: Duration::from_secs(timeout_secs),
            artifact_workflow_name: get("ARTIFACT_WORKFLOW_NAME")
                .unwrap_or_else(|| DEFAULT_ARTIFACT_WORKFLOW.to_string()),
            task_workflow_name: get("TASK_WORKFLOW_NAME")
                .unwrap_or_else(|| DEFAULT_TASK_WORKFLOW.to_string()),
            sentry_dsn: get("SENTRY_DSN"),
        })
    }

    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            event_tag: self.event_tag.clone(),
            team_id: self.clickup_team_id.clone(),
            space_id: self.clickup_space_id.clone(),
            default_agent_name: self.agent_first_name.clone(),
            webhook_endpoint: self.webhook_endpoint(),
        }
    }

    /// Where the remote tracker should deliver task webhooks.
    pub fn webhook_endpoint(&self) -> Option<String> {
        self.public_base_url
            .as_ref()
            .map(|base| format!("{}{}", base, WEBHOOK_PATH))
    }
}
