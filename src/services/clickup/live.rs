use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tokio::time::sleep;

use super::{
    ClickUpError, ClickUpFolder, ClickUpList, ClickUpTask, ClickUpTemplate, ClickUpWebhook,
    TrackerApi, WEBHOOK_EVENTS,
};

const CLICKUP_MAX_RETRIES: usize = 3;
const CLICKUP_BACKOFF_BASE_MS: u64 = 250;
const CLICKUP_BACKOFF_MAX_MS: u64 = 2000;

#[derive(Debug, Deserialize)]
struct ClickUpErrorBody {
    err: Option<String>,
    #[serde(rename = "ECODE")]
    ecode: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TasksPage {
    #[serde(default)]
    tasks: Vec<ClickUpTask>,
}

#[derive(Debug, Deserialize)]
struct ListsResponse {
    #[serde(default)]
    lists: Vec<ClickUpList>,
}

#[derive(Debug, Deserialize)]
struct TemplatesResponse {
    #[serde(default)]
    templates: Vec<ClickUpTemplate>,
}

#[derive(Debug, Deserialize)]
struct CreateWebhookResponse {
    webhook: ClickUpWebhook,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FolderResponse {
    Wrapped { folder: ClickUpFolder },
    Plain(ClickUpFolder),
}

fn build_url(base: &str, path: &str) -> String {
    let trimmed_base = base.trim_end_matches('/');
    let trimmed_path = path.trim_start_matches('/');
    format!("{}/{}", trimmed_base, trimmed_path)
}

fn encode(id: &str) -> String {
    urlencoding::encode(id.trim()).into_owned()
}

/// REST client for the ClickUp v2 API using a personal API token.
#[derive(Clone)]
pub struct ClickUpClient {
    client: Client,
    base_url: String,
    api_token: String,
    timeout: Duration,
}

impl ClickUpClient {
    pub fn new(
        client: Client,
        base_url: &str,
        api_token: &str,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            base_url: base_url.to_string(),
            api_token: api_token.to_string(),
            timeout,
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = build_url(&self.base_url, path);
        self.client
            .request(method, url)
            .timeout(self.timeout)
            .header(reqwest::header::AUTHORIZATION, self.api_token.as_str())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(reqwest::header::ACCEPT, "application/json")
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ClickUpError> {
        let body = self.send_raw(request).await?;
        serde_json::from_str::<T>(&body)
            .map_err(|err| ClickUpError::InvalidResponse(err.to_string()))
    }

    async fn send_raw(&self, request: RequestBuilder) -> Result<String, ClickUpError> {
        let mut retries = 0usize;
        let mut backoff = Duration::from_millis(CLICKUP_BACKOFF_BASE_MS);

        loop {
            let request = request.try_clone().ok_or_else(|| {
                ClickUpError::InvalidResponse("ClickUp request could not be retried".into())
            })?;
            let response = request.send().await?;
            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS && retries < CLICKUP_MAX_RETRIES {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|value| value.to_str().ok())
                    .and_then(|value| value.parse::<u64>().ok())
                    .map(Duration::from_secs);
                let delay = retry_after.unwrap_or(backoff);
                tracing::debug!(?delay, retries, "ClickUp rate limited; backing off");
                sleep(delay).await;
                retries += 1;
                backoff = Duration::from_millis(
                    (backoff.as_millis() as u64 * 2).min(CLICKUP_BACKOFF_MAX_MS),
                );
                continue;
            }

            let body = response.text().await.unwrap_or_default();

            if !status.is_success() {
                let parsed = serde_json::from_str::<ClickUpErrorBody>(&body).ok();
                let message = parsed
                    .as_ref()
                    .and_then(|err| err.err.as_ref())
                    .map(|msg| msg.trim().to_string())
                    .filter(|msg| !msg.is_empty())
                    .or_else(|| {
                        let trimmed = body.trim();
                        if trimmed.is_empty() {
                            None
                        } else {
                            Some(trimmed.to_string())
                        }
                    })
                    .unwrap_or_else(|| "ClickUp API request failed".to_string());
                return Err(ClickUpError::Api {
                    status,
                    message,
                    code: parsed.and_then(|err| err.ecode),
                });
            }

            return Ok(body);
        }
    }
}

#[async_trait]
impl TrackerApi for ClickUpClient {
    async fn get_task(&self, task_id: &str) -> Result<ClickUpTask, ClickUpError> {
        let path = format!("/task/{}", encode(task_id));
        self.send(self.request(Method::GET, &path)).await
    }

    async fn list_tasks_page(
        &self,
        list_id: &str,
        page: u32,
    ) -> Result<Vec<ClickUpTask>, ClickUpError> {
        let path = format!("/list/{}/task", encode(list_id));
        let request = self.request(Method::GET, &path).query(&[
            ("page", page.to_string()),
            ("subtasks", "true".to_string()),
            ("include_closed", "true".to_string()),
        ]);
        let page: TasksPage = self.send(request).await?;
        Ok(page.tasks)
    }

    async fn list_folder_templates(
        &self,
        team_id: &str,
    ) -> Result<Vec<ClickUpTemplate>, ClickUpError> {
        let path = format!("/team/{}/folder_template", encode(team_id));
        let res: TemplatesResponse = self.send(self.request(Method::GET, &path)).await?;
        Ok(res.templates)
    }

    async fn create_folder_from_template(
        &self,
        space_id: &str,
        template_id: &str,
        name: &str,
    ) -> Result<ClickUpFolder, ClickUpError> {
        let path = format!(
            "/space/{}/folder_template/{}",
            encode(space_id),
            encode(template_id)
        );
        let request = self
            .request(Method::POST, &path)
            .json(&json!({ "name": name }));
        let res: FolderResponse = self.send(request).await?;
        Ok(match res {
            FolderResponse::Wrapped { folder } => folder,
            FolderResponse::Plain(folder) => folder,
        })
    }

    async fn create_folder(
        &self,
        space_id: &str,
        name: &str,
    ) -> Result<ClickUpFolder, ClickUpError> {
        let path = format!("/space/{}/folder", encode(space_id));
        let request = self
            .request(Method::POST, &path)
            .json(&json!({ "name": name }));
        self.send(request).await
    }

    async fn create_list(&self, folder_id: &str, name: &str) -> Result<ClickUpList, ClickUpError> {
        let path = format!("/folder/{}/list", encode(folder_id));
        let request = self
            .request(Method::POST, &path)
            .json(&json!({ "name": name }));
        self.send(request).await
    }

    async fn list_folder_lists(&self, folder_id: &str) -> Result<Vec<ClickUpList>, ClickUpError> {
        let path = format!("/folder/{}/list", encode(folder_id));
        let request = self
            .request(Method::GET, &path)
            .query(&[("archived", "false")]);
        let res: ListsResponse = self.send(request).await?;
        Ok(res.lists)
    }

    async fn create_webhook(
        &self,
        team_id: &str,
        endpoint: &str,
        list_id: &str,
    ) -> Result<ClickUpWebhook, ClickUpError> {
        let path = format!("/team/{}/webhook", encode(team_id));
        let request = self.request(Method::POST, &path).json(&json!({
            "endpoint": endpoint,
            "events": WEBHOOK_EVENTS,
            "list_id": list_id,
        }));
        let res: CreateWebhookResponse = self.send(request).await?;
        Ok(res.webhook)
    }

    async fn delete_webhook(&self, webhook_id: &str) -> Result<(), ClickUpError> {
        let path = format!("/webhook/{}", encode(webhook_id));
        self.send_raw(self.request(Method::DELETE, &path)).await?;
        Ok(())
    }
}
