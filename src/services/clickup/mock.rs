use async_trait::async_trait;
use reqwest::StatusCode;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use super::{
    ClickUpError, ClickUpFolder, ClickUpList, ClickUpTag, ClickUpTask, ClickUpTemplate,
    ClickUpWebhook, TrackerApi, TASK_PAGE_SIZE,
};

pub fn task(id: &str, name: &str, tags: &[&str], parent: Option<&str>) -> ClickUpTask {
    ClickUpTask {
        id: id.to_string(),
        name: name.to_string(),
        tags: tags
            .iter()
            .map(|t| ClickUpTag {
                name: t.to_string(),
            })
            .collect(),
        parent: parent.map(|p| p.to_string()),
        ..Default::default()
    }
}

fn api_error(status: StatusCode, message: &str) -> ClickUpError {
    ClickUpError::Api {
        status,
        message: message.to_string(),
        code: None,
    }
}

/// In-memory remote tracker. Lists created through it are stored per folder.
#[derive(Default)]
pub struct MockTracker {
    pub tasks_by_list: Mutex<HashMap<String, Vec<ClickUpTask>>>,
    pub tasks: Mutex<HashMap<String, ClickUpTask>>,
    pub templates: Vec<ClickUpTemplate>,
    pub template_lists: Vec<String>,
    pub folder_lists: Mutex<HashMap<String, Vec<ClickUpList>>>,
    pub failing_lists: HashSet<String>,
    pub fail_templates: bool,
    pub fail_template_create: bool,
    pub created_folders: Mutex<Vec<String>>,
    pub created_webhooks: Mutex<Vec<(String, String)>>,
    pub deleted_webhooks: Mutex<Vec<String>>,
    pub page_requests: Mutex<Vec<(String, u32)>>,
}

impl MockTracker {
    pub fn with_list(list_id: &str, tasks: Vec<ClickUpTask>) -> Self {
        let tracker = Self::default();
        tracker.put_list(list_id, tasks);
        tracker
    }

    pub fn put_list(&self, list_id: &str, tasks: Vec<ClickUpTask>) {
        let mut by_id = self.tasks.lock().unwrap();
        for t in &tasks {
            by_id.insert(t.id.clone(), t.clone());
        }
        self.tasks_by_list
            .lock()
            .unwrap()
            .insert(list_id.to_string(), tasks);
    }

    pub fn put_task(&self, task: ClickUpTask) {
        self.tasks.lock().unwrap().insert(task.id.clone(), task);
    }

    fn next_id(&self, prefix: &str) -> String {
        let n = self.created_folders.lock().unwrap().len()
            + self
                .folder_lists
                .lock()
                .unwrap()
                .values()
                .map(Vec::len)
                .sum::<usize>();
        format!("{prefix}-{n}")
    }
}

#[async_trait]
impl TrackerApi for MockTracker {
    async fn get_task(&self, task_id: &str) -> Result<ClickUpTask, ClickUpError> {
        self.tasks
            .lock()
            .unwrap()
            .get(task_id)
            .cloned()
            .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Task not found"))
    }

    async fn list_tasks_page(
        &self,
        list_id: &str,
        page: u32,
    ) -> Result<Vec<ClickUpTask>, ClickUpError> {
        self.page_requests
            .lock()
            .unwrap()
            .push((list_id.to_string(), page));
        if self.failing_lists.contains(list_id) {
            return Err(api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "list unavailable",
            ));
        }
        let lists = self.tasks_by_list.lock().unwrap();
        let all = lists
            .get(list_id)
            .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "List not found"))?;
        Ok(all
            .iter()
            .skip(page as usize * TASK_PAGE_SIZE)
            .take(TASK_PAGE_SIZE)
            .cloned()
            .collect())
    }

    async fn list_folder_templates(
        &self,
        _team_id: &str,
    ) -> Result<Vec<ClickUpTemplate>, ClickUpError> {
        if self.fail_templates {
            return Err(api_error(StatusCode::FORBIDDEN, "templates unavailable"));
        }
        Ok(self.templates.clone())
    }

    async fn create_folder_from_template(
        &self,
        _space_id: &str,
        _template_id: &str,
        name: &str,
    ) -> Result<ClickUpFolder, ClickUpError> {
        if self.fail_template_create {
            return Err(api_error(StatusCode::BAD_REQUEST, "template failed"));
        }
        let folder_id = self.next_id("tpl-folder");
        self.created_folders.lock().unwrap().push(name.to_string());
        let lists: Vec<ClickUpList> = self
            .template_lists
            .iter()
            .enumerate()
            .map(|(i, list_name)| ClickUpList {
                id: format!("{folder_id}-l{i}"),
                name: list_name.clone(),
            })
            .collect();
        self.folder_lists
            .lock()
            .unwrap()
            .insert(folder_id.clone(), lists);
        Ok(ClickUpFolder {
            id: folder_id,
            name: name.to_string(),
            lists: vec![],
        })
    }

    async fn create_folder(
        &self,
        _space_id: &str,
        name: &str,
    ) -> Result<ClickUpFolder, ClickUpError> {
        let folder_id = self.next_id("folder");
        self.created_folders.lock().unwrap().push(name.to_string());
        self.folder_lists
            .lock()
            .unwrap()
            .insert(folder_id.clone(), vec![]);
        Ok(ClickUpFolder {
            id: folder_id,
            name: name.to_string(),
            lists: vec![],
        })
    }

    async fn create_list(&self, folder_id: &str, name: &str) -> Result<ClickUpList, ClickUpError> {
        let mut folders = self.folder_lists.lock().unwrap();
        let lists = folders.entry(folder_id.to_string()).or_default();
        let list = ClickUpList {
            id: format!("{folder_id}-l{}", lists.len()),
            name: name.to_string(),
        };
        lists.push(list.clone());
        Ok(list)
    }

    async fn list_folder_lists(&self, folder_id: &str) -> Result<Vec<ClickUpList>, ClickUpError> {
        Ok(self
            .folder_lists
            .lock()
            .unwrap()
            .get(folder_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_webhook(
        &self,
        _team_id: &str,
        endpoint: &str,
        list_id: &str,
    ) -> Result<ClickUpWebhook, ClickUpError> {
        if self.failing_lists.contains(list_id) {
            return Err(api_error(StatusCode::BAD_REQUEST, "cannot subscribe"));
        }
        let mut created = self.created_webhooks.lock().unwrap();
        created.push((list_id.to_string(), endpoint.to_string()));
        Ok(ClickUpWebhook {
            id: format!("wh-{}", created.len()),
            secret: None,
        })
    }

    async fn delete_webhook(&self, webhook_id: &str) -> Result<(), ClickUpError> {
        self.deleted_webhooks
            .lock()
            .unwrap()
            .push(webhook_id.to_string());
        Ok(())
    }
}
