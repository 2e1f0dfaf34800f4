use serde::{Deserialize, Serialize};
use time::Date;
use tracing::{info, warn};
use uuid::Uuid;

use super::classify::{
    classify_lists, find_event_template, first_name, folder_name, PHASE_LIST_NAMES,
};
use super::{SyncError, Synchronizer};
use crate::models::event::{Event, ListLinkage};
use crate::services::clickup::{ClickUpError, ClickUpFolder};

#[derive(Debug, Clone, Deserialize)]
pub struct ProvisionRequest {
    pub title: String,
    pub date: Date,
    #[serde(default)]
    pub agent_first_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProvisionOutcome {
    pub event: Event,
    pub folder_id: Option<String>,
    pub folder_name: Option<String>,
    pub from_template: bool,
    pub already_provisioned: bool,
    pub linkage: ListLinkage,
}

impl Synchronizer {
    /// Creates the remote folder and phase lists for an event and stores the
    /// resulting list IDs on it.
    ///
    /// A folder template whose name mentions "event" is tried first. Any
    /// failure on that path is logged and provisioning continues with a plain
    /// folder plus the three phase lists.
    pub async fn provision_event(
        &self,
        event_id: Uuid,
        request: ProvisionRequest,
    ) -> Result<ProvisionOutcome, SyncError> {
        let event = self
            .repo
            .find_event(event_id)
            .await?
            .ok_or(SyncError::EventNotFound(event_id))?;

        if event.is_provisioned() {
            info!(%event_id, "event already provisioned");
            return Ok(ProvisionOutcome {
                folder_id: event.clickup_folder_id.clone(),
                folder_name: None,
                from_template: false,
                already_provisioned: true,
                linkage: event.linkage(),
                event,
            });
        }

        let space_id = self
            .settings
            .space_id
            .as_deref()
            .ok_or(SyncError::NotConfigured("CLICKUP_SPACE_ID"))?;

        let agent = request
            .agent_first_name
            .as_deref()
            .or(event.agent_name.as_deref())
            .or(self.settings.default_agent_name.as_deref())
            .and_then(first_name);
        let name = folder_name(agent, request.date, &request.title);

        let (folder, created_lists, from_template) =
            match self.folder_from_template(space_id, &name).await {
                Some(folder) => (folder, Vec::new(), true),
                None => {
                    let folder = self.tracker.create_folder(space_id, &name).await?;
                    let mut lists = Vec::with_capacity(PHASE_LIST_NAMES.len());
                    for list_name in PHASE_LIST_NAMES {
                        lists.push(self.tracker.create_list(&folder.id, list_name).await?);
                    }
                    (folder, lists, false)
                }
            };

        let mut lists = self.tracker.list_folder_lists(&folder.id).await?;
        if lists.is_empty() {
            lists = if created_lists.is_empty() {
                folder.lists.clone()
            } else {
                created_lists
            };
        }

        let linkage = classify_lists(&lists);
        if !linkage.is_complete() {
            warn!(
                %event_id,
                folder_id = %folder.id,
                lists = lists.len(),
                "folder lists only partially classified"
            );
        }

        let event = self
            .repo
            .set_event_lists(event_id, &folder.id, &linkage)
            .await?
            .ok_or(SyncError::EventNotFound(event_id))?;

        info!(
            %event_id,
            folder_id = %folder.id,
            folder_name = %name,
            from_template,
            "provisioned event folder"
        );
        Ok(ProvisionOutcome {
            event,
            folder_id: Some(folder.id),
            folder_name: Some(name),
            from_template,
            already_provisioned: false,
            linkage,
        })
    }

    async fn folder_from_template(&self, space_id: &str, name: &str) -> Option<ClickUpFolder> {
        let team_id = self.settings.team_id.as_deref()?;
        match self.try_template(team_id, space_id, name).await {
            Ok(folder) => folder,
            Err(err) => {
                warn!(
                    team_id,
                    space_id,
                    %err,
                    "folder template path failed, creating folder manually"
                );
                None
            }
        }
    }

    async fn try_template(
        &self,
        team_id: &str,
        space_id: &str,
        name: &str,
    ) -> Result<Option<ClickUpFolder>, ClickUpError> {
        let templates = self.tracker.list_folder_templates(team_id).await?;
        let Some(template) = find_event_template(&templates) else {
            return Ok(None);
        };
        let folder = self
            .tracker
            .create_folder_from_template(space_id, &template.id, name)
            .await?;
        Ok(Some(folder))
    }
}
