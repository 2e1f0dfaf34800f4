use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::{ListSyncReport, SyncError, Synchronizer};
use crate::models::event::Event;
use crate::models::synced_task::TaskPhase;
use crate::models::webhook_registration::NewWebhookRegistration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationAction {
    Created,
    Reused,
    Removed,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegistrationEntry {
    pub list_id: String,
    pub phase: Option<TaskPhase>,
    pub webhook_id: Option<String>,
    pub action: RegistrationAction,
    pub sync: Option<ListSyncReport>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegistrationReport {
    pub event_id: Uuid,
    pub entries: Vec<RegistrationEntry>,
    pub errors: Vec<String>,
}

impl Synchronizer {
    async fn linked_event(&self, event_id: Uuid) -> Result<Event, SyncError> {
        let event = self
            .repo
            .find_event(event_id)
            .await?
            .ok_or(SyncError::EventNotFound(event_id))?;
        if event.linkage().lists().is_empty() {
            return Err(SyncError::NotLinked(event_id));
        }
        Ok(event)
    }

    /// Subscribes the remote tracker to each linked list of the event, then
    /// reconciles the list so that tasks created before the subscription are
    /// not missed. Registrations already on file are reused.
    pub async fn register_event_webhooks(
        &self,
        event_id: Uuid,
    ) -> Result<RegistrationReport, SyncError> {
        let event = self.linked_event(event_id).await?;
        let team_id = self
            .settings
            .team_id
            .clone()
            .ok_or(SyncError::NotConfigured("CLICKUP_TEAM_ID"))?;
        let endpoint = self
            .settings
            .webhook_endpoint
            .clone()
            .ok_or(SyncError::NotConfigured("PUBLIC_BASE_URL"))?;

        let mut report = RegistrationReport {
            event_id,
            entries: Vec::new(),
            errors: Vec::new(),
        };

        for (phase, list_id) in event.linkage().lists() {
            let entry = match self
                .ensure_registration(&team_id, &endpoint, event_id, &list_id)
                .await
            {
                Ok((registration_id, webhook_id, action)) => {
                    let mut entry = RegistrationEntry {
                        list_id: list_id.clone(),
                        phase: Some(phase),
                        webhook_id: Some(webhook_id),
                        action,
                        sync: None,
                        error: None,
                    };
                    match self.reconcile_list(event_id, phase, &list_id).await {
                        Ok(sync) => {
                            entry.sync = Some(sync);
                            if let Err(err) = self.repo.touch_webhook_sync(registration_id).await {
                                warn!(
                                    %event_id,
                                    %list_id,
                                    ?err,
                                    "failed to stamp webhook sync time"
                                );
                            }
                        }
                        Err(err) => entry.error = Some(format!("initial sync failed: {}", err)),
                    }
                    entry
                }
                Err(err) => RegistrationEntry {
                    list_id: list_id.clone(),
                    phase: Some(phase),
                    webhook_id: None,
                    action: RegistrationAction::Failed,
                    sync: None,
                    error: Some(err.to_string()),
                },
            };

            if let Some(error) = &entry.error {
                warn!(%event_id, %list_id, %error, "webhook registration incomplete");
                report.errors.push(format!("list {}: {}", list_id, error));
            }
            report.entries.push(entry);
        }

        info!(
            %event_id,
            lists = report.entries.len(),
            errors = report.errors.len(),
            "registered event webhooks"
        );
        Ok(report)
    }

    async fn ensure_registration(
        &self,
        team_id: &str,
        endpoint: &str,
        event_id: Uuid,
        list_id: &str,
    ) -> Result<(Uuid, String, RegistrationAction), SyncError> {
        if let Some(existing) = self
            .repo
            .find_active_webhook(list_id, Some(event_id))
            .await?
        {
            return Ok((
                existing.id,
                existing.webhook_id,
                RegistrationAction::Reused,
            ));
        }

        let webhook = self
            .tracker
            .create_webhook(team_id, endpoint, list_id)
            .await?;
        // Deliveries are verified against CLICKUP_WEBHOOK_SECRET, not a per-webhook secret.
        info!(
            list_id,
            webhook_id = %webhook.id,
            issued_secret = webhook.secret.is_some(),
            "created remote webhook"
        );
        let stored = self
            .repo
            .insert_webhook_registration(NewWebhookRegistration {
                list_id: list_id.to_string(),
                team_id: team_id.to_string(),
                webhook_id: webhook.id.clone(),
                event_id: Some(event_id),
            })
            .await;

        match stored {
            Ok(registration) => Ok((
                registration.id,
                registration.webhook_id,
                RegistrationAction::Created,
            )),
            Err(err) => {
                // Do not leave a remote subscription nobody tracks.
                if let Err(cleanup) = self.tracker.delete_webhook(&webhook.id).await {
                    warn!(
                        list_id,
                        webhook_id = %webhook.id,
                        %cleanup,
                        "failed to remove untracked webhook"
                    );
                }
                Err(err.into())
            }
        }
    }

    /// Removes every active subscription for the event, remotely and locally.
    /// A webhook the remote side no longer knows is treated as removed.
    pub async fn deactivate_event_webhooks(
        &self,
        event_id: Uuid,
    ) -> Result<RegistrationReport, SyncError> {
        let event = self
            .repo
            .find_event(event_id)
            .await?
            .ok_or(SyncError::EventNotFound(event_id))?;
        let linkage = event.linkage();

        let mut report = RegistrationReport {
            event_id,
            entries: Vec::new(),
            errors: Vec::new(),
        };

        for registration in self.repo.list_event_webhooks(event_id).await? {
            let mut entry = RegistrationEntry {
                phase: linkage.phase_of(&registration.list_id),
                list_id: registration.list_id.clone(),
                webhook_id: Some(registration.webhook_id.clone()),
                action: RegistrationAction::Removed,
                sync: None,
                error: None,
            };

            let remote = match self.tracker.delete_webhook(&registration.webhook_id).await {
                Ok(()) => Ok(()),
                Err(err) if err.is_not_found() => Ok(()),
                Err(err) => Err(SyncError::from(err)),
            };
            let result = match remote {
                Ok(()) => self
                    .repo
                    .deactivate_webhook(registration.id)
                    .await
                    .map(|_| ())
                    .map_err(SyncError::from),
                Err(err) => Err(err),
            };

            if let Err(err) = result {
                warn!(%event_id, list_id = %registration.list_id, %err, "failed to remove webhook");
                report
                    .errors
                    .push(format!("list {}: {}", registration.list_id, err));
                entry.action = RegistrationAction::Failed;
                entry.error = Some(err.to_string());
            }
            report.entries.push(entry);
        }

        info!(
            %event_id,
            removed = report.entries.len() - report.errors.len(),
            "removed event webhooks"
        );
        Ok(report)
    }
}
