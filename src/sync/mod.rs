//! Remote hierarchy synchronizer: folder -> list -> task (with subtasks).
//!
//! Classification and inclusion are pure functions in [`classify`] and
//! [`inclusion`]; [`Synchronizer`] wires them to the remote tracker and the
//! local repositories.

pub mod classify;
pub mod inclusion;
mod provision;
mod reconcile;
mod register;

use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::db::sync_repository::SyncRepository;
use crate::models::synced_task::TaskPhase;
use crate::services::clickup::{ClickUpError, TrackerApi};

pub use provision::{ProvisionOutcome, ProvisionRequest};
pub use reconcile::TaskEventOutcome;
pub use register::{RegistrationAction, RegistrationEntry, RegistrationReport};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Remote(#[from] ClickUpError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("event {0} not found")]
    EventNotFound(Uuid),
    #[error("event {0} has no linked lists")]
    NotLinked(Uuid),
    #[error("{0} is not configured")]
    NotConfigured(&'static str),
}

#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub event_tag: String,
    pub team_id: Option<String>,
    pub space_id: Option<String>,
    pub default_agent_name: Option<String>,
    /// Public URL the remote tracker should deliver task webhooks to.
    pub webhook_endpoint: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ListSyncReport {
    pub list_id: String,
    pub phase: TaskPhase,
    pub fetched: usize,
    pub included: usize,
    pub inserted: usize,
    pub updated: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub event_id: Uuid,
    pub lists: Vec<ListSyncReport>,
    pub errors: Vec<String>,
}

impl SyncReport {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty() || self.lists.iter().any(|l| !l.errors.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct BatchSyncReport {
    pub events: Vec<SyncReport>,
    pub errors: Vec<String>,
}

#[derive(Clone)]
pub struct Synchronizer {
    tracker: Arc<dyn TrackerApi>,
    repo: Arc<dyn SyncRepository>,
    settings: SyncSettings,
}

impl Synchronizer {
    pub fn new(
        tracker: Arc<dyn TrackerApi>,
        repo: Arc<dyn SyncRepository>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            tracker,
            repo,
            settings,
        }
    }

    pub fn repo(&self) -> &Arc<dyn SyncRepository> {
        &self.repo
    }
}
