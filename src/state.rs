use crate::config::Config;
use crate::db::workflow_run_repository::WorkflowRunRepository;
use crate::services::processor::ProcessorWaker;
use crate::sync::Synchronizer;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<dyn WorkflowRunRepository>,
    pub synchronizer: Synchronizer,
    pub waker: Arc<dyn ProcessorWaker>,
    pub config: Arc<Config>,
}
