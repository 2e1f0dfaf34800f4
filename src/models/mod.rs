pub mod event;
pub mod synced_task;
pub mod webhook_registration;
pub mod workflow_run;
pub mod workflow_run_step;
