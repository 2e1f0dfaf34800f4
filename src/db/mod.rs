#[cfg(test)]
pub mod mock_db;
pub mod postgres_sync_repository;
pub mod postgres_workflow_run_repository;
pub mod sync_repository;
pub mod workflow_run_repository;
