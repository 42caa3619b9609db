//! Scheduler errors.

use netsweep_protocols::{CatalogError, StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Schedule not found: {0}")]
    ScheduleNotFound(String),

    #[error("Schedule is invalid: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("Schedule {0} is disabled")]
    Disabled(String),

    #[error("Schedule {0} is already running")]
    AlreadyRunning(String),

    #[error("Credential profile '{profile}' not found for module {module_id}")]
    ProfileNotFound { module_id: String, profile: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

impl SchedulerError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, SchedulerError::ScheduleNotFound(_))
    }
}
