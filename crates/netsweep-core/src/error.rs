//! Engine errors.

use netsweep_config::ConfigError;
use netsweep_protocols::{CatalogError, StoreError};
use netsweep_runner::RunnerError;
use netsweep_scheduler::SchedulerError;
use thiserror::Error;

use crate::lifecycle::EngineState;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Runner(#[from] RunnerError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Engine is {0:?}")]
    InvalidState(EngineState),
}

impl EngineError {
    /// Whether the error names an unknown module, job, log or schedule.
    pub fn is_not_found(&self) -> bool {
        match self {
            EngineError::Runner(e) => e.is_not_found(),
            EngineError::Scheduler(e) => e.is_not_found(),
            EngineError::Store(StoreError::NotFound(_)) => true,
            EngineError::Catalog(e) => e.is_not_found(),
            _ => false,
        }
    }

    /// Whether the error is an optimistic-concurrency conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            EngineError::Store(StoreError::Conflict { .. })
                | EngineError::Scheduler(SchedulerError::Store(StoreError::Conflict { .. }))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netsweep_protocols::ExpectedVersion;

    #[test]
    fn test_not_found_classification() {
        assert!(EngineError::from(RunnerError::JobNotFound("j".into())).is_not_found());
        assert!(EngineError::from(SchedulerError::ScheduleNotFound("s".into())).is_not_found());
        assert!(EngineError::from(StoreError::NotFound("s".into())).is_not_found());
        assert!(!EngineError::InvalidState(EngineState::Stopped).is_not_found());
    }

    #[test]
    fn test_conflict_classification() {
        let err = EngineError::from(StoreError::Conflict {
            id: "s".into(),
            expected: ExpectedVersion::Exact(1),
            actual: Some(2),
        });
        assert!(err.is_conflict());
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_transparent_display() {
        let err = EngineError::from(SchedulerError::AlreadyRunning("nightly".into()));
        assert_eq!(err.to_string(), "Schedule nightly is already running");
    }
}
