//! Runner errors.

use netsweep_protocols::{CatalogError, SandboxError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Module not found: {0}")]
    ModuleNotFound(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Log not found for job: {0}")]
    LogNotFound(String),

    #[error("Catalog error: {0}")]
    Catalog(CatalogError),

    #[error("Sandbox error: {0}")]
    Sandbox(#[from] SandboxError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<CatalogError> for RunnerError {
    fn from(e: CatalogError) -> Self {
        match e {
            CatalogError::ModuleNotFound(id) => RunnerError::ModuleNotFound(id),
            CatalogError::AmbiguousEntrypoint { module, .. } => RunnerError::ModuleNotFound(module),
            other => RunnerError::Catalog(other),
        }
    }
}

impl RunnerError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RunnerError::ModuleNotFound(_) | RunnerError::JobNotFound(_) | RunnerError::LogNotFound(_)
        )
    }
}
