//! Module catalog errors.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Module not found: {0}")]
    ModuleNotFound(String),

    #[error("Module {module} has no unique entrypoint (candidates: {})", candidates.join(", "))]
    AmbiguousEntrypoint {
        module: String,
        candidates: Vec<String>,
    },

    #[error("Invalid manifest {path}: {reason}")]
    InvalidManifest { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CatalogError {
    /// Whether the error means "this module cannot be run", as opposed to
    /// the catalog itself being unavailable.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CatalogError::ModuleNotFound(_) | CatalogError::AmbiguousEntrypoint { .. }
        )
    }
}
