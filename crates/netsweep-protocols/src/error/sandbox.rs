//! Process sandbox errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("Failed to spawn {program}: {reason}")]
    Spawn { program: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
