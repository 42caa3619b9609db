//! Transient per-job config file.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::warn;

/// The config file handed to a module as its sole positional argument.
///
/// The file is removed when the guard is dropped, so every exit path of
/// the supervising task (including unwinding) cleans it up.
#[derive(Debug)]
pub struct ConfigArtifact {
    path: PathBuf,
}

impl ConfigArtifact {
    /// File name used for a job's config.
    pub fn file_name(job_id: &str) -> String {
        format!("module_config_{}.json", job_id)
    }

    /// Write `config` into `dir` for `job_id`.
    pub fn write(dir: &Path, job_id: &str, config: &Value) -> std::io::Result<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join(Self::file_name(job_id));
        let guard = Self { path };
        fs::write(&guard.path, serde_json::to_vec_pretty(config)?)?;
        Ok(guard)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ConfigArtifact {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), "Failed to remove job config: {}", e),
        }
    }
}
