//! Configuration schema definitions.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub runner: RunnerConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Filesystem locations. Relative entries are taken from `data_dir`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "default_modules_dir")]
    pub modules_dir: PathBuf,

    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    #[serde(default = "default_schedules_path")]
    pub schedules_path: PathBuf,

    #[serde(default = "default_credentials_path")]
    pub credentials_path: PathBuf,

    #[serde(default = "default_logs_dir")]
    pub logs_dir: PathBuf,

    /// Where transient per-job config files are written.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            modules_dir: default_modules_dir(),
            database_path: default_database_path(),
            schedules_path: default_schedules_path(),
            credentials_path: default_credentials_path(),
            logs_dir: default_logs_dir(),
            work_dir: default_work_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_modules_dir() -> PathBuf {
    PathBuf::from("modules")
}

fn default_database_path() -> PathBuf {
    PathBuf::from("database.json")
}

fn default_schedules_path() -> PathBuf {
    PathBuf::from("schedules.json")
}

fn default_credentials_path() -> PathBuf {
    PathBuf::from("credentials.json")
}

fn default_logs_dir() -> PathBuf {
    PathBuf::from("logs/jobs")
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("run")
}

/// Absolute filesystem locations derived from [`PathsConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPaths {
    pub data_dir: PathBuf,
    pub modules_dir: PathBuf,
    pub database_path: PathBuf,
    pub schedules_path: PathBuf,
    pub credentials_path: PathBuf,
    pub logs_dir: PathBuf,
    pub work_dir: PathBuf,
}

impl PathsConfig {
    /// Resolve every path against `data_dir`, which itself is resolved
    /// against `base` when relative.
    pub fn resolve(&self, base: &Path) -> ResolvedPaths {
        let data_dir = resolve_path(base, &self.data_dir);
        let under = |p: &Path| resolve_path(&data_dir, p);

        ResolvedPaths {
            modules_dir: under(&self.modules_dir),
            database_path: under(&self.database_path),
            schedules_path: under(&self.schedules_path),
            credentials_path: under(&self.credentials_path),
            logs_dir: under(&self.logs_dir),
            work_dir: under(&self.work_dir),
            data_dir,
        }
    }
}

/// Expand `~` and anchor a relative path at `base`.
pub fn resolve_path(base: &Path, path: &Path) -> PathBuf {
    let expanded = PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).as_ref());
    let joined = if expanded.is_absolute() {
        expanded
    } else {
        base.join(expanded)
    };
    // `.` components make log output noisy; drop them.
    joined
        .components()
        .filter(|c| !matches!(c, std::path::Component::CurDir))
        .collect()
}

/// Job runner configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Wall-clock budget per module invocation.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// How long a finished job record stays queryable.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,

    /// How long a finished job's log file is kept.
    #[serde(default = "default_log_retention_secs")]
    pub log_retention_secs: u64,

    /// Default number of lines returned by a log read.
    #[serde(default = "default_log_tail_lines")]
    pub log_tail_lines: usize,

    /// Maximum concurrently executing jobs (0 = unbounded).
    #[serde(default)]
    pub max_concurrent_jobs: usize,

    /// Kill the process group of a timed-out module.
    #[serde(default = "default_true")]
    pub kill_on_timeout: bool,

    /// Interpreter per entrypoint extension.
    #[serde(default = "default_interpreters")]
    pub interpreters: HashMap<String, String>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            retention_secs: default_retention_secs(),
            log_retention_secs: default_log_retention_secs(),
            log_tail_lines: default_log_tail_lines(),
            max_concurrent_jobs: 0,
            kill_on_timeout: true,
            interpreters: default_interpreters(),
        }
    }
}

impl RunnerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn log_retention(&self) -> Duration {
        Duration::from_secs(self.log_retention_secs)
    }

    /// Interpreter for an entrypoint, if its extension has one.
    pub fn interpreter_for(&self, entrypoint: &Path) -> Option<&str> {
        entrypoint
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| self.interpreters.get(ext))
            .map(String::as_str)
    }
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_retention_secs() -> u64 {
    300
}

fn default_log_retention_secs() -> u64 {
    86_400
}

fn default_log_tail_lines() -> usize {
    200
}

fn default_interpreters() -> HashMap<String, String> {
    let python = if cfg!(windows) { "python" } else { "python3" };
    HashMap::from([
        ("py".to_string(), python.to_string()),
        ("sh".to_string(), "sh".to_string()),
    ])
}

/// Scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Interval between scheduler ticks.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Cap on concurrently running site pipelines per schedule
    /// (0 = one per targeted site).
    #[serde(default)]
    pub max_concurrent_sites: usize,

    /// Bounded wait for the schedule store lock.
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_concurrent_sites: 0,
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

impl SchedulerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_lock_timeout_ms() -> u64 {
    5000
}

/// Process logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    #[serde(default = "default_level")]
    pub level: String,

    /// "text" or "json".
    #[serde(default = "default_format")]
    pub format: String,

    /// Directory for the daily-rotated process log. Unset disables it.
    #[serde(default = "default_log_dir")]
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: default_format(),
            dir: default_log_dir(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "text".to_string()
}

fn default_log_dir() -> Option<PathBuf> {
    Some(PathBuf::from("logs"))
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
#[path = "schema_tests.rs"]
mod tests;
