//! Process sandbox protocol.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::SandboxError;

/// A request to run one module invocation as a separate process.
#[derive(Debug, Clone)]
pub struct SpawnRequest {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    pub timeout: Duration,
    /// Kill the process (group) when the timeout fires instead of
    /// abandoning it.
    pub kill_on_timeout: bool,
}

impl SpawnRequest {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
            timeout,
            kill_on_timeout: true,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }
}

/// How a sandboxed process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpawnOutcome {
    /// The process exited on its own. A signal death reports code -1.
    Exited {
        code: i32,
        stdout: String,
        stderr: String,
    },
    /// The wall-clock timeout fired first.
    TimedOut { killed: bool, stderr: String },
}

/// Runs module invocations as isolated worker processes.
#[async_trait]
pub trait ProcessSandbox: Send + Sync {
    async fn spawn(&self, request: SpawnRequest) -> Result<SpawnOutcome, SandboxError>;
}
