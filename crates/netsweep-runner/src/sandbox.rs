//! Worker process execution on tokio.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use netsweep_protocols::{ProcessSandbox, SandboxError, SpawnOutcome, SpawnRequest};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

/// How long to wait for pipe readers after a killed process.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Runs each request as a child process in its own process group.
#[derive(Debug, Clone, Default)]
pub struct TokioSandbox;

impl TokioSandbox {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessSandbox for TokioSandbox {
    async fn spawn(&self, request: SpawnRequest) -> Result<SpawnOutcome, SandboxError> {
        let program = request.program.display().to_string();

        let mut cmd = Command::new(&request.program);
        cmd.args(&request.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(request.kill_on_timeout);
        if let Some(cwd) = &request.cwd {
            cmd.current_dir(cwd);
        }
        for (key, value) in &request.env {
            cmd.env(key, value);
        }
        // New group so a timeout can take down everything the module forked.
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|e| SandboxError::Spawn {
            program: program.clone(),
            reason: e.to_string(),
        })?;
        debug!(program = %program, pid = ?child.id(), "Spawned worker process");

        // The group id outlives the child once it has been reaped.
        let pid = child.id();
        let mut stdout = collect(child.stdout.take());
        let mut stderr = collect(child.stderr.take());

        // One deadline covers the exit and both pipes reaching EOF.
        let mut exited = None;
        let run = async {
            let status = child.wait().await?;
            exited = Some(status);
            let (out, err) = tokio::join!(&mut stdout, &mut stderr);
            Ok::<_, std::io::Error>((status, out.unwrap_or_default(), err.unwrap_or_default()))
        };
        let finished = timeout(request.timeout, run).await;

        if let Ok(result) = finished {
            let (status, stdout, stderr) = result?;
            return Ok(SpawnOutcome::Exited {
                code: status.code().unwrap_or(-1),
                stdout,
                stderr,
            });
        }

        if let Some(status) = exited {
            // Something the worker left behind still holds its output pipes.
            warn!(program = %program, "Worker exited but its output stayed open past the timeout");
            if request.kill_on_timeout {
                signal_group(pid);
            }
            return Ok(SpawnOutcome::Exited {
                code: status.code().unwrap_or(-1),
                stdout: drain(stdout).await,
                stderr: drain(stderr).await,
            });
        }

        stdout.abort();
        if !request.kill_on_timeout {
            warn!(program = %program, "Worker timed out, leaving it running");
            stderr.abort();
            return Ok(SpawnOutcome::TimedOut {
                killed: false,
                stderr: String::new(),
            });
        }

        let killed = kill_group(&mut child, pid).await;
        Ok(SpawnOutcome::TimedOut {
            killed,
            stderr: drain(stderr).await,
        })
    }
}

/// Wait a bounded time for a pipe reader; give up with what is known.
async fn drain(mut reader: JoinHandle<String>) -> String {
    match timeout(DRAIN_GRACE, &mut reader).await {
        Ok(Ok(text)) => text,
        _ => {
            reader.abort();
            String::new()
        }
    }
}

fn collect<R>(pipe: Option<R>) -> JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf).await;
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

/// SIGKILL every process in the worker's group.
fn signal_group(pid: Option<u32>) {
    #[cfg(unix)]
    if let Some(pid) = pid {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            debug!(pid, "killpg failed: {}", e);
        }
    }
    #[cfg(not(unix))]
    let _ = pid;
}

/// SIGKILL the child's process group, then reap the child.
async fn kill_group(child: &mut Child, pid: Option<u32>) -> bool {
    signal_group(pid);

    match child.kill().await {
        Ok(()) => true,
        Err(e) => {
            // Already gone if the group kill reaped it first.
            match child.try_wait() {
                Ok(Some(_)) => true,
                _ => {
                    warn!("Failed to kill timed-out worker: {}", e);
                    false
                }
            }
        }
    }
}

#[cfg(all(test, unix))]
#[path = "sandbox_tests.rs"]
mod tests;
