//! Job table and per-job supervision.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use netsweep_config::{ResolvedPaths, RunnerConfig};
use netsweep_protocols::job::progress;
use netsweep_protocols::mask::mask_value;
use netsweep_protocols::{
    JobRecord, JobStatus, ModuleCatalog, ProcessSandbox, SpawnOutcome, SpawnRequest,
};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::{Semaphore, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::artifact::ConfigArtifact;
use crate::error::RunnerError;
use crate::log_sink::LogSink;
use crate::reaper::{ReapTask, Reaper};

/// Ids of known jobs, split by state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobListing {
    pub running: Vec<String>,
    pub finished: Vec<String>,
}

/// Completion handle for a submitted job.
#[derive(Debug)]
pub struct JobHandle {
    id: String,
    rx: watch::Receiver<JobRecord>,
}

impl JobHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current (masked) record.
    pub fn current(&self) -> JobRecord {
        self.rx.borrow().masked()
    }

    /// Resolve once the job reaches a terminal status.
    pub async fn wait(mut self) -> JobRecord {
        let terminal = self
            .rx
            .wait_for(|r| r.status.is_terminal())
            .await
            .map(|r| r.masked());
        match terminal {
            Ok(record) => record,
            Err(_) => self.rx.borrow().masked(),
        }
    }
}

/// Runs module invocations as supervised worker processes.
#[derive(Clone)]
pub struct JobRunner {
    inner: Arc<Inner>,
}

struct Inner {
    config: RunnerConfig,
    paths: ResolvedPaths,
    catalog: Arc<dyn ModuleCatalog>,
    sandbox: Arc<dyn ProcessSandbox>,
    jobs: Mutex<HashMap<String, watch::Sender<JobRecord>>>,
    logs: LogSink,
    reaper: Reaper,
    permits: Option<Arc<Semaphore>>,
}

impl JobRunner {
    pub fn new(
        config: RunnerConfig,
        paths: ResolvedPaths,
        catalog: Arc<dyn ModuleCatalog>,
        sandbox: Arc<dyn ProcessSandbox>,
    ) -> Self {
        let permits = match config.max_concurrent_jobs {
            0 => None,
            n => Some(Arc::new(Semaphore::new(n))),
        };
        let logs = LogSink::new(paths.logs_dir.clone());

        Self {
            inner: Arc::new(Inner {
                config,
                paths,
                catalog,
                sandbox,
                jobs: Mutex::new(HashMap::new()),
                logs,
                reaper: Reaper::new(),
                permits,
            }),
        }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.inner.config
    }

    /// Submit a job and return its id without waiting for it.
    ///
    /// `config` becomes the body of the job's config file; the runner adds
    /// `database_path`, `module_id`, `job_id` and `log_file`.
    pub async fn submit(
        &self,
        module_id: &str,
        config: Map<String, Value>,
    ) -> Result<String, RunnerError> {
        Ok(self.submit_watched(module_id, config).await?.id)
    }

    /// Submit a job and return a handle that resolves on completion.
    pub async fn submit_watched(
        &self,
        module_id: &str,
        config: Map<String, Value>,
    ) -> Result<JobHandle, RunnerError> {
        let entrypoint = self.inner.catalog.resolve_entrypoint(module_id).await?;

        let job_id = Uuid::new_v4().to_string();
        let record = JobRecord::new(&job_id, module_id, self.inner.logs.path_for(&job_id));
        let (tx, rx) = watch::channel(record);
        self.inner.jobs.lock().insert(job_id.clone(), tx);

        info!(job_id = %job_id, module_id = %module_id, "Job submitted");
        self.inner
            .log_line(&job_id, &format!("Job submitted for module {}", module_id))
            .await;

        self.supervise(job_id.clone(), module_id.to_string(), entrypoint, config);
        Ok(JobHandle { id: job_id, rx })
    }

    /// Current record of a job, masked.
    pub fn status(&self, job_id: &str) -> Result<JobRecord, RunnerError> {
        self.inner
            .jobs
            .lock()
            .get(job_id)
            .map(|tx| tx.borrow().masked())
            .ok_or_else(|| RunnerError::JobNotFound(job_id.to_string()))
    }

    /// Wait for a job to reach a terminal status.
    pub async fn wait(&self, job_id: &str) -> Result<JobRecord, RunnerError> {
        let rx = self
            .inner
            .jobs
            .lock()
            .get(job_id)
            .map(|tx| tx.subscribe())
            .ok_or_else(|| RunnerError::JobNotFound(job_id.to_string()))?;
        let handle = JobHandle {
            id: job_id.to_string(),
            rx,
        };
        Ok(handle.wait().await)
    }

    /// Last `lines` lines (default `log_tail_lines`) of a job's log.
    ///
    /// Logs outlive job records, so this works after eviction.
    pub async fn log(
        &self,
        job_id: &str,
        delete_after_read: bool,
        lines: Option<usize>,
    ) -> Result<String, RunnerError> {
        if !is_job_id(job_id) {
            return Err(RunnerError::JobNotFound(job_id.to_string()));
        }
        let lines = lines.unwrap_or(self.inner.config.log_tail_lines);
        let tail = self
            .inner
            .logs
            .tail(job_id, lines)
            .await?
            .ok_or_else(|| RunnerError::LogNotFound(job_id.to_string()))?;

        if delete_after_read {
            self.inner.logs.delete(job_id).await?;
            debug!(job_id = %job_id, "Job log deleted after read");
        }
        Ok(tail)
    }

    /// Ids of every job still in the table, oldest first.
    pub fn list_jobs(&self) -> JobListing {
        let mut records: Vec<JobRecord> = self
            .inner
            .jobs
            .lock()
            .values()
            .map(|tx| tx.borrow().clone())
            .collect();
        records.sort_by_key(|r| r.start_time);

        let mut listing = JobListing::default();
        for record in records {
            if record.status.is_terminal() {
                listing.finished.push(record.id);
            } else {
                listing.running.push(record.id);
            }
        }
        listing
    }

    /// Start the cleanup loop. It stops when `shutdown` is cancelled.
    pub fn start(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            inner.reaper.run(shutdown, |task| inner.reap(task)).await;
        })
    }

    fn supervise(
        &self,
        job_id: String,
        module_id: String,
        entrypoint: PathBuf,
        config: Map<String, Value>,
    ) {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            // Run the job in its own task so a panic surfaces as a JoinError
            // here instead of leaving the record stuck in `running`.
            let work = tokio::spawn(inner.clone().execute(
                job_id.clone(),
                module_id,
                entrypoint,
                config,
            ));
            if let Err(e) = work.await {
                let message = join_error_message(e);
                error!(job_id = %job_id, "Job supervisor failed: {}", message);
                inner
                    .finish(&job_id, JobStatus::Error, None, Some(message))
                    .await;
            }
            inner.schedule_cleanup(&job_id);
        });
    }
}

impl Inner {
    async fn execute(
        self: Arc<Self>,
        job_id: String,
        module_id: String,
        entrypoint: PathBuf,
        config: Map<String, Value>,
    ) {
        let _permit = match &self.permits {
            Some(permits) => match permits.clone().acquire_owned().await {
                Ok(permit) => Some(permit),
                Err(_) => {
                    let message = "job pool closed".to_string();
                    self.finish(&job_id, JobStatus::Error, None, Some(message))
                        .await;
                    return;
                }
            },
            None => None,
        };

        let (status, output, error) =
            match self.launch(&job_id, &module_id, &entrypoint, config).await {
                Ok(outcome) => {
                    self.update(&job_id, |r| r.advance(progress::RETURNED));
                    verdict(outcome, self.config.timeout())
                }
                Err(e) => (JobStatus::Error, None, Some(e.to_string())),
            };

        self.finish(&job_id, status, output, error).await;
    }

    async fn launch(
        &self,
        job_id: &str,
        module_id: &str,
        entrypoint: &Path,
        config: Map<String, Value>,
    ) -> Result<SpawnOutcome, RunnerError> {
        let body = self.artifact_body(job_id, module_id, config);
        let artifact = ConfigArtifact::write(&self.paths.work_dir, job_id, &body)?;
        self.log_line(job_id, &format!("Config: {}", mask_value(&body)))
            .await;

        let request = self.spawn_request(job_id, module_id, entrypoint, artifact.path());
        self.update(job_id, |r| r.advance(progress::LAUNCHED));
        self.log_line(
            job_id,
            &format!("Launching {} (timeout {}s)", entrypoint.display(), self.config.timeout_secs),
        )
        .await;
        debug!(job_id = %job_id, program = %request.program.display(), "Launching worker");

        let outcome = self.sandbox.spawn(request).await?;
        drop(artifact);
        Ok(outcome)
    }

    fn artifact_body(&self, job_id: &str, module_id: &str, mut config: Map<String, Value>) -> Value {
        config
            .entry("parameters")
            .or_insert_with(|| Value::Object(Map::new()));
        config.insert(
            "database_path".to_string(),
            Value::String(self.paths.database_path.display().to_string()),
        );
        config.insert("module_id".to_string(), Value::String(module_id.to_string()));
        config.insert("job_id".to_string(), Value::String(job_id.to_string()));
        config.insert(
            "log_file".to_string(),
            Value::String(self.logs.path_for(job_id).display().to_string()),
        );
        Value::Object(config)
    }

    fn spawn_request(
        &self,
        job_id: &str,
        module_id: &str,
        entrypoint: &Path,
        artifact: &Path,
    ) -> SpawnRequest {
        let mut request = match self.config.interpreter_for(entrypoint) {
            Some(interpreter) => SpawnRequest::new(interpreter, self.config.timeout())
                .arg(entrypoint.display().to_string()),
            None => SpawnRequest::new(entrypoint, self.config.timeout()),
        };
        request = request
            .arg(artifact.display().to_string())
            .cwd(&self.paths.data_dir)
            .env("NETSWEEP_JOB_ID", job_id)
            .env("NETSWEEP_MODULE_ID", module_id);
        request.kill_on_timeout = self.config.kill_on_timeout;
        request
    }

    fn update(&self, job_id: &str, f: impl FnOnce(&mut JobRecord)) {
        if let Some(tx) = self.jobs.lock().get(job_id) {
            tx.send_modify(f);
        }
    }

    async fn finish(
        &self,
        job_id: &str,
        status: JobStatus,
        output: Option<Value>,
        error: Option<String>,
    ) {
        let already_done = self
            .jobs
            .lock()
            .get(job_id)
            .is_none_or(|tx| tx.borrow().status.is_terminal());
        if already_done {
            return;
        }

        match status {
            JobStatus::Completed => info!(job_id = %job_id, "Job completed"),
            _ => warn!(job_id = %job_id, status = %status, "Job did not complete"),
        }
        // Log before publishing so waiters always see the final line.
        let mut line = format!("Job finished: {}", status);
        if let Some(detail) = error.as_deref().filter(|d| !d.is_empty()) {
            line.push_str(&format!("\n{}", detail));
        }
        self.log_line(job_id, &line).await;

        self.update(job_id, |r| r.finish(status, output, error));
    }

    fn schedule_cleanup(&self, job_id: &str) {
        self.reaper.schedule(
            self.config.retention(),
            ReapTask::EvictJob {
                job_id: job_id.to_string(),
            },
        );
        self.reaper.schedule(
            self.config.log_retention(),
            ReapTask::DeleteLog {
                job_id: job_id.to_string(),
            },
        );
    }

    fn reap(&self, task: ReapTask) {
        match task {
            ReapTask::EvictJob { job_id } => {
                if self.jobs.lock().remove(&job_id).is_some() {
                    debug!(job_id = %job_id, "Job record evicted");
                }
            }
            ReapTask::DeleteLog { job_id } => {
                let logs = self.logs.clone();
                tokio::spawn(async move {
                    if let Err(e) = logs.delete(&job_id).await {
                        warn!(job_id = %job_id, "Failed to delete job log: {}", e);
                    }
                });
            }
        }
    }

    async fn log_line(&self, job_id: &str, message: &str) {
        if let Err(e) = self.logs.append(job_id, message).await {
            warn!(job_id = %job_id, "Failed to write job log: {}", e);
        }
    }
}

/// Map a sandbox outcome to the job's terminal status, output and error.
fn verdict(outcome: SpawnOutcome, timeout: Duration) -> (JobStatus, Option<Value>, Option<String>) {
    match outcome {
        SpawnOutcome::Exited {
            code: 0, stdout, ..
        } => {
            let output = serde_json::from_str(stdout.trim())
                .unwrap_or_else(|_| serde_json::json!({ "message": stdout }));
            (JobStatus::Completed, Some(output), None)
        }
        SpawnOutcome::Exited { code, stderr, .. } => {
            let error = if stderr.trim().is_empty() {
                format!("module exited with code {}", code)
            } else {
                stderr
            };
            (JobStatus::Failed, None, Some(error))
        }
        SpawnOutcome::TimedOut { killed, .. } => {
            let mut error = format!("module timed out after {}s", timeout.as_secs());
            if !killed {
                error.push_str(" (process left running)");
            }
            (JobStatus::Timeout, None, Some(error))
        }
    }
}

fn join_error_message(e: JoinError) -> String {
    if e.is_panic() {
        let payload = e.into_panic();
        if let Some(s) = payload.downcast_ref::<String>() {
            return s.clone();
        }
        if let Some(s) = payload.downcast_ref::<&str>() {
            return s.to_string();
        }
        return "job supervisor panicked".to_string();
    }
    "job supervisor was cancelled".to_string()
}

fn is_job_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
