//! The engine context object.

use std::path::PathBuf;
use std::sync::Arc;

use netsweep_config::{Config, ConfigValidator, ResolvedPaths};
use netsweep_protocols::{
    CredentialStore, ExpectedVersion, JobRecord, ModuleCatalog, ModuleDescriptor, ProcessSandbox,
    ScheduleDefinition, ScheduleRunResult, ScheduleRuntimeState, ScheduleStatus, ScheduleStore,
    SiteInventory, StoredSchedule,
};
use netsweep_runner::{JobListing, JobRunner, TokioSandbox};
use netsweep_scheduler::{PipelineExecutor, Scheduler, SchedulerError, ValidationRule, Validator};
use netsweep_store::{FsModuleCatalog, JsonCredentialStore, JsonInventory, JsonScheduleStore};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::lifecycle::{EngineState, StateCell};

/// A stored schedule merged with its live runtime state.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleView {
    /// Definition with literal credentials masked.
    #[serde(flatten)]
    pub definition: ScheduleDefinition,
    pub version: u64,
    pub runtime: ScheduleRuntimeState,
}

impl ScheduleView {
    fn new(stored: StoredSchedule, runtime: Option<ScheduleRuntimeState>) -> Self {
        let runtime = runtime.unwrap_or_else(|| ScheduleRuntimeState {
            status: if stored.definition.enabled {
                ScheduleStatus::Idle
            } else {
                ScheduleStatus::Disabled
            },
            ..ScheduleRuntimeState::default()
        });
        Self {
            definition: stored.definition.masked(),
            version: stored.version,
            runtime,
        }
    }
}

/// Builds an [`Engine`] from configuration.
///
/// Collaborators default to the file-backed implementations under the
/// configured paths; any of them can be replaced.
pub struct EngineBuilder {
    config: Config,
    base_dir: PathBuf,
    catalog: Option<Arc<dyn ModuleCatalog>>,
    inventory: Option<Arc<dyn SiteInventory>>,
    credentials: Option<Arc<dyn CredentialStore>>,
    schedules: Option<Arc<dyn ScheduleStore>>,
    sandbox: Option<Arc<dyn ProcessSandbox>>,
    rules: Vec<Arc<dyn ValidationRule>>,
}

impl EngineBuilder {
    /// Relative paths in `config` resolve against `base_dir`.
    pub fn new(config: Config, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            base_dir: base_dir.into(),
            catalog: None,
            inventory: None,
            credentials: None,
            schedules: None,
            sandbox: None,
            rules: Vec::new(),
        }
    }

    pub fn catalog(mut self, catalog: Arc<dyn ModuleCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn inventory(mut self, inventory: Arc<dyn SiteInventory>) -> Self {
        self.inventory = Some(inventory);
        self
    }

    pub fn credentials(mut self, credentials: Arc<dyn CredentialStore>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn schedules(mut self, schedules: Arc<dyn ScheduleStore>) -> Self {
        self.schedules = Some(schedules);
        self
    }

    pub fn sandbox(mut self, sandbox: Arc<dyn ProcessSandbox>) -> Self {
        self.sandbox = Some(sandbox);
        self
    }

    /// Register a module-specific validation rule.
    pub fn rule(mut self, rule: Arc<dyn ValidationRule>) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn build(self) -> Result<Engine, EngineError> {
        for warning in ConfigValidator::validate(&self.config).into_result()? {
            warn!("Config warning at {}: {}", warning.path, warning.message);
        }

        let config = self.config;
        let paths = config.paths.resolve(&self.base_dir);
        debug!(data_dir = %paths.data_dir.display(), "Resolved engine paths");

        let catalog = self.catalog.unwrap_or_else(|| {
            Arc::new(FsModuleCatalog::new(
                paths.modules_dir.clone(),
                config.runner.interpreters.keys().cloned(),
            ))
        });
        let inventory = self
            .inventory
            .unwrap_or_else(|| Arc::new(JsonInventory::new(paths.database_path.clone())));
        let credentials = self
            .credentials
            .unwrap_or_else(|| Arc::new(JsonCredentialStore::new(paths.credentials_path.clone())));
        let schedules = self.schedules.unwrap_or_else(|| {
            Arc::new(JsonScheduleStore::new(
                paths.schedules_path.clone(),
                config.scheduler.lock_timeout(),
            ))
        });
        let sandbox = self.sandbox.unwrap_or_else(|| Arc::new(TokioSandbox::new()));

        let runner = JobRunner::new(config.runner.clone(), paths.clone(), catalog.clone(), sandbox);
        let pipeline = PipelineExecutor::new(runner.clone(), credentials.clone());
        let validator = self
            .rules
            .into_iter()
            .fold(Validator::new(catalog.clone(), credentials, inventory.clone()), Validator::with_rule);
        let scheduler = Scheduler::new(
            config.scheduler.clone(),
            schedules.clone(),
            inventory,
            validator,
            pipeline,
        );

        Ok(Engine {
            config,
            paths,
            catalog,
            schedules,
            runner,
            scheduler,
            state: StateCell::new(),
            shutdown: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        })
    }
}

/// One job runner, one scheduler and the stores behind them.
pub struct Engine {
    config: Config,
    paths: ResolvedPaths,
    catalog: Arc<dyn ModuleCatalog>,
    schedules: Arc<dyn ScheduleStore>,
    runner: JobRunner,
    scheduler: Scheduler,
    state: StateCell,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Engine {
    pub fn builder(config: Config, base_dir: impl Into<PathBuf>) -> EngineBuilder {
        EngineBuilder::new(config, base_dir)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn paths(&self) -> &ResolvedPaths {
        &self.paths
    }

    pub fn state(&self) -> EngineState {
        self.state.get()
    }

    pub fn runner(&self) -> &JobRunner {
        &self.runner
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Start the reaper and the scheduler loop.
    pub fn start(&self) -> Result<(), EngineError> {
        self.state
            .transition(EngineState::Created, EngineState::Running)
            .map_err(EngineError::InvalidState)?;

        let mut tasks = self.tasks.lock();
        tasks.push(self.runner.start(self.shutdown.child_token()));
        tasks.push(self.scheduler.start(self.shutdown.child_token()));
        info!("Engine started");
        Ok(())
    }

    /// Stop the background loops. Running jobs and schedule runs are not
    /// interrupted; their tasks finish on their own.
    pub async fn shutdown(&self) {
        match self.state.transition(EngineState::Running, EngineState::ShuttingDown) {
            Ok(()) => {}
            Err(EngineState::Created) => {
                self.state.set(EngineState::Stopped);
                return;
            }
            Err(_) => return,
        }

        info!("Stopping engine...");
        self.shutdown.cancel();
        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                warn!("Engine task ended abnormally: {}", e);
            }
        }
        self.state.set(EngineState::Stopped);
        info!("Engine stopped");
    }

    fn ensure_accepting(&self) -> Result<(), EngineError> {
        match self.state.get() {
            EngineState::Created | EngineState::Running => Ok(()),
            state => Err(EngineError::InvalidState(state)),
        }
    }

    // ---- modules ----

    pub async fn list_modules(&self) -> Result<Vec<ModuleDescriptor>, EngineError> {
        let mut modules = self.catalog.list().await?;
        modules.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(modules)
    }

    pub async fn refresh_modules(&self) -> Result<(), EngineError> {
        self.catalog.refresh().await?;
        Ok(())
    }

    // ---- jobs ----

    /// Submit a module job; returns its id without waiting.
    pub async fn submit_job(
        &self,
        module_id: &str,
        config: Map<String, Value>,
    ) -> Result<String, EngineError> {
        self.ensure_accepting()?;
        Ok(self.runner.submit(module_id, config).await?)
    }

    /// Masked record of a live job.
    pub fn job_status(&self, job_id: &str) -> Result<JobRecord, EngineError> {
        Ok(self.runner.status(job_id)?)
    }

    pub async fn wait_for_job(&self, job_id: &str) -> Result<JobRecord, EngineError> {
        Ok(self.runner.wait(job_id).await?)
    }

    /// Masked tail of a job's log.
    pub async fn job_log(
        &self,
        job_id: &str,
        delete_after_read: bool,
        lines: Option<usize>,
    ) -> Result<String, EngineError> {
        Ok(self.runner.log(job_id, delete_after_read, lines).await?)
    }

    pub fn list_jobs(&self) -> JobListing {
        self.runner.list_jobs()
    }

    // ---- schedules ----

    /// Every stored schedule with its live runtime state.
    pub async fn list_schedules(&self) -> Result<Vec<ScheduleView>, EngineError> {
        let runtime = self.scheduler.runtime_states();
        let mut views: Vec<ScheduleView> = self
            .schedules
            .read_all()
            .await?
            .into_iter()
            .map(|stored| {
                let state = runtime.get(&stored.definition.id).cloned();
                ScheduleView::new(stored, state)
            })
            .collect();
        views.sort_by(|a, b| a.definition.id.cmp(&b.definition.id));
        Ok(views)
    }

    pub async fn get_schedule(&self, id: &str) -> Result<ScheduleView, EngineError> {
        let stored = self
            .schedules
            .get(id)
            .await?
            .ok_or_else(|| SchedulerError::ScheduleNotFound(id.to_string()))?;
        Ok(ScheduleView::new(stored, self.scheduler.runtime_state(id)))
    }

    /// Create or replace a schedule; returns its new version.
    pub async fn save_schedule(
        &self,
        definition: ScheduleDefinition,
        expected: ExpectedVersion,
    ) -> Result<u64, EngineError> {
        let id = definition.id.clone();
        let version = self.schedules.upsert(definition, expected).await?;
        info!(schedule_id = %id, version, "Schedule saved");
        Ok(version)
    }

    pub async fn delete_schedule(&self, id: &str, expected: ExpectedVersion) -> Result<(), EngineError> {
        self.schedules.remove(id, expected).await?;
        info!(schedule_id = %id, "Schedule deleted");
        Ok(())
    }

    /// Ask the scheduler loop to run a schedule on its next tick.
    pub async fn trigger_run_now(&self, id: &str) -> Result<bool, EngineError> {
        self.ensure_accepting()?;
        Ok(self.scheduler.trigger_run_now(id).await?)
    }

    /// Run a schedule in the caller's task and return its result.
    pub async fn run_schedule_now(&self, id: &str) -> Result<ScheduleRunResult, EngineError> {
        self.ensure_accepting()?;
        Ok(self.scheduler.run_schedule(id).await?)
    }

    pub async fn validate_schedule(&self, id: &str) -> Result<Vec<String>, EngineError> {
        Ok(self.scheduler.validate(id).await?)
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
