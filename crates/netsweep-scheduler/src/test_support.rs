//! Shared fixtures for scheduler tests.

use std::sync::Arc;

use netsweep_config::{PathsConfig, RunnerConfig, SchedulerConfig};
use netsweep_protocols::{ModuleDescriptor, ModuleInput};
use netsweep_runner::JobRunner;
use netsweep_runner::testing::ScriptedSandbox;
use netsweep_store::{MemoryCatalog, MemoryCredentialStore, MemoryInventory, MemoryScheduleStore};
use tempfile::TempDir;

use crate::{PipelineExecutor, Scheduler, Validator};

pub struct Harness {
    pub runner: JobRunner,
    pub sandbox: Arc<ScriptedSandbox>,
    pub credentials: Arc<MemoryCredentialStore>,
    pub inventory: Arc<MemoryInventory>,
    pub store: Arc<MemoryScheduleStore>,
    catalog: Arc<MemoryCatalog>,
    _dir: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_runner(RunnerConfig::default())
    }

    pub fn with_runner(config: RunnerConfig) -> Self {
        let dir = TempDir::new().unwrap();
        let catalog = Arc::new(
            MemoryCatalog::new()
                .with_module(
                    ModuleDescriptor::new("cdp_discovery")
                        .with_input(ModuleInput::required("root_ip")),
                )
                .with_module(ModuleDescriptor::new("ping_monitor"))
                .with_module(ModuleDescriptor::new("export_devices")),
        );
        let sandbox = ScriptedSandbox::new();
        let runner = JobRunner::new(
            config,
            PathsConfig::default().resolve(dir.path()),
            catalog.clone(),
            sandbox.clone(),
        );

        Self {
            runner,
            sandbox,
            credentials: Arc::new(MemoryCredentialStore::new()),
            inventory: Arc::new(
                MemoryInventory::new()
                    .with_gateway("SiteA", "10.0.0.1")
                    .with_gateway("SiteB", "10.1.0.1")
                    .with_site("SiteC"),
            ),
            store: Arc::new(MemoryScheduleStore::new()),
            catalog,
            _dir: dir,
        }
    }

    pub fn pipeline(&self) -> PipelineExecutor {
        PipelineExecutor::new(self.runner.clone(), self.credentials.clone())
    }

    pub fn validator(&self) -> Validator {
        Validator::new(
            self.catalog.clone(),
            self.credentials.clone(),
            self.inventory.clone(),
        )
    }

    pub fn scheduler(&self, config: SchedulerConfig) -> Scheduler {
        Scheduler::new(
            config,
            self.store.clone(),
            self.inventory.clone(),
            self.validator(),
            self.pipeline(),
        )
    }
}
