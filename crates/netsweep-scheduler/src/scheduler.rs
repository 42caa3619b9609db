//! Polling scheduler.
//!
//! Every tick re-reads the schedule store, moves each schedule through its
//! runtime state machine and spawns one task per due schedule. Ticks never
//! wait for runs to finish.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use futures::stream;
use netsweep_config::SchedulerConfig;
use netsweep_protocols::{
    ScheduleDefinition, ScheduleRunResult, ScheduleRuntimeState, ScheduleStore, ScopeMode,
    SiteInventory, SiteRunMode, SiteRunResult, StoreError,
};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::SchedulerError;
use crate::pipeline::PipelineExecutor;
use crate::runtime::{RuntimeTable, TickDecision};
use crate::validation::Validator;

struct Inner {
    config: SchedulerConfig,
    store: Arc<dyn ScheduleStore>,
    inventory: Arc<dyn SiteInventory>,
    validator: Validator,
    pipeline: PipelineExecutor,
    runtime: RuntimeTable,
}

/// Drives persisted schedules. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    pub fn new(
        config: SchedulerConfig,
        store: Arc<dyn ScheduleStore>,
        inventory: Arc<dyn SiteInventory>,
        validator: Validator,
        pipeline: PipelineExecutor,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                store,
                inventory,
                validator,
                pipeline,
                runtime: RuntimeTable::new(),
            }),
        }
    }

    pub fn runtime_state(&self, id: &str) -> Option<ScheduleRuntimeState> {
        self.inner.runtime.get(id)
    }

    pub fn runtime_states(&self) -> HashMap<String, ScheduleRuntimeState> {
        self.inner.runtime.snapshot()
    }

    /// Run the polling loop until `shutdown` is cancelled.
    pub fn start(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        let this = self.clone();
        let period = self.inner.config.poll_interval();

        tokio::spawn(async move {
            info!("Scheduler started (interval={}ms)", period.as_millis());
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        let started = this.tick().await;
                        if !started.is_empty() {
                            debug!("Scheduler tick: {} schedules started", started.len());
                        }
                    }
                }
            }

            info!("Scheduler stopped");
        })
    }

    /// One scheduling cycle. Returns a handle per schedule started.
    pub async fn tick(&self) -> Vec<JoinHandle<ScheduleRunResult>> {
        let stored = match self.inner.store.read_all().await {
            Ok(stored) => stored,
            Err(e) => {
                warn!("Skipping scheduler tick, schedule store unavailable: {}", e);
                return Vec::new();
            }
        };

        let now = Utc::now();
        let mut started = Vec::new();
        for entry in &stored {
            let definition = &entry.definition;
            if self.inner.runtime.observe(definition, now) == TickDecision::Start {
                info!(schedule_id = %definition.id, "Schedule due, starting run");
                let this = self.clone();
                let definition = definition.clone();
                started.push(tokio::spawn(async move { this.execute_claimed(definition).await }));
            }
        }

        let live: HashSet<&str> = stored.iter().map(|s| s.definition.id.as_str()).collect();
        self.inner.runtime.prune(&live);
        started
    }

    /// Run a schedule now and wait for its result, bypassing the tick.
    pub async fn run_schedule(&self, id: &str) -> Result<ScheduleRunResult, SchedulerError> {
        let definition = self.load(id).await?;
        if !definition.enabled {
            return Err(SchedulerError::Disabled(id.to_string()));
        }
        if !self.inner.runtime.try_claim(id) {
            return Err(SchedulerError::AlreadyRunning(id.to_string()));
        }
        Ok(self.execute_claimed(definition).await)
    }

    /// Ask the next tick to run `id`.
    ///
    /// Returns `Ok(false)` when the schedule is disabled, running, already
    /// pending, or targets no sites. A schedule that fails preflight is
    /// reported as [`SchedulerError::Validation`].
    pub async fn trigger_run_now(&self, id: &str) -> Result<bool, SchedulerError> {
        let definition = self.load(id).await?;
        if !definition.enabled {
            debug!(schedule_id = %id, "Run-now ignored, schedule disabled");
            return Ok(false);
        }
        if self.inner.runtime.is_busy(id, Utc::now()) {
            debug!(schedule_id = %id, "Run-now ignored, schedule running or pending");
            return Ok(false);
        }

        let preflight = self.inner.validator.preflight(&definition).await;
        let errors = preflight.errors();
        if !errors.is_empty() {
            return Err(SchedulerError::Validation(errors));
        }
        let sites = self.resolve_sites(&definition).await?;
        let errors = self.inner.validator.complete(&definition, preflight, &sites).await;
        if !errors.is_empty() {
            return Err(SchedulerError::Validation(errors));
        }
        if sites.is_empty() {
            debug!(schedule_id = %id, "Run-now ignored, no sites resolved");
            return Ok(false);
        }

        let accepted = self.inner.runtime.request_run(id, Utc::now());
        if accepted {
            info!(schedule_id = %id, "Run-now accepted");
        }
        Ok(accepted)
    }

    /// Preflight problems for a stored schedule against its current sites.
    pub async fn validate(&self, id: &str) -> Result<Vec<String>, SchedulerError> {
        let definition = self.load(id).await?;
        let sites = self.resolve_sites(&definition).await?;
        Ok(self.inner.validator.validate(&definition, &sites).await)
    }

    async fn load(&self, id: &str) -> Result<ScheduleDefinition, SchedulerError> {
        self.inner
            .store
            .get(id)
            .await?
            .map(|stored| stored.definition)
            .ok_or_else(|| SchedulerError::ScheduleNotFound(id.to_string()))
    }

    async fn resolve_sites(&self, definition: &ScheduleDefinition) -> Result<Vec<String>, StoreError> {
        match definition.site_scope.mode {
            ScopeMode::All => self.inner.inventory.all_site_names().await,
            ScopeMode::Selected => Ok(definition.site_scope.selected_sites()),
        }
    }

    /// Execute a schedule whose runtime entry this caller has claimed,
    /// then release the claim. A panic in the run is recorded as an error
    /// result so the claim is never leaked.
    async fn execute_claimed(&self, definition: ScheduleDefinition) -> ScheduleRunResult {
        let id = definition.id.clone();
        let repeat = definition.repeat_interval_minutes;

        let this = self.clone();
        let result = match tokio::spawn(async move { this.execute(definition).await }).await {
            Ok(result) => result,
            Err(e) => {
                error!(schedule_id = %id, "Schedule run aborted: {}", e);
                ScheduleRunResult::Error {
                    message: format!("schedule run aborted: {}", e),
                }
            }
        };

        let state = self.inner.runtime.finish(&id, result.clone(), repeat, Utc::now());
        match result.error_code() {
            None => info!(
                schedule_id = %id,
                sites = result.sites().len(),
                next_run_at = ?state.next_run_at,
                "Schedule run finished"
            ),
            Some(code) => warn!(schedule_id = %id, code, "Schedule run did not start"),
        }
        result
    }

    async fn execute(&self, definition: ScheduleDefinition) -> ScheduleRunResult {
        let validator = &self.inner.validator;
        let preflight = validator.preflight(&definition).await;
        let details = preflight.errors();
        if !details.is_empty() {
            warn!(schedule_id = %definition.id, "Schedule failed validation: {}", details.join("; "));
            return ScheduleRunResult::InvalidSchedule { details };
        }

        let sites = match self.resolve_sites(&definition).await {
            Ok(sites) => sites,
            Err(e) => {
                return ScheduleRunResult::Error {
                    message: format!("failed to resolve sites: {}", e),
                };
            }
        };

        // Module rules may need the resolved sites.
        let details = validator.complete(&definition, preflight, &sites).await;
        if !details.is_empty() {
            warn!(schedule_id = %definition.id, "Schedule failed validation: {}", details.join("; "));
            return ScheduleRunResult::InvalidSchedule { details };
        }
        if sites.is_empty() {
            return ScheduleRunResult::NoSites;
        }

        info!(
            schedule_id = %definition.id,
            sites = sites.len(),
            steps = definition.steps.len(),
            mode = ?definition.site_run_mode,
            "Running schedule"
        );
        let results = match definition.site_run_mode {
            SiteRunMode::Sequential => self.run_sequential(&definition, &sites).await,
            SiteRunMode::Concurrent => self.run_concurrent(&definition, &sites).await,
        };
        ScheduleRunResult::Completed { sites: results }
    }

    async fn run_sequential(&self, definition: &ScheduleDefinition, sites: &[String]) -> Vec<SiteRunResult> {
        let mut results = Vec::with_capacity(sites.len());
        for site in sites {
            results.push(self.inner.pipeline.run_site(site, definition).await);
        }
        results
    }

    /// All site pipelines at once, capped by `max_concurrent_sites`.
    /// Results come back in site order.
    async fn run_concurrent(&self, definition: &ScheduleDefinition, sites: &[String]) -> Vec<SiteRunResult> {
        let limit = match self.inner.config.max_concurrent_sites {
            0 => sites.len(),
            cap => cap.min(sites.len()),
        };
        let runs: Vec<_> = sites
            .iter()
            .map(|site| self.inner.pipeline.run_site(site, definition))
            .collect();
        stream::iter(runs).buffered(limit.max(1))
            .collect()
            .await
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
