//! Ordered execution of a schedule's steps against one site.

use std::sync::Arc;
use std::time::Duration;

use netsweep_protocols::{
    CredentialStore, JobStatus, ScheduleDefinition, ScheduleStep, SiteRunResult, StepOutcome,
};
use netsweep_runner::JobRunner;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::params::effective_parameters;

/// Runs every step of a schedule for one site, in order.
///
/// A failed, timed-out or unlaunchable step never stops the steps after
/// it; callers read the per-step outcomes.
#[derive(Clone)]
pub struct PipelineExecutor {
    runner: JobRunner,
    credentials: Arc<dyn CredentialStore>,
}

impl PipelineExecutor {
    pub fn new(runner: JobRunner, credentials: Arc<dyn CredentialStore>) -> Self {
        Self {
            runner,
            credentials,
        }
    }

    pub async fn run_site(&self, site: &str, schedule: &ScheduleDefinition) -> SiteRunResult {
        let delay = Duration::from_secs(schedule.inter_step_delay_seconds);
        let mut steps = Vec::with_capacity(schedule.steps.len());

        for (index, step) in schedule.steps.iter().enumerate() {
            if index > 0 && !delay.is_zero() {
                debug!(schedule_id = %schedule.id, site = %site, "Waiting {}s before next step", delay.as_secs());
                tokio::time::sleep(delay).await;
            }

            let outcome = self.run_step(site, &schedule.id, step).await;
            match outcome.status {
                JobStatus::Completed => info!(
                    schedule_id = %schedule.id,
                    site = %site,
                    module_id = %outcome.module_id,
                    "Step completed"
                ),
                status => warn!(
                    schedule_id = %schedule.id,
                    site = %site,
                    module_id = %outcome.module_id,
                    status = %status,
                    "Step did not complete"
                ),
            }
            steps.push(outcome);
        }

        SiteRunResult {
            site: site.to_string(),
            steps,
        }
    }

    async fn run_step(
        &self,
        site: &str,
        schedule_id: &str,
        step: &ScheduleStep,
    ) -> StepOutcome {
        let parameters = match effective_parameters(step, self.credentials.as_ref()).await {
            Ok(parameters) => parameters,
            Err(e) => return StepOutcome::engine_error(&step.module_id, e.to_string()),
        };

        let mut config = Map::new();
        config.insert("site_name".to_string(), Value::String(site.to_string()));
        config.insert("parameters".to_string(), Value::Object(parameters));
        config.insert("schedule_id".to_string(), Value::String(schedule_id.to_string()));

        let handle = match self.runner.submit_watched(&step.module_id, config).await {
            Ok(handle) => handle,
            Err(e) => return StepOutcome::engine_error(&step.module_id, e.to_string()),
        };

        let job_id = handle.id().to_string();
        let record = handle.wait().await;
        StepOutcome {
            module_id: step.module_id.clone(),
            status: record.status,
            job_id: Some(job_id),
            error: record.error,
        }
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
