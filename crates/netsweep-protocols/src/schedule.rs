//! Schedule definitions and their in-memory runtime state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::job::JobStatus;
use crate::mask::{mask_in_place, mask_text};

/// How the target sites of a schedule are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeMode {
    /// Every site known to the inventory at run time.
    All,
    /// The literal site list.
    #[default]
    Selected,
}

/// Target sites of a schedule.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SiteScope {
    #[serde(default)]
    pub mode: ScopeMode,

    #[serde(default)]
    pub sites: Vec<String>,
}

impl SiteScope {
    pub fn all() -> Self {
        Self {
            mode: ScopeMode::All,
            sites: Vec::new(),
        }
    }

    pub fn selected<I, S>(sites: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            mode: ScopeMode::Selected,
            sites: sites.into_iter().map(Into::into).collect(),
        }
    }

    /// The literal site list with blank entries removed.
    pub fn selected_sites(&self) -> Vec<String> {
        self.sites
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Whether a schedule's site pipelines run one after another or together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SiteRunMode {
    #[default]
    Sequential,
    Concurrent,
}

/// One module invocation within a schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleStep {
    pub module_id: String,

    #[serde(default)]
    pub parameters: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_profile: Option<String>,
}

impl ScheduleStep {
    pub fn new(module_id: impl Into<String>) -> Self {
        Self {
            module_id: module_id.into(),
            parameters: Map::new(),
            credential_profile: None,
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn with_credential_profile(mut self, profile: impl Into<String>) -> Self {
        self.credential_profile = Some(profile.into());
        self
    }
}

fn default_enabled() -> bool {
    true
}

/// A persisted schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleDefinition {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub site_scope: SiteScope,

    #[serde(default)]
    pub site_run_mode: SiteRunMode,

    #[serde(default)]
    pub inter_step_delay_seconds: u64,

    /// Minutes between runs; 0 runs once per trigger.
    #[serde(default)]
    pub repeat_interval_minutes: u64,

    #[serde(default)]
    pub steps: Vec<ScheduleStep>,
}

impl ScheduleDefinition {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            enabled: true,
            site_scope: SiteScope::default(),
            site_run_mode: SiteRunMode::default(),
            inter_step_delay_seconds: 0,
            repeat_interval_minutes: 0,
            steps: Vec::new(),
        }
    }

    pub fn with_scope(mut self, scope: SiteScope) -> Self {
        self.site_scope = scope;
        self
    }

    pub fn with_run_mode(mut self, mode: SiteRunMode) -> Self {
        self.site_run_mode = mode;
        self
    }

    pub fn with_step(mut self, step: ScheduleStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn with_repeat_minutes(mut self, minutes: u64) -> Self {
        self.repeat_interval_minutes = minutes;
        self
    }

    pub fn with_step_delay(mut self, seconds: u64) -> Self {
        self.inter_step_delay_seconds = seconds;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Copy with literal credentials in step parameters masked.
    pub fn masked(&self) -> Self {
        let mut copy = self.clone();
        for step in &mut copy.steps {
            let mut params = Value::Object(std::mem::take(&mut step.parameters));
            mask_in_place(&mut params);
            if let Value::Object(map) = params {
                step.parameters = map;
            }
        }
        copy
    }
}

/// Scheduler-visible state of a schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleStatus {
    #[default]
    Idle,
    Running,
    Disabled,
}

/// Terminal outcome of one step in one site's pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub module_id: String,
    pub status: JobStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepOutcome {
    /// Outcome for a step that never produced a job.
    pub fn engine_error(module_id: impl Into<String>, message: impl AsRef<str>) -> Self {
        Self {
            module_id: module_id.into(),
            status: JobStatus::Error,
            job_id: None,
            error: Some(mask_text(message.as_ref())),
        }
    }
}

/// Per-site list of step outcomes, in step order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteRunResult {
    pub site: String,
    pub steps: Vec<StepOutcome>,
}

impl SiteRunResult {
    pub fn all_completed(&self) -> bool {
        self.steps.iter().all(|s| s.status == JobStatus::Completed)
    }
}

/// Recorded result of the last schedule run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ScheduleRunResult {
    /// Preflight failed; no module was invoked.
    InvalidSchedule { details: Vec<String> },
    /// The site scope resolved to nothing.
    NoSites,
    /// The site scope could not be resolved.
    Error { message: String },
    /// Every targeted site's pipeline ran.
    Completed { sites: Vec<SiteRunResult> },
}

impl ScheduleRunResult {
    /// Short error code, `None` when the run went ahead.
    pub fn error_code(&self) -> Option<&'static str> {
        match self {
            ScheduleRunResult::InvalidSchedule { .. } => Some("invalid_schedule"),
            ScheduleRunResult::NoSites => Some("no_sites"),
            ScheduleRunResult::Error { .. } => Some("error"),
            ScheduleRunResult::Completed { .. } => None,
        }
    }

    pub fn sites(&self) -> &[SiteRunResult] {
        match self {
            ScheduleRunResult::Completed { sites } => sites,
            _ => &[],
        }
    }
}

/// In-memory runtime state of a schedule, keyed by schedule id.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScheduleRuntimeState {
    pub status: ScheduleStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_run_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_result: Option<ScheduleRunResult>,

    /// Set while an execution owns this schedule.
    pub running: bool,
}

#[cfg(test)]
#[path = "schedule_tests.rs"]
mod tests;
