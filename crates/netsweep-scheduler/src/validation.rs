//! Schedule preflight checks.

use std::sync::Arc;

use async_trait::async_trait;
use netsweep_protocols::{
    CredentialStore, ModuleCatalog, ScheduleDefinition, ScheduleStep, SiteInventory,
};
use serde_json::{Map, Value};

use crate::error::SchedulerError;
use crate::params::{effective_parameters, is_blank};

/// Inputs the engine injects itself; never required from the step.
const INJECTED_INPUTS: &[&str] = &["site_name"];

/// What a module-specific rule gets to look at.
pub struct RuleContext<'a> {
    /// 1-based step position, for messages.
    pub step_number: usize,
    pub step: &'a ScheduleStep,
    /// Parameters after credential substitution.
    pub parameters: &'a Map<String, Value>,
    /// Sites the schedule targets.
    pub sites: &'a [String],
    pub inventory: &'a dyn SiteInventory,
}

/// Extra precondition for one module, beyond its required inputs.
#[async_trait]
pub trait ValidationRule: Send + Sync {
    /// Module this rule applies to.
    fn module_id(&self) -> &str;

    /// Human-readable problems; empty when the step may run.
    async fn check(&self, ctx: &RuleContext<'_>) -> Vec<String>;
}

/// MikroTik MAC discovery needs a router: an explicit `router_ip` or
/// `router_device_id`, or a gateway recorded for every targeted site.
pub struct RouterReferenceRule;

impl RouterReferenceRule {
    pub const MODULE_ID: &'static str = "mikrotik_mac_discovery";
}

#[async_trait]
impl ValidationRule for RouterReferenceRule {
    fn module_id(&self) -> &str {
        Self::MODULE_ID
    }

    async fn check(&self, ctx: &RuleContext<'_>) -> Vec<String> {
        let explicit = ["router_ip", "router_device_id"]
            .iter()
            .any(|key| !is_blank(ctx.parameters.get(*key)));
        if explicit {
            return Vec::new();
        }

        let prefix = format!("step {} ({})", ctx.step_number, ctx.step.module_id);
        if ctx.sites.is_empty() {
            return vec![format!("{}: router_ip or router_device_id is required", prefix)];
        }

        let mut errors = Vec::new();
        for site in ctx.sites {
            match ctx.inventory.gateway(site).await {
                Ok(Some(_)) => {}
                Ok(None) => errors.push(format!(
                    "{}: site '{}' has no gateway; set router_ip or router_device_id",
                    prefix, site
                )),
                Err(e) => errors.push(format!("{}: inventory unavailable: {}", prefix, e)),
            }
        }
        errors
    }
}

/// Site-independent preflight of one step. Rules run only on steps that
/// reached a resolved module and parameter set.
struct StepCheck {
    errors: Vec<String>,
    parameters: Option<Map<String, Value>>,
}

/// Result of the checks that need no site list.
pub struct Preflight {
    no_steps: bool,
    steps: Vec<StepCheck>,
}

impl Preflight {
    /// Problems found so far, in step order.
    pub fn errors(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.no_steps {
            errors.push("schedule has no steps".to_string());
        }
        for step in &self.steps {
            errors.extend(step.errors.iter().cloned());
        }
        errors
    }
}

/// Checks that a schedule's steps can run.
pub struct Validator {
    catalog: Arc<dyn ModuleCatalog>,
    credentials: Arc<dyn CredentialStore>,
    inventory: Arc<dyn SiteInventory>,
    rules: Vec<Arc<dyn ValidationRule>>,
}

impl Validator {
    /// Validator with the built-in rules registered.
    pub fn new(
        catalog: Arc<dyn ModuleCatalog>,
        credentials: Arc<dyn CredentialStore>,
        inventory: Arc<dyn SiteInventory>,
    ) -> Self {
        Self {
            catalog,
            credentials,
            inventory,
            rules: vec![Arc::new(RouterReferenceRule)],
        }
    }

    /// Register an additional module rule.
    pub fn with_rule(mut self, rule: Arc<dyn ValidationRule>) -> Self {
        self.rules.push(rule);
        self
    }

    /// Problems that prevent `schedule` from running against `sites`.
    /// Empty means it may run.
    pub async fn validate(&self, schedule: &ScheduleDefinition, sites: &[String]) -> Vec<String> {
        let preflight = self.preflight(schedule).await;
        self.complete(schedule, preflight, sites).await
    }

    /// Module, credential and required-input checks. None of them depend on
    /// which sites the schedule targets.
    pub async fn preflight(&self, schedule: &ScheduleDefinition) -> Preflight {
        let mut steps = Vec::with_capacity(schedule.steps.len());
        for (index, step) in schedule.steps.iter().enumerate() {
            steps.push(self.check_step(index + 1, step).await);
        }
        Preflight {
            no_steps: schedule.steps.is_empty(),
            steps,
        }
    }

    /// Add module rule findings for `sites` to a preflight and return every
    /// problem in step order.
    pub async fn complete(
        &self,
        schedule: &ScheduleDefinition,
        preflight: Preflight,
        sites: &[String],
    ) -> Vec<String> {
        let mut errors = Vec::new();
        if preflight.no_steps {
            errors.push("schedule has no steps".to_string());
        }

        for ((index, step), check) in schedule.steps.iter().enumerate().zip(preflight.steps) {
            errors.extend(check.errors);
            let Some(parameters) = check.parameters else {
                continue;
            };
            let ctx = RuleContext {
                step_number: index + 1,
                step,
                parameters: &parameters,
                sites,
                inventory: self.inventory.as_ref(),
            };
            for rule in self.rules.iter().filter(|r| r.module_id() == step.module_id) {
                errors.extend(rule.check(&ctx).await);
            }
        }
        errors
    }

    async fn check_step(&self, number: usize, step: &ScheduleStep) -> StepCheck {
        let failed = |message: String| StepCheck {
            errors: vec![message],
            parameters: None,
        };

        // The id is looked up exactly as the pipeline will submit it.
        let module_id = step.module_id.as_str();
        if module_id.trim().is_empty() {
            return failed(format!("step {}: module id is required", number));
        }
        if module_id.trim() != module_id {
            return failed(format!(
                "step {}: module id '{}' has surrounding whitespace",
                number, module_id
            ));
        }

        let module = match self.catalog.get(module_id).await {
            Ok(Some(module)) => module,
            Ok(None) => return failed(format!("step {}: module '{}' not found", number, module_id)),
            Err(e) => return failed(format!("step {}: module catalog unavailable: {}", number, e)),
        };

        let prefix = format!("step {} ({})", number, module_id);
        let parameters = match effective_parameters(step, self.credentials.as_ref()).await {
            Ok(parameters) => parameters,
            Err(SchedulerError::ProfileNotFound { profile, .. }) => {
                return failed(format!("{}: credential profile '{}' not found", prefix, profile));
            }
            Err(e) => return failed(format!("{}: {}", prefix, e)),
        };

        let errors = module
            .required_inputs()
            .filter(|input| !INJECTED_INPUTS.contains(&input.name.as_str()))
            .filter(|input| is_blank(parameters.get(&input.name)))
            .map(|input| {
                let label = input.label.as_deref().unwrap_or(&input.name);
                format!("{}: missing required input '{}'", prefix, label)
            })
            .collect();

        StepCheck {
            errors,
            parameters: Some(parameters),
        }
    }
}

#[cfg(test)]
#[path = "validation_tests.rs"]
mod tests;
