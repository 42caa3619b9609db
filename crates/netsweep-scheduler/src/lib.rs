//! # netsweep Scheduler
//!
//! Drives recurring, site-scoped pipelines of module jobs.
//!
//! - [`Validator`] - preflight checks with pluggable per-module rules
//! - [`PipelineExecutor`] - runs a schedule's steps against one site
//! - [`Scheduler`] - polling tick, per-schedule state machine, run-now

mod error;
mod params;
mod pipeline;
mod runtime;
mod scheduler;
mod validation;

#[cfg(test)]
mod test_support;

pub use error::SchedulerError;
pub use params::{PROFILE_KEY, effective_parameters};
pub use pipeline::PipelineExecutor;
pub use runtime::RuntimeTable;
pub use scheduler::Scheduler;
pub use validation::{Preflight, RouterReferenceRule, RuleContext, ValidationRule, Validator};
