//! # netsweep Protocols
//!
//! Data model and collaborator traits for the netsweep job engine.
//! Contains only interface definitions and plain data - no I/O.
//!
//! ## Core Traits
//!
//! - [`ModuleCatalog`] - Registered modules and their entrypoints
//! - [`CredentialStore`] - Named username/password profiles
//! - [`SiteInventory`] - Known sites and their gateways
//! - [`ScheduleStore`] - Versioned schedule persistence
//! - [`ProcessSandbox`] - Isolated worker process execution

pub mod credentials;
pub mod error;
pub mod inventory;
pub mod job;
pub mod mask;
pub mod module;
pub mod sandbox;
pub mod schedule;
pub mod store;

pub use credentials::{CredentialStore, Credentials};
pub use error::{CatalogError, SandboxError, StoreError};
pub use inventory::SiteInventory;
pub use job::{JobRecord, JobStatus};
pub use module::{ModuleCatalog, ModuleDescriptor, ModuleInput};
pub use sandbox::{ProcessSandbox, SpawnOutcome, SpawnRequest};
pub use schedule::{
    ScheduleDefinition, ScheduleRunResult, ScheduleRuntimeState, ScheduleStatus, ScheduleStep,
    ScopeMode, SiteRunMode, SiteRunResult, SiteScope, StepOutcome,
};
pub use store::{ExpectedVersion, ScheduleStore, StoredSchedule};
