//! # netsweep Store
//!
//! Concrete collaborators for the engine:
//!
//! - [`FsModuleCatalog`] - modules discovered from `modules/<id>/module.json`
//! - [`JsonInventory`] - sites from the `database.json` inventory
//! - [`JsonCredentialStore`] - profiles from `credentials.json`
//! - [`JsonScheduleStore`] - versioned schedules in `schedules.json`
//!
//! Each has an in-memory counterpart in [`memory`] for tests.

mod catalog;
mod credentials;
mod inventory;
mod lock;
pub mod memory;
mod schedules;

pub use catalog::FsModuleCatalog;
pub use credentials::{CredentialFile, JsonCredentialStore};
pub use inventory::JsonInventory;
pub use lock::FileLock;
pub use memory::{MemoryCatalog, MemoryCredentialStore, MemoryInventory, MemoryScheduleStore};
pub use schedules::JsonScheduleStore;
