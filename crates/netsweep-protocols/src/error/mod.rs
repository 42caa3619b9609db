//! Error types for the netsweep protocol layer.

mod catalog;
mod sandbox;
mod store;

pub use catalog::*;
pub use sandbox::*;
pub use store::*;
