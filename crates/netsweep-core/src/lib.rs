//! # netsweep Core
//!
//! The [`Engine`] context object. One engine owns one job runner, one
//! scheduler and the stores behind them; nothing is global, so tests and
//! embedders can build as many as they like.
//!
//! - [`EngineBuilder`] - wires collaborators from a [`Config`](netsweep_config::Config)
//! - [`Engine`] - the job and schedule surface
//! - [`ScheduleView`] - a stored schedule merged with its runtime state

pub mod engine;
pub mod error;
pub mod lifecycle;

pub use engine::{Engine, EngineBuilder, ScheduleView};
pub use error::EngineError;
pub use lifecycle::EngineState;
