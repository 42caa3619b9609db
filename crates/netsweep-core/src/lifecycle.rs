//! Engine lifecycle state.

use std::sync::atomic::{AtomicU8, Ordering};

/// Where an engine is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EngineState {
    /// Built, background loops not started.
    Created = 0,
    /// Reaper and scheduler loops running.
    Running = 1,
    ShuttingDown = 2,
    Stopped = 3,
}

impl From<u8> for EngineState {
    fn from(v: u8) -> Self {
        match v {
            1 => EngineState::Running,
            2 => EngineState::ShuttingDown,
            3 => EngineState::Stopped,
            _ => EngineState::Created,
        }
    }
}

/// Atomic holder for [`EngineState`] with compare-and-set transitions.
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(EngineState::Created as u8))
    }

    pub(crate) fn get(&self) -> EngineState {
        EngineState::from(self.0.load(Ordering::SeqCst))
    }

    /// Move `from` -> `to`; on failure returns the actual state.
    pub(crate) fn transition(&self, from: EngineState, to: EngineState) -> Result<(), EngineState> {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(EngineState::from)
    }

    pub(crate) fn set(&self, state: EngineState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }
}
