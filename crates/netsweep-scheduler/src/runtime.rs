//! In-memory runtime state per schedule id.
//!
//! All transitions go through one lock, so "is it running?" and "mark it
//! running" can never be split by another caller.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use netsweep_protocols::{
    ScheduleDefinition, ScheduleRunResult, ScheduleRuntimeState, ScheduleStatus,
};
use parking_lot::Mutex;

/// What the tick should do with a schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TickDecision {
    Skip,
    /// Claimed for execution; the caller must run it and call `finish`.
    Start,
}

#[derive(Debug, Default)]
pub struct RuntimeTable {
    states: Mutex<HashMap<String, ScheduleRuntimeState>>,
}

impl RuntimeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<ScheduleRuntimeState> {
        self.states.lock().get(id).cloned()
    }

    pub fn snapshot(&self) -> HashMap<String, ScheduleRuntimeState> {
        self.states.lock().clone()
    }

    /// Apply one tick's view of `definition` and claim it if due.
    pub(crate) fn observe(&self, definition: &ScheduleDefinition, now: DateTime<Utc>) -> TickDecision {
        let mut states = self.states.lock();
        let state = states.entry(definition.id.clone()).or_default();

        if !definition.enabled {
            if !state.running {
                state.status = ScheduleStatus::Disabled;
            }
            state.next_run_at = None;
            return TickDecision::Skip;
        }
        if state.status == ScheduleStatus::Disabled {
            state.status = ScheduleStatus::Idle;
        }
        if state.running {
            return TickDecision::Skip;
        }

        match state.next_run_at {
            Some(due) if now >= due => {
                state.running = true;
                state.status = ScheduleStatus::Running;
                state.next_run_at = None;
                TickDecision::Start
            }
            _ => TickDecision::Skip,
        }
    }

    /// Claim a schedule for an immediate run outside the tick.
    pub(crate) fn try_claim(&self, id: &str) -> bool {
        let mut states = self.states.lock();
        let state = states.entry(id.to_string()).or_default();
        if state.running {
            return false;
        }
        state.running = true;
        state.status = ScheduleStatus::Running;
        state.next_run_at = None;
        true
    }

    /// Ask the next tick to run `id`. Refused while it is running or a
    /// run is already pending.
    pub(crate) fn request_run(&self, id: &str, now: DateTime<Utc>) -> bool {
        let mut states = self.states.lock();
        let state = states.entry(id.to_string()).or_default();
        let pending = state.next_run_at.is_some_and(|due| due <= now);
        if state.running || pending {
            return false;
        }
        state.status = ScheduleStatus::Idle;
        state.next_run_at = Some(now);
        true
    }

    /// Whether `id` is running or has a run pending at `now`.
    pub(crate) fn is_busy(&self, id: &str, now: DateTime<Utc>) -> bool {
        self.states
            .lock()
            .get(id)
            .is_some_and(|s| s.running || s.next_run_at.is_some_and(|due| due <= now))
    }

    /// Record a finished execution and release the claim.
    ///
    /// A rejected (invalid) schedule is not rescheduled; anything else is
    /// rescheduled `repeat_minutes` after `now` when recurring.
    pub(crate) fn finish(
        &self,
        id: &str,
        result: ScheduleRunResult,
        repeat_minutes: u64,
        now: DateTime<Utc>,
    ) -> ScheduleRuntimeState {
        let mut states = self.states.lock();
        let state = states.entry(id.to_string()).or_default();

        let rejected = matches!(result, ScheduleRunResult::InvalidSchedule { .. });
        state.running = false;
        state.status = ScheduleStatus::Idle;
        state.next_run_at = if rejected || repeat_minutes == 0 {
            None
        } else {
            Some(now + ChronoDuration::minutes(repeat_minutes as i64))
        };
        if !rejected {
            state.last_run_at = Some(now);
        }
        state.last_result = Some(result);
        state.clone()
    }

    /// Drop state for schedules that no longer exist, except ones still
    /// running.
    pub(crate) fn prune(&self, live: &HashSet<&str>) {
        self.states
            .lock()
            .retain(|id, state| state.running || live.contains(id.as_str()));
    }
}
