//! Deferred cleanup of finished jobs.
//!
//! A single loop drains a min-heap of deadlines instead of one timer per
//! job.

use std::cmp::{Ordering as CmpOrdering, Reverse};
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Cleanup work scheduled for later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReapTask {
    /// Drop a finished job record from the job table.
    EvictJob { job_id: String },
    /// Delete a job's log file.
    DeleteLog { job_id: String },
}

#[derive(Debug)]
struct Pending {
    due: Instant,
    seq: u64,
    task: ReapTask,
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        (self.due, self.seq).cmp(&(other.due, other.seq))
    }
}

/// Min-heap of cleanup deadlines.
#[derive(Debug, Default)]
pub struct Reaper {
    queue: Mutex<BinaryHeap<Reverse<Pending>>>,
    seq: AtomicU64,
    wake: Notify,
}

impl Reaper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` once `delay` has elapsed.
    pub fn schedule(&self, delay: Duration, task: ReapTask) {
        let pending = Pending {
            due: Instant::now() + delay,
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
            task,
        };
        self.queue.lock().push(Reverse(pending));
        self.wake.notify_one();
    }

    /// Number of tasks not yet run.
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Remove and return every task due at `now`, earliest first.
    pub fn drain_due(&self, now: Instant) -> Vec<ReapTask> {
        let mut queue = self.queue.lock();
        let mut due = Vec::new();
        while queue.peek().is_some_and(|Reverse(p)| p.due <= now) {
            if let Some(Reverse(p)) = queue.pop() {
                due.push(p.task);
            }
        }
        due
    }

    fn next_due(&self) -> Option<Instant> {
        self.queue.lock().peek().map(|Reverse(p)| p.due)
    }

    /// Process tasks as they come due until `shutdown` fires.
    pub async fn run<F>(&self, shutdown: CancellationToken, mut handle: F)
    where
        F: FnMut(ReapTask),
    {
        debug!("Reaper started");
        loop {
            for task in self.drain_due(Instant::now()) {
                handle(task);
            }

            // Far-future fallback when idle; `schedule` wakes us earlier.
            let deadline = self
                .next_due()
                .unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = self.wake.notified() => {}
                _ = sleep_until(deadline) => {}
            }
        }
        debug!("Reaper stopped");
    }
}
