//! Status - スーパーバイザの状態と統計

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Point-in-time view of a [`Supervisor`](crate::app::Supervisor).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupervisorStatus {
    /// Detached units of work not yet reclaimed.
    pub tracked: usize,
    /// Of those, how many are still running.
    pub tracked_running: usize,
    pub launched: u64,
    pub observed: u64,
    pub reported_unobserved: u64,
    pub sweeps: u64,
}

/// Counters shared between the launcher, handles and sweeps.
#[derive(Debug, Default)]
pub(crate) struct Stats {
    launched: AtomicU64,
    observed: AtomicU64,
    reported_unobserved: AtomicU64,
    sweeps: AtomicU64,
}

impl Stats {
    pub(crate) fn record_launch(&self) {
        self.launched.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_observed(&self) {
        self.observed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_sweep(&self, reported: usize) {
        self.sweeps.fetch_add(1, Ordering::Relaxed);
        self.reported_unobserved
            .fetch_add(reported as u64, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, tracked: usize, tracked_running: usize) -> SupervisorStatus {
        SupervisorStatus {
            tracked,
            tracked_running,
            launched: self.launched.load(Ordering::Relaxed),
            observed: self.observed.load(Ordering::Relaxed),
            reported_unobserved: self.reported_unobserved.load(Ordering::Relaxed),
            sweeps: self.sweeps.load(Ordering::Relaxed),
        }
    }
}
