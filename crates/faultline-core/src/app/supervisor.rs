//! Supervisor - detach されたタスクの追跡と回収
//!
//! # フロー
//! 1. TaskHandle が detach / drop されるとスロットが `tracked` に入る
//! 2. `sweep()`（回収パス）が終了済みのスロットを外す
//! 3. 未観測の障害を持っていたスロットは unobserved-failure handler に通知する
//!
//! `sweep()` は明示的に呼べるほか、SweepLoop が定期的に、shutdown 時に一度呼ぶ。

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::time::Instant;

use crate::app::config::SupervisorConfig;
use crate::app::context::FaultContext;
use crate::app::launcher::Launcher;
use crate::app::scope::{self, SupervisedScope};
use crate::app::status::{Stats, SupervisorStatus};
use crate::app::sweep_loop::SweepLoop;
use crate::domain::{FaultEvent, FaultKind, SupervisorError, TaskId, UnhandledFault};

const SETTLE_POLL: Duration = Duration::from_millis(5);

/// What a sweep found for one tracked slot.
pub(crate) enum Reclaim {
    Running,
    /// Finished without an unobserved fault. Carries the unclaimed return
    /// value, if any, so the sweep decides where it gets dropped.
    Clean(Option<Box<dyn Any + Send>>),
    Unobserved(FaultEvent),
}

/// Type-erased view of a task slot, as held by the supervisor.
pub(crate) trait Tracked: Send + Sync {
    fn task_id(&self) -> TaskId;
    fn is_finished(&self) -> bool;
    fn reclaim(&self) -> Reclaim;
}

/// Result of one reclamation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Finished slots dropped from tracking.
    pub reclaimed: usize,
    /// Of those, how many carried an unobserved fault.
    pub reported: usize,
    /// Slots left in place because their work is still running.
    pub still_running: usize,
}

struct Inner {
    context: FaultContext,
    config: SupervisorConfig,
    runtime: Handle,
    tracked: Mutex<Vec<Arc<dyn Tracked>>>,
    // sweep 同士を直列化して、検出順 = 通知順を保つ
    sweep_lock: Mutex<()>,
    stats: Stats,
    sweep_loop: Mutex<Option<SweepLoop>>,
}

/// Tracks detached work and routes unobserved faults to the context.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

impl Supervisor {
    /// Start a supervisor on the current tokio runtime.
    ///
    /// Spawns the periodic [`SweepLoop`] unless `config.sweep_interval` is 0.
    pub fn start(context: FaultContext, config: SupervisorConfig) -> Result<Self, SupervisorError> {
        let runtime = Handle::try_current().map_err(|_| SupervisorError::NoRuntime)?;
        let interval = config.sweep_interval();

        let supervisor = Self {
            inner: Arc::new(Inner {
                context,
                config,
                runtime,
                tracked: Mutex::new(Vec::new()),
                sweep_lock: Mutex::new(()),
                stats: Stats::default(),
                sweep_loop: Mutex::new(None),
            }),
        };

        if let Some(period) = interval {
            let weak: Weak<Inner> = Arc::downgrade(&supervisor.inner);
            let sweep_loop = SweepLoop::spawn(&supervisor.inner.runtime, period, move || {
                match weak.upgrade() {
                    Some(inner) => {
                        Supervisor { inner }.sweep();
                        true
                    }
                    None => false,
                }
            });
            *lock(&supervisor.inner.sweep_loop) = Some(sweep_loop);
        }

        tracing::info!(
            sweep_interval_ms = supervisor.inner.config.sweep_interval.as_millis() as u64,
            "supervisor started"
        );
        Ok(supervisor)
    }

    pub fn context(&self) -> &FaultContext {
        &self.inner.context
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.inner.config
    }

    pub fn launcher(&self) -> Launcher {
        Launcher::new(self.clone())
    }

    pub(crate) fn runtime(&self) -> &Handle {
        &self.inner.runtime
    }

    pub(crate) fn stats(&self) -> &Stats {
        &self.inner.stats
    }

    pub(crate) fn track(&self, slot: Arc<dyn Tracked>) {
        lock(&self.inner.tracked).push(slot);
    }

    /// Reclamation pass.
    ///
    /// Finished detached work is dropped from tracking; each unobserved fault
    /// is delivered to the unobserved-failure handlers exactly once, in the
    /// order the work was detached. Running work is left alone.
    ///
    /// Handlers run on the calling thread and must not call `sweep()`.
    pub fn sweep(&self) -> SweepReport {
        let _serial = lock(&self.inner.sweep_lock);
        let mut report = SweepReport::default();
        let mut unobserved = Vec::new();

        // reclaim はロックの外で行う（回収された値の Drop が track() を呼びうる）
        let candidates = std::mem::take(&mut *lock(&self.inner.tracked));
        let mut running = Vec::new();
        let mut leftovers = Vec::new();
        for slot in candidates {
            match slot.reclaim() {
                Reclaim::Running => running.push(slot),
                Reclaim::Clean(value) => {
                    report.reclaimed += 1;
                    leftovers.extend(value.map(|value| (slot.task_id(), value)));
                }
                Reclaim::Unobserved(event) => {
                    report.reclaimed += 1;
                    unobserved.push(event);
                }
            }
        }
        report.still_running = running.len();
        {
            let mut tracked = lock(&self.inner.tracked);
            // sweep 中に detach されたものは後ろに残す
            running.append(&mut tracked);
            *tracked = running;
        }

        for event in &unobserved {
            tracing::warn!(
                task_id = ?event.task_id(),
                fault_id = %event.id,
                message = event.message(),
                "unobserved task fault"
            );
            self.inner
                .context
                .dispatch(FaultKind::UnobservedFailure, event);
        }

        // 通知が終わってから値を捨てる
        for (task_id, value) in leftovers {
            drop_leftover(task_id, value);
        }

        report.reported = unobserved.len();
        self.inner.stats.record_sweep(report.reported);
        tracing::debug!(
            reclaimed = report.reclaimed,
            reported = report.reported,
            still_running = report.still_running,
            "sweep finished"
        );
        report
    }

    /// Wait until every tracked unit of work has finished, or `timeout`
    /// elapses. Returns whether everything finished.
    pub async fn settle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.running_tracked() == 0 {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(SETTLE_POLL).await;
        }
    }

    fn running_tracked(&self) -> usize {
        // sweep 中は tracked が一時的に空になるので、終わるまで待つ
        let _serial = lock(&self.inner.sweep_lock);
        lock(&self.inner.tracked)
            .iter()
            .filter(|slot| !slot.is_finished())
            .count()
    }

    pub fn status(&self) -> SupervisorStatus {
        let (tracked, running) = {
            let tracked = lock(&self.inner.tracked);
            let running = tracked.iter().filter(|slot| !slot.is_finished()).count();
            (tracked.len(), running)
        };
        self.inner.stats.snapshot(tracked, running)
    }

    /// Stop the sweep loop and, if configured, run one last sweep after
    /// giving running detached work up to `shutdown_grace` to finish.
    pub async fn shutdown(&self) -> Option<SweepReport> {
        let sweep_loop = lock(&self.inner.sweep_loop).take();
        if let Some(sweep_loop) = sweep_loop {
            sweep_loop.shutdown_and_join().await;
        }

        if !self.inner.config.sweep_on_shutdown {
            tracing::info!("supervisor stopped without final sweep");
            return None;
        }

        let grace = self.inner.config.shutdown_grace;
        if !grace.is_zero() && !self.settle(grace).await {
            let still_running: Vec<String> = lock(&self.inner.tracked)
                .iter()
                .filter(|slot| !slot.is_finished())
                .map(|slot| slot.task_id().to_string())
                .collect();
            tracing::warn!(?grace, ?still_running, "detached work still running at shutdown");
        }

        let report = self.sweep();
        tracing::info!(reported = report.reported, "supervisor stopped");
        Some(report)
    }
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("config", &self.inner.config)
            .field("status", &self.status())
            .finish()
    }
}

/// Drop an unclaimed return value. A panicking `Drop` is logged and does not
/// abort the sweep.
fn drop_leftover(task_id: TaskId, value: Box<dyn Any + Send>) {
    let _scope = SupervisedScope::enter();
    if let Err(payload) = catch_unwind(AssertUnwindSafe(move || drop(value))) {
        let _ = scope::take_panic_trace();
        tracing::error!(
            %task_id,
            panic = %UnhandledFault::message_from_panic(payload.as_ref()),
            "dropping a reclaimed task value panicked"
        );
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
