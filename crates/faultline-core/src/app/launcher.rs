//! Launcher - fire-and-forget でタスクを起動する
//!
//! # フロー
//! 1. `launch*()` が TaskId とスロットを作り、tokio に spawn する
//! 2. work の結果（値 / panic / Err）はスロットに書かれる。呼び出し元には伝播しない
//! 3. 呼び出し元は `TaskHandle` を join するか、detach（または drop）する
//! 4. detach されたスロットは Supervisor が sweep で回収し、未観測の障害を通知する

use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::convert::Infallible;
use std::fmt::Display;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use futures::FutureExt;
use tokio::sync::Notify;

use crate::app::context::FaultContext;
use crate::app::scope::{self, SupervisedScope};
use crate::app::supervisor::{Reclaim, Supervisor, Tracked};
use crate::domain::{FaultEvent, FaultOrigin, TaskId, TaskState, UnhandledFault};

/// Starts units of work on the supervisor's runtime.
///
/// # 使用例
/// ```ignore
/// let launcher = supervisor.launcher();
/// launcher.fire_and_forget(async { panic!("Hello World!") });
///
/// let handle = launcher.launch(async { 40 + 2 });
/// assert_eq!(handle.join().await.unwrap(), 42);
/// ```
#[derive(Clone)]
pub struct Launcher {
    supervisor: Supervisor,
}

impl Launcher {
    pub(crate) fn new(supervisor: Supervisor) -> Self {
        Self { supervisor }
    }

    /// Run `work` on the runtime. A panic inside `work` becomes the fault.
    pub fn launch<F>(&self, work: F) -> TaskHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.spawn(async move { Ok::<_, Infallible>(work.await) })
    }

    /// Like [`launch`](Self::launch), but an `Err(e)` is a fault too; its
    /// message is `e.to_string()`.
    pub fn launch_fallible<F, T, E>(&self, work: F) -> TaskHandle<T>
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Display + Send + 'static,
    {
        self.spawn(work)
    }

    /// Run synchronous `work` on the blocking pool.
    pub fn launch_blocking<W, T>(&self, work: W) -> TaskHandle<T>
    where
        W: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (completion, handle) = self.prepare();

        self.supervisor.runtime().spawn_blocking(move || {
            let result = {
                let _scope = SupervisedScope::enter();
                catch_unwind(AssertUnwindSafe(work))
            };
            let outcome = result.map_err(panic_fault);
            completion.finish(outcome);
        });

        handle
    }

    /// Launch and immediately detach. The returned id is for log correlation
    /// only; there is no way to join the work afterwards.
    pub fn fire_and_forget<F>(&self, work: F) -> TaskId
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = self.launch(work);
        let task_id = handle.id();
        handle.detach();
        task_id
    }

    fn spawn<F, T, E>(&self, work: F) -> TaskHandle<T>
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Display + Send + 'static,
    {
        let (completion, handle) = self.prepare();

        self.supervisor.runtime().spawn(async move {
            let result = AssertUnwindSafe(Supervised::new(work)).catch_unwind().await;
            let outcome = match result {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(err)) => Err(UnhandledFault::new(err.to_string(), capture_backtrace())),
                Err(payload) => Err(panic_fault(payload)),
            };
            completion.finish(outcome);
        });

        handle
    }

    fn prepare<T: Send + 'static>(&self) -> (Completion<T>, TaskHandle<T>) {
        let task_id = self.supervisor.context().ids().generate_task_id();
        let slot = Arc::new(Slot::new(task_id));
        self.supervisor.stats().record_launch();
        tracing::debug!(%task_id, "launched");

        let completion = Completion {
            slot: Arc::clone(&slot),
            context: self.supervisor.context().clone(),
            finished: false,
        };
        let handle = TaskHandle {
            task_id,
            slot,
            supervisor: self.supervisor.clone(),
            consumed: false,
        };
        (completion, handle)
    }
}

fn panic_fault(payload: Box<dyn Any + Send>) -> UnhandledFault {
    let message = UnhandledFault::message_from_panic(payload.as_ref());
    // hook が入っていれば panic 地点の trace が残っている
    let trace = scope::take_panic_trace().unwrap_or_else(capture_backtrace);
    UnhandledFault::new(message, trace)
}

fn capture_backtrace() -> String {
    let backtrace = Backtrace::capture();
    match backtrace.status() {
        BacktraceStatus::Captured => backtrace.to_string(),
        _ => String::new(),
    }
}

/// Marks every poll of the wrapped future as supervised, so the panic hook
/// leaves its panics to `catch_unwind`.
struct Supervised<F> {
    inner: Pin<Box<F>>,
}

impl<F> Supervised<F> {
    fn new(inner: F) -> Self {
        Self {
            inner: Box::pin(inner),
        }
    }
}

impl<F: Future> Future for Supervised<F> {
    type Output = F::Output;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let _scope = SupervisedScope::enter();
        self.inner.as_mut().poll(cx)
    }
}

/// Writes the outcome into the slot exactly once. If the spawned work is
/// dropped before it ran to completion (runtime shutdown), the slot is
/// completed with a fault so joiners never hang.
struct Completion<T: Send + 'static> {
    slot: Arc<Slot<T>>,
    context: FaultContext,
    finished: bool,
}

impl<T: Send + 'static> Completion<T> {
    fn finish(mut self, outcome: Result<T, UnhandledFault>) {
        self.finished = true;
        let outcome = outcome.map_err(|fault| {
            self.context
                .fault_event(FaultOrigin::Task(self.slot.task_id), fault)
        });
        self.slot.finish(outcome);
    }
}

impl<T: Send + 'static> Drop for Completion<T> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let event = self.context.fault_event(
            FaultOrigin::Task(self.slot.task_id),
            UnhandledFault::new("task was dropped before completion", ""),
        );
        self.slot.finish(Err(event));
    }
}

struct SlotInner<T> {
    state: TaskState,
    outcome: Option<Result<T, FaultEvent>>,
}

/// Completion-tracking state shared by the running work, its handle and
/// (after detach) the supervisor.
pub(crate) struct Slot<T> {
    task_id: TaskId,
    inner: Mutex<SlotInner<T>>,
    done: Notify,
}

impl<T> Slot<T> {
    fn new(task_id: TaskId) -> Self {
        Self {
            task_id,
            inner: Mutex::new(SlotInner {
                state: TaskState::Running,
                outcome: None,
            }),
            done: Notify::new(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SlotInner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn finish(&self, outcome: Result<T, FaultEvent>) {
        {
            let mut inner = self.lock();
            inner.state = match outcome {
                Ok(_) => TaskState::Succeeded,
                Err(_) => TaskState::Faulted,
            };
            inner.outcome = Some(outcome);
        }
        self.done.notify_waiters();
    }

    fn state(&self) -> TaskState {
        self.lock().state
    }

    /// Hand the outcome to the owner of the handle. `None` while running.
    fn take_observed(&self) -> Option<Result<T, FaultEvent>> {
        let mut inner = self.lock();
        if inner.state == TaskState::Running {
            return None;
        }
        match inner.outcome.take()? {
            Ok(value) => Some(Ok(value)),
            Err(event) => {
                inner.state = TaskState::Observed;
                Some(Err(event.mark_observed()))
            }
        }
    }
}

impl<T: Send + 'static> Tracked for Slot<T> {
    fn task_id(&self) -> TaskId {
        self.task_id
    }

    fn is_finished(&self) -> bool {
        self.state().is_finished()
    }

    fn reclaim(&self) -> Reclaim {
        let mut inner = self.lock();
        match inner.state {
            TaskState::Running => Reclaim::Running,
            TaskState::Faulted => match inner.outcome.take() {
                Some(Err(event)) => {
                    inner.state = TaskState::ReportedUnobserved;
                    Reclaim::Unobserved(event)
                }
                _ => Reclaim::Clean(None),
            },
            // 値の drop は supervisor 側で（Drop が panic しても sweep を壊さない）
            _ => match inner.outcome.take() {
                Some(Ok(value)) => Reclaim::Clean(Some(Box::new(value) as Box<dyn Any + Send>)),
                _ => Reclaim::Clean(None),
            },
        }
    }
}

/// Handle to a launched unit of work.
///
/// Joining it observes the outcome. Dropping it without joining is the same
/// as [`detach`](Self::detach): the supervisor takes over and reports the
/// fault, if any, at the next sweep.
#[must_use = "dropping a TaskHandle detaches the task; call `detach()` to make that explicit"]
pub struct TaskHandle<T: Send + 'static> {
    task_id: TaskId,
    slot: Arc<Slot<T>>,
    supervisor: Supervisor,
    consumed: bool,
}

impl<T: Send + 'static> TaskHandle<T> {
    pub fn id(&self) -> TaskId {
        self.task_id
    }

    pub fn is_finished(&self) -> bool {
        self.slot.state().is_finished()
    }

    /// Wait for the work and observe its outcome. A fault comes back as the
    /// `Err` with `observed == true` and is never reported as unobserved.
    pub async fn join(mut self) -> Result<T, FaultEvent> {
        let slot = Arc::clone(&self.slot);
        loop {
            let notified = slot.done.notified();
            if let Some(outcome) = self.observe() {
                return outcome;
            }
            notified.await;
        }
    }

    /// Observe the outcome if the work has finished; otherwise give the
    /// handle back.
    pub fn try_join(mut self) -> Result<Result<T, FaultEvent>, Self> {
        match self.observe() {
            Some(outcome) => Ok(outcome),
            None => Err(self),
        }
    }

    /// Give up the handle. The supervisor keeps fault visibility.
    pub fn detach(self) {
        drop(self);
    }

    fn observe(&mut self) -> Option<Result<T, FaultEvent>> {
        let outcome = self.slot.take_observed()?;
        self.consumed = true;
        if let Err(event) = &outcome {
            self.supervisor.stats().record_observed();
            tracing::debug!(
                task_id = %self.task_id,
                fault_id = %event.id,
                "task fault observed"
            );
        }
        Some(outcome)
    }
}

impl<T: Send + 'static> Drop for TaskHandle<T> {
    fn drop(&mut self) {
        if self.consumed {
            return;
        }
        tracing::debug!(task_id = %self.task_id, "detached");
        self.supervisor.track(Arc::clone(&self.slot) as Arc<dyn Tracked>);
    }
}

impl<T: Send + 'static> std::fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("task_id", &self.task_id)
            .field("state", &self.slot.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::config::SupervisorConfig;
    use crate::domain::FaultKind;
    use crate::impls::RecordingHandler;
    use std::time::Duration;

    async fn explode(message: &'static str) {
        panic!("{message}");
    }

    fn start() -> (Supervisor, Arc<RecordingHandler>) {
        let context = FaultContext::new();
        let recorder = Arc::new(RecordingHandler::new());
        context
            .registry()
            .subscribe(FaultKind::UnobservedFailure, recorder.clone());
        let config = SupervisorConfig::default().with_sweep_interval(Duration::ZERO);
        (Supervisor::start(context, config).unwrap(), recorder)
    }

    #[tokio::test]
    async fn join_returns_the_value() {
        let (supervisor, _) = start();
        let handle = supervisor.launcher().launch(async { 40 + 2 });
        assert_eq!(handle.join().await.unwrap(), 42);
        assert_eq!(supervisor.status().launched, 1);
    }

    #[tokio::test]
    async fn err_message_is_preserved_verbatim() {
        let (supervisor, _) = start();
        let message = "disk full: /var/lib/app (errno 28)\n  while writing chunk 7";

        let handle = supervisor
            .launcher()
            .launch_fallible(async move { Err::<(), _>(message.to_string()) });
        let event = handle.join().await.unwrap_err();

        assert_eq!(event.message(), message);
        assert_eq!(event.fault.to_string(), message);
    }

    #[tokio::test]
    async fn fault_event_carries_the_task_id() {
        let (supervisor, _) = start();
        let handle = supervisor.launcher().launch(explode("whose fault"));
        let task_id = handle.id();

        let event = handle.join().await.unwrap_err();
        assert_eq!(event.task_id(), Some(task_id));
        assert!(task_id.to_string().starts_with("task-"));
    }

    #[tokio::test]
    async fn blocking_work_panics_are_captured() {
        let (supervisor, recorder) = start();

        let handle = supervisor
            .launcher()
            .launch_blocking(|| -> u32 { panic!("blocking boom") });
        handle.detach();

        assert!(supervisor.settle(Duration::from_secs(2)).await);
        supervisor.sweep();
        assert_eq!(recorder.messages(), vec!["blocking boom".to_string()]);
    }

    #[tokio::test]
    async fn blocking_work_returns_its_value() {
        let (supervisor, _) = start();
        let handle = supervisor.launcher().launch_blocking(|| "done".to_string());
        assert_eq!(handle.join().await.unwrap(), "done");
    }

    #[tokio::test]
    async fn try_join_gives_the_handle_back_while_running() {
        let (supervisor, recorder) = start();
        let release = Arc::new(Notify::new());
        let gate = Arc::clone(&release);

        let handle = supervisor.launcher().launch(async move {
            gate.notified().await;
            explode("after release").await;
        });

        let handle = handle.try_join().unwrap_err();
        assert!(!handle.is_finished());

        release.notify_one();
        let mut handle = handle;
        let outcome = loop {
            match handle.try_join() {
                Ok(outcome) => break outcome,
                Err(back) => {
                    handle = back;
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            }
        };

        let event = outcome.unwrap_err();
        assert!(event.observed);
        assert_eq!(event.message(), "after release");

        supervisor.sweep();
        assert_eq!(recorder.count(), 0);
    }

    #[tokio::test]
    async fn cancelled_join_detaches_the_task() {
        let (supervisor, recorder) = start();
        let release = Arc::new(Notify::new());
        let gate = Arc::clone(&release);

        let handle = supervisor.launcher().launch(async move {
            gate.notified().await;
            explode("nobody waited").await;
        });

        let timed_out = tokio::time::timeout(Duration::from_millis(20), handle.join()).await;
        assert!(timed_out.is_err());
        assert_eq!(supervisor.status().tracked, 1);

        release.notify_one();
        assert!(supervisor.settle(Duration::from_secs(2)).await);
        assert_eq!(supervisor.sweep().reported, 1);
        assert_eq!(recorder.messages(), vec!["nobody waited".to_string()]);
    }

    #[tokio::test]
    async fn concurrent_observer_and_sweep_report_at_most_once() {
        let (supervisor, recorder) = start();
        let launcher = supervisor.launcher();

        let mut joins = Vec::new();
        for _ in 0..20 {
            launcher.fire_and_forget(explode("detached"));
            let handle = launcher.launch(explode("joined"));
            joins.push(tokio::spawn(handle.join()));
        }

        let sweeper = supervisor.clone();
        let sweeps = tokio::spawn(async move {
            for _ in 0..10 {
                sweeper.sweep();
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        });

        for join in joins {
            assert!(join.await.unwrap().unwrap_err().observed);
        }
        sweeps.await.unwrap();
        assert!(supervisor.settle(Duration::from_secs(2)).await);
        supervisor.sweep();

        assert_eq!(recorder.count(), 20);
        assert!(recorder.messages().iter().all(|m| m == "detached"));
    }

    #[test]
    fn dropped_work_completes_the_slot_with_a_fault() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let (supervisor, recorder) = runtime.block_on(async { start() });

        // never polled: the runtime is dropped before the task runs
        supervisor.launcher().fire_and_forget(std::future::pending::<()>());
        drop(runtime);

        assert_eq!(supervisor.status().tracked_running, 0);
        assert_eq!(supervisor.sweep().reported, 1);
        assert_eq!(
            recorder.messages(),
            vec!["task was dropped before completion".to_string()]
        );
    }
}
