//! CallbackRegistry - 障害 handler の登録と配送
//!
//! # 設計
//! - FaultKind ごとに handler の順序付きリスト（append-only）
//! - 配送時はスナップショットを取ってからロックを外して呼ぶ
//! - handler の panic は握りつぶしてログに出す（配送パスを落とさない）

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, PoisonError, RwLock};

use crate::app::scope::{self, SupervisedScope};
use crate::domain::{FaultEvent, FaultKind, UnhandledFault};
use crate::ports::FaultHandler;

/// Outcome of delivering one event to every handler of a kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub panicked: usize,
}

/// Ordered handler lists keyed by [`FaultKind`].
///
/// Reads and writes go through a `std::sync::RwLock` because dispatch happens
/// from tokio workers, blocking-pool threads and the panic hook.
#[derive(Default)]
pub struct CallbackRegistry {
    handlers: RwLock<HashMap<FaultKind, Vec<Arc<dyn FaultHandler>>>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `handler` to the list for `kind`.
    pub fn subscribe(&self, kind: FaultKind, handler: Arc<dyn FaultHandler>) {
        let mut handlers = self
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        handlers.entry(kind).or_default().push(handler);
    }

    pub fn len(&self, kind: FaultKind) -> usize {
        self.snapshot(kind).len()
    }

    pub fn is_empty(&self, kind: FaultKind) -> bool {
        self.len(kind) == 0
    }

    fn snapshot(&self, kind: FaultKind) -> Vec<Arc<dyn FaultHandler>> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .cloned()
            .unwrap_or_default()
    }

    /// Deliver `event` to every handler of `kind`, in registration order.
    pub fn dispatch(&self, kind: FaultKind, event: &FaultEvent) -> DispatchReport {
        let handlers = self.snapshot(kind);
        let mut report = DispatchReport::default();

        if handlers.is_empty() {
            tracing::debug!(
                kind = kind.as_label(),
                fault_id = %event.id,
                "no handlers registered; fault goes unreported"
            );
            return report;
        }

        for handler in handlers {
            // handler の panic は unhandled fault として扱わない
            let _scope = SupervisedScope::enter();
            match catch_unwind(AssertUnwindSafe(|| handler.on_fault(event))) {
                Ok(()) => report.delivered += 1,
                Err(payload) => {
                    let _ = scope::take_panic_trace();
                    tracing::error!(
                        kind = kind.as_label(),
                        handler = handler.name(),
                        fault_id = %event.id,
                        panic = %UnhandledFault::message_from_panic(payload.as_ref()),
                        "fault handler panicked"
                    );
                    report.panicked += 1;
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FaultId, FaultOrigin};
    use crate::impls::RecordingHandler;
    use chrono::Utc;
    use std::sync::Mutex;
    use ulid::Ulid;

    fn event(message: &str) -> FaultEvent {
        FaultEvent::new(
            FaultId::from_ulid(Ulid::new()),
            FaultOrigin::Thread { name: None },
            UnhandledFault::new(message, ""),
            Utc::now(),
        )
    }

    struct Exploding;

    impl FaultHandler for Exploding {
        fn on_fault(&self, _event: &FaultEvent) {
            panic!("handler blew up");
        }

        fn name(&self) -> &str {
            "exploding"
        }
    }

    #[test]
    fn dispatch_with_no_handlers_is_a_noop() {
        let registry = CallbackRegistry::new();
        let report = registry.dispatch(FaultKind::UnobservedFailure, &event("lost"));
        assert_eq!(report, DispatchReport::default());
        assert!(registry.is_empty(FaultKind::UnobservedFailure));
    }

    #[test]
    fn handlers_run_in_registration_order() {
        let registry = CallbackRegistry::new();
        let calls = Arc::new(Mutex::new(Vec::new()));

        for name in ["first", "second", "third"] {
            let calls = Arc::clone(&calls);
            registry.subscribe(
                FaultKind::UnobservedFailure,
                Arc::new(move |_: &FaultEvent| calls.lock().unwrap().push(name)),
            );
        }

        let report = registry.dispatch(FaultKind::UnobservedFailure, &event("x"));
        assert_eq!(report.delivered, 3);
        assert_eq!(*calls.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn kinds_are_kept_apart() {
        let registry = CallbackRegistry::new();
        let faults = Arc::new(RecordingHandler::new());
        let unobserved = Arc::new(RecordingHandler::new());
        registry.subscribe(FaultKind::Fault, faults.clone());
        registry.subscribe(FaultKind::UnobservedFailure, unobserved.clone());

        registry.dispatch(FaultKind::UnobservedFailure, &event("task"));

        assert_eq!(faults.count(), 0);
        assert_eq!(unobserved.messages(), vec!["task".to_string()]);
    }

    #[test]
    fn panicking_handler_does_not_stop_the_others() {
        let registry = CallbackRegistry::new();
        let after = Arc::new(RecordingHandler::new());

        registry.subscribe(FaultKind::UnobservedFailure, Arc::new(Exploding));
        registry.subscribe(FaultKind::UnobservedFailure, after.clone());

        let report = registry.dispatch(FaultKind::UnobservedFailure, &event("x"));

        assert_eq!(report, DispatchReport { delivered: 1, panicked: 1 });
        assert_eq!(after.count(), 1);
        assert!(!scope::is_supervised());
    }
}
