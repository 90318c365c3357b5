//! FaultContext - 障害通知のコンテキスト
//!
//! Created once at process start and passed to whatever launches background
//! work. It owns the callback registry plus the clock and id ports used to
//! stamp fault events.

use std::sync::Arc;

use crate::app::panic_hook;
use crate::app::registry::{CallbackRegistry, DispatchReport};
use crate::domain::{FaultEvent, FaultKind, FaultOrigin, UnhandledFault};
use crate::ports::{Clock, FaultHandler, IdGenerator, SystemClock, UlidGenerator};

/// Fault-reporting context. Cheap to clone; clones share the same registry.
#[derive(Clone)]
pub struct FaultContext {
    registry: Arc<CallbackRegistry>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl FaultContext {
    pub fn new() -> Self {
        Self::with_ports(
            Arc::new(SystemClock),
            Arc::new(UlidGenerator::new(SystemClock)),
        )
    }

    /// Build a context with custom ports (tests use `FixedClock`).
    pub fn with_ports(clock: Arc<dyn Clock>, ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            registry: Arc::new(CallbackRegistry::new()),
            clock,
            ids,
        }
    }

    /// Register a handler for faults of supervised work nobody observed.
    pub fn on_unobserved_failure<H>(&self, handler: H) -> &Self
    where
        H: FaultHandler + 'static,
    {
        self.registry
            .subscribe(FaultKind::UnobservedFailure, Arc::new(handler));
        self
    }

    /// Register a handler for panics outside supervised work.
    ///
    /// Only fires once [`install_panic_hook`](Self::install_panic_hook) has
    /// been called. Must not panic: a panic inside the panic hook aborts.
    pub fn on_unhandled_fault<H>(&self, handler: H) -> &Self
    where
        H: FaultHandler + 'static,
    {
        self.registry.subscribe(FaultKind::Fault, Arc::new(handler));
        self
    }

    /// Route process panics through this context. See [`panic_hook::install`].
    pub fn install_panic_hook(&self) {
        panic_hook::install(self.clone());
    }

    pub fn registry(&self) -> &CallbackRegistry {
        &self.registry
    }

    pub(crate) fn dispatch(&self, kind: FaultKind, event: &FaultEvent) -> DispatchReport {
        self.registry.dispatch(kind, event)
    }

    pub(crate) fn ids(&self) -> &dyn IdGenerator {
        self.ids.as_ref()
    }

    /// Stamp a new fault event with this context's clock and id generator.
    pub(crate) fn fault_event(&self, origin: FaultOrigin, fault: UnhandledFault) -> FaultEvent {
        FaultEvent::new(self.ids.generate_fault_id(), origin, fault, self.clock.now())
    }
}

impl Default for FaultContext {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FaultContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaultContext")
            .field("fault_handlers", &self.registry.len(FaultKind::Fault))
            .field(
                "unobserved_handlers",
                &self.registry.len(FaultKind::UnobservedFailure),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::RecordingHandler;
    use crate::ports::FixedClock;
    use chrono::{TimeZone, Utc};

    #[test]
    fn subscriptions_land_in_the_right_list() {
        let ctx = FaultContext::new();
        ctx.on_unobserved_failure(|_: &FaultEvent| {})
            .on_unobserved_failure(RecordingHandler::new())
            .on_unhandled_fault(|_: &FaultEvent| {});

        assert_eq!(ctx.registry().len(FaultKind::UnobservedFailure), 2);
        assert_eq!(ctx.registry().len(FaultKind::Fault), 1);
    }

    #[test]
    fn clones_share_the_registry() {
        let ctx = FaultContext::new();
        let clone = ctx.clone();
        clone.on_unhandled_fault(|_: &FaultEvent| {});
        assert_eq!(ctx.registry().len(FaultKind::Fault), 1);
    }

    #[test]
    fn fault_events_use_the_context_clock() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let ctx = FaultContext::with_ports(
            Arc::new(FixedClock::new(at)),
            Arc::new(UlidGenerator::new(FixedClock::new(at))),
        );

        let event = ctx.fault_event(
            FaultOrigin::Thread { name: None },
            UnhandledFault::new("Hello World!", ""),
        );

        assert_eq!(event.occurred_at, at);
        assert_eq!(event.id.as_ulid().timestamp_ms(), at.timestamp_millis() as u64);
        assert_eq!(event.message(), "Hello World!");
        assert!(!event.observed);
    }
}
