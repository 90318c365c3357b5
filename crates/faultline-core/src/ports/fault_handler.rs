//! FaultHandler port - 障害通知の購読者
//!
//! Closures `Fn(&FaultEvent)` are handlers out of the box, so callers can
//! write `ctx.on_unobserved_failure(|ev| ...)` without defining a type.

use crate::domain::FaultEvent;

/// FaultHandler は FaultEvent を受け取る購読者
///
/// Handlers run synchronously on whichever thread detected the fault: a sweep
/// caller for unobserved failures, the panicking thread for unhandled faults.
/// Keep them short and non-blocking.
pub trait FaultHandler: Send + Sync {
    fn on_fault(&self, event: &FaultEvent);

    /// Name used in logs when the handler misbehaves.
    fn name(&self) -> &str {
        "anonymous"
    }
}

impl<F> FaultHandler for F
where
    F: Fn(&FaultEvent) + Send + Sync,
{
    fn on_fault(&self, event: &FaultEvent) {
        self(event)
    }
}
