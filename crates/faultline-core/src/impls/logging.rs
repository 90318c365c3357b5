//! LoggingHandler - fault events as structured `tracing` records.

use crate::domain::{FaultEvent, FaultKind};
use crate::ports::FaultHandler;

/// Emits one `tracing::error!` per event, tagged with the kind it was
/// subscribed for.
#[derive(Debug, Clone, Copy)]
pub struct LoggingHandler {
    kind: FaultKind,
}

impl LoggingHandler {
    pub fn new(kind: FaultKind) -> Self {
        Self { kind }
    }
}

impl FaultHandler for LoggingHandler {
    fn on_fault(&self, event: &FaultEvent) {
        tracing::error!(
            kind = self.kind.as_label(),
            fault_id = %event.id,
            origin = ?event.origin,
            occurred_at = %event.occurred_at,
            message = event.message(),
            trace = event.trace(),
            "fault reported"
        );
    }

    fn name(&self) -> &str {
        "logging"
    }
}
