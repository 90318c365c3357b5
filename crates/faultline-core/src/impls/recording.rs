//! RecordingHandler - keeps every event it receives.

use std::sync::{Mutex, PoisonError};

use crate::domain::FaultEvent;
use crate::ports::FaultHandler;

#[derive(Debug, Default)]
pub struct RecordingHandler {
    events: Mutex<Vec<FaultEvent>>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events received so far, in delivery order.
    pub fn events(&self) -> Vec<FaultEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .map(|event| event.fault.message)
            .collect()
    }

    pub fn count(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl FaultHandler for RecordingHandler {
    fn on_fault(&self, event: &FaultEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }

    fn name(&self) -> &str {
        "recording"
    }
}
