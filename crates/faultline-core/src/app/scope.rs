//! Per-thread marker for "a panic here is already handled".
//!
//! The launcher enters a [`SupervisedScope`] around every poll of supervised
//! work, and the registry enters one around every handler call. The panic hook
//! checks [`is_supervised`] to decide between "stash the trace for the
//! launcher" and "report an unhandled fault".

use std::cell::{Cell, RefCell};
use std::marker::PhantomData;

thread_local! {
    static DEPTH: Cell<usize> = const { Cell::new(0) };
    static PANIC_TRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// RAII guard. Not `Send`: it must be dropped on the thread that entered it.
pub(crate) struct SupervisedScope {
    _not_send: PhantomData<*const ()>,
}

impl SupervisedScope {
    pub(crate) fn enter() -> Self {
        DEPTH.with(|d| d.set(d.get() + 1));
        Self {
            _not_send: PhantomData,
        }
    }
}

impl Drop for SupervisedScope {
    fn drop(&mut self) {
        DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
    }
}

/// True while the current thread is running supervised work or a handler.
pub fn is_supervised() -> bool {
    DEPTH.with(|d| d.get() > 0)
}

pub(crate) fn stash_panic_trace(trace: String) {
    PANIC_TRACE.with(|t| *t.borrow_mut() = Some(trace));
}

/// Trace left by the panic hook for the most recent supervised panic on this
/// thread. `None` when no hook is installed.
pub(crate) fn take_panic_trace() -> Option<String> {
    PANIC_TRACE.with(|t| t.borrow_mut().take())
}
