//! Global fault reporter (process panic hook).
//!
//! Rust only has one panic hook per process, so this is the single piece of
//! process-global state: the hook closure holds a clone of a [`FaultContext`].
//!
//! # Hook の動作
//! - supervised scope の中の panic: trace を thread-local に残して終わり
//!   （launcher が catch_unwind 後に拾う）。既定の hook は呼ばない
//! - それ以外の panic: `FaultKind::Fault` の handler を同期的に呼んでから、
//!   以前の hook を呼ぶ（observe only、スレッドはそのまま unwind する）

use std::backtrace::{Backtrace, BacktraceStatus};
use std::panic::{self, PanicHookInfo};
use std::thread;

use crate::app::context::FaultContext;
use crate::app::scope;
use crate::domain::{FaultKind, FaultOrigin, UnhandledFault};

/// Install the hook, chaining whatever hook was installed before.
///
/// Calling this more than once stacks hooks; every installed context sees
/// unhandled faults.
pub fn install(context: FaultContext) {
    let previous = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        let trace = capture_trace(info);

        if scope::is_supervised() {
            scope::stash_panic_trace(trace);
            return;
        }

        let origin = FaultOrigin::Thread {
            name: thread::current().name().map(str::to_string),
        };
        let fault = UnhandledFault::new(UnhandledFault::message_from_panic(info.payload()), trace);
        let event = context.fault_event(origin, fault);

        tracing::error!(
            fault_id = %event.id,
            message = event.message(),
            "unhandled fault"
        );
        context.dispatch(FaultKind::Fault, &event);

        previous(info);
    }));

    tracing::debug!("panic hook installed");
}

fn capture_trace(info: &PanicHookInfo<'_>) -> String {
    let mut trace = match info.location() {
        Some(location) => format!("panicked at {location}"),
        None => "panicked at <unknown>".to_string(),
    };

    let backtrace = Backtrace::capture();
    if backtrace.status() == BacktraceStatus::Captured {
        trace.push('\n');
        trace.push_str(&backtrace.to_string());
    }

    trace
}
