//! Shared error and rejection reporting
//!
//! Every recovery site — task bodies, listeners, timer handlers, job
//! batches — funnels through these two functions. An error or unhandled
//! rejection first gets a chance to be observed by script, as a
//! cancelable `"error"` / `"unhandledrejection"` event on the global
//! target; if no listener cancels it, it is printed to the console, and
//! outside interactive mode it aborts the loop.

use tracing::warn;

use crate::engine::ScriptHandle;
use crate::error::SourcePosition;
use crate::events::{self, EventDetail};
use crate::runtime::Runtime;

/// Report an uncaught error value.
///
/// `sync` is forwarded to the dispatch: reports raised from inside a
/// synchronous dispatch must not start draining microtasks mid-flight.
pub(crate) fn error_value(rt: &Runtime, error: ScriptHandle, sync: bool) {
    rt.note_error_reported();
    let engine = rt.engine();
    let details = engine.error_details(error.raw());
    // arbitrary thrown values read as `Uncaught <value>`; proper Error
    // objects already carry their name in the message
    let message = if details.is_error_object {
        details.message.clone()
    } else {
        format!("Uncaught {}", details.message)
    };

    let global = rt.global_target();
    let handled = if global.has_listeners("error") {
        let position = details
            .frame
            .as_deref()
            .map(SourcePosition::parse_frame)
            .unwrap_or_default();
        let event = rt.create_event(
            "error",
            true,
            EventDetail::Error {
                message: message.clone(),
                position,
                error: error.clone(),
            },
        );
        events::dispatch(rt, &global, &event, sync)
    } else {
        false
    };

    if !handled {
        rt.console_error_line(&message);
        if !rt.interactive() {
            warn!(%message, "uncaught error, aborting");
            rt.abort();
        }
    }
}

/// Report a promise that is still rejected-without-handler at the end of
/// a drain cycle.
pub(crate) fn rejection(rt: &Runtime, promise: &ScriptHandle) {
    rt.note_rejection_reported();
    let engine = rt.engine();
    let reason = ScriptHandle::adopt(engine, engine.promise_result(promise.raw()));

    let global = rt.global_target();
    let handled = if global.has_listeners("unhandledrejection") {
        let event = rt.create_event(
            "unhandledrejection",
            true,
            EventDetail::Rejection {
                promise: promise.clone(),
                reason: reason.clone(),
            },
        );
        events::dispatch(rt, &global, &event, true)
    } else {
        false
    };

    if !handled {
        let message = format!(
            "Uncaught (in promise) {}",
            engine.display_value(reason.raw())
        );
        rt.console_error_line(&message);
        if !rt.interactive() {
            warn!("unhandled rejection, aborting");
            rt.abort();
        }
    }
}
