//! Microtask drain and promise-rejection tracking
//!
//! The engine owns the job (microtask) queue; the host's role is to pump
//! it dry at the right moments and to keep watch over promises that were
//! rejected with nobody listening. A failing job is reported and draining
//! continues, so one broken reaction cannot starve the reactions queued
//! behind it. Once the queue is empty, the set of still-unhandled rejected
//! promises is reported and cleared — each promise at most once, and never
//! if a handler showed up before the flush.

use tracing::trace;

use crate::engine::{EngineRef, RejectionNotice, RejectionOp, ScriptHandle};
use crate::runtime::Runtime;

/// Set of promises currently rejected with no handler attached, keyed by
/// engine identity.
#[derive(Default)]
pub(crate) struct RejectionTracker {
    rejected: Vec<ScriptHandle>,
}

impl RejectionTracker {
    /// Apply one engine notification to the set.
    pub(crate) fn ingest(&mut self, engine: &EngineRef, notice: RejectionNotice) {
        // either way the notice's count becomes ours to manage
        let promise = ScriptHandle::adopt(engine, notice.promise);
        match notice.op {
            RejectionOp::Rejected => {
                if !self.rejected.iter().any(|known| known.is_same(&promise)) {
                    self.rejected.push(promise);
                }
            }
            RejectionOp::Handled => {
                self.rejected.retain(|known| !known.is_same(&promise));
            }
        }
    }

    /// Hand over the whole set for reporting, leaving it empty.
    pub(crate) fn take_all(&mut self) -> Vec<ScriptHandle> {
        std::mem::take(&mut self.rejected)
    }

    /// Number of tracked unhandled rejections.
    pub(crate) fn len(&self) -> usize {
        self.rejected.len()
    }
}

/// Pump the engine's job queue until it reports no progress and no error,
/// then flush the rejection tracker.
///
/// Runs after every task, and after every listener of a non-sync dispatch.
pub(crate) fn drain(rt: &Runtime) {
    loop {
        let outcome = rt.engine().run_jobs();
        if outcome.ran {
            rt.note_job_batch();
        }
        match outcome.error {
            Some(error) => {
                // report and keep draining; later-queued jobs still run
                let error = ScriptHandle::adopt(rt.engine(), error);
                rt.report_error_value(error, false);
            }
            None => {
                if !outcome.ran {
                    break;
                }
            }
        }
    }

    let notices = rt.engine().take_rejection_notices();
    if !notices.is_empty() {
        trace!(count = notices.len(), "rejection notices");
        rt.ingest_rejection_notices(notices);
    }
    for promise in rt.take_tracked_rejections() {
        rt.report_rejection(&promise);
    }
}
