//! Timeout and interval scheduler
//!
//! Each live timer is a countdown in hardware ticks. Once per vblank the
//! driver advances the scheduler by the elapsed ticks; the most-overdue
//! tie group of timers is enqueued as tasks, one per timer, and marked
//! `queued` so a slow task queue cannot re-enqueue an interval that has
//! not run yet. Re-arming (intervals) and removal (one-shots) happen only
//! after the timer's task has actually executed.
//!
//! Delay clamping follows the standard nested-timer throttle: a timer
//! created at nesting depth greater than five gets a floor of
//! [`MIN_CLAMPED_DELAY`] ticks.

use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::engine::ScriptHandle;

/// Identifier of a live timer, unique among live timers.
pub type TimerId = u32;

/// Nesting depth beyond which delays are clamped.
pub const MAX_UNCLAMPED_NESTING: u32 = 5;

/// Minimum effective delay, in ticks, for deeply nested timers.
pub const MIN_CLAMPED_DELAY: i64 = 4;

/// How a timer invokes script: a function value called with the stored
/// arguments, or a source string evaluated at fire time.
#[derive(Debug, Clone)]
pub enum TimerHandler {
    /// Engine function value
    Function(ScriptHandle),
    /// Source evaluated through the engine's `eval`
    Source(String),
}

pub(crate) struct Timeout {
    duration: i64,
    remaining: i64,
    handler: TimerHandler,
    args: Vec<ScriptHandle>,
    nest_level: u32,
    repeat: bool,
    queued: bool,
}

/// The live timer table.
#[derive(Default)]
pub struct TimerScheduler {
    timers: FxHashMap<TimerId, Timeout>,
    next_id: TimerId,
}

impl TimerScheduler {
    /// Create an empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a timer. `parent_nesting` is the nesting level of the
    /// currently executing timer handler (zero outside any handler); the
    /// new timer's level is one deeper, and the delay floor applies once
    /// that level exceeds [`MAX_UNCLAMPED_NESTING`].
    pub fn add(
        &mut self,
        handler: TimerHandler,
        args: Vec<ScriptHandle>,
        delay_ticks: i64,
        repeat: bool,
        parent_nesting: u32,
    ) -> TimerId {
        let nest_level = parent_nesting + 1;
        let mut duration = delay_ticks.max(0);
        if nest_level > MAX_UNCLAMPED_NESTING && duration < MIN_CLAMPED_DELAY {
            duration = MIN_CLAMPED_DELAY;
        }
        self.next_id += 1;
        let id = self.next_id;
        debug!(id, duration, repeat, nest_level, "timer added");
        self.timers.insert(
            id,
            Timeout {
                duration,
                remaining: duration,
                handler,
                args,
                nest_level,
                repeat,
                queued: false,
            },
        );
        id
    }

    /// Remove a timer, releasing its handler and arguments. Clearing an
    /// unknown or already-finished id is a silent no-op.
    pub fn clear(&mut self, id: TimerId) {
        if self.timers.remove(&id).is_some() {
            debug!(id, "timer cleared");
        }
    }

    /// Whether any timer is live (queued or counting down).
    pub fn has_live_timers(&self) -> bool {
        !self.timers.is_empty()
    }

    /// Advance every non-queued countdown by `elapsed` ticks, then fire
    /// the most-overdue tie group: if the minimum remaining countdown is
    /// due, every timer sitting at that minimum is marked `queued` and
    /// returned, in no particular order.
    pub fn tick(&mut self, elapsed: u64) -> Vec<TimerId> {
        let elapsed = elapsed as i64;
        for timeout in self.timers.values_mut().filter(|t| !t.queued) {
            timeout.remaining -= elapsed;
        }
        let minimum = self
            .timers
            .values()
            .filter(|t| !t.queued)
            .map(|t| t.remaining)
            .min();
        let Some(minimum) = minimum else {
            return Vec::new();
        };
        if minimum > 0 {
            return Vec::new();
        }
        let due: Vec<TimerId> = self
            .timers
            .iter()
            .filter(|(_, t)| !t.queued && t.remaining == minimum)
            .map(|(&id, _)| id)
            .collect();
        for id in &due {
            if let Some(timeout) = self.timers.get_mut(id) {
                timeout.queued = true;
            }
        }
        trace!(fired = due.len(), "timer tick");
        due
    }

    /// Clone out what a queued timer's task needs to run it, or `None`
    /// when the timer was cleared while queued.
    pub(crate) fn snapshot_for_run(
        &self,
        id: TimerId,
    ) -> Option<(TimerHandler, Vec<ScriptHandle>, u32)> {
        self.timers
            .get(&id)
            .map(|t| (t.handler.clone(), t.args.clone(), t.nest_level))
    }

    /// Settle a timer after its task ran: re-arm an interval, erase a
    /// one-shot. No-op when the timer was cleared during its own handler.
    pub(crate) fn finish_run(&mut self, id: TimerId) {
        let repeat = match self.timers.get(&id) {
            Some(timeout) => timeout.repeat,
            None => return,
        };
        if repeat {
            if let Some(timeout) = self.timers.get_mut(&id) {
                timeout.remaining = timeout.duration;
                timeout.queued = false;
            }
        } else {
            self.timers.remove(&id);
        }
    }

    /// Drop every timer, releasing held handles. Teardown only.
    pub fn clear_all(&mut self) {
        self.timers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::stub::StubEngine;
    use crate::engine::{EngineRef, ScriptHandle};
    use std::rc::Rc;

    fn handler(engine: &EngineRef, stub: &StubEngine) -> TimerHandler {
        TimerHandler::Function(ScriptHandle::adopt(engine, stub.number(0.0)))
    }

    fn scheduler_with_stub() -> (TimerScheduler, Rc<StubEngine>, EngineRef) {
        let stub = Rc::new(StubEngine::new());
        let engine: EngineRef = stub.clone();
        (TimerScheduler::new(), stub, engine)
    }

    #[test]
    fn test_ids_are_unique_among_live_timers() {
        let (mut sched, stub, engine) = scheduler_with_stub();
        let a = sched.add(handler(&engine, &stub), Vec::new(), 10, false, 0);
        let b = sched.add(handler(&engine, &stub), Vec::new(), 10, false, 0);
        assert_ne!(a, b);
    }

    #[test]
    fn test_negative_delay_clamps_to_zero() {
        let (mut sched, stub, engine) = scheduler_with_stub();
        sched.add(handler(&engine, &stub), Vec::new(), -50, false, 0);
        // due on the very first advance
        assert_eq!(sched.tick(0).len(), 1);
    }

    #[test]
    fn test_nesting_floor_applies_beyond_level_five() {
        let (mut sched, stub, engine) = scheduler_with_stub();
        // parent nesting 5 -> new level 6 -> clamped to 4 ticks
        sched.add(handler(&engine, &stub), Vec::new(), 0, false, 5);
        assert!(sched.tick(3).is_empty());
        assert_eq!(sched.tick(1).len(), 1);
    }

    #[test]
    fn test_nesting_at_or_below_five_respects_delay() {
        let (mut sched, stub, engine) = scheduler_with_stub();
        // parent nesting 4 -> new level 5 -> no clamp
        sched.add(handler(&engine, &stub), Vec::new(), 0, false, 4);
        assert_eq!(sched.tick(0).len(), 1);
    }

    #[test]
    fn test_tie_group_fires_together() {
        let (mut sched, stub, engine) = scheduler_with_stub();
        let a = sched.add(handler(&engine, &stub), Vec::new(), 10, false, 0);
        let b = sched.add(handler(&engine, &stub), Vec::new(), 10, false, 0);
        let c = sched.add(handler(&engine, &stub), Vec::new(), 20, false, 0);
        let due = sched.tick(10);
        assert_eq!(due.len(), 2);
        assert!(due.contains(&a) && due.contains(&b));
        assert!(!due.contains(&c));
    }

    #[test]
    fn test_only_most_overdue_group_fires_per_pass() {
        let (mut sched, stub, engine) = scheduler_with_stub();
        let early = sched.add(handler(&engine, &stub), Vec::new(), 5, false, 0);
        let late = sched.add(handler(&engine, &stub), Vec::new(), 10, false, 0);
        // both overdue after one large advance, but only the most overdue
        // fires on this pass
        let due = sched.tick(16);
        assert_eq!(due, vec![early]);
        let due = sched.tick(16);
        assert_eq!(due, vec![late]);
    }

    #[test]
    fn test_queued_timer_does_not_refire() {
        let (mut sched, stub, engine) = scheduler_with_stub();
        let id = sched.add(handler(&engine, &stub), Vec::new(), 5, true, 0);
        assert_eq!(sched.tick(5), vec![id]);
        // interval stays queued until its task runs, so further ticks
        // cannot double-fire it
        assert!(sched.tick(50).is_empty());
        sched.finish_run(id);
        assert!(sched.has_live_timers());
        assert_eq!(sched.tick(5), vec![id]);
    }

    #[test]
    fn test_one_shot_erased_only_after_run() {
        let (mut sched, stub, engine) = scheduler_with_stub();
        let id = sched.add(handler(&engine, &stub), Vec::new(), 5, false, 0);
        sched.tick(5);
        assert!(sched.has_live_timers());
        sched.finish_run(id);
        assert!(!sched.has_live_timers());
        assert_eq!(stub.live_values(), 0);
    }

    #[test]
    fn test_clear_is_idempotent() {
        let (mut sched, stub, engine) = scheduler_with_stub();
        let id = sched.add(handler(&engine, &stub), Vec::new(), 5, false, 0);
        sched.clear(id);
        sched.clear(id);
        sched.clear(9999);
        assert!(!sched.has_live_timers());
        assert_eq!(stub.live_values(), 0);
    }
}
