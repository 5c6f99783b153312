//! Runtime core and event loop driver
//!
//! [`Runtime`] bundles everything the loop owns — task queue, timer table,
//! global event target, dependent-events mask, rejection tracker — behind
//! one cheaply clonable handle. All state lives in a single-threaded cell
//! and is only ever touched through short borrows that end before any
//! engine call or listener invocation, so host callbacks are free to
//! re-enter the runtime.
//!
//! [`Runtime::run`] is the driver: once per hardware vblank it synthesizes
//! input events the mask asks for, advances the timers, runs the tasks
//! that were queued, and — in interactive mode — feeds composed lines
//! back into the engine. It blocks nowhere else.

mod report;

use std::cell::RefCell;
use std::rc::Rc;

use serde::Serialize;
use tracing::{debug, info, trace};

use crate::console::{ConsoleRef, StdoutConsole};
use crate::engine::{Completion, EngineRef, RawScriptValue, RejectionNotice, ScriptHandle};
use crate::events::{self, DependentEvents, Event, EventDetail, EventTarget, ListenerCallback};
use crate::hal::{Buttons, Hardware, InputSample, TouchPoint, BUTTON_NAMES};
use crate::jobs::{self, RejectionTracker};
use crate::shell::{self, LineEditor, ShellCommand};
use crate::tasks::{Task, TaskQueue};
use crate::timers::{TimerHandler, TimerId, TimerScheduler};

/// Counters the loop keeps while running, snapshotted by
/// [`Runtime::stats`] and printed by the shell's `.stats` command.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoopStats {
    /// Vblank iterations driven
    pub frames: u64,
    /// Tasks executed by `run_ready`
    pub tasks_run: u64,
    /// Dispatches performed
    pub events_dispatched: u64,
    /// Listener callbacks invoked
    pub listeners_invoked: u64,
    /// Timer tasks enqueued
    pub timers_fired: u64,
    /// Non-empty job batches drained
    pub job_batches: u64,
    /// Errors routed through the reporting path
    pub errors_reported: u64,
    /// Unhandled rejections reported
    pub rejections_reported: u64,
}

struct CoreState {
    tasks: TaskQueue,
    timers: TimerScheduler,
    global: EventTarget,
    dependent: DependentEvents,
    tracker: RejectionTracker,
    abort: bool,
    closed_by_user: bool,
    interactive: bool,
    pause_key_events: bool,
    nest_level: u32,
    now_ticks: u64,
    last_touch: TouchPoint,
    stats: LoopStats,
}

/// The event loop core. Clones share state.
pub struct Runtime {
    core: Rc<RefCell<CoreState>>,
    engine: EngineRef,
    console: ConsoleRef,
}

impl Clone for Runtime {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
            engine: self.engine.clone(),
            console: self.console.clone(),
        }
    }
}

impl Runtime {
    /// Create a runtime over an engine, printing to stdout/stderr.
    pub fn new(engine: EngineRef) -> Self {
        Self::with_console(engine, Rc::new(RefCell::new(StdoutConsole)))
    }

    /// Create a runtime with a custom console sink.
    pub fn with_console(engine: EngineRef, console: ConsoleRef) -> Self {
        Self {
            core: Rc::new(RefCell::new(CoreState {
                tasks: TaskQueue::new(),
                timers: TimerScheduler::new(),
                global: EventTarget::new(),
                dependent: DependentEvents::empty(),
                tracker: RejectionTracker::default(),
                abort: false,
                closed_by_user: false,
                interactive: false,
                pause_key_events: false,
                nest_level: 0,
                now_ticks: 0,
                last_touch: TouchPoint::default(),
                stats: LoopStats::default(),
            })),
            engine,
            console,
        }
    }

    /// The hosted engine.
    pub fn engine(&self) -> &EngineRef {
        &self.engine
    }

    /// The global event target, whose listeners gate input-event
    /// synthesis through the dependent-events mask.
    pub fn global_target(&self) -> EventTarget {
        self.core.borrow().global.clone()
    }

    /// Current dependent-events mask.
    pub fn dependent_events(&self) -> DependentEvents {
        self.core.borrow().dependent
    }

    // ── events ──────────────────────────────────────────────────────

    /// Create an event stamped with the current hardware tick.
    pub fn create_event(&self, event_type: &str, cancelable: bool, detail: EventDetail) -> Event {
        let ticks = self.core.borrow().now_ticks;
        Event::new(event_type, cancelable, detail).with_time_stamp(ticks)
    }

    /// Register a listener. Registering an identical `(type, callback)`
    /// pair twice is a no-op.
    pub fn add_event_listener(
        &self,
        target: &EventTarget,
        event_type: &str,
        callback: ListenerCallback,
        once: bool,
    ) {
        let outcome = target.add(event_type, callback, once);
        if !outcome.added {
            return;
        }
        debug!(event_type, once, "listener added");
        if outcome.first_of_type && target.same_target(&self.global_target()) {
            if let Some(bit) = DependentEvents::for_event_type(event_type) {
                self.core.borrow_mut().dependent.insert(bit);
            }
        }
    }

    /// Remove the first listener matching the callback. Removing an
    /// absent listener is a no-op.
    pub fn remove_event_listener(
        &self,
        target: &EventTarget,
        event_type: &str,
        callback: &ListenerCallback,
    ) {
        let outcome = target.remove(event_type, callback);
        if !outcome.removed {
            return;
        }
        debug!(event_type, "listener removed");
        if outcome.last_of_type && target.same_target(&self.global_target()) {
            if let Some(bit) = DependentEvents::for_event_type(event_type) {
                self.core.borrow_mut().dependent.remove(bit);
            }
        }
    }

    /// Dispatch an event on a target now, from the caller's stack.
    /// Script-initiated dispatch passes `sync = true`; the loop's own
    /// task-borne dispatches pass `false` to get per-listener microtask
    /// draining. Returns whether the event was canceled.
    pub fn dispatch_event(&self, target: &EventTarget, event: &Event, sync: bool) -> bool {
        events::dispatch(self, target, event, sync)
    }

    // ── tasks ───────────────────────────────────────────────────────

    /// Queue a task. Never blocks; tasks queued by a running task run on
    /// the next `run_ready`, not the current one.
    pub fn queue_task<F>(&self, task: F)
    where
        F: FnOnce(&Runtime) + 'static,
    {
        self.core.borrow_mut().tasks.push(Task::new(task));
    }

    /// Queue a call to an engine function with an argument snapshot.
    pub fn queue_call(&self, callback: ScriptHandle, args: Vec<ScriptHandle>) {
        self.queue_task(move |rt| {
            let engine = rt.engine();
            let raw_args: Vec<RawScriptValue> = args.iter().map(|a| a.raw()).collect();
            match engine.call(callback.raw(), engine.undefined(), &raw_args) {
                Ok(value) => engine.release(value),
                Err(error) => {
                    let error = ScriptHandle::adopt(engine, error);
                    if !rt.aborted() {
                        rt.report_error_value(error, false);
                    }
                }
            }
        });
    }

    /// Queue a task that dispatches `event` on `target`, running
    /// `default_action` afterwards unless a listener canceled the event.
    pub fn queue_event(
        &self,
        target: &EventTarget,
        event: &Event,
        default_action: Option<Rc<dyn Fn(&Runtime, &Event)>>,
    ) {
        let target = target.clone();
        let event = event.clone();
        self.queue_task(move |rt| {
            let canceled = events::dispatch(rt, &target, &event, false);
            if !canceled {
                if let Some(action) = &default_action {
                    action(rt, &event);
                }
            }
        });
    }

    /// Queue a simple payload-less event on the global target.
    pub fn queue_event_named(&self, event_type: &str) {
        let event = self.create_event(event_type, false, EventDetail::None);
        self.queue_event(&self.global_target(), &event, None);
    }

    /// Queue a task that runs a compiled script value. Compile errors are
    /// accepted here as already-materialized error values and flow
    /// through the reporting path when the task runs. In interactive mode
    /// the result is printed and bound to the `_` global.
    pub fn queue_script(&self, script: ScriptHandle) {
        self.queue_task(move |rt| {
            let engine = rt.engine();
            let completion: Completion = if engine.is_error_value(script.raw()) {
                Err(engine.acquire(script.raw()))
            } else {
                engine.run_compiled(script.raw())
            };
            let (result, failed) = match completion {
                Ok(value) => (ScriptHandle::adopt(engine, value), false),
                Err(error) => (ScriptHandle::adopt(engine, error), true),
            };
            if rt.aborted() {
                return;
            }
            rt.drain_microtasks();
            if failed {
                rt.report_error_value(result.clone(), false);
            } else if rt.interactive() {
                let text = engine.display_value(result.raw());
                rt.console_line(&text);
            }
            if rt.interactive() {
                engine.set_global("_", result.raw());
            }
        });
    }

    /// Compile a source under a name and queue it.
    pub fn queue_source(&self, name: &str, source: &str) {
        let compiled = self.engine.compile(name, source);
        self.queue_script(ScriptHandle::adopt(&self.engine, compiled));
    }

    /// Run exactly the tasks queued at the moment of the call, each
    /// followed by a microtask drain and rejection flush.
    pub fn run_ready(&self) {
        let present_at_entry = self.core.borrow().tasks.len();
        for _ in 0..present_at_entry {
            if self.aborted() {
                break;
            }
            let task = self.core.borrow_mut().tasks.pop();
            let Some(task) = task else {
                break;
            };
            self.core.borrow_mut().stats.tasks_run += 1;
            task.run(self);
            if !self.aborted() {
                jobs::drain(self);
            }
        }
    }

    /// Drop all queued tasks, releasing their captured handles.
    pub fn clear_tasks(&self) {
        self.core.borrow_mut().tasks.clear();
    }

    // ── timers ──────────────────────────────────────────────────────

    /// Schedule a one-shot timer, in hardware ticks.
    pub fn set_timeout(
        &self,
        handler: TimerHandler,
        args: Vec<ScriptHandle>,
        delay_ticks: i64,
    ) -> TimerId {
        let mut core = self.core.borrow_mut();
        let nesting = core.nest_level;
        core.timers.add(handler, args, delay_ticks, false, nesting)
    }

    /// Schedule a repeating timer, in hardware ticks.
    pub fn set_interval(
        &self,
        handler: TimerHandler,
        args: Vec<ScriptHandle>,
        delay_ticks: i64,
    ) -> TimerId {
        let mut core = self.core.borrow_mut();
        let nesting = core.nest_level;
        core.timers.add(handler, args, delay_ticks, true, nesting)
    }

    /// Cancel a timer. Unknown and already-finished ids are ignored.
    pub fn clear_timer(&self, id: TimerId) {
        self.core.borrow_mut().timers.clear(id);
    }

    /// Advance timer countdowns by `elapsed` ticks and queue a task for
    /// each timer that came due. The driver calls this once per vblank;
    /// embedders running the loop by hand may call it directly.
    pub fn tick_timers(&self, elapsed_ticks: u64) {
        let due = self.core.borrow_mut().timers.tick(elapsed_ticks);
        for id in due {
            self.core.borrow_mut().stats.timers_fired += 1;
            self.queue_task(move |rt| rt.run_due_timer(id));
        }
    }

    fn run_due_timer(&self, id: TimerId) {
        // cleared-while-queued timers simply vanish
        let snapshot = self.core.borrow().timers.snapshot_for_run(id);
        let Some((handler, args, nest_level)) = snapshot else {
            return;
        };
        trace!(id, nest_level, "timer task");
        let engine = self.engine();
        let previous = {
            let mut core = self.core.borrow_mut();
            std::mem::replace(&mut core.nest_level, nest_level)
        };
        let completion = match &handler {
            TimerHandler::Function(callback) => {
                let raw_args: Vec<RawScriptValue> = args.iter().map(|a| a.raw()).collect();
                engine.call(callback.raw(), engine.undefined(), &raw_args)
            }
            TimerHandler::Source(source) => engine.eval(source),
        };
        self.core.borrow_mut().nest_level = previous;
        match completion {
            Ok(value) => engine.release(value),
            Err(error) => {
                let error = ScriptHandle::adopt(engine, error);
                if !self.aborted() {
                    self.report_error_value(error, false);
                }
            }
        }
        self.core.borrow_mut().timers.finish_run(id);
    }

    // ── jobs and reporting ──────────────────────────────────────────

    /// Pump the engine's job queue dry and flush the rejection tracker.
    pub fn drain_microtasks(&self) {
        jobs::drain(self);
    }

    /// Route an uncaught error value through the reporting path.
    pub fn report_error_value(&self, error: ScriptHandle, sync: bool) {
        report::error_value(self, error, sync);
    }

    pub(crate) fn report_rejection(&self, promise: &ScriptHandle) {
        report::rejection(self, promise);
    }

    pub(crate) fn ingest_rejection_notices(&self, notices: Vec<RejectionNotice>) {
        let mut core = self.core.borrow_mut();
        for notice in notices {
            core.tracker.ingest(&self.engine, notice);
        }
    }

    pub(crate) fn take_tracked_rejections(&self) -> Vec<ScriptHandle> {
        self.core.borrow_mut().tracker.take_all()
    }

    // ── mode and teardown ───────────────────────────────────────────

    /// Set the abort flag; the loop exits after the current pass.
    pub fn abort(&self) {
        self.core.borrow_mut().abort = true;
    }

    /// Whether the abort flag is set.
    pub fn aborted(&self) -> bool {
        self.core.borrow().abort
    }

    /// End the loop at the user's request (`.exit`, a script `close()`).
    pub fn request_close(&self) {
        let mut core = self.core.borrow_mut();
        core.closed_by_user = true;
        core.abort = true;
    }

    /// Whether the loop ended by user request rather than error.
    pub fn closed_by_user(&self) -> bool {
        self.core.borrow().closed_by_user
    }

    /// Whether the runtime is in interactive (REPL) mode, where uncaught
    /// errors are printed but do not abort.
    pub fn interactive(&self) -> bool {
        self.core.borrow().interactive
    }

    /// Flip interactive mode. [`Runtime::run`] sets this from whether an
    /// editor was supplied.
    pub fn set_interactive(&self, interactive: bool) {
        self.core.borrow_mut().interactive = interactive;
    }

    /// Suppress key event synthesis (a modal composition UI owns input).
    pub fn set_key_events_paused(&self, paused: bool) {
        self.core.borrow_mut().pause_key_events = paused;
    }

    /// Whether key events are currently suppressed.
    pub fn key_events_paused(&self) -> bool {
        self.core.borrow().pause_key_events
    }

    /// Hardware tick count as of the last driven frame.
    pub fn now_ticks(&self) -> u64 {
        self.core.borrow().now_ticks
    }

    /// Snapshot of the loop counters.
    pub fn stats(&self) -> LoopStats {
        self.core.borrow().stats.clone()
    }

    /// The loop counters as a JSON object.
    pub fn stats_json(&self) -> String {
        serde_json::to_string(&self.stats()).unwrap_or_else(|_| "{}".to_string())
    }

    /// Drop all queued tasks, timers and tracked rejections, releasing
    /// every handle they held. Environment teardown only.
    pub fn teardown(&self) {
        let mut core = self.core.borrow_mut();
        core.tasks.clear();
        core.timers.clear_all();
        let _ = core.tracker.take_all();
    }

    // ── driver ──────────────────────────────────────────────────────

    /// Drive the event loop until it has nothing left to do or is
    /// aborted. Interactive mode is enabled iff an editor is supplied.
    ///
    /// One iteration per vblank: synthesize masked-in input events,
    /// advance timers, run the ready tasks (each with its microtask
    /// drain), feed the editor. The wait for vblank is the only place
    /// the runtime blocks.
    pub fn run(&self, hardware: &mut dyn Hardware, mut editor: Option<&mut dyn LineEditor>) {
        self.set_interactive(editor.is_some());
        let mut last_ticks = hardware.ticks();
        self.core.borrow_mut().now_ticks = last_ticks;
        info!(interactive = editor.is_some(), "event loop started");

        while self.should_continue() {
            hardware.wait_for_vblank();
            let sample = hardware.sample();
            let now = hardware.ticks();
            let elapsed = now.saturating_sub(last_ticks);
            last_ticks = now;
            {
                let mut core = self.core.borrow_mut();
                core.now_ticks = now;
                core.stats.frames += 1;
            }

            self.synthesize_input(&sample);
            self.tick_timers(elapsed);
            self.run_ready();
            if let Some(editor) = editor.as_mut() {
                self.feed_editor(&mut **editor);
            }
        }

        info!(closed_by_user = self.closed_by_user(), "event loop finished");
    }

    fn should_continue(&self) -> bool {
        let core = self.core.borrow();
        if core.abort {
            return false;
        }
        core.interactive
            || !core.dependent.is_empty()
            || !core.tasks.is_empty()
            || core.timers.has_live_timers()
    }

    fn synthesize_input(&self, sample: &InputSample) {
        let (mask, keys_paused, previous_touch) = {
            let core = self.core.borrow();
            (core.dependent, core.pause_key_events, core.last_touch)
        };

        if mask.contains(DependentEvents::VBLANK) {
            self.queue_event_named("vblank");
        }

        if mask.contains(DependentEvents::BUTTON_DOWN) {
            for &(flag, name) in BUTTON_NAMES {
                if sample.pressed.contains(flag) {
                    let event =
                        self.create_event("buttondown", false, EventDetail::Button { button: name });
                    self.queue_event(&self.global_target(), &event, None);
                }
            }
        }
        if mask.contains(DependentEvents::BUTTON_UP) {
            for &(flag, name) in BUTTON_NAMES {
                if sample.released.contains(flag) {
                    let event =
                        self.create_event("buttonup", false, EventDetail::Button { button: name });
                    self.queue_event(&self.global_target(), &event, None);
                }
            }
        }

        if sample.pressed.contains(Buttons::TOUCH) {
            if mask.contains(DependentEvents::TOUCH_START) {
                let position = sample.touch.unwrap_or(previous_touch);
                let event = self.create_event(
                    "touchstart",
                    false,
                    EventDetail::Touch {
                        x: position.x,
                        y: position.y,
                        delta: None,
                    },
                );
                self.queue_event(&self.global_target(), &event, None);
            }
        } else if sample.held.contains(Buttons::TOUCH) {
            if let Some(position) = sample.touch {
                if position != previous_touch && mask.contains(DependentEvents::TOUCH_MOVE) {
                    let event = self.create_event(
                        "touchmove",
                        false,
                        EventDetail::Touch {
                            x: position.x,
                            y: position.y,
                            delta: Some((
                                position.x - previous_touch.x,
                                position.y - previous_touch.y,
                            )),
                        },
                    );
                    self.queue_event(&self.global_target(), &event, None);
                }
            }
        } else if sample.released.contains(Buttons::TOUCH)
            && mask.contains(DependentEvents::TOUCH_END)
        {
            // the stylus has already left the screen; report where it was
            let event = self.create_event(
                "touchend",
                false,
                EventDetail::Touch {
                    x: previous_touch.x,
                    y: previous_touch.y,
                    delta: None,
                },
            );
            self.queue_event(&self.global_target(), &event, None);
        }
        if let Some(position) = sample.touch {
            self.core.borrow_mut().last_touch = position;
        }

        if !keys_paused {
            for change in &sample.keys {
                let (bit, event_type) = if change.pressed {
                    (DependentEvents::KEY_DOWN, "keydown")
                } else {
                    (DependentEvents::KEY_UP, "keyup")
                };
                if mask.contains(bit) {
                    let event = self.create_event(
                        event_type,
                        true,
                        EventDetail::Key {
                            key: change.key.clone(),
                            code: change.code.clone(),
                            shifted: change.shifted,
                            repeat: change.repeat,
                        },
                    );
                    self.queue_event(&self.global_target(), &event, None);
                }
            }
        }
    }

    fn feed_editor(&self, editor: &mut dyn LineEditor) {
        let Some(line) = editor.poll_line() else {
            return;
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return;
        }
        match shell::parse_command(trimmed) {
            Some(ShellCommand::Help) => {
                for help_line in shell::HELP_LINES {
                    self.console_line(help_line);
                }
            }
            Some(ShellCommand::Exit) => self.request_close(),
            Some(ShellCommand::Stats) => {
                let json = self.stats_json();
                self.console_line(&json);
            }
            None => {
                let compiled = self.engine.compile("REPL", &line);
                self.queue_script(ScriptHandle::adopt(&self.engine, compiled));
            }
        }
    }

    // ── console and stats plumbing ──────────────────────────────────

    pub(crate) fn console_line(&self, text: &str) {
        self.console.borrow_mut().line(text);
    }

    pub(crate) fn console_error_line(&self, text: &str) {
        self.console.borrow_mut().error_line(text);
    }

    pub(crate) fn note_event_dispatched(&self) {
        self.core.borrow_mut().stats.events_dispatched += 1;
    }

    pub(crate) fn note_listener_invoked(&self) {
        self.core.borrow_mut().stats.listeners_invoked += 1;
    }

    pub(crate) fn note_job_batch(&self) {
        self.core.borrow_mut().stats.job_batches += 1;
    }

    pub(crate) fn note_error_reported(&self) {
        self.core.borrow_mut().stats.errors_reported += 1;
    }

    pub(crate) fn note_rejection_reported(&self) {
        self.core.borrow_mut().stats.rejections_reported += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::BufferConsole;
    use crate::engine::stub::StubEngine;
    use crate::engine::ScriptEngine;
    use crate::hal::sim::SimHardware;
    use crate::shell::ScriptedEditor;
    use pretty_assertions::assert_eq;

    fn fixture() -> (Runtime, Rc<StubEngine>, BufferConsole) {
        let stub = Rc::new(StubEngine::new());
        let console = BufferConsole::new();
        let rt = Runtime::with_console(stub.clone(), Rc::new(RefCell::new(console.clone())));
        (rt, stub, console)
    }

    #[test]
    fn test_loop_runs_queued_work_then_exits() {
        let (rt, _stub, _console) = fixture();
        let ran = Rc::new(RefCell::new(false));
        let flag = ran.clone();
        rt.queue_task(move |_| *flag.borrow_mut() = true);

        let mut hardware = SimHardware::new();
        rt.run(&mut hardware, None);

        assert!(*ran.borrow());
        assert!(!rt.aborted());
        assert_eq!(rt.stats().frames, 1);
        assert_eq!(rt.stats().tasks_run, 1);
    }

    #[test]
    fn test_run_ready_defers_tasks_queued_by_tasks() {
        let (rt, _stub, _console) = fixture();
        let order: Rc<RefCell<Vec<&'static str>>> = Rc::new(RefCell::new(Vec::new()));

        let o = order.clone();
        rt.queue_task(move |rt| {
            o.borrow_mut().push("first");
            let o2 = o.clone();
            rt.queue_task(move |_| o2.borrow_mut().push("queued-during-run"));
        });
        let o = order.clone();
        rt.queue_task(move |_| o.borrow_mut().push("second"));

        rt.run_ready();
        assert_eq!(*order.borrow(), vec!["first", "second"]);
        rt.run_ready();
        assert_eq!(
            *order.borrow(),
            vec!["first", "second", "queued-during-run"]
        );
    }

    #[test]
    fn test_task_completes_with_its_microtasks_before_next_task() {
        let (rt, stub, _console) = fixture();
        let order: Rc<RefCell<Vec<&'static str>>> = Rc::new(RefCell::new(Vec::new()));

        let o = order.clone();
        let job_stub = stub.clone();
        let job = stub.function(move |_| {
            o.borrow_mut().push("a-job");
            Ok(job_stub.undefined())
        });
        let o = order.clone();
        let task_stub = stub.clone();
        rt.queue_task(move |_| {
            o.borrow_mut().push("a");
            task_stub.queue_job(job, &[]);
        });
        let o = order.clone();
        rt.queue_task(move |_| o.borrow_mut().push("b"));

        rt.run_ready();
        assert_eq!(*order.borrow(), vec!["a", "a-job", "b"]);
    }

    #[test]
    fn test_script_error_aborts_outside_interactive_mode() {
        let (rt, _stub, console) = fixture();
        rt.queue_source("main.js", "fail boom");

        let mut hardware = SimHardware::new();
        rt.run(&mut hardware, None);

        assert!(rt.aborted());
        assert!(!rt.closed_by_user());
        assert_eq!(console.error_lines(), vec!["Error: boom".to_string()]);
        assert_eq!(rt.stats().errors_reported, 1);
    }

    #[test]
    fn test_string_timer_handler_errors_flow_through_reporting() {
        let (rt, _stub, console) = fixture();
        rt.set_timeout(TimerHandler::Source("throw zap".to_string()), Vec::new(), 0);

        let mut hardware = SimHardware::new();
        rt.run(&mut hardware, None);

        assert!(rt.aborted());
        assert_eq!(console.error_lines(), vec!["Uncaught zap".to_string()]);
    }

    #[test]
    fn test_repl_session_prints_results_and_binds_underscore() {
        let (rt, stub, console) = fixture();
        let mut editor = ScriptedEditor::with_lines(["41", ".stats", ".exit"]);
        let mut hardware = SimHardware::new();
        rt.run(&mut hardware, Some(&mut editor));

        assert!(rt.closed_by_user());
        let plain = console.plain_lines();
        assert_eq!(plain[0], "41");
        // `.stats` prints one JSON object
        let stats: serde_json::Value =
            serde_json::from_str(&plain[1]).expect("stats line is valid JSON");
        assert!(stats.get("tasks_run").is_some());

        let underscore = stub.get_global("_").expect("REPL bound `_`");
        assert_eq!(stub.display_value(underscore), "41");
        stub.release(underscore);
    }

    #[test]
    fn test_repl_errors_report_but_do_not_abort() {
        let (rt, _stub, console) = fixture();
        let mut editor = ScriptedEditor::with_lines(["throw bad", "5", ".exit"]);
        let mut hardware = SimHardware::new();
        rt.run(&mut hardware, Some(&mut editor));

        assert!(rt.closed_by_user());
        assert_eq!(console.error_lines(), vec!["Uncaught bad".to_string()]);
        assert_eq!(console.plain_lines(), vec!["5".to_string()]);
    }

    #[test]
    fn test_repl_compile_errors_use_the_same_reporting_path() {
        let (rt, _stub, console) = fixture();
        let mut editor = ScriptedEditor::with_lines(["!{", ".exit"]);
        let mut hardware = SimHardware::new();
        rt.run(&mut hardware, Some(&mut editor));

        assert!(rt.closed_by_user());
        let errors = console.error_lines();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("SyntaxError"));
    }

    #[test]
    fn test_nested_timers_clamp_to_floor_beyond_level_five() {
        let (rt, stub, _console) = fixture();
        let fires: Rc<RefCell<Vec<u64>>> = Rc::new(RefCell::new(Vec::new()));
        let holder: Rc<RefCell<Option<ScriptHandle>>> = Rc::new(RefCell::new(None));

        let rt2 = rt.clone();
        let stub2 = stub.clone();
        let fires2 = fires.clone();
        let holder2 = holder.clone();
        let handler = stub.function(move |_| {
            fires2.borrow_mut().push(rt2.now_ticks());
            if fires2.borrow().len() < 8 {
                let callback = holder2.borrow().clone().expect("handler registered");
                rt2.set_timeout(TimerHandler::Function(callback), Vec::new(), 0);
            } else {
                rt2.request_close();
            }
            Ok(stub2.undefined())
        });
        let handle = ScriptHandle::adopt(rt.engine(), handler);
        *holder.borrow_mut() = Some(handle.clone());
        rt.set_timeout(TimerHandler::Function(handle), Vec::new(), 0);

        let mut hardware = SimHardware::with_ticks_per_frame(1);
        rt.run(&mut hardware, None);

        let fires = fires.borrow();
        assert_eq!(fires.len(), 8);
        let deltas: Vec<u64> = fires.windows(2).map(|w| w[1] - w[0]).collect();
        // levels two through five honor the requested zero delay; levels
        // six and beyond hit the four-tick floor
        assert_eq!(deltas, vec![1, 1, 1, 1, 4, 4, 4]);
    }

    #[test]
    fn test_interval_rearms_only_after_its_task_ran() {
        let (rt, stub, _console) = fixture();
        let count = Rc::new(RefCell::new(0u32));

        let rt2 = rt.clone();
        let stub2 = stub.clone();
        let count2 = count.clone();
        let handler = stub.function(move |_| {
            *count2.borrow_mut() += 1;
            if *count2.borrow() == 3 {
                rt2.request_close();
            }
            Ok(stub2.undefined())
        });
        let handle = ScriptHandle::adopt(rt.engine(), handler);
        // each 16-tick frame overshoots the 5-tick period threefold, but
        // a queued interval cannot fire again until its task has run
        rt.set_interval(TimerHandler::Function(handle), Vec::new(), 5);

        let mut hardware = SimHardware::with_ticks_per_frame(16);
        rt.run(&mut hardware, None);

        assert_eq!(*count.borrow(), 3);
        assert_eq!(rt.stats().frames, 3);
    }

    #[test]
    fn test_cleared_while_queued_timer_never_runs() {
        let (rt, stub, _console) = fixture();
        let ran = Rc::new(RefCell::new(false));
        let flag = ran.clone();
        let stub2 = stub.clone();
        let handler = stub.function(move |_| {
            *flag.borrow_mut() = true;
            Ok(stub2.undefined())
        });
        let handle = ScriptHandle::adopt(rt.engine(), handler);
        let id = rt.set_timeout(TimerHandler::Function(handle), Vec::new(), 0);

        rt.tick_timers(1);
        rt.clear_timer(id);
        rt.run_ready();

        assert!(!*ran.borrow());
        assert!(!rt.core.borrow().timers.has_live_timers());
    }

    #[test]
    fn test_teardown_releases_everything() {
        let (rt, stub, _console) = fixture();
        let arg = ScriptHandle::adopt(rt.engine(), stub.text("arg"));
        let callback = ScriptHandle::adopt(rt.engine(), stub.number(1.0));
        rt.queue_call(callback.clone(), vec![arg]);
        rt.set_timeout(TimerHandler::Function(callback), Vec::new(), 100);

        assert!(stub.live_values() > 0);
        rt.teardown();
        assert_eq!(stub.live_values(), 0);
    }
}
