//! Event and EventTarget model
//!
//! Implements the capture-less, single-phase dispatch used by the hosted
//! environment: listeners live in per-target, per-type insertion-ordered
//! sequences, and dispatch walks an immutable snapshot of the sequence
//! while removals take effect through a `removed` tombstone. A listener
//! added during dispatch is therefore never observed by the dispatch that
//! added it, and a listener removed by an earlier listener never fires.
//!
//! The global target additionally maintains the [`DependentEvents`] mask:
//! one bit per input-derived event type, set while at least one listener
//! of that type is registered. The driver consults the mask before
//! synthesizing input events, so events nobody listens for are never
//! allocated in the first place.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use bitflags::bitflags;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::engine::ScriptHandle;
use crate::error::SourcePosition;
use crate::runtime::Runtime;

bitflags! {
    /// Input-derived event types the driver will only synthesize while a
    /// listener is present on the global target.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DependentEvents: u8 {
        const VBLANK      = 1 << 0;
        const BUTTON_DOWN = 1 << 1;
        const BUTTON_UP   = 1 << 2;
        const TOUCH_START = 1 << 3;
        const TOUCH_MOVE  = 1 << 4;
        const TOUCH_END   = 1 << 5;
        const KEY_DOWN    = 1 << 6;
        const KEY_UP      = 1 << 7;
    }
}

impl DependentEvents {
    /// The mask bit for an event type, if that type is driver-synthesized.
    pub fn for_event_type(event_type: &str) -> Option<Self> {
        match event_type {
            "vblank" => Some(Self::VBLANK),
            "buttondown" => Some(Self::BUTTON_DOWN),
            "buttonup" => Some(Self::BUTTON_UP),
            "touchstart" => Some(Self::TOUCH_START),
            "touchmove" => Some(Self::TOUCH_MOVE),
            "touchend" => Some(Self::TOUCH_END),
            "keydown" => Some(Self::KEY_DOWN),
            "keyup" => Some(Self::KEY_UP),
            _ => None,
        }
    }
}

/// Structured payload of an event, consumed by native listeners and by
/// bindings that materialize the engine-side event object.
#[derive(Debug, Clone)]
pub enum EventDetail {
    /// No payload
    None,
    /// A face button went down or up
    Button {
        /// Script-visible button name (`"A"`, `"Up"`, `"START"`, ...)
        button: &'static str,
    },
    /// A composition-keyboard key went down or up
    Key {
        key: String,
        code: String,
        shifted: bool,
        repeat: bool,
    },
    /// Stylus contact began, moved or ended
    Touch {
        x: i32,
        y: i32,
        /// Movement since the previous sample; only present for moves
        delta: Option<(i32, i32)>,
    },
    /// An uncaught script error is being reported
    Error {
        message: String,
        position: SourcePosition,
        error: ScriptHandle,
    },
    /// An unhandled promise rejection is being reported
    Rejection {
        promise: ScriptHandle,
        reason: ScriptHandle,
    },
}

struct EventInner {
    event_type: String,
    cancelable: bool,
    default_prevented: bool,
    stop_immediate: bool,
    target: Option<EventTarget>,
    time_stamp: u64,
    detail: EventDetail,
    object: Option<ScriptHandle>,
}

/// A short-lived event, created per dispatch.
///
/// Cheaply clonable handle; clones share state, so a listener holding a
/// clone observes `preventDefault` calls made by later listeners.
#[derive(Clone)]
pub struct Event {
    inner: Rc<RefCell<EventInner>>,
}

impl Event {
    /// Create an event with no timestamp. Prefer
    /// [`Runtime::create_event`] which stamps the current hardware tick.
    pub fn new(event_type: &str, cancelable: bool, detail: EventDetail) -> Self {
        Self {
            inner: Rc::new(RefCell::new(EventInner {
                event_type: event_type.to_string(),
                cancelable,
                default_prevented: false,
                stop_immediate: false,
                target: None,
                time_stamp: 0,
                detail,
                object: None,
            })),
        }
    }

    /// Stamp the event with a hardware tick count.
    pub fn with_time_stamp(self, ticks: u64) -> Self {
        self.inner.borrow_mut().time_stamp = ticks;
        self
    }

    /// Attach the engine-side event object bindings constructed, passed as
    /// the listener argument for script callbacks.
    pub fn with_object(self, object: ScriptHandle) -> Self {
        self.inner.borrow_mut().object = Some(object);
        self
    }

    /// The event type string.
    pub fn event_type(&self) -> String {
        self.inner.borrow().event_type.clone()
    }

    /// Whether `prevent_default` has any effect.
    pub fn cancelable(&self) -> bool {
        self.inner.borrow().cancelable
    }

    /// Whether a listener canceled the default action.
    pub fn default_prevented(&self) -> bool {
        self.inner.borrow().default_prevented
    }

    /// Cancel the default action. No-op unless the event is cancelable.
    pub fn prevent_default(&self) {
        let mut inner = self.inner.borrow_mut();
        if inner.cancelable {
            inner.default_prevented = true;
        }
    }

    /// Skip the remaining listeners of the current dispatch. Does not
    /// persist across redispatch.
    pub fn stop_immediate_propagation(&self) {
        self.inner.borrow_mut().stop_immediate = true;
    }

    /// The target, attached only for the duration of a dispatch.
    pub fn target(&self) -> Option<EventTarget> {
        self.inner.borrow().target.clone()
    }

    /// Hardware tick count at creation.
    pub fn time_stamp(&self) -> u64 {
        self.inner.borrow().time_stamp
    }

    /// A copy of the structured payload.
    pub fn detail(&self) -> EventDetail {
        self.inner.borrow().detail.clone()
    }

    /// The engine-side event object, if bindings attached one.
    pub fn object(&self) -> Option<ScriptHandle> {
        self.inner.borrow().object.clone()
    }

    fn stop_immediate(&self) -> bool {
        self.inner.borrow().stop_immediate
    }

    fn set_target(&self, target: Option<EventTarget>) {
        self.inner.borrow_mut().target = target;
    }

    fn reset_after_dispatch(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.target = None;
        inner.stop_immediate = false;
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Event")
            .field("type", &inner.event_type)
            .field("cancelable", &inner.cancelable)
            .field("default_prevented", &inner.default_prevented)
            .finish()
    }
}

/// A registered listener callback: either an engine function or a native
/// host closure. Identity (for duplicate suppression and removal) is the
/// engine's strict equality for script callbacks and pointer identity for
/// native ones.
#[derive(Clone)]
pub enum ListenerCallback {
    /// Engine function, invoked with the event's engine-side object
    Script(ScriptHandle),
    /// Host closure, invoked with the host-side event
    Native(Rc<dyn Fn(&Runtime, &Event)>),
}

impl ListenerCallback {
    /// Wrap a host closure.
    pub fn native<F>(f: F) -> Self
    where
        F: Fn(&Runtime, &Event) + 'static,
    {
        Self::Native(Rc::new(f))
    }

    fn same(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Script(a), Self::Script(b)) => a.is_same(b),
            (Self::Native(a), Self::Native(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for ListenerCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Script(handle) => f.debug_tuple("Script").field(handle).finish(),
            Self::Native(_) => f.write_str("Native"),
        }
    }
}

pub(crate) struct Listener {
    pub(crate) callback: ListenerCallback,
    pub(crate) once: bool,
    pub(crate) removed: bool,
}

type ListenerEntry = Rc<RefCell<Listener>>;

#[derive(Default)]
struct TargetInner {
    listeners: FxHashMap<String, Vec<ListenerEntry>>,
}

/// An object listeners can be attached to.
///
/// Cheaply clonable handle; clones address the same listener table.
#[derive(Clone, Default)]
pub struct EventTarget {
    inner: Rc<RefCell<TargetInner>>,
}

pub(crate) struct AddOutcome {
    pub added: bool,
    pub first_of_type: bool,
}

pub(crate) struct RemoveOutcome {
    pub removed: bool,
    pub last_of_type: bool,
}

impl EventTarget {
    /// Create a target with no listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether at least one live listener of `event_type` is registered.
    pub fn has_listeners(&self, event_type: &str) -> bool {
        self.inner
            .borrow()
            .listeners
            .get(event_type)
            .is_some_and(|entries| !entries.is_empty())
    }

    pub(crate) fn same_target(&self, other: &EventTarget) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Append a listener unless an identical callback is already
    /// registered for the type.
    pub(crate) fn add(
        &self,
        event_type: &str,
        callback: ListenerCallback,
        once: bool,
    ) -> AddOutcome {
        let mut inner = self.inner.borrow_mut();
        let entries = inner.listeners.entry(event_type.to_string()).or_default();
        let duplicate = entries
            .iter()
            .any(|entry| entry.borrow().callback.same(&callback));
        if duplicate {
            return AddOutcome {
                added: false,
                first_of_type: false,
            };
        }
        let first_of_type = entries.is_empty();
        entries.push(Rc::new(RefCell::new(Listener {
            callback,
            once,
            removed: false,
        })));
        AddOutcome {
            added: true,
            first_of_type,
        }
    }

    /// Tombstone and splice out the first live listener matching the
    /// callback.
    pub(crate) fn remove(&self, event_type: &str, callback: &ListenerCallback) -> RemoveOutcome {
        let mut inner = self.inner.borrow_mut();
        let Some(entries) = inner.listeners.get_mut(event_type) else {
            return RemoveOutcome {
                removed: false,
                last_of_type: false,
            };
        };
        let Some(index) = entries
            .iter()
            .position(|entry| entry.borrow().callback.same(callback))
        else {
            return RemoveOutcome {
                removed: false,
                last_of_type: false,
            };
        };
        let entry = entries.remove(index);
        entry.borrow_mut().removed = true;
        RemoveOutcome {
            removed: true,
            last_of_type: entries.is_empty(),
        }
    }

    /// Tombstone and splice out a specific entry (the `once` path).
    fn splice_entry(&self, event_type: &str, entry: &ListenerEntry) {
        let mut inner = self.inner.borrow_mut();
        if let Some(entries) = inner.listeners.get_mut(event_type) {
            entries.retain(|candidate| !Rc::ptr_eq(candidate, entry));
        }
        entry.borrow_mut().removed = true;
    }

    /// Shallow copy of the live sequence for `event_type` at this instant.
    fn snapshot(&self, event_type: &str) -> Vec<ListenerEntry> {
        self.inner
            .borrow()
            .listeners
            .get(event_type)
            .cloned()
            .unwrap_or_default()
    }
}

impl fmt::Debug for EventTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EventTarget")
    }
}

/// Run all listeners of `event.type` registered on `target`, in insertion
/// order, over a snapshot taken at entry.
///
/// When `sync` is false a full microtask drain runs after each listener
/// returns, reproducing task-boundary job ordering even though dispatch is
/// not itself a task boundary. Script code dispatching synchronously must
/// pass `sync = true`.
///
/// Returns whether a listener canceled the event.
pub(crate) fn dispatch(rt: &Runtime, target: &EventTarget, event: &Event, sync: bool) -> bool {
    let event_type = event.event_type();
    debug!(event_type = %event_type, sync, "dispatch");
    rt.note_event_dispatched();

    event.set_target(Some(target.clone()));
    let snapshot = target.snapshot(&event_type);

    for entry in snapshot {
        if rt.aborted() || event.stop_immediate() {
            break;
        }
        let (callback, once, removed) = {
            let listener = entry.borrow();
            (listener.callback.clone(), listener.once, listener.removed)
        };
        if removed {
            continue;
        }
        if once {
            // removal precedes invocation so a re-entrant dispatch from
            // inside the callback can never fire it a second time
            target.splice_entry(&event_type, &entry);
        }
        rt.note_listener_invoked();
        match &callback {
            ListenerCallback::Script(handle) => {
                let engine = rt.engine();
                let argument = event
                    .object()
                    .map(|object| object.raw())
                    .unwrap_or_else(|| engine.undefined());
                let completion = engine.call(handle.raw(), engine.undefined(), &[argument]);
                if rt.aborted() {
                    match completion {
                        Ok(value) => engine.release(value),
                        Err(error) => engine.release(error),
                    }
                } else {
                    if !sync {
                        rt.drain_microtasks();
                    }
                    match completion {
                        Ok(value) => engine.release(value),
                        Err(error) => {
                            let error = ScriptHandle::adopt(engine, error);
                            rt.report_error_value(error, sync);
                        }
                    }
                }
            }
            ListenerCallback::Native(f) => {
                f(rt, event);
                if !rt.aborted() && !sync {
                    rt.drain_microtasks();
                }
            }
        }
    }

    event.reset_after_dispatch();
    event.default_prevented()
}
