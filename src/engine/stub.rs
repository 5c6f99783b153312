//! In-memory engine double
//!
//! [`StubEngine`] implements the [`ScriptEngine`] boundary over a slab of
//! reference-counted values, with native Rust closures standing in for
//! script functions and an explicit job queue standing in for the promise
//! reaction queue. The test suite drives the whole event loop through it,
//! and a desktop host can use it to exercise loop integration before a
//! real engine port exists.
//!
//! "Compilation" understands just enough of a toy grammar to exercise the
//! interactive paths: a numeric literal evaluates to that number, a
//! `throw <text>` line evaluates to a thrown value, a line starting with
//! `!` fails to compile, and anything else evaluates to its own text.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use super::{
    Completion, ErrorDetails, JobsOutcome, RawScriptValue, RejectionNotice, RejectionOp,
    ScriptEngine,
};

/// Native closure standing in for a script function.
///
/// Arguments are borrowed for the call; the returned value (either side)
/// must be counted for the caller, which every [`StubEngine`] constructor
/// already guarantees. A closure that returns one of its arguments must
/// acquire it first.
pub type NativeFn = Rc<dyn Fn(&[RawScriptValue]) -> Completion>;

enum StubValue {
    Number(f64),
    Text(String),
    Function(NativeFn),
    Error {
        message: String,
        frame: Option<String>,
        error_object: bool,
    },
    Promise {
        result: Option<RawScriptValue>,
    },
    Script {
        name: String,
        source: String,
    },
}

struct Slot {
    refs: u32,
    value: StubValue,
}

struct StubJob {
    func: RawScriptValue,
    args: Vec<RawScriptValue>,
}

#[derive(Default)]
struct StubInner {
    slots: Vec<Option<Slot>>,
    free: Vec<usize>,
    jobs: VecDeque<StubJob>,
    notices: Vec<RejectionNotice>,
    globals: FxHashMap<String, RawScriptValue>,
}

/// Reference-counted in-memory script engine.
#[derive(Default)]
pub struct StubEngine {
    inner: RefCell<StubInner>,
}

const UNDEFINED: RawScriptValue = RawScriptValue(0);

impl StubEngine {
    /// Create an empty engine.
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc(&self, value: StubValue) -> RawScriptValue {
        let mut inner = self.inner.borrow_mut();
        let slot = Slot { refs: 1, value };
        match inner.free.pop() {
            Some(index) => {
                inner.slots[index] = Some(slot);
                RawScriptValue(index as u64 + 1)
            }
            None => {
                inner.slots.push(Some(slot));
                RawScriptValue(inner.slots.len() as u64)
            }
        }
    }

    /// Allocate a number value.
    pub fn number(&self, n: f64) -> RawScriptValue {
        self.alloc(StubValue::Number(n))
    }

    /// Allocate a text value.
    pub fn text(&self, s: &str) -> RawScriptValue {
        self.alloc(StubValue::Text(s.to_string()))
    }

    /// Allocate a function value backed by a native closure.
    pub fn function<F>(&self, f: F) -> RawScriptValue
    where
        F: Fn(&[RawScriptValue]) -> Completion + 'static,
    {
        self.alloc(StubValue::Function(Rc::new(f)))
    }

    /// Allocate an error value for a proper Error object. The message
    /// should carry the error name (`"TypeError: ..."`).
    pub fn error(&self, message: &str) -> RawScriptValue {
        self.alloc(StubValue::Error {
            message: message.to_string(),
            frame: None,
            error_object: true,
        })
    }

    /// Allocate an error value with a recorded backtrace frame.
    pub fn error_at(&self, message: &str, frame: &str) -> RawScriptValue {
        self.alloc(StubValue::Error {
            message: message.to_string(),
            frame: Some(frame.to_string()),
            error_object: true,
        })
    }

    /// Allocate an error value for a thrown non-Error value.
    pub fn plain_throw(&self, message: &str) -> RawScriptValue {
        self.alloc(StubValue::Error {
            message: message.to_string(),
            frame: None,
            error_object: false,
        })
    }

    /// Allocate a pending promise record.
    pub fn promise(&self) -> RawScriptValue {
        self.alloc(StubValue::Promise { result: None })
    }

    /// Reject a promise and emit the reject-without-handler notification.
    pub fn reject(&self, promise: RawScriptValue, reason: RawScriptValue) {
        let mut inner = self.inner.borrow_mut();
        inner.bump(reason);
        let replaced = match inner.value_mut(promise) {
            Some(StubValue::Promise { result }) => Ok(result.replace(reason)),
            _ => Err(()),
        };
        match replaced {
            Ok(old) => {
                if let Some(old) = old {
                    inner.unref(old);
                }
                inner.bump(promise);
                inner.notices.push(RejectionNotice {
                    op: RejectionOp::Rejected,
                    promise,
                });
            }
            Err(()) => inner.unref(reason),
        }
    }

    /// Emit the handled-after-rejection notification for a promise.
    pub fn mark_handled(&self, promise: RawScriptValue) {
        let mut inner = self.inner.borrow_mut();
        inner.bump(promise);
        inner.notices.push(RejectionNotice {
            op: RejectionOp::Handled,
            promise,
        });
    }

    /// Queue a job (promise reaction) for the next batch.
    pub fn queue_job(&self, func: RawScriptValue, args: &[RawScriptValue]) {
        let mut inner = self.inner.borrow_mut();
        inner.bump(func);
        for &arg in args {
            inner.bump(arg);
        }
        inner.jobs.push_back(StubJob {
            func,
            args: args.to_vec(),
        });
    }

    /// Look up a global binding. The returned value is counted for the
    /// caller.
    pub fn get_global(&self, name: &str) -> Option<RawScriptValue> {
        let mut inner = self.inner.borrow_mut();
        let value = inner.globals.get(name).copied();
        if let Some(value) = value {
            inner.bump(value);
        }
        value
    }

    /// Number of values currently alive. Zero after every host reference
    /// has been dropped and no job/global pins anything; the leak check
    /// the handle discipline tests rely on.
    pub fn live_values(&self) -> usize {
        self.inner
            .borrow()
            .slots
            .iter()
            .filter(|s| s.is_some())
            .count()
    }

    /// Drop all globals the engine is pinning (end-of-session cleanup).
    pub fn clear_globals(&self) {
        let globals: Vec<RawScriptValue> = {
            let mut inner = self.inner.borrow_mut();
            let taken = std::mem::take(&mut inner.globals);
            taken.into_values().collect()
        };
        let mut inner = self.inner.borrow_mut();
        for value in globals {
            inner.unref(value);
        }
    }

    fn eval_named(&self, source: &str, name: Option<&str>) -> Completion {
        let trimmed = source.trim();
        if let Ok(n) = trimmed.parse::<f64>() {
            return Ok(self.number(n));
        }
        if let Some(message) = trimmed.strip_prefix("throw ") {
            return Err(self.plain_throw(message.trim()));
        }
        if let Some(message) = trimmed.strip_prefix("fail ") {
            let message = format!("Error: {}", message.trim());
            return Err(match name {
                Some(name) => self.error_at(&message, &format!("{}:1", name)),
                None => self.error(&message),
            });
        }
        Ok(self.text(trimmed))
    }
}

impl StubInner {
    fn index(value: RawScriptValue) -> Option<usize> {
        if value == UNDEFINED {
            None
        } else {
            Some(value.0 as usize - 1)
        }
    }

    fn value_mut(&mut self, value: RawScriptValue) -> Option<&mut StubValue> {
        let index = Self::index(value)?;
        self.slots
            .get_mut(index)
            .and_then(|s| s.as_mut())
            .map(|s| &mut s.value)
    }

    fn value_ref(&self, value: RawScriptValue) -> Option<&StubValue> {
        let index = Self::index(value)?;
        self.slots
            .get(index)
            .and_then(|s| s.as_ref())
            .map(|s| &s.value)
    }

    fn bump(&mut self, value: RawScriptValue) {
        if let Some(index) = Self::index(value) {
            if let Some(Some(slot)) = self.slots.get_mut(index) {
                slot.refs += 1;
            }
        }
    }

    fn unref(&mut self, value: RawScriptValue) {
        let Some(index) = Self::index(value) else {
            return;
        };
        let freed = match self.slots.get_mut(index) {
            Some(Some(slot)) => {
                slot.refs -= 1;
                if slot.refs == 0 {
                    self.slots[index].take()
                } else {
                    None
                }
            }
            _ => None,
        };
        if let Some(slot) = freed {
            self.free.push(index);
            // a freed promise drops the reference it held on its result
            if let StubValue::Promise {
                result: Some(result),
            } = slot.value
            {
                self.unref(result);
            }
        }
    }
}

impl ScriptEngine for StubEngine {
    fn acquire(&self, value: RawScriptValue) -> RawScriptValue {
        self.inner.borrow_mut().bump(value);
        value
    }

    fn release(&self, value: RawScriptValue) {
        self.inner.borrow_mut().unref(value);
    }

    fn strict_equals(&self, a: RawScriptValue, b: RawScriptValue) -> bool {
        if a == b {
            return true;
        }
        let inner = self.inner.borrow();
        match (inner.value_ref(a), inner.value_ref(b)) {
            (Some(StubValue::Number(x)), Some(StubValue::Number(y))) => x == y,
            (Some(StubValue::Text(x)), Some(StubValue::Text(y))) => x == y,
            _ => false,
        }
    }

    fn undefined(&self) -> RawScriptValue {
        UNDEFINED
    }

    fn is_function(&self, value: RawScriptValue) -> bool {
        matches!(
            self.inner.borrow().value_ref(value),
            Some(StubValue::Function(_))
        )
    }

    fn is_error_value(&self, value: RawScriptValue) -> bool {
        matches!(
            self.inner.borrow().value_ref(value),
            Some(StubValue::Error { .. })
        )
    }

    fn call(
        &self,
        func: RawScriptValue,
        _this: RawScriptValue,
        args: &[RawScriptValue],
    ) -> Completion {
        let callable = match self.inner.borrow().value_ref(func) {
            Some(StubValue::Function(f)) => Some(f.clone()),
            _ => None,
        };
        match callable {
            // the borrow is released before the closure runs, so callbacks
            // may re-enter the engine freely
            Some(f) => f(args),
            None => Err(self.error("TypeError: value is not a function")),
        }
    }

    fn eval(&self, source: &str) -> Completion {
        self.eval_named(source, None)
    }

    fn compile(&self, name: &str, source: &str) -> RawScriptValue {
        let trimmed = source.trim();
        if let Some(rest) = trimmed.strip_prefix('!') {
            return self.error_at(
                &format!("SyntaxError: unexpected token '{}'", rest.trim()),
                &format!("{}:1", name),
            );
        }
        self.alloc(StubValue::Script {
            name: name.to_string(),
            source: source.to_string(),
        })
    }

    fn run_compiled(&self, script: RawScriptValue) -> Completion {
        let compiled = match self.inner.borrow().value_ref(script) {
            Some(StubValue::Script { name, source }) => Some((name.clone(), source.clone())),
            _ => None,
        };
        match compiled {
            Some((name, source)) => self.eval_named(&source, Some(&name)),
            None => Err(self.error("TypeError: value is not a script")),
        }
    }

    fn run_jobs(&self) -> JobsOutcome {
        let mut ran = false;
        loop {
            let job = self.inner.borrow_mut().jobs.pop_front();
            let Some(job) = job else {
                return JobsOutcome { ran, error: None };
            };
            ran = true;
            let completion = self.call(job.func, UNDEFINED, &job.args);
            {
                let mut inner = self.inner.borrow_mut();
                inner.unref(job.func);
                for arg in job.args {
                    inner.unref(arg);
                }
            }
            match completion {
                Ok(value) => self.release(value),
                Err(error) => {
                    return JobsOutcome {
                        ran,
                        error: Some(error),
                    }
                }
            }
        }
    }

    fn take_rejection_notices(&self) -> Vec<RejectionNotice> {
        std::mem::take(&mut self.inner.borrow_mut().notices)
    }

    fn promise_result(&self, promise: RawScriptValue) -> RawScriptValue {
        let mut inner = self.inner.borrow_mut();
        let result = match inner.value_ref(promise) {
            Some(StubValue::Promise {
                result: Some(result),
            }) => *result,
            _ => return UNDEFINED,
        };
        inner.bump(result);
        result
    }

    fn error_details(&self, error: RawScriptValue) -> ErrorDetails {
        match self.inner.borrow().value_ref(error) {
            Some(StubValue::Error {
                message,
                frame,
                error_object,
            }) => ErrorDetails {
                message: message.clone(),
                is_error_object: *error_object,
                frame: frame.clone(),
            },
            _ => ErrorDetails {
                message: self.display_value(error),
                is_error_object: false,
                frame: None,
            },
        }
    }

    fn display_value(&self, value: RawScriptValue) -> String {
        if value == UNDEFINED {
            return "undefined".to_string();
        }
        match self.inner.borrow().value_ref(value) {
            Some(StubValue::Number(n)) => {
                if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{}", n)
                }
            }
            Some(StubValue::Text(s)) => s.clone(),
            Some(StubValue::Function(_)) => "[function]".to_string(),
            Some(StubValue::Error { message, .. }) => message.clone(),
            Some(StubValue::Promise { .. }) => "[promise]".to_string(),
            Some(StubValue::Script { name, .. }) => format!("[script {}]", name),
            None => "<released>".to_string(),
        }
    }

    fn set_global(&self, name: &str, value: RawScriptValue) {
        let mut inner = self.inner.borrow_mut();
        inner.bump(value);
        if let Some(old) = inner.globals.insert(name.to_string(), value) {
            inner.unref(old);
        }
    }
}
