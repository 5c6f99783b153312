//! Script engine boundary
//!
//! The runtime hosts an embeddable scripting engine but never looks inside
//! it: everything it needs is expressed by the [`ScriptEngine`] trait.
//! Values are opaque, engine-owned and reference-counted ids; the host
//! balances every count it takes with exactly one release, which the
//! [`ScriptHandle`](handle::ScriptHandle) wrapper enforces.
//!
//! Engines are single-threaded. Methods take `&self` because a production
//! implementation is typically a zero-sized adapter over a C engine's
//! global state; Rust implementations use interior mutability. The
//! [`stub::StubEngine`] in this crate is such an implementation, used by
//! the test suite and by desktop development hosts.

pub mod handle;
pub mod stub;

pub use handle::ScriptHandle;

use std::rc::Rc;

/// Opaque id of an engine-owned value.
///
/// A bare `RawScriptValue` carries no ownership: holding one does not keep
/// the value alive. Anything stored beyond the current call must go through
/// [`ScriptHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawScriptValue(pub u64);

/// Outcome of invoking engine code: the produced value, or the error value
/// the engine materialized for an uncaught throw. Both sides are counted
/// for the host and must be adopted.
pub type Completion = std::result::Result<RawScriptValue, RawScriptValue>;

/// Result of one job-queue batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobsOutcome {
    /// Whether any queued job ran during the batch
    pub ran: bool,
    /// Error value of the first job that threw, counted for the host.
    /// Jobs queued after the failing one remain queued.
    pub error: Option<RawScriptValue>,
}

impl JobsOutcome {
    /// Batch that found the queue empty.
    pub fn idle() -> Self {
        Self {
            ran: false,
            error: None,
        }
    }
}

/// Kind of promise-rejection notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionOp {
    /// A promise was rejected with no handler attached
    Rejected,
    /// A handler was attached to a previously rejected promise
    Handled,
}

/// A promise-rejection notification handed over by the engine.
/// The promise id is counted for the host.
#[derive(Debug, Clone, Copy)]
pub struct RejectionNotice {
    /// What happened
    pub op: RejectionOp,
    /// The promise concerned
    pub promise: RawScriptValue,
}

/// What the host needs to know about an error value to report it.
#[derive(Debug, Clone, Default)]
pub struct ErrorDetails {
    /// Human-readable message. For proper Error objects this includes the
    /// error name (`"TypeError: x is not a function"`); for arbitrary
    /// thrown values it is the value's string form.
    pub message: String,
    /// Whether the thrown value was a proper Error object
    pub is_error_object: bool,
    /// First backtrace frame as `"<filename>:<line>"`, when recorded
    pub frame: Option<String>,
}

/// The full engine interface the host consumes.
///
/// Reference-count contract: `&[RawScriptValue]` arguments are borrowed for
/// the duration of the call (the engine acquires internally if it stores
/// them); every `RawScriptValue` *returned* by a method is counted for the
/// host and must be released exactly once, normally by wrapping it in a
/// [`ScriptHandle`] via [`ScriptHandle::adopt`].
pub trait ScriptEngine {
    /// Add one reference to a value. Returns the same id for chaining.
    fn acquire(&self, value: RawScriptValue) -> RawScriptValue;

    /// Drop one reference to a value.
    fn release(&self, value: RawScriptValue);

    /// Strict (identity/value) equality, the engine's `===`.
    fn strict_equals(&self, a: RawScriptValue, b: RawScriptValue) -> bool;

    /// The engine's `undefined` singleton. Counting it is a no-op.
    fn undefined(&self) -> RawScriptValue;

    /// Whether the value is callable.
    fn is_function(&self, value: RawScriptValue) -> bool;

    /// Whether the value is an error value (a materialized uncaught throw).
    fn is_error_value(&self, value: RawScriptValue) -> bool;

    /// Call a function value with `this` and arguments.
    fn call(&self, func: RawScriptValue, this: RawScriptValue, args: &[RawScriptValue])
        -> Completion;

    /// Evaluate a source string (string timer handlers).
    fn eval(&self, source: &str) -> Completion;

    /// Compile a source under a name. Returns a runnable script value, or
    /// an error value when compilation fails; callers distinguish the two
    /// with [`is_error_value`](Self::is_error_value). Counted for the host.
    fn compile(&self, name: &str, source: &str) -> RawScriptValue;

    /// Run a previously compiled script value.
    fn run_compiled(&self, script: RawScriptValue) -> Completion;

    /// Run one batch of queued jobs (promise reactions). A batch stops at
    /// the first job that throws, leaving later jobs queued.
    fn run_jobs(&self) -> JobsOutcome;

    /// Take ownership of all rejection notifications accumulated since the
    /// last call.
    fn take_rejection_notices(&self) -> Vec<RejectionNotice>;

    /// The settled result of a promise. Counted for the host.
    fn promise_result(&self, promise: RawScriptValue) -> RawScriptValue;

    /// Details of an error value, for the reporting path.
    fn error_details(&self, error: RawScriptValue) -> ErrorDetails;

    /// Display form of a value, for console output.
    fn display_value(&self, value: RawScriptValue) -> String;

    /// Bind a global variable (the interactive shell's `_`).
    fn set_global(&self, name: &str, value: RawScriptValue);
}

/// Shared, cheaply clonable engine handle.
pub type EngineRef = Rc<dyn ScriptEngine>;
