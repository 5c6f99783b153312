//! Prelude module for convenient imports
//!
//! ```no_run
//! use cinnabar::prelude::*;
//! use std::rc::Rc;
//!
//! let runtime = Runtime::new(Rc::new(StubEngine::new()));
//! runtime.queue_source("main.js", "1 + 1");
//! ```

// Core runtime
pub use crate::runtime::{LoopStats, Runtime};

// Event model
pub use crate::events::{DependentEvents, Event, EventDetail, EventTarget, ListenerCallback};

// Timers
pub use crate::timers::{TimerHandler, TimerId};

// Engine boundary
pub use crate::engine::stub::StubEngine;
pub use crate::engine::{EngineRef, RawScriptValue, ScriptEngine, ScriptHandle};

// Hardware boundary
pub use crate::hal::sim::SimHardware;
pub use crate::hal::{Buttons, Hardware, InputSample, KeyChange, TouchPoint};

// Console and shell
pub use crate::console::{BufferConsole, ConsoleSink, StdoutConsole};
pub use crate::shell::{LineEditor, ScriptedEditor, ShellConfig, TerminalEditor};

// Error handling
pub use crate::error::{Error, Result, SourcePosition};

// Version constant
pub use crate::VERSION;
