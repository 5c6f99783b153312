//! Cinnabar: a cooperative JavaScript event-loop host for handheld
//! homebrew runtimes
//!
//! Cinnabar is the host side of a scripted environment on a single-core,
//! no-OS device: it owns the macrotask queue, the `Event`/`EventTarget`
//! dispatch model, the timer scheduler with nested-delay clamping, and
//! the coordination of all three with the engine's microtask queue and
//! promise-rejection notifications. The scripting engine itself stays
//! behind the [`engine::ScriptEngine`] trait, and the device behind
//! [`hal::Hardware`], so the same loop runs against a real engine port on
//! hardware and against the in-crate doubles on a desk.
//!
//! # Quick Start
//!
//! ```no_run
//! use cinnabar::engine::stub::StubEngine;
//! use cinnabar::hal::sim::SimHardware;
//! use cinnabar::Runtime;
//! use std::rc::Rc;
//!
//! let runtime = Runtime::new(Rc::new(StubEngine::new()));
//! runtime.queue_source("main.js", "1 + 1");
//! let mut hardware = SimHardware::new();
//! runtime.run(&mut hardware, None);
//! ```
//!
//! # Module Overview
//!
//! One loop iteration per hardware vblank: input sampling → timer tick →
//! task execution (each task followed by a microtask drain and rejection
//! flush) → interactive line feed.
//!
//! | Category | Modules |
//! |----------|---------|
//! | **Core loop** | [`runtime`], [`tasks`], [`timers`], [`jobs`] |
//! | **Event model** | [`events`] |
//! | **Boundaries** | [`engine`], [`hal`], [`console`], [`shell`] |
//! | **Support** | [`error`](Error), [`prelude`] |

pub mod console;
pub mod engine;
pub mod error;
pub mod events;
pub mod hal;
pub mod jobs;
pub mod prelude;
pub mod runtime;
pub mod shell;
pub mod tasks;
pub mod timers;

pub use console::{BufferConsole, ConsoleSink, StdoutConsole};
pub use error::{Error, Result, SourcePosition};
pub use events::{DependentEvents, Event, EventDetail, EventTarget, ListenerCallback};
pub use runtime::{LoopStats, Runtime};
pub use timers::{TimerHandler, TimerId};

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
