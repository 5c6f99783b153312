//! Shared fixtures for the integration tests

use std::cell::RefCell;
use std::rc::Rc;

use cinnabar::console::BufferConsole;
use cinnabar::engine::stub::StubEngine;
use cinnabar::Runtime;

/// A runtime wired to a stub engine and a capturing console.
pub struct Fixture {
    pub rt: Runtime,
    pub stub: Rc<StubEngine>,
    pub console: BufferConsole,
}

pub fn fixture() -> Fixture {
    let stub = Rc::new(StubEngine::new());
    let console = BufferConsole::new();
    let rt = Runtime::with_console(stub.clone(), Rc::new(RefCell::new(console.clone())));
    Fixture { rt, stub, console }
}
