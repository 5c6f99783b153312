//! Console output sink
//!
//! The runtime reports values and uncaught errors through a [`ConsoleSink`]
//! rather than writing to stdout directly, so a device port can route text
//! to its own renderer. [`StdoutConsole`] is the desktop implementation;
//! [`BufferConsole`] captures output for deterministic assertions.

use std::cell::RefCell;
use std::rc::Rc;

/// Destination for user-visible runtime output.
pub trait ConsoleSink {
    /// Print a plain line (REPL results, `.help` text).
    fn line(&mut self, text: &str);

    /// Print an error line. Implementations typically style these
    /// differently (a device console might switch palette colors).
    fn error_line(&mut self, text: &str);
}

/// Shared, cheaply clonable console handle.
pub type ConsoleRef = Rc<RefCell<dyn ConsoleSink>>;

/// Console that writes to the process stdout/stderr.
#[derive(Debug, Default)]
pub struct StdoutConsole;

impl ConsoleSink for StdoutConsole {
    fn line(&mut self, text: &str) {
        println!("{}", text);
    }

    fn error_line(&mut self, text: &str) {
        eprintln!("{}", text);
    }
}

/// Console that records every line, for tests and headless hosts.
#[derive(Debug, Default, Clone)]
pub struct BufferConsole {
    lines: Rc<RefCell<Vec<ConsoleLine>>>,
}

/// A single captured console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleLine {
    /// Whether the line went through the error channel
    pub is_error: bool,
    /// The printed text
    pub text: String,
}

impl BufferConsole {
    /// Create an empty capture buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// All captured lines, in print order.
    pub fn lines(&self) -> Vec<ConsoleLine> {
        self.lines.borrow().clone()
    }

    /// Only the error-channel lines.
    pub fn error_lines(&self) -> Vec<String> {
        self.lines
            .borrow()
            .iter()
            .filter(|l| l.is_error)
            .map(|l| l.text.clone())
            .collect()
    }

    /// Only the plain lines.
    pub fn plain_lines(&self) -> Vec<String> {
        self.lines
            .borrow()
            .iter()
            .filter(|l| !l.is_error)
            .map(|l| l.text.clone())
            .collect()
    }
}

impl ConsoleSink for BufferConsole {
    fn line(&mut self, text: &str) {
        self.lines.borrow_mut().push(ConsoleLine {
            is_error: false,
            text: text.to_string(),
        });
    }

    fn error_line(&mut self, text: &str) {
        self.lines.borrow_mut().push(ConsoleLine {
            is_error: true,
            text: text.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_console_separates_channels() {
        let console = BufferConsole::new();
        let mut sink = console.clone();
        sink.line("hello");
        sink.error_line("boom");
        assert_eq!(console.plain_lines(), vec!["hello".to_string()]);
        assert_eq!(console.error_lines(), vec!["boom".to_string()]);
        assert_eq!(console.lines().len(), 2);
    }
}
