//! Error types for the Cinnabar host runtime
//!
//! Script-level failures are *engine values*, not Rust errors: a callback
//! that throws produces an error value that flows through the runtime's
//! reporting path and never unwinds as a native fault. The [`Error`] enum
//! here covers host-side failures only.

use std::fmt;
use thiserror::Error;

/// Position of an error inside a script source, recovered from the first
/// frame of an engine backtrace.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourcePosition {
    /// Source name the engine compiled the script under
    pub filename: Option<String>,
    /// Line number (1-indexed), when the frame carried one
    pub line: Option<u32>,
}

impl SourcePosition {
    /// Parse a backtrace frame of the form `"<filename>:<line>"`.
    ///
    /// The filename may itself contain colons; the line number is taken
    /// from the final colon-separated segment. A frame with no parseable
    /// line number keeps the whole string as the filename.
    pub fn parse_frame(frame: &str) -> Self {
        if let Some((name, number)) = frame.rsplit_once(':') {
            if let Ok(line) = number.trim().parse::<u32>() {
                return Self {
                    filename: Some(name.to_string()),
                    line: Some(line),
                };
            }
        }
        Self {
            filename: Some(frame.to_string()),
            line: None,
        }
    }

    /// True when neither a filename nor a line is known.
    pub fn is_empty(&self) -> bool {
        self.filename.is_none() && self.line.is_none()
    }
}

impl fmt::Display for SourcePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.filename, self.line) {
            (Some(name), Some(line)) => write!(f, "{}:{}", name, line),
            (Some(name), None) => write!(f, "{}", name),
            (None, Some(line)) => write!(f, "<unknown>:{}", line),
            (None, None) => write!(f, "<unknown>"),
        }
    }
}

/// Main error type for host-side failures
#[derive(Error, Debug)]
pub enum Error {
    /// IO error while loading a script source
    #[error("IOError: {source}")]
    IoError {
        #[from]
        source: std::io::Error,
    },

    /// Interactive shell front end could not be initialized
    #[error("ShellError: {0}")]
    ShellError(String),
}

/// Result type alias for Cinnabar
pub type Result<T> = std::result::Result<T, Error>;
