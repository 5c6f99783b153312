//! Interactive shell front end
//!
//! The driver only knows the [`LineEditor`] trait: "is a composed line
//! ready, and if so hand it over". On the device that is the on-screen
//! keyboard's compose buffer; on desktop hosts [`TerminalEditor`] runs
//! rustyline on a reader thread and feeds lines through a channel so the
//! loop never blocks on the terminal. [`ScriptedEditor`] replays a fixed
//! line sequence for tests.
//!
//! Dot-commands (`.help`, `.exit`, `.stats`) are intercepted by the
//! driver before anything reaches the engine.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::mpsc::{Receiver, Sender, TryRecvError};
use std::thread;

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::debug;

use crate::error::{Error, Result};

/// Non-blocking source of composed input lines.
pub trait LineEditor {
    /// Take ownership of the next composed line, if one is ready.
    fn poll_line(&mut self) -> Option<String>;
}

/// A dot-command the driver handles itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ShellCommand {
    Help,
    Exit,
    Stats,
}

pub(crate) const HELP_LINES: &[&str] = &[
    ".help   show this help",
    ".stats  print event loop counters as JSON",
    ".exit   leave the shell",
];

/// Recognize a dot-command. Unrecognized lines (dotted or not) go to the
/// engine as source.
pub(crate) fn parse_command(line: &str) -> Option<ShellCommand> {
    match line {
        ".help" | ".h" => Some(ShellCommand::Help),
        ".exit" | ".quit" | ".q" => Some(ShellCommand::Exit),
        ".stats" => Some(ShellCommand::Stats),
        _ => None,
    }
}

/// Terminal shell configuration.
#[derive(Debug, Clone)]
pub struct ShellConfig {
    /// History file path, `None` to keep history in memory only
    pub history_file: Option<PathBuf>,
    /// Maximum history entries
    pub history_size: usize,
    /// Prompt string
    pub prompt: String,
}

impl Default for ShellConfig {
    fn default() -> Self {
        let history_file = home_dir().map(|home| home.join(".cinnabar_history"));
        Self {
            history_file,
            history_size: 1000,
            prompt: "> ".to_string(),
        }
    }
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
}

/// Editor that replays a predetermined line sequence, one per poll.
#[derive(Debug, Default)]
pub struct ScriptedEditor {
    lines: VecDeque<String>,
}

impl ScriptedEditor {
    /// Empty editor; lines are appended with [`push_line`](Self::push_line).
    pub fn new() -> Self {
        Self::default()
    }

    /// Editor preloaded with lines.
    pub fn with_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }

    /// Append a line to be returned by a later poll.
    pub fn push_line(&mut self, line: &str) {
        self.lines.push_back(line.to_string());
    }

    /// Lines not yet consumed.
    pub fn pending(&self) -> usize {
        self.lines.len()
    }
}

impl LineEditor for ScriptedEditor {
    fn poll_line(&mut self) -> Option<String> {
        self.lines.pop_front()
    }
}

/// Rustyline-backed editor for desktop hosts.
///
/// Readline blocks, so it runs on its own thread; the loop side only ever
/// does a non-blocking channel poll. On end-of-input the reader emits a
/// final `.exit` so the loop winds down, then persists history.
pub struct TerminalEditor {
    receiver: Receiver<String>,
}

impl TerminalEditor {
    /// Start the reader thread.
    pub fn spawn(config: ShellConfig) -> Result<Self> {
        let (sender, receiver) = std::sync::mpsc::channel();
        let builder = rustyline::Config::builder()
            .max_history_size(config.history_size)
            .map_err(|error| Error::ShellError(error.to_string()))?
            .auto_add_history(false);
        let mut editor = DefaultEditor::with_config(builder.build())
            .map_err(|error| Error::ShellError(error.to_string()))?;
        if let Some(path) = &config.history_file {
            // a missing history file is normal on first run
            let _ = editor.load_history(path);
        }
        thread::Builder::new()
            .name("cinnabar-shell".to_string())
            .spawn(move || read_lines(editor, config, sender))?;
        Ok(Self { receiver })
    }
}

fn read_lines(mut editor: DefaultEditor, config: ShellConfig, sender: Sender<String>) {
    loop {
        match editor.readline(&config.prompt) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    let _ = editor.add_history_entry(line.as_str());
                }
                if sender.send(line).is_err() {
                    break;
                }
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => {
                let _ = sender.send(".exit".to_string());
                break;
            }
            Err(error) => {
                debug!(%error, "shell reader stopped");
                break;
            }
        }
    }
    if let Some(path) = &config.history_file {
        let _ = editor.save_history(path);
    }
}

impl LineEditor for TerminalEditor {
    fn poll_line(&mut self) -> Option<String> {
        match self.receiver.try_recv() {
            Ok(line) => Some(line),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command(".help"), Some(ShellCommand::Help));
        assert_eq!(parse_command(".h"), Some(ShellCommand::Help));
        assert_eq!(parse_command(".exit"), Some(ShellCommand::Exit));
        assert_eq!(parse_command(".q"), Some(ShellCommand::Exit));
        assert_eq!(parse_command(".stats"), Some(ShellCommand::Stats));
        assert_eq!(parse_command("1 + 1"), None);
        assert_eq!(parse_command(".unknown"), None);
    }

    #[test]
    fn test_scripted_editor_replays_in_order() {
        let mut editor = ScriptedEditor::with_lines(["first", "second"]);
        editor.push_line("third");
        assert_eq!(editor.poll_line().as_deref(), Some("first"));
        assert_eq!(editor.poll_line().as_deref(), Some("second"));
        assert_eq!(editor.poll_line().as_deref(), Some("third"));
        assert_eq!(editor.poll_line(), None);
    }

    #[test]
    fn test_default_config() {
        let config = ShellConfig::default();
        assert_eq!(config.prompt, "> ");
        assert_eq!(config.history_size, 1000);
    }
}
