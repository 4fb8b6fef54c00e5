//! Async readline input handling for the chat loop.
//!
//! Wraps `rustyline_async::Readline` so a line can be read while a turn is
//! still running, with EOF (Ctrl+D) and interrupt (Ctrl+C) surfaced as
//! events.

use rustyline_async::{Readline, ReadlineError, ReadlineEvent, SharedWriter};

/// Events produced by an input source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    /// User submitted a line.
    Line(String),
    /// End of file (Ctrl+D).
    Eof,
    /// Interrupt signal (Ctrl+C).
    Interrupted,
}

/// What a submitted line asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Exit,
    Clear,
    Message(String),
    Empty,
}

impl Command {
    /// `exit`, `quit` and `clear` are matched case-insensitively after trimming.
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        match trimmed.to_lowercase().as_str() {
            "" => Self::Empty,
            "exit" | "quit" => Self::Exit,
            "clear" => Self::Clear,
            _ => Self::Message(trimmed.to_string()),
        }
    }
}

/// Anything the chat loop can read lines from.
///
/// `next_event` must be cancel-safe: the loop drops a pending read whenever
/// a turn finishes first.
pub trait LineSource {
    async fn next_event(&mut self) -> InputEvent;
}

/// Terminal input backed by rustyline_async.
pub struct ChatInput {
    rl: Readline,
}

impl ChatInput {
    /// Create the input handler and a `SharedWriter` that prints without
    /// clobbering the prompt.
    pub fn new(prompt: String) -> Result<(Self, SharedWriter), ReadlineError> {
        let (rl, stdout) = Readline::new(prompt)?;
        Ok((Self { rl }, stdout))
    }

    /// Flush pending output before the process exits.
    pub fn flush(&mut self) {
        if let Err(e) = self.rl.flush() {
            tracing::warn!(error = %e, "Failed to flush terminal output");
        }
    }
}

impl LineSource for ChatInput {
    async fn next_event(&mut self) -> InputEvent {
        match self.rl.readline().await {
            Ok(ReadlineEvent::Line(line)) => {
                if !line.trim().is_empty() {
                    self.rl.add_history_entry(line.clone());
                }
                InputEvent::Line(line)
            }
            Ok(ReadlineEvent::Interrupted) => InputEvent::Interrupted,
            Ok(ReadlineEvent::Eof) | Err(_) => InputEvent::Eof,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands_are_case_insensitive() {
        assert_eq!(Command::parse("EXIT"), Command::Exit);
        assert_eq!(Command::parse("  Quit "), Command::Exit);
        assert_eq!(Command::parse("cLeAr"), Command::Clear);
        assert_eq!(Command::parse("   "), Command::Empty);
    }

    #[test]
    fn test_other_lines_are_messages() {
        assert_eq!(
            Command::parse("  clear my tasks  "),
            Command::Message("clear my tasks".into())
        );
        assert_eq!(Command::parse("exit!"), Command::Message("exit!".into()));
    }
}
