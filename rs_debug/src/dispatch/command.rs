/// Command lines, their outcomes and dispatch errors
use std::any::Any;
use std::io;

use thiserror::Error;

/// Result of one dispatched line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Back to the prompt
    Continue,
    /// Leave the dispatch loop
    Quit,
}

/// Why the dispatch loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The debugger asked to stop
    Quit,
    /// The remote terminal went away
    Disconnected,
}

/// A failure while dispatching one line; reported, never fatal to the session
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("{0:#}")]
    Command(#[from] anyhow::Error),

    #[error("Alias <{name}> requires {required} arguments, {given} given.")]
    AliasArguments {
        name: String,
        required: usize,
        given: usize,
    },

    #[error("{0}")]
    AliasFormat(String),

    #[error("{0}")]
    Io(#[from] io::Error),

    #[error("{0}")]
    Panic(String),
}

impl DispatchError {
    /// Short name of the failure shown in front of the message
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::Command(_) => "CommandError",
            DispatchError::AliasArguments { .. } | DispatchError::AliasFormat(_) => "AliasError",
            DispatchError::Io(_) => "IoError",
            DispatchError::Panic(_) => "Panic",
        }
    }

    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        DispatchError::Panic(message)
    }

    /// The single line printed for this error
    pub fn report(&self, line: &str) -> String {
        format!("{} in onecmd({:?}): {}", self.kind(), line, self)
    }
}

/// A tokenised command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLine {
    /// Leading identifier, empty when the line does not start with one
    pub command: String,
    /// The rest of the line, trimmed
    pub arg: String,
    /// The line after shorthand expansion
    pub line: String,
}

/// Split a line into command name and argument.
///
/// `?` is shorthand for `help` and `!` for `exec`.
pub fn parse_line(line: &str) -> ParsedLine {
    let line = line.trim();
    let line = if let Some(rest) = line.strip_prefix('?') {
        format!("help {rest}")
    } else if let Some(rest) = line.strip_prefix('!') {
        format!("exec {rest}")
    } else {
        line.to_string()
    };

    let end = line
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(line.len());
    ParsedLine {
        command: line[..end].to_string(),
        arg: line[end..].trim().to_string(),
        line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_command() {
        let parsed = parse_line("  break  app.py:12 ");
        assert_eq!(parsed.command, "break");
        assert_eq!(parsed.arg, "app.py:12");
        assert_eq!(parsed.line, "break  app.py:12");
    }

    #[test]
    fn test_parse_shorthands() {
        assert_eq!(parse_line("?where").command, "help");
        assert_eq!(parse_line("?where").arg, "where");

        let parsed = parse_line("!x = 1");
        assert_eq!(parsed.command, "exec");
        assert_eq!(parsed.arg, "x = 1");
    }

    #[test]
    fn test_parse_non_identifier_start() {
        let parsed = parse_line("x.y");
        assert_eq!(parsed.command, "x");
        assert_eq!(parsed.arg, ".y");

        let parsed = parse_line("(1+2)");
        assert_eq!(parsed.command, "");
        assert_eq!(parsed.arg, "(1+2)");

        assert_eq!(parse_line("").command, "");
    }

    #[test]
    fn test_report_names_kind_and_line() {
        let err = DispatchError::Command(anyhow::anyhow!("name 'y' is not defined"));
        assert_eq!(
            err.report("p y"),
            "CommandError in onecmd(\"p y\"): name 'y' is not defined"
        );

        let err = DispatchError::from_panic(Box::new("index out of bounds"));
        assert_eq!(err.report("p x[9]"), "Panic in onecmd(\"p x[9]\"): index out of bounds");
    }
}
