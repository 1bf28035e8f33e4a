/// Interface of the debugger implementation driven by a session
use crate::dispatch::{CommandOutcome, Magic};
use crate::session::Session;

/// A variable of the frame being debugged, already rendered to text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub name: String,
    pub value: String,
    pub type_name: String,
}

impl Variable {
    pub fn new(name: impl Into<String>, value: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            type_name: type_name.into(),
        }
    }

    /// Names starting with `__` are interpreter internals and never listed
    pub fn is_hidden(&self) -> bool {
        self.name.starts_with("__")
    }
}

/// One frame of the stack being debugged
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackEntry {
    pub filename: String,
    pub lineno: usize,
    pub function: String,
}

impl StackEntry {
    pub fn new(filename: impl Into<String>, lineno: usize, function: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            lineno,
            function: function.into(),
        }
    }
}

/// The debugger that owns stepping, breakpoints and frame inspection.
///
/// A session only routes lines to it and renders what it prints through the
/// session console. Any error returned is reported to the user and the
/// session continues.
pub trait DebuggerCore: Send {
    /// Interpret one non-magic command line
    fn execute(&mut self, line: &str, session: &Session) -> anyhow::Result<CommandOutcome>;

    /// Whether `name` is one of the core's own commands, reachable as `%name`
    fn has_command(&self, _name: &str) -> bool {
        false
    }

    /// Look up a line magic in the core's wider registry
    fn line_magic(&self, _name: &str) -> Option<Magic> {
        None
    }

    /// Variables of the current frame
    fn variables(&self) -> Vec<Variable> {
        Vec::new()
    }

    /// Describe the object an expression evaluates to
    fn inspect(&mut self, expression: &str, _all: bool) -> anyhow::Result<String> {
        anyhow::bail!("cannot inspect {expression:?}: not supported by this debugger")
    }
}
