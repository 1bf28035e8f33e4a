/// The interactive read-dispatch loop
use std::panic::{AssertUnwindSafe, catch_unwind};

use tracing::{debug, info, warn};

use crate::debugger::DebuggerCore;
use crate::dispatch::{CommandOutcome, DispatchError, Magic, SessionEnd, parse_line};
use crate::session::Session;
use crate::stdio::StdioRedirect;

const MAGIC_SIGIL: char = '%';
const CELL_MAGIC_UNSUPPORTED: &str = "Cell magics (multiline) are not yet supported. Use a single '%' instead.";

/// Reads lines from the session and routes them to the local registry,
/// the debugger core or its magics.
pub struct Dispatcher<'a> {
    session: &'a Session,
    core: &'a mut dyn DebuggerCore,
    redirect_stdio: bool,
}

impl<'a> Dispatcher<'a> {
    pub fn new(session: &'a Session, core: &'a mut dyn DebuggerCore) -> Self {
        Self {
            session,
            core,
            redirect_stdio: true,
        }
    }

    /// Whether process stdout/stderr go to the session while a line runs
    pub fn redirect_stdio(mut self, enabled: bool) -> Self {
        self.redirect_stdio = enabled;
        self
    }

    /// Prompt, read, dispatch until the core quits or the terminal hangs up
    pub fn run(&mut self) -> SessionEnd {
        info!("Dispatch loop started");
        loop {
            if let Err(e) = self.session.console().write_raw(&self.session.prompt()) {
                debug!("Dispatch: failed to write prompt: {}", e);
            }
            let line = match self.session.read_line() {
                Ok(Some(line)) => line,
                Ok(None) => {
                    info!("Dispatch loop ended: terminal disconnected");
                    return SessionEnd::Disconnected;
                }
                Err(e) => {
                    warn!("Dispatch loop ended: failed to read input: {}", e);
                    return SessionEnd::Disconnected;
                }
            };
            if self.onecmd(&line) == CommandOutcome::Quit {
                info!("Dispatch loop ended: quit");
                return SessionEnd::Quit;
            }
        }
    }

    /// Dispatch one line; errors and panics are reported, never propagated
    pub fn onecmd(&mut self, line: &str) -> CommandOutcome {
        let line = line.trim();
        self.session.set_current_command(Some(line));
        let _redirect = self.redirect();

        let result = match catch_unwind(AssertUnwindSafe(|| self.dispatch(line))) {
            Ok(result) => result,
            Err(payload) => Err(DispatchError::from_panic(payload)),
        };
        self.session.set_current_command(None);

        match result {
            Ok(outcome) => outcome,
            Err(e) => {
                debug!("Dispatch: {} failed: {}", line, e);
                self.session.error(e.report(line));
                CommandOutcome::Continue
            }
        }
    }

    fn redirect(&self) -> Option<StdioRedirect> {
        if !self.redirect_stdio {
            return None;
        }
        let target = match self.session.console().try_clone_fd() {
            Ok(Some(fd)) => fd,
            Ok(None) => return None,
            Err(e) => {
                warn!("Dispatch: cannot redirect stdio: {}", e);
                return None;
            }
        };
        match StdioRedirect::stdio_to(&target) {
            Ok(redirect) => Some(redirect),
            Err(e) => {
                warn!("Dispatch: cannot redirect stdio: {}", e);
                None
            }
        }
    }

    fn dispatch(&mut self, line: &str) -> Result<CommandOutcome, DispatchError> {
        if let Some(magic) = line.strip_prefix(MAGIC_SIGIL) {
            if magic.starts_with(MAGIC_SIGIL) {
                self.session.error(CELL_MAGIC_UNSUPPORTED);
                return Ok(CommandOutcome::Continue);
            }
            return self.run_magic(magic);
        }
        Ok(self.core.execute(line, self.session)?)
    }

    /// Resolve `%name`: session commands, then the core's commands, then its magics
    fn run_magic(&mut self, text: &str) -> Result<CommandOutcome, DispatchError> {
        let parsed = parse_line(text);
        let name = parsed.command.as_str();

        if let Some(handler) = self.session.commands().get(name) {
            return handler(self.session, &mut *self.core, &parsed.arg);
        }
        if self.core.has_command(name) {
            return Ok(self.core.execute(&parsed.line, self.session)?);
        }

        match self.core.line_magic(name) {
            None => self.session.error(format!("Line Magic %{name} not found")),
            Some(Magic::Alias(alias)) => {
                let output = alias.run(&parsed.arg)?;
                if !output.stdout.is_empty() {
                    self.session.message(output.stdout);
                }
                if !output.stderr.is_empty() {
                    self.session.error(output.stderr);
                }
            }
            Some(Magic::Function(function)) => {
                if let Some(result) = function(&parsed.arg)? {
                    self.session.message(result);
                }
            }
        }
        Ok(CommandOutcome::Continue)
    }
}
