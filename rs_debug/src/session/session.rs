/// State of the active debug session, bound to the PTY slave
use std::fmt::Display;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::os::fd::OwnedFd;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use nix::errno::Errno;
use tracing::{debug, info};

use crate::console::{Console, render};
use crate::debugger::StackEntry;
use crate::dispatch::CommandRegistry;
use crate::pty::{SharedSize, TerminalSize};

pub const DEFAULT_PROMPT: &str = "rs-debug> ";

const CLOSING_NOTICE: &str = "Closing connection";
const POST_MORTEM_NOTICE: &str = "Post-mortem debugging, the program stopped with:";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Everything the dispatch loop needs: line input from the slave, the styled
/// console on the slave, and per-session dispatch state.
///
/// Reads and writes take separate locks so a nested loop started from a
/// dispatched command can use the same session.
#[derive(Debug)]
pub struct Session {
    reader: Mutex<Option<BufReader<File>>>,
    console: Console,
    term_type: String,
    prompt: Mutex<String>,
    commands: CommandRegistry,
    current_command: Mutex<Option<String>>,
    skip_print_stack_entry: AtomicBool,
}

impl Session {
    pub fn new(slave: OwnedFd, term_type: String, size: SharedSize) -> io::Result<Self> {
        let reader = File::from(slave.try_clone()?);
        let writer = File::from(slave);
        Ok(Self {
            reader: Mutex::new(Some(BufReader::new(reader))),
            console: Console::new(writer, size),
            term_type,
            prompt: Mutex::new(DEFAULT_PROMPT.to_string()),
            commands: CommandRegistry::new(),
            current_command: Mutex::new(None),
            skip_print_stack_entry: AtomicBool::new(false),
        })
    }

    pub fn console(&self) -> &Console {
        &self.console
    }

    pub fn term_type(&self) -> &str {
        &self.term_type
    }

    pub fn terminal_size(&self) -> TerminalSize {
        self.console.size()
    }

    pub fn commands(&self) -> &CommandRegistry {
        &self.commands
    }

    pub fn prompt(&self) -> String {
        lock(&self.prompt).clone()
    }

    /// Set the prompt; a trailing space is added when missing
    pub fn set_prompt(&self, prompt: &str) {
        let mut prompt = prompt.to_string();
        if !prompt.ends_with(' ') {
            prompt.push(' ');
        }
        *lock(&self.prompt) = prompt;
    }

    pub fn current_command(&self) -> Option<String> {
        lock(&self.current_command).clone()
    }

    pub(crate) fn set_current_command(&self, line: Option<&str>) {
        *lock(&self.current_command) = line.map(str::to_string);
    }

    /// Block for the next input line, without its line terminator.
    ///
    /// Bytes that are not UTF-8 are replaced rather than rejected. `None`
    /// once the terminal has hung up or the session was closed.
    pub fn read_line(&self) -> io::Result<Option<String>> {
        let mut guard = lock(&self.reader);
        let Some(reader) = guard.as_mut() else {
            return Ok(None);
        };
        let mut raw = Vec::new();
        match reader.read_until(b'\n', &mut raw) {
            Ok(0) => Ok(None),
            Ok(_) => {
                let line = String::from_utf8_lossy(&raw);
                Ok(Some(line.trim_end_matches(['\n', '\r']).to_string()))
            }
            // the master went away
            Err(e) if e.raw_os_error() == Some(Errno::EIO as i32) => {
                debug!("Session: slave hung up");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    pub fn message(&self, text: impl Display) {
        self.console.message(text);
    }

    pub fn error(&self, text: impl Display) {
        self.console.error(text);
    }

    /// Command names in columns fitted to the remote terminal width
    pub fn print_topics(&self, header: &str, cmds: &[String]) {
        self.console.message(render::topics(header, cmds, self.console.width()));
    }

    /// Numbered listing of `first..=last` from `path`, marking `current`
    pub fn print_source(&self, path: &Path, first: usize, last: usize, current: Option<usize>) -> io::Result<()> {
        let source = std::fs::read_to_string(path)?;
        let first = first.max(1);
        let lines: Vec<String> = source
            .lines()
            .skip(first - 1)
            .take(last.saturating_sub(first) + 1)
            .map(str::to_string)
            .collect();
        self.console.message(render::source_listing(&lines, first, current));
        Ok(())
    }

    pub fn print_stack_trace(&self, entries: &[StackEntry]) {
        self.console.message(render::stack_trace(entries));
    }

    /// Print the frame the debugger stopped in, unless a post-mortem report
    /// just did so
    pub fn print_stack_entry(&self, entry: &StackEntry) {
        if self.skip_print_stack_entry.swap(false, Ordering::SeqCst) {
            return;
        }
        let mut out = render::stack_entry(entry);
        if let Ok(source) = std::fs::read_to_string(&entry.filename) {
            if let Some(line) = source.lines().nth(entry.lineno.saturating_sub(1)) {
                out.push_str(&render::source_listing(&[line.to_string()], entry.lineno, Some(entry.lineno)));
            }
        }
        self.console.message(out);
    }

    /// Report the error a post-mortem session starts from; the next stack
    /// entry print is skipped as the report already shows where it happened
    pub fn enter_post_mortem(&self, error: &anyhow::Error) {
        self.console.info(POST_MORTEM_NOTICE);
        self.console.error(format!("{error:#}"));
        self.skip_print_stack_entry.store(true, Ordering::SeqCst);
    }

    /// Write the closing notice, wait for it to leave the slave, then close
    /// every slave handle the session holds
    pub(crate) fn close(&self) {
        if self.console.is_closed() {
            return;
        }
        self.console.print(CLOSING_NOTICE);
        if let Err(e) = self.console.drain() {
            debug!("Session: tcdrain failed: {}", e);
        }
        drop(self.console.close());
        drop(lock(&self.reader).take());
        info!("Session closed");
    }
}
