/// Styled output to the remote terminal
pub mod render;

use std::fmt::Display;
use std::fs::File;
use std::io::{self, Write};
use std::os::fd::{AsFd, OwnedFd};
use std::sync::{Mutex, MutexGuard};

use crossterm::style::Stylize;
use tracing::debug;

use crate::pty::{SharedSize, TerminalSize};

/// Writer end of the PTY slave plus the cached dimensions of the remote terminal.
///
/// Output is dropped silently once the console is closed.
#[derive(Debug)]
pub struct Console {
    out: Mutex<Option<File>>,
    size: SharedSize,
}

impl Console {
    pub fn new(out: File, size: SharedSize) -> Self {
        Self {
            out: Mutex::new(Some(out)),
            size,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<File>> {
        match self.out.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn size(&self) -> TerminalSize {
        self.size.get()
    }

    pub fn width(&self) -> usize {
        usize::from(self.size.get().cols)
    }

    /// Write `text` as is and flush
    pub fn write_raw(&self, text: &str) -> io::Result<()> {
        let mut guard = self.lock();
        let Some(out) = guard.as_mut() else {
            return Ok(());
        };
        out.write_all(text.as_bytes())?;
        out.flush()
    }

    /// Print a line; blocks that already end with a newline are not extended
    pub fn print(&self, text: impl Display) {
        let mut text = text.to_string();
        if !text.ends_with('\n') {
            text.push('\n');
        }
        if let Err(e) = self.write_raw(&text) {
            debug!("Console: write failed: {}", e);
        }
    }

    pub fn message(&self, text: impl Display) {
        self.print(text);
    }

    pub fn error(&self, text: impl Display) {
        self.print(text.to_string().red().bold());
    }

    pub fn info(&self, text: impl Display) {
        self.print(text.to_string().dark_cyan().dim());
    }

    /// A second descriptor for the console's terminal, used as a redirection target
    pub fn try_clone_fd(&self) -> io::Result<Option<OwnedFd>> {
        self.lock()
            .as_ref()
            .map(|out| out.as_fd().try_clone_to_owned())
            .transpose()
    }

    /// Wait until everything written so far has been transmitted to the master
    pub fn drain(&self) -> io::Result<()> {
        if let Some(out) = self.lock().as_ref() {
            nix::sys::termios::tcdrain(out.as_fd())?;
        }
        Ok(())
    }

    /// Detach the writer; later output is discarded
    pub fn close(&self) -> Option<File> {
        self.lock().take()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().is_none()
    }
}
