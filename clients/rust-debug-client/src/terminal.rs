use std::fs::{File, OpenOptions};
use std::io::{self, IsTerminal};
use std::os::fd::AsFd;

use nix::sys::termios::{self, SetArg, Termios};
use rs_debug::pty::{TermAttrs, TerminalSize, window_size};

use crate::error::Result;

const CONTROLLING_TTY: &str = "/dev/tty";

/// The local terminal: stdin when it is one, the controlling terminal otherwise
#[derive(Debug)]
pub struct Tty {
    file: File,
}

impl Tty {
    pub fn open() -> Result<Self> {
        let stdin = io::stdin();
        let file = if stdin.is_terminal() {
            File::from(stdin.as_fd().try_clone_to_owned()?)
        } else {
            tracing::debug!("stdin is not a terminal, using {}", CONTROLLING_TTY);
            OpenOptions::new().read(true).write(true).open(CONTROLLING_TTY)?
        };
        Ok(Self { file })
    }

    /// Another handle on the same terminal, for reader threads and output
    pub fn try_clone(&self) -> io::Result<File> {
        self.file.try_clone()
    }

    pub fn attrs(&self) -> Result<TermAttrs> {
        Ok(TermAttrs::capture(&self.file)?)
    }

    /// Current window size, 24x80 when the terminal cannot tell
    pub fn size(&self) -> TerminalSize {
        current_size(&self.file)
    }

    /// Switch to raw mode until the guard is dropped
    pub fn raw_mode(&self) -> Result<RawModeGuard> {
        RawModeGuard::enter(self.try_clone()?)
    }
}

pub fn current_size<Fd: AsFd>(fd: Fd) -> TerminalSize {
    match window_size(fd) {
        Ok(size) if size.is_valid() => size,
        Ok(_) => TerminalSize::default(),
        Err(e) => {
            tracing::debug!("Cannot read window size: {}", e);
            TerminalSize::default()
        }
    }
}

/// Terminal type for the handshake: configured, else `$TERM`
pub fn term_type(configured: Option<&str>) -> Option<String> {
    configured
        .map(str::to_string)
        .or_else(|| std::env::var("TERM").ok())
        .filter(|t| !t.is_empty())
}

/// Restores the saved terminal attributes on drop, on every exit path
pub struct RawModeGuard {
    file: File,
    saved: Termios,
}

impl RawModeGuard {
    fn enter(file: File) -> Result<Self> {
        let saved = termios::tcgetattr(&file)?;
        let mut raw = saved.clone();
        termios::cfmakeraw(&mut raw);
        termios::tcsetattr(&file, SetArg::TCSANOW, &raw)?;
        tracing::debug!("Terminal switched to raw mode");
        Ok(Self { file, saved })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(e) = termios::tcsetattr(&self.file, SetArg::TCSADRAIN, &self.saved) {
            tracing::warn!("Failed to restore terminal attributes: {}", e);
        } else {
            tracing::debug!("Terminal attributes restored");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rs_debug::pty::{ResizablePty, UnixPty};

    fn slave_file(pty: &UnixPty) -> File {
        File::from(pty.slave().try_clone_to_owned().unwrap())
    }

    #[test]
    fn test_raw_mode_is_restored() {
        let pty = UnixPty::open().unwrap();
        let slave = slave_file(&pty);
        let before = TermAttrs::capture(&slave).unwrap();
        assert!(before.canonical());

        let guard = RawModeGuard::enter(slave.try_clone().unwrap()).unwrap();
        let raw = TermAttrs::capture(&slave).unwrap();
        assert!(!raw.canonical());
        assert!(!raw.echo_enabled());

        drop(guard);
        assert_eq!(TermAttrs::capture(&slave).unwrap(), before);
    }

    #[test]
    fn test_current_size_follows_the_terminal() {
        let pty = UnixPty::open().unwrap();
        pty.resize(TerminalSize::new(50, 132)).unwrap();
        assert_eq!(current_size(pty.slave()), TerminalSize::new(50, 132));
    }

    #[test]
    fn test_current_size_falls_back() {
        let not_a_tty = std::env::temp_dir();
        let dir = File::open(not_a_tty).unwrap();
        assert_eq!(current_size(&dir), TerminalSize::default());
    }

    #[test]
    fn test_configured_term_type_wins() {
        assert_eq!(term_type(Some("vt100")).as_deref(), Some("vt100"));
        assert_eq!(term_type(Some("")), None);
    }
}
