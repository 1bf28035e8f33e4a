use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd};

use nix::pty::{Winsize, openpty};
use nix::sys::termios::Termios;
use tracing::{debug, info, warn};

use crate::pty::pty_trait::{PtyError, ResizablePty, TerminalSize};
use crate::pty::termios::TermAttrs;

/// Master/slave pseudo-terminal pair backed by `openpty(3)`
#[derive(Debug)]
pub struct UnixPty {
    master: OwnedFd,
    slave: OwnedFd,
}

impl UnixPty {
    pub fn open() -> Result<Self, PtyError> {
        let pair = openpty(None::<&Winsize>, None::<&Termios>).map_err(PtyError::Open)?;
        info!(
            "UnixPty: allocated pty pair (master fd {}, slave fd {})",
            pair.master.as_raw_fd(),
            pair.slave.as_raw_fd()
        );
        Ok(Self {
            master: pair.master,
            slave: pair.slave,
        })
    }

    pub fn master(&self) -> BorrowedFd<'_> {
        self.master.as_fd()
    }

    pub fn slave(&self) -> BorrowedFd<'_> {
        self.slave.as_fd()
    }

    /// Copy the line-discipline settings of a remote terminal onto the slave
    pub fn set_tty_attrs(&self, attrs: &TermAttrs) -> Result<(), PtyError> {
        attrs.apply(&self.slave)?;
        debug!(
            "UnixPty: applied terminal attributes (echo: {}, canonical: {})",
            attrs.echo_enabled(),
            attrs.canonical()
        );
        Ok(())
    }

    pub fn tty_attrs(&self) -> Result<TermAttrs, PtyError> {
        TermAttrs::capture(&self.slave)
    }

    /// Make the slave the controlling terminal of the calling process' session.
    ///
    /// Only succeeds for a session leader without a controlling terminal;
    /// the terminal is never stolen from another session.
    pub fn make_controlling_terminal(&self) -> Result<(), PtyError> {
        // SAFETY: the slave fd is owned by self and open for the duration of the call;
        // TIOCSCTTY with argument 0 does not read or write user memory.
        let ret = unsafe { libc::ioctl(self.slave.as_raw_fd(), libc::TIOCSCTTY as _, 0) };
        if ret == -1 {
            return Err(PtyError::ControllingTerminal(nix::Error::last()));
        }
        info!("UnixPty: slave is now the controlling terminal");
        Ok(())
    }

    /// Hand out the master and slave descriptors separately
    pub fn into_parts(self) -> (OwnedFd, OwnedFd) {
        (self.master, self.slave)
    }
}

impl ResizablePty for UnixPty {
    fn resize(&self, size: TerminalSize) -> Result<(), PtyError> {
        set_window_size(&self.master, size)
    }

    fn size(&self) -> Result<TerminalSize, PtyError> {
        window_size(&self.master)
    }
}

/// The master side of a PTY once it has been split from its slave.
///
/// Resizing through the master is how the remote window size reaches
/// programs reading the slave.
#[derive(Debug)]
pub struct MasterHandle {
    fd: OwnedFd,
}

impl MasterHandle {
    pub fn new(fd: OwnedFd) -> Self {
        Self { fd }
    }

    /// Duplicate the descriptor so the handle can live next to the owner of the master
    pub fn try_clone_from<Fd: AsFd>(fd: Fd) -> Result<Self, PtyError> {
        Ok(Self::new(fd.as_fd().try_clone_to_owned()?))
    }
}

impl AsFd for MasterHandle {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl ResizablePty for MasterHandle {
    fn resize(&self, size: TerminalSize) -> Result<(), PtyError> {
        set_window_size(&self.fd, size)
    }

    fn size(&self) -> Result<TerminalSize, PtyError> {
        window_size(&self.fd)
    }
}

/// Query the window size of the terminal behind `fd` (TIOCGWINSZ)
pub fn window_size<Fd: AsFd>(fd: Fd) -> Result<TerminalSize, PtyError> {
    let mut winsize = Winsize {
        ws_row: 0,
        ws_col: 0,
        ws_xpixel: 0,
        ws_ypixel: 0,
    };
    // SAFETY: winsize is a valid, writable libc::winsize for the kernel to fill in.
    let ret = unsafe {
        libc::ioctl(
            fd.as_fd().as_raw_fd(),
            libc::TIOCGWINSZ as _,
            &mut winsize as *mut Winsize,
        )
    };
    if ret == -1 {
        return Err(PtyError::Sys(nix::Error::last()));
    }
    Ok(TerminalSize::new(winsize.ws_row, winsize.ws_col))
}

/// Set the window size of the terminal behind `fd` (TIOCSWINSZ)
pub fn set_window_size<Fd: AsFd>(fd: Fd, size: TerminalSize) -> Result<(), PtyError> {
    if !size.is_valid() {
        warn!("Refusing to resize terminal to {}", size);
        return Err(PtyError::InvalidSize(size));
    }
    let winsize = Winsize {
        ws_row: size.rows,
        ws_col: size.cols,
        ws_xpixel: 0,
        ws_ypixel: 0,
    };
    // SAFETY: winsize is a valid libc::winsize that outlives the call; the kernel only reads it.
    let ret = unsafe {
        libc::ioctl(
            fd.as_fd().as_raw_fd(),
            libc::TIOCSWINSZ as _,
            &winsize as *const Winsize,
        )
    };
    if ret == -1 {
        return Err(PtyError::ResizeFailed(nix::Error::last().to_string()));
    }
    debug!("Terminal resized to {}", size);
    Ok(())
}
