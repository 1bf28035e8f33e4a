/// Process stdio plumbing: the original stderr and scoped fd redirection
use std::io::{self, Write};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};
use std::sync::OnceLock;

use tracing::{debug, warn};

pub const STDOUT_FD: RawFd = 1;
pub const STDERR_FD: RawFd = 2;

static ORIGINAL_STDERR: OnceLock<Option<OwnedFd>> = OnceLock::new();

/// A duplicate of fd 2 as it was before the first redirection
fn original_stderr_fd() -> Option<BorrowedFd<'static>> {
    ORIGINAL_STDERR
        .get_or_init(|| match io::stderr().as_fd().try_clone_to_owned() {
            Ok(fd) => Some(fd),
            Err(e) => {
                debug!("Could not duplicate stderr: {}", e);
                None
            }
        })
        .as_ref()
        .map(|fd| fd.as_fd())
}

/// Writer for the server process' own stderr, unaffected by [`StdioRedirect`]
#[derive(Debug, Clone, Copy, Default)]
pub struct OriginalStderr;

impl OriginalStderr {
    /// Take the duplicate now, before anything can redirect fd 2
    pub fn capture() {
        let _ = original_stderr_fd();
    }
}

impl Write for OriginalStderr {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match original_stderr_fd() {
            Some(fd) => Ok(nix::unistd::write(fd, buf)?),
            None => io::stderr().write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Print a plain-text notice for whoever runs the debugged process
pub fn notice(text: &str) {
    let mut line = text.to_string();
    line.push('\n');
    if let Err(e) = OriginalStderr.write_all(line.as_bytes()) {
        debug!("Failed to print notice: {}", e);
    }
}

fn duplicate_onto(source: BorrowedFd<'_>, target: RawFd) -> io::Result<()> {
    // SAFETY: dup2 only manipulates the descriptor table; `source` is open for
    // the duration of the call and `target` is a descriptor number the caller
    // asked to replace.
    let ret = unsafe { libc::dup2(source.as_raw_fd(), target) };
    if ret == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Points descriptors at another file until dropped.
///
/// Restores in reverse order, so nested redirections unwind correctly.
#[derive(Debug)]
pub struct StdioRedirect {
    saved: Vec<(RawFd, OwnedFd)>,
}

impl StdioRedirect {
    /// Redirect stdout and stderr to `target`
    pub fn stdio_to<Fd: AsFd>(target: Fd) -> io::Result<Self> {
        Self::to(target, &[STDOUT_FD, STDERR_FD])
    }

    pub fn to<Fd: AsFd>(target: Fd, fds: &[RawFd]) -> io::Result<Self> {
        OriginalStderr::capture();
        let _ = io::stdout().flush();
        let _ = io::stderr().flush();

        let mut redirect = Self { saved: Vec::new() };
        for &fd in fds {
            // SAFETY: `fd` is an open descriptor of this process (stdio or one
            // the caller owns); it is only borrowed long enough to duplicate it.
            let original = unsafe { BorrowedFd::borrow_raw(fd) }.try_clone_to_owned()?;
            duplicate_onto(target.as_fd(), fd)?;
            redirect.saved.push((fd, original));
        }
        Ok(redirect)
    }
}

impl Drop for StdioRedirect {
    fn drop(&mut self) {
        let _ = io::stdout().flush();
        let _ = io::stderr().flush();
        for (fd, original) in self.saved.drain(..).rev() {
            if let Err(e) = duplicate_onto(original.as_fd(), fd) {
                warn!("Failed to restore fd {}: {}", fd, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::unistd::{pipe, write};
    use std::fs::File;
    use std::io::Read;

    fn read_all(fd: OwnedFd) -> String {
        let mut out = String::new();
        File::from(fd).read_to_string(&mut out).unwrap();
        out
    }

    #[test]
    fn test_redirect_and_restore() {
        let (victim_r, victim_w) = pipe().unwrap();
        let (sink_r, sink_w) = pipe().unwrap();

        {
            let _redirect = StdioRedirect::to(&sink_w, &[victim_w.as_raw_fd()]).unwrap();
            write(&victim_w, b"captured").unwrap();
        }
        write(&victim_w, b"restored").unwrap();

        drop(victim_w);
        drop(sink_w);
        assert_eq!(read_all(sink_r), "captured");
        assert_eq!(read_all(victim_r), "restored");
    }

    #[test]
    fn test_nested_redirects_unwind() {
        let (victim_r, victim_w) = pipe().unwrap();
        let (outer_r, outer_w) = pipe().unwrap();
        let (inner_r, inner_w) = pipe().unwrap();
        let fd = victim_w.as_raw_fd();

        {
            let _outer = StdioRedirect::to(&outer_w, &[fd]).unwrap();
            write(&victim_w, b"outer ").unwrap();
            {
                let _inner = StdioRedirect::to(&inner_w, &[fd]).unwrap();
                write(&victim_w, b"inner").unwrap();
            }
            write(&victim_w, b"again").unwrap();
        }
        write(&victim_w, b"home").unwrap();

        drop((victim_w, outer_w, inner_w));
        assert_eq!(read_all(outer_r), "outer again");
        assert_eq!(read_all(inner_r), "inner");
        assert_eq!(read_all(victim_r), "home");
    }
}
