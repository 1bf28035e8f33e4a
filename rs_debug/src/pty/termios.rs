/// Serializable snapshot of a terminal's line-discipline settings
use std::os::fd::AsFd;

use nix::sys::termios::{
    self, ControlFlags, InputFlags, LocalFlags, OutputFlags, SetArg, Termios,
};
use serde::{Deserialize, Serialize};

use crate::pty::PtyError;

/// Terminal attributes as carried by the handshake.
///
/// The flag words are kept as raw bit patterns: the peer may run a different
/// platform, so the server applies them verbatim rather than interpreting them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermAttrs {
    pub iflag: u64,
    pub oflag: u64,
    pub cflag: u64,
    pub lflag: u64,
    #[serde(default)]
    pub line: u8,
    pub cc: Vec<u8>,
}

impl TermAttrs {
    /// Read the attributes of the terminal behind `fd`
    pub fn capture<Fd: AsFd>(fd: Fd) -> Result<Self, PtyError> {
        let termios = termios::tcgetattr(fd)?;
        Ok(Self::from(&termios))
    }

    /// Apply these attributes to the terminal behind `fd`, immediately
    pub fn apply<Fd: AsFd>(&self, fd: Fd) -> Result<(), PtyError> {
        let fd = fd.as_fd();
        let mut termios = termios::tcgetattr(fd)?;
        self.write_into(&mut termios);
        termios::tcsetattr(fd, SetArg::TCSANOW, &termios)
            .map_err(|e| PtyError::Attributes(e.to_string()))
    }

    /// Overwrite the fields of `termios` with this snapshot
    pub fn write_into(&self, termios: &mut Termios) {
        termios.input_flags = InputFlags::from_bits_retain(self.iflag as libc::tcflag_t);
        termios.output_flags = OutputFlags::from_bits_retain(self.oflag as libc::tcflag_t);
        termios.control_flags = ControlFlags::from_bits_retain(self.cflag as libc::tcflag_t);
        termios.local_flags = LocalFlags::from_bits_retain(self.lflag as libc::tcflag_t);
        #[cfg(any(target_os = "linux", target_os = "android"))]
        {
            termios.line_discipline = self.line;
        }

        // peers with a different NCCS only share the common prefix
        let len = termios.control_chars.len().min(self.cc.len());
        termios.control_chars[..len].copy_from_slice(&self.cc[..len]);
    }

    pub fn echo_enabled(&self) -> bool {
        LocalFlags::from_bits_retain(self.lflag as libc::tcflag_t).contains(LocalFlags::ECHO)
    }

    pub fn canonical(&self) -> bool {
        LocalFlags::from_bits_retain(self.lflag as libc::tcflag_t).contains(LocalFlags::ICANON)
    }
}

impl From<&Termios> for TermAttrs {
    fn from(termios: &Termios) -> Self {
        #[cfg(any(target_os = "linux", target_os = "android"))]
        let line = termios.line_discipline;
        #[cfg(not(any(target_os = "linux", target_os = "android")))]
        let line = 0;

        Self {
            iflag: termios.input_flags.bits() as u64,
            oflag: termios.output_flags.bits() as u64,
            cflag: termios.control_flags.bits() as u64,
            lflag: termios.local_flags.bits() as u64,
            line,
            cc: termios.control_chars.to_vec(),
        }
    }
}
