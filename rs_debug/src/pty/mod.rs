/// PTY (Pseudo Terminal) handling for the debug session bridge
/// The server allocates one pair per session: the socket is piped into the
/// master while the dispatch loop reads and writes the slave.
mod pty_trait;
mod termios;
mod unix_pty_impl;

// Export all public types and traits
pub use pty_trait::*;
pub use termios::TermAttrs;
pub use unix_pty_impl::{MasterHandle, UnixPty, set_window_size, window_size};
