//! Remote terminal access to a debugging session.
//!
//! A debugged process listens on a TCP socket, a client connects and sends
//! its terminal settings, and from then on the client's terminal is bridged
//! to a PTY whose slave side drives the debugger's command loop.
pub mod api;
pub mod config;
pub mod console;
pub mod debugger;
pub mod dispatch;
pub mod piping;
pub mod protocol;
pub mod pty;
pub mod session;
pub mod stdio;

pub use api::{attach, attach_on_error, attach_post_mortem, attach_post_mortem_with, attach_with};
pub use debugger::{DebuggerCore, StackEntry, Variable};
pub use dispatch::{CommandOutcome, SessionEnd};
pub use session::{AttachOptions, Session, SessionHandle};
