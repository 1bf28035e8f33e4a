//! Process stdout/stderr reach the session terminal while a line is dispatched.
//!
//! Kept in its own test binary: it repoints fd 1 and fd 2 of the whole process.
use std::fs::File;
use std::io::{self, Read};

use rs_debug::dispatch::Dispatcher;
use rs_debug::pty::{SharedSize, TerminalSize, UnixPty};
use rs_debug::{CommandOutcome, DebuggerCore, Session};

/// Writes straight to the process descriptors, like a debuggee's prints would
struct NoisyCore;

impl DebuggerCore for NoisyCore {
    fn execute(&mut self, line: &str, _session: &Session) -> anyhow::Result<CommandOutcome> {
        nix::unistd::write(io::stdout(), format!("fd1 {line}\n").as_bytes())?;
        nix::unistd::write(io::stderr(), format!("fd2 {line}\n").as_bytes())?;
        Ok(CommandOutcome::Continue)
    }
}

#[test]
fn test_dispatched_output_goes_to_the_session() {
    let (master, slave) = UnixPty::open().unwrap().into_parts();
    let session = Session::new(slave, "xterm".into(), SharedSize::new(TerminalSize::new(24, 80))).unwrap();
    let mut core = NoisyCore;

    let outcome = Dispatcher::new(&session, &mut core).onecmd("step");
    assert_eq!(outcome, CommandOutcome::Continue);

    session.message("after");

    let mut master = File::from(master);
    let mut out = String::new();
    let mut buf = [0u8; 1024];
    while !out.contains("after") {
        let n = master.read(&mut buf).unwrap();
        assert!(n > 0);
        out.push_str(&String::from_utf8_lossy(&buf[..n]));
    }
    assert!(out.contains("fd1 step"), "{out:?}");
    assert!(out.contains("fd2 step"), "{out:?}");
    let after = out.find("after").unwrap();
    assert!(out.find("fd1 step").unwrap() < after);
    assert!(out.find("fd2 step").unwrap() < after);
}
