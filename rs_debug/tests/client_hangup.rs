//! A client that hangs up ends the dispatch loop and frees the session slot.
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::Duration;

use rs_debug::dispatch::Dispatcher;
use rs_debug::protocol::{ControlMessage, HandshakeMessage, send_handshake};
use rs_debug::pty::{TerminalSize, UnixPty};
use rs_debug::session::{global_slot, start_from_connection};
use rs_debug::{CommandOutcome, DebuggerCore, Session, SessionEnd};

/// Prints every line back with the current terminal size
struct EchoCore {
    lines: Vec<String>,
}

impl DebuggerCore for EchoCore {
    fn execute(&mut self, line: &str, session: &Session) -> anyhow::Result<CommandOutcome> {
        self.lines.push(line.to_string());
        session.message(format!("got {line} at {}", session.terminal_size()));
        Ok(CommandOutcome::Continue)
    }
}

fn read_until(stream: &mut TcpStream, seen: &mut String, needle: &str) {
    let mut buf = [0u8; 1024];
    while !seen.contains(needle) {
        let n = stream.read(&mut buf).unwrap();
        assert!(n > 0, "connection closed before {needle:?}, got {seen:?}");
        seen.push_str(&String::from_utf8_lossy(&buf[..n]));
    }
}

#[test]
fn test_client_hangup_ends_session() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let client = thread::spawn(move || {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(10))).unwrap();
        stream.set_nodelay(true).unwrap();

        let attrs = UnixPty::open().unwrap().tty_attrs().unwrap();
        send_handshake(&mut stream, &HandshakeMessage::new(attrs, None, TerminalSize::new(24, 80))).unwrap();

        let mut seen = String::new();
        stream.write_all(b"ls\n").unwrap();
        read_until(&mut stream, &mut seen, "got ls at 24x80");

        thread::sleep(Duration::from_millis(200));
        stream
            .write_all(&ControlMessage::Resize(TerminalSize::new(40, 120)).encode())
            .unwrap();
        thread::sleep(Duration::from_millis(200));

        stream.write_all(b"where\n").unwrap();
        read_until(&mut stream, &mut seen, "got where at 40x120");
        // hang up without quitting
        drop(stream);
        seen
    });

    let (stream, _) = listener.accept().unwrap();
    let handle = start_from_connection(stream).unwrap();
    assert!(handle.is_owner());
    assert_eq!(handle.term_type(), "unknown");
    assert!(global_slot().current().is_some());

    let mut core = EchoCore { lines: Vec::new() };
    let end = Dispatcher::new(&handle, &mut core).redirect_stdio(false).run();
    assert_eq!(end, SessionEnd::Disconnected);
    assert_eq!(core.lines, ["ls", "where"]);

    drop(handle);
    assert!(global_slot().current().is_none());

    let seen = client.join().unwrap();
    assert!(!seen.contains("terminal_size:"));
}
