/// Listening, accepting, and the guaranteed teardown of a session
use std::fmt;
use std::net::{IpAddr, SocketAddr, TcpListener, TcpStream};
use std::ops::Deref;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::piping::{Bridge, PtyResizer};
use crate::protocol::receive_handshake;
use crate::pty::{MasterHandle, ResizablePty, SharedSize, TerminalSize, UnixPty};
use crate::session::{Acquired, AttachError, Session, SessionSlot, TransportError, global_slot};
use crate::stdio::notice;

/// How long teardown waits for the bridge to drain before cutting the socket
const BRIDGE_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);
const BRIDGE_POLL_INTERVAL: Duration = Duration::from_millis(10);

pub type HelloMessage = Box<dyn Fn(&str, u16) -> String + Send + Sync>;
pub type AcceptedMessage = Box<dyn Fn(&SocketAddr) -> String + Send + Sync>;

pub fn default_hello_message(ip: &str, port: u16) -> String {
    format!("rs-debug session open at {ip}:{port}, use 'rs-debug debug {ip} {port}' to connect...")
}

pub fn default_accepted_message(peer: &SocketAddr) -> String {
    format!("rs-debug accepted connection from {peer}.")
}

/// Per-attach knobs
pub struct AttachOptions {
    /// Notice printed once listening, given the ip and the bound port
    pub hello_message: Option<HelloMessage>,
    /// Notice printed once a client connected
    pub accepted_message: Option<AcceptedMessage>,
    /// Overrides the configured prompt
    pub prompt: Option<String>,
    /// Send process stdout/stderr to the session while a command runs
    pub redirect_stdio: bool,
}

impl Default for AttachOptions {
    fn default() -> Self {
        Self {
            hello_message: None,
            accepted_message: None,
            prompt: None,
            redirect_stdio: true,
        }
    }
}

impl AttachOptions {
    pub fn with_hello_message<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, u16) -> String + Send + Sync + 'static,
    {
        self.hello_message = Some(Box::new(f));
        self
    }

    pub fn with_accepted_message<F>(mut self, f: F) -> Self
    where
        F: Fn(&SocketAddr) -> String + Send + Sync + 'static,
    {
        self.accepted_message = Some(Box::new(f));
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn with_redirect_stdio(mut self, enabled: bool) -> Self {
        self.redirect_stdio = enabled;
        self
    }

    fn hello(&self, ip: &str, port: u16) -> String {
        match &self.hello_message {
            Some(f) => f(ip, port),
            None => default_hello_message(ip, port),
        }
    }

    fn accepted(&self, peer: &SocketAddr) -> String {
        match &self.accepted_message {
            Some(f) => f(peer),
            None => default_accepted_message(peer),
        }
    }
}

impl fmt::Debug for AttachOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttachOptions")
            .field("hello_message", &self.hello_message.is_some())
            .field("accepted_message", &self.accepted_message.is_some())
            .field("prompt", &self.prompt)
            .field("redirect_stdio", &self.redirect_stdio)
            .finish()
    }
}

struct Owner {
    slot: &'static SessionSlot,
    bridge: Bridge,
}

/// Access to the active session.
///
/// The handle returned by the attach that created the session owns it:
/// dropping that one tears the session down. Handles from nested attaches
/// only borrow it.
pub struct SessionHandle {
    session: Arc<Session>,
    owner: Option<Owner>,
}

impl SessionHandle {
    fn owned(session: Arc<Session>, slot: &'static SessionSlot, bridge: Bridge) -> Self {
        Self {
            session,
            owner: Some(Owner { slot, bridge }),
        }
    }

    fn borrowed(session: Arc<Session>) -> Self {
        Self { session, owner: None }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn is_owner(&self) -> bool {
        self.owner.is_some()
    }
}

impl Deref for SessionHandle {
    type Target = Session;

    fn deref(&self) -> &Session {
        &self.session
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("term_type", &self.session.term_type())
            .field("owner", &self.is_owner())
            .finish()
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        let Some(Owner { slot, bridge }) = self.owner.take() else {
            return;
        };
        info!("Tearing down session");
        slot.clear(&self.session);
        self.session.close();

        let deadline = Instant::now() + BRIDGE_DRAIN_TIMEOUT;
        while !bridge.is_finished() && Instant::now() < deadline {
            thread::sleep(BRIDGE_POLL_INTERVAL);
        }
        if !bridge.is_finished() {
            warn!("Bridge still running after teardown, shutting the socket down");
            bridge.shutdown();
        }
        if let Err(e) = bridge.join() {
            warn!("Bridge ended with error: {}", e);
        }
        info!("Session torn down");
    }
}

/// Attach through the process-wide slot.
///
/// Returns the active session if there is one; otherwise listens on
/// `ip:port` (0 picks a free port), waits for one client and starts a
/// session on it.
pub fn connect_and_start(ip: &str, port: u16, options: &AttachOptions) -> Result<SessionHandle, AttachError> {
    connect_and_start_in(global_slot(), ip, port, options)
}

pub fn connect_and_start_in(
    slot: &'static SessionSlot,
    ip: &str,
    port: u16,
    options: &AttachOptions,
) -> Result<SessionHandle, AttachError> {
    let acquired = slot.acquire_or_create(|| -> Result<_, AttachError> {
        let (stream, peer) = listen_and_accept(ip, port, options)?;
        start_session(stream, peer)
    })?;
    match acquired {
        Acquired::Existing(session) => {
            info!("Session already active, attaching to it");
            Ok(SessionHandle::borrowed(session))
        }
        Acquired::Created(session, bridge) => Ok(SessionHandle::owned(session, slot, bridge)),
    }
}

/// Start a session on a connection accepted elsewhere
pub fn start_from_connection(stream: TcpStream) -> Result<SessionHandle, AttachError> {
    start_from_connection_in(global_slot(), stream)
}

pub fn start_from_connection_in(slot: &'static SessionSlot, stream: TcpStream) -> Result<SessionHandle, AttachError> {
    let peer = stream.peer_addr().map_err(TransportError::Socket)?;
    let mut guard = slot.lock();
    if guard.try_acquire_existing().is_some() {
        return Err(AttachError::AlreadyActive);
    }
    let (session, bridge) = guard.create_and_install(|| start_session(stream, peer))?;
    drop(guard);
    Ok(SessionHandle::owned(session, slot, bridge))
}

fn listen_and_accept(ip: &str, port: u16, options: &AttachOptions) -> Result<(TcpStream, SocketAddr), TransportError> {
    let listener = TcpListener::bind((ip, port)).map_err(|source| TransportError::Bind {
        addr: format!("{ip}:{port}"),
        source,
    })?;
    let bound = listener.local_addr().map_err(TransportError::Socket)?;
    info!("Listening for a debug client on {}", bound);
    notice(&options.hello(ip, bound.port()));

    let (stream, peer) = listener.accept().map_err(TransportError::Accept)?;
    info!("Accepted debug client {}", peer);
    notice(&options.accepted(&peer));
    Ok((stream, peer))
}

fn is_local(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback(),
        IpAddr::V6(v6) => v6.is_loopback() || v6.to_ipv4_mapped().is_some_and(|v4| v4.is_loopback()),
    }
}

/// Handshake, PTY and bridge for an accepted connection
fn start_session(stream: TcpStream, peer: SocketAddr) -> Result<(Arc<Session>, Bridge), AttachError> {
    stream.set_nodelay(true).map_err(TransportError::Socket)?;
    let handshake = receive_handshake(&mut &stream)?;

    let pty = UnixPty::open()?;
    let size = if handshake.term_size.is_valid() {
        handshake.term_size
    } else {
        warn!("Client sent terminal size {}, using {}", handshake.term_size, TerminalSize::default());
        TerminalSize::default()
    };
    pty.resize(size)?;
    if let Err(e) = pty.set_tty_attrs(&handshake.term_attrs) {
        warn!("Keeping default terminal attributes: {}", e);
    }
    if is_local(&peer.ip()) {
        debug!("Local client, not assigning a controlling terminal");
    } else if let Err(e) = pty.make_controlling_terminal() {
        warn!("{}", e);
    }

    let shared = SharedSize::new(size);
    let resizer = PtyResizer::new(MasterHandle::try_clone_from(pty.master())?, shared.clone());
    let (master, slave) = pty.into_parts();
    let session = Arc::new(Session::new(slave, handshake.term_type, shared)?);
    let bridge = Bridge::spawn(stream, master, resizer)?;

    info!("Session started for {} ({}, {})", peer, session.term_type(), size);
    Ok((session, bridge))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debugger::DebuggerCore;
    use crate::dispatch::{CommandOutcome, Dispatcher, SessionEnd};
    use crate::protocol::{ControlMessage, HandshakeMessage, send_handshake};
    use std::io::{Read, Write};
    use std::net::Ipv6Addr;
    use std::sync::mpsc;

    #[test]
    fn test_default_notices() {
        assert_eq!(
            default_hello_message("localhost", 3513),
            "rs-debug session open at localhost:3513, use 'rs-debug debug localhost 3513' to connect..."
        );
        let peer: SocketAddr = "127.0.0.1:50000".parse().unwrap();
        assert_eq!(
            default_accepted_message(&peer),
            "rs-debug accepted connection from 127.0.0.1:50000."
        );
    }

    #[test]
    fn test_notice_overrides() {
        let options = AttachOptions::default()
            .with_hello_message(|ip, port| format!("listening {ip} {port}"))
            .with_accepted_message(|peer| format!("hi {}", peer.ip()));
        let peer: SocketAddr = "10.0.0.2:1".parse().unwrap();
        assert_eq!(options.hello("0.0.0.0", 0), "listening 0.0.0.0 0");
        assert_eq!(options.accepted(&peer), "hi 10.0.0.2");
    }

    #[test]
    fn test_loopback_detection() {
        assert!(is_local(&"127.0.0.1".parse().unwrap()));
        assert!(is_local(&IpAddr::V6(Ipv6Addr::LOCALHOST)));
        assert!(is_local(&"::ffff:127.0.0.1".parse().unwrap()));
        assert!(!is_local(&"192.168.1.20".parse().unwrap()));
    }

    #[test]
    fn test_bind_failure_is_a_transport_error() {
        let slot: &'static SessionSlot = Box::leak(Box::new(SessionSlot::new()));
        let taken = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();

        let err = connect_and_start_in(slot, "127.0.0.1", port, &AttachOptions::default()).unwrap_err();
        assert!(matches!(err, AttachError::Transport(TransportError::Bind { .. })));
        assert!(slot.current().is_none());
    }

    struct SizeCore;

    impl DebuggerCore for SizeCore {
        fn execute(&mut self, line: &str, session: &Session) -> anyhow::Result<CommandOutcome> {
            match line {
                "q" => Ok(CommandOutcome::Quit),
                "size" => {
                    session.message(format!("size={}", session.terminal_size()));
                    Ok(CommandOutcome::Continue)
                }
                _ => Ok(CommandOutcome::Continue),
            }
        }
    }

    /// Read from the socket until `needle` shows up in everything read so far
    fn read_until(stream: &mut TcpStream, seen: &mut String, needle: &str) {
        let mut buf = [0u8; 1024];
        while !seen.contains(needle) {
            let n = stream.read(&mut buf).unwrap();
            assert!(n > 0, "connection closed before {needle:?}, got {seen:?}");
            seen.push_str(&String::from_utf8_lossy(&buf[..n]));
        }
    }

    #[test]
    fn test_session_round_trip() {
        let slot: &'static SessionSlot = Box::leak(Box::new(SessionSlot::new()));
        let (port_tx, port_rx) = mpsc::channel();
        let options = AttachOptions::default().with_hello_message(move |ip, port| {
            let _ = port_tx.send(port);
            format!("test session on {ip}:{port}")
        });

        let client = thread::spawn(move || {
            let port: u16 = port_rx.recv().unwrap();
            let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
            stream.set_read_timeout(Some(Duration::from_secs(10))).unwrap();
            stream.set_nodelay(true).unwrap();

            let attrs = UnixPty::open().unwrap().tty_attrs().unwrap();
            let hello = HandshakeMessage::new(attrs, Some("xterm-256color".into()), TerminalSize::new(24, 80));
            send_handshake(&mut stream, &hello).unwrap();

            let mut seen = String::new();
            stream.write_all(b"size\n").unwrap();
            read_until(&mut stream, &mut seen, "size=24x80");

            // a control message is only recognised as a read of its own
            thread::sleep(Duration::from_millis(200));
            let resize = ControlMessage::Resize(TerminalSize::new(40, 120));
            stream.write_all(&resize.encode()).unwrap();
            thread::sleep(Duration::from_millis(200));

            stream.write_all(b"size\n").unwrap();
            read_until(&mut stream, &mut seen, "size=40x120");

            stream.write_all(b"q\n").unwrap();
            let mut rest = Vec::new();
            stream.read_to_end(&mut rest).unwrap();
            seen.push_str(&String::from_utf8_lossy(&rest));
            seen
        });

        let handle = connect_and_start_in(slot, "127.0.0.1", 0, &options).unwrap();
        assert!(handle.is_owner());
        assert_eq!(handle.term_type(), "xterm-256color");
        assert_eq!(handle.terminal_size(), TerminalSize::new(24, 80));

        let nested = connect_and_start_in(slot, "127.0.0.1", 0, &AttachOptions::default()).unwrap();
        assert!(!nested.is_owner());
        assert!(Arc::ptr_eq(nested.session(), handle.session()));
        drop(nested);

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let _other = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (stream, _) = listener.accept().unwrap();
        assert!(matches!(
            start_from_connection_in(slot, stream),
            Err(AttachError::AlreadyActive)
        ));

        let mut core = SizeCore;
        let end = Dispatcher::new(&handle, &mut core).redirect_stdio(false).run();
        assert_eq!(end, SessionEnd::Quit);
        assert_eq!(handle.terminal_size(), TerminalSize::new(40, 120));
        drop(handle);
        assert!(slot.current().is_none());

        let seen = client.join().unwrap();
        assert!(seen.contains("Closing connection"));
        assert!(!seen.contains("terminal_size:"));
    }
}
