/// Socket ⇄ PTY master bridge running the piping engine on its own thread
use std::io;
use std::net::{Shutdown, TcpStream};
use std::os::fd::{AsFd, OwnedFd};
use std::thread::{self, JoinHandle};

use tracing::{debug, info, warn};

use crate::piping::{Piping, PipingError};
use crate::protocol::ControlMessage;
use crate::pty::{MasterHandle, PtyError, ResizablePty, SharedSize, TerminalSize};

const THREAD_NAME: &str = "rs-debug-piping";

/// Applies resize control messages: the PTY first, then the cached console size
#[derive(Debug)]
pub struct PtyResizer {
    master: MasterHandle,
    shared: SharedSize,
}

impl PtyResizer {
    pub fn new(master: MasterHandle, shared: SharedSize) -> Self {
        Self { master, shared }
    }

    pub fn apply(&self, size: TerminalSize) -> Result<(), PtyError> {
        self.master.resize(size)?;
        self.shared.set(size);
        info!("Session terminal resized to {}", size);
        Ok(())
    }
}

/// Handle to the background forwarding thread.
///
/// The thread owns the socket and the master. When the engine stops it closes
/// the master first, which hangs up the slave and ends the dispatch loop, and
/// the socket last.
#[derive(Debug)]
pub struct Bridge {
    thread: JoinHandle<Result<(), PipingError>>,
    socket: TcpStream,
}

impl Bridge {
    pub fn spawn(socket: TcpStream, master: OwnedFd, resizer: PtyResizer) -> io::Result<Self> {
        let shutdown_handle = socket.try_clone()?;
        let thread = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || {
                let result = {
                    let mut piping = Piping::new([
                        (socket.as_fd(), [master.as_fd()]),
                        (master.as_fd(), [socket.as_fd()]),
                    ])
                    .with_control(socket.as_fd(), move |message| match message {
                        ControlMessage::Resize(size) => resizer.apply(size),
                    });
                    piping.run()
                };
                if let Err(e) = &result {
                    warn!("Bridge: piping stopped with error: {}", e);
                }
                drop(master);
                // the handle kept for forced shutdown shares this connection
                let _ = socket.shutdown(Shutdown::Both);
                drop(socket);
                debug!("Bridge: master and socket closed");
                result
            })?;
        info!("Bridge: forwarding thread started");
        Ok(Self {
            thread,
            socket: shutdown_handle,
        })
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Cut the connection so the engine observes EOF on the socket
    pub fn shutdown(&self) {
        if let Err(e) = self.socket.shutdown(Shutdown::Both) {
            debug!("Bridge: socket shutdown: {}", e);
        }
    }

    pub fn join(self) -> Result<(), PipingError> {
        match self.thread.join() {
            Ok(result) => result,
            Err(_) => {
                warn!("Bridge: forwarding thread panicked");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pty::{UnixPty, window_size};
    use nix::sys::termios::{SetArg, cfmakeraw, tcgetattr, tcsetattr};
    use std::fs::File;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::time::{Duration, Instant};

    fn connected_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    fn wait_for<F: Fn() -> bool>(condition: F) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn test_bridge_forwards_resizes_and_hangs_up() {
        let pty = UnixPty::open().unwrap();
        let mut raw = tcgetattr(pty.slave()).unwrap();
        cfmakeraw(&mut raw);
        tcsetattr(pty.slave(), SetArg::TCSANOW, &raw).unwrap();
        pty.resize(TerminalSize::new(24, 80)).unwrap();

        let shared = SharedSize::new(TerminalSize::new(24, 80));
        let resizer = PtyResizer::new(MasterHandle::try_clone_from(pty.master()).unwrap(), shared.clone());
        let (master, slave) = pty.into_parts();
        let probe = slave.try_clone().unwrap();
        let mut slave = File::from(slave);

        let (mut client, server) = connected_pair();
        client.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let bridge = Bridge::spawn(server, master, resizer).unwrap();

        client.write_all(b"ping").unwrap();
        let mut buf = [0u8; 4];
        slave.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");

        client.write_all(b"terminal_size:40,120").unwrap();
        assert!(wait_for(|| window_size(&probe).ok() == Some(TerminalSize::new(40, 120))));
        assert!(wait_for(|| shared.get() == TerminalSize::new(40, 120)));

        slave.write_all(b"pong").unwrap();
        client.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"pong");

        drop(slave);
        drop(probe);
        let mut rest = Vec::new();
        client.read_to_end(&mut rest).unwrap();
        assert!(rest.is_empty());
        assert!(wait_for(|| bridge.is_finished()));
        bridge.join().unwrap();
    }

    #[test]
    fn test_shutdown_ends_an_idle_bridge() {
        let pty = UnixPty::open().unwrap();
        let resizer = PtyResizer::new(MasterHandle::try_clone_from(pty.master()).unwrap(), SharedSize::default());
        let (master, _slave) = pty.into_parts();
        let (_client, server) = connected_pair();

        let bridge = Bridge::spawn(server, master, resizer).unwrap();
        assert!(!bridge.is_finished());

        bridge.shutdown();
        assert!(wait_for(|| bridge.is_finished()));
        bridge.join().unwrap();
    }
}
