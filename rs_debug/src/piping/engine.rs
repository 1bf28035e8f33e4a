/// Readiness-driven byte forwarding between descriptors
use std::collections::BTreeMap;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, RawFd};
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::fcntl::{FcntlArg, OFlag, fcntl};
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use nix::unistd::{read, write};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::piping::PipingGraph;
use crate::protocol::ControlMessage;
use crate::pty::PtyError;

/// Bytes read from a source per readiness notification
pub const CHUNK_SIZE: usize = 1024;

/// Upper bound for flushing a destination that is leaving the graph
const FLUSH_TIMEOUT: Duration = Duration::from_secs(2);
const FLUSH_POLL_MS: u16 = 100;

#[derive(Debug, Error)]
pub enum PipingError {
    #[error("poll failed: {0}")]
    Poll(Errno),
    #[error("failed to configure fd {fd}: {source}")]
    Configure { fd: RawFd, source: Errno },
}

/// Receives the control messages intercepted on the control edge.
///
/// Called synchronously from the engine thread: the next chunk from the same
/// source is not read until this returns.
pub trait ControlHandler: Send {
    fn on_control(&mut self, message: ControlMessage) -> Result<(), PtyError>;
}

impl<F> ControlHandler for F
where
    F: FnMut(ControlMessage) -> Result<(), PtyError> + Send,
{
    fn on_control(&mut self, message: ControlMessage) -> Result<(), PtyError> {
        self(message)
    }
}

struct ControlEdge<'fd> {
    fd: RawFd,
    handler: Box<dyn ControlHandler + 'fd>,
}

/// The forwarding loop.
///
/// Descriptors are borrowed for `'fd`; whoever owns them keeps them open
/// until `run` has returned.
pub struct Piping<'fd> {
    graph: PipingGraph,
    handles: BTreeMap<RawFd, BorrowedFd<'fd>>,
    control: Option<ControlEdge<'fd>>,
}

impl<'fd> Piping<'fd> {
    pub fn new<I, D>(edges: I) -> Self
    where
        I: IntoIterator<Item = (BorrowedFd<'fd>, D)>,
        D: IntoIterator<Item = BorrowedFd<'fd>>,
    {
        let mut graph = PipingGraph::new();
        let mut handles = BTreeMap::new();
        for (source, destinations) in edges {
            handles.insert(source.as_raw_fd(), source);
            for destination in destinations {
                handles.insert(destination.as_raw_fd(), destination);
                graph.add_edge(source.as_raw_fd(), destination.as_raw_fd());
            }
        }
        Self {
            graph,
            handles,
            control: None,
        }
    }

    /// Designate the source whose chunks may carry control messages
    pub fn with_control<H>(mut self, fd: BorrowedFd<'fd>, handler: H) -> Self
    where
        H: ControlHandler + 'fd,
    {
        self.control = Some(ControlEdge {
            fd: fd.as_raw_fd(),
            handler: Box::new(handler),
        });
        self
    }

    pub fn graph(&self) -> &PipingGraph {
        &self.graph
    }

    /// Forward until no source edge is left
    pub fn run(&mut self) -> Result<(), PipingError> {
        for fd in self.handles.values() {
            set_nonblocking(*fd)?;
        }
        info!(
            "Piping started with sources {:?}",
            self.graph.sources().collect::<Vec<_>>()
        );

        let mut buf = [0u8; CHUNK_SIZE];
        while self.graph.has_sources() {
            let ready = self.wait_ready()?;
            for (fd, revents) in ready {
                if self.graph.is_source(fd)
                    && revents.intersects(
                        PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR | PollFlags::POLLNVAL,
                    )
                {
                    self.read_from(fd, &mut buf);
                }
                if self.graph.is_destination(fd) {
                    if revents.contains(PollFlags::POLLOUT) {
                        self.write_to(fd);
                    } else if revents.contains(PollFlags::POLLNVAL) {
                        self.drop_destination(fd);
                    }
                }
            }
        }

        for (fd, pending) in self.graph.take_pending() {
            self.flush_blocking(fd, &pending);
        }
        info!("Piping finished: no sources left");
        Ok(())
    }

    /// Block until at least one registered descriptor is ready
    fn wait_ready(&self) -> Result<Vec<(RawFd, PollFlags)>, PipingError> {
        let mut interest: BTreeMap<RawFd, PollFlags> = BTreeMap::new();
        for fd in self.graph.sources() {
            *interest.entry(fd).or_insert(PollFlags::empty()) |= PollFlags::POLLIN;
        }
        for fd in self.graph.destinations() {
            if self.graph.has_pending(fd) {
                *interest.entry(fd).or_insert(PollFlags::empty()) |= PollFlags::POLLOUT;
            }
        }

        let order: Vec<RawFd> = interest.keys().copied().collect();
        let mut poll_fds: Vec<PollFd<'_>> = interest
            .iter()
            .filter_map(|(fd, flags)| self.handles.get(fd).map(|h| PollFd::new(*h, *flags)))
            .collect();

        loop {
            match poll(&mut poll_fds, PollTimeout::NONE) {
                Ok(_) => break,
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(PipingError::Poll(e)),
            }
        }

        Ok(order
            .into_iter()
            .zip(poll_fds.iter())
            .filter_map(|(fd, pfd)| pfd.revents().filter(|r| !r.is_empty()).map(|r| (fd, r)))
            .collect())
    }

    fn read_from(&mut self, fd: RawFd, buf: &mut [u8]) {
        let Some(handle) = self.handles.get(&fd).copied() else {
            return;
        };
        match read(handle, buf) {
            Ok(0) => self.handle_eof(fd),
            Ok(n) => {
                let data = &buf[..n];
                if let Some(control) = self.control.as_mut() {
                    if control.fd == fd {
                        if let Some(message) = ControlMessage::parse(data) {
                            debug!("Piping: intercepted {:?} on fd {}", message, fd);
                            if let Err(e) = control.handler.on_control(message) {
                                warn!("Piping: control message {:?} failed: {}", message, e);
                            }
                            return;
                        }
                    }
                }
                trace!("Piping: read {} bytes from fd {}", n, fd);
                self.graph.enqueue(fd, data);
            }
            Err(Errno::EAGAIN) | Err(Errno::EINTR) => {}
            Err(e) => {
                debug!("Piping: read error on fd {} treated as EOF: {}", fd, e);
                self.handle_eof(fd);
            }
        }
    }

    fn write_to(&mut self, fd: RawFd) {
        let Some(handle) = self.handles.get(&fd).copied() else {
            return;
        };
        let pending = self.graph.pending(fd);
        if pending.is_empty() {
            return;
        }
        match write(handle, pending) {
            Ok(n) => {
                trace!("Piping: wrote {} of {} bytes to fd {}", n, pending.len(), fd);
                self.graph.consume(fd, n);
            }
            Err(Errno::EAGAIN) | Err(Errno::EINTR) => {}
            Err(e) => {
                warn!("Piping: write to fd {} failed: {}", fd, e);
                self.drop_destination(fd);
            }
        }
    }

    fn handle_eof(&mut self, fd: RawFd) {
        info!("Piping: EOF on fd {}", fd);
        for (destination, pending) in self.graph.remove_source(fd) {
            self.flush_blocking(destination, &pending);
        }
        if self.graph.is_destination(fd) {
            self.drop_destination(fd);
        }
    }

    fn drop_destination(&mut self, fd: RawFd) {
        let pruned = self.graph.remove_destination(fd);
        if !pruned.is_empty() {
            debug!("Piping: fd {} gone, pruned idle sources {:?}", fd, pruned);
        }
    }

    /// Write out the remaining bytes of a destination that leaves the graph
    fn flush_blocking(&self, fd: RawFd, mut data: &[u8]) {
        let Some(handle) = self.handles.get(&fd).copied() else {
            return;
        };
        let deadline = Instant::now() + FLUSH_TIMEOUT;
        while !data.is_empty() {
            match write(handle, data) {
                Ok(n) => data = &data[n..],
                Err(Errno::EINTR) => continue,
                Err(Errno::EAGAIN) => {
                    let mut pfd = [PollFd::new(handle, PollFlags::POLLOUT)];
                    if let Err(e) = poll(&mut pfd, PollTimeout::from(FLUSH_POLL_MS)) {
                        if e != Errno::EINTR {
                            debug!("Piping: poll while flushing fd {} failed: {}", fd, e);
                            return;
                        }
                    }
                }
                Err(e) => {
                    debug!("Piping: dropping {} unflushed bytes for fd {}: {}", data.len(), fd, e);
                    return;
                }
            }
            if Instant::now() >= deadline {
                warn!("Piping: gave up flushing {} bytes to fd {}", data.len(), fd);
                return;
            }
        }
    }
}

fn set_nonblocking<Fd: AsFd>(fd: Fd) -> Result<(), PipingError> {
    let fd = fd.as_fd();
    let configure = |source| PipingError::Configure {
        fd: fd.as_raw_fd(),
        source,
    };
    let flags = fcntl(fd, FcntlArg::F_GETFL).map_err(configure)?;
    let flags = OFlag::from_bits_truncate(flags);
    fcntl(fd, FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK)).map_err(configure)?;
    Ok(())
}
