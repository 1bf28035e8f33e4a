use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::thread;
use std::time::Duration;

use rs_debug::piping::CHUNK_SIZE;
use rs_debug::protocol::{ControlMessage, HandshakeMessage, encode_frame};
use rs_debug::pty::TerminalSize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;

use crate::error::{ConnectError, Result};
use crate::terminal::{Tty, current_size};

const INPUT_THREAD_NAME: &str = "rs-debug-stdin";
const CHANNEL_CAPACITY: usize = 64;

/// Client side of a debug session: one TCP connection carrying the handshake,
/// then raw terminal traffic in both directions
pub struct DebugClient {
    stream: TcpStream,
    addr: String,
}

impl DebugClient {
    /// Connect to a listening session, giving up after `timeout`
    pub async fn connect(ip: &str, port: u16, timeout: Duration) -> std::result::Result<Self, ConnectError> {
        let addr = format!("{ip}:{port}");
        tracing::info!("Connecting to debug session at {}", addr);

        let stream = match tokio::time::timeout(timeout, TcpStream::connect((ip, port))).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) if e.kind() == ErrorKind::ConnectionRefused => return Err(ConnectError::Refused { addr }),
            Ok(Err(e)) => return Err(ConnectError::Io(e)),
            Err(_) => return Err(ConnectError::Timeout { addr, timeout }),
        };
        stream.set_nodelay(true).map_err(ConnectError::Io)?;

        tracing::info!("Connected to {}", addr);
        Ok(Self { stream, addr })
    }

    /// Send the handshake; must precede any terminal traffic
    pub async fn handshake(&mut self, message: &HandshakeMessage) -> Result<()> {
        let frame = encode_frame(message)?;
        self.stream.write_all(&frame).await?;
        self.stream.flush().await?;
        tracing::debug!(
            "Sent handshake to {}: term_type={}, term_size={}",
            self.addr,
            message.term_type,
            message.term_size
        );
        Ok(())
    }

    /// Bridge the local terminal to the session until the server hangs up
    pub async fn run(self, tty: &Tty) -> Result<()> {
        let input = spawn_input_reader(tty.try_clone()?)?;
        let resizes = watch_window_size(tty.try_clone()?)?;
        let output = tty.try_clone()?;

        let (reader, writer) = self.stream.into_split();
        pump(reader, writer, input, resizes, output).await?;
        tracing::info!("Session at {} closed the connection", self.addr);
        Ok(())
    }
}

/// Blocking reads from the terminal on their own thread, handed over as chunks
fn spawn_input_reader(mut tty: File) -> Result<mpsc::Receiver<Vec<u8>>> {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    thread::Builder::new()
        .name(INPUT_THREAD_NAME.to_string())
        .spawn(move || {
            let mut buf = [0u8; CHUNK_SIZE];
            loop {
                match tty.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.blocking_send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => {
                        tracing::debug!("Terminal read failed: {}", e);
                        break;
                    }
                }
            }
            tracing::debug!("Terminal input closed");
        })?;
    Ok(rx)
}

/// New window sizes, one per SIGWINCH
fn watch_window_size(tty: File) -> Result<mpsc::Receiver<TerminalSize>> {
    let mut winch = signal(SignalKind::window_change())?;
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    tokio::spawn(async move {
        while winch.recv().await.is_some() {
            let size = current_size(&tty);
            tracing::debug!("Window changed to {}", size);
            if tx.send(size).await.is_err() {
                break;
            }
        }
    });
    Ok(rx)
}

/// Forward socket output to `output` and keystrokes and resizes to the socket.
///
/// Every resize goes out as a write of its own so the server reads it as one
/// chunk. Returns once the socket reaches EOF.
pub(crate) async fn pump<R, W, O>(
    mut socket_rx: R,
    mut socket_tx: W,
    mut input: mpsc::Receiver<Vec<u8>>,
    mut resizes: mpsc::Receiver<TerminalSize>,
    mut output: O,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    O: Write,
{
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut input_open = true;
    let mut resizes_open = true;

    loop {
        tokio::select! {
            read = socket_rx.read(&mut buf) => {
                let n = read?;
                if n == 0 {
                    break;
                }
                output.write_all(&buf[..n])?;
                output.flush()?;
            }
            chunk = input.recv(), if input_open => match chunk {
                Some(bytes) => socket_tx.write_all(&bytes).await?,
                None => input_open = false,
            },
            size = resizes.recv(), if resizes_open => match size {
                Some(size) => {
                    socket_tx.write_all(&ControlMessage::Resize(size).encode()).await?;
                    socket_tx.flush().await?;
                }
                None => resizes_open = false,
            },
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rs_debug::protocol::receive_handshake;
    use rs_debug::pty::UnixPty;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_pump_forwards_both_ways() {
        let (client_side, mut server) = duplex(4096);
        let (socket_rx, socket_tx) = tokio::io::split(client_side);
        let (input_tx, input_rx) = mpsc::channel(4);
        let (resize_tx, resize_rx) = mpsc::channel(4);

        let mut output = Vec::new();
        let server_side = async move {
            server.write_all(b"(dbg) ").await.unwrap();

            input_tx.send(b"ls\n".to_vec()).await.unwrap();
            let mut keys = [0u8; 3];
            server.read_exact(&mut keys).await.unwrap();
            assert_eq!(&keys, b"ls\n");

            resize_tx.send(TerminalSize::new(40, 120)).await.unwrap();
            let mut control = [0u8; 20];
            server.read_exact(&mut control).await.unwrap();
            assert_eq!(&control, b"terminal_size:40,120");

            server.write_all(b"bye").await.unwrap();
            drop(server);
        };

        let (pumped, ()) = tokio::join!(pump(socket_rx, socket_tx, input_rx, resize_rx, &mut output), server_side);
        pumped.unwrap();
        assert_eq!(output, b"(dbg) bye");
    }

    #[tokio::test]
    async fn test_pump_outlives_closed_input() {
        let (client_side, mut server) = duplex(4096);
        let (socket_rx, socket_tx) = tokio::io::split(client_side);
        let (input_tx, input_rx) = mpsc::channel::<Vec<u8>>(1);
        let (resize_tx, resize_rx) = mpsc::channel(1);
        drop(input_tx);
        drop(resize_tx);

        let mut output = Vec::new();
        let server_side = async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            server.write_all(b"still here").await.unwrap();
        };

        let (pumped, ()) = tokio::join!(pump(socket_rx, socket_tx, input_rx, resize_rx, &mut output), server_side);
        pumped.unwrap();
        assert_eq!(output, b"still here");
    }

    #[tokio::test]
    async fn test_pump_stops_at_socket_eof() {
        let socket_rx = tokio_test::io::Builder::new().read(b"Closing connection\r\n").build();
        let socket_tx = tokio_test::io::Builder::new().build();
        let (_input_tx, input_rx) = mpsc::channel::<Vec<u8>>(1);
        let (_resize_tx, resize_rx) = mpsc::channel(1);

        let mut output = Vec::new();
        pump(socket_rx, socket_tx, input_rx, resize_rx, &mut output).await.unwrap();
        assert_eq!(output, b"Closing connection\r\n");
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = DebugClient::connect("127.0.0.1", port, Duration::from_secs(5))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ConnectError::Refused { .. }));
        assert!(err.is_wrong_port());
    }

    #[tokio::test]
    async fn test_handshake_reaches_the_server() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            receive_handshake(&mut stream).unwrap()
        });

        let attrs = UnixPty::open().unwrap().tty_attrs().unwrap();
        let hello = HandshakeMessage::new(attrs, Some("xterm".into()), TerminalSize::new(30, 100));
        let mut client = DebugClient::connect("127.0.0.1", port, Duration::from_secs(5)).await.unwrap();
        client.handshake(&hello).await.unwrap();

        assert_eq!(server.join().unwrap(), hello);
    }
}
