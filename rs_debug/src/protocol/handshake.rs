/// Connection-start handshake carrying the client's terminal configuration
use std::io::{ErrorKind, Read, Write};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::protocol::{ProtocolError, ProtocolResult};
use crate::pty::{TermAttrs, TerminalSize};

/// Largest accepted handshake body
pub const MAX_FRAME_LEN: usize = 64 * 1024;

const LEN_PREFIX: usize = 4;

/// The single message a client sends before any terminal traffic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeMessage {
    pub term_attrs: TermAttrs,
    #[serde(default = "unknown_term_type")]
    pub term_type: String,
    /// `[rows, columns]` on the wire
    #[serde(with = "size_pair")]
    pub term_size: TerminalSize,
}

fn unknown_term_type() -> String {
    "unknown".to_string()
}

impl HandshakeMessage {
    pub fn new(term_attrs: TermAttrs, term_type: Option<String>, term_size: TerminalSize) -> Self {
        Self {
            term_attrs,
            term_type: term_type
                .filter(|t| !t.is_empty())
                .unwrap_or_else(unknown_term_type),
            term_size,
        }
    }
}

mod size_pair {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use crate::pty::TerminalSize;

    pub fn serialize<S: Serializer>(size: &TerminalSize, s: S) -> Result<S::Ok, S::Error> {
        (size.rows, size.cols).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<TerminalSize, D::Error> {
        let (rows, cols) = <(u16, u16)>::deserialize(d)?;
        Ok(TerminalSize::new(rows, cols))
    }
}

/// Length-prefixed JSON frame for writers that are not `std::io::Write` (async sockets)
pub fn encode_frame(message: &HandshakeMessage) -> ProtocolResult<Vec<u8>> {
    let body = serde_json::to_vec(message)?;
    if body.len() > MAX_FRAME_LEN {
        return Err(ProtocolError::TooLarge(body.len()));
    }
    let mut frame = Vec::with_capacity(LEN_PREFIX + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Send the handshake in one write, before any other traffic
pub fn send_handshake<W: Write>(writer: &mut W, message: &HandshakeMessage) -> ProtocolResult<()> {
    let frame = encode_frame(message)?;
    writer.write_all(&frame)?;
    writer.flush()?;
    debug!("Sent handshake frame of {} bytes", frame.len());
    Ok(())
}

/// Block until exactly one handshake frame has been read.
///
/// Reads no further than the end of the frame, so terminal traffic that
/// follows stays in the socket for the piping engine.
pub fn receive_handshake<R: Read>(reader: &mut R) -> ProtocolResult<HandshakeMessage> {
    let mut prefix = [0u8; LEN_PREFIX];
    read_exact_or_truncated(reader, &mut prefix)?;
    let len = u32::from_be_bytes(prefix) as usize;
    if len > MAX_FRAME_LEN {
        return Err(ProtocolError::TooLarge(len));
    }

    let mut body = vec![0u8; len];
    read_exact_or_truncated(reader, &mut body)?;
    let message: HandshakeMessage = serde_json::from_slice(&body)?;

    info!(
        "Received handshake: term_type={}, term_size={}",
        message.term_type, message.term_size
    );
    Ok(message)
}

fn read_exact_or_truncated<R: Read>(reader: &mut R, buf: &mut [u8]) -> ProtocolResult<()> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => ProtocolError::Truncated { expected: buf.len() },
        _ => ProtocolError::Io(e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn attrs() -> TermAttrs {
        TermAttrs {
            iflag: 0x500,
            oflag: 0x5,
            cflag: 0xbf,
            lflag: 0x8a3b,
            line: 0,
            cc: vec![3, 28, 127, 21, 4, 0, 1, 0],
        }
    }

    #[test]
    fn test_wire_shape_is_a_flat_mapping() {
        let message = HandshakeMessage::new(attrs(), Some("xterm".into()), TerminalSize::new(24, 80));
        let frame = encode_frame(&message).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&frame[LEN_PREFIX..]).unwrap();

        assert_eq!(value["term_type"], "xterm");
        assert_eq!(value["term_size"], serde_json::json!([24, 80]));
        assert!(value["term_attrs"].is_object());
    }

    #[test]
    fn test_receive_stops_at_frame_boundary() {
        let message = HandshakeMessage::new(attrs(), Some("xterm".into()), TerminalSize::new(24, 80));
        let mut wire = encode_frame(&message).unwrap();
        wire.extend_from_slice(b"ls\n");

        let mut cursor = Cursor::new(wire);
        let received = receive_handshake(&mut cursor).unwrap();

        assert_eq!(received, message);
        let mut rest = Vec::new();
        cursor.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"ls\n");
    }

    #[test]
    fn test_missing_term_type_defaults_to_unknown() {
        let body = serde_json::json!({
            "term_attrs": attrs(),
            "term_size": [30, 100],
        });
        let body = serde_json::to_vec(&body).unwrap();
        let mut wire = (body.len() as u32).to_be_bytes().to_vec();
        wire.extend_from_slice(&body);

        let received = receive_handshake(&mut Cursor::new(wire)).unwrap();
        assert_eq!(received.term_type, "unknown");
        assert_eq!(received.term_size, TerminalSize::new(30, 100));
    }

    #[test]
    fn test_empty_term_type_becomes_unknown() {
        let message = HandshakeMessage::new(attrs(), Some(String::new()), TerminalSize::default());
        assert_eq!(message.term_type, "unknown");
    }

    #[test]
    fn test_truncated_frame_is_rejected() {
        let message = HandshakeMessage::new(attrs(), None, TerminalSize::new(24, 80));
        let wire = encode_frame(&message).unwrap();

        let err = receive_handshake(&mut Cursor::new(&wire[..wire.len() - 3])).unwrap_err();
        assert!(matches!(err, ProtocolError::Truncated { .. }));

        let err = receive_handshake(&mut Cursor::new(&wire[..2])).unwrap_err();
        assert!(matches!(err, ProtocolError::Truncated { expected: 4 }));
    }

    #[test]
    fn test_malformed_and_oversized_frames_are_rejected() {
        let mut wire = 5u32.to_be_bytes().to_vec();
        wire.extend_from_slice(b"{oops");
        let err = receive_handshake(&mut Cursor::new(wire)).unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));

        let wire = (MAX_FRAME_LEN as u32 + 1).to_be_bytes().to_vec();
        let err = receive_handshake(&mut Cursor::new(wire)).unwrap_err();
        assert!(matches!(err, ProtocolError::TooLarge(_)));
    }
}
