/// In-band control messages smuggled through the client-to-server byte stream
use crate::pty::TerminalSize;

pub const TERMINAL_SIZE_PREFIX: &[u8] = b"terminal_size:";

/// Metadata carried on the data edge.
///
/// Framing relies on each message arriving as its own read: a chunk is a
/// control message only if the whole chunk parses as one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    Resize(TerminalSize),
}

impl ControlMessage {
    /// `terminal_size:<rows>,<columns>`
    pub fn encode(&self) -> Vec<u8> {
        match self {
            ControlMessage::Resize(size) => {
                format!("terminal_size:{},{}", size.rows, size.cols).into_bytes()
            }
        }
    }

    /// Interpret a whole read chunk; `None` means the chunk is ordinary data
    pub fn parse(chunk: &[u8]) -> Option<Self> {
        let payload = chunk.strip_prefix(TERMINAL_SIZE_PREFIX)?;
        let payload = std::str::from_utf8(payload).ok()?;
        let (rows, cols) = payload.split_once(',')?;
        let size = TerminalSize::new(parse_dimension(rows)?, parse_dimension(cols)?);
        size.is_valid().then_some(ControlMessage::Resize(size))
    }
}

fn parse_dimension(text: &str) -> Option<u16> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}
