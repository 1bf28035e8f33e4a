/// Wire protocol between the debug client and the session server
mod control;
mod error;
pub mod handshake;

pub use control::{ControlMessage, TERMINAL_SIZE_PREFIX};
pub use error::{ProtocolError, ProtocolResult};
pub use handshake::{HandshakeMessage, encode_frame, receive_handshake, send_handshake};
