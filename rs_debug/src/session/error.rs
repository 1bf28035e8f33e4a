/// Error types for attaching a session
use std::io;

use thiserror::Error;

use crate::config::ConfigError;
use crate::protocol::ProtocolError;
use crate::pty::PtyError;

/// Listening socket failures; the session is never created
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to accept a connection: {0}")]
    Accept(#[source] io::Error),

    #[error("Failed to configure the connection: {0}")]
    Socket(#[source] io::Error),
}

/// Everything that can stop an attach attempt before the session starts
#[derive(Error, Debug)]
pub enum AttachError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Handshake failed: {0}")]
    Handshake(#[from] ProtocolError),

    #[error("PTY setup failed: {0}")]
    Pty(#[from] PtyError),

    #[error("Failed to start the session: {0}")]
    Io(#[from] io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("A debug session is already active in this process")]
    AlreadyActive,
}
