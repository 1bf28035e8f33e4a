use std::time::Duration;

use rs_debug::protocol::ProtocolError;
use rs_debug::pty::PtyError;
use thiserror::Error;
use toml::de::Error as TomlDeError;
use tracing_subscriber::util::TryInitError;

/// Result type alias with our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Failure to reach the debug session; no session exists on either side
#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("Connection to {addr} refused")]
    Refused { addr: String },

    #[error("Connection to {addr} timed out after {timeout:?}")]
    Timeout { addr: String, timeout: Duration },

    #[error("Connection failed: {0}")]
    Io(#[from] std::io::Error),
}

impl ConnectError {
    /// Refusals and timeouts usually mean a wrong port
    pub fn is_wrong_port(&self) -> bool {
        matches!(self, ConnectError::Refused { .. } | ConnectError::Timeout { .. })
    }
}

/// Custom error type for the debug client
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Connect(#[from] ConnectError),

    /// Handshake encoding error
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Local terminal error
    #[error("Terminal error: {0}")]
    Terminal(#[from] PtyError),

    #[error("System call failed: {0}")]
    Sys(#[from] nix::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration parsing error
    #[error("Config error: {0}")]
    Config(#[from] TomlDeError),

    /// Tracing/logging error
    #[error("Logging error: {0}")]
    Logging(#[from] TryInitError),

    /// File not found error
    #[error("File not found: {0}")]
    FileNotFound(String),
}
