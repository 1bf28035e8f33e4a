use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};

pub const DEFAULT_CONFIG_FILE: &str = "client.toml";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Connection configuration
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ConnectConfig {
    /// Seconds to wait for the session to accept the connection
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl ConnectConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Main configuration structure
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientConfig {
    #[serde(default)]
    pub connect: ConnectConfig,
    /// Terminal type announced in the handshake, `$TERM` when unset
    #[serde(default)]
    pub term_type: Option<String>,
}

impl ClientConfig {
    /// Load configuration from file or use default values
    pub fn load(config_path: Option<String>) -> Result<Self> {
        match config_path {
            Some(path) => Self::from_file(&path),
            None => {
                if Path::new(DEFAULT_CONFIG_FILE).exists() {
                    Self::from_file(DEFAULT_CONFIG_FILE)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &str) -> Result<Self> {
        tracing::info!("Loading configuration from file: {}", path);

        let content = fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::FileNotFound(path.to_string()),
            _ => Error::Io(e),
        })?;

        let config = toml::from_str(&content)?;

        tracing::debug!("Loaded configuration: {:?}", config);
        Ok(config)
    }
}
