/// Configuration data structures for rs_debug
use serde::{Deserialize, Deserializer, Serialize};

pub const DEFAULT_IP: &str = "localhost";
pub const DEFAULT_PORT: u16 = 3513;
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Where and how an attach listens
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AttachConfig {
    /// Address to listen on
    pub ip: String,

    /// Port to listen on
    pub port: u16,

    /// Let the OS pick a free port instead of `port`
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub auto_select_port: bool,

    /// Dispatch loop prompt
    pub prompt: String,

    /// Default tracing filter, `RUST_LOG` wins when set
    pub log_level: String,
}

impl Default for AttachConfig {
    fn default() -> Self {
        Self {
            ip: DEFAULT_IP.to_string(),
            port: DEFAULT_PORT,
            auto_select_port: false,
            prompt: crate::session::DEFAULT_PROMPT.to_string(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl AttachConfig {
    /// The port to bind: 0 when auto-selection is on
    pub fn effective_port(&self) -> u16 {
        if self.auto_select_port { 0 } else { self.port }
    }
}

/// `1`, `true`, `yes` and `on` (any case) enable a flag
pub fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

fn deserialize_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
        Text(String),
    }

    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(value) => value,
        Flag::Int(value) => value == 1,
        Flag::Text(value) => parse_flag(&value),
    })
}
