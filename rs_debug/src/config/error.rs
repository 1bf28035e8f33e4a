/// Error types for configuration module
use thiserror::Error;

/// Configuration error type
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A source could not be read or did not match the expected shape
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// Loaded, but unusable
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
