/// Configuration module for rs_debug
#[allow(clippy::module_inception)]
mod config;
mod config_loader;
mod error;
mod logging;

pub use config::*;
pub use config_loader::{ConfigLoader, DEFAULT_CONFIG_FILE, ENV_PREFIX, default_config_path};
pub use error::ConfigError;
pub use logging::init_logging;
