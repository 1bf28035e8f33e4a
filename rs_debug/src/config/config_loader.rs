/// Configuration loader for rs_debug
use std::path::{Path, PathBuf};

use config::{Config, Environment, File, FileFormat};
use tracing::{debug, info};

use crate::config::{AttachConfig, ConfigError, DEFAULT_IP, DEFAULT_LOG_LEVEL, DEFAULT_PORT};
use crate::session::DEFAULT_PROMPT;

pub const ENV_PREFIX: &str = "RS_DEBUG";
pub const DEFAULT_CONFIG_FILE: &str = "rs_debug.toml";

/// Layers defaults, an optional TOML file and `RS_DEBUG_*` variables
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    file: Option<PathBuf>,
    env_prefix: String,
    load_dotenv: bool,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            file: default_config_path(),
            env_prefix: ENV_PREFIX.to_string(),
            load_dotenv: true,
        }
    }

    /// Read this file instead of `rs_debug.toml` in the working directory
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Self {
        self.file = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Skip loading a `.env` file
    pub fn without_dotenv(mut self) -> Self {
        self.load_dotenv = false;
        self
    }

    pub fn load(&self) -> Result<AttachConfig, ConfigError> {
        if self.load_dotenv {
            match dotenvy::dotenv() {
                Ok(path) => debug!("Loaded environment from {:?}", path),
                Err(e) if e.not_found() => {}
                Err(e) => debug!("Ignoring .env: {}", e),
            }
        }

        let mut builder = Config::builder()
            .set_default("ip", DEFAULT_IP)?
            .set_default("port", i64::from(DEFAULT_PORT))?
            .set_default("auto_select_port", false)?
            .set_default("prompt", DEFAULT_PROMPT)?
            .set_default("log_level", DEFAULT_LOG_LEVEL)?;
        if let Some(path) = &self.file {
            info!("Loading configuration from file: {:?} (optional)", path);
            builder = builder.add_source(File::from(path.as_path()).format(FileFormat::Toml).required(false));
        }
        let config: AttachConfig = builder
            .add_source(
                Environment::with_prefix(&self.env_prefix)
                    .prefix_separator("_")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        validate(&config)?;
        debug!("Loaded configuration: {:?}", config);
        Ok(config)
    }
}

fn validate(config: &AttachConfig) -> Result<(), ConfigError> {
    if config.ip.trim().is_empty() {
        return Err(ConfigError::Invalid("ip must not be empty".to_string()));
    }
    if config.prompt.is_empty() {
        return Err(ConfigError::Invalid("prompt must not be empty".to_string()));
    }
    Ok(())
}

/// `rs_debug.toml` in the working directory
pub fn default_config_path() -> Option<PathBuf> {
    std::env::current_dir().ok().map(|dir| dir.join(DEFAULT_CONFIG_FILE))
}
