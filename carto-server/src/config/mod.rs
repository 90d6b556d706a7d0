//! Configuration module for carto-server.
//!
//! Handles loading configuration from an optional TOML file and applying
//! command line overrides on top of it.

pub mod file;

use crate::config::file::FileConfig;
use carto_core::config::{EventsConfig, LivenessConfig, ServerConfig};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    ValidationError(String),
}

/// Values given on the command line; each one replaces the file value.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub listen: Option<SocketAddr>,
    pub max_concurrent_requests: Option<usize>,
    pub write_wait_ms: Option<u64>,
    pub pong_wait_ms: Option<u64>,
    pub event_ttl_secs: Option<u64>,
}

/// Loaded configuration result containing all parts.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub server: ServerConfig,
    pub liveness: LivenessConfig,
    pub events: EventsConfig,
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
    overrides: ConfigOverrides,
}

impl ConfigLoader {
    /// Create a new config loader.
    ///
    /// Without a path, built-in defaults stand in for the file.
    pub fn new(config_path: Option<impl AsRef<Path>>, overrides: ConfigOverrides) -> Self {
        Self {
            config_path: config_path.map(|p| p.as_ref().to_path_buf()),
            overrides,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Load and process the configuration.
    ///
    /// This will:
    /// 1. Read the TOML file, if one was given
    /// 2. Apply CLI overrides
    /// 3. Validate the configuration
    /// 4. Build the runtime configuration
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let mut file_config = match &self.config_path {
            Some(path) => {
                let config_content = std::fs::read_to_string(path)?;
                toml::from_str(&config_content)?
            }
            None => FileConfig::default(),
        };

        self.apply_overrides(&mut file_config);
        validate(&file_config)?;

        Ok(build_loaded_config(file_config))
    }

    /// Reload the configuration (used during SIGHUP).
    ///
    /// CLI overrides still take precedence over the file.
    pub fn reload(&self) -> Result<LoadedConfig, ConfigError> {
        self.load()
    }

    fn apply_overrides(&self, config: &mut FileConfig) {
        let o = &self.overrides;
        if let Some(listen) = o.listen {
            config.server.listen = listen;
        }
        if let Some(max) = o.max_concurrent_requests {
            config.server.max_concurrent_requests = max;
        }
        if let Some(ms) = o.write_wait_ms {
            config.liveness.write_wait_ms = ms;
        }
        if let Some(ms) = o.pong_wait_ms {
            config.liveness.pong_wait_ms = ms;
        }
        if let Some(secs) = o.event_ttl_secs {
            config.events.ttl_secs = secs;
        }
    }
}

fn validate(config: &FileConfig) -> Result<(), ConfigError> {
    let checks = [
        (config.server.max_concurrent_requests as u64, "server.max_concurrent_requests"),
        (config.liveness.write_wait_ms, "liveness.write_wait_ms"),
        (config.liveness.pong_wait_ms, "liveness.pong_wait_ms"),
        (config.events.queue_capacity as u64, "events.queue_capacity"),
        (config.events.ttl_secs, "events.ttl_secs"),
        (config.events.retain_max as u64, "events.retain_max"),
    ];
    for (value, key) in checks {
        if value == 0 {
            return Err(ConfigError::ValidationError(format!(
                "{key} must be greater than zero"
            )));
        }
    }
    Ok(())
}

fn build_loaded_config(file_config: FileConfig) -> LoadedConfig {
    LoadedConfig {
        server: ServerConfig {
            listen: file_config.server.listen,
            max_concurrent_requests: file_config.server.max_concurrent_requests,
        },
        liveness: LivenessConfig::new(
            Duration::from_millis(file_config.liveness.write_wait_ms),
            Duration::from_millis(file_config.liveness.pong_wait_ms),
        ),
        events: EventsConfig {
            queue_capacity: file_config.events.queue_capacity,
            ttl: Duration::from_secs(file_config.events.ttl_secs),
            retain_max: file_config.events.retain_max,
        },
    }
}
