//! Application configuration: listen address, engine settings and the
//! registered servers.
//!
//! Loaded from the YAML or JSON file named by `REDISBOARD_CONFIG` (format
//! chosen by extension). `REDISBOARD_LISTEN` overrides the listen address.

use redisboard_core::types::ServerConfig;
use redisboard_core::{BoardError, BoardSettings};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;

pub const CONFIG_ENV: &str = "REDISBOARD_CONFIG";
pub const LISTEN_ENV: &str = "REDISBOARD_LISTEN";

fn default_listen() -> String {
    "127.0.0.1:8088".into()
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse YAML config {path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("failed to parse JSON config {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid listen address {0:?}")]
    Listen(String),
    #[error("server id {0} is registered twice")]
    DuplicateServer(u64),
    #[error(transparent)]
    Board(#[from] BoardError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default)]
    pub settings: BoardSettings,
    #[serde(default)]
    pub servers: Vec<ServerConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            settings: BoardSettings::default(),
            servers: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Read a config file; `.json` files are parsed as JSON, anything else as
    /// YAML.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: display.clone(),
            source,
        })?;

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        if is_json {
            serde_json::from_str(&raw).map_err(|source| ConfigError::Json {
                path: display,
                source,
            })
        } else {
            serde_yaml::from_str(&raw).map_err(|source| ConfigError::Yaml {
                path: display,
                source,
            })
        }
    }

    /// Load from the process environment and validate.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load_with(|name| std::env::var(name).ok())
    }

    /// Load using `lookup` for environment variables.
    pub fn load_with(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = match lookup(CONFIG_ENV) {
            Some(path) => Self::from_path(Path::new(&path))?,
            None => Self::default(),
        };
        if let Some(listen) = lookup(LISTEN_ENV) {
            config.listen = listen;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen
            .parse()
            .map_err(|_| ConfigError::Listen(self.listen.clone()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.listen_addr()?;
        self.settings.validate()?;
        let mut seen = HashSet::new();
        for server in &self.servers {
            if !seen.insert(server.id) {
                return Err(ConfigError::DuplicateServer(server.id));
            }
        }
        Ok(())
    }
}
