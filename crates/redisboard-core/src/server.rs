//! A registered server paired with the means to reach it.

use crate::config::BoardSettings;
use crate::connection::{ConnectionProvider, RedisProvider, StoreConnection};
use crate::error::BoardResult;
use crate::types::ServerConfig;
use std::fmt;
use std::sync::Arc;

/// Registration plus connection provider. Cheap to clone.
#[derive(Clone)]
pub struct ServerHandle {
    config: ServerConfig,
    provider: Arc<dyn ConnectionProvider>,
}

impl ServerHandle {
    pub fn new(config: ServerConfig, provider: Arc<dyn ConnectionProvider>) -> Self {
        Self { config, provider }
    }

    /// Handle backed by a real Redis client built from the registration.
    pub fn redis(config: ServerConfig, settings: &BoardSettings) -> BoardResult<Self> {
        let provider = RedisProvider::new(&config, settings)?;
        Ok(Self::new(config, Arc::new(provider)))
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn id(&self) -> u64 {
        self.config.id
    }

    /// Open a fresh connection, positioned on database 0.
    pub async fn connect(&self) -> BoardResult<Box<dyn StoreConnection>> {
        self.provider.connect().await
    }
}

impl fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerHandle")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
