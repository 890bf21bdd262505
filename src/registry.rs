//! Lookup of registered servers.

use crate::config::{AppConfig, ConfigError};
use async_trait::async_trait;
use redisboard_core::ServerHandle;
use std::collections::BTreeMap;

/// Where the host keeps its registered servers.
#[async_trait]
pub trait ServerRegistry: Send + Sync {
    /// All servers, ordered by id.
    async fn list(&self) -> Vec<ServerHandle>;

    async fn get(&self, id: u64) -> Option<ServerHandle>;
}

/// A fixed set of servers, usually built from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    servers: BTreeMap<u64, ServerHandle>,
}

impl StaticRegistry {
    pub fn new(handles: impl IntoIterator<Item = ServerHandle>) -> Self {
        Self {
            servers: handles.into_iter().map(|h| (h.id(), h)).collect(),
        }
    }

    /// Build Redis-backed handles for every configured server.
    pub fn from_config(config: &AppConfig) -> Result<Self, ConfigError> {
        let handles = config
            .servers
            .iter()
            .map(|server| ServerHandle::redis(server.clone(), &config.settings))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(handles))
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}

#[async_trait]
impl ServerRegistry for StaticRegistry {
    async fn list(&self) -> Vec<ServerHandle> {
        self.servers.values().cloned().collect()
    }

    async fn get(&self, id: u64) -> Option<ServerHandle> {
        self.servers.get(&id).cloned()
    }
}
