use std::sync::Arc;

use redisboard_core::Redisboard;
use redisboard_lib::{api::AdminApi, config::AppConfig, logging, registry::StaticRegistry};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    logging::init();

    info!("Starting redisboard v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::from_env()?;
    let addr = config.listen_addr()?;
    let board = Arc::new(Redisboard::new(config.settings.clone())?);
    let registry = StaticRegistry::from_config(&config)?;
    info!("Registered {} server(s)", registry.len());

    let api = AdminApi::new(Arc::new(registry), board);
    Arc::new(api).start_server(addr).await
}
