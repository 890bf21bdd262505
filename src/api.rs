use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;

use redisboard_core::service::CHANGELIST_URL;
use redisboard_core::types::{DeleteRequest, InspectOutcome, InspectRequest, InspectView};
use redisboard_core::{RedisboardState, ServerHandle};

use crate::registry::ServerRegistry;

type ApiError = (StatusCode, &'static str);

#[derive(Clone)]
pub struct AdminApi {
    pub registry: Arc<dyn ServerRegistry>,
    pub board: RedisboardState,
}

impl AdminApi {
    pub fn new(registry: Arc<dyn ServerRegistry>, board: RedisboardState) -> Self {
        Self { registry, board }
    }

    pub async fn start_server(
        self: Arc<Self>,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let app = self.create_router();

        tracing::info!("Starting admin server on http://{}", addr);
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Admin server listening on {}", listener.local_addr()?);
        axum::serve(listener, app).await?;

        Ok(())
    }

    pub fn create_router(self: Arc<Self>) -> Router {
        Router::new()
            .route("/health", get(health_check))
            // Server list
            .route("/servers/", get(list_servers))
            // Per server
            .route("/servers/:id/inspect/", get(inspect_server))
            .route("/servers/:id/delete/", post(delete_key))
            .with_state(self)
    }

    async fn server(&self, id: u64) -> Result<ServerHandle, ApiError> {
        self.registry
            .get(id)
            .await
            .ok_or((StatusCode::NOT_FOUND, "Unknown server."))
    }
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "redisboard",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn list_servers(State(api): State<Arc<AdminApi>>) -> Json<serde_json::Value> {
    let servers = api.registry.list().await;
    let mut rows = Vec::with_capacity(servers.len());
    for server in &servers {
        rows.push(api.board.overview(server).await);
    }
    Json(serde_json::json!({ "servers": rows }))
}

async fn inspect_server(
    State(api): State<Arc<AdminApi>>,
    Path(id): Path<u64>,
    Query(req): Query<InspectRequest>,
) -> Result<Json<InspectView>, ApiError> {
    let server = api.server(id).await?;
    match api.board.inspect(&req, &server).await {
        InspectOutcome::Rendered(view) => Ok(Json(*view)),
        InspectOutcome::UnknownDatabase => Err((StatusCode::NOT_FOUND, "Unknown database.")),
    }
}

async fn delete_key(
    State(api): State<Arc<AdminApi>>,
    Path(id): Path<u64>,
    Query(req): Query<DeleteRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let server = api.server(id).await?;
    let resp = api.board.delete(&req, &server).await;
    Ok(Json(serde_json::json!({
        "level": resp.level,
        "message": resp.message,
        "outcome": resp.outcome,
        "redirect": CHANGELIST_URL
    })))
}
