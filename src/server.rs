//! MCP transports.
//!
//! The same [`McpBridge`] is served over one of two transports:
//!
//! | Transport | Entry point | Notes |
//! |-----------|-------------|-------|
//! | `stdio`   | [`run_stdio`] | Default. stdout carries protocol frames only |
//! | `http`    | [`run_http`]  | Streamable HTTP at `/mcp`, plus `GET /health` |
//!
//! # Client configuration
//!
//! ```json
//! {
//!   "mcpServers": {
//!     "rag": {
//!       "command": "rag-server",
//!       "args": ["serve"],
//!       "env": { "LLAMA_RAG_DATA_DIR": "/path/to/documents" }
//!     }
//!   }
//! }
//! ```

use axum::{routing::get, Json, Router};
use rmcp::transport::streamable_http_server::{
    session::local::LocalSessionManager, StreamableHttpService,
};
use rmcp::ServiceExt;
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::mcp::McpBridge;
use crate::service::RagService;
use crate::tools::ToolRegistry;

fn bridge(service: Arc<RagService>) -> McpBridge {
    McpBridge::new(service, Arc::new(ToolRegistry::with_builtins()))
}

/// Serve MCP over stdin/stdout until the client disconnects.
pub async fn run_stdio(service: Arc<RagService>) -> anyhow::Result<()> {
    tracing::info!("serving MCP over stdio");
    let running = bridge(service).serve(rmcp::transport::stdio()).await?;
    running.waiting().await?;
    Ok(())
}

/// Build the HTTP router: the MCP endpoint at `/mcp` and a health check.
pub fn router(service: Arc<RagService>) -> Router {
    let handler = bridge(service);
    let mcp = StreamableHttpService::new(
        move || Ok(handler.clone()),
        LocalSessionManager::default().into(),
        Default::default(),
    );

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest_service("/mcp", mcp)
        .route("/health", get(handle_health))
        .layer(cors)
}

/// Serve MCP over streamable HTTP on `bind` until the process is stopped.
pub async fn run_http(service: Arc<RagService>, bind: &str) -> anyhow::Result<()> {
    let app = router(service);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!(address = %bind, "serving MCP over http at /mcp");
    axum::serve(listener, app).await?;
    Ok(())
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
