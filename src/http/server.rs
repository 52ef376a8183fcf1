//! HTTP server for the question answering API

use super::handler::{ask_handler, schema_handler, search_handler, status_handler};
use crate::config::ServerConfig;
use crate::nlq::NLQPipeline;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Build the API router around a shared pipeline
pub fn router(pipeline: Arc<NLQPipeline>) -> Router {
    Router::new()
        .route("/api/ask", post(ask_handler))
        .route("/api/search", post(search_handler))
        .route("/api/schema", get(schema_handler))
        .route("/api/status", get(status_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(pipeline)
}

/// HTTP server serving the API
pub struct HttpServer {
    pipeline: Arc<NLQPipeline>,
    config: ServerConfig,
}

impl HttpServer {
    pub fn new(pipeline: Arc<NLQPipeline>, config: ServerConfig) -> Self {
        Self { pipeline, config }
    }

    /// Bind and serve until the process stops
    pub async fn start(&self) -> std::io::Result<()> {
        let app = router(Arc::clone(&self.pipeline));

        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;

        info!("API available at http://{}", addr);

        axum::serve(listener, app).await
    }
}
