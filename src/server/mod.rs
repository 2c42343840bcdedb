//! HTTP query service
//!
//! Loads the embedding model, the vector store and the LLM client once at
//! startup and serves `/`, `/health`, `/query`, `/search` and `/stats`.

mod routes;
mod state;

pub use state::AppState;

use crate::client::RagClient;
use crate::config::{Config, ServerConfig};
use crate::error::RagError;
use crate::generation::{LlmProvider, build_provider};
use axum::Router;
use axum::routing::{get, post};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// RAG HTTP server
pub struct RagServer {
    config: ServerConfig,
    state: AppState,
}

impl RagServer {
    /// Open the existing vector store and build the LLM client
    ///
    /// Fails when nothing has been indexed yet.
    pub async fn new(config: Config) -> Result<Self, RagError> {
        let llm = build_provider(&config.llm)?;
        let client = RagClient::open_existing(config).await?;

        if !llm.health_check().await {
            tracing::warn!(
                "LLM backend '{}' is not reachable, /query will fail until it is",
                client.config().llm.provider
            );
        }

        Ok(Self::from_parts(client, llm))
    }

    pub fn from_parts(client: RagClient, llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            config: client.config().server.clone(),
            state: AppState::new(client, llm),
        }
    }

    /// Build the router with all routes
    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// Get the server address
    pub fn address(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }

    /// Serve until `shutdown` is cancelled
    pub async fn serve(self, shutdown: CancellationToken) -> Result<(), RagError> {
        let router = self.router();
        let listener = tokio::net::TcpListener::bind(self.address()).await?;
        tracing::info!("Starting RAG server on http://{}", listener.local_addr()?);

        axum::serve(listener, router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        tracing::info!("Server stopped");
        Ok(())
    }
}

/// Routes plus permissive CORS and request tracing
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(routes::root))
        .route("/health", get(routes::health))
        .route("/query", post(routes::query))
        .route("/search", get(routes::search))
        .route("/stats", get(routes::stats))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
