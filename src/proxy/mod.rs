// Proxy module - HTTP server fronting the chat completion providers
//
// Routes:
//   POST /api/chat       branch-aware chat, optionally with the search tool
//   POST /api/assistant  single-prompt markdown assistant
//
// The server keeps no per-conversation state: every request carries the
// context it needs, and only the HTTP client and config are shared.

mod chat;
mod error;
mod prompt;
pub mod sse;
mod tools;
pub mod upstream;

use anyhow::{Context, Result};
use axum::{routing::post, Router};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use crate::config::{ChatConfig, Config, SearchConfig};
use upstream::CompletionClient;

/// Shared state for the route handlers
#[derive(Clone)]
pub struct ProxyState {
    pub(crate) client: CompletionClient,
    pub(crate) chat: Arc<ChatConfig>,
    pub(crate) search: Arc<SearchConfig>,
}

impl ProxyState {
    pub fn from_config(config: &Config) -> Result<Self> {
        let client =
            CompletionClient::new(Duration::from_secs(config.chat.request_timeout_secs))?;
        Ok(Self {
            client,
            chat: Arc::new(config.chat.clone()),
            search: Arc::new(config.search.clone()),
        })
    }
}

pub fn router(state: ProxyState) -> Router {
    Router::new()
        .route("/api/chat", post(chat::chat))
        .route("/api/assistant", post(chat::assistant))
        .with_state(state)
}

/// Bind and serve until `shutdown_rx` fires
pub async fn start_server(
    config: Config,
    shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) -> Result<()> {
    let bind_addr = config.bind_addr;
    let state = ProxyState::from_config(&config)?;
    let app = router(state);

    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;

    tracing::info!(
        model = %config.chat.provider.model,
        tools = config.chat.tools.as_str(),
        "Server listening on {}",
        bind_addr
    );

    // Stop accepting on shutdown; in-flight responses are allowed to finish
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_rx.await.ok();
        })
        .await
        .context("Server error")?;

    tracing::info!("Server shut down gracefully");
    Ok(())
}
