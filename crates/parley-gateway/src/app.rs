use std::sync::Arc;

use async_trait::async_trait;
use axum::{routing::get, Router};
use parley_agent::openai::OpenAiProvider;
use parley_agent::pipeline::{Debouncer, TurnContext};
use parley_agent::LlmProvider;
use parley_core::config::{ParleyConfig, TurnsConfig};
use parley_core::types::{Agent, Attachment};
use parley_discord::{DiscordAppContext, DiscordOutbound};
use parley_memory::{MemoryManager, ProviderCredential};

/// Central shared state, passed as Arc<AppState> to Axum handlers and the
/// Discord adapter.
pub struct AppState {
    pub config: ParleyConfig,
    pub memory: MemoryManager,
    /// Shared connection pool for every provider stream.
    pub http_client: reqwest::Client,
    pub outbound: DiscordOutbound,
    pub debouncer: Debouncer,
}

impl AppState {
    pub fn new(config: ParleyConfig, memory: MemoryManager) -> Arc<Self> {
        let max_attachment_bytes = config
            .discord
            .as_ref()
            .map(|d| d.max_attachment_bytes)
            .unwrap_or(1024 * 1024);

        Arc::new_cyclic(|weak| Self {
            debouncer: Debouncer::for_turns(weak.clone(), &config.yap),
            outbound: DiscordOutbound::new(max_attachment_bytes),
            http_client: reqwest::Client::new(),
            memory,
            config,
        })
    }
}

#[async_trait]
impl TurnContext for AppState {
    fn memory(&self) -> &MemoryManager {
        &self.memory
    }

    fn turns_config(&self) -> &TurnsConfig {
        &self.config.turns
    }

    fn provider(&self, credential: &ProviderCredential) -> Arc<dyn LlmProvider> {
        Arc::new(OpenAiProvider::with_client(
            self.http_client.clone(),
            credential.api_key.clone(),
            credential.endpoint.clone(),
        ))
    }

    async fn dispatch(&self, agent: &Agent, text: &str) -> Result<(), String> {
        self.outbound
            .send(agent, text)
            .await
            .map_err(|e| e.to_string())
    }

    async fn fetch_text(&self, attachment: &Attachment) -> Result<String, String> {
        self.outbound
            .fetch_text(attachment)
            .await
            .map_err(|e| e.to_string())
    }
}

impl DiscordAppContext for AppState {
    fn debouncer(&self) -> &Debouncer {
        &self.debouncer
    }

    fn outbound(&self) -> &DiscordOutbound {
        &self.outbound
    }
}

/// Assemble the Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
