//! Host interface for the turn pipeline.
//!
//! `TurnContext` is implemented by `AppState` in `parley-gateway`. It is
//! defined here so the pipeline stays channel-agnostic: the Discord crate
//! depends on `parley-agent`, never the other way round.

use std::sync::Arc;

use async_trait::async_trait;
use parley_core::config::TurnsConfig;
use parley_core::types::{Agent, Attachment};
use parley_memory::{MemoryManager, ProviderCredential};

use crate::provider::LlmProvider;

#[async_trait]
pub trait TurnContext: Send + Sync + 'static {
    fn memory(&self) -> &MemoryManager;

    /// Defaults applied when a guild has no settings row.
    fn turns_config(&self) -> &TurnsConfig;

    /// Streaming client for a resolved credential.
    fn provider(&self, credential: &ProviderCredential) -> Arc<dyn LlmProvider>;

    /// Deliver one message under the agent's identity.
    ///
    /// Called from a detached task. Returns `Err` with a human-readable
    /// explanation; the caller logs it and moves on.
    async fn dispatch(&self, agent: &Agent, text: &str) -> Result<(), String>;

    /// Body of a plain-text attachment.
    async fn fetch_text(&self, attachment: &Attachment) -> Result<String, String>;
}
