use std::fmt;

use parley_core::types::AgentId;
use serde::{Deserialize, Serialize};

/// Who produced a history entry, relative to the agent reading it.
///
/// Resolved once by the store so transcript assembly never compares owner ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "agent_id", rename_all = "snake_case")]
pub enum Speaker {
    /// Input from a human participant.
    Human,
    /// The reading agent's own earlier output.
    SelfAgent,
    /// Output produced by the given agent: either its own stored reply, or
    /// a mention handoff it addressed to the record's owner.
    PeerAgent(AgentId),
}

/// A persisted turn record as seen by one reading agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub owner: AgentId,
    pub speaker: Speaker,
    pub content: String,
    pub author: Option<String>,
    pub created_at: String,
}

/// Decrypted provider credential. The key never appears in `Debug` output.
#[derive(Clone)]
pub struct ProviderCredential {
    pub name: String,
    pub endpoint: String,
    pub api_key: String,
}

impl fmt::Debug for ProviderCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderCredential")
            .field("name", &self.name)
            .field("endpoint", &self.endpoint)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

/// Provider listing row (no key material).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSummary {
    pub name: String,
    pub endpoint: String,
    pub created_at: String,
}
