use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Default number of conversational exchanges loaded into a transcript.
/// Twice this many turn records are read (one user + one assistant each).
pub const DEFAULT_CONTEXT_WINDOW: u32 = 10;
/// Default recursion ceiling for agent-to-agent replies.
pub const DEFAULT_MAX_LOOP_DEPTH: u32 = 2;

/// Unique identifier for an agent (UUIDv7, time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentId(pub String);

impl AgentId {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for AgentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for AgentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// An AI participant bound to one channel of one guild.
///
/// Owned by the persistence layer. The turn pipeline only reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub guild_id: String,
    pub channel_id: String,
    /// Display name. Also the word peers use to address this agent.
    pub name: String,
    pub model: String,
    /// Name of the guild-scoped provider credential used for completions.
    pub provider: String,
    #[serde(default)]
    pub system_prompt: String,
    /// Whether image attachments are forwarded as image parts.
    #[serde(default)]
    pub multimodal: bool,
    /// Debounced mode: answer every burst of channel activity, not only mentions.
    #[serde(default)]
    pub yap: bool,
    /// Outbound webhook the agent speaks through. `None` falls back to a
    /// plain channel message prefixed with the agent name.
    pub webhook_url: Option<String>,
}

/// Per-guild turn limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildSettings {
    pub context_window: u32,
    pub max_loop_depth: u32,
}

impl Default for GuildSettings {
    fn default() -> Self {
        Self {
            context_window: DEFAULT_CONTEXT_WINDOW,
            max_loop_depth: DEFAULT_MAX_LOOP_DEPTH,
        }
    }
}

/// A file attached to an inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub url: String,
    pub content_type: Option<String>,
    pub size: u64,
}

/// One unit of input for a turn. Built fresh per turn and never persisted
/// as-is; only its wrapped form lands in the turn history.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InputEvent {
    /// Display label of whoever produced the input (a human or an agent name).
    pub author: String,
    pub text: String,
    pub attachments: Vec<Attachment>,
    /// Set when the input is another agent's reply.
    pub origin: Option<AgentId>,
}

impl InputEvent {
    /// Input typed by a human in the channel.
    pub fn human(author: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            text: text.into(),
            attachments: Vec::new(),
            origin: None,
        }
    }

    /// Input produced by another agent addressing the recipient.
    pub fn from_agent(agent: &Agent, text: impl Into<String>) -> Self {
        Self {
            author: agent.name.clone(),
            text: text.into(),
            attachments: Vec::new(),
            origin: Some(agent.id.clone()),
        }
    }

    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }
}

/// Role column of a stored turn record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    /// Anything not produced by the owning agent.
    User,
    /// The owning agent's own output.
    Assistant,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnRole::User => "user",
            TurnRole::Assistant => "assistant",
        }
    }
}

impl fmt::Display for TurnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TurnRole {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "user" => Ok(TurnRole::User),
            "assistant" => Ok(TurnRole::Assistant),
            other => Err(format!("unknown turn role: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_ids_are_unique() {
        assert_ne!(AgentId::new(), AgentId::new());
    }

    #[test]
    fn turn_role_round_trips() {
        for role in [TurnRole::User, TurnRole::Assistant] {
            assert_eq!(role.as_str().parse::<TurnRole>(), Ok(role));
        }
        assert!("system".parse::<TurnRole>().is_err());
    }

    #[test]
    fn guild_settings_defaults() {
        let s = GuildSettings::default();
        assert_eq!(s.context_window, 10);
        assert_eq!(s.max_loop_depth, 2);
    }
}
