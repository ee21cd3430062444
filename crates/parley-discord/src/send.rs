use std::sync::{Arc, OnceLock};

use parley_core::types::{Agent, Attachment};
use serenity::builder::ExecuteWebhook;
use serenity::http::Http;
use serenity::model::id::ChannelId;
use serenity::model::webhook::Webhook;
use tracing::debug;

use crate::error::DiscordError;

/// Maximum characters per Discord message (2000 is the limit; we use 1950 for safety).
const CHUNK_MAX: usize = 1950;

/// Split `text` into chunks of at most [`CHUNK_MAX`] bytes, preferring
/// splits on newline/space boundaries to avoid cutting words mid-way.
pub fn split_chunks(text: &str) -> Vec<String> {
    if text.len() <= CHUNK_MAX {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while remaining.len() > CHUNK_MAX {
        let mut end = CHUNK_MAX;
        while !remaining.is_char_boundary(end) {
            end -= 1;
        }
        let window = &remaining[..end];
        let split_at = window
            .rfind('\n')
            .or_else(|| window.rfind(' '))
            .filter(|i| *i > 0)
            .unwrap_or(end);

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    if !remaining.is_empty() {
        chunks.push(remaining.to_string());
    }

    chunks
}

/// Plain-message form for agents without a webhook.
pub fn fallback_text(agent_name: &str, text: &str) -> String {
    format!("**{agent_name}**: {text}")
}

/// Outbound side of the adapter: posts agent messages and fetches attachments.
///
/// The REST handle is attached once the first gateway client exists and
/// stays valid across reconnects.
pub struct DiscordOutbound {
    http: OnceLock<Arc<Http>>,
    client: reqwest::Client,
    max_attachment_bytes: u64,
}

impl DiscordOutbound {
    pub fn new(max_attachment_bytes: u64) -> Self {
        Self {
            http: OnceLock::new(),
            client: reqwest::Client::new(),
            max_attachment_bytes,
        }
    }

    pub fn attach_http(&self, http: Arc<Http>) {
        self.http.set(http).ok();
    }

    pub fn is_connected(&self) -> bool {
        self.http.get().is_some()
    }

    /// Post `text` as `agent`: through its webhook when it has one, otherwise
    /// as a bot message prefixed with the agent's name.
    pub async fn send(&self, agent: &Agent, text: &str) -> Result<(), DiscordError> {
        let http = self.http.get().ok_or(DiscordError::NotConnected)?;

        match agent.webhook_url.as_deref() {
            Some(url) => {
                let webhook = Webhook::from_url(http.as_ref(), url).await?;
                for chunk in split_chunks(text) {
                    let builder = ExecuteWebhook::new()
                        .content(chunk)
                        .username(agent.name.as_str());
                    webhook.execute(http.as_ref(), false, builder).await?;
                }
            }
            None => {
                let id = agent
                    .channel_id
                    .parse::<u64>()
                    .ok()
                    .filter(|id| *id != 0)
                    .ok_or_else(|| DiscordError::InvalidChannel(agent.channel_id.clone()))?;
                let channel = ChannelId::new(id);
                for chunk in split_chunks(&fallback_text(&agent.name, text)) {
                    channel.say(http.as_ref(), &chunk).await?;
                }
            }
        }
        debug!(agent = %agent.name, len = text.len(), "message delivered");
        Ok(())
    }

    /// Download a text attachment, refusing anything over the size cap.
    pub async fn fetch_text(&self, attachment: &Attachment) -> Result<String, DiscordError> {
        let limit = self.max_attachment_bytes;
        if attachment.size > limit {
            return Err(DiscordError::TooLarge {
                name: attachment.name.clone(),
                size: attachment.size,
                limit,
            });
        }
        crate::attach::download_text(&self.client, &attachment.url).await
    }
}
