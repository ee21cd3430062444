//! One agent turn, and the agent-to-agent recursion that follows it.
//!
//! `run_turn` steps:
//! 1. Stop silently once `depth` exceeds the guild's loop ceiling.
//! 2. Resolve attachments and persist the wrapped input (role `user`).
//! 3. Load recent channel history and resolve the provider credential.
//! 4. Stream the completion through `StreamSegmenter`; each segment is
//!    dispatched (detached) and persisted (role `assistant`).
//! 5. Re-run for every peer named in the combined reply, at `depth + 1`,
//!    one after another.
//!
//! Failures are reported once to the agent's channel and end only this branch.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use parley_core::types::{Agent, GuildSettings, InputEvent, TurnRole};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::attachment::{classify, AttachmentKind};
use crate::mention::mentioned_peers;
use crate::prompt::effective_system_prompt;
use crate::provider::{ChatRequest, ProviderError};
use crate::segment::{Segment, StreamSegmenter};
use crate::stream::StreamEvent;
use crate::transcript::{self, InlineDocument, PreparedInput};

use super::context::TurnContext;

const STREAM_BUFFER: usize = 64;

/// Why a branch ended early. Rendered into the channel notice.
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("stream interrupted: {0}")]
    Stream(String),
}

/// Run one turn for `agent` and any mention-triggered follow-ups.
///
/// `peers` is the full agent set of the channel (including `agent`); it is
/// only read, for mention resolution.
pub fn run_turn<'a, C: TurnContext>(
    ctx: &'a Arc<C>,
    input: InputEvent,
    agent: &'a Agent,
    peers: &'a [Agent],
    depth: u32,
) -> BoxFuture<'a, ()> {
    Box::pin(async move {
        let settings = effective_settings(ctx.as_ref(), &agent.guild_id);
        if depth > settings.max_loop_depth {
            debug!(agent = %agent.name, depth, "loop depth reached, branch ends");
            return;
        }

        info!(
            agent = %agent.name,
            channel = %agent.channel_id,
            author = %input.author,
            depth,
            "turn start"
        );

        let combined = match complete(ctx, &input, agent, settings).await {
            Ok(texts) => texts.join(" "),
            Err(e) => {
                warn!(agent = %agent.name, depth, error = %e, "turn failed");
                dispatch(ctx, agent, format!("⚠️ {e}"));
                return;
            }
        };
        if combined.is_empty() {
            return;
        }

        for peer in mentioned_peers(&combined, agent, peers) {
            debug!(from = %agent.name, to = %peer.name, depth = depth + 1, "mention handoff");
            let handoff = InputEvent::from_agent(agent, combined.clone());
            run_turn(ctx, handoff, peer, peers, depth + 1).await;
        }
    })
}

/// Steps 2–4. Returns the delivered segment texts in stream order.
async fn complete<C: TurnContext>(
    ctx: &Arc<C>,
    input: &InputEvent,
    agent: &Agent,
    settings: GuildSettings,
) -> Result<Vec<String>, TurnError> {
    let memory = ctx.memory();

    let prepared = prepare_input(ctx.as_ref(), input).await;
    let input_id = match memory.insert_turn(
        &agent.id,
        TurnRole::User,
        &prepared.persisted_form(),
        Some(&input.author),
        input.origin.as_ref(),
    ) {
        Ok(id) => Some(id),
        Err(e) => {
            warn!(agent = %agent.name, error = %e, "failed to persist input");
            None
        }
    };

    let limit = settings.context_window as usize * 2;
    let mut history = memory
        .recent_turns(&agent.channel_id, &agent.id, limit + 1)
        .unwrap_or_else(|e| {
            warn!(agent = %agent.name, error = %e, "failed to load history");
            Vec::new()
        });
    history.retain(|h| Some(h.id) != input_id);
    if history.len() > limit {
        history.drain(..history.len() - limit);
    }

    let credential = memory
        .resolve_provider(&agent.guild_id, &agent.provider)
        .map_err(|e| TurnError::Config(format!("provider '{}': {e}", agent.provider)))?;

    let request = ChatRequest {
        model: agent.model.clone(),
        messages: transcript::build(
            agent,
            &prepared,
            &history,
            &effective_system_prompt(agent),
        ),
    };
    let provider = ctx.provider(&credential);

    let (tx, rx) = mpsc::channel(STREAM_BUFFER);
    let (sent, consumed) = tokio::join!(
        provider.send_stream(&request, tx),
        consume_stream(ctx, agent, rx)
    );

    let limit = ctx.turns_config().error_body_limit;
    sent.map_err(|e| {
        TurnError::Provider(format!(
            "{}: {}",
            provider.name(),
            describe_provider_error(&e, limit)
        ))
    })?;
    consumed.map_err(|e| match e {
        TurnError::Stream(msg) => TurnError::Stream(truncate_chars(&msg, limit)),
        other => other,
    })
}

async fn consume_stream<C: TurnContext>(
    ctx: &Arc<C>,
    agent: &Agent,
    mut rx: mpsc::Receiver<StreamEvent>,
) -> Result<Vec<String>, TurnError> {
    let mut segmenter = StreamSegmenter::new(agent.name.as_str());
    let mut delivered = Vec::new();

    while let Some(event) = rx.recv().await {
        match event {
            StreamEvent::TextDelta { text } => {
                for segment in segmenter.push(&text) {
                    deliver(ctx, agent, &segment);
                    delivered.push(segment.text);
                }
            }
            StreamEvent::Done { model, stop_reason } => {
                debug!(agent = %agent.name, %model, %stop_reason, "stream done");
                break;
            }
            StreamEvent::Error { message } => return Err(TurnError::Stream(message)),
        }
    }

    if let Some(segment) = segmenter.finish() {
        warn!(agent = %agent.name, "reply was not wrapped in <msg> tags");
        deliver(ctx, agent, &segment);
        delivered.push(segment.text);
    }
    Ok(delivered)
}

/// Dispatch and persist one segment. Dispatch does not block persistence.
fn deliver<C: TurnContext>(ctx: &Arc<C>, agent: &Agent, segment: &Segment) {
    dispatch(ctx, agent, segment.delivery());
    if let Err(e) = ctx.memory().insert_turn(
        &agent.id,
        TurnRole::Assistant,
        &segment.persisted,
        Some(&agent.name),
        None,
    ) {
        warn!(agent = %agent.name, error = %e, "failed to persist segment");
    }
}

/// Fire-and-forget send. Ordering between sends is not guaranteed.
fn dispatch<C: TurnContext>(ctx: &Arc<C>, agent: &Agent, text: String) {
    let ctx = Arc::clone(ctx);
    let agent = agent.clone();
    tokio::spawn(async move {
        if let Err(e) = ctx.dispatch(&agent, &text).await {
            warn!(agent = %agent.name, error = %e, "dispatch failed");
        }
    });
}

fn effective_settings<C: TurnContext>(ctx: &C, guild_id: &str) -> GuildSettings {
    let cfg = ctx.turns_config();
    let defaults = GuildSettings {
        context_window: cfg.context_window,
        max_loop_depth: cfg.max_loop_depth,
    };
    match ctx.memory().guild_settings(guild_id) {
        Ok(settings) => settings.unwrap_or(defaults),
        Err(e) => {
            warn!(guild_id, error = %e, "failed to load guild settings, using defaults");
            defaults
        }
    }
}

/// Sort attachments into image references and fetched text documents.
async fn prepare_input<C: TurnContext>(ctx: &C, input: &InputEvent) -> PreparedInput {
    let mut prepared = PreparedInput {
        author: input.author.clone(),
        text: input.text.clone(),
        ..Default::default()
    };
    for attachment in &input.attachments {
        match classify(attachment) {
            AttachmentKind::Image => prepared.images.push(attachment.url.clone()),
            AttachmentKind::Text => match ctx.fetch_text(attachment).await {
                Ok(body) => prepared.documents.push(InlineDocument {
                    name: attachment.name.clone(),
                    body,
                }),
                Err(e) => warn!(name = %attachment.name, error = %e, "attachment fetch failed"),
            },
            AttachmentKind::Other => {
                debug!(name = %attachment.name, "skipping unsupported attachment")
            }
        }
    }
    prepared
}

fn describe_provider_error(err: &ProviderError, limit: usize) -> String {
    match err {
        ProviderError::Api { status, message } if message.trim().is_empty() => {
            format!("API error ({status})")
        }
        ProviderError::Api { status, message } => {
            format!("API error ({status}): {}", truncate_chars(message.trim(), limit))
        }
        other => truncate_chars(&other.to_string(), limit),
    }
}

fn truncate_chars(s: &str, limit: usize) -> String {
    match s.char_indices().nth(limit) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}
