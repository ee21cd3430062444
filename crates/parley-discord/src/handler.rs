use std::sync::{Arc, OnceLock};

use parley_agent::mention::mentions;
use parley_agent::pipeline::run_turn;
use parley_core::types::{Agent, InputEvent};
use serenity::async_trait;
use serenity::model::channel::Message;
use serenity::model::gateway::Ready;
use serenity::model::id::UserId;
use serenity::prelude::{Context, EventHandler};
use tracing::{debug, info, warn};

use crate::attach::to_attachment;
use crate::context::DiscordAppContext;

/// Serenity event handler wired to the turn pipeline.
pub struct DiscordHandler<C: DiscordAppContext> {
    pub ctx: Arc<C>,
    pub bot_id: OnceLock<UserId>,
}

/// Which agents one inbound message reaches, and how.
#[derive(Debug, PartialEq, Eq)]
pub struct Routing<'a> {
    /// Yap agents: every message is buffered for them.
    pub debounced: Vec<&'a Agent>,
    /// Non-yap agents named in the message: one immediate turn each.
    pub direct: Vec<&'a Agent>,
}

/// Route a human message among a channel's agents.
///
/// A yap agent never also gets a direct turn for the same message, even
/// when it is named.
pub fn route<'a>(text: &str, agents: &'a [Agent]) -> Routing<'a> {
    let (debounced, rest): (Vec<&Agent>, Vec<&Agent>) = agents.iter().partition(|a| a.yap);
    let direct = rest
        .into_iter()
        .filter(|a| mentions(text, &a.name))
        .collect();
    Routing { debounced, direct }
}

#[async_trait]
impl<C: DiscordAppContext> EventHandler for DiscordHandler<C> {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        self.bot_id.set(ready.user.id).ok();
        info!(name = %ready.user.name, "Discord bot connected");
    }

    async fn message(&self, _ctx: Context, msg: Message) {
        // Agent replies arrive through webhooks; never feed them back in.
        if msg.author.bot || msg.webhook_id.is_some() {
            return;
        }
        if self.bot_id.get() == Some(&msg.author.id) {
            return;
        }
        let Some(guild_id) = msg.guild_id else {
            return;
        };
        if msg.content.trim().is_empty() && msg.attachments.is_empty() {
            return;
        }

        let guild = guild_id.to_string();
        let channel = msg.channel_id.to_string();
        let agents = match self.ctx.memory().agents_in_channel(&guild, &channel) {
            Ok(agents) if !agents.is_empty() => agents,
            Ok(_) => return,
            Err(e) => {
                warn!(error = %e, %channel, "failed to load channel agents");
                return;
            }
        };

        let event = InputEvent::human(msg.author.display_name(), msg.content.clone())
            .with_attachments(msg.attachments.iter().map(to_attachment).collect());

        let routing = route(&msg.content, &agents);
        debug!(
            %channel,
            debounced = routing.debounced.len(),
            direct = routing.direct.len(),
            "routing inbound message"
        );

        for agent in &routing.debounced {
            self.ctx.debouncer().push(agent, &agents, event.clone());
        }

        let direct: Vec<Agent> = routing.direct.into_iter().cloned().collect();
        if direct.is_empty() {
            return;
        }
        let peers = Arc::new(agents);
        for agent in direct {
            let app = Arc::clone(&self.ctx);
            let peers = Arc::clone(&peers);
            let event = event.clone();
            tokio::spawn(async move {
                run_turn(&app, event, &agent, &peers, 0).await;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::types::AgentId;

    fn agent(name: &str, yap: bool) -> Agent {
        Agent {
            id: AgentId::new(),
            guild_id: "1".into(),
            channel_id: "2".into(),
            name: name.into(),
            model: "m".into(),
            provider: "p".into(),
            system_prompt: String::new(),
            multimodal: false,
            yap,
            webhook_url: None,
        }
    }

    #[test]
    fn mentioned_agents_get_direct_turns() {
        let agents = vec![agent("Alpha", false), agent("Botty", false)];
        let r = route("hey botty, thoughts?", &agents);
        assert!(r.debounced.is_empty());
        assert_eq!(r.direct, vec![&agents[1]]);
    }

    #[test]
    fn yap_agents_are_never_double_triggered() {
        let agents = vec![agent("Yappy", true), agent("Alpha", false)];
        let r = route("Yappy and Alpha, both of you", &agents);
        assert_eq!(r.debounced, vec![&agents[0]]);
        assert_eq!(r.direct, vec![&agents[1]]);
    }

    #[test]
    fn unaddressed_message_only_reaches_yap_agents() {
        let agents = vec![agent("Yappy", true), agent("Alpha", false)];
        let r = route("just chatting", &agents);
        assert_eq!(r.debounced.len(), 1);
        assert!(r.direct.is_empty());
    }
}
