//! Yap mode: coalesce bursts of channel activity into one turn per agent.
//!
//! The registry maps `(agent id, channel id)` to a pending buffer and its
//! idle timer. Lifecycle of one slot:
//! - **create**: first event for the key inserts the slot and starts a timer.
//! - **replace**: each further event appends, aborts the pending timer and
//!   starts a new one under a fresh generation number.
//! - **delete**: the timer that still owns the current generation removes
//!   the slot and hands its buffer to the fire callback.
//!
//! A timer whose generation no longer matches finds nothing to remove, so a
//! slot fires at most once even if an abort lands late.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use futures_util::future::BoxFuture;
use parley_core::config::YapConfig;
use parley_core::types::{Agent, AgentId, Attachment, InputEvent};
use tokio::task::JoinHandle;
use tracing::debug;

use super::context::TurnContext;
use super::turn::run_turn;

type YapKey = (AgentId, String);
type FireFn = dyn Fn(YapBatch) -> BoxFuture<'static, ()> + Send + Sync;

/// One coalesced input, ready for a depth-0 turn.
#[derive(Debug, Clone)]
pub struct YapBatch {
    pub agent: Agent,
    pub peers: Vec<Agent>,
    pub event: InputEvent,
}

struct YapState {
    buffer: Vec<InputEvent>,
    generation: u64,
    timer: Option<JoinHandle<()>>,
    agent: Agent,
    peers: Vec<Agent>,
}

struct Registry {
    slots: DashMap<YapKey, YapState>,
    delay: Duration,
    max_attachments: usize,
    generations: AtomicU64,
    on_fire: Box<FireFn>,
}

/// Process-wide yap coordinator. Cheap to clone.
#[derive(Clone)]
pub struct Debouncer {
    registry: Arc<Registry>,
}

impl Debouncer {
    pub fn new<F>(delay: Duration, max_attachments: usize, on_fire: F) -> Self
    where
        F: Fn(YapBatch) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        Self {
            registry: Arc::new(Registry {
                slots: DashMap::new(),
                delay,
                max_attachments,
                generations: AtomicU64::new(0),
                on_fire: Box::new(on_fire),
            }),
        }
    }

    /// Debouncer whose batches start a depth-0 `run_turn`.
    ///
    /// Holds the host weakly: the host usually owns the debouncer, and
    /// batches that fire after the host is gone are dropped.
    pub fn for_turns<C: TurnContext>(ctx: Weak<C>, config: &YapConfig) -> Self {
        Self::new(
            Duration::from_millis(config.delay_ms),
            config.max_attachments,
            move |batch: YapBatch| -> BoxFuture<'static, ()> {
                let ctx = ctx.clone();
                Box::pin(async move {
                    let Some(ctx) = ctx.upgrade() else {
                        debug!(agent = %batch.agent.name, "host gone, dropping yap batch");
                        return;
                    };
                    run_turn(&ctx, batch.event, &batch.agent, &batch.peers, 0).await;
                })
            },
        )
    }

    /// Buffer one event for `agent` and restart its idle timer.
    pub fn push(&self, agent: &Agent, peers: &[Agent], event: InputEvent) {
        let key: YapKey = (agent.id.clone(), agent.channel_id.clone());
        let generation = self.registry.generations.fetch_add(1, Ordering::Relaxed) + 1;

        let mut slot = self
            .registry
            .slots
            .entry(key.clone())
            .or_insert_with(|| YapState {
                buffer: Vec::new(),
                generation,
                timer: None,
                agent: agent.clone(),
                peers: Vec::new(),
            });
        slot.buffer.push(event);
        slot.generation = generation;
        slot.agent = agent.clone();
        slot.peers = peers.to_vec();
        if let Some(previous) = slot.timer.take() {
            previous.abort();
        }

        let registry = Arc::clone(&self.registry);
        slot.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(registry.delay).await;
            registry.fire(&key, generation);
        }));
        debug!(agent = %agent.name, pending = slot.buffer.len(), "yap buffered");
    }

    /// Number of events waiting for `agent` in its channel.
    #[cfg(test)]
    fn pending(&self, agent: &Agent) -> usize {
        self.registry
            .slots
            .get(&(agent.id.clone(), agent.channel_id.clone()))
            .map(|slot| slot.buffer.len())
            .unwrap_or(0)
    }
}

impl Registry {
    fn fire(&self, key: &YapKey, generation: u64) {
        let Some((_, state)) = self
            .slots
            .remove_if(key, |_, slot| slot.generation == generation)
        else {
            return;
        };
        let Some(event) = coalesce(state.buffer, self.max_attachments) else {
            return;
        };
        debug!(agent = %state.agent.name, author = %event.author, "yap firing");

        // The turn runs in its own task so a late abort of this timer cannot cancel it.
        tokio::spawn((self.on_fire)(YapBatch {
            agent: state.agent,
            peers: state.peers,
            event,
        }));
    }
}

/// Merge buffered events: texts joined by blank lines, authors listed once,
/// attachments de-duplicated by URL and capped.
fn coalesce(events: Vec<InputEvent>, max_attachments: usize) -> Option<InputEvent> {
    if events.is_empty() {
        return None;
    }

    let mut authors: Vec<String> = Vec::new();
    let mut texts: Vec<String> = Vec::new();
    let mut attachments: Vec<Attachment> = Vec::new();
    for event in events {
        if !authors.contains(&event.author) {
            authors.push(event.author);
        }
        if !event.text.trim().is_empty() {
            texts.push(event.text);
        }
        for attachment in event.attachments {
            if attachments.len() < max_attachments
                && !attachments.iter().any(|a| a.url == attachment.url)
            {
                attachments.push(attachment);
            }
        }
    }

    Some(InputEvent {
        author: authors.join(", "),
        text: texts.join("\n\n"),
        attachments,
        origin: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn agent(name: &str, channel: &str) -> Agent {
        Agent {
            id: AgentId::from(name),
            guild_id: "g".into(),
            channel_id: channel.into(),
            name: name.into(),
            model: "m".into(),
            provider: "p".into(),
            system_prompt: String::new(),
            multimodal: false,
            yap: true,
            webhook_url: None,
        }
    }

    fn recorder() -> (Debouncer, Arc<Mutex<Vec<YapBatch>>>) {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&fired);
        let debouncer = Debouncer::new(
            Duration::from_secs(3),
            10,
            move |batch: YapBatch| -> BoxFuture<'static, ()> {
                let sink = Arc::clone(&sink);
                Box::pin(async move {
                    sink.lock().unwrap().push(batch);
                })
            },
        );
        (debouncer, fired)
    }

    fn attachment(url: &str) -> Attachment {
        Attachment {
            name: url.into(),
            url: url.into(),
            content_type: None,
            size: 1,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn burst_within_idle_window_fires_once() {
        let (debouncer, fired) = recorder();
        let a = agent("Yappy", "c1");
        let peers = vec![a.clone()];

        debouncer.push(&a, &peers, InputEvent::human("sam", "one"));
        tokio::time::sleep(Duration::from_millis(400)).await;
        debouncer.push(&a, &peers, InputEvent::human("kim", "two"));
        tokio::time::sleep(Duration::from_millis(400)).await;
        debouncer.push(&a, &peers, InputEvent::human("sam", "three"));
        assert_eq!(debouncer.pending(&a), 3);

        tokio::time::sleep(Duration::from_millis(2_900)).await;
        assert!(fired.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_millis(200)).await;
        tokio::task::yield_now().await;

        let fired = fired.lock().unwrap();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].event.text, "one\n\ntwo\n\nthree");
        assert_eq!(fired[0].event.author, "sam, kim");
        assert_eq!(fired[0].event.origin, None);
        assert_eq!(debouncer.pending(&a), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn keys_are_independent() {
        let (debouncer, fired) = recorder();
        let a = agent("A", "c1");
        let b = agent("B", "c1");
        let peers = vec![a.clone(), b.clone()];

        debouncer.push(&a, &peers, InputEvent::human("sam", "for a"));
        tokio::time::sleep(Duration::from_secs(2)).await;
        debouncer.push(&b, &peers, InputEvent::human("sam", "for b"));

        tokio::time::sleep(Duration::from_millis(1_100)).await;
        tokio::task::yield_now().await;
        assert_eq!(fired.lock().unwrap().len(), 1);
        assert_eq!(fired.lock().unwrap()[0].agent.name, "A");

        tokio::time::sleep(Duration::from_secs(2)).await;
        tokio::task::yield_now().await;
        assert_eq!(fired.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn event_after_fire_starts_new_batch() {
        let (debouncer, fired) = recorder();
        let a = agent("A", "c1");

        debouncer.push(&a, &[], InputEvent::human("sam", "first"));
        tokio::time::sleep(Duration::from_secs(4)).await;
        tokio::task::yield_now().await;
        debouncer.push(&a, &[], InputEvent::human("sam", "second"));
        tokio::time::sleep(Duration::from_secs(4)).await;
        tokio::task::yield_now().await;

        let fired = fired.lock().unwrap();
        let texts: Vec<_> = fired.iter().map(|b| b.event.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second"]);
    }

    #[test]
    fn coalesce_caps_and_dedupes_attachments() {
        let events = vec![
            InputEvent::human("sam", "a")
                .with_attachments(vec![attachment("u1"), attachment("u2")]),
            InputEvent::human("sam", "")
                .with_attachments(vec![attachment("u2"), attachment("u3")]),
        ];
        let merged = coalesce(events, 2).unwrap();
        assert_eq!(merged.text, "a");
        let urls: Vec<_> = merged.attachments.iter().map(|a| a.url.as_str()).collect();
        assert_eq!(urls, vec!["u1", "u2"]);
        assert!(coalesce(Vec::new(), 10).is_none());
    }
}
