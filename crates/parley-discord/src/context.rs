//! Host interface for the Discord adapter.
//!
//! Extends the pipeline's `TurnContext` with the pieces only a chat
//! frontend needs: the yap debouncer and the outbound Discord sender.

use parley_agent::pipeline::{Debouncer, TurnContext};

use crate::send::DiscordOutbound;

pub trait DiscordAppContext: TurnContext {
    fn debouncer(&self) -> &Debouncer;
    fn outbound(&self) -> &DiscordOutbound;
}
