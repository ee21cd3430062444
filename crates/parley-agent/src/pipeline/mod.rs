//! Channel-agnostic turn processing.
//!
//! Channel adapters hand inbound events either straight to `run_turn` or to
//! the `Debouncer`, which coalesces bursts and then calls `run_turn` itself.

pub mod context;
pub mod debounce;
pub mod turn;

pub use context::TurnContext;
pub use debounce::{Debouncer, YapBatch};
pub use turn::{run_turn, TurnError};
