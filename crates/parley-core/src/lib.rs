pub mod config;
pub mod error;
pub mod types;

pub use error::{ParleyError, Result};
pub use types::{Agent, AgentId, Attachment, GuildSettings, InputEvent, TurnRole};
