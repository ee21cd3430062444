pub mod adapter;
pub mod attach;
pub mod context;
pub mod error;
pub mod handler;
pub mod send;

pub use adapter::DiscordAdapter;
pub use context::DiscordAppContext;
pub use error::DiscordError;
pub use send::DiscordOutbound;
