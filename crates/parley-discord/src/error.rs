/// Errors produced by the Discord adapter.
#[derive(Debug, thiserror::Error)]
pub enum DiscordError {
    #[error("serenity error: {0}")]
    Serenity(#[from] serenity::Error),

    #[error("no bot token configured")]
    NoToken,

    #[error("Discord connection not ready")]
    NotConnected,

    #[error("invalid channel id: {0}")]
    InvalidChannel(String),

    #[error("attachment fetch failed: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("attachment '{name}' is {size} bytes, limit is {limit}")]
    TooLarge { name: String, size: u64, limit: u64 },
}
