use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::types::{DEFAULT_CONTEXT_WINDOW, DEFAULT_MAX_LOOP_DEPTH};

pub const DEFAULT_PORT: u16 = 18790;
pub const DEFAULT_BIND: &str = "127.0.0.1";
/// Quiet period before a yap buffer fires.
pub const DEFAULT_YAP_DELAY_MS: u64 = 3_000;
/// Most attachments carried by one coalesced yap event (Discord's own per-message cap).
pub const DEFAULT_YAP_MAX_ATTACHMENTS: usize = 10;
/// Provider error bodies are cut to this many characters before being shown in a channel.
pub const DEFAULT_ERROR_BODY_LIMIT: usize = 500;

/// Top-level config (parley.toml + PARLEY_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ParleyConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    pub discord: Option<DiscordConfig>,
    #[serde(default)]
    pub secrets: SecretsConfig,
    #[serde(default)]
    pub yap: YapConfig,
    #[serde(default)]
    pub turns: TurnsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    pub bot_token: String,
    /// Largest attachment (bytes) whose text body is fetched and inlined.
    #[serde(default = "default_max_attachment_bytes")]
    pub max_attachment_bytes: u64,
}

/// Provider credentials are stored encrypted; this holds the AES-256 key.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SecretsConfig {
    /// 64 hex characters (32 bytes). Generate one with `parley keygen`.
    pub key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YapConfig {
    #[serde(default = "default_yap_delay_ms")]
    pub delay_ms: u64,
    #[serde(default = "default_yap_max_attachments")]
    pub max_attachments: usize,
}

impl Default for YapConfig {
    fn default() -> Self {
        Self {
            delay_ms: DEFAULT_YAP_DELAY_MS,
            max_attachments: DEFAULT_YAP_MAX_ATTACHMENTS,
        }
    }
}

/// Fallbacks used when a guild has no settings row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnsConfig {
    #[serde(default = "default_context_window")]
    pub context_window: u32,
    #[serde(default = "default_max_loop_depth")]
    pub max_loop_depth: u32,
    #[serde(default = "default_error_body_limit")]
    pub error_body_limit: usize,
}

impl Default for TurnsConfig {
    fn default() -> Self {
        Self {
            context_window: DEFAULT_CONTEXT_WINDOW,
            max_loop_depth: DEFAULT_MAX_LOOP_DEPTH,
            error_body_limit: DEFAULT_ERROR_BODY_LIMIT,
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_max_attachment_bytes() -> u64 {
    1024 * 1024
}
fn default_yap_delay_ms() -> u64 {
    DEFAULT_YAP_DELAY_MS
}
fn default_yap_max_attachments() -> usize {
    DEFAULT_YAP_MAX_ATTACHMENTS
}
fn default_context_window() -> u32 {
    DEFAULT_CONTEXT_WINDOW
}
fn default_max_loop_depth() -> u32 {
    DEFAULT_MAX_LOOP_DEPTH
}
fn default_error_body_limit() -> usize {
    DEFAULT_ERROR_BODY_LIMIT
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.parley/parley.db", home)
}

impl ParleyConfig {
    /// Load config from a TOML file with PARLEY_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.parley/parley.toml
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: ParleyConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("PARLEY_").split("__"))
            .extract()
            .map_err(|e| crate::error::ParleyError::Config(e.to_string()))?;

        Ok(config)
    }

    /// Decode the configured credential key.
    pub fn secret_key(&self) -> crate::error::Result<[u8; 32]> {
        let hex_key = self
            .secrets
            .key
            .as_deref()
            .ok_or_else(|| crate::error::ParleyError::Config("secrets.key is not set".into()))?;
        parse_key_hex(hex_key)
    }
}

/// Parse a 64-character hex string into a 256-bit key.
pub fn parse_key_hex(s: &str) -> crate::error::Result<[u8; 32]> {
    let mut key = [0u8; 32];
    hex::decode_to_slice(s.trim(), &mut key).map_err(|_| {
        crate::error::ParleyError::Config("secrets.key must be 64 hex characters".into())
    })?;
    Ok(key)
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.parley/parley.toml", home)
}
