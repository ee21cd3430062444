use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

mod admin;
mod app;
mod http;

use admin::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "parley_gateway=info,parley_agent=info,parley_discord=info,tower_http=debug".into()
            }),
        )
        .init();

    let cli = Cli::parse();

    // load config: --config > PARLEY_CONFIG env > ~/.parley/parley.toml
    let config_path = cli
        .config
        .clone()
        .or_else(|| std::env::var("PARLEY_CONFIG").ok());
    let config =
        parley_core::config::ParleyConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
            tracing::warn!("Config load failed ({}), using defaults", e);
            parley_core::config::ParleyConfig::default()
        });

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Keygen => {
            println!("{}", hex::encode(parley_memory::crypto::generate_key()));
            Ok(())
        }
        Command::Agent(cmd) => admin::agent(cmd, &open_memory(&config)?),
        Command::Provider(cmd) => admin::provider(cmd, &open_memory(&config)?),
        Command::Guild(cmd) => admin::guild(cmd, &open_memory(&config)?),
        Command::History(cmd) => admin::history(cmd, &open_memory(&config)?),
    }
}

async fn serve(config: parley_core::config::ParleyConfig) -> anyhow::Result<()> {
    let bind = config.gateway.bind.clone();
    let port = config.gateway.port;

    let memory = open_memory(&config)?;
    if config.secrets.key.is_none() {
        tracing::warn!("secrets.key not set; provider credentials cannot be resolved");
    }

    let state = app::AppState::new(config, memory);

    match state.config.discord.clone() {
        Some(discord_cfg) => {
            match parley_discord::DiscordAdapter::new(&discord_cfg, Arc::clone(&state)) {
                Ok(adapter) => {
                    info!("Discord adapter starting");
                    tokio::spawn(adapter.run());
                }
                Err(e) => tracing::warn!("Discord adapter not started: {e}"),
            }
        }
        None => tracing::warn!("No [discord] section configured; agents will not receive messages"),
    }

    let router = app::build_router(Arc::clone(&state));
    let addr: SocketAddr = format!("{}:{}", bind, port).parse()?;
    info!(%addr, "Parley gateway listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}

/// Open the SQLite database, run migrations, and build the store.
fn open_memory(
    config: &parley_core::config::ParleyConfig,
) -> anyhow::Result<parley_memory::MemoryManager> {
    let db_path = &config.database.path;
    ensure_parent_dir(db_path);
    info!(path = %db_path, "opening SQLite database");

    let db = rusqlite::Connection::open(db_path)?;
    db.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    parley_memory::db::init_db(&db)?;

    let memory = parley_memory::MemoryManager::new(db);
    Ok(match config.secrets.key {
        Some(_) => memory.with_secret_key(config.secret_key()?),
        None => memory,
    })
}

/// Ensure the parent directory for a file path exists.
fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
