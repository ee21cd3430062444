use rusqlite::{Connection, Result};

/// Initialise parley tables. Safe to call on every startup (idempotent).
pub fn init_db(conn: &Connection) -> Result<()> {
    create_agents_table(conn)?;
    create_turns_table(conn)?;
    create_guild_settings_table(conn)?;
    create_providers_table(conn)?;
    Ok(())
}

/// One row per agent. A name may repeat across channels but not within one.
fn create_agents_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS agents (
            id              TEXT PRIMARY KEY,
            guild_id        TEXT NOT NULL,
            channel_id      TEXT NOT NULL,
            name            TEXT NOT NULL,
            model           TEXT NOT NULL,
            provider        TEXT NOT NULL,
            system_prompt   TEXT NOT NULL DEFAULT '',
            multimodal      INTEGER NOT NULL DEFAULT 0,
            yap             INTEGER NOT NULL DEFAULT 0,
            webhook_url     TEXT,
            created_at      TEXT NOT NULL,
            UNIQUE(guild_id, name, channel_id)
        );
        CREATE INDEX IF NOT EXISTS idx_agents_channel
            ON agents(guild_id, channel_id);",
    )
}

/// Turn history. Rows are append-only; `id` order is conversation order.
fn create_turns_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS turns (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            owner_agent_id  TEXT NOT NULL,
            role            TEXT NOT NULL CHECK (role IN ('user', 'assistant')),
            content         TEXT NOT NULL,
            author          TEXT,
            origin_agent_id TEXT,
            created_at      TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_turns_owner
            ON turns(owner_agent_id, id DESC);",
    )
}

fn create_guild_settings_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS guild_settings (
            guild_id        TEXT PRIMARY KEY,
            context_window  INTEGER NOT NULL,
            max_loop_depth  INTEGER NOT NULL,
            updated_at      TEXT NOT NULL
        );",
    )
}

/// Guild-scoped completion endpoints. `api_key_enc` is `iv:tag:ciphertext` hex.
fn create_providers_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS providers (
            guild_id        TEXT NOT NULL,
            name            TEXT NOT NULL,
            endpoint        TEXT NOT NULL,
            api_key_enc     TEXT NOT NULL,
            created_at      TEXT NOT NULL,
            PRIMARY KEY (guild_id, name)
        );",
    )
}
