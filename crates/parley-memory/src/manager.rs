use std::sync::Mutex;

use parley_core::types::{Agent, AgentId, GuildSettings, TurnRole};
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, instrument};

use crate::crypto::{self, CryptoError};
use crate::error::MemoryError;
use crate::types::*;

const AGENT_COLUMNS: &str = "id, guild_id, channel_id, name, model, provider, system_prompt,
                             multimodal, yap, webhook_url";

/// Persistent store for agents, turn history, guild settings and provider
/// credentials.
///
/// Thread-safe: wraps the SQLite connection in a Mutex. Every method is a
/// single statement, so no cross-call transactions are needed.
pub struct MemoryManager {
    db: Mutex<Connection>,
    secret_key: Option<[u8; 32]>,
}

impl MemoryManager {
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Mutex::new(conn),
            secret_key: None,
        }
    }

    /// Key used to seal and open provider credentials.
    pub fn with_secret_key(mut self, key: [u8; 32]) -> Self {
        self.secret_key = Some(key);
        self
    }

    // ---- agents ----

    #[instrument(skip(self, agent), fields(name = %agent.name, channel = %agent.channel_id))]
    pub fn insert_agent(&self, agent: &Agent) -> Result<(), MemoryError> {
        let db = self.db.lock().unwrap();
        let now = chrono::Utc::now().to_rfc3339();
        let res = db.execute(
            "INSERT INTO agents (id, guild_id, channel_id, name, model, provider,
             system_prompt, multimodal, yap, webhook_url, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            rusqlite::params![
                agent.id.as_str(),
                agent.guild_id,
                agent.channel_id,
                agent.name,
                agent.model,
                agent.provider,
                agent.system_prompt,
                agent.multimodal,
                agent.yap,
                agent.webhook_url,
                now,
            ],
        );
        match res {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(MemoryError::DuplicateAgent {
                    name: agent.name.clone(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn get_agent(&self, id: &AgentId) -> Result<Agent, MemoryError> {
        let db = self.db.lock().unwrap();
        db.query_row(
            &format!("SELECT {AGENT_COLUMNS} FROM agents WHERE id = ?1"),
            rusqlite::params![id.as_str()],
            row_to_agent,
        )
        .optional()?
        .ok_or_else(|| MemoryError::NotFound {
            kind: "agent",
            id: id.to_string(),
        })
    }

    /// Agents sharing one channel, oldest first. This is the peer set.
    pub fn agents_in_channel(
        &self,
        guild_id: &str,
        channel_id: &str,
    ) -> Result<Vec<Agent>, MemoryError> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(&format!(
            "SELECT {AGENT_COLUMNS} FROM agents
             WHERE guild_id = ?1 AND channel_id = ?2
             ORDER BY created_at, rowid"
        ))?;
        let rows = stmt.query_map(rusqlite::params![guild_id, channel_id], row_to_agent)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn list_agents(&self, guild_id: &str) -> Result<Vec<Agent>, MemoryError> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(&format!(
            "SELECT {AGENT_COLUMNS} FROM agents
             WHERE guild_id = ?1
             ORDER BY channel_id, created_at, rowid"
        ))?;
        let rows = stmt.query_map(rusqlite::params![guild_id], row_to_agent)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Number of agents across all guilds.
    pub fn count_agents(&self) -> Result<usize, MemoryError> {
        let db = self.db.lock().unwrap();
        let n: i64 = db.query_row("SELECT COUNT(*) FROM agents", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    /// Remove an agent and its history.
    pub fn remove_agent(&self, id: &AgentId) -> Result<(), MemoryError> {
        let db = self.db.lock().unwrap();
        let removed = db.execute(
            "DELETE FROM agents WHERE id = ?1",
            rusqlite::params![id.as_str()],
        )?;
        if removed == 0 {
            return Err(MemoryError::NotFound {
                kind: "agent",
                id: id.to_string(),
            });
        }
        db.execute(
            "DELETE FROM turns WHERE owner_agent_id = ?1",
            rusqlite::params![id.as_str()],
        )?;
        Ok(())
    }

    // ---- turns ----

    /// Append one turn record. Records are never updated afterwards.
    ///
    /// `origin` is the agent whose reply produced a `user` record, for
    /// mention handoffs; `None` for human input and for assistant records.
    pub fn insert_turn(
        &self,
        owner: &AgentId,
        role: TurnRole,
        content: &str,
        author: Option<&str>,
        origin: Option<&AgentId>,
    ) -> Result<i64, MemoryError> {
        let db = self.db.lock().unwrap();
        let now = chrono::Utc::now().to_rfc3339();
        db.execute(
            "INSERT INTO turns (owner_agent_id, role, content, author, origin_agent_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                owner.as_str(),
                role.as_str(),
                content,
                author,
                origin.map(AgentId::as_str),
                now
            ],
        )?;
        Ok(db.last_insert_rowid())
    }

    /// Most recent `limit` records owned by any agent in `channel_id`,
    /// oldest first, each tagged with its speaker relative to `reader`.
    #[instrument(skip(self), fields(reader = %reader))]
    pub fn recent_turns(
        &self,
        channel_id: &str,
        reader: &AgentId,
        limit: usize,
    ) -> Result<Vec<HistoryEntry>, MemoryError> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT t.id, t.owner_agent_id, t.content, t.author, t.created_at,
                    CASE
                        WHEN t.role = 'user' AND t.origin_agent_id IS NULL THEN 'human'
                        WHEN t.role = 'assistant' AND t.owner_agent_id = ?2 THEN 'self'
                        ELSE 'peer'
                    END AS speaker,
                    COALESCE(t.origin_agent_id, t.owner_agent_id) AS speaker_id
             FROM turns t
             JOIN agents a ON a.id = t.owner_agent_id
             WHERE a.channel_id = ?1
             ORDER BY t.id DESC
             LIMIT ?3",
        )?;
        let rows = stmt.query_map(
            rusqlite::params![channel_id, reader.as_str(), limit as i64],
            |row| {
                let owner = AgentId::from(row.get::<_, String>(1)?);
                let speaker: String = row.get(5)?;
                let speaker = match speaker.as_str() {
                    "human" => Speaker::Human,
                    "self" => Speaker::SelfAgent,
                    _ => Speaker::PeerAgent(AgentId::from(row.get::<_, String>(6)?)),
                };
                Ok(HistoryEntry {
                    id: row.get(0)?,
                    owner,
                    speaker,
                    content: row.get(2)?,
                    author: row.get(3)?,
                    created_at: row.get(4)?,
                })
            },
        )?;
        let mut entries = rows.collect::<Result<Vec<_>, _>>()?;
        entries.reverse();
        Ok(entries)
    }

    /// Administrative wipe of one agent's history. Returns rows removed.
    pub fn clear_history(&self, owner: &AgentId) -> Result<usize, MemoryError> {
        let db = self.db.lock().unwrap();
        let removed = db.execute(
            "DELETE FROM turns WHERE owner_agent_id = ?1",
            rusqlite::params![owner.as_str()],
        )?;
        debug!(agent_id = %owner, removed, "cleared turn history");
        Ok(removed)
    }

    // ---- guild settings ----

    pub fn guild_settings(&self, guild_id: &str) -> Result<Option<GuildSettings>, MemoryError> {
        let db = self.db.lock().unwrap();
        let settings = db
            .query_row(
                "SELECT context_window, max_loop_depth FROM guild_settings
                 WHERE guild_id = ?1",
                rusqlite::params![guild_id],
                |row| {
                    Ok(GuildSettings {
                        context_window: row.get(0)?,
                        max_loop_depth: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(settings)
    }

    pub fn set_guild_settings(
        &self,
        guild_id: &str,
        settings: GuildSettings,
    ) -> Result<(), MemoryError> {
        let db = self.db.lock().unwrap();
        let now = chrono::Utc::now().to_rfc3339();
        db.execute(
            "INSERT INTO guild_settings (guild_id, context_window, max_loop_depth, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(guild_id) DO UPDATE SET
                context_window = excluded.context_window,
                max_loop_depth = excluded.max_loop_depth,
                updated_at = excluded.updated_at",
            rusqlite::params![
                guild_id,
                settings.context_window,
                settings.max_loop_depth,
                now
            ],
        )?;
        Ok(())
    }

    // ---- provider credentials ----

    /// Create or replace a provider. The API key is sealed before it is written.
    pub fn set_provider(
        &self,
        guild_id: &str,
        name: &str,
        endpoint: &str,
        api_key: &str,
    ) -> Result<(), MemoryError> {
        let key = self.secret_key.as_ref().ok_or(CryptoError::MissingKey)?;
        let sealed = crypto::encrypt(api_key, key)?;
        let db = self.db.lock().unwrap();
        let now = chrono::Utc::now().to_rfc3339();
        db.execute(
            "INSERT INTO providers (guild_id, name, endpoint, api_key_enc, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(guild_id, name) DO UPDATE SET
                endpoint = excluded.endpoint,
                api_key_enc = excluded.api_key_enc",
            rusqlite::params![guild_id, name, endpoint, sealed, now],
        )?;
        Ok(())
    }

    /// Look up and decrypt a provider credential.
    #[instrument(skip(self))]
    pub fn resolve_provider(
        &self,
        guild_id: &str,
        name: &str,
    ) -> Result<ProviderCredential, MemoryError> {
        let row: Option<(String, String)> = {
            let db = self.db.lock().unwrap();
            db.query_row(
                "SELECT endpoint, api_key_enc FROM providers
                 WHERE guild_id = ?1 AND name = ?2",
                rusqlite::params![guild_id, name],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?
        };
        let (endpoint, sealed) = row.ok_or_else(|| MemoryError::NotFound {
            kind: "provider",
            id: name.to_string(),
        })?;
        let key = self.secret_key.as_ref().ok_or(CryptoError::MissingKey)?;
        let api_key = crypto::decrypt(&sealed, key)?;
        Ok(ProviderCredential {
            name: name.to_string(),
            endpoint,
            api_key,
        })
    }

    pub fn list_providers(&self, guild_id: &str) -> Result<Vec<ProviderSummary>, MemoryError> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT name, endpoint, created_at FROM providers
             WHERE guild_id = ?1 ORDER BY name",
        )?;
        let rows = stmt.query_map(rusqlite::params![guild_id], |row| {
            Ok(ProviderSummary {
                name: row.get(0)?,
                endpoint: row.get(1)?,
                created_at: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

fn row_to_agent(row: &rusqlite::Row<'_>) -> rusqlite::Result<Agent> {
    Ok(Agent {
        id: AgentId::from(row.get::<_, String>(0)?),
        guild_id: row.get(1)?,
        channel_id: row.get(2)?,
        name: row.get(3)?,
        model: row.get(4)?,
        provider: row.get(5)?,
        system_prompt: row.get(6)?,
        multimodal: row.get(7)?,
        yap: row.get(8)?,
        webhook_url: row.get(9)?,
    })
}
