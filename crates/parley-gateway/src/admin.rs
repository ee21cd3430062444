//! Command-line surface of the `parley` binary.
//!
//! `serve` (the default) runs the gateway; everything else edits the
//! SQLite store directly and exits.

use clap::{Args, Parser, Subcommand};
use parley_core::types::{Agent, AgentId, GuildSettings};
use parley_memory::MemoryManager;

#[derive(Parser, Debug)]
#[command(name = "parley", version, about = "Multi-agent Discord chat gateway")]
pub struct Cli {
    /// Path to parley.toml (overrides PARLEY_CONFIG).
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the gateway (default).
    Serve,
    /// Print a fresh 256-bit credential key as hex.
    Keygen,
    #[command(subcommand)]
    Agent(AgentCommand),
    #[command(subcommand)]
    Provider(ProviderCommand),
    #[command(subcommand)]
    Guild(GuildCommand),
    #[command(subcommand)]
    History(HistoryCommand),
}

#[derive(Subcommand, Debug)]
pub enum AgentCommand {
    /// Bind a new agent to a channel.
    Add(AgentAddArgs),
    List {
        #[arg(long)]
        guild: String,
    },
    /// Remove an agent together with its history.
    Remove { id: String },
}

#[derive(Args, Debug)]
pub struct AgentAddArgs {
    #[arg(long)]
    pub guild: String,
    #[arg(long)]
    pub channel: String,
    #[arg(long)]
    pub name: String,
    #[arg(long)]
    pub model: String,
    /// Name of a provider registered with `provider set`.
    #[arg(long)]
    pub provider: String,
    #[arg(long, default_value = "")]
    pub system_prompt: String,
    #[arg(long)]
    pub multimodal: bool,
    #[arg(long)]
    pub yap: bool,
    #[arg(long)]
    pub webhook_url: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum ProviderCommand {
    /// Create or replace an OpenAI-compatible provider.
    Set {
        #[arg(long)]
        guild: String,
        #[arg(long)]
        name: String,
        /// Base URL, e.g. https://api.openai.com/v1
        #[arg(long)]
        endpoint: String,
        #[arg(long)]
        api_key: String,
    },
    List {
        #[arg(long)]
        guild: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum GuildCommand {
    /// Update turn limits; unspecified values keep their current setting.
    Set {
        #[arg(long)]
        guild: String,
        #[arg(long)]
        context_window: Option<u32>,
        #[arg(long)]
        max_loop_depth: Option<u32>,
    },
    Show {
        #[arg(long)]
        guild: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum HistoryCommand {
    /// Delete every turn record owned by one agent.
    Clear {
        #[arg(long)]
        agent: String,
    },
}

pub fn history(cmd: HistoryCommand, memory: &MemoryManager) -> anyhow::Result<()> {
    match cmd {
        HistoryCommand::Clear { agent } => {
            let removed = memory.clear_history(&AgentId::from(agent))?;
            println!("removed {removed} turn records");
        }
    }
    Ok(())
}

pub fn agent(cmd: AgentCommand, memory: &MemoryManager) -> anyhow::Result<()> {
    match cmd {
        AgentCommand::Add(args) => {
            let agent = Agent {
                id: AgentId::new(),
                guild_id: args.guild,
                channel_id: args.channel,
                name: args.name,
                model: args.model,
                provider: args.provider,
                system_prompt: args.system_prompt,
                multimodal: args.multimodal,
                yap: args.yap,
                webhook_url: args.webhook_url,
            };
            memory.insert_agent(&agent)?;
            println!("{}", agent.id);
        }
        AgentCommand::List { guild } => {
            for a in memory.list_agents(&guild)? {
                println!(
                    "{}  #{}  {}  {}/{}{}{}",
                    a.id,
                    a.channel_id,
                    a.name,
                    a.provider,
                    a.model,
                    if a.yap { "  yap" } else { "" },
                    if a.webhook_url.is_some() { "  webhook" } else { "" },
                );
            }
        }
        AgentCommand::Remove { id } => {
            let id = AgentId::from(id);
            let agent = memory.get_agent(&id)?;
            memory.remove_agent(&id)?;
            println!("removed {} from #{}", agent.name, agent.channel_id);
        }
    }
    Ok(())
}

pub fn provider(cmd: ProviderCommand, memory: &MemoryManager) -> anyhow::Result<()> {
    match cmd {
        ProviderCommand::Set {
            guild,
            name,
            endpoint,
            api_key,
        } => {
            memory.set_provider(&guild, &name, &endpoint, &api_key)?;
            println!("provider '{name}' saved");
        }
        ProviderCommand::List { guild } => {
            for p in memory.list_providers(&guild)? {
                println!("{}  {}  {}", p.name, p.endpoint, p.created_at);
            }
        }
    }
    Ok(())
}

pub fn guild(cmd: GuildCommand, memory: &MemoryManager) -> anyhow::Result<()> {
    match cmd {
        GuildCommand::Set {
            guild,
            context_window,
            max_loop_depth,
        } => {
            let current = memory.guild_settings(&guild)?.unwrap_or_default();
            let settings = merge_settings(current, context_window, max_loop_depth);
            memory.set_guild_settings(&guild, settings)?;
            print_settings(&settings);
        }
        GuildCommand::Show { guild } => match memory.guild_settings(&guild)? {
            Some(settings) => print_settings(&settings),
            None => println!("no settings stored; built-in defaults apply"),
        },
    }
    Ok(())
}

fn merge_settings(
    current: GuildSettings,
    context_window: Option<u32>,
    max_loop_depth: Option<u32>,
) -> GuildSettings {
    GuildSettings {
        context_window: context_window.unwrap_or(current.context_window),
        max_loop_depth: max_loop_depth.unwrap_or(current.max_loop_depth),
    }
}

fn print_settings(settings: &GuildSettings) {
    println!(
        "context_window = {}\nmax_loop_depth = {}",
        settings.context_window, settings.max_loop_depth
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_means_serve() {
        let cli = Cli::try_parse_from(["parley"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn agent_add_parses_flags() {
        let cli = Cli::try_parse_from([
            "parley", "agent", "add", "--guild", "1", "--channel", "2", "--name", "Botty",
            "--model", "gpt-4o-mini", "--provider", "openai", "--yap",
        ])
        .unwrap();
        let Some(Command::Agent(AgentCommand::Add(args))) = cli.command else {
            panic!("expected agent add");
        };
        assert_eq!(args.name, "Botty");
        assert!(args.yap);
        assert!(!args.multimodal);
        assert!(args.webhook_url.is_none());
    }

    #[test]
    fn global_config_flag_after_subcommand() {
        let cli = Cli::try_parse_from(["parley", "keygen", "--config", "/tmp/p.toml"]).unwrap();
        assert_eq!(cli.config.as_deref(), Some("/tmp/p.toml"));
    }

    #[test]
    fn guild_set_keeps_unspecified_values() {
        let current = GuildSettings {
            context_window: 4,
            max_loop_depth: 3,
        };
        let merged = merge_settings(current, None, Some(0));
        assert_eq!(merged.context_window, 4);
        assert_eq!(merged.max_loop_depth, 0);
    }

    #[test]
    fn agent_remove_rejects_unknown_id() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        parley_memory::db::init_db(&conn).unwrap();
        let memory = MemoryManager::new(conn);
        let cmd = AgentCommand::Remove {
            id: "missing".into(),
        };
        assert!(agent(cmd, &memory).is_err());
    }

    #[test]
    fn history_clear_removes_agent_turns() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        parley_memory::db::init_db(&conn).unwrap();
        let memory = MemoryManager::new(conn);
        let id = AgentId::from("a1");
        memory
            .insert_turn(
                &id,
                parley_core::types::TurnRole::User,
                "hi",
                Some("sam"),
                None,
            )
            .unwrap();

        history(HistoryCommand::Clear { agent: "a1".into() }, &memory).unwrap();
        assert_eq!(memory.clear_history(&id).unwrap(), 0);
    }
}
