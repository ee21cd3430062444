use parley_core::types::Agent;

/// Output contract appended to every agent's own system prompt.
/// `{name}` is replaced with the agent's display name.
const FORMAT_INSTRUCTIONS: &str = "\
## Message format
You are {name}, one participant in a group chat shared by humans and other AI agents.
- Wrap every chat message you send in its own tag: <msg from=\"{name}\">your text</msg>
- You may send several short messages by emitting several tags.
- Anything outside <msg> tags is not shown to anyone.
- Earlier messages reach you as <msg from=\"NAME\">…</msg>, where NAME is the speaker.
- To hand the conversation to another agent, address them by name in your message.";

/// Render the formatting block for one agent.
pub fn format_instructions(agent: &Agent) -> String {
    FORMAT_INSTRUCTIONS.replace("{name}", &agent.name)
}

/// Agent prompt and formatting block joined by a blank line; an empty half is omitted.
pub fn effective_system_prompt(agent: &Agent) -> String {
    let own = agent.system_prompt.trim();
    let format = format_instructions(agent);
    match (own.is_empty(), format.trim().is_empty()) {
        (true, true) => String::new(),
        (true, false) => format,
        (false, true) => own.to_string(),
        (false, false) => format!("{own}\n\n{format}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::types::AgentId;

    fn agent(prompt: &str) -> Agent {
        Agent {
            id: AgentId::new(),
            guild_id: "g".into(),
            channel_id: "c".into(),
            name: "Botty".into(),
            model: "m".into(),
            provider: "p".into(),
            system_prompt: prompt.into(),
            multimodal: false,
            yap: false,
            webhook_url: None,
        }
    }

    #[test]
    fn own_prompt_comes_first() {
        let p = effective_system_prompt(&agent("You are terse."));
        assert!(p.starts_with("You are terse.\n\n## Message format"));
        assert!(p.contains("<msg from=\"Botty\">"));
    }

    #[test]
    fn empty_own_prompt_is_omitted() {
        let p = effective_system_prompt(&agent("   "));
        assert!(p.starts_with("## Message format"));
    }
}
