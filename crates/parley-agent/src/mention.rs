use parley_core::types::Agent;
use regex::RegexBuilder;

/// Whole-word, case-insensitive occurrence of `name` in `text`.
///
/// A word boundary is any non-alphanumeric, non-underscore character or the
/// text edge, so names that themselves start or end with punctuation still match.
pub fn mentions(text: &str, name: &str) -> bool {
    let name = name.trim();
    if name.is_empty() {
        return false;
    }
    let pattern = format!(r"(?:^|[^\w]){}(?:$|[^\w])", regex::escape(name));
    match RegexBuilder::new(&pattern).case_insensitive(true).build() {
        Ok(re) => re.is_match(text),
        Err(_) => false,
    }
}

/// Peers other than `speaker` named in `text`, in peer-set order.
pub fn mentioned_peers<'a>(text: &str, speaker: &Agent, peers: &'a [Agent]) -> Vec<&'a Agent> {
    peers
        .iter()
        .filter(|p| p.id != speaker.id && mentions(text, &p.name))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::types::AgentId;

    fn agent(name: &str) -> Agent {
        Agent {
            id: AgentId::new(),
            guild_id: "g".into(),
            channel_id: "c".into(),
            name: name.into(),
            model: "m".into(),
            provider: "p".into(),
            system_prompt: String::new(),
            multimodal: false,
            yap: false,
            webhook_url: None,
        }
    }

    #[test]
    fn whole_word_case_insensitive() {
        assert!(mentions("what do you think, botty?", "Botty"));
        assert!(mentions("Botty", "Botty"));
        assert!(mentions("(BOTTY)", "Botty"));
        assert!(!mentions("Bottyverse is big", "Botty"));
        assert!(!mentions("robotty", "Botty"));
        assert!(!mentions("anything", "  "));
    }

    #[test]
    fn names_with_regex_metacharacters() {
        assert!(mentions("ask c++ about it", "C++"));
        assert!(mentions("hey Dr. Who", "Dr. Who"));
    }

    #[test]
    fn speaker_never_mentions_itself() {
        let a = agent("Alpha");
        let b = agent("Botty");
        let c = agent("Cleo");
        let peers = vec![a.clone(), b.clone(), c];
        let hits = mentioned_peers("Alpha here. Botty, your turn.", &a, &peers);
        assert_eq!(hits, vec![&b]);
        assert!(mentioned_peers("nobody named", &a, &peers).is_empty());
    }
}
