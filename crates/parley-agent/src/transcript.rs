//! Turn history + current input → provider-ready transcript.

use std::sync::LazyLock;

use parley_core::types::Agent;
use parley_memory::types::{HistoryEntry, Speaker};
use regex::Regex;

use crate::provider::{ContentPart, Message, MessageContent, Role};
use crate::segment::wrap_msg;

/// Exactly one `<msg …>` wrapper spanning the whole record.
static OUTER_MSG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\A\s*<msg\b[^>]*>(.*)</msg>\s*\z").expect("hardcoded regex")
});

/// A text attachment after its body has been fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineDocument {
    pub name: String,
    pub body: String,
}

impl InlineDocument {
    fn render(&self) -> String {
        format!("[{}]\n{}", self.name, self.body)
    }
}

/// Current input with attachments resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreparedInput {
    pub author: String,
    pub text: String,
    /// URLs of image attachments.
    pub images: Vec<String>,
    pub documents: Vec<InlineDocument>,
}

impl PreparedInput {
    /// Input text followed by each document, separated by blank lines.
    pub fn combined_text(&self) -> String {
        let mut parts: Vec<String> = Vec::with_capacity(1 + self.documents.len());
        if !self.text.trim().is_empty() {
            parts.push(self.text.clone());
        }
        parts.extend(self.documents.iter().map(InlineDocument::render));
        parts.join("\n\n")
    }

    /// Stored form: `<msg from="AUTHOR">TEXT</msg>`.
    pub fn persisted_form(&self) -> String {
        wrap_msg(&self.author, &self.combined_text())
    }
}

/// Assemble the transcript for one completion call.
///
/// Pure over its inputs. `history` must be oldest first and must not include
/// the record of `input` itself.
pub fn build(
    agent: &Agent,
    input: &PreparedInput,
    history: &[HistoryEntry],
    system_prompt: &str,
) -> Vec<Message> {
    let mut messages = Vec::with_capacity(history.len() + 2);

    if !system_prompt.trim().is_empty() {
        messages.push(Message::text(Role::System, system_prompt));
    }

    for entry in history {
        let (role, content) = match &entry.speaker {
            Speaker::SelfAgent => (Role::Assistant, strip_outer_msg(&entry.content)),
            Speaker::PeerAgent(_) | Speaker::Human => (Role::User, entry.content.clone()),
        };
        if content.trim().is_empty() {
            continue;
        }
        push_merged(&mut messages, role, content);
    }

    messages.push(current_input(agent, input));
    messages
}

/// Inner text of a single outer `<msg>` wrapper, or the trimmed record.
fn strip_outer_msg(content: &str) -> String {
    match OUTER_MSG_RE.captures(content).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str().trim().to_string(),
        None => content.trim().to_string(),
    }
}

/// Append, or fold into the previous entry when it has the same non-system
/// role and both sides are plain text.
fn push_merged(messages: &mut Vec<Message>, role: Role, content: String) {
    if let Some(last) = messages.last_mut() {
        if last.role == role && role != Role::System {
            if let MessageContent::Text(prev) = &mut last.content {
                prev.push('\n');
                prev.push_str(&content);
                return;
            }
        }
    }
    messages.push(Message::text(role, content));
}

fn current_input(agent: &Agent, input: &PreparedInput) -> Message {
    let has_attachments = !input.images.is_empty() || !input.documents.is_empty();
    if !agent.multimodal || !has_attachments {
        return Message::text(Role::User, input.persisted_form());
    }

    let mut parts = Vec::with_capacity(1 + input.images.len() + input.documents.len());
    if !input.text.trim().is_empty() {
        parts.push(ContentPart::text(wrap_msg(&input.author, &input.text)));
    }
    parts.extend(input.images.iter().map(ContentPart::image));
    parts.extend(input.documents.iter().map(|d| ContentPart::text(d.render())));
    Message {
        role: Role::User,
        content: MessageContent::Parts(parts),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::types::AgentId;

    fn agent(multimodal: bool) -> Agent {
        Agent {
            id: AgentId::from("self"),
            guild_id: "g".into(),
            channel_id: "c".into(),
            name: "Botty".into(),
            model: "m".into(),
            provider: "p".into(),
            system_prompt: String::new(),
            multimodal,
            yap: false,
            webhook_url: None,
        }
    }

    fn entry(speaker: Speaker, content: &str) -> HistoryEntry {
        let owner = match &speaker {
            Speaker::PeerAgent(id) => id.clone(),
            _ => AgentId::from("self"),
        };
        HistoryEntry {
            id: 0,
            owner,
            speaker,
            content: content.into(),
            author: None,
            created_at: String::new(),
        }
    }

    fn input(text: &str) -> PreparedInput {
        PreparedInput {
            author: "sam".into(),
            text: text.into(),
            ..Default::default()
        }
    }

    #[test]
    fn consecutive_own_segments_merge() {
        let history = vec![
            entry(Speaker::SelfAgent, "<msg>A</msg>"),
            entry(Speaker::SelfAgent, "<msg from=\"Botty\">B</msg>"),
            entry(Speaker::SelfAgent, "<msg>C</msg>"),
        ];
        let msgs = build(&agent(false), &input("next"), &history, "");
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].role, Role::Assistant);
        assert_eq!(msgs[0].as_text(), Some("A\nB\nC"));
    }

    #[test]
    fn system_entry_only_when_prompt_non_empty() {
        let msgs = build(&agent(false), &input("hi"), &[], "be nice");
        assert_eq!(msgs[0].role, Role::System);
        assert_eq!(msgs.len(), 2);

        let msgs = build(&agent(false), &input("hi"), &[], "  ");
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].role, Role::User);
    }

    #[test]
    fn peer_output_becomes_user_with_tag_kept() {
        let peer = AgentId::from("peer");
        let history = vec![
            entry(Speaker::Human, "<msg from=\"sam\">hey all</msg>"),
            entry(Speaker::PeerAgent(peer.clone()), "<msg from=\"Cleo\">hi sam</msg>"),
            entry(Speaker::SelfAgent, "<msg>hello</msg>"),
        ];
        let msgs = build(&agent(false), &input("ok"), &history, "");
        assert_eq!(msgs.len(), 3);
        assert_eq!(msgs[0].role, Role::User);
        assert_eq!(
            msgs[0].as_text(),
            Some("<msg from=\"sam\">hey all</msg>\n<msg from=\"Cleo\">hi sam</msg>")
        );
        assert_eq!(msgs[1].as_text(), Some("hello"));
    }

    #[test]
    fn blank_records_are_skipped() {
        let history = vec![
            entry(Speaker::SelfAgent, "<msg>  </msg>"),
            entry(Speaker::Human, "   "),
        ];
        let msgs = build(&agent(false), &input("x"), &history, "");
        assert_eq!(msgs.len(), 1);
    }

    #[test]
    fn unwrapped_own_record_is_trimmed() {
        let history = vec![entry(Speaker::SelfAgent, "  raw reply \n")];
        let msgs = build(&agent(false), &input("x"), &history, "");
        assert_eq!(msgs[0].as_text(), Some("raw reply"));
    }

    #[test]
    fn current_input_never_merges() {
        let history = vec![entry(Speaker::Human, "<msg from=\"sam\">first</msg>")];
        let msgs = build(&agent(false), &input("second"), &history, "");
        assert_eq!(msgs.len(), 2);
        assert_eq!(
            msgs[1].as_text(),
            Some("<msg from=\"sam\">second</msg>")
        );
    }

    #[test]
    fn multimodal_input_becomes_parts() {
        let mut inp = input("look at this");
        inp.images.push("https://cdn.example/cat.png".into());
        inp.documents.push(InlineDocument {
            name: "notes.md".into(),
            body: "# Notes".into(),
        });

        let msgs = build(&agent(true), &inp, &[], "");
        match &msgs[0].content {
            MessageContent::Parts(parts) => {
                assert_eq!(parts.len(), 3);
                assert_eq!(
                    parts[0],
                    ContentPart::text("<msg from=\"sam\">look at this</msg>")
                );
                assert_eq!(parts[1], ContentPart::image("https://cdn.example/cat.png"));
                assert_eq!(parts[2], ContentPart::text("[notes.md]\n# Notes"));
            }
            other => panic!("expected parts, got {other:?}"),
        }
    }

    #[test]
    fn text_only_agent_gets_documents_inline() {
        let mut inp = input("see file");
        inp.images.push("https://cdn.example/cat.png".into());
        inp.documents.push(InlineDocument {
            name: "a.txt".into(),
            body: "body".into(),
        });
        let msgs = build(&agent(false), &inp, &[], "");
        assert_eq!(
            msgs[0].as_text(),
            Some("<msg from=\"sam\">see file\n\n[a.txt]\nbody</msg>")
        );
    }
}
