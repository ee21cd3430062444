//! Incremental `<msg>` segmentation of a streamed reply.
//!
//! Models are instructed to wrap every chat message in `<msg …>…</msg>` and
//! may interleave `<think>…</think>` reasoning. The segmenter keeps one
//! running buffer: reasoning spans are cut out as soon as they close, every
//! complete `<msg>` span is emitted, and only the unmatched tail is kept for
//! the next delta.

use std::sync::LazyLock;

use regex::Regex;

/// Appended to the delivered text of a reply that ignored the `<msg>` format.
pub const UNWRAPPED_WARNING: &str = "\n\n-# ⚠️ reply was not wrapped in <msg> tags";

static THINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<think>.*?</think>").expect("hardcoded regex"));
static MSG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<msg\b[^>]*>(.*?)</msg>").expect("hardcoded regex"));
static MSG_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</?msg\b[^>]*>").expect("hardcoded regex"));

const THINK_OPEN: &str = "<think>";

/// One delivered unit of an agent reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Inner text, trimmed. What peers and mention scanning see.
    pub text: String,
    /// Full tag text as stored in turn history.
    pub persisted: String,
    /// Set for the end-of-stream fallback when the model skipped the tags.
    pub unwrapped: bool,
}

impl Segment {
    /// Text posted to the channel.
    pub fn delivery(&self) -> String {
        if self.unwrapped {
            format!("{}{}", self.text, UNWRAPPED_WARNING)
        } else {
            self.text.clone()
        }
    }
}

#[derive(Debug)]
pub struct StreamSegmenter {
    buffer: String,
    speaker: String,
}

impl StreamSegmenter {
    /// `speaker` names the `from` attribute used when re-wrapping untagged output.
    pub fn new(speaker: impl Into<String>) -> Self {
        Self {
            buffer: String::new(),
            speaker: speaker.into(),
        }
    }

    /// Feed one text delta; returns the segments it completed, in order.
    pub fn push(&mut self, delta: &str) -> Vec<Segment> {
        self.buffer.push_str(delta);
        self.strip_think();

        let mut consumed = 0;
        let mut segments = Vec::new();
        while let Some(caps) = MSG_RE.captures_at(&self.buffer, consumed) {
            let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
                break;
            };
            // A message that opens inside an unterminated reasoning span waits
            // for it to close. A `<think>` inside a complete message is text.
            if self.buffer[consumed..whole.start()].contains(THINK_OPEN) {
                break;
            }
            consumed = whole.end();
            let text = inner.as_str().trim();
            if !text.is_empty() {
                segments.push(Segment {
                    text: text.to_string(),
                    persisted: whole.as_str().to_string(),
                    unwrapped: false,
                });
            }
        }
        self.buffer.drain(..consumed);
        segments
    }

    /// End of stream. Leftover non-blank text becomes one warned segment.
    pub fn finish(mut self) -> Option<Segment> {
        self.strip_think();
        if let Some(open) = self.buffer.find(THINK_OPEN) {
            if !opens_message(&self.buffer[..open]) {
                self.buffer.truncate(open);
            }
        }

        let text = MSG_TAG_RE.replace_all(&self.buffer, "");
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        Some(Segment {
            text: text.to_string(),
            persisted: wrap_msg(&self.speaker, text),
            unwrapped: true,
        })
    }

    fn strip_think(&mut self) {
        if self.buffer.contains(THINK_OPEN) {
            self.buffer = THINK_RE.replace_all(&self.buffer, "").into_owned();
        }
    }
}

/// Whether `text` ends inside an unclosed `<msg>` tag pair.
fn opens_message(text: &str) -> bool {
    MSG_TAG_RE
        .find_iter(text)
        .last()
        .is_some_and(|tag| !tag.as_str().starts_with("</"))
}

/// `<msg from="AUTHOR">TEXT</msg>`, the stored form of every chat message.
pub fn wrap_msg(author: &str, text: &str) -> String {
    format!("<msg from=\"{}\">{}</msg>", author.replace('"', "'"), text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(deltas: &[&str]) -> Vec<Segment> {
        let mut seg = StreamSegmenter::new("Botty");
        let mut out = Vec::new();
        for d in deltas {
            out.extend(seg.push(d));
        }
        out.extend(seg.finish());
        out
    }

    #[test]
    fn complete_tags_emit_immediately() {
        let mut seg = StreamSegmenter::new("Botty");
        let out = seg.push("<msg from=\"Botty\">hello</msg><msg>world</msg>");
        let texts: Vec<_> = out.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["hello", "world"]);
        assert_eq!(out[0].persisted, "<msg from=\"Botty\">hello</msg>");
        assert!(seg.finish().is_none());
    }

    #[test]
    fn tag_split_across_deltas() {
        let out = run(&["<ms", "g>hel", "lo</m", "sg>"]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].text, "hello");
        assert!(!out[0].unwrapped);
    }

    #[test]
    fn think_spans_are_discarded() {
        let out = run(&[
            "<think>plan: say <msg>secret</msg>",
            " then stop</think><msg>visible</msg>",
        ]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].text, "visible");
    }

    #[test]
    fn blank_segments_are_skipped() {
        let out = run(&["<msg>   </msg><msg>\n</msg><msg>x</msg>"]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].text, "x");
    }

    #[test]
    fn unterminated_tail_is_flushed_with_warning() {
        let out = run(&["<msg>First part.</msg>", "<msg>Second part."]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].delivery(), "First part.");
        assert_eq!(
            out[1].delivery(),
            format!("Second part.{UNWRAPPED_WARNING}")
        );
        assert_eq!(out[1].persisted, "<msg from=\"Botty\">Second part.</msg>");
    }

    #[test]
    fn untagged_prose_is_flushed_once() {
        let out = run(&["Just ", "talking <think>hmm"]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].text, "Just talking");
        assert!(out[0].unwrapped);
    }

    #[test]
    fn persisted_forms_reconstruct_stream_without_think() {
        let stream =
            "<msg>a</msg><think>x</think><msg from=\"B\">b c</msg><think>\ny\n</think><msg>d</msg>";
        let expected = THINK_RE.replace_all(stream, "").into_owned();
        for size in [1, 2, 3, 7, stream.len()] {
            let chars: Vec<char> = stream.chars().collect();
            let deltas: Vec<String> = chars
                .chunks(size)
                .map(|c| c.iter().collect::<String>())
                .collect();
            let deltas: Vec<&str> = deltas.iter().map(String::as_str).collect();
            let rebuilt: String = run(&deltas).into_iter().map(|s| s.persisted).collect();
            assert_eq!(rebuilt, expected, "delta size {size}");
        }
    }

    #[test]
    fn literal_think_inside_complete_message_is_text() {
        let mut seg = StreamSegmenter::new("Botty");
        let out = seg.push("<msg>Models use <think> tags to reason.</msg>");
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].text, "Models use <think> tags to reason.");
        assert!(!out[0].unwrapped);
        assert!(seg.finish().is_none());
    }

    #[test]
    fn message_after_unclosed_think_is_held_back() {
        let mut seg = StreamSegmenter::new("Botty");
        let out = seg.push("<msg>one</msg><think>maybe <msg>two</msg>");
        let texts: Vec<_> = out.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["one"]);
        let out = seg.push(" no</think><msg>three</msg>");
        let texts: Vec<_> = out.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["three"]);
        assert!(seg.finish().is_none());
    }

    #[test]
    fn literal_think_inside_unterminated_message_survives_flush() {
        let out = run(&["<msg>Use <think> for reasoning"]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].text, "Use <think> for reasoning");
        assert!(out[0].unwrapped);
    }

    #[test]
    fn wrap_msg_escapes_quotes() {
        assert_eq!(wrap_msg("a\"b", "hi"), "<msg from=\"a'b\">hi</msg>");
    }
}
