/// Events emitted during an LLM streaming response.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Incremental text content from the model.
    TextDelta { text: String },

    /// Stream completed successfully.
    Done { model: String, stop_reason: String },

    /// Transport failure after the stream started.
    Error { message: String },
}

/// Payload of an SSE `data:` line. Other fields (`event:`, comments) carry
/// nothing the chat stream needs.
pub fn sse_data(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

/// Reassembles SSE lines from arbitrarily split byte chunks.
///
/// Works on bytes so a multi-byte character split across chunks is decoded
/// only once its line is complete.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    /// Append a chunk and return every non-empty line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let Some(last_newline) = self.buf.iter().rposition(|b| *b == b'\n') else {
            return Vec::new();
        };
        let rest = self.buf.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.buf, rest);
        String::from_utf8_lossy(&complete)
            .lines()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sse_data_with_and_without_space() {
        assert_eq!(sse_data("data: {\"a\":1}"), Some("{\"a\":1}"));
        assert_eq!(sse_data("data:[DONE]"), Some("[DONE]"));
        assert_eq!(sse_data("event: ping"), None);
        assert_eq!(sse_data(": keep-alive"), None);
    }

    #[test]
    fn line_buffer_holds_partial_lines() {
        let mut lb = LineBuffer::default();
        assert!(lb.push(b"data: one").is_empty());
        assert_eq!(lb.push(b"\ndata: tw"), vec!["data: one"]);
        assert_eq!(lb.push(b"o\n\n"), vec!["data: two"]);
    }

    #[test]
    fn line_buffer_joins_split_characters() {
        let bytes = "data: héllo\n".as_bytes();
        let mut lb = LineBuffer::default();
        assert!(lb.push(&bytes[..8]).is_empty());
        assert_eq!(lb.push(&bytes[8..]), vec!["data: héllo"]);
    }
}
