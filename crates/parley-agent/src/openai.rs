use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::provider::{ChatRequest, LlmProvider, ProviderError};
use crate::stream::{sse_data, LineBuffer, StreamEvent};

/// Streaming client for any OpenAI-compatible `chat/completions` endpoint.
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAiProvider {
    pub fn new(api_key: String, base_url: String) -> Self {
        Self::with_client(reqwest::Client::new(), api_key, base_url)
    }

    /// Reuse a shared connection pool.
    pub fn with_client(client: reqwest::Client, api_key: String, base_url: String) -> Self {
        Self {
            client,
            api_key,
            base_url,
        }
    }

    fn completions_url(&self) -> Result<reqwest::Url, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        reqwest::Url::parse(&url).map_err(|e| ProviderError::InvalidEndpoint(format!("{url}: {e}")))
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn send_stream(
        &self,
        req: &ChatRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), ProviderError> {
        let url = self.completions_url()?;
        let body = build_request_body(req);

        debug!(model = %req.model, %url, "sending streaming request");

        let resp = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "chat/completions API error");
            return Err(ProviderError::Api {
                status,
                message: text,
            });
        }
        if resp.content_length() == Some(0) {
            return Err(ProviderError::EmptyBody);
        }

        process_openai_stream(resp, req.model.clone(), tx).await;
        Ok(())
    }
}

fn build_request_body(req: &ChatRequest) -> serde_json::Value {
    serde_json::json!({
        "model": req.model,
        "messages": req.messages,
        "stream": true,
    })
}

/// What one SSE data line means for the stream.
#[derive(Debug, PartialEq)]
enum ChunkOutcome {
    Text(String),
    FinishReason(String),
    End,
    Skip,
}

/// Decode one `data:` payload. Malformed chunks are skipped, never fatal.
fn decode_chunk(data: &str) -> Vec<ChunkOutcome> {
    // OpenAI signals end-of-stream with a literal `[DONE]` data value
    if data.trim() == "[DONE]" {
        return vec![ChunkOutcome::End];
    }
    let Ok(chunk) = serde_json::from_str::<StreamChunk>(data) else {
        debug!(len = data.len(), "dropping malformed stream chunk");
        return vec![ChunkOutcome::Skip];
    };

    let mut out = Vec::new();
    for choice in chunk.choices {
        if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
            out.push(ChunkOutcome::Text(content));
        }
        if let Some(reason) = choice.finish_reason.filter(|r| !r.is_empty()) {
            out.push(ChunkOutcome::FinishReason(reason));
        }
    }
    out
}

/// Parse the SSE body and emit StreamEvents.
/// Each data line carries a JSON delta object; `data: [DONE]` signals end.
async fn process_openai_stream(
    resp: reqwest::Response,
    model: String,
    tx: mpsc::Sender<StreamEvent>,
) {
    use futures_util::StreamExt;

    let mut stop_reason = String::new();
    let mut lines = LineBuffer::default();
    let mut byte_stream = resp.bytes_stream();

    'read: while let Some(chunk) = byte_stream.next().await {
        let chunk = match chunk {
            Ok(c) => c,
            Err(e) => {
                let _ = tx
                    .send(StreamEvent::Error {
                        message: e.to_string(),
                    })
                    .await;
                return;
            }
        };

        for line in lines.push(&chunk) {
            let Some(data) = sse_data(&line) else {
                continue;
            };
            for outcome in decode_chunk(data) {
                match outcome {
                    ChunkOutcome::Text(text) => {
                        if tx.send(StreamEvent::TextDelta { text }).await.is_err() {
                            return; // receiver dropped
                        }
                    }
                    ChunkOutcome::FinishReason(reason) => stop_reason = reason,
                    ChunkOutcome::End => break 'read,
                    ChunkOutcome::Skip => {}
                }
            }
        }
    }

    let _ = tx.send(StreamEvent::Done { model, stop_reason }).await;
}

// Streaming chunk types (private, deserialization only)

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    content: Option<String>,
}
