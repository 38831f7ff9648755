//! Client for OpenAI-compatible chat completion endpoints
//!
//! Two call shapes are used:
//! - [`CompletionClient::stream`]: `stream: true`, consumed as [`Delta`]s
//! - [`CompletionClient::complete`]: one JSON response, reduced to its text
//!
//! Credentials are resolved per call from the provider's `key_env`.

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::Deserialize;
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use super::sse::{SseEvent, SseLineBuffer};
use crate::config::ProviderConfig;

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Why an upstream call failed
#[derive(Debug)]
pub enum UpstreamError {
    /// No credential in `key_env` (or inline)
    MissingCredential { key_env: String },
    /// Provider answered with a non-2xx status
    Status { status: u16, message: String },
    /// Connection, timeout or body read failure
    Transport(reqwest::Error),
    /// Provider sent something we could not interpret
    Decode(String),
}

impl fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpstreamError::MissingCredential { key_env } => {
                write!(f, "Missing API key: set {}", key_env)
            }
            UpstreamError::Status { status, message } => {
                write!(f, "Upstream returned {}: {}", status, message)
            }
            UpstreamError::Transport(e) => write!(f, "Upstream request failed: {}", e),
            UpstreamError::Decode(msg) => write!(f, "Unreadable upstream response: {}", msg),
        }
    }
}

impl std::error::Error for UpstreamError {}

impl From<reqwest::Error> for UpstreamError {
    fn from(e: reqwest::Error) -> Self {
        UpstreamError::Transport(e)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire types (only the fields we read)
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: ChunkDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCallDelta>,
}

/// Fragment of a streamed tool call; fields arrive spread over many chunks
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ToolCallDelta {
    #[serde(default)]
    pub index: usize,
    pub id: Option<String>,
    pub function: Option<FunctionDelta>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FunctionDelta {
    pub name: Option<String>,
    pub arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Completion {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Streaming
// ─────────────────────────────────────────────────────────────────────────────

/// One decoded item from a completion stream
#[derive(Debug, Clone, PartialEq)]
pub enum Delta {
    Text(String),
    ToolCall(ToolCallDelta),
    /// `finish_reason` of the choice ("stop", "tool_calls", ...)
    Finish(String),
}

/// Pull-based reader over an SSE completion body
pub struct CompletionStream {
    body: BoxStream<'static, reqwest::Result<Bytes>>,
    lines: SseLineBuffer,
    pending: VecDeque<Delta>,
    done: bool,
}

impl CompletionStream {
    fn new(body: BoxStream<'static, reqwest::Result<Bytes>>) -> Self {
        Self {
            body,
            lines: SseLineBuffer::new(),
            pending: VecDeque::new(),
            done: false,
        }
    }

    /// Next delta; `None` once `[DONE]` or end of body is reached
    pub async fn next(&mut self) -> Option<Result<Delta, UpstreamError>> {
        loop {
            if let Some(delta) = self.pending.pop_front() {
                return Some(Ok(delta));
            }
            if self.done {
                return None;
            }

            let events = match self.body.next().await {
                Some(Ok(chunk)) => self.lines.push(&chunk),
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(UpstreamError::Transport(e)));
                }
                None => {
                    self.done = true;
                    self.lines.finish().into_iter().collect()
                }
            };

            for event in events {
                match event {
                    SseEvent::Done => {
                        self.done = true;
                        break;
                    }
                    SseEvent::Data(payload) => {
                        if let Err(e) = self.decode(&payload) {
                            self.done = true;
                            return Some(Err(e));
                        }
                    }
                }
            }
        }
    }

    fn decode(&mut self, payload: &str) -> Result<(), UpstreamError> {
        let chunk: StreamChunk = serde_json::from_str(payload)
            .map_err(|e| UpstreamError::Decode(format!("{} in {:?}", e, payload)))?;

        // Only the first choice is requested (n = 1)
        let Some(choice) = chunk.choices.into_iter().next() else {
            return Ok(());
        };
        if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
            self.pending.push_back(Delta::Text(text));
        }
        for call in choice.delta.tool_calls {
            self.pending.push_back(Delta::ToolCall(call));
        }
        if let Some(reason) = choice.finish_reason {
            self.pending.push_back(Delta::Finish(reason));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Client
// ─────────────────────────────────────────────────────────────────────────────

/// Shared HTTP client for all providers
#[derive(Clone)]
pub struct CompletionClient {
    http: reqwest::Client,
}

impl CompletionClient {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        use anyhow::Context;

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(10)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { http })
    }

    async fn post(
        &self,
        provider: &ProviderConfig,
        body: &serde_json::Value,
    ) -> Result<reqwest::Response, UpstreamError> {
        let key = provider
            .credential()
            .ok_or_else(|| UpstreamError::MissingCredential {
                key_env: provider.key_env.clone(),
            })?;
        let url = provider.completions_url();
        tracing::debug!(url = %url, model = %provider.model, "Upstream request");

        let response = self
            .http
            .post(&url)
            .bearer_auth(key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let text = response.text().await.unwrap_or_default();
        Err(UpstreamError::Status {
            status: status.as_u16(),
            message: provider_message(&text),
        })
    }

    /// Start a streamed completion; fails before any delta on non-2xx
    pub async fn stream(
        &self,
        provider: &ProviderConfig,
        mut body: serde_json::Value,
    ) -> Result<CompletionStream, UpstreamError> {
        body["model"] = provider.model.clone().into();
        body["stream"] = true.into();
        let response = self.post(provider, &body).await?;
        Ok(CompletionStream::new(response.bytes_stream().boxed()))
    }

    /// Non-streaming completion; returns the first choice's text
    pub async fn complete(
        &self,
        provider: &ProviderConfig,
        mut body: serde_json::Value,
    ) -> Result<String, UpstreamError> {
        body["model"] = provider.model.clone().into();
        body["stream"] = false.into();
        let response = self.post(provider, &body).await?;
        let completion: Completion = response
            .json()
            .await
            .map_err(|e| UpstreamError::Decode(e.to_string()))?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| UpstreamError::Decode("completion has no content".to_string()))
    }
}

/// Extract `error.message` from an OpenAI-style error body
fn provider_message(body: &str) -> String {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    parsed
        .as_ref()
        .and_then(|v| {
            v.pointer("/error/message")
                .or_else(|| v.get("error"))
                .or_else(|| v.get("message"))
        })
        .and_then(|m| m.as_str())
        .map(String::from)
        .unwrap_or_else(|| body.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn stream_of(chunks: &[&'static str]) -> CompletionStream {
        let body = stream::iter(
            chunks
                .iter()
                .map(|c| Ok::<_, reqwest::Error>(Bytes::from_static(c.as_bytes())))
                .collect::<Vec<_>>(),
        );
        CompletionStream::new(body.boxed())
    }

    async fn drain(mut s: CompletionStream) -> Vec<Delta> {
        let mut out = Vec::new();
        while let Some(item) = s.next().await {
            out.push(item.unwrap());
        }
        out
    }

    #[tokio::test]
    async fn test_text_deltas_across_chunk_boundaries() {
        let s = stream_of(&[
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\",\"content\":\"Hel\"}}]}\n\ndata: {\"choi",
            "ces\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\ndata: [DONE]\n\n",
        ]);
        assert_eq!(
            drain(s).await,
            vec![
                Delta::Text("Hel".to_string()),
                Delta::Text("lo".to_string()),
                Delta::Finish("stop".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_tool_call_fragments() {
        let s = stream_of(&[
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"call_1\",\"type\":\"function\",\"function\":{\"name\":\"search\",\"arguments\":\"\"}}]}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"{\\\"query\\\":\\\"rust\\\"}\"}}]}}]}\n\n",
            "data: [DONE]\n\n",
        ]);
        let deltas = drain(s).await;
        assert_eq!(deltas.len(), 2);
        match &deltas[0] {
            Delta::ToolCall(call) => {
                assert_eq!(call.id.as_deref(), Some("call_1"));
                assert_eq!(
                    call.function.as_ref().unwrap().name.as_deref(),
                    Some("search")
                );
            }
            other => panic!("expected tool call, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_nothing_after_done() {
        let s = stream_of(&[
            "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n\ndata: [DONE]\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n\n",
        ]);
        assert_eq!(drain(s).await, vec![Delta::Text("a".to_string())]);
    }

    #[tokio::test]
    async fn test_malformed_payload_is_decode_error() {
        let mut s = stream_of(&["data: {not json}\n\n"]);
        assert!(matches!(
            s.next().await,
            Some(Err(UpstreamError::Decode(_)))
        ));
        assert!(s.next().await.is_none());
    }

    #[test]
    fn test_provider_message_extraction() {
        assert_eq!(
            provider_message(r#"{"error":{"message":"Invalid key","type":"auth"}}"#),
            "Invalid key"
        );
        assert_eq!(provider_message(r#"{"error":"flat"}"#), "flat");
        assert_eq!(provider_message("Bad Gateway\n"), "Bad Gateway");
    }
}
