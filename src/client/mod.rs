//! Streaming chat client
//!
//! Posts one request per user message to `/api/chat` and turns the streamed
//! markdown body into [`StreamEvent`]s. The client never touches the tree:
//! events go over a channel to whoever owns it, which applies them in the
//! order they were received.
//!
//! Event sequence for one request:
//!
//! ```text
//!   success:  Opened → Chunk* → Finished
//!   refused:  Failed                      (non-2xx or transport error)
//!   broken:   Opened → Chunk* → Failed    (stream interrupted)
//! ```
//!
//! A body that broke server-side ends with [`STREAM_ERROR_MARKER`]; text
//! before it is still delivered as chunks.

pub mod decode;

use anyhow::{bail, Context, Result};
use futures::StreamExt;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::protocol::{ChatRequest, STREAM_ERROR_MARKER};
use crate::tree::NodeId;
use decode::Utf8ChunkDecoder;

/// What happened to a node's outstanding request
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEventKind {
    /// Server accepted the request; an assistant placeholder should be added
    Opened,
    /// Next piece of text, in receipt order
    Chunk(String),
    /// Stream ended normally
    Finished,
    /// Request refused or stream broken
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamEvent {
    pub node: NodeId,
    pub kind: StreamEventKind,
}

impl StreamEvent {
    pub fn new(node: NodeId, kind: StreamEventKind) -> Self {
        Self { node, kind }
    }
}

/// Time allowed to establish the connection to the chat server
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client for the chat route
#[derive(Clone)]
pub struct StreamingClient {
    http: reqwest::Client,
    chat_url: String,
}

impl StreamingClient {
    /// Create a client for the server at `server_url` (e.g. `http://127.0.0.1:3000`)
    ///
    /// `idle_timeout` bounds each wait for the next piece of the reply, not
    /// the whole reply, so long tool rounds are not cut off.
    pub fn new(server_url: &str, idle_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .read_timeout(idle_timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            chat_url: format!("{}/api/chat", server_url.trim_end_matches('/')),
        })
    }

    pub fn chat_url(&self) -> &str {
        &self.chat_url
    }

    /// Run [`send`](Self::send) on a background task
    pub fn spawn(
        &self,
        node: NodeId,
        request: ChatRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> tokio::task::JoinHandle<()> {
        let client = self.clone();
        tokio::spawn(async move { client.send(node, request, tx).await })
    }

    /// Send `request` for `node`, reporting progress on `tx`
    ///
    /// Always ends with exactly one `Finished` or `Failed` event, unless the
    /// receiver has gone away.
    pub async fn send(&self, node: NodeId, request: ChatRequest, tx: mpsc::Sender<StreamEvent>) {
        let kind = match self.stream(node, &request, &tx).await {
            Ok(()) => StreamEventKind::Finished,
            Err(e) => {
                tracing::warn!(node = %node, "Chat request failed: {:#}", e);
                StreamEventKind::Failed(format!("{:#}", e))
            }
        };
        let _ = tx.send(StreamEvent::new(node, kind)).await;
    }

    async fn stream(
        &self,
        node: NodeId,
        request: &ChatRequest,
        tx: &mpsc::Sender<StreamEvent>,
    ) -> Result<()> {
        tracing::debug!(node = %node, url = %self.chat_url, "Sending chat request");

        let response = self
            .http
            .post(&self.chat_url)
            .json(request)
            .send()
            .await
            .context("Could not reach chat server")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Server returned {}: {}", status.as_u16(), error_message(&body));
        }

        if tx
            .send(StreamEvent::new(node, StreamEventKind::Opened))
            .await
            .is_err()
        {
            return Ok(());
        }

        let mut decoder = Utf8ChunkDecoder::default();
        let mut body = response.bytes_stream();
        let mut received = 0usize;
        let mut failure: Option<String> = None;

        while let Some(chunk) = body.next().await {
            let bytes = chunk.context("Response stream interrupted")?;
            received += bytes.len();
            let text = split_failure(decoder.push(&bytes), &mut failure);
            if text.is_empty() {
                continue;
            }
            if tx
                .send(StreamEvent::new(node, StreamEventKind::Chunk(text)))
                .await
                .is_err()
            {
                // Receiver gone (UI closed); abandon the reader
                return Ok(());
            }
        }

        let tail = split_failure(decoder.finish(), &mut failure);
        if !tail.is_empty() {
            let _ = tx
                .send(StreamEvent::new(node, StreamEventKind::Chunk(tail)))
                .await;
        }

        if let Some(message) = failure {
            bail!("Reply interrupted: {}", message.trim());
        }

        tracing::debug!(node = %node, bytes = received, "Chat stream complete");
        Ok(())
    }
}

/// Return the reply part of `text`, moving anything after the error marker
/// into `failure`
fn split_failure(text: String, failure: &mut Option<String>) -> String {
    if let Some(message) = failure {
        message.push_str(&text);
        return String::new();
    }
    match text.split_once(STREAM_ERROR_MARKER) {
        Some((reply, error)) => {
            *failure = Some(error.to_string());
            reply.to_string()
        }
        None => text,
    }
}

/// Pull a human-readable message out of an error body
///
/// The server answers errors with `{"error": "..."}`; anything else is
/// returned as-is.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
        .unwrap_or_else(|| body.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{Body, Bytes},
        http::StatusCode,
        response::{IntoResponse, Response},
        routing::post,
        Json, Router,
    };
    use std::net::SocketAddr;
    use tokio::net::TcpListener;

    async fn serve(app: Router) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    async fn streaming_reply() -> Response {
        let chunks = ["Hel", "lo", " world"];
        let stream = futures::stream::iter(
            chunks
                .into_iter()
                .map(|c| Ok::<_, std::io::Error>(Bytes::from(c))),
        );
        Response::builder()
            .header("content-type", "text/markdown; charset=utf-8")
            .body(Body::from_stream(stream))
            .unwrap()
    }

    async fn slow_reply() -> Response {
        let stream = futures::stream::iter(["a", "b", "c", "d"]).then(|c| async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            Ok::<_, std::io::Error>(Bytes::from(c))
        });
        Response::builder()
            .header("content-type", "text/markdown; charset=utf-8")
            .body(Body::from_stream(stream))
            .unwrap()
    }

    async fn failing_reply() -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": "upstream exploded" })),
        )
            .into_response()
    }

    fn request() -> ChatRequest {
        ChatRequest {
            prompt: "hi".to_string(),
            quoted_text: None,
            parent_conversation: None,
            conversation: Vec::new(),
        }
    }

    async fn collect(client: &StreamingClient, node: NodeId) -> Vec<StreamEvent> {
        let (tx, mut rx) = mpsc::channel(16);
        client.send(node, request(), tx).await;
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_streams_chunks_in_order() {
        let addr = serve(Router::new().route("/api/chat", post(streaming_reply))).await;
        let client =
            StreamingClient::new(&format!("http://{}", addr), Duration::from_secs(5)).unwrap();
        let node = NodeId::next();

        let events = collect(&client, node).await;

        assert_eq!(events.first().unwrap().kind, StreamEventKind::Opened);
        assert_eq!(events.last().unwrap().kind, StreamEventKind::Finished);
        let text: String = events
            .iter()
            .filter_map(|e| match &e.kind {
                StreamEventKind::Chunk(t) => Some(t.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(text, "Hello world");
        assert!(events.iter().all(|e| e.node == node));
    }

    #[tokio::test]
    async fn test_reply_may_outlast_idle_timeout() {
        let addr = serve(Router::new().route("/api/chat", post(slow_reply))).await;
        // Whole reply takes ~600ms; no single gap reaches 400ms
        let client =
            StreamingClient::new(&format!("http://{}", addr), Duration::from_millis(400)).unwrap();

        let events = collect(&client, NodeId::next()).await;

        assert_eq!(events.last().unwrap().kind, StreamEventKind::Finished);
        let text: String = events
            .iter()
            .filter_map(|e| match &e.kind {
                StreamEventKind::Chunk(t) => Some(t.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(text, "abcd");
    }

    #[tokio::test]
    async fn test_server_error_is_single_failure() {
        let addr = serve(Router::new().route("/api/chat", post(failing_reply))).await;
        let client = StreamingClient::new(&format!("http://{}/", addr), Duration::from_secs(5))
            .unwrap();

        let events = collect(&client, NodeId::next()).await;

        assert_eq!(events.len(), 1);
        match &events[0].kind {
            StreamEventKind::Failed(msg) => {
                assert!(msg.contains("500"));
                assert!(msg.contains("upstream exploded"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unreachable_server_fails() {
        // Bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client =
            StreamingClient::new(&format!("http://{}", addr), Duration::from_secs(5)).unwrap();
        let events = collect(&client, NodeId::next()).await;

        assert_eq!(events.len(), 1);
        assert!(matches!(events[0].kind, StreamEventKind::Failed(_)));
    }

    async fn interrupted_reply() -> Response {
        let chunks = [
            "Hel".to_string(),
            format!("lo{}Upstream ", STREAM_ERROR_MARKER),
            "gone".to_string(),
        ];
        let stream = futures::stream::iter(
            chunks
                .into_iter()
                .map(|c| Ok::<_, std::io::Error>(Bytes::from(c))),
        );
        Response::builder()
            .header("content-type", "text/markdown; charset=utf-8")
            .body(Body::from_stream(stream))
            .unwrap()
    }

    #[tokio::test]
    async fn test_error_marker_ends_in_failure_after_text() {
        let addr = serve(Router::new().route("/api/chat", post(interrupted_reply))).await;
        let client =
            StreamingClient::new(&format!("http://{}", addr), Duration::from_secs(5)).unwrap();

        let events = collect(&client, NodeId::next()).await;

        assert_eq!(events.first().unwrap().kind, StreamEventKind::Opened);
        let text: String = events
            .iter()
            .filter_map(|e| match &e.kind {
                StreamEventKind::Chunk(t) => Some(t.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(text, "Hello");
        match &events.last().unwrap().kind {
            StreamEventKind::Failed(msg) => assert!(msg.contains("Upstream gone"), "{}", msg),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn test_split_failure_collects_message_across_chunks() {
        let mut failure = None;
        let marked = format!("partial{}bad ", STREAM_ERROR_MARKER);
        assert_eq!(split_failure(marked, &mut failure), "partial");
        assert_eq!(split_failure("news".to_string(), &mut failure), "");
        assert_eq!(failure.as_deref(), Some("bad news"));
    }

    #[test]
    fn test_chat_url_trims_trailing_slash() {
        let client =
            StreamingClient::new("http://localhost:3000/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.chat_url(), "http://localhost:3000/api/chat");
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(error_message(r#"{"error":"bad"}"#), "bad");
        assert_eq!(error_message("plain text\n"), "plain text");
    }
}
