//! `/api/chat` and `/api/assistant` handlers
//!
//! Validation and the first upstream request happen before the response is
//! returned, so bad input and provider failures still produce a JSON error
//! status. Once streaming starts, text is relayed from a spawned task
//! through a channel-backed body; an upstream failure from then on ends the
//! body with [`STREAM_ERROR_MARKER`] and the error text.

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::future::Future;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::error::ApiError;
use super::prompt;
use super::tools::{self, ToolCall, ToolCallAccumulator};
use super::upstream::{CompletionStream, Delta, UpstreamError};
use super::ProxyState;
use crate::config::ToolMode;
use crate::protocol::STREAM_ERROR_MARKER;

type BodySender = mpsc::Sender<Result<Bytes, Infallible>>;

/// Channel depth between the relay task and the response body
const BODY_BUFFER: usize = 64;

/// `POST /api/chat`
pub(crate) async fn chat(
    State(state): State<ProxyState>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request = prompt::parse_chat_request(&body)?;
    let messages = prompt::chat_messages(&state.chat.system_prompt, &request);

    tracing::info!(
        tools = state.chat.tools.as_str(),
        history = request.conversation.len(),
        quoted = request.quoted_text.is_some(),
        branched = request.parent_conversation.is_some(),
        "Chat request"
    );

    match state.chat.tools {
        ToolMode::None => {
            let stream = state
                .client
                .stream(&state.chat.provider, json!({ "messages": messages }))
                .await?;
            Ok(stream_response(|tx| relay_plain(stream, tx)))
        }
        ToolMode::Search => {
            let body = round_trip_body(&messages, 1, state.chat.max_tool_steps);
            let stream = state.client.stream(&state.chat.provider, body).await?;
            Ok(stream_response(move |tx| {
                relay_with_tools(state, messages, stream, tx)
            }))
        }
    }
}

/// `POST /api/assistant`
pub(crate) async fn assistant(
    State(state): State<ProxyState>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request = prompt::parse_assistant_request(&body)?;
    tracing::info!("Assistant request");

    let body = json!({ "messages": prompt::assistant_messages(&request) });
    let stream = state.client.stream(&state.chat.provider, body).await?;
    Ok(stream_response(|tx| relay_plain(stream, tx)))
}

/// Spawn `relay` and return a markdown response fed by it
fn stream_response<F, Fut>(relay: F) -> Response
where
    F: FnOnce(BodySender) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(BODY_BUFFER);
    tokio::spawn(relay(tx));

    (
        [(header::CONTENT_TYPE, "text/markdown; charset=utf-8")],
        Body::from_stream(ReceiverStream::new(rx)),
    )
        .into_response()
}

/// Send text to the client; `false` once the client has gone away
async fn send_text(tx: &BodySender, text: impl Into<String>) -> bool {
    let mut text = text.into();
    if text.contains(STREAM_ERROR_MARKER) {
        text.retain(|c| c != STREAM_ERROR_MARKER);
    }
    if tx.send(Ok(Bytes::from(text))).await.is_err() {
        tracing::debug!("Client disconnected, stopping relay");
        return false;
    }
    true
}

/// End the response body with the upstream error
///
/// The body closes normally so text already queued is still written.
async fn abort(tx: &BodySender, e: UpstreamError) {
    tracing::warn!("Upstream stream failed mid-response: {}", e);
    let marker = format!("{}{}", STREAM_ERROR_MARKER, e);
    let _ = tx.send(Ok(Bytes::from(marker))).await;
}

/// Forward text deltas verbatim
async fn relay_plain(mut stream: CompletionStream, tx: BodySender) {
    let mut relayed = 0usize;
    while let Some(item) = stream.next().await {
        match item {
            Ok(Delta::Text(text)) => {
                relayed += text.len();
                if !send_text(&tx, text).await {
                    return;
                }
            }
            Ok(_) => {}
            Err(e) => return abort(&tx, e).await,
        }
    }
    tracing::debug!(bytes = relayed, "Relay complete");
}

/// Request body for model round trip `step` (1-based)
///
/// The final allowed round trip is sent without tools so the model has to
/// answer in text.
fn round_trip_body(messages: &[Value], step: u32, max_steps: u32) -> Value {
    let mut body = json!({ "messages": messages });
    if step < max_steps {
        body["tools"] = json!([tools::search_tool_definition()]);
    }
    body
}

/// Relay text while resolving `search` tool calls between round trips
async fn relay_with_tools(
    state: ProxyState,
    mut messages: Vec<Value>,
    first: CompletionStream,
    tx: BodySender,
) {
    let max_steps = state.chat.max_tool_steps;
    let mut stream = first;

    for step in 1..=max_steps {
        let mut text = String::new();
        let mut pending = ToolCallAccumulator::default();

        while let Some(item) = stream.next().await {
            match item {
                Ok(Delta::Text(chunk)) => {
                    text.push_str(&chunk);
                    if !send_text(&tx, chunk).await {
                        return;
                    }
                }
                Ok(Delta::ToolCall(fragment)) => pending.push(fragment),
                Ok(Delta::Finish(_)) => {}
                Err(e) => return abort(&tx, e).await,
            }
        }

        let calls = pending.finish();
        if calls.is_empty() {
            tracing::debug!(steps = step, "Tool relay complete");
            return;
        }
        if step == max_steps {
            tracing::warn!(max_steps, "Tool step limit reached, ending response");
            return;
        }

        let content = if text.is_empty() {
            Value::Null
        } else {
            Value::String(text)
        };
        messages.push(json!({
            "role": "assistant",
            "content": content,
            "tool_calls": calls.iter().map(ToolCall::to_message_entry).collect::<Vec<_>>(),
        }));

        for call in &calls {
            let result = tools::execute(&state.client, &state.search, call).await;
            // Tool output is shown inline as its own paragraph
            if !send_text(&tx, format!("\n\n{}\n\n", result.trim())).await {
                return;
            }
            messages.push(json!({
                "role": "tool",
                "tool_call_id": call.id,
                "content": result,
            }));
        }

        let body = round_trip_body(&messages, step + 1, max_steps);
        stream = match state.client.stream(&state.chat.provider, body).await {
            Ok(next) => next,
            Err(e) => return abort(&tx, e).await,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{StreamEventKind, StreamingClient};
    use crate::config::{ChatConfig, ProviderConfig, SearchConfig};
    use crate::protocol::ChatRequest;
    use crate::tree::NodeId;
    use crate::proxy::{router, upstream::CompletionClient};
    use axum::{http::StatusCode, routing::post, Json, Router};
    use std::net::SocketAddr;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::net::TcpListener;

    // ─────────────────────────────────────────────────────────────────────
    // Harness: mock providers and a real proxy on ephemeral ports
    // ─────────────────────────────────────────────────────────────────────

    async fn serve(app: Router) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn provider(addr: SocketAddr, path: &str, key: Option<&str>) -> ProviderConfig {
        ProviderConfig {
            base_url: format!("http://{}/{}", addr, path),
            model: "mock-model".to_string(),
            // Never set, so only the inline key counts
            key_env: "TANGENT_TEST_NO_SUCH_KEY".to_string(),
            api_key: key.map(String::from),
        }
    }

    async fn start_proxy(upstream: SocketAddr, tools: ToolMode, key: Option<&str>) -> String {
        let chat = ChatConfig {
            provider: provider(upstream, "chat", key),
            tools,
            ..ChatConfig::default()
        };
        let search = SearchConfig {
            provider: provider(upstream, "search", Some("search-key")),
            ..SearchConfig::default()
        };
        let state = ProxyState {
            client: CompletionClient::new(Duration::from_secs(5)).unwrap(),
            chat: Arc::new(chat),
            search: Arc::new(search),
        };
        let addr = serve(router(state)).await;
        format!("http://{}", addr)
    }

    fn sse(chunks: &[Value]) -> Response {
        let mut body = String::new();
        for chunk in chunks {
            body.push_str(&format!("data: {}\n\n", chunk));
        }
        body.push_str("data: [DONE]\n\n");
        ([(header::CONTENT_TYPE, "text/event-stream")], body).into_response()
    }

    fn text_chunk(text: &str) -> Value {
        json!({ "choices": [{ "delta": { "content": text }, "finish_reason": null }] })
    }

    async fn post_json(url: &str, body: Value) -> reqwest::Response {
        reqwest::Client::new().post(url).json(&body).send().await.unwrap()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Validation and credentials
    // ─────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_missing_or_non_string_prompt_is_400() {
        let upstream = serve(Router::new()).await;
        let base = start_proxy(upstream, ToolMode::None, Some("key")).await;

        for body in [json!({}), json!({ "prompt": 5 })] {
            for route in ["/api/chat", "/api/assistant"] {
                let response = post_json(&format!("{}{}", base, route), body.clone()).await;
                assert_eq!(response.status(), StatusCode::BAD_REQUEST);
                let json: Value = response.json().await.unwrap();
                assert!(json["error"].is_string());
            }
        }
    }

    #[tokio::test]
    async fn test_missing_credential_is_500() {
        let upstream = serve(Router::new()).await;
        let base = start_proxy(upstream, ToolMode::Search, None).await;

        for route in ["/api/chat", "/api/assistant"] {
            let response =
                post_json(&format!("{}{}", base, route), json!({ "prompt": "hi" })).await;
            assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR, "{}", route);
            let json: Value = response.json().await.unwrap();
            assert!(json["error"]
                .as_str()
                .unwrap()
                .contains("TANGENT_TEST_NO_SUCH_KEY"));
        }
    }

    #[tokio::test]
    async fn test_upstream_error_is_passed_through() {
        let upstream = serve(Router::new().route(
            "/chat/chat/completions",
            post(|| async {
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(json!({ "error": { "message": "Rate limit exceeded" } })),
                )
            }),
        ))
        .await;
        let base = start_proxy(upstream, ToolMode::None, Some("key")).await;

        let response = post_json(&format!("{}/api/chat", base), json!({ "prompt": "hi" })).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json: Value = response.json().await.unwrap();
        assert_eq!(json["error"], "Rate limit exceeded");
        assert_eq!(json["status"], 429);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Relaying
    // ─────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_plain_relay_streams_deltas() {
        let seen: Arc<Mutex<Option<Value>>> = Arc::default();
        let captured = seen.clone();
        let upstream = serve(Router::new().route(
            "/chat/chat/completions",
            post(move |Json(body): Json<Value>| {
                let captured = captured.clone();
                async move {
                    *captured.lock().unwrap() = Some(body);
                    sse(&[text_chunk("Hel"), text_chunk("lo"), text_chunk(" world")])
                }
            }),
        ))
        .await;
        let base = start_proxy(upstream, ToolMode::None, Some("key")).await;

        let response = post_json(
            &format!("{}/api/chat", base),
            json!({ "prompt": "greet", "quotedText": "a quote" }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/markdown; charset=utf-8"
        );
        assert_eq!(response.text().await.unwrap(), "Hello world");

        let body = seen.lock().unwrap().clone().unwrap();
        assert_eq!(body["stream"], true);
        assert_eq!(body["model"], "mock-model");
        assert!(body.get("tools").is_none());
        let last = body["messages"].as_array().unwrap().last().unwrap().clone();
        assert_eq!(last["content"], "> a quote\n\ngreet");
    }

    #[tokio::test]
    async fn test_mid_stream_failure_keeps_relayed_text() {
        let upstream = serve(Router::new().route(
            "/chat/chat/completions",
            post(|| async {
                let body = format!("data: {}\n\ndata: {{not json}}\n\n", text_chunk("Hel"));
                ([(header::CONTENT_TYPE, "text/event-stream")], body)
            }),
        ))
        .await;
        let base = start_proxy(upstream, ToolMode::None, Some("key")).await;

        let client = StreamingClient::new(&base, Duration::from_secs(5)).unwrap();
        let request = ChatRequest {
            prompt: "hi".to_string(),
            quoted_text: None,
            parent_conversation: None,
            conversation: Vec::new(),
        };
        let (tx, mut rx) = mpsc::channel(16);
        client.send(NodeId::next(), request, tx).await;

        let mut kinds = Vec::new();
        while let Some(event) = rx.recv().await {
            kinds.push(event.kind);
        }
        assert_eq!(kinds.len(), 3, "{:?}", kinds);
        assert_eq!(kinds[0], StreamEventKind::Opened);
        assert_eq!(kinds[1], StreamEventKind::Chunk("Hel".to_string()));
        match &kinds[2] {
            StreamEventKind::Failed(msg) => {
                assert!(msg.contains("Unreadable upstream response"), "{}", msg)
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_relayed_text_never_carries_the_error_marker() {
        let upstream = serve(Router::new().route(
            "/chat/chat/completions",
            post(|| async { sse(&[text_chunk(&format!("a{}b", STREAM_ERROR_MARKER))]) }),
        ))
        .await;
        let base = start_proxy(upstream, ToolMode::None, Some("key")).await;

        let response = post_json(&format!("{}/api/chat", base), json!({ "prompt": "hi" })).await;
        assert_eq!(response.text().await.unwrap(), "ab");
    }

    #[tokio::test]
    async fn test_assistant_route_streams_markdown() {
        let upstream = serve(Router::new().route(
            "/chat/chat/completions",
            post(|| async { sse(&[text_chunk("# Title")]) }),
        ))
        .await;
        let base = start_proxy(upstream, ToolMode::Search, Some("key")).await;

        let response =
            post_json(&format!("{}/api/assistant", base), json!({ "prompt": "hi" })).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.text().await.unwrap(), "# Title");
    }

    #[tokio::test]
    async fn test_search_tool_round_trip() {
        let chat_calls = Arc::new(Mutex::new(Vec::<Value>::new()));
        let recorded = chat_calls.clone();

        let chat_route = post(move |Json(body): Json<Value>| {
            let recorded = recorded.clone();
            async move {
                let answered = body["messages"]
                    .as_array()
                    .unwrap()
                    .iter()
                    .any(|m| m["role"] == "tool");
                recorded.lock().unwrap().push(body);
                if answered {
                    sse(&[text_chunk("Based on the search, "), text_chunk("yes.")])
                } else {
                    sse(&[
                        text_chunk("Let me check."),
                        json!({ "choices": [{ "delta": { "tool_calls": [{
                            "index": 0, "id": "call_1", "type": "function",
                            "function": { "name": "search", "arguments": "{\"query\":" }
                        }]}}]}),
                        json!({ "choices": [{ "delta": { "tool_calls": [{
                            "index": 0, "function": { "arguments": "\"rust news\"}" }
                        }]}, "finish_reason": "tool_calls" }]}),
                    ])
                }
            }
        });
        let search_route = post(|Json(body): Json<Value>| async move {
            assert_eq!(body["stream"], false);
            assert_eq!(body["messages"][1]["content"], "rust news");
            Json(json!({ "choices": [{ "message": { "role": "assistant", "content": "Rust 2.0 announced." } }] }))
        });

        let upstream = serve(
            Router::new()
                .route("/chat/chat/completions", chat_route)
                .route("/search/chat/completions", search_route),
        )
        .await;
        let base = start_proxy(upstream, ToolMode::Search, Some("key")).await;

        let response =
            post_json(&format!("{}/api/chat", base), json!({ "prompt": "news?" })).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.text().await.unwrap(),
            "Let me check.\n\nRust 2.0 announced.\n\nBased on the search, yes."
        );

        let calls = chat_calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert!(calls[0]["tools"].is_array());
        let second = calls[1]["messages"].as_array().unwrap();
        let tool_msg = second.iter().find(|m| m["role"] == "tool").unwrap();
        assert_eq!(tool_msg["tool_call_id"], "call_1");
        assert_eq!(tool_msg["content"], "Rust 2.0 announced.");
        let assistant = second.iter().find(|m| m["role"] == "assistant").unwrap();
        assert_eq!(assistant["tool_calls"][0]["function"]["arguments"], "{\"query\":\"rust news\"}");
    }

    #[tokio::test]
    async fn test_search_failure_becomes_tool_result() {
        let chat_route = post(|Json(body): Json<Value>| async move {
            let tool_result = body["messages"]
                .as_array()
                .unwrap()
                .iter()
                .find(|m| m["role"] == "tool")
                .map(|m| m["content"].as_str().unwrap_or_default().to_string());
            match tool_result {
                Some(result) => {
                    assert!(result.starts_with("Error: search failed"));
                    sse(&[text_chunk("Search is unavailable.")])
                }
                None => sse(&[json!({ "choices": [{ "delta": { "tool_calls": [{
                    "index": 0, "id": "call_9",
                    "function": { "name": "search", "arguments": "{\"query\":\"x\"}" }
                }]}}]})]),
            }
        });
        let search_route = post(|| async { (StatusCode::BAD_GATEWAY, "search down") });

        let upstream = serve(
            Router::new()
                .route("/chat/chat/completions", chat_route)
                .route("/search/chat/completions", search_route),
        )
        .await;
        let base = start_proxy(upstream, ToolMode::Search, Some("key")).await;

        let response = post_json(&format!("{}/api/chat", base), json!({ "prompt": "q" })).await;
        assert_eq!(response.status(), StatusCode::OK);
        let text = response.text().await.unwrap();
        assert!(text.contains("Error: search failed"));
        assert!(text.ends_with("Search is unavailable."));
    }

    #[tokio::test]
    async fn test_tool_steps_are_bounded() {
        let count = Arc::new(Mutex::new(0u32));
        let counter = count.clone();
        // A model that always wants another search
        let chat_route = post(move || {
            let counter = counter.clone();
            async move {
                *counter.lock().unwrap() += 1;
                sse(&[json!({ "choices": [{ "delta": { "tool_calls": [{
                    "index": 0, "id": "loop",
                    "function": { "name": "search", "arguments": "{\"query\":\"again\"}" }
                }]}}]})])
            }
        });
        let search_route =
            post(|| async { Json(json!({ "choices": [{ "message": { "content": "r" } }] })) });

        let upstream = serve(
            Router::new()
                .route("/chat/chat/completions", chat_route)
                .route("/search/chat/completions", search_route),
        )
        .await;
        let base = start_proxy(upstream, ToolMode::Search, Some("key")).await;

        let response = post_json(&format!("{}/api/chat", base), json!({ "prompt": "q" })).await;
        assert_eq!(response.status(), StatusCode::OK);
        let _ = response.text().await.unwrap();

        assert_eq!(*count.lock().unwrap(), ChatConfig::default().max_tool_steps);
    }

    #[test]
    fn test_last_round_trip_omits_tools() {
        let messages = vec![json!({ "role": "user", "content": "hi" })];
        assert!(round_trip_body(&messages, 1, 5)["tools"].is_array());
        assert!(round_trip_body(&messages, 5, 5).get("tools").is_none());
        assert!(round_trip_body(&messages, 1, 1).get("tools").is_none());
    }
}
