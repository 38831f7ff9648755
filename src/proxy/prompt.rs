//! Request validation and message assembly
//!
//! Bodies are parsed by hand rather than through axum's `Json` extractor so
//! that a missing or non-string `prompt` is a 400 with a JSON error, not a
//! 422 with a plain-text rejection.

use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use super::error::ApiError;
use crate::protocol::{AssistantRequest, ChatRequest};

/// System prompt for `/api/assistant`
pub const ASSISTANT_SYSTEM_PROMPT: &str = "You are a helpful assistant. Respond only with \
GitHub-flavoured markdown. Do not wrap the whole answer in a code fence.";

/// Parse a request body, requiring a non-empty string `prompt`
fn parse_with_prompt<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid JSON body: {}", e)))?;

    match value.get("prompt") {
        None | Some(Value::Null) => {
            return Err(ApiError::BadRequest("prompt is required".to_string()))
        }
        Some(Value::String(s)) if s.trim().is_empty() => {
            return Err(ApiError::BadRequest("prompt is required".to_string()))
        }
        Some(Value::String(_)) => {}
        Some(_) => return Err(ApiError::BadRequest("prompt must be a string".to_string())),
    }

    serde_json::from_value(value)
        .map_err(|e| ApiError::BadRequest(format!("Invalid request body: {}", e)))
}

pub(crate) fn parse_chat_request(body: &[u8]) -> Result<ChatRequest, ApiError> {
    parse_with_prompt(body)
}

pub(crate) fn parse_assistant_request(body: &[u8]) -> Result<AssistantRequest, ApiError> {
    parse_with_prompt(body)
}

/// Assemble the upstream message list for a chat request
///
/// Order: system prompt, parent context (when branching), the node's prior
/// conversation, then the new user turn with its quote as a blockquote.
pub(crate) fn chat_messages(system_prompt: &str, request: &ChatRequest) -> Vec<Value> {
    let mut messages = vec![json!({ "role": "system", "content": system_prompt })];

    if let Some(parent) = request
        .parent_conversation
        .as_deref()
        .filter(|p| !p.trim().is_empty())
    {
        messages.push(json!({
            "role": "system",
            "content": format!(
                "This conversation branches from an earlier one. Earlier conversation:\n\n{}",
                parent
            ),
        }));
    }

    messages.extend(
        request
            .conversation
            .iter()
            .map(|m| json!({ "role": m.role.as_str(), "content": m.content })),
    );

    messages.push(json!({ "role": "user", "content": user_turn(request) }));
    messages
}

/// The new user message, prefixed with the quoted excerpt when present
fn user_turn(request: &ChatRequest) -> String {
    match request.quoted_text.as_deref().filter(|q| !q.trim().is_empty()) {
        Some(quote) => {
            let quoted: Vec<String> = quote.lines().map(|l| format!("> {}", l)).collect();
            format!("{}\n\n{}", quoted.join("\n"), request.prompt)
        }
        None => request.prompt.clone(),
    }
}

pub(crate) fn assistant_messages(request: &AssistantRequest) -> Vec<Value> {
    vec![
        json!({ "role": "system", "content": ASSISTANT_SYSTEM_PROMPT }),
        json!({ "role": "user", "content": request.prompt }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Message;

    fn bad_request(result: Result<ChatRequest, ApiError>) -> String {
        match result {
            Err(ApiError::BadRequest(msg)) => msg,
            other => panic!("expected bad request, got {:?}", other),
        }
    }

    #[test]
    fn test_prompt_validation() {
        assert!(bad_request(parse_chat_request(br#"{}"#)).contains("required"));
        assert!(bad_request(parse_chat_request(br#"{"prompt":"  "}"#)).contains("required"));
        assert!(bad_request(parse_chat_request(br#"{"prompt":42}"#)).contains("string"));
        assert!(bad_request(parse_chat_request(b"not json")).contains("Invalid JSON"));
        assert!(parse_assistant_request(br#"{"prompt":["x"]}"#).is_err());
    }

    #[test]
    fn test_parses_full_chat_request() {
        let request = parse_chat_request(
            br#"{"prompt":"why?","quotedText":"because","conversation":[{"role":"user","content":"hi"}]}"#,
        )
        .unwrap();
        assert_eq!(request.quoted_text.as_deref(), Some("because"));
        assert_eq!(request.conversation, vec![Message::user("hi")]);
    }

    #[test]
    fn test_message_order_with_context() {
        let request = ChatRequest {
            prompt: "Tell me more".to_string(),
            quoted_text: Some("Rust is fast".to_string()),
            parent_conversation: Some("user: what is rust\n\nassistant: Rust is fast".to_string()),
            conversation: vec![Message::user("earlier"), Message::assistant("reply")],
        };
        let messages = chat_messages("SYSTEM", &request);

        let roles: Vec<&str> = messages.iter().map(|m| m["role"].as_str().unwrap()).collect();
        assert_eq!(roles, vec!["system", "system", "user", "assistant", "user"]);
        assert_eq!(messages[0]["content"], "SYSTEM");
        assert!(messages[1]["content"]
            .as_str()
            .unwrap()
            .ends_with("assistant: Rust is fast"));
        assert_eq!(messages[4]["content"], "> Rust is fast\n\nTell me more");
    }

    #[test]
    fn test_plain_prompt_has_no_context() {
        let request = ChatRequest {
            prompt: "hello".to_string(),
            quoted_text: None,
            parent_conversation: None,
            conversation: Vec::new(),
        };
        let messages = chat_messages("SYSTEM", &request);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1]["content"], "hello");
    }

    #[test]
    fn test_assistant_messages_force_markdown() {
        let messages = assistant_messages(&AssistantRequest {
            prompt: "hi".to_string(),
        });
        assert!(messages[0]["content"].as_str().unwrap().contains("markdown"));
        assert_eq!(messages[1]["content"], "hi");
    }
}
