//! Request bodies shared by the streaming client and the proxy routes

use serde::{Deserialize, Serialize};

use crate::tree::Message;

/// Separates streamed reply text from a trailing error message
///
/// A chat body that breaks after streaming has started ends with this
/// character followed by the error text, then closes normally, so text
/// already relayed still reaches the client. Relayed text never contains it.
pub const STREAM_ERROR_MARKER: char = '\u{1E}';

/// Body of `POST /api/chat`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    /// The new user prompt
    pub prompt: String,
    /// Excerpt of the parent's reply this branch quotes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quoted_text: Option<String>,
    /// Flattened transcript of the parent node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_conversation: Option<String>,
    /// The node's own conversation before this prompt
    #[serde(default)]
    pub conversation: Vec<Message>,
}

/// Body of `POST /api/assistant`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantRequest {
    pub prompt: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_uses_camel_case() {
        let request = ChatRequest {
            prompt: "why?".to_string(),
            quoted_text: Some("because".to_string()),
            parent_conversation: Some("user: hi".to_string()),
            conversation: vec![Message::user("earlier")],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["quotedText"], "because");
        assert_eq!(json["parentConversation"], "user: hi");
        assert_eq!(json["conversation"][0]["role"], "user");
    }

    #[test]
    fn test_optional_fields_may_be_absent() {
        let request: ChatRequest = serde_json::from_str(r#"{"prompt":"hello"}"#).unwrap();
        assert_eq!(request.prompt, "hello");
        assert!(request.quoted_text.is_none());
        assert!(request.conversation.is_empty());
    }
}
