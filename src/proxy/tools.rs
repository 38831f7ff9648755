//! The `search` function tool
//!
//! The chat model may call `search({"query": ...})`. Each call is answered by
//! one non-streaming completion against the search provider. Failures are
//! returned to the model as the tool result text instead of failing the
//! request.

use serde::Deserialize;
use serde_json::{json, Value};

use super::upstream::{CompletionClient, ToolCallDelta};
use crate::config::SearchConfig;

pub const SEARCH_TOOL: &str = "search";

/// Highest tool call index accepted from one model turn
const MAX_CALLS_PER_TURN: usize = 16;

/// Tool schema offered to the chat model
pub fn search_tool_definition() -> Value {
    json!({
        "type": "function",
        "function": {
            "name": SEARCH_TOOL,
            "description": "Search the web for current information. Use for recent events, \
                            facts you are unsure about, or anything that needs a source.",
            "parameters": {
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The search query"
                    }
                },
                "required": ["query"]
            }
        }
    })
}

/// A fully assembled tool call
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Raw JSON argument string as produced by the model
    pub arguments: String,
}

impl ToolCall {
    /// Assistant `tool_calls` entry echoing this call back to the model
    pub fn to_message_entry(&self) -> Value {
        json!({
            "id": self.id,
            "type": "function",
            "function": { "name": self.name, "arguments": self.arguments },
        })
    }
}

/// Joins streamed tool call fragments by their `index`
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    calls: Vec<ToolCall>,
}

impl ToolCallAccumulator {
    pub fn push(&mut self, delta: ToolCallDelta) {
        if delta.index >= MAX_CALLS_PER_TURN {
            tracing::warn!(index = delta.index, "Ignoring tool call beyond per-turn limit");
            return;
        }
        while self.calls.len() <= delta.index {
            let index = self.calls.len();
            self.calls.push(ToolCall {
                id: format!("call_{}", index),
                name: String::new(),
                arguments: String::new(),
            });
        }
        let call = &mut self.calls[delta.index];
        if let Some(id) = delta.id {
            call.id = id;
        }
        if let Some(function) = delta.function {
            if let Some(name) = function.name {
                call.name.push_str(&name);
            }
            if let Some(arguments) = function.arguments {
                call.arguments.push_str(&arguments);
            }
        }
    }

    /// Calls that received a function name, in index order
    pub fn finish(self) -> Vec<ToolCall> {
        self.calls
            .into_iter()
            .filter(|call| !call.name.is_empty())
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    query: String,
}

/// Run one tool call; the returned text is both streamed to the user and
/// fed back to the model
pub async fn execute(client: &CompletionClient, search: &SearchConfig, call: &ToolCall) -> String {
    if call.name != SEARCH_TOOL {
        tracing::warn!(tool = %call.name, "Model called unknown tool");
        return format!("Error: unknown tool '{}'", call.name);
    }

    let query = match serde_json::from_str::<SearchArgs>(&call.arguments) {
        Ok(args) if !args.query.trim().is_empty() => args.query,
        Ok(_) => return "Error: search query was empty".to_string(),
        Err(e) => {
            tracing::warn!(arguments = %call.arguments, "Bad search arguments: {}", e);
            return format!("Error: invalid search arguments: {}", e);
        }
    };

    tracing::info!(query = %query, "Running search tool");
    let body = json!({
        "messages": [
            { "role": "system", "content": search.system_prompt },
            { "role": "user", "content": query },
        ],
    });

    match client.complete(&search.provider, body).await {
        Ok(answer) => answer,
        Err(e) => {
            tracing::warn!("Search failed: {}", e);
            format!("Error: search failed: {}", e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::upstream::FunctionDelta;

    fn fragment(index: usize, id: Option<&str>, name: Option<&str>, args: Option<&str>) -> ToolCallDelta {
        ToolCallDelta {
            index,
            id: id.map(String::from),
            function: Some(FunctionDelta {
                name: name.map(String::from),
                arguments: args.map(String::from),
            }),
        }
    }

    #[test]
    fn test_accumulates_fragments_by_index() {
        let mut acc = ToolCallAccumulator::default();
        acc.push(fragment(0, Some("call_a"), Some("search"), Some("")));
        acc.push(fragment(1, Some("call_b"), Some("search"), Some("{\"query\":")));
        acc.push(fragment(0, None, None, Some("{\"query\":\"rust\"}")));
        acc.push(fragment(1, None, None, Some("\"tokio\"}")));

        let calls = acc.finish();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "call_a");
        assert_eq!(calls[0].arguments, "{\"query\":\"rust\"}");
        assert_eq!(calls[1].arguments, "{\"query\":\"tokio\"}");
    }

    #[test]
    fn test_nameless_calls_are_dropped() {
        let mut acc = ToolCallAccumulator::default();
        acc.push(fragment(0, None, None, Some("{}")));
        assert!(acc.finish().is_empty());
    }

    #[test]
    fn test_message_entry_shape() {
        let call = ToolCall {
            id: "call_1".to_string(),
            name: "search".to_string(),
            arguments: "{\"query\":\"x\"}".to_string(),
        };
        let entry = call.to_message_entry();
        assert_eq!(entry["type"], "function");
        assert_eq!(entry["function"]["name"], "search");
    }

    #[tokio::test]
    async fn test_bad_arguments_become_error_text() {
        let client = CompletionClient::new(std::time::Duration::from_secs(1)).unwrap();
        let search = SearchConfig::default();

        let unknown = ToolCall {
            id: "1".to_string(),
            name: "browse".to_string(),
            arguments: "{}".to_string(),
        };
        assert!(execute(&client, &search, &unknown).await.starts_with("Error: unknown tool"));

        let garbled = ToolCall {
            id: "2".to_string(),
            name: SEARCH_TOOL.to_string(),
            arguments: "{query".to_string(),
        };
        assert!(execute(&client, &search, &garbled)
            .await
            .starts_with("Error: invalid search arguments"));
    }
}
