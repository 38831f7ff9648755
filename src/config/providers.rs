//! Model provider configuration: the chat completion backend and the
//! search provider behind the `search` tool
//!
//! Both providers speak the OpenAI chat completions dialect. Credentials are
//! read from the environment at request time (`key_env`), falling back to an
//! optional inline `api_key` from the config file.

use serde::Deserialize;

// ─────────────────────────────────────────────────────────────────────────────
// Provider
// ─────────────────────────────────────────────────────────────────────────────

/// One OpenAI-compatible endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderConfig {
    /// Base URL; `/chat/completions` is appended
    pub base_url: String,
    /// Model name sent in every request
    pub model: String,
    /// Environment variable holding the bearer credential
    pub key_env: String,
    /// Inline credential, used only when `key_env` is unset
    pub api_key: Option<String>,
}

/// Provider settings as loaded from config file
#[derive(Debug, Deserialize, Default)]
pub struct FileProvider {
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub key_env: Option<String>,
    pub api_key: Option<String>,
}

impl ProviderConfig {
    /// Merge file settings over `defaults`
    pub fn from_file(file: Option<FileProvider>, defaults: Self) -> Self {
        let file = file.unwrap_or_default();
        Self {
            base_url: file.base_url.unwrap_or(defaults.base_url),
            model: file.model.unwrap_or(defaults.model),
            key_env: file.key_env.unwrap_or(defaults.key_env),
            api_key: file.api_key.or(defaults.api_key),
        }
    }

    /// Full URL of the chat completions endpoint
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    /// Resolve the credential: environment first, then inline key
    ///
    /// Empty values count as absent.
    pub fn credential(&self) -> Option<String> {
        std::env::var(&self.key_env)
            .ok()
            .or_else(|| self.api_key.clone())
            .filter(|key| !key.trim().is_empty())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Chat route
// ─────────────────────────────────────────────────────────────────────────────

/// Which variant of `/api/chat` is served
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ToolMode {
    /// Plain relay, no tools offered to the model
    None,
    /// Offer the `search` function tool (default)
    #[default]
    Search,
}

impl ToolMode {
    /// Parse tool mode string from config
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "none" | "off" | "plain" => Self::None,
            _ => Self::Search,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Search => "search",
        }
    }
}

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant in a branching conversation canvas. \
Answer in GitHub-flavoured markdown. Keep answers focused on the question asked.";

/// Chat completion settings for `/api/chat` and `/api/assistant`
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub provider: ProviderConfig,
    /// System prompt placed first in every chat request
    pub system_prompt: String,
    pub tools: ToolMode,
    /// Upper bound on model round trips per tool-augmented request
    pub max_tool_steps: u32,
    /// Upstream request timeout; the TUI client uses it as the longest
    /// wait between two pieces of a streamed reply
    pub request_timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            provider: ProviderConfig {
                base_url: "https://api.openai.com/v1".to_string(),
                model: "gpt-4o".to_string(),
                key_env: "OPENAI_API_KEY".to_string(),
                api_key: None,
            },
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            tools: ToolMode::Search,
            max_tool_steps: 5,
            request_timeout_secs: 300,
        }
    }
}

/// Chat settings as loaded from config file
///
/// Provider keys sit directly in `[chat]` alongside the route settings.
#[derive(Debug, Deserialize, Default)]
pub struct FileChat {
    #[serde(flatten)]
    pub provider: FileProvider,
    pub system_prompt: Option<String>,
    pub tools: Option<String>,
    pub max_tool_steps: Option<u32>,
    pub request_timeout_secs: Option<u64>,
}

impl ChatConfig {
    /// Create from file config with defaults
    pub fn from_file(file: Option<FileChat>) -> Self {
        let defaults = Self::default();
        let Some(file) = file else {
            return defaults;
        };

        Self {
            provider: ProviderConfig::from_file(Some(file.provider), defaults.provider),
            system_prompt: file.system_prompt.unwrap_or(defaults.system_prompt),
            tools: file
                .tools
                .map(|s| ToolMode::from_str(&s))
                .unwrap_or(defaults.tools),
            // At least one round trip, or nothing is ever answered
            max_tool_steps: file
                .max_tool_steps
                .unwrap_or(defaults.max_tool_steps)
                .max(1),
            request_timeout_secs: file
                .request_timeout_secs
                .unwrap_or(defaults.request_timeout_secs),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Search tool
// ─────────────────────────────────────────────────────────────────────────────

pub const DEFAULT_SEARCH_PROMPT: &str = "You are a web search assistant. Answer the query with \
current, factual information and cite your sources. Be concise.";

/// Search provider used by the `search` tool
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub provider: ProviderConfig,
    /// System prompt for the search call
    pub system_prompt: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            provider: ProviderConfig {
                base_url: "https://api.perplexity.ai".to_string(),
                model: "sonar".to_string(),
                key_env: "PERPLEXITY_API_KEY".to_string(),
                api_key: None,
            },
            system_prompt: DEFAULT_SEARCH_PROMPT.to_string(),
        }
    }
}

/// Search settings as loaded from config file
#[derive(Debug, Deserialize, Default)]
pub struct FileSearch {
    #[serde(flatten)]
    pub provider: FileProvider,
    pub system_prompt: Option<String>,
}

impl SearchConfig {
    pub fn from_file(file: Option<FileSearch>) -> Self {
        let defaults = Self::default();
        let Some(file) = file else {
            return defaults;
        };

        Self {
            provider: ProviderConfig::from_file(Some(file.provider), defaults.provider),
            system_prompt: file.system_prompt.unwrap_or(defaults.system_prompt),
        }
    }
}
