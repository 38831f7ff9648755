//! Config serialization to TOML
//!
//! Single source of truth for the config file format: the first-run
//! template, `config --reset` and `config --update` all come from here.

use super::{Config, ProviderConfig};

/// TOML basic string with escapes
fn quote(s: &str) -> String {
    toml::Value::String(s.to_string()).to_string()
}

impl Config {
    fn provider_to_toml(provider: &ProviderConfig) -> String {
        let mut out = String::new();
        out.push_str(&format!("base_url = {}\n", quote(&provider.base_url)));
        out.push_str(&format!("model = {}\n", quote(&provider.model)));
        out.push_str(&format!("key_env = {}\n", quote(&provider.key_env)));
        match &provider.api_key {
            Some(key) => out.push_str(&format!("api_key = {}\n", quote(key))),
            None => out.push_str("# api_key = \"...\"   # Used only when key_env is unset\n"),
        }
        out
    }

    /// Render the whole configuration as a commented TOML document
    pub fn to_toml(&self) -> String {
        let chat = &self.chat;
        let search = &self.search;
        let canvas = &self.canvas;
        let logging = &self.logging;

        let server_url = match &self.server_url {
            Some(url) => format!("server_url = {}\n", quote(url)),
            None => "# server_url = \"http://127.0.0.1:3000\"   # Default: derived from bind_addr\n"
                .to_string(),
        };

        format!(
            r#"# tangent configuration
#
# Precedence: environment variables > this file > built-in defaults.
# Environment overrides: TANGENT_BIND, TANGENT_SERVER_URL, TANGENT_NO_TUI, TANGENT_LAYOUT

# Address the HTTP server listens on
bind_addr = {bind_addr}

# Server the terminal canvas sends requests to
{server_url}
# ─────────────────────────────────────────────────────────────────────────────
# Chat completions (OpenAI-compatible)
# ─────────────────────────────────────────────────────────────────────────────
[chat]
{chat_provider}system_prompt = {system_prompt}
# "search" offers the model a web search tool, "none" relays plain completions
tools = {tools}
# Model round trips allowed per request when tools are on
max_tool_steps = {max_tool_steps}
# Upstream timeout; the canvas also gives up after this long without new text
request_timeout_secs = {timeout}

# ─────────────────────────────────────────────────────────────────────────────
# Search provider used by the search tool
# ─────────────────────────────────────────────────────────────────────────────
[search]
{search_provider}system_prompt = {search_prompt}

# ─────────────────────────────────────────────────────────────────────────────
# Canvas
# ─────────────────────────────────────────────────────────────────────────────
[canvas]
# "horizontal" (children to the right) or "vertical" (children below)
layout = {layout}
node_width = {node_width:?}
gap_x = {gap_x:?}
gap_y = {gap_y:?}
min_zoom = {min_zoom:?}
max_zoom = {max_zoom:?}
zoom_step = {zoom_step:?}
# "auto" (terminal palette), "dracula", "nord" or "gruvbox"
theme = {theme}

# ─────────────────────────────────────────────────────────────────────────────
# Logging
# ─────────────────────────────────────────────────────────────────────────────
[logging]
# Used when RUST_LOG is unset
level = {level}
file_enabled = {file_enabled}
file_dir = {file_dir}
# "hourly", "daily" or "never"
file_rotation = {file_rotation}
file_prefix = {file_prefix}
"#,
            bind_addr = quote(&self.bind_addr.to_string()),
            server_url = server_url,
            chat_provider = Self::provider_to_toml(&chat.provider),
            system_prompt = quote(&chat.system_prompt),
            tools = quote(chat.tools.as_str()),
            max_tool_steps = chat.max_tool_steps,
            timeout = chat.request_timeout_secs,
            search_provider = Self::provider_to_toml(&search.provider),
            search_prompt = quote(&search.system_prompt),
            layout = quote(canvas.layout.as_str()),
            node_width = canvas.node_width,
            gap_x = canvas.gap_x,
            gap_y = canvas.gap_y,
            min_zoom = canvas.min_zoom,
            max_zoom = canvas.max_zoom,
            zoom_step = canvas.zoom_step,
            theme = quote(&canvas.theme),
            level = quote(&logging.level),
            file_enabled = logging.file_enabled,
            file_dir = quote(&logging.file_dir.display().to_string()),
            file_rotation = quote(logging.file_rotation.as_str()),
            file_prefix = quote(&logging.file_prefix),
        )
    }
}
