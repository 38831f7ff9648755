//! Configuration for the canvas server and terminal front end
//!
//! Configuration is loaded in order of precedence:
//! 1. Environment variables (highest priority)
//! 2. Config file (~/.config/tangent/config.toml)
//! 3. Built-in defaults (lowest priority)
//!
//! Provider credentials are the exception: they are never resolved at load
//! time. Each request reads `key_env` from the environment, so a key
//! exported after startup is picked up without a restart.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;

// ─────────────────────────────────────────────────────────────────────────────
// Submodules
// ─────────────────────────────────────────────────────────────────────────────

mod canvas;
mod observability;
mod providers;
mod serialization;


pub use canvas::{CanvasConfig, FileCanvas};
pub use observability::{FileLogging, LogRotation, LoggingConfig};
pub use providers::{
    ChatConfig, FileChat, FileProvider, FileSearch, ProviderConfig, SearchConfig, ToolMode,
};

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

const DEFAULT_BIND: SocketAddr = SocketAddr::new(
    std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST),
    3000,
);

// ─────────────────────────────────────────────────────────────────────────────
// Application Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server binds to
    pub bind_addr: SocketAddr,

    /// Server the TUI sends chat requests to (`http://{bind_addr}` unless set)
    pub server_url: Option<String>,

    /// Run the terminal canvas (false = headless server)
    pub enable_tui: bool,

    /// Chat completion backend and route settings
    pub chat: ChatConfig,

    /// Search provider behind the `search` tool
    pub search: SearchConfig,

    /// Canvas geometry and zoom limits
    pub canvas: CanvasConfig,

    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND,
            server_url: None,
            enable_tui: true,
            chat: ChatConfig::default(),
            search: SearchConfig::default(),
            canvas: CanvasConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// File Configuration (deserialization layer)
// ─────────────────────────────────────────────────────────────────────────────

/// Config file structure
#[derive(Debug, Deserialize, Default)]
pub(crate) struct FileConfig {
    pub bind_addr: Option<String>,
    pub server_url: Option<String>,

    /// Optional [chat] section
    pub chat: Option<FileChat>,

    /// Optional [search] section
    pub search: Option<FileSearch>,

    /// Optional [canvas] section
    pub canvas: Option<FileCanvas>,

    /// Optional [logging] section
    pub logging: Option<FileLogging>,
}

/// Runtime overrides read from the environment
#[derive(Debug, Default)]
pub(crate) struct EnvOverrides {
    pub bind_addr: Option<String>,
    pub server_url: Option<String>,
    pub no_tui: Option<String>,
    pub layout: Option<String>,
}

impl EnvOverrides {
    fn from_env() -> Self {
        Self {
            bind_addr: std::env::var("TANGENT_BIND").ok(),
            server_url: std::env::var("TANGENT_SERVER_URL").ok(),
            no_tui: std::env::var("TANGENT_NO_TUI").ok(),
            layout: std::env::var("TANGENT_LAYOUT").ok(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration Loading
// ─────────────────────────────────────────────────────────────────────────────

impl Config {
    /// Get the config file path: ~/.config/tangent/config.toml
    /// Uses Unix-style ~/.config on all platforms for consistency
    pub fn config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|p| p.join(".config").join("tangent").join("config.toml"))
    }

    /// Write the default config file on first run so options are discoverable
    pub fn ensure_config_exists() {
        let Some(path) = Self::config_path() else {
            return;
        };
        if path.exists() {
            return;
        }
        if let Some(parent) = path.parent() {
            if std::fs::create_dir_all(parent).is_err() {
                return; // Config is optional
            }
        }
        let _ = std::fs::write(&path, Self::default().to_toml());
    }

    /// Load file config if it exists
    ///
    /// A file that exists but cannot be read or parsed is fatal: silently
    /// using defaults would hide the mistake.
    fn load_file_config() -> FileConfig {
        let Some(path) = Self::config_path() else {
            return FileConfig::default();
        };

        match std::fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("\n╔══════════════════════════════════════════════════════════════╗");
                    eprintln!("║  CONFIG ERROR - Failed to parse configuration file          ║");
                    eprintln!("╚══════════════════════════════════════════════════════════════╝\n");
                    eprintln!("  File: {}\n", path.display());
                    eprintln!("  Error: {}\n", e);
                    eprintln!("  Tip: Check for:\n");
                    eprintln!("    - Missing quotes around string values");
                    eprintln!("    - Numbers where text is expected (node_width = 400.0)");
                    eprintln!("    - Typos in section names ([chat], [search], [canvas])\n");
                    eprintln!("  To reset, run `tangent config --reset`.\n");
                    std::process::exit(1);
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => FileConfig::default(),
            Err(e) => {
                eprintln!("\n╔══════════════════════════════════════════════════════════════╗");
                eprintln!("║  CONFIG ERROR - Cannot read configuration file              ║");
                eprintln!("╚══════════════════════════════════════════════════════════════╝\n");
                eprintln!("  File: {}\n", path.display());
                eprintln!("  Error: {}\n", e);
                std::process::exit(1);
            }
        }
    }

    /// Load configuration: env vars > file > defaults
    pub fn from_env() -> Self {
        Self::resolve(Self::load_file_config(), EnvOverrides::from_env())
    }

    /// Merge the file layer and environment overrides over defaults
    pub(crate) fn resolve(file: FileConfig, env: EnvOverrides) -> Self {
        // Bind address: env > file > default
        let bind_addr = env
            .bind_addr
            .or(file.bind_addr)
            .map(|raw| {
                raw.parse().unwrap_or_else(|_| {
                    eprintln!(
                        "Warning: invalid bind address {:?}, using {}",
                        raw, DEFAULT_BIND
                    );
                    DEFAULT_BIND
                })
            })
            .unwrap_or(DEFAULT_BIND);

        // Server URL: env > file > derived from bind address
        let server_url = env
            .server_url
            .or(file.server_url)
            .filter(|url| !url.trim().is_empty());

        // TUI toggle: env only (runtime flag)
        let enable_tui = env
            .no_tui
            .map(|v| v != "1" && v.to_lowercase() != "true")
            .unwrap_or(true);

        // Canvas: file section, then layout env override
        let mut canvas = CanvasConfig::from_file(file.canvas);
        if let Some(layout) = env.layout {
            canvas.layout = crate::layout::LayoutMode::from_str(&layout);
        }

        Self {
            bind_addr,
            server_url,
            enable_tui,
            chat: ChatConfig::from_file(file.chat),
            search: SearchConfig::from_file(file.search),
            canvas,
            logging: LoggingConfig::from_file(file.logging),
        }
    }

    /// Base URL the front end talks to
    ///
    /// An unspecified bind address (0.0.0.0) is reached through loopback.
    pub fn effective_server_url(&self) -> String {
        if let Some(url) = &self.server_url {
            return url.trim_end_matches('/').to_string();
        }
        let mut addr = self.bind_addr;
        if addr.ip().is_unspecified() {
            addr.set_ip(std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST));
        }
        format!("http://{}", addr)
    }
}
