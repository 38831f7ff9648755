// Startup module - banner and module status
//
// Printed to stdout before the TUI takes the screen (or in headless mode),
// and mirrored into the log so it shows up in the TUI log panel too.

use crate::config::{Config, ToolMode, VERSION};

/// ANSI color codes for terminal output
mod colors {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const DIM: &str = "\x1b[2m";
    pub const CYAN: &str = "\x1b[36m";
    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const MAGENTA: &str = "\x1b[35m";
}

/// One line of the module list
#[derive(Debug, PartialEq)]
pub struct ModuleStatus {
    pub name: &'static str,
    pub enabled: bool,
    pub description: String,
    /// Shown in yellow when set: enabled but not usable yet
    pub warning: Option<String>,
}

/// Print the startup banner and module status
pub fn print_startup(config: &Config) {
    use colors::*;

    println!();
    println!("  {BOLD}{CYAN}tangent{RESET} {DIM}v{VERSION}{RESET}");
    println!("  {DIM}Branching conversation canvas{RESET}");
    println!();

    if let Some(path) = Config::config_path() {
        if path.exists() {
            println!("  {DIM}Config:{RESET} {GREEN}✓{RESET} {}", path.display());
        } else {
            println!("  {DIM}Config:{RESET} {DIM}(using defaults){RESET}");
        }
    }
    println!();

    println!("  {DIM}Loading modules...{RESET}");
    for module in &module_status(config) {
        print_module_status(module);
    }
    println!();

    println!(
        "  {MAGENTA}▸{RESET} Server listening on {BOLD}{}{RESET}",
        config.bind_addr
    );
    if config.enable_tui {
        println!(
            "  {MAGENTA}▸{RESET} Canvas talking to {BOLD}{}{RESET}",
            config.effective_server_url()
        );
    }
    println!();
}

/// Status of each module, derived from config
pub fn module_status(config: &Config) -> Vec<ModuleStatus> {
    let chat = &config.chat;
    let search = &config.search;
    let search_on = chat.tools == ToolMode::Search;

    let missing = |key_env: &str, present: bool| {
        (!present).then(|| format!("{} not set", key_env))
    };

    vec![
        ModuleStatus {
            name: "server",
            enabled: true,
            description: "/api/chat, /api/assistant".to_string(),
            warning: None,
        },
        ModuleStatus {
            name: "chat",
            enabled: true,
            description: format!("{} via {}", chat.provider.model, chat.provider.base_url),
            warning: missing(&chat.provider.key_env, chat.provider.credential().is_some()),
        },
        ModuleStatus {
            name: "search",
            enabled: search_on,
            description: if search_on {
                format!("{} (up to {} steps)", search.provider.model, chat.max_tool_steps)
            } else {
                "disabled".to_string()
            },
            warning: if search_on {
                missing(&search.provider.key_env, search.provider.credential().is_some())
            } else {
                None
            },
        },
        ModuleStatus {
            name: "tui",
            enabled: config.enable_tui,
            description: format!("{} layout", config.canvas.layout.as_str()),
            warning: None,
        },
        ModuleStatus {
            name: "file-log",
            enabled: config.logging.file_enabled,
            description: config.logging.file_dir.display().to_string(),
            warning: None,
        },
    ]
}

fn print_module_status(module: &ModuleStatus) {
    use colors::*;

    let (icon, style) = if module.enabled {
        (format!("{GREEN}✓{RESET}"), "")
    } else {
        (format!("{DIM}○{RESET}"), DIM)
    };

    print!(
        "    {icon} {style}{:<10}{RESET} {DIM}{}{RESET}",
        module.name, module.description
    );
    match &module.warning {
        Some(warning) => println!("  {YELLOW}⚠ {}{RESET}", warning),
        None => println!(),
    }
}

/// Mirror the banner into the log
pub fn log_startup(config: &Config) {
    tracing::info!("tangent v{}", VERSION);
    for module in &module_status(config) {
        let icon = if module.enabled { "✓" } else { "○" };
        match &module.warning {
            Some(warning) => tracing::warn!(
                "{} {} - {} ({})",
                icon,
                module.name,
                module.description,
                warning
            ),
            None => tracing::info!("{} {} - {}", icon, module.name, module.description),
        }
    }
    tracing::info!("▸ Listening on {}", config.bind_addr);
}
