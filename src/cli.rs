// CLI module - command-line parsing and config subcommands
//
// `tangent` with no subcommand runs the server and canvas. The `config`
// subcommand manages ~/.config/tangent/config.toml:
// - --show:   effective configuration after env and file layering
// - --path:   where the config file lives
// - --reset:  overwrite with defaults (asks first)
// - --edit:   open in $EDITOR / $VISUAL
// - --update: rewrite in the current template, keeping user values

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::config::{Config, VERSION};

/// tangent - branching conversation canvas
#[derive(Parser)]
#[command(name = "tangent")]
#[command(version = VERSION)]
#[command(
    about = "Branching conversation canvas with a streaming chat server",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage configuration
    Config(ConfigArgs),
}

#[derive(Args)]
#[group(multiple = false)]
pub struct ConfigArgs {
    /// Show effective configuration
    #[arg(long)]
    show: bool,

    /// Show config file path
    #[arg(long)]
    path: bool,

    /// Reset config file to defaults
    #[arg(long)]
    reset: bool,

    /// Open config file in $EDITOR
    #[arg(long)]
    edit: bool,

    /// Rewrite config with the latest template (preserves user values)
    #[arg(long)]
    update: bool,
}

/// Handle CLI commands. Returns true if a command ran and the process
/// should exit.
pub fn handle_cli() -> bool {
    let cli = Cli::parse();

    let Some(Commands::Config(args)) = cli.command else {
        return false;
    };

    let result = if args.show {
        show();
        Ok(())
    } else if args.path {
        config_path().map(|p| println!("{}", p.display()))
    } else if args.reset {
        reset()
    } else if args.edit {
        edit()
    } else if args.update {
        update()
    } else {
        println!("Usage: tangent config [--show|--path|--reset|--edit|--update]");
        Ok(())
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
    true
}

fn config_path() -> Result<PathBuf> {
    Config::config_path().context("Could not determine config directory")
}

fn show() {
    let config = Config::from_env();
    let chat = &config.chat;
    let search = &config.search;
    let canvas = &config.canvas;
    let credential = |present: bool| if present { "set" } else { "missing" };

    println!("# Effective configuration (env > file > defaults)");
    println!();
    println!("bind_addr = {:?}", config.bind_addr.to_string());
    println!("server_url = {:?}", config.effective_server_url());
    println!("tui = {}", config.enable_tui);
    println!();
    println!("[chat]");
    println!("base_url = {:?}", chat.provider.base_url);
    println!("model = {:?}", chat.provider.model);
    println!(
        "key_env = {:?}  # {}",
        chat.provider.key_env,
        credential(chat.provider.credential().is_some())
    );
    println!("tools = {:?}", chat.tools.as_str());
    println!("max_tool_steps = {}", chat.max_tool_steps);
    println!("request_timeout_secs = {}", chat.request_timeout_secs);
    println!();
    println!("[search]");
    println!("base_url = {:?}", search.provider.base_url);
    println!("model = {:?}", search.provider.model);
    println!(
        "key_env = {:?}  # {}",
        search.provider.key_env,
        credential(search.provider.credential().is_some())
    );
    println!();
    println!("[canvas]");
    println!("layout = {:?}", canvas.layout.as_str());
    println!("node_width = {:?}", canvas.node_width);
    println!("gap_x = {:?}", canvas.gap_x);
    println!("gap_y = {:?}", canvas.gap_y);
    println!(
        "zoom = {:?}..{:?} (step {:?})",
        canvas.min_zoom, canvas.max_zoom, canvas.zoom_step
    );
    println!("theme = {:?}", canvas.theme);
    println!();
    println!("[logging]");
    println!("level = {:?}", config.logging.level);
    println!("file_enabled = {}", config.logging.file_enabled);

    println!();
    match Config::config_path() {
        Some(path) if path.exists() => println!("# Source: {}", path.display()),
        _ => println!("# Source: defaults (no config file)"),
    }
}

fn write_config(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Could not create {}", parent.display()))?;
    }
    std::fs::write(path, contents).with_context(|| format!("Could not write {}", path.display()))
}

fn reset() -> Result<()> {
    let path = config_path()?;

    if path.exists() {
        eprint!("Overwrite {} with defaults? [y/N] ", path.display());
        let _ = std::io::stderr().flush();

        let mut answer = String::new();
        std::io::stdin()
            .read_line(&mut answer)
            .context("Could not read answer")?;
        if !answer.trim().eq_ignore_ascii_case("y") {
            println!("Aborted.");
            return Ok(());
        }
    }

    write_config(&path, &Config::default().to_toml())?;
    println!("Config reset to defaults: {}", path.display());
    Ok(())
}

fn edit() -> Result<()> {
    let path = config_path()?;
    if !path.exists() {
        Config::ensure_config_exists();
        println!("Created new config file: {}", path.display());
    }

    let editor = std::env::var("EDITOR")
        .or_else(|_| std::env::var("VISUAL"))
        .unwrap_or_else(|_| if cfg!(windows) { "notepad" } else { "nano" }.to_string());

    println!("Opening {} with {}", path.display(), editor);
    let status = Command::new(&editor).arg(&path).status().with_context(|| {
        format!(
            "Failed to launch editor '{}' (set $EDITOR to your preferred editor)",
            editor
        )
    })?;

    if !status.success() {
        bail!("Editor exited with status: {}", status);
    }
    Ok(())
}

fn update() -> Result<()> {
    let path = config_path()?;
    if !path.exists() {
        Config::ensure_config_exists();
        println!("Created new config file: {}", path.display());
        return Ok(());
    }

    // Effective values rendered through the current template
    let updated = Config::from_env().to_toml();

    let backup = path.with_extension("toml.bak");
    match std::fs::copy(&path, &backup) {
        Ok(_) => println!("Backup created: {}", backup.display()),
        Err(e) => eprintln!("Warning: Could not create backup: {}", e),
    }

    write_config(&path, &updated)?;
    println!("Config updated: {}", path.display());
    Ok(())
}
