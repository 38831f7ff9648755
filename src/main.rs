// tangent - branching conversation canvas
//
// One binary, two halves that talk over HTTP:
// - Server (axum): /api/chat and /api/assistant, relaying an
//   OpenAI-compatible completion stream as plain markdown, with an
//   optional web search tool loop
// - Canvas (ratatui): a tree of conversations laid out on a pannable,
//   zoomable canvas; every node streams its replies from the server
//
// The server runs as a background task; the TUI (or Ctrl+C in headless
// mode) owns the main task and triggers shutdown when it ends.

mod canvas;
mod cli;
mod client;
mod config;
mod layout;
mod logging;
mod protocol;
mod proxy;
mod startup;
mod tree;
mod tui;
mod util;

use anyhow::{Context, Result};
use client::StreamingClient;
use config::{Config, LogRotation, LoggingConfig};
use logging::{LogBuffer, TuiLogLayer};
use std::time::Duration;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber
///
/// TUI mode captures logs into `log_buffer` (stdout belongs to the canvas);
/// headless mode logs to stdout. File logging adds a JSON layer on top of
/// either. The returned guard must live until exit so the file flushes.
///
/// Precedence: RUST_LOG env var > config file > default "info"
fn init_tracing(config: &Config, log_buffer: &LogBuffer) -> Option<WorkerGuard> {
    let default_filter = format!("tangent={}", config.logging.level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());

    let tui_layer = config
        .enable_tui
        .then(|| TuiLogLayer::new(log_buffer.clone()));
    let stdout_layer = (!config.enable_tui).then(tracing_subscriber::fmt::layer);

    let (file_layer, guard) = match file_writer(&config.logging) {
        Some((writer, guard)) => (
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_ansi(false),
            ),
            Some(guard),
        ),
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tui_layer)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    guard
}

/// Non-blocking rolling file writer, when file logging is enabled
fn file_writer(logging: &LoggingConfig) -> Option<(NonBlocking, WorkerGuard)> {
    if !logging.file_enabled {
        return None;
    }
    if let Err(e) = std::fs::create_dir_all(&logging.file_dir) {
        // Subscriber is not installed yet
        eprintln!(
            "Warning: Could not create log directory {:?}: {}",
            logging.file_dir, e
        );
        return None;
    }

    let dir = &logging.file_dir;
    let prefix = &logging.file_prefix;
    let appender = match logging.file_rotation {
        LogRotation::Hourly => tracing_appender::rolling::hourly(dir, prefix),
        LogRotation::Daily => tracing_appender::rolling::daily(dir, prefix),
        LogRotation::Never => tracing_appender::rolling::never(dir, prefix),
    };
    Some(tracing_appender::non_blocking(appender))
}

#[tokio::main]
async fn main() -> Result<()> {
    // config --show / --reset / ... exit here
    if cli::handle_cli() {
        return Ok(());
    }

    // Write the template on first run so options are discoverable
    Config::ensure_config_exists();
    let config = Config::from_env();

    let log_buffer = LogBuffer::new();
    let _file_guard = init_tracing(&config, &log_buffer);

    // Oneshot: the server stops accepting when this fires
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let mut server = tokio::spawn(proxy::start_server(config.clone(), shutdown_rx));

    startup::print_startup(&config);
    startup::log_startup(&config);

    if config.enable_tui {
        let client = StreamingClient::new(
            &config.effective_server_url(),
            Duration::from_secs(config.chat.request_timeout_secs),
        )?;
        tracing::info!(server = %client.chat_url(), "Starting TUI");
        if let Err(e) = tui::run_tui(config, log_buffer, client).await {
            tracing::error!("TUI error: {:?}", e);
        }
    } else {
        tracing::info!("TUI disabled, running in headless mode");
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl+C")?;
            }
            // Server stopped on its own: bind failure or fatal error
            result = &mut server => {
                return result.context("Server task panicked")?;
            }
        }
    }

    tracing::info!("Shutting down...");

    // Already gone if the server exited early
    let _ = shutdown_tx.send(());
    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!("Server error: {:#}", e),
        Err(e) => tracing::error!("Server task failed: {}", e),
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
