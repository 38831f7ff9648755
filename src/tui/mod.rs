// TUI module - the conversation canvas in the terminal
//
// Handles terminal setup and teardown and runs the event loop. The loop
// multiplexes three sources:
// - keyboard and mouse input
// - a timer tick for spinners
// - stream events from in-flight chat requests
//
// Every source mutates the App on this task only, so stream events are
// applied to the tree in the order they were received.

pub mod app;
pub mod clipboard;
pub mod markdown;
pub mod node;
pub mod theme;
pub mod ui;

use anyhow::{Context, Result};
use app::App;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, layout::Rect, Terminal};
use std::io;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::client::{StreamEvent, StreamingClient};
use crate::config::Config;
use crate::logging::LogBuffer;

/// Capacity of the stream event channel shared by all requests
const STREAM_CHANNEL_CAPACITY: usize = 256;

/// Run the TUI until the user quits
pub async fn run_tui(config: Config, log_buffer: LogBuffer, client: StreamingClient) -> Result<()> {
    enable_raw_mode().context("Failed to enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)
        .context("Failed to setup terminal")?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("Failed to create terminal")?;

    let mut app = App::new(&config, log_buffer);

    let result = run_event_loop(&mut terminal, &mut app, &client).await;

    // Restore the terminal even when the loop failed
    disable_raw_mode().context("Failed to disable raw mode")?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )
    .context("Failed to restore terminal")?;
    terminal.show_cursor().context("Failed to show cursor")?;

    result
}

async fn run_event_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    client: &StreamingClient,
) -> Result<()> {
    let (stream_tx, mut stream_rx) = mpsc::channel::<StreamEvent>(STREAM_CHANNEL_CAPACITY);
    let mut tick_interval = tokio::time::interval(Duration::from_millis(100));

    loop {
        let size = terminal.size().context("Failed to read terminal size")?;
        let full = Rect::new(0, 0, size.width, size.height);
        app.set_canvas_area(ui::canvas_rect(full, app));
        app.measure_heights();

        terminal
            .draw(|f| ui::draw(f, app))
            .context("Failed to draw terminal")?;

        tokio::select! {
            _ = async {
                if event::poll(Duration::from_millis(10)).unwrap_or(false) {
                    match event::read() {
                        Ok(Event::Key(key)) => app.handle_key(key),
                        Ok(Event::Mouse(mouse)) => app.handle_mouse(mouse),
                        _ => {}
                    }
                }
            } => {}

            _ = tick_interval.tick() => app.tick(),

            Some(stream_event) = stream_rx.recv() => {
                app.apply_stream_event(stream_event);
                // Apply whatever else already arrived before redrawing
                while let Ok(next) = stream_rx.try_recv() {
                    app.apply_stream_event(next);
                }
            }
        }

        for (node, request) in app.take_outgoing() {
            client.spawn(node, request, stream_tx.clone());
        }

        if app.should_quit {
            break;
        }
    }

    Ok(())
}
