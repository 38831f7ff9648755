// UI rendering
//
// Frame layout, top to bottom:
//   canvas        edges on a braille canvas, node cards on top
//   panel         compose box, line picker or logs (only when active)
//   status line   mode, layout, zoom, focus, latest message
//
// Canvas space maps to screen units through the viewport, and screen units
// map to cells through CELL_W x CELL_H. Node cards can hang off any edge of
// the canvas, so each is rendered into its own buffer and the visible part
// copied into the frame.

use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    symbols::Marker,
    text::{Line, Span},
    widgets::{
        canvas::{Canvas, Line as CanvasLine},
        Block, BorderType, Borders, Clear, Paragraph, Widget, Wrap,
    },
    Frame,
};

use super::app::{App, Mode, CELL_H, CELL_W};
use super::node;
use crate::logging::LogLevel;
use crate::tree::ChatNode;

/// Points sampled along each connector curve
const CURVE_SEGMENTS: usize = 32;

/// Largest card drawn, in cells
const MAX_CARD_CELLS: u16 = 600;

const LOG_PANEL_ROWS: u16 = 8;

/// Main UI render function - called on every frame
pub fn draw(f: &mut Frame, app: &App) {
    let [canvas, panel, status] = split(f.area(), app);

    draw_edges(f, canvas, app);
    draw_nodes(f, canvas, app);

    match app.mode {
        Mode::Compose(_) => draw_compose(f, panel, app),
        Mode::Select => draw_selection(f, panel, app),
        _ if app.show_logs => draw_logs(f, panel, app),
        _ => {}
    }

    draw_status(f, status, app);

    if app.mode == Mode::Help {
        draw_help(f, canvas, app);
    }
}

/// Canvas area for a terminal of the given size
pub fn canvas_rect(area: Rect, app: &App) -> Rect {
    split(area, app)[0]
}

fn split(area: Rect, app: &App) -> [Rect; 3] {
    let panel_rows = match app.mode {
        Mode::Compose(_) => (app.compose.lines().count().max(1) as u16 + 2).min(10),
        Mode::Select => app
            .selection
            .as_ref()
            .map(|s| (s.lines.len() as u16).min(10) + 2)
            .unwrap_or(0),
        _ if app.show_logs => LOG_PANEL_ROWS,
        _ => 0,
    };

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(3),
            Constraint::Length(panel_rows),
            Constraint::Length(1),
        ])
        .split(area);
    [chunks[0], chunks[1], chunks[2]]
}

// ─────────────────────────────────────────────────────────────────────────────
// Canvas
// ─────────────────────────────────────────────────────────────────────────────

fn draw_edges(f: &mut Frame, area: Rect, app: &App) {
    let width = area.width as f64 * CELL_W;
    let height = area.height as f64 * CELL_H;
    let viewport = app.canvas.viewport();
    let color = app.theme.edge;

    let polylines: Vec<Vec<(f64, f64)>> = app
        .canvas
        .connectors()
        .iter()
        .map(|c| {
            c.curve
                .sample(CURVE_SEGMENTS)
                .into_iter()
                .map(|p| viewport.world_to_screen(p))
                // Canvas y grows upwards
                .map(|p| (p.x, height - p.y))
                .collect()
        })
        .collect();

    let canvas = Canvas::default()
        .marker(Marker::Braille)
        .x_bounds([0.0, width])
        .y_bounds([0.0, height])
        .paint(move |ctx| {
            for points in &polylines {
                for pair in points.windows(2) {
                    let ((x1, y1), (x2, y2)) = (pair[0], pair[1]);
                    ctx.draw(&CanvasLine::new(x1, y1, x2, y2, color));
                }
            }
        });
    f.render_widget(canvas, area);
}

fn draw_nodes(f: &mut Frame, area: Rect, app: &App) {
    let viewport = app.canvas.viewport();
    let scale = viewport.scale();
    let node_width = app.canvas.params().node_width;
    let focused = app.canvas.focused();

    // Pre-order: children are drawn over their parents
    for node in app.canvas.tree().flatten() {
        let origin = viewport.world_to_screen(node.position);
        let left = area.x as i64 + (origin.x / CELL_W).floor() as i64;
        let top = area.y as i64 + (origin.y / CELL_H).floor() as i64;
        let width = cells(node_width * scale / CELL_W);
        let height = cells(node.height.max(3.0 * CELL_H) * scale / CELL_H);

        let right = left + width as i64;
        let bottom = top + height as i64;
        if right <= area.x as i64
            || bottom <= area.y as i64
            || left >= (area.x + area.width) as i64
            || top >= (area.y + area.height) as i64
        {
            continue;
        }

        let card = render_card(node, width, height, node.id == focused, app);
        blit(f.buffer_mut(), &card, left, top, area);
    }
}

fn cells(units: f64) -> u16 {
    units.round().clamp(3.0, MAX_CARD_CELLS as f64) as u16
}

/// Draw one node into a buffer of its own
fn render_card(node: &ChatNode, width: u16, height: u16, focused: bool, app: &App) -> Buffer {
    let area = Rect::new(0, 0, width, height);
    let mut buf = Buffer::empty(area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(if focused {
            BorderType::Thick
        } else {
            BorderType::Rounded
        })
        .border_style(node::border_style(node, focused, &app.theme))
        .title(node::title(node, app.frame, &app.theme));
    let inner = block.inner(area);
    block.render(area, &mut buf);

    let lines = node::body_lines(node, inner.width as usize, &app.theme);
    Paragraph::new(lines).render(inner, &mut buf);
    buf
}

/// Copy the part of `card` that falls inside `clip`
fn blit(target: &mut Buffer, card: &Buffer, left: i64, top: i64, clip: Rect) {
    let card_area = card.area;
    for y in 0..card_area.height {
        let ty = top + y as i64;
        if ty < clip.y as i64 || ty >= (clip.y + clip.height) as i64 {
            continue;
        }
        for x in 0..card_area.width {
            let tx = left + x as i64;
            if tx < clip.x as i64 || tx >= (clip.x + clip.width) as i64 {
                continue;
            }
            if let (Some(src), Some(dst)) = (card.cell((x, y)), target.cell_mut((tx as u16, ty as u16)))
            {
                *dst = src.clone();
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Panels
// ─────────────────────────────────────────────────────────────────────────────

fn draw_compose(f: &mut Frame, area: Rect, app: &App) {
    let Mode::Compose(node) = app.mode else {
        return;
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(app.theme.focus))
        .title(format!(
            " Message {} · Enter send · Alt+Enter newline · Esc cancel ",
            node
        ));

    let mut text = app.compose.clone();
    text.push('▏');
    let paragraph = Paragraph::new(text)
        .block(block)
        .wrap(Wrap { trim: false });
    f.render_widget(paragraph, area);
}

fn draw_selection(f: &mut Frame, area: Rect, app: &App) {
    let Some(selection) = app.selection.as_ref() else {
        return;
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(app.theme.quote))
        .title(format!(
            " Quote from {} · ↑↓ move · Space anchor · Enter branch · Esc cancel ",
            selection.node
        ));
    let visible = area.height.saturating_sub(2).max(1) as usize;
    let first = selection.cursor.saturating_sub(visible - 1);

    let lines: Vec<Line> = selection
        .lines
        .iter()
        .enumerate()
        .skip(first)
        .take(visible)
        .map(|(i, text)| {
            let mut style = Style::default();
            if selection.contains(i) {
                style = style.bg(app.theme.selection);
            }
            if i == selection.cursor {
                style = style.add_modifier(Modifier::BOLD);
            }
            let marker = if i == selection.cursor { "› " } else { "  " };
            Line::from(vec![Span::raw(marker), Span::styled(text.clone(), style)])
        })
        .collect();

    f.render_widget(Paragraph::new(lines).block(block), area);
}

fn draw_logs(f: &mut Frame, area: Rect, app: &App) {
    let rows = area.height.saturating_sub(2) as usize;
    let lines: Vec<Line> = app
        .log_buffer
        .recent(rows)
        .into_iter()
        .map(|entry| {
            Line::from(vec![
                Span::styled(
                    entry.timestamp.format("%H:%M:%S ").to_string(),
                    Style::default().fg(app.theme.muted),
                ),
                Span::styled(
                    format!("{:<5} ", entry.level.as_str()),
                    Style::default().fg(level_color(entry.level, app)),
                ),
                Span::raw(entry.message),
            ])
        })
        .collect();

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(app.theme.border))
        .title(format!(" Logs ({}) ", app.log_buffer.len()));
    f.render_widget(Paragraph::new(lines).block(block), area);
}

fn level_color(level: LogLevel, app: &App) -> ratatui::style::Color {
    match level {
        LogLevel::Error => app.theme.error,
        LogLevel::Warn => app.theme.quote,
        LogLevel::Info => app.theme.status_bar,
        LogLevel::Debug | LogLevel::Trace => app.theme.muted,
    }
}

fn draw_status(f: &mut Frame, area: Rect, app: &App) {
    let canvas = &app.canvas;
    let mut spans = vec![
        Span::styled(
            format!(" {} ", app.mode.name()),
            Style::default()
                .fg(ratatui::style::Color::Black)
                .bg(app.theme.status_bar)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(format!(
            " {} · {:.0}% · {} nodes · focus {} ",
            canvas.mode().as_str(),
            canvas.viewport().scale() * 100.0,
            canvas.tree().len(),
            canvas.focused(),
        )),
    ];

    if let Some(message) = app.status() {
        spans.push(Span::styled(
            format!("│ {}", message),
            Style::default().fg(app.theme.focus),
        ));
    } else if let Some(entry) = app.log_buffer.latest(LogLevel::Info) {
        spans.push(Span::styled(
            format!("│ {}", entry.message),
            Style::default().fg(level_color(entry.level, app)),
        ));
    }

    spans.push(Span::styled(
        "  ? help",
        Style::default().fg(app.theme.muted),
    ));
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

const HELP: &[(&str, &str)] = &[
    ("Tab / Shift-Tab", "focus next / previous node"),
    ("arrows", "pan"),
    ("+ / -", "zoom in / out"),
    ("0", "reset view"),
    ("c", "centre on focused node"),
    ("Enter / i", "write a message"),
    ("b", "branch from focused node"),
    ("s", "quote reply lines into a new branch"),
    ("y", "copy last reply"),
    ("d", "delete branch"),
    ("l", "toggle horizontal / vertical layout"),
    ("L", "show logs"),
    ("mouse", "drag nodes, drag background, wheel to zoom"),
    ("q", "quit"),
];

fn draw_help(f: &mut Frame, area: Rect, app: &App) {
    let width = 60.min(area.width);
    let height = (HELP.len() as u16 + 2).min(area.height);
    let popup = Rect::new(
        area.x + (area.width - width) / 2,
        area.y + (area.height - height) / 2,
        width,
        height,
    );

    let lines: Vec<Line> = HELP
        .iter()
        .map(|(keys, action)| {
            Line::from(vec![
                Span::styled(
                    format!(" {:<16}", keys),
                    Style::default()
                        .fg(app.theme.focus)
                        .add_modifier(Modifier::BOLD),
                ),
                Span::raw(*action),
            ])
        })
        .collect();

    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .title(" Keys · any key to close ");
    f.render_widget(Clear, popup);
    f.render_widget(Paragraph::new(lines).block(block), popup);
}
