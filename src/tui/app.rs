// TUI application state
//
// Wraps the canvas controller with terminal-only state: input mode, the
// compose buffer, line selection and the status line. Key and mouse
// handlers translate terminal input into controller calls. Requests that
// need sending are queued here and handed to the streaming client by the
// event loop.

use crossterm::event::{
    KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
};
use ratatui::layout::Rect;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use super::clipboard::copy_to_clipboard;
use super::node;
use super::theme::Theme;
use crate::canvas::{CanvasController, SendError};
use crate::client::{StreamEvent, StreamEventKind};
use crate::config::Config;
use crate::logging::LogBuffer;
use crate::protocol::ChatRequest;
use crate::tree::{ChatNode, NodeId, Position, Role};

/// Screen units per terminal column
pub const CELL_W: f64 = 8.0;
/// Screen units per terminal row
pub const CELL_H: f64 = 16.0;

/// Arrow key pan distance, in cells
const PAN_COLUMNS: f64 = 4.0;
const PAN_ROWS: f64 = 2.0;

/// How long a status message stays on screen
const STATUS_TTL: Duration = Duration::from_secs(4);

/// What keystrokes currently mean
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Normal,
    /// Typing a message for the given node
    Compose(NodeId),
    /// Picking reply lines to quote in a new branch
    Select,
    /// Key reference overlay
    Help,
}

impl Mode {
    pub fn name(&self) -> &'static str {
        match self {
            Mode::Normal => "NORMAL",
            Mode::Compose(_) => "COMPOSE",
            Mode::Select => "SELECT",
            Mode::Help => "HELP",
        }
    }
}

/// Reply lines of one node with a selected range
#[derive(Debug, Clone, PartialEq)]
pub struct LineSelection {
    pub node: NodeId,
    pub lines: Vec<String>,
    pub anchor: usize,
    pub cursor: usize,
}

impl LineSelection {
    pub fn from_node(node: &ChatNode) -> Option<Self> {
        let reply = node.last_reply()?;
        let lines: Vec<String> = reply
            .content
            .lines()
            .map(|l| l.trim_end().to_string())
            .filter(|l| !l.trim().is_empty())
            .collect();
        if lines.is_empty() {
            return None;
        }
        Some(Self {
            node: node.id,
            lines,
            anchor: 0,
            cursor: 0,
        })
    }

    pub fn contains(&self, index: usize) -> bool {
        let (lo, hi) = self.bounds();
        (lo..=hi).contains(&index)
    }

    fn bounds(&self) -> (usize, usize) {
        (self.anchor.min(self.cursor), self.anchor.max(self.cursor))
    }

    pub fn move_cursor(&mut self, delta: isize) {
        let last = self.lines.len().saturating_sub(1);
        self.cursor = self.cursor.saturating_add_signed(delta).min(last);
    }

    pub fn text(&self) -> String {
        let (lo, hi) = self.bounds();
        self.lines[lo..=hi].join("\n")
    }
}

/// Inputs that decide a node's measured height
#[derive(Debug, Clone, Copy, PartialEq)]
struct BodyKey {
    messages: usize,
    chars: usize,
    thinking: bool,
    error: bool,
}

impl BodyKey {
    fn of(node: &ChatNode) -> Self {
        Self {
            messages: node.conversation.len(),
            chars: node.conversation.iter().map(|m| m.content.len()).sum(),
            thinking: node.thinking,
            error: node.last_error.is_some(),
        }
    }
}

/// Main application state for the TUI
pub struct App {
    pub canvas: CanvasController,
    pub mode: Mode,
    pub compose: String,
    pub selection: Option<LineSelection>,
    pub log_buffer: LogBuffer,
    pub theme: Theme,
    /// Show the log panel under the canvas
    pub show_logs: bool,
    pub should_quit: bool,
    /// Where the canvas was last laid out on screen
    pub canvas_area: Rect,
    /// Advances on every tick; drives spinners
    pub frame: usize,
    status: Option<(String, Instant)>,
    outgoing: Vec<(NodeId, ChatRequest)>,
    measured: HashMap<NodeId, BodyKey>,
}

impl App {
    pub fn new(config: &Config, log_buffer: LogBuffer) -> Self {
        Self {
            canvas: CanvasController::new(&config.canvas),
            mode: Mode::Normal,
            compose: String::new(),
            selection: None,
            log_buffer,
            theme: Theme::by_name(&config.canvas.theme),
            show_logs: false,
            should_quit: false,
            canvas_area: Rect::default(),
            frame: 0,
            status: None,
            outgoing: Vec::new(),
            measured: HashMap::new(),
        }
    }

    pub fn tick(&mut self) {
        self.frame = self.frame.wrapping_add(1);
    }

    pub fn set_status(&mut self, message: impl Into<String>) {
        self.status = Some((message.into(), Instant::now()));
    }

    /// Current status message, if it has not expired
    pub fn status(&self) -> Option<&str> {
        self.status
            .as_ref()
            .filter(|(_, at)| at.elapsed() < STATUS_TTL)
            .map(|(msg, _)| msg.as_str())
    }

    /// Requests queued since the last call
    pub fn take_outgoing(&mut self) -> Vec<(NodeId, ChatRequest)> {
        std::mem::take(&mut self.outgoing)
    }

    pub fn apply_stream_event(&mut self, event: StreamEvent) {
        if let StreamEventKind::Failed(_) = &event.kind {
            self.set_status(format!("Reply for {} failed", event.node));
        }
        self.canvas.apply_stream_event(event);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Geometry
    // ─────────────────────────────────────────────────────────────────────

    pub fn set_canvas_area(&mut self, area: Rect) {
        self.canvas_area = area;
    }

    /// Screen-unit position of a terminal cell, relative to the canvas
    pub fn screen_point(&self, column: u16, row: u16) -> Position {
        Position::new(
            column.saturating_sub(self.canvas_area.x) as f64 * CELL_W,
            row.saturating_sub(self.canvas_area.y) as f64 * CELL_H,
        )
    }

    fn canvas_centre(&self) -> Position {
        Position::new(
            self.canvas_area.width as f64 * CELL_W / 2.0,
            self.canvas_area.height as f64 * CELL_H / 2.0,
        )
    }

    fn in_canvas(&self, column: u16, row: u16) -> bool {
        let a = self.canvas_area;
        column >= a.x && column < a.x + a.width && row >= a.y && row < a.y + a.height
    }

    /// Report heights for nodes whose content changed since last measured
    ///
    /// Nodes are measured at 100% zoom so layout does not shift on zoom.
    pub fn measure_heights(&mut self) {
        let inner = node::natural_columns(self.canvas.params().node_width).saturating_sub(2);
        let changed: Vec<(NodeId, BodyKey, f64)> = self
            .canvas
            .tree()
            .flatten()
            .into_iter()
            .filter_map(|n| {
                let key = BodyKey::of(n);
                if self.measured.get(&n.id) == Some(&key) && n.height > 0.0 {
                    return None;
                }
                let rows = node::body_lines(n, inner as usize, &self.theme).len();
                Some((n.id, key, node::height_for(rows)))
            })
            .collect();

        for (id, key, height) in changed {
            self.canvas.report_height(id, height);
            self.measured.insert(id, key);
        }
        let tree = self.canvas.tree();
        self.measured.retain(|id, _| tree.contains(*id));
    }

    // ─────────────────────────────────────────────────────────────────────
    // Keyboard
    // ─────────────────────────────────────────────────────────────────────

    pub fn handle_key(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            self.should_quit = true;
            return;
        }

        match self.mode {
            Mode::Normal => self.handle_normal_key(key),
            Mode::Compose(node) => self.handle_compose_key(node, key),
            Mode::Select => self.handle_select_key(key),
            Mode::Help => self.mode = Mode::Normal,
        }
    }

    fn handle_normal_key(&mut self, key: KeyEvent) {
        let centre = self.canvas_centre();
        match key.code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Char('?') => self.mode = Mode::Help,
            KeyCode::Tab => {
                self.canvas.focus_next();
                self.canvas.center_on_focused(centre);
            }
            KeyCode::BackTab => {
                self.canvas.focus_prev();
                self.canvas.center_on_focused(centre);
            }
            KeyCode::Char('c') => self.canvas.center_on_focused(centre),
            KeyCode::Left => self.canvas.pan_by(PAN_COLUMNS * CELL_W, 0.0),
            KeyCode::Right => self.canvas.pan_by(-PAN_COLUMNS * CELL_W, 0.0),
            KeyCode::Up => self.canvas.pan_by(0.0, PAN_ROWS * CELL_H),
            KeyCode::Down => self.canvas.pan_by(0.0, -PAN_ROWS * CELL_H),
            KeyCode::Char('+') | KeyCode::Char('=') => {
                let step = self.canvas.zoom_step();
                self.canvas.zoom_at(centre, step);
            }
            KeyCode::Char('-') => {
                let step = self.canvas.zoom_step();
                self.canvas.zoom_at(centre, 1.0 / step);
            }
            KeyCode::Char('0') => self.canvas.reset_view(),
            KeyCode::Char('l') => self.canvas.toggle_layout(),
            KeyCode::Char('L') => self.show_logs = !self.show_logs,
            KeyCode::Char('b') => {
                let source = self.canvas.focused();
                if self.canvas.branch(source).is_some() {
                    self.canvas.center_on_focused(centre);
                }
            }
            KeyCode::Char('d') => {
                let target = self.canvas.focused();
                if self.canvas.delete(target) {
                    self.set_status(format!("Deleted {} and its branches", target));
                } else {
                    self.set_status("The root conversation cannot be deleted");
                }
            }
            KeyCode::Enter | KeyCode::Char('i') => {
                self.mode = Mode::Compose(self.canvas.focused());
            }
            KeyCode::Char('s') => self.start_selection(),
            KeyCode::Char('y') => self.copy_focused_reply(),
            _ => {}
        }
    }

    fn handle_compose_key(&mut self, node: NodeId, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => {
                self.compose.clear();
                self.mode = Mode::Normal;
            }
            KeyCode::Enter if key.modifiers.contains(KeyModifiers::ALT) => {
                self.compose.push('\n');
            }
            KeyCode::Enter => self.send(node),
            KeyCode::Backspace => {
                self.compose.pop();
            }
            KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.compose.push(c);
            }
            _ => {}
        }
    }

    fn send(&mut self, node: NodeId) {
        match self.canvas.begin_send(node, &self.compose) {
            Ok(request) => {
                self.outgoing.push((node, request));
                self.compose.clear();
                self.mode = Mode::Normal;
            }
            Err(SendError::EmptyPrompt) => {}
            Err(e @ SendError::UnknownNode(_)) => {
                self.set_status(e.to_string());
                self.mode = Mode::Normal;
            }
            Err(e) => self.set_status(e.to_string()),
        }
    }

    fn start_selection(&mut self) {
        match self.canvas.focused_node().and_then(LineSelection::from_node) {
            Some(selection) => {
                self.selection = Some(selection);
                self.mode = Mode::Select;
            }
            None => self.set_status("No reply to quote from yet"),
        }
    }

    fn handle_select_key(&mut self, key: KeyEvent) {
        let Some(selection) = self.selection.as_mut() else {
            self.mode = Mode::Normal;
            return;
        };
        match key.code {
            KeyCode::Esc => {
                self.selection = None;
                self.mode = Mode::Normal;
            }
            KeyCode::Up | KeyCode::Char('k') => selection.move_cursor(-1),
            KeyCode::Down | KeyCode::Char('j') => selection.move_cursor(1),
            KeyCode::Char(' ') => selection.anchor = selection.cursor,
            KeyCode::Enter => {
                let source = selection.node;
                let text = selection.text();
                self.selection = None;
                match self.canvas.create_from_selection(source, &text) {
                    Some(child) => {
                        let centre = self.canvas_centre();
                        self.canvas.center_on_focused(centre);
                        self.mode = Mode::Compose(child);
                    }
                    None => {
                        self.set_status(format!("Node {} no longer exists", source));
                        self.mode = Mode::Normal;
                    }
                }
            }
            _ => {}
        }
    }

    fn copy_focused_reply(&mut self) {
        let reply = self
            .canvas
            .focused_node()
            .and_then(|n| n.last_reply())
            .filter(|m| m.role == Role::Assistant && !m.content.is_empty())
            .map(|m| m.content.clone());

        let Some(text) = reply else {
            self.set_status("No reply to copy");
            return;
        };
        match copy_to_clipboard(&text) {
            Ok(()) => self.set_status(format!("Copied {} characters", text.chars().count())),
            Err(e) => {
                tracing::warn!("Clipboard copy failed: {:#}", e);
                self.set_status(format!("{:#}", e));
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Mouse
    // ─────────────────────────────────────────────────────────────────────

    pub fn handle_mouse(&mut self, event: MouseEvent) {
        let inside = self.in_canvas(event.column, event.row);
        let screen = self.screen_point(event.column, event.row);

        match event.kind {
            MouseEventKind::Down(MouseButton::Left) if inside => {
                self.canvas.pointer_down(screen);
            }
            MouseEventKind::Drag(MouseButton::Left) => self.canvas.pointer_move(screen),
            MouseEventKind::Up(MouseButton::Left) => self.canvas.pointer_up(),
            MouseEventKind::ScrollUp if inside => self.canvas.wheel(screen, 1.0),
            MouseEventKind::ScrollDown if inside => self.canvas.wheel(screen, -1.0),
            _ => {}
        }
    }
}
