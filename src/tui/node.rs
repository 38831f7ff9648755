// Node card content
//
// Builds the lines shown inside a node's border. The same function is used
// to draw a node and to measure it, so a node's reported height always
// matches what gets drawn at 100% zoom.

use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};

use super::app::{CELL_H, CELL_W};
use super::markdown::{render_markdown, wrap_plain};
use super::theme::Theme;
use crate::tree::{ChatNode, Role};

const SPINNER: &[char] = &['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];

/// Columns a node spans at 100% zoom
pub fn natural_columns(node_width: f64) -> u16 {
    (node_width / CELL_W).round().clamp(6.0, u16::MAX as f64) as u16
}

/// Canvas height of a node whose body renders to `body_lines` rows
pub fn height_for(body_lines: usize) -> f64 {
    (body_lines + 2) as f64 * CELL_H
}

/// Lines inside the border, wrapped to `width` columns
pub fn body_lines(node: &ChatNode, width: usize, theme: &Theme) -> Vec<Line<'static>> {
    let mut lines = Vec::new();

    if let Some(quote) = node.quoted_text.as_deref() {
        let style = Style::default()
            .fg(theme.quote)
            .add_modifier(Modifier::ITALIC);
        lines.extend(wrap_plain(&format!("“{}”", quote), width, style));
        lines.push(Line::from(""));
    }

    if node.conversation.is_empty() && !node.thinking {
        let hint = if node.quoted_text.is_some() {
            "Ask about this quote: press Enter"
        } else {
            "Empty conversation: press Enter to write"
        };
        lines.extend(wrap_plain(hint, width, Style::default().fg(theme.muted)));
    }

    for (i, message) in node.conversation.iter().enumerate() {
        if i > 0 {
            lines.push(Line::from(""));
        }
        let (label, color) = match message.role {
            Role::User => ("You", theme.user),
            Role::Assistant => ("Assistant", theme.assistant),
        };
        lines.push(Line::from(Span::styled(
            label,
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        )));
        match message.role {
            Role::User => lines.extend(wrap_plain(&message.content, width, Style::default())),
            Role::Assistant => lines.extend(render_markdown(&message.content, width, theme)),
        }
    }

    if node.thinking && !has_partial_reply(node) {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            "thinking…",
            Style::default()
                .fg(theme.thinking)
                .add_modifier(Modifier::ITALIC),
        )));
    }

    if let Some(error) = node.last_error.as_deref() {
        lines.push(Line::from(""));
        lines.extend(wrap_plain(
            &format!("⚠ {}", error),
            width,
            Style::default().fg(theme.error),
        ));
    }

    lines
}

/// Assistant text has started arriving for the pending request
fn has_partial_reply(node: &ChatNode) -> bool {
    node.conversation
        .last()
        .is_some_and(|m| m.role == Role::Assistant && !m.content.is_empty())
}

/// Border title: id, plus a spinner while a reply is pending
pub fn title(node: &ChatNode, frame: usize, theme: &Theme) -> Line<'static> {
    let mut spans = vec![Span::raw(format!(" {} ", node.id))];
    if node.thinking {
        let spin = SPINNER[frame % SPINNER.len()];
        spans.push(Span::styled(
            format!("{} ", spin),
            Style::default().fg(theme.thinking),
        ));
    }
    if node.manual_position {
        spans.push(Span::styled("· pinned ", Style::default().fg(theme.muted)));
    }
    Line::from(spans)
}

pub fn border_style(node: &ChatNode, focused: bool, theme: &Theme) -> Style {
    let color = if node.last_error.is_some() {
        theme.error
    } else if focused {
        theme.focus
    } else if node.thinking {
        theme.thinking
    } else {
        theme.border
    };
    Style::default().fg(color)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{Message, Position};
    use crate::tui::markdown::line_text;

    fn text(lines: &[Line<'_>]) -> Vec<String> {
        lines.iter().map(line_text).collect()
    }

    #[test]
    fn test_empty_root_shows_hint() {
        let node = ChatNode::new(Position::default());
        let lines = text(&body_lines(&node, 40, &Theme::auto()));
        assert_eq!(lines, vec!["Empty conversation: press Enter to write"]);
    }

    #[test]
    fn test_conversation_with_quote_and_error() {
        let mut node = ChatNode::new(Position::default());
        node.quoted_text = Some("Rust is fast".to_string());
        node.conversation = vec![Message::user("Why?"), Message::assistant("**Zero** cost")];
        node.last_error = Some("Server returned 500".to_string());

        let lines = text(&body_lines(&node, 40, &Theme::auto()));
        assert_eq!(
            lines,
            vec![
                "“Rust is fast”",
                "",
                "You",
                "Why?",
                "",
                "Assistant",
                "Zero cost",
                "",
                "⚠ Server returned 500",
            ]
        );
    }

    #[test]
    fn test_thinking_line_until_reply_starts() {
        let mut node = ChatNode::new(Position::default());
        node.conversation = vec![Message::user("hi"), Message::assistant("")];
        node.thinking = true;
        assert!(text(&body_lines(&node, 40, &Theme::auto())).contains(&"thinking…".to_string()));

        node.conversation[1].content.push_str("Hel");
        assert!(!text(&body_lines(&node, 40, &Theme::auto())).contains(&"thinking…".to_string()));
    }

    #[test]
    fn test_geometry_helpers() {
        assert_eq!(natural_columns(400.0), 50);
        assert_eq!(height_for(3), 5.0 * CELL_H);
    }
}
