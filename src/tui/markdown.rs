// Markdown rendering for node content
//
// Replies arrive as GitHub-flavoured markdown. pulldown-cmark turns them
// into events; the renderer keeps a style stack and flushes one block at a
// time, word-wrapping it to the node's inner width.
//
// Supports: headings, paragraphs, bold/italic/strikethrough, inline code,
// fenced code blocks, nested lists, blockquotes, rules, links, tables.

use pulldown_cmark::{Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use super::theme::Theme;

/// Render markdown into lines no wider than `width` display columns
///
/// Code block lines are kept verbatim and may be wider; the widget clips them.
pub fn render_markdown(markdown: &str, width: usize, theme: &Theme) -> Vec<Line<'static>> {
    let clean = sanitize_for_tui(markdown);
    let options = Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TABLES;

    let mut renderer = Renderer::new(width.max(1), theme);
    for event in Parser::new_ext(&clean, options) {
        renderer.event(event);
    }
    renderer.finish()
}

/// Word-wrap unformatted text in a single style
pub fn wrap_plain(text: &str, width: usize, style: Style) -> Vec<Line<'static>> {
    let clean = sanitize_for_tui(text);
    clean
        .lines()
        .flat_map(|line| {
            let wrapped = wrap_spans(&[Span::styled(line.to_string(), style)], width.max(1));
            if wrapped.is_empty() {
                vec![Line::from("")]
            } else {
                wrapped.into_iter().map(Line::from).collect()
            }
        })
        .collect()
}

/// Plain text of a rendered line
pub fn line_text(line: &Line<'_>) -> String {
    line.spans.iter().map(|s| s.content.as_ref()).collect()
}

/// Strip control characters that would move the terminal cursor
///
/// Drops ANSI escape sequences, carriage returns, backspace, DEL and other
/// C0 controls except tab and newline. Tabs become spaces.
fn sanitize_for_tui(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '\x1b' => {
                // CSI sequence: ESC [ params letter
                if chars.peek() == Some(&'[') {
                    chars.next();
                    for next in chars.by_ref() {
                        if next.is_ascii_alphabetic() {
                            break;
                        }
                    }
                }
            }
            '\t' => result.push_str("    "),
            '\n' => result.push('\n'),
            c if c.is_control() => {}
            c => result.push(c),
        }
    }

    result
}

// ─────────────────────────────────────────────────────────────────────────────
// Renderer
// ─────────────────────────────────────────────────────────────────────────────

struct Renderer<'t> {
    theme: &'t Theme,
    width: usize,
    lines: Vec<Line<'static>>,
    /// Inline spans of the block being built
    spans: Vec<Span<'static>>,
    styles: Vec<Style>,
    /// One entry per open list: next number for ordered lists
    lists: Vec<Option<u64>>,
    quote_depth: usize,
    /// Marker waiting to prefix the next flushed line of a list item
    item_marker: Option<String>,
    code: Option<String>,
    link_url: Option<String>,
    table_row: Option<Vec<String>>,
    in_table_head: bool,
}

impl<'t> Renderer<'t> {
    fn new(width: usize, theme: &'t Theme) -> Self {
        Self {
            theme,
            width,
            lines: Vec::new(),
            spans: Vec::new(),
            styles: vec![Style::default()],
            lists: Vec::new(),
            quote_depth: 0,
            item_marker: None,
            code: None,
            link_url: None,
            table_row: None,
            in_table_head: false,
        }
    }

    fn style(&self) -> Style {
        self.styles.last().copied().unwrap_or_default()
    }

    fn push_style(&mut self, patch: Style) {
        let style = self.style().patch(patch);
        self.styles.push(style);
    }

    fn pop_style(&mut self) {
        if self.styles.len() > 1 {
            self.styles.pop();
        }
    }

    fn event(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(tag) => self.end(tag),

            Event::Text(text) => {
                if let Some(code) = self.code.as_mut() {
                    code.push_str(&text);
                } else if let Some(cell) = self.table_row.as_mut().and_then(|r| r.last_mut()) {
                    cell.push_str(&text);
                } else {
                    let style = self.style();
                    self.spans.push(Span::styled(text.to_string(), style));
                }
            }

            Event::Code(code) => {
                if let Some(cell) = self.table_row.as_mut().and_then(|r| r.last_mut()) {
                    cell.push_str(&code);
                } else {
                    let style = self.style().fg(self.theme.code_inline);
                    self.spans.push(Span::styled(code.to_string(), style));
                }
            }

            Event::Html(html) | Event::InlineHtml(html) => {
                let style = Style::default().fg(self.theme.muted);
                self.spans.push(Span::styled(html.trim_end().to_string(), style));
            }

            Event::SoftBreak => self.spans.push(Span::raw(" ")),
            Event::HardBreak => self.flush(),

            Event::Rule => {
                self.flush();
                let rule = "─".repeat(self.width);
                self.lines
                    .push(Line::from(Span::styled(rule, Style::default().fg(self.theme.muted))));
                self.blank();
            }

            _ => {}
        }
    }

    fn start(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Heading { level, .. } => {
                self.flush();
                let mut style = Style::default()
                    .fg(self.theme.heading)
                    .add_modifier(Modifier::BOLD);
                if level == HeadingLevel::H1 {
                    style = style.add_modifier(Modifier::UNDERLINED);
                }
                self.push_style(style);
            }
            Tag::BlockQuote => {
                self.flush();
                self.quote_depth += 1;
                self.push_style(Style::default().fg(self.theme.quote));
            }
            Tag::CodeBlock(_) => {
                self.flush();
                self.code = Some(String::new());
            }
            Tag::List(first) => {
                self.flush();
                self.lists.push(first);
            }
            Tag::Item => {
                self.flush();
                let marker = match self.lists.last_mut() {
                    Some(Some(n)) => {
                        let marker = format!("{}. ", n);
                        *n += 1;
                        marker
                    }
                    _ => "• ".to_string(),
                };
                self.item_marker = Some(marker);
            }
            Tag::Strong => self.push_style(Style::default().add_modifier(Modifier::BOLD)),
            Tag::Emphasis => self.push_style(Style::default().add_modifier(Modifier::ITALIC)),
            Tag::Strikethrough => {
                self.push_style(Style::default().add_modifier(Modifier::CROSSED_OUT))
            }
            Tag::Link { dest_url, .. } => {
                self.link_url = Some(dest_url.to_string());
                self.push_style(
                    Style::default()
                        .fg(self.theme.link)
                        .add_modifier(Modifier::UNDERLINED),
                );
            }
            Tag::Table(_) => self.flush(),
            Tag::TableHead => {
                self.in_table_head = true;
                self.table_row = Some(Vec::new());
            }
            Tag::TableRow => self.table_row = Some(Vec::new()),
            Tag::TableCell => {
                if let Some(row) = self.table_row.as_mut() {
                    row.push(String::new());
                }
            }
            _ => {}
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph => {
                self.flush();
                if self.lists.is_empty() {
                    self.blank();
                }
            }
            TagEnd::Heading(_) => {
                self.flush();
                self.pop_style();
                self.blank();
            }
            TagEnd::BlockQuote => {
                self.flush();
                self.quote_depth = self.quote_depth.saturating_sub(1);
                self.pop_style();
                self.blank();
            }
            TagEnd::CodeBlock => {
                let code = self.code.take().unwrap_or_default();
                let style = Style::default().fg(self.theme.code_block);
                for line in code.lines() {
                    self.lines
                        .push(Line::from(Span::styled(format!("  {}", line), style)));
                }
                self.blank();
            }
            TagEnd::List(_) => {
                self.flush();
                self.lists.pop();
                if self.lists.is_empty() {
                    self.blank();
                }
            }
            TagEnd::Item => self.flush(),
            TagEnd::Strong | TagEnd::Emphasis | TagEnd::Strikethrough => self.pop_style(),
            TagEnd::Link => {
                self.pop_style();
                if let Some(url) = self.link_url.take().filter(|u| !u.is_empty()) {
                    let style = Style::default().fg(self.theme.muted);
                    self.spans.push(Span::styled(format!(" ({})", url), style));
                }
            }
            TagEnd::TableHead | TagEnd::TableRow => {
                if let Some(row) = self.table_row.take() {
                    let mut style = Style::default();
                    if self.in_table_head {
                        style = style.add_modifier(Modifier::BOLD);
                    }
                    let text = row
                        .iter()
                        .map(|c| c.trim())
                        .collect::<Vec<_>>()
                        .join(" │ ");
                    self.spans.push(Span::styled(text, style));
                    self.flush();
                }
                self.in_table_head = false;
            }
            TagEnd::Table => self.blank(),
            _ => {}
        }
    }

    /// Prefix for the current nesting: quote bars then list indentation
    fn prefix(&self) -> String {
        let mut prefix = "│ ".repeat(self.quote_depth);
        prefix.push_str(&"  ".repeat(self.lists.len().saturating_sub(1)));
        prefix
    }

    /// Wrap the pending spans into lines
    fn flush(&mut self) {
        if self.spans.is_empty() {
            return;
        }
        let spans = std::mem::take(&mut self.spans);

        let indent = self.prefix();
        let marker = self.item_marker.take().unwrap_or_default();
        let first = format!("{}{}", indent, marker);
        let rest = format!("{}{}", indent, " ".repeat(marker.width()));
        let available = self.width.saturating_sub(first.width()).max(1);

        let prefix_style = Style::default().fg(self.theme.muted);
        for (i, mut line) in wrap_spans(&spans, available).into_iter().enumerate() {
            let prefix = if i == 0 { &first } else { &rest };
            if !prefix.is_empty() {
                line.insert(0, Span::styled(prefix.clone(), prefix_style));
            }
            self.lines.push(Line::from(line));
        }
    }

    /// Paragraph spacing; never doubles up
    fn blank(&mut self) {
        let last_blank = self
            .lines
            .last()
            .map(|l| l.spans.iter().all(|s| s.content.trim().is_empty()))
            .unwrap_or(true);
        if !last_blank {
            self.lines.push(Line::from(""));
        }
    }

    fn finish(mut self) -> Vec<Line<'static>> {
        self.flush();
        while self
            .lines
            .last()
            .is_some_and(|l| l.spans.iter().all(|s| s.content.trim().is_empty()))
        {
            self.lines.pop();
        }
        self.lines
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wrapping
// ─────────────────────────────────────────────────────────────────────────────

struct Word {
    text: String,
    style: Style,
    /// Whitespace followed this word in the source
    space_after: bool,
}

/// Split styled spans into words, remembering where whitespace was
fn words(spans: &[Span<'static>]) -> Vec<Word> {
    let mut words: Vec<Word> = Vec::new();
    for span in spans {
        let text = span.content.as_ref();
        if text.starts_with(char::is_whitespace) {
            if let Some(last) = words.last_mut() {
                last.space_after = true;
            }
        }
        let before = words.len();
        words.extend(text.split_whitespace().map(|w| Word {
            text: w.to_string(),
            style: span.style,
            space_after: true,
        }));
        if words.len() > before && !text.ends_with(char::is_whitespace) {
            if let Some(last) = words.last_mut() {
                last.space_after = false;
            }
        }
    }
    words
}

/// Greedy word wrap by display width; words wider than a line are split
fn wrap_spans(spans: &[Span<'static>], width: usize) -> Vec<Vec<Span<'static>>> {
    let mut lines = Vec::new();
    let mut current: Vec<Span<'static>> = Vec::new();
    let mut current_width = 0usize;
    let mut space_pending = false;

    for word in words(spans) {
        let word_width = word.text.width();
        let gap = usize::from(current_width > 0 && space_pending);

        if current_width > 0 && current_width + gap + word_width > width {
            lines.push(std::mem::take(&mut current));
            current_width = 0;
        } else if gap == 1 {
            current.push(Span::raw(" "));
            current_width += 1;
        }

        if word_width > width {
            let mut piece = String::new();
            let mut piece_width = 0usize;
            for ch in word.text.chars() {
                let w = ch.width().unwrap_or(0);
                if current_width + piece_width + w > width && !piece.is_empty() {
                    current.push(Span::styled(std::mem::take(&mut piece), word.style));
                    lines.push(std::mem::take(&mut current));
                    current_width = 0;
                    piece_width = 0;
                }
                piece.push(ch);
                piece_width += w;
            }
            current.push(Span::styled(piece, word.style));
            current_width += piece_width;
        } else {
            current.push(Span::styled(word.text, word.style));
            current_width += word_width;
        }
        space_pending = word.space_after;
    }

    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(markdown: &str, width: usize) -> Vec<String> {
        render_markdown(markdown, width, &Theme::auto())
            .iter()
            .map(line_text)
            .collect()
    }

    #[test]
    fn test_paragraph_wraps_at_word_boundaries() {
        let lines = render("the quick brown fox jumps over the lazy dog", 15);
        assert_eq!(lines, vec!["the quick brown", "fox jumps over", "the lazy dog"]);
        assert!(lines.iter().all(|l| l.width() <= 15));
    }

    #[test]
    fn test_inline_styles_keep_spacing() {
        let lines = render("a **bold** move, `code` here", 80);
        assert_eq!(lines, vec!["a bold move, code here"]);
    }

    #[test]
    fn test_paragraphs_separated_by_one_blank_line() {
        let lines = render("first\n\n\n\nsecond\n\n", 80);
        assert_eq!(lines, vec!["first", "", "second"]);
    }

    #[test]
    fn test_lists_get_markers_and_hanging_indent() {
        let lines = render("- alpha beta gamma\n- two\n\n1. one\n2. next", 12);
        assert_eq!(lines[0], "• alpha beta");
        assert_eq!(lines[1], "  gamma");
        assert_eq!(lines[2], "• two");
        assert!(lines.contains(&"1. one".to_string()));
        assert!(lines.contains(&"2. next".to_string()));
    }

    #[test]
    fn test_code_block_is_verbatim() {
        let lines = render("```rust\nfn main() {\n    let x = 1;\n}\n```", 8);
        assert_eq!(lines[0], "  fn main() {");
        assert_eq!(lines[1], "      let x = 1;");
    }

    #[test]
    fn test_blockquote_prefix() {
        let lines = render("> quoted words here", 80);
        assert_eq!(lines, vec!["│ quoted words here"]);
    }

    #[test]
    fn test_heading_is_bold() {
        let rendered = render_markdown("# Title\n\nbody", 40, &Theme::auto());
        let heading = &rendered[0].spans[0];
        assert_eq!(heading.content, "Title");
        assert!(heading.style.add_modifier.contains(Modifier::BOLD));
    }

    #[test]
    fn test_wide_characters_use_display_width() {
        // Each CJK character is two columns
        let lines = render("漢字漢字 漢字", 8);
        assert_eq!(lines, vec!["漢字漢字", "漢字"]);
    }

    #[test]
    fn test_overlong_word_is_split() {
        let lines = render("abcdefghij", 4);
        assert_eq!(lines, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn test_control_characters_are_stripped() {
        let lines = render("red\x1b[31m text\r\x07", 80);
        assert_eq!(lines, vec!["red text"]);
    }

    #[test]
    fn test_wrap_plain_keeps_blank_lines() {
        let lines: Vec<String> = wrap_plain("one two three\n\nfour", 7, Style::default())
            .iter()
            .map(line_text)
            .collect();
        assert_eq!(lines, vec!["one two", "three", "", "four"]);
    }

    #[test]
    fn test_table_rows() {
        let lines = render("| a | b |\n|---|---|\n| 1 | 2 |", 80);
        assert_eq!(lines, vec!["a │ b", "1 │ 2"]);
    }
}
