// Colour palettes for the canvas
//
// Chosen by name from `[canvas] theme`. "auto" uses the terminal's ANSI
// palette so it follows whatever scheme the terminal is set to; the named
// themes use true colour.

use ratatui::style::Color;

/// Colour palette for the TUI
#[derive(Debug, Clone)]
pub struct Theme {
    pub name: String,

    // Node content
    pub user: Color,
    pub assistant: Color,
    pub quote: Color,
    pub thinking: Color,
    pub error: Color,

    // Markdown
    pub heading: Color,
    pub code_inline: Color,
    pub code_block: Color,
    pub link: Color,

    // Chrome
    pub border: Color,
    pub focus: Color,
    pub edge: Color,
    pub status_bar: Color,
    pub muted: Color,
    pub selection: Color,
}

impl Theme {
    /// Load theme by name; unknown names fall back to "auto"
    pub fn by_name(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "dracula" => Self::dracula(),
            "nord" => Self::nord(),
            "gruvbox" => Self::gruvbox(),
            "auto" => Self::auto(),
            other => {
                tracing::warn!(theme = other, "Unknown theme, using auto");
                Self::auto()
            }
        }
    }

    pub fn auto() -> Self {
        Self {
            name: "auto".to_string(),
            user: Color::Cyan,
            assistant: Color::Reset,
            quote: Color::Yellow,
            thinking: Color::Magenta,
            error: Color::Red,
            heading: Color::Cyan,
            code_inline: Color::Yellow,
            code_block: Color::Green,
            link: Color::Blue,
            border: Color::DarkGray,
            focus: Color::Yellow,
            edge: Color::Gray,
            status_bar: Color::Green,
            muted: Color::DarkGray,
            selection: Color::Blue,
        }
    }

    /// Dracula theme - https://draculatheme.com
    pub fn dracula() -> Self {
        Self {
            name: "dracula".to_string(),
            user: Color::Rgb(0x8b, 0xe9, 0xfd),        // cyan
            assistant: Color::Rgb(0xf8, 0xf8, 0xf2),   // foreground
            quote: Color::Rgb(0xf1, 0xfa, 0x8c),       // yellow
            thinking: Color::Rgb(0xbd, 0x93, 0xf9),    // purple
            error: Color::Rgb(0xff, 0x55, 0x55),       // red
            heading: Color::Rgb(0xff, 0x79, 0xc6),     // pink
            code_inline: Color::Rgb(0xf1, 0xfa, 0x8c), // yellow
            code_block: Color::Rgb(0x50, 0xfa, 0x7b),  // green
            link: Color::Rgb(0x8b, 0xe9, 0xfd),        // cyan
            border: Color::Rgb(0x62, 0x72, 0xa4),      // comment
            focus: Color::Rgb(0xff, 0xb8, 0x6c),       // orange
            edge: Color::Rgb(0x62, 0x72, 0xa4),        // comment
            status_bar: Color::Rgb(0x50, 0xfa, 0x7b),  // green
            muted: Color::Rgb(0x62, 0x72, 0xa4),       // comment
            selection: Color::Rgb(0x44, 0x47, 0x5a),   // current line
        }
    }

    /// Nord theme - https://nordtheme.com
    pub fn nord() -> Self {
        Self {
            name: "nord".to_string(),
            user: Color::Rgb(0x88, 0xc0, 0xd0),        // frost cyan
            assistant: Color::Rgb(0xec, 0xef, 0xf4),   // snow storm
            quote: Color::Rgb(0xeb, 0xcb, 0x8b),       // aurora yellow
            thinking: Color::Rgb(0xb4, 0x8e, 0xad),    // aurora purple
            error: Color::Rgb(0xbf, 0x61, 0x6a),       // aurora red
            heading: Color::Rgb(0x81, 0xa1, 0xc1),     // frost blue
            code_inline: Color::Rgb(0xeb, 0xcb, 0x8b), // aurora yellow
            code_block: Color::Rgb(0xa3, 0xbe, 0x8c),  // aurora green
            link: Color::Rgb(0x8f, 0xbc, 0xbb),        // frost teal
            border: Color::Rgb(0x4c, 0x56, 0x6a),      // polar night
            focus: Color::Rgb(0xd0, 0x87, 0x70),       // aurora orange
            edge: Color::Rgb(0x61, 0x6e, 0x88),
            status_bar: Color::Rgb(0xa3, 0xbe, 0x8c),
            muted: Color::Rgb(0x4c, 0x56, 0x6a),
            selection: Color::Rgb(0x43, 0x4c, 0x5e),
        }
    }

    /// Gruvbox theme - https://github.com/morhetz/gruvbox
    pub fn gruvbox() -> Self {
        Self {
            name: "gruvbox".to_string(),
            user: Color::Rgb(0x83, 0xa5, 0x98),        // aqua
            assistant: Color::Rgb(0xeb, 0xdb, 0xb2),   // fg
            quote: Color::Rgb(0xfa, 0xbd, 0x2f),       // yellow
            thinking: Color::Rgb(0xd3, 0x86, 0x9b),    // purple
            error: Color::Rgb(0xfb, 0x49, 0x34),       // red
            heading: Color::Rgb(0xfe, 0x80, 0x19),     // orange
            code_inline: Color::Rgb(0xfa, 0xbd, 0x2f), // yellow
            code_block: Color::Rgb(0xb8, 0xbb, 0x26),  // green
            link: Color::Rgb(0x83, 0xa5, 0x98),        // aqua
            border: Color::Rgb(0x92, 0x83, 0x74),      // gray
            focus: Color::Rgb(0xfa, 0xbd, 0x2f),       // yellow
            edge: Color::Rgb(0x92, 0x83, 0x74),        // gray
            status_bar: Color::Rgb(0xb8, 0xbb, 0x26),  // green
            muted: Color::Rgb(0x66, 0x5c, 0x54),
            selection: Color::Rgb(0x50, 0x49, 0x45),
        }
    }
}

impl Default for Theme {
    fn default() -> Self {
        Self::auto()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_by_name_is_case_insensitive_with_fallback() {
        assert_eq!(Theme::by_name("Nord").name, "nord");
        assert_eq!(Theme::by_name("gruvbox").name, "gruvbox");
        assert_eq!(Theme::by_name("solarized").name, "auto");
    }
}
