//! System clipboard access for copying replies
//!
//! A fresh `arboard::Clipboard` is opened per copy.

use anyhow::{Context, Result};
use arboard::Clipboard;

/// Copy `text` to the system clipboard
///
/// Fails on headless machines with no display server.
pub fn copy_to_clipboard(text: &str) -> Result<()> {
    Clipboard::new()
        .context("Clipboard unavailable")?
        .set_text(text)
        .context("Failed to write to clipboard")
}
