//! Quoted excerpts and parent transcripts
//!
//! Text selected in one node becomes the quoted context of a new child.
//! Parent conversations are flattened to plain text when a child asks its
//! own question, so the model sees where the branch came from.

use super::Message;
use crate::util::ellipsize;

/// Maximum length of a quoted excerpt, in characters (ellipsis included)
pub const MAX_QUOTE_CHARS: usize = 240;

/// Reduce a user selection to a short quote
///
/// Keeps the first two non-blank lines (trimmed), joins them with a single
/// space, and caps the result at [`MAX_QUOTE_CHARS`] with a trailing `...`.
pub fn truncate_selection(text: &str) -> String {
    let joined = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .take(2)
        .collect::<Vec<_>>()
        .join(" ");

    ellipsize(&joined, MAX_QUOTE_CHARS)
}

/// Flatten a conversation into `role: content` paragraphs
pub fn transcript(conversation: &[Message]) -> String {
    conversation
        .iter()
        .map(|m| format!("{}: {}", m.role.as_str(), m.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}
