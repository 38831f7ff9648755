//! Shared utility functions

/// Truncate a string to at most `max_chars` Unicode scalar values.
///
/// Returns the input unchanged when it is already short enough. The cut
/// always lands on a character boundary, so multi-byte text is never split.
///
/// ```ignore
/// assert_eq!(truncate_chars("hello world", 5), "hello");
/// assert_eq!(truncate_chars("日本語", 2), "日本");
/// ```
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((end, _)) => &s[..end],
        None => s,
    }
}

/// Truncate to `max_chars` characters, replacing the tail with `...` when cut.
///
/// The result never exceeds `max_chars` characters (ellipsis included).
pub fn ellipsize(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let keep = max_chars.saturating_sub(3);
    format!("{}...", truncate_chars(s, keep))
}
