// SSE (Server-Sent Events) line handling for upstream completion streams
//
// OpenAI-compatible providers stream chat completions as:
// ```
// data: {"choices":[{"delta":{"content":"Hel"}}]}
//
// data: [DONE]
// ```
//
// Network chunks do not respect line boundaries, so bytes are buffered
// until a full line is available. Only `data:` lines carry payloads;
// `event:`, `id:`, comments and blank separators are skipped.

use crate::client::decode::Utf8ChunkDecoder;

/// One meaningful SSE line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// Payload of a `data:` line (usually JSON)
    Data(String),
    /// The `data: [DONE]` terminator
    Done,
}

/// Reassembles SSE lines across arbitrary chunk boundaries
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    decoder: Utf8ChunkDecoder,
    line_buffer: String,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a network chunk; returns the events completed by it
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.line_buffer.push_str(&self.decoder.push(chunk));

        let mut events = Vec::new();
        while let Some(newline_pos) = self.line_buffer.find('\n') {
            let line: String = self.line_buffer.drain(..=newline_pos).collect();
            if let Some(event) = parse_line(&line) {
                events.push(event);
            }
        }
        events
    }

    /// Flush a final line that arrived without a trailing newline
    pub fn finish(&mut self) -> Option<SseEvent> {
        self.line_buffer.push_str(&self.decoder.finish());
        let line = std::mem::take(&mut self.line_buffer);
        parse_line(&line)
    }
}

/// Classify one SSE line
fn parse_line(line: &str) -> Option<SseEvent> {
    let data = line.trim().strip_prefix("data:")?.trim();
    match data {
        "" => None,
        "[DONE]" => Some(SseEvent::Done),
        payload => Some(SseEvent::Data(payload.to_string())),
    }
}
