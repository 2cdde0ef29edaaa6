//! Minimal Server-Sent Events parsing for provider streams.
//!
//! The chat-completions stream only ever uses `data:` lines and the
//! `[DONE]` sentinel, so this parser extracts data payloads and ignores
//! everything else (comments, event names, ids). Byte chunks may split
//! lines and UTF-8 code points arbitrarily; both are carried across pushes.

use crate::segment::Utf8Decoder;

/// Sentinel payload that terminates a stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Incremental `data:` line parser.
#[derive(Debug, Default)]
pub struct DataLineParser {
    decoder: Utf8Decoder,
    line_buffer: String,
}

impl DataLineParser {
    /// Create a new parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a chunk of bytes, returning any complete `data:` payloads.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let text = self.decoder.push(chunk);
        let mut payloads = Vec::new();

        for ch in text.chars() {
            if ch == '\n' {
                let line = std::mem::take(&mut self.line_buffer);
                if let Some(payload) = data_payload(&line) {
                    payloads.push(payload.to_owned());
                }
            } else {
                self.line_buffer.push(ch);
            }
        }

        payloads
    }

    /// Flush a trailing unterminated line at end of stream.
    pub fn flush(&mut self) -> Option<String> {
        self.line_buffer.push_str(&self.decoder.finish());
        let line = std::mem::take(&mut self.line_buffer);
        data_payload(&line).map(str::to_owned)
    }
}

/// Extract the payload of a `data:` line, or `None` for any other line.
fn data_payload(line: &str) -> Option<&str> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let value = line.strip_prefix("data:")?;
    Some(value.strip_prefix(' ').unwrap_or(value))
}
