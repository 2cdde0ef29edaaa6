//! Incremental sentence segmentation for streaming speech.
//!
//! Model output arrives as small text fragments. Waiting for the whole reply
//! before synthesizing speech would add seconds of dead air, so the splitter
//! emits each sentence as soon as its terminal punctuation arrives, with a
//! length-threshold fallback that bounds latency when the model produces no
//! punctuation at all.

/// A sentence accumulated from streamed fragments, ready for speech.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentenceChunk {
    /// Sentence text, trimmed.
    pub text: String,
    /// Whether this is the last chunk of the reply.
    pub is_final: bool,
}

/// Incremental UTF-8 decoder for byte streams.
///
/// Network chunks can split a multi-byte code point; the decoder carries the
/// incomplete tail bytes into the next chunk instead of mangling them.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    carry: Vec<u8>,
}

impl Utf8Decoder {
    /// Create a new decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one byte chunk and return the decoded complete prefix.
    pub fn push(&mut self, chunk: &[u8]) -> String {
        self.carry.extend_from_slice(chunk);

        let mut out = String::new();
        loop {
            match std::str::from_utf8(&self.carry) {
                Ok(valid) => {
                    out.push_str(valid);
                    self.carry.clear();
                    break;
                }
                Err(e) => {
                    let valid_len = e.valid_up_to();
                    if let Ok(valid) = std::str::from_utf8(&self.carry[..valid_len]) {
                        out.push_str(valid);
                    }
                    match e.error_len() {
                        // Truly invalid bytes: replace and keep going.
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.carry.drain(..valid_len + bad);
                        }
                        // Incomplete tail: hold it for the next chunk.
                        None => {
                            self.carry.drain(..valid_len);
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    /// Flush any held bytes at end of stream (lossy).
    pub fn finish(&mut self) -> String {
        let tail = std::mem::take(&mut self.carry);
        String::from_utf8_lossy(&tail).into_owned()
    }
}

/// Find the byte index of a sentence-ending character (`.`, `!`, `?`, `\n`).
///
/// Punctuation only counts as a boundary when followed by a space, a
/// newline, or end of text, so decimal points and version numbers do not
/// split mid-sentence.
fn find_sentence_boundary(text: &str) -> Option<usize> {
    for (i, c) in text.char_indices() {
        if c == '\n' {
            return Some(i);
        }
        if matches!(c, '.' | '!' | '?') {
            let rest = &text[i + c.len_utf8()..];
            if rest.is_empty() || rest.starts_with(' ') || rest.starts_with('\n') {
                return Some(i);
            }
        }
    }
    None
}

/// Streaming sentence splitter.
///
/// Feed decoded fragments with [`push`](Self::push); completed sentences come
/// back immediately. Call [`finish`](Self::finish) after the stream closes to
/// flush the partial tail.
#[derive(Debug)]
pub struct SentenceSplitter {
    buffer: String,
    flush_chars: usize,
}

impl SentenceSplitter {
    /// Create a splitter with the given length-flush threshold (chars).
    pub fn new(flush_chars: usize) -> Self {
        Self {
            buffer: String::new(),
            flush_chars,
        }
    }

    /// Append a fragment and return any sentences completed by it.
    ///
    /// A fragment can complete several sentences at once (the provider may
    /// batch tokens), so this returns a vec. When the buffer grows past the
    /// length threshold with no boundary in sight, the whole buffer is
    /// flushed as one chunk — the guarantee that a punctuation-free reply
    /// still starts speaking after a bounded delay.
    pub fn push(&mut self, fragment: &str) -> Vec<SentenceChunk> {
        if fragment.is_empty() {
            return Vec::new();
        }
        self.buffer.push_str(fragment);

        let mut chunks = Vec::new();
        while let Some(pos) = find_sentence_boundary(&self.buffer) {
            let sentence = self.buffer[..=pos].trim().to_owned();
            self.buffer = self.buffer[pos + 1..].to_owned();
            if !sentence.is_empty() {
                chunks.push(SentenceChunk {
                    text: sentence,
                    is_final: false,
                });
            }
        }

        if self.buffer.chars().count() > self.flush_chars {
            let text = std::mem::take(&mut self.buffer).trim().to_owned();
            if !text.is_empty() {
                chunks.push(SentenceChunk {
                    text,
                    is_final: false,
                });
            }
        }

        chunks
    }

    /// Flush the remaining partial sentence, if any, as the final chunk.
    pub fn finish(&mut self) -> Option<SentenceChunk> {
        let text = std::mem::take(&mut self.buffer).trim().to_owned();
        if text.is_empty() {
            return None;
        }
        Some(SentenceChunk {
            text,
            is_final: true,
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    // ── Utf8Decoder ───────────────────────────────────────────

    #[test]
    fn decoder_passes_ascii() {
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.push(b"hello"), "hello");
        assert_eq!(decoder.finish(), "");
    }

    #[test]
    fn decoder_carries_split_code_point() {
        let mut decoder = Utf8Decoder::new();
        let bytes = "héllo".as_bytes();
        // 'é' is two bytes; split in the middle of it.
        let out1 = decoder.push(&bytes[..2]);
        let out2 = decoder.push(&bytes[2..]);
        assert_eq!(format!("{out1}{out2}"), "héllo");
    }

    #[test]
    fn decoder_replaces_invalid_bytes() {
        let mut decoder = Utf8Decoder::new();
        let out = decoder.push(&[b'a', 0xFF, b'b']);
        assert_eq!(out, "a\u{FFFD}b");
    }

    #[test]
    fn decoder_finish_flushes_incomplete_tail() {
        let mut decoder = Utf8Decoder::new();
        let bytes = "é".as_bytes();
        assert_eq!(decoder.push(&bytes[..1]), "");
        assert!(!decoder.finish().is_empty());
    }

    // ── SentenceSplitter ──────────────────────────────────────

    #[test]
    fn splits_on_terminal_punctuation() {
        let mut splitter = SentenceSplitter::new(40);
        let chunks = splitter.push("First sentence. Second part");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "First sentence.");
        assert!(!chunks[0].is_final);
    }

    #[test]
    fn splits_on_question_and_exclamation() {
        let mut splitter = SentenceSplitter::new(40);
        let chunks = splitter.push("Really? Yes! Next");
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "Really?");
        assert_eq!(chunks[1].text, "Yes!");
    }

    #[test]
    fn sentence_can_span_many_fragments() {
        let mut splitter = SentenceSplitter::new(40);
        assert!(splitter.push("What is").is_empty());
        assert!(splitter.push(" a borrow").is_empty());
        let chunks = splitter.push(" checker? Now");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "What is a borrow checker?");
    }

    #[test]
    fn decimal_point_does_not_split() {
        let mut splitter = SentenceSplitter::new(80);
        assert!(splitter.push("Rust 1.75 added it").is_empty());
    }

    #[test]
    fn length_threshold_flushes_without_punctuation() {
        let mut splitter = SentenceSplitter::new(40);
        let mut emitted = Vec::new();
        // 50 chars of punctuation-free text, fed in small fragments.
        for fragment in ["aaaaaaaaaa"; 5] {
            emitted.extend(splitter.push(fragment));
        }
        assert!(
            !emitted.is_empty(),
            "flush must fire at least once for input past the threshold"
        );
    }

    #[test]
    fn finish_flushes_partial_tail() {
        let mut splitter = SentenceSplitter::new(40);
        assert!(splitter.push("trailing words").is_empty());
        let tail = splitter.finish().unwrap();
        assert_eq!(tail.text, "trailing words");
        assert!(tail.is_final);
    }

    #[test]
    fn finish_on_empty_buffer_is_none() {
        let mut splitter = SentenceSplitter::new(40);
        let _ = splitter.push("Done.");
        assert!(splitter.finish().is_none());
    }

    #[test]
    fn newline_is_a_boundary() {
        let mut splitter = SentenceSplitter::new(40);
        let chunks = splitter.push("- point one\n- point two");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "- point one");
    }
}
