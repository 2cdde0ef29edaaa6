//! Client-side stream consumer.
//!
//! Reads the relay's byte stream incrementally, keeps a running transcript
//! of the current assistant message, and flushes completed sentences to the
//! speech sink as they arrive — the model starts "talking" after the first
//! sentence instead of after the whole reply.
//!
//! The consumer is finite (it ends when the stream closes) and not
//! restartable; each model turn gets a fresh one.

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tracing::debug;
use uuid::Uuid;

use crate::error::Result;
use crate::segment::{SentenceSplitter, Utf8Decoder};
use crate::speech::{SpeechSink, Utterance};

/// Consume one streamed assistant reply.
///
/// Appends decoded text to a cumulative transcript while routing completed
/// sentences to `sink`. Returns the full transcript once the stream closes;
/// the trailing partial sentence is flushed before returning.
pub async fn consume_reply<S, E>(
    stream: S,
    message_id: Uuid,
    flush_chars: usize,
    sink: &mut dyn SpeechSink,
) -> Result<String>
where
    S: Stream<Item = std::result::Result<Bytes, E>>,
    E: std::fmt::Display,
{
    let mut stream = std::pin::pin!(stream);
    let mut decoder = Utf8Decoder::new();
    let mut splitter = SentenceSplitter::new(flush_chars);
    let mut transcript = String::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| {
            crate::error::InterviewError::Stream(format!("response stream failed: {e}"))
        })?;

        let text = decoder.push(&chunk);
        if text.is_empty() {
            continue;
        }
        transcript.push_str(&text);

        for sentence in splitter.push(&text) {
            sink.speak(Utterance {
                message_id,
                text: sentence.text,
            });
        }
    }

    let tail = decoder.finish();
    if !tail.is_empty() {
        transcript.push_str(&tail);
        for sentence in splitter.push(&tail) {
            sink.speak(Utterance {
                message_id,
                text: sentence.text,
            });
        }
    }

    if let Some(rest) = splitter.finish() {
        sink.speak(Utterance {
            message_id,
            text: rest.text,
        });
    }

    debug!(chars = transcript.len(), "assistant reply consumed");
    Ok(transcript)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::speech::SpeechQueue;

    fn byte_stream(
        chunks: Vec<&'static str>,
    ) -> impl Stream<Item = std::result::Result<Bytes, std::io::Error>> {
        futures_util::stream::iter(chunks.into_iter().map(|c| Ok(Bytes::from_static(c.as_bytes()))))
    }

    /// Sink that records every utterance and completes it immediately.
    #[derive(Default)]
    struct RecordingSink {
        spoken: Vec<String>,
    }

    impl SpeechSink for RecordingSink {
        fn speak(&mut self, utterance: Utterance) {
            self.spoken.push(utterance.text);
        }

        fn cancel(&mut self) {}
    }

    #[tokio::test]
    async fn transcript_accumulates_all_chunks() {
        let mut sink = RecordingSink::default();
        let transcript = consume_reply(
            byte_stream(vec!["What is ", "a trait? ", "Explain briefly."]),
            Uuid::new_v4(),
            40,
            &mut sink,
        )
        .await
        .unwrap();
        assert_eq!(transcript, "What is a trait? Explain briefly.");
    }

    #[tokio::test]
    async fn sentences_are_spoken_as_they_complete() {
        let mut sink = RecordingSink::default();
        let _ = consume_reply(
            byte_stream(vec!["One. Two", ". Three"]),
            Uuid::new_v4(),
            40,
            &mut sink,
        )
        .await
        .unwrap();
        // "One." and "Two." flush mid-stream; "Three" flushes at end.
        assert_eq!(sink.spoken, vec!["One.", "Two.", "Three"]);
    }

    #[tokio::test]
    async fn punctuation_free_stream_still_speaks() {
        let mut sink = RecordingSink::default();
        let chunks = vec![
            "aaaaaaaaaaaaaaaaaaaaaaaaa",
            "bbbbbbbbbbbbbbbbbbbbbbbbb",
            "ccccc",
        ];
        let _ = consume_reply(byte_stream(chunks), Uuid::new_v4(), 40, &mut sink)
            .await
            .unwrap();
        assert!(
            sink.spoken.len() >= 2,
            "length flush plus final flush expected, got {:?}",
            sink.spoken
        );
    }

    #[tokio::test]
    async fn stream_error_is_surfaced() {
        let stream = futures_util::stream::iter(vec![
            Ok(Bytes::from_static(b"partial ")),
            Err(std::io::Error::other("connection reset")),
        ]);
        let mut sink = RecordingSink::default();
        let err = consume_reply(stream, Uuid::new_v4(), 40, &mut sink)
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::InterviewError::Stream(_)));
    }

    #[tokio::test]
    async fn utterances_carry_the_message_id() {
        let mut queue = SpeechQueue::new();
        let id = Uuid::new_v4();
        let _ = consume_reply(byte_stream(vec!["Done."]), id, 40, &mut queue)
            .await
            .unwrap();
        assert_eq!(queue.current().unwrap().message_id, id);
    }

    #[tokio::test]
    async fn split_utf8_across_chunks_survives() {
        let bytes = "Très bien. Suite".as_bytes();
        let (a, b) = bytes.split_at(3); // inside the 'è' encoding
        let stream = futures_util::stream::iter(vec![
            Ok::<_, std::io::Error>(Bytes::copy_from_slice(a)),
            Ok(Bytes::copy_from_slice(b)),
        ]);
        let mut sink = RecordingSink::default();
        let transcript = consume_reply(stream, Uuid::new_v4(), 40, &mut sink)
            .await
            .unwrap();
        assert_eq!(transcript, "Très bien. Suite");
        assert_eq!(sink.spoken[0], "Très bien.");
    }
}
