//! Speech output boundary.
//!
//! The actual synthesizer is host-runtime functionality (a platform voice
//! engine); this module owns the part that needs care regardless of engine:
//! the speech device is a singleton, so starting a new utterance must cancel
//! whatever is currently playing, and the live utterance must stay owned
//! until playback completes or the engine can drop it mid-sentence.

use uuid::Uuid;

/// One unit of text handed to the synthesizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    /// Id of the transcript message this text belongs to.
    pub message_id: Uuid,
    /// Text to speak, markdown markers already stripped.
    pub text: String,
}

/// Sink for speech-ready text.
pub trait SpeechSink: Send {
    /// Queue an utterance, cancelling any currently playing one.
    fn speak(&mut self, utterance: Utterance);

    /// Stop the current utterance without starting a new one.
    fn cancel(&mut self);
}

/// Strip markdown emphasis/heading markers before synthesis.
///
/// The model replies in markdown; asterisks and hashes read terribly when
/// spoken literally.
pub fn strip_speech_markup(text: &str) -> String {
    text.chars().filter(|c| !matches!(c, '*' | '#')).collect()
}

/// In-process speech queue.
///
/// Models the singleton speech engine: exactly one current utterance, and a
/// `speak` while one is playing cancels it. The current utterance is held by
/// value until [`complete_current`](Self::complete_current) so it cannot
/// disappear under the engine mid-playback.
#[derive(Debug, Default)]
pub struct SpeechQueue {
    current: Option<Utterance>,
    completed: Vec<Utterance>,
    cancelled: usize,
}

impl SpeechQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// The utterance currently playing, if any.
    pub fn current(&self) -> Option<&Utterance> {
        self.current.as_ref()
    }

    /// Utterances that played to completion, in order.
    pub fn completed(&self) -> &[Utterance] {
        &self.completed
    }

    /// Number of utterances cut off by a newer one (or an explicit cancel).
    pub fn cancelled_count(&self) -> usize {
        self.cancelled
    }

    /// Mark the current utterance as played to completion.
    pub fn complete_current(&mut self) {
        if let Some(done) = self.current.take() {
            self.completed.push(done);
        }
    }

    /// Total utterances that were ever started.
    pub fn started_count(&self) -> usize {
        self.completed.len() + self.cancelled + usize::from(self.current.is_some())
    }
}

impl SpeechSink for SpeechQueue {
    fn speak(&mut self, utterance: Utterance) {
        if self.current.take().is_some() {
            self.cancelled += 1;
        }
        self.current = Some(Utterance {
            message_id: utterance.message_id,
            text: strip_speech_markup(&utterance.text),
        });
    }

    fn cancel(&mut self) {
        if self.current.take().is_some() {
            self.cancelled += 1;
        }
    }
}
