//! Client-side interview session.
//!
//! Owns the conversation state the relay is stateless about: the ordered
//! transcript, the single in-flight request, speech de-duplication, and the
//! one history record a session leaves behind.

use std::collections::HashSet;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::consumer::consume_reply;
use crate::error::{InterviewError, Result};
use crate::history::{HistoryRecord, HistoryStore};
use crate::interview::{TIMEOUT_ANSWER, count_assistant_turns, extract_score};
use crate::provider::message::{Message, Role};
use crate::relay::ChatTurnRequest;
use crate::speech::{SpeechSink, Utterance};

/// One transcript line with a stable client-side id.
///
/// The id is what speech de-duplication keys on: a message spoken once is
/// never spoken again, no matter how often the transcript is re-rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEntry {
    /// Client-generated id, unique within the session.
    pub id: Uuid,
    /// The message itself.
    pub message: Message,
}

impl TranscriptEntry {
    fn new(message: Message) -> Self {
        Self {
            id: Uuid::new_v4(),
            message,
        }
    }
}

/// A running interview session against a relay endpoint.
pub struct InterviewSession {
    role: String,
    level: String,
    endpoint: String,
    client: reqwest::Client,
    entries: Vec<TranscriptEntry>,
    spoken: HashSet<Uuid>,
    in_flight: Option<CancellationToken>,
    store: HistoryStore,
    flush_chars: usize,
    finished: bool,
}

impl InterviewSession {
    /// Start a session for the given role/level against `endpoint`
    /// (the relay's `/api/chat` URL).
    pub fn new(
        role: impl Into<String>,
        level: impl Into<String>,
        endpoint: impl Into<String>,
        store: HistoryStore,
        flush_chars: usize,
    ) -> Self {
        Self {
            role: role.into(),
            level: level.into(),
            endpoint: endpoint.into(),
            client: reqwest::Client::new(),
            entries: Vec::new(),
            spoken: HashSet::new(),
            in_flight: None,
            store,
            flush_chars,
            finished: false,
        }
    }

    /// Transcript entries, oldest first.
    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    /// The bare message list (what goes over the wire).
    pub fn messages(&self) -> Vec<Message> {
        self.entries.iter().map(|e| e.message.clone()).collect()
    }

    /// Number of interviewer turns so far.
    pub fn question_count(&self) -> usize {
        let messages = self.messages();
        count_assistant_turns(&messages)
    }

    /// Cancel the in-flight request, if any. Aborts are benign: the partial
    /// reply stays in the transcript and no error is shown.
    pub fn cancel_in_flight(&mut self) {
        if let Some(token) = self.in_flight.take() {
            token.cancel();
        }
    }

    /// Wait for the candidate's answer, substituting the placeholder when
    /// the countdown expires.
    pub async fn answer_or_placeholder<F>(input: F, countdown: Duration) -> String
    where
        F: std::future::Future<Output = String>,
    {
        match tokio::time::timeout(countdown, input).await {
            Ok(answer) => answer,
            Err(_) => TIMEOUT_ANSWER.to_owned(),
        }
    }

    /// Submit one answer and stream the interviewer's reply.
    ///
    /// Submitting cancels any request still in flight — one logical stream
    /// per session. Network and stream failures become a visible transcript
    /// entry instead of an error return; a cancelled request stops silently.
    pub async fn submit_answer(&mut self, answer: &str, sink: &mut dyn SpeechSink) -> Result<()> {
        let answer = answer.trim();
        if answer.is_empty() {
            return Err(InterviewError::InvalidRequest(
                "answer must not be empty".to_owned(),
            ));
        }

        self.cancel_in_flight();
        let token = CancellationToken::new();
        self.in_flight = Some(token.clone());

        self.entries
            .push(TranscriptEntry::new(Message::user(answer)));

        let request = ChatTurnRequest {
            messages: self.messages(),
            role: Some(self.role.clone()),
            level: Some(self.level.clone()),
            question_count: Some(self.question_count()),
        };

        let outcome = tokio::select! {
            result = self.run_turn(&request, sink) => Some(result),
            () = token.cancelled() => None,
        };
        self.in_flight = None;

        match outcome {
            None => {
                info!("in-flight request cancelled");
                Ok(())
            }
            Some(Ok(())) | Some(Err(InterviewError::Aborted)) => Ok(()),
            Some(Err(err)) => {
                // Keep the UI alive: surface the failure in the transcript
                // rather than propagating it.
                warn!("turn failed: {err}");
                self.entries.push(TranscriptEntry::new(Message::assistant(
                    format!("Error: {}", err.user_message()),
                )));
                Ok(())
            }
        }
    }

    async fn run_turn(&mut self, request: &ChatTurnRequest, sink: &mut dyn SpeechSink) -> Result<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| InterviewError::Stream(format!("request failed: {e}")))?;

        let status = response.status();
        if status.as_u16() == 204 {
            return Err(InterviewError::Aborted);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
                .unwrap_or(body);
            return Err(InterviewError::Stream(format!(
                "server returned {}: {message}",
                status.as_u16()
            )));
        }

        let id = Uuid::new_v4();
        let text = consume_reply(response.bytes_stream(), id, self.flush_chars, sink).await?;

        self.entries.push(TranscriptEntry {
            id,
            message: Message::assistant(text),
        });
        // Spoken live, sentence by sentence, during consumption.
        self.spoken.insert(id);
        Ok(())
    }

    /// Speak any assistant messages that have not been spoken yet.
    ///
    /// Safe to call on every render: entries are de-duplicated on id, so
    /// re-rendering an unchanged transcript triggers no playback.
    pub fn speak_unspoken(&mut self, sink: &mut dyn SpeechSink) {
        for entry in &self.entries {
            if entry.message.role != Role::Assistant
                || entry.message.content.is_empty()
                || self.spoken.contains(&entry.id)
            {
                continue;
            }
            sink.speak(Utterance {
                message_id: entry.id,
                text: entry.message.content.clone(),
            });
            self.spoken.insert(entry.id);
        }
    }

    /// Close the session and persist its history record.
    ///
    /// Exactly one record per session: the first call appends and returns
    /// it, every later call returns `None`. The score comes from the final
    /// report's marker line; a session abandoned before the report is
    /// recorded with score "N/A".
    pub fn finish(&mut self) -> Result<Option<HistoryRecord>> {
        if self.finished {
            return Ok(None);
        }
        self.cancel_in_flight();

        let last_reply = self
            .entries
            .iter()
            .rev()
            .find(|e| e.message.role == Role::Assistant)
            .map(|e| e.message.content.clone())
            .unwrap_or_default();

        let record = HistoryRecord {
            id: Uuid::new_v4().to_string(),
            role: self.role.clone(),
            level: self.level.clone(),
            score: extract_score(&last_reply).unwrap_or_else(|| "N/A".to_owned()),
            date: chrono::Utc::now().to_rfc3339(),
            transcript: self.render_transcript(),
            feedback: last_reply,
        };

        self.store.append(record.clone())?;
        self.finished = true;
        info!(score = %record.score, "session recorded");
        Ok(Some(record))
    }

    fn render_transcript(&self) -> String {
        self.entries
            .iter()
            .map(|e| {
                let who = match e.message.role {
                    Role::Assistant => "AI",
                    _ => "USER",
                };
                format!("{who}: {}", e.message.content)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
