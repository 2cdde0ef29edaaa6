//! Intervox: streaming mock-interview relay.
//!
//! A conversation flows through three small pieces:
//! - **relay** — HTTP endpoint that picks the interviewer prompt from the
//!   conversation phase and streams the hosted model's reply back as raw
//!   text chunks, with provider failures classified into HTTP statuses
//! - **consumer** — client-side reader that turns the byte stream into a
//!   transcript and speech-ready sentences as they complete
//! - **interview** — the pure phase selector deciding question vs. final
//!   scored report
//!
//! Everything provider-specific sits behind [`provider::ChatProvider`];
//! everything speech-engine-specific sits behind [`speech::SpeechSink`].

pub mod config;
pub mod consumer;
pub mod error;
pub mod history;
pub mod interview;
pub mod provider;
pub mod relay;
pub mod segment;
pub mod session;
pub mod speech;

pub use config::Config;
pub use error::{InterviewError, Result};
pub use interview::{Phase, PhasePlan, select_phase};
pub use relay::{RelayServer, RelayState};
pub use segment::{SentenceChunk, SentenceSplitter};
pub use session::InterviewSession;
