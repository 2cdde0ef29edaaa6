//! Hosted model provider client.
//!
//! The relay talks to the provider through the [`ChatProvider`] trait so the
//! endpoint logic can be exercised against a scripted provider in tests. The
//! real implementation is [`hosted::HostedProvider`], an OpenAI-compatible
//! chat-completions client with SSE streaming.

pub mod hosted;
pub mod message;
pub mod sse;

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;

use crate::error::Result;
use message::Message;

/// A boxed async stream of decoded model text fragments.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// One streaming chat request to the provider.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Model id to request.
    pub model: String,
    /// Conversation to forward (system prompt first, already truncated).
    pub messages: Vec<Message>,
    /// Maximum tokens to generate.
    pub max_tokens: usize,
    /// Sampling temperature.
    pub temperature: f64,
}

/// Trait for hosted chat model backends.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Provider name for logging.
    fn name(&self) -> &str;

    /// Start a streaming reply for the given request.
    ///
    /// Errors returned here happened before any output was produced and are
    /// classified into the relay's status taxonomy. Errors inside the
    /// returned stream terminate the reply mid-flight.
    async fn stream_reply(&self, request: &ChatRequest) -> Result<TokenStream>;
}
