//! Error types for the interview relay.
//!
//! The relay surfaces failures to HTTP clients as a status/message pair, so
//! every variant maps onto a status via [`InterviewError::http_status`].
//! Provider failures arrive as free-form message strings (the hosted
//! provider's error shapes are inconsistent), so classification is substring
//! matching via [`classify_provider_error`].

/// Top-level error type for the interview relay and client pipeline.
#[derive(Debug, thiserror::Error)]
pub enum InterviewError {
    /// Missing or invalid configuration (including an unresolvable API key).
    #[error("config error: {0}")]
    Config(String),

    /// Malformed or empty request body.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Provider rejected our credentials.
    #[error("auth error: {0}")]
    Auth(String),

    /// Requested model does not exist on the provider.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// Provider rate limit or quota exhaustion.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Provider failure not covered by a more specific variant.
    #[error("provider error: {0}")]
    Provider(String),

    /// Streaming response ended abnormally after it started.
    #[error("stream error: {0}")]
    Stream(String),

    /// Request was cancelled by the caller before completion.
    #[error("request aborted")]
    Aborted,

    /// History persistence error.
    #[error("history error: {0}")]
    History(String),

    /// Channel send/receive error between pipeline stages.
    #[error("channel error: {0}")]
    Channel(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl InterviewError {
    /// HTTP status the relay reports for this error.
    ///
    /// Aborted requests are benign and map to 204 (no body was produced,
    /// nothing went wrong).
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidRequest(_) => 400,
            Self::Auth(_) => 401,
            Self::ModelNotFound(_) => 404,
            Self::RateLimited(_) => 429,
            Self::Aborted => 204,
            _ => 500,
        }
    }

    /// Whether a bounded backoff retry is worthwhile.
    ///
    /// Only rate-limit-classified failures are retried; everything else
    /// propagates immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }

    /// Human-readable message shown to the interview client.
    pub fn user_message(&self) -> String {
        match self {
            Self::RateLimited(_) => "Server is busy. Please try again in 1 minute.".to_owned(),
            Self::Config(_) => "Server misconfiguration. Please contact the operator.".to_owned(),
            Self::InvalidRequest(m) => format!("Invalid request: {m}"),
            Self::Auth(_) => "Authentication with the AI provider failed.".to_owned(),
            Self::ModelNotFound(m) => format!("Model not found: {m}"),
            Self::Aborted => String::new(),
            Self::Provider(m) | Self::Stream(m) => m.clone(),
            other => format!("{other}"),
        }
    }
}

/// Classify a raw provider error message into an [`InterviewError`].
///
/// The provider does not expose structured error codes consistently, so the
/// relay matches on message substrings. The status code of a failed HTTP
/// response is folded into the message by the caller, which means a literal
/// `429` anywhere in the text classifies as a rate limit no matter which code
/// path produced it.
pub fn classify_provider_error(message: &str) -> InterviewError {
    let lower = message.to_lowercase();

    if lower.contains("429")
        || lower.contains("rate limit")
        || lower.contains("quota")
        || lower.contains("limit: 0")
    {
        return InterviewError::RateLimited(message.to_owned());
    }

    if lower.contains("401") || lower.contains("unauthorized") || lower.contains("api key") {
        return InterviewError::Auth(message.to_owned());
    }

    if lower.contains("404") || lower.contains("not found") {
        return InterviewError::ModelNotFound(message.to_owned());
    }

    InterviewError::Provider(message.to_owned())
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, InterviewError>;
