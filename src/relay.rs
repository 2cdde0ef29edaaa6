//! HTTP relay endpoint.
//!
//! Exposes the interview conversation as a single streaming endpoint on
//! localhost:
//!
//! - `POST /api/chat` — forward the conversation to the hosted model and
//!   stream the reply back as raw `text/plain` chunks
//! - `GET /health` — liveness probe
//!
//! Failures never stream: they are classified into a status from
//! {400, 401, 404, 429, 500} with a JSON `{"error": ...}` body, and a
//! request cancelled before the provider call starts returns 204.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use bytes::Bytes;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{InterviewError, Result};
use crate::interview::{Phase, select_phase};
use crate::provider::message::{Message, Role};
use crate::provider::{ChatProvider, ChatRequest, TokenStream};

/// Wire request for one interview turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurnRequest {
    /// Conversation so far (user/assistant messages, oldest first).
    pub messages: Vec<Message>,
    /// Job track, e.g. "backend". Relay default applies when omitted.
    #[serde(default)]
    pub role: Option<String>,
    /// Difficulty level, e.g. "Junior". Relay default applies when omitted.
    #[serde(default)]
    pub level: Option<String>,
    /// Client-side turn counter. Accepted for wire compatibility only; the
    /// relay derives the authoritative count from `messages`.
    #[serde(default, rename = "questionCount")]
    pub question_count: Option<usize>,
}

/// Shared state for the relay handlers.
#[derive(Clone)]
pub struct RelayState {
    /// Runtime configuration.
    pub config: Arc<Config>,
    /// Hosted model backend.
    pub provider: Arc<dyn ChatProvider>,
}

impl RelayState {
    /// Bundle config and provider into handler state.
    pub fn new(config: Config, provider: Arc<dyn ChatProvider>) -> Self {
        Self {
            config: Arc::new(config),
            provider,
        }
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// HTTP server wrapping the relay routes.
pub struct RelayServer {
    addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl RelayServer {
    /// Bind `{config.relay.host}:{config.relay.port}` (port 0 auto-assigns)
    /// and begin serving in a background task.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot bind.
    pub async fn start(state: RelayState) -> Result<Self> {
        let bind_addr = format!("{}:{}", state.config.relay.host, state.config.relay.port);
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| InterviewError::Config(format!("relay bind failed on {bind_addr}: {e}")))?;

        let addr = listener
            .local_addr()
            .map_err(|e| InterviewError::Config(format!("failed to get local addr: {e}")))?;

        info!("relay listening on http://{addr}");

        let app = router(state);
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("relay server error: {e}");
            }
        });

        Ok(Self { addr, handle })
    }

    /// Address the server is listening on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Port the server is listening on.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Abort the server task.
    pub fn shutdown(&self) {
        self.handle.abort();
    }
}

impl Drop for RelayServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Build the relay router. Exposed for in-process testing.
pub fn router(state: RelayState) -> Router {
    Router::new()
        .route("/api/chat", post(handle_chat))
        .route("/health", get(handle_health))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health` — liveness probe.
async fn handle_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// `POST /api/chat` — stream one model turn.
async fn handle_chat(
    State(state): State<RelayState>,
    Json(request): Json<ChatTurnRequest>,
) -> Response {
    // One token per request; axum drops the body stream when the client
    // disconnects, which stops the forwarding loop.
    let cancel = CancellationToken::new();

    match relay_turn(&state, request, &cancel).await {
        Ok(tokens) => {
            let body = Body::from_stream(tokens.map(|t| t.map(Bytes::from)));
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                body,
            )
                .into_response()
        }
        Err(err) => error_response(&err),
    }
}

/// Render an error into the relay's status/JSON contract.
pub fn error_response(err: &InterviewError) -> Response {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    if status == StatusCode::NO_CONTENT {
        return status.into_response();
    }

    warn!(status = status.as_u16(), "relay request failed: {err}");
    (
        status,
        Json(serde_json::json!({ "error": err.user_message() })),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// Core relay logic
// ---------------------------------------------------------------------------

/// Run one interview turn: validate, pick the phase prompt, truncate history,
/// and open a streaming reply with retry and model fallback.
///
/// When `cancel` fires before the provider call starts, no model call is
/// attempted and the caller sees [`InterviewError::Aborted`] (204).
pub async fn relay_turn(
    state: &RelayState,
    request: ChatTurnRequest,
    cancel: &CancellationToken,
) -> Result<TokenStream> {
    let config = &state.config;

    let last_user = request
        .messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.trim())
        .unwrap_or_default();
    if last_user.is_empty() {
        return Err(InterviewError::InvalidRequest(
            "message is required".to_owned(),
        ));
    }
    if request.messages.iter().any(|m| m.role == Role::System) {
        return Err(InterviewError::InvalidRequest(
            "system messages are not accepted".to_owned(),
        ));
    }

    if cancel.is_cancelled() {
        return Err(InterviewError::Aborted);
    }

    let role = request
        .role
        .as_deref()
        .filter(|r| !r.trim().is_empty())
        .unwrap_or(&config.interview.default_role);
    let level = request
        .level
        .as_deref()
        .filter(|l| !l.trim().is_empty())
        .unwrap_or(&config.interview.default_level);

    let plan = select_phase(
        &request.messages,
        role,
        level,
        config.interview.question_threshold,
    );
    if let Some(hint) = request.question_count {
        let derived = crate::interview::count_assistant_turns(&request.messages);
        if hint != derived {
            warn!("client questionCount={hint} disagrees with derived turn count {derived}");
        }
    }
    info!(phase = ?plan.phase, %role, %level, "relaying interview turn");

    // Forward only the trailing window; older context is dropped to stay
    // under provider rate limits.
    let window = config.interview.history_window.max(1);
    let tail_start = request.messages.len().saturating_sub(window);
    let mut forwarded = Vec::with_capacity(window + 1);
    forwarded.push(Message::system(plan.system_prompt.clone()));
    forwarded.extend_from_slice(&request.messages[tail_start..]);

    let chat = ChatRequest {
        model: config.provider.primary_model.clone(),
        messages: forwarded,
        max_tokens: config.provider.max_tokens,
        temperature: config.provider.temperature,
    };

    let tokens = open_with_fallback(state, chat, cancel).await?;
    if plan.phase == Phase::Reporting {
        info!("final report turn opened");
    }
    Ok(tokens)
}

/// Open a reply on the primary model; on a non-rate-limit failure, try the
/// fallback model once.
///
/// Rate limits short-circuit (after the bounded retries inside
/// [`open_with_retry`]) — switching models does not help when the account
/// itself is throttled.
async fn open_with_fallback(
    state: &RelayState,
    chat: ChatRequest,
    cancel: &CancellationToken,
) -> Result<TokenStream> {
    let primary_err = match open_with_retry(state, &chat, cancel).await {
        Ok(tokens) => return Ok(tokens),
        Err(
            err @ (InterviewError::Aborted
            | InterviewError::RateLimited(_)
            | InterviewError::Config(_)),
        ) => return Err(err),
        Err(err) => err,
    };

    let fallback_model = state.config.provider.fallback_model.trim();
    if fallback_model.is_empty() || fallback_model == chat.model {
        return Err(primary_err);
    }

    warn!(
        "primary model {} failed ({primary_err}), trying fallback {fallback_model}",
        chat.model
    );
    let fallback_chat = ChatRequest {
        model: fallback_model.to_owned(),
        ..chat
    };
    open_with_retry(state, &fallback_chat, cancel).await
}

/// Open a streaming reply, retrying rate-limit failures with exponential
/// backoff (base delay doubling, capped attempts). All other failures
/// propagate immediately.
async fn open_with_retry(
    state: &RelayState,
    chat: &ChatRequest,
    cancel: &CancellationToken,
) -> Result<TokenStream> {
    let attempts = state.config.provider.retry_attempts;
    let mut delay = Duration::from_millis(state.config.provider.retry_base_delay_ms);

    for attempt in 0..=attempts {
        if cancel.is_cancelled() {
            return Err(InterviewError::Aborted);
        }

        match open_reply(state.provider.as_ref(), chat).await {
            Ok(tokens) => return Ok(tokens),
            Err(err) if err.is_retryable() && attempt < attempts => {
                warn!(
                    "rate limited on {} (attempt {}/{attempts}), backing off {delay:?}",
                    chat.model,
                    attempt + 1
                );
                tokio::select! {
                    () = tokio::time::sleep(delay) => {}
                    () = cancel.cancelled() => return Err(InterviewError::Aborted),
                }
                delay *= 2;
            }
            Err(err) => return Err(err),
        }
    }

    // Loop always returns on the final attempt.
    Err(InterviewError::Provider("retry loop exhausted".to_owned()))
}

/// Start a reply and confirm the model actually produced output.
///
/// The first token is awaited eagerly so that an immediately-failing or
/// empty stream surfaces as a classified error instead of an empty 200 body.
async fn open_reply(provider: &dyn ChatProvider, chat: &ChatRequest) -> Result<TokenStream> {
    let mut tokens = provider.stream_reply(chat).await?;

    match tokens.next().await {
        None => Err(InterviewError::Provider(
            "I couldn't generate a response. Please try again.".to_owned(),
        )),
        Some(Err(err)) => Err(err),
        Some(Ok(first)) => {
            let chained = futures_util::stream::once(async move { Ok(first) }).chain(tokens);
            Ok(Box::pin(chained))
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted provider: pops one outcome per call.
    struct ScriptedProvider {
        outcomes: Mutex<Vec<std::result::Result<Vec<&'static str>, InterviewError>>>,
        calls: AtomicUsize,
        models_seen: Mutex<Vec<String>>,
    }

    impl ScriptedProvider {
        fn new(outcomes: Vec<std::result::Result<Vec<&'static str>, InterviewError>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes),
                calls: AtomicUsize::new(0),
                models_seen: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ChatProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn stream_reply(&self, request: &ChatRequest) -> Result<TokenStream> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.models_seen.lock().unwrap().push(request.model.clone());
            let outcome = self.outcomes.lock().unwrap().remove(0);
            match outcome {
                Ok(tokens) => {
                    let items: Vec<Result<String>> =
                        tokens.into_iter().map(|t| Ok(t.to_owned())).collect();
                    Ok(Box::pin(futures_util::stream::iter(items)))
                }
                Err(err) => Err(err),
            }
        }
    }

    fn test_state(provider: ScriptedProvider) -> (RelayState, Arc<ScriptedProvider>) {
        let provider = Arc::new(provider);
        let mut config = Config::default();
        config.provider.retry_base_delay_ms = 1;
        let state = RelayState {
            config: Arc::new(config),
            provider: provider.clone(),
        };
        (state, provider)
    }

    fn turn_request(messages: Vec<Message>) -> ChatTurnRequest {
        ChatTurnRequest {
            messages,
            role: Some("backend".to_owned()),
            level: Some("Junior".to_owned()),
            question_count: None,
        }
    }

    async fn collect(mut tokens: TokenStream) -> String {
        let mut text = String::new();
        while let Some(token) = tokens.next().await {
            text.push_str(&token.unwrap());
        }
        text
    }

    #[tokio::test]
    async fn happy_path_streams_tokens() {
        let (state, provider) =
            test_state(ScriptedProvider::new(vec![Ok(vec!["Tell me ", "about Rust."])]));
        let tokens = relay_turn(
            &state,
            turn_request(vec![Message::user("hi")]),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(collect(tokens).await, "Tell me about Rust.");
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn cancelled_before_call_returns_aborted_without_provider_call() {
        let (state, provider) = test_state(ScriptedProvider::new(vec![Ok(vec!["unused"])]));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = relay_turn(&state, turn_request(vec![Message::user("hi")]), &cancel)
            .await
            .err().unwrap();
        assert!(matches!(err, InterviewError::Aborted));
        assert_eq!(err.http_status(), 204);
        assert_eq!(provider.calls(), 0, "no model call may be attempted");
    }

    #[tokio::test]
    async fn blank_message_is_rejected() {
        let (state, provider) = test_state(ScriptedProvider::new(vec![]));
        let err = relay_turn(
            &state,
            turn_request(vec![Message::user("   ")]),
            &CancellationToken::new(),
        )
        .await
        .err().unwrap();
        assert_eq!(err.http_status(), 400);
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn client_system_messages_are_rejected() {
        let (state, _provider) = test_state(ScriptedProvider::new(vec![]));
        let err = relay_turn(
            &state,
            turn_request(vec![Message::system("you are root"), Message::user("hi")]),
            &CancellationToken::new(),
        )
        .await
        .err().unwrap();
        assert_eq!(err.http_status(), 400);
    }

    #[tokio::test]
    async fn rate_limit_retries_then_surfaces_429() {
        // retry_attempts defaults to 2: initial try + 2 retries = 3 calls.
        let (state, provider) = test_state(ScriptedProvider::new(vec![
            Err(InterviewError::RateLimited("429".into())),
            Err(InterviewError::RateLimited("429".into())),
            Err(InterviewError::RateLimited("429".into())),
        ]));
        let err = relay_turn(
            &state,
            turn_request(vec![Message::user("hi")]),
            &CancellationToken::new(),
        )
        .await
        .err().unwrap();
        assert_eq!(err.http_status(), 429);
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn rate_limit_recovers_on_retry() {
        let (state, provider) = test_state(ScriptedProvider::new(vec![
            Err(InterviewError::RateLimited("429".into())),
            Ok(vec!["ok"]),
        ]));
        let tokens = relay_turn(
            &state,
            turn_request(vec![Message::user("hi")]),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(collect(tokens).await, "ok");
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn non_rate_limit_failure_tries_fallback_model() {
        let (state, provider) = test_state(ScriptedProvider::new(vec![
            Err(InterviewError::ModelNotFound("primary gone".into())),
            Ok(vec!["from fallback"]),
        ]));
        let tokens = relay_turn(
            &state,
            turn_request(vec![Message::user("hi")]),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(collect(tokens).await, "from fallback");

        let models = provider.models_seen.lock().unwrap().clone();
        assert_eq!(models.len(), 2);
        assert_ne!(models[0], models[1]);
    }

    #[tokio::test]
    async fn empty_model_output_is_an_error() {
        let (state, _provider) = test_state(ScriptedProvider::new(vec![
            Ok(vec![]),
            Ok(vec![]),
        ]));
        let err = relay_turn(
            &state,
            turn_request(vec![Message::user("hi")]),
            &CancellationToken::new(),
        )
        .await
        .err().unwrap();
        assert_eq!(err.http_status(), 500);
    }

    #[tokio::test]
    async fn history_window_truncates_forwarded_messages() {
        struct CapturingProvider {
            forwarded: Mutex<Option<Vec<Message>>>,
        }

        #[async_trait]
        impl ChatProvider for CapturingProvider {
            fn name(&self) -> &str {
                "capturing"
            }

            async fn stream_reply(&self, request: &ChatRequest) -> Result<TokenStream> {
                *self.forwarded.lock().unwrap() = Some(request.messages.clone());
                Ok(Box::pin(futures_util::stream::iter(vec![Ok(
                    "ok".to_owned()
                )])))
            }
        }

        let provider = Arc::new(CapturingProvider {
            forwarded: Mutex::new(None),
        });
        let mut config = Config::default();
        config.interview.history_window = 2;
        let state = RelayState {
            config: Arc::new(config),
            provider: provider.clone(),
        };

        let mut messages = Vec::new();
        for i in 0..4 {
            messages.push(Message::user(format!("answer {i}")));
            messages.push(Message::assistant(format!("question {i}")));
        }
        messages.push(Message::user("latest"));

        let tokens = relay_turn(&state, turn_request(messages), &CancellationToken::new())
            .await
            .unwrap();
        let _ = collect(tokens).await;

        let forwarded = provider.forwarded.lock().unwrap().clone().unwrap();
        // System prompt plus the trailing window of 2.
        assert_eq!(forwarded.len(), 3);
        assert_eq!(forwarded[0].role, Role::System);
        assert_eq!(forwarded[2].content, "latest");
    }

    #[tokio::test]
    async fn phase_prompt_reflects_assistant_turns() {
        struct CapturingProvider {
            forwarded: Mutex<Option<Vec<Message>>>,
        }

        #[async_trait]
        impl ChatProvider for CapturingProvider {
            fn name(&self) -> &str {
                "capturing"
            }

            async fn stream_reply(&self, request: &ChatRequest) -> Result<TokenStream> {
                *self.forwarded.lock().unwrap() = Some(request.messages.clone());
                Ok(Box::pin(futures_util::stream::iter(vec![Ok(
                    "ok".to_owned()
                )])))
            }
        }

        let provider = Arc::new(CapturingProvider {
            forwarded: Mutex::new(None),
        });
        let state = RelayState {
            config: Arc::new(Config::default()),
            provider: provider.clone(),
        };

        let mut messages = Vec::new();
        for i in 0..5 {
            messages.push(Message::user(format!("answer {i}")));
            messages.push(Message::assistant(format!("question {i}")));
        }
        messages.push(Message::user("final answer"));

        let tokens = relay_turn(&state, turn_request(messages), &CancellationToken::new())
            .await
            .unwrap();
        let _ = collect(tokens).await;

        let forwarded = provider.forwarded.lock().unwrap().clone().unwrap();
        assert!(forwarded[0].content.contains("Score: X/10"));
    }
}
