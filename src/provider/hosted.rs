//! OpenAI-compatible streaming chat client.
//!
//! Works against any server implementing the chat completions API. Requests
//! are sent with `stream: true`; the response body is an SSE stream whose
//! `data:` payloads carry JSON chunks with `choices[0].delta.content`.

use async_trait::async_trait;
use futures_util::StreamExt;
use tracing::{debug, warn};

use crate::config::ProviderConfig;
use crate::error::{InterviewError, Result, classify_provider_error};
use crate::provider::sse::{DONE_SENTINEL, DataLineParser};
use crate::provider::{ChatProvider, ChatRequest, TokenStream};

/// Streaming client for a hosted OpenAI-compatible provider.
pub struct HostedProvider {
    config: ProviderConfig,
    client: reqwest::Client,
}

impl std::fmt::Debug for HostedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostedProvider")
            .field("api_url", &self.config.api_url)
            .finish()
    }
}

impl HostedProvider {
    /// Create a client for the configured provider.
    ///
    /// The API key is not resolved here; it is read from the environment on
    /// every request so rotation takes effect without a restart.
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// Completions URL, tolerating base URLs given with or without `/v1`.
    fn completions_url(&self) -> String {
        let base = self
            .config
            .api_url
            .strip_suffix("/v1")
            .unwrap_or(&self.config.api_url);
        format!("{}/v1/chat/completions", base.trim_end_matches('/'))
    }
}

/// Extract an error message from a provider error body, falling back to the
/// raw body when it is not the usual `{"error":{"message":...}}` shape.
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(String::from)
        })
        .unwrap_or_else(|| body.to_owned())
}

/// Pull the content delta out of one SSE JSON payload.
fn delta_content(payload: &str) -> Option<String> {
    let chunk: serde_json::Value = serde_json::from_str(payload).ok()?;
    chunk["choices"][0]["delta"]["content"]
        .as_str()
        .filter(|s| !s.is_empty())
        .map(String::from)
}

#[async_trait]
impl ChatProvider for HostedProvider {
    fn name(&self) -> &str {
        "hosted"
    }

    async fn stream_reply(&self, request: &ChatRequest) -> Result<TokenStream> {
        let api_key = self.config.resolve_api_key()?;

        let messages: Vec<serde_json::Value> = request
            .messages
            .iter()
            .map(|m| {
                serde_json::json!({
                    "role": m.role.to_string(),
                    "content": m.content,
                })
            })
            .collect();

        let body = serde_json::json!({
            "model": request.model,
            "messages": messages,
            "stream": true,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });

        let url = self.completions_url();
        debug!(model = %request.model, %url, "sending streaming chat request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {api_key}"))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_provider_error(&format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            let message = extract_error_message(&body_text);
            // Fold the status into the message so substring classification
            // sees a literal "429"/"401"/"404" even for empty bodies.
            return Err(classify_provider_error(&format!(
                "HTTP {}: {message}",
                status.as_u16()
            )));
        }

        let mut byte_stream = response.bytes_stream();

        let tokens = async_stream::stream! {
            let mut parser = DataLineParser::new();

            'outer: while let Some(chunk) = byte_stream.next().await {
                let chunk = match chunk {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        warn!("provider stream read failed: {e}");
                        yield Err(InterviewError::Stream(format!("stream read failed: {e}")));
                        break;
                    }
                };

                for payload in parser.push(&chunk) {
                    if payload == DONE_SENTINEL {
                        break 'outer;
                    }
                    if let Some(content) = delta_content(&payload) {
                        yield Ok(content);
                    }
                }
            }

            if let Some(payload) = parser.flush()
                && payload != DONE_SENTINEL
                && let Some(content) = delta_content(&payload)
            {
                yield Ok(content);
            }
        };

        Ok(Box::pin(tokens))
    }
}
