//! LLM provider abstraction.
//!
//! All providers implement one contract: generate, declared worker
//! capacity, config validation, and health check. The built-in backends
//! all speak an OpenAI-style chat-completions API, so the shared
//! [`ChatClient`] carries the transport, retry, streaming, and progress
//! logic; provider modules supply endpoints, auth, caps, and quirks.

pub mod deepseek;
pub mod glm;
pub mod kimi;
pub mod local;
pub mod qwen;
pub mod registry;

use crate::progress::ProgressHandle;
use async_trait::async_trait;
use casecraft_shared::config::ProviderConfig;
use casecraft_shared::types::usage::TokenUsage;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub use registry::ProviderRegistry;

// ============================================================================
// ERRORS
// ============================================================================

/// Transport error taxonomy surfaced to the scheduler.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// HTTP 429 or a provider-specific throttle signal
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// HTTP 5xx, connection reset, and similar transient conditions
    #[error("transient error: {0}")]
    Transient(String),

    #[error("timeout: {0}")]
    Timeout(String),

    /// Non-retryable: HTTP 4xx other than 429, malformed response envelope
    #[error("fatal error: {0}")]
    Fatal(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("cancelled")]
    Cancelled,
}

impl ProviderError {
    /// Whether the client may retry this error with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited(_) | ProviderError::Transient(_) | ProviderError::Timeout(_)
        )
    }

    pub fn from_status(status: u16, body: &str) -> Self {
        let message = format!("HTTP {}: {}", status, truncate(body, 200));
        match status {
            429 => ProviderError::RateLimited(message),
            500..=599 => ProviderError::Transient(message),
            _ => ProviderError::Fatal(message),
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout(err.to_string())
        } else if err.is_connect() {
            ProviderError::Transient(format!("connection failed: {}", err))
        } else if let Some(status) = err.status() {
            ProviderError::from_status(status.as_u16(), &err.to_string())
        } else {
            ProviderError::Transient(err.to_string())
        }
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

// ============================================================================
// CONTRACT
// ============================================================================

/// A generation request passed to a provider.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub system_prompt: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub cancel: CancellationToken,
    pub progress: Option<Arc<ProgressHandle>>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system_prompt: None,
            temperature: None,
            max_tokens: None,
            cancel: CancellationToken::new(),
            progress: None,
        }
    }
}

/// Response from a provider.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: String,
    pub provider: String,
    pub model: String,
    pub usage: Option<TokenUsage>,
    pub finish_reason: Option<String>,
    /// Transport-level retries spent inside the client
    pub transport_retries: u32,
}

/// The uniform capability set over heterogeneous LLM backends.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    fn model(&self) -> &str;

    /// Declared worker-slot capacity for this provider.
    fn max_workers(&self) -> usize;

    fn validate_config(&self) -> Result<(), ProviderError>;

    async fn generate(&self, request: &GenerationRequest) -> Result<LlmResponse, ProviderError>;

    async fn health_check(&self) -> Result<(), ProviderError>;
}

// ============================================================================
// TOKEN ESTIMATION
// ============================================================================

/// Estimate token count when the remote does not report usage.
/// Whitespace-delimited words scaled by a language factor; the result
/// is approximate by design.
pub fn estimate_tokens(text: &str) -> u64 {
    let words = text.split_whitespace().count() as f64;
    let factor = if text.is_ascii() { 1.3 } else { 1.5 };
    (words * factor).ceil() as u64
}

// ============================================================================
// CHAT COMPLETIONS ENVELOPE
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

impl ChatUsage {
    fn into_token_usage(self) -> TokenUsage {
        TokenUsage {
            prompt_tokens: self.prompt_tokens,
            completion_tokens: self.completion_tokens,
            total_tokens: self.total_tokens,
        }
        .normalized()
    }
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

// ============================================================================
// SHARED CLIENT
// ============================================================================

const BACKOFF_BASE: Duration = Duration::from_secs(1);
const BACKOFF_CAP: Duration = Duration::from_secs(30);
const PROGRESS_TICK: Duration = Duration::from_millis(500);
/// Simulated progress reaches its 80% cap after roughly this long
const PROGRESS_RAMP_SECONDS: f64 = 60.0;

/// Shared OpenAI-style chat-completions transport used by every
/// built-in provider.
#[derive(Debug, Clone)]
pub(crate) struct ChatClient {
    http: reqwest::Client,
    provider: String,
    url: String,
    api_key: Option<String>,
    config: ProviderConfig,
    json_response_format: bool,
}

impl ChatClient {
    pub fn new(
        provider: &str,
        default_base_url: &str,
        config: &ProviderConfig,
        json_response_format: bool,
    ) -> Result<Self, ProviderError> {
        let base = config
            .base_url
            .clone()
            .unwrap_or_else(|| default_base_url.to_string());
        let url = format!("{}/chat/completions", base.trim_end_matches('/'));

        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ProviderError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            provider: provider.to_string(),
            url,
            api_key: config.api_key.clone(),
            config: config.clone(),
            json_response_format,
        })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Run one generation request, honoring the configured streaming
    /// mode, with transport retries and progress reporting.
    pub async fn execute(&self, request: &GenerationRequest) -> Result<LlmResponse, ProviderError> {
        if request.cancel.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }

        if self.config.stream {
            self.execute_streaming(request).await
        } else {
            self.execute_buffered(request).await
        }
    }

    /// Minimal round trip used to probe provider availability.
    pub async fn health_check(&self) -> Result<(), ProviderError> {
        let request = GenerationRequest {
            prompt: "Respond with 'OK' if you can process this message.".into(),
            system_prompt: None,
            temperature: Some(0.0),
            max_tokens: Some(10),
            cancel: CancellationToken::new(),
            progress: None,
        };
        let body = self.build_body(&request, false);
        let (response, _) = self.send_with_retry(&body, None, &request.cancel).await?;
        if response.choices.is_empty() {
            return Err(ProviderError::Fatal("health check returned no choices".into()));
        }
        Ok(())
    }

    fn build_body(&self, request: &GenerationRequest, stream: bool) -> serde_json::Value {
        let mut messages = Vec::new();
        if let Some(system) = &request.system_prompt {
            messages.push(ChatMessage {
                role: "system",
                content: system.as_str(),
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: request.prompt.as_str(),
        });

        let chat_request = ChatRequest {
            model: &self.config.model,
            messages,
            temperature: request.temperature.unwrap_or(self.config.temperature),
            max_tokens: request.max_tokens.unwrap_or(self.config.max_tokens),
            stream,
            response_format: self.json_response_format.then_some(ResponseFormat {
                format_type: "json_object",
            }),
        };

        serde_json::to_value(&chat_request).unwrap_or_default()
    }

    fn request_builder(&self, body: &serde_json::Value) -> reqwest::RequestBuilder {
        let mut builder = self
            .http
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(body);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }
        builder
    }

    // ------------------------------------------------------------------
    // Buffered mode with simulated progress
    // ------------------------------------------------------------------

    async fn execute_buffered(
        &self,
        request: &GenerationRequest,
    ) -> Result<LlmResponse, ProviderError> {
        let progress = request.progress.as_deref();
        if let Some(p) = progress {
            p.set_percent(0.1);
        }

        let body = self.build_body(request, false);
        let started = Instant::now();

        let send = self.send_with_retry(&body, progress, &request.cancel);
        tokio::pin!(send);

        let mut ticker = tokio::time::interval(PROGRESS_TICK);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let (response, retries) = loop {
            tokio::select! {
                result = &mut send => break result?,
                _ = ticker.tick() => {
                    if let Some(p) = progress {
                        let ratio = (started.elapsed().as_secs_f64() / PROGRESS_RAMP_SECONDS).min(1.0);
                        let simulated = 0.1 + 0.7 * (1.0 - 1.0 / (1.0 + ratio * 9.0));
                        let simulated = simulated.min(0.8) as f32;
                        if simulated > p.percent() {
                            p.set_percent(simulated);
                        }
                    }
                }
                _ = request.cancel.cancelled() => return Err(ProviderError::Cancelled),
            }
        };

        if let Some(p) = progress {
            p.set_percent(0.9);
        }

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Fatal("response contained no choices".into()))?;
        let content = choice
            .message
            .content
            .ok_or_else(|| ProviderError::Fatal("response choice had no content".into()))?;

        let usage = response
            .usage
            .map(ChatUsage::into_token_usage)
            .or_else(|| Some(self.estimated_usage(request, &content)));

        if let Some(p) = progress {
            p.set_percent(1.0);
        }

        Ok(LlmResponse {
            content,
            provider: self.provider.clone(),
            model: self.config.model.clone(),
            usage,
            finish_reason: choice.finish_reason,
            transport_retries: retries,
        })
    }

    async fn send_with_retry(
        &self,
        body: &serde_json::Value,
        progress: Option<&ProgressHandle>,
        cancel: &CancellationToken,
    ) -> Result<(ChatResponse, u32), ProviderError> {
        let mut last_error = ProviderError::Transient("request not attempted".into());

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                if let Some(p) = progress {
                    p.rollback();
                }
            }

            let outcome = tokio::select! {
                result = self.send_once(body) => result,
                _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
            };

            match outcome {
                Ok(response) => return Ok((response, attempt)),
                Err((error, retry_after)) => {
                    if !error.is_retryable() || attempt == self.config.max_retries {
                        return Err(error);
                    }
                    let delay = retry_after.unwrap_or_else(|| backoff_delay(attempt));
                    warn!(
                        provider = %self.provider,
                        attempt = attempt + 1,
                        max = self.config.max_retries + 1,
                        delay_ms = delay.as_millis() as u64,
                        "request failed, retrying: {}", error
                    );
                    last_error = error;

                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
                    }
                }
            }
        }

        Err(last_error)
    }

    /// One HTTP round trip. Returns the optional `Retry-After` delay
    /// alongside retryable errors.
    async fn send_once(
        &self,
        body: &serde_json::Value,
    ) -> Result<ChatResponse, (ProviderError, Option<Duration>)> {
        let response = self
            .request_builder(body)
            .send()
            .await
            .map_err(|e| (ProviderError::from(e), None))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            let text = response.text().await.unwrap_or_default();
            return Err((ProviderError::from_status(status.as_u16(), &text), retry_after));
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            (
                ProviderError::Fatal(format!("malformed response envelope: {}", e)),
                None,
            )
        })?;
        Ok(parsed)
    }

    // ------------------------------------------------------------------
    // Streaming mode
    // ------------------------------------------------------------------

    async fn execute_streaming(
        &self,
        request: &GenerationRequest,
    ) -> Result<LlmResponse, ProviderError> {
        let progress = request.progress.as_deref();
        let body = self.build_body(request, true);

        let response = tokio::select! {
            result = self.request_builder(&body).send() => result.map_err(ProviderError::from)?,
            _ = request.cancel.cancelled() => return Err(ProviderError::Cancelled),
        };

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), &text));
        }

        let mut stream = response.bytes_stream();
        let mut buffer = String::new();
        let mut content = String::new();
        let mut chunk_count = 0usize;
        let mut usage: Option<TokenUsage> = None;
        let mut finish_reason = None;

        loop {
            let chunk = tokio::select! {
                chunk = stream.next() => chunk,
                _ = request.cancel.cancelled() => return Err(ProviderError::Cancelled),
            };

            let Some(chunk) = chunk else { break };
            let bytes = chunk.map_err(ProviderError::from)?;
            buffer.push_str(&String::from_utf8_lossy(&bytes));

            while let Some(newline) = buffer.find('\n') {
                let line = buffer[..newline].trim().to_string();
                buffer.drain(..=newline);

                let Some(data) = line.strip_prefix("data: ") else {
                    continue;
                };
                if data == "[DONE]" {
                    buffer.clear();
                    break;
                }

                let parsed: StreamChunk = match serde_json::from_str(data) {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        debug!(provider = %self.provider, "skipping malformed SSE chunk: {}", e);
                        continue;
                    }
                };

                if let Some(chunk_usage) = parsed.usage {
                    usage = Some(chunk_usage.into_token_usage());
                }
                for choice in parsed.choices {
                    if let Some(delta) = choice.delta.content {
                        content.push_str(&delta);
                        chunk_count += 1;
                        if let Some(p) = progress {
                            let pct = 0.2 + (chunk_count as f32 / 100.0).min(0.7);
                            p.set_percent(pct);
                        }
                    }
                    if choice.finish_reason.is_some() {
                        finish_reason = choice.finish_reason;
                    }
                }
            }
        }

        if content.is_empty() {
            return Err(ProviderError::Fatal("stream produced no content".into()));
        }

        if let Some(p) = progress {
            p.set_percent(1.0);
        }

        let usage = usage.or_else(|| Some(self.estimated_usage(request, &content)));

        Ok(LlmResponse {
            content,
            provider: self.provider.clone(),
            model: self.config.model.clone(),
            usage,
            finish_reason,
            transport_retries: 0,
        })
    }

    fn estimated_usage(&self, request: &GenerationRequest, content: &str) -> TokenUsage {
        let mut prompt_text = request.prompt.clone();
        if let Some(system) = &request.system_prompt {
            prompt_text.push(' ');
            prompt_text.push_str(system);
        }
        TokenUsage::new(estimate_tokens(&prompt_text), estimate_tokens(content))
    }
}

/// Exponential backoff: 1s base, doubling per attempt, capped at 30s.
fn backoff_delay(attempt: u32) -> Duration {
    let exp = BACKOFF_BASE.as_secs().saturating_mul(1u64 << attempt.min(10));
    Duration::from_secs(exp).min(BACKOFF_CAP)
}

/// Shared config validation for hosted providers that require an API key.
fn validate_hosted_config(name: &str, config: &ProviderConfig) -> Result<(), ProviderError> {
    config.validate().map_err(ProviderError::Config)?;
    if config.api_key.as_deref().unwrap_or("").is_empty() {
        return Err(ProviderError::Config(format!(
            "provider '{}' requires an api_key",
            name
        )));
    }
    Ok(())
}
