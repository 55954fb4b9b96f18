//! Text completion boundary.
//!
//! Page writing lives outside this workspace; it only needs a way to turn a
//! prompt into text. [`CompletionProvider`] is that seam, and
//! [`HttpCompletionProvider`] talks to an OpenAI-compatible
//! `POST /chat/completions` endpoint.

use crate::config::CompletionConfig;
use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};

/// Temperature sent when the caller asks for 0.
pub const FALLBACK_TEMPERATURE: f32 = 0.7;
/// Default completion length cap.
pub const DEFAULT_MAX_TOKENS: u32 = 20480;

/// Trait for services that complete a prompt
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Complete `prompt`, returning the generated text with surrounding
    /// whitespace removed
    async fn generate(&self, prompt: &str, temperature: f32, max_tokens: u32) -> Result<String>;

    /// Get the name/identifier of this provider
    fn provider_name(&self) -> &str;
}

/// Chat completion client for OpenAI-compatible endpoints
#[derive(Clone)]
pub struct HttpCompletionProvider {
    config: CompletionConfig,
    client: reqwest::Client,
    endpoint: String,
}

impl std::fmt::Debug for HttpCompletionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpCompletionProvider")
            .field("config", &self.config)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl HttpCompletionProvider {
    /// Creates a client after validating `config`.
    pub fn new(config: CompletionConfig) -> Result<Self> {
        config.validate()?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let api_key = config.api_key.trim();
        if !api_key.is_empty() {
            let mut auth = HeaderValue::from_str(&format!("Bearer {api_key}")).map_err(|_| {
                GatewayError::invalid_config("API key contains characters not allowed in a header")
            })?;
            auth.set_sensitive(true);
            headers.insert(AUTHORIZATION, auth);
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()
            .map_err(GatewayError::transport)?;
        let endpoint = config.endpoint();
        Ok(Self {
            config,
            client,
            endpoint,
        })
    }
}

/// A zero temperature means "unset" to callers of this boundary.
fn effective_temperature(temperature: f32) -> f32 {
    if temperature == 0.0 {
        FALLBACK_TEMPERATURE
    } else {
        temperature
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[async_trait]
impl CompletionProvider for HttpCompletionProvider {
    async fn generate(&self, prompt: &str, temperature: f32, max_tokens: u32) -> Result<String> {
        let temperature = effective_temperature(temperature);
        let request = ChatRequest {
            model: &self.config.model_name,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &self.config.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature,
            max_tokens,
        };

        tracing::info!(
            "Completion request: model={} max_tokens={} temperature={}",
            self.config.model_name,
            max_tokens,
            temperature
        );
        let timeout = self.config.timeout;
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| GatewayError::from_reqwest(e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(GatewayError::from_status(status, body));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::from_reqwest(e, timeout))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| GatewayError::malformed("completion response has no content"))?;

        let content = content.trim().to_string();
        tracing::info!("Completion response: {} characters", content.len());
        Ok(content)
    }

    fn provider_name(&self) -> &str {
        "openai-compatible"
    }
}
