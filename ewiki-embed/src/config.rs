//! Configuration for the embedding and completion gateways

use crate::error::{GatewayError, Result};
use derive_builder::Builder;
use std::time::Duration;

/// OpenAI-compatible endpoint used when none is configured.
pub const DEFAULT_BASE_URL: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1";
/// Embedding model used when none is configured.
pub const DEFAULT_EMBED_MODEL: &str = "text-embedding-v3";
/// Chat model used when none is configured.
pub const DEFAULT_COMPLETION_MODEL: &str = "qwen-plus";
/// Requested embedding dimensionality.
pub const DEFAULT_DIMENSIONS: usize = 768;
/// Texts longer than this many characters are cut before submission.
pub const DEFAULT_MAX_INPUT_CHARS: usize = 8192;
/// Largest batch a single embedding call accepts.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 64;
/// Per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// System prompt sent ahead of every completion request.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an expert technical writer and software architect, capable of completing tasks in full according to user requirements.";

const REDACTED: &str = "[REDACTED]";

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() { "" } else { REDACTED }
}

/// Configuration for an OpenAI-compatible embedding endpoint
#[derive(Clone, Builder)]
#[builder(setter(into))]
pub struct EmbedConfig {
    /// Base URL of the service; `/embeddings` is appended
    #[builder(default = "DEFAULT_BASE_URL.to_string()")]
    pub base_url: String,
    /// Bearer token sent with every request
    #[builder(default)]
    pub api_key: String,
    /// Name of the embedding model to use
    #[builder(default = "DEFAULT_EMBED_MODEL.to_string()")]
    pub model_name: String,
    /// Requested output dimensionality; `None` lets the model decide
    #[builder(default = "Some(DEFAULT_DIMENSIONS)")]
    pub dimensions: Option<usize>,
    /// Per-text character cap applied before submission
    #[builder(default = "DEFAULT_MAX_INPUT_CHARS")]
    pub max_input_chars: usize,
    /// Maximum number of texts accepted in one call
    #[builder(default = "DEFAULT_MAX_BATCH_SIZE")]
    pub max_batch_size: usize,
    /// Timeout for a single HTTP request
    #[builder(default = "DEFAULT_TIMEOUT")]
    pub timeout: Duration,
}

impl std::fmt::Debug for EmbedConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbedConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &redact(&self.api_key))
            .field("model_name", &self.model_name)
            .field("dimensions", &self.dimensions)
            .field("max_input_chars", &self.max_input_chars)
            .field("max_batch_size", &self.max_batch_size)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: String::new(),
            model_name: DEFAULT_EMBED_MODEL.to_string(),
            dimensions: Some(DEFAULT_DIMENSIONS),
            max_input_chars: DEFAULT_MAX_INPUT_CHARS,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl EmbedConfig {
    /// Create a new embedding configuration using the builder
    pub fn builder() -> EmbedConfigBuilder {
        EmbedConfigBuilder::default()
    }

    /// Set the API key (builder style)
    pub fn with_api_key<S: Into<String>>(self, api_key: S) -> Self {
        Self {
            api_key: api_key.into(),
            ..self
        }
    }

    /// Set the request timeout (builder style)
    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self { timeout, ..self }
    }

    /// Full URL of the embeddings endpoint
    pub fn endpoint(&self) -> String {
        format!("{}/embeddings", self.base_url.trim_end_matches('/'))
    }

    /// Check the configuration before any request is sent
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(GatewayError::invalid_config("base_url must not be empty"));
        }
        if self.model_name.trim().is_empty() {
            return Err(GatewayError::invalid_config("model_name must not be empty"));
        }
        if self.dimensions == Some(0) {
            return Err(GatewayError::invalid_config(
                "dimensions must be greater than zero",
            ));
        }
        if self.max_input_chars == 0 {
            return Err(GatewayError::invalid_config(
                "max_input_chars must be greater than zero",
            ));
        }
        if self.max_batch_size == 0 {
            return Err(GatewayError::invalid_config(
                "max_batch_size must be greater than zero",
            ));
        }
        if self.timeout.is_zero() {
            return Err(GatewayError::invalid_config("timeout must be non-zero"));
        }
        tracing::debug!("Embedding configuration valid for model: {}", self.model_name);
        Ok(())
    }
}

/// Configuration for an OpenAI-compatible chat completion endpoint
#[derive(Clone, Builder)]
#[builder(setter(into))]
pub struct CompletionConfig {
    /// Base URL of the service; `/chat/completions` is appended
    #[builder(default = "DEFAULT_BASE_URL.to_string()")]
    pub base_url: String,
    /// Bearer token sent with every request
    #[builder(default)]
    pub api_key: String,
    /// Name of the chat model to use
    #[builder(default = "DEFAULT_COMPLETION_MODEL.to_string()")]
    pub model_name: String,
    /// System message placed before the user prompt
    #[builder(default = "DEFAULT_SYSTEM_PROMPT.to_string()")]
    pub system_prompt: String,
    /// Timeout for a single HTTP request
    #[builder(default = "Duration::from_secs(300)")]
    pub timeout: Duration,
}

impl std::fmt::Debug for CompletionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &redact(&self.api_key))
            .field("model_name", &self.model_name)
            .field("system_prompt", &self.system_prompt)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: String::new(),
            model_name: DEFAULT_COMPLETION_MODEL.to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            timeout: Duration::from_secs(300),
        }
    }
}

impl CompletionConfig {
    /// Create a new completion configuration using the builder
    pub fn builder() -> CompletionConfigBuilder {
        CompletionConfigBuilder::default()
    }

    /// Full URL of the chat completions endpoint
    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    /// Check the configuration before any request is sent
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(GatewayError::invalid_config("base_url must not be empty"));
        }
        if self.model_name.trim().is_empty() {
            return Err(GatewayError::invalid_config("model_name must not be empty"));
        }
        if self.timeout.is_zero() {
            return Err(GatewayError::invalid_config("timeout must be non-zero"));
        }
        Ok(())
    }
}
