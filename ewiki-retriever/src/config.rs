//! `ewiki.toml`: every tunable of indexing, search and the remote services
//!
//! Every field has a default, so a partial (or empty) file is valid. The API
//! key can be kept out of the file entirely and supplied through
//! [`API_KEY_ENV`] instead.

use crate::error::{IndexError, Result};
use crate::retrieval::batch_scheduler::SchedulerConfig;
use crate::retrieval::index_manager::ManagerConfig;
use crate::retrieval::retry::RetryPolicy;
use ewiki_context::{LineChunker, WalkOptions};
use ewiki_embed::config::{
    DEFAULT_BASE_URL, DEFAULT_COMPLETION_MODEL, DEFAULT_DIMENSIONS, DEFAULT_EMBED_MODEL,
    DEFAULT_MAX_BATCH_SIZE, DEFAULT_MAX_INPUT_CHARS, DEFAULT_SYSTEM_PROMPT,
};
use ewiki_embed::{
    CompletionConfig, EmbedConfig, EmbeddingProvider, FixedEmbeddingProvider,
    HttpEmbeddingProvider,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Default configuration file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "ewiki.toml";
/// Environment variable that overrides both configured API keys.
pub const API_KEY_ENV: &str = "EWIKI_API_KEY";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrieverConfig {
    #[serde(default)]
    pub indexing: IndexingSettings,
    #[serde(default)]
    pub search: SearchSettings,
    #[serde(default)]
    pub embedding: EmbeddingSettings,
    #[serde(default)]
    pub completion: CompletionSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexingSettings {
    /// Hard cap on lines per chunk
    #[serde(default = "default_max_chunk_lines")]
    pub max_chunk_lines: usize,
    /// Chunks per embedding request
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Embedding requests in flight at once
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Retries after the first failed attempt of a batch
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,
    #[serde(default = "default_embedding_timeout_secs")]
    pub embedding_timeout_secs: u64,
    /// Delay before the first retry; later retries wait linearly longer
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default)]
    pub include_hidden: bool,
    #[serde(default = "default_true")]
    pub respect_gitignore: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSettings {
    #[serde(default = "default_top_k")]
    pub top_k_default: usize,
}

/// Which embedding backend to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI-compatible HTTP service
    #[default]
    Http,
    /// Deterministic offline vectors, for smoke runs without a service
    Fixed,
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingSettings {
    #[serde(default)]
    pub provider: ProviderKind,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_embed_model")]
    pub model: String,
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_completion_model")]
    pub model: String,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

fn default_max_chunk_lines() -> usize { ewiki_context::DEFAULT_MAX_LINES }
fn default_batch_size() -> usize { 6 }
fn default_max_concurrency() -> usize { 5 }
fn default_retry_limit() -> u32 { 2 }
fn default_embedding_timeout_secs() -> u64 { 30 }
fn default_backoff_base_ms() -> u64 { 1000 }
fn default_backoff_multiplier() -> f64 { 1.0 }
fn default_true() -> bool { true }
fn default_top_k() -> usize { 5 }
fn default_base_url() -> String { DEFAULT_BASE_URL.to_string() }
fn default_embed_model() -> String { DEFAULT_EMBED_MODEL.to_string() }
fn default_dimensions() -> usize { DEFAULT_DIMENSIONS }
fn default_max_input_chars() -> usize { DEFAULT_MAX_INPUT_CHARS }
fn default_completion_model() -> String { DEFAULT_COMPLETION_MODEL.to_string() }
fn default_system_prompt() -> String { DEFAULT_SYSTEM_PROMPT.to_string() }

impl Default for IndexingSettings {
    fn default() -> Self {
        Self {
            max_chunk_lines: default_max_chunk_lines(),
            batch_size: default_batch_size(),
            max_concurrency: default_max_concurrency(),
            retry_limit: default_retry_limit(),
            embedding_timeout_secs: default_embedding_timeout_secs(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            include_hidden: false,
            respect_gitignore: default_true(),
        }
    }
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            top_k_default: default_top_k(),
        }
    }
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            base_url: default_base_url(),
            api_key: String::new(),
            model: default_embed_model(),
            dimensions: default_dimensions(),
            max_input_chars: default_max_input_chars(),
        }
    }
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: String::new(),
            model: default_completion_model(),
            system_prompt: default_system_prompt(),
        }
    }
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() { "" } else { "[REDACTED]" }
}

impl std::fmt::Debug for EmbeddingSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingSettings")
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("dimensions", &self.dimensions)
            .field("max_input_chars", &self.max_input_chars)
            .finish()
    }
}

impl std::fmt::Debug for CompletionSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionSettings")
            .field("base_url", &self.base_url)
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl RetrieverConfig {
    /// Parse and validate the file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            IndexError::invalid_config(format!("{}: {}", path.display(), e.message()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path`, writing the defaults there first if it does not exist.
    pub fn load_or_init(path: &Path) -> Result<Self> {
        if path.exists() {
            return Self::load(path);
        }
        let config = Self::default();
        config.save(path)?;
        tracing::info!("Created default configuration at {}", path.display());
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| IndexError::invalid_config(format!("cannot serialize config: {e}")))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Replace both API keys with `key`, if one is given and non-empty.
    ///
    /// Called with the value of [`API_KEY_ENV`].
    pub fn apply_api_key_override(&mut self, key: Option<String>) {
        if let Some(key) = key.filter(|k| !k.trim().is_empty()) {
            self.embedding.api_key = key.clone();
            self.completion.api_key = key;
        }
    }

    pub fn validate(&self) -> Result<()> {
        let indexing = &self.indexing;
        if indexing.max_chunk_lines == 0 {
            return Err(IndexError::invalid_config(
                "indexing.max_chunk_lines must be at least 1",
            ));
        }
        if indexing.batch_size == 0 {
            return Err(IndexError::invalid_config(
                "indexing.batch_size must be at least 1",
            ));
        }
        if indexing.max_concurrency == 0 {
            return Err(IndexError::invalid_config(
                "indexing.max_concurrency must be at least 1",
            ));
        }
        if indexing.embedding_timeout_secs == 0 {
            return Err(IndexError::invalid_config(
                "indexing.embedding_timeout_secs must be at least 1",
            ));
        }
        if !indexing.backoff_multiplier.is_finite() || indexing.backoff_multiplier < 0.0 {
            return Err(IndexError::invalid_config(
                "indexing.backoff_multiplier must be a non-negative number",
            ));
        }
        if self.search.top_k_default == 0 {
            return Err(IndexError::invalid_config(
                "search.top_k_default must be at least 1",
            ));
        }
        if self.embedding.dimensions == 0 {
            return Err(IndexError::invalid_config(
                "embedding.dimensions must be at least 1",
            ));
        }
        Ok(())
    }

    pub fn embedding_timeout(&self) -> Duration {
        Duration::from_secs(self.indexing.embedding_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::with_retries(
            self.indexing.retry_limit,
            Duration::from_millis(self.indexing.backoff_base_ms),
            self.indexing.backoff_multiplier,
        )
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig::default()
            .with_batch_size(self.indexing.batch_size)
            .with_max_concurrency(self.indexing.max_concurrency)
            .with_retry(self.retry_policy())
            .with_call_timeout(self.embedding_timeout())
    }

    pub fn manager_config(&self) -> Result<ManagerConfig> {
        let chunker = LineChunker::new(self.indexing.max_chunk_lines)
            .map_err(|e| IndexError::invalid_config(e.to_string()))?;
        Ok(ManagerConfig {
            chunker,
            walk_options: WalkOptions::default()
                .with_include_hidden(self.indexing.include_hidden)
                .with_respect_gitignore(self.indexing.respect_gitignore),
            scheduler: self.scheduler_config(),
        })
    }

    pub fn embed_config(&self) -> Result<EmbedConfig> {
        EmbedConfig::builder()
            .base_url(self.embedding.base_url.clone())
            .api_key(self.embedding.api_key.clone())
            .model_name(self.embedding.model.clone())
            .dimensions(Some(self.embedding.dimensions))
            .max_input_chars(self.embedding.max_input_chars)
            .max_batch_size(DEFAULT_MAX_BATCH_SIZE)
            .timeout(self.embedding_timeout())
            .build()
            .map_err(|e| IndexError::invalid_config(e.to_string()))
    }

    pub fn completion_config(&self) -> Result<CompletionConfig> {
        CompletionConfig::builder()
            .base_url(self.completion.base_url.clone())
            .api_key(self.completion.api_key.clone())
            .model_name(self.completion.model.clone())
            .system_prompt(self.completion.system_prompt.clone())
            .build()
            .map_err(|e| IndexError::invalid_config(e.to_string()))
    }

    /// Instantiate the configured embedding backend.
    pub fn build_provider(&self) -> Result<Arc<dyn EmbeddingProvider>> {
        let provider: Arc<dyn EmbeddingProvider> = match self.embedding.provider {
            ProviderKind::Http => Arc::new(HttpEmbeddingProvider::new(self.embed_config()?)?),
            ProviderKind::Fixed => Arc::new(
                FixedEmbeddingProvider::new(self.embedding.dimensions)?
                    .with_max_input_chars(self.embedding.max_input_chars),
            ),
        };
        tracing::debug!("Using {} embedding provider", provider.provider_name());
        Ok(provider)
    }
}
