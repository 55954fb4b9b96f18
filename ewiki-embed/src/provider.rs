//! Embedding provider implementations

use crate::config::EmbedConfig;
use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};

/// Result of embedding generation
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingResult {
    /// The generated embeddings, one per input text
    pub embeddings: Vec<Vec<f32>>,
    /// The dimension of each embedding vector
    pub dimension: usize,
}

impl EmbeddingResult {
    /// Create a new embedding result from a vector of embeddings.
    ///
    /// The dimension is inferred from the first embedding vector.
    /// If the embeddings vector is empty, dimension defaults to 0.
    ///
    /// # Arguments
    /// * `embeddings` - One embedding vector per input text, in input order
    pub fn new(embeddings: Vec<Vec<f32>>) -> Self {
        let dimension = embeddings.first().map(|e| e.len()).unwrap_or(0);
        Self {
            embeddings,
            dimension,
        }
    }

    /// Returns the number of embedding vectors in this result.
    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    /// Returns `true` if this result contains no embedding vectors.
    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }

    /// Checks that this result answers a request of `expected` texts: one
    /// vector per text, all of the same non-zero length.
    ///
    /// # Errors
    /// [`GatewayError::MalformedResponse`] describing the first problem found.
    pub fn check_shape(&self, expected: usize) -> Result<()> {
        if self.len() != expected {
            return Err(GatewayError::malformed(format!(
                "received {} embeddings for {} inputs",
                self.len(),
                expected
            )));
        }
        if expected > 0 && self.dimension == 0 {
            return Err(GatewayError::malformed("received empty embedding vectors"));
        }
        if let Some(position) = self
            .embeddings
            .iter()
            .position(|e| e.len() != self.dimension)
        {
            return Err(GatewayError::malformed(format!(
                "embedding {} has dimension {}, expected {}",
                position,
                self.embeddings[position].len(),
                self.dimension
            )));
        }
        Ok(())
    }
}

/// Trait for embedding providers that can generate embeddings from text.
///
/// One call is one request: implementations neither retry nor fan out. Each
/// text is cut to [`max_input_chars`](EmbeddingProvider::max_input_chars)
/// characters before it is embedded, and the returned vectors are in input order.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embeddings for multiple texts (one request)
    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult>;

    /// Generate embeddings for a single text
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let result = self.embed_texts(&[text.to_string()]).await?;
        result
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::malformed("no embedding returned for text"))
    }

    /// Largest number of texts accepted by one `embed_texts` call
    fn max_batch_size(&self) -> usize;

    /// Per-text character cap applied before submission
    fn max_input_chars(&self) -> usize;

    /// Get the name/identifier of this provider
    fn provider_name(&self) -> &str;
}

/// Cuts `text` to at most `max_chars` characters (not bytes).
pub fn truncate_to_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_offset, _)) => &text[..byte_offset],
        None => text,
    }
}

/// Returns `true` if `text` would be cut by [`truncate_to_chars`].
pub fn exceeds_chars(text: &str, max_chars: usize) -> bool {
    text.chars().nth(max_chars).is_some()
}

/// Embedding provider for OpenAI-compatible `POST /embeddings` endpoints
#[derive(Clone)]
pub struct HttpEmbeddingProvider {
    config: EmbedConfig,
    client: reqwest::Client,
    endpoint: String,
}

impl std::fmt::Debug for HttpEmbeddingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpEmbeddingProvider")
            .field("config", &self.config)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl HttpEmbeddingProvider {
    /// Creates a provider after validating `config`.
    ///
    /// The API key is attached to every request as a bearer token; an empty key
    /// sends no `Authorization` header at all.
    ///
    /// # Errors
    /// [`GatewayError::InvalidConfig`] for an invalid configuration or an API key
    /// that cannot be sent as a header value.
    pub fn new(config: EmbedConfig) -> Result<Self> {
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

        tracing::info!(
            "Created embedding provider for model {} at {}",
            config.model_name,
            endpoint
        );
        Ok(Self {
            config,
            client,
            endpoint,
        })
    }

    /// The configuration this provider was created with
    pub fn config(&self) -> &EmbedConfig {
        &self.config
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
    encoding_format: &'static str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        if texts.is_empty() {
            return Ok(EmbeddingResult::new(vec![]));
        }
        if texts.len() > self.config.max_batch_size {
            return Err(GatewayError::BatchTooLarge {
                size: texts.len(),
                max: self.config.max_batch_size,
            });
        }

        let max_chars = self.config.max_input_chars;
        let request = EmbeddingRequest {
            model: &self.config.model_name,
            input: texts
                .iter()
                .map(|t| truncate_to_chars(t, max_chars))
                .collect(),
            dimensions: self.config.dimensions,
            encoding_format: "float",
        };

        tracing::debug!(
            "Requesting {} embeddings from {}",
            texts.len(),
            self.endpoint
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

        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::from_reqwest(e, timeout))?;
        parsed.data.sort_by_key(|entry| entry.index);
        if let Some(position) = parsed
            .data
            .iter()
            .enumerate()
            .position(|(position, entry)| entry.index != position)
        {
            return Err(GatewayError::malformed(format!(
                "response indices are not contiguous at position {position}"
            )));
        }

        let result = EmbeddingResult::new(parsed.data.into_iter().map(|e| e.embedding).collect());
        result.check_shape(texts.len())?;
        tracing::debug!(
            "Received {} embeddings of dimension {}",
            result.len(),
            result.dimension
        );
        Ok(result)
    }

    fn max_batch_size(&self) -> usize {
        self.config.max_batch_size
    }

    fn max_input_chars(&self) -> usize {
        self.config.max_input_chars
    }

    fn provider_name(&self) -> &str {
        "openai-compatible"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_result() {
        let embeddings = vec![vec![0.1, 0.2, 0.3], vec![0.4, 0.5, 0.6]];
        let result = EmbeddingResult::new(embeddings);

        assert_eq!(result.len(), 2);
        assert_eq!(result.dimension, 3);
        assert!(!result.is_empty());
        assert!(result.check_shape(2).is_ok());
        assert!(result.check_shape(3).is_err());
    }

    #[test]
    fn test_ragged_result_is_malformed() {
        let result = EmbeddingResult::new(vec![vec![1.0, 0.0], vec![1.0]]);
        assert!(matches!(
            result.check_shape(2),
            Err(GatewayError::MalformedResponse { .. })
        ));
    }

    #[test]
    fn test_truncate_counts_characters() {
        assert_eq!(truncate_to_chars("hello", 10), "hello");
        assert_eq!(truncate_to_chars("hello", 3), "hel");
        assert_eq!(truncate_to_chars("héllo wörld", 7), "héllo w");
        assert_eq!(truncate_to_chars("日本語テキスト", 3), "日本語");
        assert!(exceeds_chars("abcd", 3));
        assert!(!exceeds_chars("abc", 3));
    }

    #[test]
    fn test_provider_creation_validates_config() {
        let config = EmbedConfig {
            model_name: String::new(),
            ..EmbedConfig::default()
        };
        assert!(matches!(
            HttpEmbeddingProvider::new(config),
            Err(GatewayError::InvalidConfig { .. })
        ));

        let provider = HttpEmbeddingProvider::new(EmbedConfig::default()).unwrap();
        assert_eq!(provider.provider_name(), "openai-compatible");
        assert_eq!(provider.max_input_chars(), 8192);
    }

    #[tokio::test]
    async fn test_oversized_batch_is_rejected_without_a_request() {
        let config = EmbedConfig {
            max_batch_size: 2,
            ..EmbedConfig::default()
        };
        let provider = HttpEmbeddingProvider::new(config).unwrap();
        let texts = vec!["a".to_string(), "b".to_string(), "c".to_string()];

        let err = provider.embed_texts(&texts).await.unwrap_err();
        assert!(matches!(err, GatewayError::BatchTooLarge { size: 3, max: 2 }));
    }
}
