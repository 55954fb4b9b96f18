//! Scripted embedding provider for scheduler and manager tests.

use async_trait::async_trait;
use ewiki_embed::{EmbeddingProvider, EmbeddingResult, GatewayError};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

/// Embedding provider whose latency and failures are driven by markers in the
/// submitted texts.
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    pub dimension: usize,
    pub max_batch_size: usize,
    pub max_input_chars: usize,
    /// Latency of every call
    pub delay: Duration,
    /// Extra latency for batches containing the marker
    pub slow: Option<(String, Duration)>,
    /// Batches containing the marker always fail
    pub fail_marker: Option<String>,
    /// Batches containing the marker panic
    pub panic_marker: Option<String>,
    /// Batches containing the marker get one vector too few
    pub short_marker: Option<String>,
    /// Batches containing the marker get vectors of another dimension
    pub wide_marker: Option<(String, usize)>,
    /// The first N calls fail, whatever their content
    pub fail_first: AtomicU32,
    /// Every call fails
    pub always_fail: bool,

    pub calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub submitted: Mutex<Vec<Vec<String>>>,
}

impl ScriptedProvider {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            max_batch_size: 64,
            max_input_chars: 8192,
            ..Self::default()
        }
    }

    /// The vector this provider returns for `text`.
    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; self.dimension];
        for (i, byte) in text.bytes().enumerate() {
            vector[i % self.dimension] += f32::from(byte);
        }
        vector
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn contains(texts: &[String], marker: &Option<String>) -> bool {
        marker
            .as_ref()
            .is_some_and(|m| texts.iter().any(|t| t.contains(m.as_str())))
    }
}

struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl EmbeddingProvider for ScriptedProvider {
    async fn embed_texts(&self, texts: &[String]) -> ewiki_embed::Result<EmbeddingResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.submitted.lock().unwrap().push(texts.to_vec());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _in_flight = InFlightGuard(&self.in_flight);

        let mut delay = self.delay;
        if let Some((marker, extra)) = &self.slow {
            if texts.iter().any(|t| t.contains(marker.as_str())) {
                delay += *extra;
            }
        }
        tokio::time::sleep(delay).await;

        if Self::contains(texts, &self.panic_marker) {
            panic!("scripted provider panic");
        }
        if self.always_fail || Self::contains(texts, &self.fail_marker) {
            return Err(GatewayError::Http {
                status: 503,
                body: "scripted failure".to_string(),
            });
        }
        let transient = self
            .fail_first
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if transient {
            return Err(GatewayError::transport(std::io::Error::other(
                "scripted transient failure",
            )));
        }

        let mut embeddings: Vec<Vec<f32>> = texts.iter().map(|t| self.vector_for(t)).collect();
        if let Some((marker, dimension)) = &self.wide_marker {
            if texts.iter().any(|t| t.contains(marker.as_str())) {
                for embedding in &mut embeddings {
                    embedding.resize(*dimension, 1.0);
                }
            }
        }
        if Self::contains(texts, &self.short_marker) {
            embeddings.pop();
        }
        Ok(EmbeddingResult::new(embeddings))
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    fn max_input_chars(&self) -> usize {
        self.max_input_chars
    }

    fn provider_name(&self) -> &str {
        "scripted"
    }
}
