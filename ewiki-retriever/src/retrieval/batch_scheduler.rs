//! Concurrent, fault-tolerant embedding of chunk batches
//!
//! Chunks are cut into contiguous batches of `batch_size`. Every batch runs as
//! its own task; a semaphore keeps at most `max_concurrency` remote calls in
//! flight. A failed attempt (error, timeout, or a response whose length does
//! not match the request) is retried with linear backoff. A batch that runs out
//! of attempts is dropped and counted, and its siblings carry on.
//!
//! Output order is rebuilt from batch ordinals, so entries come back in the
//! same order as the input chunks no matter which batch finished first.

use crate::error::{IndexError, Result};
use crate::retrieval::retry::{RetryPolicy, retry_async};
use crate::storage::IndexEntry;
use ewiki_context::Chunk;
use ewiki_embed::provider::exceeds_chars;
use ewiki_embed::{EmbeddingProvider, GatewayError};
use itertools::Itertools;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Default number of chunks per embedding request.
pub const DEFAULT_BATCH_SIZE: usize = 6;
/// Default number of embedding requests in flight at once.
pub const DEFAULT_MAX_CONCURRENCY: usize = 5;
/// Default bound on a single embedding request.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Tuning knobs for a [`BatchScheduler`].
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    pub batch_size: usize,
    pub max_concurrency: usize,
    pub retry: RetryPolicy,
    /// Bound on every individual remote call
    pub call_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            retry: RetryPolicy::default(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

impl SchedulerConfig {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(IndexError::invalid_config("batch_size must be at least 1"));
        }
        if self.max_concurrency == 0 {
            return Err(IndexError::invalid_config(
                "max_concurrency must be at least 1",
            ));
        }
        if self.call_timeout.is_zero() {
            return Err(IndexError::invalid_config(
                "embedding timeout must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// What happened during one scheduling run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScheduleStats {
    pub chunks_total: usize,
    /// Chunks longer than the provider's per-text limit (embedded truncated)
    pub chunks_truncated: usize,
    pub batches_total: usize,
    pub batches_failed: usize,
    /// Ordinals of the batches that contributed nothing
    pub failed_batches: Vec<usize>,
    pub vectors_produced: usize,
}

/// Embedded chunks in input order, minus those of failed batches.
#[derive(Debug, Clone, Default)]
pub struct ScheduledEmbeddings {
    pub entries: Vec<IndexEntry>,
    pub stats: ScheduleStats,
}

/// Fans chunk batches out to an [`EmbeddingProvider`].
pub struct BatchScheduler {
    config: SchedulerConfig,
    provider: Arc<dyn EmbeddingProvider>,
}

impl std::fmt::Debug for BatchScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchScheduler")
            .field("config", &self.config)
            .field("provider", &self.provider.provider_name())
            .finish()
    }
}

impl BatchScheduler {
    pub fn new(config: SchedulerConfig, provider: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        config.validate()?;
        let provider_max = provider.max_batch_size();
        if config.batch_size > provider_max {
            return Err(IndexError::invalid_config(format!(
                "batch_size {} exceeds the {} provider limit of {}",
                config.batch_size,
                provider.provider_name(),
                provider_max
            )));
        }
        Ok(Self { config, provider })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    /// Embed `chunks`, returning one entry per chunk of every successful batch.
    ///
    /// Never fails as a whole: batch failures are reported in the stats.
    pub async fn embed_chunks(&self, chunks: Vec<Chunk>) -> ScheduledEmbeddings {
        let started = Instant::now();
        let max_chars = self.provider.max_input_chars();
        let mut stats = ScheduleStats {
            chunks_total: chunks.len(),
            chunks_truncated: chunks
                .iter()
                .filter(|chunk| exceeds_chars(&chunk.text, max_chars))
                .count(),
            ..ScheduleStats::default()
        };
        if stats.chunks_truncated > 0 {
            warn!(
                "{} chunks exceed {} characters and will be embedded truncated",
                stats.chunks_truncated, max_chars
            );
        }

        let batches: Vec<Vec<Chunk>> = {
            let grouped = chunks.into_iter().chunks(self.config.batch_size);
            grouped.into_iter().map(|batch| batch.collect()).collect()
        };
        stats.batches_total = batches.len();
        info!(
            "Embedding {} chunks in {} batches (batch size {}, concurrency {})",
            stats.chunks_total,
            stats.batches_total,
            self.config.batch_size,
            self.config.max_concurrency
        );

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency));
        let mut tasks = JoinSet::new();
        for (ordinal, batch) in batches.into_iter().enumerate() {
            let provider = Arc::clone(&self.provider);
            let semaphore = Arc::clone(&semaphore);
            let policy = self.config.retry;
            let call_timeout = self.config.call_timeout;

            tasks.spawn(async move {
                let texts: Vec<String> = batch.iter().map(|chunk| chunk.text.clone()).collect();
                let outcome = embed_batch(
                    provider.as_ref(),
                    &semaphore,
                    policy,
                    call_timeout,
                    ordinal,
                    &texts,
                )
                .await;
                let entries = outcome.map(|vectors| {
                    batch
                        .into_iter()
                        .zip(vectors)
                        .map(|(chunk, vector)| IndexEntry { chunk, vector })
                        .collect::<Vec<_>>()
                });
                (ordinal, entries)
            });
        }

        let mut slots: Vec<Option<Vec<IndexEntry>>> =
            (0..stats.batches_total).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((ordinal, Ok(entries))) => {
                    debug!("Batch {} finished with {} vectors", ordinal, entries.len());
                    slots[ordinal] = Some(entries);
                }
                Ok((ordinal, Err(e))) => {
                    error!(
                        "Batch {} failed after {} attempts, dropping it: {}",
                        ordinal, self.config.retry.max_attempts, e
                    );
                }
                // The ordinal is lost with the task; its slot stays empty and
                // is counted below.
                Err(e) => error!("Batch task did not complete: {}", e),
            }
        }

        let mut entries = Vec::with_capacity(stats.chunks_total);
        for (ordinal, slot) in slots.into_iter().enumerate() {
            match slot {
                Some(batch) => entries.extend(batch),
                None => stats.failed_batches.push(ordinal),
            }
        }
        stats.batches_failed = stats.failed_batches.len();
        stats.vectors_produced = entries.len();

        info!(
            "Embedded {} of {} chunks in {:.2?} ({} of {} batches failed)",
            stats.vectors_produced,
            stats.chunks_total,
            started.elapsed(),
            stats.batches_failed,
            stats.batches_total
        );
        ScheduledEmbeddings { entries, stats }
    }
}

/// Run one batch to completion, retrying failed attempts.
///
/// The semaphore permit covers a single attempt; it is released while the
/// batch waits out its backoff.
async fn embed_batch(
    provider: &dyn EmbeddingProvider,
    semaphore: &Semaphore,
    policy: RetryPolicy,
    call_timeout: Duration,
    ordinal: usize,
    texts: &[String],
) -> ewiki_embed::Result<Vec<Vec<f32>>> {
    let operation = format!("Embedding batch {ordinal}");
    retry_async(policy, &operation, |attempt| async move {
        let _permit = semaphore.acquire().await.map_err(GatewayError::transport)?;
        debug!(
            "Batch {} attempt {}: submitting {} texts",
            ordinal,
            attempt,
            texts.len()
        );
        let result = tokio::time::timeout(call_timeout, provider.embed_texts(texts))
            .await
            .map_err(|_| GatewayError::Timeout {
                timeout: call_timeout,
            })??;
        result.check_shape(texts.len())?;
        Ok::<_, GatewayError>(result.embeddings)
    })
    .await
}
