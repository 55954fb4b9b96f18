//! End-to-end tests of the build → persist → search cycle
//!
//! These run entirely offline against the deterministic fixed provider:
//! - Building an index from a small repository and searching it
//! - Reloading persisted artifacts in a fresh manager
//! - Skipping a second build of an existing index
//! - Surviving a provider that rejects some requests

use anyhow::Result;
use async_trait::async_trait;
use ewiki_embed::{EmbeddingProvider, EmbeddingResult, FixedEmbeddingProvider, GatewayError};
use ewiki_retriever::retrieval::snippets::format_snippets;
use ewiki_retriever::{
    BuildReport, IndexError, IndexLocation, IndexManager, ManagerConfig, RetryPolicy,
    SchedulerConfig, VectorIndex,
};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::{TempDir, tempdir};

fn write_repo(root: &Path) -> Result<()> {
    std::fs::create_dir_all(root.join("src"))?;
    std::fs::create_dir_all(root.join("docs"))?;
    std::fs::write(
        root.join("src/retry.rs"),
        "pub fn retry_with_backoff(attempts: u32) -> u32 {\n    attempts * 2\n}\n\npub fn backoff_delay() {}\n",
    )?;
    std::fs::write(
        root.join("src/parser.rs"),
        "pub fn parse_tokens(input: &str) -> Vec<&str> {\n    input.split_whitespace().collect()\n}\n",
    )?;
    std::fs::write(
        root.join("docs/guide.md"),
        "# Guide\n\nThe parser splits tokens on whitespace.\n",
    )?;
    std::fs::write(root.join("logo.png"), [0x89, b'P', b'N', b'G'])?;
    Ok(())
}

fn config(batch_size: usize) -> ManagerConfig {
    ManagerConfig {
        scheduler: SchedulerConfig::default()
            .with_batch_size(batch_size)
            .with_max_concurrency(2)
            .with_retry(RetryPolicy::immediate(2)),
        ..ManagerConfig::default()
    }
}

fn fixed_manager(batch_size: usize) -> Result<IndexManager> {
    let provider = Arc::new(FixedEmbeddingProvider::new(64)?);
    Ok(IndexManager::new(config(batch_size), provider)?)
}

fn setup() -> Result<(TempDir, IndexLocation)> {
    let dir = tempdir()?;
    write_repo(&dir.path().join("repo"))?;
    let location = IndexLocation::new(dir.path().join("index"));
    Ok((dir, location))
}

/// Build, then search with text taken verbatim from one chunk
#[tokio::test]
async fn test_build_and_search() -> Result<()> {
    let (dir, location) = setup()?;
    let manager = fixed_manager(2)?;

    let report = manager.build(&dir.path().join("repo"), &location).await?;
    let BuildReport::Built(outcome) = report else {
        panic!("expected a fresh build, got {report:?}");
    };
    assert_eq!(outcome.files_scanned, 3);
    assert_eq!(outcome.embedding.batches_failed, 0);
    assert_eq!(outcome.entries_written, outcome.embedding.chunks_total);
    assert!(location.exists());

    let hits = manager
        .search(&location, "pub fn parse_tokens(input: &str) -> Vec<&str> {\n", 3)
        .await?;
    assert_eq!(hits.len(), 3);
    assert!(hits[0].chunk.source_path.ends_with("parser.rs"));
    assert_eq!(hits[0].chunk.start_line, 1);
    assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));

    let rendered = format_snippets(&hits);
    assert!(rendered.contains("[Fragment 1] File: "));
    assert!(rendered.contains("parse_tokens"));
    Ok(())
}

/// A fresh manager sees the same persisted index
#[tokio::test]
async fn test_index_survives_reload() -> Result<()> {
    let (dir, location) = setup()?;
    fixed_manager(3)?
        .build(&dir.path().join("repo"), &location)
        .await?;

    let index = VectorIndex::load(&location)?;
    assert_eq!(index.dimension(), 64);
    for row in 0..index.len() {
        let norm: f32 = index.row(row).unwrap().iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!(norm == 0.0 || (norm - 1.0).abs() < 1e-5);
    }

    let again = fixed_manager(1)?;
    let first = again.search(&location, "whitespace tokens", 2).await?;
    let second = again.search(&location, "whitespace tokens", 2).await?;
    assert_eq!(first, second);
    Ok(())
}

/// Counts calls so the idempotent build can be observed
struct CountingProvider {
    inner: FixedEmbeddingProvider,
    calls: AtomicUsize,
}

#[async_trait]
impl EmbeddingProvider for CountingProvider {
    async fn embed_texts(&self, texts: &[String]) -> ewiki_embed::Result<EmbeddingResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.embed_texts(texts).await
    }

    fn max_batch_size(&self) -> usize {
        self.inner.max_batch_size()
    }

    fn max_input_chars(&self) -> usize {
        self.inner.max_input_chars()
    }

    fn provider_name(&self) -> &str {
        "counting"
    }
}

#[tokio::test]
async fn test_second_build_makes_no_calls() -> Result<()> {
    let (dir, location) = setup()?;
    let provider = Arc::new(CountingProvider {
        inner: FixedEmbeddingProvider::new(16)?,
        calls: AtomicUsize::new(0),
    });
    let manager = IndexManager::new(config(2), provider.clone())?;

    manager.build(&dir.path().join("repo"), &location).await?;
    let after_first = provider.calls.load(Ordering::SeqCst);
    assert!(after_first > 0);

    let report = manager.build(&dir.path().join("repo"), &location).await?;
    assert_eq!(report, BuildReport::Skipped);
    assert_eq!(provider.calls.load(Ordering::SeqCst), after_first);
    Ok(())
}

/// Rejects every request mentioning the parser
struct PickyProvider {
    inner: FixedEmbeddingProvider,
}

#[async_trait]
impl EmbeddingProvider for PickyProvider {
    async fn embed_texts(&self, texts: &[String]) -> ewiki_embed::Result<EmbeddingResult> {
        if texts.iter().any(|t| t.contains("parse")) {
            return Err(GatewayError::Http {
                status: 500,
                body: "internal error".to_string(),
            });
        }
        self.inner.embed_texts(texts).await
    }

    fn max_batch_size(&self) -> usize {
        self.inner.max_batch_size()
    }

    fn max_input_chars(&self) -> usize {
        self.inner.max_input_chars()
    }

    fn provider_name(&self) -> &str {
        "picky"
    }
}

#[tokio::test]
async fn test_partial_outage_indexes_the_rest() -> Result<()> {
    let (dir, location) = setup()?;
    let provider = Arc::new(PickyProvider {
        inner: FixedEmbeddingProvider::new(16)?,
    });
    let manager = IndexManager::new(config(1), provider)?;

    let report = manager.build(&dir.path().join("repo"), &location).await?;
    let BuildReport::Built(outcome) = report else {
        panic!("expected a build, got {report:?}");
    };
    assert!(outcome.embedding.batches_failed > 0);
    assert_eq!(
        outcome.entries_written,
        outcome.embedding.chunks_total - outcome.embedding.batches_failed
    );

    let index = VectorIndex::load(&location)?;
    assert!(index.chunks().iter().all(|c| !c.text.contains("parse")));
    Ok(())
}

#[tokio::test]
async fn test_empty_repository() -> Result<()> {
    let dir = tempdir()?;
    std::fs::create_dir_all(dir.path().join("repo"))?;
    let location = IndexLocation::new(dir.path().join("index"));

    let err = fixed_manager(2)?
        .build(&dir.path().join("repo"), &location)
        .await
        .unwrap_err();

    assert!(matches!(err, IndexError::EmptyIndex { .. }));
    assert!(!location.any_exists());
    Ok(())
}
