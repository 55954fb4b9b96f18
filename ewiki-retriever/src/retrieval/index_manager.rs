//! Build-once, search-many lifecycle of a persisted index
//!
//! ```text
//! Absent ──build──▶ Ready ──invalidate──▶ Absent
//!    ▲                 │
//!    └── EmptyIndex ◀──┘ (nothing embedded: no artifacts are written)
//! ```
//!
//! A build walks the source tree, chunks every supported file, embeds the
//! chunks through the [`BatchScheduler`] and persists the resulting
//! [`VectorIndex`]. It is skipped outright, without a single embedding call,
//! when both artifacts already exist. Callers must not run two builds against
//! the same location at once.

use crate::error::{IndexError, Result};
use crate::retrieval::batch_scheduler::{BatchScheduler, ScheduleStats, SchedulerConfig};
use crate::storage::vector_index::{MatrixHeader, VectorIndex};
use crate::storage::{IndexLocation, SearchHit};
use chrono::{DateTime, Utc};
use ewiki_context::{Chunk, LineChunker, WalkOptions, collect_files};
use ewiki_embed::{EmbeddingProvider, GatewayError};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Instant, SystemTime};
use tracing::{debug, info, warn};

/// Everything a build needs besides the embedding provider.
#[derive(Debug, Clone, Default)]
pub struct ManagerConfig {
    pub chunker: LineChunker,
    pub walk_options: WalkOptions,
    pub scheduler: SchedulerConfig,
}

/// What is on disk at an [`IndexLocation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexState {
    /// Neither artifact exists
    Absent,
    /// Exactly one artifact exists, e.g. after an interrupted write
    Incomplete,
    /// Both artifacts exist
    Ready,
}

impl std::fmt::Display for IndexState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Absent => "absent",
            Self::Incomplete => "incomplete",
            Self::Ready => "ready",
        };
        f.write_str(name)
    }
}

/// Summary of a build that ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildOutcome {
    pub files_scanned: usize,
    pub entries_written: usize,
    pub dimension: usize,
    pub embedding: ScheduleStats,
}

/// Result of [`IndexManager::build`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum BuildReport {
    /// Both artifacts were already present; nothing was embedded.
    Skipped,
    Built(BuildOutcome),
}

/// On-disk facts about an index, for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexStatus {
    pub state: IndexState,
    pub dir: PathBuf,
    pub entries: Option<usize>,
    pub dimension: Option<usize>,
    pub vectors_bytes: Option<u64>,
    pub metadata_bytes: Option<u64>,
    /// Most recent modification of either artifact
    pub modified: Option<DateTime<Utc>>,
}

/// Builds, searches and inspects indexes at caller-supplied locations.
#[derive(Debug)]
pub struct IndexManager {
    config: ManagerConfig,
    scheduler: BatchScheduler,
}

impl IndexManager {
    pub fn new(config: ManagerConfig, provider: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        let scheduler = BatchScheduler::new(config.scheduler.clone(), provider)?;
        Ok(Self { config, scheduler })
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn state(&self, location: &IndexLocation) -> IndexState {
        if location.exists() {
            IndexState::Ready
        } else if location.any_exists() {
            IndexState::Incomplete
        } else {
            IndexState::Absent
        }
    }

    /// Build the index for `root` into `location` unless it already exists.
    ///
    /// # Errors
    /// * [`IndexError::EmptyIndex`] if no chunk was found or no batch succeeded;
    ///   nothing is written in that case
    /// * [`IndexError::Io`] if `root` cannot be read or the artifacts cannot be written
    pub async fn build(&self, root: &Path, location: &IndexLocation) -> Result<BuildReport> {
        match self.state(location) {
            IndexState::Ready => {
                info!(
                    "Index already present in {}, skipping build",
                    location.dir().display()
                );
                return Ok(BuildReport::Skipped);
            }
            IndexState::Incomplete => warn!(
                "Index in {} is incomplete, rebuilding it",
                location.dir().display()
            ),
            IndexState::Absent => {}
        }

        let started = Instant::now();
        info!("Building index for {}", root.display());

        let (files_scanned, chunks) = self.collect_chunks(root).await?;
        if chunks.is_empty() {
            return Err(IndexError::empty(format!(
                "no chunks found under {}",
                root.display()
            )));
        }
        info!(
            "Collected {} chunks from {} files in {:.2?}",
            chunks.len(),
            files_scanned,
            started.elapsed()
        );

        let scheduled = self.scheduler.embed_chunks(chunks).await;
        let stats = scheduled.stats;
        if scheduled.entries.is_empty() {
            return Err(IndexError::empty(format!(
                "all {} embedding batches failed",
                stats.batches_total
            )));
        }
        if stats.batches_failed > 0 {
            warn!(
                "{} of {} batches failed, indexing {} of {} chunks (failed batches: {:?})",
                stats.batches_failed,
                stats.batches_total,
                stats.vectors_produced,
                stats.chunks_total,
                stats.failed_batches
            );
        }

        let index = VectorIndex::from_entries(scheduled.entries)?;
        let outcome = BuildOutcome {
            files_scanned,
            entries_written: index.len(),
            dimension: index.dimension(),
            embedding: stats,
        };

        let target = location.clone();
        tokio::task::spawn_blocking(move || index.save(&target)).await??;

        info!(
            "Built index with {} entries in {} ({:.2?})",
            outcome.entries_written,
            location.dir().display(),
            started.elapsed()
        );
        Ok(BuildReport::Built(outcome))
    }

    /// Embed `query` once and return the `min(k, entries)` closest chunks.
    ///
    /// # Errors
    /// * [`IndexError::IndexNotFound`] unless both artifacts exist
    /// * [`IndexError::Gateway`] if the query cannot be embedded
    /// * [`IndexError::DimensionMismatch`] if the provider's vectors do not fit the index
    pub async fn search(
        &self,
        location: &IndexLocation,
        query: &str,
        k: usize,
    ) -> Result<Vec<SearchHit>> {
        if !location.exists() {
            return Err(IndexError::IndexNotFound {
                dir: location.dir().to_path_buf(),
            });
        }

        let target = location.clone();
        let index = tokio::task::spawn_blocking(move || VectorIndex::load(&target)).await??;

        let call_timeout = self.config.scheduler.call_timeout;
        let provider = self.scheduler.provider();
        let vector = tokio::time::timeout(call_timeout, provider.embed_text(query))
            .await
            .map_err(|_| GatewayError::Timeout {
                timeout: call_timeout,
            })??;

        let hits = index.search(&vector, k)?;
        debug!(
            "Query matched {} of {} entries in {}",
            hits.len(),
            index.len(),
            location.dir().display()
        );
        Ok(hits)
    }

    /// Build the index if it is not there yet, then search it.
    pub async fn query(
        &self,
        root: &Path,
        location: &IndexLocation,
        query: &str,
        k: usize,
    ) -> Result<Vec<SearchHit>> {
        if !location.exists() {
            self.build(root, location).await?;
        }
        self.search(location, query, k).await
    }

    /// Describe what is stored at `location` without loading the vectors.
    pub fn status(&self, location: &IndexLocation) -> Result<IndexStatus> {
        let state = self.state(location);
        let mut status = IndexStatus {
            state,
            dir: location.dir().to_path_buf(),
            entries: None,
            dimension: None,
            vectors_bytes: None,
            metadata_bytes: None,
            modified: None,
        };

        let mut latest: Option<SystemTime> = None;
        for (path, size) in [
            (location.vector_path(), &mut status.vectors_bytes),
            (location.metadata_path(), &mut status.metadata_bytes),
        ] {
            let Ok(metadata) = std::fs::metadata(&path) else {
                continue;
            };
            *size = Some(metadata.len());
            if let Ok(modified) = metadata.modified() {
                latest = latest.max(Some(modified));
            }
        }
        status.modified = latest.map(DateTime::<Utc>::from);

        if state == IndexState::Ready {
            let header = MatrixHeader::read(&location.vector_path())?;
            status.entries = Some(header.rows);
            status.dimension = Some(header.dimension);
        }
        Ok(status)
    }

    /// Delete both artifacts so the next build starts from scratch.
    pub fn invalidate(&self, location: &IndexLocation) -> Result<bool> {
        VectorIndex::delete(location)
    }

    async fn collect_chunks(&self, root: &Path) -> Result<(usize, Vec<Chunk>)> {
        let root = root.to_path_buf();
        let chunker = self.config.chunker;
        let walk_options = self.config.walk_options;

        tokio::task::spawn_blocking(move || -> Result<(usize, Vec<Chunk>)> {
            let files = collect_files(&root, walk_options)?;
            let mut chunks = Vec::new();
            for path in &files {
                match chunker.read_file_chunks(path) {
                    Ok(file_chunks) => chunks.extend(file_chunks),
                    Err(e) => warn!("Skipping unreadable file {}: {}", path.display(), e),
                }
            }
            Ok((files.len(), chunks))
        })
        .await?
    }
}
