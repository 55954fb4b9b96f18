//! ewiki-retriever: concurrent indexing and semantic retrieval over a source tree
//!
//! Builds a persistent vector index of a repository once and answers
//! similarity queries against it, so that a documentation writer can ground
//! each page in the most relevant code fragments.
//!
//! ## Key Modules
//!
//! - **[`retrieval`]**: batch scheduling, retry policy, the index lifecycle and
//!   snippet rendering
//! - **[`storage`]**: the on-disk index format and exact cosine search
//! - **[`config`]**: the `ewiki.toml` configuration file
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ewiki_retriever::{IndexLocation, IndexManager, RetrieverConfig};
//! use std::path::Path;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = RetrieverConfig::load_or_init(Path::new("ewiki.toml"))?;
//! let manager = IndexManager::new(config.manager_config()?, config.build_provider()?)?;
//! let location = IndexLocation::new("target/ewiki-index");
//!
//! let hits = manager
//!     .query(Path::new("."), &location, "where are retries configured?", 5)
//!     .await?;
//! println!("{}", ewiki_retriever::retrieval::snippets::format_snippets(&hits));
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Files → LineChunker → BatchScheduler ⇉ EmbeddingProvider
//!                            ↓ (ordinal reassembly)
//!               VectorIndex → vectors.f32 + meta.json
//!                            ↑
//!          IndexManager::search ← query embedding
//! ```

pub mod config;
pub mod error;
pub mod retrieval;
pub mod storage;

pub use config::RetrieverConfig;
pub use error::{IndexError, Result};
pub use retrieval::batch_scheduler::{BatchScheduler, ScheduleStats, SchedulerConfig};
pub use retrieval::index_manager::{
    BuildOutcome, BuildReport, IndexManager, IndexState, IndexStatus, ManagerConfig,
};
pub use retrieval::retry::RetryPolicy;
pub use storage::vector_index::VectorIndex;
pub use storage::{IndexEntry, IndexLocation, SearchHit};
