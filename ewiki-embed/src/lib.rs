//! # ewiki-embed
//!
//! The gateway between ewiki and the remote model services: text goes in,
//! vectors (or completions) come out. Each call is exactly one request. Retry,
//! batching and concurrency belong to the caller, which is what lets the batch
//! scheduler in `ewiki-retriever` account for every failure.
//!
//! ## Quick Start
//!
//! ```no_run
//! use ewiki_embed::{EmbedConfig, EmbeddingProvider, HttpEmbeddingProvider};
//!
//! # async fn example() -> ewiki_embed::Result<()> {
//! let config = EmbedConfig::builder()
//!     .api_key("sk-...")
//!     .model_name("text-embedding-v3")
//!     .build()
//!     .expect("all other fields have defaults");
//! let provider = HttpEmbeddingProvider::new(config)?;
//!
//! let texts = vec!["fn main() {}".to_string(), "# README".to_string()];
//! let result = provider.embed_texts(&texts).await?;
//!
//! println!("Generated {} embeddings of dimension {}",
//!          result.len(), result.dimension);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`config`]: endpoint, model and limit settings for both services
//! - [`provider`]: the [`EmbeddingProvider`] trait and the HTTP implementation
//! - [`fixed`]: a deterministic, offline provider for tests and demos
//! - [`completion`]: the [`CompletionProvider`] boundary used by page writing
//! - [`error`]: [`GatewayError`] and the crate [`Result`]
//!
//! ## Error Handling
//!
//! Every failure of a call maps to one [`GatewayError`] variant: transport
//! failures, authentication failures, timeouts, other HTTP statuses, and
//! responses that do not match the request (wrong count, ragged vectors).

pub mod completion;
pub mod config;
pub mod error;
pub mod fixed;
pub mod provider;

// Re-export main types for easy access
pub use completion::{CompletionProvider, HttpCompletionProvider};
pub use config::{CompletionConfig, EmbedConfig};
pub use error::{GatewayError, Result};
pub use fixed::FixedEmbeddingProvider;
pub use provider::{EmbeddingProvider, EmbeddingResult, HttpEmbeddingProvider};
