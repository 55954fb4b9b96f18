//! # ewiki-context
//!
//! Turns files into the line-addressed [`Chunk`]s that the rest of ewiki embeds
//! and indexes, and finds the files worth chunking under a collection root.
//!
//! - [`text`]: boundary-seeking line chunker and encoding-tolerant file reads
//! - [`walk`]: allow-listed directory traversal

pub mod text;
pub mod walk;

// Re-export the chunking entry points for external use
pub use text::{Chunk, DEFAULT_MAX_LINES, LineChunker, LineChunks, decode_dropping_invalid};
pub use walk::{WalkOptions, collect_files, is_supported_file};
