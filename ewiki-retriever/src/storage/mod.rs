//! Persistent storage for built indexes
//!
//! An index lives in a directory chosen by the caller and consists of exactly two
//! artifacts that are always written and removed together:
//!
//! ```text
//! <dir>/
//! ├── vectors.f32   header + row-major, L2-normalized f32 matrix (row i ...)
//! └── meta.json     ordered array of {"path","start","text"}     (... = record i)
//! ```
//!
//! Row `i` of the matrix and record `i` of the metadata describe the same chunk.
//! Nothing in this crate reorders, filters or appends to either artifact after
//! it has been written.

use ewiki_context::Chunk;
use serde::Serialize;
use std::path::{Path, PathBuf};

pub mod vector_index;

/// File name of the vector matrix inside an index directory.
pub const VECTOR_FILE: &str = "vectors.f32";
/// File name of the chunk metadata inside an index directory.
pub const METADATA_FILE: &str = "meta.json";

/// Where an index is (or will be) persisted.
///
/// Passed explicitly to every build, search and status call; there is no
/// process-wide "current index".
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexLocation {
    dir: PathBuf,
}

impl IndexLocation {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn vector_path(&self) -> PathBuf {
        self.dir.join(VECTOR_FILE)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.dir.join(METADATA_FILE)
    }

    /// `true` only if both artifacts are present.
    pub fn exists(&self) -> bool {
        self.vector_path().is_file() && self.metadata_path().is_file()
    }

    /// `true` if at least one artifact is present.
    pub fn any_exists(&self) -> bool {
        self.vector_path().exists() || self.metadata_path().exists()
    }
}

/// A chunk paired with its embedding, ready to be added to an index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// One ranked search result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub chunk: Chunk,
    /// Cosine similarity to the query, in `[-1, 1]`
    pub score: f32,
    /// Insertion row of the chunk in the index
    pub row: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_location_paths() {
        let location = IndexLocation::new("out/index");
        assert_eq!(location.vector_path(), Path::new("out/index/vectors.f32"));
        assert_eq!(location.metadata_path(), Path::new("out/index/meta.json"));
    }

    #[test]
    fn test_exists_requires_both_artifacts() {
        let dir = TempDir::new().unwrap();
        let location = IndexLocation::new(dir.path());
        assert!(!location.exists());
        assert!(!location.any_exists());

        std::fs::write(location.metadata_path(), "[]").unwrap();
        assert!(!location.exists());
        assert!(location.any_exists());

        std::fs::write(location.vector_path(), b"").unwrap();
        assert!(location.exists());
    }
}
