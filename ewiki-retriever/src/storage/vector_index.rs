//! Exact cosine-similarity index over L2-normalized rows.
//!
//! Every vector is normalized to unit length when it is added, and every query
//! is normalized before it is scored, so cosine similarity is a plain inner
//! product. Search is exhaustive: each query scores every row, which keeps
//! results exact and deterministic at the sizes a single collection reaches.
//!
//! ## On-disk format of `vectors.f32`
//!
//! ```text
//! offset  size  field
//! 0       4     magic "EWVI"
//! 4       4     format version (u32, currently 1)
//! 8       4     byte-order marker 0x01020304 (u32, native endian)
//! 12      4     reserved, zero
//! 16      8     rows (u64)
//! 24      8     dimension (u64)
//! 32      ...   rows * dimension f32 values, row-major, native endian
//! ```
//!
//! A file written on a machine of the other endianness fails the byte-order
//! check and is reported as corrupt rather than silently misread.

use super::{IndexEntry, IndexLocation, SearchHit};
use crate::error::{IndexError, Result};
use ewiki_context::Chunk;
use std::fs;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use tempfile::NamedTempFile;

const MAGIC: &[u8; 4] = b"EWVI";
const FORMAT_VERSION: u32 = 1;
const BYTE_ORDER_MARKER: u32 = 0x0102_0304;
const HEADER_LEN: usize = 32;

/// Normalizes `vector` to unit length in place. Zero vectors stay zero.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Row and dimension counts read from a `vectors.f32` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatrixHeader {
    pub rows: usize,
    pub dimension: usize,
}

impl MatrixHeader {
    fn encode(&self) -> [u8; HEADER_LEN] {
        let mut header = [0u8; HEADER_LEN];
        header[0..4].copy_from_slice(MAGIC);
        header[4..8].copy_from_slice(&FORMAT_VERSION.to_ne_bytes());
        header[8..12].copy_from_slice(&BYTE_ORDER_MARKER.to_ne_bytes());
        header[16..24].copy_from_slice(&(self.rows as u64).to_ne_bytes());
        header[24..32].copy_from_slice(&(self.dimension as u64).to_ne_bytes());
        header
    }

    fn decode(bytes: &[u8; HEADER_LEN], path: &Path) -> Result<Self> {
        let u32_at = |offset: usize| {
            let mut word = [0u8; 4];
            word.copy_from_slice(&bytes[offset..offset + 4]);
            u32::from_ne_bytes(word)
        };
        let u64_at = |offset: usize| {
            let mut word = [0u8; 8];
            word.copy_from_slice(&bytes[offset..offset + 8]);
            u64::from_ne_bytes(word)
        };

        if &bytes[0..4] != MAGIC {
            return Err(IndexError::corrupt(path, "not a vector matrix (bad magic)"));
        }
        if u32_at(8) != BYTE_ORDER_MARKER {
            return Err(IndexError::corrupt(
                path,
                "written with a different byte order",
            ));
        }
        let version = u32_at(4);
        if version != FORMAT_VERSION {
            return Err(IndexError::corrupt(
                path,
                format!("unsupported format version {version}"),
            ));
        }

        let rows = usize::try_from(u64_at(16))
            .map_err(|_| IndexError::corrupt(path, "row count does not fit in memory"))?;
        let dimension = usize::try_from(u64_at(24))
            .map_err(|_| IndexError::corrupt(path, "dimension does not fit in memory"))?;
        if rows > 0 && dimension == 0 {
            return Err(IndexError::corrupt(path, "rows present but dimension is zero"));
        }
        Ok(Self { rows, dimension })
    }

    /// Reads only the header of the matrix at `path`.
    pub fn read(path: &Path) -> Result<Self> {
        let mut file = fs::File::open(path)?;
        let mut bytes = [0u8; HEADER_LEN];
        file.read_exact(&mut bytes).map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => IndexError::corrupt(path, "truncated header"),
            _ => IndexError::from(e),
        })?;
        Self::decode(&bytes, path)
    }
}

/// An in-memory index: a row-major matrix of unit vectors plus the chunk for
/// each row.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    dimension: usize,
    rows: Vec<f32>,
    chunks: Vec<Chunk>,
}

impl VectorIndex {
    /// Creates an empty index of the given dimension.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            rows: Vec::new(),
            chunks: Vec::new(),
        }
    }

    /// Builds an index from entries in order. The dimension is taken from the
    /// first entry.
    ///
    /// # Errors
    /// * [`IndexError::EmptyIndex`] if there are no entries or the first vector is empty
    /// * [`IndexError::DimensionMismatch`] if any later vector has a different length
    pub fn from_entries(entries: Vec<IndexEntry>) -> Result<Self> {
        let Some(first) = entries.first() else {
            return Err(IndexError::empty("no entries to index"));
        };
        let dimension = first.vector.len();
        if dimension == 0 {
            return Err(IndexError::empty("embedding vectors have no components"));
        }

        let mut index = Self::new(dimension);
        index.rows.reserve(entries.len() * dimension);
        index.chunks.reserve(entries.len());
        for entry in entries {
            index.add(entry)?;
        }
        Ok(index)
    }

    /// Appends one entry, normalizing its vector.
    ///
    /// # Errors
    /// [`IndexError::DimensionMismatch`] if the vector length differs from the
    /// index dimension. The index is left unchanged.
    pub fn add(&mut self, entry: IndexEntry) -> Result<()> {
        let IndexEntry { chunk, mut vector } = entry;
        if vector.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        l2_normalize(&mut vector);
        self.rows.extend_from_slice(&vector);
        self.chunks.push(chunk);
        Ok(())
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Chunks in row order.
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// The normalized vector stored at `row`.
    pub fn row(&self, row: usize) -> Option<&[f32]> {
        let start = row.checked_mul(self.dimension)?;
        self.rows.get(start..start + self.dimension)
    }

    /// Returns the `min(k, len)` rows most similar to `query`, best first.
    ///
    /// Equal scores are ordered by row, lowest first, so the same query always
    /// returns the same hits in the same order.
    ///
    /// # Errors
    /// [`IndexError::DimensionMismatch`] if the query length differs from the
    /// index dimension.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let mut query = query.to_vec();
        l2_normalize(&mut query);

        let mut scored: Vec<(usize, f32)> = self
            .rows
            .chunks_exact(self.dimension)
            .map(|row| dot(row, &query))
            .enumerate()
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(row, score)| SearchHit {
                chunk: self.chunks[row].clone(),
                score,
                row,
            })
            .collect())
    }

    /// Writes both artifacts to `location`.
    ///
    /// Each artifact is first written to a temporary file in the target
    /// directory and then renamed into place, so readers never observe a
    /// half-written file. If the metadata rename fails after the matrix was
    /// renamed, the matrix is removed again so the pair stays consistent.
    pub fn save(&self, location: &IndexLocation) -> Result<()> {
        let dir = location.dir();
        fs::create_dir_all(dir)?;

        let mut vectors = NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(vectors.as_file_mut());
            let header = MatrixHeader {
                rows: self.len(),
                dimension: self.dimension,
            };
            writer.write_all(&header.encode())?;
            writer.write_all(bytemuck::cast_slice(&self.rows))?;
            writer.flush()?;
        }
        vectors.as_file().sync_all()?;

        let mut metadata = NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(metadata.as_file_mut());
            serde_json::to_writer_pretty(&mut writer, &self.chunks)?;
            writer.flush()?;
        }
        metadata.as_file().sync_all()?;

        let vector_path = location.vector_path();
        vectors.persist(&vector_path).map_err(|e| e.error)?;
        if let Err(e) = metadata.persist(location.metadata_path()) {
            tracing::error!(
                "Failed to place {}, removing {}: {}",
                location.metadata_path().display(),
                vector_path.display(),
                e.error
            );
            if let Err(cleanup) = fs::remove_file(&vector_path) {
                tracing::warn!("Could not remove {}: {}", vector_path.display(), cleanup);
            }
            return Err(e.error.into());
        }

        tracing::info!(
            "Saved index with {} rows of dimension {} to {}",
            self.len(),
            self.dimension,
            dir.display()
        );
        Ok(())
    }

    /// Reads both artifacts from `location`.
    ///
    /// # Errors
    /// * [`IndexError::IndexNotFound`] if either artifact is missing
    /// * [`IndexError::CorruptIndex`] if the header is invalid, the matrix is
    ///   truncated, the metadata cannot be parsed, or the row and record counts differ
    pub fn load(location: &IndexLocation) -> Result<Self> {
        if !location.exists() {
            return Err(IndexError::IndexNotFound {
                dir: location.dir().to_path_buf(),
            });
        }

        let vector_path = location.vector_path();
        let bytes = fs::read(&vector_path)?;
        let Some((header_bytes, data)) = bytes.split_first_chunk::<HEADER_LEN>() else {
            return Err(IndexError::corrupt(&vector_path, "truncated header"));
        };
        let header = MatrixHeader::decode(header_bytes, &vector_path)?;

        let expected_len = header
            .rows
            .checked_mul(header.dimension)
            .and_then(|n| n.checked_mul(std::mem::size_of::<f32>()));
        if expected_len != Some(data.len()) {
            return Err(IndexError::corrupt(
                &vector_path,
                format!(
                    "expected {} x {} values, found {} bytes",
                    header.rows,
                    header.dimension,
                    data.len()
                ),
            ));
        }
        let mut rows = vec![0.0f32; header.rows * header.dimension];
        bytemuck::cast_slice_mut::<f32, u8>(&mut rows).copy_from_slice(data);

        let metadata_path = location.metadata_path();
        let reader = BufReader::new(fs::File::open(&metadata_path)?);
        let chunks: Vec<Chunk> = serde_json::from_reader(reader)
            .map_err(|e| IndexError::corrupt(&metadata_path, e.to_string()))?;
        if chunks.len() != header.rows {
            return Err(IndexError::corrupt(
                &metadata_path,
                format!(
                    "{} metadata records for {} vectors",
                    chunks.len(),
                    header.rows
                ),
            ));
        }

        tracing::debug!(
            "Loaded index with {} rows of dimension {} from {}",
            header.rows,
            header.dimension,
            location.dir().display()
        );
        Ok(Self {
            dimension: header.dimension,
            rows,
            chunks,
        })
    }

    /// Removes both artifacts. Returns `true` if anything was removed.
    pub fn delete(location: &IndexLocation) -> Result<bool> {
        let mut removed = false;
        for path in [location.vector_path(), location.metadata_path()] {
            match fs::remove_file(&path) {
                Ok(()) => removed = true,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        if removed {
            tracing::info!("Deleted index in {}", location.dir().display());
        }
        Ok(removed)
    }
}
