//! Line-addressed chunking for retrieval.
//!
//! Files are split into [`Chunk`]s: contiguous runs of whole lines that keep their
//! source path and the 1-indexed line they start on. The chunker walks the file
//! line by line and closes the current chunk as soon as either
//!
//! 1. the line just added is a *boundary*: blank (whitespace only), or nothing but
//!    a closing `}`, `)` or `]` with optional surrounding whitespace, or
//! 2. the chunk has reached the configured line cap.
//!
//! The boundary line stays with the chunk it closes, so a block's closing brace is
//! embedded together with the block body. Whatever is left at end of file becomes
//! the final chunk.
//!
//! The heuristic knows nothing about any particular language. It tends to keep
//! blank-line separated paragraphs and closed blocks together, and the line cap
//! bounds chunk size for files that never hit a boundary.
//!
//! # Guarantees
//!
//! * Concatenating the chunk texts in order reproduces the decoded content exactly.
//! * No chunk is empty and no chunk holds more than `max_lines` lines.
//! * Chunking is deterministic: the same content always yields the same chunks.
//!
//! # Usage
//!
//! ```
//! use ewiki_context::text::LineChunker;
//!
//! let chunker = LineChunker::new(50).unwrap();
//! let content = "fn main() {\n    println!(\"hi\");\n}\n\nfn other() {}\n";
//!
//! let chunks: Vec<_> = chunker.chunks("src/main.rs", content).collect();
//! assert_eq!(chunks.len(), 3);
//! assert_eq!(chunks[0].start_line, 1);
//! assert_eq!(chunks[0].text, "fn main() {\n    println!(\"hi\");\n}\n");
//! assert_eq!(chunks[1].text, "\n");
//! assert_eq!(chunks[2].start_line, 5);
//!
//! let rebuilt: String = chunks.iter().map(|c| c.text.as_str()).collect();
//! assert_eq!(rebuilt, content);
//! ```
use regex::RegexSet;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::io;
use std::iter::FusedIterator;
use std::path::Path;
use std::str::SplitInclusive;
use std::sync::LazyLock;

/// Default line cap for a single chunk.
pub const DEFAULT_MAX_LINES: usize = 50;

/// Patterns that mark a line as a chunk boundary.
///
/// - `^\s*$`: blank or whitespace-only line (paragraph and block separators)
/// - `^\s*[})\]]\s*$`: a lone closing brace, parenthesis or bracket
pub const BOUNDARY_PATTERNS: &[&str] = &[
    r"^\s*$",          // Blank lines
    r"^\s*[})\]]\s*$", // Lone closers
];

static BOUNDARIES: LazyLock<RegexSet> =
    LazyLock::new(|| RegexSet::new(BOUNDARY_PATTERNS).expect("boundary patterns are valid"));

/// Returns `true` if `line` closes the chunk it is appended to.
pub fn is_boundary_line(line: &str) -> bool {
    BOUNDARIES.is_match(line)
}

/// A contiguous run of lines from one source file.
///
/// The serialized field names (`path`, `start`, `text`) are the ones used by the
/// persisted index metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Path of the file the chunk was read from.
    #[serde(rename = "path")]
    pub source_path: String,
    /// 1-indexed line number of the first line in `text`.
    #[serde(rename = "start")]
    pub start_line: usize,
    /// The chunk's lines, line terminators included. Never empty.
    pub text: String,
}

impl Chunk {
    /// Number of lines in this chunk.
    pub fn line_count(&self) -> usize {
        self.text.split_inclusive('\n').count()
    }

    /// 1-indexed number of the last line in this chunk.
    pub fn end_line(&self) -> usize {
        self.start_line + self.line_count().saturating_sub(1)
    }
}

/// Boundary-seeking line chunker.
///
/// A `LineChunker` holds only its configuration, so one instance can chunk any
/// number of files, concurrently or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineChunker {
    max_lines: usize,
}

impl Default for LineChunker {
    fn default() -> Self {
        Self {
            max_lines: DEFAULT_MAX_LINES,
        }
    }
}

impl LineChunker {
    /// Creates a chunker that never emits more than `max_lines` lines per chunk.
    ///
    /// # Errors
    /// Returns [`io::ErrorKind::InvalidInput`] if `max_lines` is zero.
    pub fn new(max_lines: usize) -> io::Result<Self> {
        if max_lines == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "max_lines per chunk must be at least 1",
            ));
        }
        Ok(Self { max_lines })
    }

    /// The configured line cap.
    pub fn max_lines(&self) -> usize {
        self.max_lines
    }

    /// Lazily chunks `content`, attributing every chunk to `source_path`.
    ///
    /// The returned iterator borrows `content`; call `chunks` again to restart.
    pub fn chunks<'a>(&self, source_path: &'a str, content: &'a str) -> LineChunks<'a> {
        LineChunks {
            lines: content.split_inclusive('\n'),
            source_path,
            max_lines: self.max_lines,
            next_line: 1,
        }
    }

    /// Reads `path` and chunks its content.
    ///
    /// Bytes that are not valid UTF-8 are dropped rather than failing the read, so
    /// binary documents and mis-encoded files still produce (lossy) chunks.
    ///
    /// # Errors
    /// Only I/O errors from reading the file.
    pub fn read_file_chunks(&self, path: &Path) -> io::Result<Vec<Chunk>> {
        let bytes = std::fs::read(path)?;
        let content = decode_dropping_invalid(&bytes);
        let source_path = path.to_string_lossy();

        let chunks: Vec<Chunk> = self.chunks(&source_path, &content).collect();
        tracing::debug!(
            "Chunked {} into {} chunks (max lines: {})",
            path.display(),
            chunks.len(),
            self.max_lines
        );
        Ok(chunks)
    }
}

/// Decodes `bytes` as UTF-8, silently dropping any invalid sequences.
pub fn decode_dropping_invalid(bytes: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(bytes) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => Cow::Owned(bytes.utf8_chunks().map(|chunk| chunk.valid()).collect()),
    }
}

/// Iterator over the chunks of one file. Created by [`LineChunker::chunks`].
#[derive(Debug, Clone)]
pub struct LineChunks<'a> {
    lines: SplitInclusive<'a, char>,
    source_path: &'a str,
    max_lines: usize,
    /// 1-indexed number of the next line `lines` will yield.
    next_line: usize,
}

impl Iterator for LineChunks<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        let start_line = self.next_line;
        let mut text = String::new();
        let mut buffered = 0;

        for line in self.lines.by_ref() {
            self.next_line += 1;
            buffered += 1;
            text.push_str(line);

            if is_boundary_line(line) || buffered >= self.max_lines {
                break;
            }
        }

        if buffered == 0 {
            return None;
        }

        Some(Chunk {
            source_path: self.source_path.to_string(),
            start_line,
            text,
        })
    }
}

impl FusedIterator for LineChunks<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk_all(max_lines: usize, content: &str) -> Vec<Chunk> {
        LineChunker::new(max_lines)
            .unwrap()
            .chunks("test.rs", content)
            .collect()
    }

    #[test]
    fn test_boundary_detection() {
        assert!(is_boundary_line("\n"));
        assert!(is_boundary_line("   \t\n"));
        assert!(is_boundary_line("}\n"));
        assert!(is_boundary_line("    )  \n"));
        assert!(is_boundary_line("]"));
        assert!(is_boundary_line("  }\r\n"));

        assert!(!is_boundary_line("};\n"));
        assert!(!is_boundary_line("} else {\n"));
        assert!(!is_boundary_line("})\n"));
        assert!(!is_boundary_line("let x = 1;\n"));
    }

    #[test]
    fn test_closing_brace_ends_chunk() {
        let content = "fn a() {\n    1\n}\nfn b() {\n    2\n}\n";
        let chunks = chunk_all(50, content);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "fn a() {\n    1\n}\n");
        assert_eq!(chunks[0].start_line, 1);
        assert_eq!(chunks[1].text, "fn b() {\n    2\n}\n");
        assert_eq!(chunks[1].start_line, 4);
        assert_eq!(chunks[1].end_line(), 6);
    }

    #[test]
    fn test_line_cap_splits_long_runs() {
        let content: String = (1..=12).map(|i| format!("line {i}\n")).collect();
        let chunks = chunk_all(5, &content);

        let sizes: Vec<usize> = chunks.iter().map(Chunk::line_count).collect();
        assert_eq!(sizes, vec![5, 5, 2]);
        let starts: Vec<usize> = chunks.iter().map(|c| c.start_line).collect();
        assert_eq!(starts, vec![1, 6, 11]);
    }

    #[test]
    fn test_chunks_reconstruct_content() {
        let content = "# Title\n\nSome prose\nmore prose\n\n  ]\nlast line without newline";
        for max_lines in 1..6 {
            let chunks = chunk_all(max_lines, content);
            let rebuilt: String = chunks.iter().map(|c| c.text.as_str()).collect();
            assert_eq!(rebuilt, content, "max_lines = {max_lines}");
            assert!(chunks.iter().all(|c| !c.text.is_empty()));
            assert!(chunks.iter().all(|c| c.line_count() <= max_lines));
        }
    }

    #[test]
    fn test_start_lines_are_contiguous() {
        let content = "a\nb\n\nc\n}\nd\ne\nf\n";
        let chunks = chunk_all(2, content);

        let mut expected = 1;
        for chunk in &chunks {
            assert_eq!(chunk.start_line, expected);
            expected = chunk.end_line() + 1;
        }
        assert_eq!(expected, 9);
    }

    #[test]
    fn test_empty_content_yields_nothing() {
        assert!(chunk_all(10, "").is_empty());
    }

    #[test]
    fn test_iterator_is_restartable() {
        let chunker = LineChunker::new(3).unwrap();
        let content = "x\ny\n\nz\n";
        let first: Vec<Chunk> = chunker.chunks("f.txt", content).collect();
        let second: Vec<Chunk> = chunker.chunks("f.txt", content).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_zero_line_cap_is_rejected() {
        let err = LineChunker::new(0).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_invalid_utf8_is_dropped() {
        let bytes = b"ok\xff\xfe line\nsecond\n";
        assert_eq!(decode_dropping_invalid(bytes), "ok line\nsecond\n");
        assert!(matches!(
            decode_dropping_invalid(b"clean"),
            Cow::Borrowed("clean")
        ));
    }

    #[test]
    fn test_chunk_serializes_with_metadata_field_names() {
        let chunk = Chunk {
            source_path: "src/lib.rs".to_string(),
            start_line: 7,
            text: "}\n".to_string(),
        };
        let json = serde_json::to_value(&chunk).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"path": "src/lib.rs", "start": 7, "text": "}\n"})
        );
    }
}
