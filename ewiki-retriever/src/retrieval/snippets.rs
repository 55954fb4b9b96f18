//! Rendering of search hits as a prompt-ready block of code fragments

use crate::storage::SearchHit;

/// Heading placed above the rendered fragments.
pub const SNIPPETS_HEADER: &str = "\n=== retrieved code fragments ===";
/// Returned instead of a block when there is nothing to show.
pub const NO_SNIPPETS_MESSAGE: &str = "No relevant code fragments were found.";

/// Render `hits` in rank order, numbering fragments from 1.
///
/// ```text
///
/// === retrieved code fragments ===
///
/// [Fragment 1] File: src/lib.rs Line: 12 Score: 0.873
/// fn main() {}
/// ```
pub fn format_snippets(hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return NO_SNIPPETS_MESSAGE.to_string();
    }

    let mut blocks = Vec::with_capacity(hits.len() + 1);
    blocks.push(SNIPPETS_HEADER.to_string());
    for (i, hit) in hits.iter().enumerate() {
        blocks.push(format!(
            "\n[Fragment {}] File: {} Line: {} Score: {:.3}\n{}",
            i + 1,
            hit.chunk.source_path,
            hit.chunk.start_line,
            hit.score,
            hit.chunk.text
        ));
    }
    blocks.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use ewiki_context::Chunk;

    fn hit(path: &str, start_line: usize, text: &str, score: f32) -> SearchHit {
        SearchHit {
            chunk: Chunk {
                source_path: path.to_string(),
                start_line,
                text: text.to_string(),
            },
            score,
            row: 0,
        }
    }

    #[test]
    fn test_empty_hits() {
        assert_eq!(format_snippets(&[]), NO_SNIPPETS_MESSAGE);
    }

    #[test]
    fn test_fragments_in_rank_order() {
        let hits = vec![
            hit("src/a.rs", 1, "fn a() {}\n", 0.91234),
            hit("docs/b.md", 40, "# B\n", 0.5),
        ];

        let rendered = format_snippets(&hits);

        assert_eq!(
            rendered,
            "\n=== retrieved code fragments ===\n\
             \n[Fragment 1] File: src/a.rs Line: 1 Score: 0.912\nfn a() {}\n\n\
             \n[Fragment 2] File: docs/b.md Line: 40 Score: 0.500\n# B\n"
        );
    }
}
