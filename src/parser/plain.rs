//! Fallback parser: one `file` chunk per file, any extension.

use super::{ParsedChunk, Parser};
use crate::error::Result;
use crate::types::ChunkKind;

pub struct PlainTextParser;

impl Parser for PlainTextParser {
    fn extensions(&self) -> &'static [&'static str] {
        // Fallback coverage; selection routes unknown extensions here too.
        &["txt"]
    }

    fn parse(&self, _filepath: &str, content: &str) -> Result<Vec<ParsedChunk>> {
        let lines: Vec<&str> = content.lines().collect();
        let end_line = lines.len().max(1);
        Ok(vec![ParsedChunk {
            content: lines.join("\n"),
            start_line: 1,
            end_line,
            kind: ChunkKind::File,
            name: None,
            exported: false,
            doc_comment: None,
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_file_chunk() {
        let chunks = PlainTextParser.parse("notes.txt", "alpha\nbeta\n").unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].kind, ChunkKind::File);
        assert_eq!(chunks[0].start_line, 1);
        assert_eq!(chunks[0].end_line, 2);
        assert_eq!(chunks[0].content, "alpha\nbeta");
    }

    #[test]
    fn test_empty_file_still_covered() {
        let chunks = PlainTextParser.parse("empty.txt", "").unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!((chunks[0].start_line, chunks[0].end_line), (1, 1));
        assert!(chunks[0].content.is_empty());
    }
}
