//! Markdown chunker: one chunk per heading section, named by the ancestor
//! heading path.

use super::{slice_lines, ParsedChunk, Parser};
use crate::error::Result;
use crate::types::ChunkKind;

pub struct MarkdownParser;

impl Parser for MarkdownParser {
    fn extensions(&self) -> &'static [&'static str] {
        &["md"]
    }

    fn parse(&self, _filepath: &str, content: &str) -> Result<Vec<ParsedChunk>> {
        let lines: Vec<&str> = content.lines().collect();
        if lines.is_empty() {
            return Ok(vec![ParsedChunk {
                content: String::new(),
                start_line: 1,
                end_line: 1,
                kind: ChunkKind::File,
                name: None,
                exported: false,
                doc_comment: None,
            }]);
        }

        // Locate headings, ignoring lines inside code fences.
        let mut headings: Vec<(usize, usize, String)> = Vec::new(); // (idx, level, title)
        let mut in_fence = false;
        for (i, line) in lines.iter().enumerate() {
            let trimmed = line.trim_start();
            if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
                in_fence = !in_fence;
                continue;
            }
            if in_fence {
                continue;
            }
            if let Some((level, title)) = parse_heading(trimmed) {
                headings.push((i, level, title));
            }
        }

        // No headings at all: the whole document is one chunk.
        if headings.is_empty() {
            return Ok(vec![ParsedChunk {
                content: lines.join("\n"),
                start_line: 1,
                end_line: lines.len(),
                kind: ChunkKind::File,
                name: None,
                exported: false,
                doc_comment: None,
            }]);
        }

        let mut chunks = Vec::new();

        // Preamble before the first heading.
        let first_heading = headings.first().map(|(i, _, _)| *i).unwrap_or(lines.len());
        if first_heading > 0 {
            let has_content = lines[..first_heading].iter().any(|l| !l.trim().is_empty());
            if has_content {
                chunks.push(ParsedChunk {
                    content: slice_lines(&lines, 1, first_heading),
                    start_line: 1,
                    end_line: first_heading,
                    kind: ChunkKind::Block,
                    name: None,
                    exported: false,
                    doc_comment: None,
                });
            }
        }

        // One chunk per heading, named by its ancestor path.
        let mut stack: Vec<(usize, String)> = Vec::new();
        for (pos, (idx, level, title)) in headings.iter().enumerate() {
            while stack.last().map(|(l, _)| *l >= *level).unwrap_or(false) {
                stack.pop();
            }
            stack.push((*level, title.clone()));
            let name = stack.iter().map(|(_, t)| t.as_str()).collect::<Vec<_>>().join(" > ");

            let end_idx = headings
                .get(pos + 1)
                .map(|(next, _, _)| *next)
                .unwrap_or(lines.len());
            chunks.push(ParsedChunk {
                content: slice_lines(&lines, idx + 1, end_idx),
                start_line: idx + 1,
                end_line: end_idx,
                kind: ChunkKind::Block,
                name: Some(name),
                exported: false,
                doc_comment: None,
            });
        }

        Ok(chunks)
    }
}

fn parse_heading(trimmed: &str) -> Option<(usize, String)> {
    let hashes = trimmed.chars().take_while(|&c| c == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &trimmed[hashes..];
    if !rest.starts_with(' ') && !rest.is_empty() {
        return None;
    }
    let title = rest.trim().trim_end_matches('#').trim().to_string();
    if title.is_empty() {
        return None;
    }
    Some((hashes, title))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heading_path_names() {
        let src = "\
intro text

# Guide
top

## Setup
install steps

### Linux
apt install

## Usage
run it
";
        let chunks = MarkdownParser.parse("README.md", src).unwrap();
        assert!(chunks[0].name.is_none()); // preamble
        let names: Vec<&str> = chunks.iter().filter_map(|c| c.name.as_deref()).collect();
        assert_eq!(names, vec!["Guide", "Guide > Setup", "Guide > Setup > Linux", "Guide > Usage"]);
    }

    #[test]
    fn test_section_extents() {
        let src = "# A\none\ntwo\n# B\nthree\n";
        let chunks = MarkdownParser.parse("d.md", src).unwrap();
        assert_eq!((chunks[0].start_line, chunks[0].end_line), (1, 3));
        assert_eq!((chunks[1].start_line, chunks[1].end_line), (4, 5));
    }

    #[test]
    fn test_fenced_hash_not_a_heading() {
        let src = "# Real\n```sh\n# comment in fence\n```\ntail\n";
        let chunks = MarkdownParser.parse("d.md", src).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].name.as_deref(), Some("Real"));
    }

    #[test]
    fn test_no_headings_single_file_chunk() {
        let src = "just some text\nacross lines\n";
        let chunks = MarkdownParser.parse("d.md", src).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].kind, ChunkKind::File);
    }
}
