//! Go chunker: functions, methods, type declarations, const/var groups.

use regex::Regex;
use std::sync::OnceLock;

use super::{brace_extent, doc_comment_above, fill_gaps, slice_lines, ParsedChunk, Parser, C_STYLE};
use crate::error::Result;
use crate::types::ChunkKind;

fn func_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^func\s+(?:\([^)]*\)\s+)?(\w+)\s*\(").unwrap())
}

fn type_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^type\s+(\w+)\s+(struct|interface)?").unwrap())
}

fn group_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(const|var)\s+(\()?\s*(\w+)?").unwrap())
}

pub struct GoParser;

impl Parser for GoParser {
    fn extensions(&self) -> &'static [&'static str] {
        &["go"]
    }

    fn parse(&self, _filepath: &str, content: &str) -> Result<Vec<ParsedChunk>> {
        let lines: Vec<&str> = content.lines().collect();
        let mut decls: Vec<ParsedChunk> = Vec::new();
        let mut i = 0usize;

        while i < lines.len() {
            let line = lines[i];

            if let Some(c) = func_re().captures(line) {
                let name = c[1].to_string();
                let end = brace_extent(&lines, i, C_STYLE);
                decls.push(make_chunk(&lines, i, end, ChunkKind::Function, Some(name)));
                i = end + 1;
                continue;
            }

            if let Some(c) = type_re().captures(line) {
                let name = c[1].to_string();
                let kind = match c.get(2).map(|m| m.as_str()) {
                    Some("struct") => ChunkKind::Class,
                    Some("interface") => ChunkKind::Interface,
                    _ => ChunkKind::Type,
                };
                let end = if line.contains('{') {
                    brace_extent(&lines, i, C_STYLE)
                } else {
                    i
                };
                decls.push(make_chunk(&lines, i, end, kind, Some(name)));
                i = end + 1;
                continue;
            }

            if let Some(c) = group_re().captures(line) {
                let grouped = c.get(2).is_some();
                let name = c.get(3).map(|m| m.as_str().to_string());
                let end = if grouped {
                    // Scan to the closing parenthesis line.
                    let mut j = i + 1;
                    while j < lines.len() && lines[j].trim() != ")" {
                        j += 1;
                    }
                    j.min(lines.len() - 1)
                } else {
                    i
                };
                decls.push(make_chunk(&lines, i, end, ChunkKind::Variable, name));
                i = end + 1;
                continue;
            }

            i += 1;
        }

        Ok(fill_gaps(&lines, decls))
    }
}

fn make_chunk(
    lines: &[&str],
    start_idx: usize,
    end_idx: usize,
    kind: ChunkKind,
    name: Option<String>,
) -> ParsedChunk {
    let exported = name
        .as_deref()
        .and_then(|n| n.chars().next())
        .map(|c| c.is_uppercase())
        .unwrap_or(false);
    ParsedChunk {
        content: slice_lines(lines, start_idx + 1, end_idx + 1),
        start_line: start_idx + 1,
        end_line: end_idx + 1,
        kind,
        name,
        exported,
        doc_comment: doc_comment_above(lines, start_idx),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_functions_and_methods() {
        let src = "\
package auth

// ValidateSession checks the session token.
func ValidateSession(token string) bool {
	return store.Has(token)
}

func (s *Store) get(key string) string {
	return s.items[key]
}
";
        let chunks = GoParser.parse("auth.go", src).unwrap();
        let f = chunks.iter().find(|c| c.name.as_deref() == Some("ValidateSession")).unwrap();
        assert_eq!(f.kind, ChunkKind::Function);
        assert!(f.exported);
        assert_eq!(f.doc_comment.as_deref(), Some("ValidateSession checks the session token."));
        assert_eq!((f.start_line, f.end_line), (4, 6));

        let m = chunks.iter().find(|c| c.name.as_deref() == Some("get")).unwrap();
        assert!(!m.exported);
    }

    #[test]
    fn test_struct_and_interface() {
        let src = "\
type Store struct {
	items map[string]string
}

type Reader interface {
	Read(key string) string
}

type SessionID = string
";
        let chunks = GoParser.parse("types.go", src).unwrap();
        assert!(chunks.iter().any(|c| c.kind == ChunkKind::Class && c.name.as_deref() == Some("Store")));
        assert!(chunks
            .iter()
            .any(|c| c.kind == ChunkKind::Interface && c.name.as_deref() == Some("Reader")));
        assert!(chunks.iter().any(|c| c.kind == ChunkKind::Type && c.name.as_deref() == Some("SessionID")));
    }

    #[test]
    fn test_const_group() {
        let src = "const (\n\tMaxRetries = 3\n\tTimeout    = 30\n)\n\nvar debug = false\n";
        let chunks = GoParser.parse("c.go", src).unwrap();
        let group = &chunks[0];
        assert_eq!(group.kind, ChunkKind::Variable);
        assert_eq!((group.start_line, group.end_line), (1, 4));
        assert!(chunks.iter().any(|c| c.name.as_deref() == Some("debug")));
    }
}
