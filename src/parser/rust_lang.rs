//! Rust chunker: functions, structs, enums, traits, impls, type aliases,
//! consts, and statics at the top level.

use regex::Regex;
use std::sync::OnceLock;

use super::{
    brace_extent, doc_comment_above, fill_gaps, slice_lines, ParsedChunk, Parser, RUST_STYLE,
};
use crate::error::Result;
use crate::types::ChunkKind;

fn fn_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(pub(?:\([^)]*\))?\s+)?(?:async\s+)?(?:unsafe\s+)?(?:extern\s+\S+\s+)?fn\s+(\w+)")
            .unwrap()
    })
}

fn item_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(pub(?:\([^)]*\))?\s+)?(struct|enum|trait|type|const|static|mod|union)\s+(\w+)")
            .unwrap()
    })
}

fn impl_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^impl(?:\s*<[^>]*>)?\s+(?:(?:\w+(?:::\w+)*)\s+for\s+)?(\w+)").unwrap()
    })
}

pub struct RustParser;

impl Parser for RustParser {
    fn extensions(&self) -> &'static [&'static str] {
        &["rs"]
    }

    fn parse(&self, _filepath: &str, content: &str) -> Result<Vec<ParsedChunk>> {
        let lines: Vec<&str> = content.lines().collect();
        let mut decls: Vec<ParsedChunk> = Vec::new();
        let mut i = 0usize;
        let mut covered_until = 0usize;

        while i < lines.len() {
            let line = lines[i];
            let parsed = classify_line(line);
            let Some((kind, name, exported)) = parsed else {
                i += 1;
                continue;
            };

            // Attribute lines directly above belong to the item.
            let mut start = i;
            while start > covered_until && lines[start - 1].trim_start().starts_with("#[") {
                start -= 1;
            }

            let end = brace_extent(&lines, i, RUST_STYLE);
            decls.push(ParsedChunk {
                content: slice_lines(&lines, start + 1, end + 1),
                start_line: start + 1,
                end_line: end + 1,
                kind,
                name: Some(name),
                exported,
                doc_comment: doc_comment_above(&lines, start),
            });
            covered_until = end + 1;
            i = end + 1;
        }

        Ok(fill_gaps(&lines, decls))
    }
}

fn classify_line(line: &str) -> Option<(ChunkKind, String, bool)> {
    if let Some(c) = fn_re().captures(line) {
        return Some((ChunkKind::Function, c[2].to_string(), c.get(1).is_some()));
    }
    if let Some(c) = item_re().captures(line) {
        let exported = c.get(1).is_some();
        let name = c[3].to_string();
        let kind = match &c[2] {
            "struct" | "union" => ChunkKind::Class,
            "enum" => ChunkKind::Enum,
            "trait" => ChunkKind::Interface,
            "type" => ChunkKind::Type,
            "const" | "static" => ChunkKind::Variable,
            "mod" => ChunkKind::Block,
            _ => ChunkKind::Block,
        };
        return Some((kind, name, exported));
    }
    if let Some(c) = impl_re().captures(line) {
        return Some((ChunkKind::Class, c[1].to_string(), false));
    }
    None
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fn_struct_enum_trait() {
        let src = "\
use std::fmt;

/// Greets a user by name.
pub fn greet(name: &str) -> String {
    format!(\"hi {name}\")
}

#[derive(Debug)]
pub struct Session {
    token: String,
}

enum State {
    Open,
    Closed,
}

pub trait Validator {
    fn validate(&self) -> bool;
}
";
        let chunks = RustParser.parse("lib.rs", src).unwrap();
        let f = chunks.iter().find(|c| c.name.as_deref() == Some("greet")).unwrap();
        assert_eq!(f.kind, ChunkKind::Function);
        assert!(f.exported);
        assert_eq!(f.doc_comment.as_deref(), Some("Greets a user by name."));

        let s = chunks.iter().find(|c| c.name.as_deref() == Some("Session")).unwrap();
        assert_eq!(s.kind, ChunkKind::Class);
        assert!(s.content.starts_with("#[derive(Debug)]"));

        let e = chunks.iter().find(|c| c.name.as_deref() == Some("State")).unwrap();
        assert_eq!(e.kind, ChunkKind::Enum);
        assert!(!e.exported);

        assert!(chunks
            .iter()
            .any(|c| c.kind == ChunkKind::Interface && c.name.as_deref() == Some("Validator")));
    }

    #[test]
    fn test_impl_block_named_after_type() {
        let src = "impl Session {\n    pub fn new() -> Self {\n        todo!()\n    }\n}\n";
        let chunks = RustParser.parse("s.rs", src).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].name.as_deref(), Some("Session"));
        assert_eq!((chunks[0].start_line, chunks[0].end_line), (1, 5));
    }

    #[test]
    fn test_trait_impl_named_after_type() {
        let src = "impl fmt::Display for Session {\n    fn fmt(&self) {}\n}\n";
        let chunks = RustParser.parse("s.rs", src).unwrap();
        assert_eq!(chunks[0].name.as_deref(), Some("Session"));
    }

    #[test]
    fn test_const_and_type_alias() {
        let src = "pub const MAX_RETRIES: usize = 3;\n\ntype SessionId = String;\n";
        let chunks = RustParser.parse("c.rs", src).unwrap();
        assert!(chunks
            .iter()
            .any(|c| c.kind == ChunkKind::Variable && c.name.as_deref() == Some("MAX_RETRIES")));
        assert!(chunks
            .iter()
            .any(|c| c.kind == ChunkKind::Type && c.name.as_deref() == Some("SessionId")));
    }

    #[test]
    fn test_lifetime_generics_do_not_break_extent() {
        let src = "pub fn first<'a>(items: &'a [String]) -> Option<&'a String> {\n    items.first()\n}\n";
        let chunks = RustParser.parse("l.rs", src).unwrap();
        let f = chunks.iter().find(|c| c.name.as_deref() == Some("first")).unwrap();
        assert_eq!((f.start_line, f.end_line), (1, 3));
    }
}
