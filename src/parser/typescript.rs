//! TypeScript / JavaScript chunker.
//!
//! Line-scanning heuristics: top-level function, class, interface, type,
//! enum, and arrow-function declarations become named chunks; uncovered
//! ranges (imports, loose statements) become `block` chunks.

use regex::Regex;
use std::sync::OnceLock;

use super::{brace_extent, doc_comment_above, fill_gaps, slice_lines, ParsedChunk, Parser, C_STYLE};
use crate::error::Result;
use crate::types::ChunkKind;

fn function_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(export\s+)?(default\s+)?(async\s+)?function\s*\*?\s*(\w+)").unwrap()
    })
}

fn class_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(export\s+)?(default\s+)?(abstract\s+)?class\s+(\w+)").unwrap())
}

fn interface_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(export\s+)?interface\s+(\w+)").unwrap())
}

fn type_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(export\s+)?type\s+(\w+)\s*(<[^=]*>)?\s*=").unwrap())
}

fn enum_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(export\s+)?(const\s+)?enum\s+(\w+)").unwrap())
}

fn arrow_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(export\s+)?(const|let|var)\s+(\w+)\s*(?::[^=]+)?=\s*(async\s+)?(\(|function\b|\w+\s*=>)")
            .unwrap()
    })
}

fn variable_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*export\s+(const|let|var)\s+(\w+)").unwrap())
}

pub struct TypeScriptParser;

impl Parser for TypeScriptParser {
    fn extensions(&self) -> &'static [&'static str] {
        &["ts", "tsx", "js", "jsx", "mjs", "cjs"]
    }

    fn parse(&self, _filepath: &str, content: &str) -> Result<Vec<ParsedChunk>> {
        let lines: Vec<&str> = content.lines().collect();
        let mut decls: Vec<ParsedChunk> = Vec::new();
        let mut i = 0usize;

        while i < lines.len() {
            let line = lines[i];
            let decl = classify_line(line);
            let Some((kind, name, exported)) = decl else {
                i += 1;
                continue;
            };

            // Declarations only count at top level; indented matches are
            // methods or locals and stay inside their parent chunk.
            if line.starts_with(' ') || line.starts_with('\t') {
                i += 1;
                continue;
            }

            let end = brace_extent(&lines, i, C_STYLE);
            decls.push(ParsedChunk {
                content: slice_lines(&lines, i + 1, end + 1),
                start_line: i + 1,
                end_line: end + 1,
                kind,
                name: Some(name),
                exported,
                doc_comment: doc_comment_above(&lines, i),
            });
            i = end + 1;
        }

        Ok(fill_gaps(&lines, decls))
    }
}

fn classify_line(line: &str) -> Option<(ChunkKind, String, bool)> {
    if let Some(c) = function_re().captures(line) {
        return Some((ChunkKind::Function, c[4].to_string(), c.get(1).is_some()));
    }
    if let Some(c) = class_re().captures(line) {
        return Some((ChunkKind::Class, c[4].to_string(), c.get(1).is_some()));
    }
    if let Some(c) = interface_re().captures(line) {
        return Some((ChunkKind::Interface, c[2].to_string(), c.get(1).is_some()));
    }
    if let Some(c) = enum_re().captures(line) {
        return Some((ChunkKind::Enum, c[3].to_string(), c.get(1).is_some()));
    }
    if let Some(c) = type_re().captures(line) {
        return Some((ChunkKind::Type, c[2].to_string(), c.get(1).is_some()));
    }
    if let Some(c) = arrow_re().captures(line) {
        return Some((ChunkKind::Function, c[3].to_string(), c.get(1).is_some()));
    }
    if let Some(c) = variable_re().captures(line) {
        return Some((ChunkKind::Variable, c[2].to_string(), true));
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
    fn test_function_and_class() {
        let src = "\
import { db } from './db';

/** Authenticate a user by token. */
export function authenticateUser(token: string): boolean {
  return db.sessions.has(token);
}

export class SessionStore {
  private items = new Map();

  get(id: string) {
    return this.items.get(id);
  }
}
";
        let chunks = TypeScriptParser.parse("auth.ts", src).unwrap();
        let func = chunks.iter().find(|c| c.name.as_deref() == Some("authenticateUser")).unwrap();
        assert_eq!(func.kind, ChunkKind::Function);
        assert!(func.exported);
        assert_eq!((func.start_line, func.end_line), (4, 6));
        assert_eq!(func.doc_comment.as_deref(), Some("Authenticate a user by token."));

        let class = chunks.iter().find(|c| c.name.as_deref() == Some("SessionStore")).unwrap();
        assert_eq!(class.kind, ChunkKind::Class);
        assert_eq!((class.start_line, class.end_line), (8, 14));
    }

    #[test]
    fn test_interface_type_enum() {
        let src = "\
export interface UserProfile {
  name: string;
}

type SessionId = string;

export enum Role {
  Admin,
  Member,
}
";
        let chunks = TypeScriptParser.parse("types.ts", src).unwrap();
        assert!(chunks
            .iter()
            .any(|c| c.kind == ChunkKind::Interface && c.name.as_deref() == Some("UserProfile")));
        let alias = chunks.iter().find(|c| c.kind == ChunkKind::Type).unwrap();
        assert_eq!(alias.name.as_deref(), Some("SessionId"));
        assert!(!alias.exported);
        assert!(chunks
            .iter()
            .any(|c| c.kind == ChunkKind::Enum && c.name.as_deref() == Some("Role")));
    }

    #[test]
    fn test_arrow_function() {
        let src = "export const hashPassword = async (plain: string) => {\n  return hash(plain);\n};\n";
        let chunks = TypeScriptParser.parse("hash.ts", src).unwrap();
        let arrow = chunks.iter().find(|c| c.name.as_deref() == Some("hashPassword")).unwrap();
        assert_eq!(arrow.kind, ChunkKind::Function);
        assert!(arrow.exported);
    }

    #[test]
    fn test_methods_stay_inside_class_chunk() {
        let src = "class A {\n  method() {\n    return 1;\n  }\n}\n";
        let chunks = TypeScriptParser.parse("a.ts", src).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].name.as_deref(), Some("A"));
    }

    #[test]
    fn test_content_matches_line_slices() {
        let src = "const x = 1;\n\nexport function f() {\n  return x;\n}\n";
        let lines: Vec<&str> = src.lines().collect();
        for chunk in TypeScriptParser.parse("x.ts", src).unwrap() {
            assert_eq!(chunk.content, slice_lines(&lines, chunk.start_line, chunk.end_line));
        }
    }

    #[test]
    fn test_gap_blocks_cover_imports() {
        let src = "import a from 'a';\nimport b from 'b';\n\nexport function f() {}\n";
        let chunks = TypeScriptParser.parse("x.ts", src).unwrap();
        assert_eq!(chunks[0].kind, ChunkKind::Block);
        assert!(chunks[0].content.contains("import a"));
    }
}
