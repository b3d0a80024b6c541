//! Parser port: per-language file to ordered chunk list.
//!
//! A parser declares the extensions it handles and produces ordered
//! [`ParsedChunk`]s whose content is exactly the covered lines joined with
//! newline. The plain-text parser emits one `file` chunk for anything, so
//! every file is retrievable even without a language parser. Language
//! parsers are line/brace-scanning heuristics; selection is by extension
//! with ties broken by registration order (first wins).

mod go;
mod json;
mod markdown;
mod plain;
mod python;
mod rust_lang;
mod typescript;

pub use go::GoParser;
pub use json::{dot_paths, JsonParser};
pub use markdown::MarkdownParser;
pub use plain::PlainTextParser;
pub use python::PythonParser;
pub use rust_lang::RustParser;
pub use typescript::TypeScriptParser;

use crate::error::Result;
use crate::types::ChunkKind;

/// A chunk as produced by a parser, before ids and embeddings are attached.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedChunk {
    pub content: String,
    /// 1-based, inclusive.
    pub start_line: usize,
    /// 1-based, inclusive.
    pub end_line: usize,
    pub kind: ChunkKind,
    pub name: Option<String>,
    pub exported: bool,
    pub doc_comment: Option<String>,
}

/// A value that turns file content into an ordered chunk list.
pub trait Parser: Send + Sync {
    /// Extensions (lowercase, no dot) this parser handles.
    fn extensions(&self) -> &'static [&'static str];
    /// Produce ordered chunks covering the file.
    fn parse(&self, filepath: &str, content: &str) -> Result<Vec<ParsedChunk>>;
}

/// Built-in parsers in registration order. First match on extension wins;
/// the plain-text parser at the end catches everything.
pub fn registered_parsers() -> &'static [&'static dyn Parser] {
    static PARSERS: &[&dyn Parser] = &[
        &TypeScriptParser,
        &PythonParser,
        &GoParser,
        &RustParser,
        &MarkdownParser,
        &JsonParser,
        &PlainTextParser,
    ];
    PARSERS
}

/// Select the parser for an extension.
pub fn parser_for_extension(ext: &str) -> &'static dyn Parser {
    for parser in registered_parsers() {
        if parser.extensions().contains(&ext) {
            return *parser;
        }
    }
    &PlainTextParser
}

// ---------------------------------------------------------------------------
// Shared line helpers
// ---------------------------------------------------------------------------

/// Join `lines[start-1..=end-1]` with newline (1-based, inclusive).
pub(crate) fn slice_lines(lines: &[&str], start_line: usize, end_line: usize) -> String {
    lines[start_line - 1..end_line].join("\n")
}

/// Which characters delimit strings and line comments for a language family.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LexStyle {
    pub quotes: &'static [char],
    pub slash_comments: bool,
    pub hash_comments: bool,
}

/// C-family: double/single/backtick strings, `//` comments.
pub(crate) const C_STYLE: LexStyle =
    LexStyle { quotes: &['"', '\'', '`'], slash_comments: true, hash_comments: false };

/// Rust: single quotes stay (lifetimes), `//` comments.
pub(crate) const RUST_STYLE: LexStyle =
    LexStyle { quotes: &['"'], slash_comments: true, hash_comments: false };

/// Find the inclusive end line of a brace-delimited body starting at
/// `start_idx` (0-based). Falls back to the first line ending in `;` (or the
/// start line itself) when no opening brace appears within a few lines.
pub(crate) fn brace_extent(lines: &[&str], start_idx: usize, style: LexStyle) -> usize {
    let mut depth = 0i32;
    let mut opened = false;
    for (i, line) in lines.iter().enumerate().skip(start_idx) {
        for c in strip_strings_and_comments(line, style).chars() {
            match c {
                '{' => {
                    depth += 1;
                    opened = true;
                }
                '}' => depth -= 1,
                _ => {}
            }
        }
        if opened && depth <= 0 {
            return i;
        }
        if !opened {
            let trimmed = line.trim_end();
            if trimmed.ends_with(';') {
                return i;
            }
            // Headers rarely run longer than a handful of lines.
            if i >= start_idx + 8 {
                return start_idx;
            }
        }
    }
    lines.len().saturating_sub(1)
}

/// Replace string literal bodies and trailing line comments with spaces so
/// brace counting does not trip over them. Heuristic, not a lexer.
pub(crate) fn strip_strings_and_comments(line: &str, style: LexStyle) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars().peekable();
    let mut in_string: Option<char> = None;
    while let Some(c) = chars.next() {
        match in_string {
            Some(quote) => {
                if c == '\\' {
                    chars.next();
                    out.push(' ');
                    out.push(' ');
                } else if c == quote {
                    in_string = None;
                    out.push(c);
                } else {
                    out.push(' ');
                }
            }
            None => {
                if style.quotes.contains(&c) {
                    in_string = Some(c);
                    out.push(c);
                } else if style.slash_comments && c == '/' && chars.peek() == Some(&'/') {
                    break;
                } else if style.hash_comments && c == '#' {
                    break;
                } else {
                    out.push(c);
                }
            }
        }
    }
    out
}

/// Collect a doc comment ending directly above `decl_idx` (0-based).
///
/// Handles `/** ... */` blocks and runs of `//`, `///`, or `#` lines. The
/// marker characters are stripped; lines are joined with newline.
pub(crate) fn doc_comment_above(lines: &[&str], decl_idx: usize) -> Option<String> {
    if decl_idx == 0 {
        return None;
    }
    let mut i = decl_idx as isize - 1;

    // Skip attribute/decorator lines between doc and declaration.
    while i >= 0 {
        let t = lines[i as usize].trim();
        if t.starts_with('@') || t.starts_with("#[") {
            i -= 1;
        } else {
            break;
        }
    }
    if i < 0 {
        return None;
    }

    let t = lines[i as usize].trim();
    if t.ends_with("*/") {
        // Walk up to the /** opener.
        let end = i as usize;
        let mut start = end;
        loop {
            let s = lines[start].trim();
            if s.starts_with("/*") {
                break;
            }
            if start == 0 {
                return None;
            }
            start -= 1;
        }
        let text: Vec<String> = lines[start..=end]
            .iter()
            .map(|l| {
                l.trim()
                    .trim_start_matches("/**")
                    .trim_start_matches("/*")
                    .trim_end_matches("*/")
                    .trim_start_matches('*')
                    .trim()
                    .to_string()
            })
            .filter(|l| !l.is_empty())
            .collect();
        if text.is_empty() {
            return None;
        }
        return Some(text.join("\n"));
    }

    if t.starts_with("//") || t.starts_with('#') {
        let end = i as usize;
        let mut start = end;
        while start > 0 {
            let s = lines[start - 1].trim();
            if s.starts_with("//") || (s.starts_with('#') && !s.starts_with("#[")) {
                start -= 1;
            } else {
                break;
            }
        }
        let text: Vec<String> = lines[start..=end]
            .iter()
            .map(|l| {
                l.trim()
                    .trim_start_matches("///")
                    .trim_start_matches("//!")
                    .trim_start_matches("//")
                    .trim_start_matches('#')
                    .trim()
                    .to_string()
            })
            .filter(|l| !l.is_empty())
            .collect();
        if text.is_empty() {
            return None;
        }
        return Some(text.join("\n"));
    }

    None
}

/// Fill uncovered line ranges with `block` chunks so the whole file stays
/// retrievable. `decls` must be ordered and non-overlapping.
pub(crate) fn fill_gaps(lines: &[&str], decls: Vec<ParsedChunk>) -> Vec<ParsedChunk> {
    let mut out = Vec::with_capacity(decls.len() + 2);
    let mut cursor = 1usize; // next uncovered line (1-based)
    for decl in decls {
        if decl.start_line > cursor {
            push_gap(lines, cursor, decl.start_line - 1, &mut out);
        }
        cursor = decl.end_line + 1;
        out.push(decl);
    }
    if cursor <= lines.len() {
        push_gap(lines, cursor, lines.len(), &mut out);
    }
    out
}

fn push_gap(lines: &[&str], start: usize, end: usize, out: &mut Vec<ParsedChunk>) {
    let has_content = lines[start - 1..end].iter().any(|l| !l.trim().is_empty());
    if !has_content {
        return;
    }
    out.push(ParsedChunk {
        content: slice_lines(lines, start, end),
        start_line: start,
        end_line: end,
        kind: ChunkKind::Block,
        name: None,
        exported: false,
        doc_comment: None,
    });
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parser_selection_by_extension() {
        assert_eq!(parser_for_extension("ts").extensions(), TypeScriptParser.extensions());
        assert_eq!(parser_for_extension("py").extensions(), PythonParser.extensions());
        // Unknown extensions land on the plain-text parser.
        assert_eq!(parser_for_extension("txt").extensions(), PlainTextParser.extensions());
        assert_eq!(parser_for_extension("zzz").extensions(), PlainTextParser.extensions());
    }

    #[test]
    fn test_brace_extent_simple() {
        let lines: Vec<&str> = "fn a() {\n  body();\n}\nfn b() {}".lines().collect();
        assert_eq!(brace_extent(&lines, 0, RUST_STYLE), 2);
        assert_eq!(brace_extent(&lines, 3, RUST_STYLE), 3);
    }

    #[test]
    fn test_brace_extent_ignores_braces_in_strings() {
        let lines: Vec<&str> = "fn a() {\n  let s = \"}}}\";\n}".lines().collect();
        assert_eq!(brace_extent(&lines, 0, RUST_STYLE), 2);
    }

    #[test]
    fn test_brace_extent_with_lifetimes() {
        let lines: Vec<&str> =
            "fn first<'a>(items: &'a [String]) -> &'a str {\n  &items[0]\n}".lines().collect();
        assert_eq!(brace_extent(&lines, 0, RUST_STYLE), 2);
    }

    #[test]
    fn test_doc_comment_slash_block() {
        let lines: Vec<&str> =
            "/**\n * Adds numbers.\n */\nfunction add() {}".lines().collect();
        assert_eq!(doc_comment_above(&lines, 3).as_deref(), Some("Adds numbers."));
    }

    #[test]
    fn test_doc_comment_line_run() {
        let lines: Vec<&str> = "// first\n// second\nfn x() {}".lines().collect();
        assert_eq!(doc_comment_above(&lines, 2).as_deref(), Some("first\nsecond"));
    }

    #[test]
    fn test_fill_gaps_covers_whole_file() {
        let content = "import a;\n\nfn x() {\n}\n\ntrailing";
        let lines: Vec<&str> = content.lines().collect();
        let decl = ParsedChunk {
            content: slice_lines(&lines, 3, 4),
            start_line: 3,
            end_line: 4,
            kind: ChunkKind::Function,
            name: Some("x".into()),
            exported: false,
            doc_comment: None,
        };
        let chunks = fill_gaps(&lines, vec![decl]);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].kind, ChunkKind::Block);
        assert_eq!((chunks[0].start_line, chunks[0].end_line), (1, 2));
        assert_eq!((chunks[2].start_line, chunks[2].end_line), (5, 6));
    }
}
