//! Python chunker: top-level `def` and `class` blocks by indentation.

use regex::Regex;
use std::sync::OnceLock;

use super::{fill_gaps, slice_lines, ParsedChunk, Parser};
use crate::error::Result;
use crate::types::ChunkKind;

fn def_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(async\s+)?def\s+(\w+)").unwrap())
}

fn class_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^class\s+(\w+)").unwrap())
}

pub struct PythonParser;

impl Parser for PythonParser {
    fn extensions(&self) -> &'static [&'static str] {
        &["py", "pyi"]
    }

    fn parse(&self, _filepath: &str, content: &str) -> Result<Vec<ParsedChunk>> {
        let lines: Vec<&str> = content.lines().collect();
        let mut decls: Vec<ParsedChunk> = Vec::new();
        let mut i = 0usize;
        let mut covered_until = 0usize; // last line index consumed (1-based)

        while i < lines.len() {
            let line = lines[i];
            let (kind, name) = if let Some(c) = def_re().captures(line) {
                (ChunkKind::Function, c[2].to_string())
            } else if let Some(c) = class_re().captures(line) {
                (ChunkKind::Class, c[1].to_string())
            } else {
                i += 1;
                continue;
            };

            // Pull contiguous decorator lines into the chunk.
            let mut start = i;
            while start > covered_until && lines[start - 1].trim_start().starts_with('@') {
                start -= 1;
            }

            // Body: every following line that is blank or indented.
            let mut end = i;
            let mut j = i + 1;
            while j < lines.len() {
                let l = lines[j];
                if l.trim().is_empty() {
                    j += 1;
                    continue;
                }
                if l.starts_with(' ') || l.starts_with('\t') {
                    end = j;
                    j += 1;
                    continue;
                }
                break;
            }

            let exported = !name.starts_with('_');
            decls.push(ParsedChunk {
                content: slice_lines(&lines, start + 1, end + 1),
                start_line: start + 1,
                end_line: end + 1,
                kind,
                name: Some(name),
                exported,
                doc_comment: docstring(&lines, i, end),
            });
            covered_until = end + 1;
            i = end + 1;
        }

        Ok(fill_gaps(&lines, decls))
    }
}

/// First string literal in the body, stripped of its quotes.
fn docstring(lines: &[&str], def_idx: usize, end_idx: usize) -> Option<String> {
    let mut j = def_idx + 1;
    // The signature may span lines; skip until one ends with ':'.
    let mut sig_end = def_idx;
    while sig_end < end_idx && !lines[sig_end].trim_end().ends_with(':') {
        sig_end += 1;
    }
    j = j.max(sig_end + 1);

    while j <= end_idx {
        let t = lines[j].trim();
        if t.is_empty() {
            j += 1;
            continue;
        }
        for quote in ["\"\"\"", "'''"] {
            if let Some(rest) = t.strip_prefix(quote) {
                // Single-line docstring.
                if let Some(body) = rest.strip_suffix(quote) {
                    if !rest.is_empty() {
                        let body = body.trim();
                        return if body.is_empty() { None } else { Some(body.to_string()) };
                    }
                }
                // Multi-line: collect until the closing quotes.
                let mut parts: Vec<String> = Vec::new();
                if !rest.trim().is_empty() {
                    parts.push(rest.trim().to_string());
                }
                let mut k = j + 1;
                while k <= end_idx {
                    let lk = lines[k].trim();
                    if let Some(prefix) = lk.strip_suffix(quote) {
                        if !prefix.trim().is_empty() {
                            parts.push(prefix.trim().to_string());
                        }
                        return Some(parts.join("\n"));
                    }
                    if !lk.is_empty() {
                        parts.push(lk.to_string());
                    }
                    k += 1;
                }
                return Some(parts.join("\n"));
            }
        }
        return None;
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
    fn test_def_and_class() {
        let src = "\
import os

def load_config(path):
    \"\"\"Read the config file.\"\"\"
    return os.path.exists(path)


class SessionManager:
    def __init__(self):
        self.items = {}

    def get(self, key):
        return self.items.get(key)
";
        let chunks = PythonParser.parse("m.py", src).unwrap();
        let func = chunks.iter().find(|c| c.name.as_deref() == Some("load_config")).unwrap();
        assert_eq!(func.kind, ChunkKind::Function);
        assert!(func.exported);
        assert_eq!(func.doc_comment.as_deref(), Some("Read the config file."));
        assert_eq!((func.start_line, func.end_line), (3, 5));

        let class = chunks.iter().find(|c| c.name.as_deref() == Some("SessionManager")).unwrap();
        assert_eq!(class.kind, ChunkKind::Class);
        assert_eq!(class.end_line, 13);
    }

    #[test]
    fn test_decorators_included() {
        let src = "@app.route('/login')\ndef login():\n    return render()\n";
        let chunks = PythonParser.parse("m.py", src).unwrap();
        let func = chunks.iter().find(|c| c.name.as_deref() == Some("login")).unwrap();
        assert_eq!(func.start_line, 1);
        assert!(func.content.starts_with("@app.route"));
    }

    #[test]
    fn test_private_not_exported() {
        let src = "def _helper():\n    pass\n";
        let chunks = PythonParser.parse("m.py", src).unwrap();
        assert!(!chunks[0].exported);
    }

    #[test]
    fn test_multiline_docstring() {
        let src = "def f():\n    \"\"\"\n    First line.\n    Second line.\n    \"\"\"\n    pass\n";
        let chunks = PythonParser.parse("m.py", src).unwrap();
        assert_eq!(chunks[0].doc_comment.as_deref(), Some("First line.\nSecond line."));
    }

    #[test]
    fn test_imports_become_block() {
        let src = "import os\nimport sys\n\ndef f():\n    pass\n";
        let chunks = PythonParser.parse("m.py", src).unwrap();
        assert_eq!(chunks[0].kind, ChunkKind::Block);
        assert_eq!((chunks[0].start_line, chunks[0].end_line), (1, 2));
    }
}
