//! JSON chunker: one `file` chunk per document.
//!
//! JSON retrieval is literal-driven; the data module extracts dot-path
//! literals from the parsed value tree, so the parser only validates the
//! document and emits the covering chunk.

use super::{ParsedChunk, Parser};
use crate::error::{Error, Result};
use crate::types::ChunkKind;

pub struct JsonParser;

impl Parser for JsonParser {
    fn extensions(&self) -> &'static [&'static str] {
        &["json"]
    }

    fn parse(&self, filepath: &str, content: &str) -> Result<Vec<ParsedChunk>> {
        serde_json::from_str::<serde_json::Value>(content).map_err(|e| Error::Parse {
            path: filepath.to_string(),
            message: e.to_string(),
        })?;
        let lines: Vec<&str> = content.lines().collect();
        Ok(vec![ParsedChunk {
            content: lines.join("\n"),
            start_line: 1,
            end_line: lines.len().max(1),
            kind: ChunkKind::File,
            name: None,
            exported: false,
            doc_comment: None,
        }])
    }
}

/// Flatten a JSON value into dot-path strings: `package.dependencies.react`.
/// Array elements use their index as the path segment.
pub fn dot_paths(value: &serde_json::Value) -> Vec<(String, usize)> {
    let mut out = Vec::new();
    walk(value, String::new(), 1, &mut out);
    out
}

fn walk(value: &serde_json::Value, prefix: String, line: usize, out: &mut Vec<(String, usize)>) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                out.push((path.clone(), line));
                walk(child, path, line, out);
            }
        }
        serde_json::Value::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                let path = if prefix.is_empty() {
                    i.to_string()
                } else {
                    format!("{prefix}.{i}")
                };
                walk(child, path, line, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_json_single_chunk() {
        let chunks = JsonParser.parse("package.json", "{\n  \"name\": \"app\"\n}\n").unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].kind, ChunkKind::File);
        assert_eq!(chunks[0].end_line, 3);
    }

    #[test]
    fn test_invalid_json_is_parse_error() {
        assert!(matches!(
            JsonParser.parse("bad.json", "{ nope"),
            Err(crate::error::Error::Parse { .. })
        ));
    }

    #[test]
    fn test_dot_paths() {
        let value: serde_json::Value = serde_json::from_str(
            r#"{"package": {"dependencies": {"react": "18"}}, "list": [{"id": 1}]}"#,
        )
        .unwrap();
        let paths: Vec<String> = dot_paths(&value).into_iter().map(|(p, _)| p).collect();
        assert!(paths.contains(&"package.dependencies.react".to_string()));
        assert!(paths.contains(&"list.0.id".to_string()));
        assert!(paths.contains(&"package".to_string()));
    }
}
