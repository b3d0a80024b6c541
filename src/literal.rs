//! Exact-identifier inverted index with definition/reference distinction,
//! plus the query-side literal scanner.
//!
//! Identifiers enter the index while chunks are parsed; at query time the
//! free-text query is scanned for explicit (backtick or double-quoted) and
//! implicit (camelCase, PascalCase, SCREAMING_SNAKE, snake_case) literals,
//! and `build_match_map` resolves them to chunk hits.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

use crate::error::{Error, Result};
use crate::types::LiteralKind;

const FORMAT_TAG: &str = "raggrep-literals";
const FORMAT_VERSION: u32 = 1;

/// Cap on reference extractions per chunk; definitions are never dropped.
const MAX_REFS_PER_CHUNK: usize = 64;

// ---------------------------------------------------------------------------
// Identifier shapes
// ---------------------------------------------------------------------------

fn camel_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z][a-z0-9]*(?:[A-Z][a-zA-Z0-9]*)+$").unwrap())
}

fn pascal_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Two humps minimum, so sentence-initial capitalized words don't count.
    RE.get_or_init(|| Regex::new(r"^[A-Z][a-z0-9]+(?:[A-Z][a-zA-Z0-9]*)+$").unwrap())
}

fn screaming_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Z][A-Z0-9]*(?:_[A-Z0-9]+)+$").unwrap())
}

fn snake_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z][A-Za-z0-9]*(?:_[A-Za-z0-9]+)+$").unwrap())
}

fn word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]*").unwrap())
}

/// Does a bare token look like a code identifier rather than a natural word?
pub fn is_identifier_like(token: &str) -> bool {
    camel_re().is_match(token)
        || pascal_re().is_match(token)
        || screaming_re().is_match(token)
        || snake_re().is_match(token)
}

// ---------------------------------------------------------------------------
// Query parsing
// ---------------------------------------------------------------------------

/// A literal found in a user query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryLiteral {
    pub text: String,
    /// True when the user delimited it with backticks or double quotes.
    pub explicit: bool,
}

/// A query split into its literal and lexical parts.
#[derive(Debug, Clone)]
pub struct ParsedQuery {
    pub raw: String,
    pub literals: Vec<QueryLiteral>,
    /// Text left over after literal removal; feeds BM25 and embedding.
    pub residual: String,
}

impl ParsedQuery {
    pub fn literal_texts(&self) -> Vec<String> {
        self.literals.iter().map(|l| l.text.clone()).collect()
    }
}

/// Scan a free-text query for explicit and implicit literals.
pub fn parse_query(raw: &str) -> ParsedQuery {
    let mut literals: Vec<QueryLiteral> = Vec::new();
    let mut residual = String::new();

    // Pass 1: pull out delimited spans verbatim.
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '`' || c == '"' {
            let mut inner = String::new();
            let mut closed = false;
            for d in chars.by_ref() {
                if d == c {
                    closed = true;
                    break;
                }
                inner.push(d);
            }
            let trimmed = inner.trim();
            if closed && !trimmed.is_empty() {
                literals.push(QueryLiteral { text: trimmed.to_string(), explicit: true });
            } else {
                // Unterminated delimiter: keep the text as plain words.
                residual.push(' ');
                residual.push_str(&inner);
            }
        } else {
            residual.push(c);
        }
    }

    // Pass 2: lift implicit identifier tokens out of the remaining text.
    let mut lexical = String::new();
    let mut last_end = 0;
    let text = residual.clone();
    for m in word_re().find_iter(&text) {
        lexical.push_str(&text[last_end..m.start()]);
        let token = m.as_str();
        if is_identifier_like(token)
            && !literals.iter().any(|l| l.text == token)
        {
            literals.push(QueryLiteral { text: token.to_string(), explicit: false });
        } else {
            lexical.push_str(token);
        }
        last_end = m.end();
    }
    lexical.push_str(&text[last_end..]);

    let residual = lexical.split_whitespace().collect::<Vec<_>>().join(" ");
    ParsedQuery { raw: raw.to_string(), literals, residual }
}

// ---------------------------------------------------------------------------
// Chunk-side extraction
// ---------------------------------------------------------------------------

/// Extract identifier occurrences from a chunk's content.
///
/// The chunk's declared name becomes a definition at its start line;
/// identifier-shaped tokens in the body become references.
pub fn extract_chunk_literals(
    name: Option<&str>,
    content: &str,
    start_line: usize,
) -> Vec<crate::types::ExtractedLiteral> {
    use crate::types::ExtractedLiteral;

    let mut out = Vec::new();
    let mut def_name: Option<String> = None;
    if let Some(name) = name {
        let name = name.trim();
        if !name.is_empty() {
            def_name = Some(name.to_string());
            out.push(ExtractedLiteral {
                text: name.to_string(),
                kind: LiteralKind::Definition,
                confidence: 1.0,
                line: start_line,
            });
        }
    }

    let mut seen: HashMap<&str, usize> = HashMap::new();
    let mut refs = 0usize;
    for (offset, line) in content.lines().enumerate() {
        if refs >= MAX_REFS_PER_CHUNK {
            break;
        }
        for m in word_re().find_iter(line) {
            let token = m.as_str();
            if !is_identifier_like(token) {
                continue;
            }
            if def_name.as_deref() == Some(token) {
                continue;
            }
            // One reference per distinct identifier per chunk.
            if seen.contains_key(token) {
                continue;
            }
            seen.insert(token, offset);
            out.push(ExtractedLiteral {
                text: token.to_string(),
                kind: LiteralKind::Reference,
                confidence: 0.7,
                line: start_line + offset,
            });
            refs += 1;
            if refs >= MAX_REFS_PER_CHUNK {
                break;
            }
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Inverted index
// ---------------------------------------------------------------------------

/// One stored occurrence of an identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiteralOccurrence {
    pub chunk_id: String,
    pub filepath: String,
    pub kind: LiteralKind,
    pub confidence: f32,
    pub line: usize,
}

/// A match of one query literal against one chunk.
#[derive(Debug, Clone)]
pub struct LiteralMatch {
    pub term: String,
    pub kind: LiteralKind,
    pub confidence: f32,
    pub line: usize,
}

/// Term to occurrences map; lookup is exact and case-sensitive.
#[derive(Debug, Default)]
pub struct LiteralIndex {
    terms: BTreeMap<String, Vec<LiteralOccurrence>>,
}

impl LiteralIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn term_count(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn insert(&mut self, term: &str, occurrence: LiteralOccurrence) {
        self.terms.entry(term.to_string()).or_default().push(occurrence);
    }

    /// Drop all occurrences that came from one file.
    pub fn remove_file(&mut self, filepath: &str) {
        self.terms.retain(|_, occs| {
            occs.retain(|o| o.filepath != filepath);
            !occs.is_empty()
        });
    }

    pub fn lookup(&self, term: &str) -> &[LiteralOccurrence] {
        self.terms.get(term).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Iterate all stored terms with their occurrences.
    pub fn iter_terms(&self) -> impl Iterator<Item = (&String, &Vec<LiteralOccurrence>)> {
        self.terms.iter()
    }

    /// Resolve query literals to per-chunk match lists.
    pub fn build_match_map(
        &self,
        literals: &[QueryLiteral],
    ) -> HashMap<String, Vec<LiteralMatch>> {
        let mut map: HashMap<String, Vec<LiteralMatch>> = HashMap::new();
        for lit in literals {
            for occ in self.lookup(&lit.text) {
                map.entry(occ.chunk_id.clone()).or_default().push(LiteralMatch {
                    term: lit.text.clone(),
                    kind: occ.kind,
                    confidence: occ.confidence,
                    line: occ.line,
                });
            }
        }
        map
    }

    // -----------------------------------------------------------------------
    // Serialization
    // -----------------------------------------------------------------------

    pub fn to_bytes(&self) -> Vec<u8> {
        let payload = SerializedLiterals {
            format: FORMAT_TAG.to_string(),
            version: FORMAT_VERSION,
            terms: self.terms.clone(),
        };
        serde_json::to_vec(&payload).unwrap_or_default()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let payload: SerializedLiterals = serde_json::from_slice(bytes)
            .map_err(|e| Error::CorruptIndex(format!("literal payload: {e}")))?;
        if payload.format != FORMAT_TAG || payload.version != FORMAT_VERSION {
            return Err(Error::CorruptIndex(format!(
                "literal payload tagged {}/{}",
                payload.format, payload.version
            )));
        }
        Ok(Self { terms: payload.terms })
    }
}

#[derive(Serialize, Deserialize)]
struct SerializedLiterals {
    format: String,
    version: u32,
    terms: BTreeMap<String, Vec<LiteralOccurrence>>,
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

/// Fold a chunk's literal matches into a multiplier.
///
/// Definitions outweigh references, confidence scales linearly, and extra
/// matches compound sub-linearly (1/sqrt rank).
pub fn literal_multiplier(matches: &[LiteralMatch]) -> f32 {
    let mut values: Vec<f32> = matches
        .iter()
        .map(|m| {
            let weight = match m.kind {
                LiteralKind::Definition => 1.5,
                LiteralKind::Reference => 0.6,
            };
            weight * m.confidence.clamp(0.0, 1.0)
        })
        .collect();
    values.sort_by(|a, b| b.total_cmp(a));
    values
        .iter()
        .enumerate()
        .map(|(rank, v)| v / ((rank + 1) as f32).sqrt())
        .sum()
}

/// Additive score contribution of a chunk's literal matches.
///
/// `has_other_signal` is whether the chunk already carries non-trivial BM25
/// or semantic score; literal-only hits get the larger boost so they still
/// surface.
pub fn literal_contribution(multiplier: f32, has_other_signal: bool) -> f32 {
    let base_boost = if has_other_signal { 0.2 } else { 0.4 };
    base_boost * multiplier
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_shapes() {
        assert!(is_identifier_like("authenticateUser"));
        assert!(is_identifier_like("HttpServer"));
        assert!(is_identifier_like("MAX_RETRY_COUNT"));
        assert!(is_identifier_like("user_session"));
        assert!(!is_identifier_like("password"));
        assert!(!is_identifier_like("Where"));
        assert!(!is_identifier_like("HTTP"));
    }

    #[test]
    fn test_parse_query_explicit_backtick() {
        let q = parse_query("find `hashPassword` usage");
        assert_eq!(
            q.literals,
            vec![QueryLiteral { text: "hashPassword".into(), explicit: true }]
        );
        assert_eq!(q.residual, "find usage");
    }

    #[test]
    fn test_parse_query_double_quotes() {
        let q = parse_query("where is \"retry_policy\" set");
        assert!(q.literals.iter().any(|l| l.text == "retry_policy" && l.explicit));
        assert_eq!(q.residual, "where is set");
    }

    #[test]
    fn test_parse_query_implicit_identifiers() {
        let q = parse_query("where is the user session validated by validateUserSession");
        assert_eq!(
            q.literals,
            vec![QueryLiteral { text: "validateUserSession".into(), explicit: false }]
        );
        assert_eq!(q.residual, "where is the user session validated by");
    }

    #[test]
    fn test_parse_query_screaming_snake() {
        let q = parse_query("AUTH_SERVICE_GRPC_URL");
        assert_eq!(q.literals.len(), 1);
        assert!(!q.literals[0].explicit);
        assert!(q.residual.is_empty());
    }

    #[test]
    fn test_parse_query_unterminated_backtick_stays_lexical() {
        let q = parse_query("what is `unclosed");
        assert!(q.literals.is_empty());
        assert_eq!(q.residual, "what is unclosed");
    }

    fn occ(chunk: &str, path: &str, kind: LiteralKind, conf: f32) -> LiteralOccurrence {
        LiteralOccurrence {
            chunk_id: chunk.into(),
            filepath: path.into(),
            kind,
            confidence: conf,
            line: 1,
        }
    }

    #[test]
    fn test_lookup_is_case_sensitive() {
        let mut idx = LiteralIndex::new();
        idx.insert("hashPassword", occ("a#1-5", "a.ts", LiteralKind::Definition, 1.0));
        assert_eq!(idx.lookup("hashPassword").len(), 1);
        assert!(idx.lookup("hashpassword").is_empty());
    }

    #[test]
    fn test_build_match_map_groups_by_chunk() {
        let mut idx = LiteralIndex::new();
        idx.insert("hashPassword", occ("a#1-5", "a.ts", LiteralKind::Definition, 1.0));
        idx.insert("hashPassword", occ("b#3-9", "b.ts", LiteralKind::Reference, 0.7));
        let map = idx.build_match_map(&[QueryLiteral {
            text: "hashPassword".into(),
            explicit: true,
        }]);
        assert_eq!(map.len(), 2);
        assert_eq!(map["a#1-5"].len(), 1);
    }

    #[test]
    fn test_remove_file_drops_entries() {
        let mut idx = LiteralIndex::new();
        idx.insert("hashPassword", occ("a#1-5", "a.ts", LiteralKind::Definition, 1.0));
        idx.insert("hashPassword", occ("b#3-9", "b.ts", LiteralKind::Reference, 0.7));
        idx.remove_file("a.ts");
        assert_eq!(idx.lookup("hashPassword").len(), 1);
        idx.remove_file("b.ts");
        assert!(idx.is_empty());
    }

    #[test]
    fn test_definition_outranks_reference() {
        let def = vec![LiteralMatch {
            term: "x".into(),
            kind: LiteralKind::Definition,
            confidence: 0.8,
            line: 1,
        }];
        let refr = vec![LiteralMatch {
            term: "x".into(),
            kind: LiteralKind::Reference,
            confidence: 0.8,
            line: 1,
        }];
        assert!(literal_multiplier(&def) > literal_multiplier(&refr));
    }

    #[test]
    fn test_multiplier_compounds_sublinearly() {
        let one = vec![LiteralMatch {
            term: "x".into(),
            kind: LiteralKind::Definition,
            confidence: 1.0,
            line: 1,
        }];
        let two: Vec<LiteralMatch> = (0..2).map(|_| one[0].clone()).collect();
        let m1 = literal_multiplier(&one);
        let m2 = literal_multiplier(&two);
        assert!(m2 > m1);
        assert!(m2 < 2.0 * m1);
        assert!(m1 > 1.0);
    }

    #[test]
    fn test_literal_only_hits_get_larger_boost() {
        assert!(literal_contribution(1.5, false) > literal_contribution(1.5, true));
    }

    #[test]
    fn test_chunk_extraction_definition_and_refs() {
        let lits = extract_chunk_literals(
            Some("authenticateUser"),
            "export function authenticateUser(token: string) {\n  return verifyToken(token);\n}",
            10,
        );
        assert_eq!(lits[0].kind, LiteralKind::Definition);
        assert_eq!(lits[0].text, "authenticateUser");
        assert_eq!(lits[0].line, 10);
        assert!(lits.iter().any(|l| l.text == "verifyToken" && l.kind == LiteralKind::Reference));
    }

    #[test]
    fn test_index_roundtrip() {
        let mut idx = LiteralIndex::new();
        idx.insert("hashPassword", occ("a#1-5", "a.ts", LiteralKind::Definition, 1.0));
        idx.insert("verifyToken", occ("a#1-5", "a.ts", LiteralKind::Reference, 0.7));
        let restored = LiteralIndex::from_bytes(&idx.to_bytes()).unwrap();
        let q = vec![
            QueryLiteral { text: "hashPassword".into(), explicit: false },
            QueryLiteral { text: "verifyToken".into(), explicit: false },
        ];
        let a = idx.build_match_map(&q);
        let b = restored.build_match_map(&q);
        assert_eq!(a.len(), b.len());
        assert_eq!(a["a#1-5"].len(), b["a#1-5"].len());
    }
}
