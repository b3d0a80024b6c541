//! BM25 keyword index over chunk documents.
//!
//! Documents are keyed by chunk id and carry their owning filepath so a
//! single file's contribution can be dropped and re-added incrementally.
//! The whole index serializes to a version-tagged payload and reloads
//! without reprocessing the corpus.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::error::{Error, Result};

/// Term frequency saturation parameter.
const K1: f32 = 1.5;
/// Document length normalization parameter.
const B: f32 = 0.75;

const FORMAT_TAG: &str = "raggrep-bm25";
const FORMAT_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Tokenization
// ---------------------------------------------------------------------------

/// Lowercase, split on runs of non-word characters (underscore counts as a
/// word character), drop tokens of length <= 1. No stemming here; stemming
/// belongs to the vocabulary scorer only.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|s| s.len() > 1)
        .map(String::from)
        .collect()
}

// ---------------------------------------------------------------------------
// Index
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocEntry {
    filepath: String,
    term_freqs: HashMap<String, u32>,
    length: u32,
}

/// In-memory BM25 index, rebuildable from its serialized form at any time.
#[derive(Debug, Default)]
pub struct Bm25Index {
    docs: HashMap<String, DocEntry>,
    /// Document frequency per term, maintained incrementally.
    df: HashMap<String, usize>,
    total_length: u64,
}

impl Bm25Index {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Add (or replace) a document.
    pub fn add_document(&mut self, doc_id: &str, filepath: &str, text: &str) {
        self.remove_document(doc_id);

        let tokens = tokenize(text);
        if tokens.is_empty() {
            return;
        }
        let mut term_freqs: HashMap<String, u32> = HashMap::new();
        for token in &tokens {
            *term_freqs.entry(token.clone()).or_insert(0) += 1;
        }
        for term in term_freqs.keys() {
            *self.df.entry(term.clone()).or_insert(0) += 1;
        }
        let length = tokens.len() as u32;
        self.total_length += u64::from(length);
        self.docs.insert(
            doc_id.to_string(),
            DocEntry { filepath: filepath.to_string(), term_freqs, length },
        );
    }

    /// Remove a document. Returns true when it existed.
    pub fn remove_document(&mut self, doc_id: &str) -> bool {
        let Some(doc) = self.docs.remove(doc_id) else {
            return false;
        };
        self.total_length = self.total_length.saturating_sub(u64::from(doc.length));
        for term in doc.term_freqs.keys() {
            if let Some(df) = self.df.get_mut(term) {
                *df = df.saturating_sub(1);
                if *df == 0 {
                    self.df.remove(term);
                }
            }
        }
        true
    }

    /// Drop every document belonging to a file. Returns how many went away.
    pub fn remove_file(&mut self, filepath: &str) -> usize {
        let ids: Vec<String> = self
            .docs
            .iter()
            .filter(|(_, d)| d.filepath == filepath)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &ids {
            self.remove_document(id);
        }
        ids.len()
    }

    /// Smoothed IDF: `ln(1 + (N - df + 0.5) / (df + 0.5))`.
    fn idf(&self, term: &str) -> f32 {
        let n = self.docs.len() as f32;
        let df = self.df.get(term).copied().unwrap_or(0) as f32;
        (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
    }

    /// Raw BM25 scores for the top `k` documents containing at least one
    /// query term, sorted descending. Empty queries produce no results.
    pub fn search(&self, query: &str, k: usize) -> Vec<(String, f32)> {
        let query_terms = tokenize(query);
        if query_terms.is_empty() || self.docs.is_empty() {
            return Vec::new();
        }

        let avg_len = self.total_length as f32 / self.docs.len() as f32;
        let idfs: Vec<(String, f32)> =
            query_terms.iter().map(|t| (t.clone(), self.idf(t))).collect();

        let mut scores: Vec<(String, f32)> = self
            .docs
            .iter()
            .filter_map(|(id, doc)| {
                let score = self.score_doc(doc, &idfs, avg_len);
                if score > 0.0 {
                    Some((id.clone(), score))
                } else {
                    None
                }
            })
            .collect();

        scores.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        scores.truncate(k);
        scores
    }

    /// Score a single known document against tokenized query terms. Returns
    /// 0.0 for documents containing none of the terms.
    pub fn score(&self, doc_id: &str, query: &str) -> f32 {
        let query_terms = tokenize(query);
        if query_terms.is_empty() || self.docs.is_empty() {
            return 0.0;
        }
        let Some(doc) = self.docs.get(doc_id) else {
            return 0.0;
        };
        let avg_len = self.total_length as f32 / self.docs.len() as f32;
        let idfs: Vec<(String, f32)> =
            query_terms.iter().map(|t| (t.clone(), self.idf(t))).collect();
        self.score_doc(doc, &idfs, avg_len)
    }

    fn score_doc(&self, doc: &DocEntry, idfs: &[(String, f32)], avg_len: f32) -> f32 {
        let len_norm = 1.0 - B + B * doc.length as f32 / avg_len.max(1.0);
        idfs.iter()
            .map(|(term, idf)| {
                let tf = doc.term_freqs.get(term).copied().unwrap_or(0) as f32;
                if tf == 0.0 {
                    return 0.0;
                }
                idf * tf * (K1 + 1.0) / (tf + K1 * len_norm)
            })
            .sum()
    }

    // -----------------------------------------------------------------------
    // Serialization
    // -----------------------------------------------------------------------

    /// Compact self-describing payload. df and the length sum are derived
    /// state and get recomputed on load.
    pub fn to_bytes(&self) -> Vec<u8> {
        let payload = SerializedBm25 {
            format: FORMAT_TAG.to_string(),
            version: FORMAT_VERSION,
            docs: self.docs.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        };
        serde_json::to_vec(&payload).unwrap_or_default()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let payload: SerializedBm25 = serde_json::from_slice(bytes)
            .map_err(|e| Error::CorruptIndex(format!("bm25 payload: {e}")))?;
        if payload.format != FORMAT_TAG {
            return Err(Error::CorruptIndex(format!(
                "bm25 payload has format tag '{}'",
                payload.format
            )));
        }
        if payload.version != FORMAT_VERSION {
            return Err(Error::CorruptIndex(format!(
                "bm25 payload version {} (expected {FORMAT_VERSION})",
                payload.version
            )));
        }
        let mut index = Self::new();
        for (id, doc) in payload.docs {
            for term in doc.term_freqs.keys() {
                *index.df.entry(term.clone()).or_insert(0) += 1;
            }
            index.total_length += u64::from(doc.length);
            index.docs.insert(id, doc);
        }
        Ok(index)
    }
}

#[derive(Serialize, Deserialize)]
struct SerializedBm25 {
    format: String,
    version: u32,
    docs: BTreeMap<String, DocEntry>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
