//! Vocabulary overlap scoring for long natural-language queries.
//!
//! Content words from the query are stemmed and compared against the chunk's
//! identifier vocabulary (camelCase and snake_case split, stemmed). The
//! Jaccard-style overlap becomes a small additive bonus in [0, 0.2].

use rust_stemmers::{Algorithm, Stemmer};
use std::collections::HashSet;
use std::sync::OnceLock;

/// Queries shorter than this many content words skip the vocabulary bonus.
const MIN_CONTENT_TOKENS: usize = 3;

/// Upper bound of the additive bonus.
const MAX_BONUS: f32 = 0.2;

/// Identifier vocabularies are capped so giant chunks stay cheap.
const MAX_VOCAB_TOKENS: usize = 256;

fn stemmer() -> &'static Stemmer {
    static STEMMER: OnceLock<Stemmer> = OnceLock::new();
    STEMMER.get_or_init(|| Stemmer::create(Algorithm::English))
}

fn stop_words() -> &'static HashSet<&'static str> {
    static WORDS: OnceLock<HashSet<&'static str>> = OnceLock::new();
    WORDS.get_or_init(|| {
        [
            "a", "an", "and", "are", "as", "at", "be", "but", "by", "can", "do", "does", "for",
            "from", "has", "have", "how", "i", "in", "is", "it", "its", "of", "on", "or", "that",
            "the", "their", "then", "there", "these", "this", "to", "was", "we", "what", "when",
            "where", "which", "who", "why", "will", "with", "you",
        ]
        .into_iter()
        .collect()
    })
}

/// Split an identifier on underscores and camel humps.
///
/// `validateUserSession` -> [validate, user, session];
/// `MAX_RETRY_COUNT` -> [max, retry, count].
pub fn split_identifier(ident: &str) -> Vec<String> {
    let mut parts = Vec::new();
    for piece in ident.split('_') {
        if piece.is_empty() {
            continue;
        }
        let chars: Vec<char> = piece.chars().collect();
        let mut word = String::new();
        for (i, &c) in chars.iter().enumerate() {
            if i > 0 && c.is_uppercase() {
                let prev = chars[i - 1];
                let next_lower = chars.get(i + 1).map(|n| n.is_lowercase()).unwrap_or(false);
                if prev.is_lowercase() || prev.is_numeric() || (prev.is_uppercase() && next_lower)
                {
                    if !word.is_empty() {
                        parts.push(word.clone());
                        word.clear();
                    }
                }
            }
            word.push(c.to_ascii_lowercase());
        }
        if !word.is_empty() {
            parts.push(word);
        }
    }
    parts
}

/// Stemmed content words of a query, stop words dropped.
pub fn content_stems(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for token in text
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|s| s.len() > 1)
    {
        for word in split_identifier(token) {
            if stop_words().contains(word.as_str()) {
                continue;
            }
            out.push(stemmer().stem(&word).to_string());
        }
    }
    out
}

/// The chunk's identifier vocabulary: every word token split and stemmed.
pub fn identifier_vocabulary(text: &str) -> HashSet<String> {
    let mut vocab = HashSet::new();
    for token in text
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|s| s.len() > 1)
    {
        for word in split_identifier(token) {
            if stop_words().contains(word.as_str()) {
                continue;
            }
            vocab.insert(stemmer().stem(&word).to_string());
            if vocab.len() >= MAX_VOCAB_TOKENS {
                return vocab;
            }
        }
    }
    vocab
}

/// Jaccard-style overlap bonus in [0, MAX_BONUS]. Zero for short queries.
pub fn vocab_bonus(query_stems: &[String], chunk_vocab: &HashSet<String>) -> f32 {
    if query_stems.len() < MIN_CONTENT_TOKENS || chunk_vocab.is_empty() {
        return 0.0;
    }
    let query_set: HashSet<&String> = query_stems.iter().collect();
    let hit = query_set.iter().filter(|s| chunk_vocab.contains(s.as_str())).count();
    if hit == 0 {
        return 0.0;
    }
    let union = query_set.len() + chunk_vocab.len() - hit;
    MAX_BONUS * hit as f32 / union as f32
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
