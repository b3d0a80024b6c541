//! Embedding model port.
//!
//! The engine treats text-to-vector as a black box behind [`Embedder`].
//! Two providers: the ONNX-backed `fastembed` models (behind the `semantic`
//! feature, cached under `~/.cache/raggrep/models`), and a dependency-free
//! feature-hashing embedder ("hash") whose vectors are deterministic token
//! overlap. The hash embedder doubles as the fallback when the binary is
//! built without semantic support.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::logger::LoggerHandle;
use crate::vecmath::l2_normalize;
use crate::vocab;

/// Text-to-vector provider. Vectors are L2-normalized on the way out.
pub trait Embedder: Send + Sync {
    /// Model id as stored in embedding payloads.
    fn model_id(&self) -> &str;
    fn dim(&self) -> usize;
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

// ---------------------------------------------------------------------------
// Model resolution
// ---------------------------------------------------------------------------

/// Known model presets. Anything else is rejected so config typos surface
/// instead of silently downloading the wrong weights.
pub fn resolve_embedder(model: &str, logger: &LoggerHandle) -> Result<Arc<dyn Embedder>> {
    match model {
        "hash" => Ok(Arc::new(HashEmbedder::default())),
        "minilm" | "minilm-l12" | "bge-small" => {
            #[cfg(feature = "semantic")]
            {
                Ok(Arc::new(FastembedProvider::load(model, logger)?))
            }
            #[cfg(not(feature = "semantic"))]
            {
                logger.warn(&format!(
                    "model '{model}' requires a build with semantic support; using hash embeddings"
                ));
                Ok(Arc::new(HashEmbedder::default()))
            }
        }
        other => Err(Error::Model(format!(
            "unknown embedding model '{other}' (expected minilm, minilm-l12, bge-small, or hash)"
        ))),
    }
}

/// Process-wide embedder cache keyed by model id, so several modules using
/// the same model share one loaded instance.
pub fn cached_embedder(model: &str, logger: &LoggerHandle) -> Result<Arc<dyn Embedder>> {
    use std::collections::HashMap;
    use std::sync::{Mutex, OnceLock};

    static CACHE: OnceLock<Mutex<HashMap<String, Arc<dyn Embedder>>>> = OnceLock::new();
    let cache = CACHE.get_or_init(|| Mutex::new(HashMap::new()));

    if let Some(found) = cache.lock().ok().and_then(|c| c.get(model).cloned()) {
        return Ok(found);
    }
    let created = resolve_embedder(model, logger)?;
    if let Ok(mut guard) = cache.lock() {
        guard.entry(model.to_string()).or_insert_with(|| Arc::clone(&created));
    }
    Ok(created)
}

// ---------------------------------------------------------------------------
// Feature-hashing embedder
// ---------------------------------------------------------------------------

const HASH_DIM: usize = 256;

/// Bag-of-stems embedder over FNV-hashed buckets.
///
/// Identifiers are split on camelCase/snake_case, stop words dropped, and
/// stems accumulated into a fixed-size vector, so cosine similarity reduces
/// to weighted token overlap. Fully offline and stable across runs.
pub struct HashEmbedder {
    dim: usize,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self { dim: HASH_DIM }
    }
}

/// FNV-1a, pinned here so persisted vectors never depend on std hasher
/// internals.
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for &b in bytes {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

impl Embedder for HashEmbedder {
    fn model_id(&self) -> &str {
        "hash"
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut v = vec![0.0f32; self.dim];
                for stem in vocab::content_stems(text) {
                    let bucket = (fnv1a(stem.as_bytes()) % self.dim as u64) as usize;
                    v[bucket] += 1.0;
                }
                l2_normalize(&mut v);
                v
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// fastembed provider
// ---------------------------------------------------------------------------

#[cfg(feature = "semantic")]
mod fastembed_provider {
    use super::*;
    use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
    use std::sync::Mutex;

    /// ONNX text embedding models, loaded once per run and shared behind a
    /// mutex (inference is not re-entrant).
    pub struct FastembedProvider {
        model_id: String,
        dim: usize,
        model: Mutex<TextEmbedding>,
    }

    impl FastembedProvider {
        pub fn load(model: &str, logger: &LoggerHandle) -> Result<Self> {
            let (embedding_model, dim) = match model {
                "minilm" => (EmbeddingModel::AllMiniLML6V2, 384),
                "minilm-l12" => (EmbeddingModel::AllMiniLML12V2, 384),
                "bge-small" => (EmbeddingModel::BGESmallENV15, 384),
                other => {
                    return Err(Error::Model(format!("unknown embedding model '{other}'")))
                }
            };
            let cache_dir = crate::storage::model_cache_dir();
            // Model load has no timeout; the first run downloads weights.
            logger.info(&format!("loading embedding model {model}..."));
            let loaded = TextEmbedding::try_new(
                InitOptions::new(embedding_model)
                    .with_cache_dir(cache_dir)
                    .with_show_download_progress(false),
            )
            .map_err(|e| Error::Model(format!("failed to load {model}: {e}")))?;
            logger.info(&format!("embedding model {model} ready"));
            Ok(Self { model_id: model.to_string(), dim, model: Mutex::new(loaded) })
        }
    }

    impl Embedder for FastembedProvider {
        fn model_id(&self) -> &str {
            &self.model_id
        }

        fn dim(&self) -> usize {
            self.dim
        }

        fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            if texts.is_empty() {
                return Ok(Vec::new());
            }
            let mut guard = self
                .model
                .lock()
                .map_err(|_| Error::Model("embedding model mutex poisoned".into()))?;
            let inputs: Vec<&str> = texts.iter().map(|s| s.as_str()).collect();
            let mut vectors = guard
                .embed(inputs, None)
                .map_err(|e| Error::Model(format!("embedding failed: {e}")))?;
            for v in &mut vectors {
                l2_normalize(v);
            }
            Ok(vectors)
        }
    }
}

#[cfg(feature = "semantic")]
pub use fastembed_provider::FastembedProvider;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vecmath::cosine_similarity;

    fn hash_embed(texts: &[&str]) -> Vec<Vec<f32>> {
        let texts: Vec<String> = texts.iter().map(|s| s.to_string()).collect();
        HashEmbedder::default().embed(&texts).unwrap()
    }

    #[test]
    fn test_hash_embedder_deterministic() {
        let a = hash_embed(&["validate the user session"]);
        let b = hash_embed(&["validate the user session"]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_hash_embedder_normalized() {
        let v = &hash_embed(&["some text about indexing"])[0];
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_related_texts_score_higher() {
        let vs = hash_embed(&[
            "where is the user session validated",
            "function validateUserSession(token) { }",
            "render the settings panel markup",
        ]);
        let related = cosine_similarity(&vs[0], &vs[1]).unwrap();
        let unrelated = cosine_similarity(&vs[0], &vs[2]).unwrap();
        assert!(related > unrelated);
        assert!(related > 0.4, "related similarity too low: {related}");
    }

    #[test]
    fn test_empty_text_zero_vector() {
        let v = &hash_embed(&[""])[0];
        assert!(v.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_unknown_model_rejected() {
        let logger = crate::logger::silent();
        assert!(matches!(
            resolve_embedder("gpt-embeddings", &logger),
            Err(Error::Model(_))
        ));
    }

    #[test]
    fn test_hash_model_resolves() {
        let logger = crate::logger::silent();
        let e = resolve_embedder("hash", &logger).unwrap();
        assert_eq!(e.model_id(), "hash");
        assert_eq!(e.dim(), 256);
    }
}
