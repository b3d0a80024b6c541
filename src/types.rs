//! Core data model: chunks, per-file indexes, manifests, summaries, and the
//! option/result records of the public API.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::logger::LoggerHandle;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum file size (in bytes) that will be read into memory.
pub const MAX_FILE_READ: u64 = 512 * 1024;

/// Bumped on breaking changes to any persisted artifact; a mismatch wipes
/// the index directory and triggers a full rebuild.
pub const SCHEMA_VERSION: u32 = 4;

// ---------------------------------------------------------------------------
// Chunks
// ---------------------------------------------------------------------------

/// What a chunk covers within its source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    Function,
    Class,
    Interface,
    Type,
    Enum,
    Variable,
    Block,
    File,
}

impl ChunkKind {
    pub fn label(&self) -> &'static str {
        match self {
            ChunkKind::Function => "function",
            ChunkKind::Class => "class",
            ChunkKind::Interface => "interface",
            ChunkKind::Type => "type",
            ChunkKind::Enum => "enum",
            ChunkKind::Variable => "variable",
            ChunkKind::Block => "block",
            ChunkKind::File => "file",
        }
    }
}

/// A contiguous range of one source file, the smallest retrieval unit.
///
/// `content` is exactly the file's lines `start_line..=end_line` joined with
/// newline; line numbers are 1-based and inclusive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    /// Stable id derived from filepath and line range.
    pub id: String,
    pub content: String,
    pub start_line: usize,
    pub end_line: usize,
    pub kind: ChunkKind,
    /// Declared identifier, when the chunk covers a named declaration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub exported: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_comment: Option<String>,
    /// Open metadata map for module-specific annotations.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// Stable chunk id: the same (path, range) always maps to the same id across
/// indexing runs.
pub fn chunk_id(filepath: &str, start_line: usize, end_line: usize) -> String {
    format!("{filepath}#{start_line}-{end_line}")
}

// ---------------------------------------------------------------------------
// Per-file index payload
// ---------------------------------------------------------------------------

/// Embedding matrix for a file's chunks. `vectors.len()` always equals the
/// chunk count of the owning [`FileIndex`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingPayload {
    pub model: String,
    pub dim: usize,
    pub vectors: Vec<Vec<f32>>,
}

/// One per (file, module) pair; the unit Storage persists and reloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileIndex {
    /// Relative, forward-slash path.
    pub filepath: String,
    /// ISO-8601 UTC mtime observed when the file was indexed.
    pub last_modified: String,
    pub chunks: Vec<Chunk>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embeddings: Option<EmbeddingPayload>,
    /// Resolved relative-import targets (outgoing references).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<String>,
}

impl FileIndex {
    /// Enforce the chunks/embeddings length invariant on load.
    pub fn validate(&self) -> crate::error::Result<()> {
        if let Some(emb) = &self.embeddings {
            if emb.vectors.len() != self.chunks.len() {
                return Err(crate::error::Error::CorruptIndex(format!(
                    "{}: {} chunks but {} embedding vectors",
                    self.filepath,
                    self.chunks.len(),
                    emb.vectors.len()
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Manifests
// ---------------------------------------------------------------------------

/// Per-file bookkeeping inside a module manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    pub last_modified: String,
    pub chunk_count: usize,
    /// SHA-256 of the file content at index time. Absent on entries written
    /// by older schema versions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
}

/// Per-module manifest: which files are indexed and at what state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleManifest {
    pub module_id: String,
    pub version: String,
    pub last_updated: String,
    #[serde(default)]
    pub files: BTreeMap<String, ManifestEntry>,
}

impl ModuleManifest {
    pub fn new(module_id: &str, version: &str) -> Self {
        Self {
            module_id: module_id.to_string(),
            version: version.to_string(),
            last_updated: now_iso(),
            files: BTreeMap::new(),
        }
    }
}

/// Index-wide manifest: schema version and the modules that own payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalManifest {
    pub schema_version: u32,
    pub last_updated: String,
    #[serde(default)]
    pub modules: Vec<String>,
}

impl GlobalManifest {
    pub fn new(modules: Vec<String>) -> Self {
        Self { schema_version: SCHEMA_VERSION, last_updated: now_iso(), modules }
    }
}

// ---------------------------------------------------------------------------
// Tier-1 file summaries
// ---------------------------------------------------------------------------

/// Per-file summary used for candidate filtering before chunk scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSummary {
    pub filepath: String,
    pub chunk_count: usize,
    pub chunk_kinds: BTreeSet<ChunkKind>,
    pub keywords: Vec<String>,
    pub exported_symbols: Vec<String>,
    pub last_modified: String,
}

// ---------------------------------------------------------------------------
// Literals
// ---------------------------------------------------------------------------

/// Whether a literal occurrence declares a symbol or merely refers to one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LiteralKind {
    Definition,
    Reference,
}

/// An identifier occurrence extracted from a chunk during indexing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedLiteral {
    /// Normalized identifier text (exact, case-sensitive).
    pub text: String,
    pub kind: LiteralKind,
    /// In [0, 1]; scales the literal's scoring contribution linearly.
    pub confidence: f32,
    /// 1-based source line of the occurrence.
    pub line: usize,
}

// ---------------------------------------------------------------------------
// Search results
// ---------------------------------------------------------------------------

/// Per-signal breakdown attached to every result for display and tests.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreContext {
    pub semantic: f32,
    pub bm25: f32,
    pub vocab: f32,
    /// 0.0 when the chunk had no literal matches; > 1.0 when it did.
    pub literal_multiplier: f32,
    pub introspection_boost: f32,
    pub doc_intent_boost: f32,
    /// Set by hybrid search when the exact-substring pass also hit this file.
    pub exact_match_fusion: bool,
}

/// A ranked chunk returned by `search`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub filepath: String,
    pub module_id: String,
    pub score: f32,
    pub chunk: Chunk,
    /// First 200 chars of the chunk for display.
    pub snippet: String,
    pub context: ScoreContext,
}

/// One line hit from the exact-substring pass of `hybrid_search`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExactMatch {
    pub filepath: String,
    pub line: usize,
    pub line_text: String,
}

/// Combined output of `hybrid_search`: module results plus the exact pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HybridResults {
    pub results: Vec<SearchResult>,
    pub exact_matches: Vec<ExactMatch>,
}

// ---------------------------------------------------------------------------
// Indexing results
// ---------------------------------------------------------------------------

/// How a single file fared inside a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    /// Parsed, embedded, and persisted.
    Indexed,
    /// Content hash unchanged; only the stored mtime was refreshed.
    MtimeRefreshed,
    /// mtime matched the manifest; nothing touched.
    Unchanged,
    /// Not handled by this module, or dropped by cancellation.
    Skipped,
    /// Isolated per-file failure; the batch continues.
    Failed(String),
}

/// Per-module outcome of an indexing run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexResult {
    pub module_id: String,
    pub indexed: usize,
    pub refreshed: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Stale manifest entries dropped because their file disappeared.
    pub removed: usize,
    pub duration_ms: u64,
}

/// Counts returned by `ensure_fresh` and `cleanup`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreshnessReport {
    pub indexed: usize,
    pub removed: usize,
    pub unchanged: usize,
}

/// Per-module snapshot reported by `status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleStatus {
    pub module_id: String,
    pub files: usize,
    pub chunks: usize,
    pub last_updated: String,
}

/// Snapshot of an on-disk index reported by `status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStatus {
    pub exists: bool,
    pub index_dir: PathBuf,
    pub schema_version: Option<u32>,
    pub modules: Vec<ModuleStatus>,
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Cooperative cancellation handle. A canceled run stops dispatching new
/// files, drains in-flight workers, and returns a partial result.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// Public API option records
// ---------------------------------------------------------------------------

/// Options for `index` and `watch_directory`.
#[derive(Clone, Default)]
pub struct IndexOptions {
    /// Override the computed index directory (mainly for tests).
    pub index_dir: Option<PathBuf>,
    /// Embedding model id override applied to every semantic module.
    pub embedding_model: Option<String>,
    /// Worker pool size; default `max(2, min(16, cpus * 3 / 4))`.
    pub concurrency: Option<usize>,
    pub logger: Option<LoggerHandle>,
    pub cancel: Option<CancelToken>,
    pub show_progress: bool,
}

/// Options for `search` and `hybrid_search`.
#[derive(Clone)]
pub struct SearchOptions {
    pub top_k: usize,
    /// Overrides each module's default minimum score when set.
    pub min_score: Option<f32>,
    /// Restrict results to one file extension (e.g. "ts").
    pub file_type: Option<String>,
    /// Path prefixes or globs, OR-combined.
    pub filters: Vec<String>,
    /// Reconcile the index against the filesystem before searching.
    pub ensure_fresh: bool,
    pub index_dir: Option<PathBuf>,
    pub embedding_model: Option<String>,
    pub logger: Option<LoggerHandle>,
    /// Report per-phase latencies through the logger.
    pub timing: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            top_k: 10,
            min_score: None,
            file_type: None,
            filters: Vec::new(),
            ensure_fresh: true,
            index_dir: None,
            embedding_model: None,
            logger: None,
            timing: false,
        }
    }
}

/// Options for `cleanup`.
#[derive(Clone, Default)]
pub struct CleanupOptions {
    pub index_dir: Option<PathBuf>,
    pub verbose: bool,
    pub logger: Option<LoggerHandle>,
}

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

/// Current wall-clock time as an ISO-8601 UTC string.
pub fn now_iso() -> String {
    format_timestamp(SystemTime::now())
}

/// Format a `SystemTime` as `YYYY-MM-DDTHH:MM:SS.mmmZ`.
///
/// Millisecond precision matches what filesystems commonly report, so equal
/// mtimes always format to equal strings. Simple epoch math, no chrono.
pub fn format_timestamp(t: SystemTime) -> String {
    let dur = t.duration_since(UNIX_EPOCH).unwrap_or_default();
    let secs = dur.as_secs() as i64;
    let millis = dur.subsec_millis();

    let days = secs.div_euclid(86_400);
    let rem = secs.rem_euclid(86_400);
    let (year, month, day) = civil_from_days(days);
    let hour = rem / 3600;
    let minute = (rem % 3600) / 60;
    let second = rem % 60;

    format!("{year:04}-{month:02}-{day:02}T{hour:02}:{minute:02}:{second:02}.{millis:03}Z")
}

/// Days-since-epoch to (year, month, day), proleptic Gregorian.
fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    (if m <= 2 { y + 1 } else { y }, m, d)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_chunk_id_stable() {
        assert_eq!(chunk_id("src/a.ts", 3, 12), "src/a.ts#3-12");
        assert_eq!(chunk_id("src/a.ts", 3, 12), chunk_id("src/a.ts", 3, 12));
    }

    #[test]
    fn test_format_timestamp_epoch() {
        assert_eq!(format_timestamp(UNIX_EPOCH), "1970-01-01T00:00:00.000Z");
    }

    #[test]
    fn test_format_timestamp_known_date() {
        // 2024-03-01T12:30:45.250Z
        let t = UNIX_EPOCH + Duration::from_millis(1_709_296_245_250);
        assert_eq!(format_timestamp(t), "2024-03-01T12:30:45.250Z");
    }

    #[test]
    fn test_format_timestamp_leap_day() {
        // 2024-02-29T00:00:00.000Z
        let t = UNIX_EPOCH + Duration::from_secs(1_709_164_800);
        assert_eq!(format_timestamp(t), "2024-02-29T00:00:00.000Z");
    }

    #[test]
    fn test_equal_mtimes_format_equal() {
        let t = UNIX_EPOCH + Duration::from_millis(1_700_000_000_123);
        assert_eq!(format_timestamp(t), format_timestamp(t));
    }

    #[test]
    fn test_file_index_validate_rejects_length_mismatch() {
        let fi = FileIndex {
            filepath: "a.ts".into(),
            last_modified: now_iso(),
            chunks: vec![Chunk {
                id: chunk_id("a.ts", 1, 1),
                content: "x".into(),
                start_line: 1,
                end_line: 1,
                kind: ChunkKind::File,
                name: None,
                exported: false,
                doc_comment: None,
                metadata: BTreeMap::new(),
            }],
            embeddings: Some(EmbeddingPayload { model: "hash".into(), dim: 4, vectors: vec![] }),
            references: Vec::new(),
        };
        assert!(fi.validate().is_err());
    }
}
