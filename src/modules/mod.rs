//! Indexer modules: pluggable index/search units, one per language family
//! or data format.
//!
//! Modules are stateless values; per-run state flows through
//! [`ModuleContext`] and everything durable lives on disk, so any in-memory
//! structure can be rebuilt from Storage at any time.

mod code;
mod json;

pub use code::LanguageModule;
pub use json::JsonModule;

use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::config::Config;
use crate::embedding::Embedder;
use crate::error::Result;
use crate::introspect::ProjectStructure;
use crate::literal::ParsedQuery;
use crate::logger::LoggerHandle;
use crate::storage::Storage;
use crate::types::{ExtractedLiteral, FileIndex, FileSummary, SearchResult};

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Per-file state accumulated during an indexing run and folded into the
/// module's secondary indexes by `finalize`.
#[derive(Debug, Clone)]
pub struct PendingFile {
    pub summary: FileSummary,
    /// (chunk id, keyword document) pairs for the BM25 index.
    pub docs: Vec<(String, String)>,
    /// (chunk id, literal) pairs for the literal index.
    pub literals: Vec<(String, ExtractedLiteral)>,
}

/// Everything a module needs for one run against one project root.
///
/// Pending maps are append-only across workers during an index run; a
/// coarse-grained lock/concurrent-map is all the coordination required.
pub struct ModuleContext {
    pub root: PathBuf,
    pub storage: Storage,
    pub config: Config,
    pub logger: LoggerHandle,
    /// Present for semantic modules, absent for literal-only ones.
    pub embedder: Option<Arc<dyn Embedder>>,
    pub structure: Arc<ProjectStructure>,
    pub pending: DashMap<String, PendingFile>,
    /// Files discovered as deleted; finalize drops their contributions.
    pub removed: Mutex<Vec<String>>,
}

impl ModuleContext {
    pub fn mark_removed(&self, relpath: &str) {
        if let Ok(mut removed) = self.removed.lock() {
            removed.push(relpath.to_string());
        }
    }
}

/// Module-local search knobs; the aggregator applies global filters on top.
#[derive(Debug, Clone)]
pub struct ModuleSearchOptions {
    pub top_k: usize,
    /// Overrides the module's default minimum score when set.
    pub min_score: Option<f32>,
}

// ---------------------------------------------------------------------------
// Module contract
// ---------------------------------------------------------------------------

/// A pluggable unit providing index and search for one family of files.
pub trait IndexerModule: Send + Sync {
    fn id(&self) -> &'static str;
    fn name(&self) -> &'static str;
    fn version(&self) -> &'static str;

    /// Extensions this module claims for candidate pre-filtering. `None`
    /// means fallback coverage: the module receives every file no other
    /// enabled module claimed.
    fn extensions(&self) -> Option<&'static [&'static str]>;

    /// Per-file refinement after the extension pre-filter.
    fn supports_file(&self, _path: &str) -> bool {
        true
    }

    /// Does this module compute embeddings? Literal-only modules skip the
    /// model entirely.
    fn needs_embeddings(&self) -> bool {
        true
    }

    /// One-time setup before the first `index_file` of a run.
    fn initialize(&self, _ctx: &ModuleContext) -> Result<()> {
        Ok(())
    }

    /// Parse, chunk, embed, and stage secondary data for one file. `None`
    /// means the module declined the file.
    fn index_file(&self, relpath: &str, content: &str, ctx: &ModuleContext)
        -> Result<Option<FileIndex>>;

    /// Fold pending per-file contributions into the module's symbolic,
    /// BM25, and literal indexes, incrementally, and persist them.
    fn finalize(&self, ctx: &ModuleContext) -> Result<()>;

    /// Module-local ranked search.
    fn search(
        &self,
        query: &ParsedQuery,
        ctx: &ModuleContext,
        options: &ModuleSearchOptions,
    ) -> Result<Vec<SearchResult>>;

    /// Drop one file's payloads and secondary-index contributions.
    fn remove_file(&self, relpath: &str, ctx: &ModuleContext) -> Result<()>;

    fn dispose(&self) {}
}
