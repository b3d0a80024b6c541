//! raggrep - a local, filesystem-resident retrieval engine for source trees.
//!
//! Builds an incrementally maintained, content-addressed index of the files
//! under a project root and answers natural-language and identifier
//! queries with ranked code and documentation chunks. Ranking fuses dense
//! vector similarity, BM25 keyword scoring, exact-identifier matching, and
//! vocabulary overlap; an exact-substring hybrid pass covers file kinds no
//! parser claims.
//!
//! Library surface: [`index`], [`search`], [`hybrid_search`], [`reset`],
//! [`status`], [`cleanup`], [`watch_directory`].

pub mod bm25;
pub mod config;
pub mod embedding;
pub mod error;
pub mod freshness;
pub mod indexer;
pub mod introspect;
pub mod literal;
pub mod logger;
pub mod modules;
pub mod parser;
pub mod registry;
pub mod search;
pub mod storage;
pub mod types;
pub mod vecmath;
pub mod vocab;
pub mod watch;

use std::path::{Path, PathBuf};

pub use error::{Error, Result};
pub use freshness::ensure_fresh;
pub use logger::{Logger, LoggerHandle};
pub use search::{hybrid_search, search};
pub use storage::get_index_location;
pub use types::{
    CancelToken, CleanupOptions, FreshnessReport, HybridResults, IndexOptions, IndexResult,
    IndexStatus, ModuleStatus, SearchOptions, SearchResult,
};
pub use watch::{watch_directory, FileWatcher};

/// Index (or incrementally re-index) a project root.
pub fn index(root: &Path, options: &IndexOptions) -> Result<Vec<IndexResult>> {
    indexer::index(root, options)
}

/// Drop stale index entries for files that no longer exist.
pub fn cleanup(root: &Path, options: &CleanupOptions) -> Result<FreshnessReport> {
    freshness::cleanup(root, options)
}

/// Wipe a project's index directory. Resetting an index that does not exist
/// is an input error.
pub fn reset(root: &Path, index_dir: Option<PathBuf>) -> Result<()> {
    let dir = match index_dir {
        Some(dir) => dir,
        None => get_index_location(root),
    };
    let storage = storage::Storage::new(dir);
    if !storage.exists() {
        return Err(Error::InvalidInput(format!(
            "no index found for {}",
            root.display()
        )));
    }
    storage.reset()
}

/// Report what is currently indexed for a project root.
pub fn status(root: &Path, index_dir: Option<PathBuf>) -> Result<IndexStatus> {
    let dir = match index_dir {
        Some(dir) => dir,
        None => get_index_location(root),
    };
    let storage = storage::Storage::new(dir.clone());
    let Some(global) = storage.load_global_manifest()? else {
        return Ok(IndexStatus {
            exists: false,
            index_dir: dir,
            schema_version: None,
            modules: Vec::new(),
        });
    };

    let mut modules = Vec::new();
    for module_id in &global.modules {
        if let Some(manifest) = storage.load_module_manifest(module_id)? {
            modules.push(ModuleStatus {
                module_id: module_id.clone(),
                files: manifest.files.len(),
                chunks: manifest.files.values().map(|e| e.chunk_count).sum(),
                last_updated: manifest.last_updated,
            });
        }
    }

    Ok(IndexStatus {
        exists: true,
        index_dir: dir,
        schema_version: Some(global.schema_version),
        modules,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
