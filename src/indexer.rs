//! Indexing coordinator: walks the tree, dispatches files to modules across
//! a bounded worker pool, reconciles results in input order, and persists
//! manifests.
//!
//! Two-tier change detection keeps re-embedding rare: a matching mtime skips
//! the file outright, and a matching content hash (mtime flipped by a branch
//! switch, bytes identical) refreshes bookkeeping without re-indexing.

use ignore::WalkBuilder;
use rayon::prelude::*;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::config::Config;
use crate::embedding::cached_embedder;
use crate::error::{Error, Result};
use crate::introspect::{detect_project_structure, introspect_file, ProjectStructure};
use crate::logger::LoggerHandle;
use crate::modules::{IndexerModule, ModuleContext};
use crate::registry;
use crate::storage::{get_index_location, read_source, sha256_hex, Storage};
use crate::types::{
    now_iso, CancelToken, FileOutcome, GlobalManifest, IndexOptions, IndexResult, ManifestEntry,
    ModuleManifest,
};

/// Default worker pool size: `max(2, min(16, cpus * 3 / 4))`.
pub fn default_concurrency() -> usize {
    let cpus = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4);
    (cpus * 3 / 4).clamp(2, 16)
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// One progress stream per module: register with a total, tick per file.
pub struct Progress {
    module: String,
    total: usize,
    done: AtomicUsize,
    logger: LoggerHandle,
    enabled: bool,
}

impl Progress {
    pub fn register(module: &str, total: usize, logger: LoggerHandle, enabled: bool) -> Self {
        Self { module: module.to_string(), total, done: AtomicUsize::new(0), logger, enabled }
    }

    pub fn file_done(&self) {
        let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        if self.enabled {
            self.logger.progress(done, self.total, &format!("indexing [{}]", self.module));
        }
    }
}

// ---------------------------------------------------------------------------
// File enumeration
// ---------------------------------------------------------------------------

/// Enumerate candidate files under the root honoring the configured ignore
/// list. Returns relative forward-slash paths, sorted for determinism.
pub fn enumerate_files(root: &Path, config: &Config) -> Vec<String> {
    let ignore_dirs: HashSet<String> = config.ignore.iter().cloned().collect();
    let mut out = Vec::new();

    let walker = WalkBuilder::new(root)
        .hidden(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .filter_entry(move |entry| {
            let name = entry.file_name().to_string_lossy();
            if entry.file_type().is_some_and(|ft| ft.is_dir()) {
                return !ignore_dirs.contains(name.as_ref());
            }
            true
        })
        .build();

    for entry in walker.flatten() {
        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }
        let path = entry.path();
        let rel = match path.strip_prefix(root) {
            Ok(r) => r.to_string_lossy().replace('\\', "/"),
            Err(_) => continue,
        };
        // Dotfiles are walkable (the exact-match pass needs them) but only
        // configured extensions reach the modules.
        out.push(rel);
    }
    out.sort();
    out
}

/// Candidates restricted to the configured extension set.
pub fn indexable_files(root: &Path, config: &Config) -> Vec<String> {
    enumerate_files(root, config)
        .into_iter()
        .filter(|rel| {
            let ext = rel.rsplit('.').next().unwrap_or("");
            config.extension_enabled(&ext.to_lowercase())
        })
        .collect()
}

/// Split candidates per module: claimed extensions go to their module, the
/// fallback module takes everything left over.
pub fn partition_files<'a>(
    files: &'a [String],
    modules: &[Arc<dyn IndexerModule>],
) -> BTreeMap<&'static str, Vec<&'a String>> {
    let claimed: HashSet<&'static str> = modules
        .iter()
        .filter_map(|m| m.extensions())
        .flat_map(|exts| exts.iter().copied())
        .collect();

    let mut by_module: BTreeMap<&'static str, Vec<&'a String>> = BTreeMap::new();
    for module in modules {
        let selected: Vec<&String> = files
            .iter()
            .filter(|rel| {
                let ext = rel.rsplit('.').next().unwrap_or("");
                match module.extensions() {
                    Some(exts) => exts.contains(&ext),
                    None => !claimed.contains(ext),
                }
            })
            .filter(|rel| module.supports_file(rel.as_str()))
            .collect();
        by_module.insert(module.id(), selected);
    }
    by_module
}

// ---------------------------------------------------------------------------
// Per-file worker
// ---------------------------------------------------------------------------

struct WorkerResult {
    relpath: String,
    outcome: FileOutcome,
    mtime: Option<String>,
    content_hash: Option<String>,
    chunk_count: usize,
}

fn process_file(
    module: &dyn IndexerModule,
    ctx: &ModuleContext,
    manifest: &ModuleManifest,
    relpath: &str,
    cancel: Option<&CancelToken>,
) -> WorkerResult {
    let skipped = |outcome| WorkerResult {
        relpath: relpath.to_string(),
        outcome,
        mtime: None,
        content_hash: None,
        chunk_count: 0,
    };

    if cancel.map(|c| c.is_cancelled()).unwrap_or(false) {
        return skipped(FileOutcome::Skipped);
    }

    let abs = ctx.root.join(relpath);
    let mtime = match crate::storage::file_mtime(&abs) {
        Ok(m) => m,
        Err(e) => return skipped(FileOutcome::Failed(e.to_string())),
    };

    let entry = manifest.files.get(relpath);
    if let Some(entry) = entry {
        if entry.last_modified == mtime {
            return skipped(FileOutcome::Unchanged);
        }
    }

    let content = match read_source(&abs) {
        Ok(Some(c)) => c,
        Ok(None) => return skipped(FileOutcome::Skipped),
        Err(e) => return skipped(FileOutcome::Failed(e.to_string())),
    };

    let hash = sha256_hex(content.as_bytes());
    if let Some(entry) = entry {
        if entry.content_hash.as_deref() == Some(hash.as_str()) {
            // Branch switches flip mtime without changing bytes; the hash is
            // the authority for whether we re-embed.
            return WorkerResult {
                relpath: relpath.to_string(),
                outcome: FileOutcome::MtimeRefreshed,
                mtime: Some(mtime),
                content_hash: Some(hash),
                chunk_count: entry.chunk_count,
            };
        }
    }

    match module.index_file(relpath, &content, ctx) {
        Ok(Some(file_index)) => {
            if let Err(e) = ctx.storage.save_file_index(module.id(), &file_index) {
                return skipped(FileOutcome::Failed(e.to_string()));
            }
            let tags = introspect_file(relpath, &ctx.structure, Some(&content));
            if let Err(e) =
                ctx.storage.write_json(&ctx.storage.introspection_file_path(relpath), &tags)
            {
                return skipped(FileOutcome::Failed(e.to_string()));
            }
            WorkerResult {
                relpath: relpath.to_string(),
                outcome: FileOutcome::Indexed,
                mtime: Some(mtime),
                content_hash: Some(hash),
                chunk_count: file_index.chunks.len(),
            }
        }
        Ok(None) => skipped(FileOutcome::Skipped),
        Err(e) => skipped(FileOutcome::Failed(e.to_string())),
    }
}

// ---------------------------------------------------------------------------
// Module batch runs
// ---------------------------------------------------------------------------

/// Everything needed to run batches against one project root.
pub struct IndexRun {
    pub root: PathBuf,
    pub storage: Storage,
    pub config: Config,
    pub structure: Arc<ProjectStructure>,
    pub logger: LoggerHandle,
    pub concurrency: usize,
    pub embedding_model: Option<String>,
    pub show_progress: bool,
    pub cancel: Option<CancelToken>,
}

impl IndexRun {
    /// Resolve the root, storage, configuration, and project structure.
    pub fn prepare(root: &Path, options: &IndexOptions) -> Result<Self> {
        let root = root
            .canonicalize()
            .map_err(|e| Error::InvalidInput(format!("root {}: {e}", root.display())))?;
        let index_dir =
            options.index_dir.clone().unwrap_or_else(|| get_index_location(&root));
        let storage = Storage::new(index_dir);
        let config = Config::load_or_default(storage.index_dir())?;
        let logger = options.logger.clone().unwrap_or_else(crate::logger::silent);
        let structure = Arc::new(detect_project_structure(&root, &config));
        Ok(Self {
            root,
            storage,
            config,
            structure,
            logger,
            concurrency: options.concurrency.unwrap_or_else(default_concurrency),
            embedding_model: options.embedding_model.clone(),
            show_progress: options.show_progress,
            cancel: options.cancel.clone(),
        })
    }

    /// Build the per-module context, resolving the embedder when needed.
    pub fn module_context(&self, module: &dyn IndexerModule) -> Result<ModuleContext> {
        self.build_context(module, true)
    }

    /// Context without an embedder, for removal-only work (cleanup) where
    /// loading a model would be wasted.
    pub fn removal_context(&self, module: &dyn IndexerModule) -> Result<ModuleContext> {
        self.build_context(module, false)
    }

    fn build_context(
        &self,
        module: &dyn IndexerModule,
        with_embedder: bool,
    ) -> Result<ModuleContext> {
        let embedder = if with_embedder && module.needs_embeddings() {
            let model = self
                .config
                .embedding_model_for(module.id(), self.embedding_model.as_deref());
            Some(cached_embedder(&model, &self.logger)?)
        } else {
            None
        };
        Ok(ModuleContext {
            root: self.root.clone(),
            storage: self.storage.clone(),
            config: self.config.clone(),
            logger: self.logger.clone(),
            embedder,
            structure: Arc::clone(&self.structure),
            pending: Default::default(),
            removed: Default::default(),
        })
    }

    /// Index one module's file batch. Results come back in input order;
    /// per-file failures are counted, never fatal.
    pub fn run_module(
        &self,
        module: &Arc<dyn IndexerModule>,
        files: &[&String],
        ctx: &ModuleContext,
    ) -> Result<IndexResult> {
        let started = Instant::now();
        let mut manifest = self
            .storage
            .load_module_manifest(module.id())?
            .unwrap_or_else(|| ModuleManifest::new(module.id(), module.version()));

        // Entries whose file vanished from the candidate set get dropped.
        let current: HashSet<&str> = files.iter().map(|f| f.as_str()).collect();
        let stale: Vec<String> = manifest
            .files
            .keys()
            .filter(|k| !current.contains(k.as_str()))
            .cloned()
            .collect();
        for relpath in &stale {
            module.remove_file(relpath, ctx)?;
            manifest.files.remove(relpath);
        }

        let progress = Progress::register(
            module.id(),
            files.len(),
            self.logger.clone(),
            self.show_progress,
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.concurrency)
            .build()
            .map_err(|e| Error::Config(format!("worker pool: {e}")))?;

        // Unique dispatch per file; collect preserves input order.
        let results: Vec<WorkerResult> = pool.install(|| {
            files
                .par_iter()
                .map(|relpath| {
                    let result = process_file(
                        module.as_ref(),
                        ctx,
                        &manifest,
                        relpath.as_str(),
                        self.cancel.as_ref(),
                    );
                    progress.file_done();
                    result
                })
                .collect()
        });
        self.logger.clear_progress();

        let mut summary = IndexResult {
            module_id: module.id().to_string(),
            indexed: 0,
            refreshed: 0,
            unchanged: 0,
            skipped: 0,
            failed: 0,
            removed: stale.len(),
            duration_ms: 0,
        };

        for result in results {
            match &result.outcome {
                FileOutcome::Indexed => {
                    summary.indexed += 1;
                    manifest.files.insert(
                        result.relpath.clone(),
                        ManifestEntry {
                            last_modified: result.mtime.clone().unwrap_or_default(),
                            chunk_count: result.chunk_count,
                            content_hash: result.content_hash.clone(),
                        },
                    );
                }
                FileOutcome::MtimeRefreshed => {
                    summary.refreshed += 1;
                    if let Some(entry) = manifest.files.get_mut(&result.relpath) {
                        entry.last_modified = result.mtime.clone().unwrap_or_default();
                        entry.content_hash = result.content_hash.clone();
                    }
                }
                FileOutcome::Unchanged => summary.unchanged += 1,
                FileOutcome::Skipped => summary.skipped += 1,
                FileOutcome::Failed(message) => {
                    summary.failed += 1;
                    self.logger.warn(&format!("{}: {message}", result.relpath));
                }
            }
        }

        // Manifest and finalize run on the coordinator thread, serialized.
        if summary.indexed > 0 || summary.refreshed > 0 || !stale.is_empty() {
            manifest.last_updated = now_iso();
            manifest.version = module.version().to_string();
            self.storage.save_module_manifest(&manifest)?;
        }
        if summary.indexed > 0 || !stale.is_empty() {
            module.finalize(ctx)?;
        }

        summary.duration_ms = started.elapsed().as_millis() as u64;
        debug!(
            module = module.id(),
            indexed = summary.indexed,
            unchanged = summary.unchanged,
            failed = summary.failed,
            time_ms = summary.duration_ms,
            "module batch complete"
        );
        Ok(summary)
    }
}

// ---------------------------------------------------------------------------
// Full pipeline
// ---------------------------------------------------------------------------

/// Index a project root: enumerate, dispatch to every enabled module, and
/// persist the global manifest.
pub fn index(root: &Path, options: &IndexOptions) -> Result<Vec<IndexResult>> {
    let run = IndexRun::prepare(root, options)?;
    let _lock = run.storage.acquire_lock()?;

    registry::ensure_builtin_modules();
    let modules = registry::enabled_modules(&run.config);

    run.storage
        .write_json(&run.storage.introspection_project_path(), run.structure.as_ref())?;

    let files = indexable_files(&run.root, &run.config);
    let by_module = partition_files(&files, &modules);

    let mut results = Vec::with_capacity(modules.len());
    for module in &modules {
        if run.cancel.as_ref().map(|c| c.is_cancelled()).unwrap_or(false) {
            break;
        }
        let batch = by_module.get(module.id()).cloned().unwrap_or_default();
        let ctx = run.module_context(module.as_ref())?;
        module.initialize(&ctx)?;
        let result = run.run_module(module, &batch, &ctx)?;
        results.push(result);
    }

    // Rewrite the global manifest after any non-trivial round, or when the
    // active module set drifted.
    let module_ids: Vec<String> = modules.iter().map(|m| m.id().to_string()).collect();
    let changed = results.iter().any(|r| r.indexed + r.refreshed + r.removed > 0);
    let existing = run.storage.load_global_manifest()?;
    if changed || existing.as_ref().map(|m| &m.modules) != Some(&module_ids) {
        run.storage.save_global_manifest(&GlobalManifest::new(module_ids))?;
    }

    let indexed: usize = results.iter().map(|r| r.indexed).sum();
    let failed: usize = results.iter().map(|r| r.failed).sum();
    run.logger.info(&format!(
        "indexed {indexed} file(s) across {} module(s){}",
        results.len(),
        if failed > 0 { format!(", {failed} failed") } else { String::new() }
    ));

    Ok(results)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
