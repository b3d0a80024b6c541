//! Freshness controller: reconcile the on-disk index with the filesystem
//! before queries touch it.
//!
//! Missing manifest means full index; a schema mismatch wipes and rebuilds;
//! otherwise the incremental path drops vanished files, refreshes
//! mtime-only changes, and reindexes real edits.

use std::path::Path;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::indexer::{self, indexable_files, partition_files, IndexRun};
use crate::registry;
use crate::storage::{get_index_location, Storage};
use crate::types::{CleanupOptions, FreshnessReport, IndexOptions, SCHEMA_VERSION};

/// Bring the index up to date with the current filesystem state.
pub fn ensure_fresh(root: &Path, options: &IndexOptions) -> Result<FreshnessReport> {
    let index_dir = match &options.index_dir {
        Some(dir) => dir.clone(),
        None => get_index_location(root),
    };
    let storage = Storage::new(index_dir);

    // A manifest that fails to parse is treated like a schema break: wipe
    // and rebuild rather than surfacing the corruption to the user.
    let manifest = match storage.load_global_manifest() {
        Ok(m) => m,
        Err(Error::CorruptIndex(_)) => {
            storage.reset()?;
            None
        }
        Err(e) => return Err(e),
    };

    if let Some(manifest) = &manifest {
        if manifest.schema_version != SCHEMA_VERSION {
            storage.reset()?;
        }
    }

    // Both the full build and the incremental delta run through the
    // coordinator; its per-module batches classify unchanged / refreshed /
    // reindexed files and drop stale entries.
    let results = indexer::index(root, options)?;

    Ok(FreshnessReport {
        indexed: results.iter().map(|r| r.indexed).sum(),
        removed: results.iter().map(|r| r.removed).sum(),
        unchanged: results.iter().map(|r| r.unchanged + r.refreshed).sum(),
    })
}

/// Drop index entries whose source file no longer exists, without indexing
/// anything new. Per-entry failures are warnings.
pub fn cleanup(root: &Path, options: &CleanupOptions) -> Result<FreshnessReport> {
    let root = root
        .canonicalize()
        .map_err(|e| Error::InvalidInput(format!("root {}: {e}", root.display())))?;
    let index_dir = match &options.index_dir {
        Some(dir) => dir.clone(),
        None => get_index_location(&root),
    };
    let storage = Storage::new(index_dir);
    let logger = options.logger.clone().unwrap_or_else(crate::logger::silent);

    if storage.load_global_manifest()?.is_none() {
        return Ok(FreshnessReport::default());
    }
    let _lock = storage.acquire_lock()?;

    let config = Config::load_or_default(storage.index_dir())?;
    registry::ensure_builtin_modules();
    let modules = registry::enabled_modules(&config);

    let run = IndexRun::prepare(
        &root,
        &IndexOptions {
            index_dir: Some(storage.index_dir().to_path_buf()),
            logger: Some(logger.clone()),
            ..Default::default()
        },
    )?;
    let files = indexable_files(&root, &config);
    let by_module = partition_files(&files, &modules);

    let mut report = FreshnessReport::default();
    for module in &modules {
        let Some(mut manifest) = storage.load_module_manifest(module.id())? else {
            continue;
        };
        let current: std::collections::HashSet<&str> = by_module
            .get(module.id())
            .map(|batch| batch.iter().map(|f| f.as_str()).collect())
            .unwrap_or_default();

        let stale: Vec<String> = manifest
            .files
            .keys()
            .filter(|k| !current.contains(k.as_str()))
            .cloned()
            .collect();
        if stale.is_empty() {
            report.unchanged += manifest.files.len();
            continue;
        }

        let ctx = match run.removal_context(module.as_ref()) {
            Ok(ctx) => ctx,
            Err(e) => {
                logger.warn(&format!("[{}] skipped: {e}", module.id()));
                continue;
            }
        };
        for relpath in &stale {
            if options.verbose {
                logger.info(&format!("removing stale entry {relpath} [{}]", module.id()));
            }
            if let Err(e) = module.remove_file(relpath, &ctx) {
                logger.warn(&format!("could not remove {relpath}: {e}"));
                continue;
            }
            manifest.files.remove(relpath);
            report.removed += 1;
        }
        report.unchanged += manifest.files.len();

        manifest.last_updated = crate::types::now_iso();
        storage.save_module_manifest(&manifest)?;
        module.finalize(&ctx)?;
    }

    Ok(report)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GlobalManifest;

    fn options(index_dir: &Path) -> IndexOptions {
        IndexOptions {
            index_dir: Some(index_dir.to_path_buf()),
            embedding_model: Some("hash".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_fresh_then_fresh_is_noop() {
        let project = tempfile::tempdir().unwrap();
        let index_dir = tempfile::tempdir().unwrap();
        std::fs::write(project.path().join("a.txt"), "alpha beta").unwrap();

        let first = ensure_fresh(project.path(), &options(index_dir.path())).unwrap();
        assert_eq!(first.indexed, 1);

        let second = ensure_fresh(project.path(), &options(index_dir.path())).unwrap();
        assert_eq!(second.indexed, 0);
        assert_eq!(second.removed, 0);
        assert!(second.unchanged >= 1);
    }

    #[test]
    fn test_schema_mismatch_triggers_rebuild() {
        let project = tempfile::tempdir().unwrap();
        let index_dir = tempfile::tempdir().unwrap();
        std::fs::write(project.path().join("a.txt"), "alpha beta").unwrap();

        ensure_fresh(project.path(), &options(index_dir.path())).unwrap();

        // Sabotage the schema version.
        let storage = Storage::new(index_dir.path().to_path_buf());
        let mut manifest = storage.load_global_manifest().unwrap().unwrap();
        manifest.schema_version = SCHEMA_VERSION - 1;
        storage.save_global_manifest(&manifest).unwrap();

        let report = ensure_fresh(project.path(), &options(index_dir.path())).unwrap();
        assert_eq!(report.indexed, 1, "schema bump must force a full rebuild");

        let rebuilt: GlobalManifest = storage.load_global_manifest().unwrap().unwrap();
        assert_eq!(rebuilt.schema_version, SCHEMA_VERSION);
    }

    #[test]
    fn test_corrupt_global_manifest_triggers_rebuild() {
        let project = tempfile::tempdir().unwrap();
        let index_dir = tempfile::tempdir().unwrap();
        std::fs::write(project.path().join("a.txt"), "alpha beta").unwrap();

        ensure_fresh(project.path(), &options(index_dir.path())).unwrap();
        let storage = Storage::new(index_dir.path().to_path_buf());
        storage.write_bytes(&storage.global_manifest_path(), b"{ garbage").unwrap();

        let report = ensure_fresh(project.path(), &options(index_dir.path())).unwrap();
        assert_eq!(report.indexed, 1);
    }

    #[test]
    fn test_deleted_file_is_removed() {
        let project = tempfile::tempdir().unwrap();
        let index_dir = tempfile::tempdir().unwrap();
        std::fs::write(project.path().join("a.txt"), "alpha").unwrap();
        std::fs::write(project.path().join("b.txt"), "beta").unwrap();

        ensure_fresh(project.path(), &options(index_dir.path())).unwrap();
        std::fs::remove_file(project.path().join("b.txt")).unwrap();

        let report = ensure_fresh(project.path(), &options(index_dir.path())).unwrap();
        assert_eq!(report.removed, 1);

        let storage = Storage::new(index_dir.path().to_path_buf());
        let manifest = storage.load_module_manifest("core").unwrap().unwrap();
        assert!(!manifest.files.contains_key("b.txt"));
        assert!(storage.load_file_index("core", "b.txt").unwrap().is_none());
    }

    #[test]
    fn test_mtime_only_change_refreshes_without_reindex() {
        let project = tempfile::tempdir().unwrap();
        let index_dir = tempfile::tempdir().unwrap();
        let file = project.path().join("a.txt");
        std::fs::write(&file, "alpha beta").unwrap();

        ensure_fresh(project.path(), &options(index_dir.path())).unwrap();

        // Rewrite identical bytes; mtime moves, content hash does not.
        std::thread::sleep(std::time::Duration::from_millis(20));
        std::fs::write(&file, "alpha beta").unwrap();

        let report = ensure_fresh(project.path(), &options(index_dir.path())).unwrap();
        assert_eq!(report.indexed, 0, "identical content must not re-embed");
        assert_eq!(report.removed, 0);
    }

    #[test]
    fn test_cleanup_only_removes_stale() {
        let project = tempfile::tempdir().unwrap();
        let index_dir = tempfile::tempdir().unwrap();
        std::fs::write(project.path().join("keep.txt"), "kept").unwrap();
        std::fs::write(project.path().join("gone.txt"), "going").unwrap();

        ensure_fresh(project.path(), &options(index_dir.path())).unwrap();
        std::fs::remove_file(project.path().join("gone.txt")).unwrap();

        let report = cleanup(
            project.path(),
            &CleanupOptions {
                index_dir: Some(index_dir.path().to_path_buf()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(report.removed, 1);
        assert!(report.unchanged >= 1);
    }
}
