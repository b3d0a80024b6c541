//! File watcher for incremental live re-indexing.
//!
//! Watches the project root, debounces change events (single pending timer,
//! reset on every event), and re-enters the freshness controller when the
//! tree goes quiet or a batch fills up. The watcher itself never inspects
//! file contents; the two-tier change detector decides what actually gets
//! reindexed.

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::freshness::ensure_fresh;
use crate::types::IndexOptions;

/// Debounce window: wait this long after the last event before processing.
const DEBOUNCE_MS: u64 = 500;

/// Fire early once this many distinct paths are pending.
const MAX_BATCH: usize = 100;

/// Handle to a running watcher. Dropping it (or calling [`stop`]) closes the
/// notify watcher, drains the debounce thread, and joins it.
///
/// [`stop`]: FileWatcher::stop
pub struct FileWatcher {
    watcher: Option<RecommendedWatcher>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl FileWatcher {
    /// Cooperative shutdown: close the event source, let the debounce loop
    /// flush its pending batch, and wait for it to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        // Dropping the watcher drops the event sender; the loop sees the
        // disconnect, flushes, and exits.
        self.watcher.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Start watching a project root. Runs one freshness pass up front so the
/// watcher always begins from a consistent index.
pub fn watch_directory(root: &Path, options: IndexOptions) -> Result<FileWatcher> {
    let root = root
        .canonicalize()
        .map_err(|e| Error::InvalidInput(format!("root {}: {e}", root.display())))?;

    ensure_fresh(&root, &options)?;

    let (tx, rx) = mpsc::channel::<Event>();
    let mut watcher = RecommendedWatcher::new(
        move |res: std::result::Result<Event, notify::Error>| {
            if let Ok(event) = res {
                let _ = tx.send(event);
            }
        },
        notify::Config::default(),
    )
    .map_err(|e| Error::io(&root, io::Error::other(e)))?;

    watcher
        .watch(&root, RecursiveMode::Recursive)
        .map_err(|e| Error::io(&root, io::Error::other(e)))?;

    let loop_root = root.clone();
    let handle = std::thread::spawn(move || debounce_loop(rx, loop_root, options));

    Ok(FileWatcher { watcher: Some(watcher), handle: Some(handle) })
}

/// Collect events until the tree is quiet (or the batch is full), then
/// re-enter the indexer.
fn debounce_loop(rx: mpsc::Receiver<Event>, root: PathBuf, options: IndexOptions) {
    let logger = options.logger.clone().unwrap_or_else(crate::logger::silent);
    let mut pending: HashSet<PathBuf> = HashSet::new();

    loop {
        match rx.recv_timeout(Duration::from_millis(DEBOUNCE_MS)) {
            Ok(event) => {
                let relevant = matches!(
                    event.kind,
                    EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                );
                if relevant {
                    pending.extend(event.paths);
                }
                if pending.len() >= MAX_BATCH {
                    flush(&root, &options, &mut pending);
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                if !pending.is_empty() {
                    flush(&root, &options, &mut pending);
                }
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                if !pending.is_empty() {
                    flush(&root, &options, &mut pending);
                }
                break;
            }
        }
    }
    logger.debug("watcher stopped");
}

fn flush(root: &Path, options: &IndexOptions, pending: &mut HashSet<PathBuf>) {
    let logger = options.logger.clone().unwrap_or_else(crate::logger::silent);
    let count = pending.len();
    pending.clear();

    match ensure_fresh(root, options) {
        Ok(report) if report.indexed > 0 || report.removed > 0 => {
            logger.info(&format!(
                "reindexed {} file(s), removed {} ({count} event path(s))",
                report.indexed, report.removed
            ));
        }
        Ok(_) => {}
        Err(e) => logger.warn(&format!("watch update failed: {e}")),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
