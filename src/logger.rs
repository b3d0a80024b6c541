//! Injected logging capability.
//!
//! The library never writes to stdout/stderr directly; callers hand in a
//! `Logger` and pick how chatty indexing should be. Three built-ins:
//! `ConsoleLogger` (plain lines), `InlineProgressLogger` (rewrites a single
//! progress line), and `SilentLogger`.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Logging capability injected into every indexing and search run.
pub trait Logger: Send + Sync {
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
    fn error(&self, message: &str);
    fn debug(&self, message: &str);
    /// Report progress for a long-running phase (embedding, batch indexing).
    fn progress(&self, current: usize, total: usize, message: &str);
    /// Erase any pending progress output before a regular line is printed.
    fn clear_progress(&self);
}

/// Shared handle type used across workers.
pub type LoggerHandle = Arc<dyn Logger>;

// ---------------------------------------------------------------------------
// Console logger
// ---------------------------------------------------------------------------

/// Plain line-per-message logger. Progress updates are throttled to every
/// 20th tick to keep batch output readable.
pub struct ConsoleLogger {
    verbose: bool,
}

impl ConsoleLogger {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl Logger for ConsoleLogger {
    fn info(&self, message: &str) {
        eprintln!("{message}");
    }

    fn warn(&self, message: &str) {
        eprintln!("warning: {message}");
    }

    fn error(&self, message: &str) {
        eprintln!("error: {message}");
    }

    fn debug(&self, message: &str) {
        if self.verbose {
            eprintln!("  {message}");
        }
        tracing::debug!("{message}");
    }

    fn progress(&self, current: usize, total: usize, message: &str) {
        if current == total || current % 20 == 0 {
            eprintln!("  {message}: {current}/{total}");
        }
    }

    fn clear_progress(&self) {}
}

// ---------------------------------------------------------------------------
// Inline progress logger
// ---------------------------------------------------------------------------

/// Rewrites a single terminal line for progress, like a lightweight spinner.
/// Regular messages first clear the progress line so output stays clean.
pub struct InlineProgressLogger {
    dirty: AtomicBool,
    verbose: bool,
}

impl InlineProgressLogger {
    pub fn new(verbose: bool) -> Self {
        Self { dirty: AtomicBool::new(false), verbose }
    }

    fn clear_line(&self) {
        if self.dirty.swap(false, Ordering::Relaxed) {
            eprint!("\r\x1b[2K");
            let _ = std::io::stderr().flush();
        }
    }
}

impl Logger for InlineProgressLogger {
    fn info(&self, message: &str) {
        self.clear_line();
        eprintln!("{message}");
    }

    fn warn(&self, message: &str) {
        self.clear_line();
        eprintln!("warning: {message}");
    }

    fn error(&self, message: &str) {
        self.clear_line();
        eprintln!("error: {message}");
    }

    fn debug(&self, message: &str) {
        if self.verbose {
            self.clear_line();
            eprintln!("  {message}");
        }
        tracing::debug!("{message}");
    }

    fn progress(&self, current: usize, total: usize, message: &str) {
        self.dirty.store(true, Ordering::Relaxed);
        eprint!("\r\x1b[2K  {message}: {current}/{total}");
        let _ = std::io::stderr().flush();
        if current >= total {
            self.clear_line();
        }
    }

    fn clear_progress(&self) {
        self.clear_line();
    }
}

// ---------------------------------------------------------------------------
// Silent logger
// ---------------------------------------------------------------------------

/// Discards everything except tracing debug events. The default for library
/// callers that bring their own reporting.
pub struct SilentLogger;

impl Logger for SilentLogger {
    fn info(&self, _message: &str) {}
    fn warn(&self, _message: &str) {}
    fn error(&self, _message: &str) {}
    fn debug(&self, message: &str) {
        tracing::debug!("{message}");
    }
    fn progress(&self, _current: usize, _total: usize, _message: &str) {}
    fn clear_progress(&self) {}
}

/// Silent logger handle, the default when callers pass no logger.
pub fn silent() -> LoggerHandle {
    Arc::new(SilentLogger)
}

/// Console logger handle.
pub fn console(verbose: bool) -> LoggerHandle {
    Arc::new(ConsoleLogger::new(verbose))
}

/// Inline progress logger handle for interactive terminals.
pub fn inline_progress(verbose: bool) -> LoggerHandle {
    Arc::new(InlineProgressLogger::new(verbose))
}
