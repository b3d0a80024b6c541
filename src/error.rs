//! Error taxonomy shared across the indexer, storage, and search layers.

use std::path::PathBuf;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// All failure modes surfaced by the library API.
///
/// Per-file failures during a batch are caught and counted into the run
/// result; only manifest-level failures abort a run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration (bad settings file, unknown module id, ...).
    #[error("configuration error: {0}")]
    Config(String),

    /// Filesystem failure during read, write, or directory listing.
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A parser could not process a file. Downgraded to "skip this chunk
    /// emission" inside a batch.
    #[error("parse error in {path}: {message}")]
    Parse { path: String, message: String },

    /// The embedding runtime failed (load or inference).
    #[error("embedding model error: {0}")]
    Model(String),

    /// Schema version or JSON shape mismatch on a persisted index file.
    #[error("corrupt index: {0}")]
    CorruptIndex(String),

    /// API contract violation (mismatched vector lengths, empty root, ...).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Another writer holds the advisory lock for this index.
    #[error("index is locked by another process (lockfile: {0})")]
    LockHeld(PathBuf),
}

impl Error {
    /// Wrap an `io::Error` with the path it occurred at.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io { path: path.into(), source }
    }
}
