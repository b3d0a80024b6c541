//! On-disk index layout and persistence.
//!
//! Storage exclusively owns the bytes under the index directory; every
//! in-memory structure is a cheap derivative that can be rebuilt from disk.
//! All writes go through a sibling temp file and a rename so readers never
//! observe a torn artifact.
//!
//! ```text
//! <indexDir>/
//!   manifest.json                       global manifest
//!   config.json                         optional user configuration
//!   introspection/
//!     _project.json
//!     files/<relpath>.json
//!   index/<moduleId>/
//!     manifest.json                     module manifest
//!     <relpath>.json                    per-file payload
//!     symbolic/<relpath>.json           per-file Tier-1 summary
//!     bm25.bin
//!     literals.bin
//! ```

use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::{Error, Result};
use crate::types::{format_timestamp, FileIndex, GlobalManifest, ModuleManifest, MAX_FILE_READ};

/// Writer locks older than this are considered abandoned.
const LOCK_STALE_SECS: u64 = 600;

// ---------------------------------------------------------------------------
// Index location
// ---------------------------------------------------------------------------

/// Stable, deterministic mapping from a project root to its index directory.
///
/// Keyed by the absolute path so distinct projects never collide, with the
/// directory stem kept for readability.
pub fn get_index_location(root: &Path) -> PathBuf {
    let abs = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    let key = sha256_hex(abs.to_string_lossy().as_bytes());
    let stem = abs
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("project")
        .replace(|c: char| !c.is_alphanumeric() && c != '-' && c != '_', "-");
    let base = dirs::data_local_dir().unwrap_or_else(std::env::temp_dir);
    base.join("raggrep").join("projects").join(format!("{stem}-{}", &key[..12]))
}

/// Directory for cached embedding models.
pub fn model_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("raggrep")
        .join("models")
}

/// Hex SHA-256 digest.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for b in digest {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

/// A file's mtime as the ISO string persisted in manifests.
pub fn file_mtime(path: &Path) -> Result<String> {
    let meta = fs::metadata(path).map_err(|e| Error::io(path, e))?;
    let mtime = meta.modified().map_err(|e| Error::io(path, e))?;
    Ok(format_timestamp(mtime))
}

// ---------------------------------------------------------------------------
// Storage handle
// ---------------------------------------------------------------------------

/// Handle to one project's index directory.
#[derive(Debug, Clone)]
pub struct Storage {
    index_dir: PathBuf,
}

impl Storage {
    pub fn new(index_dir: PathBuf) -> Self {
        Self { index_dir }
    }

    pub fn index_dir(&self) -> &Path {
        &self.index_dir
    }

    pub fn exists(&self) -> bool {
        self.global_manifest_path().exists()
    }

    // -- paths --------------------------------------------------------------

    pub fn global_manifest_path(&self) -> PathBuf {
        self.index_dir.join("manifest.json")
    }

    pub fn module_dir(&self, module_id: &str) -> PathBuf {
        self.index_dir.join("index").join(module_id)
    }

    pub fn module_manifest_path(&self, module_id: &str) -> PathBuf {
        self.module_dir(module_id).join("manifest.json")
    }

    pub fn file_index_path(&self, module_id: &str, relpath: &str) -> PathBuf {
        self.module_dir(module_id).join(format!("{relpath}.json"))
    }

    pub fn symbolic_path(&self, module_id: &str, relpath: &str) -> PathBuf {
        self.module_dir(module_id).join("symbolic").join(format!("{relpath}.json"))
    }

    pub fn bm25_path(&self, module_id: &str) -> PathBuf {
        self.module_dir(module_id).join("bm25.bin")
    }

    pub fn literals_path(&self, module_id: &str) -> PathBuf {
        self.module_dir(module_id).join("literals.bin")
    }

    pub fn introspection_project_path(&self) -> PathBuf {
        self.index_dir.join("introspection").join("_project.json")
    }

    pub fn introspection_file_path(&self, relpath: &str) -> PathBuf {
        self.index_dir.join("introspection").join("files").join(format!("{relpath}.json"))
    }

    fn lock_path(&self) -> PathBuf {
        self.index_dir.join(".lock")
    }

    // -- generic json/bytes -------------------------------------------------

    /// Serialize to pretty JSON and atomically replace the target.
    pub fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(value)
            .map_err(|e| Error::CorruptIndex(format!("serialize {}: {e}", path.display())))?;
        self.write_bytes(path, json.as_bytes())
    }

    /// Read and deserialize JSON. `Ok(None)` when the file does not exist.
    pub fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>> {
        let text = match fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::io(path, e)),
        };
        let value = serde_json::from_str(&text)
            .map_err(|e| Error::CorruptIndex(format!("{}: {e}", path.display())))?;
        Ok(Some(value))
    }

    /// Write bytes via sibling temp file + rename; creates parent dirs.
    pub fn write_bytes(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        let parent = path.parent().unwrap_or(&self.index_dir);
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::InvalidInput(format!("bad path {}", path.display())))?;
        let tmp = parent.join(format!(".{file_name}.tmp-{}", std::process::id()));
        fs::write(&tmp, bytes).map_err(|e| Error::io(&tmp, e))?;
        fs::rename(&tmp, path).map_err(|e| Error::io(path, e))?;
        Ok(())
    }

    /// Read raw bytes. `Ok(None)` when the file does not exist.
    pub fn read_bytes(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        match fs::read(path) {
            Ok(b) => Ok(Some(b)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::io(path, e)),
        }
    }

    // -- manifests ----------------------------------------------------------

    pub fn load_global_manifest(&self) -> Result<Option<GlobalManifest>> {
        self.read_json(&self.global_manifest_path())
    }

    pub fn save_global_manifest(&self, manifest: &GlobalManifest) -> Result<()> {
        self.write_json(&self.global_manifest_path(), manifest)
    }

    pub fn load_module_manifest(&self, module_id: &str) -> Result<Option<ModuleManifest>> {
        self.read_json(&self.module_manifest_path(module_id))
    }

    pub fn save_module_manifest(&self, manifest: &ModuleManifest) -> Result<()> {
        self.write_json(&self.module_manifest_path(&manifest.module_id), manifest)
    }

    // -- per-file payloads --------------------------------------------------

    pub fn save_file_index(&self, module_id: &str, index: &FileIndex) -> Result<()> {
        self.write_json(&self.file_index_path(module_id, &index.filepath), index)
    }

    pub fn load_file_index(&self, module_id: &str, relpath: &str) -> Result<Option<FileIndex>> {
        let loaded: Option<FileIndex> =
            self.read_json(&self.file_index_path(module_id, relpath))?;
        if let Some(index) = &loaded {
            index.validate()?;
        }
        Ok(loaded)
    }

    /// Remove a file's main and symbolic payloads, pruning emptied parents.
    pub fn delete_file_payloads(&self, module_id: &str, relpath: &str) -> Result<()> {
        for path in
            [self.file_index_path(module_id, relpath), self.symbolic_path(module_id, relpath)]
        {
            match fs::remove_file(&path) {
                Ok(()) => self.prune_empty_dirs(path.parent()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(Error::io(&path, e)),
            }
        }
        Ok(())
    }

    /// Remove empty directories bottom-up, stopping at the index root.
    fn prune_empty_dirs(&self, start: Option<&Path>) {
        let mut dir = match start {
            Some(d) => d.to_path_buf(),
            None => return,
        };
        while dir.starts_with(&self.index_dir) && dir != self.index_dir {
            let empty = match fs::read_dir(&dir) {
                Ok(mut entries) => entries.next().is_none(),
                Err(_) => false,
            };
            if !empty || fs::remove_dir(&dir).is_err() {
                break;
            }
            match dir.parent() {
                Some(p) => dir = p.to_path_buf(),
                None => break,
            }
        }
    }

    /// Enumerate relpaths that have a persisted per-file payload, by walking
    /// the module directory. This is the fallback when sidecars are missing.
    pub fn list_file_indexes(&self, module_id: &str) -> Vec<String> {
        let module_dir = self.module_dir(module_id);
        let mut out = Vec::new();
        let mut stack = vec![module_dir.clone()];
        while let Some(dir) = stack.pop() {
            let entries = match fs::read_dir(&dir) {
                Ok(e) => e,
                Err(_) => continue,
            };
            for entry in entries.flatten() {
                let path = entry.path();
                let name = entry.file_name().to_string_lossy().to_string();
                if path.is_dir() {
                    if dir == module_dir && name == "symbolic" {
                        continue;
                    }
                    stack.push(path);
                } else if name.ends_with(".json") && !(dir == module_dir && name == "manifest.json")
                {
                    if let Ok(rel) = path.strip_prefix(&module_dir) {
                        let rel = rel.to_string_lossy().replace('\\', "/");
                        // Strip one .json suffix only: "data.json.json" is
                        // the payload for source file "data.json".
                        let rel = rel.strip_suffix(".json").unwrap_or(&rel);
                        out.push(rel.to_string());
                    }
                }
            }
        }
        out.sort();
        out
    }

    /// Delete a module's entire subtree.
    pub fn delete_module(&self, module_id: &str) -> Result<()> {
        let dir = self.module_dir(module_id);
        match fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::io(&dir, e)),
        }
    }

    /// Wipe the whole index directory.
    pub fn reset(&self) -> Result<()> {
        match fs::remove_dir_all(&self.index_dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::io(&self.index_dir, e)),
        }
    }

    // -- advisory writer lock ----------------------------------------------

    /// Take the single-writer advisory lock. Stale locks (older than ten
    /// minutes) are reclaimed; a fresh lock from another process is refused.
    pub fn acquire_lock(&self) -> Result<IndexLock> {
        fs::create_dir_all(&self.index_dir).map_err(|e| Error::io(&self.index_dir, e))?;
        let path = self.lock_path();
        loop {
            match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => {
                    use std::io::Write;
                    let mut file = file;
                    let _ = writeln!(file, "{}", std::process::id());
                    return Ok(IndexLock { path });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    let age = fs::metadata(&path)
                        .and_then(|m| m.modified())
                        .ok()
                        .and_then(|t| SystemTime::now().duration_since(t).ok());
                    match age {
                        Some(age) if age.as_secs() > LOCK_STALE_SECS => {
                            let _ = fs::remove_file(&path);
                            continue;
                        }
                        _ => return Err(Error::LockHeld(path)),
                    }
                }
                Err(e) => return Err(Error::io(&path, e)),
            }
        }
    }
}

/// Held advisory lock; releases on drop.
pub struct IndexLock {
    path: PathBuf,
}

impl Drop for IndexLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

// ---------------------------------------------------------------------------
// Source file reading
// ---------------------------------------------------------------------------

/// Read a source file, rejecting binaries (NUL in the first 8 KiB) and
/// anything over the size guard. `Ok(None)` means "skip this file".
pub fn read_source(path: &Path) -> Result<Option<String>> {
    let meta = fs::metadata(path).map_err(|e| Error::io(path, e))?;
    if meta.len() > MAX_FILE_READ {
        return Ok(None);
    }
    let bytes = fs::read(path).map_err(|e| Error::io(path, e))?;
    let probe = &bytes[..bytes.len().min(8192)];
    if probe.contains(&0) {
        return Ok(None);
    }
    match String::from_utf8(bytes) {
        Ok(text) => Ok(Some(text)),
        Err(_) => Ok(None),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{chunk_id, now_iso, Chunk, ChunkKind};
    use std::collections::BTreeMap;

    fn storage() -> (tempfile::TempDir, Storage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().join("idx"));
        (dir, storage)
    }

    fn file_index(relpath: &str) -> FileIndex {
        FileIndex {
            filepath: relpath.to_string(),
            last_modified: now_iso(),
            chunks: vec![Chunk {
                id: chunk_id(relpath, 1, 2),
                content: "line one\nline two".into(),
                start_line: 1,
                end_line: 2,
                kind: ChunkKind::File,
                name: None,
                exported: false,
                doc_comment: None,
                metadata: BTreeMap::new(),
            }],
            embeddings: None,
            references: Vec::new(),
        }
    }

    #[test]
    fn test_file_index_roundtrip() {
        let (_tmp, s) = storage();
        s.save_file_index("core", &file_index("src/a.txt")).unwrap();
        let loaded = s.load_file_index("core", "src/a.txt").unwrap().unwrap();
        assert_eq!(loaded.filepath, "src/a.txt");
        assert_eq!(loaded.chunks.len(), 1);
        assert!(s.load_file_index("core", "src/missing.txt").unwrap().is_none());
    }

    #[test]
    fn test_delete_prunes_empty_dirs() {
        let (_tmp, s) = storage();
        s.save_file_index("core", &file_index("deep/nested/dir/a.txt")).unwrap();
        s.delete_file_payloads("core", "deep/nested/dir/a.txt").unwrap();
        assert!(!s.module_dir("core").join("deep").exists());
    }

    #[test]
    fn test_list_file_indexes_skips_sidecars() {
        let (_tmp, s) = storage();
        s.save_file_index("core", &file_index("a.txt")).unwrap();
        s.save_file_index("core", &file_index("sub/b.txt")).unwrap();
        s.save_module_manifest(&ModuleManifest::new("core", "1")).unwrap();
        s.write_bytes(&s.bm25_path("core"), b"{}").unwrap();
        s.write_json(&s.symbolic_path("core", "a.txt"), &serde_json::json!({})).unwrap();
        assert_eq!(s.list_file_indexes("core"), vec!["a.txt", "sub/b.txt"]);
    }

    #[test]
    fn test_global_manifest_roundtrip() {
        let (_tmp, s) = storage();
        assert!(s.load_global_manifest().unwrap().is_none());
        let manifest = GlobalManifest::new(vec!["core".into()]);
        s.save_global_manifest(&manifest).unwrap();
        let loaded = s.load_global_manifest().unwrap().unwrap();
        assert_eq!(loaded.schema_version, crate::types::SCHEMA_VERSION);
        assert_eq!(loaded.modules, vec!["core".to_string()]);
    }

    #[test]
    fn test_corrupt_manifest_reported() {
        let (_tmp, s) = storage();
        s.write_bytes(&s.global_manifest_path(), b"{ nope").unwrap();
        assert!(matches!(
            s.load_global_manifest(),
            Err(crate::error::Error::CorruptIndex(_))
        ));
    }

    #[test]
    fn test_lock_refuses_second_writer() {
        let (_tmp, s) = storage();
        let lock = s.acquire_lock().unwrap();
        assert!(matches!(s.acquire_lock(), Err(crate::error::Error::LockHeld(_))));
        drop(lock);
        assert!(s.acquire_lock().is_ok());
    }

    #[test]
    fn test_read_source_rejects_binary() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("blob.bin");
        std::fs::write(&bin, [0u8, 159, 146, 150]).unwrap();
        assert!(read_source(&bin).unwrap().is_none());

        let text = dir.path().join("ok.txt");
        std::fs::write(&text, "hello").unwrap();
        assert_eq!(read_source(&text).unwrap().unwrap(), "hello");
    }

    #[test]
    fn test_index_location_is_deterministic_and_distinct() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        assert_eq!(get_index_location(a.path()), get_index_location(a.path()));
        assert_ne!(get_index_location(a.path()), get_index_location(b.path()));
    }
}
