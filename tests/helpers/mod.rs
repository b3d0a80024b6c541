//! Fixture scaffolding for integration tests: a synthetic project tree plus
//! an isolated index directory, wired to the offline hash embedder.

use std::path::{Path, PathBuf};

use raggrep::{IndexOptions, SearchOptions};

pub struct TestProject {
    pub project: tempfile::TempDir,
    pub index: tempfile::TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        Self {
            project: tempfile::tempdir().expect("project tempdir"),
            index: tempfile::tempdir().expect("index tempdir"),
        }
    }

    pub fn root(&self) -> &Path {
        self.project.path()
    }

    pub fn index_dir(&self) -> PathBuf {
        self.index.path().to_path_buf()
    }

    /// Write a file, creating parent directories.
    pub fn write(&self, rel: &str, content: &str) {
        let path = self.project.path().join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create fixture dirs");
        }
        std::fs::write(path, content).expect("write fixture file");
    }

    pub fn remove(&self, rel: &str) {
        std::fs::remove_file(self.project.path().join(rel)).expect("remove fixture file");
    }

    pub fn index_options(&self) -> IndexOptions {
        IndexOptions {
            index_dir: Some(self.index_dir()),
            embedding_model: Some("hash".into()),
            ..Default::default()
        }
    }

    pub fn search_options(&self) -> SearchOptions {
        SearchOptions {
            index_dir: Some(self.index_dir()),
            embedding_model: Some("hash".into()),
            ..Default::default()
        }
    }

    pub fn index(&self) {
        raggrep::index(self.root(), &self.index_options()).expect("index fixture tree");
    }
}
