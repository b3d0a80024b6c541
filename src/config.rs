//! Runtime configuration. Loaded from `<indexDir>/config.json`, falling back
//! to defaults when absent.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{Error, Result};

/// Per-module configuration record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModuleConfig {
    pub enabled: bool,
    /// Embedding model id for language modules ("minilm", "bge-small",
    /// "hash", ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
    pub show_progress: bool,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self { enabled: true, embedding_model: None, show_progress: false }
    }
}

/// Index-wide configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// File extensions eligible for indexing (no leading dot).
    pub extensions: Vec<String>,
    /// Directory names excluded from every walk.
    pub ignore: Vec<String>,
    /// Module ids allowed to run, in no particular order; intersected with
    /// the registry's registration order.
    pub enabled_modules: Vec<String>,
    /// Per-module overrides keyed by module id.
    pub modules: BTreeMap<String, ModuleConfig>,
    /// Index-wide embedding model default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            extensions: [
                "ts", "tsx", "js", "jsx", "mjs", "cjs", "py", "pyi", "go", "rs", "md", "json",
                "txt",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            ignore: [
                "node_modules",
                ".git",
                "dist",
                "build",
                ".raggrep",
                "target",
                "vendor",
                "__pycache__",
                ".next",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            enabled_modules: [
                "core",
                "language/typescript",
                "language/python",
                "language/go",
                "language/rust",
                "data/json",
                "docs/markdown",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            modules: BTreeMap::new(),
            embedding_model: None,
        }
    }
}

impl Config {
    /// Load `config.json` from the index directory, or defaults when the
    /// file does not exist. A present-but-invalid file is a hard error so
    /// typos never silently fall back.
    pub fn load_or_default(index_dir: &Path) -> Result<Self> {
        let path = index_dir.join("config.json");
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
        serde_json::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    /// Is the module allowed to run?
    pub fn module_enabled(&self, module_id: &str) -> bool {
        if !self.enabled_modules.iter().any(|m| m == module_id) {
            return false;
        }
        self.modules.get(module_id).map(|m| m.enabled).unwrap_or(true)
    }

    /// Resolve the embedding model for a module: explicit override, then the
    /// module's config, then the index-wide default, then "minilm".
    pub fn embedding_model_for(&self, module_id: &str, override_model: Option<&str>) -> String {
        if let Some(m) = override_model {
            return m.to_string();
        }
        if let Some(m) = self.modules.get(module_id).and_then(|c| c.embedding_model.as_deref()) {
            return m.to_string();
        }
        self.embedding_model.clone().unwrap_or_else(|| "minilm".to_string())
    }

    /// Does the extension (lowercase, no dot) participate in indexing?
    pub fn extension_enabled(&self, ext: &str) -> bool {
        self.extensions.iter().any(|e| e == ext)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_cover_expected_extensions() {
        let cfg = Config::default();
        for ext in ["ts", "py", "go", "rs", "md", "json", "txt"] {
            assert!(cfg.extension_enabled(ext), "missing default extension {ext}");
        }
        assert!(!cfg.extension_enabled("exe"));
    }

    #[test]
    fn test_defaults_enable_all_modules() {
        let cfg = Config::default();
        assert!(cfg.module_enabled("core"));
        assert!(cfg.module_enabled("language/typescript"));
        assert!(!cfg.module_enabled("language/cobol"));
    }

    #[test]
    fn test_module_config_can_disable() {
        let mut cfg = Config::default();
        cfg.modules.insert(
            "docs/markdown".into(),
            ModuleConfig { enabled: false, ..Default::default() },
        );
        assert!(!cfg.module_enabled("docs/markdown"));
    }

    #[test]
    fn test_model_resolution_order() {
        let mut cfg = Config::default();
        assert_eq!(cfg.embedding_model_for("core", None), "minilm");
        cfg.embedding_model = Some("bge-small".into());
        assert_eq!(cfg.embedding_model_for("core", None), "bge-small");
        cfg.modules.insert(
            "core".into(),
            ModuleConfig { embedding_model: Some("hash".into()), ..Default::default() },
        );
        assert_eq!(cfg.embedding_model_for("core", None), "hash");
        assert_eq!(cfg.embedding_model_for("core", Some("minilm")), "minilm");
    }

    #[test]
    fn test_invalid_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.json"), "{ not json").unwrap();
        assert!(Config::load_or_default(dir.path()).is_err());
    }

    #[test]
    fn test_missing_config_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load_or_default(dir.path()).unwrap();
        assert!(cfg.extension_enabled("rs"));
    }
}
