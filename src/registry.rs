//! Global module registry.
//!
//! A closed, compile-time set of modules registered once per process.
//! Registration is idempotent (first write wins); enablement intersects the
//! registry with configuration while preserving registration order, so
//! result ordering is deterministic across runs.

use std::sync::{Arc, Mutex, OnceLock};

use crate::config::Config;
use crate::modules::{IndexerModule, JsonModule, LanguageModule};

type ModuleHandle = Arc<dyn IndexerModule>;

fn registry() -> &'static Mutex<Vec<ModuleHandle>> {
    static REGISTRY: OnceLock<Mutex<Vec<ModuleHandle>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(Vec::new()))
}

/// Register a module. Silently drops duplicates by id.
pub fn register(module: ModuleHandle) {
    let mut modules = registry().lock().expect("module registry poisoned");
    if modules.iter().any(|m| m.id() == module.id()) {
        return;
    }
    modules.push(module);
}

/// Register the built-in module set, in its canonical order. Idempotent.
pub fn ensure_builtin_modules() {
    register(Arc::new(LanguageModule::core()));
    register(Arc::new(LanguageModule::typescript()));
    register(Arc::new(LanguageModule::python()));
    register(Arc::new(LanguageModule::go()));
    register(Arc::new(LanguageModule::rust()));
    register(Arc::new(JsonModule));
    register(Arc::new(LanguageModule::markdown()));
}

/// Registered modules enabled by the configuration, in registration order.
pub fn enabled_modules(config: &Config) -> Vec<ModuleHandle> {
    let modules = registry().lock().expect("module registry poisoned");
    modules.iter().filter(|m| config.module_enabled(m.id())).cloned().collect()
}

/// All registered module ids, in registration order.
pub fn registered_ids() -> Vec<&'static str> {
    let modules = registry().lock().expect("module registry poisoned");
    modules.iter().map(|m| m.id()).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_is_idempotent_and_ordered() {
        ensure_builtin_modules();
        ensure_builtin_modules();
        let ids = registered_ids();
        let expected = [
            "core",
            "language/typescript",
            "language/python",
            "language/go",
            "language/rust",
            "data/json",
            "docs/markdown",
        ];
        assert_eq!(ids, expected);
    }

    #[test]
    fn test_enabled_intersection_preserves_order() {
        ensure_builtin_modules();
        let mut config = Config::default();
        config.enabled_modules =
            vec!["docs/markdown".into(), "core".into(), "language/rust".into()];
        let enabled = enabled_modules(&config);
        let ids: Vec<&str> = enabled.iter().map(|m| m.id()).collect();
        // Registration order wins over config order.
        assert_eq!(ids, vec!["core", "language/rust", "docs/markdown"]);
    }
}
