//! Project-structure discovery and per-file tagging.
//!
//! Scans the root for monorepo layout, recognizes projects by their
//! dependency manifests, and tags every file with project membership,
//! scope, architectural layer, domain, and language. The output is fully
//! deterministic for a given tree; tag matches against query terms earn
//! small multiplicative boosts at aggregation time.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use crate::config::Config;

/// Manifest walk stops below this depth.
const MAX_MANIFEST_DEPTH: usize = 4;

/// Per-facet boost for a query/tag match; total capped at [`MAX_BOOST`].
const FACET_BOOST: f32 = 1.05;
const MAX_BOOST: f32 = 1.15;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectKind {
    App,
    Service,
    Library,
    Script,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Frontend,
    Backend,
    Shared,
    Tooling,
    Unknown,
}

impl Scope {
    pub fn label(&self) -> &'static str {
        match self {
            Scope::Frontend => "frontend",
            Scope::Backend => "backend",
            Scope::Shared => "shared",
            Scope::Tooling => "tooling",
            Scope::Unknown => "unknown",
        }
    }
}

/// One recognized project inside the tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectInfo {
    pub name: String,
    /// Relative root ("" for the tree root itself).
    pub root: String,
    pub kind: ProjectKind,
    pub scope: Scope,
}

/// Tree-level structure: detected projects plus the monorepo flag.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectStructure {
    pub monorepo: bool,
    pub projects: Vec<ProjectInfo>,
}

/// Per-file tags derived from path, extension, and (optionally) contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileIntrospection {
    pub filepath: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    pub scope: Scope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framework: Option<String>,
    pub depth: usize,
    pub segments: Vec<String>,
    /// Keyword list fed into the Tier-1 file summary.
    pub keywords: Vec<String>,
}

// ---------------------------------------------------------------------------
// Project detection
// ---------------------------------------------------------------------------

const MONOREPO_MARKERS: [&str; 4] = ["apps", "packages", "libs", "services"];

const FRONTEND_DEPS: [&str; 8] =
    ["react", "vue", "svelte", "next", "angular", "solid-js", "preact", "vite"];
const BACKEND_DEPS: [&str; 10] = [
    "express", "fastify", "koa", "nest", "axum", "actix-web", "rocket", "gin", "flask", "django",
];

fn cargo_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?m)^\s*name\s*=\s*"([^"]+)""#).unwrap())
}

fn go_module_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^module\s+(\S+)").unwrap())
}

/// Scan the root for monorepo layout and dependency manifests.
pub fn detect_project_structure(root: &Path, config: &Config) -> ProjectStructure {
    let monorepo = MONOREPO_MARKERS.iter().any(|m| root.join(m).is_dir());

    let mut projects = Vec::new();
    collect_projects(root, root, 0, config, &mut projects);
    projects.sort_by(|a, b| a.root.cmp(&b.root));
    // When nested manifests repeat a root, keep the first (shallowest).
    projects.dedup_by(|a, b| a.root == b.root);

    ProjectStructure { monorepo, projects }
}

fn collect_projects(
    root: &Path,
    dir: &Path,
    depth: usize,
    config: &Config,
    out: &mut Vec<ProjectInfo>,
) {
    if depth > MAX_MANIFEST_DEPTH {
        return;
    }
    if let Some(project) = recognize_project(root, dir) {
        out.push(project);
    }
    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => return,
    };
    let mut subdirs: Vec<std::path::PathBuf> = entries
        .flatten()
        .filter(|e| e.path().is_dir())
        .map(|e| e.path())
        .filter(|p| {
            let name = p.file_name().and_then(|n| n.to_str()).unwrap_or("");
            !name.starts_with('.') && !config.ignore.iter().any(|i| i == name)
        })
        .collect();
    subdirs.sort();
    for sub in subdirs {
        collect_projects(root, &sub, depth + 1, config, out);
    }
}

fn recognize_project(root: &Path, dir: &Path) -> Option<ProjectInfo> {
    let rel_root = dir
        .strip_prefix(root)
        .ok()
        .map(|p| p.to_string_lossy().replace('\\', "/"))
        .unwrap_or_default();
    let dir_name =
        dir.file_name().and_then(|n| n.to_str()).unwrap_or("project").to_string();

    let pkg_json = dir.join("package.json");
    if pkg_json.is_file() {
        let content = fs::read_to_string(&pkg_json).unwrap_or_default();
        let json: serde_json::Value = serde_json::from_str(&content).unwrap_or_default();
        let name =
            json["name"].as_str().map(|s| s.to_string()).unwrap_or_else(|| dir_name.clone());
        let deps: Vec<String> = ["dependencies", "devDependencies"]
            .iter()
            .flat_map(|k| {
                json[*k]
                    .as_object()
                    .map(|o| o.keys().cloned().collect::<Vec<_>>())
                    .unwrap_or_default()
            })
            .collect();
        let (kind, scope) = classify(&name, &rel_root, &deps);
        return Some(ProjectInfo { name, root: rel_root, kind, scope });
    }

    let cargo = dir.join("Cargo.toml");
    if cargo.is_file() {
        let content = fs::read_to_string(&cargo).unwrap_or_default();
        let name = cargo_name_re()
            .captures(&content)
            .map(|c| c[1].to_string())
            .unwrap_or_else(|| dir_name.clone());
        let deps: Vec<String> = dep_keys_from_toml(&content);
        let (kind, scope) = classify(&name, &rel_root, &deps);
        return Some(ProjectInfo { name, root: rel_root, kind, scope });
    }

    let gomod = dir.join("go.mod");
    if gomod.is_file() {
        let content = fs::read_to_string(&gomod).unwrap_or_default();
        let name = go_module_re()
            .captures(&content)
            .map(|c| c[1].rsplit('/').next().unwrap_or(&c[1]).to_string())
            .unwrap_or_else(|| dir_name.clone());
        let (kind, scope) = classify(&name, &rel_root, &[]);
        return Some(ProjectInfo { name, root: rel_root, kind, scope });
    }

    let pyproject = dir.join("pyproject.toml");
    if pyproject.is_file() {
        let content = fs::read_to_string(&pyproject).unwrap_or_default();
        let name = cargo_name_re()
            .captures(&content)
            .map(|c| c[1].to_string())
            .unwrap_or_else(|| dir_name.clone());
        let (kind, scope) = classify(&name, &rel_root, &[]);
        return Some(ProjectInfo { name, root: rel_root, kind, scope });
    }

    None
}

/// Crude section-aware key extraction for Cargo-style TOML dependencies.
fn dep_keys_from_toml(content: &str) -> Vec<String> {
    let mut deps = Vec::new();
    let mut in_deps = false;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('[') {
            in_deps = trimmed.starts_with("[dependencies]")
                || trimmed.starts_with("[dev-dependencies]");
            continue;
        }
        if in_deps {
            if let Some((key, _)) = trimmed.split_once('=') {
                let key = key.trim();
                if !key.is_empty() {
                    deps.push(key.to_string());
                }
            }
        }
    }
    deps
}

fn classify(name: &str, rel_root: &str, deps: &[String]) -> (ProjectKind, Scope) {
    let has = |list: &[&str]| deps.iter().any(|d| list.contains(&d.as_str()));
    let frontend = has(&FRONTEND_DEPS);
    let backend = has(&BACKEND_DEPS);
    let name_lower = name.to_lowercase();
    let root_lower = rel_root.to_lowercase();

    let scope = if frontend && backend {
        Scope::Shared
    } else if frontend {
        Scope::Frontend
    } else if backend {
        Scope::Backend
    } else if name_lower.contains("tool")
        || name_lower.contains("script")
        || root_lower.starts_with("tools")
        || root_lower.starts_with("scripts")
    {
        Scope::Tooling
    } else if root_lower.starts_with("libs") || root_lower.starts_with("packages") {
        Scope::Shared
    } else {
        Scope::Unknown
    };

    let kind = if backend || root_lower.starts_with("services") || name_lower.contains("service") {
        ProjectKind::Service
    } else if frontend || root_lower.starts_with("apps") || name_lower.contains("app") {
        ProjectKind::App
    } else if name_lower.contains("lib")
        || name_lower.contains("util")
        || root_lower.starts_with("libs")
        || root_lower.starts_with("packages")
    {
        ProjectKind::Library
    } else if scope == Scope::Tooling {
        ProjectKind::Script
    } else {
        ProjectKind::Unknown
    };

    (kind, scope)
}

// ---------------------------------------------------------------------------
// Per-file tagging
// ---------------------------------------------------------------------------

const LAYERS: [(&str, &str); 14] = [
    ("controller", "controller"),
    ("service", "service"),
    ("repository", "repository"),
    ("repositorie", "repository"),
    ("model", "model"),
    ("middleware", "middleware"),
    ("handler", "handler"),
    ("route", "route"),
    ("view", "view"),
    ("component", "component"),
    ("schema", "schema"),
    ("migration", "migration"),
    ("util", "util"),
    ("helper", "util"),
];

const DOMAINS: [&str; 16] = [
    "auth", "user", "account", "session", "payment", "billing", "order", "search", "email",
    "notification", "admin", "api", "database", "cache", "config", "secret",
];

/// Map extension to language label.
pub fn language_for_ext(ext: &str) -> Option<&'static str> {
    match ext {
        "ts" | "tsx" => Some("typescript"),
        "js" | "jsx" | "mjs" | "cjs" => Some("javascript"),
        "py" | "pyi" => Some("python"),
        "go" => Some("go"),
        "rs" => Some("rust"),
        "md" => Some("markdown"),
        "json" => Some("json"),
        "yml" | "yaml" => Some("yaml"),
        "txt" => Some("text"),
        _ => None,
    }
}

fn framework_from_content(content: &str) -> Option<&'static str> {
    for (needle, framework) in [
        ("from 'react'", "react"),
        ("from \"react\"", "react"),
        ("require('express')", "express"),
        ("require(\"express\")", "express"),
        ("from 'express'", "express"),
        ("fastify(", "fastify"),
        ("from django", "django"),
        ("from flask", "flask"),
        ("axum::", "axum"),
        ("actix_web::", "actix"),
        ("gin.Default()", "gin"),
    ] {
        if content.contains(needle) {
            return Some(framework);
        }
    }
    None
}

/// Tag one file. `content` enables framework detection when available.
pub fn introspect_file(
    relpath: &str,
    structure: &ProjectStructure,
    content: Option<&str>,
) -> FileIntrospection {
    let segments: Vec<String> = relpath.split('/').map(|s| s.to_string()).collect();
    let depth = segments.len().saturating_sub(1);
    let filename = segments.last().cloned().unwrap_or_default();
    let stem = filename.rsplit_once('.').map(|(s, _)| s).unwrap_or(&filename);
    let ext = filename.rsplit_once('.').map(|(_, e)| e).unwrap_or("");

    // Longest project root that prefixes this path wins.
    let project = structure
        .projects
        .iter()
        .filter(|p| {
            p.root.is_empty()
                || relpath.starts_with(&format!("{}/", p.root))
        })
        .max_by_key(|p| p.root.len());

    let lower_path = relpath.to_lowercase();
    let lower_stem = stem.to_lowercase();

    let layer = LAYERS
        .iter()
        .find(|(needle, _)| {
            lower_stem.contains(needle)
                || segments[..segments.len().saturating_sub(1)]
                    .iter()
                    .any(|seg| seg.to_lowercase().contains(needle))
        })
        .map(|(_, layer)| layer.to_string());

    let domain = DOMAINS
        .iter()
        .find(|needle| lower_path.contains(*needle))
        .map(|s| s.to_string());

    let scope = project.map(|p| p.scope).unwrap_or(Scope::Unknown);

    let mut keywords: Vec<String> = Vec::new();
    for seg in &segments {
        let seg_stem = seg.rsplit_once('.').map(|(s, _)| s).unwrap_or(seg);
        for word in crate::vocab::split_identifier(seg_stem) {
            if word.len() > 1 && !keywords.contains(&word) {
                keywords.push(word);
            }
        }
    }
    if let Some(layer) = &layer {
        if !keywords.contains(layer) {
            keywords.push(layer.clone());
        }
    }
    if let Some(domain) = &domain {
        if !keywords.contains(domain) {
            keywords.push(domain.clone());
        }
    }

    FileIntrospection {
        filepath: relpath.to_string(),
        project: project.map(|p| p.name.clone()),
        scope,
        layer,
        domain,
        language: language_for_ext(ext).map(|s| s.to_string()),
        framework: content.and_then(framework_from_content).map(|s| s.to_string()),
        depth,
        segments,
        keywords,
    }
}

// ---------------------------------------------------------------------------
// Query-time boost
// ---------------------------------------------------------------------------

/// Multiplicative boost when query terms mention the file's scope, layer, or
/// domain. 1.0 when nothing matches; capped at [`MAX_BOOST`].
pub fn introspection_boost(query_tokens: &HashSet<String>, tags: &FileIntrospection) -> f32 {
    let mut boost = 1.0f32;
    if query_tokens.contains(tags.scope.label()) {
        boost *= FACET_BOOST;
    }
    if let Some(layer) = &tags.layer {
        if query_tokens.contains(layer.as_str()) {
            boost *= FACET_BOOST;
        }
    }
    if let Some(domain) = &tags.domain {
        if query_tokens.contains(domain.as_str()) {
            boost *= FACET_BOOST;
        }
    }
    boost.min(MAX_BOOST)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_monorepo_detection() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "apps/web/package.json",
            r#"{"name":"web","dependencies":{"react":"18"}}"#,
        );
        write(
            dir.path(),
            "services/api/package.json",
            r#"{"name":"api","dependencies":{"express":"4"}}"#,
        );
        let st = detect_project_structure(dir.path(), &Config::default());
        assert!(st.monorepo);
        assert_eq!(st.projects.len(), 2);

        let web = st.projects.iter().find(|p| p.name == "web").unwrap();
        assert_eq!(web.scope, Scope::Frontend);
        assert_eq!(web.kind, ProjectKind::App);

        let api = st.projects.iter().find(|p| p.name == "api").unwrap();
        assert_eq!(api.scope, Scope::Backend);
        assert_eq!(api.kind, ProjectKind::Service);
    }

    #[test]
    fn test_cargo_project_recognition() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "Cargo.toml",
            "[package]\nname = \"indexer-lib\"\n\n[dependencies]\nserde = \"1\"\n",
        );
        let st = detect_project_structure(dir.path(), &Config::default());
        assert!(!st.monorepo);
        assert_eq!(st.projects[0].name, "indexer-lib");
        assert_eq!(st.projects[0].kind, ProjectKind::Library);
    }

    #[test]
    fn test_detection_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "packages/a/package.json", r#"{"name":"a"}"#);
        write(dir.path(), "packages/b/package.json", r#"{"name":"b"}"#);
        let a = detect_project_structure(dir.path(), &Config::default());
        let b = detect_project_structure(dir.path(), &Config::default());
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn test_file_tagging_layer_domain_language() {
        let st = ProjectStructure::default();
        let tags = introspect_file("src/auth/user.controller.ts", &st, None);
        assert_eq!(tags.layer.as_deref(), Some("controller"));
        assert_eq!(tags.domain.as_deref(), Some("auth"));
        assert_eq!(tags.language.as_deref(), Some("typescript"));
        assert_eq!(tags.depth, 2);
        assert!(tags.keywords.contains(&"auth".to_string()));
        assert!(tags.keywords.contains(&"controller".to_string()));
    }

    #[test]
    fn test_framework_detection_from_content() {
        let st = ProjectStructure::default();
        let tags = introspect_file(
            "src/app.ts",
            &st,
            Some("import React from 'react';\nexport const App = () => null;"),
        );
        assert_eq!(tags.framework.as_deref(), Some("react"));
    }

    #[test]
    fn test_project_membership_longest_root() {
        let st = ProjectStructure {
            monorepo: true,
            projects: vec![
                ProjectInfo {
                    name: "root".into(),
                    root: "".into(),
                    kind: ProjectKind::Unknown,
                    scope: Scope::Unknown,
                },
                ProjectInfo {
                    name: "api".into(),
                    root: "services/api".into(),
                    kind: ProjectKind::Service,
                    scope: Scope::Backend,
                },
            ],
        };
        let tags = introspect_file("services/api/src/index.ts", &st, None);
        assert_eq!(tags.project.as_deref(), Some("api"));
        assert_eq!(tags.scope, Scope::Backend);
    }

    #[test]
    fn test_boost_is_capped() {
        let st = ProjectStructure::default();
        let tags = introspect_file("backend/auth/session.controller.ts", &st, None);
        let tokens: HashSet<String> =
            ["auth", "controller", "backend", "unknown"].iter().map(|s| s.to_string()).collect();
        let boost = introspection_boost(&tokens, &tags);
        assert!(boost > 1.0);
        assert!(boost <= MAX_BOOST + 1e-6);

        let none: HashSet<String> = HashSet::new();
        assert_eq!(introspection_boost(&none, &tags), 1.0);
    }
}
