//! Search aggregator: fuse per-module results, apply filters, and run the
//! hybrid exact-match pass.

use rayon::prelude::*;
use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;
use tracing::debug;

use crate::error::Result;
use crate::freshness::ensure_fresh;
use crate::indexer::{enumerate_files, IndexRun};
use crate::literal::{parse_query, ParsedQuery};
use crate::modules::ModuleSearchOptions;
use crate::registry;
use crate::storage::read_source;
use crate::types::{
    ExactMatch, HybridResults, IndexOptions, SearchOptions, SearchResult,
};

/// Score bump applied to semantic results corroborated by the exact pass.
const EXACT_FUSION_BOOST: f32 = 0.1;
/// Exact-match cap per file keeps pathological files from flooding output.
const EXACT_MATCHES_PER_FILE: usize = 5;

// ---------------------------------------------------------------------------
// search
// ---------------------------------------------------------------------------

/// Ranked chunk search across every active module.
pub fn search(root: &Path, query: &str, options: &SearchOptions) -> Result<Vec<SearchResult>> {
    if query.trim().is_empty() {
        return Ok(Vec::new());
    }

    let fresh_started = Instant::now();
    if options.ensure_fresh {
        ensure_fresh(root, &index_options_from(options))?;
    }
    let fresh_ms = fresh_started.elapsed().as_millis();

    let run = IndexRun::prepare(root, &index_options_from(options))?;
    let Some(global) = run.storage.load_global_manifest()? else {
        return Ok(Vec::new());
    };

    registry::ensure_builtin_modules();
    let modules: Vec<_> = registry::enabled_modules(&run.config)
        .into_iter()
        .filter(|m| global.modules.iter().any(|id| id == m.id()))
        .collect();

    let parsed = parse_query(query);
    let module_options = ModuleSearchOptions {
        top_k: (options.top_k * 3).max(30),
        min_score: options.min_score,
    };

    let search_started = Instant::now();
    let mut gathered: Vec<SearchResult> = Vec::new();
    for module in &modules {
        let ctx = run.module_context(module.as_ref())?;
        module.initialize(&ctx)?;
        let mut results = module.search(&parsed, &ctx, &module_options)?;
        gathered.append(&mut results);
    }
    let search_ms = search_started.elapsed().as_millis();

    let fuse_started = Instant::now();
    let mut results = fuse(gathered, options);
    results.truncate(options.top_k);
    let fuse_ms = fuse_started.elapsed().as_millis();

    if options.timing {
        run.logger.info(&format!(
            "timing: freshness {fresh_ms}ms, modules {search_ms}ms, fusion {fuse_ms}ms"
        ));
    }
    debug!(
        query = query,
        results = results.len(),
        fresh_ms = fresh_ms as u64,
        search_ms = search_ms as u64,
        "search complete"
    );
    Ok(results)
}

fn index_options_from(options: &SearchOptions) -> IndexOptions {
    IndexOptions {
        index_dir: options.index_dir.clone(),
        embedding_model: options.embedding_model.clone(),
        logger: options.logger.clone(),
        ..Default::default()
    }
}

/// Apply filters, de-duplicate by (filepath, startLine, endLine) keeping the
/// higher score, and sort deterministically.
fn fuse(results: Vec<SearchResult>, options: &SearchOptions) -> Vec<SearchResult> {
    let mut best: HashMap<(String, usize, usize), SearchResult> = HashMap::new();
    for result in results {
        if !passes_filters(&result.filepath, options) {
            continue;
        }
        let key =
            (result.filepath.clone(), result.chunk.start_line, result.chunk.end_line);
        match best.get(&key) {
            Some(existing) if existing.score >= result.score => {}
            _ => {
                best.insert(key, result);
            }
        }
    }
    let mut out: Vec<SearchResult> = best.into_values().collect();
    out.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.filepath.cmp(&b.filepath))
            .then_with(|| a.chunk.start_line.cmp(&b.chunk.start_line))
    });
    out
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

fn passes_filters(filepath: &str, options: &SearchOptions) -> bool {
    if let Some(ext) = &options.file_type {
        let wanted = ext.trim_start_matches('.');
        let actual = filepath.rsplit('.').next().unwrap_or("");
        if !actual.eq_ignore_ascii_case(wanted) {
            return false;
        }
    }
    if options.filters.is_empty() {
        return true;
    }
    // Multiple --filter options combine with OR semantics.
    options.filters.iter().any(|f| filter_matches(filepath, f))
}

/// One filter: `*.ext` is an extension match, globs translate to a full
/// regex, anything else is a path prefix. Paths normalize to forward
/// slashes with no leading or trailing slash.
fn filter_matches(filepath: &str, filter: &str) -> bool {
    let filter = filter.replace('\\', "/");
    let filter = filter.trim_matches('/');
    if filter.is_empty() {
        return true;
    }

    if let Some(ext) = filter.strip_prefix("*.") {
        if !ext.contains('*') && !ext.contains('/') {
            let actual = filepath.rsplit('.').next().unwrap_or("");
            return actual.eq_ignore_ascii_case(ext);
        }
    }

    if filter.contains('*') || filter.contains('?') {
        return glob_to_regex(filter)
            .map(|re| re.is_match(filepath))
            .unwrap_or(false);
    }

    filepath == filter || filepath.starts_with(&format!("{filter}/"))
}

fn glob_to_regex(glob: &str) -> Option<regex::Regex> {
    let mut pattern = String::with_capacity(glob.len() * 2 + 2);
    pattern.push('^');
    let mut chars = glob.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    pattern.push_str(".*");
                } else {
                    pattern.push_str("[^/]*");
                }
            }
            '?' => pattern.push_str("[^/]"),
            c if "\\.+()[]{}|^$".contains(c) => {
                pattern.push('\\');
                pattern.push(c);
            }
            c => pattern.push(c),
        }
    }
    pattern.push('$');
    regex::Regex::new(&pattern).ok()
}

// ---------------------------------------------------------------------------
// Hybrid search
// ---------------------------------------------------------------------------

/// Module search plus a grep-equivalent exact-substring pass over every file
/// in the tree. Exact hits surface as their own block and boost any
/// semantic result for the same file. This is the canonical remedy for file
/// kinds without a parser (YAML, `.env`, compose files).
pub fn hybrid_search(root: &Path, query: &str, options: &SearchOptions) -> Result<HybridResults> {
    let mut results = search(root, query, options)?;

    let run = IndexRun::prepare(root, &index_options_from(options))?;
    let parsed = parse_query(query);
    let exact_matches = exact_scan(&run, &parsed, options);

    let exact_files: std::collections::HashSet<&str> =
        exact_matches.iter().map(|m| m.filepath.as_str()).collect();
    for result in &mut results {
        if exact_files.contains(result.filepath.as_str()) {
            result.context.exact_match_fusion = true;
            result.score += EXACT_FUSION_BOOST;
        }
    }
    results.sort_by(|a, b| {
        b.score.total_cmp(&a.score).then_with(|| a.filepath.cmp(&b.filepath))
    });

    Ok(HybridResults { results, exact_matches })
}

/// Substring scan subject to the configured ignore patterns. Needles are
/// the query's literals, or the trimmed query when it has none.
fn exact_scan(run: &IndexRun, parsed: &ParsedQuery, options: &SearchOptions) -> Vec<ExactMatch> {
    let mut needles: Vec<String> = parsed.literals.iter().map(|l| l.text.clone()).collect();
    if needles.is_empty() {
        let raw = parsed.raw.trim().to_string();
        if raw.is_empty() {
            return Vec::new();
        }
        needles.push(raw);
    }

    let files = enumerate_files(&run.root, &run.config);
    let mut matches: Vec<ExactMatch> = files
        .par_iter()
        .filter(|rel| passes_filters(rel.as_str(), options))
        .flat_map_iter(|rel| {
            let mut hits = Vec::new();
            let Ok(Some(content)) = read_source(&run.root.join(rel)) else {
                return hits.into_iter();
            };
            for (i, line) in content.lines().enumerate() {
                if needles.iter().any(|needle| line.contains(needle.as_str())) {
                    hits.push(ExactMatch {
                        filepath: rel.clone(),
                        line: i + 1,
                        line_text: truncate_line(line),
                    });
                    if hits.len() >= EXACT_MATCHES_PER_FILE {
                        break;
                    }
                }
            }
            hits.into_iter()
        })
        .collect();

    matches.sort_by(|a, b| a.filepath.cmp(&b.filepath).then_with(|| a.line.cmp(&b.line)));
    matches
}

fn truncate_line(line: &str) -> String {
    let trimmed = line.trim();
    if trimmed.len() <= 200 {
        return trimmed.to_string();
    }
    let mut end = 200;
    while !trimmed.is_char_boundary(end) && end > 0 {
        end -= 1;
    }
    trimmed[..end].to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_extension_shorthand() {
        assert!(filter_matches("src/auth/login.ts", "*.ts"));
        assert!(!filter_matches("src/auth/login.ts", "*.py"));
    }

    #[test]
    fn test_filter_path_prefix() {
        assert!(filter_matches("src/auth/login.ts", "src/auth"));
        assert!(filter_matches("src/auth/login.ts", "/src/auth/"));
        assert!(!filter_matches("src/other/login.ts", "src/auth"));
    }

    #[test]
    fn test_filter_glob() {
        assert!(filter_matches("src/auth/login.ts", "src/**/*.ts"));
        assert!(filter_matches("src/login.ts", "src/*.ts"));
        assert!(!filter_matches("src/auth/login.ts", "src/*.ts"));
    }

    #[test]
    fn test_filters_or_semantics() {
        let options = SearchOptions {
            filters: vec!["docs".into(), "*.ts".into()],
            ..Default::default()
        };
        assert!(passes_filters("docs/guide.md", &options));
        assert!(passes_filters("src/a.ts", &options));
        assert!(!passes_filters("src/a.py", &options));
    }

    #[test]
    fn test_file_type_filter() {
        let options = SearchOptions { file_type: Some("ts".into()), ..Default::default() };
        assert!(passes_filters("src/a.ts", &options));
        assert!(!passes_filters("src/a.tsx", &options));
    }

    #[test]
    fn test_empty_query_no_results() {
        let dir = tempfile::tempdir().unwrap();
        let results = search(dir.path(), "   ", &SearchOptions::default()).unwrap();
        assert!(results.is_empty());
    }
}
