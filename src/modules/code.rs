//! The canonical code module: parse, chunk, embed, and score one language
//! family. All language modules (and the markdown docs module) are instances
//! of this engine with different parsers and weights; the `core` instance is
//! the fallback that covers extensions no other module claims.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::bm25::{self, Bm25Index};
use crate::error::{Error, Result};
use crate::introspect::{introspect_file, introspection_boost, FileIntrospection};
use crate::literal::{
    extract_chunk_literals, literal_contribution, literal_multiplier, LiteralIndex,
    LiteralOccurrence, ParsedQuery,
};
use crate::modules::{
    IndexerModule, ModuleContext, ModuleSearchOptions, PendingFile,
};
use crate::parser::parser_for_extension;
use crate::storage::{file_mtime, Storage};
use crate::types::{
    chunk_id, Chunk, EmbeddingPayload, FileIndex, FileSummary, ScoreContext, SearchResult,
};
use crate::vecmath::{cosine_similarity, sigmoid_normalize};
use crate::vocab::{content_stems, identifier_vocabulary, vocab_bonus};

/// Chunk-level BM25 sigmoid midpoint.
const BM25_MIDPOINT: f32 = 3.0;
/// File-level (Tier-1) BM25 sigmoid midpoint.
const TIER1_MIDPOINT: f32 = 5.0;
/// Trees larger than this get Tier-1 candidate filtering before chunk scoring.
const TIER1_THRESHOLD: usize = 64;
/// How many files survive Tier-1 filtering (literal hits are always added).
const TIER1_CANDIDATES: usize = 50;
/// A base score above this counts as "non-trivial signal" for literal boosts.
const SIGNAL_FLOOR: f32 = 0.1;
/// Additive boost for documentation-intent queries on docs modules.
const DOC_INTENT_BOOST: f32 = 0.05;

const DOC_INTENT_WORDS: [&str; 10] = [
    "how", "guide", "readme", "docs", "documentation", "tutorial", "example", "usage", "setup",
    "install",
];

// ---------------------------------------------------------------------------
// Module construction
// ---------------------------------------------------------------------------

/// Static knobs distinguishing one engine instance from another.
#[derive(Debug, Clone, Copy)]
pub struct ModuleSpec {
    pub id: &'static str,
    pub name: &'static str,
    pub version: &'static str,
    /// `None` marks the fallback module.
    pub extensions: Option<&'static [&'static str]>,
    pub min_score: f32,
    pub semantic_weight: f32,
    pub bm25_weight: f32,
    pub doc_intent_boost: bool,
}

/// A language (or docs) module instance.
pub struct LanguageModule {
    spec: ModuleSpec,
}

impl LanguageModule {
    /// Fallback coverage for every configured extension nobody else claims.
    pub fn core() -> Self {
        Self {
            spec: ModuleSpec {
                id: "core",
                name: "Core",
                version: "1.2.0",
                extensions: None,
                min_score: 0.15,
                semantic_weight: 0.7,
                bm25_weight: 0.3,
                doc_intent_boost: false,
            },
        }
    }

    pub fn typescript() -> Self {
        Self {
            spec: ModuleSpec {
                id: "language/typescript",
                name: "TypeScript",
                version: "1.2.0",
                extensions: Some(&["ts", "tsx", "js", "jsx", "mjs", "cjs"]),
                min_score: 0.15,
                semantic_weight: 0.7,
                bm25_weight: 0.3,
                doc_intent_boost: false,
            },
        }
    }

    pub fn python() -> Self {
        Self {
            spec: ModuleSpec {
                id: "language/python",
                name: "Python",
                version: "1.2.0",
                extensions: Some(&["py", "pyi"]),
                min_score: 0.15,
                semantic_weight: 0.7,
                bm25_weight: 0.3,
                doc_intent_boost: false,
            },
        }
    }

    pub fn go() -> Self {
        Self {
            spec: ModuleSpec {
                id: "language/go",
                name: "Go",
                version: "1.2.0",
                extensions: Some(&["go"]),
                min_score: 0.15,
                semantic_weight: 0.7,
                bm25_weight: 0.3,
                doc_intent_boost: false,
            },
        }
    }

    pub fn rust() -> Self {
        Self {
            spec: ModuleSpec {
                id: "language/rust",
                name: "Rust",
                version: "1.2.0",
                extensions: Some(&["rs"]),
                min_score: 0.15,
                semantic_weight: 0.7,
                bm25_weight: 0.3,
                doc_intent_boost: false,
            },
        }
    }

    /// Markdown docs: heading chunks plus a bonus for documentation-intent
    /// queries.
    pub fn markdown() -> Self {
        Self {
            spec: ModuleSpec {
                id: "docs/markdown",
                name: "Markdown",
                version: "1.2.0",
                extensions: Some(&["md"]),
                min_score: 0.15,
                semantic_weight: 0.7,
                bm25_weight: 0.3,
                doc_intent_boost: true,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Shared helpers (also used by the JSON module)
// ---------------------------------------------------------------------------

/// The keyword document indexed for a chunk: path tokens first so filename
/// and folder names carry lexical weight, then the declared name, doc
/// comment, and body.
pub(crate) fn chunk_document(relpath: &str, chunk: &Chunk) -> String {
    let mut doc = String::with_capacity(chunk.content.len() + relpath.len() + 64);
    doc.push_str(relpath);
    doc.push('\n');
    if let Some(name) = &chunk.name {
        doc.push_str(name);
        doc.push('\n');
    }
    if let Some(comment) = &chunk.doc_comment {
        doc.push_str(comment);
        doc.push('\n');
    }
    doc.push_str(&chunk.content);
    doc
}

/// First 200 chars of a chunk, cut at a char boundary.
pub(crate) fn snippet_of(content: &str) -> String {
    if content.len() <= 200 {
        return content.to_string();
    }
    let mut end = 200;
    while !content.is_char_boundary(end) && end > 0 {
        end -= 1;
    }
    content[..end].to_string()
}

/// Load the BM25 sidecar, rebuilding from per-file payloads when it is
/// missing or unreadable.
pub(crate) fn load_bm25(storage: &Storage, module_id: &str) -> Bm25Index {
    if let Ok(Some(bytes)) = storage.read_bytes(&storage.bm25_path(module_id)) {
        if let Ok(index) = Bm25Index::from_bytes(&bytes) {
            return index;
        }
    }
    // Sidecar absent: fall back to scanning the per-file payloads.
    let mut index = Bm25Index::new();
    for relpath in storage.list_file_indexes(module_id) {
        if let Ok(Some(fi)) = storage.load_file_index(module_id, &relpath) {
            for chunk in &fi.chunks {
                index.add_document(&chunk.id, &fi.filepath, &chunk_document(&relpath, chunk));
            }
        }
    }
    index
}

/// Load the literal sidecar, rebuilding from per-file payloads when it is
/// missing or unreadable.
pub(crate) fn load_literals(storage: &Storage, module_id: &str) -> LiteralIndex {
    if let Ok(Some(bytes)) = storage.read_bytes(&storage.literals_path(module_id)) {
        if let Ok(index) = LiteralIndex::from_bytes(&bytes) {
            return index;
        }
    }
    let mut index = LiteralIndex::new();
    for relpath in storage.list_file_indexes(module_id) {
        if let Ok(Some(fi)) = storage.load_file_index(module_id, &relpath) {
            for chunk in &fi.chunks {
                for lit in
                    extract_chunk_literals(chunk.name.as_deref(), &chunk.content, chunk.start_line)
                {
                    index.insert(
                        &lit.text,
                        LiteralOccurrence {
                            chunk_id: chunk.id.clone(),
                            filepath: fi.filepath.clone(),
                            kind: lit.kind,
                            confidence: lit.confidence,
                            line: lit.line,
                        },
                    );
                }
            }
        }
    }
    index
}

/// Shared finalize: fold pending files and removals into the sidecars.
pub(crate) fn finalize_secondary_indexes(module_id: &str, ctx: &ModuleContext) -> Result<()> {
    let removed: Vec<String> = ctx
        .removed
        .lock()
        .map(|r| r.clone())
        .unwrap_or_default();
    if removed.is_empty() && ctx.pending.is_empty() {
        return Ok(());
    }

    let mut bm25 = load_bm25(&ctx.storage, module_id);
    let mut literals = load_literals(&ctx.storage, module_id);

    for relpath in &removed {
        bm25.remove_file(relpath);
        literals.remove_file(relpath);
    }

    for entry in ctx.pending.iter() {
        let (relpath, pending) = (entry.key(), entry.value());
        bm25.remove_file(relpath);
        literals.remove_file(relpath);
        for (id, doc) in &pending.docs {
            bm25.add_document(id, relpath, doc);
        }
        for (id, lit) in &pending.literals {
            literals.insert(
                &lit.text,
                LiteralOccurrence {
                    chunk_id: id.clone(),
                    filepath: relpath.clone(),
                    kind: lit.kind,
                    confidence: lit.confidence,
                    line: lit.line,
                },
            );
        }
        ctx.storage.write_json(
            &ctx.storage.symbolic_path(module_id, relpath),
            &pending.summary,
        )?;
    }

    ctx.storage.write_bytes(&ctx.storage.bm25_path(module_id), &bm25.to_bytes())?;
    ctx.storage.write_bytes(&ctx.storage.literals_path(module_id), &literals.to_bytes())?;
    Ok(())
}

/// File tags: persisted introspection when available, path-derived otherwise.
pub(crate) fn file_tags(ctx: &ModuleContext, relpath: &str) -> FileIntrospection {
    ctx.storage
        .read_json(&ctx.storage.introspection_file_path(relpath))
        .ok()
        .flatten()
        .unwrap_or_else(|| introspect_file(relpath, &ctx.structure, None))
}

/// Owning filepath of a chunk id (`path#start-end`).
pub(crate) fn chunk_file(chunk_id: &str) -> &str {
    chunk_id.rsplit_once('#').map(|(path, _)| path).unwrap_or(chunk_id)
}

fn has_doc_intent(raw_query: &str) -> bool {
    bm25::tokenize(raw_query)
        .iter()
        .any(|t| DOC_INTENT_WORDS.contains(&t.as_str()))
}

// ---------------------------------------------------------------------------
// IndexerModule implementation
// ---------------------------------------------------------------------------

impl IndexerModule for LanguageModule {
    fn id(&self) -> &'static str {
        self.spec.id
    }

    fn name(&self) -> &'static str {
        self.spec.name
    }

    fn version(&self) -> &'static str {
        self.spec.version
    }

    fn extensions(&self) -> Option<&'static [&'static str]> {
        self.spec.extensions
    }

    fn index_file(
        &self,
        relpath: &str,
        content: &str,
        ctx: &ModuleContext,
    ) -> Result<Option<FileIndex>> {
        let ext = relpath.rsplit('.').next().unwrap_or("");
        let parser = parser_for_extension(ext);
        let parsed = match parser.parse(relpath, content) {
            Ok(chunks) => chunks,
            Err(Error::Parse { path, message }) => {
                ctx.logger.debug(&format!("skipping unparseable {path}: {message}"));
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        if parsed.is_empty() {
            return Ok(None);
        }

        let chunks: Vec<Chunk> = parsed
            .into_iter()
            .map(|p| Chunk {
                id: chunk_id(relpath, p.start_line, p.end_line),
                content: p.content,
                start_line: p.start_line,
                end_line: p.end_line,
                kind: p.kind,
                name: p.name,
                exported: p.exported,
                doc_comment: p.doc_comment,
                metadata: Default::default(),
            })
            .collect();

        let embeddings = match &ctx.embedder {
            Some(embedder) => {
                let texts: Vec<String> =
                    chunks.iter().map(|c| chunk_document(relpath, c)).collect();
                let vectors = embedder.embed(&texts)?;
                Some(EmbeddingPayload {
                    model: embedder.model_id().to_string(),
                    dim: embedder.dim(),
                    vectors,
                })
            }
            None => None,
        };

        let last_modified = file_mtime(&ctx.root.join(relpath))?;
        let references = resolve_references(&ctx.root, relpath, content);

        // Stage the summary, keyword docs, and literals for finalize.
        let tags = introspect_file(relpath, &ctx.structure, Some(content));
        let mut keywords = tags.keywords.clone();
        let mut exported_symbols = Vec::new();
        let mut kinds = BTreeSet::new();
        for chunk in &chunks {
            kinds.insert(chunk.kind);
            if let Some(name) = &chunk.name {
                if chunk.exported && !exported_symbols.contains(name) {
                    exported_symbols.push(name.clone());
                }
                for word in crate::vocab::split_identifier(name) {
                    if !keywords.contains(&word) {
                        keywords.push(word);
                    }
                }
            }
        }

        let docs: Vec<(String, String)> =
            chunks.iter().map(|c| (c.id.clone(), chunk_document(relpath, c))).collect();
        let literals: Vec<(String, crate::types::ExtractedLiteral)> = chunks
            .iter()
            .flat_map(|c| {
                extract_chunk_literals(c.name.as_deref(), &c.content, c.start_line)
                    .into_iter()
                    .map(move |lit| (c.id.clone(), lit))
            })
            .collect();

        ctx.pending.insert(
            relpath.to_string(),
            PendingFile {
                summary: FileSummary {
                    filepath: relpath.to_string(),
                    chunk_count: chunks.len(),
                    chunk_kinds: kinds,
                    keywords,
                    exported_symbols,
                    last_modified: last_modified.clone(),
                },
                docs,
                literals,
            },
        );

        Ok(Some(FileIndex {
            filepath: relpath.to_string(),
            last_modified,
            chunks,
            embeddings,
            references,
        }))
    }

    fn finalize(&self, ctx: &ModuleContext) -> Result<()> {
        finalize_secondary_indexes(self.spec.id, ctx)
    }

    fn search(
        &self,
        query: &ParsedQuery,
        ctx: &ModuleContext,
        options: &ModuleSearchOptions,
    ) -> Result<Vec<SearchResult>> {
        let Some(manifest) = ctx.storage.load_module_manifest(self.spec.id)? else {
            return Ok(Vec::new());
        };
        let files: Vec<String> = manifest.files.keys().cloned().collect();
        if files.is_empty() {
            return Ok(Vec::new());
        }

        let bm25 = load_bm25(&ctx.storage, self.spec.id);
        let literals = load_literals(&ctx.storage, self.spec.id);
        let match_map = literals.build_match_map(&query.literals);

        // Chunk-level raw BM25 for the lexical residual, computed once.
        let bm25_scores: HashMap<String, f32> =
            bm25.search(&query.residual, bm25.len()).into_iter().collect();

        let query_vec = match (&ctx.embedder, query.residual.is_empty()) {
            (Some(embedder), false) => {
                embedder.embed(&[query.residual.clone()])?.into_iter().next()
            }
            _ => None,
        };
        let query_stems = content_stems(&query.residual);
        let query_tokens: HashSet<String> = bm25::tokenize(&query.raw).into_iter().collect();
        let doc_intent = self.spec.doc_intent_boost && has_doc_intent(&query.raw);

        let literal_files: HashSet<String> =
            match_map.keys().map(|id| chunk_file(id).to_string()).collect();
        let candidates = self.select_candidates(ctx, &files, query, &literal_files);

        let min_score = options.min_score.unwrap_or(self.spec.min_score);
        let mut results: Vec<SearchResult> = Vec::new();

        for relpath in &candidates {
            let fi = match ctx.storage.load_file_index(self.spec.id, relpath) {
                Ok(Some(fi)) => fi,
                Ok(None) => continue,
                Err(e) => {
                    ctx.logger.warn(&format!("unreadable index payload for {relpath}: {e}"));
                    continue;
                }
            };
            let tags = file_tags(ctx, relpath);
            let boost = introspection_boost(&query_tokens, &tags);

            for (i, chunk) in fi.chunks.iter().enumerate() {
                let semantic = match (&query_vec, &fi.embeddings) {
                    (Some(qv), Some(emb)) => {
                        cosine_similarity(qv, &emb.vectors[i]).unwrap_or(0.0).max(0.0)
                    }
                    _ => 0.0,
                };
                let bm25_norm = match bm25_scores.get(&chunk.id) {
                    Some(raw) => sigmoid_normalize(*raw, BM25_MIDPOINT),
                    None => 0.0,
                };
                let base =
                    self.spec.semantic_weight * semantic + self.spec.bm25_weight * bm25_norm;

                let vocab = {
                    let mut text = chunk.content.clone();
                    if let Some(name) = &chunk.name {
                        text.push(' ');
                        text.push_str(name);
                    }
                    vocab_bonus(&query_stems, &identifier_vocabulary(&text))
                };

                let mut score = (base + vocab) * boost;
                let mut context = ScoreContext {
                    semantic,
                    bm25: bm25_norm,
                    vocab,
                    literal_multiplier: 0.0,
                    introspection_boost: boost,
                    doc_intent_boost: 0.0,
                    exact_match_fusion: false,
                };

                if let Some(matches) = match_map.get(&chunk.id) {
                    let multiplier = literal_multiplier(matches);
                    score += literal_contribution(multiplier, base > SIGNAL_FLOOR);
                    context.literal_multiplier = multiplier;
                }

                if doc_intent {
                    score += DOC_INTENT_BOOST;
                    context.doc_intent_boost = DOC_INTENT_BOOST;
                }

                if score < min_score {
                    continue;
                }

                results.push(SearchResult {
                    filepath: relpath.clone(),
                    module_id: self.spec.id.to_string(),
                    score,
                    snippet: snippet_of(&chunk.content),
                    chunk: chunk.clone(),
                    context,
                });
            }
        }

        results.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.filepath.cmp(&b.filepath))
                .then_with(|| a.chunk.start_line.cmp(&b.chunk.start_line))
        });
        results.truncate(options.top_k);
        Ok(results)
    }

    fn remove_file(&self, relpath: &str, ctx: &ModuleContext) -> Result<()> {
        ctx.storage.delete_file_payloads(self.spec.id, relpath)?;
        ctx.mark_removed(relpath);
        Ok(())
    }
}

impl LanguageModule {
    /// Tier-1 candidate filtering: on large trees, a file-level BM25 over
    /// the Tier-1 summaries picks the files worth chunk-scoring. Files with
    /// literal matches always survive.
    fn select_candidates(
        &self,
        ctx: &ModuleContext,
        files: &[String],
        query: &ParsedQuery,
        literal_files: &HashSet<String>,
    ) -> Vec<String> {
        if files.len() <= TIER1_THRESHOLD || query.residual.is_empty() {
            return files.to_vec();
        }

        let mut tier1 = Bm25Index::new();
        for relpath in files {
            let summary: Option<FileSummary> = ctx
                .storage
                .read_json(&ctx.storage.symbolic_path(self.spec.id, relpath))
                .ok()
                .flatten();
            let doc = match summary {
                Some(s) => {
                    let mut doc = relpath.clone();
                    doc.push('\n');
                    doc.push_str(&s.keywords.join(" "));
                    doc.push('\n');
                    doc.push_str(&s.exported_symbols.join(" "));
                    doc
                }
                // Missing sidecar: the path itself is still a signal.
                None => relpath.clone(),
            };
            tier1.add_document(relpath, relpath, &doc);
        }

        let mut selected: Vec<String> = tier1
            .search(&query.residual, TIER1_CANDIDATES)
            .into_iter()
            .filter(|(_, raw)| sigmoid_normalize(*raw, TIER1_MIDPOINT) > 0.1)
            .map(|(id, _)| id)
            .collect();

        for relpath in literal_files {
            if files.contains(relpath) && !selected.contains(relpath) {
                selected.push(relpath.clone());
            }
        }
        selected.sort();
        selected
    }
}

// ---------------------------------------------------------------------------
// Outgoing references
// ---------------------------------------------------------------------------

/// Resolve relative import specifiers against the tree. Best effort; only
/// same-tree targets are recorded.
fn resolve_references(root: &std::path::Path, relpath: &str, content: &str) -> Vec<String> {
    use regex::Regex;
    use std::sync::OnceLock;

    static IMPORT_RE: OnceLock<Regex> = OnceLock::new();
    let import_re = IMPORT_RE.get_or_init(|| {
        Regex::new(r#"(?:from\s+['"](\.[^'"]+)['"]|require\s*\(\s*['"](\.[^'"]+)['"]\s*\))"#)
            .unwrap()
    });

    let dir = match relpath.rsplit_once('/') {
        Some((d, _)) => d,
        None => "",
    };

    let mut refs: Vec<String> = Vec::new();
    for cap in import_re.captures_iter(content) {
        let spec = cap.get(1).or_else(|| cap.get(2)).map(|m| m.as_str()).unwrap_or("");
        if spec.is_empty() {
            continue;
        }
        let joined = normalize_relative(dir, spec);
        for candidate in [
            joined.clone(),
            format!("{joined}.ts"),
            format!("{joined}.tsx"),
            format!("{joined}.js"),
            format!("{joined}.jsx"),
            format!("{joined}/index.ts"),
            format!("{joined}/index.js"),
        ] {
            if root.join(&candidate).is_file() {
                if !refs.contains(&candidate) {
                    refs.push(candidate);
                }
                break;
            }
        }
    }
    refs
}

/// Join a directory and a `./`-style specifier, collapsing `..` segments.
fn normalize_relative(dir: &str, spec: &str) -> String {
    let mut parts: Vec<&str> = if dir.is_empty() {
        Vec::new()
    } else {
        dir.split('/').collect()
    };
    for seg in spec.split('/') {
        match seg {
            "." | "" => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_document_includes_path_and_name() {
        let chunk = Chunk {
            id: chunk_id("src/auth.ts", 1, 3),
            content: "function x() {}".into(),
            start_line: 1,
            end_line: 3,
            kind: crate::types::ChunkKind::Function,
            name: Some("authenticateUser".into()),
            exported: true,
            doc_comment: Some("Checks a token.".into()),
            metadata: Default::default(),
        };
        let doc = chunk_document("src/auth.ts", &chunk);
        assert!(doc.starts_with("src/auth.ts\n"));
        assert!(doc.contains("authenticateUser"));
        assert!(doc.contains("Checks a token."));
    }

    #[test]
    fn test_snippet_respects_char_boundaries() {
        let long = "é".repeat(300);
        let snip = snippet_of(&long);
        assert!(snip.len() <= 200);
        assert!(long.starts_with(&snip));
    }

    #[test]
    fn test_chunk_file_parses_id() {
        assert_eq!(chunk_file("src/a.ts#3-10"), "src/a.ts");
        assert_eq!(chunk_file("weird#path#1-2"), "weird#path");
    }

    #[test]
    fn test_normalize_relative() {
        assert_eq!(normalize_relative("src/auth", "./login"), "src/auth/login");
        assert_eq!(normalize_relative("src/auth", "../db/client"), "src/db/client");
        assert_eq!(normalize_relative("", "./main"), "main");
    }

    #[test]
    fn test_doc_intent_words() {
        assert!(has_doc_intent("how do I install this"));
        assert!(has_doc_intent("setup guide"));
        assert!(!has_doc_intent("authenticateUser token"));
    }
}
