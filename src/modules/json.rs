//! JSON data module: literal-only retrieval over dot-path keys.
//!
//! No embeddings; every flattened key path (`package.dependencies.react`)
//! becomes a definition-kind literal, and scoring leans on BM25 (0.4) plus
//! the literal signal (0.6).

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::bm25::Bm25Index;
use crate::error::{Error, Result};
use crate::literal::{literal_multiplier, ParsedQuery};
use crate::modules::code::{
    chunk_document, chunk_file, finalize_secondary_indexes, load_bm25, load_literals, snippet_of,
};
use crate::modules::{IndexerModule, ModuleContext, ModuleSearchOptions, PendingFile};
use crate::parser::{dot_paths, JsonParser, Parser};
use crate::storage::file_mtime;
use crate::types::{
    chunk_id, Chunk, ExtractedLiteral, FileIndex, FileSummary, LiteralKind, ScoreContext,
    SearchResult,
};
use crate::vecmath::sigmoid_normalize;

const BM25_WEIGHT: f32 = 0.4;
const LITERAL_WEIGHT: f32 = 0.6;
const MIN_SCORE: f32 = 0.10;
const BM25_MIDPOINT: f32 = 3.0;

pub struct JsonModule;

impl IndexerModule for JsonModule {
    fn id(&self) -> &'static str {
        "data/json"
    }

    fn name(&self) -> &'static str {
        "JSON"
    }

    fn version(&self) -> &'static str {
        "1.2.0"
    }

    fn extensions(&self) -> Option<&'static [&'static str]> {
        Some(&["json"])
    }

    fn needs_embeddings(&self) -> bool {
        false
    }

    fn index_file(
        &self,
        relpath: &str,
        content: &str,
        ctx: &ModuleContext,
    ) -> Result<Option<FileIndex>> {
        let parsed = match JsonParser.parse(relpath, content) {
            Ok(chunks) => chunks,
            Err(Error::Parse { path, message }) => {
                ctx.logger.debug(&format!("skipping invalid json {path}: {message}"));
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        let Some(file_chunk) = parsed.into_iter().next() else {
            return Ok(None);
        };

        let chunk = Chunk {
            id: chunk_id(relpath, file_chunk.start_line, file_chunk.end_line),
            content: file_chunk.content,
            start_line: file_chunk.start_line,
            end_line: file_chunk.end_line,
            kind: file_chunk.kind,
            name: None,
            exported: false,
            doc_comment: None,
            metadata: Default::default(),
        };

        // Dot-path literals from the parsed value tree; every key path is a
        // definition site.
        let value: serde_json::Value = serde_json::from_str(content)
            .map_err(|e| Error::Parse { path: relpath.to_string(), message: e.to_string() })?;
        let mut literals: Vec<(String, ExtractedLiteral)> = Vec::new();
        let mut keywords: Vec<String> = Vec::new();
        for (path, line) in dot_paths(&value) {
            if let Some(last) = path.rsplit('.').next() {
                if !last.is_empty() && !keywords.contains(&last.to_string()) {
                    keywords.push(last.to_string());
                }
            }
            literals.push((
                chunk.id.clone(),
                ExtractedLiteral {
                    text: path,
                    kind: LiteralKind::Definition,
                    confidence: 1.0,
                    line,
                },
            ));
        }

        let last_modified = file_mtime(&ctx.root.join(relpath))?;
        let docs = vec![(chunk.id.clone(), chunk_document(relpath, &chunk))];
        let mut kinds = BTreeSet::new();
        kinds.insert(chunk.kind);

        ctx.pending.insert(
            relpath.to_string(),
            PendingFile {
                summary: FileSummary {
                    filepath: relpath.to_string(),
                    chunk_count: 1,
                    chunk_kinds: kinds,
                    keywords,
                    exported_symbols: Vec::new(),
                    last_modified: last_modified.clone(),
                },
                docs,
                literals,
            },
        );

        Ok(Some(FileIndex {
            filepath: relpath.to_string(),
            last_modified,
            chunks: vec![chunk],
            embeddings: None,
            references: Vec::new(),
        }))
    }

    fn finalize(&self, ctx: &ModuleContext) -> Result<()> {
        finalize_secondary_indexes(self.id(), ctx)
    }

    fn search(
        &self,
        query: &ParsedQuery,
        ctx: &ModuleContext,
        options: &ModuleSearchOptions,
    ) -> Result<Vec<SearchResult>> {
        let Some(manifest) = ctx.storage.load_module_manifest(self.id())? else {
            return Ok(Vec::new());
        };
        if manifest.files.is_empty() {
            return Ok(Vec::new());
        }

        let bm25: Bm25Index = load_bm25(&ctx.storage, self.id());
        let literals = load_literals(&ctx.storage, self.id());

        // Dot-path lookup also honors bare key literals: `react` matches the
        // tail of `package.dependencies.react`.
        let mut match_map = literals.build_match_map(&query.literals);
        for lit in &query.literals {
            if lit.text.contains('.') {
                continue;
            }
            for (chunk, matches) in tail_matches(&literals, &lit.text) {
                match_map.entry(chunk).or_default().extend(matches);
            }
        }

        let bm25_scores: HashMap<String, f32> =
            bm25.search(&query.residual, bm25.len()).into_iter().collect();

        let min_score = options.min_score.unwrap_or(MIN_SCORE);
        let mut results = Vec::new();
        let mut scored: HashSet<String> = HashSet::new();

        let mut chunk_ids: Vec<String> = bm25_scores.keys().cloned().collect();
        chunk_ids.extend(match_map.keys().cloned());

        for id in chunk_ids {
            if !scored.insert(id.clone()) {
                continue;
            }
            let relpath = chunk_file(&id).to_string();
            if !manifest.files.contains_key(&relpath) {
                continue;
            }
            let Ok(Some(fi)) = ctx.storage.load_file_index(self.id(), &relpath) else {
                continue;
            };
            let Some(chunk) = fi.chunks.iter().find(|c| c.id == id) else {
                continue;
            };

            let bm25_norm = bm25_scores
                .get(&id)
                .map(|raw| sigmoid_normalize(*raw, BM25_MIDPOINT))
                .unwrap_or(0.0);
            let multiplier = match_map.get(&id).map(|m| literal_multiplier(m)).unwrap_or(0.0);
            // Bounded literal component so the weights stay comparable.
            let literal_component = multiplier / (1.0 + multiplier);
            let score = BM25_WEIGHT * bm25_norm + LITERAL_WEIGHT * literal_component;
            if score < min_score {
                continue;
            }

            results.push(SearchResult {
                filepath: relpath.clone(),
                module_id: self.id().to_string(),
                score,
                snippet: snippet_of(&chunk.content),
                chunk: chunk.clone(),
                context: ScoreContext {
                    semantic: 0.0,
                    bm25: bm25_norm,
                    vocab: 0.0,
                    literal_multiplier: multiplier,
                    introspection_boost: 1.0,
                    doc_intent_boost: 0.0,
                    exact_match_fusion: false,
                },
            });
        }

        results.sort_by(|a, b| {
            b.score.total_cmp(&a.score).then_with(|| a.filepath.cmp(&b.filepath))
        });
        results.truncate(options.top_k);
        Ok(results)
    }

    fn remove_file(&self, relpath: &str, ctx: &ModuleContext) -> Result<()> {
        ctx.storage.delete_file_payloads(self.id(), relpath)?;
        ctx.mark_removed(relpath);
        Ok(())
    }
}

/// Occurrences whose dot-path ends with `.{key}`, grouped by chunk id.
fn tail_matches(
    literals: &crate::literal::LiteralIndex,
    key: &str,
) -> Vec<(String, Vec<crate::literal::LiteralMatch>)> {
    let mut grouped: HashMap<String, Vec<crate::literal::LiteralMatch>> = HashMap::new();
    let suffix = format!(".{key}");
    for (term, occs) in literals.iter_terms() {
        if !term.ends_with(&suffix) {
            continue;
        }
        for occ in occs {
            grouped.entry(occ.chunk_id.clone()).or_default().push(
                crate::literal::LiteralMatch {
                    term: term.to_string(),
                    kind: occ.kind,
                    confidence: occ.confidence,
                    line: occ.line,
                },
            );
        }
    }
    grouped.into_iter().collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_component_bounded() {
        // A single definition match keeps the score under the weight cap.
        let multiplier = 1.5f32;
        let component = multiplier / (1.0 + multiplier);
        assert!(component > 0.5 && component < 1.0);
        assert!(LITERAL_WEIGHT * component > MIN_SCORE);
    }
}
