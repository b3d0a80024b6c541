//! Universal index invariants over synthetic trees.

mod helpers;

use helpers::TestProject;
use raggrep::storage::Storage;

#[test]
fn test_manifest_chunk_counts_match_payloads() {
    let t = TestProject::new();
    t.write(
        "src/a.ts",
        "export function one() {\n  return 1;\n}\n\nexport function two() {\n  return 2;\n}\n",
    );
    t.write("notes.txt", "plain text file");
    t.index();

    let storage = Storage::new(t.index_dir());
    for module_id in ["language/typescript", "core"] {
        let manifest = storage.load_module_manifest(module_id).unwrap().unwrap();
        for (relpath, entry) in &manifest.files {
            let fi = storage.load_file_index(module_id, relpath).unwrap().unwrap();
            assert_eq!(
                entry.chunk_count,
                fi.chunks.len(),
                "manifest chunk count must match stored payload for {relpath}"
            );
            assert_eq!(entry.last_modified, fi.last_modified);
            assert!(entry.content_hash.is_some());
        }
    }
}

#[test]
fn test_embeddings_length_matches_chunks() {
    let t = TestProject::new();
    t.write(
        "src/a.ts",
        "export function one() {\n  return 1;\n}\n\nexport function two() {\n  return 2;\n}\n",
    );
    t.index();

    let storage = Storage::new(t.index_dir());
    let fi = storage.load_file_index("language/typescript", "src/a.ts").unwrap().unwrap();
    let emb = fi.embeddings.as_ref().expect("language module stores embeddings");
    assert_eq!(emb.vectors.len(), fi.chunks.len());
    assert_eq!(emb.model, "hash");
    assert!(emb.vectors.iter().all(|v| v.len() == emb.dim));
}

#[test]
fn test_unchanged_reindex_touches_no_payload_bytes() {
    let t = TestProject::new();
    t.write("src/a.ts", "export function stable() {\n  return 42;\n}\n");
    t.index();

    let storage = Storage::new(t.index_dir());
    let payload = storage.file_index_path("language/typescript", "src/a.ts");
    let before = std::fs::metadata(&payload).unwrap().modified().unwrap();

    std::thread::sleep(std::time::Duration::from_millis(50));
    let results = raggrep::index(t.root(), &t.index_options()).unwrap();
    let ts = results.iter().find(|r| r.module_id == "language/typescript").unwrap();
    assert_eq!(ts.indexed, 0);
    assert_eq!(ts.unchanged, 1);

    let after = std::fs::metadata(&payload).unwrap().modified().unwrap();
    assert_eq!(before, after, "unchanged file must not rewrite its payload");
}

#[test]
fn test_content_edit_reindexes() {
    let t = TestProject::new();
    t.write("src/a.ts", "export function before() {\n  return 1;\n}\n");
    t.index();

    std::thread::sleep(std::time::Duration::from_millis(20));
    t.write("src/a.ts", "export function after() {\n  return 2;\n}\n");
    let results = raggrep::index(t.root(), &t.index_options()).unwrap();
    let ts = results.iter().find(|r| r.module_id == "language/typescript").unwrap();
    assert_eq!(ts.indexed, 1);

    let hits = raggrep::search(t.root(), "`after`", &t.search_options()).unwrap();
    assert!(hits.iter().any(|r| r.filepath == "src/a.ts"));
    let stale = raggrep::search(t.root(), "`before`", &t.search_options()).unwrap();
    assert!(stale.iter().all(|r| r.filepath != "src/a.ts" || r.chunk.content.contains("after")));
}

#[test]
fn test_cancel_stops_dispatch_and_keeps_partial_state() {
    let t = TestProject::new();
    for i in 0..20 {
        t.write(&format!("src/file{i:02}.txt"), &format!("content number {i}"));
    }

    let cancel = raggrep::CancelToken::new();
    cancel.cancel();
    let options = raggrep::IndexOptions {
        cancel: Some(cancel),
        ..t.index_options()
    };
    let results = raggrep::index(t.root(), &options).unwrap();

    // Everything was skipped, nothing indexed, and the run still returned a
    // consistent (empty) result set.
    let total_indexed: usize = results.iter().map(|r| r.indexed).sum();
    assert_eq!(total_indexed, 0);
}

#[test]
fn test_literal_definitions_rank_above_references() {
    let t = TestProject::new();
    t.write(
        "src/def.ts",
        "export function computeChecksum(data: string): number {\n  return data.len;\n}\n",
    );
    t.write(
        "src/use.ts",
        "import { computeChecksum } from './def';\n\nexport function run(d: string) {\n  return computeChecksum(d);\n}\n",
    );
    t.index();

    let results = raggrep::search(t.root(), "`computeChecksum`", &t.search_options()).unwrap();
    assert!(results.len() >= 2, "both the definition and the reference should surface");
    assert_eq!(results[0].filepath, "src/def.ts");
}
