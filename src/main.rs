//! raggrep binary - thin CLI shell over the library crate.

use clap::{Parser, Subcommand};
use std::io::BufRead;
use std::path::PathBuf;
use std::process::ExitCode;

use raggrep::{
    logger, CleanupOptions, HybridResults, IndexOptions, SearchOptions, SearchResult,
};

// ---------------------------------------------------------------------------
// CLI definition (clap derive)
// ---------------------------------------------------------------------------

/// Local retrieval engine for source trees - hybrid semantic, keyword, and
/// literal search over an incrementally maintained index.
#[derive(Parser)]
#[command(name = "raggrep", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project root directory (default: current directory)
    #[arg(long, global = true)]
    root: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build or update the index for the project
    Index {
        /// Keep watching the tree and re-index on change
        #[arg(long)]
        watch: bool,

        /// Embedding model: minilm (default), minilm-l12, bge-small, hash
        #[arg(long)]
        model: Option<String>,

        /// Worker pool size
        #[arg(long)]
        concurrency: Option<usize>,

        /// Log per-file activity
        #[arg(long)]
        verbose: bool,
    },
    /// Search the index
    Query {
        /// Free text; backtick or double-quoted substrings match exactly
        text: String,

        /// Number of results
        #[arg(long, default_value_t = 10)]
        top: usize,

        /// Minimum result score
        #[arg(long)]
        min_score: Option<f32>,

        /// Restrict to one file extension (e.g. ts)
        #[arg(long = "type")]
        file_type: Option<String>,

        /// Path prefix or glob; repeatable, OR-combined
        #[arg(long = "filter")]
        filters: Vec<String>,

        /// Add a grep-style exact pass over every file in the tree
        #[arg(long)]
        hybrid: bool,

        /// Print per-phase latencies
        #[arg(long)]
        timing: bool,
    },
    /// Show what is currently indexed
    Status,
    /// Delete the project's index
    Reset,
    /// Drop index entries for deleted files
    Cleanup {
        /// Log each removed entry
        #[arg(long)]
        verbose: bool,
    },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("raggrep=info".parse().unwrap()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let root = cli.root.clone().unwrap_or_else(|| PathBuf::from("."));

    let outcome = match cli.command {
        Commands::Index { watch, model, concurrency, verbose } => {
            run_index(&root, watch, model, concurrency, verbose)
        }
        Commands::Query { text, top, min_score, file_type, filters, hybrid, timing } => {
            run_query(&root, &text, top, min_score, file_type, filters, hybrid, timing)
        }
        Commands::Status => run_status(&root),
        Commands::Reset => run_reset(&root),
        Commands::Cleanup { verbose } => run_cleanup(&root, verbose),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

// ---------------------------------------------------------------------------
// Subcommands
// ---------------------------------------------------------------------------

fn run_index(
    root: &std::path::Path,
    watch: bool,
    model: Option<String>,
    concurrency: Option<usize>,
    verbose: bool,
) -> raggrep::Result<()> {
    let options = IndexOptions {
        embedding_model: model,
        concurrency,
        logger: Some(logger::inline_progress(verbose)),
        show_progress: true,
        ..Default::default()
    };

    if watch {
        let watcher = raggrep::watch_directory(root, options)?;
        eprintln!("watching {} (close stdin to stop)", root.display());
        // Block until stdin closes, then shut the watcher down cleanly.
        let stdin = std::io::stdin();
        let mut line = String::new();
        loop {
            line.clear();
            match stdin.lock().read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
        }
        watcher.stop();
        return Ok(());
    }

    let results = raggrep::index(root, &options)?;
    for result in &results {
        if result.indexed + result.refreshed + result.removed + result.failed > 0 {
            eprintln!(
                "[{}] indexed {} refreshed {} removed {} failed {} ({} ms)",
                result.module_id,
                result.indexed,
                result.refreshed,
                result.removed,
                result.failed,
                result.duration_ms
            );
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_query(
    root: &std::path::Path,
    text: &str,
    top: usize,
    min_score: Option<f32>,
    file_type: Option<String>,
    filters: Vec<String>,
    hybrid: bool,
    timing: bool,
) -> raggrep::Result<()> {
    let options = SearchOptions {
        top_k: top,
        min_score,
        file_type,
        filters,
        timing,
        logger: Some(logger::console(false)),
        ..Default::default()
    };

    if hybrid {
        let HybridResults { results, exact_matches } =
            raggrep::hybrid_search(root, text, &options)?;
        print_results(&results);
        if !exact_matches.is_empty() {
            println!("\nexact matches:");
            for m in &exact_matches {
                println!("  {}:{}  {}", m.filepath, m.line, m.line_text);
            }
        }
        return Ok(());
    }

    let results = raggrep::search(root, text, &options)?;
    print_results(&results);
    Ok(())
}

fn print_results(results: &[SearchResult]) {
    if results.is_empty() {
        println!("no results");
        return;
    }
    for (i, r) in results.iter().enumerate() {
        let name = r
            .chunk
            .name
            .as_deref()
            .map(|n| format!(" {} {n}", r.chunk.kind.label()))
            .unwrap_or_default();
        let fused = if r.context.exact_match_fusion { " [exact]" } else { "" };
        println!(
            "{:2}. {}:{}-{}  {:.3}{fused}{name}",
            i + 1,
            r.filepath,
            r.chunk.start_line,
            r.chunk.end_line,
            r.score
        );
        if let Some(first_line) = r.snippet.lines().find(|l| !l.trim().is_empty()) {
            println!("      {}", first_line.trim());
        }
    }
}

fn run_status(root: &std::path::Path) -> raggrep::Result<()> {
    let st = raggrep::status(root, None)?;
    if !st.exists {
        println!("no index at {}", st.index_dir.display());
        return Ok(());
    }
    println!("index: {}", st.index_dir.display());
    println!("schema: v{}", st.schema_version.unwrap_or(0));
    for m in &st.modules {
        println!(
            "  [{}] {} file(s), {} chunk(s), updated {}",
            m.module_id, m.files, m.chunks, m.last_updated
        );
    }
    Ok(())
}

fn run_reset(root: &std::path::Path) -> raggrep::Result<()> {
    raggrep::reset(root, None)?;
    eprintln!("index removed");
    Ok(())
}

fn run_cleanup(root: &std::path::Path, verbose: bool) -> raggrep::Result<()> {
    let report = raggrep::cleanup(
        root,
        &CleanupOptions {
            verbose,
            logger: Some(logger::console(verbose)),
            ..Default::default()
        },
    )?;
    eprintln!("removed {} stale entr(ies), {} kept", report.removed, report.unchanged);
    Ok(())
}
