//! DocMind CLI - command-line interface for the local document search engine
//!
//! Usage: docmind <command> [options]

use clap::{Parser, Subcommand};
use docmind_common::EXIT_ERROR;
use docmind_config::Config;
use docmind_core::{
    CancelToken, ChangeWatcher, ChangeWatcherConfig, CoreContext, IndexingPipeline, ProgressEvent, Query, SearchMode,
};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "docmind", version = "0.1.0", about = "Local document search engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose/debug logging
    #[arg(long, global = true)]
    verbose: bool,

    /// Emit logs as JSON instead of human-readable text
    #[arg(long, global = true)]
    json_logs: bool,

    /// Directory holding documents.db, index/, embeddings.bin (default: ./.docmind)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Index a folder (one-shot run of the indexing pipeline)
    Index {
        /// Folder to scan and index
        folder: PathBuf,

        /// Skip embedding generation (full-text search only)
        #[arg(long)]
        skip_embeddings: bool,
    },

    /// Search indexed documents
    Search {
        /// Search query text
        text: String,

        /// Search mode: full_text, semantic, or hybrid
        #[arg(long, default_value = "hybrid")]
        mode: String,

        /// Maximum number of results
        #[arg(long, default_value = "10")]
        limit: u32,

        /// Restrict results to folder path prefixes (repeatable)
        #[arg(long = "folder")]
        folders: Vec<String>,

        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Rebuild the full index for a folder, enforcing a timeout
    Rebuild {
        /// Folder to rebuild from
        folder: PathBuf,

        /// Timeout in minutes before the rebuild is aborted
        #[arg(long)]
        timeout_minutes: Option<u64>,
    },

    /// Watch a folder for changes and keep the index up to date
    Watch {
        /// Folder to watch
        folder: PathBuf,
    },

    /// Print aggregate statistics across all stores
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Inspect search history
    History {
        /// Show the N most recent searches
        #[arg(long)]
        recent: Option<u32>,

        /// Show the most popular queries over the last 30 days
        #[arg(long)]
        popular: bool,

        /// Show rising/falling query trends over the last 14 days
        #[arg(long)]
        trends: bool,

        /// Show queries that returned zero results
        #[arg(long)]
        failed: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    docmind_common::telemetry::init_tracing(cli.verbose, cli.json_logs);
    tracing::info!("docmind CLI started");

    let data_dir = cli.data_dir.clone().unwrap_or_else(|| PathBuf::from(".docmind"));

    let result = match cli.command {
        Commands::Index { folder, skip_embeddings } => cmd_index(&data_dir, &folder, skip_embeddings).await,
        Commands::Search { text, mode, limit, folders, json } => cmd_search(&data_dir, text, mode, limit, folders, json).await,
        Commands::Rebuild { folder, timeout_minutes } => cmd_rebuild(&data_dir, &folder, timeout_minutes).await,
        Commands::Watch { folder } => cmd_watch(&data_dir, &folder).await,
        Commands::Stats { json } => cmd_stats(&data_dir, json).await,
        Commands::History { recent, popular, trends, failed, json } => {
            cmd_history(&data_dir, recent, popular, trends, failed, json).await
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(EXIT_ERROR);
    }
}

//
// Helper functions
//

/// Print error as JSON for tool integration
fn print_json_error(error: &anyhow::Error, code: &str) {
    use serde_json::json;

    let json_error = json!({
        "success": false,
        "error": {
            "code": code,
            "message": error.to_string(),
        }
    });

    println!("{}", serde_json::to_string_pretty(&json_error).unwrap());
}

fn open_context(data_dir: &Path) -> anyhow::Result<CoreContext> {
    let config = Config::load(data_dir)?;
    Ok(CoreContext::open(config)?)
}

//
// Command implementations
//

async fn cmd_index(data_dir: &Path, folder: &Path, skip_embeddings: bool) -> anyhow::Result<()> {
    use indicatif::{ProgressBar, ProgressStyle};
    use std::time::Instant;

    let context = open_context(data_dir)?;
    let start = Instant::now();

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    pb.enable_steady_tick(std::time::Duration::from_millis(80));

    let pipeline = IndexingPipeline::new(
        &context.document_store,
        &context.inverted_index,
        &context.embedding_store,
        context.embedder(),
        context.extractor(),
        context.config.indexing.batch_size,
        skip_embeddings || context.config.indexing.skip_embeddings,
    );

    let cancel = CancelToken::new();
    let stats = pipeline.run(folder, &cancel, |event| match event {
        ProgressEvent::Progress(progress) => pb.set_message(progress.display_message()),
        ProgressEvent::Completed(_) => {}
        ProgressEvent::Error(err) => tracing::warn!(kind = %err.kind, message = %err.message, "indexing error"),
    })?;

    pb.finish_and_clear();

    let elapsed = start.elapsed();
    println!(
        "Indexed {} file(s) ({} failed, {} document(s) added) in {:.2}s",
        stats.files_processed, stats.files_failed, stats.documents_added, elapsed.as_secs_f64()
    );

    Ok(())
}

async fn cmd_search(
    data_dir: &Path,
    text: String,
    mode: String,
    limit: u32,
    folders: Vec<String>,
    json: bool,
) -> anyhow::Result<()> {
    use serde_json::json;
    use std::time::Instant;

    let context = match open_context(data_dir) {
        Ok(c) => c,
        Err(e) if json => {
            print_json_error(&e, "OPEN_FAILED");
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    let search_mode = match SearchMode::parse(&mode) {
        Some(m) => m,
        None if json => {
            print_json_error(&anyhow::anyhow!("invalid mode '{}'", mode), "INVALID_MODE");
            return Ok(());
        }
        None => anyhow::bail!("invalid mode '{}'. Use: full_text, semantic, or hybrid", mode),
    };

    let mut query = Query::new(text.clone(), search_mode);
    query.limit = limit;
    if !folders.is_empty() {
        query.folder_paths = Some(folders);
    }

    let searcher = context.searcher();
    let start = Instant::now();
    let results = match searcher.search(&query) {
        Ok(r) => r,
        Err(e) if json => {
            print_json_error(&e.into(), "SEARCH_FAILED");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };
    let elapsed_ms = start.elapsed().as_millis() as u32;

    context.history_store.record(&text, search_mode, results.len() as u32, elapsed_ms)?;

    if json {
        let json_results: Vec<_> = results
            .iter()
            .map(|r| {
                json!({
                    "path": r.document.file_path.display().to_string(),
                    "title": r.document.title,
                    "score": r.score,
                    "snippet": r.snippet,
                    "rank": r.rank,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&json!({ "results": json_results, "total": results.len() }))?);
    } else {
        println!("Found {} result(s) in {}ms:", results.len(), elapsed_ms);
        for r in &results {
            println!("  {}. [{:.3}] {}", r.rank, r.score, r.document.file_path.display());
            if !r.snippet.is_empty() {
                println!("      {}", r.snippet);
            }
        }
    }

    Ok(())
}

async fn cmd_rebuild(data_dir: &Path, folder: &Path, timeout_minutes: Option<u64>) -> anyhow::Result<()> {
    use indicatif::{ProgressBar, ProgressStyle};
    use std::sync::Arc;

    docmind_core::rebuild_coordinator::validate_folder(folder)?;

    let mut context = open_context(data_dir)?;
    if let Some(minutes) = timeout_minutes {
        context.rebuild_coordinator = docmind_core::RebuildCoordinator::new(minutes);
    }

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    pb.enable_steady_tick(std::time::Duration::from_millis(80));

    let pb_for_events = pb.clone();
    let on_event: Arc<dyn Fn(ProgressEvent) + Send + Sync> = Arc::new(move |event| match event {
        ProgressEvent::Progress(progress) => pb_for_events.set_message(progress.display_message()),
        ProgressEvent::Error(err) => tracing::warn!(kind = %err.kind, message = %err.message, "rebuild error"),
        ProgressEvent::Completed(_) => {}
    });

    let thread_id = format!("{:?}", std::thread::current().id());
    let stats = context.rebuild_coordinator.start_rebuild(
        thread_id,
        folder.to_path_buf(),
        &context.document_store,
        &context.inverted_index,
        &context.embedding_store,
        context.embedder(),
        context.extractor(),
        context.config.indexing.batch_size,
        context.config.indexing.skip_embeddings,
        on_event,
    );

    pb.finish_and_clear();

    let stats = stats?;
    println!(
        "Rebuilt {} file(s) ({} failed, {} document(s) added) in {:.2}s",
        stats.files_processed, stats.files_failed, stats.documents_added, stats.elapsed_seconds
    );

    Ok(())
}

async fn cmd_watch(data_dir: &Path, folder: &Path) -> anyhow::Result<()> {
    let context = open_context(data_dir)?;

    println!("Watching {} for changes (Ctrl+C to stop)...", folder.display());

    let pipeline = IndexingPipeline::new(
        &context.document_store,
        &context.inverted_index,
        &context.embedding_store,
        context.embedder(),
        context.extractor(),
        context.config.indexing.batch_size,
        context.config.indexing.skip_embeddings,
    );

    let watcher_config = ChangeWatcherConfig {
        debounce: std::time::Duration::from_millis(context.config.indexing.watcher_debounce_ms),
        ..ChangeWatcherConfig::default()
    };
    let watcher = ChangeWatcher::new(&pipeline, watcher_config);
    let cancel = CancelToken::new();

    let stats = watcher.run_with(folder, context.data_dir(), &cancel, |kind| {
        println!("⟳ {:?}", kind);
    })?;

    context.embedding_store.save()?;
    println!(
        "Watcher stopped. {} change(s) enqueued, {} dropped.",
        stats.events_enqueued, stats.events_dropped
    );

    Ok(())
}

async fn cmd_stats(data_dir: &Path, json: bool) -> anyhow::Result<()> {
    let context = open_context(data_dir)?;

    let doc_stats = context.document_store.stats()?;
    let index_stats = context.inverted_index.stats()?;
    let cache_info = context.embedding_store.cache_info();
    let search_stats = context.searcher().search_stats()?;

    if json {
        use serde_json::json;
        let output = json!({
            "documents": {
                "total_docs": doc_stats.total_docs,
                "total_size": doc_stats.total_size,
                "per_type_counts": doc_stats.per_type_counts,
                "last_updated": doc_stats.last_updated,
            },
            "index": {
                "document_count": index_stats.document_count,
                "index_size_bytes": index_stats.index_size_bytes,
                "last_modified": index_stats.last_modified,
            },
            "embeddings": {
                "total_embeddings": cache_info.total_embeddings,
                "file_size_bytes": cache_info.file_size_bytes,
                "model_dimension": cache_info.model_dimension,
            },
            "search": {
                "indexed_documents": search_stats.indexed_documents,
                "cached_embeddings": search_stats.cached_embeddings,
                "suggestion_terms": search_stats.suggestion_terms,
            },
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("Documents:");
        println!("  total: {}", doc_stats.total_docs);
        println!("  total size: {} bytes", doc_stats.total_size);
        for (file_type, count) in &doc_stats.per_type_counts {
            println!("  {}: {}", file_type, count);
        }

        println!("\nFull-text index:");
        println!("  documents: {}", index_stats.document_count);
        println!("  size: {} bytes", index_stats.index_size_bytes);

        println!("\nEmbeddings:");
        println!("  vectors: {}", cache_info.total_embeddings);
        println!("  dimension: {}", cache_info.model_dimension);
        println!("  file size: {} bytes", cache_info.file_size_bytes);

        println!("\nSuggestions:");
        println!("  indexed terms: {}", search_stats.suggestion_terms);
    }

    Ok(())
}

async fn cmd_history(
    data_dir: &Path,
    recent: Option<u32>,
    popular: bool,
    trends: bool,
    failed: bool,
    json: bool,
) -> anyhow::Result<()> {
    use serde_json::json;

    let context = open_context(data_dir)?;
    let history = &context.history_store;

    if popular {
        let popular_queries = history.popular(30, 20)?;
        if json {
            let rows: Vec<_> = popular_queries
                .iter()
                .map(|q| json!({"query": q.query_text, "count": q.count, "avg_results": q.avg_results, "avg_ms": q.avg_ms}))
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        } else {
            println!("Popular queries (last 30 days):");
            for q in &popular_queries {
                println!("  {:<30} count={:<5} avg_results={:.1} avg_ms={:.1}", q.query_text, q.count, q.avg_results, q.avg_ms);
            }
        }
        return Ok(());
    }

    if trends {
        let trending = history.trends(14, 20)?;
        if json {
            let rows: Vec<_> = trending
                .iter()
                .map(|t| json!({"query": t.query_text, "recent_count": t.recent_count, "previous_count": t.previous_count, "trend_score": t.trend_score}))
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        } else {
            println!("Trending queries (last 14 days):");
            for t in &trending {
                println!("  {:<30} recent={:<5} previous={:<5} score={:.2}", t.query_text, t.recent_count, t.previous_count, t.trend_score);
            }
        }
        return Ok(());
    }

    if failed {
        let failed_queries = history.failed(30, 20)?;
        if json {
            let rows: Vec<_> = failed_queries.iter().map(|(text, count)| json!({"query": text, "count": count})).collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        } else {
            println!("Zero-result queries (last 30 days):");
            for (text, count) in &failed_queries {
                println!("  {:<30} count={}", text, count);
            }
        }
        return Ok(());
    }

    let limit = recent.unwrap_or(20);
    let records = history.recent(limit)?;
    if json {
        let rows: Vec<_> = records
            .iter()
            .map(|r| json!({"query": r.query_text, "mode": format!("{:?}", r.mode), "timestamp": r.timestamp, "result_count": r.result_count, "execution_time_ms": r.execution_time_ms}))
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        println!("Recent searches:");
        for r in &records {
            println!("  {:<30} mode={:?} results={} time={}ms", r.query_text, r.mode, r.result_count, r.execution_time_ms);
        }
    }

    Ok(())
}
