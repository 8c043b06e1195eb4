//! Index command implementation.

use anyhow::{Context, Result};
use clap::Subcommand;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use walkdir::WalkDir;

use super::record_operation;
use crate::cli::output::{IndexStats, get_formatter};
use crate::models::{Config, IngestionStatus, OutputFormat};
use crate::services::{
    EmbeddingProvider, HttpEmbeddingClient, Ingestor, TextChunker, build_token_counter,
    create_backend,
};
use crate::utils::{get_relative_path, is_text_file, read_file_content, source_id_for_path};

#[derive(Debug, Subcommand)]
pub enum IndexCommand {
    /// Add a file or directory to the search index
    Add {
        /// Path to directory or file to index
        #[arg(required = true)]
        path: PathBuf,

        /// Stable source id, single-file ingestion only
        #[arg(long)]
        source_id: Option<String>,

        /// Human-readable source name, single-file ingestion only
        #[arg(long)]
        source_name: Option<String>,

        /// Replace chunks indexed earlier under the same source ids
        #[arg(long, short = 'u')]
        update: bool,

        /// File patterns to exclude (can be specified multiple times)
        #[arg(long, short = 'e')]
        exclude: Vec<String>,

        /// Show what would be indexed without actually indexing
        #[arg(long)]
        dry_run: bool,
    },

    /// Delete every chunk indexed under a source id
    Delete {
        /// Source id to remove from the index
        #[arg(required = true)]
        source_id: String,

        /// Skip confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },

    /// Clear all indexed chunks
    Clear {
        /// Skip confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },
}

pub async fn handle_index(cmd: IndexCommand, format: OutputFormat, verbose: bool) -> Result<()> {
    match cmd {
        IndexCommand::Add {
            path,
            source_id,
            source_name,
            update,
            exclude,
            dry_run,
        } => handle_add(path, source_id, source_name, update, exclude, dry_run, format, verbose)
            .await,
        IndexCommand::Delete { source_id, yes } => {
            handle_delete(source_id, yes, format, verbose).await
        }
        IndexCommand::Clear { yes } => handle_clear(yes, format, verbose).await,
    }
}

#[allow(clippy::too_many_arguments)]
async fn handle_add(
    path: PathBuf,
    source_id: Option<String>,
    source_name: Option<String>,
    update: bool,
    exclude: Vec<String>,
    dry_run: bool,
    format: OutputFormat,
    verbose: bool,
) -> Result<()> {
    let config = Config::load()?;
    config.validate()?;
    let formatter = get_formatter(format);
    let start_time = Instant::now();

    let path = path.canonicalize().context("invalid path")?;

    if path.is_dir() && (source_id.is_some() || source_name.is_some()) {
        anyhow::bail!("--source-id and --source-name apply to single-file ingestion only");
    }

    let files = collect_files(&path, &exclude, &config.indexing.exclude_patterns)?;

    if files.is_empty() {
        println!("{}", formatter.format_message("No files found to index."));
        return Ok(());
    }

    if verbose {
        eprintln!("Found {} files to process", files.len());
    }

    if dry_run {
        println!(
            "{}",
            formatter.format_message(&format!("Dry run: Would index {} files", files.len()))
        );
        for file in &files {
            println!("  {}", file.display());
        }
        return Ok(());
    }

    let ingestor = build_ingestor(&config).await?;

    // Source ids and names derive from paths relative to the ingestion root.
    let root = if path.is_file() {
        path.parent().map_or_else(|| path.clone(), Path::to_path_buf)
    } else {
        path.clone()
    };

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
            )
            .unwrap()
            .progress_chars("#>-"),
    );

    let mut stats = IndexStats {
        files_scanned: files.len() as u64,
        ..Default::default()
    };

    for file_path in &files {
        pb.inc(1);

        if !is_text_file(file_path) {
            stats.files_skipped += 1;
            continue;
        }

        let content = match read_file_content(file_path, config.indexing.max_file_size) {
            Ok(c) => c,
            Err(e) => {
                if verbose {
                    pb.println(format!("Skipping {}: {}", file_path.display(), e));
                }
                stats.files_skipped += 1;
                continue;
            }
        };

        if content.is_empty() {
            stats.files_skipped += 1;
            continue;
        }

        let relative = get_relative_path(&root, file_path)
            .unwrap_or_else(|| file_path.to_string_lossy().to_string());
        let id = source_id
            .clone()
            .unwrap_or_else(|| source_id_for_path(Path::new(&relative)));
        let name = source_name.clone().unwrap_or_else(|| relative.clone());

        let record = ingestor.ingest(&content, &id, &name, update).await?;
        match record.status {
            IngestionStatus::Completed => {
                stats.files_indexed += 1;
                stats.chunks_created += record.chunk_count as u64;
            }
            IngestionStatus::Failed => {
                stats.files_failed += 1;
                if let Some(ref message) = record.error_message {
                    pb.println(format!("Failed {}: {}", file_path.display(), message));
                }
            }
        }
    }

    pb.finish_and_clear();
    stats.duration_ms = start_time.elapsed().as_millis() as u64;

    record_operation(
        &config,
        "index",
        &format!("files={} chunks={}", stats.files_indexed, stats.chunks_created),
        stats.duration_ms,
        stats.files_failed == 0,
    );

    print!("{}", formatter.format_index_stats(&stats));

    Ok(())
}

async fn handle_delete(
    source_id: String,
    yes: bool,
    format: OutputFormat,
    verbose: bool,
) -> Result<()> {
    let config = Config::load()?;
    let formatter = get_formatter(format);

    if verbose {
        eprintln!("Deleting indexed chunks for source: {source_id}");
    }

    if !yes {
        println!(
            "This will delete all chunks indexed under '{}'. Continue? [y/N]",
            source_id
        );
        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;
        if !input.trim().eq_ignore_ascii_case("y") {
            println!("{}", formatter.format_message("Cancelled."));
            return Ok(());
        }
    }

    let start_time = Instant::now();
    let store = create_backend(&config.vector_store).await?;
    store.delete_by_source_id(&source_id).await?;

    record_operation(
        &config,
        "delete",
        &source_id,
        start_time.elapsed().as_millis() as u64,
        true,
    );

    println!(
        "{}",
        formatter.format_message(&format!("Deleted chunks for source '{}'", source_id))
    );

    Ok(())
}

async fn handle_clear(yes: bool, format: OutputFormat, verbose: bool) -> Result<()> {
    let config = Config::load()?;
    let formatter = get_formatter(format);

    if verbose {
        eprintln!("Clearing all indexed chunks...");
    }

    if !yes {
        println!("This will delete ALL indexed chunks. Continue? [y/N]");
        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;
        if !input.trim().eq_ignore_ascii_case("y") {
            println!("{}", formatter.format_message("Cancelled."));
            return Ok(());
        }
    }

    let start_time = Instant::now();
    let store = create_backend(&config.vector_store).await?;
    store.clear().await?;

    record_operation(
        &config,
        "clear",
        "",
        start_time.elapsed().as_millis() as u64,
        true,
    );

    println!(
        "{}",
        formatter.format_message("All indexed chunks have been cleared.")
    );

    Ok(())
}

async fn build_ingestor(config: &Config) -> Result<Ingestor> {
    let counter = build_token_counter(config.chunking.tokenizer)?;
    let chunker = TextChunker::new(&config.chunking, counter);
    let embedder: Arc<dyn EmbeddingProvider> =
        Arc::new(HttpEmbeddingClient::new(&config.embedding)?);
    let store = create_backend(&config.vector_store).await?;
    Ok(Ingestor::new(chunker, embedder, store, &config.resilience))
}

fn collect_files(
    path: &PathBuf,
    exclude: &[String],
    default_exclude: &[String],
) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    if path.is_file() {
        files.push(path.clone());
        return Ok(files);
    }

    for entry in WalkDir::new(path).follow_links(false) {
        let entry = entry.context("failed to read directory entry")?;
        let entry_path = entry.path();

        if !entry_path.is_file() {
            continue;
        }

        let path_str = entry_path.to_string_lossy();
        let mut excluded = false;

        for pattern in exclude.iter().chain(default_exclude.iter()) {
            if glob::Pattern::new(pattern)
                .map(|p| p.matches(&path_str))
                .unwrap_or(false)
            {
                excluded = true;
                break;
            }
        }

        if !excluded {
            files.push(entry_path.to_path_buf());
        }
    }

    Ok(files)
}
