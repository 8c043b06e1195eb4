use anyhow::Result;
use clap::Args;
use std::sync::Arc;
use std::time::Instant;

use super::record_operation;
use crate::cli::output::get_formatter;
use crate::models::{Config, OutputFormat, SearchResults};
use crate::services::{EmbeddingProvider, HttpEmbeddingClient, Retriever, create_backend};

#[derive(Debug, Args)]
pub struct SearchArgs {
    #[arg(required = true, help = "Search query text")]
    pub query: String,

    #[arg(long, short = 'n', help = "Maximum number of results to return")]
    pub limit: Option<usize>,

    #[arg(long, help = "Minimum similarity score threshold (0.0-1.0)")]
    pub min_score: Option<f32>,
}

pub async fn handle_search(args: SearchArgs, format: OutputFormat, verbose: bool) -> Result<()> {
    let query = args.query.trim();
    if query.is_empty() {
        anyhow::bail!("search query cannot be empty");
    }

    let config = Config::load()?;
    config.validate()?;
    let formatter = get_formatter(format);
    let start_time = Instant::now();

    let limit = args.limit.unwrap_or(config.search.default_limit);
    if limit == 0 {
        anyhow::bail!("limit must be at least 1");
    }

    let min_score = args.min_score.or(config.search.default_min_score);
    if let Some(score) = min_score
        && !(0.0..=1.0).contains(&score)
    {
        anyhow::bail!("min_score must be between 0.0 and 1.0");
    }

    if verbose {
        eprintln!("Query: \"{query}\"");
        eprintln!("  Limit: {limit}");
        if let Some(score) = min_score {
            eprintln!("  Min score: {score:.3}");
        }
    }

    let embedder: Arc<dyn EmbeddingProvider> =
        Arc::new(HttpEmbeddingClient::new(&config.embedding)?);
    let store = create_backend(&config.vector_store).await?;
    let retriever = Retriever::new(embedder, store, &config.resilience, &config.cache);

    let retrieve_start = Instant::now();
    let mut results = retriever.retrieve(query, limit).await?;
    let retrieve_ms = retrieve_start.elapsed().as_millis();

    // Empty results plus a bumped counter means a dependency was down, not
    // that the index had no matches.
    let degraded = retriever.degraded_count() > 0;

    if let Some(score) = min_score {
        results.retain(|r| r.score >= score);
    }

    if verbose {
        let total_ms = start_time.elapsed().as_millis();
        eprintln!("Timing:");
        eprintln!("  Retrieve: {retrieve_ms}ms");
        eprintln!("  Total: {total_ms}ms");
        eprintln!();
    }

    let duration_ms = start_time.elapsed().as_millis() as u64;
    let search_results = SearchResults::new(query.to_string(), results, degraded, duration_ms);

    record_operation(
        &config,
        "search",
        &format!("results={}", search_results.len()),
        duration_ms,
        !degraded,
    );

    print!("{}", formatter.format_search_results(&search_results));

    Ok(())
}
